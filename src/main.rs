#![deny(dead_code)] // DO NOT REMOVE THIS EVER
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

mod credentials;
mod utils;

use crate::credentials::{clear_session, load_session, save_session, SavedSession};
use glimpse::api::{ApiClient, HttpApiClient};
use glimpse::auth::{SessionStore, StaticSession};
use glimpse::chat::{ChatSession, SessionCommand, SessionContext, SessionEvent, TypingSignal};
use glimpse::config::{self, ClientConfig};
use glimpse::models::{Draft, Message, MessageKind};
use glimpse::realtime::WebSocketTransport;
use glimpse::story::{PlayerEvent, StoryPlayer, StoryViewer, TapZone, ViewerCommand};

/// Command line arguments for glimpse
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "glimpse: a line-mode client for chats and stories.",
    long_about = "glimpse talks to the stories/chat backend from the terminal.\n\n\
    Optional parameters:\n\
    --config-dir <PATH>    Override the directory holding config.json, session.json and the log\n\
    Use -h or --help to see all options."
)]
struct Args {
    /// Directory for config.json, session.json and glimpse.log
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Explicit config file (defaults to <config-dir>/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log to stdout instead of glimpse.log
    #[arg(long)]
    log_stdout: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remember who you are (user id, username, optional API token)
    Login {
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// Open a chat room; each input line is sent as a message
    Chat { room_id: String },
    /// Play the story feed
    Stories {
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// List notifications, optionally marking one read
    Notifications {
        #[arg(long)]
        read: Option<String>,
    },
    /// Follow (or with --undo, unfollow) a user
    Follow {
        target_id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Search users by name
    Search { query: String },
}

/// Prompts for whatever identity fields were not passed or set in the environment
fn prompt_identity(user_id: Option<String>, username: Option<String>) -> (String, String) {
    let user_id = user_id.or_else(|| env::var("GLIMPSE_USER_ID").ok()).unwrap_or_else(|| {
        eprintln!("Enter your user id:");
        utils::read_line().unwrap_or_default()
    });
    let username = username.or_else(|| env::var("GLIMPSE_USERNAME").ok()).unwrap_or_else(|| {
        eprintln!("Enter your username:");
        utils::read_line().unwrap_or_default()
    });
    (user_id, username)
}

fn format_message(message: &Message) -> String {
    let who = message.sender_username.as_deref().unwrap_or(&message.sender_id);
    let body = match message.kind {
        MessageKind::Text => message.content.clone().unwrap_or_default(),
        kind => format!("[{}] {}", kind.as_str(), message.media_url.as_deref().unwrap_or("")),
    };
    let once = if message.view_once { " (view once)" } else { "" };
    format!("{} {}: {}{} ({:?})", message.created_at.format("%H:%M"), who, body, once, message.delivery_status)
}

fn print_session_event(event: &SessionEvent) {
    match event {
        SessionEvent::Hydrated(messages) => {
            println!("--- {} earlier messages ---", messages.len());
            for message in messages {
                println!("{}", format_message(message));
            }
        }
        SessionEvent::MessageAppended(message) => println!("{}", format_message(message)),
        SessionEvent::MessageReplaced { message, .. } => println!("✓ sent {}", message.id),
        SessionEvent::MessageRemoved(id) => println!("✗ removed {}", id),
        SessionEvent::MessageRead(id) => println!("read {}", id),
        SessionEvent::TypingChanged(state) if state.typing => println!("{} is typing…", state.participant_id),
        SessionEvent::TypingChanged(state) => println!("{} stopped typing", state.participant_id),
        SessionEvent::TypingSignalSent(TypingSignal::Start) => info!("Typing start sent"),
        SessionEvent::TypingSignalSent(TypingSignal::Stop) => info!("Typing stop sent"),
        SessionEvent::Notice(text) => println!("! {}", text),
        SessionEvent::Disconnected => println!("! offline"),
        SessionEvent::Closed => println!("--- chat closed ---"),
    }
}

async fn run_chat(ctx: SessionContext, room_id: &str) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let Some(session) = ChatSession::activate(&ctx, room_id, events_tx).await? else {
        return Err(anyhow!("Not signed in, run `glimpse login` first"));
    };
    let (commands, handle) = session.spawn();

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_session_event(&event);
        }
    });

    println!("Type a message and press enter. /read <id>, /view <id>, /quit");
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    while let Some(line) = lines.next().await {
        let line = line?;
        let command = if line == "/quit" {
            SessionCommand::Close
        } else if let Some(id) = line.strip_prefix("/read ") {
            SessionCommand::MarkRead(id.trim().to_string())
        } else if let Some(id) = line.strip_prefix("/view ") {
            SessionCommand::OpenViewOnce(id.trim().to_string())
        } else {
            if commands.send(SessionCommand::TextChanged(line.clone())).await.is_err() {
                break;
            }
            SessionCommand::Submit(Draft::text(line))
        };
        let closing = command == SessionCommand::Close;
        if commands.send(command).await.is_err() || closing {
            break;
        }
    }

    drop(commands);
    handle.await?;
    printer.await?;
    Ok(())
}

async fn run_stories(api: Arc<dyn ApiClient>, viewer_id: &str, config: &ClientConfig, start: usize) -> Result<()> {
    let feed = api.fetch_story_feed(viewer_id).await?;
    if feed.is_empty() {
        println!("No stories right now.");
        return Ok(());
    }
    info!("Playing {} stories from index {}", feed.len(), start);

    let titles: Vec<String> = feed
        .iter()
        .map(|s| format!("{} - {}", s.owner_username.as_deref().unwrap_or(&s.owner_id), s.caption.as_deref().unwrap_or("")))
        .collect();
    let player = StoryPlayer::new(feed, start, config.story_duration(), config.dismiss_threshold_px)?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (viewer, _state) = StoryViewer::new(player, api, viewer_id, config.story_tick(), events_tx);
    let (commands, handle) = viewer.spawn();

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PlayerEvent::Viewed { index, .. } => println!("▶ [{}] {}", index, titles[index]),
                PlayerEvent::Paused => println!("⏸"),
                PlayerEvent::Resumed => println!("▶"),
                PlayerEvent::LikeChanged { liked, .. } => println!("{}", if liked { "♥" } else { "♡" }),
                PlayerEvent::Notice(text) => println!("! {}", text),
                PlayerEvent::Closed => println!("--- stories closed ---"),
                PlayerEvent::IndexChanged(_) => {}
            }
        }
    });

    println!("n/p: next/previous, h/r: hold/release, l: like, s: swipe away, q: quit");
    let threshold = config.dismiss_threshold_px;
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    while let Some(line) = lines.next().await {
        let command = match line?.trim() {
            "n" => ViewerCommand::Tap(TapZone::Right),
            "p" => ViewerCommand::Tap(TapZone::Left),
            "h" => ViewerCommand::Hold,
            "r" => ViewerCommand::Release,
            "l" => ViewerCommand::ToggleLike,
            "s" => ViewerCommand::Drag(threshold + 1.0),
            "q" => ViewerCommand::Close,
            other => {
                warn!("Unknown story command '{}'", other);
                continue;
            }
        };
        if commands.send(command).await.is_err() {
            break;
        }
    }

    drop(commands);
    let state = handle.await?;
    info!("Stories ended at index {}", state.index);
    printer.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = &args.config_dir {
        std::fs::create_dir_all(dir)?;
        config::set_config_dir_override(dir.clone());
    }

    let log_file_path = config::get_config_dir()?.join("glimpse.log");
    if args.log_stdout {
        utils::setup_logging(None, LevelFilter::Debug)?;
    } else {
        utils::setup_logging(Some(log_file_path.as_path()), LevelFilter::Debug)?;
        info!("Logging to file: {}", log_file_path.display());
    }
    info!("System information: {} {}", env::consts::OS, env::consts::ARCH);

    let config = ClientConfig::load(args.config.as_deref())?;

    if let Command::Login { user_id, username, token } = &args.command {
        let (user_id, username) = prompt_identity(user_id.clone(), username.clone());
        if user_id.is_empty() || username.is_empty() {
            return Err(anyhow!("user id and username are required"));
        }
        save_session(&SavedSession::new(&user_id, &username, token.as_deref()))?;
        println!("Signed in as {}", username);
        return Ok(());
    }
    if let Command::Logout = &args.command {
        if clear_session()? {
            println!("Signed out");
        }
        return Ok(());
    }

    let saved = load_session()?;
    let token = saved.as_ref().and_then(|s| s.get_token());
    let auth = Arc::new(StaticSession::new(saved.as_ref().map(|s| s.user())));
    let api: Arc<dyn ApiClient> = Arc::new(HttpApiClient::new(&config.api_base_url, token)?);

    let Some(me) = auth.current_user() else {
        eprintln!("Not signed in, run `glimpse login` first");
        return Ok(());
    };

    let result = match args.command {
        Command::Chat { room_id } => {
            let ctx = SessionContext {
                api: api.clone(),
                auth: auth.clone(),
                transport: Arc::new(WebSocketTransport::new(config.ws_base_url.clone())),
                config: config.clone(),
            };
            run_chat(ctx, &room_id).await
        }
        Command::Stories { start } => run_stories(api.clone(), &me.id, &config, start).await,
        Command::Notifications { read } => {
            if let Some(id) = read {
                api.mark_notification_read(&me.id, &id).await?;
            }
            for n in api.fetch_notifications(&me.id).await? {
                let marker = if n.is_read { " " } else { "•" };
                let from = n.from_username.as_deref().unwrap_or("someone");
                println!("{} {} [{}] {} {}", marker, n.id, n.kind, from, n.message.as_deref().unwrap_or(""));
            }
            Ok(())
        }
        Command::Follow { target_id, undo } => {
            let status = if undo {
                api.unfollow(&me.id, &target_id).await?
            } else {
                api.follow(&me.id, &target_id).await?
            };
            println!("{} {}", if status.is_following { "Following" } else { "Not following" }, target_id);
            Ok(())
        }
        Command::Search { query } => {
            for user in api.search_users(&me.id, &query).await? {
                let name = user.display_name.as_deref().unwrap_or(&user.username);
                let following = if user.is_following { " (following)" } else { "" };
                println!("{} @{} {}{}", user.id, user.username, name, following);
            }
            Ok(())
        }
        Command::Login { .. } | Command::Logout => Ok(()),
    };

    if let Err(e) = &result {
        error!("Command failed: {}", e);
    }
    result
}
