mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{
    message, new_message_frame, next_event, setup_logging, text_message_frame, ChannelTransport, MockApi,
    RefusingTransport,
};
use glimpse::auth::StaticSession;
use glimpse::chat::TypingSignal;
use glimpse::config::ClientConfig;
use glimpse::models::{DeliveryStatus, Draft, User};
use glimpse::realtime::Transport;
use glimpse::{ChatSession, SessionCommand, SessionContext, SessionEvent};

fn me() -> User {
    User { id: "me".to_string(), username: "me".to_string() }
}

fn context(api: Arc<MockApi>, transport: Arc<dyn Transport>, user: Option<User>) -> SessionContext {
    SessionContext {
        api,
        auth: Arc::new(StaticSession::new(user)),
        transport,
        config: ClientConfig::default(),
    }
}

async fn activated(
    api: Arc<MockApi>,
    transport: Arc<dyn Transport>,
) -> (ChatSession, mpsc::UnboundedReceiver<SessionEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let ctx = context(api, transport, Some(me()));
    let session = ChatSession::activate(&ctx, "r1", events_tx)
        .await
        .expect("activate failed")
        .expect("no session for signed-in user");
    (session, events_rx)
}

#[tokio::test]
async fn test_hydrate_then_offline_send_rolls_back() {
    setup_logging();
    // Server returns newest first
    let api = Arc::new(MockApi::with_history(vec![message("b", "r1", "u2"), message("a", "r1", "u2")]));
    let (mut session, mut events) = activated(api.clone(), Arc::new(RefusingTransport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Disconnected);
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Notice(_)));

    match next_event(&mut events, 1).await {
        SessionEvent::Hydrated(messages) => {
            let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("expected Hydrated, got {:?}", other),
    }
    assert_eq!(api.calls_starting_with("fetch_messages"), vec!["fetch_messages me r1 50".to_string()]);

    assert_eq!(session.submit(Draft::text("hello"), Instant::now()), None);
    assert_eq!(session.timeline().ids(), vec!["a", "b"]);

    match next_event(&mut events, 1).await {
        SessionEvent::MessageAppended(provisional) => {
            assert!(provisional.is_optimistic());
            assert_eq!(provisional.delivery_status, DeliveryStatus::Sending);
        }
        other => panic!("expected MessageAppended, got {:?}", other),
    }
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::MessageRemoved(_)));
    match next_event(&mut events, 1).await {
        SessionEvent::Notice(text) => assert!(text.starts_with("Message not sent")),
        other => panic!("expected Notice, got {:?}", other),
    }
}

#[tokio::test]
async fn test_send_confirmed_by_own_echo() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, mut server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Hydrated(Vec::new()));

    let (commands, handle) = session.spawn();
    commands.send(SessionCommand::Submit(Draft::text("hi there"))).await.unwrap();

    let temp_id = match next_event(&mut events, 1).await {
        SessionEvent::MessageAppended(message) => {
            assert!(message.is_optimistic());
            assert_eq!(message.content.as_deref(), Some("hi there"));
            message.id
        }
        other => panic!("expected MessageAppended, got {:?}", other),
    };

    let frame = server.next_frame().await;
    assert_eq!(frame["type"], "send_message");
    assert_eq!(frame["chat_room_id"], "r1");
    assert_eq!(frame["message_type"], "text");
    assert_eq!(frame["content"], "hi there");
    assert_eq!(frame["view_once"], false);

    // The server broadcasts the stored message to every member, sender included
    server.push(&text_message_frame("srv-1", "r1", "me", "hi there")).await;
    match next_event(&mut events, 1).await {
        SessionEvent::MessageReplaced { temp_id: replaced, message } => {
            assert_eq!(replaced, temp_id);
            assert_eq!(message.id, "srv-1");
            assert_eq!(message.delivery_status, DeliveryStatus::Sent);
        }
        other => panic!("expected MessageReplaced, got {:?}", other),
    }

    commands.send(SessionCommand::Close).await.unwrap();
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Closed);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_send_times_out() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, _server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Hydrated(Vec::new()));

    let (commands, handle) = session.spawn();
    let start = Instant::now();
    commands.send(SessionCommand::Submit(Draft::text("anyone?"))).await.unwrap();
    let temp_id = match next_event(&mut events, 1).await {
        SessionEvent::MessageAppended(message) => message.id,
        other => panic!("expected MessageAppended, got {:?}", other),
    };

    assert_eq!(next_event(&mut events, 30).await, SessionEvent::MessageRemoved(temp_id));
    assert!(start.elapsed() >= Duration::from_millis(10_000), "rolled back early: {:?}", start.elapsed());
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Notice(_)));

    commands.send(SessionCommand::Close).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_typing_signals_are_debounced() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, mut server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Hydrated(Vec::new()));

    let (commands, handle) = session.spawn();
    let start = Instant::now();

    commands.send(SessionCommand::TextChanged("h".into())).await.unwrap();
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::TypingSignalSent(TypingSignal::Start));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    commands.send(SessionCommand::TextChanged("he".into())).await.unwrap();

    // The window restarts at t=1000, so stop goes out at t=3000
    assert_eq!(next_event(&mut events, 10).await, SessionEvent::TypingSignalSent(TypingSignal::Stop));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(3000), "stop too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3100), "stop too late: {:?}", elapsed);

    let frames = server.drain();
    assert_eq!(
        frames,
        vec![
            r#"{"type":"typing_start","chat_room_id":"r1"}"#.to_string(),
            r#"{"type":"typing_stop","chat_room_id":"r1"}"#.to_string(),
        ]
    );

    commands.send(SessionCommand::Close).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_inbound_frames_are_filtered_by_room() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Hydrated(Vec::new()));

    let (commands, handle) = session.spawn();
    server.push(&new_message_frame("x1", "r2", "u2")).await;
    server.push("{not json").await;
    server.push(r#"{"type":"user_typing","payload":{"chat_room_id":"r1","user_id":"u2","username":"bo"}}"#).await;
    server.push(&new_message_frame("m1", "r1", "u2")).await;

    match next_event(&mut events, 1).await {
        SessionEvent::TypingChanged(state) => {
            assert_eq!(state.participant_id, "u2");
            assert!(state.typing);
        }
        other => panic!("expected TypingChanged, got {:?}", other),
    }
    match next_event(&mut events, 1).await {
        SessionEvent::MessageAppended(message) => assert_eq!(message.id, "m1"),
        other => panic!("expected MessageAppended, got {:?}", other),
    }
    match next_event(&mut events, 1).await {
        SessionEvent::TypingChanged(state) => assert!(!state.typing),
        other => panic!("expected TypingChanged, got {:?}", other),
    }

    drop(commands);
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Closed);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_close_releases_the_link() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, mut server) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let (session, mut events) = activated(api, transport.clone()).await;
    assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    assert!(session.is_connected());

    let (commands, handle) = session.spawn();
    commands.send(SessionCommand::Close).await.unwrap();
    handle.await.unwrap();

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(SessionEvent::Closed));
    // Every client-side sender is gone
    assert_eq!(server.from_client.recv().await, None);
}

#[tokio::test]
async fn test_disconnect_rolls_back_pending_sends() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, mut server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Hydrated(Vec::new()));

    let (commands, handle) = session.spawn();
    commands.send(SessionCommand::Submit(Draft::text("in flight"))).await.unwrap();
    let temp_id = match next_event(&mut events, 1).await {
        SessionEvent::MessageAppended(message) => message.id,
        other => panic!("expected MessageAppended, got {:?}", other),
    };
    assert_eq!(server.next_frame().await["type"], "send_message");

    drop(server);
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Disconnected);
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Notice("Connection lost".to_string()));
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::MessageRemoved(temp_id));
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Notice(_)));

    // Commands are still served; sends fail fast without a link
    commands.send(SessionCommand::Submit(Draft::text("still here"))).await.unwrap();
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::MessageAppended(_)));
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::MessageRemoved(_)));

    commands.send(SessionCommand::Close).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_view_once_reported_over_rest_when_offline() {
    setup_logging();
    let mut snap = message("v1", "r1", "u2");
    snap.view_once = true;
    let api = Arc::new(MockApi::with_history(vec![snap]));
    let (session, mut events) = activated(api.clone(), Arc::new(RefusingTransport)).await;
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Disconnected);
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Notice(_)));
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Hydrated(_)));

    let (commands, handle) = session.spawn();
    commands.send(SessionCommand::OpenViewOnce("v1".into())).await.unwrap();
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::MessageRemoved("v1".to_string()));
    assert_eq!(api.calls_starting_with("mark_message_viewed"), vec!["mark_message_viewed me v1".to_string()]);

    commands.send(SessionCommand::Close).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_not_ready_without_user() {
    setup_logging();
    let api = Arc::new(MockApi::new());
    let (transport, _server) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let ctx = context(api.clone(), transport.clone(), None);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let session = ChatSession::activate(&ctx, "r1", events_tx).await.unwrap();
    assert!(session.is_none());
    assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    assert!(api.calls().is_empty());
    assert!(events_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_transport_failure_still_hydrates() {
    setup_logging();
    let api = Arc::new(MockApi::with_history(vec![message("a", "r1", "u2")]));
    let (session, mut events) = activated(api, Arc::new(RefusingTransport)).await;

    assert!(!session.is_connected());
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Disconnected);
    assert_eq!(next_event(&mut events, 1).await, SessionEvent::Notice("Live updates unavailable".to_string()));
    assert!(matches!(next_event(&mut events, 1).await, SessionEvent::Hydrated(ref m) if m.len() == 1));
}

#[tokio::test]
async fn test_hydration_failure_reports_notice() {
    setup_logging();
    let api = Arc::new(MockApi::with_history(vec![message("a", "r1", "u2")]));
    api.fail_fetch.store(true, Ordering::SeqCst);
    let (transport, _server) = ChannelTransport::new();
    let (session, mut events) = activated(api, Arc::new(transport)).await;

    assert!(session.timeline().is_empty());
    match next_event(&mut events, 1).await {
        SessionEvent::Notice(text) => assert!(text.starts_with("Could not load messages")),
        other => panic!("expected Notice, got {:?}", other),
    }
}
