// Chat session core: one real-time link per open room, the room's message
// timeline, and typing indicators in both directions

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::ApiClient;
use crate::auth::SessionStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{Draft, Message, MessageKind, TypingState, User};
use crate::realtime::{decode_event, ClientFrame, Link, ServerEvent, Transport};

pub mod timeline;
pub mod typing;

pub use timeline::{Confirmation, MessageTimeline, PendingSend};
pub use typing::{RemoteTyping, TypingDebouncer, TypingSignal};

const COMMAND_BUFFER: usize = 32;

/// Collaborators shared by every session of the app.
#[derive(Clone)]
pub struct SessionContext {
    pub api: Arc<dyn ApiClient>,
    pub auth: Arc<dyn SessionStore>,
    pub transport: Arc<dyn Transport>,
    pub config: ClientConfig,
}

/// Input from the view.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    TextChanged(String),
    Submit(Draft),
    MarkRead(String),
    OpenViewOnce(String),
    Close,
}

/// State changes pushed to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Hydrated(Vec<Message>),
    MessageAppended(Message),
    MessageReplaced { temp_id: String, message: Message },
    MessageRemoved(String),
    MessageRead(String),
    TypingChanged(TypingState),
    TypingSignalSent(TypingSignal),
    Notice(String),
    Disconnected,
    Closed,
}

/// REST report of an opened view-once message, used while offline.
pub type ViewReport = BoxFuture<'static, (String, ClientResult<()>)>;

/// A send whose frame went out and whose echo has not come back yet.
#[derive(Debug)]
struct InFlight {
    send: PendingSend,
    deadline: Instant,
}

pub struct ChatSession {
    api: Arc<dyn ApiClient>,
    user: User,
    timeline: MessageTimeline,
    debouncer: TypingDebouncer,
    remote_typing: RemoteTyping,
    link: Option<Link>,
    in_flight: Vec<InFlight>,
    send_timeout: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// Open the room: one link for the signed-in user, then a one-shot
    /// hydration. Returns `Ok(None)` when nobody is signed in. A failed
    /// connect or fetch leaves a usable session and a notice for the view.
    pub async fn activate(
        ctx: &SessionContext,
        room_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> ClientResult<Option<ChatSession>> {
        let Some(user) = ctx.auth.current_user() else {
            info!("No signed-in user, chat {} not activated", room_id);
            return Ok(None);
        };

        let link = match ctx.transport.open(&user.id).await {
            Ok(link) => Some(link),
            Err(e) => {
                error!("Failed to open real-time link for {}: {}", user.id, e);
                None
            }
        };

        let mut session = ChatSession::new(ctx.api.clone(), user, room_id, &ctx.config, link, events);
        if session.link.is_none() {
            session.notify(SessionEvent::Disconnected);
            session.notify(SessionEvent::Notice("Live updates unavailable".to_string()));
        }

        let user_id = session.user.id.clone();
        match session.timeline.hydrate(ctx.api.as_ref(), &user_id, ctx.config.hydrate_limit).await {
            Ok(messages) => {
                let messages = messages.to_vec();
                session.notify(SessionEvent::Hydrated(messages));
            }
            Err(e) => {
                warn!("Failed to load messages for room {}: {}", room_id, e);
                session.notify(SessionEvent::Notice(format!("Could not load messages: {}", e.notice())));
            }
        }

        Ok(Some(session))
    }

    pub fn new(
        api: Arc<dyn ApiClient>,
        user: User,
        room_id: &str,
        config: &ClientConfig,
        link: Option<Link>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        ChatSession {
            api,
            user,
            timeline: MessageTimeline::new(room_id),
            debouncer: TypingDebouncer::new(config.typing_window()),
            remote_typing: RemoteTyping::new(),
            link,
            in_flight: Vec::new(),
            send_timeout: config.send_timeout(),
            events,
        }
    }

    pub fn room_id(&self) -> &str {
        self.timeline.room_id()
    }

    pub fn timeline(&self) -> &MessageTimeline {
        &self.timeline
    }

    pub fn remote_typing(&self) -> &RemoteTyping {
        &self.remote_typing
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Sends waiting for their server echo.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn notify(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session observer gone, dropping event");
        }
    }

    fn send_frame(&self, frame: &ClientFrame) -> ClientResult<()> {
        match &self.link {
            Some(link) => link.send(frame),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Feed one raw inbound frame. Malformed frames are logged and dropped.
    pub fn handle_frame(&mut self, raw: &str) {
        match decode_event(raw) {
            Ok(event) => self.handle_event(event),
            Err(e) => warn!("Dropping malformed frame ({}): {}", e, raw),
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) {
        if let Some(room) = event.room_id() {
            if room != self.room_id() {
                debug!("Ignoring event for room {}", room);
                return;
            }
        }

        match event {
            ServerEvent::NewMessage(record) => {
                let message = Message::from(record);
                // The server broadcasts our own sends back to us
                if message.sender_id == self.user.id {
                    if let Some(pending) = self.take_matching_send(&message) {
                        self.finish_send(pending, Ok(message));
                        return;
                    }
                }
                let sender = message.sender_id.clone();
                if self.timeline.append(message.clone()) {
                    self.notify(SessionEvent::MessageAppended(message));
                }
                // A delivered message ends its sender's typing indicator
                let room = self.room_id().to_string();
                if let Some(state) = self.remote_typing.apply(&room, &sender, false) {
                    self.notify(SessionEvent::TypingChanged(state));
                }
            }
            ServerEvent::UserTyping { chat_room_id, user_id, .. } => {
                self.apply_remote_typing(&chat_room_id, &user_id, true);
            }
            ServerEvent::UserStoppedTyping { chat_room_id, user_id } => {
                self.apply_remote_typing(&chat_room_id, &user_id, false);
            }
            ServerEvent::MessageRead { message_id, user_id } => {
                if user_id != self.user.id && self.timeline.mark_read(&message_id) {
                    self.notify(SessionEvent::MessageRead(message_id));
                }
            }
            ServerEvent::MessageViewed { message_id, user_id } => {
                debug!("Message {} viewed by {}", message_id, user_id);
            }
            ServerEvent::MessageExpired { message_id } => {
                if self.timeline.remove(&message_id).is_some() {
                    info!("Message {} expired", message_id);
                    self.notify(SessionEvent::MessageRemoved(message_id));
                }
            }
            ServerEvent::Error { message } => {
                warn!("Server reported error: {}", message);
                self.notify(SessionEvent::Notice(message));
            }
        }
    }

    fn apply_remote_typing(&mut self, room_id: &str, user_id: &str, typing: bool) {
        // The server echoes our own signals back
        if user_id == self.user.id {
            return;
        }
        if let Some(state) = self.remote_typing.apply(room_id, user_id, typing) {
            self.notify(SessionEvent::TypingChanged(state));
        }
    }

    fn emit_signal(&self, signal: TypingSignal) {
        let chat_room_id = self.room_id().to_string();
        let frame = match signal {
            TypingSignal::Start => ClientFrame::TypingStart { chat_room_id },
            TypingSignal::Stop => ClientFrame::TypingStop { chat_room_id },
        };
        match self.send_frame(&frame) {
            Ok(()) => self.notify(SessionEvent::TypingSignalSent(signal)),
            Err(e) => debug!("Typing signal {:?} not sent: {}", signal, e),
        }
    }

    pub fn text_changed(&mut self, now: Instant) {
        if let Some(signal) = self.debouncer.on_text_changed(now) {
            self.emit_signal(signal);
        }
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn poll_typing(&mut self, now: Instant) {
        if let Some(signal) = self.debouncer.poll(now) {
            self.emit_signal(signal);
        }
    }

    /// Optimistically append `draft`. Callers confirm or roll it back
    /// through `finish_send`.
    pub fn begin_send(&mut self, draft: Draft) -> ClientResult<PendingSend> {
        validate_draft(&draft)?;
        if let Some(signal) = self.debouncer.flush() {
            self.emit_signal(signal);
        }
        let (pending, provisional) = self.timeline.begin_send(&self.user.id, draft);
        debug!("Optimistic message {} appended", pending.temp_id);
        self.notify(SessionEvent::MessageAppended(provisional));
        Ok(pending)
    }

    /// Append `draft` optimistically and push it on the link. The entry is
    /// confirmed by the server echo, or rolled back when the frame cannot go
    /// out or no echo arrives before the send timeout. Returns the temp id
    /// while the send is in flight.
    pub fn submit(&mut self, draft: Draft, now: Instant) -> Option<String> {
        let pending = match self.begin_send(draft) {
            Ok(pending) => pending,
            Err(e) => {
                self.notify(SessionEvent::Notice(e.notice()));
                return None;
            }
        };

        match self.send_frame(&ClientFrame::send_message(self.room_id(), &pending.draft)) {
            Ok(()) => {
                let temp_id = pending.temp_id.clone();
                self.in_flight.push(InFlight { send: pending, deadline: now + self.send_timeout });
                Some(temp_id)
            }
            Err(e) => {
                self.finish_send(pending, Err(e));
                None
            }
        }
    }

    /// Oldest in-flight send matching `echo`.
    fn take_matching_send(&mut self, echo: &Message) -> Option<PendingSend> {
        let index = self.in_flight.iter().position(|flight| flight.send.matches(echo))?;
        Some(self.in_flight.remove(index).send)
    }

    pub fn send_deadline(&self) -> Option<Instant> {
        self.in_flight.iter().map(|flight| flight.deadline).min()
    }

    /// Roll back every send whose echo is overdue at `now`.
    pub fn poll_sends(&mut self, now: Instant) {
        let (expired, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.in_flight).into_iter().partition(|flight| flight.deadline <= now);
        self.in_flight = waiting;
        for flight in expired {
            let reason = ClientError::Timeout("no confirmation from server".to_string());
            self.finish_send(flight.send, Err(reason));
        }
    }

    /// Commit or roll back an optimistic send. No retry on failure.
    pub fn finish_send(&mut self, pending: PendingSend, result: ClientResult<Message>) {
        match result {
            Ok(confirmed) => {
                let confirmed_id = confirmed.id.clone();
                match self.timeline.confirm(&pending.temp_id, confirmed.clone()) {
                    Confirmation::Superseded => {
                        debug!("Message {} confirmed as {}", pending.temp_id, confirmed_id);
                        self.notify(SessionEvent::MessageReplaced { temp_id: pending.temp_id, message: confirmed });
                    }
                    Confirmation::Deduplicated => {
                        self.notify(SessionEvent::MessageRemoved(pending.temp_id));
                    }
                    Confirmation::Missing => {}
                }
            }
            Err(e) => {
                warn!("Send of {} failed: {}", pending.temp_id, e);
                if self.timeline.rollback(&pending.temp_id).is_some() {
                    self.notify(SessionEvent::MessageRemoved(pending.temp_id));
                }
                self.notify(SessionEvent::Notice(format!("Message not sent: {}", e.notice())));
            }
        }
    }

    pub fn mark_read(&mut self, message_id: &str) {
        if !self.timeline.mark_read(message_id) {
            return;
        }
        self.notify(SessionEvent::MessageRead(message_id.to_string()));
        if let Err(e) = self.send_frame(&ClientFrame::MarkRead { message_id: message_id.to_string() }) {
            debug!("Read receipt for {} not sent: {}", message_id, e);
        }
    }

    /// Report a view-once message as opened. Over the link the server answers
    /// with an expiry; without one, the returned REST report must be driven
    /// and its outcome passed to `finish_view`.
    pub fn open_view_once(&mut self, message_id: &str) -> Option<ViewReport> {
        let message = self.timeline.get(message_id)?;
        if !message.view_once || message.is_optimistic() {
            return None;
        }
        match self.send_frame(&ClientFrame::MarkViewed { message_id: message_id.to_string() }) {
            Ok(()) => None,
            Err(e) => {
                debug!("View of {} not sent on the link ({}), using REST", message_id, e);
                Some(self.report_view(message_id.to_string()))
            }
        }
    }

    fn report_view(&self, message_id: String) -> ViewReport {
        let api = self.api.clone();
        let user_id = self.user.id.clone();
        async move {
            let result = api.mark_message_viewed(&user_id, &message_id).await;
            (message_id, result)
        }
        .boxed()
    }

    /// A REST view report finished. The server consumed the message, so it
    /// leaves the timeline.
    pub fn finish_view(&mut self, message_id: String, result: ClientResult<()>) {
        match result {
            Ok(()) => {
                if self.timeline.remove(&message_id).is_some() {
                    info!("View-once message {} consumed", message_id);
                    self.notify(SessionEvent::MessageRemoved(message_id));
                }
            }
            Err(e) => {
                warn!("View of {} not reported: {}", message_id, e);
                self.notify(SessionEvent::Notice(e.notice()));
            }
        }
    }

    fn clear_remote_typing(&mut self) {
        for state in self.remote_typing.clear() {
            self.notify(SessionEvent::TypingChanged(state));
        }
    }

    /// The link ended on its own. No reconnect; sends waiting for an echo are
    /// rolled back and local commands keep working.
    pub fn on_disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
            warn!("Real-time link for room {} dropped", self.room_id());
            self.clear_remote_typing();
            self.notify(SessionEvent::Disconnected);
            self.notify(SessionEvent::Notice("Connection lost".to_string()));
            for flight in std::mem::take(&mut self.in_flight) {
                self.finish_send(flight.send, Err(ClientError::ConnectionClosed));
            }
        }
    }

    /// Teardown: cancel the typing timer, forget remote typing, close the link.
    pub fn close(&mut self) {
        self.debouncer.cancel();
        self.clear_remote_typing();
        if !self.in_flight.is_empty() {
            // Frames are already out; the server persists them without us
            info!("{} sends unconfirmed at close", self.in_flight.len());
            self.in_flight.clear();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
        info!("Chat session for room {} closed", self.room_id());
        self.notify(SessionEvent::Closed);
    }

    fn handle_command(&mut self, command: SessionCommand, views: &mut FuturesUnordered<ViewReport>) {
        match command {
            SessionCommand::TextChanged(text) => {
                debug!("Draft changed ({} chars)", text.len());
                self.text_changed(Instant::now());
            }
            SessionCommand::Submit(draft) => {
                self.submit(draft, Instant::now());
            }
            SessionCommand::MarkRead(id) => self.mark_read(&id),
            SessionCommand::OpenViewOnce(id) => {
                if let Some(report) = self.open_view_once(&id) {
                    views.push(report);
                }
            }
            SessionCommand::Close => {}
        }
    }

    /// Event loop of the session. Ends on `Close` or when every command
    /// sender is dropped, then tears down.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut views: FuturesUnordered<ViewReport> = FuturesUnordered::new();

        loop {
            let typing_due = self.debouncer.deadline();
            let send_due = self.send_deadline();
            tokio::select! {
                frame = next_frame(&mut self.link) => match frame {
                    Some(raw) => self.handle_frame(&raw),
                    None => self.on_disconnect(),
                },
                command = commands.recv() => match command {
                    None | Some(SessionCommand::Close) => break,
                    Some(command) => self.handle_command(command, &mut views),
                },
                _ = sleep_until_deadline(typing_due) => self.poll_typing(Instant::now()),
                _ = sleep_until_deadline(send_due) => self.poll_sends(Instant::now()),
                Some((message_id, result)) = views.next(), if !views.is_empty() => {
                    self.finish_view(message_id, result);
                }
            }
        }

        if !views.is_empty() {
            // Reports still in flight finish detached; their outcome only reaches the log
            info!("{} view reports still in flight at close", views.len());
            tokio::spawn(async move {
                while let Some((message_id, result)) = views.next().await {
                    match result {
                        Ok(()) => debug!("Late view report of {} accepted", message_id),
                        Err(e) => warn!("Late view report of {} failed: {}", message_id, e),
                    }
                }
            });
        }

        self.close();
    }

    /// Run on its own task; returns the command sender and the task handle.
    pub fn spawn(self) -> (mpsc::Sender<SessionCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }
}

fn validate_draft(draft: &Draft) -> ClientResult<()> {
    match draft.kind {
        MessageKind::Text => {
            if draft.content.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(ClientError::InvalidState("empty message".to_string()));
            }
        }
        MessageKind::Image | MessageKind::Video => {
            if draft.media_url.as_deref().map_or(true, str::is_empty) {
                return Err(ClientError::InvalidState("media message without media".to_string()));
            }
        }
    }
    Ok(())
}

async fn next_frame(link: &mut Option<Link>) -> Option<String> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}
