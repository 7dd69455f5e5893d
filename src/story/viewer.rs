// Async driver of a StoryPlayer: interval ticks, gesture commands, and the
// fire-and-forget API calls its events imply

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::{PlayerEvent, StoryPlaybackState, StoryPlayer, TapZone};
use crate::api::ApiClient;
use crate::error::ClientResult;
use crate::models::LikeStatus;

const COMMAND_BUFFER: usize = 32;
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerCommand {
    Tap(TapZone),
    Hold,
    Release,
    /// Vertical displacement at the end of a drag, in pixels.
    Drag(f32),
    MediaProgress { position: Duration, total: Duration },
    ToggleLike,
    Close,
}

type LikeFuture = BoxFuture<'static, (String, bool, ClientResult<LikeStatus>)>;

pub struct StoryViewer {
    player: StoryPlayer,
    api: Arc<dyn ApiClient>,
    viewer_id: String,
    tick: Duration,
    events: mpsc::UnboundedSender<PlayerEvent>,
    state: watch::Sender<StoryPlaybackState>,
    reports: JoinSet<()>,
}

impl StoryViewer {
    pub fn new(
        player: StoryPlayer,
        api: Arc<dyn ApiClient>,
        viewer_id: impl Into<String>,
        tick: Duration,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> (Self, watch::Receiver<StoryPlaybackState>) {
        if tick < MIN_TICK {
            warn!("Story tick {:?} too short, using {:?}", tick, MIN_TICK);
        }
        let (state, state_rx) = watch::channel(player.state());
        let viewer = StoryViewer {
            player,
            api,
            viewer_id: viewer_id.into(),
            tick: tick.max(MIN_TICK),
            events,
            state,
            reports: JoinSet::new(),
        };
        (viewer, state_rx)
    }

    /// Forward queued player events, firing the API calls they imply.
    fn dispatch(&mut self) {
        for event in self.player.drain_events() {
            if let PlayerEvent::Viewed { story_id, .. } = &event {
                self.report_view(story_id.clone());
            }
            if self.events.send(event).is_err() {
                debug!("Story observer gone, dropping event");
            }
        }
        self.state.send_replace(self.player.state());
    }

    fn report_view(&mut self, story_id: String) {
        let api = self.api.clone();
        let viewer_id = self.viewer_id.clone();
        self.reports.spawn(async move {
            match api.mark_story_viewed(&story_id, &viewer_id).await {
                Ok(()) => debug!("Story {} marked viewed", story_id),
                Err(e) => warn!("Failed to mark story {} viewed: {}", story_id, e),
            }
        });
    }

    /// Flip the like flag right away and confirm with the API.
    fn toggle_like(&mut self) -> LikeFuture {
        let story_id = self.player.current().id.clone();
        let liked = !self.player.current().liked;
        self.player.set_liked(&story_id, liked);

        let api = self.api.clone();
        let viewer_id = self.viewer_id.clone();
        async move {
            let result = if liked {
                api.like_story(&story_id, &viewer_id).await
            } else {
                api.unlike_story(&story_id, &viewer_id).await
            };
            (story_id, liked, result)
        }
        .boxed()
    }

    fn finish_like(&mut self, story_id: String, liked: bool, result: ClientResult<LikeStatus>) {
        match result {
            Ok(status) if status.is_liked != liked => self.player.set_liked(&story_id, status.is_liked),
            Ok(_) => {}
            Err(e) => {
                warn!("Like toggle on {} failed: {}", story_id, e);
                self.player.set_liked(&story_id, !liked);
                if self.events.send(PlayerEvent::Notice(e.notice())).is_err() {
                    debug!("Story observer gone, dropping notice");
                }
            }
        }
    }

    fn handle_command(&mut self, command: ViewerCommand, likes: &mut FuturesUnordered<LikeFuture>) {
        match command {
            ViewerCommand::Tap(zone) => self.player.tap(zone),
            ViewerCommand::Hold => self.player.hold(),
            ViewerCommand::Release => self.player.release(),
            ViewerCommand::Drag(dy) => self.player.drag(dy),
            ViewerCommand::MediaProgress { position, total } => self.player.media_progress(position, total),
            ViewerCommand::ToggleLike => likes.push(self.toggle_like()),
            ViewerCommand::Close => self.player.close(),
        }
    }

    /// Runs until the player closes or every command sender is dropped, then
    /// waits for like toggles and view reports still in flight. The tick
    /// interval lives in this future, so dropping it cancels the timer.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ViewerCommand>) -> StoryPlaybackState {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut last_tick = Instant::now();
        let mut likes: FuturesUnordered<LikeFuture> = FuturesUnordered::new();

        self.dispatch();

        while !self.player.is_closed() {
            tokio::select! {
                now = ticker.tick() => {
                    self.player.tick(now - last_tick);
                    last_tick = now;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut likes),
                    None => {
                        debug!("Story commands closed");
                        self.player.close();
                    }
                },
                Some((story_id, liked, result)) = likes.next(), if !likes.is_empty() => {
                    self.finish_like(story_id, liked, result);
                }
            }
            self.dispatch();
        }

        info!("Story viewer closed at index {}", self.player.index());
        if !likes.is_empty() {
            debug!("Waiting for {} like toggles", likes.len());
        }
        while let Some((story_id, liked, result)) = likes.next().await {
            match result {
                Ok(status) => debug!("Like of {} settled after close: {}", story_id, status.is_liked),
                Err(e) => warn!("Like toggle ({}) on {} failed after close: {}", liked, story_id, e),
            }
        }
        while let Some(joined) = self.reports.join_next().await {
            if let Err(e) = joined {
                warn!("View report task failed: {}", e);
            }
        }
        self.player.state()
    }

    pub fn spawn(self) -> (mpsc::Sender<ViewerCommand>, JoinHandle<StoryPlaybackState>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }
}
