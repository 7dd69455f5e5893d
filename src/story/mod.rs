//! Story playback state machine.
//!
//! `StoryPlayer` is a synchronous transition function: every operation moves
//! the state and queues `PlayerEvent`s, which the caller drains. The async
//! driver lives in [`viewer`].

use log::debug;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::models::{MediaKind, StoryItem};

pub mod viewer;

pub use viewer::{StoryViewer, ViewerCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Playing,
    Paused,
    Advancing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapZone {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Entered `Playing` for this item.
    Viewed { index: usize, story_id: String },
    IndexChanged(usize),
    Paused,
    Resumed,
    LikeChanged { story_id: String, liked: bool },
    Notice(String),
    Closed,
}

/// Snapshot published to the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoryPlaybackState {
    pub index: usize,
    pub progress: f32,
    pub paused: bool,
    pub closed: bool,
}

#[derive(Debug)]
pub struct StoryPlayer {
    items: Vec<StoryItem>,
    index: usize,
    progress: f32,
    elapsed: Duration,
    phase: PlaybackPhase,
    item_duration: Duration,
    dismiss_threshold: f32,
    outbox: Vec<PlayerEvent>,
}

impl StoryPlayer {
    /// Starts `Playing` at `start`. Rejects an empty sequence or an
    /// out-of-range index.
    pub fn new(items: Vec<StoryItem>, start: usize, item_duration: Duration, dismiss_threshold: f32) -> ClientResult<Self> {
        if items.is_empty() {
            return Err(ClientError::InvalidState("no stories to play".to_string()));
        }
        if start >= items.len() {
            return Err(ClientError::InvalidState(format!(
                "start index {} out of range for {} stories",
                start,
                items.len()
            )));
        }
        if item_duration.is_zero() {
            return Err(ClientError::InvalidState("story duration must be positive".to_string()));
        }

        let mut player = StoryPlayer {
            items,
            index: start,
            progress: 0.0,
            elapsed: Duration::ZERO,
            phase: PlaybackPhase::Playing,
            item_duration,
            dismiss_threshold,
            outbox: Vec::new(),
        };
        player.announce_view();
        Ok(player)
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_closed(&self) -> bool {
        self.phase == PlaybackPhase::Closed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current(&self) -> &StoryItem {
        &self.items[self.index]
    }

    pub fn state(&self) -> StoryPlaybackState {
        StoryPlaybackState {
            index: self.index,
            progress: self.progress,
            paused: self.phase == PlaybackPhase::Paused,
            closed: self.is_closed(),
        }
    }

    /// Events queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn announce_view(&mut self) {
        let story_id = self.items[self.index].id.clone();
        self.outbox.push(PlayerEvent::Viewed { index: self.index, story_id });
    }

    fn enter(&mut self, index: usize) {
        self.index = index;
        self.progress = 0.0;
        self.elapsed = Duration::ZERO;
        self.phase = PlaybackPhase::Playing;
        self.outbox.push(PlayerEvent::IndexChanged(index));
        self.announce_view();
    }

    /// Wall-clock time for static items; ignored for videos and unless playing.
    pub fn tick(&mut self, dt: Duration) {
        if self.phase != PlaybackPhase::Playing || self.current().media_kind != MediaKind::Image {
            return;
        }
        self.elapsed += dt;
        self.progress = (self.elapsed.as_secs_f32() / self.item_duration.as_secs_f32()).min(1.0);
        if self.elapsed >= self.item_duration {
            self.advance();
        }
    }

    /// Media position callback for videos; completion advances.
    pub fn media_progress(&mut self, position: Duration, total: Duration) {
        if self.phase != PlaybackPhase::Playing || self.current().media_kind != MediaKind::Video {
            return;
        }
        if total.is_zero() {
            debug!("Ignoring media progress with unknown duration");
            return;
        }
        self.progress = (position.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0);
        if position >= total {
            self.advance();
        }
    }

    /// Next item, or close after the last one.
    pub fn advance(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = PlaybackPhase::Advancing;
        if self.index + 1 < self.items.len() {
            self.enter(self.index + 1);
        } else {
            self.close();
        }
    }

    /// Long press: freeze progress.
    pub fn hold(&mut self) {
        if matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::Advancing) {
            self.phase = PlaybackPhase::Paused;
            self.outbox.push(PlayerEvent::Paused);
        }
    }

    /// Release: back to `Playing`. A static item restarts its full duration
    /// window; a video continues from the player's position.
    pub fn release(&mut self) {
        if self.phase != PlaybackPhase::Paused {
            return;
        }
        if self.current().media_kind == MediaKind::Image {
            self.elapsed = Duration::ZERO;
            self.progress = 0.0;
        }
        self.phase = PlaybackPhase::Playing;
        self.outbox.push(PlayerEvent::Resumed);
    }

    pub fn tap(&mut self, zone: TapZone) {
        if self.is_closed() {
            return;
        }
        match zone {
            TapZone::Left if self.index > 0 => self.enter(self.index - 1),
            TapZone::Left => {}
            TapZone::Right => self.advance(),
        }
    }

    /// End of a vertical drag with displacement `dy`. Past the threshold the
    /// viewer is dismissed; otherwise it snaps back untouched.
    pub fn drag(&mut self, dy: f32) {
        if self.is_closed() {
            return;
        }
        if dy.abs() > self.dismiss_threshold {
            debug!("Dismissed by drag of {:.0}px", dy);
            self.close();
        }
    }

    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = PlaybackPhase::Closed;
        self.outbox.push(PlayerEvent::Closed);
    }

    /// Record a like toggle on the item with `story_id`.
    pub fn set_liked(&mut self, story_id: &str, liked: bool) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == story_id) {
            if item.liked != liked {
                item.liked = liked;
                self.outbox.push(PlayerEvent::LikeChanged { story_id: story_id.to_string(), liked });
            }
        }
    }
}
