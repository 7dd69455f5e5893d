// Typing indicators: local debounce of start/stop signals, and the last
// known flag of each remote participant

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::TypingState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Debounces local keystrokes into start/stop signals. A start goes out on
/// the first keystroke; the stop goes out once `window` passes with no
/// further keystroke. Only one stop deadline is pending at a time.
#[derive(Debug)]
pub struct TypingDebouncer {
    window: Duration,
    typing: bool,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(window: Duration) -> Self {
        TypingDebouncer { window, typing: false, deadline: None }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// When the pending stop signal is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_text_changed(&mut self, now: Instant) -> Option<TypingSignal> {
        self.deadline = Some(now + self.window);
        if self.typing {
            None
        } else {
            self.typing = true;
            Some(TypingSignal::Start)
        }
    }

    /// Fires the stop signal once the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(due) if now >= due => {
                self.deadline = None;
                if self.typing {
                    self.typing = false;
                    Some(TypingSignal::Stop)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Stop right away, e.g. when the draft is submitted.
    pub fn flush(&mut self) -> Option<TypingSignal> {
        self.deadline = None;
        if self.typing {
            self.typing = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// Drop the pending deadline without signalling.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Cancelled pending typing stop");
        }
        self.typing = false;
    }
}

/// Last write wins per (room, participant).
#[derive(Debug, Default)]
pub struct RemoteTyping {
    states: HashMap<(String, String), bool>,
}

impl RemoteTyping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new state if it differs from the stored one.
    pub fn apply(&mut self, room_id: &str, participant_id: &str, typing: bool) -> Option<TypingState> {
        let key = (room_id.to_string(), participant_id.to_string());
        let previous = if typing {
            self.states.insert(key, true)
        } else {
            self.states.remove(&key)
        };
        let changed = previous.unwrap_or(false) != typing;
        changed.then(|| TypingState {
            room_id: room_id.to_string(),
            participant_id: participant_id.to_string(),
            typing,
        })
    }

    pub fn is_typing(&self, room_id: &str, participant_id: &str) -> bool {
        self.states
            .get(&(room_id.to_string(), participant_id.to_string()))
            .copied()
            .unwrap_or(false)
    }

    /// Participants currently typing in `room_id`, sorted for stable display.
    pub fn typing_in(&self, room_id: &str) -> Vec<String> {
        let mut participants: Vec<String> = self
            .states
            .iter()
            .filter(|((room, _), typing)| room == room_id && **typing)
            .map(|((_, participant), _)| participant.clone())
            .collect();
        participants.sort();
        participants
    }

    /// Forget everything; returns the entries that were typing.
    pub fn clear(&mut self) -> Vec<TypingState> {
        self.states
            .drain()
            .filter(|(_, typing)| *typing)
            .map(|((room_id, participant_id), _)| TypingState { room_id, participant_id, typing: false })
            .collect()
    }
}
