//! Voice Notification Stack
//!
//! Voice callouts are kept in a small stack ordered by priority: the top is
//! always the highest-priority pending line, and among equal priorities the
//! most recently pushed one. Only one line speaks at a time. It speaks for
//! its declared duration and is never interrupted by anything on the stack;
//! when it ends, the next service call promotes the new top.

use heapless::Vec;
use tracing::debug;

use crate::{AudioError, Result, Ticks};

/// Depth of the notification stack
pub const VOICE_NOTIFICATION_STACK_SIZE: usize = 5;

/// A pending voice line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationEntry {
    /// Track number of the voice line
    pub notification: u16,
    /// How long the line speaks, in ticks
    pub duration: Ticks,
    /// Higher numbers are more important
    pub priority: u8,
}

/// The line currently speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakingNotification {
    /// The line
    pub entry: NotificationEntry,
    /// Tick at which it started
    pub started_at: Ticks,
}

impl SpeakingNotification {
    /// Tick at which the line is finished
    pub fn ends_at(&self) -> Ticks {
        self.started_at.saturating_add(self.entry.duration)
    }
}

/// What changed during one service call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationTransition {
    /// Line whose duration ran out
    pub finished: Option<NotificationEntry>,
    /// Line promoted from the stack
    pub started: Option<NotificationEntry>,
}

/// Bounded priority stack of voice notifications
#[derive(Debug, Clone, Default)]
pub struct NotificationStack<const N: usize = VOICE_NOTIFICATION_STACK_SIZE> {
    /// Bottom (lowest priority) first, top last
    stack: Vec<NotificationEntry, N>,
    speaking: Option<SpeakingNotification>,
}

impl<const N: usize> NotificationStack<N> {
    /// Create an empty stack
    pub fn new() -> Self {
        NotificationStack {
            stack: Vec::new(),
            speaking: None,
        }
    }

    /// Push a line above every pending line of lower or equal priority
    ///
    /// A full stack makes room by dropping its lowest-priority entry, but only
    /// for a strictly more important line; otherwise the push is rejected.
    pub fn push(&mut self, notification: u16, duration: Ticks, priority: u8) -> Result<()> {
        let entry = NotificationEntry {
            notification,
            duration,
            priority,
        };

        if self.stack.is_full() {
            match self.stack.first() {
                Some(bottom) if bottom.priority < priority => {
                    let dropped = self.stack.remove(0);
                    debug!(
                        dropped = dropped.notification,
                        "notification stack full, dropping lowest priority"
                    );
                }
                _ => return Err(AudioError::NotificationRejected { priority }),
            }
        }

        let at = self
            .stack
            .iter()
            .position(|e| e.priority > priority)
            .unwrap_or(self.stack.len());
        self.stack
            .insert(at, entry)
            .map_err(|_| AudioError::NotificationRejected { priority })
    }

    /// Pop the top entry without playing it
    pub fn pop(&mut self) -> Option<NotificationEntry> {
        self.stack.pop()
    }

    /// Expire the speaking line if its time is up, then promote the top entry
    pub fn service(&mut self, now: Ticks) -> NotificationTransition {
        let mut transition = NotificationTransition::default();

        if let Some(speaking) = self.speaking {
            if now >= speaking.ends_at() {
                transition.finished = Some(speaking.entry);
                self.speaking = None;
            }
        }

        if self.speaking.is_none() {
            if let Some(entry) = self.stack.pop() {
                self.speaking = Some(SpeakingNotification {
                    entry,
                    started_at: now,
                });
                transition.started = Some(entry);
            }
        }

        transition
    }

    /// Stop the speaking line if its priority is at or below `priority`
    pub fn stop_current(&mut self, priority: u8) -> Option<NotificationEntry> {
        match self.speaking {
            Some(s) if s.entry.priority <= priority => {
                self.speaking = None;
                Some(s.entry)
            }
            _ => None,
        }
    }

    /// Stop the speaking line and drop pending lines at or below `priority`
    pub fn stop_all(&mut self, priority: u8) -> Option<NotificationEntry> {
        self.clear_pending(priority);
        self.stop_current(priority)
    }

    /// Drop pending lines at or below `priority`, leaving the speaking line alone
    pub fn clear_pending(&mut self, priority: u8) {
        self.stack.retain(|e| e.priority > priority);
    }

    /// Line currently speaking
    pub fn speaking(&self) -> Option<&SpeakingNotification> {
        self.speaking.as_ref()
    }

    /// True while a line is speaking
    pub fn is_speaking(&self) -> bool {
        self.speaking.is_some()
    }

    /// Priority of the top pending entry
    pub fn top_priority(&self) -> Option<u8> {
        self.stack.last().map(|e| e.priority)
    }

    /// Free slots on the stack
    pub fn space_left(&self) -> usize {
        N - self.stack.len()
    }

    /// Pending entries, bottom first
    pub fn pending(&self) -> &[NotificationEntry] {
        &self.stack
    }
}
