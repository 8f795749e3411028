//! Time-Triggered Command Queues
//!
//! Fixed-capacity FIFO of `(command, fire time)` pairs. Each tick the owner
//! pops every entry whose fire time has arrived, in the order they were
//! queued; entries that share a fire time therefore fire in enqueue order.
//!
//! Two instantiations live in the dispatcher: timed sound requests
//! ([`SoundEntry`]) and raw sound-card register writes ([`SoundCardCommand`]).

use heapless::Vec;

use crate::hardware::SoundCardFunction;
use crate::volume::AudioType;
use crate::{AudioError, Result, Ticks};

/// Capacity of the timed sound queue
pub const SOUND_QUEUE_SIZE: usize = 30;
/// Capacity of the sound-card register command queue
pub const SOUND_CARD_QUEUE_SIZE: usize = 100;

/// A sound to play later on one or more backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundEntry {
    /// Sound/track number in the targeted backend's catalog
    pub sound: u16,
    /// Backends to play it on
    pub audio_type: AudioType,
    /// Volume setting overriding the subsystem default
    pub override_volume: Option<u8>,
}

/// One register write for the sound card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundCardCommand {
    /// Function selector
    pub function: SoundCardFunction,
    /// Register number
    pub register: u8,
    /// Data byte
    pub data: u8,
}

#[derive(Debug, Clone, Copy)]
struct Timed<T> {
    command: T,
    fire_time: Ticks,
}

/// Bounded FIFO of commands waiting for their fire time
#[derive(Debug, Clone)]
pub struct TimedCommandQueue<T, const N: usize> {
    name: &'static str,
    entries: Vec<Timed<T>, N>,
}

impl<T: Copy, const N: usize> TimedCommandQueue<T, N> {
    /// Create an empty queue; `name` identifies it in errors and logs
    pub fn new(name: &'static str) -> Self {
        TimedCommandQueue {
            name,
            entries: Vec::new(),
        }
    }

    /// Append a command, failing without side effects when full
    pub fn enqueue(&mut self, command: T, fire_time: Ticks) -> Result<()> {
        self.entries
            .push(Timed { command, fire_time })
            .map_err(|_| AudioError::QueueFull {
                queue: self.name,
                capacity: N,
            })
    }

    /// Remove and return the oldest entry whose fire time is `<= now`
    pub fn pop_due(&mut self, now: Ticks) -> Option<T> {
        let index = self.entries.iter().position(|e| e.fire_time <= now)?;
        Some(self.entries.remove(index).command)
    }

    /// Fire every due entry in queue order; returns how many fired
    pub fn service(&mut self, now: Ticks, mut fire: impl FnMut(T)) -> usize {
        let mut fired = 0;
        while let Some(command) = self.pop_due(now) {
            fire(command);
            fired += 1;
        }
        fired
    }

    /// Drop every entry matching `predicate` without firing it
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !predicate(&e.command));
        before - self.entries.len()
    }

    /// Discard all pending entries without firing them
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no further entry fits
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Pending entries with their fire times, in queue order
    pub fn iter(&self) -> impl Iterator<Item = (&T, Ticks)> {
        self.entries.iter().map(|e| (&e.command, e.fire_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_due_entries_in_enqueue_order() {
        let mut q: TimedCommandQueue<u8, 8> = TimedCommandQueue::new("test");
        q.enqueue(1, 10).unwrap();
        q.enqueue(2, 5).unwrap();
        q.enqueue(3, 10).unwrap();
        q.enqueue(4, 20).unwrap();

        let mut fired = std::vec::Vec::new();
        assert_eq!(q.service(10, |c| fired.push(c)), 3);
        assert_eq!(fired, [1, 2, 3]);
        assert_eq!(q.len(), 1);

        assert_eq!(q.service(19, |c| fired.push(c)), 0);
        assert_eq!(q.service(20, |c| fired.push(c)), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_rejects_without_mutation() {
        let mut q: TimedCommandQueue<u8, 2> = TimedCommandQueue::new("tiny");
        q.enqueue(1, 1).unwrap();
        q.enqueue(2, 2).unwrap();

        let err = q.enqueue(3, 0).unwrap_err();
        assert!(matches!(
            err,
            AudioError::QueueFull {
                queue: "tiny",
                capacity: 2
            }
        ));
        let pending: std::vec::Vec<_> = q.iter().map(|(c, t)| (*c, t)).collect();
        assert_eq!(pending, [(1, 1), (2, 2)]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut q: TimedCommandQueue<u8, 4> = TimedCommandQueue::new("test");
        q.enqueue(1, 100).unwrap();
        q.clear();
        assert!(q.is_empty());
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pop_due(u64::MAX), None);
    }

    #[test]
    fn test_cancel_where_keeps_order() {
        let mut q: TimedCommandQueue<u8, 4> = TimedCommandQueue::new("test");
        for c in [1, 2, 1, 3] {
            q.enqueue(c, 0).unwrap();
        }
        assert_eq!(q.cancel_where(|c| *c == 1), 2);
        assert_eq!(q.pop_due(0), Some(2));
        assert_eq!(q.pop_due(0), Some(3));
    }

    #[test]
    fn test_default_capacities() {
        let q: TimedCommandQueue<SoundCardCommand, SOUND_CARD_QUEUE_SIZE> =
            TimedCommandQueue::new("sound card");
        assert_eq!(q.capacity(), 100);
    }
}
