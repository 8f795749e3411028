//! Single-Voice Effect Arbitration
//!
//! The original sound card can only make one sound at a time, so effect
//! requests compete for it. Each request carries a priority (0 = least
//! important, 100 = most) and a window `[requested_play_time, play_until]`
//! during which it may still start. A request that misses its window is
//! dropped: a late sound effect is worse than none.
//!
//! The effect that wins the channel keeps it until its own `play_until`
//! passes or it is stopped explicitly; nothing preempts it.

use heapless::Vec;
use tracing::{debug, trace};

use crate::{AudioError, Result, Ticks};

/// Capacity of the effect candidate queue
pub const SOUND_EFFECT_QUEUE_SIZE: usize = 50;
/// Highest meaningful effect priority
pub const MAX_EFFECT_PRIORITY: u8 = 100;

/// A pending (or playing) effect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectCandidate {
    /// Effect number on the sound card
    pub effect: u16,
    /// Earliest time the effect may start
    pub requested_play_time: Ticks,
    /// Latest time the effect may start; also bounds how long it holds the channel
    pub play_until: Ticks,
    /// 0 (least important) to 100 (most)
    pub priority: u8,
}

impl EffectCandidate {
    fn expired(&self, now: Ticks) -> bool {
        now > self.play_until
    }

    fn eligible(&self, now: Ticks) -> bool {
        self.requested_play_time <= now && now <= self.play_until
    }
}

/// Arbiter for the exclusive legacy sound channel
#[derive(Debug, Clone, Default)]
pub struct EffectSlotArbiter<const N: usize = SOUND_EFFECT_QUEUE_SIZE> {
    queue: Vec<EffectCandidate, N>,
    current: Option<EffectCandidate>,
}

impl<const N: usize> EffectSlotArbiter<N> {
    /// Create an idle arbiter
    pub fn new() -> Self {
        EffectSlotArbiter {
            queue: Vec::new(),
            current: None,
        }
    }

    /// Queue an effect request
    ///
    /// When the queue is full an already-expired entry is overwritten (the
    /// lowest-priority one if several have expired); if none has expired the
    /// request is rejected and the queue is left untouched.
    pub fn enqueue(
        &mut self,
        effect: u16,
        now: Ticks,
        requested_play_time: Ticks,
        play_until: Ticks,
        priority: u8,
    ) -> Result<()> {
        let candidate = EffectCandidate {
            effect,
            requested_play_time,
            play_until,
            priority: priority.min(MAX_EFFECT_PRIORITY),
        };

        if let Err(candidate) = self.queue.push(candidate) {
            let victim = self
                .queue
                .iter()
                .enumerate()
                .filter(|(_, c)| c.expired(now))
                .min_by_key(|(_, c)| c.priority)
                .map(|(i, _)| i);

            let Some(victim) = victim else {
                return Err(AudioError::QueueFull {
                    queue: "sound effect",
                    capacity: N,
                });
            };
            trace!(evicted = ?self.queue[victim], "overwriting expired effect request");
            self.queue[victim] = candidate;
        }
        Ok(())
    }

    /// Advance one tick; returns the effect that just took the channel, if any
    pub fn service(&mut self, now: Ticks) -> Option<EffectCandidate> {
        if self.current.is_some_and(|c| c.expired(now)) {
            self.current = None;
        }

        self.queue.retain(|c| {
            let keep = !c.expired(now);
            if !keep {
                trace!(effect = c.effect, "effect window missed, dropping");
            }
            keep
        });

        if self.current.is_some() {
            return None;
        }

        // max_by_key keeps the last maximum, so walk in reverse to prefer the
        // earliest-queued entry among exact ties.
        let (index, _) = self
            .queue
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, c)| c.eligible(now))
            .max_by_key(|(_, c)| (c.priority, std::cmp::Reverse(c.requested_play_time)))?;

        let winner = self.queue.remove(index);
        debug!(
            effect = winner.effect,
            priority = winner.priority,
            "effect takes sound card"
        );
        self.current = Some(winner);
        Some(winner)
    }

    /// Effect currently holding the channel
    pub fn current(&self) -> Option<&EffectCandidate> {
        self.current.as_ref()
    }

    /// Release the channel immediately
    pub fn stop_current(&mut self) -> Option<EffectCandidate> {
        self.current.take()
    }

    /// Drop pending requests matching `predicate`; returns how many went
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&EffectCandidate) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|c| !predicate(c));
        before - self.queue.len()
    }

    /// Drop every pending request and release the channel
    pub fn clear(&mut self) {
        self.queue.clear();
        self.current = None;
    }

    /// Pending requests
    pub fn pending(&self) -> &[EffectCandidate] {
        &self.queue
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_window_is_dropped_silently() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(42, 0, 5, 15, 10).unwrap();
        assert_eq!(arb.service(20), None);
        assert!(arb.is_empty());
        assert!(arb.current().is_none());
    }

    #[test]
    fn test_not_yet_due_waits() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(42, 0, 5, 15, 10).unwrap();
        assert_eq!(arb.service(4), None);
        assert_eq!(arb.len(), 1);
        assert_eq!(arb.service(5).map(|c| c.effect), Some(42));
    }

    #[test]
    fn test_highest_priority_wins_then_earliest_request() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 100, 10).unwrap();
        arb.enqueue(2, 0, 2, 100, 50).unwrap();
        arb.enqueue(3, 0, 1, 100, 50).unwrap();
        assert_eq!(arb.service(5).map(|c| c.effect), Some(3));
    }

    #[test]
    fn test_exact_tie_prefers_first_queued() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(7, 0, 0, 100, 10).unwrap();
        arb.enqueue(8, 0, 0, 100, 10).unwrap();
        assert_eq!(arb.service(0).map(|c| c.effect), Some(7));
    }

    #[test]
    fn test_playing_slot_not_preempted_until_expiry() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 10, 5).unwrap();
        assert_eq!(arb.service(0).map(|c| c.effect), Some(1));

        arb.enqueue(2, 0, 0, 50, 100).unwrap();
        for now in 1..=10 {
            assert_eq!(arb.service(now), None);
            assert_eq!(arb.current().map(|c| c.effect), Some(1));
        }
        assert_eq!(arb.service(11).map(|c| c.effect), Some(2));
    }

    #[test]
    fn test_stop_current_frees_channel() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 100, 5).unwrap();
        arb.enqueue(2, 0, 0, 100, 5).unwrap();
        arb.service(0);
        assert_eq!(arb.stop_current().map(|c| c.effect), Some(1));
        assert_eq!(arb.service(1).map(|c| c.effect), Some(2));
    }

    #[test]
    fn test_full_queue_overwrites_expired_entry() {
        let mut arb: EffectSlotArbiter<2> = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 5, 90).unwrap();
        arb.enqueue(2, 0, 0, 50, 10).unwrap();

        arb.enqueue(3, 10, 10, 60, 20).unwrap();
        let effects: std::vec::Vec<u16> = arb.pending().iter().map(|c| c.effect).collect();
        assert_eq!(effects, [3, 2]);
    }

    #[test]
    fn test_full_queue_without_expired_rejects() {
        let mut arb: EffectSlotArbiter<2> = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 50, 1).unwrap();
        arb.enqueue(2, 0, 0, 50, 1).unwrap();

        assert!(matches!(
            arb.enqueue(3, 10, 10, 60, 100),
            Err(AudioError::QueueFull { capacity: 2, .. })
        ));
        let effects: std::vec::Vec<u16> = arb.pending().iter().map(|c| c.effect).collect();
        assert_eq!(effects, [1, 2]);
    }

    #[test]
    fn test_cancel_where_leaves_other_requests() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(12, 0, 10, 60, 10).unwrap();
        arb.enqueue(13, 0, 10, 60, 5).unwrap();
        arb.enqueue(12, 0, 20, 60, 10).unwrap();

        assert_eq!(arb.cancel_where(|c| c.effect == 12), 2);
        assert_eq!(arb.service(20).map(|c| c.effect), Some(13));
    }

    #[test]
    fn test_priority_clamped() {
        let mut arb: EffectSlotArbiter = EffectSlotArbiter::new();
        arb.enqueue(1, 0, 0, 10, 250).unwrap();
        assert_eq!(arb.pending()[0].priority, MAX_EFFECT_PRIORITY);
    }
}
