//! Background Soundtrack Rotation
//!
//! Walks a playlist of songs with known lengths, either in order or
//! shuffled, and tells the owner when to switch songs. The scheduler never
//! talks to hardware itself: every transition comes back as a [`SongChange`]
//! that the dispatcher turns into stop/gain/play commands.
//!
//! When shuffling, recently played tracks are skipped. The number of songs
//! remembered shrinks to half the playlist length on short playlists, so a
//! two-song playlist alternates instead of starving.

use heapless::{Deque, Vec};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AudioError, Result, Ticks};

/// Most entries a playlist may hold
pub const MAX_SOUNDTRACK_ENTRIES: usize = 64;
/// Songs remembered to avoid immediate repeats when shuffling
pub const NUMBER_OF_SONGS_REMEMBERED: usize = 10;

/// One song in a soundtrack playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundtrackEntry {
    /// Track number on the playback module
    pub track: u16,
    /// Song length in ticks
    pub length: Ticks,
}

impl SoundtrackEntry {
    /// Convenience constructor
    pub const fn new(track: u16, length: Ticks) -> Self {
        SoundtrackEntry { track, length }
    }
}

/// Order in which a playlist is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayOrder {
    /// Playlist order, wrapping at the end
    #[default]
    Sequential,
    /// Uniform draw among songs not recently played
    Random,
}

/// What the scheduler is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// Nothing playing
    #[default]
    Idle,
    /// Rotating through the installed playlist
    Playlist {
        /// Playlist position of the current song
        position: usize,
        /// Track number of the current song
        track: u16,
        /// Tick the song started
        started_at: Ticks,
        /// Tick the next song is due
        ends_at: Ticks,
    },
    /// One explicitly requested song, outside any rotation
    Single {
        /// Track number
        track: u16,
        /// Whether the module loops it
        looping: bool,
    },
}

/// A song transition for the owner to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongChange {
    /// Track that was playing before, to be stopped
    pub previous: Option<u16>,
    /// Song to start
    pub next: SoundtrackEntry,
    /// Tick the following transition is due
    pub ends_at: Ticks,
}

/// Background music state machine
#[derive(Debug, Clone)]
pub struct SoundtrackScheduler<const H: usize = NUMBER_OF_SONGS_REMEMBERED> {
    playlist: Vec<SoundtrackEntry, MAX_SOUNDTRACK_ENTRIES>,
    order: PlayOrder,
    state: SchedulerState,
    history: Deque<u16, H>,
    rng: Pcg32,
}

impl<const H: usize> SoundtrackScheduler<H> {
    /// Create an idle scheduler; `seed` drives the shuffle
    pub fn new(seed: u64) -> Self {
        SoundtrackScheduler {
            playlist: Vec::new(),
            order: PlayOrder::Sequential,
            state: SchedulerState::Idle,
            history: Deque::new(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Install a playlist and start its first (or a shuffled) song
    pub fn play_soundtrack(
        &mut self,
        playlist: &[SoundtrackEntry],
        now: Ticks,
        order: PlayOrder,
    ) -> Result<SongChange> {
        if playlist.is_empty() {
            return Err(AudioError::EmptyPlaylist);
        }
        if let Some(bad) = playlist.iter().find(|e| e.length == 0) {
            return Err(AudioError::ZeroLengthTrack(bad.track));
        }
        let installed = Vec::from_slice(playlist).map_err(|_| AudioError::PlaylistTooLong {
            len: playlist.len(),
            max: MAX_SOUNDTRACK_ENTRIES,
        })?;

        let previous = self.current_track();
        self.playlist = installed;
        self.order = order;
        self.state = SchedulerState::Idle;

        let mut change = self.start_next(now).ok_or(AudioError::EmptyPlaylist)?;
        change.previous = previous;
        Ok(change)
    }

    /// Pick the next song and start timing it
    pub fn start_next(&mut self, now: Ticks) -> Option<SongChange> {
        if self.playlist.is_empty() {
            return None;
        }

        let previous = self.current_track();
        let position = match self.order {
            PlayOrder::Sequential => match self.state {
                SchedulerState::Playlist { position, .. } => (position + 1) % self.playlist.len(),
                _ => 0,
            },
            PlayOrder::Random => self.draw_random(),
        };

        let next = self.playlist[position];
        let ends_at = now.saturating_add(next.length);
        self.remember(next.track);
        self.state = SchedulerState::Playlist {
            position,
            track: next.track,
            started_at: now,
            ends_at,
        };
        debug!(track = next.track, ends_at, "soundtrack song started");

        Some(SongChange {
            previous,
            next,
            ends_at,
        })
    }

    /// Per-tick check; starts the next song once the current one has ended
    pub fn manage(&mut self, now: Ticks) -> Option<SongChange> {
        match self.state {
            SchedulerState::Playlist { ends_at, .. } if now >= ends_at => self.start_next(now),
            _ => None,
        }
    }

    /// Replace any rotation with one explicitly requested song; returns the track it replaces
    pub fn play_single(&mut self, track: u16, looping: bool) -> Option<u16> {
        let previous = self.current_track();
        self.playlist.clear();
        self.state = SchedulerState::Single { track, looping };
        previous
    }

    /// Stop background music; returns the track that was playing
    pub fn stop(&mut self) -> Option<u16> {
        let previous = self.current_track();
        self.playlist.clear();
        self.state = SchedulerState::Idle;
        previous
    }

    /// Track currently playing in the background
    pub fn current_track(&self) -> Option<u16> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::Playlist { track, .. } | SchedulerState::Single { track, .. } => {
                Some(track)
            }
        }
    }

    /// Scheduler state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Ticks the current playlist song has been playing
    pub fn elapsed(&self, now: Ticks) -> Option<Ticks> {
        match self.state {
            SchedulerState::Playlist { started_at, .. } => Some(now.saturating_sub(started_at)),
            _ => None,
        }
    }

    /// Ticks until the current playlist song ends
    pub fn remaining(&self, now: Ticks) -> Option<Ticks> {
        match self.state {
            SchedulerState::Playlist { ends_at, .. } => Some(ends_at.saturating_sub(now)),
            _ => None,
        }
    }

    /// Recently played tracks, oldest first
    pub fn history(&self) -> impl Iterator<Item = &u16> {
        self.history.iter()
    }

    fn remember(&mut self, track: u16) {
        if H == 0 {
            return;
        }
        if self.history.is_full() {
            self.history.pop_front();
        }
        let _ = self.history.push_back(track);
    }

    fn draw_random(&mut self) -> usize {
        let len = self.playlist.len();
        let window = H.min(len / 2);
        let skip = self.history.len().saturating_sub(window);
        let recent = || self.history.iter().skip(skip);

        let fresh = |entry: &SoundtrackEntry| !recent().any(|t| *t == entry.track);
        let candidates = self.playlist.iter().filter(|e| fresh(*e)).count();

        if candidates == 0 {
            return self.rng.random_range(0..len);
        }
        let pick = self.rng.random_range(0..candidates);
        self.playlist
            .iter()
            .enumerate()
            .filter(|(_, e)| fresh(*e))
            .nth(pick)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl<const H: usize> Default for SoundtrackScheduler<H> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SONGS: [SoundtrackEntry; 2] =
        [SoundtrackEntry::new(3, 100), SoundtrackEntry::new(7, 50)];

    #[test]
    fn test_sequential_rotation() {
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(1);
        let change = sched
            .play_soundtrack(&TWO_SONGS, 0, PlayOrder::Sequential)
            .unwrap();
        assert_eq!(change.next.track, 3);
        assert_eq!(change.ends_at, 100);
        assert_eq!(change.previous, None);

        assert_eq!(sched.manage(99), None);
        let change = sched.manage(100).unwrap();
        assert_eq!(change.previous, Some(3));
        assert_eq!(change.next.track, 7);
        assert_eq!(change.ends_at, 150);

        let change = sched.manage(150).unwrap();
        assert_eq!(change.next.track, 3);
    }

    #[test]
    fn test_elapsed_and_remaining() {
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(1);
        sched
            .play_soundtrack(&TWO_SONGS, 10, PlayOrder::Sequential)
            .unwrap();
        assert_eq!(sched.elapsed(40), Some(30));
        assert_eq!(sched.remaining(40), Some(70));
    }

    #[test]
    fn test_shuffle_avoids_recent_repeats() {
        let playlist: std::vec::Vec<SoundtrackEntry> =
            (1..=8).map(|t| SoundtrackEntry::new(t, 10)).collect();
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(42);
        let first = sched
            .play_soundtrack(&playlist, 0, PlayOrder::Random)
            .unwrap();

        let mut played = std::vec![first.next.track];
        let mut now = 0;
        for _ in 0..40 {
            now += 10;
            played.push(sched.manage(now).unwrap().next.track);
        }
        // Window is min(10, 8 / 2) = 4 songs.
        for w in played.windows(5) {
            let last = w[4];
            assert!(!w[..4].contains(&last), "repeat inside window: {w:?}");
        }
    }

    #[test]
    fn test_two_song_shuffle_alternates() {
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(7);
        let mut track = sched
            .play_soundtrack(&TWO_SONGS, 0, PlayOrder::Random)
            .unwrap()
            .next
            .track;
        let mut now = 0;
        for _ in 0..10 {
            now += 100;
            let next = sched.start_next(now).unwrap().next.track;
            assert_ne!(next, track);
            track = next;
        }
    }

    #[test]
    fn test_single_song_has_no_transition() {
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(1);
        sched
            .play_soundtrack(&TWO_SONGS, 0, PlayOrder::Sequential)
            .unwrap();
        assert_eq!(sched.play_single(20, true), Some(3));
        assert_eq!(sched.manage(10_000), None);
        assert_eq!(sched.current_track(), Some(20));
        assert_eq!(sched.stop(), Some(20));
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_invalid_playlists_rejected() {
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(1);
        assert!(matches!(
            sched.play_soundtrack(&[], 0, PlayOrder::Sequential),
            Err(AudioError::EmptyPlaylist)
        ));
        assert!(matches!(
            sched.play_soundtrack(&[SoundtrackEntry::new(4, 0)], 0, PlayOrder::Sequential),
            Err(AudioError::ZeroLengthTrack(4))
        ));
        let long = [SoundtrackEntry::new(1, 1); MAX_SOUNDTRACK_ENTRIES + 1];
        assert!(matches!(
            sched.play_soundtrack(&long, 0, PlayOrder::Sequential),
            Err(AudioError::PlaylistTooLong { .. })
        ));
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_history_is_bounded() {
        let playlist: std::vec::Vec<SoundtrackEntry> =
            (1..=30).map(|t| SoundtrackEntry::new(t, 1)).collect();
        let mut sched: SoundtrackScheduler = SoundtrackScheduler::new(3);
        sched
            .play_soundtrack(&playlist, 0, PlayOrder::Sequential)
            .unwrap();
        for now in 1..25 {
            sched.manage(now);
        }
        assert_eq!(sched.history().count(), NUMBER_OF_SONGS_REMEMBERED);
        assert_eq!(sched.history().last(), Some(&25));
    }
}
