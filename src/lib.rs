//! Pinball Audio Arbitration
//!
//! Tick-driven audio engine for pinball control boards. Game logic asks for
//! sounds, music and voice callouts; the engine decides what actually plays on
//! hardware that cannot play everything at once.
//!
//! # Features
//! - WAV Trigger serial driver with a self-resynchronizing frame receiver and
//!   a per-voice table of what is playing
//! - Fixed-capacity timed queues for sounds and sound-card register writes
//! - Priority arbitration for the single-voice original sound card
//! - Voice notification stack with music and effect ducking
//! - Background soundtrack rotation, in order or shuffled without repeats
//! - No heap allocation in the engine; every container has a fixed capacity
//!
//! # Crate feature flags
//! - `cli` (opt-in): `rpu-audio-sim`, a host simulator that replays a session
//!   against in-memory hardware and prints what was sent
//!
//! # Quick start
//! ```
//! use rpu_audio::sim::{RecordingBoard, ScriptedSerial};
//! use rpu_audio::{AudioConfig, AudioDispatcher, AudioType, SoundtrackEntry};
//!
//! let config = AudioConfig::default().backends(AudioType::WAV_TRIGGER | AudioType::ORIGINAL_SOUNDS);
//! let mut audio = AudioDispatcher::new(config, ScriptedSerial::new(), RecordingBoard::new())?;
//! audio.init_devices(0);
//!
//! let playlist = [SoundtrackEntry::new(500, 90_000), SoundtrackEntry::new(501, 75_000)];
//! audio.play_background_soundtrack(&playlist, 0, true)?;
//! audio.play_sound_card_when_possible(12, 0, 0, 50, 10)?;
//!
//! for now in 1..=100 {
//!     audio.update(now);
//! }
//! assert_eq!(audio.board().map(|b| b.effects_played()), Some(vec![12]));
//! # Ok::<(), rpu_audio::AudioError>(())
//! ```

#![warn(missing_docs)]

pub mod config; // Startup configuration
pub mod dispatcher; // Top-level coordinator
pub mod effects; // Single-voice effect arbitration
pub mod hardware; // Hardware seams
pub mod notification; // Voice callouts
pub mod queue; // Timed command queues
pub mod sim; // In-memory hardware doubles
pub mod soundtrack; // Background music rotation
pub mod volume; // Backends and gain curves
pub mod wav_trigger; // Serial playback module

/// Time in ticks (milliseconds on the target), always supplied by the caller
pub type Ticks = u64;

/// Error types for audio requests
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// A fixed-capacity queue had no room; nothing was changed
    #[error("{queue} queue full ({capacity} entries)")]
    QueueFull {
        /// Which queue
        queue: &'static str,
        /// Its capacity
        capacity: usize,
    },

    /// The notification stack is full of lines at least as important
    #[error("notification stack full, priority {priority} rejected")]
    NotificationRejected {
        /// Priority of the rejected line
        priority: u8,
    },

    /// None of the requested backends is configured
    #[error("no configured backend for {0:?}")]
    BackendUnavailable(volume::AudioType),

    /// Soundtrack with no songs
    #[error("soundtrack playlist is empty")]
    EmptyPlaylist,

    /// Soundtrack longer than the scheduler can hold
    #[error("soundtrack playlist has {len} entries, at most {max} supported")]
    PlaylistTooLong {
        /// Entries supplied
        len: usize,
        /// Entries supported
        max: usize,
    },

    /// Soundtrack entry with zero length
    #[error("soundtrack track {0} has zero length")]
    ZeroLengthTrack(u16),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Configuration JSON could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

// Public API exports
pub use config::AudioConfig;
pub use dispatcher::AudioDispatcher;
pub use effects::{EffectCandidate, EffectSlotArbiter};
pub use hardware::{SerialLink, SoundBoard, SoundCardFunction};
pub use notification::{NotificationEntry, NotificationStack};
pub use queue::{SoundCardCommand, SoundEntry, TimedCommandQueue};
pub use soundtrack::{PlayOrder, SongChange, SoundtrackEntry, SoundtrackScheduler};
pub use volume::{AudioType, Backend, Mix};
pub use wav_trigger::{DeviceEvent, WavTrigger};
