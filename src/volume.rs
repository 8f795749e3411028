//! Backend Selection and Volume Model
//!
//! Requests name their target backends with an [`AudioType`] mask. Each
//! backend has its own gain units, so a 0-10 volume setting is converted per
//! backend: decibels for the WAV Trigger, a 4-bit attenuation for the sound
//! card, and plain on/off for the chime chip.
//!
//! [`Mix`] holds the three subsystem volume settings and the ducking amounts
//! applied to music and effects while a voice notification speaks.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Backends a request is routed to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AudioType: u8 {
        /// Chime chip on the legacy sound interface
        const CHIMES = 0x01;
        /// Original sound card (single voice plus raw register access)
        const ORIGINAL_SOUNDS = 0x02;
        /// Polyphonic WAV Trigger on the serial port
        const WAV_TRIGGER = 0x04;
    }
}

/// One concrete playback backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Chime chip
    Chimes,
    /// Original sound card
    SoundCard,
    /// WAV Trigger
    WavTrigger,
}

impl Backend {
    /// Every backend, in routing order
    pub const ALL: [Backend; 3] = [Backend::Chimes, Backend::SoundCard, Backend::WavTrigger];

    /// Mask bit selecting this backend
    pub const fn flag(self) -> AudioType {
        match self {
            Backend::Chimes => AudioType::CHIMES,
            Backend::SoundCard => AudioType::ORIGINAL_SOUNDS,
            Backend::WavTrigger => AudioType::WAV_TRIGGER,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Chimes => write!(f, "chimes"),
            Backend::SoundCard => write!(f, "sound card"),
            Backend::WavTrigger => write!(f, "WAV Trigger"),
        }
    }
}

impl AudioType {
    /// Backends selected by this mask, in routing order
    pub fn backends(self) -> impl Iterator<Item = Backend> {
        Backend::ALL.into_iter().filter(move |b| self.contains(b.flag()))
    }
}

impl From<Backend> for AudioType {
    fn from(backend: Backend) -> Self {
        backend.flag()
    }
}

/// Highest volume setting; anything above plays at full volume
pub const MAX_VOLUME_SETTING: u8 = 10;
/// Wire sentinel for "use the subsystem default volume"
pub const USE_DEFAULT_VOLUME: u8 = 0xFF;

/// WAV Trigger gain that counts as silent
pub const SILENT_GAIN: i16 = -70;
/// Loudest WAV Trigger gain the engine issues
pub const MAX_GAIN: i16 = 0;
/// Sound-card attenuation that counts as silent
pub const SILENT_ATTENUATION: u8 = 15;

const WAV_TRIGGER_GAIN_CURVE: [i16; 11] = [-70, -18, -16, -14, -11, -9, -7, -5, -3, -2, 0];
const SOUND_CARD_ATTENUATION: [u8; 11] = [15, 12, 10, 9, 7, 6, 5, 3, 2, 1, 0];

/// Map a caller-supplied override to `Option`, treating `0xFF` as "default"
pub fn volume_override(raw: u8) -> Option<u8> {
    (raw != USE_DEFAULT_VOLUME).then_some(raw)
}

/// WAV Trigger gain in dB for a volume setting
pub fn wav_trigger_gain(setting: u8) -> i16 {
    WAV_TRIGGER_GAIN_CURVE[setting.min(MAX_VOLUME_SETTING) as usize]
}

/// Sound-card attenuation (0 loudest, 15 silent) for a volume setting
pub fn sound_card_attenuation(setting: u8) -> u8 {
    SOUND_CARD_ATTENUATION[setting.min(MAX_VOLUME_SETTING) as usize]
}

/// Gain expressed in a backend's own units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    /// Chime on or off
    Chime(bool),
    /// 4-bit sound-card attenuation
    Attenuation(u8),
    /// WAV Trigger gain in dB
    Decibels(i16),
}

impl Gain {
    /// True when playing at this gain would be inaudible
    pub fn is_silent(self) -> bool {
        match self {
            Gain::Chime(on) => !on,
            Gain::Attenuation(a) => a >= SILENT_ATTENUATION,
            Gain::Decibels(db) => db <= SILENT_GAIN,
        }
    }
}

/// Convert a 0-10 volume setting into the backend's gain units
pub fn convert_volume_setting_to_gain(backend: Backend, setting: u8) -> Gain {
    match backend {
        Backend::Chimes => Gain::Chime(setting > 0),
        Backend::SoundCard => Gain::Attenuation(sound_card_attenuation(setting)),
        Backend::WavTrigger => Gain::Decibels(wav_trigger_gain(setting)),
    }
}

/// Change in ducking state reported by [`Mix::set_ducked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuckingEdge {
    /// A notification started; music and effects go down
    Engaged,
    /// The last notification ended; music and effects come back
    Released,
}

/// Subsystem volumes and ducking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mix {
    /// Volume setting for sound effects
    pub sound_fx_volume: u8,
    /// Volume setting for voice notifications
    pub notifications_volume: u8,
    /// Volume setting for background music
    pub music_volume: u8,
    /// dB taken off the music while ducked
    pub music_ducking: i16,
    /// dB taken off effects while ducked
    pub sound_fx_ducking: i16,
    ducked: bool,
}

impl Default for Mix {
    fn default() -> Self {
        Mix {
            sound_fx_volume: MAX_VOLUME_SETTING,
            notifications_volume: MAX_VOLUME_SETTING,
            music_volume: MAX_VOLUME_SETTING,
            music_ducking: 12,
            sound_fx_ducking: 12,
            ducked: false,
        }
    }
}

impl Mix {
    /// Nominal music gain
    pub fn music_gain(&self) -> i16 {
        wav_trigger_gain(self.music_volume)
    }

    /// Nominal effect gain
    pub fn fx_gain(&self) -> i16 {
        wav_trigger_gain(self.sound_fx_volume)
    }

    /// Notification gain; notifications are never ducked
    pub fn notification_gain(&self) -> i16 {
        wav_trigger_gain(self.notifications_volume)
    }

    /// Music gain while ducked
    pub fn ducked_music_gain(&self) -> i16 {
        duck(self.music_gain(), self.music_ducking)
    }

    /// Effect gain while ducked
    pub fn ducked_fx_gain(&self) -> i16 {
        duck(self.fx_gain(), self.sound_fx_ducking)
    }

    /// Music gain right now
    pub fn effective_music_gain(&self) -> i16 {
        if self.ducked {
            self.ducked_music_gain()
        } else {
            self.music_gain()
        }
    }

    /// Effect gain right now, for effects started on this tick
    pub fn effective_fx_gain(&self) -> i16 {
        if self.ducked {
            self.ducked_fx_gain()
        } else {
            self.fx_gain()
        }
    }

    /// True while a notification holds the mix down
    pub fn is_ducked(&self) -> bool {
        self.ducked
    }

    /// Record whether a notification is speaking; reports only transitions
    pub fn set_ducked(&mut self, ducked: bool) -> Option<DuckingEdge> {
        if self.ducked == ducked {
            return None;
        }
        self.ducked = ducked;
        Some(if ducked {
            DuckingEdge::Engaged
        } else {
            DuckingEdge::Released
        })
    }
}

/// Take `amount` dB off `gain`, never going below silence
pub fn duck(gain: i16, amount: i16) -> i16 {
    if gain <= SILENT_GAIN {
        return SILENT_GAIN;
    }
    gain.saturating_sub(amount.max(0)).max(SILENT_GAIN)
}
