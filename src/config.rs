//! Audio configuration
//!
//! Which backends exist on a machine, plus the operator volume adjustments.
//! Loaded once at startup (usually from JSON) and handed to the dispatcher.

use serde::{Deserialize, Serialize};

use crate::volume::{AudioType, Mix, MAX_VOLUME_SETTING, SILENT_GAIN};
use crate::{AudioError, Result};

/// Startup configuration for [`AudioDispatcher`](crate::AudioDispatcher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Backends fitted to this machine
    pub backends: AudioType,
    /// Effect volume setting (0-10)
    pub sound_fx_volume: u8,
    /// Voice notification volume setting (0-10)
    pub notifications_volume: u8,
    /// Background music volume setting (0-10)
    pub music_volume: u8,
    /// dB taken off the music while a notification speaks
    pub music_ducking: i16,
    /// dB taken off effects while a notification speaks
    pub sound_fx_ducking: i16,
    /// Fade time for music coming back after a notification, in ms
    pub duck_restore_fade_ms: u16,
    /// Ask the WAV Trigger for track reports
    pub reporting: bool,
    /// Power the WAV Trigger's on-board amplifier
    pub amp_power: bool,
    /// Play a short tone on the sound card at init
    pub sound_card_startup_beep: bool,
    /// Seed for soundtrack shuffling
    pub shuffle_seed: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let mix = Mix::default();
        Self {
            backends: AudioType::WAV_TRIGGER,
            sound_fx_volume: mix.sound_fx_volume,
            notifications_volume: mix.notifications_volume,
            music_volume: mix.music_volume,
            music_ducking: mix.music_ducking,
            sound_fx_ducking: mix.sound_fx_ducking,
            duck_restore_fade_ms: 500,
            reporting: true,
            amp_power: false,
            sound_card_startup_beep: false,
            shuffle_seed: 0,
        }
    }
}

impl AudioConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AudioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(AudioError::ConfigError("no audio backends enabled".into()));
        }
        for (name, value) in [
            ("sound_fx_volume", self.sound_fx_volume),
            ("notifications_volume", self.notifications_volume),
            ("music_volume", self.music_volume),
        ] {
            if value > MAX_VOLUME_SETTING {
                return Err(AudioError::ConfigError(format!(
                    "{name} {value} out of range 0..={MAX_VOLUME_SETTING}"
                )));
            }
        }
        let max_ducking = -SILENT_GAIN;
        for (name, value) in [
            ("music_ducking", self.music_ducking),
            ("sound_fx_ducking", self.sound_fx_ducking),
        ] {
            if !(0..=max_ducking).contains(&value) {
                return Err(AudioError::ConfigError(format!(
                    "{name} {value} dB out of range 0..={max_ducking}"
                )));
            }
        }
        Ok(())
    }

    /// Initial mix state
    pub fn mix(&self) -> Mix {
        let mut mix = Mix::default();
        mix.sound_fx_volume = self.sound_fx_volume;
        mix.notifications_volume = self.notifications_volume;
        mix.music_volume = self.music_volume;
        mix.music_ducking = self.music_ducking;
        mix.sound_fx_ducking = self.sound_fx_ducking;
        mix
    }

    /// Set the fitted backends
    pub fn backends(mut self, backends: AudioType) -> Self {
        self.backends = backends;
        self
    }

    /// Set the music volume setting
    pub fn music_volume(mut self, setting: u8) -> Self {
        self.music_volume = setting;
        self
    }

    /// Set the effect volume setting
    pub fn sound_fx_volume(mut self, setting: u8) -> Self {
        self.sound_fx_volume = setting;
        self
    }

    /// Set the notification volume setting
    pub fn notifications_volume(mut self, setting: u8) -> Self {
        self.notifications_volume = setting;
        self
    }

    /// Set music and effect ducking in dB
    pub fn ducking(mut self, music_db: i16, sound_fx_db: i16) -> Self {
        self.music_ducking = music_db;
        self.sound_fx_ducking = sound_fx_db;
        self
    }

    /// Set the shuffle seed
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AudioConfig::from_json(
            r#"{ "backends": "WAV_TRIGGER | ORIGINAL_SOUNDS", "music_volume": 6 }"#,
        )
        .unwrap();
        assert_eq!(
            config.backends,
            AudioType::WAV_TRIGGER | AudioType::ORIGINAL_SOUNDS
        );
        assert_eq!(config.music_volume, 6);
        assert_eq!(config.duck_restore_fade_ms, 500);
        assert!(config.reporting);
    }

    #[test]
    fn test_json_round_trip() {
        let config = AudioConfig::default()
            .backends(AudioType::all())
            .ducking(20, 6)
            .shuffle_seed(99);
        let json = config.to_json().unwrap();
        assert_eq!(AudioConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(matches!(
            AudioConfig::default().backends(AudioType::empty()).validate(),
            Err(AudioError::ConfigError(_))
        ));
        assert!(AudioConfig::default().music_volume(11).validate().is_err());
        assert!(AudioConfig::default().ducking(-1, 0).validate().is_err());
        assert!(AudioConfig::default().ducking(0, 71).validate().is_err());
        assert!(AudioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            AudioConfig::from_json("{ not json"),
            Err(AudioError::Json(_))
        ));
    }

    #[test]
    fn test_mix_carries_settings() {
        let mix = AudioConfig::default().music_volume(3).ducking(10, 4).mix();
        assert_eq!(mix.music_volume, 3);
        assert_eq!(mix.sound_fx_ducking, 4);
        assert!(!mix.is_ducked());
    }
}
