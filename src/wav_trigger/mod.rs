//! WAV Trigger Serial Driver
//!
//! Drives the polyphonic WAV Trigger playback module over a 57.6k serial
//! link. Outbound commands are fire-and-forget frames; the only way to learn
//! what the module is actually doing is the stream of track reports it sends
//! back, which [`WavTrigger::update`] drains without blocking and folds into
//! a per-voice "what is playing" table.
//!
//! # Example
//!
//! ```
//! use rpu_audio::sim::ScriptedSerial;
//! use rpu_audio::WavTrigger;
//!
//! let mut wav = WavTrigger::new(ScriptedSerial::new());
//! wav.start();
//! wav.track_play_poly(12, true);
//!
//! // Module reports track 12 (sent 0-based as 11) started on voice 0.
//! wav.link_mut().inject(&[0xF0, 0xAA, 0x09, 0x84, 0x0B, 0x00, 0x00, 0x01, 0x55]);
//! assert!(wav.is_track_playing(12));
//! assert_eq!(wav.playing_track(0), Some(12));
//! ```

pub mod events;
pub mod protocol;

use heapless::Deque;
use tracing::{debug, info};

use crate::hardware::SerialLink;
pub use events::{DeviceEvent, VERSION_STRING_LEN};
pub use protocol::{Command, Frame, FrameReceiver, RxState, TrackOp};

/// Hardware voice slots tracked in the voice table
pub const MAX_NUM_VOICES: usize = 14;
/// Decoded events retained until the owner drains them
pub const EVENT_QUEUE_LEN: usize = 16;
/// Serial line rate expected by the module
pub const BAUD_RATE: u32 = 57_600;

/// WAV Trigger driver bound to one serial link
#[derive(Debug)]
pub struct WavTrigger<S> {
    link: S,
    receiver: FrameReceiver,
    voice_table: [Option<u16>; MAX_NUM_VOICES],
    events: Deque<DeviceEvent, EVENT_QUEUE_LEN>,
    version: Option<[u8; VERSION_STRING_LEN]>,
    num_voices: Option<u8>,
    num_tracks: Option<u16>,
}

impl<S: SerialLink> WavTrigger<S> {
    /// Wrap a serial link; nothing is sent until [`start`](Self::start)
    pub fn new(link: S) -> Self {
        WavTrigger {
            link,
            receiver: FrameReceiver::new(),
            voice_table: [None; MAX_NUM_VOICES],
            events: Deque::new(),
            version: None,
            num_voices: None,
            num_tracks: None,
        }
    }

    /// Reset the receiver and ask the module for its version and system info
    pub fn start(&mut self) {
        self.version = None;
        self.num_voices = None;
        self.num_tracks = None;
        self.flush();
        self.send(Command::GetVersion);
        self.send(Command::GetSysInfo);
    }

    /// Discard pending input, any partial frame and the voice table
    pub fn flush(&mut self) {
        self.receiver.reset();
        self.voice_table = [None; MAX_NUM_VOICES];
        self.events.clear();
        while self.link.read_byte().is_some() {}
    }

    /// Drain every byte currently available; returns the number of events decoded
    pub fn update(&mut self) -> usize {
        let mut decoded = 0;
        while let Some(byte) = self.link.read_byte() {
            let Some(frame) = self.receiver.push_byte(byte) else {
                continue;
            };
            if let Some(event) = DeviceEvent::decode(&frame) {
                self.apply(event);
                decoded += 1;
            }
        }
        decoded
    }

    fn apply(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::TrackStarted { track, voice } => {
                if let Some(slot) = self.voice_table.get_mut(voice as usize) {
                    *slot = Some(track);
                }
            }
            DeviceEvent::TrackStopped { track, voice } => {
                // Only clear if the slot still holds this track; a newer start
                // on the same voice may already have replaced it.
                if let Some(slot) = self.voice_table.get_mut(voice as usize) {
                    if *slot == Some(track) {
                        *slot = None;
                    }
                }
            }
            DeviceEvent::Version(version) => {
                info!(
                    version = %String::from_utf8_lossy(&version).trim_end_matches(&['\0', ' '][..]),
                    "WAV Trigger version"
                );
                self.version = Some(version);
            }
            DeviceEvent::SystemInfo { voices, tracks } => {
                info!(voices, tracks, "WAV Trigger system info");
                self.num_voices = Some(voices);
                self.num_tracks = Some(tracks);
            }
        }

        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    /// Take the oldest undrained event
    pub fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.events.pop_front()
    }

    /// Is `track` sounding on any voice (drains input first)
    pub fn is_track_playing(&mut self, track: u16) -> bool {
        self.update();
        self.voice_table.iter().any(|slot| *slot == Some(track))
    }

    /// Track on `voice`, or `None` if the voice is idle or out of range (drains input first)
    pub fn playing_track(&mut self, voice: usize) -> Option<u16> {
        self.update();
        self.voice_table.get(voice).copied().flatten()
    }

    /// Last known voice table
    pub fn voice_table(&self) -> &[Option<u16>; MAX_NUM_VOICES] {
        &self.voice_table
    }

    /// Version string, once received
    pub fn version(&mut self) -> Option<&str> {
        self.update();
        let raw = self.version.as_ref()?;
        let text = std::str::from_utf8(raw).ok()?;
        Some(text.trim_end_matches(&['\0', ' '][..]))
    }

    /// Number of tracks on the module's card, once system info arrived
    pub fn num_tracks(&mut self) -> Option<u16> {
        self.update();
        self.num_tracks
    }

    /// Number of voices reported by the module, once system info arrived
    pub fn num_voices(&mut self) -> Option<u8> {
        self.update();
        self.num_voices
    }

    /// Receiver state, mainly for diagnostics
    pub fn rx_state(&self) -> RxState {
        self.receiver.state()
    }

    /// Underlying link
    pub fn link(&self) -> &S {
        &self.link
    }

    /// Underlying link (mutable)
    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    /// Encode and transmit one command
    pub fn send(&mut self, command: Command) {
        debug!(?command, "WAV Trigger command");
        let frame = command.encode();
        self.link.write_all(&frame);
    }

    fn track_control(&mut self, op: TrackOp, track: u16, lock: Option<bool>) {
        let command = match lock {
            Some(lock) => Command::TrackControlEx { op, track, lock },
            None => Command::TrackControl { op, track },
        };
        self.send(command);
    }

    /// Play a track, stopping all others
    pub fn track_play_solo(&mut self, track: u16, lock: bool) {
        self.track_control(TrackOp::PlaySolo, track, Some(lock));
    }

    /// Play a track on a free voice
    pub fn track_play_poly(&mut self, track: u16, lock: bool) {
        self.track_control(TrackOp::PlayPoly, track, Some(lock));
    }

    /// Load a track paused, for a later [`resume_all_in_sync`](Self::resume_all_in_sync)
    pub fn track_load(&mut self, track: u16, lock: bool) {
        self.track_control(TrackOp::Load, track, Some(lock));
    }

    /// Stop a track
    pub fn track_stop(&mut self, track: u16) {
        self.track_control(TrackOp::Stop, track, None);
    }

    /// Pause a track
    pub fn track_pause(&mut self, track: u16) {
        self.track_control(TrackOp::Pause, track, None);
    }

    /// Resume a paused track
    pub fn track_resume(&mut self, track: u16) {
        self.track_control(TrackOp::Resume, track, None);
    }

    /// Turn looping on or off for a track
    pub fn track_loop(&mut self, track: u16, enable: bool) {
        let op = if enable {
            TrackOp::LoopOn
        } else {
            TrackOp::LoopOff
        };
        self.track_control(op, track, None);
    }

    /// Set a track's gain in dB
    pub fn track_gain(&mut self, track: u16, gain: i16) {
        self.send(Command::TrackGain { track, gain });
    }

    /// Fade a track to `gain` over `millis`, optionally stopping it at the end
    pub fn track_fade(&mut self, track: u16, gain: i16, millis: u16, stop: bool) {
        self.send(Command::TrackFade {
            track,
            gain,
            millis,
            stop,
        });
    }

    /// Set the master gain in dB
    pub fn master_gain(&mut self, gain: i16) {
        self.send(Command::MasterGain(gain));
    }

    /// Offset the playback sample rate
    pub fn samplerate_offset(&mut self, offset: i16) {
        self.send(Command::SamplerateOffset(offset));
    }

    /// Select the trigger bank
    pub fn set_trigger_bank(&mut self, bank: u8) {
        self.send(Command::SetTriggerBank(bank));
    }

    /// Stop every track
    pub fn stop_all_tracks(&mut self) {
        self.send(Command::StopAll);
    }

    /// Resume every loaded or paused track in sample sync
    pub fn resume_all_in_sync(&mut self) {
        self.send(Command::ResumeAllInSync);
    }

    /// Enable or disable unsolicited track reports
    pub fn set_reporting(&mut self, enable: bool) {
        self.send(Command::SetReporting(enable));
    }

    /// Switch the on-board amplifier
    pub fn set_amp_power(&mut self, enable: bool) {
        self.send(Command::SetAmpPower(enable));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedSerial;

    fn report(track: u16, voice: u8, playing: bool) -> [u8; 9] {
        let raw = (track - 1).to_le_bytes();
        [0xF0, 0xAA, 0x09, 0x84, raw[0], raw[1], voice, playing as u8, 0x55]
    }

    #[test]
    fn test_start_sends_queries() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        wav.start();
        assert_eq!(
            wav.link().written(),
            &[0xF0, 0xAA, 0x05, 0x01, 0x55, 0xF0, 0xAA, 0x05, 0x02, 0x55]
        );
    }

    #[test]
    fn test_flush_discards_pending_input() {
        let mut serial = ScriptedSerial::new();
        serial.inject(&report(5, 1, true));
        let mut wav = WavTrigger::new(serial);
        wav.flush();
        assert!(!wav.is_track_playing(5));
    }

    #[test]
    fn test_stale_stop_does_not_clear_newer_track() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        wav.link_mut().inject(&report(5, 1, true));
        wav.link_mut().inject(&report(9, 1, true));
        wav.link_mut().inject(&report(5, 1, false));
        assert_eq!(wav.playing_track(1), Some(9));

        wav.link_mut().inject(&report(9, 1, false));
        assert_eq!(wav.playing_track(1), None);
    }

    #[test]
    fn test_out_of_range_voice_ignored() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        wav.link_mut().inject(&report(5, MAX_NUM_VOICES as u8, true));
        assert_eq!(wav.update(), 1);
        assert!(wav.voice_table().iter().all(Option::is_none));
        assert_eq!(wav.playing_track(MAX_NUM_VOICES), None);
    }

    #[test]
    fn test_system_info_and_version() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        assert_eq!(wav.num_tracks(), None);

        wav.link_mut()
            .inject(&[0xF0, 0xAA, 0x08, 0x82, 0x0E, 0x2C, 0x01, 0x55]);
        let mut version = std::vec![0xF0, 0xAA, 25, 0x81];
        version.extend_from_slice(b"WAV Trigger v1.34\0\0\0");
        version.push(0x55);
        wav.link_mut().inject(&version);

        assert_eq!(wav.num_tracks(), Some(300));
        assert_eq!(wav.num_voices(), Some(14));
        assert_eq!(wav.version(), Some("WAV Trigger v1.34"));
    }

    #[test]
    fn test_events_are_queued_in_order() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        wav.link_mut().inject(&report(3, 0, true));
        wav.link_mut().inject(&report(3, 0, false));
        assert_eq!(wav.update(), 2);
        assert_eq!(
            wav.poll_event(),
            Some(DeviceEvent::TrackStarted { track: 3, voice: 0 })
        );
        assert_eq!(
            wav.poll_event(),
            Some(DeviceEvent::TrackStopped { track: 3, voice: 0 })
        );
        assert_eq!(wav.poll_event(), None);
    }

    #[test]
    fn test_event_queue_drops_oldest_on_overflow() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        for track in 1..=(EVENT_QUEUE_LEN as u16 + 2) {
            wav.link_mut().inject(&report(track, 0, true));
        }
        wav.update();
        assert_eq!(
            wav.poll_event(),
            Some(DeviceEvent::TrackStarted { track: 3, voice: 0 })
        );
    }

    #[test]
    fn test_unlocked_stop_uses_plain_track_control() {
        let mut wav = WavTrigger::new(ScriptedSerial::new());
        wav.track_stop(0x0105);
        assert_eq!(
            wav.link().written(),
            &[0xF0, 0xAA, 0x08, 0x03, 0x04, 0x05, 0x01, 0x55]
        );
    }
}
