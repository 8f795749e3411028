//! WAV Trigger Wire Protocol
//!
//! Every frame on the wire has the same envelope:
//!
//! ```text
//! [SOM1=0xF0] [SOM2=0xAA] [LEN] [PAYLOAD ...] [EOM=0x55]
//! ```
//!
//! `LEN` counts the whole frame, markers included, so a frame with a single
//! payload byte has `LEN = 5`. Multi-byte fields are little-endian.

use heapless::Vec;
use tracing::trace;

/// First start-of-message marker
pub const SOM1: u8 = 0xF0;
/// Second start-of-message marker
pub const SOM2: u8 = 0xAA;
/// End-of-message marker
pub const EOM: u8 = 0x55;

/// Largest frame the module sends or accepts
pub const MAX_MESSAGE_LEN: usize = 32;
/// Smallest accepted frame: markers, length, one payload byte, end marker
pub const MIN_MESSAGE_LEN: usize = 5;
/// Envelope bytes surrounding the payload (SOM1, SOM2, LEN, EOM)
pub const FRAME_OVERHEAD: usize = 4;
/// Largest payload carried by one frame
pub const MAX_PAYLOAD_LEN: usize = MAX_MESSAGE_LEN - FRAME_OVERHEAD;
/// Longest outbound frame (`TRACK_FADE`)
pub const MAX_COMMAND_LEN: usize = 12;

/// Command codes (payload byte 0 of outbound frames)
pub mod cmd {
    /// Request the firmware version string
    pub const GET_VERSION: u8 = 1;
    /// Request voice and track counts
    pub const GET_SYS_INFO: u8 = 2;
    /// Track control (play/stop/loop ...)
    pub const TRACK_CONTROL: u8 = 3;
    /// Stop every track
    pub const STOP_ALL: u8 = 4;
    /// Master output gain
    pub const MASTER_VOLUME: u8 = 5;
    /// Per-track gain
    pub const TRACK_VOLUME: u8 = 8;
    /// On-board amplifier power
    pub const AMP_POWER: u8 = 9;
    /// Per-track gain fade
    pub const TRACK_FADE: u8 = 10;
    /// Resume all paused tracks sample-synchronously
    pub const RESUME_ALL_SYNC: u8 = 11;
    /// Playback sample-rate offset
    pub const SAMPLERATE_OFFSET: u8 = 12;
    /// Track control with voice lock flag
    pub const TRACK_CONTROL_EX: u8 = 13;
    /// Enable/disable unsolicited track reports
    pub const SET_REPORTING: u8 = 14;
    /// Select the trigger bank for the hardware inputs
    pub const SET_TRIGGER_BANK: u8 = 15;
}

/// Track-control sub-codes
pub mod trk {
    /// Play, stopping everything else
    pub const PLAY_SOLO: u8 = 0;
    /// Play on a free voice alongside other tracks
    pub const PLAY_POLY: u8 = 1;
    /// Pause
    pub const PAUSE: u8 = 2;
    /// Resume a paused track
    pub const RESUME: u8 = 3;
    /// Stop
    pub const STOP: u8 = 4;
    /// Enable looping
    pub const LOOP_ON: u8 = 5;
    /// Disable looping
    pub const LOOP_OFF: u8 = 6;
    /// Load paused, ready for `RESUME_ALL_SYNC`
    pub const LOAD: u8 = 7;
}

/// Response codes (payload byte 0 of inbound frames)
pub mod rsp {
    /// Firmware version string
    pub const VERSION_STRING: u8 = 129;
    /// Voice and track counts
    pub const SYSTEM_INFO: u8 = 130;
    /// Status block
    pub const STATUS: u8 = 131;
    /// Track started/stopped on a voice
    pub const TRACK_REPORT: u8 = 132;
}

/// Track-control operation carried by [`Command::TrackControl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    /// Play, stopping all other tracks
    PlaySolo,
    /// Play on a free voice
    PlayPoly,
    /// Pause
    Pause,
    /// Resume
    Resume,
    /// Stop
    Stop,
    /// Turn looping on
    LoopOn,
    /// Turn looping off
    LoopOff,
    /// Load paused
    Load,
}

impl TrackOp {
    /// Wire sub-code for this operation
    pub fn code(&self) -> u8 {
        match self {
            TrackOp::PlaySolo => trk::PLAY_SOLO,
            TrackOp::PlayPoly => trk::PLAY_POLY,
            TrackOp::Pause => trk::PAUSE,
            TrackOp::Resume => trk::RESUME,
            TrackOp::Stop => trk::STOP,
            TrackOp::LoopOn => trk::LOOP_ON,
            TrackOp::LoopOff => trk::LOOP_OFF,
            TrackOp::Load => trk::LOAD,
        }
    }
}

/// Outbound command to the playback module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request the version string
    GetVersion,
    /// Request system info
    GetSysInfo,
    /// Track control without a voice lock
    TrackControl {
        /// Operation
        op: TrackOp,
        /// Track number
        track: u16,
    },
    /// Track control with an explicit voice-lock flag
    TrackControlEx {
        /// Operation
        op: TrackOp,
        /// Track number
        track: u16,
        /// Keep the voice from being stolen by later plays
        lock: bool,
    },
    /// Stop every track
    StopAll,
    /// Master gain in dB (-70..=+4)
    MasterGain(i16),
    /// Track gain in dB (-70..=+10)
    TrackGain {
        /// Track number
        track: u16,
        /// Gain in dB
        gain: i16,
    },
    /// Fade a track to a target gain
    TrackFade {
        /// Track number
        track: u16,
        /// Target gain in dB
        gain: i16,
        /// Fade time in milliseconds
        millis: u16,
        /// Stop the track once the fade completes
        stop: bool,
    },
    /// Resume all loaded/paused tracks in sync
    ResumeAllInSync,
    /// Sample-rate offset
    SamplerateOffset(i16),
    /// Enable or disable track reports
    SetReporting(bool),
    /// Switch the amplifier on or off
    SetAmpPower(bool),
    /// Select the trigger bank
    SetTriggerBank(u8),
}

/// Encoded outbound frame
pub type EncodedFrame = Vec<u8, MAX_COMMAND_LEN>;

impl Command {
    /// Serialize this command into a complete wire frame
    pub fn encode(&self) -> EncodedFrame {
        let mut payload: Vec<u8, { MAX_COMMAND_LEN - FRAME_OVERHEAD }> = Vec::new();
        // Every payload below fits in MAX_COMMAND_LEN - FRAME_OVERHEAD bytes.
        let mut put = |bytes: &[u8]| {
            let _ = payload.extend_from_slice(bytes);
        };

        match *self {
            Command::GetVersion => put(&[cmd::GET_VERSION]),
            Command::GetSysInfo => put(&[cmd::GET_SYS_INFO]),
            Command::TrackControl { op, track } => {
                put(&[cmd::TRACK_CONTROL, op.code()]);
                put(&track.to_le_bytes());
            }
            Command::TrackControlEx { op, track, lock } => {
                put(&[cmd::TRACK_CONTROL_EX, op.code()]);
                put(&track.to_le_bytes());
                put(&[lock as u8]);
            }
            Command::StopAll => put(&[cmd::STOP_ALL]),
            Command::MasterGain(gain) => {
                put(&[cmd::MASTER_VOLUME]);
                put(&gain.to_le_bytes());
            }
            Command::TrackGain { track, gain } => {
                put(&[cmd::TRACK_VOLUME]);
                put(&track.to_le_bytes());
                put(&gain.to_le_bytes());
            }
            Command::TrackFade {
                track,
                gain,
                millis,
                stop,
            } => {
                put(&[cmd::TRACK_FADE]);
                put(&track.to_le_bytes());
                put(&gain.to_le_bytes());
                put(&millis.to_le_bytes());
                put(&[stop as u8]);
            }
            Command::ResumeAllInSync => put(&[cmd::RESUME_ALL_SYNC]),
            Command::SamplerateOffset(offset) => {
                put(&[cmd::SAMPLERATE_OFFSET]);
                put(&offset.to_le_bytes());
            }
            Command::SetReporting(enable) => put(&[cmd::SET_REPORTING, enable as u8]),
            Command::SetAmpPower(enable) => put(&[cmd::AMP_POWER, enable as u8]),
            Command::SetTriggerBank(bank) => put(&[cmd::SET_TRIGGER_BANK, bank]),
        }

        let mut frame = EncodedFrame::new();
        let len = (payload.len() + FRAME_OVERHEAD) as u8;
        let _ = frame.extend_from_slice(&[SOM1, SOM2, len]);
        let _ = frame.extend_from_slice(&payload);
        let _ = frame.push(EOM);
        frame
    }
}

/// Receiver states, in the order a well-formed frame walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxState {
    /// Hunting for SOM1
    #[default]
    SeekMarker1,
    /// SOM1 seen, expecting SOM2
    SeekMarker2,
    /// Expecting the length byte
    ReadLength,
    /// Collecting payload bytes
    ReadPayload,
    /// Payload complete, expecting EOM
    ExpectEnd,
}

/// Structurally valid inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Frame {
    /// Frame payload (response code first)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Response/command code, payload byte 0
    pub fn code(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }
}

/// Incremental frame decoder fed one byte at a time
///
/// No partial frame is ever returned: a byte that breaks the envelope drops
/// the frame in progress and sends the receiver back to hunting for SOM1.
#[derive(Debug, Clone, Default)]
pub struct FrameReceiver {
    state: RxState,
    expected_payload: usize,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    resyncs: u32,
}

impl FrameReceiver {
    /// Create a receiver in the hunt-for-start state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Number of frames abandoned because of a framing error
    pub fn resync_count(&self) -> u32 {
        self.resyncs
    }

    /// Drop any partial frame and hunt for SOM1 again
    pub fn reset(&mut self) {
        self.state = RxState::SeekMarker1;
        self.expected_payload = 0;
        self.payload.clear();
    }

    fn resync(&mut self, byte: u8) {
        trace!(byte, state = ?self.state, "serial framing error, resyncing");
        self.resyncs = self.resyncs.wrapping_add(1);
        self.reset();
    }

    /// Feed one byte; returns a frame when this byte completes one
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            RxState::SeekMarker1 => {
                // Anything other than SOM1 is line noise between frames.
                if byte == SOM1 {
                    self.state = RxState::SeekMarker2;
                }
            }
            RxState::SeekMarker2 => {
                if byte == SOM2 {
                    self.state = RxState::ReadLength;
                } else {
                    self.resync(byte);
                }
            }
            RxState::ReadLength => {
                let len = byte as usize;
                if (MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&len) {
                    self.expected_payload = len - FRAME_OVERHEAD;
                    self.payload.clear();
                    self.state = RxState::ReadPayload;
                } else {
                    self.resync(byte);
                }
            }
            RxState::ReadPayload => {
                if self.payload.push(byte).is_err() {
                    self.resync(byte);
                } else if self.payload.len() == self.expected_payload {
                    self.state = RxState::ExpectEnd;
                }
            }
            RxState::ExpectEnd => {
                if byte == EOM {
                    let frame = Frame {
                        payload: self.payload.clone(),
                    };
                    self.reset();
                    return Some(frame);
                }
                self.resync(byte);
            }
        }
        None
    }
}
