//! Response decoding
//!
//! Turns structurally valid frames into device events. Only response codes
//! (129..=132) produce events; a command frame echoed back on the line is
//! accepted by the receiver but decodes to nothing.

use nom::number::complete::{le_u16, u8 as byte};
use nom::sequence::tuple;
use nom::IResult;

use super::protocol::{rsp, Frame};

/// Length of the version string carried by `VERSION_STRING`
pub const VERSION_STRING_LEN: usize = 20;

/// Event decoded from a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Firmware version string received
    Version([u8; VERSION_STRING_LEN]),
    /// Voice and track counts received
    SystemInfo {
        /// Simultaneous voices supported by the module
        voices: u8,
        /// Tracks found on the SD card
        tracks: u16,
    },
    /// A track started on a voice
    TrackStarted {
        /// Track number (1-based)
        track: u16,
        /// Hardware voice slot
        voice: u8,
    },
    /// A track stopped on a voice
    TrackStopped {
        /// Track number (1-based)
        track: u16,
        /// Hardware voice slot
        voice: u8,
    },
}

fn track_report(input: &[u8]) -> IResult<&[u8], DeviceEvent> {
    let (rest, (raw_track, voice, playing)) = tuple((le_u16, byte, byte))(input)?;
    // The module reports tracks 0-based; everything else in the protocol is 1-based.
    let track = raw_track.wrapping_add(1);
    let event = if playing != 0 {
        DeviceEvent::TrackStarted { track, voice }
    } else {
        DeviceEvent::TrackStopped { track, voice }
    };
    Ok((rest, event))
}

fn system_info(input: &[u8]) -> IResult<&[u8], DeviceEvent> {
    let (rest, (voices, tracks)) = tuple((byte, le_u16))(input)?;
    Ok((rest, DeviceEvent::SystemInfo { voices, tracks }))
}

fn version_string(input: &[u8]) -> Option<DeviceEvent> {
    let raw = input.get(..VERSION_STRING_LEN)?;
    let mut version = [0u8; VERSION_STRING_LEN];
    version.copy_from_slice(raw);
    Some(DeviceEvent::Version(version))
}

impl DeviceEvent {
    /// Decode a frame; `None` for non-response codes, `STATUS`, or short payloads
    pub fn decode(frame: &Frame) -> Option<Self> {
        let (&code, body) = frame.payload().split_first()?;
        match code {
            rsp::TRACK_REPORT => track_report(body).ok().map(|(_, ev)| ev),
            rsp::SYSTEM_INFO => system_info(body).ok().map(|(_, ev)| ev),
            rsp::VERSION_STRING => version_string(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav_trigger::protocol::FrameReceiver;

    fn frame_of(payload: &[u8]) -> Frame {
        let mut rx = FrameReceiver::new();
        let mut bytes = std::vec![0xF0, 0xAA, (payload.len() + 4) as u8];
        bytes.extend_from_slice(payload);
        bytes.push(0x55);
        bytes
            .into_iter()
            .find_map(|b| rx.push_byte(b))
            .expect("well-formed frame")
    }

    #[test]
    fn test_track_report_is_one_based() {
        let ev = DeviceEvent::decode(&frame_of(&[132, 0x09, 0x00, 2, 1]));
        assert_eq!(ev, Some(DeviceEvent::TrackStarted { track: 10, voice: 2 }));

        let ev = DeviceEvent::decode(&frame_of(&[132, 0x00, 0x01, 0, 0]));
        assert_eq!(ev, Some(DeviceEvent::TrackStopped { track: 257, voice: 0 }));
    }

    #[test]
    fn test_system_info() {
        let ev = DeviceEvent::decode(&frame_of(&[130, 14, 0x2C, 0x01]));
        assert_eq!(
            ev,
            Some(DeviceEvent::SystemInfo {
                voices: 14,
                tracks: 300
            })
        );
    }

    #[test]
    fn test_version_string() {
        let mut payload = std::vec![129];
        payload.extend_from_slice(b"WAV Trigger v1.34   ");
        let Some(DeviceEvent::Version(v)) = DeviceEvent::decode(&frame_of(&payload)) else {
            panic!("expected version event");
        };
        assert_eq!(&v[..], b"WAV Trigger v1.34   ");
    }

    #[test]
    fn test_commands_and_truncated_reports_decode_to_nothing() {
        assert_eq!(DeviceEvent::decode(&frame_of(&[3, 1, 5, 0])), None);
        assert_eq!(DeviceEvent::decode(&frame_of(&[4])), None);
        assert_eq!(DeviceEvent::decode(&frame_of(&[131])), None);
        assert_eq!(DeviceEvent::decode(&frame_of(&[132, 1, 0])), None);
    }
}
