//! Host-side hardware doubles
//!
//! In-memory implementations of [`SerialLink`] and [`SoundBoard`] used by the
//! simulator binary and the test suites. They record everything the engine
//! sends so a session can be inspected after the fact.

use std::collections::VecDeque;

use crate::hardware::{SerialLink, SoundBoard, SoundCardFunction};

/// Serial link fed from a script and recording every outbound byte
#[derive(Debug, Default, Clone)]
pub struct ScriptedSerial {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl ScriptedSerial {
    /// Create an idle link
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bytes available to the next reads, as if the module had sent them
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Bytes still waiting to be read
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Everything written so far
    pub fn written(&self) -> &[u8] {
        &self.tx
    }

    /// Take everything written so far, leaving the record empty
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    /// Split the written bytes into frames using each frame's length byte
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut rest = self.tx.as_slice();
        while rest.len() >= 3 {
            let len = (rest[2] as usize).clamp(3, rest.len());
            let (frame, tail) = rest.split_at(len);
            frames.push(frame.to_vec());
            rest = tail;
        }
        frames
    }
}

impl SerialLink for ScriptedSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_all(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }
}

/// One call made on a [`RecordingBoard`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCall {
    /// `play_chime`
    Chime(u16),
    /// `play_sound_effect`
    SoundEffect {
        /// Effect number
        sound: u16,
        /// 4-bit attenuation
        attenuation: u8,
    },
    /// `write_sound_card`
    SoundCard {
        /// Function selector
        function: SoundCardFunction,
        /// Register
        register: u8,
        /// Data byte
        data: u8,
    },
}

/// Sound board that records every call
#[derive(Debug, Default, Clone)]
pub struct RecordingBoard {
    calls: Vec<BoardCall>,
}

impl RecordingBoard {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> &[BoardCall] {
        &self.calls
    }

    /// Take the recorded calls, leaving the record empty
    pub fn take_calls(&mut self) -> Vec<BoardCall> {
        std::mem::take(&mut self.calls)
    }

    /// Effect numbers played on the single-voice card, in order
    pub fn effects_played(&self) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BoardCall::SoundEffect { sound, .. } => Some(*sound),
                _ => None,
            })
            .collect()
    }
}

impl SoundBoard for RecordingBoard {
    fn play_chime(&mut self, sound: u16) {
        self.calls.push(BoardCall::Chime(sound));
    }

    fn play_sound_effect(&mut self, sound: u16, attenuation: u8) {
        self.calls.push(BoardCall::SoundEffect { sound, attenuation });
    }

    fn write_sound_card(&mut self, function: SoundCardFunction, register: u8, data: u8) {
        self.calls.push(BoardCall::SoundCard {
            function,
            register,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_frames_split_on_length() {
        let mut serial = ScriptedSerial::new();
        serial.write_all(&[0xF0, 0xAA, 0x05, 0x04, 0x55]);
        serial.write_all(&[0xF0, 0xAA, 0x06, 0x0E, 0x01, 0x55]);
        let frames = serial.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], vec![0xF0, 0xAA, 0x06, 0x0E, 0x01, 0x55]);
    }

    #[test]
    fn test_inject_then_read() {
        let mut serial = ScriptedSerial::new();
        serial.inject(&[1, 2]);
        assert_eq!(serial.read_byte(), Some(1));
        assert_eq!(serial.pending(), 1);
    }
}
