//! Hardware Boundary
//!
//! The engine never touches registers or UARTs directly. Everything it needs
//! from the board goes through the two traits in this module, so the same
//! dispatcher runs against real peripherals on the control board and against
//! the in-memory doubles in [`crate::sim`] on a host.

use std::fmt;

/// Non-blocking byte link to the WAV Trigger playback module.
///
/// Implementations must never block: `read_byte` returns `None` as soon as the
/// receive FIFO is empty, and `write_all` queues the bytes for transmission.
pub trait SerialLink {
    /// Pop one received byte, if any is waiting.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queue a complete outbound frame for transmission.
    fn write_all(&mut self, bytes: &[u8]);
}

/// Legacy sound hardware wired to the MPU board.
///
/// Covers the chime unit, the single-voice "original sounds" card and the
/// SB-300 style register interface. Boards that lack one of these simply never
/// see the corresponding calls, because the dispatcher only routes to backends
/// enabled in its configuration.
pub trait SoundBoard {
    /// Strike a chime (SB-100 chime output).
    fn play_chime(&mut self, sound: u16);

    /// Trigger one effect on the single-voice sound card.
    ///
    /// `attenuation` is the 4-bit value from the sound-card volume curve
    /// (0 = loudest).
    fn play_sound_effect(&mut self, sound: u16, attenuation: u8);

    /// Write one byte to a sound-card register.
    fn write_sound_card(&mut self, function: SoundCardFunction, register: u8, data: u8);
}

/// Function selector on the sound-card register interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCardFunction {
    /// Square-wave timer chip - selector 0
    SquareWave = 0x00,
    /// Analog (DAC/volume) section - selector 1
    Analog = 0x01,
}

impl SoundCardFunction {
    /// Convert a raw selector value to a function
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x00 => Some(SoundCardFunction::SquareWave),
            0x01 => Some(SoundCardFunction::Analog),
            _ => None,
        }
    }

    /// Get the raw selector value
    pub fn selector(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for SoundCardFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundCardFunction::SquareWave => write!(f, "F0 (Square Wave)"),
            SoundCardFunction::Analog => write!(f, "F1 (Analog)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_selector_conversion() {
        assert_eq!(
            SoundCardFunction::from_selector(0),
            Some(SoundCardFunction::SquareWave)
        );
        assert_eq!(
            SoundCardFunction::from_selector(1),
            Some(SoundCardFunction::Analog)
        );
        assert_eq!(SoundCardFunction::from_selector(2), None);
        assert_eq!(SoundCardFunction::Analog.selector(), 1);
    }
}
