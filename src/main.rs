//! `rpu-audio-sim`: replay a scripted audio session against in-memory hardware
//!
//! Every frame sent to the WAV Trigger is printed in hex together with every
//! sound-board call, one line each, prefixed by the tick it happened on. A
//! fake module echoes a track report for each play command so ducking and
//! voice tracking behave as they would on a machine.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rpu_audio::dispatcher::{DEFAULT_EFFECT_PRIORITY, DEFAULT_EFFECT_WINDOW};
use rpu_audio::sim::{RecordingBoard, ScriptedSerial};
use rpu_audio::wav_trigger::protocol::{cmd, rsp, trk, EOM, SOM1, SOM2};
use rpu_audio::wav_trigger::MAX_NUM_VOICES;
use rpu_audio::{AudioConfig, AudioDispatcher, AudioType, SoundCardFunction, SoundtrackEntry, Ticks};

#[derive(Parser)]
#[command(name = "rpu-audio-sim")]
#[command(about = "Replay a scripted pinball audio session and print what reaches the hardware")]
struct Args {
    /// JSON audio configuration (defaults to every backend fitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks to simulate
    #[arg(short, long, default_value_t = 3_000)]
    ticks: Ticks,

    /// Ticks between updates
    #[arg(short, long, default_value_t = 10)]
    step: Ticks,

    /// Shuffle the demo soundtrack
    #[arg(long)]
    shuffle: bool,

    /// Do not echo track reports back from the simulated module
    #[arg(long)]
    no_reports: bool,
}

type Sim = AudioDispatcher<ScriptedSerial, RecordingBoard>;

/// Scripted game requests, keyed by the tick they are made on
fn run_script(audio: &mut Sim, now: Ticks) -> Result<()> {
    match now {
        100 => audio.queue_prioritized_notification(301, 700, 10, now)?,
        150 => audio.play_sound_card_when_possible(
            12,
            now,
            0,
            DEFAULT_EFFECT_WINDOW,
            DEFAULT_EFFECT_PRIORITY,
        )?,
        160 => audio.play_sound_card_when_possible(13, now, 0, 30, 5)?,
        300 => audio.queue_prioritized_notification(302, 400, 20, now)?,
        400 => {
            audio.queue_wav_trigger_sound(45, now + 50, None)?;
            audio.queue_sound_card_command(SoundCardFunction::Analog, 1, 0x3C, now + 100)?;
        }
        1_500 => audio.fade_sound(45, -40, 250, true)?,
        2_500 => audio.stop_all_music(),
        _ => {}
    }
    Ok(())
}

/// Answer every play command with a track report, as a module with reporting on would
struct FakeModule {
    seen: usize,
    next_voice: u8,
}

impl FakeModule {
    fn echo(&mut self, serial: &mut ScriptedSerial) {
        let frames = serial.written_frames();
        for frame in &frames[self.seen..] {
            let is_play = frame.len() == 9
                && frame[3] == cmd::TRACK_CONTROL_EX
                && (frame[4] == trk::PLAY_POLY || frame[4] == trk::PLAY_SOLO);
            if !is_play {
                continue;
            }
            let track = u16::from_le_bytes([frame[5], frame[6]]).saturating_sub(1);
            let [lo, hi] = track.to_le_bytes();
            serial.inject(&[SOM1, SOM2, 0x09, rsp::TRACK_REPORT, lo, hi, self.next_voice, 0x01, EOM]);
            self.next_voice = (self.next_voice + 1) % MAX_NUM_VOICES as u8;
        }
        self.seen = frames.len();
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rpu_audio=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.step > 0, "--step must be at least 1");

    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            AudioConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => AudioConfig::default().backends(AudioType::all()),
    };
    info!(?config, "starting simulated session");

    let mut audio = AudioDispatcher::new(config, ScriptedSerial::new(), RecordingBoard::new())?;
    let mut module = FakeModule {
        seen: 0,
        next_voice: 0,
    };
    let mut printed = 0;

    audio.init_devices(0);
    let playlist = [
        SoundtrackEntry::new(500, 1_000),
        SoundtrackEntry::new(501, 800),
        SoundtrackEntry::new(502, 1_200),
    ];
    if audio.config().backends.contains(AudioType::WAV_TRIGGER) {
        audio.play_background_soundtrack(&playlist, 0, args.shuffle)?;
    }

    let mut now = 0;
    while now <= args.ticks {
        if let Err(err) = run_script(&mut audio, now) {
            println!("{now:>6} !! {err}");
        }
        audio.update(now);

        if let Some(wav) = audio.wav_trigger_mut() {
            let frames = wav.link().written_frames();
            for frame in &frames[printed..] {
                println!("{now:>6} tx {}", hex(frame));
            }
            printed = frames.len();
            if !args.no_reports {
                module.echo(wav.link_mut());
            }
        }
        if let Some(board) = audio.board_mut() {
            for call in board.take_calls() {
                println!("{now:>6} board {call:?}");
            }
        }

        now += args.step;
    }

    audio.output_tracks_playing();
    Ok(())
}
