use rpu_audio::sim::ScriptedSerial;
use rpu_audio::wav_trigger::protocol::{FrameReceiver, RxState};
use rpu_audio::wav_trigger::{Command, DeviceEvent, TrackOp, MAX_NUM_VOICES};
use rpu_audio::WavTrigger;

fn report(track: u16, voice: u8, playing: bool) -> [u8; 9] {
    let [lo, hi] = (track - 1).to_le_bytes();
    [0xF0, 0xAA, 0x09, 0x84, lo, hi, voice, playing as u8, 0x55]
}

fn started_driver() -> WavTrigger<ScriptedSerial> {
    let mut wav = WavTrigger::new(ScriptedSerial::new());
    wav.start();
    wav.link_mut().take_written();
    wav
}

#[test]
fn noise_before_a_frame_is_skipped() {
    let mut rx = FrameReceiver::new();
    let frames: Vec<_> = [0x11, 0xF0, 0xAA, 0x05, 0x04, 0x55]
        .into_iter()
        .filter_map(|b| rx.push_byte(b))
        .collect();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].code(), 0x04);
    assert_eq!(DeviceEvent::decode(&frames[0]), None);
    assert_eq!(rx.state(), RxState::SeekMarker1);
}

#[test]
fn bad_end_marker_drops_frame_and_next_frame_still_parses() {
    let mut wav = started_driver();
    let mut bad = report(5, 0, true);
    bad[8] = 0x00;
    wav.link_mut().inject(&bad);
    wav.link_mut().inject(&report(6, 1, true));

    assert!(!wav.is_track_playing(5));
    assert!(wav.is_track_playing(6));
}

#[test]
fn oversized_length_resyncs() {
    let mut wav = started_driver();
    wav.link_mut().inject(&[0xF0, 0xAA, 33, 0x84, 0x00, 0x00, 0x00, 0x01, 0x55]);
    wav.link_mut().inject(&report(1, 0, true));
    assert_eq!(wav.playing_track(0), Some(1));
}

#[test]
fn frame_split_across_updates() {
    let mut wav = started_driver();
    let bytes = report(20, 3, true);
    wav.link_mut().inject(&bytes[..4]);
    assert_eq!(wav.update(), 0);
    assert_eq!(wav.rx_state(), RxState::ReadPayload);

    wav.link_mut().inject(&bytes[4..]);
    assert_eq!(wav.update(), 1);
    assert_eq!(wav.playing_track(3), Some(20));
}

#[test]
fn stale_stop_does_not_clear_newer_track() {
    let mut wav = started_driver();
    wav.link_mut().inject(&report(7, 2, true));
    wav.link_mut().inject(&report(9, 2, true));
    wav.link_mut().inject(&report(7, 2, false));

    assert_eq!(wav.playing_track(2), Some(9));
    assert!(!wav.is_track_playing(7));

    wav.link_mut().inject(&report(9, 2, false));
    assert_eq!(wav.playing_track(2), None);
}

#[test]
fn out_of_range_voice_is_ignored() {
    let mut wav = started_driver();
    wav.link_mut().inject(&report(4, MAX_NUM_VOICES as u8, true));
    assert_eq!(wav.update(), 1);
    assert!(!wav.is_track_playing(4));
    assert!(wav.voice_table().iter().all(Option::is_none));
}

#[test]
fn system_info_and_version_are_remembered() {
    let mut wav = started_driver();
    assert_eq!(wav.num_tracks(), None);

    wav.link_mut().inject(&[0xF0, 0xAA, 0x08, 0x82, 14, 0x2C, 0x01, 0x55]);
    let mut version = vec![0xF0, 0xAA, 25, 0x81];
    version.extend_from_slice(b"WAV Trigger v1.34   ");
    version.push(0x55);
    wav.link_mut().inject(&version);

    assert_eq!(wav.num_voices(), Some(14));
    assert_eq!(wav.num_tracks(), Some(300));
    assert_eq!(wav.version(), Some("WAV Trigger v1.34"));
}

#[test]
fn start_queries_version_and_system_info() {
    let mut wav = WavTrigger::new(ScriptedSerial::new());
    wav.start();
    assert_eq!(
        wav.link().written_frames(),
        vec![
            Command::GetVersion.encode().to_vec(),
            Command::GetSysInfo.encode().to_vec(),
        ]
    );
}

#[test]
fn outbound_frames_are_bit_exact() {
    let mut wav = started_driver();
    wav.track_play_poly(0x0102, true);
    wav.track_gain(3, -12);
    wav.track_fade(3, -40, 1000, true);
    wav.track_stop(3);

    assert_eq!(
        wav.link().written_frames(),
        vec![
            vec![0xF0, 0xAA, 0x09, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x55],
            vec![0xF0, 0xAA, 0x09, 0x08, 0x03, 0x00, 0xF4, 0xFF, 0x55],
            vec![0xF0, 0xAA, 0x0C, 0x0A, 0x03, 0x00, 0xD8, 0xFF, 0xE8, 0x03, 0x01, 0x55],
            vec![0xF0, 0xAA, 0x08, 0x03, 0x04, 0x03, 0x00, 0x55],
        ]
    );
    assert_eq!(
        wav.link().written_frames()[3],
        Command::TrackControl {
            op: TrackOp::Stop,
            track: 3
        }
        .encode()
        .to_vec()
    );
}

#[test]
fn events_are_queued_for_the_owner() {
    let mut wav = started_driver();
    wav.link_mut().inject(&report(11, 0, true));
    wav.update();
    assert_eq!(
        wav.poll_event(),
        Some(DeviceEvent::TrackStarted { track: 11, voice: 0 })
    );
    assert_eq!(wav.poll_event(), None);
}

#[test]
fn report_after_line_noise_updates_voice_table() {
    let mut wav = started_driver();
    let mut bytes = vec![0x42, 0xF0, 0x13, 0x55];
    bytes.extend_from_slice(&report(12, 4, true));
    wav.link_mut().inject(&bytes);

    assert_eq!(wav.update(), 1);
    assert_eq!(wav.playing_track(4), Some(12));
    assert_eq!(
        wav.poll_event(),
        Some(DeviceEvent::TrackStarted { track: 12, voice: 4 })
    );
}
