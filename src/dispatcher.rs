//! Audio Dispatcher
//!
//! Top-level coordinator owning every queue, the notification stack, the
//! soundtrack scheduler and the backends themselves. Game logic calls the
//! request/stop methods whenever it likes and [`AudioDispatcher::update`]
//! once per control-loop tick. All timing comes in through the `now`
//! arguments; nothing here reads a clock.
//!
//! # Tick order
//!
//! `update` services its parts in a fixed order, because later stages read
//! state set by earlier ones:
//!
//! 1. timed sound queue
//! 2. sound-card register queue
//! 3. effect slot arbiter
//! 4. notification stack
//! 5. background song
//! 6. ducking
//! 7. WAV Trigger input drain
//!
//! # Example
//!
//! ```
//! use rpu_audio::sim::{RecordingBoard, ScriptedSerial};
//! use rpu_audio::{AudioConfig, AudioDispatcher, AudioType};
//!
//! let config = AudioConfig::default().backends(AudioType::WAV_TRIGGER);
//! let mut audio = AudioDispatcher::new(config, ScriptedSerial::new(), RecordingBoard::new())?;
//! audio.init_devices(0);
//! audio.queue_prioritized_notification(301, 2_000, 10, 0)?;
//! audio.update(1);
//! assert!(audio.notifications().is_speaking());
//! # Ok::<(), rpu_audio::AudioError>(())
//! ```

use heapless::Vec;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;
use crate::effects::EffectSlotArbiter;
use crate::hardware::{SerialLink, SoundBoard, SoundCardFunction};
use crate::notification::NotificationStack;
use crate::queue::{
    SoundCardCommand, SoundEntry, TimedCommandQueue, SOUND_CARD_QUEUE_SIZE, SOUND_QUEUE_SIZE,
};
use crate::soundtrack::{
    PlayOrder, SchedulerState, SongChange, SoundtrackEntry, SoundtrackScheduler,
};
use crate::volume::{
    convert_volume_setting_to_gain, duck, sound_card_attenuation, wav_trigger_gain, AudioType,
    Backend, DuckingEdge, Mix, SILENT_GAIN,
};
use crate::wav_trigger::{WavTrigger, MAX_NUM_VOICES};
use crate::{AudioError, Result, Ticks};

/// Default window for [`AudioDispatcher::play_sound_card_when_possible`]
pub const DEFAULT_EFFECT_WINDOW: Ticks = 50;
/// Default priority for [`AudioDispatcher::play_sound_card_when_possible`]
pub const DEFAULT_EFFECT_PRIORITY: u8 = 10;
/// Default threshold for the notification stop calls
pub const DEFAULT_STOP_PRIORITY: u8 = 10;

/// Delay between the startup beep and the command that silences it
const STARTUP_BEEP_LENGTH: Ticks = 250;
/// Tone written by the startup beep: (register, data)
const STARTUP_BEEP_TONE: [(u8, u8); 2] = [(0x02, 0x92), (0x03, 0x0F)];
const STARTUP_BEEP_SILENCE: (u8, u8) = (0x03, 0x00);
const SQUARE_WAVE_REGISTERS: u8 = 8;
const ANALOG_REGISTERS: u8 = 2;

fn rejected(err: AudioError) -> AudioError {
    warn!(%err, "audio request rejected");
    err
}

/// Audio engine for one machine
#[derive(Debug)]
pub struct AudioDispatcher<S, B> {
    config: AudioConfig,
    mix: Mix,
    wav_trigger: Option<WavTrigger<S>>,
    board: Option<B>,
    sound_queue: TimedCommandQueue<SoundEntry, SOUND_QUEUE_SIZE>,
    sound_card_queue: TimedCommandQueue<SoundCardCommand, SOUND_CARD_QUEUE_SIZE>,
    effects: EffectSlotArbiter,
    notifications: NotificationStack,
    soundtrack: SoundtrackScheduler,
    now: Ticks,
}

impl<S: SerialLink, B: SoundBoard> AudioDispatcher<S, B> {
    /// Build a dispatcher for the backends named in `config`
    ///
    /// The serial link is only kept when the WAV Trigger is configured, and
    /// the sound board only when chimes or the original sound card are.
    pub fn new(config: AudioConfig, serial: S, board: B) -> Result<Self> {
        config.validate()?;

        let wav_trigger = config
            .backends
            .contains(AudioType::WAV_TRIGGER)
            .then(|| WavTrigger::new(serial));
        let board = config
            .backends
            .intersects(AudioType::CHIMES | AudioType::ORIGINAL_SOUNDS)
            .then_some(board);

        Ok(AudioDispatcher {
            mix: config.mix(),
            soundtrack: SoundtrackScheduler::new(config.shuffle_seed),
            config,
            wav_trigger,
            board,
            sound_queue: TimedCommandQueue::new("sound"),
            sound_card_queue: TimedCommandQueue::new("sound card"),
            effects: EffectSlotArbiter::new(),
            notifications: NotificationStack::new(),
            now: 0,
        })
    }

    /// Bring every configured backend to a known state
    pub fn init_devices(&mut self, now: Ticks) {
        self.now = now;
        self.sound_queue.clear();
        self.sound_card_queue.clear();
        self.effects.clear();
        self.notifications.stop_all(u8::MAX);
        self.soundtrack.stop();
        self.mix.set_ducked(false);

        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.start();
            wav.stop_all_tracks();
            wav.set_reporting(self.config.reporting);
            wav.set_amp_power(self.config.amp_power);
            wav.master_gain(0);
            info!("WAV Trigger initialized");
        }

        if self.config.backends.contains(AudioType::ORIGINAL_SOUNDS) {
            if let Some(board) = self.board.as_mut() {
                for register in 0..SQUARE_WAVE_REGISTERS {
                    board.write_sound_card(SoundCardFunction::SquareWave, register, 0);
                }
                for register in 0..ANALOG_REGISTERS {
                    board.write_sound_card(SoundCardFunction::Analog, register, 0);
                }
                info!("sound card registers initialized");
            }
            if self.config.sound_card_startup_beep {
                self.play_startup_beep(now);
            }
        }
    }

    fn play_startup_beep(&mut self, now: Ticks) {
        let Some(board) = self.board.as_mut() else {
            return;
        };
        for (register, data) in STARTUP_BEEP_TONE {
            board.write_sound_card(SoundCardFunction::SquareWave, register, data);
        }
        let (register, data) = STARTUP_BEEP_SILENCE;
        let silence = SoundCardCommand {
            function: SoundCardFunction::SquareWave,
            register,
            data,
        };
        if let Err(err) = self
            .sound_card_queue
            .enqueue(silence, now + STARTUP_BEEP_LENGTH)
        {
            warn!(%err, "could not queue end of startup beep");
        }
    }

    /// Log the WAV Trigger voice table
    pub fn output_tracks_playing(&mut self) {
        let Some(wav) = self.wav_trigger.as_mut() else {
            return;
        };
        wav.update();
        for (voice, track) in wav.voice_table().iter().enumerate() {
            if let Some(track) = track {
                info!(voice, track, "voice playing");
            }
        }
    }

    // Volume ---------------------------------------------------------------

    /// Change the effect volume setting
    pub fn set_sound_fx_volume(&mut self, setting: u8) {
        self.mix.sound_fx_volume = setting;
    }

    /// Change the voice notification volume setting
    pub fn set_notifications_volume(&mut self, setting: u8) {
        self.mix.notifications_volume = setting;
    }

    /// Change the music volume; a playing background track follows at once
    ///
    /// A song that was held back while music was muted starts when the
    /// volume comes back up.
    pub fn set_music_volume(&mut self, setting: u8) {
        let was_muted = self.music_muted();
        self.mix.music_volume = setting;
        let Some(track) = self.soundtrack.current_track() else {
            return;
        };
        if was_muted && !self.music_muted() {
            self.start_music(track);
            return;
        }
        let gain = self.mix.effective_music_gain();
        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.track_gain(track, gain);
        }
    }

    /// dB taken off the music while a notification speaks
    pub fn set_music_ducking_gain(&mut self, db: u8) {
        self.mix.music_ducking = i16::from(db).min(-SILENT_GAIN);
    }

    /// dB taken off effects while a notification speaks
    pub fn set_sound_fx_ducking_gain(&mut self, db: u8) {
        self.mix.sound_fx_ducking = i16::from(db).min(-SILENT_GAIN);
    }

    // Music ----------------------------------------------------------------

    /// Install a playlist and start its first song
    pub fn play_background_soundtrack(
        &mut self,
        playlist: &[SoundtrackEntry],
        now: Ticks,
        random_order: bool,
    ) -> Result<()> {
        self.require(AudioType::WAV_TRIGGER)?;
        let order = if random_order {
            PlayOrder::Random
        } else {
            PlayOrder::Sequential
        };
        let change = self
            .soundtrack
            .play_soundtrack(playlist, now, order)
            .map_err(rejected)?;
        self.apply_song_change(change);
        Ok(())
    }

    /// Play one background song outside any playlist rotation
    pub fn play_background_song(&mut self, track: u16, looping: bool) -> Result<()> {
        self.require(AudioType::WAV_TRIGGER)?;
        let previous = self.soundtrack.play_single(track, looping);
        if let (Some(previous), Some(wav)) = (previous, self.wav_trigger.as_mut()) {
            wav.track_stop(previous);
        }
        self.start_music(track);
        Ok(())
    }

    fn apply_song_change(&mut self, change: SongChange) {
        if let (Some(previous), Some(wav)) = (change.previous, self.wav_trigger.as_mut()) {
            wav.track_stop(previous);
        }
        self.start_music(change.next.track);
    }

    fn music_muted(&self) -> bool {
        self.mix.music_gain() <= SILENT_GAIN
    }

    /// Start the scheduler's current song unless music is muted
    fn start_music(&mut self, track: u16) {
        if self.music_muted() {
            debug!(track, "music muted, song not started");
            return;
        }
        let looping = match self.soundtrack.state() {
            SchedulerState::Single { looping, .. } => looping,
            _ => false,
        };
        let gain = self.mix.effective_music_gain();
        let Some(wav) = self.wav_trigger.as_mut() else {
            return;
        };
        wav.track_gain(track, gain);
        wav.track_play_poly(track, true);
        if looping {
            wav.track_loop(track, true);
        }
        debug!(track, looping, "background song started");
    }

    // Sounds ---------------------------------------------------------------

    /// Play a sound right away on every backend named in `audio_type`
    ///
    /// `override_volume` replaces the effect volume setting for this sound.
    pub fn play_sound(
        &mut self,
        sound: u16,
        audio_type: AudioType,
        override_volume: Option<u8>,
    ) -> Result<()> {
        let targets = self.route(audio_type)?;
        let setting = override_volume.unwrap_or(self.mix.sound_fx_volume);

        for backend in targets.backends() {
            if convert_volume_setting_to_gain(backend, setting).is_silent() {
                debug!(sound, %backend, "sound muted, not started");
                continue;
            }
            match backend {
                Backend::Chimes => {
                    if let Some(board) = self.board.as_mut() {
                        board.play_chime(sound);
                    }
                }
                Backend::SoundCard => {
                    if let Some(board) = self.board.as_mut() {
                        board.play_sound_effect(sound, sound_card_attenuation(setting));
                    }
                }
                Backend::WavTrigger => {
                    let base = wav_trigger_gain(setting);
                    let gain = if self.mix.is_ducked() {
                        duck(base, self.mix.sound_fx_ducking)
                    } else {
                        base
                    };
                    if let Some(wav) = self.wav_trigger.as_mut() {
                        wav.track_gain(sound, gain);
                        wav.track_play_poly(sound, false);
                    }
                }
            }
            debug!(sound, %backend, "sound played");
        }
        Ok(())
    }

    /// Fade a WAV Trigger track to `gain` dB over `millis`
    pub fn fade_sound(&mut self, sound: u16, gain: i16, millis: u16, stop: bool) -> Result<()> {
        self.require(AudioType::WAV_TRIGGER)?;
        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.track_fade(sound, gain, millis, stop);
        }
        Ok(())
    }

    /// Play a sound at `fire_time`
    pub fn queue_sound(
        &mut self,
        sound: u16,
        audio_type: AudioType,
        fire_time: Ticks,
        override_volume: Option<u8>,
    ) -> Result<()> {
        let audio_type = self.route(audio_type)?;
        self.sound_queue
            .enqueue(
                SoundEntry {
                    sound,
                    audio_type,
                    override_volume,
                },
                fire_time,
            )
            .map_err(rejected)
    }

    /// [`queue_sound`](Self::queue_sound) on the original sound card
    pub fn queue_original_sound(
        &mut self,
        sound: u16,
        fire_time: Ticks,
        override_volume: Option<u8>,
    ) -> Result<()> {
        self.queue_sound(sound, AudioType::ORIGINAL_SOUNDS, fire_time, override_volume)
    }

    /// [`queue_sound`](Self::queue_sound) on the WAV Trigger
    pub fn queue_wav_trigger_sound(
        &mut self,
        sound: u16,
        fire_time: Ticks,
        override_volume: Option<u8>,
    ) -> Result<()> {
        self.queue_sound(sound, AudioType::WAV_TRIGGER, fire_time, override_volume)
    }

    /// Write a sound-card register at `fire_time`
    pub fn queue_sound_card_command(
        &mut self,
        function: SoundCardFunction,
        register: u8,
        data: u8,
        fire_time: Ticks,
    ) -> Result<()> {
        self.require(AudioType::ORIGINAL_SOUNDS)?;
        self.sound_card_queue
            .enqueue(
                SoundCardCommand {
                    function,
                    register,
                    data,
                },
                fire_time,
            )
            .map_err(rejected)
    }

    /// Ask for an effect on the single-voice sound card
    ///
    /// The effect may start from `now + delay` until `window` ticks after
    /// that; if the card stays busy for the whole window it is never played.
    pub fn play_sound_card_when_possible(
        &mut self,
        effect: u16,
        now: Ticks,
        delay: Ticks,
        window: Ticks,
        priority: u8,
    ) -> Result<()> {
        self.require(AudioType::ORIGINAL_SOUNDS)?;
        let requested = now.saturating_add(delay);
        self.effects
            .enqueue(effect, now, requested, requested.saturating_add(window), priority)
            .map_err(rejected)
    }

    // Notifications --------------------------------------------------------

    /// Queue a voice line
    ///
    /// A line strictly more important than the one speaking cuts it off;
    /// anything else waits its turn on the stack.
    pub fn queue_prioritized_notification(
        &mut self,
        notification: u16,
        duration: Ticks,
        priority: u8,
        now: Ticks,
    ) -> Result<()> {
        self.require(AudioType::WAV_TRIGGER)?;

        let speaking = self.notifications.speaking().map(|s| s.entry);
        if let Some(current) = speaking.filter(|c| priority > c.priority) {
            self.notifications.stop_current(current.priority);
            if let Some(wav) = self.wav_trigger.as_mut() {
                wav.track_stop(current.notification);
            }
            debug!(
                stopped = current.notification,
                by = notification,
                "notification preempted"
            );
        }

        self.notifications
            .push(notification, duration, priority)
            .map_err(rejected)?;
        debug!(notification, priority, now, "notification queued");
        Ok(())
    }

    /// Stop the speaking line if its priority is at or below `priority`
    pub fn stop_current_notification(&mut self, priority: u8) -> bool {
        match self.notifications.stop_current(priority) {
            Some(entry) => {
                if let Some(wav) = self.wav_trigger.as_mut() {
                    wav.track_stop(entry.notification);
                }
                true
            }
            None => false,
        }
    }

    /// Stop the speaking line and drop pending lines at or below `priority`
    pub fn stop_all_notifications(&mut self, priority: u8) -> bool {
        self.notifications.clear_pending(priority);
        self.stop_current_notification(priority)
    }

    // Stopping -------------------------------------------------------------

    /// Stop a sound wherever it is playing or waiting
    pub fn stop_sound(&mut self, sound: u16) {
        let cancelled = self.sound_queue.cancel_where(|e| e.sound == sound)
            + self.effects.cancel_where(|c| c.effect == sound);
        if self.effects.current().is_some_and(|c| c.effect == sound) {
            self.effects.stop_current();
        }
        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.track_stop(sound);
        }
        debug!(sound, cancelled, "sound stopped");
    }

    /// Stop the background music and forget the playlist
    pub fn stop_all_music(&mut self) {
        if let Some(track) = self.soundtrack.stop() {
            if let Some(wav) = self.wav_trigger.as_mut() {
                wav.track_stop(track);
            }
        }
    }

    /// Stop every effect, pending or sounding
    pub fn stop_all_sound_fx(&mut self) {
        self.sound_queue.clear();
        self.effects.clear();
        for track in self.fx_voices() {
            if let Some(wav) = self.wav_trigger.as_mut() {
                wav.track_stop(track);
            }
        }
    }

    /// Silence everything and empty every queue
    pub fn stop_all_audio(&mut self) {
        self.sound_queue.clear();
        self.sound_card_queue.clear();
        self.effects.clear();
        self.notifications.stop_all(u8::MAX);
        self.soundtrack.stop();
        self.mix.set_ducked(false);
        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.stop_all_tracks();
        }
        info!("all audio stopped");
    }

    /// Drop every timed sound without playing it
    pub fn clear_sound_queue(&mut self) {
        self.sound_queue.clear();
    }

    /// Drop every pending sound-card register write
    pub fn clear_sound_card_queue(&mut self) {
        self.sound_card_queue.clear();
    }

    // Tick -----------------------------------------------------------------

    /// Run one control-loop tick
    pub fn update(&mut self, now: Ticks) {
        self.now = now;

        while let Some(entry) = self.sound_queue.pop_due(now) {
            if let Err(err) = self.play_sound(entry.sound, entry.audio_type, entry.override_volume)
            {
                debug!(%err, sound = entry.sound, "queued sound dropped");
            }
        }

        while let Some(cmd) = self.sound_card_queue.pop_due(now) {
            if let Some(board) = self.board.as_mut() {
                board.write_sound_card(cmd.function, cmd.register, cmd.data);
            }
        }

        let fx_setting = self.mix.sound_fx_volume;
        if convert_volume_setting_to_gain(Backend::SoundCard, fx_setting).is_silent() {
            // Muted effects never take the channel.
            self.effects.clear();
        } else if let Some(winner) = self.effects.service(now) {
            if let Some(board) = self.board.as_mut() {
                board.play_sound_effect(winner.effect, sound_card_attenuation(fx_setting));
            }
        }

        let voice_muted = self.notifications_muted();
        let transition = self.notifications.service(now);
        if let Some(finished) = transition.finished {
            debug!(notification = finished.notification, "notification finished");
        }
        if let Some(started) = transition.started {
            if voice_muted {
                debug!(
                    notification = started.notification,
                    "notifications muted, line not played"
                );
            } else {
                let gain = self.mix.notification_gain();
                if let Some(wav) = self.wav_trigger.as_mut() {
                    wav.track_gain(started.notification, gain);
                    wav.track_play_poly(started.notification, true);
                }
                debug!(notification = started.notification, "notification speaking");
            }
        }

        if let Some(change) = self.soundtrack.manage(now) {
            self.apply_song_change(change);
        }

        let speaking = self.notifications.is_speaking() && !voice_muted;
        if let Some(edge) = self.mix.set_ducked(speaking) {
            self.apply_ducking(edge);
        }

        if let Some(wav) = self.wav_trigger.as_mut() {
            wav.update();
            while let Some(event) = wav.poll_event() {
                debug!(?event, "WAV Trigger event");
            }
        }
    }

    fn apply_ducking(&mut self, edge: DuckingEdge) {
        let fx_voices = self.fx_voices();
        let music = self.soundtrack.current_track();
        let fade_ms = self.config.duck_restore_fade_ms;
        let mix = self.mix;
        let Some(wav) = self.wav_trigger.as_mut() else {
            return;
        };

        match edge {
            DuckingEdge::Engaged => {
                if let Some(track) = music {
                    wav.track_gain(track, mix.ducked_music_gain());
                }
                for track in fx_voices {
                    wav.track_gain(track, mix.ducked_fx_gain());
                }
            }
            DuckingEdge::Released => {
                if let Some(track) = music {
                    wav.track_fade(track, mix.music_gain(), fade_ms, false);
                }
                for track in fx_voices {
                    wav.track_gain(track, mix.fx_gain());
                }
            }
        }
        debug!(?edge, "ducking");
    }

    /// Tracks sounding on the WAV Trigger other than music and the speaking line
    fn fx_voices(&self) -> Vec<u16, MAX_NUM_VOICES> {
        let mut tracks = Vec::new();
        let Some(wav) = self.wav_trigger.as_ref() else {
            return tracks;
        };
        let music = self.soundtrack.current_track();
        let speaking = self.notifications.speaking().map(|s| s.entry.notification);
        for track in wav.voice_table().iter().flatten() {
            if Some(*track) == music || Some(*track) == speaking || tracks.contains(track) {
                continue;
            }
            let _ = tracks.push(*track);
        }
        tracks
    }

    fn notifications_muted(&self) -> bool {
        self.mix.notification_gain() <= SILENT_GAIN
    }

    fn route(&self, audio_type: AudioType) -> Result<AudioType> {
        let targets = audio_type & self.config.backends;
        if targets.is_empty() {
            return Err(rejected(AudioError::BackendUnavailable(audio_type)));
        }
        Ok(targets)
    }

    fn require(&self, backend: AudioType) -> Result<()> {
        self.route(backend).map(|_| ())
    }

    // Accessors ------------------------------------------------------------

    /// Configuration in force
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Volume and ducking state
    pub fn mix(&self) -> &Mix {
        &self.mix
    }

    /// Time passed to the latest `update` or `init_devices`
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// WAV Trigger driver, when configured
    pub fn wav_trigger(&self) -> Option<&WavTrigger<S>> {
        self.wav_trigger.as_ref()
    }

    /// Mutable WAV Trigger driver, when configured
    pub fn wav_trigger_mut(&mut self) -> Option<&mut WavTrigger<S>> {
        self.wav_trigger.as_mut()
    }

    /// Sound board, when chimes or the sound card are configured
    pub fn board(&self) -> Option<&B> {
        self.board.as_ref()
    }

    /// Mutable sound board
    pub fn board_mut(&mut self) -> Option<&mut B> {
        self.board.as_mut()
    }

    /// Notification stack
    pub fn notifications(&self) -> &NotificationStack {
        &self.notifications
    }

    /// Soundtrack scheduler
    pub fn soundtrack(&self) -> &SoundtrackScheduler {
        &self.soundtrack
    }

    /// Sound-card effect arbiter
    pub fn effects(&self) -> &EffectSlotArbiter {
        &self.effects
    }

    /// Timed sounds still waiting
    pub fn queued_sounds(&self) -> usize {
        self.sound_queue.len()
    }

    /// Sound-card register writes still waiting
    pub fn queued_sound_card_commands(&self) -> usize {
        self.sound_card_queue.len()
    }
}
