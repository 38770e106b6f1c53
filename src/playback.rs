use crate::config_loader;
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::media;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Publish interface consumed by the UI shell: one call per tick/event,
/// no shared-memory binding.
pub trait PlaybackObserver: Send + Sync {
    fn position_changed(&self, position_ms: u64, formatted: &str);
    fn state_changed(&self, state: PlaybackState);
    /// New seek-bar range, published when a file is loaded.
    fn duration_changed(&self, duration_ms: u64);
    /// Live volume, for the volume/mute icon. Zero means muted.
    fn volume_changed(&self, _volume: f32) {}
}

/// One loaded-and-controllable unit of audio. Created on `play`,
/// destroyed on `stop` or natural end.
struct Session {
    file: PathBuf,
    duration_ms: u64,
    position_ms: u64,
}

struct Inner {
    state: PlaybackState,
    session: Option<Session>,
    looping: bool,
    volume: f32,
}

/// Transport state machine over the process-wide audio engine.
///
/// The engine exposes no completion event, so track end is inferred by
/// `tick` when the polled position reaches the probed duration. Only one
/// controller may drive the engine per process.
pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    observer: Arc<dyn PlaybackObserver>,
    inner: Mutex<Inner>,
    poll_interval: Duration,
    polling: AtomicBool,
}

impl PlaybackController {
    pub fn new(engine: Arc<dyn AudioEngine>, observer: Arc<dyn PlaybackObserver>) -> Self {
        let (volume, looping, poll_interval_ms) = config_loader::SETTINGS
            .read()
            .map(|s| (s.playback_volume, s.loop_playback, s.poll_interval_ms))
            .unwrap_or((1.0, false, 50));
        Self::with_options(
            engine,
            observer,
            Duration::from_millis(poll_interval_ms),
            volume,
            looping,
        )
    }

    pub fn with_options(
        engine: Arc<dyn AudioEngine>,
        observer: Arc<dyn PlaybackObserver>,
        poll_interval: Duration,
        volume: f32,
        looping: bool,
    ) -> Self {
        Self {
            engine,
            observer,
            inner: Mutex::new(Inner {
                state: PlaybackState::Stopped,
                session: None,
                looping,
                volume: volume.clamp(0.0, 1.0),
            }),
            poll_interval,
            polling: AtomicBool::new(false),
        }
    }

    /// Start playing `path`. Calling this again for the file that is
    /// already playing is a no-op; while paused on the same file it
    /// resumes. Any other file replaces the current session.
    pub fn play(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let same_file = inner
            .session
            .as_ref()
            .map(|s| s.file == path)
            .unwrap_or(false);
        match inner.state {
            PlaybackState::Playing if same_file => return Ok(()),
            PlaybackState::Paused if same_file => {
                self.engine.play();
                inner.state = PlaybackState::Playing;
                drop(inner);
                self.observer.state_changed(PlaybackState::Playing);
                return Ok(());
            }
            PlaybackState::Stopped => {}
            _ => self.engine.stop(),
        }

        let duration_ms = media::probe_duration_ms(path)?;
        self.engine.load(path)?;
        self.engine.set_volume(inner.volume);
        self.engine.play();

        inner.session = Some(Session {
            file: path.to_path_buf(),
            duration_ms,
            position_ms: 0,
        });
        inner.state = PlaybackState::Playing;
        drop(inner);

        self.observer.duration_changed(duration_ms);
        self.observer.state_changed(PlaybackState::Playing);
        self.observer.position_changed(0, &format_time(0));
        Ok(())
    }

    /// No-op unless currently playing; the position freezes at the last
    /// polled value.
    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != PlaybackState::Playing {
            return;
        }
        self.engine.pause();
        inner.state = PlaybackState::Paused;
        drop(inner);
        self.observer.state_changed(PlaybackState::Paused);
    }

    /// No-op unless currently paused.
    pub fn resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != PlaybackState::Paused {
            return;
        }
        self.engine.play();
        inner.state = PlaybackState::Playing;
        drop(inner);
        self.observer.state_changed(PlaybackState::Playing);
    }

    /// Halt the engine, destroy the session and reset the position
    /// display. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlaybackState::Stopped {
            return;
        }
        self.engine.stop();
        inner.state = PlaybackState::Stopped;
        inner.session = None;
        drop(inner);
        self.observer.state_changed(PlaybackState::Stopped);
        self.observer.position_changed(0, &format_time(0));
    }

    /// Jump within the current session, clamped to its duration. Ignored
    /// when no session is active. Playing/paused is preserved.
    pub fn seek(&self, position_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let clamped = match inner.session.as_ref() {
            Some(session) => position_ms.min(session.duration_ms),
            None => return Ok(()),
        };
        self.engine.seek_ms(clamped)?;
        if let Some(session) = inner.session.as_mut() {
            session.position_ms = clamped;
        }
        drop(inner);
        self.observer.position_changed(clamped, &format_time(clamped));
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let mut inner = self.inner.lock().unwrap();
        inner.volume = volume;
        self.engine.set_volume(volume);
        drop(inner);
        self.observer.volume_changed(volume);
    }

    pub fn set_loop(&self, enabled: bool) {
        self.inner.lock().unwrap().looping = enabled;
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().unwrap().state
    }

    pub fn position_ms(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.session.as_ref().map(|s| s.position_ms).unwrap_or(0)
    }

    pub fn duration_ms(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.session.as_ref().map(|s| s.duration_ms).unwrap_or(0)
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().unwrap().volume
    }

    pub fn is_looping(&self) -> bool {
        self.inner.lock().unwrap().looping
    }

    /// One poll of the engine position. Drives end-of-track detection:
    /// position at or past the duration means the track is done, because
    /// the engine never tells us itself.
    pub fn tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != PlaybackState::Playing {
            return;
        }
        let duration_ms = match inner.session.as_ref() {
            Some(session) => session.duration_ms,
            None => return,
        };

        let position = self.engine.position_ms();
        if position >= duration_ms {
            if inner.looping && self.engine.seek_ms(0).is_ok() {
                self.engine.play();
                if let Some(session) = inner.session.as_mut() {
                    session.position_ms = 0;
                }
                drop(inner);
                self.observer.position_changed(0, &format_time(0));
            } else {
                self.engine.stop();
                inner.state = PlaybackState::Stopped;
                inner.session = None;
                drop(inner);
                self.observer.state_changed(PlaybackState::Stopped);
                self.observer.position_changed(0, &format_time(0));
            }
        } else {
            if let Some(session) = inner.session.as_mut() {
                session.position_ms = position;
            }
            drop(inner);
            self.observer.position_changed(position, &format_time(position));
        }
    }

    /// Spawn the repeating poll task. Returns None when a poll task is
    /// already running.
    pub fn start_polling(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.polling.swap(true, Ordering::SeqCst) {
            return None;
        }
        let controller = self;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.poll_interval);
            while controller.polling.load(Ordering::SeqCst) {
                ticker.tick().await;
                controller.tick();
            }
        }))
    }

    /// Cancel the poll task. Cancelling an already-cancelled task is a
    /// no-op.
    pub fn stop_polling(&self) {
        self.polling.store(false, Ordering::SeqCst);
    }
}

/// mm:ss display form of a position.
pub fn format_time(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
