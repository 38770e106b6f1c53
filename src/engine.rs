use crate::error::{Result, TtsError};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Transport-level view of the playback engine. All mutation of the
/// underlying audio output goes through this trait; the controller never
/// talks to the audio library directly, so tests can substitute a fake.
///
/// The engine exposes no completion callback — callers infer track end by
/// polling `position_ms` against a known duration.
pub trait AudioEngine: Send + Sync {
    /// Load a file and leave it paused at position 0.
    fn load(&self, path: &Path) -> Result<()>;
    /// Start or resume playback of the loaded file.
    fn play(&self);
    fn pause(&self);
    /// Halt playback and discard the loaded file.
    fn stop(&self);
    /// Jump to `position_ms`, preserving the paused/playing state.
    fn seek_ms(&self, position_ms: u64) -> Result<()>;
    fn set_volume(&self, volume: f32);
    /// Current playback position. Keeps advancing past the end of the
    /// track; the controller reconciles it against the probed duration.
    fn position_ms(&self) -> u64;
}

/// Wall-clock position tracking. The audio library gives us no position
/// query, so the handle accounts for play/pause/seek itself.
#[derive(Default)]
struct PositionClock {
    base_ms: u64,
    started: Option<Instant>,
}

impl PositionClock {
    fn position_ms(&self) -> u64 {
        self.base_ms
            + self
                .started
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0)
    }

    fn run(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn freeze(&mut self) {
        if let Some(started) = self.started.take() {
            self.base_ms += started.elapsed().as_millis() as u64;
        }
    }

    /// Move to `ms` without changing the running/frozen state.
    fn reset(&mut self, ms: u64) {
        self.base_ms = ms;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

enum EngineCommand {
    Load(PathBuf, Sender<Result<()>>),
    Play,
    Pause,
    Stop,
    Seek(u64, Sender<Result<()>>),
    SetVolume(f32),
}

/// The audio output device is process-wide; a second engine would fight
/// the first one for it.
static ENGINE_RUNNING: AtomicBool = AtomicBool::new(false);

/// Playback engine backed by rodio. The output stream is bound to a
/// dedicated thread; the handle talks to it over a channel.
pub struct RodioEngine {
    tx: Sender<EngineCommand>,
    clock: Arc<Mutex<PositionClock>>,
}

impl RodioEngine {
    pub fn new() -> Result<Self> {
        if ENGINE_RUNNING.swap(true, Ordering::SeqCst) {
            return Err(TtsError::EngineInit(
                "the process-wide audio engine is already running".to_string(),
            ));
        }

        let (tx, rx) = channel::<EngineCommand>();
        let (init_tx, init_rx) = channel::<std::result::Result<(), String>>();

        thread::spawn(move || {
            // Audio stream must live on this thread
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(pair) => {
                    let _ = init_tx.send(Ok(()));
                    pair
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e.to_string()));
                    return;
                }
            };

            let mut sink: Option<Sink> = None;
            let mut path: Option<PathBuf> = None;
            let mut volume = 1.0f32;
            let mut paused = true;

            while let Ok(command) = rx.recv() {
                match command {
                    EngineCommand::Load(new_path, reply) => {
                        if let Some(old) = sink.take() {
                            old.stop();
                        }
                        match open_sink(&stream_handle, &new_path, Duration::ZERO, volume, true)
                        {
                            Ok(new_sink) => {
                                sink = Some(new_sink);
                                path = Some(new_path);
                                paused = true;
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                path = None;
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                    EngineCommand::Play => {
                        if let Some(sink) = &sink {
                            sink.play();
                            paused = false;
                        }
                    }
                    EngineCommand::Pause => {
                        if let Some(sink) = &sink {
                            sink.pause();
                            paused = true;
                        }
                    }
                    EngineCommand::Stop => {
                        if let Some(old) = sink.take() {
                            old.stop();
                        }
                        path = None;
                        paused = true;
                    }
                    EngineCommand::Seek(ms, reply) => {
                        let result = match &path {
                            Some(p) => open_sink(
                                &stream_handle,
                                p,
                                Duration::from_millis(ms),
                                volume,
                                paused,
                            )
                            .map(|new_sink| {
                                if let Some(old) = sink.take() {
                                    old.stop();
                                }
                                sink = Some(new_sink);
                            }),
                            None => Err(TtsError::Unknown("no audio loaded".to_string())),
                        };
                        let _ = reply.send(result);
                    }
                    EngineCommand::SetVolume(v) => {
                        volume = v;
                        if let Some(sink) = &sink {
                            sink.set_volume(v);
                        }
                    }
                }
            }
        });

        match init_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                clock: Arc::new(Mutex::new(PositionClock::default())),
            }),
            Ok(Err(msg)) => {
                ENGINE_RUNNING.store(false, Ordering::SeqCst);
                Err(TtsError::EngineInit(msg))
            }
            Err(_) => {
                ENGINE_RUNNING.store(false, Ordering::SeqCst);
                Err(TtsError::EngineInit("audio thread exited".to_string()))
            }
        }
    }

    fn roundtrip(
        &self,
        make: impl FnOnce(Sender<Result<()>>) -> EngineCommand,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| TtsError::Unknown("audio thread not running".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| TtsError::Unknown("audio thread not running".to_string()))?
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        ENGINE_RUNNING.store(false, Ordering::SeqCst);
    }
}

fn open_sink(
    stream_handle: &OutputStreamHandle,
    path: &Path,
    skip: Duration,
    volume: f32,
    paused: bool,
) -> Result<Sink> {
    let file = File::open(path)?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| {
        TtsError::Unknown(format!("failed to decode '{}': {}", path.display(), e))
    })?;
    let sink = Sink::try_new(stream_handle)
        .map_err(|e| TtsError::Unknown(format!("failed to open audio sink: {}", e)))?;
    sink.set_volume(volume);
    sink.append(source.skip_duration(skip).convert_samples::<f32>());
    if paused {
        sink.pause();
    }
    Ok(sink)
}

impl AudioEngine for RodioEngine {
    fn load(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.roundtrip(move |reply| EngineCommand::Load(path, reply))?;
        if let Ok(mut clock) = self.clock.lock() {
            *clock = PositionClock::default();
        }
        Ok(())
    }

    fn play(&self) {
        if let Ok(mut clock) = self.clock.lock() {
            clock.run();
        }
        let _ = self.tx.send(EngineCommand::Play);
    }

    fn pause(&self) {
        if let Ok(mut clock) = self.clock.lock() {
            clock.freeze();
        }
        let _ = self.tx.send(EngineCommand::Pause);
    }

    fn stop(&self) {
        if let Ok(mut clock) = self.clock.lock() {
            *clock = PositionClock::default();
        }
        let _ = self.tx.send(EngineCommand::Stop);
    }

    fn seek_ms(&self, position_ms: u64) -> Result<()> {
        self.roundtrip(move |reply| EngineCommand::Seek(position_ms, reply))?;
        if let Ok(mut clock) = self.clock.lock() {
            clock.reset(position_ms);
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.tx.send(EngineCommand::SetVolume(volume));
    }

    fn position_ms(&self) -> u64 {
        self.clock.lock().map(|c| c.position_ms()).unwrap_or(0)
    }
}

/// Engine stand-in for headless runs (export or graph only, no audio
/// device wanted). Every operation succeeds and position never advances.
pub struct NullEngine;

impl AudioEngine for NullEngine {
    fn load(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn play(&self) {}

    fn pause(&self) {}

    fn stop(&self) {}

    fn seek_ms(&self, _position_ms: u64) -> Result<()> {
        Ok(())
    }

    fn set_volume(&self, _volume: f32) {}

    fn position_ms(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frozen_by_default() {
        let clock = PositionClock::default();
        assert_eq!(clock.position_ms(), 0);
    }

    #[test]
    fn test_clock_advances_while_running() {
        let mut clock = PositionClock::default();
        clock.run();
        thread::sleep(Duration::from_millis(20));
        assert!(clock.position_ms() >= 20);
    }

    #[test]
    fn test_clock_freeze_holds_position() {
        let mut clock = PositionClock::default();
        clock.run();
        thread::sleep(Duration::from_millis(10));
        clock.freeze();
        let frozen = clock.position_ms();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.position_ms(), frozen);
    }

    #[test]
    fn test_clock_reset_preserves_frozen_state() {
        let mut clock = PositionClock::default();
        clock.reset(500);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.position_ms(), 500);
    }

    #[test]
    fn test_null_engine_never_advances() {
        let engine = NullEngine;
        engine.load(Path::new("/tmp/anything.wav")).unwrap();
        engine.play();
        assert_eq!(engine.position_ms(), 0);
    }
}
