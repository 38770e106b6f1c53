use crate::backends::{self, Property, SynthesisResult, Voice};
use crate::cache;
use crate::engine::AudioEngine;
use crate::error::{Result, TtsError};
use crate::graph::{self, GraphStyle};
use crate::media;
use crate::playback::{PlaybackController, PlaybackObserver, PlaybackState};
use crate::worker::{PendingSynthesis, SynthesisWorker};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Application core handed to the UI shell: synthesis on a worker thread,
/// transport control over the audio engine, export and graphing of the
/// current audio. Operations that need synthesized audio fail with
/// `NotGenerated` until a synthesis has been adopted.
pub struct ToiceApp {
    worker: SynthesisWorker,
    playback: Arc<PlaybackController>,
    current: Mutex<Option<SynthesisResult>>,
}

impl ToiceApp {
    /// Build the core for `backend_name`. Backend construction is
    /// synchronous; once this returns the app is fully usable.
    pub fn new(
        backend_name: &str,
        engine: Arc<dyn AudioEngine>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Result<Self> {
        let backend = backends::create_backend(backend_name)?;
        let worker = SynthesisWorker::spawn(backend);
        let playback = Arc::new(PlaybackController::new(engine, observer));
        Ok(Self {
            worker,
            playback,
            current: Mutex::new(None),
        })
    }

    /// Queue a synthesis of `text` under a fresh cache path. The result
    /// arrives on the returned handle; adopt it with `set_current_audio`.
    pub fn request_synthesis(&self, text: &str) -> Result<PendingSynthesis> {
        let base = cache::generation_base_path()?;
        self.worker.synthesize(text, base)
    }

    /// Make a completed synthesis the audio that play/export/graph act on.
    pub fn set_current_audio(&self, result: SynthesisResult) {
        *self.current.lock().unwrap() = Some(result);
    }

    /// Convenience for callers without their own completion handling.
    pub fn synthesize_blocking(&self, text: &str) -> Result<SynthesisResult> {
        let result = self.request_synthesis(text)?.wait()?;
        self.set_current_audio(result.clone());
        Ok(result)
    }

    pub fn current_audio(&self) -> Option<SynthesisResult> {
        self.current.lock().unwrap().clone()
    }

    fn current_file(&self) -> Result<PathBuf> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.file_path.clone())
            .ok_or(TtsError::NotGenerated)
    }

    pub fn play(&self) -> Result<()> {
        let file = self.current_file()?;
        self.playback.play(&file)
    }

    pub fn pause(&self) {
        self.playback.pause();
    }

    pub fn resume(&self) {
        self.playback.resume();
    }

    pub fn stop(&self) {
        self.playback.stop();
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.playback.seek(position_ms)
    }

    pub fn set_volume(&self, volume: f32) {
        self.playback.set_volume(volume);
    }

    pub fn set_loop(&self, enabled: bool) {
        self.playback.set_loop(enabled);
    }

    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_looping(&self) -> bool {
        self.playback.is_looping()
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    /// Export the current audio to `dest`; byte-identical copy when the
    /// format already matches, transcode otherwise.
    pub fn export(&self, dest: &Path) -> Result<PathBuf> {
        let file = self.current_file()?;
        media::export_copy(&file, dest)
    }

    /// Render the current audio's amplitude graph to `dest`.
    pub fn waveform(&self, dest: &Path, style: &GraphStyle) -> Result<()> {
        let file = self.current_file()?;
        graph::render(&file, dest, style)
    }

    pub fn voices(&self) -> &[Voice] {
        self.worker.voices()
    }

    /// Display-name lookup, first match wins; the engine-assigned id is
    /// the authoritative key.
    pub fn voice_by_name(&self, name: &str) -> Option<&Voice> {
        backends::voice_by_name(self.worker.voices(), name)
    }

    pub fn configure(&self, properties: Vec<Property>) -> Result<()> {
        self.worker.configure(properties)
    }

    pub fn backend_id(&self) -> &'static str {
        self.worker.backend_id()
    }
}
