use crate::backends::{AudioFormat, Property, SpeechBackend, SynthesisResult, Voice};
use crate::error::{Result, TtsError};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

enum WorkerCommand {
    Synthesize {
        text: String,
        base_path: PathBuf,
        reply: Sender<Result<SynthesisResult>>,
    },
    Configure {
        properties: Vec<Property>,
        reply: Sender<Result<()>>,
    },
}

/// Handle to a synthesis request in flight. The result arrives over a
/// channel; the requesting thread is never blocked unless it chooses to
/// wait.
pub struct PendingSynthesis {
    rx: Receiver<Result<SynthesisResult>>,
}

impl PendingSynthesis {
    /// Block until the synthesis completes.
    pub fn wait(self) -> Result<SynthesisResult> {
        self.rx
            .recv()
            .map_err(|_| TtsError::Unknown("synthesis worker exited".to_string()))?
    }

    /// Non-blocking check; returns the result once it has arrived.
    pub fn poll(&self) -> Option<Result<SynthesisResult>> {
        self.rx.try_recv().ok()
    }
}

/// Owns the backend on a dedicated thread. Requests are queued over a
/// channel and handled one at a time, which both keeps synthesis off the
/// UI thread and serializes access to the single-session local engine.
pub struct SynthesisWorker {
    tx: Sender<WorkerCommand>,
    voices: Vec<Voice>,
    backend_id: &'static str,
    output_format: AudioFormat,
}

impl SynthesisWorker {
    pub fn spawn(mut backend: Box<dyn SpeechBackend>) -> Self {
        let voices = backend.list_voices();
        let backend_id = backend.id();
        let output_format = backend.output_format();

        let (tx, rx) = channel::<WorkerCommand>();
        thread::spawn(move || {
            while let Ok(command) = rx.recv() {
                match command {
                    WorkerCommand::Synthesize {
                        text,
                        base_path,
                        reply,
                    } => {
                        println!("Worker: Synthesizing {} characters", text.chars().count());
                        let result = backend.synthesize(&text, &base_path);
                        if let Err(e) = &result {
                            eprintln!("Worker: Synthesis failed: {}", e);
                        }
                        let _ = reply.send(result);
                    }
                    WorkerCommand::Configure { properties, reply } => {
                        let _ = reply.send(backend.configure(&properties));
                    }
                }
            }
        });

        Self {
            tx,
            voices,
            backend_id,
            output_format,
        }
    }

    /// Queue one synthesis. Requests complete in submission order.
    pub fn synthesize(&self, text: &str, base_path: PathBuf) -> Result<PendingSynthesis> {
        let (reply_tx, reply_rx) = channel();
        self.tx
            .send(WorkerCommand::Synthesize {
                text: text.to_string(),
                base_path,
                reply: reply_tx,
            })
            .map_err(|_| TtsError::Unknown("synthesis worker exited".to_string()))?;
        Ok(PendingSynthesis { rx: reply_rx })
    }

    /// Apply properties on the worker thread; blocks until done (property
    /// changes are quick).
    pub fn configure(&self, properties: Vec<Property>) -> Result<()> {
        let (reply_tx, reply_rx) = channel();
        self.tx
            .send(WorkerCommand::Configure {
                properties,
                reply: reply_tx,
            })
            .map_err(|_| TtsError::Unknown("synthesis worker exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| TtsError::Unknown("synthesis worker exited".to_string()))?
    }

    /// Voice list enumerated once at backend construction.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn backend_id(&self) -> &'static str {
        self.backend_id
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::VoiceGender;
    use std::path::Path;
    use std::time::Duration;

    /// Stub backend recording synthesis order and writing real files.
    struct StubBackend {
        delay: Duration,
    }

    impl SpeechBackend for StubBackend {
        fn id(&self) -> &'static str {
            "stub"
        }

        fn output_format(&self) -> AudioFormat {
            AudioFormat::Wav
        }

        fn configure(&mut self, properties: &[Property]) -> Result<()> {
            match properties.first() {
                Some(Property::Slow(_)) => Err(TtsError::Property {
                    backend: "stub",
                    property: "slow".to_string(),
                }),
                _ => Ok(()),
            }
        }

        fn synthesize(&mut self, text: &str, base_path: &Path) -> Result<SynthesisResult> {
            thread::sleep(self.delay);
            let path = AudioFormat::Wav.apply_extension(base_path);
            std::fs::write(&path, text.as_bytes())?;
            Ok(SynthesisResult {
                file_path: path,
                format: AudioFormat::Wav,
            })
        }

        fn list_voices(&self) -> Vec<Voice> {
            vec![Voice {
                id: 0,
                name: "stub".to_string(),
                gender: VoiceGender::Unknown,
            }]
        }
    }

    #[test]
    fn test_completion_arrives_over_channel() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SynthesisWorker::spawn(Box::new(StubBackend {
            delay: Duration::ZERO,
        }));

        let pending = worker.synthesize("hello", dir.path().join("out")).unwrap();
        let result = pending.wait().unwrap();
        assert_eq!(result.file_path.extension().unwrap(), "wav");
        assert_eq!(std::fs::read(&result.file_path).unwrap(), b"hello");
    }

    #[test]
    fn test_requests_are_serialized_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SynthesisWorker::spawn(Box::new(StubBackend {
            delay: Duration::from_millis(20),
        }));

        let first = worker.synthesize("one", dir.path().join("a")).unwrap();
        let second = worker.synthesize("two", dir.path().join("b")).unwrap();

        // The second result must not arrive before the first completes.
        assert!(second.poll().is_none());
        first.wait().unwrap();
        let result = second.wait().unwrap();
        assert_eq!(std::fs::read(&result.file_path).unwrap(), b"two");
    }

    #[test]
    fn test_configure_errors_propagate() {
        let worker = SynthesisWorker::spawn(Box::new(StubBackend {
            delay: Duration::ZERO,
        }));
        let err = worker.configure(vec![Property::Slow(true)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { .. }));
        // Valid properties still succeed afterwards
        worker.configure(vec![Property::Rate(150)]).unwrap();
    }

    #[test]
    fn test_voice_snapshot_taken_at_spawn() {
        let worker = SynthesisWorker::spawn(Box::new(StubBackend {
            delay: Duration::ZERO,
        }));
        assert_eq!(worker.voices().len(), 1);
        assert_eq!(worker.backend_id(), "stub");
        assert_eq!(worker.output_format(), AudioFormat::Wav);
    }
}
