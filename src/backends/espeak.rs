use super::{AudioFormat, Property, SpeechBackend, SynthesisResult, Voice, VoiceGender};
use crate::config_loader;
use crate::error::{Result, TtsError};
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Local engine backed by the `espeak-ng` binary. Synthesis captures WAV
/// data from the engine's stdout and blocks until the file is on disk.
pub struct EspeakBackend {
    binary: String,
    timeout: Duration,
    rate: u32,
    volume: f32,
    voice_index: usize,
    voices: Vec<Voice>,
    /// espeak voice identifiers (language codes), indexed like `voices`.
    identifiers: Vec<String>,
}

impl EspeakBackend {
    /// Initialize the engine and enumerate its voices. Initialization is
    /// synchronous; the backend is fully usable once this returns.
    pub fn new() -> Result<Self> {
        let settings = config_loader::SETTINGS
            .read()
            .map_err(|_| TtsError::EngineInit("settings lock poisoned".to_string()))?;
        let binary = settings.espeak_binary.clone();
        let timeout = Duration::from_secs(settings.synth_timeout_secs);
        let rate = settings.espeak_rate;
        let volume = settings.espeak_volume;
        let voice_index = settings.espeak_voice;
        drop(settings);

        let output = Command::new(&binary)
            .arg("--voices")
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TtsError::EngineInit(format!(
                    "speech engine binary '{}' not found",
                    binary
                )),
                _ => TtsError::EngineInit(e.to_string()),
            })?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            return Err(TtsError::EngineInit(format!(
                "'{} --voices' failed: {}",
                binary, err_msg
            )));
        }

        let (voices, identifiers) = parse_voice_table(&String::from_utf8_lossy(&output.stdout));
        let voice_index = if voice_index < voices.len() {
            voice_index
        } else {
            0
        };

        Ok(Self {
            binary,
            timeout,
            rate,
            volume,
            voice_index,
            voices,
            identifiers,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(voices: Vec<Voice>, identifiers: Vec<String>) -> Self {
        Self {
            binary: "espeak-ng".to_string(),
            timeout: Duration::from_secs(10),
            rate: 150,
            volume: 1.0,
            voice_index: 0,
            voices,
            identifiers,
        }
    }

    /// espeak amplitude scale is 0..=200 with 100 as the engine default.
    fn amplitude(&self) -> u32 {
        (self.volume * 100.0).round() as u32
    }
}

/// Parse the table printed by `espeak-ng --voices`. The age/gender column
/// has the form `--/M`; gender letters outside M/F fold to Unknown.
fn parse_voice_table(table: &str) -> (Vec<Voice>, Vec<String>) {
    let mut voices = Vec::new();
    let mut identifiers = Vec::new();

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let language = fields[1];
        let gender = fields[2]
            .rsplit('/')
            .next()
            .map(VoiceGender::from_engine_tag)
            .unwrap_or(VoiceGender::Unknown);
        let name = fields[3];

        voices.push(Voice {
            id: voices.len(),
            name: name.to_string(),
            gender,
        });
        identifiers.push(language.to_string());
    }

    (voices, identifiers)
}

impl SpeechBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn configure(&mut self, properties: &[Property]) -> Result<()> {
        for prop in properties {
            match prop {
                Property::Rate(rate) => {
                    if !(50..=300).contains(rate) {
                        return Err(TtsError::Property {
                            backend: self.id(),
                            property: format!("{}={}", prop.name(), rate),
                        });
                    }
                    self.rate = *rate;
                }
                Property::Volume(volume) => {
                    if !(0.0..=1.0).contains(volume) {
                        return Err(TtsError::Property {
                            backend: self.id(),
                            property: format!("{}={}", prop.name(), volume),
                        });
                    }
                    self.volume = *volume;
                }
                Property::VoiceIndex(index) => {
                    if *index >= self.voices.len() {
                        return Err(TtsError::Property {
                            backend: self.id(),
                            property: format!("{}={}", prop.name(), index),
                        });
                    }
                    self.voice_index = *index;
                }
                other => {
                    return Err(TtsError::Property {
                        backend: self.id(),
                        property: other.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn synthesize(&mut self, text: &str, base_path: &Path) -> Result<SynthesisResult> {
        let output_path = AudioFormat::Wav.apply_extension(base_path);

        let mut command = Command::new(&self.binary);
        command
            .arg("--stdout")
            .arg("-s")
            .arg(self.rate.to_string())
            .arg("-a")
            .arg(self.amplitude().to_string());
        if let Some(identifier) = self.identifiers.get(self.voice_index) {
            command.arg("-v").arg(identifier);
        }

        let mut child = command
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TtsError::EngineInit(format!(
                    "speech engine binary '{}' not found",
                    self.binary
                )),
                _ => TtsError::Unknown(e.to_string()),
            })?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                if status.success() {
                    std::fs::write(&output_path, &output.stdout)?;
                    Ok(SynthesisResult {
                        file_path: output_path,
                        format: AudioFormat::Wav,
                    })
                } else {
                    let err_msg = String::from_utf8_lossy(&output.stderr);
                    Err(TtsError::Unknown(format!("espeak error: {}", err_msg)))
                }
            }
            None => {
                // Timeout occurred, kill the process
                let _ = child.kill();
                let _ = child.wait();
                Err(TtsError::Unknown(format!(
                    "espeak-ng timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICE_TABLE: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-us           --/M      English_(America)  gmw/en-US
 5  mi              --/-      Maori              poz/mi
";

    #[test]
    fn test_parse_voice_table() {
        let (voices, identifiers) = parse_voice_table(VOICE_TABLE);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].id, 0);
        assert_eq!(voices[0].name, "Afrikaans");
        assert_eq!(voices[0].gender, VoiceGender::Male);
        assert_eq!(voices[2].gender, VoiceGender::Unknown);
        assert_eq!(identifiers[1], "en-us");
    }

    #[test]
    fn test_parse_voice_table_skips_malformed_lines() {
        let (voices, _) = parse_voice_table("header\ngarbage\n 5  af\n");
        assert!(voices.is_empty());
    }

    fn backend() -> EspeakBackend {
        let (voices, identifiers) = parse_voice_table(VOICE_TABLE);
        EspeakBackend::from_parts(voices, identifiers)
    }

    #[test]
    fn test_configure_accepts_valid_local_properties() {
        let mut backend = backend();
        backend
            .configure(&[
                Property::Rate(150),
                Property::Volume(0.67),
                Property::VoiceIndex(1),
            ])
            .unwrap();
        assert_eq!(backend.rate, 150);
        assert_eq!(backend.voice_index, 1);
    }

    #[test]
    fn test_configure_rejects_out_of_range_rate() {
        let mut backend = backend();
        let err = backend.configure(&[Property::Rate(40)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { backend: "espeak", .. }));
        let err = backend.configure(&[Property::Rate(301)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { .. }));
    }

    #[test]
    fn test_configure_rejects_invalid_voice_index() {
        let mut backend = backend();
        let err = backend.configure(&[Property::VoiceIndex(99)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { .. }));
    }

    #[test]
    fn test_configure_rejects_cloud_properties() {
        let mut backend = backend();
        let err = backend
            .configure(&[Property::Language("en".to_string())])
            .unwrap_err();
        assert!(matches!(err, TtsError::Property { backend: "espeak", .. }));
    }

    #[test]
    fn test_amplitude_mapping() {
        let mut backend = backend();
        backend.configure(&[Property::Volume(0.5)]).unwrap();
        assert_eq!(backend.amplitude(), 50);
        backend.configure(&[Property::Volume(1.0)]).unwrap();
        assert_eq!(backend.amplitude(), 100);
    }
}
