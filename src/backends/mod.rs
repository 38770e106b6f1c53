pub mod espeak;
pub mod gtts;

use crate::error::{Result, TtsError};
use std::path::{Path, PathBuf};

/// Represents a text-to-speech voice
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Voice {
    pub id: usize,
    pub name: String,
    pub gender: VoiceGender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VoiceGender {
    Male,
    Female,
    Unknown,
}

impl VoiceGender {
    /// Fold engine-reported gender metadata into the recognized pair.
    /// Anything outside it becomes `Unknown`.
    pub fn from_engine_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => VoiceGender::Male,
            "F" | "FEMALE" => VoiceGender::Female,
            _ => VoiceGender::Unknown,
        }
    }
}

/// Audio container format produced by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Append this format's extension to `base` unless it is already there
    /// (case-insensitive). Keeps one cache-path scheme working across
    /// backends that produce different formats.
    pub fn apply_extension(&self, base: &Path) -> PathBuf {
        let matches = base
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false);
        if matches {
            base.to_path_buf()
        } else {
            let mut s = base.as_os_str().to_os_string();
            s.push(format!(".{}", self.extension()));
            PathBuf::from(s)
        }
    }
}

/// One successful synthesis. Owned by the caller; the backend keeps nothing.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub file_path: PathBuf,
    pub format: AudioFormat,
}

/// A single backend-specific synthesis property.
///
/// Each backend accepts its own subset and rejects the rest with a
/// `Property` error, never a silent no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// Local: speech rate in words per minute, 50..=300.
    Rate(u32),
    /// Local: output amplitude, 0.0..=1.0.
    Volume(f32),
    /// Local: index into the enumerated voice list.
    VoiceIndex(usize),
    /// Cloud: language code, e.g. "en".
    Language(String),
    /// Cloud: top-level-domain region variant, e.g. "com", "co.uk".
    RegionVariant(String),
    /// Cloud: slower speech.
    Slow(bool),
}

impl Property {
    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Property::Rate(_) => "rate",
            Property::Volume(_) => "volume",
            Property::VoiceIndex(_) => "voice",
            Property::Language(_) => "lang",
            Property::RegionVariant(_) => "tld",
            Property::Slow(_) => "slow",
        }
    }
}

/// Trait that all speech synthesis backends must implement.
/// This allows us to plug in different engines (eSpeak NG, Google
/// Translate TTS, etc.) behind one contract.
pub trait SpeechBackend: Send {
    /// Returns the unique ID of the backend (e.g., "espeak")
    fn id(&self) -> &'static str;

    /// Format of the files this backend produces.
    fn output_format(&self) -> AudioFormat;

    /// Apply synthesis properties. Rejects properties this backend does
    /// not recognize, and out-of-range values, with a `Property` error.
    fn configure(&mut self, properties: &[Property]) -> Result<()>;

    /// Synthesize `text` into an audio file derived from `base_path`
    /// (the backend appends its format extension when missing).
    /// Blocks the calling thread until the file write completes.
    fn synthesize(&mut self, text: &str, base_path: &Path) -> Result<SynthesisResult>;

    /// Voices enumerated at construction. Empty for backends without
    /// voice enumeration.
    fn list_voices(&self) -> Vec<Voice>;
}

/// Look up a voice by display name, linear scan, first match wins.
/// Duplicate display names resolve to the lowest index; the stable
/// engine-assigned id is the authoritative key.
pub fn voice_by_name<'a>(voices: &'a [Voice], name: &str) -> Option<&'a Voice> {
    voices.iter().find(|v| v.name == name)
}

/// Create a backend from its configured name. The name is trimmed and
/// matched case-insensitively. Unknown names fail without performing
/// any I/O.
pub fn create_backend(name: &str) -> Result<Box<dyn SpeechBackend>> {
    match name.trim().to_lowercase().as_str() {
        "espeak" => Ok(Box::new(espeak::EspeakBackend::new()?)),
        "gtts" => Ok(Box::new(gtts::GttsBackend::new())),
        other => Err(TtsError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_rejected() {
        let err = create_backend("festival").err().unwrap();
        assert!(matches!(err, TtsError::UnknownBackend(_)));
    }

    #[test]
    fn test_backend_name_is_trimmed_and_lowercased() {
        // Still unknown, but the reported name must be normalized
        match create_backend("  Festival  ") {
            Err(TtsError::UnknownBackend(name)) => assert_eq!(name, "festival"),
            other => panic!("expected UnknownBackend, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_gender_folds_to_unknown() {
        assert_eq!(VoiceGender::from_engine_tag("M"), VoiceGender::Male);
        assert_eq!(VoiceGender::from_engine_tag("f"), VoiceGender::Female);
        assert_eq!(VoiceGender::from_engine_tag("-"), VoiceGender::Unknown);
        assert_eq!(VoiceGender::from_engine_tag("N"), VoiceGender::Unknown);
        assert_eq!(VoiceGender::from_engine_tag(""), VoiceGender::Unknown);
    }

    #[test]
    fn test_apply_extension() {
        let wav = AudioFormat::Wav;
        assert_eq!(
            wav.apply_extension(Path::new("/tmp/tts-1")),
            PathBuf::from("/tmp/tts-1.wav")
        );
        assert_eq!(
            wav.apply_extension(Path::new("/tmp/tts-1.WAV")),
            PathBuf::from("/tmp/tts-1.WAV")
        );
        assert_eq!(
            AudioFormat::Mp3.apply_extension(Path::new("/tmp/tts-1.wav")),
            PathBuf::from("/tmp/tts-1.wav.mp3")
        );
    }

    #[test]
    fn test_voice_by_name_first_match_wins() {
        let voices = vec![
            Voice {
                id: 0,
                name: "alice".to_string(),
                gender: VoiceGender::Female,
            },
            Voice {
                id: 1,
                name: "alice".to_string(),
                gender: VoiceGender::Unknown,
            },
        ];
        assert_eq!(voice_by_name(&voices, "alice").unwrap().id, 0);
        assert!(voice_by_name(&voices, "bob").is_none());
    }
}
