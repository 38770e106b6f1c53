use super::{AudioFormat, Property, SpeechBackend, SynthesisResult, Voice};
use crate::config_loader;
use crate::error::{Result, TtsError};
use std::path::Path;
use std::time::Duration;

/// Cloud backend using the Google Translate TTS endpoint. Stateless per
/// call: every synthesis is one HTTP GET returning MP3 data. The blocking
/// client is built per call, on whichever worker thread runs the synthesis
/// (a blocking client must not live on an async runtime thread).
pub struct GttsBackend {
    lang: String,
    tld: String,
    slow: bool,
    timeout: Duration,
    /// Test hook: full endpoint URL overriding the tld-derived one.
    endpoint_override: Option<String>,
}

impl GttsBackend {
    /// Construction performs no I/O.
    pub fn new() -> Self {
        let (lang, tld, slow, timeout_secs) = config_loader::SETTINGS
            .read()
            .map(|s| {
                (
                    s.gtts_lang.clone(),
                    s.gtts_tld.clone(),
                    s.gtts_slow,
                    s.cloud_timeout_secs,
                )
            })
            .unwrap_or_else(|_| ("en".to_string(), "com".to_string(), false, 30));

        Self {
            lang,
            tld,
            slow,
            timeout: Duration::from_secs(timeout_secs),
            endpoint_override: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(url: String) -> Self {
        let mut backend = Self::new();
        backend.endpoint_override = Some(url);
        backend
    }

    fn endpoint(&self) -> String {
        match &self.endpoint_override {
            Some(url) => url.clone(),
            None => format!("https://translate.google.{}/translate_tts", self.tld),
        }
    }
}

impl Default for GttsBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection and timeout failures are a connectivity problem the user can
/// act on; everything else stays generic.
fn map_request_error(err: reqwest::Error) -> TtsError {
    if err.is_connect() || err.is_timeout() {
        TtsError::Connectivity(err.to_string())
    } else {
        TtsError::Unknown(err.to_string())
    }
}

impl SpeechBackend for GttsBackend {
    fn id(&self) -> &'static str {
        "gtts"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn configure(&mut self, properties: &[Property]) -> Result<()> {
        for prop in properties {
            match prop {
                Property::Language(lang) => {
                    if lang.is_empty() {
                        return Err(TtsError::Property {
                            backend: self.id(),
                            property: format!("{}=", prop.name()),
                        });
                    }
                    self.lang = lang.clone();
                }
                Property::RegionVariant(tld) => {
                    if tld.is_empty() {
                        return Err(TtsError::Property {
                            backend: self.id(),
                            property: format!("{}=", prop.name()),
                        });
                    }
                    self.tld = tld.clone();
                }
                Property::Slow(slow) => {
                    self.slow = *slow;
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
        let output_path = AudioFormat::Mp3.apply_extension(base_path);
        let speed = if self.slow { "0.24" } else { "1" };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TtsError::Unknown(e.to_string()))?;

        let response = client
            .get(self.endpoint())
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.lang.as_str()),
                ("ttsspeed", speed),
                ("q", text),
            ])
            .send()
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            return Err(TtsError::Unknown(format!(
                "TTS service returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().map_err(map_request_error)?;
        std::fs::write(&output_path, &bytes)?;

        Ok(SynthesisResult {
            file_path: output_path,
            format: AudioFormat::Mp3,
        })
    }

    /// The cloud API exposes no voice enumeration.
    fn list_voices(&self) -> Vec<Voice> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_accepts_cloud_properties() {
        let mut backend = GttsBackend::new();
        backend
            .configure(&[
                Property::Language("de".to_string()),
                Property::RegionVariant("co.uk".to_string()),
                Property::Slow(true),
            ])
            .unwrap();
        assert_eq!(backend.lang, "de");
        assert_eq!(backend.tld, "co.uk");
        assert!(backend.slow);
    }

    #[test]
    fn test_configure_rejects_local_properties() {
        let mut backend = GttsBackend::new();
        let err = backend.configure(&[Property::Rate(150)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { backend: "gtts", .. }));
        let err = backend.configure(&[Property::VoiceIndex(0)]).unwrap_err();
        assert!(matches!(err, TtsError::Property { .. }));
    }

    #[test]
    fn test_configure_rejects_empty_language() {
        let mut backend = GttsBackend::new();
        let err = backend
            .configure(&[Property::Language(String::new())])
            .unwrap_err();
        assert!(matches!(err, TtsError::Property { .. }));
    }

    #[test]
    fn test_no_voice_enumeration() {
        assert!(GttsBackend::new().list_voices().is_empty());
    }

    #[test]
    fn test_synthesize_writes_mp3_with_extension() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/translate_tts")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(b"ID3fake-mp3-bytes".to_vec())
            .create();

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tts-123");

        let mut backend =
            GttsBackend::with_endpoint(format!("{}/translate_tts", server.url()));
        let result = backend.synthesize("Hello world", &base).unwrap();

        mock.assert();
        assert_eq!(result.format, AudioFormat::Mp3);
        assert_eq!(result.file_path.extension().unwrap(), "mp3");
        assert_eq!(
            std::fs::read(&result.file_path).unwrap(),
            b"ID3fake-mp3-bytes"
        );
    }

    #[test]
    fn test_http_failure_is_not_connectivity() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/translate_tts")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut backend =
            GttsBackend::with_endpoint(format!("{}/translate_tts", server.url()));
        let err = backend
            .synthesize("Hello", &dir.path().join("tts"))
            .unwrap_err();
        assert!(matches!(err, TtsError::Unknown(_)));
    }

    #[test]
    fn test_unreachable_service_is_connectivity_error() {
        // Nothing listens on this port; the connection is refused.
        let dir = tempfile::tempdir().unwrap();
        let mut backend =
            GttsBackend::with_endpoint("http://127.0.0.1:9/translate_tts".to_string());
        let err = backend
            .synthesize("Hello", &dir.path().join("tts"))
            .unwrap_err();
        assert!(matches!(err, TtsError::Connectivity(_)));
    }
}
