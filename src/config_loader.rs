use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::sync::RwLock;

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Active synthesis backend ("espeak" or "gtts").
    pub tts_backend: String,
    // Local engine settings
    pub espeak_binary: String,
    pub espeak_rate: u32,
    pub espeak_volume: f32,
    pub espeak_voice: usize,
    pub synth_timeout_secs: u64,
    // Cloud engine settings
    pub gtts_lang: String,
    pub gtts_tld: String,
    pub gtts_slow: bool,
    pub cloud_timeout_secs: u64,
    // External codec tools
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
    // Playback settings
    pub playback_volume: f32,
    pub loop_playback: bool,
    pub poll_interval_ms: u64,
    // Paths ("" means platform default)
    pub cache_dir: String,
    pub last_export_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_backend: "espeak".to_string(),
            espeak_binary: "espeak-ng".to_string(),
            espeak_rate: 150,
            espeak_volume: 1.0,
            espeak_voice: 0,
            synth_timeout_secs: 10,
            gtts_lang: "en".to_string(),
            gtts_tld: "com".to_string(),
            gtts_slow: false,
            cloud_timeout_secs: 30,
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            playback_volume: 1.0,
            loop_playback: false,
            poll_interval_ms: 50,
            cache_dir: String::new(),
            last_export_dir: String::new(),
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> =
        RwLock::new(Settings::new().expect("Failed to load settings"));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .set_default("tts_backend", "espeak")?
            .set_default("espeak_binary", "espeak-ng")?
            .set_default("espeak_rate", 150)?
            .set_default("espeak_volume", 1.0)?
            .set_default("espeak_voice", 0)?
            .set_default("synth_timeout_secs", 10)?
            .set_default("gtts_lang", "en")?
            .set_default("gtts_tld", "com")?
            .set_default("gtts_slow", false)?
            .set_default("cloud_timeout_secs", 30)?
            .set_default("ffmpeg_binary", "ffmpeg")?
            .set_default("ffprobe_binary", "ffprobe")?
            .set_default("playback_volume", 1.0)?
            .set_default("loop_playback", false)?
            .set_default("poll_interval_ms", 50)?
            .set_default("cache_dir", "")?
            .set_default("last_export_dir", "")?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Toice").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/toice/Toice",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            )
            // Merge with environment variables (e.g. TOICE_TTS_BACKEND)
            .add_source(config::Environment::with_prefix("TOICE"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.espeak_rate < 50 || self.espeak_rate > 300 {
            return Err(config::ConfigError::Message(format!(
                "Invalid espeak_rate: {}. Must be between 50 and 300 words per minute",
                self.espeak_rate
            )));
        }
        if self.espeak_volume < 0.0 || self.espeak_volume > 1.0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid espeak_volume: {}. Must be between 0.0 and 1.0",
                self.espeak_volume
            )));
        }
        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.synth_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "synth_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(settings.poll_interval_ms > 0);
    }

    #[test]
    fn test_validate_rejects_out_of_range_rate() {
        let settings = Settings {
            espeak_rate: 500,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let settings = Settings {
            playback_volume: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
