use crate::config_loader;
use crate::error::Result;
use chrono::Utc;
use std::path::PathBuf;

/// Resolve the cache directory, creating it if needed.
///
/// An explicit `cache_dir` setting wins; otherwise the platform cache
/// directory is used (falling back to the system temp dir).
pub fn cache_dir() -> Result<PathBuf> {
    let configured = config_loader::SETTINGS
        .read()
        .map(|s| s.cache_dir.clone())
        .unwrap_or_default();

    let dir = if configured.is_empty() {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("toice")
    } else {
        PathBuf::from(configured)
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Base path for one synthesized utterance, keyed by a generation timestamp.
/// The backend appends its own format extension.
pub fn generation_base_path() -> Result<PathBuf> {
    Ok(cache_dir()?.join(format!("tts-{}", Utc::now().timestamp_millis())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_base_path_has_no_extension() {
        let path = generation_base_path().unwrap();
        assert!(path.extension().is_none());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tts-"));
    }

    #[test]
    fn test_cache_dir_exists_after_resolve() {
        let dir = cache_dir().unwrap();
        assert!(dir.is_dir());
    }
}
