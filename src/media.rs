use crate::backends::AudioFormat;
use crate::config_loader;
use crate::error::{Result, TtsError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Read-only duration probe. WAV files are read natively; everything else
/// goes through ffprobe. The decoder handle never outlives the call.
pub fn probe_duration_ms(path: &Path) -> Result<u64> {
    if has_extension(path, "wav") {
        let reader = hound::WavReader::open(path).map_err(|e| {
            TtsError::Unknown(format!("failed to read WAV '{}': {}", path.display(), e))
        })?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(TtsError::Unknown(format!(
                "WAV '{}' reports a zero sample rate",
                path.display()
            )));
        }
        let frames = reader.duration() as u64;
        Ok(frames * 1000 / spec.sample_rate as u64)
    } else {
        ffprobe_duration_ms(path)
    }
}

fn ffprobe_duration_ms(path: &Path) -> Result<u64> {
    let binary = config_loader::SETTINGS
        .read()
        .map(|s| s.ffprobe_binary.clone())
        .unwrap_or_else(|_| "ffprobe".to_string());

    let output = Command::new(&binary)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                TtsError::CodecUnavailable(format!("'{}' not found", binary))
            }
            _ => TtsError::Unknown(e.to_string()),
        })?;

    if !output.status.success() {
        let err_msg = String::from_utf8_lossy(&output.stderr);
        return Err(TtsError::Unknown(format!(
            "ffprobe failed on '{}': {}",
            path.display(),
            err_msg
        )));
    }

    let secs: f64 = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|_| {
            TtsError::Unknown(format!("ffprobe returned no duration for '{}'", path.display()))
        })?;
    Ok((secs * 1000.0).round() as u64)
}

/// Transcode `src` into `target` format. `dest` gains the target extension
/// when missing. Returns the actual output path.
pub fn convert(src: &Path, dest: &Path, target: AudioFormat) -> Result<PathBuf> {
    let dest = target.apply_extension(dest);
    run_ffmpeg(src, &dest)?;
    Ok(dest)
}

/// Export `src` to `dest`. When the extension already matches the copy is
/// byte-identical (no re-encode, no generation loss); otherwise transcode.
pub fn export_copy(src: &Path, dest: &Path) -> Result<PathBuf> {
    let src_ext = src
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if has_extension(dest, &src_ext) {
        std::fs::copy(src, dest)?;
        Ok(dest.to_path_buf())
    } else {
        run_ffmpeg(src, dest)?;
        Ok(dest.to_path_buf())
    }
}

fn run_ffmpeg(src: &Path, dest: &Path) -> Result<()> {
    let binary = config_loader::SETTINGS
        .read()
        .map(|s| s.ffmpeg_binary.clone())
        .unwrap_or_else(|_| "ffmpeg".to_string());

    let output = Command::new(&binary)
        .arg("-y")
        .arg("-i")
        .arg(src)
        .arg(dest)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                TtsError::CodecUnavailable(format!("'{}' not found", binary))
            }
            _ => TtsError::Unknown(e.to_string()),
        })?;

    if !output.status.success() {
        let err_msg = String::from_utf8_lossy(&output.stderr);
        return Err(TtsError::Unknown(format!(
            "ffmpeg failed converting '{}': {}",
            src.display(),
            err_msg
        )));
    }
    Ok(())
}

/// Test fixture: `samples` mono 16-bit samples at `sample_rate`.
#[cfg(test)]
pub(crate) fn write_test_wav(path: &Path, samples: usize, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..samples {
        let value = ((i % 100) as i16 - 50) * 200;
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_probe_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one-second.wav");
        write_test_wav(&path, 8000, 8000);
        assert_eq!(probe_duration_ms(&path).unwrap(), 1000);
    }

    #[test]
    fn test_probe_wav_duration_is_positive_for_short_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_test_wav(&path, 400, 8000);
        assert!(probe_duration_ms(&path).unwrap() > 0);
    }

    #[test]
    fn test_probe_missing_file_fails() {
        assert!(probe_duration_ms(Path::new("/nonexistent/file.wav")).is_err());
    }

    #[test]
    fn test_export_copy_same_format_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        let dest = dir.path().join("dest.wav");
        write_test_wav(&src, 1000, 8000);

        export_copy(&src, &dest).unwrap();
        assert_eq!(
            std::fs::read(&src).unwrap(),
            std::fs::read(&dest).unwrap()
        );
    }

    #[test]
    fn test_export_copy_is_case_insensitive_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        let dest = dir.path().join("dest.WAV");
        write_test_wav(&src, 100, 8000);

        export_copy(&src, &dest).unwrap();
        assert_eq!(
            std::fs::read(&src).unwrap(),
            std::fs::read(&dest).unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_missing_ffmpeg_is_codec_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        write_test_wav(&src, 100, 8000);

        let previous = {
            let mut settings = config_loader::SETTINGS.write().unwrap();
            std::mem::replace(
                &mut settings.ffmpeg_binary,
                "toice-test-missing-ffmpeg".to_string(),
            )
        };

        let err = convert(&src, &dir.path().join("out"), AudioFormat::Mp3).unwrap_err();

        config_loader::SETTINGS.write().unwrap().ffmpeg_binary = previous;
        assert!(matches!(err, TtsError::CodecUnavailable(_)));
    }
}
