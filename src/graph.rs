use crate::backends::AudioFormat;
use crate::cache;
use crate::error::{Result, TtsError};
use crate::media;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Appearance of the rendered amplitude plot.
#[derive(Debug, Clone)]
pub struct GraphStyle {
    pub width: u32,
    pub height: u32,
    pub foreground: Rgb<u8>,
    pub background: Rgb<u8>,
}

impl Default for GraphStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            // sky blue on white
            foreground: Rgb([135, 206, 235]),
            background: Rgb([255, 255, 255]),
        }
    }
}

/// Removes the file on every exit path, including early `?` returns.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Render an amplitude-vs-time plot of `audio_file` into a PNG at
/// `output_image`. Compressed input is transcoded into a temporary WAV
/// first; the temporary never outlives the call.
pub fn render(audio_file: &Path, output_image: &Path, style: &GraphStyle) -> Result<()> {
    if style.width == 0 || style.height == 0 {
        return Err(TtsError::Unknown(
            "graph dimensions must be non-zero".to_string(),
        ));
    }

    let is_wav = audio_file
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let mut _temp: Option<TempFile> = None;
    let wav_path = if is_wav {
        audio_file.to_path_buf()
    } else {
        let base = cache::generation_base_path()?;
        let mut plot_base = base.into_os_string();
        plot_base.push("-plot");
        let converted = media::convert(audio_file, Path::new(&plot_base), AudioFormat::Wav)?;
        _temp = Some(TempFile(converted.clone()));
        converted
    };

    let samples = read_normalized(&wav_path)?;
    let img = plot(&samples, style);
    img.save(output_image)
        .map_err(|e| TtsError::Unknown(format!("failed to write graph image: {}", e)))?;
    Ok(())
}

/// Read a WAV file as mono samples in [-1, 1].
fn read_normalized(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        TtsError::Unknown(format!("failed to read WAV '{}': {}", path.display(), e))
    })?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / scale)
                .collect()
        }
    };

    if channels > 1 {
        Ok(raw
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect())
    } else {
        Ok(raw)
    }
}

/// Per-column min/max envelope of the signal.
fn plot(samples: &[f32], style: &GraphStyle) -> RgbImage {
    let mut img = RgbImage::from_pixel(style.width, style.height, style.background);
    if samples.is_empty() {
        return img;
    }

    let mid = (style.height - 1) as f32 / 2.0;
    for x in 0..style.width {
        let start = (x as usize * samples.len()) / style.width as usize;
        let end = (((x as usize + 1) * samples.len()) / style.width as usize)
            .max(start + 1)
            .min(samples.len());
        if start >= samples.len() {
            break;
        }

        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for &sample in &samples[start..end] {
            lo = lo.min(sample);
            hi = hi.max(sample);
        }

        let y_top = (mid - hi.clamp(-1.0, 1.0) * mid).round() as u32;
        let y_bottom = (mid - lo.clamp(-1.0, 1.0) * mid).round() as u32;
        for y in y_top..=y_bottom.min(style.height - 1) {
            img.put_pixel(x, y, style.foreground);
        }
    }
    img
}
