use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use toice::app::ToiceApp;
use toice::config_loader;
use toice::engine::{AudioEngine, NullEngine, RodioEngine};
use toice::error::TtsError;
use toice::graph::GraphStyle;
use toice::playback::{format_time, PlaybackObserver, PlaybackState};

#[derive(Parser)]
#[command(
    name = "toice",
    version,
    about = "Text-to-speech studio: synthesize, play, export"
)]
struct Cli {
    /// Text to speak; read from stdin when omitted
    text: Option<String>,

    /// Synthesis backend (espeak or gtts); defaults to the configured one
    #[arg(short, long)]
    backend: Option<String>,

    /// List the active backend's voices and exit
    #[arg(long)]
    list_voices: bool,

    /// Skip playback (useful with --export/--graph)
    #[arg(long)]
    no_play: bool,

    /// Repeat playback until stopped
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Playback volume, 0.0 to 1.0
    #[arg(short, long)]
    volume: Option<f32>,

    /// Export the synthesized audio to this path
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Render an amplitude graph PNG to this path
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Graph dimensions as WIDTHxHEIGHT
    #[arg(long, default_value = "800x600")]
    dimensions: String,

    /// Interactive transport control on stdin
    #[arg(short, long)]
    interactive: bool,
}

/// Terminal stand-in for the UI shell's labels and seek bar.
#[derive(Default)]
struct TerminalUi {
    duration_ms: AtomicU64,
}

impl PlaybackObserver for TerminalUi {
    fn position_changed(&self, _position_ms: u64, formatted: &str) {
        let total = self.duration_ms.load(Ordering::Relaxed);
        print!("\r{} / {}   ", formatted, format_time(total));
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }

    fn state_changed(&self, state: PlaybackState) {
        println!("\nPlayback: {:?}", state);
    }

    fn duration_changed(&self, duration_ms: u64) {
        self.duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    fn volume_changed(&self, volume: f32) {
        if volume == 0.0 {
            println!("\nVolume: muted");
        } else {
            println!("\nVolume: {}%", (volume * 100.0).round() as u32);
        }
    }
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), TtsError> {
    let parts: Vec<&str> = value.splitn(2, 'x').collect();
    let parsed = match parts.as_slice() {
        [w, h] => w.parse::<u32>().ok().zip(h.parse::<u32>().ok()),
        _ => None,
    };
    parsed.ok_or_else(|| {
        TtsError::Unknown(format!(
            "invalid dimensions '{}', expected WIDTHxHEIGHT",
            value
        ))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let backend_name = match &cli.backend {
        Some(name) => name.clone(),
        None => config_loader::SETTINGS.read().unwrap().tts_backend.clone(),
    };

    // Playback needs the real audio device; export-only runs do not.
    let engine: Arc<dyn AudioEngine> = if cli.no_play && !cli.interactive {
        Arc::new(NullEngine)
    } else {
        Arc::new(RodioEngine::new()?)
    };

    let ui = Arc::new(TerminalUi::default());
    let app = Arc::new(ToiceApp::new(&backend_name, engine, ui)?);

    if cli.list_voices {
        for voice in app.voices() {
            println!("{:3}  {:<8}  {}", voice.id, format!("{:?}", voice.gender), voice.name);
        }
        return Ok(());
    }

    let text = match cli.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        eprintln!("No text to speak");
        std::process::exit(1);
    }

    if let Some(volume) = cli.volume {
        app.set_volume(volume);
    }
    if cli.loop_playback {
        app.set_loop(true);
    }

    println!("Synthesizing with backend '{}'...", backend_name);
    let synth_app = app.clone();
    let result =
        tokio::task::spawn_blocking(move || synth_app.synthesize_blocking(&text)).await??;
    println!("Synthesized to {}", result.file_path.display());

    if !cli.no_play {
        app.play()?;
        let poll_task = app.playback().clone().start_polling();

        if cli.interactive {
            run_transport_repl(&app).await?;
        } else {
            while app.state() != PlaybackState::Stopped {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }

        app.playback().stop_polling();
        if let Some(task) = poll_task {
            let _ = task.await;
        }
        println!();
    }

    if let Some(dest) = cli.export {
        let written = app.export(&dest)?;
        println!("Exported to {}", written.display());
    }

    if let Some(dest) = cli.graph {
        let (width, height) = parse_dimensions(&cli.dimensions)?;
        let style = GraphStyle {
            width,
            height,
            ..GraphStyle::default()
        };
        app.waveform(&dest, &style)?;
        println!("Waveform graph written to {}", dest.display());
    }

    Ok(())
}

async fn run_transport_repl(app: &Arc<ToiceApp>) -> std::io::Result<()> {
    use tokio::io::AsyncBufReadExt;

    println!("Commands: pause, resume, stop, seek <seconds>, volume <0..1>, loop on|off, quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break, // EOF
            },
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                if app.state() == PlaybackState::Stopped {
                    break;
                }
                continue;
            }
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["pause"] => app.pause(),
            ["resume"] => app.resume(),
            ["play"] => {
                if let Err(e) = app.play() {
                    eprintln!("Play failed: {}", e);
                }
            }
            ["stop"] => app.stop(),
            ["seek", secs] => match secs.parse::<f64>() {
                Ok(secs) if secs >= 0.0 => {
                    if let Err(e) = app.seek((secs * 1000.0) as u64) {
                        eprintln!("Seek failed: {}", e);
                    }
                }
                _ => eprintln!("Usage: seek <seconds>"),
            },
            ["volume", value] => match value.parse::<f32>() {
                Ok(volume) => app.set_volume(volume),
                Err(_) => eprintln!("Usage: volume <0..1>"),
            },
            ["loop", "on"] => app.set_loop(true),
            ["loop", "off"] => app.set_loop(false),
            ["quit"] | ["q"] => {
                app.stop();
                break;
            }
            [] => {}
            [other, ..] => eprintln!("Unknown command: {}", other),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("800x600").unwrap(), (800, 600));
        assert_eq!(parse_dimensions("64x32").unwrap(), (64, 32));
        assert!(parse_dimensions("800").is_err());
        assert!(parse_dimensions("800x").is_err());
        assert!(parse_dimensions("axb").is_err());
    }
}
