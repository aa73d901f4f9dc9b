//! End-to-end speech generation from the command line.
//!
//! ```bash
//! GEMINI_API_KEY=... cargo run --example generate_speech -- "UBND tỉnh thông báo lịch nghỉ lễ 2/9." [background.mp3]
//! ```

use anyhow::{Context, Result};
use tts_studio::config::{TtsStudioConfig, VoiceConfig};
use tts_studio::progress::{ProgressInfo, ProgressObserver};
use tts_studio::{BackgroundTrack, TtsStudio};

struct ConsoleObserver;

impl ProgressObserver for ConsoleObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        match &progress.details {
            Some(details) => println!(
                "[{:>5.1}%] {} - {}",
                progress.total_progress, progress.step, details
            ),
            None => println!("[{:>5.1}%] {}", progress.total_progress, progress.step),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let text = args
        .next()
        .context("usage: generate_speech <text> [background audio file]")?;
    let background = match args.next() {
        Some(path) => Some(BackgroundTrack::new(
            std::fs::read(&path).with_context(|| format!("reading {path}"))?,
        )),
        None => None,
    };

    let config = TtsStudioConfig::default();
    if config.fallback_api_key.is_empty() {
        anyhow::bail!("set GEMINI_API_KEY to run this example");
    }

    let mut studio = TtsStudio::new(config)?;
    studio.add_observer(Box::new(ConsoleObserver));

    let audio = studio
        .generate_speech(&text, &VoiceConfig::default(), background.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;

    std::fs::write("speech.wav", &audio.wav)?;
    std::fs::write("speech.mp3", &audio.mp3)?;
    println!(
        "wrote speech.wav ({} bytes) and speech.mp3 ({} bytes), {} chunk(s)",
        audio.wav.len(),
        audio.mp3.len(),
        audio.chunk_count
    );

    Ok(())
}
