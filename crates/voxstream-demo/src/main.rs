//! Voxstream demo - streams tone-burst "speech" into a simulated output device

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capture;
mod device;
mod settings;
mod tone;

use device::SimulatedDevice;
use settings::DemoSettings;
use tone::ToneEngine;
use voxstream_core::SpeechDriver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxstream_demo=debug,voxstream_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting voxstream demo");

    // Load configuration
    let settings_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = DemoSettings::load(settings_path.as_deref())?;

    let device = SimulatedDevice::new(settings.device.clone(), Some(settings.output_wav.clone()));
    let engine = ToneEngine::new(settings.tone.clone());
    let driver = SpeechDriver::with_output(engine, settings.speaker.clone(), &device)?;
    let mut stopped = driver.subscribe();

    let mut lines = settings.script.iter();
    if let Some(first) = lines.next() {
        let opening = driver.speak(first.as_str(), settings.voice);

        if let Some(correction) = &settings.correction {
            tokio::time::sleep(Duration::from_millis(settings.correction_delay_ms)).await;
            info!("Overriding with corrected text");
            driver.override_speech(correction.as_str()).await.map_err(|e| anyhow::anyhow!(e))?;
        }
        opening.await.map_err(|e| anyhow::anyhow!(e))?;

        for line in lines {
            driver.continue_speech(line.as_str()).await.map_err(|e| anyhow::anyhow!(e))?;
        }
    } else {
        warn!("Script is empty, nothing to say");
    }

    // Synthesis is done; wait for the device to play out what is buffered
    let drained = tokio::time::timeout(Duration::from_secs(settings.drain_timeout_secs), async {
        loop {
            match stopped.recv().await {
                Ok(_) if !driver.stats().audible => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Playback did not finish within {}s", settings.drain_timeout_secs);
    }

    let stats = driver.stats();
    info!(
        "Playback finished: {:.2}s played, {:?}",
        driver.format().duration_ms(stats.cursor) / 1000.0,
        stats
    );
    driver.shutdown()?;

    Ok(())
}
