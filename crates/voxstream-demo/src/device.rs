//! Simulated output device.
//!
//! Pulls a fixed-size buffer from the clip callback on a fixed period, the
//! way a sound card's render thread would, and keeps what it played.

use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use voxstream_core::{AudioHost, ClipResource, ClipSpec, Error, PullCallback, Result};

use crate::capture::write_wav;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Frames requested per pull
    #[serde(default = "default_period_frames")]
    pub period_frames: usize,

    /// Pace pulls in real time; otherwise pull as fast as possible
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            period_frames: default_period_frames(),
            realtime: default_realtime(),
        }
    }
}

fn default_period_frames() -> usize {
    1024
}

fn default_realtime() -> bool {
    true
}

pub struct SimulatedDevice {
    settings: DeviceSettings,
    capture_path: Option<PathBuf>,
}

impl SimulatedDevice {
    pub fn new(settings: DeviceSettings, capture_path: Option<PathBuf>) -> Self {
        Self {
            settings,
            capture_path,
        }
    }
}

impl AudioHost for SimulatedDevice {
    fn create_clip(&self, spec: &ClipSpec, mut pull: PullCallback) -> Result<Box<dyn ClipResource>> {
        let running = Arc::new(AtomicBool::new(true));
        let captured = Arc::new(Mutex::new(Vec::new()));

        let period_samples = self.settings.period_frames * spec.channels as usize;
        let period =
            Duration::from_secs_f64(self.settings.period_frames as f64 / spec.sample_rate as f64);
        let realtime = self.settings.realtime;

        let thread = {
            let running = Arc::clone(&running);
            let captured = Arc::clone(&captured);
            std::thread::Builder::new()
                .name(format!("{}-render", spec.name))
                .spawn(move || {
                    let mut out = vec![0.0f32; period_samples];
                    let mut deadline = Instant::now();
                    while running.load(Ordering::Acquire) {
                        pull(&mut out);
                        captured
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&out);

                        if realtime {
                            deadline += period;
                            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                                std::thread::sleep(wait);
                            }
                        }
                    }
                })
                .map_err(|e| Error::AudioError(format!("Failed to start render thread: {}", e)))?
        };

        info!(
            "Simulated device rendering '{}' every {:?} ({} samples)",
            spec.name, period, period_samples
        );

        Ok(Box::new(SimulatedClip {
            spec: spec.clone(),
            running,
            thread: Some(thread),
            captured,
            capture_path: self.capture_path.clone(),
        }))
    }
}

struct SimulatedClip {
    spec: ClipSpec,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    captured: Arc<Mutex<Vec<f32>>>,
    capture_path: Option<PathBuf>,
}

impl ClipResource for SimulatedClip {
    fn destroy(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Render thread for '{}' panicked", self.spec.name);
            }
        }

        let Some(path) = &self.capture_path else {
            return Ok(());
        };
        let samples = std::mem::take(
            &mut *self
                .captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let written = write_wav(path, &samples, self.spec.sample_rate, self.spec.channels)?;
        info!(
            "Captured {:.2}s of output to {}",
            written as f32 / (self.spec.sample_rate as f32 * self.spec.channels as f32),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn spec() -> ClipSpec {
        ClipSpec {
            name: "test".to_string(),
            length_samples: 64,
            channels: 1,
            sample_rate: 8000,
            streaming: true,
        }
    }

    #[test]
    fn test_device_pulls_until_destroyed() {
        let device = SimulatedDevice::new(
            DeviceSettings {
                period_frames: 8,
                realtime: false,
            },
            None,
        );
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);
        let mut clip = device
            .create_clip(
                &spec(),
                Box::new(move |out: &mut [f32]| {
                    assert_eq!(out.len(), 8);
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        while pulls.load(Ordering::SeqCst) < 3 {
            std::thread::yield_now();
        }
        clip.destroy().unwrap();
        let after = pulls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(pulls.load(Ordering::SeqCst), after);
    }
}
