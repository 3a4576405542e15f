//! Host output clip: scoped ownership of the device-side streaming resource.
//!
//! The host audio engine owns the actual device and schedules the pull
//! callback. This module only models acquiring that resource and releasing it
//! exactly once, from whichever thread tears the speaker down.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Real-time callback the host invokes with a fixed-size output buffer.
pub type PullCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Default clip name registered with the host
pub const DEFAULT_CLIP_NAME: &str = "PCMStreamClip";

/// Parameters for creating a streaming clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSpec {
    pub name: String,
    /// Clip length in samples
    pub length_samples: usize,
    pub channels: u16,
    pub sample_rate: u32,
    /// Pull audio through the callback instead of preloading it
    pub streaming: bool,
}

/// A resource owned by the host audio engine.
pub trait ClipResource: Send {
    /// Destroy the host-side resource. Called at most once per resource.
    fn destroy(&mut self) -> Result<()>;
}

/// Host audio engine able to create streaming clips
pub trait AudioHost {
    /// Create a clip that calls `pull` on the host's real-time schedule.
    fn create_clip(&self, spec: &ClipSpec, pull: PullCallback) -> Result<Box<dyn ClipResource>>;
}

/// Owned handle to a host clip. Released on drop if not released earlier.
pub struct OutputClip {
    spec: ClipSpec,
    resource: Mutex<Option<Box<dyn ClipResource>>>,
}

impl OutputClip {
    /// Create a clip on `host` wired to `pull`
    pub fn create(host: &dyn AudioHost, spec: ClipSpec, pull: PullCallback) -> Result<Self> {
        if spec.length_samples == 0 || spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::AudioError(format!("Invalid clip spec: {:?}", spec)));
        }

        let resource = host.create_clip(&spec, pull)?;
        info!(
            "Created clip '{}' ({} samples, {} ch, {} Hz)",
            spec.name, spec.length_samples, spec.channels, spec.sample_rate
        );

        Ok(Self {
            spec,
            resource: Mutex::new(Some(resource)),
        })
    }

    pub fn spec(&self) -> &ClipSpec {
        &self.spec
    }

    /// Whether the host resource is still held
    pub fn is_live(&self) -> bool {
        self.resource
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Destroy the host resource.
    ///
    /// Returns `Ok(false)` if it was already released. The resource is
    /// considered released even if `destroy` fails.
    pub fn release(&self) -> Result<bool> {
        let taken = self
            .resource
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match taken {
            Some(mut resource) => {
                debug!("Releasing clip '{}'", self.spec.name);
                resource.destroy()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for OutputClip {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release clip '{}': {}", self.spec.name, e);
        }
    }
}
