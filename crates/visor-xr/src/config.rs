use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{XrError, XrResult};
use crate::types::{
    ApplicationInfo, FormFactor, ReferenceSpaceType, Version, ViewConfigurationType,
};

pub const OPENGL_ENABLE_EXTENSION: &str = "XR_KHR_opengl_enable";
/// API version the instance is created against (1.0.0).
pub const XR_API_VERSION: Version = Version::new(1, 0, 0);
/// Upper bound on events drained per eye-0 call under [`EventDrainPolicy::All`].
pub const MAX_EVENTS_PER_FRAME: usize = 64;

/// How many runtime events the frame driver consumes per eye-0 call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDrainPolicy {
    /// At most one event per frame.
    #[default]
    Single,
    /// Drain until the queue reports empty.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub application_name: String,
    pub application_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub graphics_extension: String,
    pub graphics_api_version: Version,
    pub form_factor: FormFactor,
    pub view_configuration: ViewConfigurationType,
    pub reference_space: ReferenceSpaceType,
    /// Upper bound for a single swapchain image wait, in nanoseconds.
    pub swapchain_wait_timeout_ns: u64,
    pub near_plane: f32,
    pub far_plane: f32,
    pub event_drain: EventDrainPolicy,
    /// Skip the frame whenever a session state change arrives, even one that
    /// leaves the session running and visible.
    pub state_change_aborts_frame: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_name: "Visor".to_string(),
            application_version: 1,
            engine_name: "Visor Engine".to_string(),
            engine_version: 0,
            graphics_extension: OPENGL_ENABLE_EXTENSION.to_string(),
            graphics_api_version: Version::new(4, 5, 0),
            form_factor: FormFactor::HeadMountedDisplay,
            view_configuration: ViewConfigurationType::PrimaryStereo,
            reference_space: ReferenceSpaceType::Local,
            swapchain_wait_timeout_ns: 1_000_000,
            near_plane: 0.05,
            far_plane: 100.0,
            event_drain: EventDrainPolicy::Single,
            state_change_aborts_frame: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> XrResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(XrError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> XrResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| XrError::config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> XrResult<()> {
        if self.graphics_extension.trim().is_empty() {
            return Err(XrError::config("graphics_extension must not be empty"));
        }
        if self.swapchain_wait_timeout_ns == 0 {
            return Err(XrError::config(
                "swapchain_wait_timeout_ns must be non-zero",
            ));
        }
        if !(self.near_plane > 0.0 && self.far_plane > self.near_plane) {
            return Err(XrError::config(format!(
                "clip planes must satisfy 0 < near < far (near {}, far {})",
                self.near_plane, self.far_plane
            )));
        }
        Ok(())
    }

    pub fn swapchain_wait_timeout(&self) -> Duration {
        Duration::from_nanos(self.swapchain_wait_timeout_ns)
    }

    pub fn application_info(&self) -> ApplicationInfo {
        ApplicationInfo {
            application_name: self.application_name.clone(),
            application_version: self.application_version,
            engine_name: self.engine_name.clone(),
            engine_version: self.engine_version,
            api_version: XR_API_VERSION,
        }
    }
}
