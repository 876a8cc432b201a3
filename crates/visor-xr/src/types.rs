use std::fmt;

use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub fn as_raw(self) -> u64 {
                self.0
            }
        }
    };
}

raw_handle!(
    /// Runtime instance.
    InstanceHandle
);
raw_handle!(
    /// System (device) selected for a form factor.
    SystemId
);
raw_handle!(SessionHandle);
raw_handle!(SpaceHandle);
raw_handle!(SwapchainHandle);

/// Runtime-owned color target backing one swapchain slot (a GL texture name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

/// Host-owned color texture that gets copied into a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Packed `major.minor.patch` version, laid out like `XR_MAKE_VERSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "VersionParts", into = "VersionParts")]
pub struct Version(u64);

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u32) -> Self {
        Self(((major as u64) << 48) | ((minor as u64) << 32) | patch as u64)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 48) as u16
    }

    pub const fn minor(self) -> u16 {
        ((self.0 >> 32) & 0xffff) as u16
    }

    pub const fn patch(self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct VersionParts {
    major: u16,
    minor: u16,
    #[serde(default)]
    patch: u32,
}

impl From<VersionParts> for Version {
    fn from(parts: VersionParts) -> Self {
        Version::new(parts.major, parts.minor, parts.patch)
    }
}

impl From<Version> for VersionParts {
    fn from(version: Version) -> Self {
        Self {
            major: version.major(),
            minor: version.minor(),
            patch: version.patch(),
        }
    }
}

/// Identity handed to the runtime at instance creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub application_name: String,
    pub application_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    HeadMountedDisplay,
    HandheldDisplay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewConfigurationType {
    PrimaryMono,
    PrimaryStereo,
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSpaceType {
    View,
    Local,
    Stage,
    Other(i32),
}

/// Session lifecycle states, ordered like the runtime's numeric values so
/// that `<=`/`>=` comparisons match the runtime's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Unknown = 0,
    Idle = 1,
    Ready = 2,
    Synchronized = 3,
    Visible = 4,
    Focused = 5,
    Stopping = 6,
    LossPending = 7,
    Exiting = 8,
}

impl SessionState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Idle,
            2 => Self::Ready,
            3 => Self::Synchronized,
            4 => Self::Visible,
            5 => Self::Focused,
            6 => Self::Stopping,
            7 => Self::LossPending,
            8 => Self::Exiting,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProperties {
    pub system_name: String,
    pub vendor_id: u32,
    pub max_swapchain_width: u32,
    pub max_swapchain_height: u32,
    pub max_layer_count: u32,
    pub orientation_tracking: bool,
    pub position_tracking: bool,
}

/// Per-view rendering recommendation reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfigView {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub recommended_sample_count: u32,
}

impl ViewConfigView {
    pub fn square(size: u32) -> Self {
        Self {
            recommended_width: size,
            recommended_height: size,
            max_width: size,
            max_height: size,
            recommended_sample_count: 1,
        }
    }

    pub fn recommended_extent(&self) -> Extent2D {
        Extent2D {
            width: self.recommended_width,
            height: self.recommended_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsRequirements {
    pub min_api_version: Version,
    pub max_api_version: Version,
}

impl GraphicsRequirements {
    pub fn admits(&self, version: Version) -> bool {
        version >= self.min_api_version && version <= self.max_api_version
    }
}

/// Native handles of the graphics context that was current when the
/// binding was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphicsBinding {
    pub display: u64,
    pub visual_id: u32,
    pub fb_config: u64,
    pub drawable: u64,
    pub context: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererInfo {
    pub version: String,
    pub renderer: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view as four half-angles in radians (left and down negative).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    pub fn symmetric(half_angle: f32) -> Self {
        Self {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }
}

/// One located view: where the eye is and what it sees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct View {
    pub pose: Pose,
    pub fov: Fov,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub extent: Extent2D,
}

impl Rect2D {
    pub fn full(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, extent }
    }
}

bitflags! {
    /// Swapchain usage bits, numbered like the runtime's.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SwapchainUsage: u32 {
        const COLOR_ATTACHMENT = 0x1;
        const DEPTH_STENCIL_ATTACHMENT = 0x2;
        const TRANSFER_SRC = 0x8;
        const TRANSFER_DST = 0x10;
        const SAMPLED = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub usage: SwapchainUsage,
    pub format: i64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
}

impl SwapchainDesc {
    /// Single-sampled, single-layer color target sized to `extent`.
    pub fn color(format: i64, extent: Extent2D) -> Self {
        Self {
            usage: SwapchainUsage::SAMPLED | SwapchainUsage::COLOR_ATTACHMENT,
            format,
            sample_count: 1,
            width: extent.width,
            height: extent.height,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        }
    }
}

/// Timing the runtime hands back from wait-frame. Times are nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTiming {
    pub predicted_display_time: i64,
    pub predicted_display_period: i64,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentBlendMode {
    #[default]
    Opaque,
    Additive,
    AlphaBlend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubImage {
    pub swapchain: SwapchainHandle,
    pub image_rect: Rect2D,
    pub buffer_index: u32,
}

/// Per-view record of one projection layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionView {
    pub pose: Pose,
    pub fov: Fov,
    pub sub_image: SubImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionLayer {
    pub space: SpaceHandle,
    pub views: Vec<ProjectionView>,
}

/// Events drained from the runtime's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    EventsLost { lost_event_count: u32 },
    InstanceLossPending { loss_time: i64 },
    SessionStateChanged { state: SessionState, time: i64 },
    ReferenceSpaceChangePending { space_type: ReferenceSpaceType },
    InteractionProfileChanged,
    Unknown { raw_type: i32 },
}
