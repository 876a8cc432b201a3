#![forbid(unsafe_code)]

//! HMD session lifecycle over an XR runtime: capability negotiation, a
//! per-view swapchain pool, the per-view frame driver and a refcounted
//! context registry. Runtime and graphics access go through the
//! [`XrRuntime`] and [`GraphicsDevice`] traits.

pub mod config;
pub mod error;
pub mod frame;
pub mod mock;
pub mod negotiate;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod swapchain;
pub mod types;
pub mod views;

pub use config::{EventDrainPolicy, SessionConfig};
pub use error::{NegotiationError, RuntimeError, RuntimeResult, XrError, XrResult};
pub use frame::{FramePhase, FrameStatus, SkipReason};
pub use negotiate::{NegotiatedCaps, Negotiator, SystemCaps};
pub use registry::{ContextHandle, ContextRegistry, SessionFactory};
pub use runtime::{GraphicsDevice, XrRuntime};
pub use session::Session;
pub use swapchain::{ImageState, SwapchainPool};
pub use types::{Fov, Pose, SessionState, TextureHandle, View, ViewConfigView};
pub use views::{projection_from_fov, view_from_pose};
