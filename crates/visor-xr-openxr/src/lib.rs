//! Live backend: the system OpenXR loader plus the GLX context current on
//! the calling thread. Built only with the `runtime` feature on Linux;
//! otherwise every constructor reports the backend as unavailable.

use visor_xr::{GraphicsDevice, XrResult, XrRuntime};

#[cfg(all(feature = "runtime", target_os = "linux"))]
mod convert;
#[cfg(all(feature = "runtime", target_os = "linux"))]
mod glx;
#[cfg(all(feature = "runtime", target_os = "linux"))]
mod runtime;

#[cfg(all(feature = "runtime", target_os = "linux"))]
pub use glx::GlxGraphics;
#[cfg(all(feature = "runtime", target_os = "linux"))]
pub use runtime::OpenXrRuntime;

pub const fn is_available() -> bool {
    cfg!(all(feature = "runtime", target_os = "linux"))
}

/// Loads the OpenXR loader installed on this machine.
pub fn load_runtime() -> XrResult<Box<dyn XrRuntime>> {
    #[cfg(all(feature = "runtime", target_os = "linux"))]
    return Ok(Box::new(OpenXrRuntime::load()?));

    #[cfg(not(all(feature = "runtime", target_os = "linux")))]
    Err(visor_xr::XrError::unavailable(
        "built without the OpenXR runtime backend (enable the `runtime` feature on Linux)",
    ))
}

/// Wraps the graphics context current on the calling thread.
pub fn current_graphics() -> XrResult<Box<dyn GraphicsDevice>> {
    #[cfg(all(feature = "runtime", target_os = "linux"))]
    return Ok(Box::new(GlxGraphics::current()?));

    #[cfg(not(all(feature = "runtime", target_os = "linux")))]
    Err(visor_xr::XrError::unavailable(
        "built without the GLX graphics backend (enable the `runtime` feature on Linux)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use visor_xr::XrError;

    #[test]
    #[cfg(not(feature = "runtime"))]
    fn test_stub_reports_unavailable() {
        assert!(!is_available());
        assert!(matches!(load_runtime(), Err(XrError::Unavailable(_))));
        assert!(matches!(current_graphics(), Err(XrError::Unavailable(_))));
    }
}
