use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use tracing::error;

use crate::types::Version;

/// Non-success result code returned by a runtime call, together with the
/// runtime's own string for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} ({code})")]
pub struct RuntimeError {
    pub code: i32,
    pub name: Cow<'static, str>,
}

impl RuntimeError {
    pub fn new(code: i32, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }

    pub fn runtime_failure() -> Self {
        Self::new(-2, "XR_ERROR_RUNTIME_FAILURE")
    }

    pub fn timeout_expired() -> Self {
        Self::new(1, "XR_TIMEOUT_EXPIRED")
    }

    pub fn function_unsupported() -> Self {
        Self::new(-7, "XR_ERROR_FUNCTION_UNSUPPORTED")
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Capability negotiation failures. Each aborts session creation.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("runtime does not support extension {0}")]
    UnsupportedExtension(String),
    #[error("no system available for the requested form factor")]
    NoSuitableSystem(#[source] RuntimeError),
    #[error("view configuration {0} not offered by the runtime")]
    UnsupportedViewConfig(String),
    #[error("view configuration query failed")]
    ViewConfigQueryFailed(#[source] RuntimeError),
    #[error("graphics API {desired} outside runtime range [{min}, {max}]")]
    GraphicsVersionMismatch {
        desired: Version,
        min: Version,
        max: Version,
    },
    #[error("reference space {0} not supported by the session")]
    UnsupportedReferenceSpace(String),
}

#[derive(Debug, Error)]
pub enum XrError {
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("{call} failed: {source}")]
    RuntimeCall {
        call: &'static str,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to create swapchain for view {view}: {source}")]
    SwapchainCreationFailed {
        view: usize,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to enumerate swapchain images for view {view}: {source}")]
    ImageEnumerationFailed {
        view: usize,
        #[source]
        source: RuntimeError,
    },
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("view {view} out of range (view count {view_count})")]
    ViewOutOfRange { view: usize, view_count: usize },
    #[error("expected view {expected}, got view {got}")]
    ViewOrder { expected: usize, got: usize },
    #[error("swapchain image order violated on view {view}: {detail}")]
    ImageOrder { view: usize, detail: &'static str },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("context has been released")]
    ContextReleased,
}

impl XrError {
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn unavailable(msg: impl fmt::Display) -> Self {
        Self::Unavailable(msg.to_string())
    }
}

pub type XrResult<T> = Result<T, XrError>;

/// Logs a failed runtime call with its translated result string and turns
/// it into an [`XrError::RuntimeCall`].
pub fn check<T>(call: &'static str, result: RuntimeResult<T>) -> XrResult<T> {
    result.map_err(|source| {
        error!("{call} failed [{}]", source.name);
        XrError::RuntimeCall { call, source }
    })
}

/// Like [`check`], but for calls whose failure is a negotiation error.
pub(crate) fn check_with<T>(
    call: &'static str,
    result: RuntimeResult<T>,
    map: impl FnOnce(RuntimeError) -> NegotiationError,
) -> XrResult<T> {
    result.map_err(|source| {
        error!("{call} failed [{}]", source.name);
        XrError::Negotiation(map(source))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_success_through() {
        let value = check("xrGetSystem", Ok::<_, RuntimeError>(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_check_names_the_call_and_result() {
        let err = check::<()>("xrBeginFrame", Err(RuntimeError::runtime_failure())).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("xrBeginFrame"));
        assert!(message.contains("XR_ERROR_RUNTIME_FAILURE"));
    }

    #[test]
    fn test_runtime_error_displays_name_and_code() {
        let err = RuntimeError::timeout_expired();
        assert_eq!(err.to_string(), "XR_TIMEOUT_EXPIRED (1)");

        let wrapped = XrError::RuntimeCall {
            call: "xrWaitSwapchainImage",
            source: err.clone(),
        };
        let source = std::error::Error::source(&wrapped).map(|s| s.to_string());
        assert_eq!(source, Some(err.to_string()));
    }

    #[test]
    fn test_negotiation_error_converts() {
        let err: XrError = NegotiationError::UnsupportedExtension("XR_KHR_opengl_enable".into()).into();
        assert!(matches!(
            err,
            XrError::Negotiation(NegotiationError::UnsupportedExtension(_))
        ));
    }
}
