//! Capability negotiation.
//!
//! Negotiation runs in three phases because the runtime only answers some
//! questions once an instance or a session exists: the extension check
//! happens before instance creation, the system/view/graphics checks need an
//! instance, and the reference-space check needs a session. Every check is a
//! hard failure.

use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{check, check_with, NegotiationError, XrResult};
use crate::runtime::XrRuntime;
use crate::types::{
    GraphicsRequirements, InstanceHandle, ReferenceSpaceType, SessionHandle, SystemId,
    SystemProperties, ViewConfigView, ViewConfigurationType,
};

/// What the runtime agreed to for the configured system.
#[derive(Debug, Clone)]
pub struct SystemCaps {
    pub system: SystemId,
    pub properties: SystemProperties,
    pub view_configuration: ViewConfigurationType,
    pub views: Vec<ViewConfigView>,
    pub graphics: GraphicsRequirements,
}

/// Everything negotiation settled on, kept by the session for its lifetime.
#[derive(Debug, Clone)]
pub struct NegotiatedCaps {
    pub extensions: Vec<String>,
    pub system: SystemCaps,
    pub reference_space: ReferenceSpaceType,
}

pub struct Negotiator<'a> {
    config: &'a SessionConfig,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    /// Checks the graphics-binding extension and returns the list of
    /// extensions to enable on the instance.
    pub fn require_extension(&self, runtime: &mut dyn XrRuntime) -> XrResult<Vec<String>> {
        let available = check(
            "xrEnumerateInstanceExtensionProperties",
            runtime.enumerate_instance_extensions(),
        )?;
        debug!("runtime offers {} instance extensions", available.len());

        let wanted = &self.config.graphics_extension;
        if !available.iter().any(|ext| ext == wanted) {
            return Err(NegotiationError::UnsupportedExtension(wanted.clone()).into());
        }
        Ok(vec![wanted.clone()])
    }

    /// Form factor, view configuration, per-view recommendations and the
    /// graphics API window.
    pub fn negotiate(
        &self,
        runtime: &mut dyn XrRuntime,
        instance: InstanceHandle,
    ) -> XrResult<SystemCaps> {
        let system = check_with(
            "xrGetSystem",
            runtime.get_system(instance, self.config.form_factor),
            NegotiationError::NoSuitableSystem,
        )?;

        let properties = check(
            "xrGetSystemProperties",
            runtime.system_properties(instance, system),
        )?;
        info!(
            "system '{}' (vendor 0x{:x}): max swapchain {}x{}, {} layers, tracking orientation={} position={}",
            properties.system_name,
            properties.vendor_id,
            properties.max_swapchain_width,
            properties.max_swapchain_height,
            properties.max_layer_count,
            properties.orientation_tracking,
            properties.position_tracking,
        );

        let view_configuration = self.config.view_configuration;
        let offered = check_with(
            "xrEnumerateViewConfigurations",
            runtime.enumerate_view_configurations(instance, system),
            NegotiationError::ViewConfigQueryFailed,
        )?;
        if !offered.contains(&view_configuration) {
            return Err(
                NegotiationError::UnsupportedViewConfig(format!("{view_configuration:?}")).into(),
            );
        }

        let views = check_with(
            "xrEnumerateViewConfigurationViews",
            runtime.enumerate_view_configuration_views(instance, system, view_configuration),
            NegotiationError::ViewConfigQueryFailed,
        )?;
        if views.is_empty() {
            return Err(NegotiationError::UnsupportedViewConfig(format!(
                "{view_configuration:?} reports no views"
            ))
            .into());
        }
        for (index, view) in views.iter().enumerate() {
            debug!(
                "view {index}: recommended {}x{}, max {}x{}",
                view.recommended_width, view.recommended_height, view.max_width, view.max_height
            );
        }

        let graphics = check(
            "xrGetOpenGLGraphicsRequirementsKHR",
            runtime.graphics_requirements(instance, system),
        )?;
        let desired = self.config.graphics_api_version;
        if !graphics.admits(desired) {
            return Err(NegotiationError::GraphicsVersionMismatch {
                desired,
                min: graphics.min_api_version,
                max: graphics.max_api_version,
            }
            .into());
        }

        Ok(SystemCaps {
            system,
            properties,
            view_configuration,
            views,
            graphics,
        })
    }

    pub fn require_reference_space(
        &self,
        runtime: &mut dyn XrRuntime,
        session: SessionHandle,
    ) -> XrResult<ReferenceSpaceType> {
        let wanted = self.config.reference_space;
        let supported = check(
            "xrEnumerateReferenceSpaces",
            runtime.enumerate_reference_spaces(session),
        )?;
        if !supported.contains(&wanted) {
            return Err(NegotiationError::UnsupportedReferenceSpace(format!("{wanted:?}")).into());
        }
        Ok(wanted)
    }
}
