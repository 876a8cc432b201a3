//! The seam between the session machinery and the outside world.
//!
//! [`XrRuntime`] mirrors the subset of the XR runtime ABI the session needs;
//! [`GraphicsDevice`] is the graphics context that is already current on the
//! calling thread. Both are driven from a single thread and are therefore
//! not required to be `Send`.

use std::time::Duration;

use crate::error::RuntimeResult;
use crate::types::{
    ApplicationInfo, EnvironmentBlendMode, Extent2D, FormFactor, FrameTiming, GraphicsBinding,
    GraphicsRequirements, ImageHandle, InstanceHandle, Pose, ProjectionLayer,
    ReferenceSpaceType, RendererInfo, RuntimeEvent, SessionHandle, SpaceHandle, SwapchainDesc,
    SwapchainHandle, SystemId, SystemProperties, TextureHandle, View, ViewConfigView,
    ViewConfigurationType,
};

pub trait XrRuntime {
    fn enumerate_instance_extensions(&mut self) -> RuntimeResult<Vec<String>>;
    fn create_instance(
        &mut self,
        app: &ApplicationInfo,
        extensions: &[String],
    ) -> RuntimeResult<InstanceHandle>;
    fn destroy_instance(&mut self, instance: InstanceHandle) -> RuntimeResult<()>;

    fn get_system(
        &mut self,
        instance: InstanceHandle,
        form_factor: FormFactor,
    ) -> RuntimeResult<SystemId>;
    fn system_properties(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<SystemProperties>;
    fn enumerate_view_configurations(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<Vec<ViewConfigurationType>>;
    fn enumerate_view_configuration_views(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
        view_config: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigView>>;
    fn graphics_requirements(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<GraphicsRequirements>;

    fn create_session(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<SessionHandle>;
    fn destroy_session(&mut self, session: SessionHandle) -> RuntimeResult<()>;
    fn begin_session(
        &mut self,
        session: SessionHandle,
        view_config: ViewConfigurationType,
    ) -> RuntimeResult<()>;

    fn enumerate_reference_spaces(
        &mut self,
        session: SessionHandle,
    ) -> RuntimeResult<Vec<ReferenceSpaceType>>;
    fn create_reference_space(
        &mut self,
        session: SessionHandle,
        space_type: ReferenceSpaceType,
        pose_in_space: Pose,
    ) -> RuntimeResult<SpaceHandle>;
    fn destroy_space(&mut self, space: SpaceHandle) -> RuntimeResult<()>;

    fn enumerate_swapchain_formats(&mut self, session: SessionHandle) -> RuntimeResult<Vec<i64>>;
    fn create_swapchain(
        &mut self,
        session: SessionHandle,
        desc: &SwapchainDesc,
    ) -> RuntimeResult<SwapchainHandle>;
    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()>;
    fn swapchain_image_count(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32>;
    fn enumerate_swapchain_images(
        &mut self,
        swapchain: SwapchainHandle,
    ) -> RuntimeResult<Vec<ImageHandle>>;
    fn acquire_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32>;
    fn wait_swapchain_image(
        &mut self,
        swapchain: SwapchainHandle,
        timeout: Duration,
    ) -> RuntimeResult<()>;
    fn release_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()>;

    fn wait_frame(&mut self, session: SessionHandle) -> RuntimeResult<FrameTiming>;
    fn begin_frame(&mut self, session: SessionHandle) -> RuntimeResult<()>;
    fn end_frame(
        &mut self,
        session: SessionHandle,
        display_time: i64,
        blend_mode: EnvironmentBlendMode,
        layers: &[ProjectionLayer],
    ) -> RuntimeResult<()>;

    /// Non-blocking. `Ok(None)` is the "no event available" case.
    fn poll_event(&mut self, instance: InstanceHandle) -> RuntimeResult<Option<RuntimeEvent>>;

    fn locate_views(
        &mut self,
        session: SessionHandle,
        view_config: ViewConfigurationType,
        display_time: i64,
        space: SpaceHandle,
    ) -> RuntimeResult<Vec<View>>;
}

pub trait GraphicsDevice {
    /// Captures the context/drawable current on this thread. Never creates one.
    fn capture_binding(&mut self) -> RuntimeResult<GraphicsBinding>;

    fn renderer_info(&mut self) -> RendererInfo;

    /// Copies the lower-left `extent` of `source` into `target`.
    fn copy_texture(
        &mut self,
        source: TextureHandle,
        target: ImageHandle,
        extent: Extent2D,
    ) -> RuntimeResult<()>;
}
