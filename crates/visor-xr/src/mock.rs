//! Scripted in-memory runtime for host-side tests and the CLI simulator.
//!
//! [`MockRuntime`] and [`MockGraphics`] share one call log with the
//! [`MockProbe`] returned alongside them, so a test can hand the runtime to a
//! session and still inspect every call it made. Swapchain images are
//! tracked with the runtime's acquire/wait/release rules and violations are
//! reported as `XR_ERROR_CALL_ORDER_INVALID`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use glam::Vec3;

use crate::config::OPENGL_ENABLE_EXTENSION;
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{GraphicsDevice, XrRuntime};
use crate::types::{
    ApplicationInfo, EnvironmentBlendMode, Extent2D, FormFactor, Fov, FrameTiming,
    GraphicsBinding, GraphicsRequirements, ImageHandle, InstanceHandle, Pose, ProjectionLayer,
    ReferenceSpaceType, RendererInfo, RuntimeEvent, SessionHandle, SessionState, SpaceHandle,
    SwapchainDesc, SwapchainHandle, SystemId, SystemProperties, TextureHandle, Version, View,
    ViewConfigView, ViewConfigurationType,
};

pub const GL_RGBA8: i64 = 0x8058;
pub const GL_SRGB8_ALPHA8: i64 = 0x8C43;
/// Half inter-pupillary distance used for the default located views.
const HALF_IPD: f32 = 0.032;

#[derive(Debug, Clone)]
pub struct MockSpec {
    pub extensions: Vec<String>,
    pub form_factors: Vec<FormFactor>,
    pub properties: SystemProperties,
    pub view_configurations: Vec<ViewConfigurationType>,
    pub views: Vec<ViewConfigView>,
    pub graphics: GraphicsRequirements,
    pub reference_spaces: Vec<ReferenceSpaceType>,
    pub swapchain_formats: Vec<i64>,
    /// Image count for swapchain `n`; the last entry repeats.
    pub images_per_swapchain: Vec<u32>,
    /// Views returned by locate-views; the last entry repeats.
    pub located_views: Vec<View>,
    pub frame_period_ns: i64,
    pub should_render: bool,
}

impl MockSpec {
    /// Stereo HMD with square views of `size` and `images` images per swapchain.
    pub fn stereo(size: u32, images: u32) -> Self {
        Self {
            views: vec![ViewConfigView::square(size); 2],
            images_per_swapchain: vec![images],
            ..Self::default()
        }
    }
}

impl Default for MockSpec {
    fn default() -> Self {
        let fov = Fov::symmetric(45f32.to_radians());
        Self {
            extensions: vec![
                "XR_EXT_debug_utils".to_string(),
                OPENGL_ENABLE_EXTENSION.to_string(),
            ],
            form_factors: vec![FormFactor::HeadMountedDisplay],
            properties: SystemProperties {
                system_name: "Mock HMD".to_string(),
                vendor_id: 0x1d5c,
                max_swapchain_width: 4096,
                max_swapchain_height: 4096,
                max_layer_count: 16,
                orientation_tracking: true,
                position_tracking: true,
            },
            view_configurations: vec![
                ViewConfigurationType::PrimaryMono,
                ViewConfigurationType::PrimaryStereo,
            ],
            views: vec![ViewConfigView::square(1024); 2],
            graphics: GraphicsRequirements {
                min_api_version: Version::new(4, 0, 0),
                max_api_version: Version::new(4, 6, 0),
            },
            reference_spaces: vec![
                ReferenceSpaceType::View,
                ReferenceSpaceType::Local,
                ReferenceSpaceType::Stage,
            ],
            swapchain_formats: vec![GL_SRGB8_ALPHA8, GL_RGBA8],
            images_per_swapchain: vec![3],
            located_views: vec![
                View {
                    pose: Pose {
                        position: Vec3::new(-HALF_IPD, 1.6, 0.0),
                        ..Pose::IDENTITY
                    },
                    fov,
                },
                View {
                    pose: Pose {
                        position: Vec3::new(HALF_IPD, 1.6, 0.0),
                        ..Pose::IDENTITY
                    },
                    fov,
                },
            ],
            frame_period_ns: 11_111_111,
            should_render: true,
        }
    }
}

/// One recorded call, in the order it reached the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    EnumerateExtensions,
    CreateInstance { extensions: Vec<String> },
    DestroyInstance(InstanceHandle),
    GetSystem,
    SystemProperties,
    EnumerateViewConfigurations,
    EnumerateViewConfigurationViews,
    GraphicsRequirements,
    CreateSession,
    DestroySession(SessionHandle),
    BeginSession,
    EnumerateReferenceSpaces,
    CreateReferenceSpace(ReferenceSpaceType),
    DestroySpace(SpaceHandle),
    EnumerateSwapchainFormats,
    CreateSwapchain(SwapchainHandle, SwapchainDesc),
    DestroySwapchain(SwapchainHandle),
    SwapchainImageCount(SwapchainHandle),
    EnumerateSwapchainImages(SwapchainHandle),
    AcquireImage(SwapchainHandle),
    WaitImage(SwapchainHandle, Duration),
    ReleaseImage(SwapchainHandle),
    WaitFrame,
    BeginFrame,
    EndFrame { display_time: i64, layers: Vec<ProjectionLayer> },
    PollEvent,
    LocateViews { display_time: i64 },
    CaptureBinding,
    CopyTexture { source: TextureHandle, target: ImageHandle, extent: Extent2D },
}

impl MockCall {
    /// Runtime entry-point name, used as the key for injected failures.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnumerateExtensions => "xrEnumerateInstanceExtensionProperties",
            Self::CreateInstance { .. } => "xrCreateInstance",
            Self::DestroyInstance(_) => "xrDestroyInstance",
            Self::GetSystem => "xrGetSystem",
            Self::SystemProperties => "xrGetSystemProperties",
            Self::EnumerateViewConfigurations => "xrEnumerateViewConfigurations",
            Self::EnumerateViewConfigurationViews => "xrEnumerateViewConfigurationViews",
            Self::GraphicsRequirements => "xrGetOpenGLGraphicsRequirementsKHR",
            Self::CreateSession => "xrCreateSession",
            Self::DestroySession(_) => "xrDestroySession",
            Self::BeginSession => "xrBeginSession",
            Self::EnumerateReferenceSpaces => "xrEnumerateReferenceSpaces",
            Self::CreateReferenceSpace(_) => "xrCreateReferenceSpace",
            Self::DestroySpace(_) => "xrDestroySpace",
            Self::EnumerateSwapchainFormats => "xrEnumerateSwapchainFormats",
            Self::CreateSwapchain(..) => "xrCreateSwapchain",
            Self::DestroySwapchain(_) => "xrDestroySwapchain",
            Self::SwapchainImageCount(_) => "xrEnumerateSwapchainImages(count)",
            Self::EnumerateSwapchainImages(_) => "xrEnumerateSwapchainImages",
            Self::AcquireImage(_) => "xrAcquireSwapchainImage",
            Self::WaitImage(..) => "xrWaitSwapchainImage",
            Self::ReleaseImage(_) => "xrReleaseSwapchainImage",
            Self::WaitFrame => "xrWaitFrame",
            Self::BeginFrame => "xrBeginFrame",
            Self::EndFrame { .. } => "xrEndFrame",
            Self::PollEvent => "xrPollEvent",
            Self::LocateViews { .. } => "xrLocateViews",
            Self::CaptureBinding => "captureBinding",
            Self::CopyTexture { .. } => "copyTexture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockImageState {
    Idle,
    Acquired,
    Waited,
}

#[derive(Debug)]
struct MockSwapchain {
    images: Vec<ImageHandle>,
    next_index: u32,
    state: MockImageState,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    events: VecDeque<RuntimeEvent>,
    fail_next: HashMap<&'static str, RuntimeError>,
    fail_always: HashMap<&'static str, RuntimeError>,
    next_handle: u64,
    next_image: u32,
    frame_index: i64,
    instances: HashSet<InstanceHandle>,
    sessions: HashSet<SessionHandle>,
    spaces: HashSet<SpaceHandle>,
    swapchains: HashMap<SwapchainHandle, MockSwapchain>,
    created_swapchains: usize,
}

impl MockState {
    fn record(&mut self, call: MockCall) -> RuntimeResult<()> {
        let name = call.name();
        self.calls.push(call);
        if let Some(err) = self.fail_next.remove(name) {
            return Err(err);
        }
        if let Some(err) = self.fail_always.get(name) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

fn call_order_invalid() -> RuntimeError {
    RuntimeError::new(-37, "XR_ERROR_CALL_ORDER_INVALID")
}

fn handle_invalid() -> RuntimeError {
    RuntimeError::new(-12, "XR_ERROR_HANDLE_INVALID")
}

/// Read/inject side of a mock runtime.
#[derive(Clone)]
pub struct MockProbe {
    state: Rc<RefCell<MockState>>,
}

impl MockProbe {
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Queues an event for a later poll.
    pub fn push_event(&self, event: RuntimeEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    pub fn push_state(&self, state: SessionState) {
        self.push_event(RuntimeEvent::SessionStateChanged { state, time: 0 });
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().events.len()
    }

    /// Fails the next call to `name` with `err`.
    pub fn fail_next(&self, name: &'static str, err: RuntimeError) {
        self.state.borrow_mut().fail_next.insert(name, err);
    }

    /// Fails every call to `name` until [`MockProbe::heal`] is called.
    pub fn fail_always(&self, name: &'static str, err: RuntimeError) {
        self.state.borrow_mut().fail_always.insert(name, err);
    }

    pub fn heal(&self, name: &'static str) {
        let mut state = self.state.borrow_mut();
        state.fail_next.remove(name);
        state.fail_always.remove(name);
    }

    pub fn live_instances(&self) -> usize {
        self.state.borrow().instances.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.borrow().sessions.len()
    }

    pub fn live_spaces(&self) -> usize {
        self.state.borrow().spaces.len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }

    pub fn created_swapchains(&self) -> usize {
        self.state.borrow().created_swapchains
    }

    /// A graphics device sharing this probe's call log.
    pub fn graphics(&self) -> MockGraphics {
        MockGraphics {
            state: Rc::clone(&self.state),
        }
    }

    /// Another runtime reporting into this probe, for hosts that rebuild
    /// their session.
    pub fn runtime(&self, spec: MockSpec) -> MockRuntime {
        MockRuntime {
            spec,
            state: Rc::clone(&self.state),
        }
    }
}

pub struct MockRuntime {
    spec: MockSpec,
    state: Rc<RefCell<MockState>>,
}

impl MockRuntime {
    pub fn new(spec: MockSpec) -> (Self, MockProbe) {
        let state = Rc::new(RefCell::new(MockState::default()));
        let probe = MockProbe {
            state: Rc::clone(&state),
        };
        (Self { spec, state }, probe)
    }

    fn record(&self, call: MockCall) -> RuntimeResult<()> {
        self.state.borrow_mut().record(call)
    }

    fn images_for(&self, ordinal: usize) -> u32 {
        self.spec
            .images_per_swapchain
            .get(ordinal)
            .or(self.spec.images_per_swapchain.last())
            .copied()
            .unwrap_or(3)
    }

    fn with_swapchain<T>(
        &self,
        swapchain: SwapchainHandle,
        f: impl FnOnce(&mut MockSwapchain) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let mut state = self.state.borrow_mut();
        let chain = state.swapchains.get_mut(&swapchain).ok_or_else(handle_invalid)?;
        f(chain)
    }
}

impl XrRuntime for MockRuntime {
    fn enumerate_instance_extensions(&mut self) -> RuntimeResult<Vec<String>> {
        self.record(MockCall::EnumerateExtensions)?;
        Ok(self.spec.extensions.clone())
    }

    fn create_instance(
        &mut self,
        _app: &ApplicationInfo,
        extensions: &[String],
    ) -> RuntimeResult<InstanceHandle> {
        self.record(MockCall::CreateInstance {
            extensions: extensions.to_vec(),
        })?;
        if extensions.iter().any(|ext| !self.spec.extensions.contains(ext)) {
            return Err(RuntimeError::new(-9, "XR_ERROR_EXTENSION_NOT_PRESENT"));
        }
        let mut state = self.state.borrow_mut();
        let instance = InstanceHandle(state.handle());
        state.instances.insert(instance);
        Ok(instance)
    }

    fn destroy_instance(&mut self, instance: InstanceHandle) -> RuntimeResult<()> {
        self.record(MockCall::DestroyInstance(instance))?;
        if self.state.borrow_mut().instances.remove(&instance) {
            Ok(())
        } else {
            Err(handle_invalid())
        }
    }

    fn get_system(
        &mut self,
        _instance: InstanceHandle,
        form_factor: FormFactor,
    ) -> RuntimeResult<SystemId> {
        self.record(MockCall::GetSystem)?;
        if !self.spec.form_factors.contains(&form_factor) {
            return Err(RuntimeError::new(-34, "XR_ERROR_FORM_FACTOR_UNSUPPORTED"));
        }
        Ok(SystemId(1))
    }

    fn system_properties(
        &mut self,
        _instance: InstanceHandle,
        _system: SystemId,
    ) -> RuntimeResult<SystemProperties> {
        self.record(MockCall::SystemProperties)?;
        Ok(self.spec.properties.clone())
    }

    fn enumerate_view_configurations(
        &mut self,
        _instance: InstanceHandle,
        _system: SystemId,
    ) -> RuntimeResult<Vec<ViewConfigurationType>> {
        self.record(MockCall::EnumerateViewConfigurations)?;
        Ok(self.spec.view_configurations.clone())
    }

    fn enumerate_view_configuration_views(
        &mut self,
        _instance: InstanceHandle,
        _system: SystemId,
        _view_config: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigView>> {
        self.record(MockCall::EnumerateViewConfigurationViews)?;
        Ok(self.spec.views.clone())
    }

    fn graphics_requirements(
        &mut self,
        _instance: InstanceHandle,
        _system: SystemId,
    ) -> RuntimeResult<GraphicsRequirements> {
        self.record(MockCall::GraphicsRequirements)?;
        Ok(self.spec.graphics)
    }

    fn create_session(
        &mut self,
        _instance: InstanceHandle,
        _system: SystemId,
        _binding: &GraphicsBinding,
    ) -> RuntimeResult<SessionHandle> {
        self.record(MockCall::CreateSession)?;
        let mut state = self.state.borrow_mut();
        let session = SessionHandle(state.handle());
        state.sessions.insert(session);
        Ok(session)
    }

    fn destroy_session(&mut self, session: SessionHandle) -> RuntimeResult<()> {
        self.record(MockCall::DestroySession(session))?;
        if self.state.borrow_mut().sessions.remove(&session) {
            Ok(())
        } else {
            Err(handle_invalid())
        }
    }

    fn begin_session(
        &mut self,
        _session: SessionHandle,
        _view_config: ViewConfigurationType,
    ) -> RuntimeResult<()> {
        self.record(MockCall::BeginSession)
    }

    fn enumerate_reference_spaces(
        &mut self,
        _session: SessionHandle,
    ) -> RuntimeResult<Vec<ReferenceSpaceType>> {
        self.record(MockCall::EnumerateReferenceSpaces)?;
        Ok(self.spec.reference_spaces.clone())
    }

    fn create_reference_space(
        &mut self,
        _session: SessionHandle,
        space_type: ReferenceSpaceType,
        _pose_in_space: Pose,
    ) -> RuntimeResult<SpaceHandle> {
        self.record(MockCall::CreateReferenceSpace(space_type))?;
        let mut state = self.state.borrow_mut();
        let space = SpaceHandle(state.handle());
        state.spaces.insert(space);
        Ok(space)
    }

    fn destroy_space(&mut self, space: SpaceHandle) -> RuntimeResult<()> {
        self.record(MockCall::DestroySpace(space))?;
        if self.state.borrow_mut().spaces.remove(&space) {
            Ok(())
        } else {
            Err(handle_invalid())
        }
    }

    fn enumerate_swapchain_formats(&mut self, _session: SessionHandle) -> RuntimeResult<Vec<i64>> {
        self.record(MockCall::EnumerateSwapchainFormats)?;
        Ok(self.spec.swapchain_formats.clone())
    }

    fn create_swapchain(
        &mut self,
        _session: SessionHandle,
        desc: &SwapchainDesc,
    ) -> RuntimeResult<SwapchainHandle> {
        let ordinal = self.state.borrow().created_swapchains;
        let handle = SwapchainHandle(self.state.borrow_mut().handle());
        self.record(MockCall::CreateSwapchain(handle, *desc))?;
        let count = self.images_for(ordinal);
        let mut state = self.state.borrow_mut();
        let images: Vec<ImageHandle> = (0..count)
            .map(|_| {
                state.next_image += 1;
                ImageHandle(state.next_image)
            })
            .collect();
        state.swapchains.insert(
            handle,
            MockSwapchain {
                images,
                next_index: 0,
                state: MockImageState::Idle,
            },
        );
        state.created_swapchains += 1;
        Ok(handle)
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        self.record(MockCall::DestroySwapchain(swapchain))?;
        match self.state.borrow_mut().swapchains.remove(&swapchain) {
            Some(_) => Ok(()),
            None => Err(handle_invalid()),
        }
    }

    fn swapchain_image_count(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        self.record(MockCall::SwapchainImageCount(swapchain))?;
        self.with_swapchain(swapchain, |chain| Ok(chain.images.len() as u32))
    }

    fn enumerate_swapchain_images(
        &mut self,
        swapchain: SwapchainHandle,
    ) -> RuntimeResult<Vec<ImageHandle>> {
        self.record(MockCall::EnumerateSwapchainImages(swapchain))?;
        self.with_swapchain(swapchain, |chain| Ok(chain.images.clone()))
    }

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        self.record(MockCall::AcquireImage(swapchain))?;
        self.with_swapchain(swapchain, |chain| {
            if chain.state != MockImageState::Idle {
                return Err(call_order_invalid());
            }
            let index = chain.next_index;
            chain.next_index = (chain.next_index + 1) % chain.images.len().max(1) as u32;
            chain.state = MockImageState::Acquired;
            Ok(index)
        })
    }

    fn wait_swapchain_image(
        &mut self,
        swapchain: SwapchainHandle,
        timeout: Duration,
    ) -> RuntimeResult<()> {
        self.record(MockCall::WaitImage(swapchain, timeout))?;
        self.with_swapchain(swapchain, |chain| {
            if chain.state != MockImageState::Acquired {
                return Err(call_order_invalid());
            }
            chain.state = MockImageState::Waited;
            Ok(())
        })
    }

    fn release_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        self.record(MockCall::ReleaseImage(swapchain))?;
        self.with_swapchain(swapchain, |chain| {
            if chain.state != MockImageState::Waited {
                return Err(call_order_invalid());
            }
            chain.state = MockImageState::Idle;
            Ok(())
        })
    }

    fn wait_frame(&mut self, _session: SessionHandle) -> RuntimeResult<FrameTiming> {
        self.record(MockCall::WaitFrame)?;
        let mut state = self.state.borrow_mut();
        state.frame_index += 1;
        Ok(FrameTiming {
            predicted_display_time: state.frame_index * self.spec.frame_period_ns,
            predicted_display_period: self.spec.frame_period_ns,
            should_render: self.spec.should_render,
        })
    }

    fn begin_frame(&mut self, _session: SessionHandle) -> RuntimeResult<()> {
        self.record(MockCall::BeginFrame)
    }

    fn end_frame(
        &mut self,
        _session: SessionHandle,
        display_time: i64,
        _blend_mode: EnvironmentBlendMode,
        layers: &[ProjectionLayer],
    ) -> RuntimeResult<()> {
        self.record(MockCall::EndFrame {
            display_time,
            layers: layers.to_vec(),
        })
    }

    fn poll_event(&mut self, _instance: InstanceHandle) -> RuntimeResult<Option<RuntimeEvent>> {
        self.record(MockCall::PollEvent)?;
        Ok(self.state.borrow_mut().events.pop_front())
    }

    fn locate_views(
        &mut self,
        _session: SessionHandle,
        _view_config: ViewConfigurationType,
        display_time: i64,
        _space: SpaceHandle,
    ) -> RuntimeResult<Vec<View>> {
        self.record(MockCall::LocateViews { display_time })?;
        let fallback = self.spec.located_views.last().copied().unwrap_or_default();
        Ok((0..self.spec.views.len())
            .map(|i| self.spec.located_views.get(i).copied().unwrap_or(fallback))
            .collect())
    }
}

/// Graphics device that records copies into the shared call log.
pub struct MockGraphics {
    state: Rc<RefCell<MockState>>,
}

impl GraphicsDevice for MockGraphics {
    fn capture_binding(&mut self) -> RuntimeResult<GraphicsBinding> {
        self.state.borrow_mut().record(MockCall::CaptureBinding)?;
        Ok(GraphicsBinding {
            display: 0x1,
            visual_id: 0,
            fb_config: 0,
            drawable: 0x2,
            context: 0x3,
        })
    }

    fn renderer_info(&mut self) -> RendererInfo {
        RendererInfo {
            version: "4.6 (mock)".to_string(),
            renderer: "visor mock renderer".to_string(),
        }
    }

    fn copy_texture(
        &mut self,
        source: TextureHandle,
        target: ImageHandle,
        extent: Extent2D,
    ) -> RuntimeResult<()> {
        self.state.borrow_mut().record(MockCall::CopyTexture {
            source,
            target,
            extent,
        })
    }
}
