//! Session creation and teardown.
//!
//! [`Session::create`] walks the runtime through instance, system, graphics
//! binding, session, reference space, session begin and swapchain setup in
//! that order. Whatever was created before a failing step is destroyed again
//! before the error is returned. Teardown always runs swapchains → space →
//! session → instance, from [`Session::shutdown`] or from `Drop`.

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{check, XrError, XrResult};
use crate::frame::FrameLoop;
use crate::negotiate::{NegotiatedCaps, Negotiator};
use crate::runtime::{GraphicsDevice, XrRuntime};
use crate::swapchain::SwapchainPool;
use crate::types::{
    InstanceHandle, Pose, SessionHandle, SpaceHandle, ViewConfigView,
};

/// Handles created so far; torn down in reverse creation order.
#[derive(Debug, Default)]
struct Handles {
    instance: Option<InstanceHandle>,
    session: Option<SessionHandle>,
    space: Option<SpaceHandle>,
    pool: Option<SwapchainPool>,
}

impl Handles {
    fn teardown(&mut self, runtime: &mut dyn XrRuntime) {
        if let Some(pool) = self.pool.take() {
            pool.destroy(runtime);
        }
        if let Some(space) = self.space.take() {
            if let Err(err) = runtime.destroy_space(space) {
                warn!("xrDestroySpace failed [{}]", err.name);
            }
        }
        if let Some(session) = self.session.take() {
            if let Err(err) = runtime.destroy_session(session) {
                warn!("xrDestroySession failed [{}]", err.name);
            }
        }
        if let Some(instance) = self.instance.take() {
            if let Err(err) = runtime.destroy_instance(instance) {
                warn!("xrDestroyInstance failed [{}]", err.name);
            }
        }
    }
}

pub struct Session {
    pub(crate) runtime: Box<dyn XrRuntime>,
    pub(crate) graphics: Box<dyn GraphicsDevice>,
    pub(crate) config: SessionConfig,
    caps: NegotiatedCaps,
    pub(crate) instance: InstanceHandle,
    pub(crate) session: SessionHandle,
    pub(crate) space: SpaceHandle,
    pub(crate) pool: Option<SwapchainPool>,
    pub(crate) frame: FrameLoop,
    handles: Handles,
    alive: bool,
}

impl Session {
    pub fn create(
        mut runtime: Box<dyn XrRuntime>,
        mut graphics: Box<dyn GraphicsDevice>,
        config: SessionConfig,
    ) -> XrResult<Self> {
        config.validate()?;
        let mut handles = Handles::default();
        match build(runtime.as_mut(), graphics.as_mut(), &config, &mut handles) {
            Ok(caps) => {
                let (Some(instance), Some(session), Some(space)) =
                    (handles.instance, handles.session, handles.space)
                else {
                    handles.teardown(runtime.as_mut());
                    return Err(XrError::unavailable("session setup left handles unset"));
                };
                let pool = handles.pool.take();
                let view_count = caps.system.views.len();
                info!(
                    "session ready: {view_count} views, recommended {}x{}",
                    caps.system.views[0].recommended_width, caps.system.views[0].recommended_height
                );
                Ok(Self {
                    runtime,
                    graphics,
                    frame: FrameLoop::new(view_count),
                    config,
                    caps,
                    instance,
                    session,
                    space,
                    pool,
                    handles,
                    alive: true,
                })
            }
            Err(err) => {
                warn!("session creation failed: {err}");
                handles.teardown(runtime.as_mut());
                Err(err)
            }
        }
    }

    /// Destroys swapchains, space, session and instance. Safe to call more
    /// than once; later calls do nothing.
    pub fn shutdown(&mut self) {
        if !self.alive {
            return;
        }
        info!("tearing down session");
        self.alive = false;
        self.frame.mark_stopped();
        self.handles.pool = self.pool.take();
        self.handles.space = Some(self.space);
        self.handles.session = Some(self.session);
        self.handles.instance = Some(self.instance);
        self.handles.teardown(self.runtime.as_mut());
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn ensure_alive(&self) -> XrResult<()> {
        if self.alive {
            Ok(())
        } else {
            Err(XrError::ContextReleased)
        }
    }

    pub fn caps(&self) -> &NegotiatedCaps {
        &self.caps
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fixed at creation.
    pub fn view_count(&self) -> usize {
        self.caps.system.views.len()
    }

    pub fn view_configs(&self) -> &[ViewConfigView] {
        &self.caps.system.views
    }

    /// First view's recommended rectangle; hosts size their color targets by it.
    pub fn recommended_render_target_size(&self) -> (u32, u32) {
        let first = &self.caps.system.views[0];
        (first.recommended_width, first.recommended_height)
    }

    pub fn swapchains(&self) -> Option<&SwapchainPool> {
        self.pool.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.frame.running()
    }

    pub fn is_visible(&self) -> bool {
        self.frame.visible()
    }

    pub(crate) fn check_view(&self, view: usize) -> XrResult<()> {
        let view_count = self.view_count();
        if view >= view_count {
            return Err(XrError::ViewOutOfRange { view, view_count });
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build(
    runtime: &mut dyn XrRuntime,
    graphics: &mut dyn GraphicsDevice,
    config: &SessionConfig,
    handles: &mut Handles,
) -> XrResult<NegotiatedCaps> {
    let negotiator = Negotiator::new(config);

    let extensions = negotiator.require_extension(runtime)?;
    let instance = check(
        "xrCreateInstance",
        runtime.create_instance(&config.application_info(), &extensions),
    )?;
    handles.instance = Some(instance);
    info!(
        "created instance for '{}' with extensions {:?}",
        config.application_name, extensions
    );

    let system = negotiator.negotiate(runtime, instance)?;

    let binding = check("captureGraphicsBinding", graphics.capture_binding())?;
    let renderer = graphics.renderer_info();
    info!(
        "graphics: display 0x{:x}, context 0x{:x}, drawable 0x{:x}",
        binding.display, binding.context, binding.drawable
    );
    info!("using OpenGL {} on {}", renderer.version, renderer.renderer);

    let session = check(
        "xrCreateSession",
        runtime.create_session(instance, system.system, &binding),
    )?;
    handles.session = Some(session);
    info!("created session");

    let reference_space = negotiator.require_reference_space(runtime, session)?;
    let space = check(
        "xrCreateReferenceSpace",
        runtime.create_reference_space(session, reference_space, Pose::IDENTITY),
    )?;
    handles.space = Some(space);

    check(
        "xrBeginSession",
        runtime.begin_session(session, system.view_configuration),
    )?;

    let formats = check(
        "xrEnumerateSwapchainFormats",
        runtime.enumerate_swapchain_formats(session),
    )?;
    let format = formats
        .first()
        .copied()
        .ok_or_else(|| XrError::unavailable("runtime offers no swapchain formats"))?;
    debug!("swapchain format 0x{format:x} selected from {formats:x?}");

    handles.pool = Some(SwapchainPool::build(
        runtime,
        session,
        &system.views,
        format,
    )?);

    Ok(NegotiatedCaps {
        extensions,
        system,
        reference_space,
    })
}
