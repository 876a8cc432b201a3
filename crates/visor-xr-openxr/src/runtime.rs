use std::collections::HashMap;
use std::time::Duration;

use openxr as xr;
use tracing::{debug, info};

use visor_xr::error::RuntimeResult;
use visor_xr::types::{
    ApplicationInfo, EnvironmentBlendMode, FormFactor, FrameTiming, GraphicsBinding,
    GraphicsRequirements, ImageHandle, InstanceHandle, Pose, ProjectionLayer,
    ReferenceSpaceType, RuntimeEvent, SessionHandle, SpaceHandle, SwapchainDesc,
    SwapchainHandle, SystemId, SystemProperties, View, ViewConfigView, ViewConfigurationType,
};
use visor_xr::{XrError, XrResult, XrRuntime};

use crate::convert::{self, handle_invalid, xr_err};

struct LiveSession {
    session: xr::Session<xr::OpenGL>,
    waiter: xr::FrameWaiter,
    stream: xr::FrameStream<xr::OpenGL>,
}

/// [`XrRuntime`] over the system OpenXR loader, with OpenGL sessions.
pub struct OpenXrRuntime {
    entry: xr::Entry,
    instances: HashMap<u64, xr::Instance>,
    sessions: HashMap<u64, LiveSession>,
    spaces: HashMap<u64, xr::Space>,
    swapchains: HashMap<u64, xr::Swapchain<xr::OpenGL>>,
    event_buffer: xr::EventDataBuffer,
    next_handle: u64,
}

impl OpenXrRuntime {
    pub fn load() -> XrResult<Self> {
        let entry = unsafe { xr::Entry::load() }
            .map_err(|e| XrError::unavailable(format!("OpenXR load failed: {e:?}")))?;
        info!("OpenXR loader ready");
        Ok(Self {
            entry,
            instances: HashMap::new(),
            sessions: HashMap::new(),
            spaces: HashMap::new(),
            swapchains: HashMap::new(),
            event_buffer: xr::EventDataBuffer::new(),
            next_handle: 0,
        })
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn instance(&self, handle: InstanceHandle) -> RuntimeResult<&xr::Instance> {
        self.instances.get(&handle.as_raw()).ok_or_else(handle_invalid)
    }

    fn live(&mut self, handle: SessionHandle) -> RuntimeResult<&mut LiveSession> {
        self.sessions.get_mut(&handle.as_raw()).ok_or_else(handle_invalid)
    }

    fn swapchain(
        &mut self,
        handle: SwapchainHandle,
    ) -> RuntimeResult<&mut xr::Swapchain<xr::OpenGL>> {
        self.swapchains.get_mut(&handle.as_raw()).ok_or_else(handle_invalid)
    }
}

fn system_id(system: SystemId) -> xr::SystemId {
    xr::SystemId::from_raw(system.as_raw())
}

impl XrRuntime for OpenXrRuntime {
    fn enumerate_instance_extensions(&mut self) -> RuntimeResult<Vec<String>> {
        let set = self.entry.enumerate_extensions().map_err(xr_err)?;
        Ok(convert::extension_names(&set))
    }

    fn create_instance(
        &mut self,
        app: &ApplicationInfo,
        extensions: &[String],
    ) -> RuntimeResult<InstanceHandle> {
        let info = xr::ApplicationInfo {
            application_name: &app.application_name,
            application_version: app.application_version,
            engine_name: &app.engine_name,
            engine_version: app.engine_version,
            api_version: convert::xr_version(app.api_version),
        };
        let instance = self
            .entry
            .create_instance(&info, &convert::extension_set(extensions), &[])
            .map_err(xr_err)?;
        if let Ok(props) = instance.properties() {
            info!(
                "OpenXR runtime '{}' {}",
                props.runtime_name,
                convert::version(props.runtime_version)
            );
        }
        let handle = self.handle();
        self.instances.insert(handle, instance);
        Ok(InstanceHandle(handle))
    }

    fn destroy_instance(&mut self, instance: InstanceHandle) -> RuntimeResult<()> {
        self.instances
            .remove(&instance.as_raw())
            .map(drop)
            .ok_or_else(handle_invalid)
    }

    fn get_system(
        &mut self,
        instance: InstanceHandle,
        form_factor: FormFactor,
    ) -> RuntimeResult<SystemId> {
        let system = self
            .instance(instance)?
            .system(convert::form_factor(form_factor))
            .map_err(xr_err)?;
        Ok(SystemId(system.into_raw()))
    }

    fn system_properties(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<SystemProperties> {
        let props = self
            .instance(instance)?
            .system_properties(system_id(system))
            .map_err(xr_err)?;
        Ok(SystemProperties {
            system_name: props.system_name,
            vendor_id: props.vendor_id,
            max_swapchain_width: props.graphics_properties.max_swapchain_image_width,
            max_swapchain_height: props.graphics_properties.max_swapchain_image_height,
            max_layer_count: props.graphics_properties.max_layer_count,
            orientation_tracking: props.tracking_properties.orientation_tracking,
            position_tracking: props.tracking_properties.position_tracking,
        })
    }

    fn enumerate_view_configurations(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<Vec<ViewConfigurationType>> {
        let types = self
            .instance(instance)?
            .enumerate_view_configurations(system_id(system))
            .map_err(xr_err)?;
        Ok(types.into_iter().map(convert::view_config_from).collect())
    }

    fn enumerate_view_configuration_views(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
        view_config: ViewConfigurationType,
    ) -> RuntimeResult<Vec<ViewConfigView>> {
        let views = self
            .instance(instance)?
            .enumerate_view_configuration_views(system_id(system), convert::view_config(view_config))
            .map_err(xr_err)?;
        Ok(views.iter().map(convert::view_config_view).collect())
    }

    fn graphics_requirements(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
    ) -> RuntimeResult<GraphicsRequirements> {
        let reqs = self
            .instance(instance)?
            .graphics_requirements::<xr::OpenGL>(system_id(system))
            .map_err(xr_err)?;
        Ok(GraphicsRequirements {
            min_api_version: convert::version(reqs.min_api_version_supported),
            max_api_version: convert::version(reqs.max_api_version_supported),
        })
    }

    fn create_session(
        &mut self,
        instance: InstanceHandle,
        system: SystemId,
        binding: &GraphicsBinding,
    ) -> RuntimeResult<SessionHandle> {
        let create_info = xr::opengl::SessionCreateInfo::Xlib {
            x_display: binding.display as usize as *mut _,
            visualid: binding.visual_id,
            glx_fb_config: binding.fb_config as usize as *mut _,
            glx_drawable: binding.drawable as _,
            glx_context: binding.context as usize as *mut _,
        };
        // SAFETY: the binding was captured from the GLX context current on
        // this thread, which outlives the session.
        let (session, waiter, stream) = unsafe {
            self.instance(instance)?
                .create_session::<xr::OpenGL>(system_id(system), &create_info)
                .map_err(xr_err)?
        };
        let handle = self.handle();
        self.sessions.insert(
            handle,
            LiveSession {
                session,
                waiter,
                stream,
            },
        );
        Ok(SessionHandle(handle))
    }

    fn destroy_session(&mut self, session: SessionHandle) -> RuntimeResult<()> {
        self.sessions
            .remove(&session.as_raw())
            .map(drop)
            .ok_or_else(handle_invalid)
    }

    fn begin_session(
        &mut self,
        session: SessionHandle,
        view_config: ViewConfigurationType,
    ) -> RuntimeResult<()> {
        self.live(session)?
            .session
            .begin(convert::view_config(view_config))
            .map(drop)
            .map_err(xr_err)
    }

    fn enumerate_reference_spaces(
        &mut self,
        session: SessionHandle,
    ) -> RuntimeResult<Vec<ReferenceSpaceType>> {
        let spaces = self
            .live(session)?
            .session
            .enumerate_reference_spaces()
            .map_err(xr_err)?;
        Ok(spaces.into_iter().map(convert::reference_space_from).collect())
    }

    fn create_reference_space(
        &mut self,
        session: SessionHandle,
        space_type: ReferenceSpaceType,
        pose_in_space: Pose,
    ) -> RuntimeResult<SpaceHandle> {
        let space = self
            .live(session)?
            .session
            .create_reference_space(
                convert::reference_space(space_type),
                convert::posef(pose_in_space),
            )
            .map_err(xr_err)?;
        let handle = self.handle();
        self.spaces.insert(handle, space);
        Ok(SpaceHandle(handle))
    }

    fn destroy_space(&mut self, space: SpaceHandle) -> RuntimeResult<()> {
        self.spaces
            .remove(&space.as_raw())
            .map(drop)
            .ok_or_else(handle_invalid)
    }

    fn enumerate_swapchain_formats(&mut self, session: SessionHandle) -> RuntimeResult<Vec<i64>> {
        let formats = self
            .live(session)?
            .session
            .enumerate_swapchain_formats()
            .map_err(xr_err)?;
        Ok(formats.into_iter().map(i64::from).collect())
    }

    fn create_swapchain(
        &mut self,
        session: SessionHandle,
        desc: &SwapchainDesc,
    ) -> RuntimeResult<SwapchainHandle> {
        let create_info = xr::SwapchainCreateInfo::<xr::OpenGL> {
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: convert::usage(desc.usage),
            format: desc.format as u32,
            sample_count: desc.sample_count,
            width: desc.width,
            height: desc.height,
            face_count: desc.face_count,
            array_size: desc.array_size,
            mip_count: desc.mip_count,
        };
        let swapchain = self
            .live(session)?
            .session
            .create_swapchain(&create_info)
            .map_err(xr_err)?;
        let handle = self.handle();
        debug!("swapchain {handle}: {}x{} format 0x{:x}", desc.width, desc.height, desc.format);
        self.swapchains.insert(handle, swapchain);
        Ok(SwapchainHandle(handle))
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        self.swapchains
            .remove(&swapchain.as_raw())
            .map(drop)
            .ok_or_else(handle_invalid)
    }

    fn swapchain_image_count(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        let images = self.swapchain(swapchain)?.enumerate_images().map_err(xr_err)?;
        Ok(images.len() as u32)
    }

    fn enumerate_swapchain_images(
        &mut self,
        swapchain: SwapchainHandle,
    ) -> RuntimeResult<Vec<ImageHandle>> {
        let images = self.swapchain(swapchain)?.enumerate_images().map_err(xr_err)?;
        Ok(images.into_iter().map(ImageHandle).collect())
    }

    fn acquire_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<u32> {
        self.swapchain(swapchain)?.acquire_image().map_err(xr_err)
    }

    fn wait_swapchain_image(
        &mut self,
        swapchain: SwapchainHandle,
        timeout: Duration,
    ) -> RuntimeResult<()> {
        let timeout = xr::Duration::from_nanos(timeout.as_nanos().min(i64::MAX as u128) as i64);
        self.swapchain(swapchain)?.wait_image(timeout).map_err(xr_err)
    }

    fn release_swapchain_image(&mut self, swapchain: SwapchainHandle) -> RuntimeResult<()> {
        self.swapchain(swapchain)?.release_image().map_err(xr_err)
    }

    fn wait_frame(&mut self, session: SessionHandle) -> RuntimeResult<FrameTiming> {
        let state = self.live(session)?.waiter.wait().map_err(xr_err)?;
        Ok(FrameTiming {
            predicted_display_time: state.predicted_display_time.as_nanos(),
            predicted_display_period: state.predicted_display_period.as_nanos(),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self, session: SessionHandle) -> RuntimeResult<()> {
        self.live(session)?.stream.begin().map_err(xr_err)
    }

    fn end_frame(
        &mut self,
        session: SessionHandle,
        display_time: i64,
        blend_mode: EnvironmentBlendMode,
        layers: &[ProjectionLayer],
    ) -> RuntimeResult<()> {
        let time = xr::Time::from_nanos(display_time);
        let blend_mode = convert::blend_mode(blend_mode);

        let mut layer_views = Vec::with_capacity(layers.len());
        for layer in layers {
            let mut views = Vec::with_capacity(layer.views.len());
            for view in &layer.views {
                let swapchain = self
                    .swapchains
                    .get(&view.sub_image.swapchain.as_raw())
                    .ok_or_else(handle_invalid)?;
                let extent = view.sub_image.image_rect.extent;
                let sub_image = xr::SwapchainSubImage::new()
                    .swapchain(swapchain)
                    .image_rect(xr::Rect2Di {
                        offset: xr::Offset2Di {
                            x: view.sub_image.image_rect.x,
                            y: view.sub_image.image_rect.y,
                        },
                        extent: xr::Extent2Di {
                            width: extent.width as i32,
                            height: extent.height as i32,
                        },
                    })
                    .image_array_index(0);
                views.push(
                    xr::CompositionLayerProjectionView::new()
                        .pose(convert::posef(view.pose))
                        .fov(convert::fovf(view.fov))
                        .sub_image(sub_image),
                );
            }
            layer_views.push(views);
        }

        let mut projections = Vec::with_capacity(layers.len());
        for (layer, views) in layers.iter().zip(&layer_views) {
            let space = self
                .spaces
                .get(&layer.space.as_raw())
                .ok_or_else(handle_invalid)?;
            projections.push(
                xr::CompositionLayerProjection::new()
                    .space(space)
                    .views(views),
            );
        }
        let bases: Vec<&xr::CompositionLayerBase<'_, xr::OpenGL>> =
            projections.iter().map(|layer| &**layer).collect();

        let live = self
            .sessions
            .get_mut(&session.as_raw())
            .ok_or_else(handle_invalid)?;
        live.stream.end(time, blend_mode, &bases).map_err(xr_err)
    }

    fn poll_event(&mut self, instance: InstanceHandle) -> RuntimeResult<Option<RuntimeEvent>> {
        let instance = self
            .instances
            .get(&instance.as_raw())
            .ok_or_else(handle_invalid)?;
        let event = instance.poll_event(&mut self.event_buffer).map_err(xr_err)?;
        Ok(event.map(convert::event))
    }

    fn locate_views(
        &mut self,
        session: SessionHandle,
        view_config: ViewConfigurationType,
        display_time: i64,
        space: SpaceHandle,
    ) -> RuntimeResult<Vec<View>> {
        let space = self.spaces.get(&space.as_raw()).ok_or_else(handle_invalid)?;
        let live = self
            .sessions
            .get(&session.as_raw())
            .ok_or_else(handle_invalid)?;
        let (_flags, views) = live
            .session
            .locate_views(
                convert::view_config(view_config),
                xr::Time::from_nanos(display_time),
                space,
            )
            .map_err(xr_err)?;
        Ok(views.iter().map(convert::view).collect())
    }
}
