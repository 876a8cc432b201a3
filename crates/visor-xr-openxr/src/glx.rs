use std::ffi::{c_void, CString};
use std::num::NonZeroU32;
use std::ptr;

use glow::HasContext;
use tracing::{debug, warn};
use x11::{glx, xlib};

use visor_xr::error::{RuntimeError, RuntimeResult};
use visor_xr::types::{Extent2D, GraphicsBinding, ImageHandle, RendererInfo, TextureHandle};
use visor_xr::{GraphicsDevice, XrError, XrResult};

fn gl_error(name: &'static str) -> RuntimeError {
    RuntimeError::new(-2, name)
}

fn load_gl(name: &str) -> *const c_void {
    let Ok(name) = CString::new(name) else {
        return ptr::null();
    };
    // SAFETY: name is NUL-terminated and outlives the call.
    unsafe { glx::glXGetProcAddress(name.as_ptr() as *const u8) }
        .map_or(ptr::null(), |f| f as *const c_void)
}

/// The GLX context that is current on the calling thread. It is borrowed,
/// never created or destroyed here.
pub struct GlxGraphics {
    gl: glow::Context,
    copy_fbos: Option<(glow::NativeFramebuffer, glow::NativeFramebuffer)>,
}

impl GlxGraphics {
    pub fn current() -> XrResult<Self> {
        // SAFETY: plain queries of thread-local GLX state.
        let context = unsafe { glx::glXGetCurrentContext() };
        if context.is_null() {
            return Err(XrError::unavailable("no GLX context is current on this thread"));
        }
        // SAFETY: a context is current, so GL entry points resolve against it.
        let gl = unsafe { glow::Context::from_loader_function(load_gl) };
        Ok(Self {
            gl,
            copy_fbos: None,
        })
    }

    fn framebuffers(&mut self) -> RuntimeResult<(glow::NativeFramebuffer, glow::NativeFramebuffer)> {
        if let Some(pair) = self.copy_fbos {
            return Ok(pair);
        }
        // SAFETY: the wrapped context is current.
        let pair = unsafe {
            let read = self
                .gl
                .create_framebuffer()
                .map_err(|_| gl_error("glGenFramebuffers"))?;
            let draw = self
                .gl
                .create_framebuffer()
                .map_err(|_| gl_error("glGenFramebuffers"))?;
            (read, draw)
        };
        self.copy_fbos = Some(pair);
        Ok(pair)
    }
}

fn texture(id: u32) -> RuntimeResult<glow::NativeTexture> {
    NonZeroU32::new(id)
        .map(glow::NativeTexture)
        .ok_or_else(|| gl_error("GL_INVALID_VALUE"))
}

impl GraphicsDevice for GlxGraphics {
    fn capture_binding(&mut self) -> RuntimeResult<GraphicsBinding> {
        // SAFETY: queries of the current GLX state; every list returned by
        // Xlib is freed before leaving the block.
        unsafe {
            let display = glx::glXGetCurrentDisplay();
            let context = glx::glXGetCurrentContext();
            let drawable = glx::glXGetCurrentDrawable();
            if display.is_null() || context.is_null() {
                return Err(gl_error("GLX_BAD_CONTEXT"));
            }

            let mut fb_config_id = 0;
            glx::glXQueryContext(display, context, glx::GLX_FBCONFIG_ID, &mut fb_config_id);
            let attrs = [glx::GLX_FBCONFIG_ID, fb_config_id, 0];
            let mut count = 0;
            let configs = glx::glXChooseFBConfig(
                display,
                xlib::XDefaultScreen(display),
                attrs.as_ptr(),
                &mut count,
            );
            if configs.is_null() || count == 0 {
                return Err(gl_error("GLX_BAD_FBCONFIG"));
            }
            let fb_config = *configs;
            xlib::XFree(configs as *mut _);

            let visual = glx::glXGetVisualFromFBConfig(display, fb_config);
            let visual_id = if visual.is_null() {
                warn!("current FB config has no X visual");
                0
            } else {
                let id = (*visual).visualid;
                xlib::XFree(visual as *mut _);
                id
            };

            Ok(GraphicsBinding {
                display: display as usize as u64,
                visual_id: visual_id as u32,
                fb_config: fb_config as usize as u64,
                drawable: drawable as u64,
                context: context as usize as u64,
            })
        }
    }

    fn renderer_info(&mut self) -> RendererInfo {
        // SAFETY: the wrapped context is current.
        unsafe {
            RendererInfo {
                version: self.gl.get_parameter_string(glow::VERSION),
                renderer: self.gl.get_parameter_string(glow::RENDERER),
            }
        }
    }

    fn copy_texture(
        &mut self,
        source: TextureHandle,
        target: ImageHandle,
        extent: Extent2D,
    ) -> RuntimeResult<()> {
        let (read, draw) = self.framebuffers()?;
        let source = texture(source.0)?;
        let target = texture(target.0)?;
        let (w, h) = (extent.width as i32, extent.height as i32);

        // SAFETY: the wrapped context is current and both textures belong to it.
        let error = unsafe {
            let gl = &self.gl;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(read));
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(source),
                0,
            );
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(draw));
            gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(target),
                0,
            );
            gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, glow::COLOR_BUFFER_BIT, glow::NEAREST);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
            gl.get_error()
        };
        if error != glow::NO_ERROR {
            debug!("texture copy raised GL error 0x{error:x}");
            return Err(gl_error("glBlitFramebuffer"));
        }
        Ok(())
    }
}

impl Drop for GlxGraphics {
    fn drop(&mut self) {
        if let Some((read, draw)) = self.copy_fbos.take() {
            // SAFETY: the framebuffers were created on this context.
            unsafe {
                self.gl.delete_framebuffer(read);
                self.gl.delete_framebuffer(draw);
            }
        }
    }
}
