//! One swapchain per view plus the images backing each of them.
//!
//! The image table is `view_count x max_image_count` wide even when a view's
//! swapchain has fewer images, so `(view, buffer_index)` always indexes it
//! directly. Each view tracks where its image is in the
//! acquire → wait → release bracket; the pool refuses calls that would break
//! the bracket instead of passing them to the runtime.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{check, RuntimeError, XrError, XrResult};
use crate::runtime::XrRuntime;
use crate::types::{
    Extent2D, ImageHandle, SessionHandle, SwapchainDesc, SwapchainHandle, ViewConfigView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Idle,
    Acquired(u32),
    Waited(u32),
}

#[derive(Debug)]
pub struct ViewSwapchain {
    handle: SwapchainHandle,
    extent: Extent2D,
    image_count: u32,
    images: Vec<Option<ImageHandle>>,
    state: ImageState,
}

impl ViewSwapchain {
    pub fn handle(&self) -> SwapchainHandle {
        self.handle
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn state(&self) -> ImageState {
        self.state
    }
}

#[derive(Debug)]
pub struct SwapchainPool {
    views: Vec<ViewSwapchain>,
    max_image_count: u32,
    format: i64,
}

impl SwapchainPool {
    /// Creates one swapchain per view and enumerates its images. On failure
    /// every swapchain created so far is destroyed before returning.
    pub fn build(
        runtime: &mut dyn XrRuntime,
        session: SessionHandle,
        view_configs: &[ViewConfigView],
        format: i64,
    ) -> XrResult<Self> {
        let mut created: Vec<(SwapchainHandle, Extent2D, u32)> =
            Vec::with_capacity(view_configs.len());
        if let Err(err) = create_swapchains(runtime, session, view_configs, format, &mut created) {
            destroy_handles(runtime, created.iter().map(|(handle, ..)| *handle));
            return Err(err);
        }

        let max_image_count = created.iter().map(|(.., count)| *count).max().unwrap_or(0);

        let mut views = Vec::with_capacity(created.len());
        for (view, &(handle, extent, image_count)) in created.iter().enumerate() {
            let mut images = vec![None; max_image_count as usize];
            match runtime.enumerate_swapchain_images(handle) {
                Ok(enumerated) => {
                    for (slot, image) in images.iter_mut().zip(enumerated) {
                        *slot = Some(image);
                    }
                }
                Err(source) => {
                    destroy_handles(runtime, created.iter().map(|(handle, ..)| *handle));
                    return Err(enumeration_failed(view, source));
                }
            }
            debug!(
                "view {view}: swapchain {:?} {}x{} with {image_count} images",
                handle, extent.width, extent.height
            );
            views.push(ViewSwapchain {
                handle,
                extent,
                image_count,
                images,
                state: ImageState::Idle,
            });
        }

        Ok(Self {
            views,
            max_image_count,
            format,
        })
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn max_image_count(&self) -> u32 {
        self.max_image_count
    }

    pub fn format(&self) -> i64 {
        self.format
    }

    pub fn view(&self, view: usize) -> XrResult<&ViewSwapchain> {
        let view_count = self.views.len();
        self.views
            .get(view)
            .ok_or(XrError::ViewOutOfRange { view, view_count })
    }

    fn view_mut(&mut self, view: usize) -> XrResult<&mut ViewSwapchain> {
        let view_count = self.views.len();
        self.views
            .get_mut(view)
            .ok_or(XrError::ViewOutOfRange { view, view_count })
    }

    /// Runtime image at `(view, buffer_index)`, if the swapchain has one there.
    pub fn image(&self, view: usize, buffer_index: u32) -> Option<ImageHandle> {
        self.views
            .get(view)?
            .images
            .get(buffer_index as usize)
            .copied()
            .flatten()
    }

    /// Acquires the next image of `view`. A view whose previous frame was
    /// abandoned between acquire and wait keeps its acquired image; that
    /// index is returned again without another runtime call. An image whose
    /// release failed is released before the next acquire.
    pub fn acquire(&mut self, runtime: &mut dyn XrRuntime, view: usize) -> XrResult<u32> {
        let chain = self.view_mut(view)?;
        match chain.state {
            ImageState::Idle => {
                let index = check(
                    "xrAcquireSwapchainImage",
                    runtime.acquire_swapchain_image(chain.handle),
                )?;
                chain.state = ImageState::Acquired(index);
                Ok(index)
            }
            ImageState::Acquired(index) => {
                debug!("view {view}: resuming wait on image {index} acquired last frame");
                Ok(index)
            }
            ImageState::Waited(held) => {
                debug!("view {view}: releasing image {held} still held from last frame");
                check(
                    "xrReleaseSwapchainImage",
                    runtime.release_swapchain_image(chain.handle),
                )?;
                chain.state = ImageState::Idle;
                let index = check(
                    "xrAcquireSwapchainImage",
                    runtime.acquire_swapchain_image(chain.handle),
                )?;
                chain.state = ImageState::Acquired(index);
                Ok(index)
            }
        }
    }

    pub fn wait(
        &mut self,
        runtime: &mut dyn XrRuntime,
        view: usize,
        timeout: Duration,
    ) -> XrResult<()> {
        let chain = self.view_mut(view)?;
        let ImageState::Acquired(index) = chain.state else {
            return Err(XrError::ImageOrder {
                view,
                detail: "wait without a pending acquire",
            });
        };
        check(
            "xrWaitSwapchainImage",
            runtime.wait_swapchain_image(chain.handle, timeout),
        )?;
        chain.state = ImageState::Waited(index);
        Ok(())
    }

    pub fn release(&mut self, runtime: &mut dyn XrRuntime, view: usize) -> XrResult<()> {
        let chain = self.view_mut(view)?;
        if !matches!(chain.state, ImageState::Waited(_)) {
            return Err(XrError::ImageOrder {
                view,
                detail: "release before a completed wait",
            });
        }
        check(
            "xrReleaseSwapchainImage",
            runtime.release_swapchain_image(chain.handle),
        )?;
        chain.state = ImageState::Idle;
        Ok(())
    }

    /// Releases any image still held and destroys every swapchain.
    pub fn destroy(self, runtime: &mut dyn XrRuntime) {
        for (view, chain) in self.views.iter().enumerate() {
            if let ImageState::Waited(index) = chain.state {
                if let Err(err) = runtime.release_swapchain_image(chain.handle) {
                    warn!("view {view}: releasing image {index} on teardown failed [{}]", err.name);
                }
            }
        }
        destroy_handles(runtime, self.views.iter().map(|chain| chain.handle));
    }
}

fn create_swapchains(
    runtime: &mut dyn XrRuntime,
    session: SessionHandle,
    view_configs: &[ViewConfigView],
    format: i64,
    created: &mut Vec<(SwapchainHandle, Extent2D, u32)>,
) -> XrResult<()> {
    for (view, config) in view_configs.iter().enumerate() {
        let extent = config.recommended_extent();
        let desc = SwapchainDesc::color(format, extent);
        let handle = runtime
            .create_swapchain(session, &desc)
            .map_err(|source| creation_failed(view, source))?;
        created.push((handle, extent, 0));
        let count = runtime
            .swapchain_image_count(handle)
            .map_err(|source| enumeration_failed(view, source))?;
        if let Some(entry) = created.last_mut() {
            entry.2 = count;
        }
    }
    Ok(())
}

fn creation_failed(view: usize, source: RuntimeError) -> XrError {
    error!("failed to create swapchain {view} [{}]", source.name);
    XrError::SwapchainCreationFailed { view, source }
}

fn enumeration_failed(view: usize, source: RuntimeError) -> XrError {
    error!("failed to enumerate swapchain images for view {view} [{}]", source.name);
    XrError::ImageEnumerationFailed { view, source }
}

fn destroy_handles(runtime: &mut dyn XrRuntime, handles: impl Iterator<Item = SwapchainHandle>) {
    for handle in handles {
        if let Err(err) = runtime.destroy_swapchain(handle) {
            warn!("xrDestroySwapchain {:?} failed [{}]", handle, err.name);
        }
    }
}
