//! Shared, reference-counted access to one session.
//!
//! The host builds a [`ContextRegistry`] with a session factory. The first
//! [`ContextRegistry::acquire`] creates the session; later acquires hand out
//! the same context and bump the use count. The session is torn down when
//! the count drops back to zero.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Mat4;
use tracing::{info, warn};

use crate::error::XrResult;
use crate::frame::FrameStatus;
use crate::session::Session;
use crate::types::TextureHandle;

pub type SessionFactory = Box<dyn FnMut() -> XrResult<Session>>;

/// Typed handle to the shared session.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Rc<RefCell<Session>>,
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("ptr", &Rc::as_ptr(&self.inner))
            .finish()
    }
}

impl ContextHandle {
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// See [`Session::render_view`].
    pub fn render_eye(&self, view: usize, source: TextureHandle) -> XrResult<FrameStatus> {
        self.inner.borrow_mut().render_view(view, source)
    }

    pub fn recommended_render_target_size(&self) -> (u32, u32) {
        self.inner.borrow().recommended_render_target_size()
    }

    pub fn view_count(&self) -> usize {
        self.inner.borrow().view_count()
    }

    pub fn projection_matrix(&self, view: usize) -> XrResult<Mat4> {
        self.inner.borrow_mut().projection_matrix(view)
    }

    pub fn view_matrix(&self, view: usize) -> XrResult<Mat4> {
        self.inner.borrow().view_matrix(view)
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().is_running()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.borrow().is_visible()
    }

    /// Read access to the underlying session.
    pub fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        f(&self.inner.borrow())
    }
}

pub struct ContextRegistry {
    factory: SessionFactory,
    slot: Option<ContextHandle>,
    use_count: usize,
}

impl ContextRegistry {
    pub fn new(factory: impl FnMut() -> XrResult<Session> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            slot: None,
            use_count: 0,
        }
    }

    /// Returns the live context, creating it if nothing holds one.
    /// A failed creation leaves the registry empty.
    pub fn acquire(&mut self) -> XrResult<ContextHandle> {
        if let Some(handle) = &self.slot {
            self.use_count += 1;
            info!("context acquired, use count {}", self.use_count);
            return Ok(handle.clone());
        }

        let session = (self.factory)()?;
        let handle = ContextHandle {
            inner: Rc::new(RefCell::new(session)),
        };
        self.slot = Some(handle.clone());
        self.use_count = 1;
        info!("context created, use count 1");
        Ok(handle)
    }

    /// Drops one use of `handle`; the last release tears the session down.
    pub fn release(&mut self, handle: ContextHandle) {
        let Some(live) = &self.slot else {
            warn!("release with no live context; ignoring");
            return;
        };
        if !live.ptr_eq(&handle) {
            warn!("release of a context this registry does not own; ignoring");
            return;
        }
        drop(handle);

        if self.use_count > 1 {
            self.use_count -= 1;
            info!("context released, use count {}", self.use_count);
            return;
        }

        self.use_count = 0;
        if let Some(last) = self.slot.take() {
            info!("last context use released; destroying session");
            match Rc::try_unwrap(last.inner) {
                Ok(cell) => drop(cell.into_inner()),
                Err(shared) => {
                    warn!(
                        "{} stray handles still reference the context",
                        Rc::strong_count(&shared) - 1
                    );
                    shared.borrow_mut().shutdown();
                }
            }
        }
    }

    pub fn use_count(&self) -> usize {
        self.use_count
    }

    pub fn is_live(&self) -> bool {
        self.slot.is_some()
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        if let Some(last) = self.slot.take() {
            if self.use_count > 0 {
                warn!("registry dropped with {} outstanding uses", self.use_count);
            }
            last.inner.borrow_mut().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::XrError;
    use crate::mock::{MockProbe, MockRuntime, MockSpec};

    fn registry(spec: MockSpec) -> (ContextRegistry, MockProbe) {
        let (_, probe) = MockRuntime::new(spec.clone());
        let factory_probe = probe.clone();
        let registry = ContextRegistry::new(move || {
            Session::create(
                Box::new(factory_probe.runtime(spec.clone())),
                Box::new(factory_probe.graphics()),
                SessionConfig::default(),
            )
        });
        (registry, probe)
    }

    #[test]
    fn test_second_acquire_shares_session() {
        let (mut registry, probe) = registry(MockSpec::default());
        let first = registry.acquire().unwrap();
        let second = registry.acquire().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(registry.use_count(), 2);
        assert_eq!(probe.count("xrCreateSession"), 1);

        registry.release(second);
        assert_eq!(registry.use_count(), 1);
        assert_eq!(probe.live_sessions(), 1);

        registry.release(first);
        assert_eq!(registry.use_count(), 0);
        assert_eq!(probe.live_sessions(), 0);
        assert_eq!(probe.live_instances(), 0);
    }

    #[test]
    fn test_release_without_context_is_noop() {
        let (mut registry, probe) = registry(MockSpec::default());
        let handle = registry.acquire().unwrap();
        let stale = handle.clone();
        registry.release(handle);
        probe.clear_calls();

        registry.release(stale.clone());
        assert!(probe.calls().is_empty());
        assert!(!registry.is_live());
        assert!(matches!(stale.view_matrix(0), Err(XrError::ContextReleased)));
    }

    #[test]
    fn test_foreign_handle_is_ignored() {
        let (mut ours, _probe) = registry(MockSpec::default());
        let (mut theirs, _other) = registry(MockSpec::default());
        let mine = ours.acquire().unwrap();
        let foreign = theirs.acquire().unwrap();

        ours.release(foreign);
        assert_eq!(ours.use_count(), 1);
        assert!(ours.is_live());
        ours.release(mine);
        assert!(!ours.is_live());
    }

    #[test]
    fn test_failed_creation_leaves_registry_empty() {
        let spec = MockSpec {
            extensions: vec![],
            ..MockSpec::default()
        };
        let (mut registry, probe) = registry(spec);
        assert!(registry.acquire().is_err());
        assert_eq!(registry.use_count(), 0);
        assert!(!registry.is_live());
        assert_eq!(probe.count("xrCreateSession"), 0);
    }

    #[test]
    fn test_registry_drop_tears_down() {
        let (mut registry, probe) = registry(MockSpec::default());
        let _handle = registry.acquire().unwrap();
        drop(registry);
        assert_eq!(probe.live_sessions(), 0);
    }
}
