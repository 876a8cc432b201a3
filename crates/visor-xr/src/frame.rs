//! Per-view frame driver.
//!
//! The host calls [`Session::render_view`] once per view per frame, view 0
//! first. View 0 waits for the frame, drains runtime events, locates the
//! views and begins the frame. Every view then acquires, waits, fills its
//! projection record, copies the host texture and releases. The last view
//! ends the frame with one projection layer.
//!
//! Each call returns a [`FrameStatus`] telling the host whether to go on
//! with the next view or to wait for the next frame.

use tracing::{debug, error, info, warn};

use crate::config::{EventDrainPolicy, MAX_EVENTS_PER_FRAME};
use crate::error::{check, RuntimeResult, XrError, XrResult};
use crate::session::Session;
use crate::types::{
    EnvironmentBlendMode, FrameTiming, ProjectionLayer, ProjectionView, Rect2D, RuntimeEvent,
    SessionState, SubImage, TextureHandle, View,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    /// Inside wait-frame, event dispatch and view location.
    Waiting,
    FrameOpen,
    /// Frame open; the value is the view expected next.
    Rendering(usize),
    FrameClosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    WaitFrameFailed,
    EventPollFailed,
    /// A session state change took this frame's slot.
    EventConsumedFrame,
    NotVisible,
    LocateViewsFailed,
    BeginFrameFailed,
    /// The runtime asked for no rendering; the frame was begun and ended empty.
    RuntimeNotRendering,
    ViewStepFailed,
    EndFrameFailed,
    /// A non-zero view arrived while no frame was open.
    FrameNotOpen,
}

/// Outcome of one [`Session::render_view`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The view was submitted into the open frame; render this view next.
    NextView(usize),
    /// The last view went in and the frame was ended.
    Submitted,
    /// Nothing more to do this frame; start again with view 0.
    Skipped(SkipReason),
    /// The session stopped running. No further frames will be opened.
    Stopped,
}

impl FrameStatus {
    pub fn continues(self) -> bool {
        matches!(self, Self::NextView(_))
    }
}

/// What dispatching the frame's events decided.
enum EventOutcome {
    Proceed,
    Consumed,
    Stopped,
}

#[derive(Debug)]
pub(crate) struct FrameLoop {
    phase: FramePhase,
    running: bool,
    visible: bool,
    timing: FrameTiming,
    projection_views: Vec<Option<ProjectionView>>,
    located: Option<Vec<View>>,
    frames_submitted: u64,
}

impl FrameLoop {
    pub(crate) fn new(view_count: usize) -> Self {
        Self {
            phase: FramePhase::Idle,
            running: true,
            visible: false,
            timing: FrameTiming::default(),
            projection_views: vec![None; view_count],
            located: None,
            frames_submitted: 0,
        }
    }

    pub(crate) fn running(&self) -> bool {
        self.running
    }

    pub(crate) fn visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.running = false;
        self.phase = FramePhase::Idle;
    }

    pub(crate) fn located(&self) -> Option<&[View]> {
        self.located.as_deref()
    }

    fn start(&mut self) {
        self.phase = FramePhase::Waiting;
        self.timing = FrameTiming::default();
        self.projection_views.iter_mut().for_each(|slot| *slot = None);
    }

    fn skip(&mut self, reason: SkipReason) -> FrameStatus {
        self.phase = FramePhase::Idle;
        FrameStatus::Skipped(reason)
    }

    fn apply_state(&mut self, state: SessionState) {
        self.visible = state <= SessionState::Focused;
        if state >= SessionState::Stopping {
            self.running = false;
        }
        info!(
            "session state {state:?}: running={} visible={}",
            self.running, self.visible
        );
    }
}

impl Session {
    pub fn frame_phase(&self) -> FramePhase {
        self.frame.phase
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frame.frames_submitted
    }

    /// Submits `source` as the image for `view` in the current frame.
    ///
    /// Views must arrive in increasing order starting at 0. Runtime failures
    /// inside a frame are logged and reported as [`FrameStatus::Skipped`];
    /// only caller contract violations come back as errors.
    pub fn render_view(&mut self, view: usize, source: TextureHandle) -> XrResult<FrameStatus> {
        self.ensure_alive()?;
        self.check_view(view)?;
        if !self.frame.running {
            return Ok(FrameStatus::Stopped);
        }

        if view == 0 {
            if matches!(
                self.frame.phase,
                FramePhase::Rendering(_) | FramePhase::FrameOpen
            ) {
                warn!("view 0 submitted while a frame was open; abandoning that frame");
            }
            if let Some(status) = self.begin_sequence() {
                return Ok(status);
            }
        } else {
            match self.frame.phase {
                FramePhase::Rendering(expected) if expected == view => {}
                FramePhase::Rendering(expected) => {
                    return Err(XrError::ViewOrder {
                        expected,
                        got: view,
                    })
                }
                _ => {
                    debug!("view {view} skipped: no frame open");
                    return Ok(FrameStatus::Skipped(SkipReason::FrameNotOpen));
                }
            }
        }

        if let Err(err) = self.view_step(view, source) {
            warn!("view {view} abandoned: {err}");
            self.end_empty_frame();
            return Ok(self.frame.skip(SkipReason::ViewStepFailed));
        }

        let next = view + 1;
        if next < self.view_count() {
            self.frame.phase = FramePhase::Rendering(next);
            return Ok(FrameStatus::NextView(next));
        }
        Ok(self.end_sequence())
    }

    /// Wait, events, locate, begin. `None` means the frame is open.
    fn begin_sequence(&mut self) -> Option<FrameStatus> {
        self.frame.start();

        let timing = match self.runtime.wait_frame(self.session) {
            Ok(timing) => timing,
            Err(err) => {
                error!("xrWaitFrame failed [{}]", err.name);
                return Some(self.frame.skip(SkipReason::WaitFrameFailed));
            }
        };
        self.frame.timing = timing;

        match self.dispatch_events() {
            Ok(EventOutcome::Proceed) => {}
            Ok(EventOutcome::Consumed) => {
                return Some(self.frame.skip(SkipReason::EventConsumedFrame))
            }
            Ok(EventOutcome::Stopped) => {
                self.frame.phase = FramePhase::Idle;
                return Some(FrameStatus::Stopped);
            }
            Err(err) => {
                error!("xrPollEvent failed [{}]", err.name);
                return Some(self.frame.skip(SkipReason::EventPollFailed));
            }
        }

        if !self.frame.running {
            self.frame.phase = FramePhase::Idle;
            return Some(FrameStatus::Stopped);
        }
        if !self.frame.visible {
            return Some(self.frame.skip(SkipReason::NotVisible));
        }

        let view_configuration = self.caps().system.view_configuration;
        match self.runtime.locate_views(
            self.session,
            view_configuration,
            timing.predicted_display_time,
            self.space,
        ) {
            Ok(views) => self.frame.located = Some(views),
            Err(err) => {
                error!("xrLocateViews failed [{}]", err.name);
                return Some(self.frame.skip(SkipReason::LocateViewsFailed));
            }
        }

        if let Err(err) = self.runtime.begin_frame(self.session) {
            error!("xrBeginFrame failed [{}]", err.name);
            return Some(self.frame.skip(SkipReason::BeginFrameFailed));
        }
        self.frame.phase = FramePhase::FrameOpen;

        if !timing.should_render {
            debug!("runtime asked for no rendering at {}", timing.predicted_display_time);
            self.end_empty_frame();
            return Some(self.frame.skip(SkipReason::RuntimeNotRendering));
        }

        self.frame.phase = FramePhase::Rendering(0);
        None
    }

    fn dispatch_events(&mut self) -> RuntimeResult<EventOutcome> {
        let limit = match self.config.event_drain {
            EventDrainPolicy::Single => 1,
            EventDrainPolicy::All => MAX_EVENTS_PER_FRAME,
        };

        let mut outcome = EventOutcome::Proceed;
        for _ in 0..limit {
            let Some(event) = self.runtime.poll_event(self.instance)? else {
                break;
            };
            match event {
                RuntimeEvent::EventsLost { lost_event_count } => {
                    info!("runtime dropped {lost_event_count} events");
                }
                RuntimeEvent::InstanceLossPending { loss_time } => {
                    warn!("instance loss pending at {loss_time}");
                    self.frame.running = false;
                    return Ok(EventOutcome::Stopped);
                }
                RuntimeEvent::SessionStateChanged { state, .. } => {
                    self.frame.apply_state(state);
                    if !self.frame.running {
                        return Ok(EventOutcome::Stopped);
                    }
                    if self.config.state_change_aborts_frame || !self.frame.visible {
                        outcome = EventOutcome::Consumed;
                    }
                }
                RuntimeEvent::ReferenceSpaceChangePending { space_type } => {
                    info!("reference space {space_type:?} change pending");
                }
                RuntimeEvent::InteractionProfileChanged => {
                    info!("interaction profile changed");
                }
                RuntimeEvent::Unknown { raw_type } => {
                    warn!("ignoring unhandled event type {raw_type}");
                }
            }
        }
        Ok(outcome)
    }

    /// Acquire, wait, record, copy, release for one view.
    fn view_step(&mut self, view: usize, source: TextureHandle) -> XrResult<()> {
        let timeout = self.config.swapchain_wait_timeout();
        let Session {
            runtime,
            graphics,
            pool,
            frame,
            ..
        } = self;
        let pool = pool.as_mut().ok_or(XrError::ContextReleased)?;

        let buffer_index = pool.acquire(runtime.as_mut(), view)?;
        pool.wait(runtime.as_mut(), view, timeout)?;

        let chain = pool.view(view)?;
        let (swapchain, extent) = (chain.handle(), chain.extent());
        let located = frame
            .located
            .as_ref()
            .and_then(|views| views.get(view))
            .copied()
            .unwrap_or_default();
        frame.projection_views[view] = Some(ProjectionView {
            pose: located.pose,
            fov: located.fov,
            sub_image: SubImage {
                swapchain,
                image_rect: Rect2D::full(extent),
                buffer_index,
            },
        });

        let copied = match pool.image(view, buffer_index) {
            Some(target) => check("copyTexture", graphics.copy_texture(source, target, extent)),
            None => Err(XrError::ImageOrder {
                view,
                detail: "acquired index outside the image table",
            }),
        };
        pool.release(runtime.as_mut(), view)?;
        copied
    }

    /// Closes an open frame with no layers so every begin has its end.
    fn end_empty_frame(&mut self) {
        if let Err(err) = self.runtime.end_frame(
            self.session,
            self.frame.timing.predicted_display_time,
            EnvironmentBlendMode::Opaque,
            &[],
        ) {
            error!("xrEndFrame failed [{}]", err.name);
        }
    }

    fn end_sequence(&mut self) -> FrameStatus {
        self.frame.phase = FramePhase::FrameClosing;
        let views: Vec<ProjectionView> = self.frame.projection_views.iter().flatten().copied().collect();
        let layer = ProjectionLayer {
            space: self.space,
            views,
        };
        let display_time = self.frame.timing.predicted_display_time;
        let result = self.runtime.end_frame(
            self.session,
            display_time,
            EnvironmentBlendMode::Opaque,
            std::slice::from_ref(&layer),
        );
        self.frame.phase = FramePhase::Idle;
        match result {
            Ok(()) => {
                self.frame.frames_submitted += 1;
                debug!("frame submitted for display at {display_time}");
                FrameStatus::Submitted
            }
            Err(err) => {
                error!("xrEndFrame failed [{}]", err.name);
                FrameStatus::Skipped(SkipReason::EndFrameFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::RuntimeError;
    use crate::mock::{MockCall, MockProbe, MockRuntime, MockSpec};
    use crate::swapchain::ImageState;

    const TEX: TextureHandle = TextureHandle(7);

    fn session_with(spec: MockSpec, config: SessionConfig) -> (Session, MockProbe) {
        let (runtime, probe) = MockRuntime::new(spec);
        let session = Session::create(Box::new(runtime), Box::new(probe.graphics()), config).unwrap();
        probe.clear_calls();
        (session, probe)
    }

    fn focused(spec: MockSpec) -> (Session, MockProbe) {
        let (mut session, probe) = session_with(spec, SessionConfig::default());
        probe.push_state(SessionState::Focused);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);
        probe.clear_calls();
        (session, probe)
    }

    #[test]
    fn test_not_visible_skips_without_opening_frame() {
        let (mut session, probe) = session_with(MockSpec::default(), SessionConfig::default());
        let status = session.render_view(0, TEX).unwrap();
        assert_eq!(status, FrameStatus::Skipped(SkipReason::NotVisible));
        assert_eq!(probe.count("xrWaitFrame"), 1);
        assert_eq!(probe.count("xrBeginFrame"), 0);
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 0);
        assert_eq!(session.frame_phase(), FramePhase::Idle);

        let status = session.render_view(1, TEX).unwrap();
        assert_eq!(status, FrameStatus::Skipped(SkipReason::FrameNotOpen));
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 0);
    }

    #[test]
    fn test_full_frame_call_order() {
        let (mut session, probe) = focused(MockSpec::default());
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);

        let names: Vec<_> = probe.calls().iter().map(MockCall::name).collect();
        assert_eq!(
            names,
            vec![
                "xrWaitFrame",
                "xrPollEvent",
                "xrLocateViews",
                "xrBeginFrame",
                "xrAcquireSwapchainImage",
                "xrWaitSwapchainImage",
                "copyTexture",
                "xrReleaseSwapchainImage",
                "xrAcquireSwapchainImage",
                "xrWaitSwapchainImage",
                "copyTexture",
                "xrReleaseSwapchainImage",
                "xrEndFrame",
            ]
        );
        assert_eq!(session.frames_submitted(), 2);
    }

    #[test]
    fn test_end_frame_carries_one_layer_per_view() {
        let (mut session, probe) = focused(MockSpec::default());
        session.render_view(0, TEX).unwrap();
        session.render_view(1, TEX).unwrap();

        let (display_time, layers) = probe
            .calls()
            .into_iter()
            .find_map(|call| match call {
                MockCall::EndFrame { display_time, layers } => Some((display_time, layers)),
                _ => None,
            })
            .unwrap();
        assert_eq!(display_time, 2 * MockSpec::default().frame_period_ns);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].views.len(), 2);
        for view in &layers[0].views {
            assert_eq!(view.sub_image.image_rect.x, 0);
            assert_eq!(view.sub_image.image_rect.y, 0);
            assert_eq!(view.sub_image.image_rect.extent.width, 1024);
        }
        assert!(layers[0].views[0].pose.position.x < layers[0].views[1].pose.position.x);
    }

    #[test]
    fn test_wait_timeout_is_bounded() {
        let (mut session, probe) = focused(MockSpec::default());
        session.render_view(0, TEX).unwrap();
        let waits: Vec<_> = probe
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::WaitImage(_, timeout) => Some(timeout),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![session.config().swapchain_wait_timeout()]);
    }

    #[test]
    fn test_view_out_of_range() {
        let (mut session, _probe) = focused(MockSpec::default());
        let err = session.render_view(2, TEX).unwrap_err();
        assert!(matches!(err, XrError::ViewOutOfRange { view: 2, view_count: 2 }));
    }

    #[test]
    fn test_view_out_of_order() {
        let spec = MockSpec {
            views: vec![crate::types::ViewConfigView::square(512); 3],
            ..MockSpec::default()
        };
        let (mut session, _probe) = focused_three(spec);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        let err = session.render_view(2, TEX).unwrap_err();
        assert!(matches!(err, XrError::ViewOrder { expected: 1, got: 2 }));
    }

    fn focused_three(spec: MockSpec) -> (Session, MockProbe) {
        let (mut session, probe) = session_with(spec, SessionConfig::default());
        probe.push_state(SessionState::Focused);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::NextView(2));
        assert_eq!(session.render_view(2, TEX).unwrap(), FrameStatus::Submitted);
        (session, probe)
    }

    #[test]
    fn test_restarting_view_zero_abandons_open_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        session.render_view(0, TEX).unwrap();
        assert_eq!(session.frame_phase(), FramePhase::Rendering(1));
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(probe.count("xrBeginFrame"), 2);
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);
    }

    #[test]
    fn test_stopping_clears_running() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.push_state(SessionState::Stopping);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
        assert!(!session.is_running());
        assert_eq!(probe.count("xrBeginFrame"), 0);

        probe.clear_calls();
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_instance_loss_stops_session() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.push_event(RuntimeEvent::InstanceLossPending { loss_time: 99 });
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
        assert!(!session.is_running());
    }

    #[test]
    fn test_loss_pending_state_stops() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.push_state(SessionState::LossPending);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
        assert!(!session.is_visible());
    }

    #[test]
    fn test_visible_state_change_keeps_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.push_state(SessionState::Visible);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert!(session.is_visible());
        assert_eq!(probe.count("xrBeginFrame"), 1);
    }

    #[test]
    fn test_state_change_can_consume_frame() {
        let config = SessionConfig {
            state_change_aborts_frame: true,
            ..SessionConfig::default()
        };
        let (mut session, probe) = session_with(MockSpec::default(), config);
        probe.push_state(SessionState::Focused);
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::EventConsumedFrame)
        );
        assert!(session.is_visible());
        assert_eq!(probe.count("xrBeginFrame"), 0);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
    }

    #[test]
    fn test_single_drain_leaves_queued_events() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.push_event(RuntimeEvent::EventsLost { lost_event_count: 3 });
        probe.push_event(RuntimeEvent::InteractionProfileChanged);
        session.render_view(0, TEX).unwrap();
        assert_eq!(probe.count("xrPollEvent"), 1);
        assert_eq!(probe.pending_events(), 1);
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let config = SessionConfig {
            event_drain: EventDrainPolicy::All,
            ..SessionConfig::default()
        };
        let (mut session, probe) = session_with(MockSpec::default(), config);
        probe.push_event(RuntimeEvent::EventsLost { lost_event_count: 1 });
        probe.push_event(RuntimeEvent::Unknown { raw_type: 1000 });
        probe.push_state(SessionState::Focused);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(probe.pending_events(), 0);
        // three events plus the empty poll
        assert_eq!(probe.count("xrPollEvent"), 4);
    }

    #[test]
    fn test_wait_frame_failure_keeps_running() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrWaitFrame", RuntimeError::runtime_failure());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::WaitFrameFailed)
        );
        assert!(session.is_running());
        assert_eq!(probe.count("xrBeginFrame"), 0);
    }

    #[test]
    fn test_locate_failure_skips_before_begin() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrLocateViews", RuntimeError::runtime_failure());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::LocateViewsFailed)
        );
        assert_eq!(probe.count("xrBeginFrame"), 0);
    }

    #[test]
    fn test_begin_failure_skips_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrBeginFrame", RuntimeError::runtime_failure());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::BeginFrameFailed)
        );
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 0);
    }

    #[test]
    fn test_end_failure_is_not_fatal() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrEndFrame", RuntimeError::runtime_failure());
        session.render_view(0, TEX).unwrap();
        assert_eq!(
            session.render_view(1, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::EndFrameFailed)
        );
        assert!(session.is_running());
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
    }

    #[test]
    fn test_should_render_false_brackets_empty_frame() {
        let spec = MockSpec {
            should_render: false,
            ..MockSpec::default()
        };
        let (mut session, probe) = session_with(spec, SessionConfig::default());
        probe.push_state(SessionState::Focused);
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::RuntimeNotRendering)
        );
        assert_eq!(probe.count("xrBeginFrame"), 1);
        assert!(probe
            .calls()
            .iter()
            .any(|call| matches!(call, MockCall::EndFrame { layers, .. } if layers.is_empty())));
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 0);
    }

    #[test]
    fn test_failed_image_wait_resumes_next_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrWaitSwapchainImage", RuntimeError::timeout_expired());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::ViewStepFailed)
        );
        assert_eq!(session.frame_phase(), FramePhase::Idle);

        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 1);
        assert_eq!(probe.count("xrWaitSwapchainImage"), 2);
        assert_eq!(probe.count("xrReleaseSwapchainImage"), 1);
    }

    #[test]
    fn test_failed_image_release_recovers_next_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("xrReleaseSwapchainImage", RuntimeError::runtime_failure());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::ViewStepFailed)
        );
        assert_eq!(
            session
                .swapchains()
                .and_then(|pool| pool.view(0).ok())
                .map(|chain| chain.state()),
            Some(ImageState::Waited(1))
        );

        for _ in 0..3 {
            assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
            assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);
        }
        assert!(session.is_running());
        assert_eq!(probe.count("xrAcquireSwapchainImage"), 7);
        assert_eq!(probe.count("xrReleaseSwapchainImage"), 8);
        assert_eq!(probe.count("xrBeginFrame"), probe.count("xrEndFrame"));
    }

    #[test]
    fn test_view_failure_closes_open_frame() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("copyTexture", RuntimeError::runtime_failure());
        session.render_view(0, TEX).unwrap();
        assert_eq!(probe.count("xrBeginFrame"), 1);
        assert!(matches!(
            probe.calls().last(),
            Some(MockCall::EndFrame { layers, .. }) if layers.is_empty()
        ));
        assert_eq!(session.frame_phase(), FramePhase::Idle);
    }

    #[test]
    fn test_copy_failure_still_releases_image() {
        let (mut session, probe) = focused(MockSpec::default());
        probe.fail_next("copyTexture", RuntimeError::runtime_failure());
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::ViewStepFailed)
        );
        assert_eq!(probe.count("xrReleaseSwapchainImage"), 1);
    }

    #[test]
    fn test_released_session_rejects_frames() {
        let (mut session, _probe) = focused(MockSpec::default());
        session.shutdown();
        assert!(matches!(
            session.render_view(0, TEX),
            Err(XrError::ContextReleased)
        ));
    }
}
