//! Session lifecycle, registry and frame-loop behaviour against the mock runtime.

use visor_xr::mock::{MockCall, MockProbe, MockRuntime, MockSpec};
use visor_xr::types::RuntimeEvent;
use visor_xr::{
    ContextRegistry, EventDrainPolicy, FrameStatus, NegotiationError, RuntimeError, Session,
    SessionConfig, SessionState, SkipReason, TextureHandle, ViewConfigView, XrError,
};

const TEX: TextureHandle = TextureHandle(3);

fn registry_with(spec: MockSpec, config: SessionConfig) -> (ContextRegistry, MockProbe) {
    let (_, probe) = MockRuntime::new(spec.clone());
    let shared = probe.clone();
    let registry = ContextRegistry::new(move || {
        Session::create(
            Box::new(shared.runtime(spec.clone())),
            Box::new(shared.graphics()),
            config.clone(),
        )
    });
    (registry, probe)
}

fn session_with(spec: MockSpec) -> (Session, MockProbe) {
    let (runtime, probe) = MockRuntime::new(spec);
    let session = Session::create(
        Box::new(runtime),
        Box::new(probe.graphics()),
        SessionConfig::default(),
    )
    .unwrap();
    (session, probe)
}

/// Two views at 1024x1024, one image each, FOCUSED on the first call.
#[test]
fn test_single_frame_scenario() {
    let spec = MockSpec::stereo(1024, 1);
    let (mut registry, probe) = registry_with(spec, SessionConfig::default());
    probe.push_state(SessionState::Focused);

    let handle = registry.acquire().unwrap();
    assert_eq!(handle.render_eye(0, TEX).unwrap(), FrameStatus::NextView(1));
    assert_eq!(handle.render_eye(1, TEX).unwrap(), FrameStatus::Submitted);
    assert_eq!(handle.recommended_render_target_size(), (1024, 1024));
    registry.release(handle);

    assert_eq!(probe.count("xrCreateInstance"), 1);
    assert_eq!(probe.count("xrCreateSession"), 1);
    assert_eq!(probe.count("xrCreateSwapchain"), 2);
    assert_eq!(probe.count("xrBeginFrame"), 1);
    assert_eq!(probe.count("xrEndFrame"), 1);
    assert_eq!(probe.count("xrAcquireSwapchainImage"), 2);
    assert_eq!(probe.count("xrReleaseSwapchainImage"), 2);
    assert_eq!(probe.live_swapchains(), 0);
    assert_eq!(probe.live_sessions(), 0);
    assert_eq!(probe.live_instances(), 0);
}

#[test]
fn test_refcount_constructs_once_per_rise() {
    let (mut registry, probe) = registry_with(MockSpec::default(), SessionConfig::default());

    let a = registry.acquire().unwrap();
    let b = registry.acquire().unwrap();
    assert!(a.ptr_eq(&b));
    registry.release(a);
    registry.release(b);
    assert_eq!(probe.count("xrCreateSession"), 1);
    assert_eq!(probe.count("xrDestroySession"), 1);

    for _ in 0..3 {
        let h = registry.acquire().unwrap();
        registry.release(h);
    }
    assert_eq!(probe.count("xrCreateSession"), 4);
    assert_eq!(probe.count("xrDestroySession"), 4);
    assert_eq!(registry.use_count(), 0);
}

#[test]
fn test_missing_extension_blocks_session() {
    let spec = MockSpec {
        extensions: vec!["XR_KHR_vulkan_enable2".to_string()],
        ..MockSpec::default()
    };
    let (mut registry, probe) = registry_with(spec, SessionConfig::default());
    let err = registry.acquire().unwrap_err();
    assert!(matches!(
        err,
        XrError::Negotiation(NegotiationError::UnsupportedExtension(_))
    ));
    assert_eq!(probe.count("xrCreateSession"), 0);
    assert_eq!(registry.use_count(), 0);
}

#[test]
fn test_pool_calls_follow_frame_bracket() {
    let (mut session, probe) = session_with(MockSpec::default());
    probe.push_state(SessionState::Focused);
    for _ in 0..3 {
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);
    }

    let calls = probe.calls();
    let frame_calls: Vec<&MockCall> = calls
        .iter()
        .filter(|call| {
            matches!(
                call,
                MockCall::BeginFrame
                    | MockCall::EndFrame { .. }
                    | MockCall::AcquireImage(_)
                    | MockCall::WaitImage(..)
                    | MockCall::ReleaseImage(_)
            )
        })
        .collect();
    assert_eq!(frame_calls.len(), 3 * (2 + 2 * 3));

    for frame in frame_calls.chunks(8) {
        assert!(matches!(frame[0], MockCall::BeginFrame));
        assert!(matches!(frame[7], MockCall::EndFrame { .. }));
        for view in frame[1..7].chunks(3) {
            let (MockCall::AcquireImage(a), MockCall::WaitImage(w, _), MockCall::ReleaseImage(r)) =
                (view[0], view[1], view[2])
            else {
                panic!("unexpected per-view sequence: {view:?}");
            };
            assert_eq!(a, w);
            assert_eq!(w, r);
        }
    }
}

#[test]
fn test_never_visible_never_opens_frames() {
    let (mut session, probe) = session_with(MockSpec::default());
    for _ in 0..25 {
        assert_eq!(
            session.render_view(0, TEX).unwrap(),
            FrameStatus::Skipped(SkipReason::NotVisible)
        );
    }
    assert!(!session.is_visible());
    assert_eq!(probe.count("xrBeginFrame"), 0);
    assert_eq!(probe.count("xrEndFrame"), 0);
    assert_eq!(probe.count("xrAcquireSwapchainImage"), 0);
    assert_eq!(probe.count("xrWaitFrame"), 25);
}

#[test]
fn test_shutdown_latch_holds() {
    for event in [
        RuntimeEvent::InstanceLossPending { loss_time: 10 },
        RuntimeEvent::SessionStateChanged {
            state: SessionState::Stopping,
            time: 10,
        },
        RuntimeEvent::SessionStateChanged {
            state: SessionState::Exiting,
            time: 10,
        },
    ] {
        let (mut session, probe) = session_with(MockSpec::default());
        probe.push_state(SessionState::Focused);
        session.render_view(0, TEX).unwrap();
        session.render_view(1, TEX).unwrap();

        probe.push_event(event);
        probe.push_state(SessionState::Focused);
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
        for _ in 0..5 {
            assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::Stopped);
            assert!(!session.is_running());
        }
        // the queued FOCUSED event is never consumed
        assert_eq!(probe.pending_events(), 1);
    }
}

#[test]
fn test_view_matrix_after_first_locate() {
    let (mut session, probe) = session_with(MockSpec::default());
    assert!(matches!(session.view_matrix(1), Err(XrError::Unavailable(_))));

    session.render_view(0, TEX).unwrap();
    assert!(matches!(session.view_matrix(1), Err(XrError::Unavailable(_))));

    probe.push_state(SessionState::Visible);
    session.render_view(0, TEX).unwrap();
    let m = session.view_matrix(1).unwrap();
    assert!(m.is_finite());
    assert!(m.w_axis.x < 0.0);
}

#[test]
fn test_drain_all_policy_applies_latest_state() {
    let config = SessionConfig {
        event_drain: EventDrainPolicy::All,
        ..SessionConfig::default()
    };
    let (mut registry, probe) = registry_with(MockSpec::default(), config);
    probe.push_event(RuntimeEvent::EventsLost { lost_event_count: 2 });
    probe.push_state(SessionState::Ready);
    probe.push_state(SessionState::Synchronized);
    probe.push_state(SessionState::Visible);
    probe.push_state(SessionState::Focused);

    let handle = registry.acquire().unwrap();
    assert_eq!(handle.render_eye(0, TEX).unwrap(), FrameStatus::NextView(1));
    assert_eq!(probe.pending_events(), 0);
    assert!(handle.is_visible());
    registry.release(handle);
}

#[test]
fn test_single_drain_takes_one_event_per_frame() {
    let (mut session, probe) = session_with(MockSpec::default());
    probe.push_event(RuntimeEvent::ReferenceSpaceChangePending {
        space_type: visor_xr::types::ReferenceSpaceType::Local,
    });
    probe.push_state(SessionState::Focused);

    assert_eq!(
        session.render_view(0, TEX).unwrap(),
        FrameStatus::Skipped(SkipReason::NotVisible)
    );
    assert_eq!(probe.pending_events(), 1);
    assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
}

#[test]
fn test_four_view_configuration() {
    let spec = MockSpec {
        views: vec![ViewConfigView::square(640); 4],
        ..MockSpec::default()
    };
    let (mut session, probe) = session_with(spec);
    probe.push_state(SessionState::Focused);
    for view in 0..3 {
        assert_eq!(
            session.render_view(view, TEX).unwrap(),
            FrameStatus::NextView(view + 1)
        );
    }
    assert_eq!(session.render_view(3, TEX).unwrap(), FrameStatus::Submitted);
    assert_eq!(probe.count("xrCreateSwapchain"), 4);
    let layers = probe
        .calls()
        .into_iter()
        .find_map(|call| match call {
            MockCall::EndFrame { layers, .. } => Some(layers),
            _ => None,
        })
        .unwrap();
    assert_eq!(layers[0].views.len(), 4);
}

#[test]
fn test_dropped_release_does_not_stall_view() {
    let (mut session, probe) = session_with(MockSpec::stereo(512, 3));
    probe.push_state(SessionState::Focused);
    assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
    assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);

    probe.fail_next("xrReleaseSwapchainImage", RuntimeError::runtime_failure());
    assert_eq!(
        session.render_view(0, TEX).unwrap(),
        FrameStatus::Skipped(SkipReason::ViewStepFailed)
    );

    for _ in 0..5 {
        assert_eq!(session.render_view(0, TEX).unwrap(), FrameStatus::NextView(1));
        assert_eq!(session.render_view(1, TEX).unwrap(), FrameStatus::Submitted);
    }
    assert!(session.is_running());
    assert_eq!(session.frames_submitted(), 6);
    assert_eq!(probe.count("xrBeginFrame"), probe.count("xrEndFrame"));
}
