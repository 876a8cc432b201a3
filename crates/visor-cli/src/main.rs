//! Visor CLI: drive a simulated HMD session, probe the installed OpenXR
//! runtime, or print the effective session configuration.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use visor_xr::mock::{MockRuntime, MockSpec};
use visor_xr::negotiate::Negotiator;
use visor_xr::{
    ContextRegistry, EventDrainPolicy, FrameStatus, Session, SessionConfig, SessionState,
    SkipReason, TextureHandle, ViewConfigView,
};

#[derive(Parser, Debug)]
#[command(name = "visor")]
#[command(about = "Visor HMD session tools")]
struct Args {
    /// JSON session config; unset fields keep their defaults
    #[arg(short, long, global = true, env = "VISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Event drain policy override
    #[arg(long, global = true, env = "VISOR_EVENT_DRAIN")]
    drain: Option<Drain>,

    /// Near clip plane override
    #[arg(long, global = true, env = "VISOR_NEAR_PLANE")]
    near: Option<f32>,

    /// Far clip plane override
    #[arg(long, global = true, env = "VISOR_FAR_PLANE")]
    far: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Drain {
    Single,
    All,
}

impl From<Drain> for EventDrainPolicy {
    fn from(drain: Drain) -> Self {
        match drain {
            Drain::Single => EventDrainPolicy::Single,
            Drain::All => EventDrainPolicy::All,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the frame loop against the in-process mock runtime
    Simulate {
        /// Frames to render
        #[arg(short, long, default_value_t = 90)]
        frames: u32,

        /// Number of views
        #[arg(long, default_value_t = 2)]
        views: usize,

        /// Square per-view resolution
        #[arg(long, default_value_t = 1024)]
        size: u32,

        /// Images per swapchain
        #[arg(long, default_value_t = 3)]
        images: u32,

        /// Deliver STOPPING before this frame
        #[arg(long)]
        stop_at: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Negotiate capabilities with the installed OpenXR runtime
    Probe,

    /// Print the effective session configuration as JSON
    Config,

    /// Show version information
    Version,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(drain) = args.drain {
        config.event_drain = drain.into();
    }
    if let Some(near) = args.near {
        config.near_plane = near;
    }
    if let Some(far) = args.far {
        config.far_plane = far;
    }
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Default, Serialize)]
struct SimulationReport {
    frames_requested: u32,
    frames_submitted: u32,
    skipped: BTreeMap<String, u32>,
    stopped: bool,
    recommended_size: (u32, u32),
    calls: BTreeMap<&'static str, usize>,
}

const REPORTED_CALLS: [&str; 8] = [
    "xrCreateInstance",
    "xrCreateSession",
    "xrCreateSwapchain",
    "xrBeginFrame",
    "xrEndFrame",
    "xrAcquireSwapchainImage",
    "xrReleaseSwapchainImage",
    "copyTexture",
];

fn simulate(
    config: SessionConfig,
    frames: u32,
    spec: MockSpec,
    stop_at: Option<u32>,
) -> Result<SimulationReport> {
    let (_, probe) = MockRuntime::new(spec.clone());
    let shared = probe.clone();
    let mut registry = ContextRegistry::new(move || {
        Session::create(
            Box::new(shared.runtime(spec.clone())),
            Box::new(shared.graphics()),
            config.clone(),
        )
    });

    let handle = registry.acquire()?;
    probe.push_state(SessionState::Ready);
    probe.push_state(SessionState::Synchronized);
    probe.push_state(SessionState::Visible);
    probe.push_state(SessionState::Focused);

    let mut report = SimulationReport {
        frames_requested: frames,
        recommended_size: handle.recommended_render_target_size(),
        ..SimulationReport::default()
    };
    let source = TextureHandle(1);

    'frames: for frame in 0..frames {
        if stop_at == Some(frame) {
            probe.push_state(SessionState::Stopping);
        }
        for view in 0..handle.view_count() {
            match handle.render_eye(view, source)? {
                FrameStatus::NextView(_) => {}
                FrameStatus::Submitted => {
                    report.frames_submitted += 1;
                    break;
                }
                FrameStatus::Skipped(reason) => {
                    *report.skipped.entry(skip_label(reason)).or_default() += 1;
                    break;
                }
                FrameStatus::Stopped => {
                    info!("session stopped at frame {frame}");
                    report.stopped = true;
                    break 'frames;
                }
            }
        }
    }

    registry.release(handle);
    report.calls = REPORTED_CALLS
        .iter()
        .map(|name| (*name, probe.count(name)))
        .collect();
    Ok(report)
}

fn skip_label(reason: SkipReason) -> String {
    format!("{reason:?}")
}

fn print_report(report: &SimulationReport) {
    println!(
        "frames: {} submitted / {} requested{}",
        report.frames_submitted,
        report.frames_requested,
        if report.stopped { " (stopped)" } else { "" }
    );
    println!(
        "render target: {}x{}",
        report.recommended_size.0, report.recommended_size.1
    );
    for (reason, count) in &report.skipped {
        println!("skipped {reason}: {count}");
    }
    for (call, count) in &report.calls {
        println!("{call:<28} {count}");
    }
}

fn probe(config: &SessionConfig) -> Result<()> {
    let mut runtime = visor_xr_openxr::load_runtime()?;
    let negotiator = Negotiator::new(config);
    let extensions = negotiator.require_extension(runtime.as_mut())?;
    let instance = runtime
        .create_instance(&config.application_info(), &extensions)
        .map_err(|e| anyhow::anyhow!("xrCreateInstance: {e}"))?;

    let result = negotiator.negotiate(runtime.as_mut(), instance);
    if let Err(e) = runtime.destroy_instance(instance) {
        warn!("xrDestroyInstance failed [{}]", e.name);
    }
    let caps = result?;

    println!("system: {}", caps.properties.system_name);
    println!("view configuration: {:?}", caps.view_configuration);
    for (index, view) in caps.views.iter().enumerate() {
        println!(
            "view {index}: {}x{} (max {}x{})",
            view.recommended_width, view.recommended_height, view.max_width, view.max_height
        );
    }
    println!(
        "OpenGL {} .. {}",
        caps.graphics.min_api_version, caps.graphics.max_api_version
    );
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Simulate {
            frames,
            views,
            size,
            images,
            stop_at,
            json,
        } => {
            let spec = MockSpec {
                views: vec![ViewConfigView::square(size); views.max(1)],
                ..MockSpec::stereo(size, images)
            };
            let report = simulate(config, frames, spec, stop_at)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::Probe => probe(&config)?,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Version => {
            println!("visor {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let args = Args::try_parse_from(["visor", "--drain", "all", "--far", "42", "config"]).unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.event_drain, EventDrainPolicy::All);
        assert_eq!(config.far_plane, 42.0);
        assert_eq!(config.near_plane, 0.05);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::try_parse_from(["visor", "--near", "5", "--far", "1", "config"]).unwrap();
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_simulate_submits_every_frame() {
        let report = simulate(SessionConfig::default(), 10, MockSpec::stereo(512, 2), None).unwrap();
        assert_eq!(report.frames_submitted, 10);
        assert_eq!(report.skipped.get("NotVisible"), None);
        assert_eq!(report.recommended_size, (512, 512));
        assert_eq!(report.calls["xrCreateSession"], 1);
        assert_eq!(report.calls["xrEndFrame"], 10);
        assert_eq!(report.calls["copyTexture"], 20);
    }

    #[test]
    fn test_simulate_stops_on_stopping() {
        let config = SessionConfig {
            event_drain: EventDrainPolicy::All,
            ..SessionConfig::default()
        };
        let report = simulate(config, 10, MockSpec::stereo(256, 3), Some(4)).unwrap();
        assert!(report.stopped);
        assert_eq!(report.frames_submitted, 4);
    }
}
