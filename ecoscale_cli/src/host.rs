//! `ecoscale host`: connect, poll, and report what the orchestrator does.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ecoscale_core::error::RequestError;
use ecoscale_core::{HostCfg, HostController, HostEvent, LinkSettings};
use ecoscale_hardware::{SerialOpener, StdioLineIo};
use ecoscale_traits::LineIo;
use tracing::{info, warn};

use crate::collaborators::{DemoClassifier, ImageFrames, TableCalculator};

const RECONNECT_EVERY: Duration = Duration::from_secs(2);

pub struct HostArgs {
    pub port: Option<String>,
    pub image: Option<PathBuf>,
    pub duration: Option<Duration>,
    pub json: bool,
}

fn event_name(e: &HostEvent) -> &'static str {
    match e {
        HostEvent::Connected { .. } => "connected",
        HostEvent::ConnectionFailed { .. } => "connection_failed",
        HostEvent::ConnectionLost => "connection_lost",
        HostEvent::Disconnected => "disconnected",
        HostEvent::DeviceStatus { .. } => "device_status",
        HostEvent::AnalysisStarted { .. } => "analysis_started",
        HostEvent::AutoTriggerFailed { .. } => "auto_trigger_failed",
        HostEvent::Classified { .. } => "classified",
        HostEvent::ClassificationFailed { .. } => "classification_failed",
        HostEvent::ResultSent { .. } => "result_sent",
        HostEvent::ResultSendFailed { .. } => "result_send_failed",
        HostEvent::SessionCancelled { .. } => "session_cancelled",
        HostEvent::SessionReset { .. } => "session_reset",
    }
}

fn print_event(e: &HostEvent, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({ "event": event_name(e), "message": e.to_string() })
        );
    } else {
        println!("{e}");
    }
}

pub fn run(
    cfg: &ecoscale_config::Config,
    args: HostArgs,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let host_cfg = HostCfg::from(&cfg.host);
    let poll_every = host_cfg.poll_interval;
    let frames = match args.image {
        Some(path) => ImageFrames::File(path),
        None => ImageFrames::Blank,
    };
    let mut host = HostController::new(
        SerialOpener,
        LinkSettings::from(&cfg.link),
        host_cfg,
        Arc::new(DemoClassifier::new(Duration::from_millis(800))),
        TableCalculator::default(),
        frames,
    );

    let port = args.port.or_else(|| cfg.link.port.clone());
    host.connect(port.as_deref())?;

    // Typed commands on stdin: `a` analyze now, `r` reset, `q` quit.
    let mut commands = match StdioLineIo::spawn() {
        Ok(io) => Some(io),
        Err(e) => {
            warn!(error = %e, "stdin commands unavailable");
            None
        }
    };

    let started = Instant::now();
    let mut reconnect_at: Option<Instant> = None;
    while !shutdown.load(Ordering::Relaxed) {
        if args.duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        if let Some(cmd) = commands.as_mut().and_then(|io| io.poll_line()) {
            match cmd.trim() {
                "a" | "analyze" => match host.request_classification() {
                    Ok(_) => {}
                    Err(RequestError::Busy) => info!("analysis already in progress"),
                    Err(e) => warn!(error = %e, "analysis not started"),
                },
                "r" | "reset" => host.reset(),
                "q" | "quit" => break,
                "" => {}
                other => warn!(command = other, "unknown command (a|r|q)"),
            }
        }

        for event in host.poll() {
            if event == HostEvent::ConnectionLost {
                reconnect_at = Some(Instant::now() + RECONNECT_EVERY);
            }
            print_event(&event, args.json);
        }

        if let Some(at) = reconnect_at
            && Instant::now() >= at
        {
            reconnect_at = match host.connect(port.as_deref()) {
                Ok(_) => None,
                Err(_) => Some(Instant::now() + RECONNECT_EVERY),
            };
        }

        std::thread::sleep(poll_every);
    }

    host.disconnect();
    for event in host.poll() {
        print_event(&event, args.json);
    }
    let stats = host.link_stats();
    info!(
        lines = stats.lines_received,
        weights = stats.weight_records,
        dropped = stats.lines_dropped,
        "host stopped"
    );
    Ok(())
}
