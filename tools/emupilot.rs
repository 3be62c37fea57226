// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! emupilot runner.
//!
//! Starts the capture loop, the clip server, the emulator link and the
//! decision cycle from one `emupilot.toml`, and runs until Ctrl-C.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use emupilot::agent::{
    CycleDriver, CycleSettings, DecisionCycle, DecisionOracle, DriverConfig, TimingGate,
    TracingKnowledgeSink,
};
use emupilot::capture::{
    Capturer, ClipEncoder, ClipEncoderConfig, Clock, FrameRingBuffer, ImageFileSource,
    MonotonicClock,
};
use emupilot::config::{load_config, validate_config, PilotConfig};
use emupilot::emulator::{EmulatorLink, ProtocolGuard};
use emupilot::ipc::{ClipPolicy, ClipServer, ClipService, LocalClipSource};
use emupilot::observability::{debug_flags_help, init_logging, parse_debug_flags, ObservabilityConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// `--flag value` pairs accepted as config overrides.
const OVERRIDE_FLAGS: &[(&str, &str)] = &[
    ("--ipc-host", "ipc_host"),
    ("--ipc-port", "ipc_port"),
    ("--emulator-host", "emulator_host"),
    ("--emulator-port", "emulator_port"),
    ("--capture-fps", "capture_fps"),
    ("--cooldown-ms", "cooldown_ms"),
    ("--visual-mode", "visual_mode"),
    ("--log-level", "log_level"),
];

fn usage_and_exit() -> ! {
    let overrides: Vec<&str> = OVERRIDE_FLAGS.iter().map(|(flag, _)| *flag).collect();
    eprintln!(
        "Usage: emupilot [--config <path>] [<override> <value>]... [--debug-<crate>]\n\n\
         Overrides: {}\n\n{}",
        overrides.join(", "),
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> (Option<PathBuf>, HashMap<String, String>) {
    let mut config_path = None;
    let mut overrides = HashMap::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                config_path = Some(PathBuf::from(v));
            }
            "-h" | "--help" => usage_and_exit(),
            flag if flag.starts_with("--debug-") => {}
            flag => match OVERRIDE_FLAGS.iter().find(|(name, _)| *name == flag) {
                Some((_, key)) => {
                    let v = args.next().unwrap_or_else(|| usage_and_exit());
                    overrides.insert(key.to_string(), v);
                }
                None => {
                    eprintln!("Unknown argument: {flag}");
                    usage_and_exit();
                }
            },
        }
    }

    (config_path, overrides)
}

fn observability_config(config: &PilotConfig) -> ObservabilityConfig {
    ObservabilityConfig {
        level: config.logging.level.clone(),
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
        ..ObservabilityConfig::default()
    }
}

#[cfg(feature = "http-oracle")]
fn build_oracle(config: &PilotConfig) -> Result<Arc<dyn DecisionOracle>> {
    let timeout = Duration::from_secs_f64(config.decision.oracle_timeout_secs.max(0.0));
    let oracle = emupilot::agent::HttpOracle::new(config.decision.oracle_endpoint.clone(), timeout)
        .context("Failed to build HTTP oracle client")?;
    info!("[PILOT] Oracle endpoint: {}", oracle.endpoint());
    Ok(Arc::new(oracle))
}

#[cfg(not(feature = "http-oracle"))]
fn build_oracle(_config: &PilotConfig) -> Result<Arc<dyn DecisionOracle>> {
    info!("[PILOT] Built without http-oracle, every decision uses the fallback buttons");
    Ok(Arc::new(emupilot::agent::NeutralOracle))
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, overrides) = parse_args();
    let debug_flags = parse_debug_flags();

    let config = load_config(config_path.as_deref(), Some(&overrides)).context("Failed to load configuration")?;
    validate_config(&config).context("Invalid configuration")?;

    let _logging = init_logging(&debug_flags, &observability_config(&config))?;
    info!("[PILOT] emupilot {} starting for game '{}'", emupilot::VERSION, config.game.name);

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Capture
    let buffer = Arc::new(FrameRingBuffer::new(Duration::from_secs_f64(config.capture.window_secs)));
    let mut capturer = Capturer::new(buffer.clone(), clock.clone(), config.capture.target_fps);
    capturer.start(Box::new(ImageFileSource::new(config.capture.frame_source_path.clone())));

    // Clip service
    let service = Arc::new(
        ClipService::new(
            buffer,
            clock.clone(),
            ClipEncoder::new(ClipEncoderConfig::from(&config.clip)),
            ClipPolicy::from(&config.clip),
        )
        .with_capture_flag(capturer.running_flag()),
    );
    let server = ClipServer::bind(&config.ipc.address(), service.clone()).await?;
    info!("[PILOT] Clip server listening on {}", server.local_addr());
    let server_task = tokio::spawn(server.run(shutdown_rx.clone()));

    // Emulator link
    let guard = Arc::new(ProtocolGuard::new(config.emulator.violation_log_capacity));
    let link = EmulatorLink::bind(&config.emulator.address(), guard.clone()).await?;
    info!("[PILOT] Waiting for the emulator on {}", link.local_addr());
    let (handle, events, link_task) = link.spawn(shutdown_rx.clone());

    // Decision cycle
    let cycle = DecisionCycle::new(CycleSettings::from_config(&config), TimingGate::from_config(&config.timing));
    let driver = CycleDriver::new(
        cycle,
        DriverConfig::from_config(&config),
        Arc::new(handle),
        Arc::new(LocalClipSource::new(service)),
        build_oracle(&config)?,
        clock,
    )
    .with_knowledge(Arc::new(TracingKnowledgeSink))
    .with_guard(guard.clone());

    let mut status = driver.status_channel().subscribe();
    tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(update) => debug!(
                    "[PILOT] phase={:?} decisions={} fallbacks={} coalesced={}",
                    update.phase, update.decisions, update.fallbacks, update.coalesced_events
                ),
                Err(RecvError::Lagged(skipped)) => debug!("[PILOT] Skipped {} status updates", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
    let driver_task = tokio::spawn(driver.run(events, shutdown_rx));

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("[PILOT] Shutting down");
    let _ = shutdown_tx.send(true);

    match driver_task.await {
        Ok(cycle) => info!(
            "[PILOT] {} decisions, {} fallbacks, {} legacy messages",
            cycle.decisions(),
            cycle.fallbacks(),
            guard.legacy_message_count()
        ),
        Err(e) => error!("[PILOT] Decision cycle task failed: {}", e),
    }
    match server_task.await {
        Ok(Err(e)) => error!("[PILOT] Clip server stopped with error: {}", e),
        Err(e) => error!("[PILOT] Clip server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    if let Err(e) = link_task.await {
        error!("[PILOT] Emulator link task failed: {}", e);
    }
    capturer.stop();
    let stats = capturer.stats();
    info!(
        "[PILOT] Captured {} frames ({} capture errors)",
        stats.frames_captured(),
        stats.capture_errors()
    );

    Ok(())
}
