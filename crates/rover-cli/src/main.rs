//! `rover-cli` – RoverOS command line entry point.
//!
//! This binary wires the decision core to a simulated rover so the whole
//! stack can run headless.  It:
//!
//! 1. Loads `~/.rover/config.toml` (defaults when absent) and applies
//!    `ROVER_*` environment overrides.  `--init-config` writes the default
//!    file and exits.
//! 2. Starts the control loop, the emotion loop, the simulated motor
//!    controller and the simulated perception collaborators.
//! 3. Prints every command change and every behavior/emotion transition.
//! 4. Intercepts **Ctrl-C** (or `--duration` expiry): the control loop sends a
//!    final STOP before the process exits.

mod config;
mod sim;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rover_middleware::{ChannelSink, EventBus, LatestSlot, RoverState, Topic};
use rover_runtime::{ControlLoop, EmotionLoop, init_tracing};
use rover_types::{EventPayload, RoverError};
use tokio::sync::watch;
use tracing::{error, warn};

use crate::config::Config;
use crate::sim::SimWorld;

/// Detector frame period in the simulation.
const DETECTION_PERIOD: Duration = Duration::from_millis(100);

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    help: bool,
    init_config: bool,
    force: bool,
    duration: Option<Duration>,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = CliOptions::default();
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-h" | "--help" => opts.help = true,
                "--init-config" => opts.init_config = true,
                "--force" => opts.force = true,
                "--duration" => {
                    let value = it.next().ok_or("--duration needs a value in seconds")?;
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| format!("invalid --duration value: {value}"))?;
                    opts.duration = Some(Duration::from_secs(secs));
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(opts)
    }
}

fn print_usage() {
    println!("Usage: rover [--duration <secs>] | --init-config [--force] | --help");
    println!();
    println!("  --duration <secs>   stop after this many seconds (default: until Ctrl-C)");
    println!("  --init-config       write a default {}", config::config_path().display());
    println!("  --force             overwrite an existing config with --init-config");
}

// ─────────────────────────────────────────────────────────────────────────────
// main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match CliOptions::parse(&args) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{}: {msg}", "error".red().bold());
            print_usage();
            return ExitCode::from(2);
        }
    };
    if opts.help {
        print_usage();
        return ExitCode::SUCCESS;
    }
    if opts.init_config {
        return init_config(opts.force);
    }

    // Tracing before the Tokio runtime: the OTLP exporter is synchronous.
    let _guard = init_tracing("rover");
    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  Control tick {} ms · emotion tick {} ms · max speed {} · seed {}\n",
        cfg.runtime.tick_ms,
        cfg.runtime.emotion_tick_ms,
        cfg.runtime.fusion.safety.max_speed,
        cfg.sim.seed
    );

    // ── Shutdown signal ───────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let shutdown_ctrlc = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        shutdown_ctrlc.send_replace(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the rover will only stop on --duration");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, opts.duration, shutdown_tx, shutdown_rx)) {
        Ok(()) => {
            println!("{}", "  ✓ Rover stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Rover error".red());
            ExitCode::FAILURE
        }
    }
}

fn init_config(force: bool) -> ExitCode {
    let path = config::config_path();
    if path.exists() && !force {
        println!(
            "  {} already exists; pass --force to overwrite.",
            path.display().to_string().bold()
        );
        return ExitCode::FAILURE;
    }
    match config::save(&Config::default()) {
        Ok(path) => {
            println!(
                "  {} Config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Error saving config".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

async fn run(
    cfg: Config,
    duration: Option<Duration>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), RoverError> {
    let state = RoverState::new();
    state.set_battery(cfg.sim.start_battery);
    let bus = EventBus::default();
    let detections = LatestSlot::new();
    let suggestions = LatestSlot::new();
    let (sink, frames) = ChannelSink::new(64);

    let monitor = tokio::spawn(print_transitions(bus.clone(), shutdown_rx.clone()));
    let transport = tokio::spawn(sim::run_transport(
        SimWorld::new(&cfg.sim),
        state.clone(),
        bus.clone(),
        frames,
        Duration::from_millis(cfg.sim.telemetry_ms.max(1)),
    ));
    let perception = tokio::spawn(sim::run_perception(
        cfg.sim.seed,
        state.clone(),
        detections.clone(),
        suggestions.clone(),
        DETECTION_PERIOD,
        Duration::from_millis(cfg.sim.suggestion_every_ms.max(1)),
        shutdown_rx.clone(),
    ));
    let emotions = tokio::spawn(
        EmotionLoop::new(&cfg.runtime, state.clone(), detections.clone(), bus.clone())
            .run(shutdown_rx.clone()),
    );

    if let Some(limit) = duration {
        let tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tx.send_replace(true);
        });
    }

    let control = ControlLoop::new(
        &cfg.runtime,
        state.clone(),
        detections,
        suggestions,
        Arc::new(sink),
        bus,
    );
    let result = control.run(shutdown_rx).await;

    // The control loop may have ended on a transport error; stop the rest.
    shutdown_tx.send_replace(true);
    for (name, handle) in [("emotion", emotions), ("perception", perception), ("monitor", monitor)]
    {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "task ended abnormally");
        }
    }
    if let Err(e) = transport.await {
        warn!(error = %e, "transport task ended abnormally");
    }

    println!(
        "\n  Final state: behavior {} · emotion {} · battery {:.1}%",
        state.behavior().to_string().bold(),
        state.emotion().to_string().bold(),
        state.battery()
    );
    result
}

/// Print behavior, emotion and safety events until shutdown.
async fn print_transitions(bus: EventBus, mut shutdown: watch::Receiver<bool>) {
    let mut behavior = bus.subscribe_to(Topic::Behavior);
    let mut emotion = bus.subscribe_to(Topic::Emotion);
    let mut safety = bus.subscribe_to(Topic::Safety);

    loop {
        let event = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            e = behavior.recv() => e,
            e = emotion.recv() => e,
            e = safety.recv() => e,
        };
        let Some(event) = event else { break };
        let at = event.timestamp.format("%H:%M:%S%.3f");
        match event.payload {
            EventPayload::BehaviorChanged { from, to } => {
                println!("  {at} {} {from} → {}", "behavior".blue().bold(), to.to_string().bold());
            }
            EventPayload::EmotionChanged { from, to } => {
                println!("  {at} {} {from} → {}", "emotion ".magenta().bold(), to.to_string().bold());
            }
            EventPayload::CommandRejected { command, reason } => {
                println!("  {at} {} {command}: {}", "vetoed  ".yellow().bold(), reason.as_str().dimmed());
            }
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                      ___  ____ "#.bold().cyan());
    println!("{}", r#"  | _ \_____ _____ _ _     / _ \/ ___|"#.bold().cyan());
    println!("{}", r#"  |   / _ \ V / -_) '_|   | (_) \___ \"#.bold().cyan());
    println!("{}", r#"  |_|_\___/\_/\___|_|      \___/|____/"#.bold().cyan());
    println!();
    println!(
        "  {} v{}  ·  simulated rover  ·  Ctrl-C to stop",
        "RoverOS".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_runs_until_interrupted() {
        assert_eq!(CliOptions::parse(&[]), Ok(CliOptions::default()));
    }

    #[test]
    fn parses_flags_and_duration() {
        let opts = CliOptions::parse(&args(&["--duration", "30", "--init-config", "--force"]))
            .expect("valid args");
        assert_eq!(opts.duration, Some(Duration::from_secs(30)));
        assert!(opts.init_config && opts.force && !opts.help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(CliOptions::parse(&args(&["--duration"])).is_err());
        assert!(CliOptions::parse(&args(&["--duration", "soon"])).is_err());
        assert!(CliOptions::parse(&args(&["--fly"])).is_err());
    }
}
