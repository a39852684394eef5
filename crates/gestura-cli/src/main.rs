//! `gestura-cli` – Gestura Command Line Interface
//!
//! This binary is the ignition switch for the Gestura stack.  It:
//!
//! 1. Loads `~/.gestura/config.toml` (bootstrapping it with defaults when
//!    absent) or the file passed with `--config`, then applies `GESTURA_*`
//!    environment overrides.
//! 2. Wires the action adapter (`--dry-run` records actions instead of
//!    running them), the signal producers (`--replay` feeds a recorded
//!    session) and the face recognizer into an [`Orchestrator`].
//! 3. Maps **Ctrl-C** / SIGTERM and the `--duration` timer onto the same
//!    graceful stop request.
//!
//! Exit codes: `0` normal shutdown, `2` configuration error, `3`
//! authentication failure, `1` anything else.

mod config;

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use gestura_hal::{ActionAdapter, DryRunAdapter, ProgramAdapter};
use gestura_kernel::ProgramRecognizer;
use gestura_perception::{
    ChannelGestureSource, ChannelSource, ChannelVoiceSource, GestureInterpreter, ReplayScript,
};
use gestura_runtime::{Components, Orchestrator, init_tracing};
use gestura_types::config::RuntimeConfig;
use gestura_types::{EventKind, GesturaError, Gesture, OrchestratorState, VoicePhrase};

#[derive(Parser, Debug)]
#[command(name = "gestura")]
#[command(about = "Gesture and voice control for the desktop, behind an allow-list", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.gestura/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record actions instead of performing them
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Feed signals from a recorded JSON-lines session
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn exit_status(err: &GesturaError) -> u8 {
    match err {
        GesturaError::Config(_) => 2,
        GesturaError::AuthenticationFailed { .. } => 3,
        _ => 1,
    }
}

fn exit_code(err: &GesturaError) -> ExitCode {
    ExitCode::from(exit_status(err))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (cfg, origin) = match config::resolve(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return exit_code(&e);
        }
    };

    if cli.print_config {
        return match config::render(&cfg) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Config error".red(), e);
                exit_code(&e)
            }
        };
    }

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG wins over logging.level; GESTURA_LOG_FORMAT=json switches to
    // newline-delimited JSON; logging.path adds a rolling log file.
    // User-facing output stays on println!.
    let _telemetry = init_tracing("gestura", &cfg.logging);

    print_banner();
    match &origin {
        config::ConfigOrigin::File(path) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
        }
        config::ConfigOrigin::Bootstrapped(path) => {
            println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
        }
    }

    let grace = cfg.workers.join_timeout();
    match block_on_with_grace(run(cli, cfg), grace) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: failed to start async runtime: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

/// Drive `future` on a fresh multi-thread runtime.  Blocking tasks still
/// running afterwards (an action program that ignores its timeout, say) get
/// at most `grace` before the runtime is abandoned, so they cannot hold
/// process exit.
fn block_on_with_grace<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

async fn run(cli: Cli, cfg: RuntimeConfig) -> ExitCode {
    let dry_run = cli.dry_run || config::env_flag("GESTURA_DRY_RUN");
    let adapter: Box<dyn ActionAdapter> = if dry_run {
        println!("  Mode: {}", "dry-run (no OS actions)".yellow());
        Box::new(DryRunAdapter::new())
    } else {
        Box::new(ProgramAdapter::new(cfg.actions.clone()))
    };
    let mut components = Components::new(adapter);

    // ── Signal producers ──────────────────────────────────────────────────
    let mut replay = None;
    if let Some(path) = &cli.replay {
        let script = match ReplayScript::load(path) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("{}: {}", "Replay error".red(), e);
                return ExitCode::from(2);
            }
        };
        println!("  Replaying {} signal(s) from {}", script.len(), path.display());
        let capacity = cfg.workers.queue_capacity;
        let (gestures, gesture_source) = ChannelGestureSource::channel("replay-gesture", capacity);
        let (voice, voice_source) = ChannelVoiceSource::channel("replay-voice", capacity);
        components = components
            .with_gesture(Box::new(gesture_source))
            .with_voice(Box::new(voice_source));
        replay = Some((script, gestures, voice));
    } else {
        let reason = "no live recognition backend in this build; use --replay";
        components = components
            .with_gesture(Box::new(ChannelSource::<Gesture>::unavailable("gesture", reason)))
            .with_voice(Box::new(ChannelSource::<VoicePhrase>::unavailable("voice", reason)));
    }

    if let Some(recognizer) = ProgramRecognizer::from_config(&cfg.auth) {
        components = components.with_recognizer(Arc::new(recognizer));
    }

    let grace = cfg.workers.join_timeout();
    let interpreter = GestureInterpreter::new(cfg.gesture.clone());
    let mut orchestrator = match Orchestrator::new(cfg, components) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}: {}", "Startup error".red(), e);
            return exit_code(&e);
        }
    };

    // ── Ctrl-C / SIGTERM ──────────────────────────────────────────────────
    let stop = orchestrator.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if stop.request_stop() {
            println!();
            println!("{}", "⚠  Stop requested – shutting down gracefully …".yellow().bold());
        }
    }) {
        warn!(error = %e, "failed to install signal handler; Ctrl-C will not stop gracefully");
    }

    // ── Duration timer ────────────────────────────────────────────────────
    if let Some(secs) = cli.duration {
        let stop = orchestrator.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(secs, "run duration elapsed");
            stop.request_stop();
        });
    }

    if let Err(e) = orchestrator.start().await {
        eprintln!("{}: {}", "Startup failed".red(), e);
        return exit_code(&e);
    }
    if orchestrator.state() == OrchestratorState::Running {
        println!("  {} Gestura running. Press Ctrl-C to stop.\n", "●".green().bold());
    } else {
        // Stopped during startup; start() has already shut down.
        replay = None;
    }

    if let Some((script, gestures, voice)) = replay {
        let feeder = script.spawn(gestures, voice, interpreter);
        if cli.duration.is_none() {
            // Without a duration a replay run ends with its script.
            let stop = orchestrator.stop_handle();
            tokio::spawn(async move {
                if let Err(e) = feeder.await {
                    warn!(error = %e, "replay task ended abnormally");
                }
                tokio::time::sleep(grace).await;
                stop.request_stop();
            });
        }
    }

    orchestrator.wait_for_stop().await;
    let report = orchestrator.shutdown().await;

    let snap = &report.final_snapshot;
    println!(
        "  {} Stopped. executed {}, denied {}, failed {}",
        "✓".green().bold(),
        snap.get(EventKind::CommandExecuted),
        snap.get(EventKind::CommandDenied),
        snap.get(EventKind::CommandFailed)
    );
    if !report.timed_out_workers.is_empty() {
        println!(
            "  {} workers missed the join timeout: {}",
            "⚠".yellow().bold(),
            report.timed_out_workers.join(", ")
        );
    }
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ______          __                 "#.bold().cyan());
    println!("{}", r#"  / ____/__  _____/ /___  ___________ _"#.bold().cyan());
    println!("{}", r#" / / __/ _ \/ ___/ __/ / / / ___/ __ `/"#.bold().cyan());
    println!("{}", r#"/ /_/ /  __(__  ) /_/ /_/ / /  / /_/ / "#.bold().cyan());
    println!("{}", r#"\____/\___/____/\__/\__,_/_/   \__,_/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Gestura".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Gesture & voice desktop control");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(exit_status(&GesturaError::Config("x".into())), 2);
        assert_eq!(exit_status(&GesturaError::AuthenticationFailed { attempts: 2 }), 3);
        assert_eq!(exit_status(&GesturaError::Serialization("x".into())), 1);
    }

    #[test]
    fn cli_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "gestura",
            "--config",
            "/tmp/g.toml",
            "--dry-run",
            "--duration",
            "30",
            "--replay",
            "session.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/g.toml")));
        assert!(cli.dry_run);
        assert_eq!(cli.duration, Some(30));
        assert_eq!(cli.replay, Some(PathBuf::from("session.jsonl")));
        assert!(!cli.print_config);
    }

    #[test]
    fn lingering_blocking_task_does_not_hold_exit() {
        let started = std::time::Instant::now();
        let value = block_on_with_grace(
            async {
                tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(20)));
                7
            },
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn duration_must_be_a_number() {
        assert!(Cli::try_parse_from(["gestura", "--duration", "soon"]).is_err());
    }
}
