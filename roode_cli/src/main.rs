mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use eyre::WrapErr;
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

/// Empty-doorway distance for the simulated sensors outside `run --ambient-mm`.
const SIM_AMBIENT_MM: u16 = 1200;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    let mut guard = None;
    let code = match real_main(&cli, &mut guard) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    // Flush the file appender before exiting.
    drop(guard);
    std::process::exit(code);
}

fn real_main(cli: &Cli, guard: &mut Option<WorkerGuard>) -> eyre::Result<()> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = roode_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", cli.config.display()))?;
    cfg.validate()?;
    *guard = init_tracing(cli, &cfg.logging)?;

    match &cli.cmd {
        Commands::Run {
            max_ticks,
            replay,
            ambient_mm,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "could not install Ctrl-C handler");
            }
            let started = std::time::Instant::now();
            let summary =
                run::run_gate(&cfg, *max_ticks, replay.as_deref(), *ambient_mm, &shutdown)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "timestamp": unix_ms(),
                        "event": "summary",
                        "ticks": summary.ticks,
                        "crossings": summary.crossings,
                        "wakeups": summary.wakeups,
                        "suspended_ticks": summary.suspended_ticks,
                        "count": summary.count,
                        "power_state": format!("{:?}", summary.power_state),
                        "stopped": format!("{:?}", summary.stopped),
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })
                );
            } else {
                println!(
                    "run finished: ticks={} crossings={} count={} power={:?} stopped={:?}",
                    summary.ticks,
                    summary.crossings,
                    summary.count,
                    summary.power_state,
                    summary.stopped
                );
            }
        }
        Commands::Calibrate { samples } => match samples {
            Some(path) => calibrate_offline(cli, &cfg, path)?,
            None => {
                for (role, r) in run::calibrate_live(&cfg, SIM_AMBIENT_MM)? {
                    if cli.json {
                        println!(
                            "{}",
                            json!({
                                "timestamp": unix_ms(),
                                "role": role.to_string(),
                                "threshold_mm": r.threshold_mm,
                                "mean_mm": r.mean_mm,
                                "valid": r.valid,
                                "taken": r.taken,
                            })
                        );
                    } else {
                        println!(
                            "{role}: threshold {} mm (mean {:.1} mm, {}/{} samples)",
                            r.threshold_mm, r.mean_mm, r.valid, r.taken
                        );
                    }
                }
            }
        },
        Commands::SelfCheck => {
            for (role, reading) in run::self_check(&cfg, SIM_AMBIENT_MM)? {
                if cli.json {
                    println!(
                        "{}",
                        json!({ "timestamp": unix_ms(), "role": role.to_string(), "distance_mm": reading })
                    );
                } else {
                    match reading {
                        Some(mm) => println!("{role}: ok ({mm} mm)"),
                        None => println!("{role}: initialized, no reading"),
                    }
                }
            }
        }
    }
    Ok(())
}

fn calibrate_offline(cli: &Cli, cfg: &roode_config::Config, path: &Path) -> eyre::Result<()> {
    let r = run::calibrate_offline(cfg, path)
        .wrap_err_with(|| format!("offline calibration from {}", path.display()))?;
    if cli.json {
        println!(
            "{}",
            json!({
                "timestamp": unix_ms(),
                "threshold_mm": r.threshold_mm,
                "mean_mm": r.mean_mm,
                "margin_mm": r.margin_mm,
                "valid": r.valid,
                "taken": r.taken,
            })
        );
    } else {
        println!(
            "threshold {} mm (mean {:.1} mm, margin {:.1} mm, {}/{} samples)",
            r.threshold_mm, r.mean_mm, r.margin_mm, r.valid, r.taken
        );
    }
    Ok(())
}

/// Console logs go to stderr (stdout carries transmitter output); `[logging].file`
/// adds a JSON-lines file layer with its own level and rotation.
fn init_tracing(
    cli: &Cli,
    logging: &roode_config::Logging,
) -> eyre::Result<Option<WorkerGuard>> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let mut guard = None;
    let file = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            let level = logging.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(level))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))?;
    Ok(guard)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
