#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod drive;
mod error_fmt;
mod rt;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(path: &Path) -> eyre::Result<rcdrive_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = rcdrive_config::load_toml(&text)?;
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &rcdrive_config::Logging) -> eyre::Result<()> {
    // RUST_LOG wins; otherwise --log-level, then [logging] level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .or_else(|_| EnvFilter::try_new(logging.level.as_deref().unwrap_or("info")))
        .wrap_err("invalid log level")?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    });

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            "never" => tracing_appender::rolling::never(dir, name),
            other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .wrap_err("install tracing subscriber")
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    let model = cli
        .motor_model
        .as_deref()
        .map(rcdrive_config::load_motor_model_csv)
        .transpose()?;
    if let Some(m) = &model {
        tracing::info!(a = m.a, b = m.b, "motor model loaded from CSV");
    }

    match cli.cmd {
        Commands::Drive(args) => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let report = drive::run_drive(&cfg, model.as_ref(), &args, shutdown.clone())?;
            if args.stats {
                drive::print_stats(&report);
            }
            if cli.json {
                println!("{}", drive::report_json(&report, args.speed));
            } else {
                let s = &report.summary;
                let travelled = report
                    .travelled_mm
                    .map_or_else(String::new, |mm| format!(", travelled {mm:.0} mm"));
                println!(
                    "drive complete: {} ticks in {} ms, final {:.1} rps, peak {:.1} rps, stall trips {}{}",
                    s.ticks,
                    s.elapsed_ms,
                    s.final_measured_rps,
                    s.peak_measured_rps,
                    s.stall_trips,
                    travelled
                );
                if shutdown.load(Ordering::Relaxed) {
                    println!("stopped by Ctrl-C");
                }
            }
        }
        Commands::Aeb { distance_mm, gear } => {
            let gear = gear.map_or(cfg.gearbox.initial, rcdrive_config::Gear::from);
            let r = drive::aeb_ceiling(&cfg, distance_mm, gear);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "distance_mm": r.distance_mm,
                        "gear": drive::gear_name(r.gear),
                        "ceiling_rps": r.ceiling_rps,
                        "ceiling_mmps": r.ceiling_mmps,
                        "stopping_distance_mm": r.stopping_distance_mm,
                    })
                );
            } else {
                println!(
                    "AEB ceiling at {} mm ({} gear): {:.1} rps ({:.0} mm/s), braking distance {:.0} mm",
                    r.distance_mm,
                    drive::gear_name(r.gear),
                    r.ceiling_rps,
                    r.ceiling_mmps,
                    r.stopping_distance_mm
                );
            }
        }
        Commands::SelfCheck => {
            let ticks = drive::self_check(&cfg, model.as_ref())?;
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true, "ticks": ticks }));
            } else {
                println!("self-check ok ({ticks} ticks at zero speed)");
            }
        }
    }
    Ok(())
}
