//! Coordinator entry point — CLI wiring and config-driven engine construction.

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flexfleet::clients::{HttpDecisionApi, HttpTelemetrySink};
use flexfleet::config::FleetConfig;
use flexfleet::sim::{Coordinator, Scheduler, Simulator};
use flexfleet::store::MemoryStore;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    once: bool,
    interval_override_s: Option<f64>,
}

fn print_help() {
    eprintln!("flexfleet — periodic device simulation and scheduling coordinator");
    eprintln!();
    eprintln!("Usage: flexfleet [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>     Load fleet configuration from TOML file");
    eprintln!("  --preset <name>     Use a built-in preset (demo, single_ev)");
    eprintln!("  --once              Run a single trigger firing and exit");
    eprintln!("  --interval <secs>   Override the trigger interval");
    eprintln!("  --help              Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the demo preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        once: false,
        interval_override_s: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = Some(args[i].clone());
            }
            "--preset" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --preset requires a name argument");
                    process::exit(1);
                }
                cli.preset = Some(args[i].clone());
            }
            "--once" => {
                cli.once = true;
            }
            "--interval" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --interval requires a seconds argument");
                    process::exit(1);
                }
                match args[i].parse::<f64>() {
                    Ok(s) if s > 0.0 => cli.interval_override_s = Some(s),
                    _ => {
                        eprintln!(
                            "error: --interval value \"{}\" is not a positive number",
                            args[i]
                        );
                        process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> FleetConfig {
    let mut config = if let Some(ref path) = cli.config_path {
        match FleetConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match FleetConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        FleetConfig::demo()
    };

    if let Some(interval_s) = cli.interval_override_s {
        config.coordinator.interval_s = interval_s;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    config
}

fn build_coordinator(config: &FleetConfig) -> Coordinator {
    let decision_api = match HttpDecisionApi::new(
        &config.decision_api.base_url,
        Duration::from_secs_f64(config.decision_api.timeout_s),
    ) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            eprintln!("error: failed to build decision api client: {e}");
            process::exit(1);
        }
    };
    let sink = match HttpTelemetrySink::new(
        &config.telemetry.base_url,
        Duration::from_secs_f64(config.telemetry.timeout_s),
    ) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            eprintln!("error: failed to build telemetry client: {e}");
            process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let fleet = Arc::new(config.static_fleet());

    let simulator = Simulator::new(
        store.clone(),
        sink,
        fleet.clone(),
        config.model_params(),
        config.coordinator.interval_s,
    );
    let scheduler = Scheduler::new(store, decision_api, fleet.clone(), config.scheduler_policy());

    Coordinator::new(simulator, scheduler, fleet, config.run_budget())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = parse_args();
    let config = load_config(&cli);
    let coordinator = build_coordinator(&config);

    if cli.once {
        match coordinator.on_trigger().await {
            Ok(report) => println!("{report}"),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let interval = Duration::from_secs_f64(config.coordinator.interval_s);
    info!(interval_s = config.coordinator.interval_s, "starting trigger loop");

    let mut ticker = tokio::time::interval(interval);
    // A slow pass must not cause a burst of queued firings afterwards.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let coordinator = coordinator.clone();
        // Each firing runs detached so a slow pass overlaps the next one
        // instead of delaying it; the store's conditional writes keep
        // overlapping passes safe.
        tokio::spawn(async move {
            match coordinator.on_trigger().await {
                Ok(report) => info!(%report, "trigger pass complete"),
                Err(e) => error!(error = %e, "trigger pass failed"),
            }
        });
    }
}
