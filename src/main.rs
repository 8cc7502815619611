//! gridcast entry point: CLI wiring, data loading, and one-shot selections.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use gridcast::config::AppConfig;
use gridcast::forecast::ForecastStore;
use gridcast::gateway::PredictionGateway;
use gridcast::geo::GeoCatalog;
use gridcast::selection::{SelectionCoordinator, SelectionSnapshot, SelectionState};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<PathBuf>,
    region: Option<String>,
    date: Option<String>,
    capacity_kw: Option<f64>,
    list_states: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    bind: Option<String>,
}

fn print_help() {
    eprintln!("gridcast — region load forecasts, predictions, and solar estimates");
    eprintln!();
    eprintln!("Usage: gridcast [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from TOML file");
    eprintln!("  --region <id>            Request a prediction for this region");
    eprintln!("  --date <YYYY-MM-DD>      Day to predict (required with --region)");
    eprintln!("  --capacity <kW>          Panel capacity for the solar estimate (1-8)");
    eprintln!("  --states                 List known states and exit");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start the REST API server");
        eprintln!("  --bind <addr>            API bind address (default from config)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Without --region, prints a summary of the loaded catalog and dataset.");
}

fn value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        region: None,
        date: None,
        capacity_kw: None,
        list_states: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        bind: None,
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
                let path = value(&args, i, "--config", "a path argument");
                cli.config_path = Some(PathBuf::from(path));
            }
            "--region" => {
                i += 1;
                cli.region = Some(value(&args, i, "--region", "a region id"));
            }
            "--date" => {
                i += 1;
                cli.date = Some(value(&args, i, "--date", "a YYYY-MM-DD argument"));
            }
            "--capacity" => {
                i += 1;
                let raw = value(&args, i, "--capacity", "a kW argument");
                if let Ok(kw) = raw.parse::<f64>() {
                    cli.capacity_kw = Some(kw);
                } else {
                    eprintln!("error: --capacity value \"{raw}\" is not a number");
                    process::exit(1);
                }
            }
            "--states" => {
                cli.list_states = true;
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--bind" => {
                i += 1;
                cli.bind = Some(value(&args, i, "--bind", "a socket address"));
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

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the catalog and dataset named by the config, exiting on failure.
fn load_data(cfg: &AppConfig) -> (GeoCatalog, ForecastStore) {
    let d = &cfg.data;
    let catalog = GeoCatalog::load_from_paths(&d.boundaries, &d.cities).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    let forecasts = ForecastStore::load_from_path(&d.forecasts).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    (catalog, forecasts)
}

fn print_summary(catalog: &GeoCatalog, forecasts: &ForecastStore) {
    println!("Regions:          {}", catalog.regions().len());
    println!("States:           {}", catalog.states().len());
    println!("State outlines:   {}", catalog.boundaries().len());
    println!("Skipped entries:  {}", catalog.skipped().len());
    println!("Forecast rows:    {}", forecasts.len());
    println!("Dropped rows:     {}", forecasts.dropped_rows());
    let regions = forecasts.regions();
    if !regions.is_empty() {
        println!("Dataset regions:  {}", regions.join(", "));
    }
}

fn print_snapshot(snapshot: &SelectionSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: cannot encode snapshot: {e}"),
    }
}

/// Runs one selection to completion, printing every published snapshot.
async fn run_selection(
    gateway: PredictionGateway,
    catalog: GeoCatalog,
    forecasts: ForecastStore,
    capacity_kw: f64,
    region: &str,
    date: &str,
) -> bool {
    let mut coordinator = SelectionCoordinator::new(
        Arc::new(gateway),
        Arc::new(catalog),
        Arc::new(forecasts),
        capacity_kw,
    );
    coordinator.subscribe(print_snapshot);
    coordinator.select(region, date);
    while coordinator.settle_next().await.is_some() {}
    coordinator.state() == SelectionState::SettledOk
}

fn main() {
    let cli = parse_args();
    init_tracing();

    let mut cfg = match cli.config_path {
        Some(ref path) => AppConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        }),
        None => AppConfig::default(),
    };

    // Apply overrides
    if let Some(kw) = cli.capacity_kw {
        cfg.renewable.capacity_kw = kw;
    }
    #[cfg(feature = "api")]
    if let Some(ref bind) = cli.bind {
        cfg.api.bind.clone_from(bind);
    }

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let (catalog, forecasts) = load_data(&cfg);

    if cli.list_states {
        for state in catalog.states() {
            println!("{state}");
        }
        return;
    }

    let gateway = PredictionGateway::new(&cfg.gateway).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });

    #[cfg(feature = "api")]
    if cli.serve {
        let addr: std::net::SocketAddr = match cfg.api.bind.parse() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("error: invalid bind address: {e}");
                process::exit(1);
            }
        };
        let capacity_kw = cfg.renewable.capacity_kw;
        let result = rt.block_on(async move {
            let coordinator = SelectionCoordinator::new(
                Arc::new(gateway),
                Arc::new(catalog),
                Arc::new(forecasts),
                capacity_kw,
            );
            let state = gridcast::api::AppState::start(coordinator);
            gridcast::api::serve(state, addr).await
        });
        if let Err(e) = result {
            eprintln!("error: server failed: {e}");
            process::exit(1);
        }
        return;
    }

    let Some(region) = cli.region else {
        print_summary(&catalog, &forecasts);
        return;
    };
    let Some(date) = cli.date else {
        eprintln!("error: --region requires --date");
        process::exit(1);
    };

    let ok = rt.block_on(run_selection(
        gateway,
        catalog,
        forecasts,
        cfg.renewable.capacity_kw,
        &region,
        &date,
    ));
    if !ok {
        process::exit(2);
    }
}
