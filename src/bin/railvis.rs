//! railvis - operator CLI for Railway Vision
//!
//! Subcommands:
//! - `analyze`: run one image through detection, signal and hazard checks, captioning
//! - `logs`: show the analysis log with a hazard chart and map points
//! - `export`: write the log as CSV
//! - `serve`: run the HTTP API until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::mpsc;

use railway_vision::api::ApiServer;
use railway_vision::config::AppConfig;
use railway_vision::image_io::load_image;
use railway_vision::report::{
    hazard_distribution, map_points, render_bar_chart, render_table, write_csv, CSV_FILE_NAME,
};
use railway_vision::{analyze_and_save, AnalyzeRequest, Analyzer, DetectionMode, LogStore, SqliteLogStore};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "railvis", version, about = "Railway scene hazard analysis")]
struct Args {
    /// Path to the SQLite analysis log (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<String>,
    /// How stage progress is drawn on stderr
    #[arg(long, global = true, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one image and append the result to the log
    Analyze {
        /// Image file (jpg, jpeg or png)
        image: PathBuf,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lon: f64,
        /// Detection mode (local | open-vocab); defaults to the configured mode
        #[arg(long)]
        mode: Option<DetectionMode>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the analysis log
    Logs {
        #[arg(long, value_enum, default_value_t = LogFormat::Table)]
        format: LogFormat,
    },
    /// Export the analysis log as CSV
    Export {
        #[arg(long, default_value = CSV_FILE_NAME)]
        output: PathBuf,
    },
    /// Serve the HTTP API until Ctrl-C
    Serve {
        /// Listen address (overrides config)
        #[arg(long, env = "RAILVIS_API_ADDR")]
        addr: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::detect(args.ui);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        AppConfig::load()?
    };
    if let Some(db) = args.db {
        cfg.db_path = db;
    }

    match args.command {
        Command::Analyze {
            image,
            lat,
            lon,
            mode,
            json,
        } => run_analyze(&ui, &cfg, image, lat, lon, mode, json),
        Command::Logs { format } => run_logs(&ui, &cfg, format),
        Command::Export { output } => run_export(&ui, &cfg, output),
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                cfg.api_addr = addr;
            }
            run_serve(&cfg)
        }
    }
}

fn run_analyze(
    ui: &ui::Ui,
    cfg: &AppConfig,
    image_path: PathBuf,
    lat: f64,
    lon: f64,
    mode: Option<DetectionMode>,
    json: bool,
) -> Result<()> {
    let image_name = image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a file path", image_path.display()))?;
    let image = {
        let _stage = ui.stage("Load image");
        load_image(&image_path)?
    };
    let (mut analyzer, mut store) = {
        let _stage = ui.stage("Prepare detectors and log");
        let analyzer = Analyzer::from_config(cfg)?;
        let store = SqliteLogStore::open(&cfg.db_path)?;
        (analyzer, store)
    };
    let mode = mode.unwrap_or(cfg.default_mode);
    let request = AnalyzeRequest {
        latitude: lat,
        longitude: lon,
        ..AnalyzeRequest::new(image_name, mode)
    };
    let outcome = {
        let _stage = ui.stage(&format!("Analyze ({})", mode.display_name()));
        analyze_and_save(&mut analyzer, &mut store, &image, &request)?
    };
    store.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        let result = &outcome.result;
        println!("{}", result.summary);
        println!("Signal:    {}", result.signal_color);
        println!("Hazard:    {}", result.hazard_level);
        println!("Direction: {}", result.direction);
        println!("Saved as log #{}", outcome.entry.id);
    }
    ui.hazard_alert(outcome.result.hazard_level, &outcome.entry.image_name);
    Ok(())
}

fn run_logs(ui: &ui::Ui, cfg: &AppConfig, format: LogFormat) -> Result<()> {
    let entries = {
        let _stage = ui.stage("Read analysis log");
        let mut store = SqliteLogStore::open(&cfg.db_path)?;
        store.list_all()?
    };
    match format {
        LogFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        LogFormat::Table => {
            if entries.is_empty() {
                println!("No logs yet.");
                return Ok(());
            }
            print!("{}", render_table(&entries));
            println!();
            println!("Hazard distribution");
            print!("{}", render_bar_chart(&hazard_distribution(&entries)));
            let points = map_points(&entries);
            if !points.is_empty() {
                println!();
                println!("Map points");
                for point in points {
                    println!(
                        "#{:<5} {:>10.5} {:>11.5}  {:<6} {}",
                        point.id,
                        point.latitude,
                        point.longitude,
                        point.hazard_level.as_str(),
                        point.image_name
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_export(ui: &ui::Ui, cfg: &AppConfig, output: PathBuf) -> Result<()> {
    let entries = {
        let _stage = ui.stage("Read analysis log");
        let mut store = SqliteLogStore::open(&cfg.db_path)?;
        store.list_all()?
    };
    {
        let _stage = ui.stage("Write CSV");
        let file = File::create(&output)
            .with_context(|| format!("failed to create {}", output.display()))?;
        write_csv(&entries, BufWriter::new(file))?;
    }
    println!("Exported {} rows to {}", entries.len(), output.display());
    Ok(())
}

fn run_serve(cfg: &AppConfig) -> Result<()> {
    let handle = ApiServer::from_config(cfg)?.spawn()?;
    log::info!("railway api listening on {}", handle.addr);
    log::info!("railvis serving {}", cfg.db_path);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("railvis waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    handle.stop()
}
