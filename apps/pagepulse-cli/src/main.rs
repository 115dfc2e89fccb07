mod ui;

use std::{env, path::PathBuf, sync::mpsc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use pagepulse_ops::{init_tracing, persist_summary, MetricStore};
use pagepulse_orchestrator::{MonitorRunner, PerformanceMonitor};
use pagepulse_page::{scenario::Scenario, SimulatedPage, SimulatedPageConfig};
use pagepulse_report::{JsonLogSink, LocalBus, ReportSink};
use pagepulse_types::config::PulseConfig;
use tracing::info;

use crate::ui::UiMessage;

/// Replays a page scenario and estimates its load metrics.
#[derive(Debug, Parser)]
#[command(name = "pagepulse", version)]
struct Args {
    /// Configuration file; falls back to $PAGEPULSE_CONFIG, then configs/dev.toml.
    #[arg(long)]
    config: Option<String>,
    /// Scenario timeline to replay.
    #[arg(long, default_value = "scenarios/news-article.toml")]
    scenario: PathBuf,
    /// Show the terminal dashboard instead of printing JSON.
    #[arg(long)]
    tui: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_path) = load_config(args.config);
    if !args.tui {
        init_tracing(&config.ops)?;
    }

    let scenario = Scenario::from_file(&args.scenario)?;
    let page = SimulatedPage::new(SimulatedPageConfig {
        viewport: scenario.viewport.unwrap_or_default(),
        ..SimulatedPageConfig::default()
    });
    let bus = LocalBus::new(256);
    let mut monitor = PerformanceMonitor::new(
        page.session(config.clone()),
        JsonLogSink::new(bus.clone()),
        MetricStore::new(),
    );
    let report_dir = monitor.boot().await?;

    let dashboard = if args.tui {
        let (tx, rx) = mpsc::channel();
        let mut events = bus.subscribe();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(UiMessage::Event(event)).is_err() {
                    break;
                }
            }
        });
        let title = format!("{} ({config_path})", scenario.name);
        let ui = tokio::task::spawn_blocking(move || ui::run(rx, title));
        Some((forwarder, ui))
    } else {
        None
    };

    let drive = async {
        let played = page.play(&scenario).await;
        // Nothing else happens on the page once the timeline ends.
        page.hide();
        played
    };
    let (summary, played) = tokio::join!(monitor.run(), drive);
    played?;
    monitor.wait_detached().await;
    drop(monitor);
    drop(bus);

    let persisted = match &summary {
        Ok(summary) => Some(persist_summary(&report_dir, summary)?),
        Err(err) => {
            eprintln!("No summary for '{}': {err}", scenario.name);
            None
        }
    };

    if let Some((forwarder, ui)) = dashboard {
        forwarder.await?;
        ui.await??;
    } else if let Ok(summary) = &summary {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    if let Some(path) = persisted {
        info!("summary saved to {}", path.display());
    }

    summary?;
    Ok(())
}

fn load_config(from_args: Option<String>) -> (PulseConfig, String) {
    let from_env = env::var("PAGEPULSE_CONFIG").ok();
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| "configs/dev.toml".into());
    let config = match PulseConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                PulseConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            PulseConfig::default()
        }
    };
    (config, path)
}
