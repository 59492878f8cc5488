use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use tokio::runtime::Builder;

use link_state_emulator::network::{load_topology, locate_local};
use link_state_emulator::{EmulatorConfig, Router};

#[derive(Parser)]
#[command(name = "emulator", about = "Link-state routing emulator over UDP")]
struct Cli {
    /// UDP port this emulator listens on
    #[arg(short, long)]
    port: u16,

    /// Topology file
    #[arg(short, long)]
    filename: PathBuf,

    /// Host or IP of this emulator; looked up in the topology by port when omitted
    #[arg(long)]
    host: Option<String>,

    /// JSON file with timer and buffer settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    hello_interval_ms: Option<u64>,

    #[arg(long)]
    hold_down_ms: Option<u64>,

    #[arg(long)]
    lsp_interval_ms: Option<u64>,

    #[arg(long)]
    lsp_ttl: Option<u32>,
}

impl Cli {
    fn config(&self) -> Result<EmulatorConfig> {
        let mut config = match &self.config {
            Some(path) => EmulatorConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EmulatorConfig::default(),
        };

        if let Some(ms) = self.hello_interval_ms {
            config.hello_interval_ms = ms;
        }
        if let Some(ms) = self.hold_down_ms {
            config.hold_down_ms = ms;
        }
        if let Some(ms) = self.lsp_interval_ms {
            config.lsp_interval_ms = ms;
        }
        if let Some(ttl) = self.lsp_ttl {
            config.lsp_ttl = ttl;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = cli.config()?;
    let topology = load_topology(&cli.filename)
        .with_context(|| format!("failed to load topology {}", cli.filename.display()))?;
    let local = locate_local(&topology, cli.host.as_deref(), cli.port)
        .context("failed to determine the local node")?;

    info!(
        "Starting emulator {} ({} nodes in topology)",
        local,
        topology.len()
    );

    let rt = Builder::new_current_thread().enable_all().build()?;

    rt.block_on(async {
        let router = Router::bind(local, topology, config).await?;
        router
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        Ok(())
    })
}
