use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod bridge;
mod cache;
mod config;
mod cue;
mod dedup;
mod metrics;
mod relay;
mod supervisor;


use crate::bridge::Bridge;
use crate::config::{BridgeConfig, CliOverrides, DEFAULT_CONFIG_FILE, FileConfig};
use crate::metrics::BridgeMetrics;

const SETUP_STEPS: &str = "\
Setup:
  1. In ProPresenter, open Preferences > Network and enable networking.
     Note the port it shows; pass it with --pro-presenter-port.
  2. Run midi-relay on a machine connected to the lighting desk and note the
     name of the MIDI port that reaches the desk (--midi-relay-midi-port-name).
  3. Make the MSC device id on the desk match --midi-device-id.
  4. Label the slides that should fire a cue as `Lights [list];[cue]`,
     for example `Lights 1;12` goes to cue 12 of list 1.";

#[derive(Parser)]
#[command(name = "pro-cues")]
#[command(version)]
#[command(about = "Fire lighting cues from ProPresenter slide labels through midi-relay")]
#[command(after_help = SETUP_STEPS)]
struct Cli {
    /// Host running ProPresenter
    #[arg(long, visible_alias = "proPresenterHost", value_name = "HOST")]
    pro_presenter_host: Option<String>,

    /// ProPresenter network port
    #[arg(long, visible_alias = "proPresenterPort", value_name = "PORT")]
    pro_presenter_port: Option<u16>,

    /// Host running midi-relay
    #[arg(long, visible_alias = "midiRelayHost", value_name = "HOST")]
    midi_relay_host: Option<String>,

    /// midi-relay port
    #[arg(long, visible_alias = "midiRelayPort", value_name = "PORT")]
    midi_relay_port: Option<u16>,

    /// MIDI port on the midi-relay machine that reaches the lighting desk
    #[arg(long, visible_alias = "midiRelayMidiPortName", value_name = "NAME")]
    midi_relay_midi_port_name: Option<String>,

    /// MSC device id of the lighting desk
    #[arg(long, visible_alias = "midiDeviceId", value_name = "ID")]
    midi_device_id: Option<u8>,

    /// Config file (defaults to ./pro-cues.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            controller_host: self.pro_presenter_host.clone(),
            controller_port: self.pro_presenter_port,
            relay_host: self.midi_relay_host.clone(),
            relay_port: self.midi_relay_port,
            midi_port_name: self.midi_relay_midi_port_name.clone(),
            device_id: self.midi_device_id,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "pro_cues=debug,propresenter_client=debug,info"
    } else {
        "pro_cues=info,propresenter_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config_file = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            path.clone()
        }
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };
    let file_config: FileConfig = config::load_config(&config_file, &cli.overrides())
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", config_file.display()))?;

    let (config, defaulted) = BridgeConfig::resolve(&file_config);
    for setting in &defaulted {
        warn!("{}", setting);
    }

    reqwest::Url::parse(&config.controller.base_url())
        .with_context(|| format!("Invalid ProPresenter address {}", config.controller.base_url()))?;
    reqwest::Url::parse(&config.relay.url())
        .with_context(|| format!("Invalid midi-relay address {}", config.relay.url()))?;

    let metrics = Arc::new(BridgeMetrics::new());
    let bridge = Bridge::new(config, metrics.clone())?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };
    bridge.run(shutdown).await;

    let snapshot = metrics.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!(metrics = %json, "Final metrics"),
        Err(e) => warn!("Failed to serialize metrics: {}", e),
    }

    Ok(())
}
