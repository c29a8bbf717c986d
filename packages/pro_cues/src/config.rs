use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Layered config (figment: defaults / pro-cues.toml / env vars / CLI flags)
// =============================================================================
//
// Equivalent ways to set the relay port:
//
//   pro-cues.toml:   [relay]
//                    port = 1300
//
//   env var:         PRO_CUES_RELAY__PORT=1300   (double underscore = nesting)
//
//   flag:            --midi-relay-port 1300
//
// Connection settings are optional at every layer so that a value nobody set
// can be reported before falling back to its default.

pub const DEFAULT_CONFIG_FILE: &str = "pro-cues.toml";

pub const DEFAULT_CONTROLLER_HOST: &str = "127.0.0.1";
pub const DEFAULT_CONTROLLER_PORT: u16 = 1256;
pub const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_RELAY_PORT: u16 = 1257;
pub const DEFAULT_MIDI_PORT_NAME: &str = "Port";
pub const DEFAULT_DEVICE_ID: u8 = 0;

/// Top-level configuration as read from all layers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub controller: ControllerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub timing: TimingFileConfig,
}

/// ProPresenter network settings (lives under `[controller]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControllerFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// midi-relay settings (lives under `[relay]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// MIDI port on the relay machine that reaches the lighting desk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_port_name: Option<String>,
    /// MSC device id configured on the desk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u8>,
}

/// Timing knobs (lives under `[timing]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingFileConfig {
    /// How long a slide event for an unknown presentation waits for the
    /// presentation stream to catch up
    #[serde(default = "default_reconciliation_delay_ms")]
    pub reconciliation_delay_ms: u64,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
}

impl Default for TimingFileConfig {
    fn default() -> Self {
        Self {
            reconciliation_delay_ms: default_reconciliation_delay_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
        }
    }
}

fn default_reconciliation_delay_ms() -> u64 {
    200
}
fn default_reconnect_interval_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_dispatch_timeout_ms() -> u64 {
    5000
}

/// Values given on the command line; `None` leaves lower layers in charge.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub controller_host: Option<String>,
    pub controller_port: Option<u16>,
    pub relay_host: Option<String>,
    pub relay_port: Option<u16>,
    pub midi_port_name: Option<String>,
    pub device_id: Option<u8>,
}

/// Build a figment that layers: defaults → config file → PRO_CUES_* env vars → CLI flags.
///
/// Env vars use double-underscore for nesting into sections:
///   `PRO_CUES_CONTROLLER__HOST=10.0.0.5`  →  `controller.host = "10.0.0.5"`
///   `PRO_CUES_TIMING__RECONNECT_INTERVAL_MS=5000`  →  `timing.reconnect_interval_ms = 5000`
pub fn load_config(config_file: &Path, cli: &CliOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("PRO_CUES_").split("__"));

    if let Some(host) = &cli.controller_host {
        figment = figment.merge(Serialized::default("controller.host", host));
    }
    if let Some(port) = cli.controller_port {
        figment = figment.merge(Serialized::default("controller.port", port));
    }
    if let Some(host) = &cli.relay_host {
        figment = figment.merge(Serialized::default("relay.host", host));
    }
    if let Some(port) = cli.relay_port {
        figment = figment.merge(Serialized::default("relay.port", port));
    }
    if let Some(name) = &cli.midi_port_name {
        figment = figment.merge(Serialized::default("relay.midi_port_name", name));
    }
    if let Some(id) = cli.device_id {
        figment = figment.merge(Serialized::default("relay.device_id", id));
    }

    figment
}

// =============================================================================
// Runtime config (resolved from FileConfig, defaults applied)
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
}

impl ControllerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub midi_port_name: String,
    pub device_id: u8,
}

impl RelayConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimingConfig {
    pub reconciliation_delay: Duration,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl TimingConfig {
    pub fn from_file(fc: &TimingFileConfig) -> Self {
        Self {
            reconciliation_delay: Duration::from_millis(fc.reconciliation_delay_ms),
            reconnect_interval: Duration::from_millis(fc.reconnect_interval_ms),
            connect_timeout: Duration::from_millis(fc.connect_timeout_ms),
            dispatch_timeout: Duration::from_millis(fc.dispatch_timeout_ms),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::from_file(&TimingFileConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub controller: ControllerConfig,
    pub relay: RelayConfig,
    pub timing: TimingConfig,
}

/// A setting nobody specified, reported to the operator on startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultedSetting {
    pub description: &'static str,
    /// Default as shown to the operator (strings quoted)
    pub value: String,
    pub flag: &'static str,
}

impl std::fmt::Display for DefaultedSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "You did not specify a {}, defaulting to {}. To fix this, add {}",
            self.description, self.value, self.flag
        )
    }
}

impl BridgeConfig {
    /// Apply defaults. Every default that had to be used is returned too.
    pub fn resolve(fc: &FileConfig) -> (Self, Vec<DefaultedSetting>) {
        let mut defaulted = Vec::new();

        let mut text = |value: &Option<String>,
                        default: &str,
                        description: &'static str,
                        flag: &'static str| {
            value.clone().unwrap_or_else(|| {
                defaulted.push(DefaultedSetting {
                    description,
                    value: format!("\"{default}\""),
                    flag,
                });
                default.to_string()
            })
        };
        let controller_host = text(
            &fc.controller.host,
            DEFAULT_CONTROLLER_HOST,
            "ProPresenter network host",
            "--pro-presenter-host <host>",
        );
        let relay_host = text(
            &fc.relay.host,
            DEFAULT_RELAY_HOST,
            "midi-relay network host",
            "--midi-relay-host <host>",
        );
        let midi_port_name = text(
            &fc.relay.midi_port_name,
            DEFAULT_MIDI_PORT_NAME,
            "midi-relay MIDI port name",
            "--midi-relay-midi-port-name <port>",
        );

        let mut number = |value: Option<u16>,
                          default: u16,
                          description: &'static str,
                          flag: &'static str| {
            value.unwrap_or_else(|| {
                defaulted.push(DefaultedSetting {
                    description,
                    value: default.to_string(),
                    flag,
                });
                default
            })
        };
        let controller_port = number(
            fc.controller.port,
            DEFAULT_CONTROLLER_PORT,
            "ProPresenter network port",
            "--pro-presenter-port <port>",
        );
        let relay_port = number(
            fc.relay.port,
            DEFAULT_RELAY_PORT,
            "midi-relay network port",
            "--midi-relay-port <port>",
        );

        let device_id = fc.relay.device_id.unwrap_or_else(|| {
            defaulted.push(DefaultedSetting {
                description: "MIDI device id",
                value: DEFAULT_DEVICE_ID.to_string(),
                flag: "--midi-device-id <id>",
            });
            DEFAULT_DEVICE_ID
        });

        let config = Self {
            controller: ControllerConfig {
                host: controller_host,
                port: controller_port,
            },
            relay: RelayConfig {
                host: relay_host,
                port: relay_port,
                midi_port_name,
                device_id,
            },
            timing: TimingConfig::from_file(&fc.timing),
        };
        (config, defaulted)
    }
}
