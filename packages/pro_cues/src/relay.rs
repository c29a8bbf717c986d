//! midi-relay dispatch
//!
//! Each admitted cue becomes one MIDI Show Control "go" command posted to the
//! relay. Sends are best-effort: they run on their own task, failures are
//! logged and dropped, nothing is retried.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::cue::CueAddress;
use crate::metrics::BridgeMetrics;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay is unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("relay request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("relay responded with {0}")]
    Status(StatusCode),
}

impl RelayError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unreachable(err)
        } else {
            Self::Request(err)
        }
    }
}

/// JSON body of a midi-relay request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayCommand<'a> {
    pub midiport: &'a str,
    pub midicommand: &'static str,
    pub deviceid: u8,
    pub commandformat: &'static str,
    pub command: &'static str,
    pub cue: &'a str,
    pub cuelist: &'a str,
}

impl<'a> RelayCommand<'a> {
    /// MSC "go" to `cue` for a lighting desk
    pub fn go(midiport: &'a str, deviceid: u8, cue: &'a CueAddress) -> Self {
        Self {
            midiport,
            midicommand: "msc",
            deviceid,
            commandformat: "lighting.general",
            command: "go",
            cue: &cue.cue_number,
            cuelist: &cue.cue_list,
        }
    }
}

/// Sends cues to the relay
pub struct CueDispatcher {
    client: reqwest::Client,
    url: String,
    midi_port_name: String,
    device_id: u8,
    metrics: Arc<BridgeMetrics>,
}

impl CueDispatcher {
    pub fn new(client: reqwest::Client, relay: &RelayConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            client,
            url: relay.url(),
            midi_port_name: relay.midi_port_name.clone(),
            device_id: relay.device_id,
            metrics,
        }
    }

    /// Fire a "go" for `cue` without waiting for it.
    ///
    /// The returned handle resolves to the outcome; callers may drop it.
    /// Failures are already logged and counted by the task itself.
    pub fn dispatch(&self, cue: &CueAddress) -> JoinHandle<Result<(), RelayError>> {
        let request = self
            .client
            .post(&self.url)
            .json(&RelayCommand::go(&self.midi_port_name, self.device_id, cue));
        let metrics = self.metrics.clone();
        let cue = cue.clone();

        tokio::spawn(async move {
            let result = send(request).await;
            match &result {
                Ok(()) => debug!(cue_list = %cue.cue_list, cue = %cue.cue_number, "relay accepted cue"),
                Err(e) => {
                    metrics.dispatch_failed();
                    warn!(
                        cue_list = %cue.cue_list,
                        cue = %cue.cue_number,
                        "Failed to send midi-relay request: {}",
                        e
                    );
                }
            }
            result
        })
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(), RelayError> {
    let response = request.send().await.map_err(RelayError::from_reqwest)?;
    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Status(status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Spawn a relay that records every posted body and answers `status`.
    async fn spawn_relay(status: StatusCode) -> (RelayConfig, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                        let _ = tx.send(body);
                        status
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (relay_config(port), rx)
    }

    fn relay_config(port: u16) -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".to_string(),
            port,
            midi_port_name: "Vista".to_string(),
            device_id: 5,
        }
    }

    #[test]
    fn go_command_shape() {
        let cue = CueAddress::new("3", "12");
        let body = serde_json::to_value(RelayCommand::go("Port", 0, &cue)).unwrap();
        assert_eq!(
            body,
            json!({
                "midiport": "Port",
                "midicommand": "msc",
                "deviceid": 0,
                "commandformat": "lighting.general",
                "command": "go",
                "cue": "12",
                "cuelist": "3"
            })
        );
    }

    #[tokio::test]
    async fn posts_go_command_to_relay() {
        let (relay, mut bodies) = spawn_relay(StatusCode::OK).await;
        let metrics = Arc::new(BridgeMetrics::new());
        let dispatcher = CueDispatcher::new(reqwest::Client::new(), &relay, metrics.clone());

        let outcome = dispatcher.dispatch(&CueAddress::new("3", "12")).await.unwrap();
        assert!(outcome.is_ok());

        let body = timeout(TEST_TIMEOUT, bodies.recv()).await.unwrap().unwrap();
        assert_eq!(body["cue"], "12");
        assert_eq!(body["cuelist"], "3");
        assert_eq!(body["midiport"], "Vista");
        assert_eq!(body["deviceid"], 5);
        assert_eq!(metrics.snapshot().cues.failures, 0);
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let (relay, _bodies) = spawn_relay(StatusCode::INTERNAL_SERVER_ERROR).await;
        let metrics = Arc::new(BridgeMetrics::new());
        let dispatcher = CueDispatcher::new(reqwest::Client::new(), &relay, metrics.clone());

        let outcome = dispatcher.dispatch(&CueAddress::new("1", "1")).await.unwrap();
        assert!(matches!(
            outcome,
            Err(RelayError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
        assert_eq!(metrics.snapshot().cues.failures, 1);
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_failure() {
        let metrics = Arc::new(BridgeMetrics::new());
        let dispatcher =
            CueDispatcher::new(reqwest::Client::new(), &relay_config(1), metrics.clone());

        let outcome = dispatcher.dispatch(&CueAddress::new("1", "1")).await.unwrap();
        assert!(matches!(outcome, Err(RelayError::Unreachable(_))));
        assert_eq!(metrics.snapshot().cues.failures, 1);
    }
}
