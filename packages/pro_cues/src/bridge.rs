//! Bridge: the single owner of all cue state.
//!
//! Stream consumers run as separate tasks and only decode; everything they
//! produce arrives here over one mpsc channel, so the cache, the dedup gate,
//! the reconnect timer and the deferred slide events are only ever touched
//! from this task's loop.
//!
//! Slide events are reconciled against the cached presentation. When the
//! event names a presentation the cache does not hold yet, the presentation
//! stream is assumed to be lagging: the event is parked for the
//! reconciliation delay and then processed against whatever is cached at
//! that point, without checking again.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use propresenter_client::{SlideIndexEvent, StreamConsumer, StreamEvent, StreamKind, StreamMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, info, warn};

use crate::cache::PresentationCache;
use crate::config::BridgeConfig;
use crate::cue::{CueAddress, CueLookup, cue_at};
use crate::dedup::DedupGate;
use crate::metrics::BridgeMetrics;
use crate::relay::CueDispatcher;
use crate::supervisor::{FailureOutcome, ReconnectSupervisor};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a slide event was routed on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Immediate,
    Deferred,
}

/// What processing a slide event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideOutcome {
    OutOfRange,
    NoCue,
    Duplicate(CueAddress),
    Dispatched(CueAddress),
}

pub struct Bridge {
    config: BridgeConfig,
    stream_client: reqwest::Client,
    cache: PresentationCache,
    gate: DedupGate,
    dispatcher: CueDispatcher,
    supervisor: ReconnectSupervisor,
    deferred: DelayQueue<SlideIndexEvent>,
    events_tx: mpsc::Sender<StreamEvent>,
    events_rx: mpsc::Receiver<StreamEvent>,
    /// Cancels the current generation's stream tasks
    streams: Option<CancellationToken>,
    metrics: Arc<BridgeMetrics>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, metrics: Arc<BridgeMetrics>) -> Result<Self> {
        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .build()
            .context("Failed to build controller HTTP client")?;
        let relay_client = reqwest::Client::builder()
            .connect_timeout(config.timing.connect_timeout)
            .timeout(config.timing.dispatch_timeout)
            .build()
            .context("Failed to build relay HTTP client")?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            dispatcher: CueDispatcher::new(relay_client, &config.relay, metrics.clone()),
            supervisor: ReconnectSupervisor::new(config.timing.reconnect_interval),
            config,
            stream_client,
            cache: PresentationCache::new(),
            gate: DedupGate::new(),
            deferred: DelayQueue::new(),
            events_tx,
            events_rx,
            streams: None,
            metrics,
        })
    }

    /// Run until `shutdown` resolves. Nothing inside the loop is fatal.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        info!(
            controller = %self.config.controller.base_url(),
            relay = %self.config.relay.url(),
            "Starting cue bridge"
        );
        self.connect();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.events_rx.recv() => self.handle_stream_event(event),
                Some(expired) = self.deferred.next() => {
                    self.process_slide(&expired.into_inner());
                }
                _ = self.supervisor.wait() => {
                    info!(
                        presentation = ?self.supervisor.state(StreamKind::ActivePresentation),
                        slide_index = ?self.supervisor.state(StreamKind::SlideIndex),
                        "Retrying"
                    );
                    self.connect();
                }
            }
        }

        if let Some(streams) = self.streams.take() {
            streams.cancel();
        }
        info!("Cue bridge stopped");
    }

    /// Tear down the current streams (if any) and open both again.
    fn connect(&mut self) {
        if let Some(previous) = self.streams.take() {
            previous.cancel();
        }

        let generation = self.supervisor.begin_connect();
        let cancel = CancellationToken::new();
        let base_url = self.config.controller.base_url();

        for kind in [StreamKind::ActivePresentation, StreamKind::SlideIndex] {
            StreamConsumer::new(
                self.stream_client.clone(),
                &base_url,
                kind,
                generation,
                self.events_tx.clone(),
                cancel.clone(),
            )
            .spawn();
        }

        debug!(generation, "streams started");
        self.streams = Some(cancel);
    }

    pub(crate) fn handle_stream_event(&mut self, event: StreamEvent) {
        if !self.supervisor.is_current(event.generation()) {
            debug!(
                stream = %event.kind(),
                generation = event.generation(),
                "dropping event from replaced connection"
            );
            self.metrics.stale_event();
            return;
        }

        match event {
            StreamEvent::Connected { kind, generation } => {
                self.supervisor.on_connected(kind, generation);
            }
            StreamEvent::Message { kind, message, .. } => {
                self.metrics.message_received(kind);
                match message {
                    StreamMessage::Presentation(presentation) => self.cache.replace(presentation),
                    StreamMessage::SlideIndex(event) => {
                        self.on_slide_index(event);
                    }
                }
            }
            StreamEvent::Heartbeat { .. } => self.metrics.heartbeat(),
            StreamEvent::Failed {
                kind,
                generation,
                error,
            } => {
                self.metrics.stream_failed();
                if error.is_unreachable() {
                    info!(stream = %kind, "Failed to connect... ProPresenter probably isn't awake");
                } else {
                    warn!(stream = %kind, "Lost {} stream: {}", kind, error);
                }

                match self.supervisor.on_failure(kind, generation) {
                    FailureOutcome::Scheduled(_) => {
                        self.metrics.reconnect_scheduled();
                        info!(
                            "Reconnecting in {}ms",
                            self.config.timing.reconnect_interval.as_millis()
                        );
                    }
                    FailureOutcome::Coalesced => self.metrics.reconnect_coalesced(),
                    FailureOutcome::Stale => {}
                }
            }
        }
    }

    /// Route a slide event: now if the cache holds its presentation, later
    /// otherwise.
    pub(crate) fn on_slide_index(&mut self, event: SlideIndexEvent) -> Reconciliation {
        if self.cache.matches(&event.presentation_id) {
            self.process_slide(&event);
            return Reconciliation::Immediate;
        }

        debug!(
            uuid = %event.presentation_id.uuid,
            index = event.index,
            "slide event for uncached presentation, deferring"
        );
        self.metrics.slide_event_deferred();
        self.deferred
            .insert(event, self.config.timing.reconciliation_delay);
        Reconciliation::Deferred
    }

    /// Next deferred slide event whose delay has elapsed; `None` when no
    /// event is waiting.
    #[cfg(test)]
    pub(crate) async fn next_deferred(&mut self) -> Option<SlideIndexEvent> {
        self.deferred.next().await.map(|expired| expired.into_inner())
    }

    /// Extract → dedup → dispatch against the cache as it is right now.
    pub(crate) fn process_slide(&mut self, event: &SlideIndexEvent) -> SlideOutcome {
        let cue = match cue_at(self.cache.current_slides(), event.index) {
            CueLookup::OutOfRange => {
                warn!(
                    index = event.index,
                    slides = self.cache.current_slides().len(),
                    "Slide index is outside the active presentation, ignoring"
                );
                self.metrics.out_of_range();
                return SlideOutcome::OutOfRange;
            }
            CueLookup::NoCue => return SlideOutcome::NoCue,
            CueLookup::Cue(cue) => cue,
        };

        if !self.gate.admit(&cue) {
            self.metrics.duplicate_suppressed();
            return SlideOutcome::Duplicate(cue);
        }

        info!(
            cue_list = %cue.cue_list,
            cue = %cue.cue_number,
            "Jumping to cue {} of list {}",
            cue.cue_number,
            cue.cue_list
        );
        self.metrics.cue_dispatched();
        // Best-effort: the outcome is logged by the dispatch task
        drop(self.dispatcher.dispatch(&cue));
        SlideOutcome::Dispatched(cue)
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &PresentationCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn supervisor(&self) -> &ReconnectSupervisor {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, RelayConfig, TimingConfig};
    use propresenter_client::{ActivePresentation, Group, PresentationId, Slide, StreamError};
    use std::time::Duration;
    use tokio::time::Instant;

    fn config() -> BridgeConfig {
        BridgeConfig {
            controller: ControllerConfig {
                host: "127.0.0.1".into(),
                port: 1,
            },
            // Nothing listens here; dispatches fail and are only logged
            relay: RelayConfig {
                host: "127.0.0.1".into(),
                port: 1,
                midi_port_name: "Port".into(),
                device_id: 0,
            },
            timing: TimingConfig::default(),
        }
    }

    fn bridge() -> Bridge {
        Bridge::new(config(), Arc::new(BridgeMetrics::new())).unwrap()
    }

    fn id(uuid: &str) -> PresentationId {
        PresentationId {
            uuid: uuid.into(),
            name: format!("Show {uuid}"),
            index: 0,
        }
    }

    fn presentation(uuid: &str, labels: &[&str]) -> ActivePresentation {
        ActivePresentation {
            id: id(uuid),
            groups: vec![Group {
                name: "Verse".into(),
                slides: labels
                    .iter()
                    .map(|label| Slide {
                        label: label.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            has_timeline: false,
            presentation_path: String::new(),
            destination: "presentation".into(),
        }
    }

    fn slide(uuid: &str, index: usize) -> SlideIndexEvent {
        SlideIndexEvent {
            index,
            presentation_id: id(uuid),
        }
    }

    fn presentation_event(generation: u64, p: ActivePresentation) -> StreamEvent {
        StreamEvent::Message {
            kind: StreamKind::ActivePresentation,
            generation,
            message: StreamMessage::Presentation(p),
        }
    }

    // -- cue pipeline --

    #[tokio::test]
    async fn matching_label_dispatches_cue() {
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Verse", "Lights 3;12"]));

        assert_eq!(
            bridge.process_slide(&slide("A", 1)),
            SlideOutcome::Dispatched(CueAddress::new("3", "12"))
        );
        assert_eq!(bridge.metrics.snapshot().cues.dispatched, 1);
    }

    #[tokio::test]
    async fn plain_label_never_dispatches() {
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Verse", "Lights;", "lights 1;2"]));

        for index in 0..3 {
            assert_eq!(bridge.process_slide(&slide("A", index)), SlideOutcome::NoCue);
        }
        assert_eq!(bridge.metrics.snapshot().cues.dispatched, 0);
    }

    #[tokio::test]
    async fn repeated_cue_dispatches_once() {
        let mut bridge = bridge();
        bridge
            .cache
            .replace(presentation("A", &["Lights 1;1", "Lights 1;1"]));

        assert!(matches!(
            bridge.process_slide(&slide("A", 0)),
            SlideOutcome::Dispatched(_)
        ));
        assert!(matches!(
            bridge.process_slide(&slide("A", 1)),
            SlideOutcome::Duplicate(_)
        ));
        assert!(matches!(
            bridge.process_slide(&slide("A", 0)),
            SlideOutcome::Duplicate(_)
        ));
        let cues = bridge.metrics.snapshot().cues;
        assert_eq!(cues.dispatched, 1);
        assert_eq!(cues.duplicates, 2);
    }

    #[tokio::test]
    async fn alternating_cues_all_dispatch() {
        let mut bridge = bridge();
        bridge
            .cache
            .replace(presentation("A", &["Lights 1;1", "Lights 1;2"]));

        for index in [0, 1, 0] {
            assert!(matches!(
                bridge.process_slide(&slide("A", index)),
                SlideOutcome::Dispatched(_)
            ));
        }
        assert_eq!(bridge.metrics.snapshot().cues.dispatched, 3);
    }

    #[tokio::test]
    async fn out_of_range_index_is_ignored() {
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Lights 1;1"]));

        assert_eq!(bridge.process_slide(&slide("A", 5)), SlideOutcome::OutOfRange);
        assert_eq!(bridge.metrics.snapshot().streams.out_of_range, 1);
        // The gate was not touched
        assert!(bridge.gate.last().is_none());
    }

    #[tokio::test]
    async fn failed_dispatch_still_suppresses_repeat() {
        // The relay in `config()` is unreachable
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Lights 2;4"]));

        assert!(matches!(
            bridge.process_slide(&slide("A", 0)),
            SlideOutcome::Dispatched(_)
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(
            bridge.process_slide(&slide("A", 0)),
            SlideOutcome::Duplicate(_)
        ));
    }

    // -- reconciliation --

    #[tokio::test(start_paused = true)]
    async fn matching_presentation_is_processed_immediately() {
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Lights 1;1"]));

        assert_eq!(bridge.on_slide_index(slide("A", 0)), Reconciliation::Immediate);
        assert_eq!(bridge.gate.last(), Some(&CueAddress::new("1", "1")));
        assert_eq!(bridge.metrics.snapshot().streams.deferred, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_presentation_waits_the_reconciliation_delay() {
        let mut bridge = bridge();
        bridge.cache.replace(presentation("A", &["Lights 1;1"]));
        let start = Instant::now();

        assert_eq!(bridge.on_slide_index(slide("B", 1)), Reconciliation::Deferred);
        assert!(bridge.gate.last().is_none());

        // The presentation stream catches up while the event waits
        bridge
            .cache
            .replace(presentation("B", &["Verse", "Lights 4;2"]));

        let early =
            tokio::time::timeout(Duration::from_millis(199), bridge.next_deferred()).await;
        assert!(early.is_err());

        let due = bridge.next_deferred().await.unwrap();
        assert!(Instant::now() - start >= Duration::from_millis(200));
        assert_eq!(due, slide("B", 1));

        assert_eq!(
            bridge.process_slide(&due),
            SlideOutcome::Dispatched(CueAddress::new("4", "2"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_event_uses_cache_at_firing_time() {
        let mut bridge = bridge();
        assert_eq!(bridge.on_slide_index(slide("B", 0)), Reconciliation::Deferred);
        bridge.cache.replace(presentation("B", &["Lights 9;9"]));

        let due = bridge.next_deferred().await.unwrap();
        assert_eq!(
            bridge.process_slide(&due),
            SlideOutcome::Dispatched(CueAddress::new("9", "9"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_cached_defers_then_finds_no_slide() {
        let mut bridge = bridge();
        assert_eq!(bridge.on_slide_index(slide("A", 0)), Reconciliation::Deferred);

        let due = bridge.next_deferred().await.unwrap();
        assert_eq!(bridge.process_slide(&due), SlideOutcome::OutOfRange);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_deferred_events_all_fire() {
        let mut bridge = bridge();
        bridge.on_slide_index(slide("B", 0));
        tokio::time::advance(Duration::from_millis(50)).await;
        bridge.on_slide_index(slide("B", 1));

        assert_eq!(bridge.next_deferred().await.unwrap().index, 0);
        assert_eq!(bridge.next_deferred().await.unwrap().index, 1);
        assert!(bridge.next_deferred().await.is_none());
        assert_eq!(bridge.metrics.snapshot().streams.deferred, 2);
    }

    // -- stream events --

    #[tokio::test]
    async fn presentation_message_replaces_cache() {
        let mut bridge = bridge();
        let generation = bridge.supervisor.begin_connect();

        bridge.handle_stream_event(presentation_event(generation, presentation("A", &["x"])));
        assert_eq!(bridge.cache().current_id().unwrap().uuid, "A");
        bridge.handle_stream_event(presentation_event(generation, presentation("B", &["y", "z"])));
        assert_eq!(bridge.cache().current_id().unwrap().uuid, "B");
        assert_eq!(bridge.cache().current_slides().len(), 2);
        assert_eq!(bridge.metrics.snapshot().streams.presentations, 2);
    }

    #[tokio::test]
    async fn heartbeat_leaves_cache_untouched() {
        let mut bridge = bridge();
        let generation = bridge.supervisor.begin_connect();
        bridge.handle_stream_event(presentation_event(generation, presentation("A", &["x"])));

        bridge.handle_stream_event(StreamEvent::Heartbeat {
            kind: StreamKind::ActivePresentation,
            generation,
        });
        assert_eq!(bridge.cache().current_id().unwrap().uuid, "A");
        assert_eq!(bridge.metrics.snapshot().streams.heartbeats, 1);
    }

    #[tokio::test]
    async fn stale_events_are_dropped() {
        let mut bridge = bridge();
        let old = bridge.supervisor.begin_connect();
        bridge.supervisor.begin_connect();

        bridge.handle_stream_event(presentation_event(old, presentation("A", &["x"])));
        assert!(bridge.cache().current_presentation().is_none());
        assert_eq!(bridge.metrics.snapshot().streams.stale, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_schedule_a_single_reconnect() {
        let mut bridge = bridge();
        let generation = bridge.supervisor.begin_connect();
        let start = Instant::now();

        bridge.handle_stream_event(StreamEvent::Failed {
            kind: StreamKind::ActivePresentation,
            generation,
            error: StreamError::Closed,
        });
        assert_eq!(
            bridge.supervisor().deadline(),
            Some(start + Duration::from_millis(3000))
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        bridge.handle_stream_event(StreamEvent::Failed {
            kind: StreamKind::SlideIndex,
            generation,
            error: StreamError::Closed,
        });
        assert_eq!(
            bridge.supervisor().deadline(),
            Some(start + Duration::from_millis(3000))
        );

        let connections = bridge.metrics.snapshot().connections;
        assert_eq!(connections.failures, 2);
        assert_eq!(connections.reconnects, 1);
        assert_eq!(connections.coalesced, 1);
    }
}
