//! Bridge metrics
//!
//! Counters for what the bridge saw and did, logged as a summary on shutdown.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use propresenter_client::StreamKind;

/// Process-wide counters. Shared with dispatch tasks, hence atomics.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    // Stream metrics
    /// Presentation payloads applied to the cache
    pub presentations_received: AtomicU64,
    /// Slide-index payloads received
    pub slide_events_received: AtomicU64,
    /// Null or malformed messages on either stream
    pub heartbeats: AtomicU64,
    /// Events from a connection generation that was already torn down
    pub stale_events: AtomicU64,

    // Reconciliation metrics
    /// Slide events that waited for the presentation stream to catch up
    pub slide_events_deferred: AtomicU64,
    /// Slide indices with no slide in the cached presentation
    pub out_of_range: AtomicU64,

    // Cue metrics
    pub cues_dispatched: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub dispatch_failures: AtomicU64,

    // Connection metrics
    pub stream_failures: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    pub reconnects_coalesced: AtomicU64,

    start_time: Option<Instant>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn message_received(&self, kind: StreamKind) {
        match kind {
            StreamKind::ActivePresentation => &self.presentations_received,
            StreamKind::SlideIndex => &self.slide_events_received,
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_event(&self) {
        self.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slide_event_deferred(&self) {
        self.slide_events_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn out_of_range(&self) {
        self.out_of_range.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cue_dispatched(&self) {
        self.cues_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_failed(&self) {
        self.stream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_coalesced(&self) {
        self.reconnects_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            streams: StreamMetrics {
                presentations: self.presentations_received.load(Ordering::Relaxed),
                slide_events: self.slide_events_received.load(Ordering::Relaxed),
                heartbeats: self.heartbeats.load(Ordering::Relaxed),
                stale: self.stale_events.load(Ordering::Relaxed),
                deferred: self.slide_events_deferred.load(Ordering::Relaxed),
                out_of_range: self.out_of_range.load(Ordering::Relaxed),
            },
            cues: CueMetrics {
                dispatched: self.cues_dispatched.load(Ordering::Relaxed),
                duplicates: self.duplicates_suppressed.load(Ordering::Relaxed),
                failures: self.dispatch_failures.load(Ordering::Relaxed),
            },
            connections: ConnectionMetrics {
                failures: self.stream_failures.load(Ordering::Relaxed),
                reconnects: self.reconnects_scheduled.load(Ordering::Relaxed),
                coalesced: self.reconnects_coalesced.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub streams: StreamMetrics,
    pub cues: CueMetrics,
    pub connections: ConnectionMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub presentations: u64,
    pub slide_events: u64,
    pub heartbeats: u64,
    pub stale: u64,
    pub deferred: u64,
    pub out_of_range: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueMetrics {
    pub dispatched: u64,
    pub duplicates: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub failures: u64,
    pub reconnects: u64,
    pub coalesced: u64,
}
