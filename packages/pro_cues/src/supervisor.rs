//! Reconnect policy shared by both controller streams.
//!
//! Each stream has its own connection state, but there is a single reconnect
//! timer for the process. The first failure arms it; failures while it is
//! armed are coalesced. When it fires both streams are rebuilt from scratch
//! under a new generation. The interval is fixed and retries never stop.

use std::pin::Pin;
use std::time::Duration;

use propresenter_client::StreamKind;
use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
}

/// What a failure report led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// A reconnect is now scheduled for this instant
    Scheduled(Instant),
    /// A reconnect was already pending
    Coalesced,
    /// The failure belongs to connections that were already replaced
    Stale,
}

#[derive(Debug)]
pub struct ReconnectSupervisor {
    interval: Duration,
    generation: u64,
    presentation: ConnectionState,
    slide_index: ConnectionState,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ReconnectSupervisor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            generation: 0,
            presentation: ConnectionState::Connecting,
            slide_index: ConnectionState::Connecting,
            timer: None,
        }
    }

    /// Start a new generation of connections; returns its number.
    pub fn begin_connect(&mut self) -> u64 {
        self.generation += 1;
        self.presentation = ConnectionState::Connecting;
        self.slide_index = ConnectionState::Connecting;
        self.timer = None;
        self.generation
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn state(&self, kind: StreamKind) -> ConnectionState {
        match kind {
            StreamKind::ActivePresentation => self.presentation,
            StreamKind::SlideIndex => self.slide_index,
        }
    }

    fn state_mut(&mut self, kind: StreamKind) -> &mut ConnectionState {
        match kind {
            StreamKind::ActivePresentation => &mut self.presentation,
            StreamKind::SlideIndex => &mut self.slide_index,
        }
    }

    pub fn on_connected(&mut self, kind: StreamKind, generation: u64) {
        if self.is_current(generation) {
            *self.state_mut(kind) = ConnectionState::Connected;
        }
    }

    pub fn on_failure(&mut self, kind: StreamKind, generation: u64) -> FailureOutcome {
        if !self.is_current(generation) {
            return FailureOutcome::Stale;
        }
        *self.state_mut(kind) = ConnectionState::Failed;

        if self.timer.is_some() {
            return FailureOutcome::Coalesced;
        }
        let deadline = Instant::now() + self.interval;
        self.timer = Some(Box::pin(tokio::time::sleep_until(deadline)));
        FailureOutcome::Scheduled(deadline)
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    #[cfg(test)]
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.as_ref().map(|timer| timer.deadline())
    }

    /// Resolves when the pending reconnect is due; never resolves when none
    /// is pending. Cancel-safe: dropping the future keeps the timer armed.
    pub async fn wait(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => std::future::pending().await,
        }
    }
}
