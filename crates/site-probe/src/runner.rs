// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bulk diagnostic runner.
//!
//! A [`BulkRunner`] probes every site of a roster snapshot, one at a time,
//! in a background task. Results stream back through a [`Pass`] handle as
//! [`DiagnosticEvent`]s in roster order, followed by exactly one terminal
//! event. Cancellation is cooperative: it is checked before each site, and
//! a probe that has already started always runs to its own timeout.
//!
//! `start` consumes the runner, so a runner can drive at most one pass.

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Diagnostics;
use crate::outcome::{ProbeKind, ProbeOutcome};
use crate::site::Roster;

/// Lifecycle of a bulk pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Not started yet.
    Idle,
    /// Probing sites.
    Running,
    /// Every site was probed.
    Completed,
    /// Stopped before reaching every site.
    Cancelled,
}

/// Events emitted by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// Result for the site at `index` in the roster.
    Item { index: usize, outcome: ProbeOutcome },
    /// Every site was probed. Always the last event.
    Completed,
    /// The pass stopped early. Always the last event.
    Cancelled,
}

impl DiagnosticEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Totals for a finished pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Sites in the roster.
    pub total: usize,
    /// Sites that received an outcome.
    pub probed: usize,
    /// Whether the pass ended before reaching every site.
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("bulk pass task failed: {0}")]
    Join(#[from] JoinError),
}

/// Callback-style consumer of a pass.
pub trait PassObserver: Send + 'static {
    /// Called once per probed site, in roster order.
    fn on_item(&mut self, index: usize, outcome: &ProbeOutcome);

    /// Called exactly once, after the last item.
    fn on_done(&mut self, cancelled: bool);
}

/// Cloneable handle that requests a pass to stop. Safe to use from any
/// thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel_token: CancellationToken,
}

impl StopHandle {
    /// Request early termination. Idempotent.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A single-use bulk runner.
#[derive(Debug)]
pub struct BulkRunner {
    diagnostics: Arc<Diagnostics>,
    cancel_token: CancellationToken,
}

impl BulkRunner {
    #[must_use]
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            diagnostics,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token, e.g. a child of an
    /// application-wide shutdown token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// An unstarted runner is always idle.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        RunnerState::Idle
    }

    /// Start probing `roster` with `kind` in a background task.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(self, roster: Roster, kind: ProbeKind) -> Pass {
        // One slot per site plus the terminal event, so the runner never
        // waits on a slow consumer.
        let (event_tx, event_rx) = mpsc::channel(roster.len() + 1);
        let (state_tx, state_rx) = watch::channel(RunnerState::Running);

        let Self {
            diagnostics,
            cancel_token,
        } = self;
        let task_cancel = cancel_token.clone();
        let task = tokio::spawn(async move {
            run_pass(diagnostics, roster, kind, event_tx, state_tx, task_cancel).await
        });

        Pass {
            events: Some(event_rx),
            state_rx,
            cancel_token,
            task,
            forwarder: None,
        }
    }

    /// Start a pass and deliver its events to `observer` instead of a
    /// channel. The observer runs on its own task.
    #[must_use]
    pub fn start_with_observer<O: PassObserver>(
        self,
        roster: Roster,
        kind: ProbeKind,
        mut observer: O,
    ) -> Pass {
        let mut pass = self.start(roster, kind);
        let Some(mut events) = pass.events.take() else {
            return pass;
        };

        pass.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    DiagnosticEvent::Item { index, outcome } => observer.on_item(index, &outcome),
                    DiagnosticEvent::Completed => {
                        observer.on_done(false);
                        return;
                    }
                    DiagnosticEvent::Cancelled => {
                        observer.on_done(true);
                        return;
                    }
                }
            }
        }));
        pass
    }
}

/// Handle to a running pass.
///
/// Dropping the handle stops the pass at the next site boundary.
pub struct Pass {
    events: Option<mpsc::Receiver<DiagnosticEvent>>,
    state_rx: watch::Receiver<RunnerState>,
    cancel_token: CancellationToken,
    task: JoinHandle<PassSummary>,
    forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("state", &*self.state_rx.borrow())
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Pass {
    /// Receive the next event.
    ///
    /// Returns `None` after the terminal event, or immediately when the
    /// pass was started with an observer.
    pub async fn recv(&mut self) -> Option<DiagnosticEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Request early termination. Idempotent; the site being probed
    /// finishes first.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel_token: self.cancel_token.clone(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state_rx.borrow()
    }

    /// Wait for the background task (and observer, if any) to finish.
    pub async fn join(mut self) -> Result<PassSummary, RunnerError> {
        let summary = (&mut self.task).await?;
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.await?;
        }
        Ok(summary)
    }
}

impl Drop for Pass {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run_pass(
    diagnostics: Arc<Diagnostics>,
    roster: Roster,
    kind: ProbeKind,
    event_tx: mpsc::Sender<DiagnosticEvent>,
    state_tx: watch::Sender<RunnerState>,
    cancel_token: CancellationToken,
) -> PassSummary {
    let total = roster.len();
    info!("Starting {} pass over {} sites", kind, total);

    let mut probed = 0;
    for (index, site) in roster.iter().enumerate() {
        if cancel_token.is_cancelled() {
            info!("Pass cancelled before site {} of {}", index + 1, total);
            break;
        }

        let outcome = diagnostics.probe(kind, site).await;
        debug!("[{}/{}] {}: {:?}", index + 1, total, site.name, outcome);
        probed += 1;

        if event_tx
            .send(DiagnosticEvent::Item { index, outcome })
            .await
            .is_err()
        {
            warn!("Pass consumer went away after {} of {} sites", probed, total);
            break;
        }
    }

    let cancelled = probed < total;
    let (state, terminal) = if cancelled {
        (RunnerState::Cancelled, DiagnosticEvent::Cancelled)
    } else {
        (RunnerState::Completed, DiagnosticEvent::Completed)
    };
    state_tx.send_replace(state);
    let _ = event_tx.send(terminal).await;

    info!("{} pass finished: {} of {} sites probed", kind, probed, total);
    PassSummary {
        total,
        probed,
        cancelled,
    }
}
