//! Request lifecycle tracking.
//!
//! Every admitted request is registered here with a deadline timer. The
//! first of {completion, failure, deadline} to call [`RequestSupervisor::finish`]
//! takes the entry out of the registry, cancels the timer, and releases the
//! slot; the losing paths find the entry gone and no-op. `DashMap::remove`
//! is the single-assignment point, so the release happens exactly once even
//! when a timeout fires concurrently with a late completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::admission::SlotPermit;

/// Terminal outcome of a tracked request. All three release the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Failed,
    TimedOut,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

struct RequestEntry {
    permit: SlotPermit,
    started_at: Instant,
    timer_cancel: CancellationToken,
    timed_out: CancellationToken,
}

/// Registry of in-flight requests, keyed by request id.
pub struct RequestSupervisor {
    requests: DashMap<String, RequestEntry>,
}

impl RequestSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: DashMap::new(),
        })
    }

    /// Register an admitted request and arm its deadline timer.
    ///
    /// The entry is inserted before the timer task is spawned, so a
    /// zero-length deadline cannot fire against a missing entry.
    pub fn begin(
        self: &Arc<Self>,
        request_id: String,
        permit: SlotPermit,
        timeout: Duration,
    ) -> RequestHandle {
        let timer_cancel = CancellationToken::new();
        let timed_out = CancellationToken::new();

        self.requests.insert(
            request_id.clone(),
            RequestEntry {
                permit,
                started_at: Instant::now(),
                timer_cancel: timer_cancel.clone(),
                timed_out: timed_out.clone(),
            },
        );

        let supervisor = Arc::clone(self);
        let deadline_id = request_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    supervisor.finish(&deadline_id, RequestOutcome::TimedOut);
                }
            }
        });

        RequestHandle {
            request_id,
            timed_out,
            supervisor: Arc::clone(self),
        }
    }

    /// Resolve a request. The first caller wins: it takes the entry, cancels
    /// the deadline timer, and releases the slot. Returns `false` when the
    /// request was already resolved (or never tracked).
    pub fn finish(&self, request_id: &str, outcome: RequestOutcome) -> bool {
        let Some((_, entry)) = self.requests.remove(request_id) else {
            return false;
        };

        entry.timer_cancel.cancel();
        if outcome == RequestOutcome::TimedOut {
            entry.timed_out.cancel();
        }
        entry.permit.release();

        tracing::info!(
            request_id,
            outcome = outcome.as_str(),
            elapsed = ?entry.started_at.elapsed(),
            "request finished"
        );
        true
    }

    pub fn is_tracking(&self, request_id: &str) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Time since the request was admitted, while still in flight.
    pub fn elapsed(&self, request_id: &str) -> Option<Duration> {
        self.requests
            .get(request_id)
            .map(|entry| entry.started_at.elapsed())
    }

    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }
}

/// Handle to one tracked request: lets the request path race its own work
/// against the deadline and report the terminal outcome.
pub struct RequestHandle {
    request_id: String,
    timed_out: CancellationToken,
    supervisor: Arc<RequestSupervisor>,
}

impl RequestHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Resolves when the deadline timer wins the race. Never resolves for a
    /// request that completed or failed first.
    pub async fn timed_out(&self) {
        self.timed_out.cancelled().await;
    }

    /// Report a terminal outcome. Forwards to [`RequestSupervisor::finish`],
    /// so it is idempotent across all exit paths.
    pub fn finish(&self, outcome: RequestOutcome) -> bool {
        self.supervisor.finish(&self.request_id, outcome)
    }
}
