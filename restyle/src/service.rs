//! TransformService: transport-agnostic admission, lifecycle, and
//! orchestration.
//!
//! Orchestration runs in a spawned task so an outer timeout abandons the
//! outcome without cancelling the in-flight provider call; only the
//! observable result is suppressed. Whichever of completion or deadline
//! resolves first releases the slot; the loser finds the request already
//! finished and is discarded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::admission::{AdmissionController, CapacityExceeded};
use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::supervisor::{RequestOutcome, RequestSupervisor};
use crate::transform::{TransformError, TransformOrchestrator};

/// Successful transform receipt returned to the transport.
#[derive(Debug, Clone)]
pub struct TransformReceipt {
    pub image_id: String,
    pub request_id: String,
    pub processing_time: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    AtCapacity(#[from] CapacityExceeded),

    #[error("request exceeded the {}s deadline", .0.as_secs())]
    TimedOut(Duration),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

pub struct TransformService {
    admission: Arc<AdmissionController>,
    supervisor: Arc<RequestSupervisor>,
    orchestrator: Arc<TransformOrchestrator>,
    store: Arc<ArtifactStore>,
    request_timeout: Duration,
    max_upload_bytes: usize,
    started_at: Instant,
}

fn generate_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

impl TransformService {
    pub fn new(
        orchestrator: TransformOrchestrator,
        store: Arc<ArtifactStore>,
        config: &Config,
    ) -> Self {
        Self {
            admission: AdmissionController::new(config.max_concurrent),
            supervisor: RequestSupervisor::new(),
            orchestrator: Arc::new(orchestrator),
            store,
            request_timeout: config.request_timeout,
            max_upload_bytes: config.max_upload_bytes,
            started_at: Instant::now(),
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn supervisor(&self) -> &Arc<RequestSupervisor> {
        &self.supervisor
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Admit, track, and run one transform request.
    pub async fn submit(
        &self,
        upload_path: PathBuf,
        style: Option<String>,
        prompt: Option<String>,
    ) -> Result<TransformReceipt, SubmitError> {
        let permit = self.admission.try_admit().inspect_err(|e| {
            // The rejected upload would otherwise linger until swept.
            let _ = std::fs::remove_file(&upload_path);
            tracing::warn!(active = e.active, ceiling = e.ceiling, "request rejected at capacity");
        })?;

        let request_id = generate_request_id();
        let started = Instant::now();
        let handle = self
            .supervisor
            .begin(request_id.clone(), permit, self.request_timeout);
        tracing::info!(
            request_id = %request_id,
            active = self.admission.active(),
            max = self.admission.ceiling(),
            "request admitted"
        );

        let (tx, rx) = oneshot::channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let task_id = request_id.clone();
        tokio::spawn(async move {
            let result = orchestrator
                .transform(upload_path, style.as_deref(), prompt.as_deref())
                .await;
            if tx.send(result).is_err() {
                // The deadline already answered the caller.
                tracing::debug!(request_id = %task_id, "late transform outcome discarded");
            }
        });

        tokio::select! {
            outcome = rx => match outcome {
                Ok(Ok(image_id)) => {
                    handle.finish(RequestOutcome::Completed);
                    Ok(TransformReceipt {
                        image_id,
                        request_id,
                        processing_time: started.elapsed(),
                    })
                }
                Ok(Err(e)) => {
                    handle.finish(RequestOutcome::Failed);
                    Err(SubmitError::Transform(e))
                }
                Err(_) => {
                    handle.finish(RequestOutcome::Failed);
                    Err(SubmitError::Transform(TransformError::Internal(
                        "transform task lost".to_string(),
                    )))
                }
            },
            _ = handle.timed_out() => Err(SubmitError::TimedOut(self.request_timeout)),
        }
    }
}
