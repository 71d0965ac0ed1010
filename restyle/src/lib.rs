//! restyle: bounded-concurrency image restyle server.
//!
//! Accepts a photo upload, resolves a canned prompt from a style key,
//! forwards both to an image-generation provider, and serves the stored
//! result. The core is the admission/lifecycle layer wrapping the provider
//! call: a fixed slot ceiling, a per-request deadline, and exactly-once
//! slot release on every exit path.

pub mod admission;
pub mod artifacts;
pub mod config;
pub mod normalize;
pub mod provider;
pub mod service;
pub mod styles;
pub mod supervisor;
pub mod sweeper;
pub mod transform;
pub mod transport;

pub use admission::{AdmissionController, CapacityExceeded, SlotPermit};
pub use artifacts::ArtifactStore;
pub use config::Config;
pub use provider::{
    GeneratedImage, GenerationError, GenerationRequest, ImageGenerator, OpenAiImages,
};
pub use service::{SubmitError, TransformReceipt, TransformService};
pub use styles::StyleCatalog;
pub use supervisor::{RequestHandle, RequestOutcome, RequestSupervisor};
pub use transform::{TransformError, TransformOrchestrator};
