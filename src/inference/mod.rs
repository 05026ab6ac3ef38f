pub mod client;
pub mod envelope;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod traits;

pub use client::InferenceClient;
pub use envelope::PromptEnvelope;
pub use orchestrator::CompletionOrchestrator;
pub use registry::{ClientHandle, CredentialRegistry, CredentialSource};
pub use traits::{ChunkStream, CompletionBackend};
