//! Ports (abstract interfaces) for external collaborators.
//!
//! Everything outside the orchestration core (the project-management
//! service, chat, the language model, and the persistent key-value store)
//! is consumed through these traits so the core stays testable with mocks.

pub mod chat_service;
pub mod errors;
pub mod kv_store;
pub mod llm_service;
pub mod project_service;

pub use chat_service::{ChatService, MessagePayload};
pub use errors::{CollaboratorError, StoreError};
pub use kv_store::KeyValueStore;
pub use llm_service::{CompletionParams, LanguageModel};
pub use project_service::{ProjectService, TaskPatch};
