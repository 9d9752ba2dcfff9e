//! Concrete adapters for the collaborator ports.

pub mod local;
pub mod memory_kv;

pub use local::{ConsoleChatService, Fixture, FixtureProjectService, StaticLanguageModel};
pub use memory_kv::InMemoryKvStore;
