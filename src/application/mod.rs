// Application layer - use cases and orchestration.
// The service owns the engine, serializes every operation and
// persists its effects through the repository.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
