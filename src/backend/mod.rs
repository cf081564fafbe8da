//! Backend abstraction layer
//!
//! Provides common traits and types implemented by the wgpu backend and the
//! headless dummy backend.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::DummyBackend;
pub use traits::*;
pub use types::*;
