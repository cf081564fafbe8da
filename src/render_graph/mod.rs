//! Render Graph System
//!
//! A declarative system for defining render passes as a directed acyclic graph (DAG).
//! The graph handles resource allocation, pass ordering, camera events and
//! temporary targets during execution.

pub mod events;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;
pub mod shared;
pub mod temporary;

pub use events::*;
pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
pub use shared::*;
pub use temporary::*;
