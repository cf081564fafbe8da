//! Resource management
//!
//! Meshes, materials and the named shader library.

mod material;
mod mesh;
mod shader;

pub use material::*;
pub use mesh::*;
pub use shader::*;
