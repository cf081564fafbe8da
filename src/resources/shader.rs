//! Named shader sources.
//!
//! Effects look their shaders up by name at initialization. A name that is
//! missing from the library is the same as a shader that failed to ship.

use crate::pipeline::censor::shaders;
use std::collections::HashMap;

/// Pixelation composite used by the censor effect
pub const CENSOR_COMPOSITE_SHADER: &str = "hidden/censor_effect/censor";

/// Override shader that draws every fragment solid white
pub const WHITE_MASK_SHADER: &str = "hidden/censor_effect/white_mask";

#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    sources: HashMap<String, String>,
}

impl ShaderLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Library holding every shader the crate ships
    pub fn with_builtins() -> Self {
        let mut library = Self::empty();
        library.register(CENSOR_COMPOSITE_SHADER, shaders::CENSOR_COMPOSITE_WGSL);
        library.register(WHITE_MASK_SHADER, shaders::WHITE_MASK_WGSL);
        library
    }

    /// Add or replace a shader. Returns the previous source, if any.
    pub fn register(&mut self, name: &str, source: &str) -> Option<String> {
        self.sources.insert(name.to_string(), source.to_string())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.sources.remove(name)
    }

    pub fn find(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
