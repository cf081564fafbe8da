//! Named textures shared between passes, camera commands and effects.
//!
//! Producers publish a [`TargetRef`] under a well-known name; consumers look it
//! up for the current frame. Every record carries the frame it was published
//! in, so a reader can tell a fresh snapshot from a stale one.

use crate::render_graph::resource::TargetRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Coverage mask published by the persistent mask generator
pub const GLOBAL_CENSOR_MASK: &str = "_GlobalCensorMask";

/// Depth rendered alongside the persistent coverage mask
pub const GLOBAL_CENSOR_MASK_DEPTH: &str = "_GlobalCensorMaskDepth";

/// Snapshot of the main camera depth buffer
pub const CENSOR_DEPTH_TEXTURE: &str = "_CensorDepthTexture";

/// A texture published under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedTexture {
    pub target: TargetRef,
    /// Frame in which the texture was last written
    pub frame: u64,
}

#[derive(Debug, Default)]
pub struct SharedResources {
    textures: HashMap<String, PublishedTexture>,
    frame: u64,
}

/// Handle passed through render contexts instead of process-wide globals
pub type SharedResourceHandle = Arc<RwLock<SharedResources>>;

pub fn new_shared_resources() -> SharedResourceHandle {
    Arc::new(RwLock::new(SharedResources::default()))
}

impl SharedResources {
    /// Advance to the next frame and return its number
    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Publish (or overwrite) a texture, stamped with the current frame
    pub fn publish(&mut self, name: &str, target: TargetRef) {
        log::trace!("Publishing {} for frame {}", name, self.frame);
        self.textures.insert(
            name.to_string(),
            PublishedTexture {
                target,
                frame: self.frame,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<PublishedTexture> {
        self.textures.get(name).copied()
    }

    /// Only returns the texture if it was written during the current frame
    pub fn get_fresh(&self, name: &str) -> Option<PublishedTexture> {
        self.get(name).filter(|published| published.frame == self.frame)
    }

    pub fn retract(&mut self, name: &str) -> Option<PublishedTexture> {
        self.textures.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TextureFormat, TextureHandle, TextureViewHandle};

    fn target(id: u64) -> TargetRef {
        TargetRef {
            texture: Some(TextureHandle(id)),
            view: TextureViewHandle(id + 1),
            width: 16,
            height: 16,
            format: TextureFormat::Depth32Float,
        }
    }

    #[test]
    fn fresh_only_within_publishing_frame() {
        let shared = new_shared_resources();
        shared.write().begin_frame();
        shared.write().publish(CENSOR_DEPTH_TEXTURE, target(1));
        assert!(shared.read().get_fresh(CENSOR_DEPTH_TEXTURE).is_some());

        shared.write().begin_frame();
        assert!(shared.read().get_fresh(CENSOR_DEPTH_TEXTURE).is_none());
        assert_eq!(shared.read().get(CENSOR_DEPTH_TEXTURE).map(|p| p.frame), Some(1));
    }

    #[test]
    fn publish_overwrites_and_retract_clears() {
        let mut shared = SharedResources::default();
        shared.publish(GLOBAL_CENSOR_MASK, target(1));
        shared.publish(GLOBAL_CENSOR_MASK, target(5));
        assert_eq!(shared.len(), 1);
        assert_eq!(
            shared.get(GLOBAL_CENSOR_MASK).map(|p| p.target.texture),
            Some(Some(TextureHandle(5)))
        );
        assert!(shared.retract(GLOBAL_CENSOR_MASK).is_some());
        assert!(shared.retract(GLOBAL_CENSOR_MASK).is_none());
        assert!(shared.is_empty());
    }
}
