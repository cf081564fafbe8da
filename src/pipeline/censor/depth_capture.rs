//! Main camera depth snapshot for hard-edge censoring

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{
    CameraCommand, CommandContext, SharedResourceHandle, TargetRef, CENSOR_DEPTH_TEXTURE,
};
use std::any::Any;
use std::marker::PhantomData;

/// Copies the camera depth right after the depth prepass and publishes the
/// copy as [`CENSOR_DEPTH_TEXTURE`]. The snapshot is overwritten every frame.
pub struct DepthCapture<B> {
    snapshot: Option<TargetRef>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: GraphicsBackend + 'static> DepthCapture<B> {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            _backend: PhantomData,
        }
    }

    fn destroy_snapshot(&mut self, backend: &mut B) {
        if let Some(snapshot) = self.snapshot.take() {
            backend.destroy_texture_view(snapshot.view);
            if let Some(texture) = snapshot.texture {
                backend.destroy_texture(texture);
            }
        }
    }

    /// Snapshot matching `depth`, recreated when the size or format changes
    fn ensure_snapshot(&mut self, backend: &mut B, depth: &TargetRef) -> BackendResult<TargetRef> {
        if let Some(snapshot) = self.snapshot {
            if snapshot.size() == depth.size() && snapshot.format == depth.format {
                return Ok(snapshot);
            }
            self.destroy_snapshot(backend);
        }

        let desc = TextureDescriptor {
            label: Some("Censor Depth Snapshot".into()),
            width: depth.width,
            height: depth.height,
            depth: 1,
            mip_levels: 1,
            format: depth.format,
            usage: TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
        };
        let texture = backend.create_texture(&desc)?;
        let view = match backend.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };
        let snapshot = TargetRef {
            texture: Some(texture),
            view,
            width: depth.width,
            height: depth.height,
            format: depth.format,
        };
        self.snapshot = Some(snapshot);
        Ok(snapshot)
    }
}

impl<B: GraphicsBackend + 'static> Default for DepthCapture<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend + 'static> CameraCommand for DepthCapture<B> {
    fn name(&self) -> &str {
        "Censor Depth Capture"
    }

    fn execute(&mut self, ctx: &mut CommandContext) {
        let Some(depth) = ctx.depth else {
            return;
        };
        let Some(source) = depth.texture else {
            log::warn!("Camera depth has no backing texture, cannot capture it");
            return;
        };
        let shared = ctx.shared;
        let Some(backend) = ctx.backend::<B>() else {
            return;
        };
        let snapshot = match self.ensure_snapshot(backend, &depth) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Failed to allocate depth snapshot: {}", e);
                return;
            }
        };
        let Some(destination) = snapshot.texture else {
            return;
        };
        backend.copy_texture_to_texture(source, destination, depth.width, depth.height);
        shared.write().publish(CENSOR_DEPTH_TEXTURE, snapshot);
    }

    fn dispose(&mut self, backend: &mut dyn Any, shared: &SharedResourceHandle) {
        if let Some(snapshot) = self.snapshot {
            let mut shared = shared.write();
            if shared.get(CENSOR_DEPTH_TEXTURE).is_some_and(|p| p.target == snapshot) {
                shared.retract(CENSOR_DEPTH_TEXTURE);
            }
        }
        if let Some(backend) = backend.downcast_mut::<B>() {
            self.destroy_snapshot(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::pipeline::depth_prepass::scene_depth_descriptor;
    use crate::render_graph::new_shared_resources;
    use crate::scene::Camera;

    fn depth_target(backend: &mut DummyBackend, width: u32, height: u32) -> TargetRef {
        let texture = backend.create_texture(&scene_depth_descriptor(width, height)).unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        TargetRef {
            texture: Some(texture),
            view,
            width,
            height,
            format: TextureFormat::Depth32Float,
        }
    }

    #[test]
    fn publishes_snapshot_and_retracts_on_dispose() {
        let mut backend = DummyBackend::new(64, 32);
        let shared = new_shared_resources();
        let camera = Camera::default();
        let depth = depth_target(&mut backend, 64, 32);
        let mut capture = DepthCapture::<DummyBackend>::new();

        shared.write().begin_frame();
        {
            let mut ctx = CommandContext {
                backend: &mut backend,
                camera: &camera,
                depth: Some(depth),
                color: None,
                shared: &shared,
            };
            capture.execute(&mut ctx);
            capture.execute(&mut ctx);
        }

        let published = shared.read().get_fresh(CENSOR_DEPTH_TEXTURE).unwrap();
        assert_eq!(published.target.size(), (64, 32));
        assert_ne!(published.target.texture, depth.texture);
        assert_eq!(backend.stats().copies.len(), 2);
        assert_eq!(backend.textures_labelled("Censor Depth Snapshot").len(), 1);

        capture.dispose(&mut backend, &shared);
        capture.dispose(&mut backend, &shared);
        assert!(!shared.read().contains(CENSOR_DEPTH_TEXTURE));
        assert!(backend.textures_labelled("Censor Depth Snapshot").is_empty());
        assert!(backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn snapshot_follows_resize() {
        let mut backend = DummyBackend::new(64, 32);
        let shared = new_shared_resources();
        let camera = Camera::default();
        let mut capture = DepthCapture::<DummyBackend>::new();

        for (width, height) in [(64, 32), (128, 64)] {
            let depth = depth_target(&mut backend, width, height);
            let mut ctx = CommandContext {
                backend: &mut backend,
                camera: &camera,
                depth: Some(depth),
                color: None,
                shared: &shared,
            };
            capture.execute(&mut ctx);
        }

        assert_eq!(backend.textures_labelled("Censor Depth Snapshot").len(), 1);
        let published = shared.read().get(CENSOR_DEPTH_TEXTURE).unwrap();
        assert_eq!(published.target.size(), (128, 64));
        capture.dispose(&mut backend, &shared);
    }
}
