//! Hidden camera that renders censor masks

use crate::backend::traits::*;
use crate::pipeline::geometry::{CameraBinding, SceneGeometry};
use crate::scene::{Camera, ClearFlags, LayerMask};

/// Solid transparent black; the mask starts out uncovered
pub const MASK_CLEAR: ClearFlags = ClearFlags::SolidColor([0.0, 0.0, 0.0, 0.0]);

/// A camera that follows another camera's view but only sees the censored
/// layers. Owns its uniform buffer once allocated.
pub struct AuxiliaryCamera {
    camera: Camera,
    binding: Option<CameraBinding>,
}

impl AuxiliaryCamera {
    /// Starts out culling everything and ordered right before `source`
    pub fn new(source: &Camera) -> Self {
        let mut camera = Camera::default()
            .with_culling_mask(LayerMask::EMPTY)
            .with_clear(MASK_CLEAR);
        camera.copy_view_from(source);
        camera.depth = source.depth - 1.0;
        Self { camera, binding: None }
    }

    /// Mirror the pose and projection of `from_view` and cull to `culling`.
    /// The clear is forced back to transparent black every time.
    pub fn reconfigure(&mut self, from_view: &Camera, culling: LayerMask) {
        self.camera.copy_view_from(from_view);
        self.camera.culling_mask = culling;
        self.camera.clear = MASK_CLEAR;
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn culling_mask(&self) -> LayerMask {
        self.camera.culling_mask
    }

    pub fn is_allocated(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&CameraBinding> {
        self.binding.as_ref()
    }

    pub fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: &SceneGeometry,
    ) -> BackendResult<()> {
        if self.binding.is_none() {
            let binding = geometry.create_camera_binding(backend, "Censor Mask Camera Buffer")?;
            self.binding = Some(binding);
        }
        Ok(())
    }

    /// Write the current view to the GPU. No-op until allocated.
    pub fn upload<B: GraphicsBackend>(&self, backend: &mut B) {
        if let Some(binding) = &self.binding {
            SceneGeometry::write_camera(backend, binding, &self.camera);
        }
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(binding) = self.binding.take() {
            SceneGeometry::destroy_camera_binding(backend, binding);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, TextureFormat};
    use crate::scene::Projection;
    use glam::Vec3;

    #[test]
    fn mirrors_source_view() {
        let mut main = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO)
            .with_projection(Projection::perspective(70.0, 2.0, 0.3, 50.0));
        main.depth = 4.0;

        let mut aux = AuxiliaryCamera::new(&main);
        assert_eq!(aux.camera().depth, 3.0);
        assert!(aux.culling_mask().is_empty());
        assert_ne!(aux.camera().id(), main.id());

        main.set_position(Vec3::new(-5.0, 0.0, 0.0));
        aux.camera.clear = ClearFlags::Nothing;
        aux.reconfigure(&main, LayerMask::layer(5));
        assert_eq!(aux.camera().position, main.position);
        assert_eq!(aux.camera().projection_matrix(), main.projection_matrix());
        assert_eq!(aux.culling_mask(), LayerMask::layer(5));
        assert_eq!(aux.camera().clear, MASK_CLEAR);
    }

    #[test]
    fn release_is_idempotent() {
        let mut backend = DummyBackend::new(8, 8);
        let mut geometry = SceneGeometry::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
        let buffers = backend.live_buffers();

        let mut aux = AuxiliaryCamera::new(&Camera::default());
        aux.allocate(&mut backend, &geometry).unwrap();
        aux.allocate(&mut backend, &geometry).unwrap();
        assert_eq!(backend.live_buffers(), buffers + 1);
        aux.upload(&mut backend);

        aux.release(&mut backend);
        aux.release(&mut backend);
        assert!(!aux.is_allocated());
        assert_eq!(backend.live_buffers(), buffers);

        geometry.release(&mut backend);
        assert!(backend.stats().validation_errors.is_empty());
    }
}
