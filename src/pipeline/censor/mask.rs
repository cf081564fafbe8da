//! Coverage mask production
//!
//! A mask is an `R8Unorm` image that is 1 wherever geometry on a censored
//! layer is visible and 0 elsewhere, plus the depth the mask pass rendered
//! with. It comes either from a per-frame render through an auxiliary camera
//! or from the persistent generator's published textures.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::censor::aux_camera::AuxiliaryCamera;
use crate::pipeline::censor::error::{CensorError, CensorResult};
use crate::pipeline::censor::settings::CensorSettings;
use crate::pipeline::geometry::{CameraBinding, SceneGeometry};
use crate::render_graph::{
    SharedResourceHandle, TargetRef, TempTarget, TemporaryTargets, GLOBAL_CENSOR_MASK,
    GLOBAL_CENSOR_MASK_DEPTH,
};
use crate::resources::{ShaderLibrary, WHITE_MASK_SHADER};
use crate::scene::{LayerMask, Scene};

pub const MASK_FORMAT: TextureFormat = TextureFormat::R8Unorm;
pub const MASK_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Where the coverage mask comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskStrategy {
    /// Rendered into temporaries every frame, at screen size
    Ephemeral,
    /// Read from the textures published by the mask generator
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeMode {
    Soft,
    /// Coverage is cropped to the silhouette with the scene depth
    Hard,
}

/// Which of the four mask paths an effect takes this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskVariant {
    pub strategy: MaskStrategy,
    pub edges: EdgeMode,
}

impl MaskVariant {
    pub fn new(strategy: MaskStrategy, settings: &CensorSettings) -> Self {
        Self {
            strategy,
            edges: if settings.hard_edges { EdgeMode::Hard } else { EdgeMode::Soft },
        }
    }
}

/// A mask ready to be sampled. Temporaries it holds go back to the pool with
/// [`MaskFrame::release`].
pub struct MaskFrame {
    pub mask: TargetRef,
    pub depth: TargetRef,
    temps: Vec<TempTarget>,
}

impl MaskFrame {
    pub fn release(self, temporaries: &mut TemporaryTargets) {
        for temp in self.temps {
            temporaries.release(temp);
        }
    }
}

/// Pipeline drawing scene objects with the white override shader into an
/// `R8Unorm` target with its own depth.
pub fn create_mask_pipeline<B: GraphicsBackend>(
    backend: &mut B,
    geometry: &SceneGeometry,
    source: &str,
    label: &str,
) -> BackendResult<RenderPipelineHandle> {
    backend.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label.into()),
        vertex_shader: source.into(),
        fragment_shader: Some(source.into()),
        vertex_layouts: vec![Vertex::layout()],
        bind_group_layouts: vec![geometry.camera_layout(), geometry.object_layout()],
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: FrontFace::Ccw,
        cull_mode: CullMode::Back,
        depth_stencil: Some(DepthStencilState {
            format: MASK_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
        }),
        color_targets: vec![ColorTargetState {
            format: MASK_FORMAT,
            write_mask: ColorWrites::ALL,
        }],
    })
}

/// Clear `mask` to black and draw every object on `layers` into it.
/// Returns the number of objects drawn.
#[allow(clippy::too_many_arguments)]
pub fn render_mask<B: GraphicsBackend>(
    backend: &mut B,
    geometry: &SceneGeometry,
    scene: &Scene,
    pipeline: RenderPipelineHandle,
    camera: &CameraBinding,
    layers: LayerMask,
    mask: TargetRef,
    depth: TargetRef,
    label: &str,
) -> usize {
    backend.begin_render_pass(&RenderPassDescriptor {
        label: Some(label.into()),
        color_attachments: vec![ColorAttachment {
            view: mask.view,
            load_op: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
            store_op: StoreOp::Store,
        }],
        depth_stencil_attachment: Some(DepthStencilAttachment {
            view: depth.view,
            depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
            depth_store_op: StoreOp::Store,
            depth_clear_value: 1.0,
        }),
    });
    backend.set_viewport(0.0, 0.0, mask.width as f32, mask.height as f32, 0.0, 1.0);
    backend.set_render_pipeline(pipeline);
    backend.set_bind_group(0, camera.bind_group);
    let draws = geometry.draw_objects(backend, scene, layers, false);
    backend.end_render_pass();
    draws
}

/// Per-frame mask rendering through an auxiliary camera
pub struct EphemeralMask {
    camera: AuxiliaryCamera,
    pipeline: Option<RenderPipelineHandle>,
}

impl EphemeralMask {
    pub fn camera(&self) -> &AuxiliaryCamera {
        &self.camera
    }

    fn acquire<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        geometry: &SceneGeometry,
        temporaries: &mut TemporaryTargets,
        layers: LayerMask,
        (width, height): (u32, u32),
    ) -> Option<MaskFrame> {
        let pipeline = self.pipeline?;
        self.camera.reconfigure(&scene.camera, layers);
        self.camera.upload(backend);
        let binding = *self.camera.binding()?;

        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let mask = match temporaries.acquire(
            backend,
            "Censor Mask",
            width,
            height,
            MASK_FORMAT,
            usage,
        ) {
            Ok(mask) => mask,
            Err(e) => {
                log::error!("Failed to allocate censor mask: {}", e);
                return None;
            }
        };
        let depth = match temporaries.acquire(
            backend,
            "Censor Mask Depth",
            width,
            height,
            MASK_DEPTH_FORMAT,
            usage,
        ) {
            Ok(depth) => depth,
            Err(e) => {
                log::error!("Failed to allocate censor mask depth: {}", e);
                temporaries.release(mask);
                return None;
            }
        };

        let draws = render_mask(
            backend,
            geometry,
            scene,
            pipeline,
            &binding,
            layers,
            mask.as_target(),
            depth.as_target(),
            "Censor Mask (Ephemeral)",
        );
        log::trace!("Ephemeral censor mask: {} object(s)", draws);

        Some(MaskFrame {
            mask: mask.as_target(),
            depth: depth.as_target(),
            temps: vec![mask, depth],
        })
    }
}

/// Tagged mask strategy owned by a censor effect
pub enum MaskSource {
    Ephemeral(EphemeralMask),
    Persistent,
}

impl MaskSource {
    pub fn new(strategy: MaskStrategy, scene: &Scene) -> Self {
        match strategy {
            MaskStrategy::Ephemeral => MaskSource::Ephemeral(EphemeralMask {
                camera: AuxiliaryCamera::new(&scene.camera),
                pipeline: None,
            }),
            MaskStrategy::Persistent => MaskSource::Persistent,
        }
    }

    pub fn strategy(&self) -> MaskStrategy {
        match self {
            MaskSource::Ephemeral(_) => MaskStrategy::Ephemeral,
            MaskSource::Persistent => MaskStrategy::Persistent,
        }
    }

    /// Resolve the override shader and allocate the auxiliary camera. The
    /// persistent source has nothing to set up.
    pub fn initialize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: &SceneGeometry,
        shaders: &ShaderLibrary,
    ) -> CensorResult<()> {
        let MaskSource::Ephemeral(ephemeral) = self else {
            return Ok(());
        };
        let source = shaders
            .find(WHITE_MASK_SHADER)
            .ok_or_else(|| CensorError::ShaderNotFound(WHITE_MASK_SHADER.to_string()))?;
        ephemeral.camera.allocate(backend, geometry)?;
        if ephemeral.pipeline.is_none() {
            let pipeline = create_mask_pipeline(backend, geometry, source, "Censor Mask Pipeline")?;
            ephemeral.pipeline = Some(pipeline);
        }
        Ok(())
    }

    /// Produce this frame's mask, or `None` when there is none to read
    #[allow(clippy::too_many_arguments)]
    pub fn acquire<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        geometry: &SceneGeometry,
        shared: &SharedResourceHandle,
        temporaries: &mut TemporaryTargets,
        layers: LayerMask,
        size: (u32, u32),
    ) -> Option<MaskFrame> {
        match self {
            MaskSource::Ephemeral(ephemeral) => {
                ephemeral.acquire(backend, scene, geometry, temporaries, layers, size)
            }
            MaskSource::Persistent => {
                let shared = shared.read();
                let mask = shared.get(GLOBAL_CENSOR_MASK)?;
                let depth = shared.get(GLOBAL_CENSOR_MASK_DEPTH)?;
                Some(MaskFrame {
                    mask: mask.target,
                    depth: depth.target,
                    temps: Vec::new(),
                })
            }
        }
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let MaskSource::Ephemeral(ephemeral) = self {
            if let Some(pipeline) = ephemeral.pipeline.take() {
                backend.destroy_render_pipeline(pipeline);
            }
            ephemeral.camera.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::render_graph::new_shared_resources;
    use crate::resources::{Material, Mesh};
    use crate::scene::RenderObject;

    fn setup() -> (DummyBackend, SceneGeometry, Scene) {
        let mut backend = DummyBackend::new(32, 32);
        let mut geometry = SceneGeometry::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
        let mut scene = Scene::new();
        scene.add_object(RenderObject::new(0, 0).with_layer(5));
        scene.add_object(RenderObject::new(0, 0).with_layer(1));
        geometry
            .sync(&mut backend, &scene, &[Mesh::cube()], &[Material::default()])
            .unwrap();
        (backend, geometry, scene)
    }

    #[test]
    fn ephemeral_mask_draws_censored_layers_only() {
        let (mut backend, mut geometry, scene) = setup();
        let shared = new_shared_resources();
        let mut temporaries = TemporaryTargets::new();
        let mut source = MaskSource::new(MaskStrategy::Ephemeral, &scene);
        source
            .initialize(&mut backend, &geometry, &ShaderLibrary::with_builtins())
            .unwrap();

        backend.begin_frame().unwrap();
        let frame = source
            .acquire(
                &mut backend,
                &scene,
                &geometry,
                &shared,
                &mut temporaries,
                LayerMask::layer(5),
                (32, 32),
            )
            .unwrap();
        assert_eq!(frame.mask.format, MASK_FORMAT);
        assert_eq!(frame.depth.format, MASK_DEPTH_FORMAT);
        assert_eq!(temporaries.outstanding(), 2);
        frame.release(&mut temporaries);
        temporaries.end_frame(&mut backend);
        backend.end_frame().unwrap();

        let pass = &backend.stats().passes[0];
        assert_eq!(pass.label, "Censor Mask (Ephemeral)");
        assert_eq!(pass.draws, 1);
        assert_eq!(temporaries.outstanding(), 0);

        source.release(&mut backend);
        source.release(&mut backend);
        temporaries.clear(&mut backend);
        geometry.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn missing_override_shader_is_reported() {
        let (mut backend, geometry, scene) = setup();
        let mut source = MaskSource::new(MaskStrategy::Ephemeral, &scene);
        let result = source.initialize(&mut backend, &geometry, &ShaderLibrary::empty());
        assert!(matches!(
            result,
            Err(CensorError::ShaderNotFound(name)) if name == WHITE_MASK_SHADER
        ));
    }

    #[test]
    fn persistent_mask_needs_published_textures() {
        let (mut backend, geometry, scene) = setup();
        let shared = new_shared_resources();
        let mut temporaries = TemporaryTargets::new();
        let mut source = MaskSource::new(MaskStrategy::Persistent, &scene);
        assert_eq!(source.strategy(), MaskStrategy::Persistent);

        let acquired = source.acquire(
            &mut backend,
            &scene,
            &geometry,
            &shared,
            &mut temporaries,
            LayerMask::layer(5),
            (32, 32),
        );
        assert!(acquired.is_none());
    }
}
