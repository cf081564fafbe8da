//! Persistent censor mask generator
//!
//! Renders the censored layers into a long-lived mask once per engine tick
//! and publishes it as [`GLOBAL_CENSOR_MASK`] (with its depth as
//! [`GLOBAL_CENSOR_MASK_DEPTH`]). Effects using the persistent strategy read
//! the published textures instead of rendering their own mask, so the mask
//! may be one tick behind the composite.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::censor::aux_camera::AuxiliaryCamera;
use crate::pipeline::censor::error::{CensorError, CensorResult};
use crate::pipeline::censor::mask::{
    create_mask_pipeline, render_mask, MASK_DEPTH_FORMAT, MASK_FORMAT,
};
use crate::pipeline::censor::settings::{resolve_active_settings, CensorSettings};
use crate::pipeline::geometry::SceneGeometry;
use crate::render_graph::{
    SharedResourceHandle, TargetRef, GLOBAL_CENSOR_MASK, GLOBAL_CENSOR_MASK_DEPTH,
};
use crate::resources::{ShaderLibrary, WHITE_MASK_SHADER};
use crate::scene::{Camera, CameraId, LayerMask, Scene};

pub const DEFAULT_MASK_RESOLUTION: u32 = 1024;

pub struct CensorMaskGenerator {
    camera: AuxiliaryCamera,
    resolution: u32,
    pipeline: Option<RenderPipelineHandle>,
    mask: Option<TargetRef>,
    depth: Option<TargetRef>,
    enabled: bool,
    shader_error_logged: bool,
    multiple_profiles_warned: bool,
    settings: Option<CensorSettings>,
    frames_rendered: u64,
}

fn create_target<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    resolution: u32,
    format: TextureFormat,
) -> BackendResult<TargetRef> {
    let descriptor = TextureDescriptor::render_target(label, resolution, resolution, format);
    let texture = backend.create_texture(&descriptor)?;
    let view = match backend.create_texture_view(texture) {
        Ok(view) => view,
        Err(e) => {
            backend.destroy_texture(texture);
            return Err(e);
        }
    };
    Ok(TargetRef {
        texture: Some(texture),
        view,
        width: resolution,
        height: resolution,
        format,
    })
}

fn destroy_target<B: GraphicsBackend>(backend: &mut B, target: TargetRef) {
    backend.destroy_texture_view(target.view);
    if let Some(texture) = target.texture {
        backend.destroy_texture(texture);
    }
}

impl CensorMaskGenerator {
    /// Generator whose camera follows `main`. `resolution` is the edge
    /// length of the square mask.
    pub fn new(main: &Camera, resolution: u32) -> Self {
        Self {
            camera: AuxiliaryCamera::new(main),
            resolution: resolution.max(1),
            pipeline: None,
            mask: None,
            depth: None,
            enabled: false,
            shader_error_logged: false,
            multiple_profiles_warned: false,
            settings: None,
            frames_rendered: 0,
        }
    }

    pub fn camera(&self) -> &Camera {
        self.camera.camera()
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera.camera().id()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Settings the generator currently renders with
    pub fn active_settings(&self) -> Option<&CensorSettings> {
        self.settings.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn mask_target(&self) -> Option<TargetRef> {
        self.mask
    }

    /// Find the override shader and create the mask targets. A missing
    /// shader leaves the generator disabled and is logged only once.
    pub fn on_enable<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: &SceneGeometry,
        shaders: &ShaderLibrary,
    ) -> CensorResult<()> {
        if self.enabled {
            return Ok(());
        }
        let Some(source) = shaders.find(WHITE_MASK_SHADER) else {
            if !self.shader_error_logged {
                log::error!(
                    "Censor mask generator disabled: shader '{}' not found",
                    WHITE_MASK_SHADER
                );
                self.shader_error_logged = true;
            }
            return Err(CensorError::ShaderNotFound(WHITE_MASK_SHADER.to_string()));
        };

        if let Err(e) = self.allocate(backend, geometry, source) {
            self.destroy(backend);
            return Err(e.into());
        }
        self.enabled = true;
        log::info!("Censor mask generator enabled ({0}x{0})", self.resolution);
        Ok(())
    }

    fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: &SceneGeometry,
        source: &str,
    ) -> BackendResult<()> {
        self.camera.allocate(backend, geometry)?;
        self.pipeline = Some(create_mask_pipeline(
            backend,
            geometry,
            source,
            "Censor Mask Generator Pipeline",
        )?);
        self.mask = Some(create_target(
            backend,
            "Global Censor Mask",
            self.resolution,
            MASK_FORMAT,
        )?);
        self.depth = Some(create_target(
            backend,
            "Global Censor Mask Depth",
            self.resolution,
            MASK_DEPTH_FORMAT,
        )?);
        Ok(())
    }

    /// Pick up the single active censor profile. Profiles that exist but are
    /// disabled or censor no layers empty the mask; the previous configuration
    /// is only kept when no profile exists or several are active.
    fn resolve_settings(&mut self, scene: &Scene) {
        match resolve_active_settings(scene.world()) {
            Ok(Some(settings)) => {
                self.multiple_profiles_warned = false;
                if self.settings.as_ref() != Some(&settings) {
                    log::debug!("Censor mask generator now censors {:?}", settings.censor_layer);
                }
                self.settings = Some(settings);
            }
            Ok(None) => {
                self.multiple_profiles_warned = false;
                let has_profile = scene
                    .world()
                    .iter_entities()
                    .any(|entity| entity.get::<CensorSettings>().is_some());
                if has_profile && self.settings.take().is_some() {
                    log::debug!("Censor mask generator has no active profile, mask is empty");
                }
            }
            Err(e) => {
                if !self.multiple_profiles_warned {
                    log::warn!("{}; keeping the previous censor mask configuration", e);
                    self.multiple_profiles_warned = true;
                }
            }
        }
    }

    /// Render the mask for this tick. Must run inside a frame, before the
    /// frame graph executes.
    pub fn update<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        geometry: &SceneGeometry,
        shared: &SharedResourceHandle,
    ) {
        if !self.enabled {
            return;
        }
        self.resolve_settings(scene);

        let (Some(pipeline), Some(mask), Some(depth), Some(binding)) =
            (self.pipeline, self.mask, self.depth, self.camera.binding().copied())
        else {
            return;
        };

        let layers = self
            .settings
            .as_ref()
            .map_or(LayerMask::EMPTY, |settings| settings.censor_layer);
        self.camera.reconfigure(&scene.camera, layers);
        self.camera.upload(backend);

        let draws = render_mask(
            backend,
            geometry,
            scene,
            pipeline,
            &binding,
            layers,
            mask,
            depth,
            "Censor Mask (Persistent)",
        );
        log::trace!("Persistent censor mask: {} object(s)", draws);

        let mut shared = shared.write();
        shared.publish(GLOBAL_CENSOR_MASK, mask);
        shared.publish(GLOBAL_CENSOR_MASK_DEPTH, depth);
        self.frames_rendered += 1;
    }

    fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(mask) = self.mask.take() {
            destroy_target(backend, mask);
        }
        if let Some(depth) = self.depth.take() {
            destroy_target(backend, depth);
        }
        if let Some(pipeline) = self.pipeline.take() {
            backend.destroy_render_pipeline(pipeline);
        }
        self.camera.release(backend);
    }

    /// Release the targets and withdraw the published textures
    pub fn on_disable<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        shared: &SharedResourceHandle,
    ) {
        {
            let mut shared = shared.write();
            let published = [
                (GLOBAL_CENSOR_MASK, self.mask),
                (GLOBAL_CENSOR_MASK_DEPTH, self.depth),
            ];
            for (name, target) in published {
                if target.is_some() && shared.get(name).map(|p| p.target) == target {
                    shared.retract(name);
                }
            }
        }
        self.destroy(backend);
        if self.enabled {
            log::info!("Censor mask generator disabled");
        }
        self.enabled = false;
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
        scene.add_object(RenderObject::new(0, 0).with_layer(6));
        geometry
            .sync(&mut backend, &scene, &[Mesh::cube()], &[Material::default()])
            .unwrap();
        (backend, geometry, scene)
    }

    fn tick(
        generator: &mut CensorMaskGenerator,
        backend: &mut DummyBackend,
        scene: &Scene,
        geometry: &SceneGeometry,
        shared: &SharedResourceHandle,
    ) {
        shared.write().begin_frame();
        backend.begin_frame().unwrap();
        generator.update(backend, scene, geometry, shared);
        backend.end_frame().unwrap();
    }

    #[test]
    fn publishes_after_first_render_only() {
        let (mut backend, mut geometry, mut scene) = setup();
        let shared = new_shared_resources();
        scene.spawn_profile(CensorSettings::new(LayerMask::layer(5)));

        let mut generator = CensorMaskGenerator::new(&scene.camera, 256);
        generator
            .on_enable(&mut backend, &geometry, &ShaderLibrary::with_builtins())
            .unwrap();
        generator
            .on_enable(&mut backend, &geometry, &ShaderLibrary::with_builtins())
            .unwrap();
        assert_eq!(backend.textures_labelled("Global Censor Mask").len(), 1);
        assert!(!shared.read().contains(GLOBAL_CENSOR_MASK));

        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        let published = shared.read().get_fresh(GLOBAL_CENSOR_MASK).unwrap();
        assert_eq!(published.target.size(), (256, 256));
        assert_eq!(generator.camera().culling_mask, LayerMask::layer(5));
        assert_eq!(backend.stats().passes[0].draws, 1);

        generator.on_disable(&mut backend, &shared);
        generator.on_disable(&mut backend, &shared);
        assert!(!shared.read().contains(GLOBAL_CENSOR_MASK));
        assert!(!shared.read().contains(GLOBAL_CENSOR_MASK_DEPTH));

        geometry.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
        assert!(backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn holds_configuration_without_a_single_profile() {
        let (mut backend, geometry, mut scene) = setup();
        let shared = new_shared_resources();
        let mut generator = CensorMaskGenerator::new(&scene.camera, 64);
        generator
            .on_enable(&mut backend, &geometry, &ShaderLibrary::with_builtins())
            .unwrap();

        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        assert!(generator.active_settings().is_none());

        let first = scene.spawn_profile(CensorSettings::new(LayerMask::layer(5)));
        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        assert_eq!(generator.active_settings().map(|s| s.censor_layer), Some(LayerMask::layer(5)));

        scene.spawn_profile(CensorSettings::new(LayerMask::layer(6)));
        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        assert_eq!(generator.active_settings().map(|s| s.censor_layer), Some(LayerMask::layer(5)));

        scene.despawn_profile(first);
        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        assert_eq!(generator.active_settings().map(|s| s.censor_layer), Some(LayerMask::layer(6)));
        assert_eq!(generator.frames_rendered(), 5);
        generator.on_disable(&mut backend, &shared);
    }

    #[test]
    fn inactive_profile_empties_the_mask() {
        let edits: [fn(&mut CensorSettings); 2] =
            [|s| s.enabled = false, |s| s.censor_layer = LayerMask::EMPTY];
        for edit in edits {
            let (mut backend, geometry, mut scene) = setup();
            let shared = new_shared_resources();
            let mut generator = CensorMaskGenerator::new(&scene.camera, 64);
            generator
                .on_enable(&mut backend, &geometry, &ShaderLibrary::with_builtins())
                .unwrap();
            let profile = scene.spawn_profile(CensorSettings::new(LayerMask::layer(5)));
            tick(&mut generator, &mut backend, &scene, &geometry, &shared);
            assert_eq!(generator.camera().culling_mask, LayerMask::layer(5));

            edit(&mut *scene.profile_mut::<CensorSettings>(profile).unwrap());
            backend.reset_stats();
            tick(&mut generator, &mut backend, &scene, &geometry, &shared);
            assert!(generator.active_settings().is_none());
            assert_eq!(generator.camera().culling_mask, LayerMask::EMPTY);
            assert_eq!(backend.stats().passes[0].draws, 0);
            generator.on_disable(&mut backend, &shared);
        }
    }

    #[test]
    fn missing_shader_keeps_generator_disabled() {
        let (mut backend, geometry, scene) = setup();
        let shared = new_shared_resources();
        let live = backend.live_resources();
        let mut generator = CensorMaskGenerator::new(&scene.camera, 64);

        for _ in 0..2 {
            let result = generator.on_enable(&mut backend, &geometry, &ShaderLibrary::empty());
            assert!(matches!(result, Err(CensorError::ShaderNotFound(_))));
        }
        assert!(!generator.is_enabled());
        assert_eq!(backend.live_resources(), live);

        tick(&mut generator, &mut backend, &scene, &geometry, &shared);
        assert!(backend.stats().passes.is_empty());
        assert!(shared.read().is_empty());
    }

    #[test]
    fn failed_allocation_releases_partial_state() {
        let (mut backend, geometry, scene) = setup();
        let live = backend.live_resources();
        backend.fail_pipeline("Censor Mask Generator Pipeline");
        let mut generator = CensorMaskGenerator::new(&scene.camera, 64);
        let result = generator.on_enable(&mut backend, &geometry, &ShaderLibrary::with_builtins());
        assert!(matches!(result, Err(CensorError::Backend(_))));
        assert_eq!(backend.live_resources(), live);
    }
}
