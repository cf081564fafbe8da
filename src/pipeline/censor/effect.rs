//! The censor post effect
//!
//! Per frame the effect gets a coverage mask from its [`MaskSource`], then
//! composites the pixelated image over the source wherever the mask is set.
//! Anything that keeps the composite from running degrades to a passthrough
//! of the source, never to an error reaching the host.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::censor::composite::{CensorParams, CompositeInputs, CompositePipeline};
use crate::pipeline::censor::depth_capture::DepthCapture;
use crate::pipeline::censor::error::CensorResult;
use crate::pipeline::censor::mask::{EdgeMode, MaskSource, MaskStrategy, MaskVariant};
use crate::pipeline::censor::settings::CensorSettings;
use crate::pipeline::postprocess::{EffectPrepareContext, PostProcessContext, PostProcessEffect};
use crate::render_graph::{
    CameraCommands, CameraEvent, CommandId, SharedResourceHandle, TargetRef, TempTarget,
    CENSOR_DEPTH_TEXTURE,
};
use crate::scene::{CameraId, Scene};
use bevy_ecs::entity::Entity;
use std::any::Any;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Uninitialized,
    Ready,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// Shaders or GPU resources could not be set up
    NotInitialized,
    Disposed,
    ProfileMissing,
    MaskUnavailable,
    /// Source and destination alias and the source cannot be copied
    SourceNotCopyable,
    RenderFailed,
}

/// What the effect wrote to its destination in the last frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOutcome {
    Passthrough(PassthroughReason),
    /// Raw coverage mask, for debugging
    Mask,
    Composite,
}

/// Depth capture command attached on behalf of the effect
#[derive(Debug, Clone, Copy)]
struct AttachedCapture {
    command: CommandId,
    camera: CameraId,
}

pub struct CensorEffect<B> {
    profile: Entity,
    strategy: MaskStrategy,
    state: EffectState,
    init_failed: bool,
    mask: Option<MaskSource>,
    composite: Option<CompositePipeline>,
    depth_capture: Option<AttachedCapture>,
    last_outcome: Option<CompositeOutcome>,
    _backend: PhantomData<fn() -> B>,
}

impl<B: GraphicsBackend + 'static> CensorEffect<B> {
    /// Effect driven by the [`CensorSettings`] on `profile`
    pub fn new(profile: Entity, strategy: MaskStrategy) -> Self {
        Self {
            profile,
            strategy,
            state: EffectState::Uninitialized,
            init_failed: false,
            mask: None,
            composite: None,
            depth_capture: None,
            last_outcome: None,
            _backend: PhantomData,
        }
    }

    pub fn profile(&self) -> Entity {
        self.profile
    }

    pub fn strategy(&self) -> MaskStrategy {
        self.strategy
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<CompositeOutcome> {
        self.last_outcome
    }

    pub fn is_depth_capture_attached(&self) -> bool {
        self.depth_capture.is_some()
    }

    /// Mask path the effect takes for the current settings
    pub fn variant(&self, scene: &Scene) -> Option<MaskVariant> {
        self.settings(scene).map(|settings| MaskVariant::new(self.strategy, settings))
    }

    fn settings<'s>(&self, scene: &'s Scene) -> Option<&'s CensorSettings> {
        scene.profile::<CensorSettings>(self.profile)
    }

    fn initialize(&mut self, ctx: &mut EffectPrepareContext<B>) -> CensorResult<()> {
        let strategy = self.strategy;
        let mask = self.mask.get_or_insert_with(|| MaskSource::new(strategy, ctx.scene));
        mask.initialize(ctx.backend, ctx.geometry, ctx.shaders)?;
        if self.composite.is_none() {
            self.composite = Some(CompositePipeline::new(
                ctx.backend,
                ctx.shaders,
                ctx.color_format,
            )?);
        }
        Ok(())
    }

    fn release_resources(&mut self, backend: &mut B) {
        if let Some(mut mask) = self.mask.take() {
            mask.release(backend);
        }
        if let Some(mut composite) = self.composite.take() {
            composite.release(backend);
        }
    }

    fn detach_depth_capture(
        &mut self,
        backend: &mut B,
        commands: &mut CameraCommands,
        shared: &SharedResourceHandle,
    ) {
        let Some(attached) = self.depth_capture.take() else {
            return;
        };
        if let Some(mut command) = commands.detach(attached.command) {
            command.dispose(backend, shared);
        }
    }

    /// Keep exactly one depth capture on the active camera while hard edges
    /// are wanted
    fn sync_depth_capture(&mut self, ctx: &mut EffectPrepareContext<B>, wanted: bool) {
        let camera = ctx.scene.camera.id();
        match self.depth_capture {
            Some(attached) if wanted && attached.camera == camera => return,
            Some(_) => self.detach_depth_capture(ctx.backend, ctx.commands, ctx.shared),
            None => {}
        }
        if wanted {
            let command = ctx.commands.attach(
                camera,
                CameraEvent::AfterDepthTexture,
                Box::new(DepthCapture::<B>::new()),
            );
            self.depth_capture = Some(AttachedCapture { command, camera });
        }
    }

    fn composite(
        &mut self,
        ctx: &mut PostProcessContext<B>,
        source: TargetRef,
        destination: TargetRef,
    ) -> CompositeOutcome {
        use PassthroughReason::*;

        match self.state {
            EffectState::Disposed => return CompositeOutcome::Passthrough(Disposed),
            EffectState::Uninitialized => return CompositeOutcome::Passthrough(NotInitialized),
            EffectState::Ready => {}
        }
        let Some(settings) = self.settings(ctx.scene).cloned() else {
            return CompositeOutcome::Passthrough(ProfileMissing);
        };
        let (Some(mask_source), Some(composite)) = (self.mask.as_mut(), self.composite.as_mut())
        else {
            return CompositeOutcome::Passthrough(NotInitialized);
        };

        let aliased = source.aliases(&destination);
        if aliased && source.texture.is_none() {
            return CompositeOutcome::Passthrough(SourceNotCopyable);
        }

        let Some(mask) = mask_source.acquire(
            ctx.backend,
            ctx.scene,
            ctx.geometry,
            ctx.shared,
            ctx.temporaries,
            settings.censor_layer,
            source.size(),
        ) else {
            return CompositeOutcome::Passthrough(MaskUnavailable);
        };

        let mut params = CensorParams::new(
            &settings,
            source.size(),
            mask.mask.size(),
            &ctx.scene.camera.projection,
        );
        let mut scene_depth = None;
        if MaskVariant::new(self.strategy, &settings).edges == EdgeMode::Hard {
            scene_depth = ctx.shared.read().get_fresh(CENSOR_DEPTH_TEXTURE).map(|p| p.target);
            if scene_depth.is_none() {
                log::debug!("No depth snapshot this frame, censoring with soft edges");
                params = params.without_hard_edges();
            }
        }

        // Reading and writing the same image needs a copy of the source
        let mut source_copy: Option<TempTarget> = None;
        let mut input = source;
        if aliased {
            let copy = ctx.temporaries.acquire(
                ctx.backend,
                "Censor Source Copy",
                source.width,
                source.height,
                source.format,
                TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_DST,
            );
            match (copy, source.texture) {
                (Ok(copy), Some(texture)) => {
                    ctx.backend.copy_texture_to_texture(
                        texture,
                        copy.texture(),
                        source.width,
                        source.height,
                    );
                    input = copy.as_target();
                    source_copy = Some(copy);
                }
                (Ok(copy), None) => ctx.temporaries.release(copy),
                (Err(e), _) => log::error!("Failed to allocate censor source copy: {}", e),
            }
            if source_copy.is_none() {
                mask.release(ctx.temporaries);
                return CompositeOutcome::Passthrough(RenderFailed);
            }
        }

        let inputs = CompositeInputs {
            source: input,
            mask: mask.mask,
            scene_depth,
            mask_depth: Some(mask.depth),
        };
        let result = composite.draw(ctx.backend, &params, inputs, destination);

        if let Some(copy) = source_copy {
            ctx.temporaries.release(copy);
        }
        mask.release(ctx.temporaries);

        match result {
            Ok(()) if settings.show_mask => CompositeOutcome::Mask,
            Ok(()) => CompositeOutcome::Composite,
            Err(e) => {
                log::error!("Censor composite failed: {}", e);
                CompositeOutcome::Passthrough(RenderFailed)
            }
        }
    }
}

impl<B: GraphicsBackend + 'static> PostProcessEffect<B> for CensorEffect<B> {
    fn name(&self) -> &str {
        "Censor"
    }

    fn is_enabled_and_supported(&self, scene: &Scene) -> bool {
        self.state != EffectState::Disposed
            && self
                .settings(scene)
                .is_some_and(CensorSettings::is_enabled_and_supported)
    }

    fn prepare(&mut self, ctx: &mut EffectPrepareContext<B>) {
        if self.state == EffectState::Disposed {
            return;
        }
        let active = self.is_enabled_and_supported(ctx.scene);

        if active && self.state == EffectState::Uninitialized && !self.init_failed {
            match self.initialize(ctx) {
                Ok(()) => {
                    log::info!("Censor effect ready ({:?} mask)", self.strategy);
                    self.state = EffectState::Ready;
                }
                Err(e) => {
                    log::error!("Censor effect disabled, passing frames through: {}", e);
                    self.init_failed = true;
                    self.release_resources(ctx.backend);
                }
            }
        }

        let hard_edges = self.settings(ctx.scene).is_some_and(|s| s.hard_edges);
        let wanted = active && hard_edges && self.state == EffectState::Ready;
        self.sync_depth_capture(ctx, wanted);
    }

    fn render(
        &mut self,
        ctx: &mut PostProcessContext<B>,
        source: TargetRef,
        destination: TargetRef,
    ) {
        let outcome = self.composite(ctx, source, destination);
        if let CompositeOutcome::Passthrough(reason) = outcome {
            log::trace!("Censor passthrough: {:?}", reason);
            ctx.passthrough(source, destination);
        }
        self.last_outcome = Some(outcome);
    }

    fn release(
        &mut self,
        backend: &mut B,
        commands: &mut CameraCommands,
        shared: &SharedResourceHandle,
    ) {
        if self.state == EffectState::Disposed {
            return;
        }
        self.detach_depth_capture(backend, commands, shared);
        self.release_resources(backend);
        self.state = EffectState::Disposed;
        log::debug!("Censor effect disposed");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::pipeline::geometry::SceneGeometry;
    use crate::pipeline::postprocess::Blitter;
    use crate::render_graph::{new_shared_resources, TemporaryTargets};
    use crate::resources::{Material, Mesh, ShaderLibrary};
    use crate::scene::{LayerMask, RenderObject};

    struct Harness {
        backend: DummyBackend,
        geometry: SceneGeometry,
        scene: Scene,
        shaders: ShaderLibrary,
        commands: CameraCommands,
        shared: SharedResourceHandle,
        temporaries: TemporaryTargets,
        blitter: Blitter,
        profile: Entity,
    }

    impl Harness {
        fn new(settings: CensorSettings) -> Self {
            let mut backend = DummyBackend::new(64, 64);
            let mut geometry = SceneGeometry::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
            let mut scene = Scene::new();
            scene.add_object(RenderObject::new(0, 0).with_layer(5));
            geometry
                .sync(&mut backend, &scene, &[Mesh::cube()], &[Material::default()])
                .unwrap();
            let profile = scene.spawn_profile(settings);
            let blitter = Blitter::new(&mut backend, TextureFormat::Rgba8Unorm).unwrap();
            Self {
                backend,
                geometry,
                scene,
                shaders: ShaderLibrary::with_builtins(),
                commands: CameraCommands::new(),
                shared: new_shared_resources(),
                temporaries: TemporaryTargets::new(),
                blitter,
                profile,
            }
        }

        fn target(&mut self, label: &str) -> TargetRef {
            let desc = TextureDescriptor::render_target(label, 64, 64, TextureFormat::Rgba8Unorm)
                .with_usage(TextureUsage::COPY_SRC | TextureUsage::COPY_DST);
            let texture = self.backend.create_texture(&desc).unwrap();
            let view = self.backend.create_texture_view(texture).unwrap();
            TargetRef {
                texture: Some(texture),
                view,
                width: 64,
                height: 64,
                format: TextureFormat::Rgba8Unorm,
            }
        }

        fn prepare(&mut self, effect: &mut CensorEffect<DummyBackend>) {
            let mut ctx = EffectPrepareContext {
                backend: &mut self.backend,
                scene: &self.scene,
                geometry: &self.geometry,
                shaders: &self.shaders,
                commands: &mut self.commands,
                shared: &self.shared,
                color_format: TextureFormat::Rgba8Unorm,
            };
            effect.prepare(&mut ctx);
        }

        fn render(
            &mut self,
            effect: &mut CensorEffect<DummyBackend>,
            source: TargetRef,
            destination: TargetRef,
        ) {
            self.shared.write().begin_frame();
            self.backend.begin_frame().unwrap();
            let mut ctx = PostProcessContext {
                backend: &mut self.backend,
                scene: &self.scene,
                geometry: &self.geometry,
                shared: &self.shared,
                temporaries: &mut self.temporaries,
                blitter: &self.blitter,
                scene_depth: None,
            };
            effect.render(&mut ctx, source, destination);
            self.temporaries.end_frame(&mut self.backend);
            self.backend.end_frame().unwrap();
        }

        fn release(&mut self, effect: &mut CensorEffect<DummyBackend>) {
            effect.release(&mut self.backend, &mut self.commands, &self.shared);
        }
    }

    #[test]
    fn renders_ephemeral_mask_then_composite() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);
        let (source, destination) = (h.target("source"), h.target("destination"));

        h.prepare(&mut effect);
        assert_eq!(effect.state(), EffectState::Ready);
        h.render(&mut effect, source, destination);

        assert_eq!(effect.last_outcome(), Some(CompositeOutcome::Composite));
        assert_eq!(
            h.backend.stats().pass_labels(),
            vec!["Censor Mask (Ephemeral)", "Censor Composite"]
        );
        assert_eq!(h.temporaries.outstanding(), 0);
        assert_eq!(h.temporaries.acquired_total(), h.temporaries.released_total());
        assert!(h.backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn show_mask_reports_mask_outcome() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)).with_show_mask(true));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);
        let (source, destination) = (h.target("source"), h.target("destination"));
        h.prepare(&mut effect);
        h.render(&mut effect, source, destination);
        assert_eq!(effect.last_outcome(), Some(CompositeOutcome::Mask));
    }

    #[test]
    fn missing_composite_shader_passes_through() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)));
        h.shaders.remove(crate::resources::CENSOR_COMPOSITE_SHADER);
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);
        let (source, destination) = (h.target("source"), h.target("destination"));
        let live = h.backend.live_resources();

        h.prepare(&mut effect);
        h.prepare(&mut effect);
        assert_eq!(effect.state(), EffectState::Uninitialized);
        // The auxiliary camera from the partial init is gone again
        assert_eq!(h.backend.live_resources(), live);

        h.render(&mut effect, source, destination);
        assert_eq!(
            effect.last_outcome(),
            Some(CompositeOutcome::Passthrough(PassthroughReason::NotInitialized))
        );
        assert_eq!(h.backend.stats().pass_labels(), vec!["Blit"]);

        h.release(&mut effect);
        h.release(&mut effect);
        assert_eq!(effect.state(), EffectState::Disposed);
        assert_eq!(h.backend.live_resources(), live);
    }

    #[test]
    fn aliased_targets_go_through_a_copy() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);
        let target = h.target("color");
        h.prepare(&mut effect);
        h.render(&mut effect, target, target);

        assert_eq!(effect.last_outcome(), Some(CompositeOutcome::Composite));
        assert_eq!(h.backend.stats().copies.len(), 1);
        assert_eq!(h.backend.stats().copies[0].0, target.texture.unwrap());
        assert_eq!(h.temporaries.outstanding(), 0);
        assert!(h.backend.stats().validation_errors.is_empty());
    }

    #[test]
    fn persistent_without_generator_passes_through() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Persistent);
        let (source, destination) = (h.target("source"), h.target("destination"));
        h.prepare(&mut effect);
        h.render(&mut effect, source, destination);
        assert_eq!(
            effect.last_outcome(),
            Some(CompositeOutcome::Passthrough(PassthroughReason::MaskUnavailable))
        );
    }

    #[test]
    fn depth_capture_follows_hard_edges_and_camera() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)).with_hard_edges(true));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);

        h.prepare(&mut effect);
        let first = h.scene.camera.id();
        assert_eq!(h.commands.count_for(first, CameraEvent::AfterDepthTexture), 1);
        h.prepare(&mut effect);
        assert_eq!(h.commands.len(), 1);

        h.scene.set_camera(h.scene.camera.clone());
        let second = h.scene.camera.id();
        h.prepare(&mut effect);
        assert_eq!(h.commands.count_for(first, CameraEvent::AfterDepthTexture), 0);
        assert_eq!(h.commands.count_for(second, CameraEvent::AfterDepthTexture), 1);

        if let Some(mut settings) = h.scene.profile_mut::<CensorSettings>(h.profile) {
            settings.hard_edges = false;
        }
        h.prepare(&mut effect);
        assert!(h.commands.is_empty());
        assert!(!effect.is_depth_capture_attached());

        if let Some(mut settings) = h.scene.profile_mut::<CensorSettings>(h.profile) {
            settings.hard_edges = true;
        }
        h.prepare(&mut effect);
        h.release(&mut effect);
        assert!(h.commands.is_empty());
    }

    #[test]
    fn hard_edges_without_snapshot_fall_back_to_soft() {
        let mut h = Harness::new(CensorSettings::new(LayerMask::layer(5)).with_hard_edges(true));
        let mut effect = CensorEffect::new(h.profile, MaskStrategy::Ephemeral);
        let (source, destination) = (h.target("source"), h.target("destination"));
        h.prepare(&mut effect);
        h.render(&mut effect, source, destination);
        assert_eq!(effect.last_outcome(), Some(CompositeOutcome::Composite));
    }

    #[test]
    fn zero_layer_mask_is_inactive() {
        let h = Harness::new(CensorSettings::default());
        let effect = CensorEffect::<DummyBackend>::new(h.profile, MaskStrategy::Ephemeral);
        assert!(!effect.is_enabled_and_supported(&h.scene));
    }
}
