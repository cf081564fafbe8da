//! Scene setup helpers
//!
//! Both helpers check the engine first and fail without touching it, so a
//! failed setup leaves no partial state behind.

use crate::backend::traits::GraphicsBackend;
use crate::engine::Engine;
use crate::pipeline::censor::effect::CensorEffect;
use crate::pipeline::censor::error::{CensorError, CensorResult};
use crate::pipeline::censor::generator::CensorMaskGenerator;
use crate::pipeline::censor::mask::MaskStrategy;
use crate::pipeline::censor::settings::CensorSettings;
use crate::scene::CameraId;
use bevy_ecs::entity::Entity;

/// What to do when a mask generator is already installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    #[default]
    Replace,
    KeepExisting,
}

/// Install the persistent censor mask generator. Its camera follows the main
/// camera and renders right before it.
///
/// A missing override shader is not an error here: the generator is
/// installed disabled and the problem is logged.
pub fn install_mask_generator<B: GraphicsBackend + 'static>(
    engine: &mut Engine<B>,
    policy: ReplacePolicy,
) -> CensorResult<CameraId> {
    if engine.post_process_stack().is_none() {
        return Err(CensorError::MissingPostProcessLayer);
    }
    if engine.mask_generator().is_some() && policy == ReplacePolicy::KeepExisting {
        return Err(CensorError::GeneratorAlreadyInstalled);
    }

    let generator =
        CensorMaskGenerator::new(&engine.scene().camera, engine.config().mask_resolution);
    let camera = generator.camera_id();
    match engine.set_mask_generator(generator) {
        Ok(()) => {}
        Err(CensorError::ShaderNotFound(name)) => {
            log::warn!("Censor mask generator installed disabled, shader '{}' is missing", name);
        }
        Err(e) => return Err(e),
    }
    Ok(camera)
}

/// Spawn a censor profile and append a censor effect driven by it to the
/// post-process stack
pub fn install_censor_effect<B: GraphicsBackend + 'static>(
    engine: &mut Engine<B>,
    settings: CensorSettings,
    strategy: MaskStrategy,
) -> CensorResult<Entity> {
    if engine.post_process_stack().is_none() {
        return Err(CensorError::MissingPostProcessLayer);
    }
    if strategy == MaskStrategy::Persistent && engine.mask_generator().is_none() {
        log::warn!(
            "Persistent censor effect installed without a mask generator; \
             frames pass through until one is installed"
        );
    }

    let profile = engine.scene_mut().spawn_profile(settings);
    match engine.post_process_stack_mut() {
        Some(stack) => {
            stack.add_effect(CensorEffect::<B>::new(profile, strategy));
            Ok(profile)
        }
        None => {
            engine.scene_mut().despawn_profile(profile);
            Err(CensorError::MissingPostProcessLayer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::resources::WHITE_MASK_SHADER;
    use crate::scene::LayerMask;
    use crate::EngineConfig;

    fn engine(post_processing: bool) -> Engine<DummyBackend> {
        let config = EngineConfig {
            post_processing,
            mask_resolution: 128,
            ..Default::default()
        };
        Engine::new(DummyBackend::new(64, 64), config).unwrap()
    }

    #[test]
    fn requires_post_processing_layer() {
        let mut engine = engine(false);
        let live = engine.backend().live_resources();
        assert!(matches!(
            install_mask_generator(&mut engine, ReplacePolicy::Replace),
            Err(CensorError::MissingPostProcessLayer)
        ));
        assert!(matches!(
            install_censor_effect(
                &mut engine,
                CensorSettings::new(LayerMask::layer(5)),
                MaskStrategy::Ephemeral
            ),
            Err(CensorError::MissingPostProcessLayer)
        ));
        assert!(engine.mask_generator().is_none());
        assert_eq!(engine.scene().world().entities().len(), 0);
        assert_eq!(engine.backend().live_resources(), live);
    }

    #[test]
    fn replace_policy() {
        let mut engine = engine(true);
        let first = install_mask_generator(&mut engine, ReplacePolicy::KeepExisting).unwrap();
        assert!(matches!(
            install_mask_generator(&mut engine, ReplacePolicy::KeepExisting),
            Err(CensorError::GeneratorAlreadyInstalled)
        ));
        assert_eq!(engine.mask_generator().map(|g| g.camera_id()), Some(first));

        let second = install_mask_generator(&mut engine, ReplacePolicy::Replace).unwrap();
        assert_ne!(first, second);
        assert_eq!(engine.backend().textures_labelled("Global Censor Mask").len(), 1);
    }

    #[test]
    fn generator_camera_renders_before_main() {
        let mut engine = engine(true);
        engine.scene_mut().camera.depth = 2.0;
        install_mask_generator(&mut engine, ReplacePolicy::Replace).unwrap();
        let generator = engine.mask_generator().unwrap();
        assert_eq!(generator.camera().depth, 1.0);
        assert!(generator.camera().culling_mask.is_empty());
        assert_eq!(generator.resolution(), 128);
    }

    #[test]
    fn missing_shader_installs_disabled_generator() {
        let mut engine = engine(true);
        engine.shaders_mut().remove(WHITE_MASK_SHADER);
        install_mask_generator(&mut engine, ReplacePolicy::Replace).unwrap();
        assert!(engine.mask_generator().is_some_and(|g| !g.is_enabled()));
    }

    #[test]
    fn effect_is_appended_to_stack() {
        let mut engine = engine(true);
        let settings = CensorSettings::new(LayerMask::layer(5));
        let profile =
            install_censor_effect(&mut engine, settings, MaskStrategy::Ephemeral).unwrap();
        let stack = engine.post_process_stack().unwrap();
        assert_eq!(stack.effect_names(), vec!["Censor"]);
        let effect = stack.find_effect::<CensorEffect<DummyBackend>>();
        assert_eq!(effect.map(|e| e.profile()), Some(profile));
        assert!(engine.scene().profile::<CensorSettings>(profile).is_some());
    }
}
