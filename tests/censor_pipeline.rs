//! Censor effect driven through the engine on the dummy backend

use censor_effect::pipeline::censor::{CompositeOutcome, EffectState, PassthroughReason};
use censor_effect::render_graph::{
    CameraEvent, CENSOR_DEPTH_TEXTURE, GLOBAL_CENSOR_MASK, GLOBAL_CENSOR_MASK_DEPTH,
};
use censor_effect::resources::{Material, Mesh, CENSOR_COMPOSITE_SHADER, WHITE_MASK_SHADER};
use censor_effect::scene::{Camera, LayerMask, RenderObject};
use censor_effect::{
    install_censor_effect, install_mask_generator, CensorEffect, CensorSettings, DummyBackend,
    Engine, EngineConfig, Entity, MaskStrategy, ReplacePolicy,
};
use glam::Vec3;
use rstest::rstest;

fn engine() -> Engine<DummyBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig {
        mask_resolution: 256,
        ..Default::default()
    };
    let mut engine = Engine::new(DummyBackend::new(320, 240), config).unwrap();
    let cube = engine.add_mesh(Mesh::cube());
    let material = engine.add_material(Material::default());
    let scene = engine.scene_mut();
    scene.add_object(RenderObject::new(cube, material).with_layer(5));
    scene.add_object(RenderObject::new(cube, material).with_position(Vec3::new(2.0, 0.0, 0.0)));
    engine
}

fn effect(engine: &Engine<DummyBackend>) -> &CensorEffect<DummyBackend> {
    engine
        .post_process_stack()
        .and_then(|stack| stack.find_effect::<CensorEffect<DummyBackend>>())
        .unwrap()
}

fn censor_layer_5() -> CensorSettings {
    CensorSettings::new(LayerMask::layer(5))
}

fn settings(
    engine: &mut Engine<DummyBackend>,
    profile: Entity,
    edit: impl FnOnce(&mut CensorSettings),
) {
    let mut settings = engine.scene_mut().profile_mut::<CensorSettings>(profile).unwrap();
    edit(&mut *settings);
}

fn frame_passes(engine: &mut Engine<DummyBackend>) -> Vec<String> {
    engine.backend_mut().reset_stats();
    engine.render().unwrap();
    let stats = engine.backend().stats();
    assert!(stats.validation_errors.is_empty(), "{:?}", stats.validation_errors);
    stats.passes.iter().map(|p| p.label.clone()).collect()
}

#[test]
fn ephemeral_censor_frame_structure() {
    let mut engine = engine();
    install_censor_effect(
        &mut engine,
        CensorSettings::new(LayerMask::layer(5)).with_pixel_size(50),
        MaskStrategy::Ephemeral,
    )
    .unwrap();

    let passes = frame_passes(&mut engine);
    assert_eq!(
        passes,
        vec!["Depth Prepass", "Scene Pass", "Censor Mask (Ephemeral)", "Censor Composite"]
    );
    assert_eq!(effect(&engine).last_outcome(), Some(CompositeOutcome::Composite));
    // Only the layer 5 cube is drawn into the mask
    assert_eq!(engine.backend().stats().passes[2].draws, 1);
}

#[test]
fn rendering_is_repeatable_and_temporaries_balance() {
    let mut engine = engine();
    install_censor_effect(&mut engine, censor_layer_5(), MaskStrategy::Ephemeral).unwrap();

    let first = frame_passes(&mut engine);
    let live = engine.backend().live_resources();
    for _ in 0..4 {
        assert_eq!(frame_passes(&mut engine), first);
        assert_eq!(engine.backend().live_resources(), live);
    }

    let temporaries = engine.executor().temporaries();
    assert_eq!(temporaries.outstanding(), 0);
    assert_eq!(temporaries.acquired_total(), temporaries.released_total());
    // Two targets per frame, pooled after the first
    assert_eq!(temporaries.acquired_total(), 10);
    assert_eq!(temporaries.created_total(), 2);
}

#[rstest]
#[case::disabled(|s: &mut CensorSettings| s.enabled = false)]
#[case::no_layers(|s: &mut CensorSettings| s.censor_layer = LayerMask::EMPTY)]
fn inactive_profile_blits_source(#[case] edit: fn(&mut CensorSettings)) {
    let mut engine = engine();
    let profile =
        install_censor_effect(&mut engine, censor_layer_5(), MaskStrategy::Ephemeral).unwrap();
    settings(&mut engine, profile, edit);

    assert_eq!(frame_passes(&mut engine), vec!["Depth Prepass", "Scene Pass", "Blit"]);
    assert_eq!(effect(&engine).state(), EffectState::Uninitialized);

    settings(&mut engine, profile, |s| *s = CensorSettings::new(LayerMask::layer(5)));
    assert_eq!(frame_passes(&mut engine).last().map(String::as_str), Some("Censor Composite"));
}

#[rstest]
#[case::composite(CENSOR_COMPOSITE_SHADER)]
#[case::mask(WHITE_MASK_SHADER)]
fn missing_shader_degrades_to_passthrough(#[case] shader: &str) {
    let mut engine = engine();
    engine.shaders_mut().remove(shader);
    install_censor_effect(&mut engine, censor_layer_5(), MaskStrategy::Ephemeral).unwrap();

    for _ in 0..3 {
        assert_eq!(frame_passes(&mut engine), vec!["Depth Prepass", "Scene Pass", "Blit"]);
    }
    assert_eq!(
        effect(&engine).last_outcome(),
        Some(CompositeOutcome::Passthrough(PassthroughReason::NotInitialized))
    );

    engine.shutdown();
    assert_eq!(engine.backend().live_resources(), 0);
}

#[test]
fn hard_edges_capture_scene_depth_after_prepass() {
    let mut engine = engine();
    let profile = install_censor_effect(
        &mut engine,
        CensorSettings::new(LayerMask::layer(5)).with_hard_edges(true),
        MaskStrategy::Ephemeral,
    )
    .unwrap();

    frame_passes(&mut engine);
    let camera = engine.scene().camera.id();
    assert_eq!(engine.executor().commands().count_for(camera, CameraEvent::AfterDepthTexture), 1);
    assert_eq!(engine.backend().stats().copies.len(), 1);
    assert!(engine.shared().read().get_fresh(CENSOR_DEPTH_TEXTURE).is_some());
    assert_eq!(engine.backend().textures_labelled("Censor Depth Snapshot").len(), 1);

    // A new main camera moves the capture over
    let replacement = Camera::new(Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO);
    engine.scene_mut().set_camera(replacement);
    frame_passes(&mut engine);
    let commands = engine.executor().commands();
    assert_eq!(commands.count_for(camera, CameraEvent::AfterDepthTexture), 0);
    assert_eq!(commands.count_for(engine.scene().camera.id(), CameraEvent::AfterDepthTexture), 1);

    settings(&mut engine, profile, |s| s.hard_edges = false);
    frame_passes(&mut engine);
    assert!(engine.executor().commands().is_empty());
    assert!(!engine.shared().read().contains(CENSOR_DEPTH_TEXTURE));
    assert!(engine.backend().textures_labelled("Censor Depth Snapshot").is_empty());
}

#[test]
fn persistent_mask_renders_before_the_camera() {
    let mut engine = engine();
    install_mask_generator(&mut engine, ReplacePolicy::Replace).unwrap();
    install_censor_effect(&mut engine, censor_layer_5(), MaskStrategy::Persistent).unwrap();

    let passes = frame_passes(&mut engine);
    assert_eq!(
        passes,
        vec!["Censor Mask (Persistent)", "Depth Prepass", "Scene Pass", "Censor Composite"]
    );
    assert_eq!(effect(&engine).last_outcome(), Some(CompositeOutcome::Composite));
    let generator = engine.mask_generator().unwrap();
    assert_eq!(generator.frames_rendered(), 1);
    assert_eq!(generator.camera().culling_mask, LayerMask::layer(5));
    for name in [GLOBAL_CENSOR_MASK, GLOBAL_CENSOR_MASK_DEPTH] {
        assert!(engine.shared().read().get_fresh(name).is_some());
    }

    // Without the generator the effect passes through
    assert!(engine.remove_mask_generator());
    assert_eq!(frame_passes(&mut engine), vec!["Depth Prepass", "Scene Pass", "Blit"]);
    assert_eq!(
        effect(&engine).last_outcome(),
        Some(CompositeOutcome::Passthrough(PassthroughReason::MaskUnavailable))
    );
}

#[test]
fn resize_keeps_the_effect() {
    let mut engine = engine();
    install_censor_effect(
        &mut engine,
        CensorSettings::new(LayerMask::layer(5)).with_hard_edges(true),
        MaskStrategy::Ephemeral,
    )
    .unwrap();
    frame_passes(&mut engine);

    engine.resize(640, 480).unwrap();
    let passes = frame_passes(&mut engine);
    assert_eq!(passes.last().map(String::as_str), Some("Censor Composite"));
    assert_eq!(engine.backend().textures_labelled("Censor Depth Snapshot").len(), 1);
    let snapshot = engine.backend().textures_labelled("Censor Depth Snapshot")[0];
    let desc = engine.backend().texture_descriptor(snapshot).unwrap();
    assert_eq!((desc.width, desc.height), (640, 480));
}

#[test]
fn teardown_releases_everything() {
    let mut engine = engine();
    install_mask_generator(&mut engine, ReplacePolicy::Replace).unwrap();
    install_censor_effect(
        &mut engine,
        CensorSettings::new(LayerMask::layer(5)).with_hard_edges(true),
        MaskStrategy::Ephemeral,
    )
    .unwrap();
    frame_passes(&mut engine);
    frame_passes(&mut engine);

    engine.shutdown();
    assert_eq!(effect(&engine).state(), EffectState::Disposed);
    assert!(engine.executor().commands().is_empty());
    assert!(engine.shared().read().is_empty());
    assert_eq!(engine.backend().live_resources(), 0);
    assert!(engine.backend().stats().validation_errors.is_empty());

    // Shutdown again, then drop
    engine.shutdown();
}
