//! Censor effect demo
//!
//! Run with:
//!   cargo run --example censor_demo
//!   cargo run --example censor_demo -- --pixel-size 24 --hard-edges
//!   cargo run --example censor_demo -- --persistent --show-mask
//!
//! A few cubes orbit a ground plane; the ones on the censor layer are
//! pixelated. Close the window to exit.

use censor_effect::{
    install_censor_effect, install_mask_generator,
    resources::{Material, Mesh},
    scene::{Camera, LayerMask, RenderObject, Transform},
    window, CensorSettings, Engine, EngineConfig, MaskStrategy, ReplacePolicy, WgpuBackend,
};
use clap::Parser;
use glam::{Quat, Vec3, Vec4};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(about = "Pixelate every object on a layer")]
struct Args {
    /// Layer to censor
    #[arg(long, default_value_t = 5)]
    layer: u8,

    /// Edge length of a censor block in screen pixels
    #[arg(long, default_value_t = 50)]
    pixel_size: u32,

    /// Crop the censor to the visible silhouette
    #[arg(long)]
    hard_edges: bool,

    /// Show the coverage mask instead of the scene
    #[arg(long)]
    show_mask: bool,

    /// Render the mask once per frame with a generator camera
    #[arg(long)]
    persistent: bool,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,
}

struct Demo {
    engine: Engine<WgpuBackend>,
    censored: Vec<usize>,
    started: Instant,
}

impl Demo {
    fn new(window: &window::Window, args: &Args) -> Result<Self, String> {
        let (width, height) = window.dimensions();
        let config = EngineConfig {
            title: "Censor Demo".to_string(),
            width,
            height,
            ..Default::default()
        };
        let mut engine =
            Engine::with_window(window.window_arc(), config).map_err(|e| e.to_string())?;

        let cube = engine.add_mesh(Mesh::cube());
        let plane = engine.add_mesh(Mesh::plane(12.0, 12.0, 4));
        let ground = engine.add_material(Material::plastic(Vec3::new(0.35, 0.4, 0.35)));
        let plain = engine.add_material(Material::plastic(Vec3::new(0.2, 0.45, 0.9)));
        let secret = engine.add_material(
            Material::new("secret").with_base_color(Vec4::new(0.95, 0.3, 0.25, 1.0)),
        );

        let scene = engine.scene_mut();
        scene.set_camera(Camera::new(Vec3::new(0.0, 4.0, 9.0), Vec3::ZERO));
        scene.camera.set_aspect(width as f32, height as f32);
        scene.add_object(RenderObject::new(plane, ground).with_position(Vec3::new(0.0, -1.0, 0.0)));
        let mut censored = Vec::new();
        for i in 0..6 {
            let angle = i as f32 * std::f32::consts::TAU / 6.0;
            let position = Vec3::new(angle.cos() * 3.0, 0.0, angle.sin() * 3.0);
            let object = if i % 2 == 0 {
                RenderObject::new(cube, secret).with_layer(args.layer)
            } else {
                RenderObject::new(cube, plain)
            };
            let index = scene.add_object(object.with_position(position));
            if i % 2 == 0 {
                censored.push(index);
            }
        }

        let strategy = if args.persistent {
            install_mask_generator(&mut engine, ReplacePolicy::Replace).map_err(|e| e.to_string())?;
            MaskStrategy::Persistent
        } else {
            MaskStrategy::Ephemeral
        };
        let settings = CensorSettings::new(LayerMask::layer(args.layer))
            .with_pixel_size(args.pixel_size)
            .with_hard_edges(args.hard_edges)
            .with_show_mask(args.show_mask);
        install_censor_effect(&mut engine, settings, strategy).map_err(|e| e.to_string())?;

        Ok(Self {
            engine,
            censored,
            started: Instant::now(),
        })
    }

    fn frame(&mut self, window: &mut window::Window) -> bool {
        if window.should_close() {
            self.engine.shutdown();
            return false;
        }
        if window.was_resized() {
            let (width, height) = window.dimensions();
            if let Err(e) = self.engine.resize(width, height) {
                log::error!("Resize failed: {}", e);
                return false;
            }
        }

        let t = self.started.elapsed().as_secs_f32();
        let scene = self.engine.scene_mut();
        for &index in &self.censored {
            if let Some(object) = scene.objects.get_mut(index) {
                object.transform = Transform::from_position(object.transform.position)
                    .with_rotation(Quat::from_rotation_y(t));
            }
        }
        scene.camera.set_position(Vec3::new((t * 0.2).sin() * 9.0, 4.0, (t * 0.2).cos() * 9.0));

        match self.engine.render() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Render failed: {}", e);
                false
            }
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    log::info!("Censoring layer {} with {} px blocks", args.layer, args.pixel_size);

    let (width, height) = (args.width, args.height);
    let result = window::run(
        "Censor Demo",
        width,
        height,
        move |window| Demo::new(window, &args),
        |demo: &mut Demo, window| demo.frame(window),
    );
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
