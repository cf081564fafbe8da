//! Censor Effect - screen-space censorship on a render graph
//!
//! Objects on configured layers are pixelated on screen, optionally cropped to
//! their silhouettes with the scene depth. The effect runs as a post effect on
//! a small render graph engine with two backends:
//! - **wgpu**: the real GPU backend, rendering into a winit window
//! - **dummy**: a headless backend that records what would be rendered
//!
//! # Features
//! - Render graph with depth prepass, scene pass and post processing
//! - Camera events with attachable commands (depth capture)
//! - Ephemeral (per-frame) and persistent (generator) coverage masks
//! - CPU reference of the mask and composite on `image` buffers
//! - Censor profiles stored as Bevy ECS components

pub mod backend;
pub mod engine;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod window;

// Re-export Bevy ECS prelude for users
pub use bevy_ecs::prelude::*;

pub use engine::{Engine, EngineError};
pub use pipeline::censor::{
    install_censor_effect, install_mask_generator, CensorEffect, CensorError, CensorMaskGenerator,
    CensorSettings, MaskStrategy, ReplacePolicy,
};
pub use window::Window;

pub use backend::dummy::DummyBackend;
// Re-export wgpu backend for direct access
pub use backend::wgpu_backend::WgpuBackend;

/// Configuration for initializing the graphics engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Main camera clear color
    pub clear_color: [f32; 4],
    /// Render the scene offscreen and run the post-process stack. Without
    /// it the scene goes straight to the swapchain and no post effect can
    /// be installed.
    pub post_processing: bool,
    /// Edge length of the persistent censor mask
    pub mask_resolution: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Censor Effect".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            post_processing: true,
            mask_resolution: pipeline::censor::DEFAULT_MASK_RESOLUTION,
        }
    }
}
