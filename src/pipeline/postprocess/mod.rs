//! Post-processing host: the effect stack and the graph pass that runs it

mod blit;
mod pass;
mod stack;

pub use blit::Blitter;
pub use pass::PostProcessPass;
pub use stack::*;

/// Common fullscreen triangle vertex stage
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    return vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
}
"#;

/// Module source with the fullscreen vertex stage and the given fragment stage
pub fn fullscreen_shader(fragment: &str) -> String {
    format!("{}\n{}", FULLSCREEN_VERTEX_SHADER, fragment)
}
