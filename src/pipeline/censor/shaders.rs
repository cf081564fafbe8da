//! WGSL sources for the censor effect

/// Draws every fragment of every mesh solid white. Material bindings are
/// not declared, so any object can be drawn with only camera and object
/// groups bound.
pub const WHITE_MASK_WGSL: &str = r#"
struct CameraUniform {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
    near_far: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniform;
@group(1) @binding(0) var<uniform> object: ObjectUniform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_proj * object.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

/// Pixelation composite. Appended to the shared fullscreen vertex stage.
///
/// Binding 0 mirrors `CensorParams`. Depth textures are only read when hard
/// edges are on, and then coverage comes from the depth test against the
/// mask texels around each pixel rather than from the mask texel alone.
pub const CENSOR_COMPOSITE_WGSL: &str = r#"
struct CensorParams {
    screen_size: vec2<f32>,
    mask_size: vec2<f32>,
    pixel_size: f32,
    hard_edges: f32,
    show_mask: f32,
    depth_tolerance: f32,
    near: f32,
    far: f32,
    orthographic: f32,
    _pad: f32,
}

@group(0) @binding(0) var<uniform> params: CensorParams;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var mask_texture: texture_2d<f32>;
@group(0) @binding(3) var scene_depth: texture_depth_2d;
@group(0) @binding(4) var mask_depth: texture_depth_2d;

fn linearize(depth: f32) -> f32 {
    if (params.orthographic > 0.5) {
        return params.near + depth * (params.far - params.near);
    }
    return params.near * params.far / (params.far - depth * (params.far - params.near));
}

fn mask_coord(pixel: vec2<f32>) -> vec2<i32> {
    let scaled = floor(pixel * params.mask_size / params.screen_size);
    return vec2<i32>(clamp(scaled, vec2<f32>(0.0), params.mask_size - vec2<f32>(1.0)));
}

// Strongest mask value among the 3x3 texels around `center` whose depth
// agrees with the scene. A coarse mask can miss silhouette pixels at its
// own texel, so neighbours are consulted before the depth crop.
fn hard_edge_coverage(center: vec2<i32>, pixel: vec2<f32>) -> f32 {
    let scene_linear = linearize(textureLoad(scene_depth, vec2<i32>(pixel), 0));
    let last = vec2<i32>(params.mask_size) - vec2<i32>(1);
    var coverage = 0.0;
    for (var dy = -1; dy <= 1; dy = dy + 1) {
        for (var dx = -1; dx <= 1; dx = dx + 1) {
            let texel = clamp(center + vec2<i32>(dx, dy), vec2<i32>(0), last);
            let value = textureLoad(mask_texture, texel, 0).r;
            if (value <= coverage) {
                continue;
            }
            let mask_linear = linearize(textureLoad(mask_depth, texel, 0));
            if (abs(scene_linear - mask_linear) <= params.depth_tolerance * scene_linear) {
                coverage = value;
            }
        }
    }
    return coverage;
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    let pixel = floor(position.xy);
    let mc = mask_coord(pixel);
    let mask = textureLoad(mask_texture, mc, 0).r;

    if (params.show_mask > 0.5) {
        return vec4<f32>(mask, mask, mask, 1.0);
    }

    let original = textureLoad(source_texture, vec2<i32>(pixel), 0);

    var coverage = mask;
    if (params.hard_edges > 0.5) {
        coverage = hard_edge_coverage(mc, pixel);
    }

    let block = max(params.pixel_size, 1.0);
    let block_origin = floor(pixel / block) * block;
    let last_pixel = params.screen_size - vec2<f32>(1.0);
    let representative = min(block_origin + floor(block * 0.5), last_pixel);
    let censored = textureLoad(source_texture, vec2<i32>(representative), 0);

    return mix(original, censored, coverage);
}
"#;
