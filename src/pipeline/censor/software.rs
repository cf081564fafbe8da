//! CPU reference of the censor mask and composite
//!
//! Renders on `image` buffers with the conventions of the GPU path: wgpu clip
//! space (depth in `[0, 1]`, y up), counter-clockwise front faces with back
//! face culling, a `Less` depth test and pixel centers at `+0.5`. The
//! composite consumes the same [`CensorParams`] block as the shader.

use crate::pipeline::censor::composite::CensorParams;
use crate::resources::{Material, Mesh};
use crate::scene::{Camera, ClearFlags, LayerMask, RenderObject, Scene};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use image::{GrayImage, Luma, Rgba, RgbaImage};

/// Single channel float depth target, cleared to the far plane
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![1.0; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Out of range reads return the far plane
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.index(x, y).map_or(1.0, |i| self.data[i])
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = depth;
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + x as usize)
    }
}

/// A triangle after projection: screen position and depth per vertex
struct ScreenTriangle {
    points: [Vec2; 3],
    depths: [f32; 3],
}

impl ScreenTriangle {
    /// `None` for triangles crossing the camera plane and for back faces
    fn project(clip: [Vec4; 3], width: u32, height: u32) -> Option<Self> {
        if clip.iter().any(|v| v.w <= f32::EPSILON) {
            return None;
        }
        let ndc = clip.map(|v| v.xyz() / v.w);
        let signed_area = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
            - (ndc[2].x - ndc[0].x) * (ndc[1].y - ndc[0].y);
        if signed_area <= 0.0 {
            return None;
        }
        let to_screen = |p: Vec3| {
            Vec2::new(
                (p.x * 0.5 + 0.5) * width as f32,
                (1.0 - (p.y * 0.5 + 0.5)) * height as f32,
            )
        };
        Some(Self {
            points: ndc.map(to_screen),
            depths: ndc.map(|p| p.z),
        })
    }

    /// Call `shade(x, y, depth)` for every covered pixel center
    fn rasterize(&self, width: u32, height: u32, mut shade: impl FnMut(u32, u32, f32)) {
        let [a, b, c] = self.points;
        let edge =
            |p: Vec2, q: Vec2, r: Vec2| (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        let area = edge(a, b, c);
        if area.abs() <= f32::EPSILON {
            return;
        }

        let min = a.min(b).min(c).floor().max(Vec2::ZERO);
        let max = a.max(b).max(c).ceil().min(Vec2::new(width as f32, height as f32));
        for y in (min.y as u32)..(max.y as u32) {
            for x in (min.x as u32)..(max.x as u32) {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * self.depths[0] + w1 * self.depths[1] + w2 * self.depths[2];
                if (0.0..=1.0).contains(&depth) {
                    shade(x, y, depth);
                }
            }
        }
    }
}

fn draw_object(
    view_proj: Mat4,
    object: &RenderObject,
    mesh: &Mesh,
    depth: &mut DepthBuffer,
    mut write: impl FnMut(u32, u32, Vec3),
) {
    let (width, height) = (depth.width(), depth.height());
    let model = object.transform.matrix();
    let clip_from_local = view_proj * model;
    for triangle in mesh.triangles() {
        let clip = triangle.map(|p| clip_from_local * p.extend(1.0));
        let Some(screen) = ScreenTriangle::project(clip, width, height) else {
            continue;
        };
        let world = triangle.map(|p| model.transform_point3(p));
        let normal = (world[1] - world[0]).cross(world[2] - world[0]).normalize_or_zero();
        screen.rasterize(width, height, |x, y, z| {
            if z < depth.get(x, y) {
                depth.set(x, y, z);
                write(x, y, normal);
            }
        });
    }
}

fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Render the objects the camera's culling mask lets through, lit by a fixed
/// directional light
pub fn render_scene(
    scene: &Scene,
    meshes: &[Mesh],
    materials: &[Material],
    width: u32,
    height: u32,
) -> (RgbaImage, DepthBuffer) {
    let camera = &scene.camera;
    let clear = match camera.clear {
        ClearFlags::SolidColor(color) => Rgba(color.map(to_unorm8)),
        ClearFlags::DepthOnly | ClearFlags::Nothing => Rgba([0, 0, 0, 255]),
    };
    let mut color = RgbaImage::from_pixel(width, height, clear);
    let mut depth = DepthBuffer::new(width, height);
    let light = Vec3::new(0.4, 0.8, 0.6).normalize();

    for object in scene.objects_in(camera.culling_mask) {
        let Some(mesh) = meshes.get(object.mesh_id) else {
            continue;
        };
        let base = materials.get(object.material_id).map_or(Vec4::ONE, |m| m.base_color);
        draw_object(camera.view_projection_matrix(), object, mesh, &mut depth, |x, y, normal| {
            let lit = base.xyz() * (0.3 + 0.7 * normal.dot(light).max(0.0));
            let rgba = Rgba([to_unorm8(lit.x), to_unorm8(lit.y), to_unorm8(lit.z), 255]);
            color.put_pixel(x, y, rgba);
        });
    }
    (color, depth)
}

/// Render objects on `layers` solid white over black, as seen from `camera`
pub fn render_mask(
    scene: &Scene,
    camera: &Camera,
    meshes: &[Mesh],
    layers: LayerMask,
    width: u32,
    height: u32,
) -> (GrayImage, DepthBuffer) {
    let mut mask = GrayImage::new(width, height);
    let mut depth = DepthBuffer::new(width, height);
    for object in scene.objects_in(layers) {
        let Some(mesh) = meshes.get(object.mesh_id) else {
            continue;
        };
        draw_object(camera.view_projection_matrix(), object, mesh, &mut depth, |x, y, _| {
            mask.put_pixel(x, y, Luma([255]));
        });
    }
    (mask, depth)
}

fn mask_coord(params: &CensorParams, x: u32, y: u32) -> (u32, u32) {
    let scale = |p: u32, mask: f32, screen: f32| {
        let scaled = (p as f32 * mask / screen).floor();
        scaled.clamp(0.0, (mask - 1.0).max(0.0)) as u32
    };
    (
        scale(x, params.mask_size[0], params.screen_size[0]),
        scale(y, params.mask_size[1], params.screen_size[1]),
    )
}

/// Strongest mask value among the 3x3 texels around `center` whose depth
/// agrees with `scene_depth`. A coarse mask can miss silhouette pixels at its
/// own texel, so neighbours are consulted before the depth crop.
fn hard_edge_coverage(
    params: &CensorParams,
    mask: &GrayImage,
    mask_depth: &DepthBuffer,
    center: (u32, u32),
    scene_depth: f32,
) -> f32 {
    let scene_linear = params.linearize(scene_depth);
    let (last_x, last_y) = (mask.width().saturating_sub(1), mask.height().saturating_sub(1));
    let mut coverage = 0u8;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let tx = (center.0 as i64 + dx).clamp(0, last_x as i64) as u32;
            let ty = (center.1 as i64 + dy).clamp(0, last_y as i64) as u32;
            let value = mask.get_pixel_checked(tx, ty).map_or(0, |p| p.0[0]);
            if value <= coverage {
                continue;
            }
            let mask_linear = params.linearize(mask_depth.get(tx, ty));
            if (scene_linear - mask_linear).abs() <= params.depth_tolerance * scene_linear {
                coverage = value;
            }
        }
    }
    coverage as f32 / 255.0
}

/// Pixelate `source` where the mask covers it. Returns the output image and
/// the per-pixel coverage that was applied.
///
/// `scene_depth` and `mask_depth` are only read with hard edges.
pub fn composite_with_coverage(
    source: &RgbaImage,
    scene_depth: &DepthBuffer,
    mask: &GrayImage,
    mask_depth: &DepthBuffer,
    params: &CensorParams,
) -> (RgbaImage, GrayImage) {
    let (width, height) = source.dimensions();
    let mut output = RgbaImage::new(width, height);
    let mut coverage_image = GrayImage::new(width, height);
    let block = params.pixel_size.max(1.0) as u32;

    for y in 0..height {
        for x in 0..width {
            let (mx, my) = mask_coord(params, x, y);
            let mask_value = mask.get_pixel_checked(mx, my).map_or(0, |p| p.0[0]);

            if params.show_mask() {
                output.put_pixel(x, y, Rgba([mask_value, mask_value, mask_value, 255]));
                coverage_image.put_pixel(x, y, Luma([mask_value]));
                continue;
            }

            let coverage = if params.hard_edges() {
                hard_edge_coverage(params, mask, mask_depth, (mx, my), scene_depth.get(x, y))
            } else {
                mask_value as f32 / 255.0
            };

            let original = *source.get_pixel(x, y);
            let pixel = if coverage > 0.0 {
                let rx = ((x / block) * block + block / 2).min(width - 1);
                let ry = ((y / block) * block + block / 2).min(height - 1);
                let censored = source.get_pixel(rx, ry);
                let mix =
                    |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * coverage).round() as u8;
                Rgba([0, 1, 2, 3].map(|c| mix(original.0[c], censored.0[c])))
            } else {
                original
            };
            output.put_pixel(x, y, pixel);
            coverage_image.put_pixel(x, y, Luma([to_unorm8(coverage)]));
        }
    }
    (output, coverage_image)
}

pub fn composite(
    source: &RgbaImage,
    scene_depth: &DepthBuffer,
    mask: &GrayImage,
    mask_depth: &DepthBuffer,
    params: &CensorParams,
) -> RgbaImage {
    composite_with_coverage(source, scene_depth, mask, mask_depth, params).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::censor::settings::CensorSettings;
    use crate::scene::Projection;
    use glam::Vec3;

    fn quad_scene(layer: u8) -> (Scene, Vec<Mesh>) {
        let mut scene = Scene::new();
        scene.set_camera(
            Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO)
                .with_projection(Projection::orthographic(4.0, 4.0, 0.1, 10.0)),
        );
        scene.add_object(RenderObject::new(0, 0).with_scale(Vec3::splat(2.0)).with_layer(layer));
        (scene, vec![Mesh::quad()])
    }

    #[test]
    fn depth_buffer_reads_far_outside() {
        let mut depth = DepthBuffer::new(2, 2);
        depth.set(1, 1, 0.25);
        depth.set(5, 5, 0.0);
        assert_eq!(depth.get(1, 1), 0.25);
        assert_eq!(depth.get(0, 0), 1.0);
        assert_eq!(depth.get(9, 0), 1.0);
    }

    #[test]
    fn mask_covers_quad_on_layer() {
        let (scene, meshes) = quad_scene(5);
        // A 2x2 quad in a 4x4 ortho view covers the middle half of the target
        let (mask, depth) =
            render_mask(&scene, &scene.camera, &meshes, LayerMask::layer(5), 16, 16);
        assert_eq!(mask.get_pixel(8, 8).0[0], 255);
        assert_eq!(mask.get_pixel(4, 4).0[0], 255);
        assert_eq!(mask.get_pixel(3, 8).0[0], 0);
        assert_eq!(mask.get_pixel(12, 8).0[0], 0);
        assert!(depth.get(8, 8) < 1.0);

        let (empty, _) = render_mask(&scene, &scene.camera, &meshes, LayerMask::layer(4), 16, 16);
        assert!(empty.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn back_faces_are_culled() {
        let (mut scene, meshes) = quad_scene(5);
        scene.camera.position = Vec3::new(0.0, 0.0, -5.0);
        let (mask, _) = render_mask(&scene, &scene.camera, &meshes, LayerMask::layer(5), 16, 16);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn composite_blocks_share_one_color() {
        let source =
            RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 30) as u8, (y * 30) as u8, 0, 255]));
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        let depth = DepthBuffer::new(8, 8);
        let settings = CensorSettings::new(LayerMask::layer(1)).with_pixel_size(4);
        let params = CensorParams::new(&settings, (8, 8), (8, 8), &Projection::default());
        let output = composite(&source, &depth, &mask, &depth, &params);
        for (x, y) in [(0, 0), (3, 3), (1, 2)] {
            assert_eq!(output.get_pixel(x, y), source.get_pixel(2, 2));
        }
        assert_eq!(output.get_pixel(7, 4), source.get_pixel(6, 6));
    }
}
