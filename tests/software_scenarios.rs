//! Pixel-level censor scenarios on the CPU reference

use censor_effect::pipeline::censor::software::{
    composite, composite_with_coverage, render_mask, render_scene, DepthBuffer,
};
use censor_effect::pipeline::censor::{CensorParams, CensorSettings};
use censor_effect::resources::{Material, Mesh};
use censor_effect::scene::{Camera, LayerMask, Projection, RenderObject, Scene};
use glam::{Vec3, Vec4};
use image::{GrayImage, Rgba, RgbaImage};
use rstest::{fixture, rstest};

const SIZE: u32 = 200;

struct Fixture {
    scene: Scene,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
}

impl Fixture {
    fn params(&self, settings: &CensorSettings) -> CensorParams {
        self.params_with_mask(settings, SIZE)
    }

    fn params_with_mask(&self, settings: &CensorSettings, mask_size: u32) -> CensorParams {
        let projection = &self.scene.camera.projection;
        CensorParams::new(settings, (SIZE, SIZE), (mask_size, mask_size), projection)
    }

    fn render(&self) -> (RgbaImage, DepthBuffer) {
        render_scene(&self.scene, &self.meshes, &self.materials, SIZE, SIZE)
    }

    fn mask(&self, layers: LayerMask, size: u32) -> (GrayImage, DepthBuffer) {
        render_mask(&self.scene, &self.scene.camera, &self.meshes, layers, size, size)
    }
}

/// Orthographic view 4 units wide, so one unit is 50 pixels
fn ortho_scene() -> Scene {
    let mut scene = Scene::new();
    scene.set_camera(
        Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
            .with_projection(Projection::orthographic(4.0, 4.0, 0.1, 20.0)),
    );
    scene
}

fn fixture_with(scene: Scene, censored_color: Vec4) -> Fixture {
    Fixture {
        scene,
        meshes: vec![Mesh::cube()],
        materials: vec![
            Material::default(),
            Material::new("censored").with_base_color(censored_color),
        ],
    }
}

#[fixture]
fn two_cubes() -> Fixture {
    let mut scene = ortho_scene();
    scene.add_object(
        RenderObject::new(0, 1)
            .with_position(Vec3::new(-0.6, 0.4, 0.0))
            .with_scale(Vec3::splat(1.4))
            .with_layer(5),
    );
    scene.add_object(RenderObject::new(0, 0).with_position(Vec3::new(1.0, -1.0, 0.0)));
    fixture_with(scene, Vec4::new(0.9, 0.2, 0.2, 1.0))
}

/// A censored cube smaller than one 50 px block, half hidden behind an
/// uncensored cube
#[fixture]
fn occluded_small_cube() -> Fixture {
    let mut scene = ortho_scene();
    scene.add_object(RenderObject::new(0, 1).with_scale(Vec3::splat(0.4)).with_layer(5));
    scene.add_object(
        RenderObject::new(0, 0)
            .with_position(Vec3::new(0.2, 0.0, 1.0))
            .with_scale(Vec3::splat(0.4)),
    );
    fixture_with(scene, Vec4::new(0.2, 0.9, 0.2, 1.0))
}

/// A censored cube smaller than a block, off the mask texel grid
#[fixture]
fn off_grid_cube() -> Fixture {
    let mut scene = ortho_scene();
    scene.add_object(
        RenderObject::new(0, 1)
            .with_position(Vec3::new(0.37, -0.21, 0.0))
            .with_scale(Vec3::splat(0.33))
            .with_layer(5),
    );
    fixture_with(scene, Vec4::new(0.9, 0.9, 0.2, 1.0))
}

fn gradient() -> RgbaImage {
    RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        Rgba([x as u8, y as u8, ((x + y) / 2) as u8, 255])
    })
}

fn count(image: &GrayImage) -> usize {
    image.pixels().filter(|p| p.0[0] > 0).count()
}

#[rstest]
fn layer_regions_are_block_quantized(two_cubes: Fixture) {
    let settings = CensorSettings::new(LayerMask::layer(5)).with_pixel_size(50);
    let source = gradient();
    let (mask, mask_depth) = two_cubes.mask(settings.censor_layer, SIZE);
    let (_, scene_depth) = two_cubes.render();
    let params = two_cubes.params(&settings);
    let (output, coverage) =
        composite_with_coverage(&source, &scene_depth, &mask, &mask_depth, &params);

    let mut censored = 0;
    for (x, y, pixel) in output.enumerate_pixels() {
        if coverage.get_pixel(x, y).0[0] == 0 {
            assert_eq!(pixel, source.get_pixel(x, y), "uncovered pixel ({}, {}) changed", x, y);
        } else {
            censored += 1;
            let representative = source.get_pixel((x / 50) * 50 + 25, (y / 50) * 50 + 25);
            assert_eq!(pixel, representative, "covered pixel ({}, {})", x, y);
        }
    }
    // The 1.4 unit cube covers 70x70 pixels
    assert_eq!(censored, 70 * 70);
    // The uncensored cube stays out of the mask
    assert_eq!(mask.get_pixel(150, 150).0[0], 0);
}

#[rstest]
fn pixels_in_one_block_share_a_color(two_cubes: Fixture) {
    let settings = CensorSettings::new(LayerMask::layer(5)).with_pixel_size(50);
    let (mask, mask_depth) = two_cubes.mask(settings.censor_layer, SIZE);
    let source = gradient();
    let params = two_cubes.params(&settings);
    let output = composite(&source, &mask_depth, &mask, &mask_depth, &params);

    // Block (1, 1) lies inside the censored cube
    let expected = output.get_pixel(50, 50);
    for y in 50..100 {
        for x in 50..100 {
            if mask.get_pixel(x, y).0[0] == 255 {
                assert_eq!(output.get_pixel(x, y), expected);
            }
        }
    }
}

#[rstest]
fn show_mask_is_black_and_white(
    two_cubes: Fixture,
    #[values(1, 8, 50)] pixel_size: u32,
    #[values(false, true)] hard_edges: bool,
) {
    let settings = CensorSettings::new(LayerMask::layer(5))
        .with_pixel_size(pixel_size)
        .with_hard_edges(hard_edges)
        .with_show_mask(true);
    let (source, scene_depth) = two_cubes.render();
    let (mask, mask_depth) = two_cubes.mask(settings.censor_layer, SIZE);
    let params = two_cubes.params(&settings);
    let output = composite(&source, &scene_depth, &mask, &mask_depth, &params);

    for (x, y, pixel) in output.enumerate_pixels() {
        let m = mask.get_pixel(x, y).0[0];
        assert!(m == 0 || m == 255);
        assert_eq!(pixel.0, [m, m, m, 255]);
    }
}

#[rstest]
fn hard_edges_follow_the_silhouette(occluded_small_cube: Fixture) {
    let fixture = occluded_small_cube;
    let soft = CensorSettings::new(LayerMask::layer(5)).with_pixel_size(50);
    let hard = soft.clone().with_hard_edges(true);
    let (source, scene_depth) = fixture.render();
    let (mask, mask_depth) = fixture.mask(hard.censor_layer, SIZE);

    let (_, soft_coverage) =
        composite_with_coverage(&source, &scene_depth, &mask, &mask_depth, &fixture.params(&soft));
    let (hard_output, hard_coverage) =
        composite_with_coverage(&source, &scene_depth, &mask, &mask_depth, &fixture.params(&hard));

    // 0.4 units is 20x20 pixels; the occluder hides the right half
    assert_eq!(count(&mask), 20 * 20);
    assert_eq!(count(&soft_coverage), 20 * 20);
    assert_eq!(count(&hard_coverage), 10 * 20);

    for (x, y, covered) in hard_coverage.enumerate_pixels() {
        let in_mask = mask.get_pixel(x, y).0[0] > 0;
        let visible = (scene_depth.get(x, y) - mask_depth.get(x, y)).abs() < f32::EPSILON;
        assert_eq!(covered.0[0] > 0, in_mask && visible, "pixel ({}, {})", x, y);
        if covered.0[0] == 0 {
            assert_eq!(hard_output.get_pixel(x, y), source.get_pixel(x, y));
        }
    }
}

#[rstest]
#[case::quarter(50)]
#[case::uneven(64)]
#[case::full(SIZE)]
fn hard_edges_cover_the_silhouette_with_a_coarse_mask(
    off_grid_cube: Fixture,
    #[case] mask_size: u32,
) {
    let fixture = off_grid_cube;
    let settings = CensorSettings::new(LayerMask::layer(5))
        .with_pixel_size(50)
        .with_hard_edges(true);
    let (source, scene_depth) = fixture.render();
    let (silhouette, _) = fixture.mask(settings.censor_layer, SIZE);
    let (mask, mask_depth) = fixture.mask(settings.censor_layer, mask_size);
    let params = fixture.params_with_mask(&settings, mask_size);
    let (output, coverage) =
        composite_with_coverage(&source, &scene_depth, &mask, &mask_depth, &params);

    assert!(count(&silhouette) > 0);
    for (x, y, inside) in silhouette.enumerate_pixels() {
        let covered = coverage.get_pixel(x, y).0[0] > 0;
        assert_eq!(covered, inside.0[0] > 0, "pixel ({}, {})", x, y);
        if !covered {
            assert_eq!(output.get_pixel(x, y), source.get_pixel(x, y));
        }
    }
}

#[rstest]
fn empty_layer_mask_leaves_source_untouched(two_cubes: Fixture) {
    let settings = CensorSettings::new(LayerMask::EMPTY);
    let (source, scene_depth) = two_cubes.render();
    let (mask, mask_depth) = two_cubes.mask(settings.censor_layer, SIZE);
    let params = two_cubes.params(&settings);
    let output = composite(&source, &scene_depth, &mask, &mask_depth, &params);
    assert_eq!(output, source);
}

#[rstest]
fn composite_is_repeatable(two_cubes: Fixture) {
    let settings = CensorSettings::new(LayerMask::layer(5))
        .with_pixel_size(13)
        .with_hard_edges(true);
    let (source, scene_depth) = two_cubes.render();
    let (mask, mask_depth) = two_cubes.mask(settings.censor_layer, SIZE);
    let params = two_cubes.params(&settings);
    let first = composite(&source, &scene_depth, &mask, &mask_depth, &params);
    let second = composite(&source, &scene_depth, &mask, &mask_depth, &params);
    assert_eq!(first, second);
}
