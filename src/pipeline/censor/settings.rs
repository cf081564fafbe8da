//! Censor profile settings

use crate::pipeline::censor::error::CensorError;
use crate::scene::LayerMask;
use bevy_ecs::prelude::*;

pub const MIN_PIXEL_SIZE: u32 = 1;
pub const MAX_PIXEL_SIZE: u32 = 256;
pub const DEFAULT_PIXEL_SIZE: u32 = 50;
pub const DEFAULT_DEPTH_TOLERANCE: f32 = 0.02;

/// One censor entry of a post-processing profile. Lives on a profile entity
/// in the scene world and is read-only while rendering.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct CensorSettings {
    pub enabled: bool,
    /// Layers whose objects get censored
    pub censor_layer: LayerMask,
    pixel_size: u32,
    /// Crop censorship to the objects' silhouettes using scene depth
    pub hard_edges: bool,
    /// Debug: output the raw coverage mask
    pub show_mask: bool,
    /// Relative linear depth difference still treated as the same surface
    pub depth_tolerance: f32,
}

impl Default for CensorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            censor_layer: LayerMask::EMPTY,
            pixel_size: DEFAULT_PIXEL_SIZE,
            hard_edges: false,
            show_mask: false,
            depth_tolerance: DEFAULT_DEPTH_TOLERANCE,
        }
    }
}

impl CensorSettings {
    pub fn new(censor_layer: LayerMask) -> Self {
        Self {
            censor_layer,
            ..Default::default()
        }
    }

    pub fn with_pixel_size(mut self, pixel_size: u32) -> Self {
        self.set_pixel_size(pixel_size);
        self
    }

    pub fn with_hard_edges(mut self, hard_edges: bool) -> Self {
        self.hard_edges = hard_edges;
        self
    }

    pub fn with_show_mask(mut self, show_mask: bool) -> Self {
        self.show_mask = show_mask;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_depth_tolerance(mut self, tolerance: f32) -> Self {
        self.depth_tolerance = tolerance.max(0.0);
        self
    }

    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    /// Block edge length in pixels, clamped to [1, 256]
    pub fn set_pixel_size(&mut self, pixel_size: u32) {
        self.pixel_size = pixel_size.clamp(MIN_PIXEL_SIZE, MAX_PIXEL_SIZE);
    }

    /// An empty layer mask censors nothing, so the effect is skipped
    pub fn is_enabled_and_supported(&self) -> bool {
        self.enabled && !self.censor_layer.is_empty()
    }

    /// Blend two profiles. Flags switch as soon as `t` leaves 0, the layer
    /// mask only once `t` reaches 1.
    pub fn interp(from: &Self, to: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let pick = |a: bool, b: bool| if t > 0.0 { b } else { a };
        let (from_size, to_size) = (from.pixel_size as f32, to.pixel_size as f32);
        let pixel_size = from_size + (to_size - from_size) * t;
        Self {
            enabled: pick(from.enabled, to.enabled),
            censor_layer: LayerMask::interp(from.censor_layer, to.censor_layer, t),
            pixel_size: (pixel_size as u32).clamp(MIN_PIXEL_SIZE, MAX_PIXEL_SIZE),
            hard_edges: pick(from.hard_edges, to.hard_edges),
            show_mask: pick(from.show_mask, to.show_mask),
            depth_tolerance: from.depth_tolerance + (to.depth_tolerance - from.depth_tolerance) * t,
        }
    }
}

/// The single enabled censor profile in `world`, if any. More than one is an
/// unsupported configuration.
pub fn resolve_active_settings(world: &World) -> Result<Option<CensorSettings>, CensorError> {
    let active: Vec<&CensorSettings> = world
        .iter_entities()
        .filter_map(|entity| entity.get::<CensorSettings>())
        .filter(|settings| settings.is_enabled_and_supported())
        .collect();

    match active.as_slice() {
        [] => Ok(None),
        [settings] => Ok(Some((*settings).clone())),
        many => Err(CensorError::MultipleActiveProfiles(many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(50, 50)]
    #[case(256, 256)]
    #[case(1000, 256)]
    fn pixel_size_is_clamped(#[case] requested: u32, #[case] expected: u32) {
        let settings = CensorSettings::default().with_pixel_size(requested);
        assert_eq!(settings.pixel_size(), expected);
    }

    #[test]
    fn empty_layer_mask_is_not_supported() {
        assert!(!CensorSettings::default().is_enabled_and_supported());
        assert!(CensorSettings::new(LayerMask::layer(5)).is_enabled_and_supported());
        assert!(!CensorSettings::new(LayerMask::layer(5))
            .with_enabled(false)
            .is_enabled_and_supported());
    }

    #[test]
    fn interp_blends_field_wise() {
        let from = CensorSettings::new(LayerMask::layer(1)).with_pixel_size(10);
        let to = CensorSettings::new(LayerMask::layer(2))
            .with_pixel_size(30)
            .with_hard_edges(true);

        let start = CensorSettings::interp(&from, &to, 0.0);
        assert_eq!(start, from);

        let mid = CensorSettings::interp(&from, &to, 0.5);
        assert_eq!(mid.pixel_size(), 20);
        assert_eq!(mid.censor_layer, LayerMask::layer(1));
        assert!(mid.hard_edges);

        assert_eq!(CensorSettings::interp(&from, &to, 1.0).censor_layer, LayerMask::layer(2));
    }

    #[test]
    fn resolving_profiles() {
        let mut world = World::new();
        assert!(matches!(resolve_active_settings(&world), Ok(None)));

        world.spawn(CensorSettings::default());
        assert!(matches!(resolve_active_settings(&world), Ok(None)));

        world.spawn(CensorSettings::new(LayerMask::layer(5)));
        let resolved = resolve_active_settings(&world).unwrap();
        assert_eq!(resolved.map(|s| s.censor_layer), Some(LayerMask::layer(5)));

        world.spawn(CensorSettings::new(LayerMask::layer(6)));
        assert!(matches!(
            resolve_active_settings(&world),
            Err(CensorError::MultipleActiveProfiles(2))
        ));
    }
}
