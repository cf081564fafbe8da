//! Scene management

mod camera;
mod layer;
mod transform;

pub use camera::*;
pub use layer::*;
pub use transform::*;

use bevy_ecs::prelude::*;
use glam::Vec3;

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub mesh_id: usize,
    pub material_id: usize,
    pub transform: Transform,
    /// Layer the object sits on, in `0..LAYER_COUNT`
    pub layer: u8,
}

impl RenderObject {
    pub fn new(mesh_id: usize, material_id: usize) -> Self {
        Self {
            mesh_id,
            material_id,
            transform: Transform::default(),
            layer: 0,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    /// Place the object on a layer. Out of range layers are clamped to the last one.
    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer.min(LAYER_COUNT - 1);
        self
    }

    /// Whether a camera or effect filtering on `mask` sees this object
    pub fn visible_in(&self, mask: LayerMask) -> bool {
        mask.contains_layer(self.layer)
    }
}

/// The scene containing all renderable content.
///
/// Post-processing profiles live as entities in an ECS world so effects can
/// look up their settings without holding references into the host.
pub struct Scene {
    pub camera: Camera,
    pub objects: Vec<RenderObject>,
    world: World,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            objects: Vec::new(),
            world: World::new(),
        }
    }

    /// Replace the main camera. The new camera always gets a fresh id, so
    /// commands attached to the previous one are not reused.
    pub fn set_camera(&mut self, mut camera: Camera) {
        camera.id = CameraId::next();
        log::debug!("Main camera changed to {:?}", camera.id);
        self.camera = camera;
    }

    /// Add a render object to the scene
    pub fn add_object(&mut self, object: RenderObject) -> usize {
        let id = self.objects.len();
        self.objects.push(object);
        id
    }

    /// Objects on any layer in `mask`
    pub fn objects_in(&self, mask: LayerMask) -> impl Iterator<Item = &RenderObject> {
        self.objects.iter().filter(move |o| o.visible_in(mask))
    }

    /// Spawn a post-processing profile entity
    pub fn spawn_profile<C: Bundle>(&mut self, profile: C) -> Entity {
        self.world.spawn(profile).id()
    }

    pub fn despawn_profile(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity)
    }

    pub fn profile<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.world.get::<C>(entity)
    }

    pub fn profile_mut<C: Component>(&mut self, entity: Entity) -> Option<Mut<'_, C>> {
        self.world.get_mut::<C>(entity)
    }

    pub fn world(&self) -> &World {
        &self.world
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Component, Debug, PartialEq)]
    struct Strength(u32);

    #[test]
    fn layer_filtering() {
        let mut scene = Scene::new();
        scene.add_object(RenderObject::new(0, 0).with_layer(5));
        scene.add_object(RenderObject::new(0, 0));
        scene.add_object(RenderObject::new(0, 0).with_layer(200));

        assert_eq!(scene.objects_in(LayerMask::layer(5)).count(), 1);
        assert_eq!(scene.objects_in(LayerMask::layer(31)).count(), 1);
        assert_eq!(scene.objects_in(LayerMask::EMPTY).count(), 0);
        assert_eq!(scene.objects_in(LayerMask::ALL).count(), 3);
    }

    #[test]
    fn set_camera_assigns_fresh_id() {
        let mut scene = Scene::new();
        let camera = scene.camera.clone();
        let old = scene.camera.id();
        scene.set_camera(camera);
        assert_ne!(scene.camera.id(), old);
    }

    #[test]
    fn profiles_round_trip_through_world() {
        let mut scene = Scene::new();
        let entity = scene.spawn_profile(Strength(3));
        assert_eq!(scene.profile::<Strength>(entity), Some(&Strength(3)));
        if let Some(mut strength) = scene.profile_mut::<Strength>(entity) {
            strength.0 = 7;
        }
        assert_eq!(scene.profile::<Strength>(entity), Some(&Strength(7)));
        assert!(scene.despawn_profile(entity));
        assert!(scene.profile::<Strength>(entity).is_none());
    }
}
