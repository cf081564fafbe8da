//! Camera system

use crate::scene::layer::LayerMask;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CAMERA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a camera, used to key camera commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraId(pub(crate) u64);

impl CameraId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CAMERA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a camera does with its target before drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearFlags {
    SolidColor([f32; 4]),
    /// Keep color, clear depth only
    DepthOnly,
    Nothing,
}

impl Default for ClearFlags {
    fn default() -> Self {
        ClearFlags::SolidColor([0.1, 0.1, 0.15, 1.0])
    }
}

/// Camera projection type
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => *far,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }

    pub fn is_orthographic(&self) -> bool {
        matches!(self, Projection::Orthographic { .. })
    }

    /// Convert a [0, 1] depth buffer value back to view distance
    pub fn linearize_depth(&self, depth: f32) -> f32 {
        let (near, far) = (self.near(), self.far());
        match self {
            Projection::Perspective { .. } => near * far / (far - depth * (far - near)),
            Projection::Orthographic { .. } => near + depth * (far - near),
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub(crate) id: CameraId,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    /// Layers this camera renders
    pub culling_mask: LayerMask,
    pub clear: ClearFlags,
    /// Render order; lower depth renders first
    pub depth: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            id: CameraId::next(),
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
            culling_mask: LayerMask::ALL,
            clear: ClearFlags::default(),
            depth: 0.0,
        }
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_culling_mask(mut self, mask: LayerMask) -> Self {
        self.culling_mask = mask;
        self
    }

    pub fn with_clear(mut self, clear: ClearFlags) -> Self {
        self.clear = clear;
        self
    }

    /// Take over pose and projection from another camera
    pub fn copy_view_from(&mut self, other: &Camera) {
        self.position = other.position;
        self.target = other.target;
        self.up = other.up;
        self.projection = other.projection;
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        let view_proj = proj * view;

        CameraUniformData {
            view,
            proj,
            view_proj,
            position: self.position.extend(1.0),
            near_far: Vec4::new(
                self.projection.near(),
                self.projection.far(),
                if self.projection.is_orthographic() { 1.0 } else { 0.0 },
                0.0,
            ),
        }
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.projection.set_aspect(width / height);
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub position: Vec4,
    /// near, far, 1.0 for orthographic
    pub near_far: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linearize_inverts_projection() {
        let projection = Projection::perspective(60.0, 1.0, 0.5, 100.0);
        let proj = projection.matrix();
        for distance in [0.5f32, 1.0, 7.5, 42.0, 100.0] {
            let clip = proj * Vec4::new(0.0, 0.0, -distance, 1.0);
            let depth = clip.z / clip.w;
            let back = projection.linearize_depth(depth);
            assert!((back - distance).abs() < distance * 1e-3, "{} -> {}", distance, back);
        }

        let ortho = Projection::orthographic(4.0, 4.0, 1.0, 11.0);
        assert!((ortho.linearize_depth(0.5) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn cameras_get_distinct_ids() {
        let a = Camera::default();
        let b = Camera::default();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
