//! Mesh data structures and generation

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3, Vec4};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Iterate triangles as vertex positions
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(move |tri| {
            let a = self.vertices.get(tri[0] as usize)?.position;
            let b = self.vertices.get(tri[1] as usize)?.position;
            let c = self.vertices.get(tri[2] as usize)?.position;
            Some([a, b, c])
        })
    }

    /// Append a quad given its four corners in counter-clockwise order
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, tangent: Vec4) {
        let base = self.vertices.len() as u32;
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        for (position, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(Vertex {
                position,
                normal,
                uv,
                tangent,
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        for normal in [Vec3::Z, -Vec3::Z, Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y] {
            // Face basis: u along the tangent, v completing a right-handed frame
            let u = if normal.y.abs() > 0.9 {
                Vec3::X
            } else {
                Vec3::Y.cross(normal)
            };
            let v = normal.cross(u);
            let center = normal * 0.5;
            let corners = [
                center - u * 0.5 - v * 0.5,
                center + u * 0.5 - v * 0.5,
                center + u * 0.5 + v * 0.5,
                center - u * 0.5 + v * 0.5,
            ];
            mesh.push_quad(corners, normal, u.extend(1.0));
        }

        mesh
    }

    /// Create a unit quad in the XY plane facing +Z
    pub fn quad() -> Self {
        let mut mesh = Mesh::new("quad");
        mesh.push_quad(
            [
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            Vec3::Z,
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );
        mesh
    }

    /// Create a plane on the XZ axis
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);

        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;
        let origin = Vec3::new(-width / 2.0, 0.0, -depth / 2.0);

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let corner = origin + Vec3::new(x as f32 * step_x, 0.0, z as f32 * step_z);
                mesh.push_quad(
                    [
                        corner + Vec3::new(0.0, 0.0, step_z),
                        corner + Vec3::new(step_x, 0.0, step_z),
                        corner + Vec3::new(step_x, 0.0, 0.0),
                        corner,
                    ],
                    Vec3::Y,
                    Vec4::new(1.0, 0.0, 0.0, 1.0),
                );
            }
        }

        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counter-clockwise when viewed from outside
    fn faces_outward(mesh: &Mesh) -> bool {
        mesh.triangles().all(|[a, b, c]| {
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            normal.dot(centroid) > 0.0
        })
    }

    #[test]
    fn cube_winding_faces_outward() {
        let cube = Mesh::cube();
        assert_eq!(cube.triangle_count(), 12);
        assert!(faces_outward(&cube));
    }

    #[test]
    fn quad_and_plane_face_their_normal() {
        let quad = Mesh::quad();
        assert!(quad
            .triangles()
            .all(|[a, b, c]| (b - a).cross(c - a).z > 0.0));

        let plane = Mesh::plane(2.0, 2.0, 2);
        assert_eq!(plane.triangle_count(), 8);
        assert!(plane
            .triangles()
            .all(|[a, b, c]| (b - a).cross(c - a).y > 0.0));
    }
}
