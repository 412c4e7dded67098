use std::sync::Arc;

use nalgebra as na;
use na::{vector, Matrix4, Rotation3, Vector2, Vector3};

use super::util::{white, Color};
use crate::error::{RenderError, RenderResult};

/// Immutable per-mesh vertex data in the right-handed shading space. Front faces are wound
/// counter-clockwise when looked at from the side their normal points to.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    positions: Vec<Vector3<f32>>,
    normals: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    indices: Vec<[usize; 3]>,
}

impl Attributes {
    /// Builds mesh buffers, checking that every attribute has one entry per vertex and every
    /// triangle only references existing vertices. Empty `uvs` are filled with zeros.
    pub fn new(
        positions: Vec<Vector3<f32>>,
        normals: Vec<Vector3<f32>>,
        mut uvs: Vec<Vector2<f32>>,
        indices: Vec<[usize; 3]>,
    ) -> RenderResult<Self> {
        let vertex_count = positions.len();
        if normals.len() != vertex_count {
            return Err(RenderError::AttributeLength {
                name: "normal",
                len: normals.len(),
                expected: vertex_count,
            });
        }
        if uvs.is_empty() {
            uvs = vec![Vector2::zeros(); vertex_count];
        } else if uvs.len() != vertex_count {
            return Err(RenderError::AttributeLength {
                name: "uv",
                len: uvs.len(),
                expected: vertex_count,
            });
        }
        for (triangle, face) in indices.iter().enumerate() {
            if let Some(&index) = face.iter().find(|&&index| index >= vertex_count) {
                return Err(RenderError::IndexOutOfRange { triangle, index, vertex_count });
            }
        }

        return Ok(Self { positions, normals, uvs, indices });
    }

    /// Same as `new`, for data authored in a left-handed space: z of positions and normals is
    /// negated once here, so nothing downstream flips axes. Mirroring also turns clockwise
    /// front faces into the counter-clockwise ones the culler keeps, so indices are left as is.
    pub fn from_left_handed(
        mut positions: Vec<Vector3<f32>>,
        mut normals: Vec<Vector3<f32>>,
        uvs: Vec<Vector2<f32>>,
        indices: Vec<[usize; 3]>,
    ) -> RenderResult<Self> {
        for position in positions.iter_mut() {
            position.z = -position.z;
        }
        for normal in normals.iter_mut() {
            normal.z = -normal.z;
        }
        return Self::new(positions, normals, uvs, indices);
    }

    /// Splits a flat index list (3 entries per triangle) into triangles.
    pub fn from_flat_indices(
        positions: Vec<Vector3<f32>>,
        normals: Vec<Vector3<f32>>,
        uvs: Vec<Vector2<f32>>,
        flat_indices: &[u32],
    ) -> RenderResult<Self> {
        if flat_indices.len() % 3 != 0 {
            return Err(RenderError::AttributeLength {
                name: "index",
                len: flat_indices.len(),
                expected: flat_indices.len() / 3 * 3,
            });
        }
        let indices = flat_indices
            .chunks_exact(3)
            .map(|face| [face[0] as usize, face[1] as usize, face[2] as usize])
            .collect();
        return Self::new(positions, normals, uvs, indices);
    }

    pub fn vertex_count(&self) -> usize {
        return self.positions.len();
    }

    pub fn triangle_count(&self) -> usize {
        return self.indices.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.positions.is_empty() || self.indices.is_empty();
    }

    pub fn position(&self, index: usize) -> Vector3<f32> {
        return self.positions[index];
    }

    pub fn normal(&self, index: usize) -> Vector3<f32> {
        return self.normals[index];
    }

    pub fn uv(&self, index: usize) -> Vector2<f32> {
        return self.uvs[index];
    }

    pub fn triangle(&self, index: usize) -> [usize; 3] {
        return self.indices[index];
    }

    /// Unit square in the xy plane centered at the origin, facing +z.
    pub fn quad() -> Self {
        let positions = vec![
            vector![-0.5, -0.5, 0.0],
            vector![0.5, -0.5, 0.0],
            vector![0.5, 0.5, 0.0],
            vector![-0.5, 0.5, 0.0],
        ];
        let normals = vec![Vector3::z(); 4];
        let uvs = vec![vector![0.0, 0.0], vector![1.0, 0.0], vector![1.0, 1.0], vector![0.0, 1.0]];
        let indices = vec![[0, 1, 2], [0, 2, 3]];
        return Self { positions, normals, uvs, indices };
    }

    /// Unit cube centered at the origin, 4 vertices per face so normals stay flat.
    pub fn cube() -> Self {
        let face_normals: [Vector3<f32>; 6] = [
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ];
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(12);
        for normal in face_normals {
            // u x v == normal keeps every face counter-clockwise from outside.
            let u = vector![normal.y, normal.z, normal.x];
            let v = normal.cross(&u);
            let center = normal * 0.5;
            let base = positions.len();
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                positions.push(center + u * su + v * sv);
                normals.push(normal);
                uvs.push(vector![su + 0.5, sv + 0.5]);
            }
            indices.push([base, base + 1, base + 2]);
            indices.push([base, base + 2, base + 3]);
        }
        return Self { positions, normals, uvs, indices };
    }
}

/// Object placement: translation, Euler rotation in radians (applied z, then x, then y) and
/// non-uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        return Self {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: vector![1.0, 1.0, 1.0],
        };
    }
}

impl Transform {
    pub fn model_matrix(&self) -> Matrix4<f32> {
        let rot_x = Rotation3::from_axis_angle(&Vector3::x_axis(), self.rotation.x);
        let rot_y = Rotation3::from_axis_angle(&Vector3::y_axis(), self.rotation.y);
        let rot_z = Rotation3::from_axis_angle(&Vector3::z_axis(), self.rotation.z);
        let rotation = (rot_y * rot_x * rot_z).to_homogeneous();
        let scale = Matrix4::new_nonuniform_scaling(&self.scale);
        let translation = Matrix4::new_translation(&self.translation);
        return translation * rotation * scale;
    }
}

/// One drawable: shared mesh buffers, placement and a flat material color.
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub attributes: Arc<Attributes>,
    pub transform: Transform,
    pub albedo: Color,
}

impl RenderObject {
    pub fn new(attributes: Arc<Attributes>) -> Self {
        return Self {
            attributes,
            transform: Transform::default(),
            albedo: white(),
        };
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        return self;
    }

    pub fn with_albedo(mut self, albedo: Color) -> Self {
        self.albedo = albedo;
        return self;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Vector4;

    #[test]
    fn test_rejects_out_of_range_index() {
        let result = Attributes::new(
            vec![Vector3::zeros(); 3],
            vec![Vector3::z(); 3],
            Vec::new(),
            vec![[0, 1, 3]],
        );
        assert!(matches!(
            result,
            Err(RenderError::IndexOutOfRange { triangle: 0, index: 3, vertex_count: 3 })
        ));
    }

    #[test]
    fn test_rejects_mismatched_normals() {
        let result = Attributes::new(vec![Vector3::zeros(); 3], vec![Vector3::z(); 2], Vec::new(), Vec::new());
        assert!(matches!(result, Err(RenderError::AttributeLength { name: "normal", .. })));
    }

    #[test]
    fn test_flat_indices() {
        let attributes = Attributes::from_flat_indices(
            vec![Vector3::zeros(); 4],
            vec![Vector3::z(); 4],
            Vec::new(),
            &[0, 1, 2, 0, 2, 3],
        )
        .unwrap();
        assert_eq!(attributes.triangle_count(), 2);
        assert_eq!(attributes.triangle(1), [0, 2, 3]);
        assert_eq!(attributes.uv(3), Vector2::zeros());
        assert!(Attributes::from_flat_indices(Vec::new(), Vec::new(), Vec::new(), &[0, 1]).is_err());
    }

    #[test]
    fn test_left_handed_import_flips_z_once() {
        let attributes = Attributes::from_left_handed(
            vec![vector![1.0, 2.0, 3.0]],
            vec![vector![0.0, 0.0, 1.0]],
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(attributes.position(0), vector![1.0, 2.0, -3.0]);
        assert_eq!(attributes.normal(0), vector![0.0, 0.0, -1.0]);
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_cube_faces_wind_outwards() {
        let cube = Attributes::cube();
        assert_eq!(cube.vertex_count(), 24);
        for t in 0..cube.triangle_count() {
            let [a, b, c] = cube.triangle(t);
            let face_normal = (cube.position(b) - cube.position(a)).cross(&(cube.position(c) - cube.position(a)));
            assert!(face_normal.dot(&cube.normal(a)) > 0.0);
        }
    }

    #[test]
    fn test_model_matrix_order() {
        let transform = Transform {
            translation: vector![1.0, 0.0, 0.0],
            rotation: vector![0.0, std::f32::consts::FRAC_PI_2, 0.0],
            scale: vector![2.0, 1.0, 1.0],
        };
        // Scale x by 2, yaw 90 degrees (x -> -z), then translate.
        let moved = transform.model_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((moved - Vector4::new(1.0, 0.0, -2.0, 1.0)).norm() < 1e-5);
    }
}
