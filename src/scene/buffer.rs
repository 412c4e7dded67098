use nalgebra as na;
use na::{vector, Matrix4, Vector3};

use super::mesh::RenderObject;
use super::util::{safe_normalize, white, Color};
use crate::config::{DepthConvention, ShadowConfig};
use crate::projection::{orthographic, view_matrix, Projection};

/// Viewer placement and lens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vector3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
    pub projection: Projection,
}

/// The single directional light. `direction` is where the light travels, `position` only places
/// the shadow camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub color: Vector3<f32>,
    pub intensity: f32,
}

/// Per-frame constants shared by the vertex and fragment stages. Copied into every pass, so it
/// stays read-only while a stage runs.
#[derive(Debug, Clone, Copy)]
pub struct UniformBuffer {
    pub camera_position: Vector3<f32>,
    pub camera_forward: Vector3<f32>,
    pub camera_up: Vector3<f32>,
    pub orthographic: bool, // Parallel view rays, view direction is the same for every fragment.
    pub light_position: Vector3<f32>,
    pub light_direction: Vector3<f32>, // Unit vector pointing towards the light.
    pub light_color: Color,            // Color already scaled by intensity.
    pub model_matrix: Matrix4<f32>,
    pub view_matrix: Matrix4<f32>,
    pub projection_matrix: Matrix4<f32>,
    pub light_view_projection: Matrix4<f32>,
    pub albedo: Color,
}

impl Default for UniformBuffer {
    fn default() -> Self {
        return Self {
            camera_position: Vector3::zeros(),
            camera_forward: -Vector3::z(),
            camera_up: Vector3::y(),
            orthographic: false,
            light_position: Vector3::zeros(),
            light_direction: Vector3::z(),
            light_color: white(),
            model_matrix: Matrix4::identity(),
            view_matrix: Matrix4::identity(),
            projection_matrix: Matrix4::identity(),
            light_view_projection: Matrix4::identity(),
            albedo: white(),
        };
    }
}

impl UniformBuffer {
    /// Camera and light state for a frame. Model matrix and albedo are set per object.
    pub fn new(camera: &Camera, light: &Light, shadow: &ShadowConfig, convention: DepthConvention) -> Self {
        let light_color = light.color * light.intensity;
        return Self {
            camera_position: camera.position,
            camera_forward: safe_normalize(camera.forward),
            camera_up: safe_normalize(camera.up),
            orthographic: camera.projection.is_orthographic(),
            light_position: light.position,
            light_direction: -safe_normalize(light.direction),
            light_color: vector![light_color.x, light_color.y, light_color.z, 1.0],
            model_matrix: Matrix4::identity(),
            view_matrix: view_matrix(camera.position, camera.forward, camera.up),
            projection_matrix: camera.projection.matrix(convention),
            light_view_projection: light_view_projection(light, shadow, convention),
            albedo: white(),
        };
    }

    /// Per draw call state.
    pub fn set_object(&mut self, object: &RenderObject) {
        self.model_matrix = object.transform.model_matrix();
        self.albedo = object.albedo;
    }

    /// Model-view-projection: object space to clip space.
    pub fn mvp(&self) -> Matrix4<f32> {
        return self.projection_matrix * self.view_matrix * self.model_matrix;
    }

    /// Object space to the light's clip space.
    pub fn light_mvp(&self) -> Matrix4<f32> {
        return self.light_view_projection * self.model_matrix;
    }

    /// Inverse transpose of the model matrix, applied to normals. Falls back to the identity
    /// for singular (zero scale) models.
    pub fn normal_matrix(&self) -> Matrix4<f32> {
        return match self.model_matrix.try_inverse() {
            Some(inverse) => inverse.transpose(),
            None => {
                log::warn!("model matrix is singular, normals are left untransformed");
                Matrix4::identity()
            }
        };
    }
}

/// The shadow camera: an orthographic box around the light position, looking where the light
/// travels.
pub fn light_view_projection(light: &Light, shadow: &ShadowConfig, convention: DepthConvention) -> Matrix4<f32> {
    let view = view_matrix(light.position, light.direction, Vector3::y());
    let e = shadow.half_extent;
    let projection = orthographic(-e, e, -e, e, shadow.near, shadow.far, convention);
    return projection * view;
}
