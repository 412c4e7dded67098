use std::sync::Arc;

use nalgebra as na;
use na::{vector, Matrix4, Vector2, Vector3, Vector4};

use super::buffer::UniformBuffer;
use super::mesh::Attributes;
use super::setup::Fragment;
use super::shadow::visibility;
use super::util::{safe_normalize, to_hom_point, to_hom_vector, truncate, white, Color};
use crate::config::{DepthConvention, ShadowConfig};
use crate::frame::ShadowBuffer;

/// Vertex stage output, one per vertex.
#[derive(Debug, Clone, Copy)]
pub struct Varyings {
    pub clip_position: Vector4<f32>,
    pub world_position: Vector3<f32>,
    pub world_normal: Vector3<f32>,
    pub uv: Vector2<f32>,
    pub color: Color,
}

impl Default for Varyings {
    fn default() -> Self {
        return Self {
            clip_position: Vector4::zeros(),
            world_position: Vector3::zeros(),
            world_normal: Vector3::zeros(),
            uv: Vector2::zeros(),
            color: white(),
        };
    }
}

/// One pass through the pipeline. Passes are shared read-only between workers, so everything
/// they need is captured at construction.
pub trait ShaderPass: Send + Sync + 'static {
    fn vertex(&self, attributes: &Attributes, index: usize) -> Varyings;

    /// Color for a fragment that passed the depth test, None for depth-only passes.
    fn fragment(&self, fragment: &Fragment) -> Option<Color>;
}

/// Renders the depth of an object as seen from the light.
pub struct ShadowPass {
    light_mvp: Matrix4<f32>,
}

impl ShadowPass {
    pub fn new(uniforms: &UniformBuffer) -> Self {
        return Self { light_mvp: uniforms.light_mvp() };
    }
}

impl ShaderPass for ShadowPass {
    fn vertex(&self, attributes: &Attributes, index: usize) -> Varyings {
        return Varyings {
            clip_position: self.light_mvp * to_hom_point(attributes.position(index)),
            ..Default::default()
        };
    }

    fn fragment(&self, _fragment: &Fragment) -> Option<Color> {
        return None;
    }
}

/// Lit and shadowed camera view of an object.
pub struct BasePass {
    mvp: Matrix4<f32>,
    normal_matrix: Matrix4<f32>,
    uniforms: UniformBuffer,
    shadow: Arc<ShadowBuffer>,
    settings: ShadowConfig,
    convention: DepthConvention,
}

impl BasePass {
    pub fn new(
        uniforms: &UniformBuffer,
        shadow: Arc<ShadowBuffer>,
        settings: ShadowConfig,
        convention: DepthConvention,
    ) -> Self {
        return Self {
            mvp: uniforms.mvp(),
            normal_matrix: uniforms.normal_matrix(),
            uniforms: *uniforms,
            shadow,
            settings,
            convention,
        };
    }
}

impl ShaderPass for BasePass {
    fn vertex(&self, attributes: &Attributes, index: usize) -> Varyings {
        let position = to_hom_point(attributes.position(index));
        return Varyings {
            clip_position: self.mvp * position,
            world_position: truncate(self.uniforms.model_matrix * position),
            world_normal: truncate(self.normal_matrix * to_hom_vector(attributes.normal(index))),
            uv: attributes.uv(index),
            color: white(),
        };
    }

    fn fragment(&self, fragment: &Fragment) -> Option<Color> {
        let lit = visibility(
            &self.shadow.grid,
            &self.uniforms.light_view_projection,
            fragment.world_position,
            &self.settings,
            self.convention,
        );
        return Some(blinn_phong(&self.uniforms, fragment, lit));
    }
}

/// Ambient, diffuse and specular terms scaled by the light and surface colors, then by `lit`
/// (the unshadowed fraction). Alpha is the surface alpha.
pub fn blinn_phong(uniforms: &UniformBuffer, fragment: &Fragment, lit: f32) -> Color {
    let normal = safe_normalize(fragment.world_normal);
    let to_light = uniforms.light_direction;
    // Parallel projection: every view ray has the same direction.
    let to_camera = if uniforms.orthographic {
        -uniforms.camera_forward
    } else {
        safe_normalize(uniforms.camera_position - fragment.world_position)
    };
    let half = safe_normalize(to_light + to_camera);

    let ambient = 0.5;
    let diffuse = 0.8 * normal.dot(&to_light).max(0.0);
    let specular = 0.7 * normal.dot(&half).max(0.0).powi(256);
    let intensity = (ambient + diffuse + specular) * lit;

    let surface = uniforms.albedo.component_mul(&fragment.color);
    let rgb = truncate(surface).component_mul(&truncate(uniforms.light_color)) * intensity;
    return vector![rgb.x, rgb.y, rgb.z, surface.w];
}
