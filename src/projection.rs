//! View and projection matrix construction.
//!
//! Right-handed view space: the camera looks down -z, y is up. Projections map the view volume to
//! the [-1, 1] cube with the near plane's NDC z given by the depth convention.

use nalgebra as na;
use na::{matrix, Matrix4, Vector3};

use crate::config::DepthConvention;

/// Camera projection parameters. `fov_y` is in degrees, `near`/`far` are positive distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        half_height: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    pub fn matrix(&self, convention: DepthConvention) -> Matrix4<f32> {
        return match *self {
            Projection::Perspective { fov_y, aspect, near, far } => {
                perspective(fov_y, aspect, near, far, convention)
            }
            Projection::Orthographic { half_height, aspect, near, far } => {
                let half_width = aspect * half_height;
                orthographic(-half_width, half_width, -half_height, half_height, near, far, convention)
            }
        };
    }

    pub fn is_orthographic(&self) -> bool {
        return matches!(self, Projection::Orthographic { .. });
    }
}

/// Picks an up vector that is not parallel to `forward`.
fn usable_up(forward: Vector3<f32>, up: Vector3<f32>) -> Vector3<f32> {
    if forward.cross(&up).norm_squared() > 1e-12 {
        return up;
    }
    let fallback = if forward.z.abs() < 0.9 { Vector3::z() } else { Vector3::y() };
    return fallback;
}

/// World to view transform for a camera at `eye` looking along `forward`.
pub fn view_matrix(eye: Vector3<f32>, forward: Vector3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    // New coordinate system around the camera, z pointing backwards.
    let cam_z = -forward.normalize();
    let cam_x = usable_up(cam_z, up).cross(&cam_z).normalize();
    let cam_y = cam_z.cross(&cam_x);
    let rotate = matrix![cam_x.x, cam_x.y, cam_x.z, 0.0;
                         cam_y.x, cam_y.y, cam_y.z, 0.0;
                         cam_z.x, cam_z.y, cam_z.z, 0.0;
                         0.0,     0.0,     0.0,     1.0];
    let translate = matrix![1.0, 0.0, 0.0, -eye.x;
                            0.0, 1.0, 0.0, -eye.y;
                            0.0, 0.0, 1.0, -eye.z;
                            0.0, 0.0, 0.0, 1.0];
    return rotate * translate;
}

/// Orthographic projection of the box [l, r] x [b, t] x [-far, -near] in view space.
pub fn orthographic(
    l: f32,
    r: f32,
    b: f32,
    t: f32,
    near: f32,
    far: f32,
    convention: DepthConvention,
) -> Matrix4<f32> {
    // The OpenGL z row sends the near plane to -1; flipping it sends it to +1.
    let z_sign = -convention.near_ndc();
    let depth = far - near;
    return matrix![2.0 / (r - l), 0.0,           0.0,                    -(r + l) / (r - l);
                   0.0,           2.0 / (t - b), 0.0,                    -(t + b) / (t - b);
                   0.0,           0.0,           z_sign * -2.0 / depth,  z_sign * -(far + near) / depth;
                   0.0,           0.0,           0.0,                    1.0];
}

/// Perspective projection with a vertical field of view in degrees. Clip w is the view distance.
pub fn perspective(
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    convention: DepthConvention,
) -> Matrix4<f32> {
    let z_sign = -convention.near_ndc();
    let focal = 1.0 / (fov_y.to_radians() * 0.5).tan();
    return matrix![focal / aspect, 0.0,   0.0,                                        0.0;
                   0.0,            focal, 0.0,                                        0.0;
                   0.0,            0.0,   z_sign * (far + near) / (near - far),       z_sign * 2.0 * far * near / (near - far);
                   0.0,            0.0,   -1.0,                                       0.0];
}
