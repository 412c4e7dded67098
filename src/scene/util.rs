use nalgebra as na;
use na::{vector, Vector3, Vector4};

/// RGBA color with float channels, nominally in [0, 1].
pub type Color = Vector4<f32>;

pub fn black() -> Color {
    return vector![0.0, 0.0, 0.0, 1.0];
}

pub fn white() -> Color {
    return vector![1.0, 1.0, 1.0, 1.0];
}

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Dropping the w component without dividing.
pub fn truncate(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x, v.y, v.z];
}

/// Float color to rgba8, saturating out of range channels.
pub fn to_rgba8(color: Color) -> [u8; 4] {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    return [channel(color.x), channel(color.y), channel(color.z), channel(color.w)];
}

/// Normalizes, leaving zero vectors alone instead of producing NaNs.
pub fn safe_normalize(v: Vector3<f32>) -> Vector3<f32> {
    let norm = v.norm();
    if norm <= f32::EPSILON {
        return v;
    }
    return v / norm;
}
