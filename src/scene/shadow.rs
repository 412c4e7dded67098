//! Percentage closer filtering of the shadow map.

use nalgebra as na;
use na::{vector, Matrix4, Vector3, Vector4};

use super::setup::to_viewport;
use super::util::{to_hom_point, truncate};
use crate::config::{DepthConvention, ShadowConfig};
use crate::frame::TileGrid;

/// Poisson disc offsets in a unit circle.
pub const POISSON_DISK: [[f32; 2]; 16] = [
    [-0.94201624, -0.39906216],
    [0.94558609, -0.76890725],
    [-0.094184101, -0.92938870],
    [0.34495938, 0.29387760],
    [-0.91588581, 0.45771432],
    [-0.81544232, -0.87912464],
    [-0.38277543, 0.27676845],
    [0.97484398, 0.75648379],
    [0.44323325, -0.97511554],
    [0.53742981, -0.47373420],
    [-0.26496911, -0.41893023],
    [0.79197514, 0.19090188],
    [-0.24188840, 0.99706507],
    [-0.81409955, 0.91437590],
    [0.19984126, 0.78641367],
    [0.14383161, -0.14100790],
];

/// Cheap pseudo random value in [0, 1).
pub fn hash(seed: Vector4<f32>) -> f32 {
    let value = seed.dot(&vector![12.9898, 78.233, 45.164, 94.673]).sin() * 43758.5453;
    return value - value.floor();
}

/// Tap order for a world position: a Fisher-Yates shuffle of the disc indices.
pub fn sample_order(world_position: &Vector3<f32>) -> [usize; 16] {
    let mut order: [usize; 16] = std::array::from_fn(|i| i);
    let p = world_position * 100.0;
    for i in (1..order.len()).rev() {
        let r = hash(vector![p.x, p.y, p.z, i as f32]);
        let j = ((r * (i + 1) as f32) as usize).min(i);
        order.swap(i, j);
    }
    return order;
}

/// Fraction of shadow map taps around `world_position` that do not occlude it: 1 is fully lit,
/// 0 fully shadowed.
pub fn visibility(
    shadow: &TileGrid,
    light_view_projection: &Matrix4<f32>,
    world_position: Vector3<f32>,
    settings: &ShadowConfig,
    convention: DepthConvention,
) -> f32 {
    let clip = light_view_projection * to_hom_point(world_position);
    if !(clip.w > 0.0) {
        return 1.0;
    }
    let width = shadow.width();
    let height = shadow.height();
    let texel = to_viewport(truncate(clip) / clip.w, width, height);

    let samples = settings.samples.clamp(1, POISSON_DISK.len());
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let mut lit = 0;
    for &k in sample_order(&world_position).iter().take(samples) {
        let [dx, dy] = POISSON_DISK[k];
        let x = (texel.x + dx * settings.kernel_radius).floor().clamp(0.0, max_x) as usize;
        let y = (texel.y + dy * settings.kernel_radius).floor().clamp(0.0, max_y) as usize;
        if convention.is_lit(texel.z, shadow.depth_at(x, y), settings.bias) {
            lit += 1;
        }
    }
    return lit as f32 / samples as f32;
}
