//! Triangle setup shared by every pass: clip and cull tests, viewport mapping, coverage and
//! perspective-correct interpolation. Base and shadow passes both go through here, so they
//! always agree on which triangles and pixels exist.

use nalgebra as na;
use na::{vector, Vector2, Vector3, Vector4};

use super::shader::Varyings;
use super::util::{truncate, Color};

/// Barycentric coordinates down to this value still count as inside, so pixel centers lying
/// exactly on a shared edge are not lost between neighbours.
pub const COVERAGE_EPSILON: f32 = -1e-4;

/// Twice the screen area (in pixels) below which a triangle has no coverage.
const DEGENERATE_AREA: f32 = 1e-8;

/// Flat buffer index of a pixel.
pub fn pixel_index(x: usize, y: usize, width: usize) -> usize {
    return x + y * width;
}

/// Signed doubled area of (a, b, p); positive when counter-clockwise.
pub fn edge(a: Vector2<f32>, b: Vector2<f32>, p: Vector2<f32>) -> f32 {
    return (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
}

/// Barycentric coordinates of `p` with respect to the xy of `verts`, or None for a degenerate
/// triangle.
pub fn barycentric(p: Vector2<f32>, verts: &[Vector3<f32>; 3]) -> Option<Vector3<f32>> {
    let a = verts[0].xy();
    let b = verts[1].xy();
    let c = verts[2].xy();
    let area = edge(a, b, c);
    if area.abs() < DEGENERATE_AREA {
        return None;
    }
    return Some(vector![edge(b, c, p) / area, edge(c, a, p) / area, edge(a, b, p) / area]);
}

/// True when every vertex lies outside the same homogeneous clip plane. Triangles straddling a
/// plane are kept.
pub fn is_clipped(clip: &[Vector4<f32>; 3]) -> bool {
    let all = |outside: fn(&Vector4<f32>) -> bool| clip.iter().all(outside);
    return all(|v| v.x < -v.w.abs())
        || all(|v| v.x > v.w.abs())
        || all(|v| v.y < -v.w.abs())
        || all(|v| v.y > v.w.abs())
        || all(|v| v.z < -v.w.abs())
        || all(|v| v.z > v.w.abs());
}

/// Clockwise in screen space (y up) means we are looking at the back.
pub fn is_backface(screen: &[Vector3<f32>; 3]) -> bool {
    let e01 = screen[1] - screen[0];
    let e12 = screen[2] - screen[1];
    return e01.x * e12.y - e01.y * e12.x < 0.0;
}

/// NDC to pixel coordinates, z to the [0, 1] depth range.
pub fn to_viewport(ndc: Vector3<f32>, width: usize, height: usize) -> Vector3<f32> {
    return vector![
        (ndc.x + 1.0) * 0.5 * (width - 1) as f32,
        (ndc.y + 1.0) * 0.5 * (height - 1) as f32,
        ndc.z * 0.5 + 0.5
    ];
}

/// Pixel rectangle [min_x, max_x) x [min_y, max_y) that may be covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenBounds {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl ScreenBounds {
    pub fn is_empty(&self) -> bool {
        return self.min_x >= self.max_x || self.min_y >= self.max_y;
    }
}

/// Floor of the min corner, ceil of the max corner, clamped to the screen.
pub fn screen_bounds(screen: &[Vector3<f32>; 3], width: usize, height: usize) -> ScreenBounds {
    let clamp = |value: f32, limit: usize| value.max(0.0).min(limit as f32) as usize;
    let min_x = screen[0].x.min(screen[1].x).min(screen[2].x).floor();
    let min_y = screen[0].y.min(screen[1].y).min(screen[2].y).floor();
    let max_x = screen[0].x.max(screen[1].x).max(screen[2].x).ceil();
    let max_y = screen[0].y.max(screen[1].y).max(screen[2].y).ceil();
    return ScreenBounds {
        min_x: clamp(min_x, width),
        min_y: clamp(min_y, height),
        max_x: clamp(max_x, width),
        max_y: clamp(max_y, height),
    };
}

/// A vertex after viewport mapping, with what the fragment stage interpolates.
#[derive(Debug, Clone, Copy)]
pub struct TriangleVert {
    pub screen: Vector3<f32>, // Pixel x, y and depth.
    pub clip_w: f32,
    pub world_position: Vector3<f32>,
    pub world_normal: Vector3<f32>,
    pub color: Color,
    pub uv: Vector2<f32>,
}

/// Coverage of one pixel center.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub barycentric: Vector3<f32>, // Screen-space weights.
    pub depth: f32,
}

/// Interpolated surface values at a covered pixel.
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub x: usize,
    pub y: usize,
    pub depth: f32,
    pub world_position: Vector3<f32>,
    pub world_normal: Vector3<f32>,
    pub color: Color,
    pub uv: Vector2<f32>,
}

/// A triangle that survived clipping and culling, ready to be scan converted.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub verts: [TriangleVert; 3],
    pub bounds: ScreenBounds,
}

impl Triangle {
    /// Clip test, perspective divide, back-face test and viewport mapping. None means the
    /// triangle produces no pixels.
    pub fn setup(varyings: [&Varyings; 3], width: usize, height: usize) -> Option<Triangle> {
        let clip = varyings.map(|v| v.clip_position);
        if is_clipped(&clip) {
            return None;
        }
        // Behind the eye plane the divide flips signs; such triangles are dropped whole.
        if clip.iter().any(|v| !(v.w > 0.0)) {
            return None;
        }

        let screen = clip.map(|v| to_viewport(truncate(v) / v.w, width, height));
        if is_backface(&screen) {
            return None;
        }

        let mut verts = [TriangleVert {
            screen: Vector3::zeros(),
            clip_w: 1.0,
            world_position: Vector3::zeros(),
            world_normal: Vector3::zeros(),
            color: Color::zeros(),
            uv: Vector2::zeros(),
        }; 3];
        for i in 0..3 {
            verts[i] = TriangleVert {
                screen: screen[i],
                clip_w: clip[i].w,
                world_position: varyings[i].world_position,
                world_normal: varyings[i].world_normal,
                color: varyings[i].color,
                uv: varyings[i].uv,
            };
        }

        return Some(Triangle {
            verts,
            bounds: screen_bounds(&screen, width, height),
        });
    }

    fn screen(&self) -> [Vector3<f32>; 3] {
        return [self.verts[0].screen, self.verts[1].screen, self.verts[2].screen];
    }

    /// Coverage and depth at the center of pixel (x, y). Depth is affine in screen space, so it
    /// uses the plain barycentric weights.
    pub fn sample(&self, x: usize, y: usize) -> Option<Sample> {
        let p = vector![x as f32 + 0.5, y as f32 + 0.5];
        let screen = self.screen();
        let barycentric = barycentric(p, &screen)?;
        if barycentric.iter().any(|&weight| weight < COVERAGE_EPSILON) {
            return None;
        }
        let depth = barycentric.dot(&vector![screen[0].z, screen[1].z, screen[2].z]);
        return Some(Sample { barycentric, depth });
    }

    /// Perspective-correct interpolation of the vertex attributes for a covered sample.
    pub fn interpolate(&self, sample: &Sample, x: usize, y: usize) -> Option<Fragment> {
        let v = &self.verts;
        let co = sample
            .barycentric
            .component_div(&vector![v[0].clip_w, v[1].clip_w, v[2].clip_w]);
        let sum = co.sum();
        if sum.abs() < f32::EPSILON {
            return None;
        }
        let w = co / sum;

        return Some(Fragment {
            x,
            y,
            depth: sample.depth,
            world_position: v[0].world_position * w.x + v[1].world_position * w.y + v[2].world_position * w.z,
            world_normal: v[0].world_normal * w.x + v[1].world_normal * w.y + v[2].world_normal * w.z,
            color: v[0].color * w.x + v[1].color * w.y + v[2].color * w.z,
            uv: v[0].uv * w.x + v[1].uv * w.y + v[2].uv * w.z,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DepthConvention;
    use crate::projection::{perspective, view_matrix};
    use crate::scene::util::{to_hom_point, white};
    use na::Matrix4;

    fn varyings_at(clip: Vector4<f32>, world: Vector3<f32>) -> Varyings {
        return Varyings {
            clip_position: clip,
            world_position: world,
            world_normal: Vector3::z(),
            uv: Vector2::zeros(),
            color: white(),
        };
    }

    fn triangle_from_clip(clip: [Vector4<f32>; 3]) -> Option<Triangle> {
        let v = clip.map(|c| varyings_at(c, Vector3::zeros()));
        return Triangle::setup([&v[0], &v[1], &v[2]], 100, 100);
    }

    #[test]
    fn test_barycentric_one_hot_at_vertices() {
        let verts = [vector![10.0, 10.0, 0.0], vector![80.0, 20.0, 0.0], vector![30.0, 70.0, 0.0]];
        for i in 0..3 {
            let bc = barycentric(verts[i].xy(), &verts).unwrap();
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((bc[j] - expected).abs() < 1e-4);
            }
        }
        let inside = barycentric(vector![40.0, 33.0], &verts).unwrap();
        assert!((inside.sum() - 1.0).abs() < 1e-5);
        assert!(inside.iter().all(|&w| w > 0.0));
    }

    #[test]
    fn test_degenerate_triangle_has_no_barycentric() {
        let verts = [vector![0.0, 0.0, 0.0], vector![10.0, 10.0, 0.0], vector![20.0, 20.0, 0.0]];
        assert!(barycentric(vector![5.0, 5.0], &verts).is_none());
    }

    #[test]
    fn test_clipped_on_every_half_space() {
        let inside = [vector![0.0, 0.0, 0.0, 1.0], vector![0.5, 0.0, 0.0, 1.0], vector![0.0, 0.5, 0.0, 1.0]];
        assert!(!is_clipped(&inside));
        assert!(triangle_from_clip(inside).is_some());

        for axis in 0..3 {
            for side in [-1.0, 1.0] {
                let mut outside = inside;
                for v in outside.iter_mut() {
                    v[axis] = side * (1.5 + v[axis].abs());
                }
                assert!(is_clipped(&outside), "axis {} side {}", axis, side);
                assert!(triangle_from_clip(outside).is_none());
            }
        }

        // Spread over two different planes: not rejected by the conservative test.
        let straddling = [vector![-2.0, 0.0, 0.0, 1.0], vector![2.0, 0.0, 0.0, 1.0], vector![0.0, 2.0, 0.0, 1.0]];
        assert!(!is_clipped(&straddling));
    }

    #[test]
    fn test_backface_rejected() {
        let front = [vector![-0.5, -0.5, 0.0, 1.0], vector![0.5, -0.5, 0.0, 1.0], vector![0.0, 0.5, 0.0, 1.0]];
        let back = [front[0], front[2], front[1]];
        assert!(triangle_from_clip(front).is_some());
        assert!(triangle_from_clip(back).is_none());
        let mut back_near = back;
        for v in back_near.iter_mut() {
            v.z = 0.9;
        }
        assert!(triangle_from_clip(back_near).is_none());
    }

    #[test]
    fn test_behind_eye_rejected() {
        let clip = [vector![0.0, 0.0, 0.0, -1.0], vector![0.5, 0.0, 0.0, 1.0], vector![0.0, 0.5, 0.0, 1.0]];
        assert!(triangle_from_clip(clip).is_none());
    }

    #[test]
    fn test_viewport_and_bounds() {
        let corner = to_viewport(vector![1.0, -1.0, -1.0], 100, 50);
        assert_eq!(corner, vector![99.0, 0.0, 0.0]);
        let bounds = screen_bounds(
            &[vector![-5.0, 2.5, 0.0], vector![40.2, 7.0, 0.0], vector![10.0, 120.0, 0.0]],
            100,
            100,
        );
        assert_eq!(bounds, ScreenBounds { min_x: 0, min_y: 2, max_x: 41, max_y: 100 });
        assert_eq!(pixel_index(3, 2, 100), 203);
    }

    #[test]
    fn test_perspective_correct_world_position() {
        let width = 200;
        let height = 200;
        let view = view_matrix(vector![0.3, 0.2, 4.0], vector![0.0, 0.0, -1.0], Vector3::y());
        let projection = perspective(60.0, 1.0, 0.5, 20.0, DepthConvention::GreaterWins);
        let view_projection: Matrix4<f32> = projection * view;

        // Strongly slanted in depth.
        let world = [vector![-1.0, -1.0, 1.0], vector![1.5, -0.5, -6.0], vector![-0.5, 1.5, -2.0]];
        let varyings = world.map(|p| varyings_at(view_projection * to_hom_point(p), p));
        let triangle = Triangle::setup([&varyings[0], &varyings[1], &varyings[2]], width, height).unwrap();

        let inverse = view_projection.try_inverse().unwrap();
        let bounds = triangle.bounds;
        let mut checked = 0;
        for y in bounds.min_y..bounds.max_y {
            for x in bounds.min_x..bounds.max_x {
                let Some(sample) = triangle.sample(x, y) else { continue };
                let fragment = triangle.interpolate(&sample, x, y).unwrap();

                // Ground truth: unproject the pixel center at the interpolated depth.
                let ndc = vector![
                    (x as f32 + 0.5) / ((width - 1) as f32 * 0.5) - 1.0,
                    (y as f32 + 0.5) / ((height - 1) as f32 * 0.5) - 1.0,
                    sample.depth * 2.0 - 1.0,
                    1.0
                ];
                let unprojected = inverse * ndc;
                let expected = truncate(unprojected) / unprojected.w;

                assert!(
                    (fragment.world_position - expected).norm() < 1e-3,
                    "pixel ({}, {}): {:?} vs {:?}",
                    x,
                    y,
                    fragment.world_position,
                    expected
                );
                checked += 1;
            }
        }
        assert!(checked > 1000, "only {} pixels covered", checked);
    }
}
