//! The three fork-join stages of a draw call: vertices, triangle setup and tiled scan conversion.

use std::sync::Arc;

use super::mesh::Attributes;
use super::parallel::{chunk_ranges, Workers};
use super::setup::Triangle;
use super::shader::{ShaderPass, Varyings};
use crate::config::DepthConvention;
use crate::frame::{Tile, TileGrid};

/// For every tile, the indices of the triangles whose bounds overlap it, in submission order.
pub fn bin_triangles(triangles: &[Triangle], grid: &TileGrid) -> Vec<Vec<usize>> {
    let mut bins = vec![Vec::new(); grid.tile_count()];
    for (index, triangle) in triangles.iter().enumerate() {
        if triangle.bounds.is_empty() {
            continue;
        }
        for tile in grid.tiles_for_rows(triangle.bounds.min_y..triangle.bounds.max_y) {
            bins[tile].push(index);
        }
    }
    return bins;
}

/// Scan converts the binned triangles into one tile. Triangles are visited in bin order, so
/// equal depths keep the first one drawn.
pub fn rasterize_tile<P: ShaderPass>(
    tile: &mut Tile,
    triangles: &[Triangle],
    bin: &[usize],
    pass: &P,
    convention: DepthConvention,
) {
    let rows = tile.row_range();
    for &index in bin {
        let triangle = &triangles[index];
        let bounds = triangle.bounds;
        for y in bounds.min_y.max(rows.start)..bounds.max_y.min(rows.end) {
            for x in bounds.min_x..bounds.max_x {
                let Some(sample) = triangle.sample(x, y) else { continue };
                if !convention.passes(sample.depth, tile.depth_at(x, y)) {
                    continue;
                }
                tile.set_depth(x, y, sample.depth);
                if !tile.has_color() {
                    continue;
                }
                let Some(fragment) = triangle.interpolate(&sample, x, y) else { continue };
                if let Some(color) = pass.fragment(&fragment) {
                    tile.set_color(x, y, color);
                }
            }
        }
    }
}

/// Runs one mesh through `pass` into `grid`. Returns how many triangles survived setup.
pub fn draw<P: ShaderPass>(
    workers: &Workers,
    pass: Arc<P>,
    attributes: &Arc<Attributes>,
    grid: &mut TileGrid,
    convention: DepthConvention,
) -> usize {
    if attributes.is_empty() {
        return 0;
    }
    let chunks = workers.count();

    // Vertex stage.
    let varyings: Vec<Varyings> = {
        let pass = Arc::clone(&pass);
        let attributes = Arc::clone(attributes);
        workers
            .fork_join(chunk_ranges(attributes.vertex_count(), chunks), move |range| {
                return range.map(|index| pass.vertex(&attributes, index)).collect::<Vec<_>>();
            })
            .into_iter()
            .flatten()
            .collect()
    };
    let varyings = Arc::new(varyings);

    // Triangle setup, keeping submission order.
    let width = grid.width();
    let height = grid.height();
    let triangles: Vec<Triangle> = {
        let attributes = Arc::clone(attributes);
        workers
            .fork_join(chunk_ranges(attributes.triangle_count(), chunks), move |range| {
                return range
                    .filter_map(|t| {
                        let [a, b, c] = attributes.triangle(t);
                        Triangle::setup([&varyings[a], &varyings[b], &varyings[c]], width, height)
                    })
                    .collect::<Vec<_>>();
            })
            .into_iter()
            .flatten()
            .collect()
    };
    let accepted = triangles.len();
    if accepted == 0 {
        return 0;
    }

    // Raster stage: every tile is owned by exactly one job.
    let bins = bin_triangles(&triangles, grid);
    let triangles = Arc::new(triangles);
    let jobs: Vec<(Tile, Vec<usize>)> = grid.take_tiles().into_iter().zip(bins).collect();
    let tiles = workers.fork_join(jobs, move |(mut tile, bin)| {
        rasterize_tile(&mut tile, &triangles, &bin, pass.as_ref(), convention);
        return tile;
    });
    grid.restore_tiles(tiles);

    return accepted;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::setup::Fragment;
    use crate::scene::util::{to_hom_point, Color};
    use nalgebra::{vector, Vector3};

    /// Positions are already in clip space; every fragment gets one color.
    struct FlatPass {
        color: Color,
    }

    impl ShaderPass for FlatPass {
        fn vertex(&self, attributes: &Attributes, index: usize) -> Varyings {
            return Varyings {
                clip_position: to_hom_point(attributes.position(index)),
                ..Default::default()
            };
        }

        fn fragment(&self, _fragment: &Fragment) -> Option<Color> {
            return Some(self.color);
        }
    }

    fn square(half: f32, z: f32) -> Arc<Attributes> {
        let positions = vec![
            vector![-half, -half, z],
            vector![half, -half, z],
            vector![half, half, z],
            vector![-half, half, z],
        ];
        let attributes = Attributes::new(positions, vec![Vector3::z(); 4], Vec::new(), vec![[0, 1, 2], [0, 2, 3]]);
        return Arc::new(attributes.unwrap());
    }

    fn render(order: &[(Arc<Attributes>, Color)], worker_count: usize, convention: DepthConvention) -> TileGrid {
        let workers = Workers::new(worker_count);
        let mut grid = TileGrid::new(40, 40, 3, true, convention.clear_value(), "test").unwrap();
        for (attributes, color) in order {
            draw(&workers, Arc::new(FlatPass { color: *color }), attributes, &mut grid, convention);
        }
        return grid;
    }

    fn assert_same(a: &TileGrid, b: &TileGrid) {
        for y in 0..a.height() {
            for x in 0..a.width() {
                assert_eq!(a.depth_at(x, y), b.depth_at(x, y), "depth at ({}, {})", x, y);
                assert_eq!(a.color_at(x, y), b.color_at(x, y), "color at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_depth_order_independent_of_submission_and_workers() {
        let red = vector![1.0, 0.0, 0.0, 1.0];
        let green = vector![0.0, 1.0, 0.0, 1.0];
        for convention in [DepthConvention::GreaterWins, DepthConvention::LessWins] {
            let near_z = convention.near_ndc() * 0.5;
            let near = (square(0.5, near_z), red);
            let far = (square(0.8, -near_z), green);

            let reference = render(&[near.clone(), far.clone()], 1, convention);
            assert_eq!(reference.color_at(20, 20), red);
            // Inside the far square only: it spans pixels 3.9..35.1.
            assert_eq!(reference.color_at(5, 5), green);
            assert_eq!(reference.color_at(0, 0), crate::scene::util::black());

            assert_same(&reference, &render(&[far.clone(), near.clone()], 1, convention));
            assert_same(&reference, &render(&[near.clone(), far.clone()], 7, convention));
            assert_same(&reference, &render(&[far, near], 7, convention));
        }
    }

    #[test]
    fn test_binning_follows_bounds() {
        let workers = Workers::new(1);
        let grid = TileGrid::new(40, 40, 3, false, 0.0, "test").unwrap();
        let attributes = square(0.5, 0.0);
        let pass = FlatPass { color: vector![1.0, 1.0, 1.0, 1.0] };
        let varyings: Vec<Varyings> = (0..4).map(|i| pass.vertex(&attributes, i)).collect();
        let triangles: Vec<Triangle> = (0..2)
            .filter_map(|t| {
                let [a, b, c] = attributes.triangle(t);
                Triangle::setup([&varyings[a], &varyings[b], &varyings[c]], 40, 40)
            })
            .collect();
        assert_eq!(triangles.len(), 2);

        let bins = bin_triangles(&triangles, &grid);
        assert_eq!(bins.len(), 14);
        // Square spans rows 9..30 (ndc -0.5..0.5 over 39 pixels).
        assert!(bins[0].is_empty());
        assert_eq!(bins[5], vec![0, 1]);
        assert!(bins[13].is_empty());
        assert_eq!(workers.count(), 1);
    }

    #[test]
    fn test_empty_mesh_is_a_no_op() {
        let workers = Workers::new(2);
        let mut grid = TileGrid::new(8, 8, 4, true, 0.0, "test").unwrap();
        let empty = Arc::new(Attributes::default());
        let pass = Arc::new(FlatPass { color: vector![1.0, 1.0, 1.0, 1.0] });
        assert_eq!(draw(&workers, pass, &empty, &mut grid, DepthConvention::GreaterWins), 0);
        assert_eq!(grid.depth_at(4, 4), 0.0);
    }
}
