pub mod buffer;
pub mod mesh;
pub mod parallel;
pub mod raster;
pub mod setup;
pub mod shader;
pub mod shadow;
pub mod util;

use std::sync::Arc;

use image::RgbaImage;

use crate::config::{DisplayMode, RenderConfig};
use crate::error::RenderResult;
use crate::frame::{FrameBuffer, ShadowBuffer};
use buffer::{Camera, Light, UniformBuffer};
use mesh::RenderObject;
use parallel::Workers;
use shader::{BasePass, ShadowPass};

/// Counters for one frame, reset by `clear`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub vertices: usize,  // Vertices shaded in the base pass.
    pub triangles: usize, // Base pass triangles that survived clipping and culling.
    pub submitted: usize, // Base pass triangles submitted.
}

pub type StatsCallback = Box<dyn FnMut(FrameStats) + Send>;

/// Everything a frame is rendered from.
pub struct FrameInputs<'a> {
    pub camera: Camera,
    pub light: Light,
    pub objects: &'a [RenderObject],
}

/// Owns the render targets and the worker pool. A frame is
/// clear -> setup_uniforms -> draw_shadow (every object) -> draw (every object) -> flush,
/// either step by step or through `render`.
pub struct Renderer {
    config: RenderConfig,
    workers: Workers,
    frame: FrameBuffer,
    shadow: Arc<ShadowBuffer>, // Shared read-only with base passes while they run.
    uniforms: UniformBuffer,
    stats: FrameStats,
    stats_callback: Option<StatsCallback>,
}

impl Renderer {
    /// Validates the config and allocates every buffer the renderer will ever use.
    pub fn new(config: RenderConfig) -> RenderResult<Self> {
        config.validate()?;
        let convention = config.depth_convention;
        let frame = FrameBuffer::new(config.width, config.height, config.tile_rows, convention)?;
        let shadow = ShadowBuffer::new(config.shadow.resolution, config.tile_rows, convention)?;
        let workers = Workers::new(config.worker_count());
        log::info!(
            "renderer {}x{}, shadow map {}x{}, {} workers, {:?}",
            config.width,
            config.height,
            config.shadow.resolution,
            config.shadow.resolution,
            workers.count(),
            convention
        );

        return Ok(Self {
            config,
            workers,
            frame,
            shadow: Arc::new(shadow),
            uniforms: UniformBuffer::default(),
            stats: FrameStats::default(),
            stats_callback: None,
        });
    }

    /// Called with the frame stats on every `flush`, whether it comes from `render` or the step API.
    pub fn with_stats_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(FrameStats) + Send + 'static,
    {
        self.stats_callback = Some(Box::new(callback));
        return self;
    }

    /// Renders a whole frame and flushes it to the presentable image.
    pub fn render(&mut self, inputs: &FrameInputs) -> FrameStats {
        self.clear();
        self.setup_uniforms(&inputs.camera, &inputs.light);
        for object in inputs.objects {
            self.draw_shadow(object);
        }
        for object in inputs.objects {
            self.draw(object);
        }
        self.flush();
        return self.stats;
    }

    /// Resets color to black, depth to the convention's far value and the frame counters.
    pub fn clear(&mut self) {
        let convention = self.config.depth_convention;
        self.frame.clear(convention);
        Arc::make_mut(&mut self.shadow).clear(convention);
        self.stats = FrameStats::default();
    }

    /// Camera and light for the following draws.
    pub fn setup_uniforms(&mut self, camera: &Camera, light: &Light) {
        self.uniforms = UniformBuffer::new(camera, light, &self.config.shadow, self.config.depth_convention);
    }

    /// Renders an object's depth into the shadow map.
    pub fn draw_shadow(&mut self, object: &RenderObject) {
        self.uniforms.set_object(object);
        let pass = Arc::new(ShadowPass::new(&self.uniforms));
        let shadow = Arc::make_mut(&mut self.shadow);
        let accepted = raster::draw(
            &self.workers,
            pass,
            &object.attributes,
            &mut shadow.grid,
            self.config.depth_convention,
        );
        log::debug!(
            "shadow pass: {} of {} triangles accepted",
            accepted,
            object.attributes.triangle_count()
        );
    }

    /// Renders an object into the frame buffer, shadowed by whatever is in the shadow map.
    pub fn draw(&mut self, object: &RenderObject) {
        self.uniforms.set_object(object);
        let pass = Arc::new(BasePass::new(
            &self.uniforms,
            Arc::clone(&self.shadow),
            self.config.shadow,
            self.config.depth_convention,
        ));
        let accepted = raster::draw(
            &self.workers,
            pass,
            &object.attributes,
            &mut self.frame.grid,
            self.config.depth_convention,
        );

        let submitted = object.attributes.triangle_count();
        self.stats.vertices += object.attributes.vertex_count();
        self.stats.triangles += accepted;
        self.stats.submitted += submitted;
        log::debug!("base pass: {} of {} triangles accepted", accepted, submitted);
    }

    /// Copies the target picked by the display mode into its presentable image and reports the
    /// frame stats.
    pub fn flush(&mut self) -> &RgbaImage {
        let convention = self.config.depth_convention;
        match self.config.display_mode {
            DisplayMode::ShadowMap => Arc::make_mut(&mut self.shadow).flush(convention),
            mode => self.frame.flush(mode, convention),
        }
        let stats = self.stats;
        if let Some(callback) = self.stats_callback.as_mut() {
            callback(stats);
        }
        return self.image();
    }

    /// The last flushed image for the current display mode.
    pub fn image(&self) -> &RgbaImage {
        return match self.config.display_mode {
            DisplayMode::ShadowMap => self.shadow.image(),
            _ => self.frame.image(),
        };
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        return &self.frame;
    }

    pub fn shadow_buffer(&self) -> &ShadowBuffer {
        return &self.shadow;
    }

    pub fn uniforms(&self) -> &UniformBuffer {
        return &self.uniforms;
    }

    pub fn stats(&self) -> FrameStats {
        return self.stats;
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.config.display_mode = mode;
    }

    pub fn config(&self) -> &RenderConfig {
        return &self.config;
    }
}
