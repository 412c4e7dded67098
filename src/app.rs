use std::f32::consts::FRAC_PI_2;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time;

use nalgebra as na;
use na::{vector, Vector3};
use obj::{load_obj, Obj, TexturedVertex};
use show_image::{create_window, event, ImageInfo, ImageView, WindowOptions};

use soft_renderer::{
    Attributes, Camera, FrameInputs, Light, Projection, RenderConfig, RenderObject, Renderer, Transform,
};

pub struct Params {
    pub config: RenderConfig,
    pub print_fps: bool,
    pub model_path: Option<String>, // Built-in cube when missing.
    pub output_path: Option<String>, // Render one frame into this file instead of opening a window.
}

/// Helper, defining exit event to be an Escape key press.
fn is_exit_event(window_event: event::WindowEvent) -> bool {
    if let event::WindowEvent::KeyboardInput(event) = window_event {
        if event.input.key_code == Some(event::VirtualKeyCode::Escape) && event.input.state.is_released() {
            return true;
        }
    }

    return false;
}

/// Reads positions, normals and texture coordinates of an OBJ file.
fn load_model(path: &str) -> Result<Attributes, Box<dyn std::error::Error>> {
    let model: Obj<TexturedVertex, u32> = load_obj(BufReader::new(File::open(path)?))?;
    log::info!("{}: {} vertices, {} triangles", path, model.vertices.len(), model.indices.len() / 3);

    let positions = model.vertices.iter().map(|v| vector![v.position[0], v.position[1], v.position[2]]).collect();
    let normals = model.vertices.iter().map(|v| vector![v.normal[0], v.normal[1], v.normal[2]]).collect();
    let uvs = model.vertices.iter().map(|v| vector![v.texture[0], v.texture[1]]).collect();
    return Ok(Attributes::from_flat_indices(positions, normals, uvs, &model.indices)?);
}

/// The model on a ground plane.
fn build_objects(model: Attributes) -> Vec<RenderObject> {
    let model = RenderObject::new(Arc::new(model)).with_albedo(vector![0.9, 0.6, 0.4, 1.0]);
    let ground = RenderObject::new(Arc::new(Attributes::quad()))
        .with_transform(Transform {
            translation: vector![0.0, -0.5, 0.0],
            rotation: vector![-FRAC_PI_2, 0.0, 0.0],
            scale: vector![10.0, 10.0, 1.0],
        })
        .with_albedo(vector![0.7, 0.7, 0.7, 1.0]);
    return vec![model, ground];
}

/// Camera circling the origin, `time` in seconds.
fn orbit_camera(time: f32, aspect: f32) -> Camera {
    let angle = 0.3 * time;
    let position = vector![4.0 * angle.sin(), 2.0, 4.0 * angle.cos()];
    return Camera {
        position,
        forward: -position,
        up: Vector3::y(),
        projection: Projection::Perspective { fov_y: 60.0, aspect, near: 0.1, far: 100.0 },
    };
}

/// Renders the scene, either once into a file or continuously into a window.
pub fn run(params: Params) -> Result<(), Box<dyn std::error::Error>> {
    let width = params.config.width;
    let height = params.config.height;
    let aspect = width as f32 / height as f32;
    let mut renderer = Renderer::new(params.config)?.with_stats_callback(|stats| {
        log::debug!(
            "{} vertices, {} of {} triangles drawn",
            stats.vertices,
            stats.triangles,
            stats.submitted
        );
    });

    let model = match params.model_path.as_deref() {
        Some(path) => load_model(path)?,
        None => Attributes::cube(),
    };
    let objects = build_objects(model);
    let position = vector![3.0, 6.0, 4.0];
    let light = Light {
        position,
        direction: -position,
        color: vector![1.0, 1.0, 1.0],
        intensity: 1.0,
    };

    if let Some(path) = params.output_path {
        renderer.render(&FrameInputs { camera: orbit_camera(0.0, aspect), light, objects: &objects });
        renderer.image().save(&path)?;
        log::info!("saved {}", path);
        return Ok(());
    }

    let window_options: WindowOptions = WindowOptions {
        size: Some([width, height]),
        ..Default::default()
    };
    let window = create_window("output", window_options)?;
    let event_channel = window.event_channel()?;

    let mut exit = false;
    let time_begin = time::Instant::now();
    let mut frame_counter_time_begin = time::Instant::now();
    let mut frame_counter: u32 = 0;
    while !exit {
        let passed_time = time::Instant::now()
            .duration_since(time_begin)
            .as_secs_f32();
        renderer.render(&FrameInputs { camera: orbit_camera(passed_time, aspect), light, objects: &objects });

        let image = renderer.image();
        let image_data = ImageView::new(ImageInfo::rgba8(image.width(), image.height()), image.as_raw());
        window.set_image("image", image_data)?;

        // Unloading all the garbage from event channel, that has piled up, looking for exit event.
        exit = event_channel.try_iter()
            .fold(false, |was_exit_event, window_event| is_exit_event(window_event) || was_exit_event);

        if params.print_fps {
            // Counting frames to printout stats every second.
            frame_counter += 1;
            if time::Instant::now()
                .duration_since(frame_counter_time_begin)
                .as_secs_f32() > 1.0 {
                log::info!("FPS --- {}", frame_counter);
                frame_counter_time_begin = time::Instant::now();
                frame_counter = 0;
            }
        }
    }

    return Ok(());
}
