mod app;

use std::env;

use soft_renderer::{DisplayMode, RenderConfig};

/// Value following a flag, or an error naming the flag.
fn flag_value(args: &[String], i: usize) -> Result<String, Box<dyn std::error::Error>> {
    return match args.get(i + 1) {
        Some(value) => Ok(value.clone()),
        None => Err(format!("missing value after {}", args[i]).into()),
    };
}

#[show_image::main]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Default values.
    let mut model_path = None;
    let mut config_path = None;
    let mut display_mode = None;
    let mut output_path = None;

    let args: Vec<String> = env::args().collect();
    for i in 1..args.len() {
        match args[i].as_str() {
            "-p" => { model_path = Some(flag_value(&args, i)?); }
            "-c" => { config_path = Some(flag_value(&args, i)?); }
            "-m" => {
                display_mode = Some(match flag_value(&args, i)?.as_str() {
                    "color" => DisplayMode::Color,
                    "depth" => DisplayMode::Depth,
                    "shadow_map" => DisplayMode::ShadowMap,
                    other => return Err(format!("unknown display mode {}", other).into()),
                });
            }
            "-o" => { output_path = Some(flag_value(&args, i)?); }
            _ => ()
        }
    }

    let mut config = match config_path {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    if let Some(mode) = display_mode {
        config.display_mode = mode;
    }

    let params = app::Params {
        config,
        print_fps: true,
        model_path,
        output_path,
    };

    app::run(params)?;

    return Ok(());
}
