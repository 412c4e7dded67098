//! Multithreaded CPU rasterizer: a shadow map pass followed by a Blinn-Phong base pass with
//! percentage closer filtered shadows.

pub mod config;
pub mod error;
pub mod frame;
pub mod projection;
pub mod scene;

pub use config::{DepthConvention, DisplayMode, RenderConfig, ShadowConfig};
pub use error::{RenderError, RenderResult};
pub use projection::Projection;
pub use scene::buffer::{Camera, Light};
pub use scene::mesh::{Attributes, RenderObject, Transform};
pub use scene::{FrameInputs, FrameStats, Renderer};
