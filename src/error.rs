use thiserror::Error;

/// Everything that can go wrong while building a renderer or its inputs.
/// Drawing itself never fails: culled, clipped and degenerate triangles are silently skipped.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },

    #[error("triangle {triangle} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: usize,
        vertex_count: usize,
    },

    #[error("attribute `{name}` has {len} entries, expected {expected}")]
    AttributeLength {
        name: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;
