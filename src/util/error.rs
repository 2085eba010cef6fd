//! Error types for the renderer.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A shading stage failed to compile
    #[error("Failed to compile {stage} stage:\n{log}")]
    Compile { stage: &'static str, log: String },

    /// A program failed to link (pipeline creation rejected its interface)
    #[error("Failed to link {program} program:\n{log}")]
    Link { program: &'static str, log: String },

    /// Scene buffer could not be allocated
    #[error("Scene upload of {count} primitives failed: {reason}")]
    Upload { count: usize, reason: String },

    /// Pass images could not be allocated at the requested size
    #[error("Resize to {width}x{height} failed: {reason}")]
    Resize { width: u32, height: u32, reason: String },

    /// A pass was configured with missing, mis-sized or aliased resources
    #[error("Binding contract violated: {0}")]
    BindingContract(String),

    /// Pipeline configuration out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device lacks a required feature or limit
    #[error("Unsupported device: {0}")]
    Unsupported(String),

    /// A GPU image could not be copied back to the host
    #[error("Readback failed: {0}")]
    Readback(String),

    /// I/O error (shader sources, image export)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Create a binding contract error.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::BindingContract(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors produced by shader compilation or linking.
    pub fn is_program_error(&self) -> bool {
        matches!(self, Self::Compile { .. } | Self::Link { .. })
    }
}

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, Error>;
