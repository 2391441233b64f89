use std::path::PathBuf;

use thiserror::Error;

use crate::compile::ShaderStage;
use crate::uniforms::UniformKind;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Every failure the helper layer can report. None of them are retried; the
/// caller decides whether the demo can continue.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create rendering context: {0}")]
    ContextCreation(String),

    #[error("failed to compile {stage} shader:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("failed to link program:\n{log}")]
    ProgramLink { log: String },

    #[error("uniform `{name}` is not declared by the active program")]
    UnknownUniform { name: String },

    #[error("uniform `{name}` is declared as {expected} but was given a {actual}")]
    UniformTypeMismatch {
        name: String,
        expected: UniformKind,
        actual: &'static str,
    },

    #[error("no program is active")]
    NoActiveProgram,

    #[error("failed to create texture: {0}")]
    TextureCreation(String),

    #[error("framebuffer is not complete: {0}")]
    IncompleteFramebuffer(String),

    #[error("texture bound to `{name}` is also the render target")]
    FeedbackLoop { name: String },

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid image data: {0}")]
    ImageData(String),

    #[error("failed to write image {}: {source}", path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
