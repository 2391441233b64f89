//! Full-screen shader passes rendered into off-screen textures.
//!
//! The crate is a thin layer over `wgpu` shaped like the WebGL2 calls it
//! stands in for. A [`Context`] owns the device together with the state GL
//! keeps implicitly (current program, texture units, bound framebuffer and
//! per-program uniform values). The flow for one pass is:
//!
//! ```text
//!   compile_shader ─┐
//!                   ├─▶ link_program ─▶ Program
//!   compile_shader ─┘                      │
//!                                          ▼
//!   ShaderParameters ──▶ draw_to_texture(target) ──▶ read_pixels_to_canvas ─▶ Canvas
//! ```
//!
//! Fragment sources are GLSL in the ES 3.00 dialect with loose `uniform`
//! declarations. [`compile_shader`] rewrites them into GLSL 450 for naga: value
//! uniforms move into one std140 block and every `sampler2D`/`sampler3D`
//! becomes a texture/sampler pair. Parameters are then bound by name, with
//! textures assigned units in ascending name order starting at
//! [`FIRST_TEXTURE_UNIT`].
//!
//! Everything is synchronous. Readback blocks until the copy is mapped.

mod compile;
mod context;
mod draw;
mod error;
mod format;
mod pipeline;
mod program;
mod readback;
mod scope;
mod texture;
mod uniforms;

pub use compile::{compile_shader, SamplerSlot, Shader, ShaderStage};
pub use context::{
    new_context, Context, ContextOptions, ContextState, TextureUnit, DEFAULT_SURFACE_HEIGHT,
    DEFAULT_SURFACE_WIDTH,
};
pub use draw::{
    draw_full_screen, draw_to_texture, draw_to_texture_layer, Framebuffer, TARGET_HEIGHT_UNIFORM,
    TARGET_WIDTH_UNIFORM,
};
pub use error::{RenderError, Result};
pub use format::{ComponentType, FormatDescriptor, FormatPreset, ParsePresetError, PixelChannels};
pub use pipeline::FULL_SCREEN_VERTICES;
pub use program::{
    create_full_screen_program, link_program, Program, ProgramId, ProgramInterface, UniformSlot,
    FULL_SCREEN_VERTEX_SOURCE,
};
pub use readback::{read_pixels, read_pixels_layer, read_pixels_to_canvas, Canvas};
pub use texture::{
    new_texture, new_texture_2d, new_texture_3d, FilterPolicy, ParseFilterError, SizedTexture,
    TextureDimension, TextureId, TextureSpec,
};
pub use uniforms::{
    bind_parameters, uniform_defined, ParameterValue, ShaderParameters, UniformKind,
    UniformValues, FIRST_TEXTURE_UNIT,
};
