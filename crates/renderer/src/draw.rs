//! Full-screen passes into the bound framebuffer.

use wgpu::util::DeviceExt;

use crate::compile::{SamplerSlot, UNIFORM_GROUP, SAMPLER_GROUP};
use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::pipeline::{build_pipeline, PassLayouts, FULL_SCREEN_VERTICES};
use crate::program::Program;
use crate::scope::ErrorScope;
use crate::texture::{self, Placeholder, SizedTexture, TextureDimension};
use crate::uniforms::{bind_parameters, uniform_defined, ParameterValue, ShaderParameters};

pub const TARGET_WIDTH_UNIFORM: &str = "target_width";
pub const TARGET_HEIGHT_UNIFORM: &str = "target_height";

/// One color attachment, optionally a single depth slice of a 3D texture.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    attachment: SizedTexture,
    layer: u32,
}

impl Framebuffer {
    pub fn new(attachment: &SizedTexture, layer: u32) -> Self {
        Self {
            attachment: attachment.clone(),
            layer,
        }
    }

    pub fn attachment(&self) -> &SizedTexture {
        &self.attachment
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Completeness for rendering.
    pub fn check_complete(&self) -> Result<()> {
        let texture = &self.attachment;
        if texture.width() == 0 || texture.height() == 0 {
            return Err(RenderError::IncompleteFramebuffer(
                "attachment has a zero extent".to_string(),
            ));
        }
        if !texture
            .usage()
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            return Err(RenderError::IncompleteFramebuffer(
                "attachment cannot be rendered into".to_string(),
            ));
        }
        if self.layer >= texture.depth() {
            return Err(RenderError::IncompleteFramebuffer(format!(
                "layer {} is outside an attachment of depth {}",
                self.layer,
                texture.depth()
            )));
        }
        Ok(())
    }

    /// Completeness for pixel readback.
    pub fn check_readable(&self) -> Result<()> {
        self.check_complete()?;
        if !self
            .attachment
            .usage()
            .contains(wgpu::TextureUsages::COPY_SRC)
        {
            return Err(RenderError::IncompleteFramebuffer(
                "attachment cannot be copied out".to_string(),
            ));
        }
        Ok(())
    }
}

/// Draws the full-screen quad with `program` into the bound framebuffer, or
/// the default surface when none is bound.
///
/// `target_width` and `target_height` are filled in when the program declares
/// them, overriding any caller value.
pub fn draw_full_screen(
    context: &mut Context,
    program: &Program,
    width: u32,
    height: u32,
    parameters: &ShaderParameters,
) -> Result<()> {
    if let Some(framebuffer) = context.state().framebuffer() {
        framebuffer.check_complete()?;
    }
    context.state_mut().use_program(program);

    let mut parameters = parameters.clone();
    if uniform_defined(context, TARGET_WIDTH_UNIFORM) {
        parameters.set(TARGET_WIDTH_UNIFORM, ParameterValue::Int(as_int(width)));
    }
    if uniform_defined(context, TARGET_HEIGHT_UNIFORM) {
        parameters.set(TARGET_HEIGHT_UNIFORM, ParameterValue::Int(as_int(height)));
    }
    bind_parameters(context, &parameters)?;

    encode_pass(context, program, width, height)
}

/// Renders into `target` at its own stored size.
pub fn draw_to_texture(
    context: &mut Context,
    program: &Program,
    target: &SizedTexture,
    parameters: &ShaderParameters,
) -> Result<()> {
    draw_to_texture_layer(context, program, target, 0, parameters)
}

/// Renders into one depth slice of `target`.
pub fn draw_to_texture_layer(
    context: &mut Context,
    program: &Program,
    target: &SizedTexture,
    layer: u32,
    parameters: &ShaderParameters,
) -> Result<()> {
    let framebuffer = Framebuffer::new(target, layer);
    framebuffer.check_complete()?;
    context.state_mut().bind_framebuffer(framebuffer);
    draw_full_screen(context, program, target.width(), target.height(), parameters)
}

fn as_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn encode_pass(context: &Context, program: &Program, width: u32, height: u32) -> Result<()> {
    let (target, layer) = context.render_target();
    let sources = resolve_samplers(context, program, &target)?;

    let device = context.device();
    let scope = ErrorScope::push(device);

    let sources: Vec<(&SamplerSlot, SamplerSource)> = sources
        .into_iter()
        .map(|(slot, texture)| {
            let source = match texture {
                Some(texture) => SamplerSource::Texture(texture),
                None => SamplerSource::Placeholder(texture::placeholder(device, slot.dimension)),
            };
            (slot, source)
        })
        .collect();

    let layouts = PassLayouts::new(device, program, |slot| {
        sources
            .iter()
            .find(|(candidate, _)| candidate.name == slot.name)
            .map_or(true, |(_, source)| source.filterable())
    });

    let uniform_buffer = match context.state().uniform_values(program.id()) {
        Some(values) if !values.block().is_empty() => {
            Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform buffer"),
                contents: values.block(),
                usage: wgpu::BufferUsages::UNIFORM,
            }))
        }
        _ => None,
    };
    let uniform_entries: Vec<wgpu::BindGroupEntry<'_>> = uniform_buffer
        .iter()
        .map(|buffer| wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("uniform bind group"),
        layout: &layouts.uniform_layout,
        entries: &uniform_entries,
    });

    let mut sampler_entries = Vec::with_capacity(sources.len() * 2);
    for (slot, source) in &sources {
        let (view, sampler) = source.resources();
        sampler_entries.push(wgpu::BindGroupEntry {
            binding: slot.texture_binding,
            resource: wgpu::BindingResource::TextureView(view),
        });
        sampler_entries.push(wgpu::BindGroupEntry {
            binding: slot.sampler_binding,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    let sampler_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sampler bind group"),
        layout: &layouts.sampler_layout,
        entries: &sampler_entries,
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("full-screen vertices"),
        contents: bytemuck::cast_slice(&FULL_SCREEN_VERTICES[..]),
        usage: wgpu::BufferUsages::VERTEX,
    });

    let pipeline = build_pipeline(
        device,
        program,
        &layouts.pipeline_layout,
        target.format().storage(),
    );

    let depth_slice = match target.dimension() {
        TextureDimension::D2 => None,
        TextureDimension::D3 => Some(layer),
    };
    let viewport_width = width.min(target.width());
    let viewport_height = height.min(target.height());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("full-screen pass encoder"),
    });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("full-screen pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view(),
                depth_slice,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if viewport_width > 0 && viewport_height > 0 {
            pass.set_viewport(
                0.0,
                0.0,
                viewport_width as f32,
                viewport_height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(UNIFORM_GROUP, &uniform_bind_group, &[]);
            pass.set_bind_group(SAMPLER_GROUP, &sampler_bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..FULL_SCREEN_VERTICES.len() as u32, 0..1);
        }
    }
    context.queue().submit(Some(encoder.finish()));

    if let Some(error) = scope.finish() {
        return Err(RenderError::Device(error.to_string()));
    }

    tracing::debug!(
        program = ?program.id(),
        target = ?target.id(),
        layer,
        width = viewport_width,
        height = viewport_height,
        "drew full-screen pass"
    );
    Ok(())
}

enum SamplerSource {
    Texture(SizedTexture),
    Placeholder(Placeholder),
}

impl SamplerSource {
    fn filterable(&self) -> bool {
        match self {
            SamplerSource::Texture(texture) => texture.filterable(),
            SamplerSource::Placeholder(_) => true,
        }
    }

    fn resources(&self) -> (&wgpu::TextureView, &wgpu::Sampler) {
        match self {
            SamplerSource::Texture(texture) => (texture.view(), texture.sampler()),
            SamplerSource::Placeholder(placeholder) => (&placeholder.view, &placeholder.sampler),
        }
    }
}

/// Texture each sampler of `program` reads, looked up through its unit.
fn resolve_samplers<'p>(
    context: &Context,
    program: &'p Program,
    target: &SizedTexture,
) -> Result<Vec<(&'p SamplerSlot, Option<SizedTexture>)>> {
    let state = context.state();
    let values = state.uniform_values(program.id());
    let mut sources = Vec::with_capacity(program.interface().samplers().len());

    for slot in program.interface().samplers() {
        let unit = values.map_or(0, |values| values.unit(&slot.name));
        let bound = state.texture_unit(unit);
        let texture = bound.and_then(|bound| bound.get(slot.dimension)).cloned();

        if texture.is_none() {
            let other = match slot.dimension {
                TextureDimension::D2 => TextureDimension::D3,
                TextureDimension::D3 => TextureDimension::D2,
            };
            if bound.and_then(|bound| bound.get(other)).is_some() {
                tracing::warn!(
                    sampler = %slot.name,
                    unit,
                    expected = %slot.dimension,
                    "unit only holds a texture of the other dimension; sampling the placeholder"
                );
            }
        }
        if let Some(texture) = &texture {
            if texture.id() == target.id() {
                return Err(RenderError::FeedbackLoop {
                    name: slot.name.clone(),
                });
            }
        }
        sources.push((slot, texture));
    }
    Ok(sources)
}
