//! Pixel readback and the host-side canvas.

use std::path::Path;

use image::RgbaImage;

use crate::context::{Context, DEFAULT_SURFACE_HEIGHT, DEFAULT_SURFACE_WIDTH};
use crate::draw::Framebuffer;
use crate::error::{RenderError, Result};
use crate::scope::ErrorScope;
use crate::texture::SizedTexture;

const RGBA8_BYTES: usize = 4;

/// Host RGBA8 pixel surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    image: RgbaImage,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_WIDTH, DEFAULT_SURFACE_HEIGHT)
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Resizing clears the canvas, like assigning `canvas.width`.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    /// Writes tightly packed RGBA8 rows at the origin; rows past the canvas
    /// are dropped.
    pub fn put_image_data(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let expected = width as usize * height as usize * RGBA8_BYTES;
        if pixels.len() != expected {
            return Err(RenderError::ImageData(format!(
                "image data holds {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        let rows = height.min(self.height());
        let columns = width.min(self.width());
        for y in 0..rows {
            for x in 0..columns {
                let start = (y as usize * width as usize + x as usize) * RGBA8_BYTES;
                let mut texel = [0u8; RGBA8_BYTES];
                texel.copy_from_slice(&pixels[start..start + RGBA8_BYTES]);
                self.image.put_pixel(x, y, image::Rgba(texel));
            }
        }
        Ok(())
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| RenderError::ImageWrite {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Reads `source` back as RGBA8, row 0 being the `gl_FragCoord.y = 0.5` row.
pub fn read_pixels(context: &mut Context, source: &SizedTexture) -> Result<Vec<u8>> {
    read_pixels_layer(context, source, 0)
}

/// Reads one depth slice of `source` back as RGBA8.
///
/// Leaves a framebuffer with `source` attached bound, the way GL does.
pub fn read_pixels_layer(context: &mut Context, source: &SizedTexture, layer: u32) -> Result<Vec<u8>> {
    let framebuffer = Framebuffer::new(source, layer);
    framebuffer.check_readable()?;
    context.state_mut().bind_framebuffer(framebuffer);
    copy_out(context, source, layer)
}

/// Resizes `canvas` to `source` and fills it with the read-back pixels.
pub fn read_pixels_to_canvas(context: &mut Context, source: &SizedTexture, canvas: &mut Canvas) -> Result<()> {
    canvas.set_size(source.width(), source.height());
    let pixels = read_pixels(context, source)?;
    canvas.put_image_data(&pixels, source.width(), source.height())
}

fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn copy_out(context: &Context, source: &SizedTexture, layer: u32) -> Result<Vec<u8>> {
    let device = context.device();
    let format = source.format();
    let width = source.width();
    let height = source.height();
    let texel_size = format.bytes_per_texel();
    let unpadded = width * texel_size;
    let padded = padded_bytes_per_row(unpadded);

    let scope = ErrorScope::push(device);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: source.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue().submit(Some(encoder.finish()));
    if let Some(error) = scope.finish() {
        return Err(RenderError::Device(error.to_string()));
    }

    let slice = buffer.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| RenderError::Device(format!("device poll failed: {err}")))?;
    receiver
        .recv()
        .map_err(|_| RenderError::Device("readback mapping was dropped".to_string()))?
        .map_err(|err| RenderError::Device(format!("failed to map readback buffer: {err}")))?;

    let mut pixels = Vec::with_capacity(width as usize * height as usize * RGBA8_BYTES);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks(padded as usize).take(height as usize) {
            for texel in row[..unpadded as usize].chunks_exact(texel_size as usize) {
                pixels.extend_from_slice(&format.decode_texel(texel));
            }
        }
    }
    buffer.unmap();

    tracing::debug!(texture = ?source.id(), layer, width, height, "read back pixels");
    Ok(pixels)
}
