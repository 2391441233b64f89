use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::format::FormatDescriptor;
use crate::scope::ErrorScope;

/// Binding target a texture is sampled through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureDimension {
    D2,
    D3,
}

impl TextureDimension {
    fn wgpu(self) -> wgpu::TextureDimension {
        match self {
            TextureDimension::D2 => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        }
    }

    pub(crate) fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::D3 => wgpu::TextureViewDimension::D3,
        }
    }
}

impl fmt::Display for TextureDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureDimension::D2 => f.write_str("2d"),
            TextureDimension::D3 => f.write_str("3d"),
        }
    }
}

/// Minification and magnification filter for a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterPolicy {
    #[default]
    Nearest,
    Linear,
}

impl FilterPolicy {
    fn wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterPolicy::Nearest => wgpu::FilterMode::Nearest,
            FilterPolicy::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPolicy::Nearest => f.write_str("nearest"),
            FilterPolicy::Linear => f.write_str("linear"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown filter policy `{0}` (expected nearest or linear)")]
pub struct ParseFilterError(String);

impl FromStr for FilterPolicy {
    type Err = ParseFilterError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(FilterPolicy::Nearest),
            "linear" => Ok(FilterPolicy::Linear),
            _ => Err(ParseFilterError(value.to_string())),
        }
    }
}

/// Process-unique texture identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// What to allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: FormatDescriptor,
    pub dimension: TextureDimension,
    pub filter: FilterPolicy,
}

impl TextureSpec {
    pub fn d2(width: u32, height: u32, format: impl Into<FormatDescriptor>) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format: format.into(),
            dimension: TextureDimension::D2,
            filter: FilterPolicy::default(),
        }
    }

    pub fn d3(width: u32, height: u32, depth: u32, format: impl Into<FormatDescriptor>) -> Self {
        Self {
            width,
            height,
            depth,
            format: format.into(),
            dimension: TextureDimension::D3,
            filter: FilterPolicy::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterPolicy) -> Self {
        self.filter = filter;
        self
    }

    fn check(&self, limits: &wgpu::Limits, float32_filterable: bool) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RenderError::TextureCreation(format!(
                "extent {}x{}x{} has a zero dimension",
                self.width, self.height, self.depth
            )));
        }
        let (max_extent, max_depth) = match self.dimension {
            TextureDimension::D2 => (limits.max_texture_dimension_2d, 1),
            TextureDimension::D3 => (limits.max_texture_dimension_3d, limits.max_texture_dimension_3d),
        };
        if self.width > max_extent || self.height > max_extent || self.depth > max_depth {
            return Err(RenderError::TextureCreation(format!(
                "extent {}x{}x{} exceeds the device limit of {max_extent} for {} textures",
                self.width, self.height, self.depth, self.dimension
            )));
        }
        if !self.format.is_compatible() {
            return Err(RenderError::TextureCreation(format!(
                "{:?} is not a valid format descriptor",
                self.format
            )));
        }
        if self.filter == FilterPolicy::Linear && self.format.is_float32() && !float32_filterable {
            return Err(RenderError::TextureCreation(
                "linear filtering of 32-bit float textures is not supported by this device"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A texture with the metadata GL would keep beside the handle.
///
/// Cloning shares the underlying GPU texture.
#[derive(Clone, Debug)]
pub struct SizedTexture {
    id: TextureId,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    spec: TextureSpec,
    filterable: bool,
}

impl SizedTexture {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    /// 1 for 2D textures.
    pub fn depth(&self) -> u32 {
        self.spec.depth
    }

    pub fn format(&self) -> FormatDescriptor {
        self.spec.format
    }

    pub fn dimension(&self) -> TextureDimension {
        self.spec.dimension
    }

    pub fn filter(&self) -> FilterPolicy {
        self.spec.filter
    }

    pub(crate) fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Whether shaders may sample this texture through a filtering sampler.
    pub(crate) fn filterable(&self) -> bool {
        self.filterable
    }

    pub(crate) fn usage(&self) -> wgpu::TextureUsages {
        self.texture.usage()
    }
}

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Allocates a texture described by `spec`.
pub fn new_texture(context: &Context, spec: TextureSpec) -> Result<SizedTexture> {
    allocate(context.device(), spec, context.float32_filterable())
}

/// Allocates a 2D texture using the context's default filter policy.
pub fn new_texture_2d(
    context: &Context,
    width: u32,
    height: u32,
    format: impl Into<FormatDescriptor>,
) -> Result<SizedTexture> {
    new_texture(
        context,
        TextureSpec::d2(width, height, format).with_filter(context.default_filter()),
    )
}

/// Allocates a 3D texture using the context's default filter policy.
pub fn new_texture_3d(
    context: &Context,
    width: u32,
    height: u32,
    depth: u32,
    format: impl Into<FormatDescriptor>,
) -> Result<SizedTexture> {
    new_texture(
        context,
        TextureSpec::d3(width, height, depth, format).with_filter(context.default_filter()),
    )
}

pub(crate) fn allocate(
    device: &wgpu::Device,
    spec: TextureSpec,
    float32_filterable: bool,
) -> Result<SizedTexture> {
    spec.check(&device.limits(), float32_filterable)?;

    let id = TextureId::next();
    let label = format!("texpass texture #{}", id.0);
    let scope = ErrorScope::push(device);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&label),
        size: wgpu::Extent3d {
            width: spec.width,
            height: spec.height,
            depth_or_array_layers: spec.depth,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: spec.dimension.wgpu(),
        format: spec.format.storage(),
        usage: TEXTURE_USAGE,
        view_formats: &[],
    });
    if let Some(error) = scope.finish() {
        return Err(RenderError::TextureCreation(error.to_string()));
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, spec.filter);

    tracing::debug!(
        id = id.0,
        width = spec.width,
        height = spec.height,
        depth = spec.depth,
        format = ?spec.format.storage(),
        filter = %spec.filter,
        "allocated texture"
    );
    Ok(SizedTexture {
        id,
        texture,
        view,
        sampler,
        spec,
        filterable: !spec.format.is_float32() || float32_filterable,
    })
}

fn create_sampler(device: &wgpu::Device, filter: FilterPolicy) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("texpass sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter.wgpu(),
        min_filter: filter.wgpu(),
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// 1x1(x1) transparent black stand-in for a sampler with nothing bound.
pub(crate) struct Placeholder {
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

pub(crate) fn placeholder(device: &wgpu::Device, dimension: TextureDimension) -> Placeholder {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("texpass placeholder texture"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: dimension.wgpu(),
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    Placeholder {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        sampler: create_sampler(device, FilterPolicy::Nearest),
    }
}
