//! Pixel format descriptors and the fixed preset table.
//!
//! A [`FormatDescriptor`] is the triple GL callers hand to `texImage2D`:
//! storage format, transfer channels, and component type. The device has no
//! three-channel renderable formats, so the RGB presets keep RGBA storage and
//! only the transfer side says "three channels"; readback reports alpha as
//! fully opaque for them.

use std::fmt;
use std::str::FromStr;

use crate::error::{RenderError, Result};

/// Channels carried across the host boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelChannels {
    R,
    Rg,
    Rgb,
    Rgba,
}

impl PixelChannels {
    pub fn count(self) -> u32 {
        match self {
            PixelChannels::R => 1,
            PixelChannels::Rg => 2,
            PixelChannels::Rgb => 3,
            PixelChannels::Rgba => 4,
        }
    }
}

/// Numeric type of a single channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    UnsignedByte,
    Float,
}

impl ComponentType {
    pub fn size(self) -> u32 {
        match self {
            ComponentType::UnsignedByte => 1,
            ComponentType::Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    storage: wgpu::TextureFormat,
    channels: PixelChannels,
    component: ComponentType,
}

impl FormatDescriptor {
    /// Builds a descriptor, rejecting combinations the storage format cannot
    /// hold.
    pub fn new(
        storage: wgpu::TextureFormat,
        channels: PixelChannels,
        component: ComponentType,
    ) -> Result<Self> {
        let descriptor = Self {
            storage,
            channels,
            component,
        };
        if !descriptor.is_compatible() {
            return Err(RenderError::TextureCreation(format!(
                "{channels:?}/{component:?} is not a valid transfer layout for {storage:?}"
            )));
        }
        Ok(descriptor)
    }

    const fn preset(
        storage: wgpu::TextureFormat,
        channels: PixelChannels,
        component: ComponentType,
    ) -> Self {
        Self {
            storage,
            channels,
            component,
        }
    }

    pub fn storage(&self) -> wgpu::TextureFormat {
        self.storage
    }

    pub fn channels(&self) -> PixelChannels {
        self.channels
    }

    pub fn component(&self) -> ComponentType {
        self.component
    }

    /// True when the storage side and transfer side agree.
    pub fn is_compatible(&self) -> bool {
        let Some((stored, component)) = storage_layout(self.storage) else {
            return false;
        };
        if component != self.component {
            return false;
        }
        let requested = self.channels.count();
        requested == stored || (self.channels == PixelChannels::Rgb && stored == 4)
    }

    /// Bytes per texel of the storage format, as copied out of the device.
    pub fn bytes_per_texel(&self) -> u32 {
        storage_layout(self.storage)
            .map(|(channels, component)| channels * component.size())
            .unwrap_or(0)
    }

    pub fn is_float32(&self) -> bool {
        self.component == ComponentType::Float
    }

    /// Converts one stored texel into the RGBA8 readback layout.
    ///
    /// Missing green/blue read as zero and missing alpha as 255, the way GL
    /// expands narrower formats on `readPixels`.
    pub(crate) fn decode_texel(&self, texel: &[u8]) -> [u8; 4] {
        let mut rgba = [0, 0, 0, u8::MAX];
        let size = self.component.size() as usize;
        for (channel, slot) in rgba
            .iter_mut()
            .enumerate()
            .take(self.channels.count() as usize)
        {
            let start = channel * size;
            *slot = match self.component {
                ComponentType::UnsignedByte => texel[start],
                ComponentType::Float => {
                    float_to_byte(bytemuck::pod_read_unaligned(&texel[start..start + size]))
                }
            };
        }
        rgba
    }
}

fn storage_layout(format: wgpu::TextureFormat) -> Option<(u32, ComponentType)> {
    use wgpu::TextureFormat as F;
    match format {
        F::R8Unorm => Some((1, ComponentType::UnsignedByte)),
        F::Rg8Unorm => Some((2, ComponentType::UnsignedByte)),
        F::Rgba8Unorm => Some((4, ComponentType::UnsignedByte)),
        F::R32Float => Some((1, ComponentType::Float)),
        F::Rg32Float => Some((2, ComponentType::Float)),
        F::Rgba32Float => Some((4, ComponentType::Float)),
        _ => None,
    }
}

fn float_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Named presets callers pick instead of assembling descriptors by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatPreset {
    RByte,
    RgByte,
    RgbByte,
    RgbaByte,
    RFloat,
    RgFloat,
    RgbFloat,
    RgbaFloat,
}

impl FormatPreset {
    pub const ALL: [FormatPreset; 8] = [
        FormatPreset::RByte,
        FormatPreset::RgByte,
        FormatPreset::RgbByte,
        FormatPreset::RgbaByte,
        FormatPreset::RFloat,
        FormatPreset::RgFloat,
        FormatPreset::RgbFloat,
        FormatPreset::RgbaFloat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormatPreset::RByte => "r_byte",
            FormatPreset::RgByte => "rg_byte",
            FormatPreset::RgbByte => "rgb_byte",
            FormatPreset::RgbaByte => "rgba_byte",
            FormatPreset::RFloat => "r_float",
            FormatPreset::RgFloat => "rg_float",
            FormatPreset::RgbFloat => "rgb_float",
            FormatPreset::RgbaFloat => "rgba_float",
        }
    }

    pub fn descriptor(self) -> FormatDescriptor {
        use wgpu::TextureFormat as F;
        use ComponentType::{Float, UnsignedByte};
        use PixelChannels::{Rg, Rgb, Rgba, R};
        match self {
            FormatPreset::RByte => FormatDescriptor::preset(F::R8Unorm, R, UnsignedByte),
            FormatPreset::RgByte => FormatDescriptor::preset(F::Rg8Unorm, Rg, UnsignedByte),
            FormatPreset::RgbByte => FormatDescriptor::preset(F::Rgba8Unorm, Rgb, UnsignedByte),
            FormatPreset::RgbaByte => FormatDescriptor::preset(F::Rgba8Unorm, Rgba, UnsignedByte),
            FormatPreset::RFloat => FormatDescriptor::preset(F::R32Float, R, Float),
            FormatPreset::RgFloat => FormatDescriptor::preset(F::Rg32Float, Rg, Float),
            FormatPreset::RgbFloat => FormatDescriptor::preset(F::Rgba32Float, Rgb, Float),
            FormatPreset::RgbaFloat => FormatDescriptor::preset(F::Rgba32Float, Rgba, Float),
        }
    }
}

impl From<FormatPreset> for FormatDescriptor {
    fn from(preset: FormatPreset) -> Self {
        preset.descriptor()
    }
}

impl fmt::Display for FormatPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown format preset `{0}` (expected one of r_byte, rg_byte, rgb_byte, rgba_byte, r_float, rg_float, rgb_float, rgba_float)")]
pub struct ParsePresetError(String);

impl FromStr for FormatPreset {
    type Err = ParsePresetError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        FormatPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| ParsePresetError(value.to_string()))
    }
}
