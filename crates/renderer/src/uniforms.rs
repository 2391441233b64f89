//! Name-keyed shader parameters and the binder that applies them to the
//! current program.
//!
//! Values land in the program's std140 block at the offsets reflected at
//! compile time. Texture parameters are taken in ascending name order and
//! given texture units starting at [`FIRST_TEXTURE_UNIT`]; the sampler uniform
//! then holds that unit number, exactly like `uniform1i` on a GL sampler.

use std::collections::BTreeMap;
use std::fmt;

use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::program::{ProgramInterface, UniformSlot};
use crate::texture::{SizedTexture, TextureDimension};

/// Unit 0 stays unused so an unset sampler never aliases a real binding.
pub const FIRST_TEXTURE_UNIT: u32 = 1;

/// Declared type of a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    Sampler2D,
    Sampler3D,
}

impl UniformKind {
    pub(crate) fn from_glsl(type_name: &str) -> Option<Self> {
        match type_name {
            "float" => Some(UniformKind::Float),
            "vec2" => Some(UniformKind::Vec2),
            "vec3" => Some(UniformKind::Vec3),
            "vec4" => Some(UniformKind::Vec4),
            "int" => Some(UniformKind::Int),
            "sampler2D" => Some(UniformKind::Sampler2D),
            "sampler3D" => Some(UniformKind::Sampler3D),
            _ => None,
        }
    }

    pub fn glsl_name(self) -> &'static str {
        match self {
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Int => "int",
            UniformKind::Sampler2D => "sampler2D",
            UniformKind::Sampler3D => "sampler3D",
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, UniformKind::Sampler2D | UniformKind::Sampler3D)
    }

    pub fn texture_dimension(self) -> Option<TextureDimension> {
        match self {
            UniformKind::Sampler2D => Some(TextureDimension::D2),
            UniformKind::Sampler3D => Some(TextureDimension::D3),
            _ => None,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

/// One parameter value.
#[derive(Clone, Debug)]
pub enum ParameterValue {
    Texture(SizedTexture),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Texture(_) => "texture",
            ParameterValue::Float(_) => "float",
            ParameterValue::Vec2(_) => "vec2",
            ParameterValue::Vec3(_) => "vec3",
            ParameterValue::Vec4(_) => "vec4",
            ParameterValue::Int(_) => "int",
        }
    }
}

/// Parameters for a single draw, keyed by uniform name.
#[derive(Clone, Debug, Default)]
pub struct ShaderParameters {
    values: BTreeMap<String, ParameterValue>,
}

impl ShaderParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(mut self, name: impl Into<String>, texture: &SizedTexture) -> Self {
        self.set(name, ParameterValue::Texture(texture.clone()));
        self
    }

    pub fn float(mut self, name: impl Into<String>, value: f32) -> Self {
        self.set(name, ParameterValue::Float(value));
        self
    }

    pub fn vec2(mut self, name: impl Into<String>, value: [f32; 2]) -> Self {
        self.set(name, ParameterValue::Vec2(value));
        self
    }

    pub fn vec3(mut self, name: impl Into<String>, value: [f32; 3]) -> Self {
        self.set(name, ParameterValue::Vec3(value));
        self
    }

    pub fn vec4(mut self, name: impl Into<String>, value: [f32; 4]) -> Self {
        self.set(name, ParameterValue::Vec4(value));
        self
    }

    pub fn int(mut self, name: impl Into<String>, value: i32) -> Self {
        self.set(name, ParameterValue::Int(value));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All parameters in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Texture parameters in ascending name order.
    pub fn textures(&self) -> impl Iterator<Item = (&str, &SizedTexture)> {
        self.iter().filter_map(|(name, value)| match value {
            ParameterValue::Texture(texture) => Some((name, texture)),
            _ => None,
        })
    }
}

/// Uniform values a program currently holds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformValues {
    block: Vec<u8>,
    units: BTreeMap<String, u32>,
}

impl UniformValues {
    pub(crate) fn new(interface: &ProgramInterface) -> Self {
        Self {
            block: vec![0; interface.block_size() as usize],
            units: BTreeMap::new(),
        }
    }

    /// Raw std140 block contents.
    pub fn block(&self) -> &[u8] {
        &self.block
    }

    /// Texture unit a sampler uniform points at; 0 until assigned.
    pub fn unit(&self, sampler: &str) -> u32 {
        self.units.get(sampler).copied().unwrap_or(0)
    }

    pub(crate) fn apply(&mut self, binding: &Binding<'_>) {
        match binding {
            Binding::Texture { name, unit, .. } | Binding::Unit { name, unit } => {
                self.units.insert((*name).to_string(), *unit);
            }
            Binding::Value { offset, bytes } => {
                let start = *offset as usize;
                self.block[start..start + bytes.len()].copy_from_slice(bytes);
            }
        }
    }
}

/// A resolved parameter, ready to be written into context state.
#[derive(Debug)]
pub(crate) enum Binding<'p> {
    Texture {
        name: &'p str,
        texture: &'p SizedTexture,
        unit: u32,
    },
    Unit {
        name: &'p str,
        unit: u32,
    },
    Value {
        offset: u32,
        bytes: Vec<u8>,
    },
}

/// Checks every parameter against `interface` and assigns texture units.
///
/// Nothing is applied when any name fails to resolve.
pub(crate) fn resolve<'p>(
    interface: &ProgramInterface,
    parameters: &'p ShaderParameters,
) -> Result<Vec<Binding<'p>>> {
    let mut bindings = Vec::with_capacity(parameters.len());
    let mut next_unit = FIRST_TEXTURE_UNIT;

    for (name, value) in parameters.iter() {
        let slot = interface
            .lookup(name)
            .ok_or_else(|| RenderError::UnknownUniform {
                name: name.to_string(),
            })?;
        let mismatch = || RenderError::UniformTypeMismatch {
            name: name.to_string(),
            expected: slot.kind(),
            actual: value.type_name(),
        };

        let binding = match (slot, value) {
            (UniformSlot::Sampler { .. }, ParameterValue::Texture(texture)) => {
                let unit = next_unit;
                next_unit += 1;
                Binding::Texture {
                    name,
                    texture,
                    unit,
                }
            }
            (UniformSlot::Sampler { .. }, ParameterValue::Int(unit)) => Binding::Unit {
                name,
                unit: u32::try_from(*unit).map_err(|_| mismatch())?,
            },
            (UniformSlot::Value { kind, offset }, value) => {
                let bytes = match (kind, value) {
                    (UniformKind::Float, ParameterValue::Float(v)) => bytemuck::bytes_of(v).to_vec(),
                    (UniformKind::Vec2, ParameterValue::Vec2(v)) => bytemuck::cast_slice(v).to_vec(),
                    (UniformKind::Vec3, ParameterValue::Vec3(v)) => bytemuck::cast_slice(v).to_vec(),
                    (UniformKind::Vec4, ParameterValue::Vec4(v)) => bytemuck::cast_slice(v).to_vec(),
                    (UniformKind::Int, ParameterValue::Int(v)) => bytemuck::bytes_of(v).to_vec(),
                    _ => return Err(mismatch()),
                };
                Binding::Value {
                    offset: *offset,
                    bytes,
                }
            }
            _ => return Err(mismatch()),
        };
        bindings.push(binding);
    }

    Ok(bindings)
}

/// Binds `parameters` onto the context's current program.
pub fn bind_parameters(context: &mut Context, parameters: &ShaderParameters) -> Result<()> {
    context.state_mut().apply_parameters(parameters)
}

/// Whether the current program declares `name`. Never fails.
pub fn uniform_defined(context: &Context, name: &str) -> bool {
    context.state().uniform_defined(name)
}
