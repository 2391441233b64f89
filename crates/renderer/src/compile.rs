use std::borrow::Cow;
use std::fmt;

use wgpu::naga;
use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::scope::ErrorScope;
use crate::texture::TextureDimension;
use crate::uniforms::UniformKind;

/// Pipeline stage a shader is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A loose `uniform` declaration lifted out of caller source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

/// Member of the generated std140 block, with the offset naga laid it out at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BlockMember {
    pub name: String,
    pub kind: UniformKind,
    pub offset: u32,
}

/// Texture/sampler pair generated for one sampler uniform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerSlot {
    pub name: String,
    pub dimension: TextureDimension,
    pub texture_binding: u32,
    pub sampler_binding: u32,
}

/// Uniforms one stage declares, as seen after compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ShaderInterface {
    pub block: Vec<BlockMember>,
    pub block_size: u64,
    pub samplers: Vec<SamplerSlot>,
}

impl ShaderInterface {
    pub fn is_empty(&self) -> bool {
        self.block.is_empty() && self.samplers.is_empty()
    }
}

/// GLSL 450 source ready for naga, plus what it declares.
#[derive(Clone, Debug)]
pub(crate) struct TranslatedShader {
    pub source: String,
    pub interface: ShaderInterface,
}

/// A compiled stage. Dropping it releases the module.
#[derive(Clone, Debug)]
pub struct Shader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    interface: ShaderInterface,
}

impl Shader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub(crate) fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }

    pub(crate) fn interface(&self) -> &ShaderInterface {
        &self.interface
    }
}

pub(crate) const UNIFORM_GROUP: u32 = 0;
pub(crate) const SAMPLER_GROUP: u32 = 1;

const VERSION: &str = "#version 450";
const BLOCK_NAME: &str = "TexpassUniforms";
const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Compiles `source` for `stage` after injecting the fixed header.
///
/// On failure the module is dropped before the error is returned and the
/// compiler log travels with the error.
pub fn compile_shader(context: &Context, stage: ShaderStage, source: &str) -> Result<Shader> {
    let translated = translate(stage, source).map_err(|log| {
        tracing::warn!(%stage, %log, source, "shader compilation failed");
        RenderError::ShaderCompile { stage, log }
    })?;

    let device = context.device();
    let scope = ErrorScope::push(device);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match stage {
            ShaderStage::Vertex => "texpass vertex",
            ShaderStage::Fragment => "texpass fragment",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(translated.source.clone()),
            stage: stage.naga(),
            defines: &[],
        },
    });
    if let Some(error) = scope.finish() {
        drop(module);
        let log = error.to_string();
        tracing::warn!(%stage, %log, source = %translated.source, "device rejected shader module");
        return Err(RenderError::ShaderCompile { stage, log });
    }

    tracing::debug!(
        %stage,
        block_members = translated.interface.block.len(),
        samplers = translated.interface.samplers.len(),
        "compiled shader"
    );
    Ok(Shader {
        stage,
        module,
        interface: translated.interface,
    })
}

/// Wraps, parses, validates and reflects `source` without touching a device.
pub(crate) fn translate(stage: ShaderStage, source: &str) -> Result<TranslatedShader, String> {
    let wrapped = wrap_source(stage, source)?;
    let module = parse(stage, &wrapped.source)?;
    let interface = reflect(&module, &wrapped.declarations)?;
    Ok(TranslatedShader {
        source: wrapped.source,
        interface,
    })
}

pub(crate) struct WrappedSource {
    pub source: String,
    pub declarations: Vec<UniformDecl>,
}

/// Produces GLSL 450 from GLSL ES 3.00 style caller source.
///
/// 1. Drop `#version` and `precision` statements.
/// 2. Lift loose `uniform` declarations into one std140 block (values) or a
///    texture/sampler pair behind a `sampler2D(..)` macro (samplers).
/// 3. Give bare `in`/`out` declarations sequential locations.
///
/// Removed lines are left blank and the body starts at `#line 1`, so compiler
/// logs point at the caller's own line numbers.
pub(crate) fn wrap_source(stage: ShaderStage, source: &str) -> Result<WrappedSource, String> {
    let mut declarations: Vec<UniformDecl> = Vec::new();
    let mut body = String::with_capacity(source.len());
    let mut next_input = 0u32;
    let mut next_output = 0u32;

    for (index, line) in source.lines().enumerate() {
        let code = line.split("//").next().unwrap_or("").trim();
        if code.starts_with("#version") || code.starts_with("precision ") {
            body.push('\n');
            continue;
        }
        if let Some(rest) = code.strip_prefix("uniform ") {
            let parsed = parse_uniform(rest).map_err(|reason| format!("{}: {reason}", index + 1))?;
            for decl in parsed {
                if declarations.iter().any(|existing| existing.name == decl.name) {
                    return Err(format!("{}: uniform `{}` declared twice", index + 1, decl.name));
                }
                declarations.push(decl);
            }
            body.push('\n');
            continue;
        }
        if is_bare_interface(code, "in ") {
            body.push_str(&format!("layout(location = {next_input}) {line}\n"));
            next_input += 1;
            continue;
        }
        if is_bare_interface(code, "out ") {
            body.push_str(&format!("layout(location = {next_output}) {line}\n"));
            next_output += 1;
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    let header = build_header(&declarations);
    tracing::trace!(%stage, %header, "generated shader header");
    Ok(WrappedSource {
        source: format!("{header}#line 1\n{body}"),
        declarations,
    })
}

fn is_bare_interface(code: &str, keyword: &str) -> bool {
    code.starts_with(keyword) && code.ends_with(';') && !code.contains('(')
}

fn parse_uniform(rest: &str) -> Result<Vec<UniformDecl>, String> {
    if rest.contains('{') {
        return Err("uniform blocks are not supported; declare loose uniforms".to_string());
    }
    let Some(body) = rest.trim().strip_suffix(';') else {
        return Err("uniform declaration must end with `;` on the same line".to_string());
    };
    let mut tokens = body
        .split_whitespace()
        .filter(|token| !PRECISION_QUALIFIERS.contains(token));
    let type_name = tokens
        .next()
        .ok_or_else(|| "uniform declaration is missing a type".to_string())?;
    let kind = UniformKind::from_glsl(type_name)
        .ok_or_else(|| format!("unsupported uniform type `{type_name}`"))?;

    let names = tokens.collect::<Vec<_>>().join(" ");
    let mut declarations = Vec::new();
    for name in names.split(',').map(str::trim) {
        if !is_identifier(name) {
            return Err(format!("invalid uniform name `{name}`"));
        }
        declarations.push(UniformDecl {
            name: name.to_string(),
            kind,
        });
    }
    Ok(declarations)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Sampler slot `index` owns bindings `2 * index` (texture) and
/// `2 * index + 1` (sampler) in the sampler group.
fn build_header(declarations: &[UniformDecl]) -> String {
    let mut header = format!("{VERSION}\n");

    let values: Vec<&UniformDecl> = declarations
        .iter()
        .filter(|decl| !decl.kind.is_sampler())
        .collect();
    if !values.is_empty() {
        header.push_str(&format!(
            "layout(std140, set = {UNIFORM_GROUP}, binding = 0) uniform {BLOCK_NAME} {{\n"
        ));
        for decl in &values {
            header.push_str(&format!("    {} {};\n", decl.kind.glsl_name(), decl.name));
        }
        header.push_str("};\n");
    }

    let samplers = declarations.iter().filter(|decl| decl.kind.is_sampler());
    for (index, decl) in samplers.enumerate() {
        let (texture_type, sampler_type) = match decl.kind {
            UniformKind::Sampler3D => ("texture3D", "sampler3D"),
            _ => ("texture2D", "sampler2D"),
        };
        let name = &decl.name;
        let texture_binding = index * 2;
        let sampler_binding = index * 2 + 1;
        header.push_str(&format!(
            "layout(set = {SAMPLER_GROUP}, binding = {texture_binding}) uniform {texture_type} texpass_{name}_texture;\n\
             layout(set = {SAMPLER_GROUP}, binding = {sampler_binding}) uniform sampler texpass_{name}_sampler;\n\
             #define {name} {sampler_type}(texpass_{name}_texture, texpass_{name}_sampler)\n"
        ));
    }
    header
}

fn parse(stage: ShaderStage, source: &str) -> Result<naga::Module, String> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage.naga()), source)
        .map_err(|errors| errors.emit_to_string(source))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| error.emit_to_string(source))?;
    Ok(module)
}

/// Reads the std140 layout naga computed for the generated block and pairs
/// every sampler declaration with its bindings.
fn reflect(module: &naga::Module, declarations: &[UniformDecl]) -> Result<ShaderInterface, String> {
    let mut interface = ShaderInterface::default();

    let block = module.global_variables.iter().find_map(|(_, var)| {
        let binding = var.binding.as_ref()?;
        if var.space != naga::AddressSpace::Uniform
            || binding.group != UNIFORM_GROUP
            || binding.binding != 0
        {
            return None;
        }
        match &module.types[var.ty].inner {
            naga::TypeInner::Struct { members, span } => Some((members, *span)),
            _ => None,
        }
    });

    if let Some((members, span)) = block {
        for member in members {
            let name = member
                .name
                .clone()
                .ok_or_else(|| "uniform block member without a name".to_string())?;
            let kind = value_kind(&module.types[member.ty].inner)
                .ok_or_else(|| format!("uniform `{name}` has an unsupported layout"))?;
            interface.block.push(BlockMember {
                name,
                kind,
                offset: member.offset,
            });
        }
        interface.block_size = u64::from(span);
    }

    let declared_values = declarations.iter().filter(|decl| !decl.kind.is_sampler());
    for (decl, member) in declared_values.zip(interface.block.iter()) {
        if decl.name != member.name || decl.kind != member.kind {
            return Err(format!(
                "uniform block reflection disagrees with declaration of `{}`",
                decl.name
            ));
        }
    }

    let samplers = declarations.iter().filter(|decl| decl.kind.is_sampler());
    for (index, decl) in samplers.enumerate() {
        let dimension = decl
            .kind
            .texture_dimension()
            .ok_or_else(|| format!("uniform `{}` is not a sampler", decl.name))?;
        interface.samplers.push(SamplerSlot {
            name: decl.name.clone(),
            dimension,
            texture_binding: index as u32 * 2,
            sampler_binding: index as u32 * 2 + 1,
        });
    }

    Ok(interface)
}

fn value_kind(inner: &naga::TypeInner) -> Option<UniformKind> {
    use naga::{ScalarKind, TypeInner, VectorSize};
    match inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => Some(UniformKind::Float),
            ScalarKind::Sint => Some(UniformKind::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => Some(UniformKind::Vec2),
            VectorSize::Tri => Some(UniformKind::Vec3),
            VectorSize::Quad => Some(UniformKind::Vec4),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID: &str = r#"
        precision highp float;
        uniform vec4 color;
        out vec4 outColor;
        void main() {
            outColor = color;
        }
    "#;

    #[test]
    fn wrap_injects_header_and_strips_declarations() {
        let wrapped = wrap_source(ShaderStage::Fragment, SOLID).unwrap();
        assert!(wrapped.source.starts_with("#version 450\n"));
        assert!(wrapped.source.contains("uniform TexpassUniforms"));
        assert!(!wrapped.source.contains("uniform vec4 color;"));
        assert!(!wrapped.source.contains("precision highp"));
        assert!(wrapped.source.contains("layout(location = 0)"));
        assert_eq!(
            wrapped.declarations,
            vec![UniformDecl {
                name: "color".into(),
                kind: UniformKind::Vec4
            }]
        );
    }

    #[test]
    fn wrap_replaces_caller_version_directive() {
        let source = "#version 300 es\nout vec4 o;\nvoid main() { o = vec4(1.0); }\n";
        let wrapped = wrap_source(ShaderStage::Fragment, source).unwrap();
        assert_eq!(wrapped.source.matches("#version").count(), 1);
        assert!(!wrapped.source.contains("300 es"));
    }

    #[test]
    fn samplers_become_texture_sampler_pairs() {
        let source = "uniform highp sampler3D volume;\nuniform sampler2D a, b;\n";
        let wrapped = wrap_source(ShaderStage::Fragment, source).unwrap();
        assert!(wrapped.source.contains("uniform texture3D texpass_volume_texture;"));
        assert!(wrapped.source.contains(
            "#define volume sampler3D(texpass_volume_texture, texpass_volume_sampler)"
        ));
        assert!(wrapped.source.contains("binding = 2) uniform texture2D texpass_a_texture;"));
        assert!(wrapped.source.contains("binding = 5) uniform sampler texpass_b_sampler;"));
    }

    #[test]
    fn rejects_unsupported_uniform_types() {
        let error = wrap_source(ShaderStage::Fragment, "uniform mat4 transform;\n")
            .err()
            .unwrap();
        assert!(error.contains("unsupported uniform type `mat4`"));
    }

    #[test]
    fn rejects_duplicate_uniforms() {
        let source = "uniform float a;\nuniform int a;\n";
        assert!(wrap_source(ShaderStage::Fragment, source).is_err());
    }

    #[test]
    fn reflects_std140_offsets() {
        let source = r#"
            uniform float strength;
            uniform vec3 tint;
            uniform vec4 color;
            uniform int target_width;
            out vec4 outColor;
            void main() {
                outColor = color * strength + vec4(tint, float(target_width));
            }
        "#;
        let translated = translate(ShaderStage::Fragment, source).unwrap();
        let offsets: Vec<(&str, u32)> = translated
            .interface
            .block
            .iter()
            .map(|member| (member.name.as_str(), member.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![("strength", 0), ("tint", 16), ("color", 32), ("target_width", 48)]
        );
        assert!(translated.interface.block_size >= 52);
    }

    #[test]
    fn reflects_sampler_slots() {
        let source = r#"
            uniform sampler2D src;
            uniform sampler3D volume;
            out vec4 outColor;
            void main() {
                ivec2 at = ivec2(gl_FragCoord.xy);
                outColor = texelFetch(src, at, 0) + texelFetch(volume, ivec3(at, 0), 0);
            }
        "#;
        let translated = translate(ShaderStage::Fragment, source).unwrap();
        assert!(translated.interface.block.is_empty());
        assert_eq!(
            translated.interface.samplers,
            vec![
                SamplerSlot {
                    name: "src".into(),
                    dimension: TextureDimension::D2,
                    texture_binding: 0,
                    sampler_binding: 1,
                },
                SamplerSlot {
                    name: "volume".into(),
                    dimension: TextureDimension::D3,
                    texture_binding: 2,
                    sampler_binding: 3,
                },
            ]
        );
    }

    #[test]
    fn compile_errors_carry_the_log() {
        let source = "out vec4 outColor;\nvoid main() { outColor = undefined_thing; }\n";
        let log = translate(ShaderStage::Fragment, source).unwrap_err();
        assert!(log.contains("undefined_thing"), "log was: {log}");
    }

    #[test]
    fn vertex_inputs_get_locations() {
        let wrapped = wrap_source(
            ShaderStage::Vertex,
            "in vec2 a_position;\nvoid main() { gl_Position = vec4(a_position, 0.0, 1.0); }\n",
        )
        .unwrap();
        assert!(wrapped
            .source
            .contains("layout(location = 0) in vec2 a_position;"));
    }
}
