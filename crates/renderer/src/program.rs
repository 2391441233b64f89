use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compile::{compile_shader, BlockMember, SamplerSlot, Shader, ShaderInterface, ShaderStage};
use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::pipeline::{build_pipeline, PassLayouts};
use crate::scope::ErrorScope;
use crate::texture::TextureDimension;
use crate::uniforms::UniformKind;

/// Vertex stage shared by every full-screen program. No transform.
pub const FULL_SCREEN_VERTEX_SOURCE: &str = "\
in vec2 a_position;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Process-unique program identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl ProgramId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ProgramId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a declared uniform lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformSlot {
    /// Value in the std140 block at `offset`.
    Value { kind: UniformKind, offset: u32 },
    Sampler { dimension: TextureDimension },
}

impl UniformSlot {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformSlot::Value { kind, .. } => *kind,
            UniformSlot::Sampler {
                dimension: TextureDimension::D2,
            } => UniformKind::Sampler2D,
            UniformSlot::Sampler {
                dimension: TextureDimension::D3,
            } => UniformKind::Sampler3D,
        }
    }
}

/// Every uniform a linked program declares.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramInterface {
    slots: BTreeMap<String, UniformSlot>,
    block_size: u64,
    samplers: Vec<SamplerSlot>,
}

impl ProgramInterface {
    /// Merges the two stages. Both stages share one uniform block and one
    /// sampler group, so when both declare uniforms the declarations must be
    /// identical.
    pub(crate) fn from_stages(
        vertex: &ShaderInterface,
        fragment: &ShaderInterface,
    ) -> std::result::Result<Self, String> {
        let declared = match (vertex.is_empty(), fragment.is_empty()) {
            (true, _) => fragment,
            (false, true) => vertex,
            (false, false) if vertex == fragment => fragment,
            (false, false) => {
                return Err(describe_mismatch(vertex, fragment));
            }
        };

        let mut slots = BTreeMap::new();
        for BlockMember { name, kind, offset } in &declared.block {
            slots.insert(
                name.clone(),
                UniformSlot::Value {
                    kind: *kind,
                    offset: *offset,
                },
            );
        }
        for sampler in &declared.samplers {
            slots.insert(
                sampler.name.clone(),
                UniformSlot::Sampler {
                    dimension: sampler.dimension,
                },
            );
        }

        Ok(Self {
            slots,
            block_size: declared.block_size,
            samplers: declared.samplers.clone(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&UniformSlot> {
        self.slots.get(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<UniformKind> {
        self.lookup(name).map(UniformSlot::kind)
    }

    /// Declared uniform names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Size of the std140 block in bytes; 0 when no value uniforms exist.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn samplers(&self) -> &[SamplerSlot] {
        &self.samplers
    }
}

fn describe_mismatch(vertex: &ShaderInterface, fragment: &ShaderInterface) -> String {
    let names = |interface: &ShaderInterface| -> Vec<String> {
        interface
            .block
            .iter()
            .map(|member| format!("{} {}", member.kind, member.name))
            .chain(interface.samplers.iter().map(|slot| {
                let kind = UniformSlot::Sampler {
                    dimension: slot.dimension,
                }
                .kind();
                format!("{kind} {}", slot.name)
            }))
            .collect()
    };
    format!(
        "vertex and fragment stages declare different uniforms: vertex [{}], fragment [{}]",
        names(vertex).join(", "),
        names(fragment).join(", ")
    )
}

/// A linked vertex and fragment pair. Immutable once linked.
#[derive(Clone, Debug)]
pub struct Program {
    id: ProgramId,
    vertex: Shader,
    fragment: Shader,
    interface: ProgramInterface,
}

impl Program {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub(crate) fn vertex(&self) -> &Shader {
        &self.vertex
    }

    pub(crate) fn fragment(&self) -> &Shader {
        &self.fragment
    }
}

/// Links two compiled stages.
///
/// A trial pipeline is built inside an error scope so interface
/// mismatches between the stages surface here rather than at draw time.
pub fn link_program(context: &Context, vertex: &Shader, fragment: &Shader) -> Result<Program> {
    if vertex.stage() != ShaderStage::Vertex || fragment.stage() != ShaderStage::Fragment {
        return Err(link_failure(format!(
            "expected a vertex and a fragment shader, got {} and {}",
            vertex.stage(),
            fragment.stage()
        )));
    }

    let interface =
        ProgramInterface::from_stages(vertex.interface(), fragment.interface()).map_err(link_failure)?;
    let program = Program {
        id: ProgramId::next(),
        vertex: vertex.clone(),
        fragment: fragment.clone(),
        interface,
    };

    let device = context.device();
    let scope = ErrorScope::push(device);
    let layouts = PassLayouts::new(device, &program, |_| true);
    let trial = build_pipeline(
        device,
        &program,
        &layouts.pipeline_layout,
        wgpu::TextureFormat::Rgba8Unorm,
    );
    let error = scope.finish();
    drop(trial);
    drop(layouts);
    if let Some(error) = error {
        return Err(link_failure(error.to_string()));
    }

    tracing::debug!(
        id = program.id.0,
        uniforms = program.interface.slots.len(),
        "linked program"
    );
    Ok(program)
}

fn link_failure(log: String) -> RenderError {
    tracing::warn!(%log, "program link failed");
    RenderError::ProgramLink { log }
}

/// Compiles the fixed full-screen vertex stage with `fragment_source` and
/// links them.
pub fn create_full_screen_program(context: &Context, fragment_source: &str) -> Result<Program> {
    let vertex = compile_shader(context, ShaderStage::Vertex, FULL_SCREEN_VERTEX_SOURCE)?;
    let fragment = compile_shader(context, ShaderStage::Fragment, fragment_source)?;
    link_program(context, &vertex, &fragment)
}
