use std::collections::{BTreeMap, HashMap};

use crate::draw::Framebuffer;
use crate::error::{RenderError, Result};
use crate::format::FormatPreset;
use crate::program::{Program, ProgramId};
use crate::texture::{self, FilterPolicy, SizedTexture, TextureDimension, TextureSpec};
use crate::uniforms::{self, Binding, ShaderParameters, UniformValues};

/// Size of the hidden default surface, matching an unstyled HTML canvas.
pub const DEFAULT_SURFACE_WIDTH: u32 = 300;
pub const DEFAULT_SURFACE_HEIGHT: u32 = 150;

const FLOAT_TARGETS: [wgpu::TextureFormat; 3] = [
    wgpu::TextureFormat::R32Float,
    wgpu::TextureFormat::Rg32Float,
    wgpu::TextureFormat::Rgba32Float,
];

#[derive(Clone, Debug)]
pub struct ContextOptions {
    /// `None` reads `WGPU_BACKEND`, falling back to every backend.
    pub backends: Option<wgpu::Backends>,
    pub power_preference: wgpu::PowerPreference,
    /// Filter policy for `new_texture_2d` / `new_texture_3d`.
    pub default_filter: FilterPolicy,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            backends: None,
            power_preference: wgpu::PowerPreference::default(),
            default_filter: FilterPolicy::Nearest,
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
        }
    }
}

/// Textures bound on one unit, one slot per binding target.
#[derive(Clone, Debug, Default)]
pub struct TextureUnit {
    texture_2d: Option<SizedTexture>,
    texture_3d: Option<SizedTexture>,
}

impl TextureUnit {
    pub fn get(&self, dimension: TextureDimension) -> Option<&SizedTexture> {
        match dimension {
            TextureDimension::D2 => self.texture_2d.as_ref(),
            TextureDimension::D3 => self.texture_3d.as_ref(),
        }
    }

    fn bind(&mut self, texture: &SizedTexture) {
        let slot = match texture.dimension() {
            TextureDimension::D2 => &mut self.texture_2d,
            TextureDimension::D3 => &mut self.texture_3d,
        };
        *slot = Some(texture.clone());
    }
}

/// Mutable state GL keeps inside the context.
#[derive(Debug, Default)]
pub struct ContextState {
    current: Option<Program>,
    units: BTreeMap<u32, TextureUnit>,
    framebuffer: Option<Framebuffer>,
    uniforms: HashMap<ProgramId, UniformValues>,
}

impl ContextState {
    pub fn current_program(&self) -> Option<&Program> {
        self.current.as_ref()
    }

    pub fn use_program(&mut self, program: &Program) {
        self.uniforms
            .entry(program.id())
            .or_insert_with(|| UniformValues::new(program.interface()));
        self.current = Some(program.clone());
    }

    pub fn texture_unit(&self, unit: u32) -> Option<&TextureUnit> {
        self.units.get(&unit)
    }

    pub fn bind_texture(&mut self, unit: u32, texture: &SizedTexture) {
        self.units.entry(unit).or_default().bind(texture);
    }

    pub fn uniform_values(&self, program: ProgramId) -> Option<&UniformValues> {
        self.uniforms.get(&program)
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Framebuffer) {
        self.framebuffer = Some(framebuffer);
    }

    pub fn unbind_framebuffer(&mut self) {
        self.framebuffer = None;
    }

    pub fn uniform_defined(&self, name: &str) -> bool {
        self.current
            .as_ref()
            .is_some_and(|program| program.interface().is_declared(name))
    }

    /// Resolves every parameter first; state only changes when all of them
    /// bind.
    pub(crate) fn apply_parameters(&mut self, parameters: &ShaderParameters) -> Result<()> {
        let program = self.current.as_ref().ok_or(RenderError::NoActiveProgram)?;
        let bindings = uniforms::resolve(program.interface(), parameters)?;
        let values = self
            .uniforms
            .entry(program.id())
            .or_insert_with(|| UniformValues::new(program.interface()));

        for binding in &bindings {
            if let Binding::Texture { name, texture, unit } = binding {
                tracing::trace!(uniform = name, unit, texture = ?texture.id(), "bound texture");
                self.units.entry(*unit).or_default().bind(texture);
            }
            values.apply(binding);
        }
        Ok(())
    }
}

/// Device handle plus the state GL would keep behind it.
pub struct Context {
    _instance: wgpu::Instance,
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    float32_filterable: bool,
    default_filter: FilterPolicy,
    default_surface: SizedTexture,
    state: ContextState,
}

impl Context {
    /// Acquires an adapter and device with no window attached.
    pub fn new(options: ContextOptions) -> Result<Self> {
        let backends = options
            .backends
            .or_else(wgpu::Backends::from_env)
            .unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| RenderError::ContextCreation(format!("no suitable GPU adapter: {err}")))?;

        let adapter_info = adapter.get_info();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        for format in FLOAT_TARGETS {
            let features = adapter.get_texture_format_features(format);
            if !features
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            {
                return Err(RenderError::ContextCreation(format!(
                    "adapter cannot render into {format:?} color attachments"
                )));
            }
        }

        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let mut required_features = wgpu::Features::empty();
        if float32_filterable {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texpass device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|err| RenderError::ContextCreation(format!("failed to create GPU device: {err}")))?;

        let default_surface = texture::allocate(
            &device,
            TextureSpec::d2(
                options.surface_width,
                options.surface_height,
                FormatPreset::RgbaByte,
            ),
            float32_filterable,
        )
        .map_err(|err| RenderError::ContextCreation(format!("default surface: {err}")))?;

        tracing::debug!(
            float32_filterable,
            width = options.surface_width,
            height = options.surface_height,
            "created rendering context"
        );
        Ok(Self {
            _instance: instance,
            adapter_info,
            device,
            queue,
            float32_filterable,
            default_filter: options.default_filter,
            default_surface,
            state: ContextState::default(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Whether linear filtering of 32-bit float textures is available.
    pub fn float32_filterable(&self) -> bool {
        self.float32_filterable
    }

    pub fn default_filter(&self) -> FilterPolicy {
        self.default_filter
    }

    /// Render target used while no framebuffer is bound.
    pub fn default_surface(&self) -> &SizedTexture {
        &self.default_surface
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ContextState {
        &mut self.state
    }

    /// Makes the default surface the render target again.
    pub fn unbind_framebuffer(&mut self) {
        self.state.unbind_framebuffer();
    }

    /// Texture the next draw renders into, with the layer to write.
    pub(crate) fn render_target(&self) -> (SizedTexture, u32) {
        match self.state.framebuffer() {
            Some(framebuffer) => (framebuffer.attachment().clone(), framebuffer.layer()),
            None => (self.default_surface.clone(), 0),
        }
    }
}

/// Creates a context with default options.
pub fn new_context() -> Result<Context> {
    Context::new(ContextOptions::default())
}
