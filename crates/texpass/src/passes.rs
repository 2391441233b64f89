//! Built-in pass programs and the ping-pong chain that runs them.

use anyhow::{bail, Context as _, Result};
use passconfig::{PassConfig, PassStep};
use renderer::{
    create_full_screen_program, draw_to_texture_layer, new_texture_2d, new_texture_3d, Context,
    FormatPreset, Program, ShaderParameters, SizedTexture,
};

const SOLID: &str = r#"
    precision highp float;
    uniform vec4 color;
    out vec4 outColor;
    void main() {
        outColor = color;
    }
"#;

const INVERT_2D: &str = r#"
    precision highp float;
    uniform sampler2D src;
    out vec4 outColor;
    void main() {
        vec4 texel = texelFetch(src, ivec2(gl_FragCoord.xy), 0);
        outColor = vec4(1.0 - texel.rgb, texel.a);
    }
"#;

const COPY_2D: &str = r#"
    precision highp float;
    uniform sampler2D src;
    out vec4 outColor;
    void main() {
        outColor = texelFetch(src, ivec2(gl_FragCoord.xy), 0);
    }
"#;

const INVERT_3D: &str = r#"
    precision highp float;
    uniform sampler3D src;
    uniform int layer;
    out vec4 outColor;
    void main() {
        vec4 texel = texelFetch(src, ivec3(ivec2(gl_FragCoord.xy), layer), 0);
        outColor = vec4(1.0 - texel.rgb, texel.a);
    }
"#;

const COPY_3D: &str = r#"
    precision highp float;
    uniform sampler3D src;
    uniform int layer;
    out vec4 outColor;
    void main() {
        outColor = texelFetch(src, ivec3(ivec2(gl_FragCoord.xy), layer), 0);
    }
"#;

const SOURCE_UNIFORM: &str = "src";
const LAYER_UNIFORM: &str = "layer";
const COLOR_UNIFORM: &str = "color";

/// Linked programs for one texture dimension.
pub struct PassRunner {
    solid: Program,
    invert: Program,
    copy: Program,
    volume: bool,
}

impl PassRunner {
    pub fn new(context: &Context, volume: bool) -> Result<Self> {
        let (invert, copy) = if volume {
            (INVERT_3D, COPY_3D)
        } else {
            (INVERT_2D, COPY_2D)
        };
        Ok(Self {
            solid: create_full_screen_program(context, SOLID)
                .context("failed to build the solid pass")?,
            invert: create_full_screen_program(context, invert)
                .context("failed to build the invert pass")?,
            copy: create_full_screen_program(context, copy)
                .context("failed to build the copy pass")?,
            volume,
        })
    }

    /// Runs every step into a fresh texture and returns the last one.
    pub fn run(
        &self,
        context: &mut Context,
        config: &PassConfig,
        preset: FormatPreset,
    ) -> Result<SizedTexture> {
        let mut previous: Option<SizedTexture> = None;

        for (index, step) in config.passes.iter().enumerate() {
            let target = self.allocate(context, config, preset)?;
            let depth = target.depth();

            let (program, base) = match (step, &previous) {
                (PassStep::Solid { color }, _) => {
                    let color: [f32; 4] = color.as_slice().try_into().with_context(|| {
                        format!("pass {index}: solid color needs 4 components")
                    })?;
                    (&self.solid, ShaderParameters::new().vec4(COLOR_UNIFORM, color))
                }
                (_, None) => bail!("pass {index} ({}) has no input to read", step.name()),
                (PassStep::Invert, Some(input)) => (
                    &self.invert,
                    ShaderParameters::new().texture(SOURCE_UNIFORM, input),
                ),
                (PassStep::Copy, Some(input)) => (
                    &self.copy,
                    ShaderParameters::new().texture(SOURCE_UNIFORM, input),
                ),
            };

            for layer in 0..depth {
                let mut parameters = base.clone();
                if self.volume && step.needs_input() {
                    parameters = parameters.int(LAYER_UNIFORM, layer_index(layer));
                }
                draw_to_texture_layer(context, program, &target, layer, &parameters)
                    .with_context(|| format!("pass {index} ({}) failed on layer {layer}", step.name()))?;
            }
            tracing::debug!(index, pass = step.name(), layers = depth, "rendered pass");
            previous = Some(target);
        }

        previous.context("pass plan is empty")
    }

    fn allocate(
        &self,
        context: &Context,
        config: &PassConfig,
        preset: FormatPreset,
    ) -> Result<SizedTexture> {
        let target = &config.target;
        let texture = if self.volume {
            new_texture_3d(context, target.width, target.height, target.depth, preset)
        } else {
            new_texture_2d(context, target.width, target.height, preset)
        };
        texture.with_context(|| {
            format!(
                "failed to allocate a {}x{}x{} {preset} texture",
                target.width, target.height, target.depth
            )
        })
    }
}

fn layer_index(layer: u32) -> i32 {
    i32::try_from(layer).unwrap_or(i32::MAX)
}
