//! End-to-end passes against a real device. Every test returns early when the
//! machine has no usable adapter.

use renderer::{
    bind_parameters, compile_shader, create_full_screen_program, draw_full_screen,
    draw_to_texture, draw_to_texture_layer, link_program, new_context, new_texture_2d,
    new_texture_3d, read_pixels, read_pixels_layer, read_pixels_to_canvas, uniform_defined,
    Canvas, Context, FormatPreset, Framebuffer, Program, RenderError, ShaderParameters,
    ShaderStage,
};

const SOLID: &str = r#"
    precision highp float;
    uniform vec4 color;
    out vec4 outColor;
    void main() {
        outColor = color;
    }
"#;

const INVERT: &str = r#"
    precision highp float;
    uniform sampler2D src;
    out vec4 outColor;
    void main() {
        vec4 texel = texelFetch(src, ivec2(gl_FragCoord.xy), 0);
        outColor = vec4(1.0 - texel.rgb, texel.a);
    }
"#;

const TARGET_SIZE: &str = r#"
    uniform int target_width;
    uniform int target_height;
    out vec4 outColor;
    void main() {
        outColor = vec4(float(target_width) / 255.0, float(target_height) / 255.0, 0.0, 1.0);
    }
"#;

const TWO_SOURCES: &str = r#"
    uniform sampler2D a_tex;
    uniform sampler2D b_tex;
    out vec4 outColor;
    void main() {
        ivec2 at = ivec2(gl_FragCoord.xy);
        outColor = vec4(texelFetch(a_tex, at, 0).r, texelFetch(b_tex, at, 0).g, 0.0, 1.0);
    }
"#;

const SLICE: &str = r#"
    uniform sampler3D volume;
    uniform int layer;
    out vec4 outColor;
    void main() {
        outColor = texelFetch(volume, ivec3(ivec2(gl_FragCoord.xy), layer), 0);
    }
"#;

fn gpu() -> Option<Context> {
    match new_context() {
        Ok(context) => Some(context),
        Err(error) => {
            eprintln!("skipping GPU test: {error}");
            None
        }
    }
}

fn solid(context: &mut Context, program: &Program, target: &renderer::SizedTexture, color: [f32; 4]) {
    draw_to_texture(context, program, target, &ShaderParameters::new().vec4("color", color))
        .unwrap();
}

fn close(actual: u8, expected: u8) -> bool {
    actual.abs_diff(expected) <= 1
}

#[test]
fn every_preset_renders_and_reads_back() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    for preset in FormatPreset::ALL {
        let target = new_texture_2d(&context, 5, 3, preset).unwrap();
        solid(&mut context, &program, &target, [1.0, 0.0, 0.5, 1.0]);
        let pixels = read_pixels(&mut context, &target)
            .unwrap_or_else(|error| panic!("{preset}: {error}"));
        assert_eq!(pixels.len(), 5 * 3 * 4, "{preset}");
        assert_eq!(pixels[0], 255, "{preset}");
        assert_eq!(pixels[3], 255, "{preset}");
    }
}

#[test]
fn solid_color_reads_back_as_bytes() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    let target = new_texture_2d(&context, 4, 4, FormatPreset::RgbaByte).unwrap();
    solid(&mut context, &program, &target, [1.0, 0.0, 0.5, 1.0]);

    let pixels = read_pixels(&mut context, &target).unwrap();
    for texel in pixels.chunks_exact(4) {
        assert_eq!(texel[0], 255);
        assert_eq!(texel[1], 0);
        assert!(texel[2] == 127 || texel[2] == 128, "blue was {}", texel[2]);
        assert_eq!(texel[3], 255);
    }
}

#[test]
fn inversion_complements_the_solid_pass_at_any_size() {
    let Some(mut context) = gpu() else { return };
    let solid_program = create_full_screen_program(&context, SOLID).unwrap();
    let invert_program = create_full_screen_program(&context, INVERT).unwrap();

    for (width, height) in [(1, 1), (7, 3), (64, 17)] {
        let original = new_texture_2d(&context, width, height, FormatPreset::RgbaByte).unwrap();
        let inverted = new_texture_2d(&context, width, height, FormatPreset::RgbaByte).unwrap();
        solid(&mut context, &solid_program, &original, [0.2, 0.6, 0.9, 1.0]);
        draw_to_texture(
            &mut context,
            &invert_program,
            &inverted,
            &ShaderParameters::new().texture("src", &original),
        )
        .unwrap();

        let before = read_pixels(&mut context, &original).unwrap();
        let after = read_pixels(&mut context, &inverted).unwrap();
        for (a, b) in before.chunks_exact(4).zip(after.chunks_exact(4)) {
            for channel in 0..3 {
                assert!(
                    close(b[channel], 255 - a[channel]),
                    "{width}x{height}: {a:?} inverted to {b:?}"
                );
            }
        }
    }
}

#[test]
fn draw_to_texture_uses_the_target_size() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, TARGET_SIZE).unwrap();
    let target = new_texture_2d(&context, 9, 5, FormatPreset::RgbaByte).unwrap();
    draw_to_texture(&mut context, &program, &target, &ShaderParameters::new()).unwrap();

    let pixels = read_pixels(&mut context, &target).unwrap();
    assert_eq!(&pixels[..4], &[9, 5, 0, 255]);
}

#[test]
fn draw_full_screen_clips_the_viewport_to_the_target() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    let target = new_texture_2d(&context, 4, 4, FormatPreset::RgbaByte).unwrap();
    let green = ShaderParameters::new().vec4("color", [0.0, 1.0, 0.0, 1.0]);

    context
        .state_mut()
        .bind_framebuffer(Framebuffer::new(&target, 0));
    draw_full_screen(&mut context, &program, 2, 2, &green).unwrap();

    let pixels = read_pixels(&mut context, &target).unwrap();
    for (index, texel) in pixels.chunks_exact(4).enumerate() {
        let (x, y) = (index % 4, index / 4);
        if x < 2 && y < 2 {
            assert_eq!(texel, &[0, 255, 0, 255], "({x}, {y})");
        } else {
            assert_eq!(texel, &[0, 0, 0, 0], "({x}, {y})");
        }
    }

    draw_full_screen(&mut context, &program, 9, 9, &green).unwrap();
    let pixels = read_pixels(&mut context, &target).unwrap();
    assert!(pixels.chunks_exact(4).all(|texel| texel == [0, 255, 0, 255]));
}

#[test]
fn unknown_uniforms_fail_but_queries_do_not() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    let target = new_texture_2d(&context, 2, 2, FormatPreset::RgbaByte).unwrap();

    let error = draw_to_texture(
        &mut context,
        &program,
        &target,
        &ShaderParameters::new()
            .vec4("color", [0.0; 4])
            .float("stale_name", 1.0),
    )
    .unwrap_err();
    assert!(matches!(error, RenderError::UnknownUniform { ref name } if name == "stale_name"));

    assert!(!uniform_defined(&context, "target_width"));
    assert!(!uniform_defined(&context, "target_height"));
    assert!(uniform_defined(&context, "color"));
}

#[test]
fn binding_without_a_current_program_fails() {
    let Some(mut context) = gpu() else { return };
    let error = bind_parameters(&mut context, &ShaderParameters::new().int("x", 1)).unwrap_err();
    assert!(matches!(error, RenderError::NoActiveProgram));
}

#[test]
fn texture_units_follow_name_order() {
    let Some(mut context) = gpu() else { return };
    let solid_program = create_full_screen_program(&context, SOLID).unwrap();
    let program = create_full_screen_program(&context, TWO_SOURCES).unwrap();

    let red = new_texture_2d(&context, 3, 3, FormatPreset::RgbaByte).unwrap();
    let green = new_texture_2d(&context, 3, 3, FormatPreset::RgbaByte).unwrap();
    let target = new_texture_2d(&context, 3, 3, FormatPreset::RgbaByte).unwrap();
    solid(&mut context, &solid_program, &red, [1.0, 0.0, 0.0, 1.0]);
    solid(&mut context, &solid_program, &green, [0.0, 1.0, 0.0, 1.0]);

    let parameters = ShaderParameters::new()
        .texture("b_tex", &green)
        .texture("a_tex", &red);
    draw_to_texture(&mut context, &program, &target, &parameters).unwrap();

    let values = context.state().uniform_values(program.id()).unwrap();
    assert_eq!(values.unit("a_tex"), 1);
    assert_eq!(values.unit("b_tex"), 2);
    let unit_one = context.state().texture_unit(1).unwrap();
    assert_eq!(
        unit_one.get(renderer::TextureDimension::D2).map(|texture| texture.id()),
        Some(red.id())
    );

    let pixels = read_pixels(&mut context, &target).unwrap();
    assert_eq!(&pixels[..4], &[255, 255, 0, 255]);
}

#[test]
fn unbound_samplers_read_transparent_black() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, INVERT).unwrap();
    let target = new_texture_2d(&context, 2, 2, FormatPreset::RgbaByte).unwrap();
    draw_to_texture(&mut context, &program, &target, &ShaderParameters::new()).unwrap();

    let pixels = read_pixels(&mut context, &target).unwrap();
    assert_eq!(&pixels[..4], &[255, 255, 255, 0]);
}

#[test]
fn sampling_the_render_target_is_a_feedback_loop() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, INVERT).unwrap();
    let target = new_texture_2d(&context, 2, 2, FormatPreset::RgbaByte).unwrap();
    let error = draw_to_texture(
        &mut context,
        &program,
        &target,
        &ShaderParameters::new().texture("src", &target),
    )
    .unwrap_err();
    assert!(matches!(error, RenderError::FeedbackLoop { ref name } if name == "src"));
}

#[test]
fn volume_layers_render_and_sample_independently() {
    let Some(mut context) = gpu() else { return };
    let solid_program = create_full_screen_program(&context, SOLID).unwrap();
    let slice_program = create_full_screen_program(&context, SLICE).unwrap();
    let volume = new_texture_3d(&context, 4, 4, 3, FormatPreset::RgbaByte).unwrap();

    let colors = [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]];
    for (layer, color) in colors.iter().enumerate() {
        draw_to_texture_layer(
            &mut context,
            &solid_program,
            &volume,
            layer as u32,
            &ShaderParameters::new().vec4("color", *color),
        )
        .unwrap();
    }

    assert_eq!(&read_pixels_layer(&mut context, &volume, 0).unwrap()[..4], &[255, 0, 0, 255]);

    // The GL backend copies zeros out of 3D slices above 0, so the other
    // layers are checked by sampling them into a 2D texture.
    let flat = new_texture_2d(&context, 4, 4, FormatPreset::RgbaByte).unwrap();
    for (layer, expected) in [(1, [0u8, 255, 0, 255]), (2, [0, 0, 255, 255])] {
        draw_to_texture(
            &mut context,
            &slice_program,
            &flat,
            &ShaderParameters::new().texture("volume", &volume).int("layer", layer),
        )
        .unwrap();
        assert_eq!(&read_pixels(&mut context, &flat).unwrap()[..4], &expected, "layer {layer}");
    }

    let error = read_pixels_layer(&mut context, &volume, 3).unwrap_err();
    assert!(matches!(error, RenderError::IncompleteFramebuffer(_)));
}

#[test]
fn canvas_takes_the_texture_size() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    let target = new_texture_2d(&context, 6, 2, FormatPreset::RgbByte).unwrap();
    solid(&mut context, &program, &target, [0.0, 1.0, 0.0, 0.0]);

    let mut canvas = Canvas::default();
    read_pixels_to_canvas(&mut context, &target, &mut canvas).unwrap();
    assert_eq!((canvas.width(), canvas.height()), (6, 2));
    assert_eq!(canvas.pixel(5, 1), Some([0, 255, 0, 255]));
}

#[test]
fn default_surface_is_drawn_when_nothing_is_bound() {
    let Some(mut context) = gpu() else { return };
    let program = create_full_screen_program(&context, SOLID).unwrap();
    context.unbind_framebuffer();
    draw_full_screen(
        &mut context,
        &program,
        300,
        150,
        &ShaderParameters::new().vec4("color", [0.0, 0.0, 1.0, 1.0]),
    )
    .unwrap();

    let surface = context.default_surface().clone();
    assert_eq!((surface.width(), surface.height()), (300, 150));
    let pixels = read_pixels(&mut context, &surface).unwrap();
    assert_eq!(&pixels[pixels.len() - 4..], &[0, 0, 255, 255]);
}

#[test]
fn compile_failures_carry_the_log() {
    let Some(context) = gpu() else { return };
    let error = compile_shader(
        &context,
        ShaderStage::Fragment,
        "out vec4 outColor;\nvoid main() { outColor = missing_value; }\n",
    )
    .unwrap_err();
    match error {
        RenderError::ShaderCompile { stage, log } => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(log.contains("missing_value"), "log was: {log}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn linking_needs_one_stage_of_each_kind() {
    let Some(context) = gpu() else { return };
    let fragment = compile_shader(&context, ShaderStage::Fragment, SOLID).unwrap();
    let error = link_program(&context, &fragment, &fragment).unwrap_err();
    assert!(matches!(error, RenderError::ProgramLink { .. }));
}
