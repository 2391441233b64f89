use std::path::Path;

use anyhow::{Context as _, Result};
use passconfig::{default_color, FilterSetting, FormatSetting, PassConfig, PassStep};
use renderer::{read_pixels_to_canvas, Canvas, Context, ContextOptions, FilterPolicy, FormatPreset};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, PassName};
use crate::passes::PassRunner;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let plan = build_plan(&cli)?;
    if cli.check {
        let report = PlanReport {
            config: &plan,
            output: &cli.output,
        };
        let json = serde_json::to_string_pretty(&report).context("failed to serialise plan")?;
        println!("{json}");
        return Ok(());
    }
    execute(&plan, &cli.output)
}

#[derive(Serialize)]
struct PlanReport<'a> {
    #[serde(flatten)]
    config: &'a PassConfig,
    output: &'a Path,
}

/// Loads the config file (or the defaults) and layers the CLI flags on top.
pub fn build_plan(cli: &Cli) -> Result<PassConfig> {
    let mut plan = match &cli.config {
        Some(path) => PassConfig::load(path)
            .with_context(|| format!("failed to load pass config {}", path.display()))?,
        None => PassConfig::default(),
    };

    let target = &mut plan.target;
    if let Some(format) = cli.format {
        target.format = format;
    }
    if let Some((width, height)) = cli.size {
        target.width = width;
        target.height = height;
    }
    if let Some(depth) = cli.depth {
        target.depth = depth;
    }
    if let Some(filter) = cli.filter {
        target.filter = filter;
    }

    if let Some(names) = &cli.passes {
        plan.passes = names
            .iter()
            .map(|name| match name {
                PassName::Solid => PassStep::Solid {
                    color: default_color(),
                },
                PassName::Invert => PassStep::Invert,
                PassName::Copy => PassStep::Copy,
            })
            .collect();
    }
    if let Some(color) = cli.color {
        for step in &mut plan.passes {
            if let PassStep::Solid { color: current } = step {
                *current = color.to_vec();
            }
        }
    }

    plan.validate().context("invalid pass plan")?;
    Ok(plan)
}

fn execute(plan: &PassConfig, output: &Path) -> Result<()> {
    let preset = format_preset(plan.target.format)?;
    let mut context = Context::new(ContextOptions {
        default_filter: filter_policy(plan.target.filter),
        ..ContextOptions::default()
    })
    .context("failed to create rendering context")?;
    let adapter = context.adapter_info();
    tracing::info!(
        adapter = %adapter.name,
        backend = ?adapter.backend,
        "rendering context ready"
    );

    let runner = PassRunner::new(&context, plan.target.is_volume())?;
    let result = runner.run(&mut context, plan, preset)?;

    // Volumes show their first slice.
    let mut canvas = Canvas::default();
    read_pixels_to_canvas(&mut context, &result, &mut canvas)
        .context("failed to display the result")?;
    canvas
        .save_png(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        path = %output.display(),
        width = canvas.width(),
        height = canvas.height(),
        format = %preset,
        passes = plan.passes.len(),
        "wrote displayed result"
    );
    Ok(())
}

fn format_preset(setting: FormatSetting) -> Result<FormatPreset> {
    setting
        .name()
        .parse()
        .with_context(|| format!("format {setting} has no texture preset"))
}

fn filter_policy(setting: FilterSetting) -> FilterPolicy {
    match setting {
        FilterSetting::Nearest => FilterPolicy::Nearest,
        FilterSetting::Linear => FilterPolicy::Linear,
    }
}
