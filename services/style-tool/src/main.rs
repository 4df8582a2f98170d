//! Style configuration tool.
//!
//! Validates layer style configuration files and renders their legends to
//! PNG files, using the same factory and legend renderer as the render
//! workers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use raster_common::{BandIndex, BandResolver, IdentityResolver};
use style_renderer::{Legend, LegendRenderer, LegendSettings, StyleConfig, StyleFactory};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "style-tool")]
#[command(about = "Validate raster style configuration and render legends")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every style and report the bands each one needs
    Validate {
        #[command(flatten)]
        layer: LayerArgs,
    },
    /// Render legend images for every style that has one
    Legend {
        #[command(flatten)]
        layer: LayerArgs,

        /// Directory the PNG files are written to
        #[arg(short, long, default_value = "legends")]
        out_dir: PathBuf,

        /// Only this style
        #[arg(short, long)]
        style: Option<String>,

        /// TrueType font for legend labels
        #[arg(long, env = "LEGEND_FONT_PATH")]
        font: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct LayerArgs {
    /// Style configuration file (JSON or YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// JSON table of canonical band names to aliases
    #[arg(short, long)]
    bands: Option<PathBuf>,

    /// Bands the layer always fetches (comma separated)
    #[arg(long, value_delimiter = ',')]
    always_fetch: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    match args.command {
        Command::Validate { layer } => {
            let lines = validate(&layer)?;
            for line in lines {
                println!("{}", line);
            }
        }
        Command::Legend {
            layer,
            out_dir,
            style,
            font,
        } => {
            // --font needs its own renderer; the global one only reads the environment
            let settings = LegendSettings {
                font_path: font,
                ..LegendSettings::from_env()
            };
            let written = write_legends(&layer, &out_dir, style.as_deref(), &LegendRenderer::new(settings))?;
            info!(count = written.len(), dir = %out_dir.display(), "Wrote legends");
        }
    }

    Ok(())
}

fn load_factory(layer: &LayerArgs) -> Result<StyleFactory> {
    let resolver: Arc<dyn BandResolver> = match &layer.bands {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading band table {}", path.display()))?;
            let index: BandIndex = serde_json::from_str(&content)
                .with_context(|| format!("parsing band table {}", path.display()))?;
            Arc::new(index)
        }
        None => Arc::new(IdentityResolver),
    };
    Ok(StyleFactory::new(resolver).with_always_fetch(layer.always_fetch.iter().cloned()))
}

fn load_config(path: &Path) -> Result<StyleConfig> {
    StyleConfig::from_file(path).with_context(|| format!("loading styles from {}", path.display()))
}

/// One summary line per style; fails when any style does not build.
fn validate(layer: &LayerArgs) -> Result<Vec<String>> {
    let config = load_config(&layer.config)?;
    let report = load_factory(layer)?.build_all(&config);

    let mut lines: Vec<String> = report
        .styles
        .iter()
        .map(|(name, style)| {
            let bands: Vec<&str> = style.needed_bands().iter().map(String::as_str).collect();
            format!("{}\t{}\t{}", name, style.kind(), bands.join(","))
        })
        .collect();

    if !report.failures.is_empty() {
        for (name, err) in &report.failures {
            lines.push(format!("{}\tERROR\t{}", name, err));
        }
        for line in &lines {
            eprintln!("{}", line);
        }
        bail!(
            "{} of {} styles failed to build",
            report.failures.len(),
            config.styles.len()
        );
    }
    Ok(lines)
}

/// Render legends into `out_dir`, returning the files written.
fn write_legends(
    layer: &LayerArgs,
    out_dir: &Path,
    only: Option<&str>,
    renderer: &LegendRenderer,
) -> Result<Vec<PathBuf>> {
    let config = load_config(&layer.config)?;
    let factory = load_factory(layer)?;
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut written = Vec::new();
    for (name, doc) in &config.styles {
        if only.map_or(false, |s| s != name.as_str()) {
            continue;
        }
        let style = factory.build(name, doc)?;
        match renderer.render(&style)? {
            Some(Legend::Image(bytes)) => {
                let path = out_dir.join(format!("{}.png", name));
                fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
                info!(style = %name, path = %path.display(), "Rendered legend");
                written.push(path);
            }
            Some(Legend::External(url)) => {
                info!(style = %name, url = %url, "Legend is hosted externally");
            }
            None => {}
        }
    }

    if let Some(only) = only {
        if !config.styles.contains_key(only) {
            warn!(style = %only, "Style not found in configuration");
        }
    }
    Ok(written)
}
