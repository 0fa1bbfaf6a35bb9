use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use futures::stream;

use capturekit::capture::{CaptureService, StaticPageRasterizer, capture_region};
use capturekit::config::{Config, ImageFormat};
use capturekit::preferences::{JsonFileStore, MemoryStore, PreferenceStore};
use capturekit::selection::{InputEvent, Key, LogRenderer};
use capturekit::{Cancellation, EncodedArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    FullPage,
    Viewport,
    Area,
    /// Drive the interactive selection with a scripted drag
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Png,
    Jpeg,
    Webp,
}

impl From<Format> for ImageFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Png => ImageFormat::Png,
            Format::Jpeg => ImageFormat::Jpeg,
            Format::Webp => ImageFormat::Webp,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "capturekit", about = "Capture a page image as a screenshot artifact")]
struct Cli {
    /// Image standing in for the rendered page
    page: PathBuf,
    #[arg(long = "out", default_value = ".")]
    out_dir: PathBuf,
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "target", value_enum, default_value = "full-page")]
    target: Target,
    /// Document-space area as x,y,width,height
    #[arg(long = "area", value_delimiter = ',')]
    area: Option<Vec<f64>>,
    #[arg(long = "oval")]
    oval: bool,
    #[arg(long = "format", value_enum)]
    format: Option<Format>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let mut options = config.validate().context("invalid configuration")?;
    if let Some(format) = cli.format {
        options.capture.format = format.into();
    }

    let page = image::open(&cli.page)
        .with_context(|| format!("reading page image {}", cli.page.display()))?
        .to_rgba8();
    let service = CaptureService::new(Arc::new(StaticPageRasterizer::new(page)), options.capture);

    let artifact = match cli.target {
        Target::FullPage => service.capture_full_page().await?,
        Target::Viewport => service.capture_viewport().await?,
        Target::Area => {
            let [x, y, w, h] = area(&cli)?;
            service.capture_area(x, y, w, h, cli.oval).await?
        }
        Target::Select => {
            let [x, y, w, h] = area(&cli)?;
            let mut events = Vec::new();
            if cli.oval {
                events.push(InputEvent::key(Key::Character('2')));
            }
            events.extend([
                InputEvent::pointer_down(x, y),
                InputEvent::pointer_move(x + w, y + h),
                InputEvent::pointer_up(x + w, y + h),
                InputEvent::Accept,
            ]);
            capture_region(
                &service,
                stream::iter(events),
                LogRenderer,
                preference_store(),
                options.selection,
                Cancellation::new(),
            )
            .await?
        }
    };

    let path = write_artifact(&cli.out_dir, &artifact)?;
    println!("{}", path.display());
    Ok(())
}

fn area(cli: &Cli) -> anyhow::Result<[f64; 4]> {
    match cli.area.as_deref() {
        Some(&[x, y, w, h]) => Ok([x, y, w, h]),
        Some(_) => bail!("--area takes exactly four values"),
        None => bail!("--area is required for this target"),
    }
}

fn preference_store() -> Arc<dyn PreferenceStore> {
    match JsonFileStore::default_location() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            log::warn!("Preferences will not persist: {}", err);
            Arc::new(MemoryStore::new())
        }
    }
}

fn write_artifact(out_dir: &Path, artifact: &EncodedArtifact) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(&artifact.suggested_filename);
    std::fs::write(&path, &artifact.bytes).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Saved {} ({} bytes)", path.display(), artifact.len());
    Ok(path)
}
