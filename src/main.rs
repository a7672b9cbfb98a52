use carousel_forge::acquire::{AcquisitionEngine, ImageSource};
use carousel_forge::config::{self, CarouselConfig};
use carousel_forge::download::{BatchPolicy, DirectorySink, Downloader};
use carousel_forge::generation::{CarouselGenerator, CarouselRequest, ImageBatch};
use carousel_forge::imaging::{png, profile_avatar};
use carousel_forge::naming::slugify;
use carousel_forge::output;
use carousel_forge::session::CarouselSession;
use carousel_forge::types::{CarouselData, DownloadProgress, GenerationSettings, ImageRole};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// File the generated carousel is written to inside the output directory.
const CAROUSEL_FILENAME: &str = "carousel.json";

#[derive(Parser)]
#[command(name = "carousel-forge")]
#[command(about = "Generate Instagram carousels and render them to PNG")]
#[command(long_about = "\
Generate Instagram carousels and render them to PNG

Typical flow:

  carousel-forge generate --name \"Ana Lima\" --handle analima --topic \"Sleep habits\" --images
  carousel-forge regenerate out/carousel.json --slide 3 --prompt \"a quiet bedroom\"
  carousel-forge render out/carousel.json

Generated files (in --output):

  out/
  ├── carousel.json          # Slides, caption, hashtags (editable, re-renderable)
  ├── slide-01-analima.png   # One PNG per slide, in carousel order
  ├── slide-02-analima.png
  └── carousel-content.txt   # Slide text, caption, hashtags, posting steps

Images that cannot be fetched are replaced by generated placeholders, so a
render always produces every slide unless saving fails.

The hosted endpoints and API key variable are set in carousel.toml.
Run 'carousel-forge gen-config' to generate a documented config file.
Set RUST_LOG=debug to see every acquisition and capture attempt.")]
#[command(version)]
struct Cli {
    /// Config file (stock defaults are used when it does not exist)
    #[arg(long, default_value = "carousel.toml", global = true)]
    config: PathBuf,

    /// Output directory
    #[arg(long, default_value = "out", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Display name shown on every slide
    #[arg(long)]
    name: String,
    /// Account handle, with or without the leading @
    #[arg(long)]
    handle: String,
    /// Show the verified badge
    #[arg(long)]
    verified: bool,
    /// Topic or source material for the slides
    #[arg(long)]
    topic: String,
    #[arg(long)]
    title: Option<String>,
    /// Number of slides to ask for
    #[arg(long)]
    slides: Option<u32>,
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long)]
    format: Option<String>,
    /// Call to action: follow, save, share, comment or custom
    #[arg(long)]
    cta: Option<String>,
    /// Text for a custom call to action
    #[arg(long)]
    custom_cta: Option<String>,
    #[arg(long)]
    framework: Option<String>,
    #[arg(long)]
    audience: Option<String>,
    /// Profile picture: URL or local file
    #[arg(long)]
    profile_image: Option<String>,
    /// Generate images for slides that ask for one
    #[arg(long)]
    images: bool,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Carousel JSON written by `generate`
    carousel: PathBuf,
    /// Render only this slide (1-based)
    #[arg(long)]
    slide: Option<usize>,
    /// Use this image for a slide instead of the generated one: ID=URL_OR_FILE
    #[arg(long = "image", value_parser = parse_assignment)]
    images: Vec<(u32, String)>,
    /// Keep rendering the remaining slides when one fails
    #[arg(long)]
    keep_going: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate slide text, caption, hashtags and (optionally) images
    Generate(GenerateArgs),
    /// Render a carousel's slides to PNG files
    Render(RenderArgs),
    /// Generate a new image for one slide and update the carousel file
    Regenerate {
        /// Carousel JSON written by `generate`
        carousel: PathBuf,
        /// Slide id
        #[arg(long)]
        slide: u32,
        /// Prompt to use instead of the slide's stored one
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Write the initials avatar used when a profile picture is unavailable
    Avatar {
        name: String,
        #[arg(long, default_value_t = 256)]
        size: u32,
    },
    /// Check PNG files chunk by chunk
    CheckPng {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// List every chunk
        #[arg(long, short)]
        verbose: bool,
    },
    /// Print a stock carousel.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => {
            let config = config::load_config(&cli.config)?;
            let acquisition = AcquisitionEngine::from_config(&config.acquisition);
            let request = carousel_request(args, &acquisition).await?;
            let generator = CarouselGenerator::from_config(&config)?;
            let carousel = generator.generate_carousel(&request).await?;

            std::fs::create_dir_all(&cli.output)?;
            let path = cli.output.join(CAROUSEL_FILENAME);
            std::fs::write(&path, serde_json::to_string_pretty(&carousel)?)?;

            let batch = ImageBatch::from_slides(&carousel.slides);
            output::print_carousel(&carousel, Some(&batch));
            println!("==> Carousel written to {}", path.display());
        }
        Command::Render(args) => {
            let config = config::load_config(&cli.config)?;
            let acquisition = Arc::new(AcquisitionEngine::from_config(&config.acquisition));
            let mut session = load_session(&args.carousel)?;
            for (id, reference) in &args.images {
                let image = image_reference(&acquisition, reference, ImageRole::Content, None).await?;
                session.set_custom_image(*id, Some(image))?;
            }
            render(&config, acquisition, session.current()?, &args, &cli.output).await?;
        }
        Command::Regenerate {
            carousel,
            slide,
            prompt,
        } => {
            let config = config::load_config(&cli.config)?;
            let generator = CarouselGenerator::from_config(&config)?;
            let mut session = load_session(&carousel)?;
            let image = generator
                .regenerate_slide_image(session.current_mut()?, slide, prompt.as_deref())
                .await?;
            let data = session.current()?;
            std::fs::write(&carousel, serde_json::to_string_pretty(data)?)?;

            output::print_carousel(data, None);
            let state = if image.fallback_used { "placeholder" } else { "generated" };
            println!("==> Slide {slide} image {state}, {} updated", carousel.display());
        }
        Command::Avatar { name, size } => {
            let avatar = profile_avatar(&name, size);
            std::fs::create_dir_all(&cli.output)?;
            let path = cli.output.join(format!("avatar-{}.png", slugify(&name)));
            std::fs::write(&path, &avatar.png)?;
            println!("{} ({}x{})", path.display(), avatar.width, avatar.height);
        }
        Command::CheckPng { files, verbose } => {
            let mut invalid = 0;
            for file in &files {
                let report = png::validate(&std::fs::read(file)?);
                if !report.valid {
                    invalid += 1;
                }
                output::print_png_report(&file.display().to_string(), &report, verbose);
            }
            if invalid > 0 {
                return Err(format!("{invalid} of {} files are not valid PNGs", files.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

async fn render(
    config: &CarouselConfig,
    acquisition: Arc<AcquisitionEngine>,
    carousel: &CarouselData,
    args: &RenderArgs,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(DirectorySink::new(out_dir));
    let downloader = Downloader::from_config(config, Arc::clone(&acquisition), sink);
    let mut on_progress = |p: DownloadProgress| output::print_progress(&p);

    match args.slide {
        Some(n) => {
            let index = n.checked_sub(1).ok_or("slides are numbered from 1")?;
            let saved = downloader
                .download_one(carousel, index, &mut on_progress)
                .await?;
            for line in output::format_saved_slide(&saved) {
                println!("{}", line);
            }
        }
        None => {
            let policy = if args.keep_going {
                BatchPolicy::ContinueOnError
            } else {
                BatchPolicy::AbortOnError
            };
            let report = downloader
                .download_all(carousel, policy, &mut on_progress)
                .await?;
            output::print_batch_report(&report, &acquisition.stats());
            if !report.is_complete() {
                return Err(format!(
                    "{} of {} slides failed",
                    report.failed.len(),
                    report.total
                )
                .into());
            }
        }
    }
    Ok(())
}

fn load_session(path: &Path) -> Result<CarouselSession, Box<dyn std::error::Error>> {
    let data: CarouselData = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let mut session = CarouselSession::new();
    session.load(data)?;
    Ok(session)
}

async fn carousel_request(
    args: GenerateArgs,
    acquisition: &AcquisitionEngine,
) -> Result<CarouselRequest, Box<dyn std::error::Error>> {
    let defaults = GenerationSettings::default();
    let settings = GenerationSettings {
        content_type: args.content_type.unwrap_or(defaults.content_type),
        content_format: args.format.unwrap_or(defaults.content_format),
        slide_count: args.slides.unwrap_or(defaults.slide_count),
        call_to_action: args.cta.unwrap_or(defaults.call_to_action),
        custom_cta: args.custom_cta,
        copywriting_framework: args.framework.unwrap_or(defaults.copywriting_framework),
        target_audience: args.audience,
    };
    let profile_image_url = match args.profile_image.as_deref() {
        Some(value) => {
            Some(image_reference(acquisition, value, ImageRole::Profile, Some(args.name.as_str())).await?)
        }
        None => None,
    };
    Ok(CarouselRequest {
        display_name: args.name,
        handle: args.handle,
        is_verified: args.verified,
        title: args.title,
        content: args.topic,
        settings,
        profile_image_url,
        with_images: args.images,
    })
}

/// URLs pass through to be acquired at render time; an existing local file
/// is acquired now and comes back embedded.
async fn image_reference(
    acquisition: &AcquisitionEngine,
    value: &str,
    role: ImageRole,
    hint: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    let path = Path::new(value);
    if !path.is_file() {
        return Ok(value.to_string());
    }
    let source = ImageSource::File {
        name: value.to_string(),
        bytes: std::fs::read(path)?,
    };
    let result = acquisition.acquire(&source, role, hint).await;
    if result.is_fallback() {
        return Err(format!("{value} is not a supported image").into());
    }
    Ok(result.into_url())
}

fn parse_assignment(value: &str) -> Result<(u32, String), String> {
    let (id, reference) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=IMAGE, got '{value}'"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("'{id}' is not a slide id"))?;
    Ok((id, reference.trim().to_string()))
}
