use clap::{Parser, Subcommand};
use sitewright::{config, engine::BuildEngine, output, watch};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(about = "Incremental static site builder")]
#[command(long_about = "\
Incremental static site builder

Markdown files and .page component descriptors become HTML pages. Feed and
taxonomy pages are generated from page metadata. Local images become
responsive <picture> elements.

Project structure:

  my-site/
  ├── site.toml                  # Config (optional)
  ├── src/
  │   ├── content/               # Pages, images and other assets
  │   │   ├── about.md           # → public/about.html
  │   │   ├── contact.page       # Component page: template + props
  │   │   └── blog/
  │   │       ├── first.md       # → public/blog/first.html
  │   │       └── img/dawn.jpg   # → resized + .avif/.webp variants
  │   └── static/                # → public/static/ verbatim
  └── public/                    # Published site

Front matter keys: title, date, tags, category, draft, template, and
permalink/path/route/slug to override the output path.

Run 'sitewright gen-config' to generate a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Project root containing site.toml
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Publish pages marked as drafts
    #[arg(long, global = true)]
    drafts: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site once
    Build,
    /// Build, then rebuild on every change to content or static files
    Watch,
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build => {
            let mut engine = load_engine(&cli)?;
            let summary = engine.build()?;
            output::print_summary(&summary);
        }
        Command::Watch => {
            let engine = load_engine(&cli)?;
            watch::watch(engine, output::print_summary)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}

fn load_engine(cli: &Cli) -> Result<BuildEngine, config::ConfigError> {
    let mut site_config = config::load_config(&cli.root)?;
    if cli.drafts {
        site_config.build.render_drafts = true;
    }
    init_thread_pool(&site_config.build);
    Ok(BuildEngine::new(site_config, &cli.root))
}

/// Initialize the rayon thread pool based on build config.
///
/// Capped at the number of available CPU cores: users can constrain down, not up.
fn init_thread_pool(build: &config::BuildConfig) {
    let threads = config::effective_threads(build);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
