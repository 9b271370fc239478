use clap::{Parser, Subcommand};
use prerender::config::{self, PrerenderConfig};
use prerender::output;
use prerender::prerender::Prerenderer;
use prerender::scheduler::Concurrency;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prerender")]
#[command(about = "Prerender single-page-app routes into static HTML")]
#[command(long_about = "\
Prerender single-page-app routes into static HTML

Each route is rendered through an HTML template filled from a bootstrap
document, and written to {output}/{route}/index.html. Pages may link to more
routes, which are rendered in the same run. Auxiliary trees (media, data) are
copied into the output while rendering is underway.

Project layout with the stock config:

  prerender.toml            # Optional, see 'prerender gen-config'
  html/index.html           # Template: $title, \"$bootstrap\", <div id=\"root\"></div>
  static/
  ├── media/                # Copied to html/media
  └── data/                 # Bootstrap documents, copied to html/data (minified)
      ├── index.json        # Route /
      └── about/index.json  # Route /about

Set RUST_LOG (e.g. RUST_LOG=prerender=debug) for diagnostic logging.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Output directory (replaces output_root; copies under it move too)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log scheduling and copy decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Concurrency flags for `build`.
#[derive(clap::Args, Clone)]
#[group(multiple = false)]
struct ConcurrencyArgs {
    /// Maximum renders in flight (overrides max_concurrent_renders)
    #[arg(long, value_name = "N")]
    concurrency: Option<NonZeroUsize>,

    /// Start every render immediately
    #[arg(long)]
    unbounded: bool,
}

impl ConcurrencyArgs {
    fn resolve(&self, configured: Concurrency) -> Concurrency {
        match (self.concurrency, self.unbounded) {
            (Some(limit), _) => Concurrency::Limited(limit),
            (None, true) => Concurrency::Unbounded,
            (None, false) => configured,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Copy assets and render every reachable route
    Build {
        #[command(flatten)]
        concurrency: ConcurrencyArgs,

        /// Seed routes (replace the configured ones)
        routes: Vec<String>,
    },
    /// Validate config and inputs without writing anything
    Check,
    /// Print a stock prerender.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Command::Build {
            concurrency,
            routes,
        } => {
            let config = load(&cli.config, cli.output)?;
            let seeds = if routes.is_empty() {
                config.routes.clone()
            } else {
                routes
            };

            let mut options = config.prerender_options();
            options.concurrency = concurrency.resolve(options.concurrency);
            let renderer = config.template_renderer()?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_event(&event);
                }
            });
            let prerenderer = Prerenderer::new(renderer, options)?.with_events(tx);
            let result = prerenderer.run(&seeds);
            drop(prerenderer);
            printer.join().map_err(|_| "progress printer panicked")?;

            let summary = result?;
            println!();
            output::print_summary(&summary);
        }
        Command::Check => {
            let config = load(&cli.config, cli.output)?;
            let mut problems = config.check_inputs();
            if config.template.is_file()
                && let Err(e) = config.template_renderer()
            {
                problems.push(e.to_string());
            }
            output::print_check_output(&cli.config, &problems);
            if !problems.is_empty() {
                return Err(format!("{} problem(s) found", problems.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file and apply the `--output` override.
fn load(
    path: &std::path::Path,
    output: Option<PathBuf>,
) -> Result<PrerenderConfig, config::ConfigError> {
    let mut config = config::load_config(path)?;
    if let Some(output) = output {
        config.rebase_output_root(output);
    }
    Ok(config)
}

/// Diagnostics go to stderr; stdout carries progress and the summary.
fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("prerender=debug,warn")
        } else {
            EnvFilter::new("prerender=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
