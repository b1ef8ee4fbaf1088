use clap::{Parser, Subcommand};
use quarry::config::{self, CONFIG_FILENAME};
use quarry::scheduler::{CancelToken, Engine, PassMode, PassOutcome};
use quarry::{emit, output, scan, watch};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Deterministic build engine for static sites")]
#[command(long_about = "\
Deterministic build engine for static sites

Quarry compiles canonical JSON documents into a hermetic output tree. The
same inputs always produce the same bytes, and a failed build never touches
the published output.

Project structure:

  project/
  ├── quarry.toml                  # Site config (optional, merged over defaults)
  ├── content/                     # Pages and partials (*.json)
  │   ├── index.json               # → /
  │   └── blog/hello.json          # → /blog/hello
  ├── layouts/                     # Layout documents
  ├── components/                  # Component documents with manifests
  ├── theme/                       # *.css, concatenated into /theme.css
  └── public/                      # Copied as assets (hashed when enabled)

Output goes to dist/ by default; the build report to .quarry/build-report.json.

Run 'quarry gen-config' to print a documented quarry.toml.")]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file, relative to the project root
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Log stage progress and list every output file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site and commit it to the output directory
    Build,
    /// Build, then rebuild on every change
    Watch,
    /// Check documents and config without writing anything
    Validate,
    /// Print a stock quarry.toml with all options documented
    GenConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = cli.root.join(&cli.config);

    match cli.command {
        Command::Build => build(&cli.root, &config_path, cli.verbose),
        Command::Watch => {
            println!("==> Watching {}", cli.root.display());
            watch::watch(&cli.root, &config_path, |report| {
                output::print_build_output(report, cli.verbose);
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let Some(site_config) = load_or_report(&config_path) else {
                return Ok(ExitCode::FAILURE);
            };
            println!("==> Validating {}", cli.root.display());
            let input = scan::scan(&cli.root, &site_config)?;
            let engine = Engine::new(site_config)?;
            let report = engine.validate(&input);
            output::print_build_output(&report, cli.verbose);
            Ok(exit_code(report.success))
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build(root: &Path, config_path: &Path, verbose: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let Some(site_config) = load_or_report(config_path) else {
        return Ok(ExitCode::FAILURE);
    };
    let output_dir = root.join(&site_config.paths.output);

    println!("==> Scanning {}", root.display());
    let input = scan::scan(root, &site_config)?;
    let mut engine = Engine::new(site_config)?;

    println!("==> Building → {}", output_dir.display());
    let pass = match engine.run_pass(input, PassMode::Full, &CancelToken::new())? {
        PassOutcome::Completed(pass) => pass,
        PassOutcome::Cancelled => return Ok(ExitCode::FAILURE),
    };
    emit::publish(root, &output_dir, &pass)?;
    output::print_build_output(&pass.report, verbose);
    Ok(exit_code(pass.success()))
}

/// Load the config, printing it as a diagnostic when it is rejected.
fn load_or_report(config_path: &Path) -> Option<config::SiteConfig> {
    match config::load_config(config_path) {
        Ok(site_config) => Some(site_config),
        Err(e) => {
            let diagnostic = e.to_diagnostic(&config_path.display().to_string());
            output::print_diagnostics(&[diagnostic]);
            None
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
