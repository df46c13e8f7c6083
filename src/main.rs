use clap::{Parser, Subcommand};
use doctidy::batch::BatchProcessor;
use doctidy::builder::SphinxBuilder;
use doctidy::document::Document;
use doctidy::driver::{self, Project};
use doctidy::registry::{self, DocumentRegistry};
use doctidy::{config, output, parallel, rename};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "doctidy")]
#[command(about = "Build and tidy a Sphinx documentation site")]
#[command(long_about = "\
Build and tidy a Sphinx documentation site

Images are renamed to the SHA1 of their content, image references in .rst
documents are rewritten to match, Chinese/English punctuation and spacing is
normalized, and images no document uses are moved aside.

Project structure:

  project/
  ├── doctidy.toml              # Optional; see 'doctidy gen-config'
  ├── source/
  │   ├── conf.py
  │   ├── index.rst             # Normalized, references left as written
  │   ├── guide/setup.rst
  │   └── _static/              # Image directory (renamed in place)
  ├── build/                    # Removed and rebuilt by 'doctidy build'
  └── unused_images/            # Unreferenced images end up here

Run 'doctidy gen-config' to generate a documented doctidy.toml.")]
#[command(version)]
struct Cli {
    /// Project root (where doctidy.toml lives)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full run: build, rename + format, quarantine, rebuild
    Build,
    /// Rename images, rewrite references and normalize documents
    Format,
    /// Rename images to their content address and print the mapping
    Rename {
        /// Print the mapping as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report documents that reference missing images
    Check,
    /// Record every document's images in the build directory
    Scan {
        /// List each image with the documents that use it
        #[arg(long)]
        by_image: bool,
    },
    /// Normalize punctuation and spacing in the given documents
    Normalize {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a stock doctidy.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build => {
            let project = Project::load(&cli.root)?;
            parallel::init_thread_pool(&project.config.processing);
            let builder = SphinxBuilder::from_config(&project.config.builder);
            let root = cli.root.clone();
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_driver_event(&event, &root) {
                        println!("{}", line);
                    }
                }
            });
            let result = driver::run(&project, &builder, Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            let report = result?;
            output::print_driver_report(&report);
            if !report.status().success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Format => {
            let project = Project::load(&cli.root)?;
            parallel::init_thread_pool(&project.config.processing);
            let processor = BatchProcessor::from_config(&project.paths, &project.config)?;
            let root = cli.root.clone();
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event, &root) {
                        println!("{}", line);
                    }
                }
            });
            let result = processor.process(Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            let report = result?;
            output::print_batch_summary(&report);
            if report.failures().next().is_some() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Rename { json } => {
            let project = Project::load(&cli.root)?;
            parallel::init_thread_pool(&project.config.processing);
            let renamed = rename::rename_by_hash(&project.paths.images)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&renamed)?);
            } else {
                output::print_rename_map(&renamed);
            }
        }
        Command::Check => {
            let project = Project::load(&cli.root)?;
            parallel::init_thread_pool(&project.config.processing);
            println!("==> Checking {}", project.paths.source.display());
            let checks = registry::check_documents(&project.paths.source, &project.config.exclude)?;
            output::print_check_results(&checks, &cli.root);
            if checks.iter().any(|c| !c.is_ok()) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Scan { by_image } => {
            let project = Project::load(&cli.root)?;
            let previous = DocumentRegistry::load(&project.paths.build);
            let registry = DocumentRegistry::scan(&project.paths.source, &project.config.exclude)?;
            let path = registry.save(&project.paths.build)?;
            if by_image {
                let images = registry.images(&project.paths.source);
                for line in output::format_image_index(&images) {
                    println!("{}", line);
                }
            } else {
                output::print_registry(&registry);
            }
            for line in output::format_registry_changes(&registry.changes_since(&previous)) {
                println!("{}", line);
            }
            println!("Registry: {}", path.display());
        }
        Command::Normalize { files } => {
            let mut failed = false;
            for file in &files {
                let result = Document::open(file)
                    .and_then(|doc| doc.normalize())
                    .map_err(|e| e.to_string());
                failed |= result.is_err();
                println!("{}", output::format_normalize_result(file, &result));
            }
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Diagnostics go to stderr; stdout is reserved for command output.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
