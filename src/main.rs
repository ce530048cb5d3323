//! PharmaSee - Medicine package identification from camera frames
//!
//! Reads text off a package, resolves it against a catalog of known
//! medicines, and asks a language model to classify the result.

mod app;
mod capture;
mod catalog;
mod classify;
mod config;
mod pipeline;
mod scanner;
mod storage;
mod vision;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{print_result, spawn_stdin_reader, ScannerApp};
use crate::capture::{FrameSource, ImageSequenceSource};
use crate::catalog::Catalog;
use crate::classify::{ChatClassifier, Classifier};
use crate::config::AppConfig;
use crate::pipeline::{ResolutionPipeline, ResolvedMedicine};
use crate::scanner::ScanScheduler;
use crate::vision::{build_recognizer, ModelManager, TextExtractor};

/// PharmaSee - medicine package scanner
#[derive(Parser, Debug)]
#[command(name = "pharmasee", version)]
#[command(about = "Identify medicine packages from camera frames")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live scanner over a frame source
    Run {
        /// Image file or directory to replay as the camera feed
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Disable automatic scanning; only scan on request
        #[arg(long)]
        no_auto: bool,

        /// Extra medicine names to append to the catalog
        #[arg(long = "add", value_name = "NAME")]
        extra: Vec<String>,
    },
    /// Resolve medicines in still images
    Scan {
        /// Images to scan
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Stop after name detection; no classification request
        #[arg(long)]
        detect_only: bool,

        /// Also print every text observation
        #[arg(long)]
        show_text: bool,

        /// Extra medicine names to append to the catalog
        #[arg(long = "add", value_name = "NAME")]
        extra: Vec<String>,
    },
    /// Query the catalog with fuzzy matching
    Match {
        /// Text to look up
        query: String,

        /// Number of ranked candidates to show
        #[arg(short, long, default_value = "5")]
        top: usize,

        /// Minimum score for a match (defaults to the configured threshold)
        #[arg(long)]
        threshold: Option<u8>,

        /// Print every catalog entry after the lookup
        #[arg(long)]
        list: bool,
    },
    /// Classify a medicine name
    Classify {
        /// Medicine name
        name: String,
    },
    /// Check or download the local OCR models
    Models {
        /// Download missing models
        #[arg(long)]
        download: bool,
    },
    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.as_deref();
    let load = || config::resolve_config(config_path);

    match args.command {
        Command::Run {
            source,
            no_auto,
            extra,
        } => run_live(load()?, source, no_auto, &extra),
        Command::Scan {
            images,
            detect_only,
            show_text,
            extra,
        } => scan_images(load()?, &images, detect_only, show_text, &extra),
        Command::Match {
            query,
            top,
            threshold,
            list,
        } => match_catalog(&load()?, &query, top, threshold, list),
        Command::Classify { name } => classify_name(load()?, &name),
        Command::Models { download } => check_models(&load()?, download),
        Command::InitConfig { path, force } => init_config(path.as_deref().or(config_path), force),
    }
}

/// Build the classifier; fails without an API key
fn build_classifier(config: &AppConfig) -> Result<Classifier> {
    config.require_api_key()?;
    let service = ChatClassifier::new(config.classifier.clone())?;
    Ok(Classifier::new(Box::new(service)))
}

/// Assemble the full pipeline from configuration
fn build_pipeline(config: &AppConfig, classifier: Classifier) -> Result<ResolutionPipeline> {
    let catalog = Catalog::load(&config.catalog.path)?;

    let recognizer = build_recognizer(&config.ocr)?;
    let extractor = TextExtractor::with_config(recognizer, &config.ocr);

    Ok(ResolutionPipeline::new(
        extractor,
        catalog,
        classifier,
        config.resolution.clone(),
    ))
}

/// Append command-line names to the loaded catalog
fn extend_catalog(catalog: &mut Catalog, extra: &[String]) {
    let added = extra.iter().filter(|name| catalog.add(name)).count();
    if added < extra.len() {
        warn!("Skipped {} empty or duplicate name(s)", extra.len() - added);
    }
    info!("Catalog holds {} medicine(s)", catalog.len());
}

fn run_live(
    mut config: AppConfig,
    source: Option<PathBuf>,
    no_auto: bool,
    extra: &[String],
) -> Result<()> {
    if source.is_some() {
        config.capture.source = source;
    }
    let source_path = config
        .capture
        .source
        .clone()
        .context("No frame source given; use --source or set capture.source")?;

    let classifier = build_classifier(&config)?;
    let pipeline = build_pipeline(&config, classifier)?;
    let frames = ImageSequenceSource::open(&source_path, config.capture.looping)?;

    let mut scheduler = ScanScheduler::new(pipeline, config.scanner.interval());
    extend_catalog(scheduler.pipeline_mut().catalog_mut(), extra);
    let auto_scan = config.scanner.auto_scan && !no_auto;

    info!("PharmaSee starting...");
    let mut app = ScannerApp::new(
        frames,
        scheduler,
        spawn_stdin_reader(),
        auto_scan,
        config.capture.max_fps,
        Box::new(std::io::stdout()),
    );
    app.run()?;
    if let Some(last) = app.scheduler().cached() {
        info!("Last resolved medicine: {}", last.name);
    }
    info!("PharmaSee shutdown complete");

    Ok(())
}

fn scan_images(
    config: AppConfig,
    images: &[PathBuf],
    detect_only: bool,
    show_text: bool,
    extra: &[String],
) -> Result<()> {
    let classifier = if detect_only {
        Classifier::new(Box::new(DetectOnly))
    } else {
        build_classifier(&config)?
    };
    let mut pipeline = build_pipeline(&config, classifier)?;
    extend_catalog(pipeline.catalog_mut(), extra);
    let mut stdout = std::io::stdout();

    for path in images {
        let mut source = ImageSequenceSource::open(path, false)?;
        info!("Scanning {} image(s) from {}", source.len(), path.display());
        let frame_paths = source.paths().to_vec();

        for frame_path in &frame_paths {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            println!("{}:", frame_path.display());

            // Extract once; text display and resolution share the observations
            let observations = pipeline.extractor().extract(&frame);
            if show_text {
                for observation in &observations {
                    println!("  '{}' ({:.2})", observation.text, observation.confidence);
                }
                println!("  All text: {}", vision::all_text(&observations, " | "));
                if let Some(best) = vision::highest_confidence(&observations) {
                    println!("  Most confident: '{}' ({:.2})", best.text, best.confidence);
                }
            }

            match pipeline.select(&observations) {
                Some(candidate) if detect_only => {
                    println!("  {} ({})", candidate.name, candidate.source)
                }
                Some(candidate) => {
                    let resolved = pipeline.classify_candidate(candidate);
                    print_result(&mut stdout, &resolved)?;
                }
                None => println!("  No medicine detected"),
            }
        }
    }

    Ok(())
}

/// Placeholder service for runs that never classify
struct DetectOnly;

impl classify::ClassificationService for DetectOnly {
    fn remote_classify(&self, _name: &str) -> Result<String, classify::ClassifyError> {
        Err(classify::ClassifyError::Other(
            "classification disabled".to_string(),
        ))
    }
}

fn match_catalog(
    config: &AppConfig,
    query: &str,
    top: usize,
    threshold: Option<u8>,
    list: bool,
) -> Result<()> {
    let catalog = Catalog::load(&config.catalog.path)?;
    let threshold = threshold.unwrap_or(config.resolution.match_threshold);

    let result = catalog.search_scored(query, threshold);
    match &result.name {
        Some(name) => println!("Match: {} (score {})", name, result.score),
        None => println!(
            "No match at threshold {} (best score {})",
            threshold, result.score
        ),
    }

    if top > 0 && !catalog.is_empty() {
        println!("\nTop {} candidate(s):", top.min(catalog.len()));
        for (name, score) in catalog.top_n(query, top) {
            println!("  {:>3}  {}", score, name);
        }
    }

    if list {
        println!("\nCatalog ({} entries):", catalog.len());
        for name in catalog.names() {
            println!("  {}", name);
        }
    }

    Ok(())
}

fn classify_name(config: AppConfig, name: &str) -> Result<()> {
    let classifier = build_classifier(&config)?;

    // The catalog is advisory here; any name can be classified
    match Catalog::load(&config.catalog.path) {
        Ok(catalog) if !catalog.is_known(name, config.resolution.match_threshold) => {
            warn!("'{}' is not in the catalog", name.trim())
        }
        Ok(_) => {}
        Err(e) => warn!("Catalog unavailable: {}", e),
    }

    let resolved = ResolvedMedicine {
        name: name.trim().to_string(),
        source: pipeline::NameSource::Ocr,
        classification: classifier.classify(name.trim()),
        resolved_at: chrono::Local::now(),
    };
    println!("{}", resolved.detailed_info());

    if resolved.classification.is_error() {
        warn!("Classification failed for {}", resolved.name);
    }
    Ok(())
}

fn check_models(config: &AppConfig, download: bool) -> Result<()> {
    let manager = match &config.ocr.models_dir {
        Some(dir) => ModelManager::with_dir(dir.clone())?,
        None => ModelManager::new()?,
    };

    println!("Models directory: {}", manager.models_dir().display());
    for (model_type, available, size) in manager.get_model_status() {
        let status = match (available, size) {
            (true, Some(bytes)) => format!("ready ({:.1} MB)", bytes as f64 / 1_000_000.0),
            (false, Some(_)) => "incomplete".to_string(),
            _ => "missing".to_string(),
        };
        println!("  {:<18} {}", model_type.display_name(), status);
    }

    if download && !manager.are_models_ready() {
        for model_type in vision::ModelType::ALL {
            manager.ensure_model(model_type)?;
        }
        println!("All models ready.");
    }

    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path().context("Could not determine config directory")?,
    };

    if path.exists() && !force {
        anyhow::bail!("{:?} already exists; use --force to overwrite", path);
    }

    config::save_config(&AppConfig::default(), &path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
