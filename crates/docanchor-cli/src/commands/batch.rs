//! Batch command - extract the fields of a template from many pages.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use docanchor_core::models::config::DocAnchorConfig;
use docanchor_core::{FieldExtractor, PageExtraction, Template};

use super::extract::{page_stem, render, save_images, value_text};
use super::{OutputFormat, load_config, load_page, load_template};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Template file (JSON)
    #[arg(required = true)]
    template: PathBuf,

    /// Page snapshot files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each page
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Save image field values next to the page outputs
    #[arg(long)]
    save_images: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single page.
struct PageResult {
    path: PathBuf,
    extraction: Option<PageExtraction>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = Arc::new(load_config(config_path)?);
    let template = Arc::new(load_template(&args.template)?);

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            ext.eq_ignore_ascii_case("json")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching page files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} pages to process",
        style("ℹ").blue(),
        files.len()
    );

    // Create output directory if specified
    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages")?
            .progress_chars("=>-"),
    );

    let total = files.len();
    let jobs = args.jobs.max(1);
    let mut pending = files.into_iter().enumerate();
    let mut tasks = JoinSet::new();
    let mut slots: Vec<Option<PageResult>> = (0..total).map(|_| None).collect();

    loop {
        while tasks.len() < jobs {
            let Some((index, path)) = pending.next() else {
                break;
            };
            let template = Arc::clone(&template);
            let config = Arc::clone(&config);
            tasks.spawn_blocking(move || (index, process_page(path, &template, &config)));
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let (index, result) = joined?;

        if let Some(error_msg) = &result.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), error_msg);
            } else {
                error!("Failed to process {}: {}", result.path.display(), error_msg);
                overall_pb.abandon();
                anyhow::bail!("Processing failed: {}", error_msg);
            }
        }

        overall_pb.inc(1);
        slots[index] = Some(result);
    }

    overall_pb.finish_with_message("Complete");

    let results: Vec<PageResult> = slots.into_iter().flatten().collect();
    let successful: Vec<_> = results.iter().filter(|r| r.extraction.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &successful {
            let Some(extraction) = &result.extraction else {
                continue;
            };
            let stem = page_stem(&result.path);
            let output_path = output_dir.join(format!("{}.{}", stem, args.format.extension()));
            fs::write(&output_path, render(extraction, &result.path, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());

            if args.save_images {
                save_images(extraction, output_dir, &stem)?;
            }
        }
    }

    // Generate summary if requested
    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &template, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} pages in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed pages:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn process_page(path: PathBuf, template: &Template, config: &DocAnchorConfig) -> PageResult {
    let page_start = Instant::now();
    let outcome = extract_page(&path, template, config);
    let processing_time_ms = page_start.elapsed().as_millis() as u64;

    match outcome {
        Ok(extraction) => PageResult {
            path,
            extraction: Some(extraction),
            error: None,
            processing_time_ms,
        },
        Err(e) => PageResult {
            path,
            extraction: None,
            error: Some(format!("{:#}", e)),
            processing_time_ms,
        },
    }
}

fn extract_page(
    path: &Path,
    template: &Template,
    config: &DocAnchorConfig,
) -> anyhow::Result<PageExtraction> {
    let page = load_page(path, template, config)?;
    let extractor = FieldExtractor::from_config(template, config)?;
    Ok(extractor.extract_page(&page))
}

fn write_summary(path: &Path, template: &Template, results: &[PageResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let names = template.field_names();

    let mut header = vec![
        "filename",
        "status",
        "extracted",
        "failed_fields",
        "processing_time_ms",
        "error",
    ];
    header.extend(names.iter().copied());
    wtr.write_record(&header)?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        let mut record = match &result.extraction {
            Some(extraction) => vec![
                filename.to_string(),
                "success".to_string(),
                extraction.extracted_count().to_string(),
                extraction.failures().count().to_string(),
                result.processing_time_ms.to_string(),
                String::new(),
            ],
            None => vec![
                filename.to_string(),
                "error".to_string(),
                String::new(),
                String::new(),
                result.processing_time_ms.to_string(),
                result.error.clone().unwrap_or_default(),
            ],
        };
        for name in &names {
            let value = result
                .extraction
                .as_ref()
                .and_then(|e| e.value(name))
                .map(value_text)
                .unwrap_or_default();
            record.push(value);
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
