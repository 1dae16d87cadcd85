//! Extract command - read the fields of a template from a single page.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use image::ImageFormat;
use serde_json::json;
use tracing::{debug, info};

use docanchor_core::{ExtractionError, FieldExtractor, FieldOutcome, FieldValue, PageExtraction};

use super::{OutputFormat, load_config, load_page, load_template};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Template file (JSON)
    #[arg(required = true)]
    template: PathBuf,

    /// Page snapshot file (JSON)
    #[arg(required = true)]
    page: PathBuf,

    /// Only extract fields with this name
    #[arg(long)]
    field: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Directory to save image field values to
    #[arg(long)]
    image_dir: Option<PathBuf>,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;
    let template = load_template(&args.template)?;
    let page = load_page(&args.page, &template, &config)?;
    let extractor = FieldExtractor::from_config(&template, &config)?;

    info!("Extracting '{}' from {}", template.name, args.page.display());

    let extraction = match &args.field {
        Some(name) => {
            let Some(first) = template.fields_named(name).next() else {
                anyhow::bail!("Template '{}' has no field named '{}'", template.name, name);
            };
            PageExtraction {
                template: template.name.clone(),
                fields: vec![FieldOutcome {
                    name: name.clone(),
                    field_type: first.field_type,
                    result: extractor.extract_by_name(&page, name),
                }],
            }
        }
        None => extractor.extract_page(&page),
    };

    if let Some(dir) = &args.image_dir {
        save_images(&extraction, dir, &page_stem(&args.page))?;
    }

    let output = render(&extraction, &args.page, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// File stem used to name per-page outputs.
pub fn page_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page")
        .to_string()
}

/// Short machine-readable state of a field outcome.
pub fn outcome_status(outcome: &FieldOutcome) -> &'static str {
    match &outcome.result {
        Ok(value) if value.is_empty() => "empty",
        Ok(_) => "ok",
        Err(ExtractionError::AnchorNotSet { .. }) => "anchor_not_set",
        Err(ExtractionError::AnchorNotFound { .. }) => "anchor_not_found",
        Err(_) => "error",
    }
}

/// Printable form of a value; images are described by their size.
pub fn value_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Empty => String::new(),
        FieldValue::Text(text) => text.clone(),
        FieldValue::Image(image) => format!("<image {}x{}>", image.width(), image.height()),
    }
}

/// Render an extraction in the requested format.
pub fn render(
    extraction: &PageExtraction,
    page: &Path,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => render_json(extraction, page),
        OutputFormat::Csv => render_csv(extraction),
        OutputFormat::Text => Ok(render_text(extraction, page)),
    }
}

fn render_json(extraction: &PageExtraction, page: &Path) -> anyhow::Result<String> {
    let fields: Vec<serde_json::Value> = extraction
        .fields
        .iter()
        .map(|outcome| {
            let mut entry = json!({
                "name": outcome.name,
                "type": outcome.field_type,
                "status": outcome_status(outcome),
            });
            match &outcome.result {
                Ok(FieldValue::Text(text)) => entry["value"] = json!(text),
                Ok(FieldValue::Image(image)) => {
                    entry["image"] = json!({ "width": image.width(), "height": image.height() })
                }
                Ok(FieldValue::Empty) => entry["value"] = serde_json::Value::Null,
                Err(e) => entry["error"] = json!(e.to_string()),
            }
            entry
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json!({
        "template": extraction.template,
        "page": page.display().to_string(),
        "fields": fields,
    }))?)
}

fn render_csv(extraction: &PageExtraction) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["name", "type", "status", "value", "error"])?;

    for outcome in &extraction.fields {
        let (value, error) = match &outcome.result {
            Ok(value) => (value_text(value), String::new()),
            Err(e) => (String::new(), e.to_string()),
        };
        wtr.write_record([
            outcome.name.as_str(),
            &format!("{:?}", outcome.field_type),
            outcome_status(outcome),
            &value,
            &error,
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn render_text(extraction: &PageExtraction, page: &Path) -> String {
    let mut output = String::new();

    output.push_str(&format!("Template: {}\n", extraction.template));
    output.push_str(&format!("Page: {}\n", page.display()));
    output.push('\n');

    for outcome in &extraction.fields {
        match &outcome.result {
            Ok(value) => {
                let text = value_text(value);
                if text.contains('\n') {
                    output.push_str(&format!("{}:\n", outcome.name));
                    for line in text.lines() {
                        output.push_str(&format!("  {}\n", line));
                    }
                } else {
                    output.push_str(&format!("{}: {}\n", outcome.name, text));
                }
            }
            Err(e) => output.push_str(&format!("{}: ({})\n", outcome.name, e)),
        }
    }

    output.push_str(&format!(
        "\n{}/{} fields extracted\n",
        extraction.extracted_count(),
        extraction.fields.len()
    ));

    output
}

/// Write image field values as PNG files named `<page>_<field>[_<n>].png`.
pub fn save_images(extraction: &PageExtraction, dir: &Path, stem: &str) -> anyhow::Result<usize> {
    fs::create_dir_all(dir)?;
    let mut saved = 0;

    for (i, outcome) in extraction.fields.iter().enumerate() {
        let Some(image) = outcome.value().and_then(FieldValue::as_image) else {
            continue;
        };
        let same_name_before = extraction.fields[..i]
            .iter()
            .filter(|f| f.name == outcome.name)
            .count();
        let name = if same_name_before == 0 {
            format!("{}_{}.png", stem, outcome.name)
        } else {
            format!("{}_{}_{}.png", stem, outcome.name, same_name_before)
        };
        let path = dir.join(name);
        image.save_with_format(&path, ImageFormat::Png)?;
        debug!("Saved image field to {}", path.display());
        saved += 1;
    }

    Ok(saved)
}
