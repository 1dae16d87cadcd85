//! Validate command - check a template without touching any page.

use std::path::PathBuf;

use clap::Args;
use console::style;

use docanchor_core::EntityType;

use super::load_template;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Template file (JSON)
    #[arg(required = true)]
    template: PathBuf,
}

pub async fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let template = load_template(&args.template)?;

    let unset_anchors = template.anchors.iter().filter(|a| !a.is_set()).count();
    let unset_fields = template.fields.iter().filter(|f| !f.is_set()).count();
    let count = |t: EntityType| template.fields.iter().filter(|f| f.field_type == t).count();

    println!(
        "{} Template '{}' is valid",
        style("✓").green(),
        template.name
    );
    println!(
        "   {} anchors ({} not set), {} marks",
        template.anchors.len(),
        unset_anchors,
        template.marks.len()
    );
    println!(
        "   {} fields ({} PDF text, {} OCR text, {} image), {} distinct names, {} without rectangle",
        template.fields.len(),
        count(EntityType::PdfText),
        count(EntityType::OcrText),
        count(EntityType::ImageData),
        template.field_names().len(),
        unset_fields
    );

    Ok(())
}
