//! Anchors command - show where each anchor of a template lands on a page.

use std::path::PathBuf;

use clap::Args;
use console::style;
use serde_json::json;
use tracing::info;

use docanchor_core::{AnchorError, AnchorResolver, AnchorStatus, PageSnapshot, RankingPolicy};

use super::{load_config, load_page, load_template};

/// Arguments for the anchors command.
#[derive(Args)]
pub struct AnchorsArgs {
    /// Template file (JSON)
    #[arg(required = true)]
    template: PathBuf,

    /// Page snapshot file (JSON)
    #[arg(required = true)]
    page: PathBuf,

    /// Print JSON instead of a text report
    #[arg(long)]
    json: bool,

    /// Only report whether each anchor was found
    #[arg(long)]
    status_only: bool,
}

pub async fn run(args: AnchorsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let template = load_template(&args.template)?;
    let page = load_page(&args.page, &template, &config)?;
    let resolver = AnchorResolver::new(&template)?.with_ranker(config.resolution.ranking);

    info!(
        "Resolving {} anchors of '{}' on {}",
        template.anchors.len(),
        template.name,
        args.page.display()
    );

    let reports = if args.status_only {
        status_reports(&resolver, &page)?
    } else {
        position_reports(&resolver, &page)
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    Ok(())
}

fn status_reports(
    resolver: &AnchorResolver<'_, RankingPolicy>,
    page: &PageSnapshot,
) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut reports = Vec::new();
    for anchor in &resolver.template().anchors {
        let result = match resolver.status(page, anchor.id) {
            Ok(AnchorStatus::Found(count)) => json!({ "status": "found", "count": count }),
            Ok(AnchorStatus::NotFound) => json!({ "status": "not_found" }),
            Ok(AnchorStatus::NotSet) => json!({ "status": "not_set" }),
            Err(e) => json!({ "status": "error", "error": e.to_string() }),
        };
        reports.push(json!({
            "anchor_id": anchor.id,
            "type": anchor.anchor_type(),
            "text": anchor.text(),
            "result": result,
        }));
    }
    Ok(reports)
}

fn position_reports(
    resolver: &AnchorResolver<'_, RankingPolicy>,
    page: &PageSnapshot,
) -> Vec<serde_json::Value> {
    resolver
        .template()
        .anchors
        .iter()
        .map(|anchor| {
            let result = match resolver.locate(page, anchor.id) {
                Ok(position) => json!({
                    "status": "found",
                    "count": position.candidates.len(),
                    "position": position.position,
                    "shift": position.shift,
                    "representative": position.representative,
                    "candidates": position.candidates,
                }),
                Err(AnchorError::NotSet(id)) => json!({ "status": "not_set", "anchor_id": id }),
                Err(AnchorError::NotFound(id)) => json!({ "status": "not_found", "anchor_id": id }),
                Err(e) => json!({ "status": "error", "error": e.to_string() }),
            };
            json!({
                "anchor_id": anchor.id,
                "type": anchor.anchor_type(),
                "text": anchor.text(),
                "result": result,
            })
        })
        .collect()
}

fn print_report(report: &serde_json::Value) {
    let id = &report["anchor_id"];
    let kind = report["type"].as_str().unwrap_or("");
    let label = match report["text"].as_str() {
        Some(text) => format!("anchor {} [{}] '{}'", id, kind, text),
        None => format!("anchor {} [{}]", id, kind),
    };
    let result = &report["result"];
    let count = result["count"].as_u64().unwrap_or(0);

    match result["status"].as_str().unwrap_or("") {
        "found" if result.get("position").is_some() => {
            println!(
                "{} {}: at ({}, {}), shift ({}, {}), candidate {} of {}",
                style("✓").green(),
                label,
                result["position"]["x"],
                result["position"]["y"],
                result["shift"]["width"],
                result["shift"]["height"],
                result["representative"].as_u64().unwrap_or(0) + 1,
                count
            );
        }
        "found" => {
            println!("{} {}: found {} candidate(s)", style("✓").green(), label, count);
        }
        status @ ("not_set" | "not_found") => {
            // Resolution stops at the first ancestor that is unset or missing.
            let detail = match result["anchor_id"].as_i64() {
                Some(blocking) if Some(blocking) != id.as_i64() => {
                    format!(" (because of anchor {})", blocking)
                }
                _ => String::new(),
            };
            println!(
                "{} {}: {}{}",
                style("-").yellow(),
                label,
                status.replace('_', " "),
                detail
            );
        }
        _ => {
            println!(
                "{} {}: {}",
                style("✗").red(),
                label,
                result["error"].as_str().unwrap_or("unknown error")
            );
        }
    }
}
