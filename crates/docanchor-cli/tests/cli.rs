use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEMPLATE: &str = r#"{
    "name": "receipt",
    "anchors": [
        {
            "id": 1,
            "type": "PdfText",
            "char_boxes": [
                {"char": "N", "rectangle": {"x": 10.0, "y": 10.0, "width": 5.0, "height": 8.0}},
                {"char": "o", "rectangle": {"x": 16.0, "y": 10.0, "width": 5.0, "height": 8.0}}
            ]
        },
        {
            "id": 2,
            "type": "PdfText",
            "char_boxes": [
                {"char": "Z", "rectangle": {"x": 10.0, "y": 90.0, "width": 5.0, "height": 8.0}}
            ]
        }
    ],
    "fields": [
        {
            "name": "number",
            "type": "PdfText",
            "rectangle": {"x": 30.0, "y": 10.0, "width": 40.0, "height": 10.0},
            "left_anchor_id": 1
        },
        {
            "name": "footer",
            "type": "PdfText",
            "rectangle": {"x": 0.0, "y": 100.0, "width": 10.0, "height": 10.0},
            "top_anchor_id": 2
        }
    ]
}"#;

const PAGE: &str = r#"{
    "pdf_char_boxes": [
        {"char": "N", "rectangle": {"x": 13.0, "y": 10.0, "width": 5.0, "height": 8.0}},
        {"char": "o", "rectangle": {"x": 19.0, "y": 10.0, "width": 5.0, "height": 8.0}},
        {"char": "4", "rectangle": {"x": 33.0, "y": 12.0, "width": 5.0, "height": 8.0}},
        {"char": "2", "rectangle": {"x": 39.0, "y": 12.0, "width": 5.0, "height": 8.0}}
    ]
}"#;

fn docanchor() -> Command {
    Command::cargo_bin("docanchor").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn fixtures() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let template = write(dir.path(), "template.json", TEMPLATE);
    let page = write(dir.path(), "page.json", PAGE);
    (dir, template, page)
}

#[test]
fn test_validate_reports_counts() {
    let (_dir, template, _page) = fixtures();

    docanchor()
        .args(["validate"])
        .arg(&template)
        .assert()
        .success()
        .stdout(predicate::str::contains("Template 'receipt' is valid"))
        .stdout(predicate::str::contains("2 anchors (0 not set)"));
}

#[test]
fn test_validate_rejects_cycles() {
    let dir = TempDir::new().unwrap();
    let template = write(
        dir.path(),
        "cycle.json",
        r#"{
            "name": "cycle",
            "anchors": [
                {"id": 1, "type": "PdfText", "parent_anchor_id": 2, "char_boxes": []},
                {"id": 2, "type": "PdfText", "parent_anchor_id": 1, "char_boxes": []}
            ]
        }"#,
    );

    docanchor()
        .args(["validate"])
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cyclic parent chain"));
}

#[test]
fn test_extract_json() {
    let (_dir, template, page) = fixtures();

    docanchor()
        .args(["extract"])
        .arg(&template)
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""value": "42""#))
        .stdout(predicate::str::contains(r#""status": "anchor_not_found""#));
}

#[test]
fn test_extract_single_field_csv_to_file() {
    let (dir, template, page) = fixtures();
    let output = dir.path().join("out.csv");

    docanchor()
        .args(["extract"])
        .arg(&template)
        .arg(&page)
        .args(["--field", "number", "-f", "csv", "-o"])
        .arg(&output)
        .assert()
        .success();

    let csv = fs::read_to_string(&output).unwrap();
    assert!(csv.starts_with("name,type,status,value,error"));
    assert!(csv.contains("number,PdfText,ok,42,"));
}

#[test]
fn test_extract_unknown_field_fails() {
    let (_dir, template, page) = fixtures();

    docanchor()
        .args(["extract"])
        .arg(&template)
        .arg(&page)
        .args(["--field", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no field named 'nope'"));
}

#[test]
fn test_extract_saves_image_fields_as_png() {
    let dir = TempDir::new().unwrap();
    image::GrayImage::from_pixel(100, 100, image::Luma([128]))
        .save_with_format(dir.path().join("scan.bmp"), image::ImageFormat::Bmp)
        .unwrap();
    let page = write(dir.path(), "page.json", r#"{"bitmap": "scan.bmp"}"#);
    let template = write(
        dir.path(),
        "logo.json",
        r#"{
            "name": "logo",
            "fields": [
                {
                    "name": "logo",
                    "type": "ImageData",
                    "rectangle": {"x": 0.0, "y": 0.0, "width": 24.0, "height": 24.0}
                }
            ]
        }"#,
    );
    let images = dir.path().join("images");

    docanchor()
        .args(["extract"])
        .arg(&template)
        .arg(&page)
        .arg("--image-dir")
        .arg(&images)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""width": 24"#));

    let saved = image::ImageReader::open(images.join("page_logo.png"))
        .unwrap()
        .with_guessed_format()
        .unwrap();
    assert_eq!(saved.format(), Some(image::ImageFormat::Png));
    assert_eq!(saved.into_dimensions().unwrap(), (24, 24));
}

#[test]
fn test_anchors_report() {
    let (_dir, template, page) = fixtures();

    docanchor()
        .args(["anchors"])
        .arg(&template)
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("anchor 1 [PdfText] 'No': at"))
        .stdout(predicate::str::contains("anchor 2 [PdfText] 'Z': not found"));

    docanchor()
        .args(["anchors", "--status-only", "--json"])
        .arg(&template)
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""count": 1"#));
}

#[test]
fn test_batch_with_summary() {
    let (dir, template, _page) = fixtures();
    let pages = dir.path().join("pages");
    fs::create_dir_all(&pages).unwrap();
    write(&pages, "a.json", PAGE);
    write(&pages, "b.json", PAGE);
    write(&pages, "broken.json", "{ not json");
    let out = dir.path().join("out");

    docanchor()
        .args(["batch"])
        .arg(&template)
        .arg(format!("{}/*.json", pages.display()))
        .args(["--summary", "--continue-on-error", "-j", "2", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 successful, 1 failed"));

    assert!(out.join("a.json").exists());
    assert!(out.join("b.json").exists());
    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert!(summary.lines().next().unwrap().ends_with("number,footer"));
    assert!(summary.contains("a.json,success,1,0,"));
    assert!(summary.contains("broken.json,error"));
}

#[test]
fn test_batch_stops_on_error() {
    let (dir, template, _page) = fixtures();
    write(dir.path(), "broken.json", "{ not json");

    docanchor()
        .args(["batch"])
        .arg(&template)
        .arg(dir.path().join("broken.json").display().to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Processing failed"));
}

#[test]
fn test_config_set_and_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");

    docanchor()
        .args(["config", "--file"])
        .arg(&config)
        .arg("init")
        .assert()
        .success();

    docanchor()
        .args(["config", "--file"])
        .arg(&config)
        .args(["set", "resolution.ranking", "first"])
        .assert()
        .success();

    docanchor()
        .args(["config", "--file"])
        .arg(&config)
        .args(["get", "resolution.ranking"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"first\""));

    docanchor()
        .args(["config", "--file"])
        .arg(&config)
        .args(["set", "resolution.ranking", "best"])
        .assert()
        .failure();
}
