//! End-to-end conversions through the real in-process adapters.
//!
//! Only operations that need no external tool are exercised here; the
//! subprocess paths are covered next to each adapter with fake tools.

use std::path::Path;

use tempfile::TempDir;

use omniconvert_core::converter::{
    AdapterOperation, ConversionOptions, ConversionRequest, ConversionService, ConverterConfig,
    ErrorKind, ImageOp, MediaClass, MediaMetadata,
};
use omniconvert_core::testing::fixtures;

fn service(dir: &TempDir) -> ConversionService {
    ConversionService::new(ConverterConfig::default(), dir.path().join("converted"))
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("Failed to read artifact")
}

#[tokio::test]
async fn test_notes_csv_to_json() {
    let dir = TempDir::new().unwrap();
    let source = fixtures::write_file(
        dir.path(),
        "notes.csv",
        "title,author\nDune,Herbert\nEmma,Austen\n",
    )
    .unwrap();

    let result = service(&dir)
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "json"))
        .await
        .unwrap();

    assert!(result.filename.starts_with("notes_"));
    assert!(result.filename.ends_with(".json"));
    let rows: serde_json::Value = serde_json::from_str(&read(&result.output_path)).unwrap();
    assert_eq!(
        rows,
        serde_json::json!([
            {"title": "Dune", "author": "Herbert"},
            {"title": "Emma", "author": "Austen"}
        ])
    );
}

#[tokio::test]
async fn test_csv_json_csv_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let csv = "name,qty\napple,3\npear,5\n";
    let source = fixtures::write_file(dir.path(), "stock.csv", csv).unwrap();

    let json = service
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "json"))
        .await
        .unwrap();
    let back = service
        .convert(&ConversionRequest::new(
            &json.output_path,
            MediaClass::Document,
            "csv",
        ))
        .await
        .unwrap();

    let lines: Vec<String> = read(&back.output_path)
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["name,qty", "apple,3", "pear,5"]);
}

#[tokio::test]
async fn test_json_object_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let source = fixtures::write_file(dir.path(), "config.json", "{}").unwrap();

    let err = service(&dir)
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "csv"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_text_to_pdf_page_count() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    for (name, text, pages) in [
        ("empty.txt", String::new(), 1),
        ("short.txt", "hello\nworld".to_string(), 1),
        ("long.txt", vec!["line"; 100].join("\n"), 3),
    ] {
        let source = fixtures::write_file(dir.path(), name, text).unwrap();
        let result = service
            .convert(&ConversionRequest::new(&source, MediaClass::Document, "pdf"))
            .await
            .unwrap();
        let pdf = lopdf::Document::load(&result.output_path).unwrap();
        assert_eq!(pdf.get_pages().len(), pages, "{name}");
    }
}

#[tokio::test]
async fn test_docx_to_html_and_text() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let source = fixtures::write_docx(
        dir.path(),
        "letter.docx",
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Greetings</w:t></w:r></w:p><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r><w:t xml:space="preserve"> move</w:t></w:r></w:p><w:p><w:r><w:drawing/></w:r></w:p>"#,
    )
    .unwrap();

    let html = service
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "html"))
        .await
        .unwrap();
    let body = read(&html.output_path);
    assert!(body.contains("<h1>Greetings</h1>"));
    assert!(body.contains("<strong>Bold</strong> move"));
    assert_eq!(html.warnings, vec!["Image or embedded object was skipped"]);

    let text = service
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "txt"))
        .await
        .unwrap();
    let body = read(&text.output_path);
    assert!(body.starts_with("Greetings\n\nBold move\n\n"));
}

#[tokio::test]
async fn test_image_resize_never_enlarges() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let source = fixtures::write_image(dir.path(), "wide.png", 400, 300).unwrap();

    let options = ConversionOptions::new().with("width", 100i64);
    let request = ConversionRequest::new(&source, MediaClass::Image, "png").with_options(options);
    let result = service
        .perform(&request, AdapterOperation::Image(ImageOp::Resize))
        .await
        .unwrap();
    assert_eq!(image::image_dimensions(&result.output_path).unwrap(), (100, 75));

    let options = ConversionOptions::new().with("width", 1600i64);
    let request = ConversionRequest::new(&source, MediaClass::Image, "png").with_options(options);
    let result = service
        .perform(&request, AdapterOperation::Image(ImageOp::Resize))
        .await
        .unwrap();
    assert_eq!(image::image_dimensions(&result.output_path).unwrap(), (400, 300));
}

#[tokio::test]
async fn test_image_convert_and_to_pdf() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let source = fixtures::write_image(dir.path(), "photo.png", 64, 48).unwrap();

    let jpg = service
        .convert(&ConversionRequest::new(&source, MediaClass::Image, "jpg"))
        .await
        .unwrap();
    assert!(jpg.filename.ends_with(".jpg"));
    assert_eq!(
        image::ImageFormat::from_path(&jpg.output_path).unwrap(),
        image::ImageFormat::Jpeg
    );

    let pdf = service
        .convert(&ConversionRequest::new(&source, MediaClass::Image, "pdf"))
        .await
        .unwrap();
    let doc = lopdf::Document::load(&pdf.output_path).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}

#[tokio::test]
async fn test_inspect_image() {
    let dir = TempDir::new().unwrap();
    let source = fixtures::write_image(dir.path(), "photo.png", 32, 16).unwrap();

    match service(&dir).inspect(&source, MediaClass::Image).await.unwrap() {
        MediaMetadata::Image(meta) => {
            assert_eq!((meta.width, meta.height), (32, 16));
            assert_eq!(meta.format, "png");
            assert!(!meta.has_alpha);
        }
        other => panic!("unexpected {other:?}"),
    }
}
