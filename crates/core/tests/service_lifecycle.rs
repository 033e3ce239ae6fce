//! Conversion facade integration tests.
//!
//! These tests drive `ConversionService` with mock adapters and verify the
//! request lifecycle: validate -> route -> dispatch -> check artifact.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use omniconvert_core::converter::{
    AdapterKind, AdapterOperation, ConversionError, ConversionOptions, ConversionRequest,
    ConversionService, DocumentOp, ErrorKind, ImageMetadata, ImageOp, MediaClass, MediaMetadata,
    ScriptOp, VideoOp,
};
use omniconvert_core::testing::{fixtures, MockAdapter};

/// Test helper wiring one mock per adapter family.
struct TestHarness {
    document: Arc<MockAdapter>,
    script: Arc<MockAdapter>,
    image: Arc<MockAdapter>,
    video: Arc<MockAdapter>,
    service: ConversionService,
    output_dir: PathBuf,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("converted");

        let document = Arc::new(MockAdapter::new(AdapterKind::Document));
        let script = Arc::new(MockAdapter::new(AdapterKind::Script));
        let image = Arc::new(MockAdapter::new(AdapterKind::Image));
        let video = Arc::new(MockAdapter::new(AdapterKind::Video));

        let service = ConversionService::with_adapters(
            document.clone(),
            script.clone(),
            image.clone(),
            video.clone(),
            &output_dir,
        );

        Self {
            document,
            script,
            image,
            video,
            service,
            output_dir,
            temp_dir,
        }
    }

    fn upload(&self, name: &str) -> PathBuf {
        fixtures::write_file(self.temp_dir.path(), name, b"payload").expect("Failed to write upload")
    }
}

#[tokio::test]
async fn test_document_request_reaches_document_adapter() {
    let h = TestHarness::new();
    let source = h.upload("notes.csv");

    let request = ConversionRequest::new(&source, MediaClass::Document, "JSON");
    let result = h.service.convert(&request).await.unwrap();

    assert!(result.success);
    assert!(result.output_path.starts_with(&h.output_dir));
    assert!(result.filename.starts_with("notes_"));
    assert!(result.filename.ends_with(".json"));

    let calls = h.document.recorded_invocations().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].operation,
        AdapterOperation::Document(DocumentOp::CsvToJson)
    );
    assert_eq!(calls[0].target, "json");
    assert_eq!(calls[0].output_dir, h.output_dir);
    assert_eq!(h.script.invocation_count().await, 0);
}

#[tokio::test]
async fn test_pdf_to_doc_goes_to_script_adapter() {
    let h = TestHarness::new();
    let source = h.upload("scan.pdf");

    for target in ["docx", "doc"] {
        let request = ConversionRequest::new(&source, MediaClass::Document, target);
        h.service.convert(&request).await.unwrap();
    }

    let calls = h.script.recorded_invocations().await;
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|c| c.operation == AdapterOperation::Script(ScriptOp::PdfToDocx)));
    assert_eq!(h.document.invocation_count().await, 0);
}

#[tokio::test]
async fn test_unlisted_document_pairs_use_office_converter() {
    let h = TestHarness::new();

    for (name, target) in [("data.json", "pdf"), ("readme.md", "pdf"), ("report.docx", "docx")] {
        let source = h.upload(name);
        let request = ConversionRequest::new(&source, MediaClass::Document, target);
        h.service.convert(&request).await.unwrap();
    }

    let calls = h.document.recorded_invocations().await;
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|c| c.operation == AdapterOperation::Document(DocumentOp::OfficeConvert)));
    assert_eq!(h.script.invocation_count().await, 0);
}

#[tokio::test]
async fn test_media_requests_reach_their_pipelines() {
    let h = TestHarness::new();

    let photo = h.upload("photo.png");
    h.service
        .convert(&ConversionRequest::new(&photo, MediaClass::Image, "webp"))
        .await
        .unwrap();

    let clip = h.upload("clip.mov");
    h.service
        .convert(&ConversionRequest::new(&clip, MediaClass::Video, "mp3"))
        .await
        .unwrap();

    let song = h.upload("song.flac");
    h.service
        .convert(&ConversionRequest::new(&song, MediaClass::Audio, "ogg"))
        .await
        .unwrap();

    assert_eq!(h.image.invocation_count().await, 1);
    let video_calls = h.video.recorded_invocations().await;
    assert_eq!(video_calls.len(), 2);
    assert!(video_calls
        .iter()
        .all(|c| c.operation == AdapterOperation::Video(VideoOp::ExtractAudio)));
}

#[tokio::test]
async fn test_error_kind_passes_through_unchanged() {
    let h = TestHarness::new();
    let source = h.upload("report.odt");

    for error in [
        ConversionError::external("soffice crashed"),
        ConversionError::Timeout {
            timeout_secs: 1800,
            command: Some("soffice --headless".to_string()),
        },
        ConversionError::output_not_found("report.pdf"),
        ConversionError::invalid_input("corrupt document"),
    ] {
        let expected = error.kind();
        h.document.set_next_error(error).await;
        let request = ConversionRequest::new(&source, MediaClass::Document, "pdf");
        let err = h.service.convert(&request).await.unwrap_err();
        assert_eq!(err.kind(), expected);
    }
}

#[tokio::test]
async fn test_missing_source_is_invalid_input() {
    let h = TestHarness::new();
    let request = ConversionRequest::new(
        h.temp_dir.path().join("gone.docx"),
        MediaClass::Document,
        "pdf",
    );
    let err = h.service.convert(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.document.invocation_count().await, 0);
}

#[tokio::test]
async fn test_malformed_target_is_invalid_input() {
    let h = TestHarness::new();
    let source = h.upload("notes.csv");

    for target in ["", "js on", "../pdf"] {
        let request = ConversionRequest::new(&source, MediaClass::Document, target);
        let err = h.service.convert(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "target {target:?}");
    }

    let clip = h.upload("clip.mp4");
    let request = ConversionRequest::new(&clip, MediaClass::Video, "");
    let err = h
        .service
        .perform(&request, AdapterOperation::Video(VideoOp::ExtractAudio))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.document.invocation_count().await, 0);
    assert_eq!(h.video.invocation_count().await, 0);
}

#[tokio::test]
async fn test_unsupported_pairs() {
    let h = TestHarness::new();

    let archive = h.upload("bundle.zip");
    let err = h
        .service
        .convert(&ConversionRequest::new(&archive, MediaClass::Archive, "tar"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);

    let photo = h.upload("photo.png");
    let err = h
        .service
        .convert(&ConversionRequest::new(&photo, MediaClass::Image, "svg"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
    assert_eq!(h.image.invocation_count().await, 0);
}

#[tokio::test]
async fn test_missing_artifact_is_output_not_found() {
    let h = TestHarness::new();
    h.image.set_write_output(false).await;
    let source = h.upload("photo.jpg");

    let err = h
        .service
        .convert(&ConversionRequest::new(&source, MediaClass::Image, "png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputNotFound);
}

#[tokio::test]
async fn test_warnings_are_returned() {
    let h = TestHarness::new();
    h.document
        .set_warnings(vec!["Image or embedded object was skipped".to_string()])
        .await;
    let source = h.upload("letter.docx");

    let result = h
        .service
        .convert(&ConversionRequest::new(&source, MediaClass::Document, "html"))
        .await
        .unwrap();
    assert_eq!(result.warnings, vec!["Image or embedded object was skipped"]);
}

#[tokio::test]
async fn test_explicit_operation() {
    let h = TestHarness::new();
    let source = h.upload("photo.jpg");
    let options = ConversionOptions::new().with("width", 640i64);
    let request = ConversionRequest::new(&source, MediaClass::Image, "jpg").with_options(options);

    h.service
        .perform(&request, AdapterOperation::Image(ImageOp::Resize))
        .await
        .unwrap();
    let calls = h.image.recorded_invocations().await;
    assert_eq!(calls[0].operation, AdapterOperation::Image(ImageOp::Resize));
    assert_eq!(calls[0].options.get_dimension("width").unwrap(), Some(640));

    let err = h
        .service
        .perform(&request, AdapterOperation::Video(VideoOp::Trim))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);

    let err = h
        .service
        .perform(&request, AdapterOperation::Image(ImageOp::Metadata))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_inspect_dispatch() {
    let h = TestHarness::new();
    let metadata = MediaMetadata::Image(ImageMetadata {
        width: 4000,
        height: 3000,
        format: "jpeg".to_string(),
        size_bytes: 7,
        has_alpha: false,
    });
    h.image.set_metadata(metadata.clone()).await;
    let source = h.upload("photo.jpg");

    assert_eq!(
        h.service.inspect(&source, MediaClass::Image).await.unwrap(),
        metadata
    );

    let doc = h.upload("notes.txt");
    let err = h
        .service
        .inspect(&doc, MediaClass::Document)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
}

#[tokio::test]
async fn test_validate_tools_reports_each_family() {
    let h = TestHarness::new();
    h.video
        .set_next_error(ConversionError::external("Tool not found at path: ffmpeg"))
        .await;

    let report = h.service.validate_tools().await;
    assert_eq!(report.len(), 4);
    for (kind, outcome) in report {
        assert_eq!(outcome.is_ok(), kind != AdapterKind::Video, "{kind}");
    }
}
