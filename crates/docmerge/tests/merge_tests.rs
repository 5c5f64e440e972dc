//! End-to-end merge runs over fixture trees.

mod common;

use std::sync::{Arc, Mutex};

use common::{page_count, EmailBuilder, FakeConverter, TestHarness};
use docmerge::config::{ArtifactAction, EmailOutputMode, OutputLayout, TransferAction, WordOutputMode};
use docmerge::ledger::ArtifactStatus;
use docmerge::manifest::MANIFEST_FILE_NAME;
use docmerge::pipeline::{PipelineError, ProgressEvent};
use docmerge::{CancelFlag, DocmergeError, ProgressReporter, RunState};
use serial_test::serial;

#[test]
#[serial]
fn test_pdfs_merge_into_one_batch() {
    let harness = TestHarness::new();
    let a = harness.write_pdf("a.pdf", &["Alpha"]);
    let b = harness.write_pdf("b.pdf", &["Beta one", "Beta two"]);

    let manifest = harness.run().unwrap();

    let batch = harness.output("root_pdfs_batch1.pdf");
    assert_eq!(manifest.status, RunState::Completed);
    assert_eq!(manifest.output_files, vec![batch.clone()]);
    assert_eq!(page_count(&batch), 3);
    assert_eq!(
        manifest.output_to_sources[&batch.display().to_string()],
        vec![a, b]
    );
    assert!(manifest.warnings.is_empty());

    let written = harness.manifest_json();
    assert_eq!(written["total_input_files"], 2);
    assert_eq!(written["summary"]["processed_outputs_total"], 1);
}

#[test]
#[serial]
fn test_unreadable_pdf_fails_without_output() {
    let harness = TestHarness::new();
    let broken = harness.write_input("broken.pdf", b"this is not a pdf");

    let manifest = harness.run().unwrap();

    assert!(manifest.output_files.is_empty());
    assert_eq!(
        TestHarness::warning_codes(&manifest),
        vec!["pdf_unreadable", "pdf_empty_batch"]
    );
    assert_eq!(manifest.files.failed.len(), 1);

    let failed = &manifest.files.failed[0];
    assert_eq!(failed.source, broken.display().to_string());
    assert_eq!(failed.stage, "pdf");
    assert_eq!(failed.artifact_status, Some(ArtifactStatus::Created));
    assert!(harness.output_dir.join("failed/pdf/broken.pdf").is_file());
    assert!(broken.exists());
}

#[test]
#[serial]
fn test_failed_artifacts_metadata_only() {
    let mut harness = TestHarness::new();
    harness.config.relocation.failed_artifact_action = ArtifactAction::MetadataOnly;
    harness.write_input("broken.pdf", b"garbage");

    let manifest = harness.run().unwrap();

    assert_eq!(manifest.files.failed[0].artifact_status, Some(ArtifactStatus::NotCreated));
    assert_eq!(manifest.summary.failed_artifacts_total, 0);
    assert!(!harness.output_dir.join("failed/pdf").exists());
}

#[test]
#[serial]
fn test_zip_slip_entry_is_skipped() {
    let harness = TestHarness::new();
    let pdf = common::pdf_bytes(&["Inside"]);
    let archive = harness.write_zip(
        "bundle.zip",
        &[
            ("../evil.eml", b"Subject: evil\r\n\r\nbody"),
            ("ok.pdf", pdf.as_slice()),
        ],
    );

    let manifest = harness.run().unwrap();

    assert!(!harness.temp_path().join("evil.eml").exists());
    assert!(!harness.input_dir.join("evil.eml").exists());
    assert_eq!(manifest.files.skipped.len(), 1);
    assert_eq!(manifest.files.skipped[0].code, "zip_entry_skipped_unsafe_path");
    assert_eq!(
        manifest.files.skipped[0].source,
        format!("{}::../evil.eml", archive.display())
    );
    assert!(harness.output("root_bundle_pdfs_batch1.pdf").is_file());

    let zip = manifest.zip_processing.unwrap();
    assert_eq!(zip.archives_found, 1);
    assert_eq!(zip.stats.entries_skipped_unsafe_path, 1);
}

#[test]
#[serial]
fn test_nested_archives_stop_at_depth_limit() {
    let harness = TestHarness::new();
    let pdf = common::pdf_bytes(&["Deep"]);
    let inner = common::zip_bytes(&[("deep.pdf", pdf.as_slice())]);
    let middle = common::zip_bytes(&[("inner.zip", inner.as_slice()), ("mid.pdf", pdf.as_slice())]);
    harness.write_zip("outer.zip", &[("middle.zip", middle.as_slice())]);

    let manifest = harness.run().unwrap();

    let skipped: Vec<&str> = manifest.files.skipped.iter().map(|s| s.code.as_str()).collect();
    assert_eq!(skipped, vec!["zip_nested_depth_exceeded"]);
    let zip = manifest.zip_processing.unwrap();
    assert_eq!(zip.stats.nested_archives_extracted, 1);
    assert_eq!(zip.stats.nested_archives_skipped_depth, 1);

    let batch = harness.output("root_outer_pdfs_batch1.pdf");
    assert_eq!(page_count(&batch), 1);
}

#[test]
#[serial]
fn test_capacity_exceeded_is_fatal_and_writes_manifest() {
    let mut harness = TestHarness::new();
    harness.config.max_output_files = 0;
    harness.write_pdf("a.pdf", &["Alpha"]);

    let err = harness.run().unwrap_err();

    let DocmergeError::Run {
        source,
        manifest_path,
        ..
    } = err
    else {
        panic!("expected a run error");
    };
    assert_eq!(
        source.to_string(),
        "Output file limit exceeded before processing group 'root' PDF files: \
         requires 1 file(s), but only 0 slot(s) remain (max_output_files=0)."
    );
    assert!(matches!(source, PipelineError::CapacityExceeded { required: 1, .. }));

    let written = harness.manifest_json_at(&manifest_path);
    assert_eq!(written["status"], "failed");
    assert_eq!(written["errors"][0]["code"], "infra_unhandled_error");
    assert_eq!(written["summary"]["errors_total"], 1);
    assert!(written.get("output_files").unwrap().as_array().unwrap().is_empty());
}

#[test]
#[serial]
fn test_capacity_checked_against_whole_group_before_writing() {
    let mut harness = TestHarness::new();
    harness.config.max_output_files = 2;
    harness.config.max_file_size_kb = 1;
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        harness.write_pdf(name, &["Page"]);
    }

    let err = harness.run().unwrap_err();

    let DocmergeError::Run { source, .. } = err else {
        panic!("expected a run error");
    };
    assert!(source
        .to_string()
        .contains("requires 3 file(s), but only 2 slot(s) remain"));
    assert!(!harness.output("root_pdfs_batch1.pdf").exists());
}

#[test]
#[serial]
fn test_capacity_counts_outputs_of_earlier_groups() {
    let mut harness = TestHarness::new();
    harness.config.max_output_files = 2;
    harness.config.max_file_size_kb = 1;
    harness.write_pdf("a/one.pdf", &["Page"]);
    harness.write_pdf("b/one.pdf", &["Page"]);
    harness.write_pdf("b/two.pdf", &["Page"]);

    let err = harness.run().unwrap_err();

    let DocmergeError::Run { source, .. } = err else {
        panic!("expected a run error");
    };
    let message = source.to_string();
    assert!(message.contains("group 'b'"));
    assert!(message.contains("requires 2 file(s), but only 1 slot(s) remain"));
    assert!(harness.output("a_pdfs_batch1.pdf").is_file());
    assert!(!harness.output("b_pdfs_batch1.pdf").exists());
}

#[test]
#[serial]
fn test_output_inside_input_is_not_rescanned() {
    let mut harness = TestHarness::new();
    harness.output_dir = harness.input_dir.join("merged");
    harness.write_pdf("a.pdf", &["Alpha"]);

    let first = harness.run().unwrap();
    assert_eq!(first.total_input_files, 1);

    let second = harness.run().unwrap();
    assert_eq!(second.total_input_files, 1);
    assert!(second.files.unprocessed.is_empty());
    assert_eq!(second.output_files.len(), 1);
}

#[test]
#[serial]
fn test_output_with_parent_components_is_not_rescanned() {
    let mut harness = TestHarness::new();
    harness.output_dir = harness.input_dir.join("sub").join("..").join("merged");
    harness.write_pdf("sub/a.pdf", &["Alpha"]);

    harness.run().unwrap();
    let second = harness.run().unwrap();

    assert_eq!(second.total_input_files, 1);
    assert_eq!(second.output_files.len(), 1);
}

#[test]
#[serial]
fn test_single_zip_input() {
    let harness = TestHarness::new();
    let pdf = common::pdf_bytes(&["Zipped"]);
    let archive = harness.temp_path().join("bundle.zip");
    std::fs::write(&archive, common::zip_bytes(&[("a.pdf", pdf.as_slice())])).unwrap();

    let manifest = harness.run_input(&archive).unwrap();

    assert_eq!(manifest.total_input_files, 1);
    assert!(harness.output("root_bundle_pdfs_batch1.pdf").is_file());
    assert!(archive.exists());
}

#[test]
#[serial]
fn test_unsupported_files_are_relocated() {
    let harness = TestHarness::new();
    let notes = harness.write_input("notes.txt", b"plain text");
    harness.write_zip("bundle.zip", &[("readme.txt", b"inside the archive")]);

    let manifest = harness.run().unwrap();

    let unprocessed = harness.output_dir.join("unprocessed");
    assert!(unprocessed.join("notes.txt").is_file());
    assert!(unprocessed.join("readme.txt").is_file());
    assert!(notes.exists(), "input files are copied by default");

    assert_eq!(manifest.files.unprocessed.len(), 2);
    assert_eq!(manifest.files.moved_unprocessed.len(), 1);
    let moved = &manifest.files.moved_unprocessed[0];
    assert_eq!(moved.reason, "unsupported_zip_file_moved");
    assert_eq!(moved.destination, unprocessed.join("readme.txt"));
    assert_eq!(manifest.summary.unprocessed_relocated_total, 2);
    assert_eq!(manifest.summary.moved_unprocessed_total, 1);
}

#[test]
#[serial]
fn test_unsupported_input_files_can_be_moved() {
    let mut harness = TestHarness::new();
    harness.config.relocation.input_action = TransferAction::Move;
    let notes = harness.write_input("notes.txt", b"plain text");
    harness.write_input("sub/notes.txt", b"other notes");

    let manifest = harness.run().unwrap();

    assert!(!notes.exists());
    let unprocessed = harness.output_dir.join("unprocessed");
    assert!(unprocessed.join("notes.txt").is_file());
    assert!(unprocessed.join("notes_1.txt").is_file());
    assert!(manifest.files.moved_unprocessed.is_empty());
}

#[test]
#[serial]
fn test_emails_size_batched() {
    let harness = TestHarness::new();
    harness.write_email("a.eml", &EmailBuilder::new("Budget").body("First draft"));
    harness.write_email(
        "b.eml",
        &EmailBuilder::new("RE: Budget")
            .date("Wed, 2 Oct 2024 09:30:00 +0000")
            .body("Looks fine"),
    );
    harness.write_email("c.eml", &EmailBuilder::new("Travel").body("Flights booked"));

    let manifest = harness.run().unwrap();

    let batch = harness.output("root_emails_batch1.txt");
    assert_eq!(manifest.output_files, vec![batch.clone()]);
    let content = std::fs::read_to_string(&batch).unwrap();
    assert!(content.starts_with("EMAIL BATCH 1\nGROUP: root\nBATCH THREADS: 2\n"));
    assert!(content.find("First draft").unwrap() < content.find("Looks fine").unwrap());

    let emails = manifest.emails.unwrap();
    assert_eq!(emails.parsed_total, 3);
    assert_eq!(emails.threads_total, 2);
    assert_eq!(emails.batches_total, 1);
    assert_eq!(manifest.output_to_sources[&batch.display().to_string()].len(), 3);
}

#[test]
#[serial]
fn test_emails_threaded_mode() {
    let mut harness = TestHarness::new();
    harness.config.email.output_mode = EmailOutputMode::Threaded;
    harness.write_email("a.eml", &EmailBuilder::new("Budget"));
    harness.write_email("b.eml", &EmailBuilder::new("Fwd: budget"));
    harness.write_email("c.eml", &EmailBuilder::without_subject());

    let manifest = harness.run().unwrap();

    assert_eq!(manifest.output_files.len(), 2);
    let first = std::fs::read_to_string(harness.output("root_emails_thread1.txt")).unwrap();
    assert!(first.starts_with("GROUP: root\n"));
    assert!(harness.output("root_emails_thread2.txt").is_file());
}

#[test]
#[serial]
fn test_word_documents_converted_with_converter() {
    let mut harness = TestHarness::new().with_converter(Arc::new(FakeConverter::default()));
    harness.config.word.output_mode = WordOutputMode::Pdf;
    let report = harness.write_input("report.docx", b"word bytes");
    harness.write_input("slow.docx", b"word bytes");
    harness.write_input("bad.doc", b"word bytes");

    let manifest = harness.run().unwrap();

    let batch = harness.output("root_documents_batch1.pdf");
    assert_eq!(manifest.output_files, vec![batch.clone()]);
    assert_eq!(page_count(&batch), 1);
    assert_eq!(
        manifest.output_to_sources[&batch.display().to_string()],
        vec![report]
    );

    let word = manifest.word_conversion.unwrap();
    assert_eq!((word.attempted, word.converted, word.failed), (3, 1, 2));
    let mut codes = TestHarness::warning_codes(&manifest);
    codes.sort();
    assert_eq!(codes, vec!["word_to_pdf_failed", "word_to_pdf_timeout"]);
    assert_eq!(manifest.files.failed.len(), 2);
}

#[test]
#[serial]
fn test_word_conversion_with_no_outputs() {
    let mut harness = TestHarness::new().with_converter(Arc::new(FakeConverter::default()));
    harness.config.word.output_mode = WordOutputMode::Pdf;
    harness.write_input("slow.docx", b"word bytes");

    let manifest = harness.run().unwrap();

    assert!(manifest.output_files.is_empty());
    assert_eq!(
        TestHarness::warning_codes(&manifest),
        vec!["word_to_pdf_timeout", "word_conversion_no_outputs"]
    );
}

#[test]
#[serial]
fn test_word_documents_fall_back_to_docx_without_converter() {
    let harness = TestHarness::new();
    harness.write_docx("a.docx", &["First document"]);
    harness.write_docx("b.docx", &["Second document"]);

    let manifest = harness.run().unwrap();

    let batch = harness.output("root_documents_batch1.docx");
    assert_eq!(manifest.output_files, vec![batch.clone()]);
    assert!(manifest.word_conversion.is_none());

    let written = harness.manifest_json();
    assert!(written.get("word_conversion").is_none());
}

#[test]
#[serial]
fn test_flat_layout_writes_to_output_root() {
    let mut harness = TestHarness::new();
    harness.config.output.layout = OutputLayout::Flat;
    harness.write_pdf("a.pdf", &["Alpha"]);

    let manifest = harness.run().unwrap();

    let batch = harness.output_dir.join("root_pdfs_batch1.pdf");
    assert_eq!(manifest.output_files, vec![batch.clone()]);
    assert!(batch.is_file());
    assert!(harness.output_dir.join(MANIFEST_FILE_NAME).is_file());
    assert!(harness.output_dir.join("logs").is_dir());
}

#[test]
#[serial]
fn test_disabled_types_are_left_alone() {
    let mut harness = TestHarness::new();
    harness.config.process_pdfs = false;
    harness.config.process_emails = false;
    harness.write_pdf("a.pdf", &["Alpha"]);
    harness.write_email("a.eml", &EmailBuilder::new("Budget"));

    let manifest = harness.run().unwrap();

    assert!(manifest.output_files.is_empty());
    assert!(manifest.files.unprocessed.is_empty());
    assert!(manifest.emails.is_none());
}

/// Requests cancellation as soon as the first group starts.
struct CancelOnFirstGroup {
    cancel: CancelFlag,
    groups: Mutex<Vec<String>>,
}

impl ProgressReporter for CancelOnFirstGroup {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::Log(record) = event {
            if record.event == "group_start" {
                self.cancel.cancel();
                if let Ok(mut groups) = self.groups.lock() {
                    groups.push(record.context["group"].as_str().unwrap_or_default().to_string());
                }
            }
        }
    }
}

#[test]
#[serial]
fn test_cancellation_stops_between_groups() {
    let cancel = CancelFlag::new();
    let reporter = Arc::new(CancelOnFirstGroup {
        cancel: cancel.clone(),
        groups: Mutex::new(Vec::new()),
    });
    let harness = TestHarness::new().with_progress(reporter.clone());
    harness.write_pdf("alpha/a.pdf", &["Alpha"]);
    harness.write_pdf("beta/b.pdf", &["Beta"]);

    let manifest = harness.run_with_cancel(&cancel).unwrap();

    assert_eq!(manifest.status, RunState::Cancelled);
    assert_eq!(*reporter.groups.lock().unwrap(), vec!["alpha".to_string()]);
    assert!(harness.output("alpha_pdfs_batch1.pdf").is_file());
    assert!(!harness.output("beta_pdfs_batch1.pdf").exists());
    assert_eq!(harness.manifest_json()["status"], "cancelled");
}

#[test]
#[serial]
fn test_run_log_records_warnings() {
    let harness = TestHarness::new();
    harness.write_input("broken.pdf", b"garbage");

    let manifest = harness.run().unwrap();

    let jsonl = std::fs::read_to_string(&manifest.logs.jsonl_log).unwrap();
    let events: Vec<serde_json::Value> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let names: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
    assert!(names.contains(&"groups_analyzed"));
    assert!(names.contains(&"pdf_unreadable"));
    assert!(names.contains(&"manifest_written"));

    let unreadable = events
        .iter()
        .find(|e| e["event"] == "pdf_unreadable")
        .unwrap();
    assert_eq!(unreadable["level"], "WARNING");
    assert_eq!(unreadable["context"]["file"], "broken.pdf");
}
