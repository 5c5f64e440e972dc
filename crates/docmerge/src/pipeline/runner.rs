use std::any::Any;
use std::ffi::OsStr;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::Local;
use serde_json::{json, Value};
use tracing::{debug, info, info_span};

use crate::analyzer::FolderAnalyzer;
use crate::config::{EmailOutputMode, RunConfig, TransferAction, WordOutputMode, MAX_BATCH_WORDS};
use crate::convert::{DocumentConverter, SofficeConverter};
use crate::email::{self, EmailThreader, EmailWriter};
use crate::error::{ConvertError, DocmergeError, Result, StorageError};
use crate::ledger::{ArtifactStatus, Warning, WarningKind};
use crate::manifest::{
    Files, LogPaths, Limits, Manifest, OutputPaths, RunErrorRecord, Summary,
    WordConversionSummary, MANIFEST_FILE_NAME,
};
use crate::packer::{self, Caps};
use crate::processor::docx::DocxMerger;
use crate::processor::pdf::PdfMerger;
use crate::processor::{BatchMerger, BatchTarget, ContentKind, MergeItem};
use crate::runlog::{LogLevel, RunLog};
use crate::sanitize::path_is_within;
use crate::storage::{ensure_directory, materialize_failed_artifacts, relocate_files, MovedFile, Relocation};
use crate::tempdirs::ScratchDir;

use super::context::{new_run_id, RunContext, RunLayout};
use super::error::PipelineError;
use super::groups::{self, PreparedGroups};
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter};
use super::state::{CancelFlag, RunState};

/// Runs one merge from an input folder (or single ZIP) to an output folder.
pub struct MergeOrchestrator {
    config: RunConfig,
    converter: Arc<dyn DocumentConverter>,
    progress: Arc<dyn ProgressReporter>,
}

impl MergeOrchestrator {
    /// Production constructor: LibreOffice conversion, no progress reporting.
    pub fn new(config: RunConfig) -> Self {
        let converter = Arc::new(SofficeConverter::from_config(&config.word));
        Self {
            config,
            converter,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the merge on a worker thread.
    pub fn spawn(
        self,
        input: PathBuf,
        output: PathBuf,
        cancel: CancelFlag,
    ) -> JoinHandle<Result<Manifest>> {
        std::thread::spawn(move || self.merge_documents(&input, &output, &cancel))
    }

    /// Merges everything under `input` into `output` and returns the manifest.
    ///
    /// The manifest and run log are written even when the run fails; the
    /// returned [`DocmergeError::Run`] then names both files.
    pub fn merge_documents(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<Manifest> {
        let layout = RunLayout::new(output, &self.config.output);
        layout.create()?;

        let run_id = new_run_id();
        let log = RunLog::open(
            &layout.logs,
            &run_id,
            self.config.logging.detailed,
            self.config.logging.privacy_mode,
        )?;
        let _run_span = info_span!("run", run_id = %run_id).entered();
        let mut ctx = RunContext::new(run_id, input, layout, log);

        let fatal = match self.execute(&mut ctx, input, output, cancel) {
            Ok(state) => {
                ctx.state = state;
                None
            }
            Err(e) => {
                ctx.errors.push(RunErrorRecord::unhandled(&e));
                self.log(
                    &mut ctx,
                    LogLevel::Error,
                    "fatal_error",
                    "Fatal processing error",
                    json!({ "error": e.to_string() }),
                );
                ctx.state = RunState::Failed;
                Some(e)
            }
        };

        let terminal = ctx.state;
        let manifest = self.finalize(&mut ctx, terminal);
        ctx.state = terminal;
        self.progress.report(ProgressEvent::State(terminal));
        info!(
            status = terminal.as_str(),
            outputs = manifest.total_output_files,
            "Run finished"
        );

        match fatal {
            Some(source) => Err(DocmergeError::Run {
                source,
                log_path: ctx.log.text_path().to_path_buf(),
                manifest_path: ctx.layout.processed.join(MANIFEST_FILE_NAME),
            }),
            None => Ok(manifest),
        }
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> std::result::Result<RunState, PipelineError> {
        // Step 1: Analyze
        self.enter(ctx, RunState::Analyzing);
        let working_input = self.stage_input(ctx, input)?;
        let groups = {
            let _step = info_span!("analyze").entered();
            let mut analyzer = FolderAnalyzer::new(&working_input);
            if path_is_within(output, &working_input) {
                info!(output = %output.display(), "Excluding output folder from scan");
                analyzer = analyzer.with_excludes([output]);
            }
            analyzer.analyze()
        };
        ctx.total_input_files = groups.values().map(Vec::len).sum();
        self.log(
            ctx,
            LogLevel::Info,
            "groups_analyzed",
            "Folder analysis complete",
            json!({ "group_count": groups.len() }),
        );
        self.sync_warnings(ctx);

        // Step 2: Expand archives into groups of their own
        self.enter(ctx, RunState::ExpandingArchives);
        let PreparedGroups {
            groups,
            weights,
            archive_groups,
            summary,
            scratch,
        } = groups::expand_archives(groups, &self.config, &mut ctx.ledger)?;
        ctx.zip_processing = summary;
        ctx.scratch.extend(scratch);
        self.sync_warnings(ctx);

        // Step 3: Per group, classify and pack each content type
        for (group, files) in &groups {
            if cancel.is_cancelled() {
                self.log(
                    ctx,
                    LogLevel::Warning,
                    "run_cancelled",
                    "Merge cancelled by user",
                    json!({}),
                );
                return Ok(RunState::Cancelled);
            }
            if files.is_empty() {
                continue;
            }

            let from_archive = archive_groups.contains(group);
            panic::catch_unwind(AssertUnwindSafe(|| {
                self.process_group(ctx, group, files, from_archive)
            }))
            .map_err(|payload| PipelineError::Panicked {
                group: group.clone(),
                message: panic_message(payload.as_ref()),
            })??;

            ctx.file_count += weights.get(group).copied().unwrap_or(0);
            self.progress.report(ProgressEvent::Progress {
                current: ctx.file_count,
                total: ctx.total_input_files,
                message: format!("Processed {}", group),
            });
            self.log(
                ctx,
                LogLevel::Info,
                "group_end",
                "Finished group",
                json!({
                    "group": group,
                    "processed": ctx.file_count,
                    "total": ctx.total_input_files,
                }),
            );
            self.sync_warnings(ctx);
        }

        Ok(RunState::Completed)
    }

    /// A single `.zip` input is copied into a scratch folder and treated as
    /// a folder holding that archive.
    fn stage_input(
        &self,
        ctx: &mut RunContext,
        input: &Path,
    ) -> std::result::Result<PathBuf, PipelineError> {
        if input.is_file() {
            if ContentKind::classify(input) != ContentKind::Archive {
                return Err(PipelineError::InputNotArchive {
                    path: input.to_path_buf(),
                });
            }
            let staged = ScratchDir::new("docmerge_single_zip_input_")?;
            let name = input.file_name().unwrap_or_else(|| OsStr::new("input.zip"));
            let destination = staged.path().join(name);
            std::fs::copy(input, &destination).map_err(|e| StorageError::CopyFile {
                from: input.to_path_buf(),
                to: destination.clone(),
                source: e,
            })?;
            let root = staged.path().to_path_buf();
            ctx.scratch.push(staged);
            debug!(archive = %name.to_string_lossy(), "Staged single archive input");
            return Ok(root);
        }

        if !input.is_dir() {
            return Err(PipelineError::InvalidInput {
                path: input.to_path_buf(),
            });
        }
        Ok(input.to_path_buf())
    }

    fn process_group(
        &self,
        ctx: &mut RunContext,
        group: &str,
        files: &[PathBuf],
        from_archive: bool,
    ) -> std::result::Result<(), PipelineError> {
        let _span = info_span!("group", name = %group).entered();
        self.log(
            ctx,
            LogLevel::Info,
            "group_start",
            "Processing group",
            json!({ "group": group, "file_count": files.len() }),
        );

        self.enter(ctx, RunState::Classifying);
        let mut pdfs = Vec::new();
        let mut word_docs = Vec::new();
        let mut emails = Vec::new();
        let mut unsupported = Vec::new();
        for path in files {
            match ContentKind::classify(path) {
                ContentKind::Pdf => pdfs.push(path.clone()),
                ContentKind::Word => word_docs.push(path.clone()),
                ContentKind::Email => emails.push(path.clone()),
                ContentKind::Archive | ContentKind::Unsupported => unsupported.push(path.clone()),
            }
        }
        if !unsupported.is_empty() {
            self.relocate_unsupported(ctx, &unsupported, from_archive);
            self.sync_warnings(ctx);
        }

        if !pdfs.is_empty() && self.config.process_pdfs {
            self.enter(ctx, RunState::PackingPdf);
            self.process_pdfs(ctx, group, &pdfs)?;
            self.sync_warnings(ctx);
        }

        if !word_docs.is_empty() && self.config.process_word_documents {
            self.enter(ctx, RunState::PackingWord);
            self.process_word_documents(ctx, group, &word_docs)?;
            self.sync_warnings(ctx);
        }

        if !emails.is_empty() && self.config.process_emails {
            self.enter(ctx, RunState::PackingEmail);
            self.process_emails(ctx, group, &emails)?;
            self.sync_warnings(ctx);
        }

        Ok(())
    }

    /// Archive contents are always moved out of the scratch folder; input
    /// files follow the configured action and may be left in place.
    fn relocate_unsupported(&self, ctx: &mut RunContext, files: &[PathBuf], from_archive: bool) {
        let settings = &self.config.relocation;
        if !settings.include_source_files {
            return;
        }

        let target = ctx.layout.unprocessed.clone();
        let (relocation, event) = if from_archive {
            (
                Relocation {
                    target: &target,
                    action: TransferAction::Move,
                    reason: "unsupported_zip_file_moved",
                    origin: "zip_extract",
                },
                "unsupported_zip_file_relocated",
            )
        } else if settings.relocate_input_files {
            (
                Relocation {
                    target: &target,
                    action: settings.input_action,
                    reason: "unsupported_input_file_relocated",
                    origin: "input",
                },
                "unsupported_input_file_relocated",
            )
        } else {
            return;
        };

        let relocated = relocate_files(files, relocation, &mut ctx.ledger);
        for entry in &relocated {
            self.log(
                ctx,
                LogLevel::Info,
                event,
                "Relocated unsupported file",
                json!({
                    "source": entry.source.display().to_string(),
                    "destination": entry.destination.display().to_string(),
                    "action": entry.action,
                    "reason": entry.reason,
                    "origin": entry.origin,
                }),
            );
            if from_archive {
                ctx.moved_unprocessed.push(MovedFile::from(entry));
            }
        }
        ctx.unprocessed.extend(relocated);
    }

    fn process_pdfs(
        &self,
        ctx: &mut RunContext,
        group: &str,
        pdfs: &[PathBuf],
    ) -> std::result::Result<(), PipelineError> {
        let _step = info_span!("pack_pdf", files = pdfs.len()).entered();
        self.log(
            ctx,
            LogLevel::Info,
            "pdf_merge_start",
            "Starting PDF merge",
            json!({ "group": group, "count": pdfs.len() }),
        );

        let items: Vec<MergeItem> = pdfs.iter().map(|p| MergeItem::new(p.clone())).collect();
        let merger = PdfMerger::new(self.caps());
        let outputs = self.merge_batches(
            ctx,
            &merger,
            group,
            "pdfs",
            &items,
            &format!("group '{}' PDF files", group),
        )?;

        self.log(
            ctx,
            LogLevel::Info,
            "pdf_merge_end",
            "Completed PDF merge",
            json!({ "group": group, "outputs": outputs }),
        );
        Ok(())
    }

    fn process_word_documents(
        &self,
        ctx: &mut RunContext,
        group: &str,
        docs: &[PathBuf],
    ) -> std::result::Result<(), PipelineError> {
        let _step = info_span!("pack_word", files = docs.len()).entered();
        self.log(
            ctx,
            LogLevel::Info,
            "word_convert_start",
            "Starting Word conversion",
            json!({ "group": group, "count": docs.len() }),
        );

        let availability = self.converter.availability();
        let outputs = match self.config.word.output_mode {
            WordOutputMode::Docx => self.merge_word_as_docx(ctx, group, docs)?,
            WordOutputMode::Auto if !availability.available => {
                self.log(
                    ctx,
                    LogLevel::Info,
                    "word_converter_unavailable",
                    "No document converter available; merging Word files as DOCX",
                    json!({ "group": group, "reason": availability.reason }),
                );
                self.merge_word_as_docx(ctx, group, docs)?
            }
            WordOutputMode::Pdf if !availability.available => {
                return Err(PipelineError::ConverterUnavailable {
                    reason: availability.reason,
                });
            }
            WordOutputMode::Auto | WordOutputMode::Pdf => {
                self.convert_word_to_pdf(ctx, group, docs)?
            }
        };

        self.log(
            ctx,
            LogLevel::Info,
            "word_convert_end",
            "Completed Word conversion",
            json!({ "group": group, "outputs": outputs }),
        );
        Ok(())
    }

    fn merge_word_as_docx(
        &self,
        ctx: &mut RunContext,
        group: &str,
        docs: &[PathBuf],
    ) -> std::result::Result<usize, PipelineError> {
        let items: Vec<MergeItem> = docs.iter().map(|p| MergeItem::new(p.clone())).collect();
        let merger = DocxMerger::new(self.caps());
        self.merge_batches(
            ctx,
            &merger,
            group,
            "documents",
            &items,
            &format!("group '{}' Word document files", group),
        )
    }

    /// Converts each document inside one converter session, then merges the
    /// converted PDFs. The session is released before merging starts.
    fn convert_word_to_pdf(
        &self,
        ctx: &mut RunContext,
        group: &str,
        docs: &[PathBuf],
    ) -> std::result::Result<usize, PipelineError> {
        let conversion_dir = ScratchDir::new("docmerge_word_pdf_")?;
        let interval = self.config.word.progress_interval.max(1);
        let total = docs.len();
        let mut summary = WordConversionSummary {
            attempted: total,
            ..WordConversionSummary::default()
        };
        let mut items = Vec::new();

        {
            let mut session = self.converter.open_session(self.config.word.convert_timeout())?;
            for (index, source) in docs.iter().enumerate() {
                let out_dir = conversion_dir.path().join(index.to_string());
                ensure_directory(&out_dir)?;

                match session.convert(source, &out_dir) {
                    Ok(pdf) => {
                        summary.converted += 1;
                        items.push(MergeItem::converted(pdf, source.clone()));
                    }
                    Err(ConvertError::Timeout { seconds }) => {
                        summary.failed += 1;
                        ctx.ledger.record(WarningKind::WordToPdfTimeout {
                            file: source.clone(),
                            timeout: seconds,
                        });
                    }
                    Err(e) => {
                        summary.failed += 1;
                        ctx.ledger.record(WarningKind::WordToPdfFailed {
                            file: source.clone(),
                            error: e.to_string(),
                        });
                    }
                }

                let processed = index + 1;
                if processed % interval == 0 || processed == total {
                    let message = format!(
                        "Word conversion progress for {}: {}/{} (converted={}, failed={})",
                        group, processed, total, summary.converted, summary.failed
                    );
                    self.log(
                        ctx,
                        LogLevel::Info,
                        "word_conversion_progress",
                        &message,
                        json!({
                            "group": group,
                            "converted": summary.converted,
                            "failed": summary.failed,
                            "processed": processed,
                            "total": total,
                        }),
                    );
                    self.progress.report(ProgressEvent::Progress {
                        current: ctx.file_count,
                        total: ctx.total_input_files,
                        message,
                    });
                }
            }
        }
        ctx.word_conversion.merge(summary);

        if items.is_empty() {
            ctx.ledger.record(WarningKind::WordConversionNoOutputs {
                group: group.to_string(),
                attempted: total,
            });
            return Ok(0);
        }

        let merger = PdfMerger::new(self.caps());
        let outputs = self.merge_batches(
            ctx,
            &merger,
            group,
            "documents",
            &items,
            &format!("group '{}' Word document files", group),
        )?;

        let message = format!(
            "Word conversion summary for {}: attempted={}, converted={}, failed={}",
            group, summary.attempted, summary.converted, summary.failed
        );
        self.log(
            ctx,
            LogLevel::Info,
            "word_conversion_summary",
            &message,
            json!({ "group": group }),
        );
        Ok(outputs)
    }

    fn process_emails(
        &self,
        ctx: &mut RunContext,
        group: &str,
        emails: &[PathBuf],
    ) -> std::result::Result<(), PipelineError> {
        let _step = info_span!("pack_email", files = emails.len()).entered();
        self.log(
            ctx,
            LogLevel::Info,
            "email_thread_start",
            "Starting email threading",
            json!({ "group": group, "count": emails.len() }),
        );

        let (records, parsed) = email::extract_all(emails, &mut ctx.ledger);
        ctx.emails.merge(parsed);
        self.sync_warnings(ctx);

        let threads = EmailThreader::new().group(records);
        let writer = EmailWriter::new(&self.config.email);
        let blocks = writer.blocks(&threads);
        let plan = writer.plan(&blocks, group, &mut ctx.ledger);
        let context = match writer.mode() {
            EmailOutputMode::Threaded => format!("group '{}' email threads", group),
            EmailOutputMode::SizeBatched => format!("group '{}' email batches", group),
        };
        self.ensure_capacity(ctx, plan.len(), &context)?;

        let dir = ctx.layout.processed.clone();
        let written = writer.write(&blocks, &plan, &dir, group)?;
        ctx.emails.merge(written.summary);
        let outputs = ctx.record_outputs(written.outputs);

        self.log(
            ctx,
            LogLevel::Info,
            "email_thread_end",
            "Completed email threading",
            json!({ "group": group, "outputs": outputs }),
        );
        Ok(())
    }

    /// Measures, checks the output budget for the whole plan, then writes
    /// each batch. Returns the number of files written.
    fn merge_batches(
        &self,
        ctx: &mut RunContext,
        merger: &dyn BatchMerger,
        group: &str,
        label: &str,
        items: &[MergeItem],
        context: &str,
    ) -> std::result::Result<usize, PipelineError> {
        let measured = merger.measure(items, &mut ctx.ledger);
        let plan = packer::plan(measured, merger.caps());
        self.ensure_capacity(ctx, plan.len(), context)?;

        let dir = ctx.layout.processed.clone();
        let mut written = 0;
        for (index, range) in plan.into_iter().enumerate() {
            let target = BatchTarget {
                dir: &dir,
                group,
                label,
                number: index + 1,
            };
            if let Some(output) = merger.write_batch(&items[range], target, &mut ctx.ledger)? {
                ctx.record_output(output);
                written += 1;
            }
        }
        Ok(written)
    }

    fn ensure_capacity(
        &self,
        ctx: &RunContext,
        required: usize,
        context: &str,
    ) -> std::result::Result<(), PipelineError> {
        if required == 0 {
            return Ok(());
        }
        let max = self.config.max_output_files;
        let remaining = ctx.remaining_outputs(max);
        if required > remaining {
            return Err(PipelineError::CapacityExceeded {
                context: context.to_string(),
                required,
                remaining,
                max,
            });
        }
        Ok(())
    }

    fn caps(&self) -> Caps {
        Caps {
            max_bytes: self.config.max_batch_bytes(),
            max_words: MAX_BATCH_WORDS,
        }
    }

    /// Derives outcomes, creates failed artifacts, writes the manifest and
    /// releases run resources. Runs on every exit path.
    fn finalize(&self, ctx: &mut RunContext, terminal: RunState) -> Manifest {
        let _step = info_span!("finalize").entered();
        self.enter(ctx, RunState::Finalizing);

        let outcomes = ctx.ledger.derive_outcomes();
        ctx.failed = outcomes.failed;
        ctx.skipped = outcomes.skipped;
        ctx.failed_artifacts_total = materialize_failed_artifacts(
            &mut ctx.failed,
            &ctx.layout.failed,
            self.config.relocation.failed_artifact_action,
            self.config.relocation.include_failed_artifacts,
            &mut ctx.ledger,
        );
        let created: Vec<(String, String, String)> = ctx
            .failed
            .iter()
            .filter(|f| f.artifact_status == Some(ArtifactStatus::Created))
            .map(|f| {
                let destination = f
                    .artifact_destination
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default();
                (f.source.clone(), destination, f.stage.clone())
            })
            .collect();
        for (source, destination, stage) in created {
            self.log(
                ctx,
                LogLevel::Info,
                "failed_artifact_created",
                "Created failed-file artifact",
                json!({ "source": source, "destination": destination, "stage": stage }),
            );
        }
        self.sync_warnings(ctx);

        let mut manifest = self.build_manifest(ctx, terminal);
        let manifest_path = ctx.layout.processed.join(MANIFEST_FILE_NAME);
        match manifest.write_to(&manifest_path) {
            Ok(()) => self.log(
                ctx,
                LogLevel::Info,
                "manifest_written",
                "Wrote merge manifest",
                json!({ "path": manifest_path.display().to_string() }),
            ),
            Err(e) => {
                self.log(
                    ctx,
                    LogLevel::Warning,
                    "manifest_write_failed",
                    &format!("Could not write {}: {}", MANIFEST_FILE_NAME, e),
                    json!({ "path": manifest_path.display().to_string() }),
                );
                manifest.manifest_write_error = Some(e.to_string());
            }
        }

        ctx.log.close();
        ctx.scratch.clear();
        manifest
    }

    fn build_manifest(&self, ctx: &RunContext, status: RunState) -> Manifest {
        let mut manifest = Manifest {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            run_id: ctx.run_id.clone(),
            status,
            input_path: ctx.input_path.clone(),
            total_input_files: ctx.total_input_files,
            total_output_files: ctx.output_files.len(),
            output_files: ctx.output_files.clone(),
            limits: Limits {
                max_file_size_kb: self.config.max_file_size_kb,
                max_output_files: self.config.max_output_files,
            },
            paths: OutputPaths {
                processed_dir: ctx.layout.processed.clone(),
                unprocessed_dir: ctx.layout.unprocessed.clone(),
                failed_dir: ctx.layout.failed.clone(),
                logs_dir: ctx.layout.logs.clone(),
            },
            logs: LogPaths {
                text_log: ctx.log.text_path().to_path_buf(),
                jsonl_log: ctx.log.jsonl_path().to_path_buf(),
            },
            summary: Summary::default(),
            files: Files {
                processed_outputs: ctx.output_files.clone(),
                moved_unprocessed: ctx.moved_unprocessed.clone(),
                unprocessed: ctx.unprocessed.clone(),
                failed: ctx.failed.clone(),
                skipped: ctx.skipped.clone(),
            },
            warnings: ctx.ledger.warnings().to_vec(),
            errors: ctx.errors.clone(),
            output_to_sources: ctx.output_to_sources.clone(),
            word_conversion: Some(ctx.word_conversion).filter(|w| w.attempted > 0),
            zip_processing: Some(ctx.zip_processing).filter(|z| z.archives_found > 0),
            emails: Some(ctx.emails.clone())
                .filter(|e| e.parsed_total > 0 || e.failed_total > 0),
            manifest_write_error: None,
        };
        manifest.refresh_summary(ctx.failed_artifacts_total);
        manifest
    }

    fn enter(&self, ctx: &mut RunContext, state: RunState) {
        ctx.state = state;
        debug!(state = state.as_str(), "Run state");
        self.progress.report(ProgressEvent::State(state));
    }

    fn log(&self, ctx: &mut RunContext, level: LogLevel, event: &str, message: &str, context: Value) {
        let record = ctx.log.log(level, event, message, context);
        self.progress.report(ProgressEvent::Log(record));
    }

    /// Mirrors warnings recorded since the last sync into the run log.
    fn sync_warnings(&self, ctx: &mut RunContext) {
        let pending: Vec<Warning> = ctx.ledger.take_unsynced().to_vec();
        for warning in pending {
            self.log(
                ctx,
                LogLevel::Warning,
                warning.code(),
                &warning.message,
                warning.context(),
            );
        }
    }
}


fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
