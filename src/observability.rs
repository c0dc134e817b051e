//! Pipeline observers.
//!
//! The engine itself logs through `tracing`. Observers receive the coarser, per-dataset events:
//! stage transitions, persisted artifacts, warnings and failures. Attach one (or a
//! [`CompositeObserver`] of several) through [`crate::pipeline::PipelineOptions`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::{error, info, warn};

use crate::error::{ExportError, Severity};
use crate::pipeline::{Artifact, PipelineStage};

/// Which dataset an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    /// Dataset type name.
    pub dataset: String,
}

/// Observer interface for pipeline events.
///
/// Every method has a no-op default; implement the ones you need.
pub trait PipelineObserver: Send + Sync {
    /// Called when a dataset reaches a stage.
    fn on_stage(&self, _ctx: &PipelineContext, _stage: PipelineStage) {}

    /// Called after an artifact is persisted.
    fn on_artifact(&self, _ctx: &PipelineContext, _artifact: &Artifact) {}

    /// Called for non-fatal conditions. An empty dataset is [`Severity::Info`]; oversized and
    /// unmeasured chunks are [`Severity::Warning`].
    fn on_warning(&self, _ctx: &PipelineContext, _severity: Severity, _message: &str) {}

    /// Called when a dataset's pipeline fails.
    fn on_failure(&self, _ctx: &PipelineContext, _severity: Severity, _error: &ExportError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &PipelineContext, severity: Severity, error: &ExportError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_stage(&self, ctx: &PipelineContext, stage: PipelineStage) {
        for o in &self.observers {
            o.on_stage(ctx, stage);
        }
    }

    fn on_artifact(&self, ctx: &PipelineContext, artifact: &Artifact) {
        for o in &self.observers {
            o.on_artifact(ctx, artifact);
        }
    }

    fn on_warning(&self, ctx: &PipelineContext, severity: Severity, message: &str) {
        for o in &self.observers {
            o.on_warning(ctx, severity, message);
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: Severity, error: &ExportError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: Severity, error: &ExportError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_stage(&self, ctx: &PipelineContext, stage: PipelineStage) {
        info!(dataset = %ctx.dataset, ?stage, "stage reached");
    }

    fn on_artifact(&self, ctx: &PipelineContext, artifact: &Artifact) {
        info!(
            dataset = %ctx.dataset,
            kind = ?artifact.kind,
            path = %artifact.path.display(),
            rows = artifact.rows,
            bytes = artifact.bytes,
            "artifact written"
        );
    }

    fn on_warning(&self, ctx: &PipelineContext, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!(dataset = %ctx.dataset, "{message}"),
            _ => warn!(dataset = %ctx.dataset, ?severity, "{message}"),
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: Severity, err: &ExportError) {
        error!(dataset = %ctx.dataset, ?severity, error = %err, "dataset failed");
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: Severity, err: &ExportError) {
        error!(dataset = %ctx.dataset, ?severity, error = %err, alert = true, "dataset failed");
    }
}

/// Appends pipeline events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Local::now().format("%Y-%m-%dT%H:%M:%S"));
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_stage(&self, ctx: &PipelineContext, stage: PipelineStage) {
        self.append_line(&format!("stage dataset={} stage={stage:?}", ctx.dataset));
    }

    fn on_artifact(&self, ctx: &PipelineContext, artifact: &Artifact) {
        self.append_line(&format!(
            "artifact dataset={} kind={:?} path={} rows={} bytes={}",
            ctx.dataset,
            artifact.kind,
            artifact.path.display(),
            artifact.rows,
            artifact.bytes
        ));
    }

    fn on_warning(&self, ctx: &PipelineContext, severity: Severity, message: &str) {
        self.append_line(&format!("warn severity={severity:?} dataset={} {message}", ctx.dataset));
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: Severity, error: &ExportError) {
        self.append_line(&format!(
            "fail severity={severity:?} dataset={} err={error}",
            ctx.dataset
        ));
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: Severity, error: &ExportError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} dataset={} err={error}",
            ctx.dataset
        ));
    }
}
