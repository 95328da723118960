//! Embed progress reporting.
//!
//! Reports observable progress during `fsembed embed` so users see which root
//! is being walked and how many files are left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an embedding run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbedProgressEvent {
    /// Walking the tree under `root`. Total unknown.
    Discovering { root: String },
    /// `n` files processed out of `total`.
    Embedding { root: String, n: u64, total: u64 },
}

/// Reports embed progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline loop.
    fn report(&self, event: EmbedProgressEvent);
}

/// Human-friendly progress on stderr: "embed /home/me/notes  embedding  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: EmbedProgressEvent) {
        let line = match &event {
            EmbedProgressEvent::Discovering { root } => {
                format!("embed {}  discovering...\n", root)
            }
            EmbedProgressEvent::Embedding { root, n, total } => format!(
                "embed {}  embedding  {} / {} files\n",
                root,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: EmbedProgressEvent) {
        let obj = match &event {
            EmbedProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "discovering"
            }),
            EmbedProgressEvent::Embedding { root, n, total } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "embedding",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: EmbedProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
