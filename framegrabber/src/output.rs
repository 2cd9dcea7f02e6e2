/*!
Result reporting.

Every acknowledged ROI sum becomes one JSON line on stdout and, when
storage is enabled, in a `results.jsonl` file inside a timestamped session
directory. Logging goes to stderr so stdout stays machine readable.
*/

use anyhow::{Context, Result};
use cameralink::Completion;
use chrono::Local;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// One reported line
#[derive(Debug, Serialize)]
struct ResultLine<'a> {
    roi: &'a str,
    #[serde(flatten)]
    completion: &'a Completion,
    timestamp: String,
}

/// Writes completions to stdout and an optional session file
pub struct ResultSink {
    names: Vec<String>,
    stdout: bool,
    file: Option<BufWriter<File>>,
    session_dir: Option<PathBuf>,
    written: u64,
}

impl ResultSink {
    /// Create a sink; `names` label the engines in order
    pub fn new(names: Vec<String>, stdout: bool) -> Self {
        Self {
            names,
            stdout,
            file: None,
            session_dir: None,
            written: 0,
        }
    }

    /// Also store results under `<output_dir>/<timestamp>/results.jsonl`
    pub fn with_session_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Result<Self> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let session_dir = output_dir.as_ref().join(&timestamp);
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create session directory: {}", session_dir.display()))?;

        let path = session_dir.join("results.jsonl");
        let file = File::create(&path)
            .with_context(|| format!("Failed to create results file: {}", path.display()))?;
        info!("📁 Results will be saved to: {}", path.display());

        self.file = Some(BufWriter::new(file));
        self.session_dir = Some(session_dir);
        Ok(self)
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Lines written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn name(&self, engine: usize) -> &str {
        self.names.get(engine).map(String::as_str).unwrap_or("roi")
    }

    /// Report a batch of completions
    pub fn write(&mut self, completions: &[Completion]) -> Result<()> {
        for completion in completions {
            let line = ResultLine {
                roi: self.name(completion.engine),
                completion,
                timestamp: Local::now().to_rfc3339(),
            };
            let json = serde_json::to_string(&line)?;

            info!(
                "✅ ROI {} (#{}) window {}: sum {}",
                line.roi, completion.sequence, completion.window, completion.sum
            );
            if self.stdout {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", json)?;
                stdout.flush()?;
            }
            if let Some(file) = self.file.as_mut() {
                writeln!(file, "{}", json)?;
            }
            self.written += 1;
        }
        Ok(())
    }

    /// Flush the session file
    pub fn finish(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().with_context(|| "Failed to flush results file")?;
        }
        Ok(())
    }
}
