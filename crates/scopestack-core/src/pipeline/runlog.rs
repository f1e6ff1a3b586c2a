use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::pipeline::types::FolderOutcome;

/// Append-only record of a conversion run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunLog {
    processed: Vec<String>,
    already_exists: Vec<String>,
    failed: Vec<(String, String)>,
    issues: Vec<String>,
    notes: Vec<String>,
    elapsed: Option<Duration>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, folder: &str, outcome: &FolderOutcome) {
        match outcome {
            FolderOutcome::Processed(_) => self.processed.push(folder.to_string()),
            FolderOutcome::AlreadyExists { .. } => self.already_exists.push(folder.to_string()),
        }
    }

    pub fn record_failure(&mut self, folder: &str, reason: impl Into<String>) {
        self.failed.push((folder.to_string(), reason.into()));
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.issues.push(text.into());
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }

    pub fn processed(&self) -> &[String] {
        &self.processed
    }

    pub fn already_exists(&self) -> &[String] {
        &self.already_exists
    }

    pub fn failed(&self) -> &[(String, String)] {
        &self.failed
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Text form, one `Category: [...]` line per category.
    pub fn render(&self) -> String {
        let failed: Vec<String> = self
            .failed
            .iter()
            .map(|(folder, reason)| format!("{folder}: {reason}"))
            .collect();
        let mut out = String::new();
        out.push_str(&format!("Files Processed: {}\n", list(&self.processed)));
        out.push_str(&format!("Files Already Processed: {}\n", list(&self.already_exists)));
        out.push_str(&format!("Files Not Processed: {}\n", list(&failed)));
        out.push_str(&format!("Issues: {}\n", list(&self.issues)));
        out.push_str(&format!("Other Notes: {}\n", list(&self.notes)));
        if let Some(elapsed) = self.elapsed {
            out.push_str(&format!("Elapsed Time: {:.1} s\n", elapsed.as_secs_f64()));
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}
