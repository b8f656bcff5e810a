use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::RequestLogEntry;

/// Append-only JSONL request log. One line per operation; writers never
/// rewrite history, readers tolerate torn or foreign lines.
#[derive(Debug, Clone)]
pub struct RequestLog {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct JsonlParseOutcome<T> {
    pub items: Vec<T>,
    pub skipped_lines: usize,
    pub first_error: Option<(usize, String)>,
}

impl RequestLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &RequestLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn read_entries(&self) -> Result<JsonlParseOutcome<RequestLogEntry>> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(parse_jsonl_tolerant(&raw))
    }
}

pub fn parse_jsonl_tolerant<T>(raw: &str) -> JsonlParseOutcome<T>
where
    T: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut skipped_lines = 0usize;
    let mut first_error = None::<(usize, String)>;

    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(value) => items.push(value),
            Err(err) => {
                skipped_lines += 1;
                if first_error.is_none() {
                    first_error = Some((line_no + 1, err.to_string()));
                }
            }
        }
    }

    JsonlParseOutcome {
        items,
        skipped_lines,
        first_error,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::RequestLog;
    use crate::models::RequestLogEntry;

    fn entry(operation: &str, status: &str) -> RequestLogEntry {
        RequestLogEntry {
            request_id: "req-1".to_string(),
            operation: operation.to_string(),
            status: status.to_string(),
            latency_ms: 3,
            created_at: "2025-11-02T10:00:00Z".to_string(),
            trace_id: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let log = RequestLog::new(dir.path().join("logs").join("requests.jsonl"));

        log.append(&entry("assign", "ok")).unwrap();
        log.append(&entry("resolve", "error")).unwrap();

        let outcome = log.read_entries().unwrap();
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.skipped_lines, 0);
        assert_eq!(outcome.items[0].operation, "assign");
        assert_eq!(outcome.items[1].status, "error");
    }

    #[test]
    fn reader_skips_invalid_lines_and_reports_the_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.jsonl");
        let log = RequestLog::new(path.clone());
        log.append(&entry("assign", "ok")).unwrap();
        std::fs::write(
            &path,
            format!("{}not json\n", std::fs::read_to_string(&path).unwrap()),
        )
        .unwrap();

        let outcome = log.read_entries().unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.skipped_lines, 1);
        let (line_no, _) = outcome.first_error.expect("first error recorded");
        assert_eq!(line_no, 2);
    }
}
