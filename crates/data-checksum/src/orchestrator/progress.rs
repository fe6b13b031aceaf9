//! Progress updates streamed to the caller while a job runs.

use serde::Serialize;

/// One progress event. Serialized as a JSON line by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// A chunk finished.
    Chunk {
        pair: String,
        chunk_number: u64,
        equal: bool,
        elapsed_ms: u64,
    },
    /// A table pair finished, failed or was cancelled.
    Pair {
        pair: String,
        outcome: String,
        chunks_processed: u64,
        duration_ms: u64,
    },
}

impl ProgressUpdate {
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_json() {
        let update = ProgressUpdate::Chunk {
            pair: "a.t => b.t".into(),
            chunk_number: 3,
            equal: false,
            elapsed_ms: 12,
        };
        let line = update.to_json_line();
        assert!(line.starts_with("{\"type\":\"chunk\""));
        assert!(line.contains("\"equal\":false"));
    }
}
