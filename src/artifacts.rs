use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::transcript::Transcript;

pub const PAGE_INDEX_FILE: &str = "html_description.txt";
pub const TRANSCRIPT_FILE: &str = "messages.json";

/// Write-only dump of per-step state for offline inspection.
///
/// Failures are logged and swallowed: nothing in the session depends on
/// these files.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_index_path(&self) -> PathBuf {
        self.dir.join(PAGE_INDEX_FILE)
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir.join(TRANSCRIPT_FILE)
    }

    pub fn write_page_index(&self, rendered: &str) {
        if let Err(e) = std::fs::write(self.page_index_path(), rendered) {
            tracing::warn!(error = %e, "failed to write page index artifact");
        }
    }

    pub fn write_transcript(&self, transcript: &Transcript) {
        if let Err(e) = self.try_write_transcript(transcript) {
            tracing::warn!(error = %e, "failed to write transcript artifact");
        }
    }

    fn try_write_transcript(&self, transcript: &Transcript) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.transcript_path())?;
        serde_json::to_writer_pretty(&mut file, transcript)?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_both_artifacts_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path().join("run_artifacts")).unwrap();

        sink.write_page_index("<node id=1 clickable=true inputable=false>");
        sink.write_page_index("<node id=2 clickable=false inputable=true>");
        assert_eq!(
            std::fs::read_to_string(sink.page_index_path()).unwrap(),
            "<node id=2 clickable=false inputable=true>"
        );

        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        sink.write_transcript(&transcript);
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sink.transcript_path()).unwrap())
                .unwrap();
        assert_eq!(saved[0]["role"], "user");
        assert_eq!(saved[0]["content"], "hello");
    }
}
