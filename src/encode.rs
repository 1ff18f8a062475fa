//! Corpus encoder interface
//!
//! The encoder consumes the written VRT file together with the positional
//! (`ptags`) and structural (`stags`) attribute names of the run.

use crate::config::AnnotatorConfig;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::pipeline::TagSet;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Indexes a written VRT file
#[async_trait]
pub trait CorpusEncoder: Send + Sync {
    async fn encode(&self, vrt: &Path, ptags: &TagSet, stags: &TagSet) -> AnnotatorResult<()>;
}

/// Encoder driving the CWB command line tools
#[derive(Debug, Clone)]
pub struct CwbEncoder {
    pub corpus_name: String,
    pub corpus_dir: PathBuf,
    pub registry_dir: PathBuf,
    pub encode_program: String,
    pub makeall_program: String,
}

impl CwbEncoder {
    pub fn new(
        corpus_name: impl Into<String>,
        corpus_dir: impl Into<PathBuf>,
        registry_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            corpus_name: corpus_name.into(),
            corpus_dir: corpus_dir.into(),
            registry_dir: registry_dir.into(),
            encode_program: "cwb-encode".to_string(),
            makeall_program: "cwb-makeall".to_string(),
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self::new(
            config.corpus_name.trim(),
            &config.paths.corpus_dir,
            &config.paths.registry_dir,
        )
    }

    /// Arguments for `cwb-encode`
    pub fn encode_args(&self, vrt: &Path, ptags: &TagSet, stags: &TagSet) -> Vec<String> {
        let name = self.corpus_name.to_lowercase();
        let mut args = vec![
            "-c".to_string(),
            "utf8".to_string(),
            "-d".to_string(),
            self.corpus_dir.join(&name).display().to_string(),
            "-f".to_string(),
            vrt.display().to_string(),
            "-R".to_string(),
            self.registry_dir.join(&name).display().to_string(),
            // the token text is a named attribute, not the default word column
            "-p".to_string(),
            "-".to_string(),
            "-P".to_string(),
            "idx".to_string(),
            "-P".to_string(),
            "word".to_string(),
        ];
        for ptag in ptags.names() {
            args.push("-P".to_string());
            args.push(ptag.clone());
        }
        for stag in stags.names() {
            args.push("-S".to_string());
            args.push(stag.clone());
        }
        args
    }

    /// Arguments for `cwb-makeall`
    pub fn makeall_args(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.registry_dir.display().to_string(),
            "-V".to_string(),
            self.corpus_name.to_uppercase(),
        ]
    }

    async fn run_tool(program: &str, args: &[String]) -> AnnotatorResult<()> {
        info!(program, ?args, "running corpus tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| AnnotatorError::Encode(format!("failed to start '{}': {}", program, e)))?;
        if output.status.success() {
            return Ok(());
        }
        Err(AnnotatorError::Encode(format!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[async_trait]
impl CorpusEncoder for CwbEncoder {
    async fn encode(&self, vrt: &Path, ptags: &TagSet, stags: &TagSet) -> AnnotatorResult<()> {
        std::fs::create_dir_all(self.corpus_dir.join(self.corpus_name.to_lowercase()))
            .map_err(|e| AnnotatorError::Encode(format!("cannot create corpus directory: {}", e)))?;
        std::fs::create_dir_all(&self.registry_dir)
            .map_err(|e| AnnotatorError::Encode(format!("cannot create registry directory: {}", e)))?;

        Self::run_tool(&self.encode_program, &self.encode_args(vrt, ptags, stags)).await?;
        Self::run_tool(&self.makeall_program, &self.makeall_args()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn encode_args_list_attributes() {
        let encoder = CwbEncoder::new("News", "corpora", "registry");
        let ptags: TagSet = ["pos", "lemma"].into_iter().collect();
        let stags: TagSet = ["s"].into_iter().collect();
        let args = encoder.encode_args(Path::new("out/News.vrt"), &ptags, &stags);

        assert_eq!(
            args.join(" "),
            "-c utf8 -d corpora/news -f out/News.vrt -R registry/news -p - -P idx -P word -P pos -P lemma -S s"
        );
        assert_eq!(encoder.makeall_args(), vec!["-r", "registry", "-V", "NEWS"]);
    }

    #[tokio::test]
    async fn missing_tool_is_encode_error() {
        let dir = TempDir::new().unwrap();
        let mut encoder = CwbEncoder::new("c", dir.path().join("corpora"), dir.path().join("registry"));
        encoder.encode_program = "annotator-test-no-such-program".to_string();

        let err = encoder
            .encode(Path::new("c.vrt"), &TagSet::new(), &TagSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Encode(_)));
    }
}
