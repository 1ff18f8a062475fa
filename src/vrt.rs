//! VRT writer

use crate::error::{AnnotatorError, AnnotatorResult};
use crate::pipeline::LineList;
use std::path::{Path, PathBuf};

/// Output file for a corpus: `<output_dir>/<corpus_name>.vrt`
pub fn vrt_path(output_dir: &Path, corpus_name: &str) -> PathBuf {
    output_dir.join(format!("{}.vrt", corpus_name))
}

/// Render lines as VRT text, one line per entry, `\n`-terminated
pub fn render(lines: &LineList) -> String {
    lines.render()
}

/// Write lines to `path`, replacing any existing file.
///
/// Parent directories are created as needed.
pub fn write_vrt(path: &Path, lines: &LineList) -> AnnotatorResult<()> {
    let write_err = |source: std::io::Error| AnnotatorError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, render(lines)).map_err(write_err)?;
    tracing::info!(path = %path.display(), lines = lines.len(), "wrote VRT file");
    Ok(())
}
