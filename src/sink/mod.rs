//! Output sinks: persist a [`StyledDocument`] as HTML or `.docx`.
//!
//! Files are written atomically: the bytes go to a temporary file in the
//! target directory which is then renamed over the destination, so a failed
//! job never leaves a truncated document behind.

pub mod docx;
pub mod html;

use crate::config::OutputFormat;
use crate::model::StyledDocument;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Serialize `doc` in `format`.
pub fn render(doc: &StyledDocument, format: OutputFormat) -> std::io::Result<Vec<u8>> {
    match format {
        OutputFormat::Html => Ok(html::render_html(doc).into_bytes()),
        OutputFormat::Docx => docx::render_docx(doc),
    }
}

/// Render `doc` and write it to `path`. Returns the number of bytes written.
pub fn write_document(doc: &StyledDocument, path: &Path, format: OutputFormat) -> std::io::Result<usize> {
    let bytes = render(doc, format)?;
    write_atomic(path, &bytes)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len())
}

/// Write `bytes` to `path` through a temporary sibling file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StyleConfig;

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.html");
        let doc = StyledDocument::new(StyleConfig::default());
        let written = write_document(&doc, &path, OutputFormat::Html).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, written);
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn docx_format_writes_zip() {
        let doc = StyledDocument::new(StyleConfig::default());
        let bytes = render(&doc, OutputFormat::Docx).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
