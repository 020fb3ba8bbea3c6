use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::ExtractError;

/// Where the raw bytes of an upload live until extraction consumes them.
#[derive(Clone)]
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Path(path) => write!(f, "Path({})", path.display()),
        }
    }
}

/// An attachment as handed over by the transport. Consumed within one turn.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub media_type: String,
    pub source: DocumentSource,
}

impl UploadedDocument {
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            source: DocumentSource::Bytes(bytes.into()),
        }
    }

    /// Describes a file on disk; the media type is guessed from its suffix.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Path has no usable file name: {}", path.display()))?
            .to_string();

        Ok(Self {
            media_type: media_type_for_name(&name).to_string(),
            name,
            source: DocumentSource::Path(path.to_path_buf()),
        })
    }

    /// Resolves the source into bytes, consuming the document.
    pub(crate) fn into_bytes(self, kind: &'static str) -> Result<(String, Vec<u8>), ExtractError> {
        match self.source {
            DocumentSource::Bytes(bytes) => Ok((self.name, bytes)),
            DocumentSource::Path(path) => match fs::read(&path) {
                Ok(bytes) => Ok((self.name, bytes)),
                Err(err) => Err(ExtractError::parse_failure(
                    self.name,
                    kind,
                    anyhow::Error::new(err).context(format!("reading {}", path.display())),
                )),
            },
        }
    }
}

/// Best-effort media type for a file name; unknown suffixes map to octet-stream.
pub fn media_type_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("csv") => "text/csv",
        Some("txt") | Some("text") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn media_types_follow_suffix() {
        assert_eq!(media_type_for_name("Report.PDF"), "application/pdf");
        assert_eq!(media_type_for_name("data.csv"), "text/csv");
        assert_eq!(media_type_for_name("notes.txt"), "text/plain");
        assert_eq!(media_type_for_name("archive.tar.gz"), "application/octet-stream");
        assert_eq!(media_type_for_name("no_suffix"), "application/octet-stream");
    }

    #[test]
    fn path_documents_read_lazily() {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("temp file");
        write!(file, "hello from disk").expect("write");

        let document = UploadedDocument::from_path(file.path()).expect("document");
        assert_eq!(document.media_type, "text/plain");
        assert!(matches!(document.source, DocumentSource::Path(_)));

        let (name, bytes) = document.into_bytes("TXT").expect("bytes");
        assert!(name.ends_with(".txt"));
        assert_eq!(bytes, b"hello from disk");
    }

    #[test]
    fn missing_files_are_parse_failures() {
        let dir = tempfile::tempdir().expect("temp dir");
        let document = UploadedDocument::from_path(dir.path().join("gone.pdf")).expect("document");
        let err = document.into_bytes("PDF").expect_err("missing file");
        assert!(matches!(err, ExtractError::ParseFailure { kind: "PDF", .. }));
    }

    #[test]
    fn debug_output_hides_bytes() {
        let document = UploadedDocument::from_bytes("a.txt", "text/plain", vec![1u8; 64]);
        assert!(format!("{document:?}").contains("Bytes(64 bytes)"));
    }
}
