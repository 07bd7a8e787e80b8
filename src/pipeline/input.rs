//! Input validation: the source PDF and the optional side-data file.
//!
//! The PDF is checked up front (exists, readable, `%PDF` magic) so callers
//! get a meaningful error rather than a pdfium failure halfway into the
//! rasteriser. Side data is opaque text carried into every page manifest.

use crate::error::Pdf2HtmlError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path, returning it unchanged on success.
pub fn validate_pdf(path: &Path) -> Result<PathBuf, Pdf2HtmlError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(Pdf2HtmlError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            let n = f.read(&mut magic).unwrap_or(0);
            if n < magic.len() || &magic != b"%PDF" {
                return Err(Pdf2HtmlError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2HtmlError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2HtmlError::FileNotFound { path });
        }
    }

    debug!("Validated input PDF: {}", path.display());
    Ok(path)
}

/// Side-data contents, or `""` when no path was given.
pub async fn read_side_data(path: Option<&Path>) -> Result<String, Pdf2HtmlError> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Pdf2HtmlError::SideDataUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Loaded {} bytes of side data from {}", data.len(), path.display());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = validate_pdf(Path::new("/no/such/deck.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_pdf(dir.path()),
            Err(Pdf2HtmlError::FileNotFound { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        match validate_pdf(&path) {
            Err(Pdf2HtmlError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn short_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.pdf");
        std::fs::write(&path, b"%P").unwrap();
        assert!(matches!(validate_pdf(&path), Err(Pdf2HtmlError::NotAPdf { .. })));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(validate_pdf(&path).unwrap(), path);
    }

    #[tokio::test]
    async fn side_data_absent_is_empty() {
        assert_eq!(read_side_data(None).await.unwrap(), "");
    }

    #[tokio::test]
    async fn side_data_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "name,value\nrevenue,12\n").unwrap();
        assert_eq!(
            read_side_data(Some(&path)).await.unwrap(),
            "name,value\nrevenue,12\n"
        );
    }

    #[tokio::test]
    async fn side_data_missing_is_fatal() {
        let err = read_side_data(Some(Path::new("/no/such.csv"))).await.unwrap_err();
        assert!(matches!(err, Pdf2HtmlError::SideDataUnreadable { .. }));
    }
}
