//! File sources for upload endpoints

use std::path::Path;

use pangea_domain::{PangeaError, Result};
use tokio::io::{AsyncRead, AsyncSeek};

/// Anything the upload orchestrator can hash, rewind and stream
pub trait UploadSource: AsyncRead + AsyncSeek + Unpin + Send + 'static {}

impl<T> UploadSource for T where T: AsyncRead + AsyncSeek + Unpin + Send + 'static {}

/// Multipart field carrying the file bytes on inline uploads
pub const DEFAULT_FIELD_NAME: &str = "upload";

/// A file handed to an upload endpoint
///
/// The orchestrator takes ownership and drops the source when the call
/// ends, whatever the outcome.
#[derive(Debug)]
pub struct FileUpload<S> {
    pub source: S,
    pub filename: String,
    pub field_name: String,
    pub content_type: Option<String>,
}

impl<S: UploadSource> FileUpload<S> {
    pub fn new(source: S, filename: impl Into<String>) -> Self {
        Self {
            source,
            filename: filename.into(),
            field_name: DEFAULT_FIELD_NAME.to_string(),
            content_type: None,
        }
    }

    /// Use `file` or another field name for the inline binary part
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl FileUpload<tokio::fs::File> {
    /// Open `path` for upload, naming the part after the file
    ///
    /// # Errors
    ///
    /// [`PangeaError::Io`] when the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| PangeaError::Io(format!("failed to open {}: {err}", path.display())))?;
        let filename = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |name| name.to_string_lossy().into_owned());
        Ok(Self::new(file, filename))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn open_names_part_after_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"a,b\n").unwrap();

        let upload = FileUpload::open(file.path()).await.unwrap();

        assert!(upload.filename.ends_with(".csv"));
        assert_eq!(upload.field_name, "upload");
        assert!(upload.content_type.is_none());
    }

    #[tokio::test]
    async fn open_missing_file_is_io_error() {
        let err = FileUpload::open("/definitely/not/here.bin").await.unwrap_err();
        assert_eq!(err.kind(), pangea_domain::ErrorKind::Io);
    }
}
