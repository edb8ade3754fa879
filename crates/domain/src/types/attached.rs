//! Files delivered alongside a multipart response

/// One non-envelope part of a multipart response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl AttachedFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self { filename: filename.into(), content_type: content_type.into(), content }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
