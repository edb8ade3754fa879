//! Transfer-request types embedded by file endpoints

use serde::{Deserialize, Serialize};

use crate::impl_wire_name_conversions;

/// How the bytes of a file reach (or leave) the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    /// Inline `multipart/form-data` upload to the service endpoint
    Multipart,
    /// Raw PUT of the bytes to a presigned URL
    PutUrl,
    /// Form POST of the bytes to a presigned URL
    PostUrl,
    /// The service hands back a URL to download from
    DestUrl,
    /// The service fetches the bytes from a caller-provided URL
    SourceUrl,
}

impl_wire_name_conversions!(TransferMethod {
    Multipart => "multipart",
    PutUrl => "put_url",
    PostUrl => "post_url",
    DestUrl => "dest_url",
    SourceUrl => "source_url",
});

impl TransferMethod {
    /// Whether the upload primitive sends a request body for this method
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Multipart | Self::PutUrl | Self::PostUrl)
    }

    /// Whether the method needs hashes and size declared in phase 1
    pub fn requires_digest(self) -> bool {
        matches!(self, Self::PostUrl)
    }
}

/// Transfer fields flattened into file-carrying requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl TransferRequest {
    pub fn new(transfer_method: TransferMethod) -> Self {
        Self { transfer_method, crc32c: None, sha256: None, size: None }
    }

    /// True once crc32c, sha256 and size are all present
    pub fn has_digest(&self) -> bool {
        self.crc32c.is_some() && self.sha256.is_some() && self.size.is_some()
    }
}

/// Request types that embed a [`TransferRequest`]
///
/// The upload orchestrator reads the transfer method from it and fills in
/// missing hashes before phase 1.
pub trait Transferable {
    fn transfer_request(&self) -> &TransferRequest;

    fn transfer_request_mut(&mut self) -> &mut TransferRequest;

    fn transfer_method(&self) -> TransferMethod {
        self.transfer_request().transfer_method
    }

    /// Content type the request declares for the file, if any
    fn declared_mimetype(&self) -> Option<&str> {
        None
    }
}

impl Transferable for TransferRequest {
    fn transfer_request(&self) -> &TransferRequest {
        self
    }

    fn transfer_request_mut(&mut self) -> &mut TransferRequest {
        self
    }
}
