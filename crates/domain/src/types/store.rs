//! Object store schemas
//!
//! Request and result types of the `store` service, the reference consumer
//! of the dispatch primitives: `put` uploads, `get` and `get_archive`
//! download, `list` filters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::transfer::{TransferMethod, TransferRequest, Transferable};
use crate::filter::{FilterDocument, RangeField, StringField};
use crate::impl_wire_name_conversions;

/// A stored object or folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_url: Option<String>,
}

/// Body of `v1beta/put`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    #[serde(flatten)]
    pub transfer: TransferRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

impl PutRequest {
    pub fn new(transfer_method: TransferMethod) -> Self {
        Self {
            transfer: TransferRequest::new(transfer_method),
            name: None,
            path: None,
            parent_id: None,
            mimetype: None,
            metadata: BTreeMap::new(),
            tags: Vec::new(),
            config_id: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Transferable for PutRequest {
    fn transfer_request(&self) -> &TransferRequest {
        &self.transfer
    }

    fn transfer_request_mut(&mut self) -> &mut TransferRequest {
        &mut self.transfer
    }

    fn declared_mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }
}

/// Result of `v1beta/put`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResult {
    pub object: StoreObject,
}

/// Body of `v1beta/get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_method: Option<TransferMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

/// Result of `v1beta/get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    pub object: StoreObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_url: Option<String>,
}

/// Archive container produced by `get_archive`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

impl_wire_name_conversions!(ArchiveFormat {
    Zip => "zip",
    Tar => "tar",
});

/// Body of `v1beta/get_archive`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetArchiveRequest {
    pub ids: Vec<String>,
    pub format: ArchiveFormat,
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

/// Result of `v1beta/get_archive`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetArchiveResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_url: Option<String>,
    #[serde(default)]
    pub count: u32,
}

/// Typed filter for `v1beta/list`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ListFilter {
    doc: FilterDocument,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    pub fn folder(&mut self) -> StringField<'_> {
        self.doc.string_field("folder")
    }

    pub fn name(&mut self) -> StringField<'_> {
        self.doc.string_field("name")
    }

    pub fn parent_id(&mut self) -> StringField<'_> {
        self.doc.string_field("parent_id")
    }

    pub fn object_type(&mut self) -> StringField<'_> {
        self.doc.string_field("type")
    }

    pub fn tags(&mut self) -> StringField<'_> {
        self.doc.string_field("tags")
    }

    pub fn created_at(&mut self) -> RangeField<'_> {
        self.doc.range_field("created_at")
    }

    pub fn updated_at(&mut self) -> RangeField<'_> {
        self.doc.range_field("updated_at")
    }

    pub fn size(&mut self) -> RangeField<'_> {
        self.doc.range_field("size")
    }
}

/// Sort direction for `v1beta/list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

/// Body of `v1beta/list`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListRequest {
    #[serde(skip_serializing_if = "ListFilter::is_empty")]
    pub filter: ListFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<ListOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}

/// Result of `v1beta/list`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(default)]
    pub objects: Vec<StoreObject>,
}
