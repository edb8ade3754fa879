//! Wire types shared by every service

pub mod attached;
pub mod envelope;
pub mod status;
pub mod store;
pub mod transfer;

pub use attached::AttachedFile;
pub use envelope::{AcceptedResult, ErrorField, PangeaResponse, RawEnvelope, ResponseHeader};
pub use status::ResponseStatus;
pub use transfer::{TransferMethod, TransferRequest, Transferable};
