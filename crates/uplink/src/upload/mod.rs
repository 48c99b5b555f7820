//! # Uploads
//!
//! Fingerprint-keyed upload tracking: a registry of live uploads, the
//! per-upload handle and the transport seam that moves the bytes.

mod handle;
pub mod http;
mod registry;
pub mod transport;

pub use handle::{UploadHandle, UploadOutcome, UploadStatus};
pub use http::{HttpTransport, create_client};
pub use registry::{CancelSignal, LifecycleEvent, UploadRegistry};
pub use transport::{
    FilePart, IMAGE_FIELD_NAME, MultipartPayload, TransportEvent, TransportUpload, UploadBody,
    UploadRequest, UploadResponse, UploadTransport,
};
