//! # Upload Transport
//!
//! The seam between the registry and whatever actually moves bytes. A
//! transport starts an upload and hands back a stream of [`TransportEvent`]s
//! plus a [`CancellationToken`]. It must emit exactly one
//! [`TransportEvent::Finished`], including after cancellation.

use bytes::Bytes;
use chrono::Local;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::key::{RequestParams, render_value};

/// Form field name used for image parts
pub const IMAGE_FIELD_NAME: &str = "fileupload";

/// A named binary part of a multipart body
#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub data: Bytes,
}

/// Multipart body: ordinary text fields plus binary parts
#[derive(Debug, Clone, Default)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn with_file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Build a JPEG image upload form.
    ///
    /// Every parameter becomes a text field (sorted by key, rendered like in a
    /// fingerprint) and every image a `fileupload` part named
    /// `yyyyMMddHHmmss{index}.jpg`.
    pub fn from_images(params: Option<&RequestParams>, images: Vec<Bytes>) -> Self {
        let fields = params
            .map(|p| {
                p.sorted()
                    .into_iter()
                    .map(|(k, v)| (k.clone(), render_value(v)))
                    .collect()
            })
            .unwrap_or_default();

        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        let files = images
            .into_iter()
            .enumerate()
            .map(|(index, data)| FilePart {
                name: IMAGE_FIELD_NAME.to_owned(),
                file_name: Some(format!("{stamp}{index}.jpg")),
                mime: Some("image/jpeg".to_owned()),
                data,
            })
            .collect();

        Self { fields, files }
    }

    /// Bytes of binary parts, the quantity progress is measured against
    pub fn file_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }
}

/// Payload of an upload
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Bytes),
    Multipart(MultipartPayload),
}

impl UploadBody {
    /// Total number of bytes that progress is reported against
    pub fn progress_len(&self) -> u64 {
        match self {
            UploadBody::Bytes(data) => data.len() as u64,
            UploadBody::Multipart(form) => form.file_bytes(),
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(data: Bytes) -> Self {
        UploadBody::Bytes(data)
    }
}

impl From<Vec<u8>> for UploadBody {
    fn from(data: Vec<u8>) -> Self {
        UploadBody::Bytes(Bytes::from(data))
    }
}

impl From<MultipartPayload> for UploadBody {
    fn from(form: MultipartPayload) -> Self {
        UploadBody::Multipart(form)
    }
}

/// Everything a transport needs to perform one upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: UploadBody,
}

/// Successful terminal response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Events emitted by a running transport upload
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Fraction of the payload sent, in `[0, 1]`
    Progress(f64),
    /// Terminal result; nothing follows it
    Finished(Result<UploadResponse, TransportError>),
}

/// A started transport upload
#[derive(Debug)]
pub struct TransportUpload {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub cancel: CancellationToken,
}

impl TransportUpload {
    /// Create the channel pair for a new upload. The sender side goes to the
    /// task doing the work.
    pub fn channel() -> (mpsc::UnboundedSender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                events: rx,
                cancel: CancellationToken::new(),
            },
        )
    }
}

/// Something that can start uploads
pub trait UploadTransport: Send + Sync + 'static {
    /// Begin uploading `request`. Work happens in the background; this call
    /// must not block.
    fn start_upload(&self, request: UploadRequest) -> TransportUpload;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_form_layout() {
        let params = RequestParams::new()
            .with("uid", 7)
            .unwrap()
            .with("album", "trip")
            .unwrap();
        let form = MultipartPayload::from_images(
            Some(&params),
            vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")],
        );

        assert_eq!(
            form.fields,
            vec![
                ("album".to_owned(), "trip".to_owned()),
                ("uid".to_owned(), "7".to_owned())
            ]
        );
        assert_eq!(form.files.len(), 2);
        assert!(form.files.iter().all(|f| f.name == IMAGE_FIELD_NAME));
        let first = form.files[0].file_name.as_deref().unwrap();
        assert_eq!(first.len(), "yyyyMMddHHmmss0.jpg".len());
        assert!(first.ends_with("0.jpg"));
        assert!(form.files[1].file_name.as_deref().unwrap().ends_with("1.jpg"));
        assert_eq!(UploadBody::from(form).progress_len(), 5);
    }
}
