//! # HTTP Transport
//!
//! reqwest-backed [`UploadTransport`]. Bodies are streamed in chunks and a
//! progress event is emitted as each chunk is pulled by the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use rustls::ClientConfig;
use rustls::crypto::aws_lc_rs;
use rustls_platform_verifier::BuilderVerifierExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use url::Url;

use crate::TransportConfig;
use crate::error::TransportError;
use crate::upload::transport::{
    MultipartPayload, TransportEvent, TransportUpload, UploadBody, UploadRequest, UploadResponse,
    UploadTransport,
};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, TransportError> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Build(format!("TLS protocol versions: {e}")))?
        .with_platform_verifier()
        .map_err(|e| TransportError::Build(format!("platform verifier: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if config.use_system_proxy {
        info!("Using system proxy settings for uploads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for uploads");
    }

    client_builder.build().map_err(TransportError::from)
}

/// Shared progress accounting for one upload
#[derive(Clone)]
struct ProgressTracker {
    sent: Arc<AtomicU64>,
    total: u64,
    events: UnboundedSender<TransportEvent>,
}

impl ProgressTracker {
    fn new(total: u64, events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            sent: Arc::new(AtomicU64::new(0)),
            total,
            events,
        }
    }

    fn advance(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let fraction = if self.total == 0 {
            1.0
        } else {
            (sent as f64 / self.total as f64).min(1.0)
        };
        let _ = self.events.send(TransportEvent::Progress(fraction));
    }

    /// Stream `data` in `chunk_size` pieces, reporting each piece as sent
    fn stream(
        &self,
        data: Bytes,
        chunk_size: usize,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
            .collect();
        let tracker = self.clone();
        futures::stream::iter(chunks).map(move |chunk| {
            tracker.advance(chunk.len() as u64);
            Ok(chunk)
        })
    }
}

/// HTTP upload transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = create_client(&config)?;
        Ok(Self { client, config })
    }

    /// Use an existing client; `config` only supplies the chunk size
    pub fn with_client(client: Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    fn build_form(
        form: MultipartPayload,
        tracker: &ProgressTracker,
        chunk_size: usize,
    ) -> Result<Form, TransportError> {
        let mut multipart = Form::new();
        for (key, value) in form.fields {
            multipart = multipart.text(key, value);
        }
        for file in form.files {
            let len = file.data.len() as u64;
            let body = Body::wrap_stream(tracker.stream(file.data, chunk_size));
            let mut part = Part::stream_with_length(body, len);
            if let Some(file_name) = file.file_name {
                part = part.file_name(file_name);
            }
            if let Some(mime) = file.mime {
                part = part
                    .mime_str(&mime)
                    .map_err(|e| TransportError::Build(format!("invalid mime '{mime}': {e}")))?;
            }
            multipart = multipart.part(file.name, part);
        }
        Ok(multipart)
    }

    async fn perform(
        client: Client,
        chunk_size: usize,
        request: UploadRequest,
        events: UnboundedSender<TransportEvent>,
    ) -> Result<UploadResponse, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", request.url)))?;

        let tracker = ProgressTracker::new(request.body.progress_len(), events);
        let mut builder = client
            .request(request.method, url.clone())
            .headers(request.headers);

        builder = match request.body {
            UploadBody::Bytes(data) => {
                if data.is_empty() {
                    tracker.advance(0);
                }
                let len = data.len();
                builder
                    .header(reqwest::header::CONTENT_LENGTH, len)
                    .body(Body::wrap_stream(tracker.stream(data, chunk_size)))
            }
            UploadBody::Multipart(form) => {
                if form.files.is_empty() {
                    tracker.advance(0);
                }
                builder.multipart(Self::build_form(form, &tracker, chunk_size)?)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Upload rejected by server");
            return Err(TransportError::Status(status));
        }

        let body = response.bytes().await?;
        debug!(url = %url, status = %status, bytes = body.len(), "Upload finished");
        Ok(UploadResponse { status, body })
    }
}

impl UploadTransport for HttpTransport {
    fn start_upload(&self, request: UploadRequest) -> TransportUpload {
        let (events, upload) = TransportUpload::channel();
        let cancel = upload.cancel.clone();
        let client = self.client.clone();
        let chunk_size = self.config.chunk_size;

        tokio::spawn(async move {
            let url = request.url.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(url = %url, "Upload cancelled");
                    Err(TransportError::Cancelled)
                }
                result = Self::perform(client, chunk_size, request, events.clone()) => result,
            };
            let _ = events.send(TransportEvent::Finished(result));
        });

        upload
    }
}
