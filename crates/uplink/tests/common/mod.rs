// Shared helpers for registry and transport tests
#![allow(dead_code)]

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uplink_engine::upload::{
    TransportEvent, TransportUpload, UploadRequest, UploadResponse, UploadTransport,
};
use uplink_engine::{RequestIdentity, RequestParams, TransportError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Transport whose uploads are driven by the test.
///
/// Every started upload is handed to the test as a [`ScriptedUpload`]. A
/// cancelled upload reports `TransportError::Cancelled` on its own, like a
/// real transport would.
pub struct MockTransport {
    started: mpsc::UnboundedSender<ScriptedUpload>,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedUpload>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Self { started }, rx)
    }
}

impl UploadTransport for MockTransport {
    fn start_upload(&self, request: UploadRequest) -> TransportUpload {
        let (events, upload) = TransportUpload::channel();

        let cancel = upload.cancel.clone();
        let on_cancel = events.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = on_cancel.send(TransportEvent::Finished(Err(TransportError::Cancelled)));
        });

        let _ = self.started.send(ScriptedUpload {
            request,
            events,
            cancel: upload.cancel.clone(),
        });
        upload
    }
}

pub struct ScriptedUpload {
    pub request: UploadRequest,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub cancel: CancellationToken,
}

impl ScriptedUpload {
    pub fn progress(&self, fraction: f64) {
        let _ = self.events.send(TransportEvent::Progress(fraction));
    }

    pub fn succeed(&self, body: &'static [u8]) {
        let _ = self.events.send(TransportEvent::Finished(Ok(UploadResponse {
            status: StatusCode::OK,
            body: Bytes::from_static(body),
        })));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.events.send(TransportEvent::Finished(Err(error)));
    }
}

pub fn identity(url: &str, uid: u64) -> RequestIdentity {
    let params = RequestParams::new()
        .with("uid", uid)
        .unwrap()
        .with("album", "trip")
        .unwrap();
    RequestIdentity::new(url).with_params(params)
}
