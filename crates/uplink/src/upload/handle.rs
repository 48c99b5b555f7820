//! # Upload Handle
//!
//! Per-upload state: status, progress fan-out, terminal observers and the
//! cleanup hook the registry uses to deregister the upload.
//!
//! Observers and cleanup closures are always invoked with the internal lock
//! released, so they may call back into the handle or the registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::key::Fingerprint;
use crate::upload::transport::UploadResponse;

/// Status of an upload as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Suspended,
    Uploading,
    Complete,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Suspended => write!(f, "suspended"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Terminal result delivered to response observers
pub type UploadOutcome = Result<UploadResponse, TransportError>;

type ProgressObserver = Arc<dyn Fn(f64) + Send + Sync>;
type ResponseObserver = Box<dyn FnOnce(UploadOutcome) + Send>;
type Cleanup = Box<dyn FnOnce(&UploadHandle) + Send>;

#[derive(Default)]
struct HandleState {
    progress: f64,
    progress_observers: Vec<ProgressObserver>,
    response_observers: Vec<ResponseObserver>,
    outcome: Option<UploadOutcome>,
    cleanup: Option<Cleanup>,
    cleaned_up: bool,
}

struct HandleInner {
    fingerprint: Fingerprint,
    status: watch::Sender<UploadStatus>,
    state: Mutex<HandleState>,
    cancel: CancellationToken,
}

/// Shared handle to one registered upload.
///
/// Cloning is cheap; all clones observe the same upload.
#[derive(Clone)]
pub struct UploadHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadHandle")
            .field("fingerprint", &self.inner.fingerprint)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish()
    }
}

impl UploadHandle {
    pub(crate) fn new(fingerprint: Fingerprint, cancel: CancellationToken) -> Self {
        let (status, _) = watch::channel(UploadStatus::Suspended);
        Self {
            inner: Arc::new(HandleInner {
                fingerprint,
                status,
                state: Mutex::new(HandleState::default()),
                cancel,
            }),
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.inner.fingerprint
    }

    pub fn status(&self) -> UploadStatus {
        *self.inner.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<UploadStatus> {
        self.inner.status.subscribe()
    }

    /// Last reported fraction, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.inner.state.lock().progress
    }

    /// Whether the transport has reported its terminal result
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Attach a progress observer. It receives every later update.
    pub fn on_progress<F>(&self, observer: F) -> &Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.inner
            .state
            .lock()
            .progress_observers
            .push(Arc::new(observer));
        self
    }

    /// Attach a terminal observer. If the upload has already finished it is
    /// invoked immediately with the recorded outcome.
    pub fn on_response<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(UploadOutcome) + Send + 'static,
    {
        let finished = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_none() {
                state.response_observers.push(Box::new(observer));
                return self;
            }
            state.outcome.clone()
        };
        if let Some(outcome) = finished {
            observer(outcome);
        }
        self
    }

    /// Wait for the terminal outcome
    pub async fn wait(&self) -> UploadOutcome {
        let (tx, rx) = oneshot::channel();
        self.on_response(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(Err(TransportError::Disconnected))
    }

    /// Cancel this upload's transport. The handle is deregistered once the
    /// transport reports back.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether two handles refer to the same upload
    pub fn ptr_eq(&self, other: &UploadHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_status(&self, status: UploadStatus) {
        self.inner.status.send_replace(status);
    }

    pub(crate) fn report_progress(&self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let observers = {
            let mut state = self.inner.state.lock();
            state.progress = fraction;
            state.progress_observers.clone()
        };
        for observer in observers {
            observer(fraction);
        }
    }

    /// Record the terminal outcome and notify every pending observer
    pub(crate) fn finish(&self, outcome: UploadOutcome) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.response_observers)
        };
        for observer in observers {
            observer(outcome.clone());
        }
    }

    /// Replace the cleanup hook. When cleanup has already run, the new hook
    /// runs right away.
    pub(crate) fn set_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce(&UploadHandle) + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if !state.cleaned_up {
                state.cleanup = Some(Box::new(cleanup));
                return;
            }
        }
        cleanup(self);
    }

    pub(crate) fn run_cleanup(&self) {
        let cleanup = {
            let mut state = self.inner.state.lock();
            state.cleaned_up = true;
            state.cleanup.take()
        };
        if let Some(cleanup) = cleanup {
            cleanup(self);
        }
    }
}
