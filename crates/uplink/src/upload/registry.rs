//! # Upload Registry
//!
//! Maps request fingerprints to live [`UploadHandle`]s so that any caller able
//! to rebuild a request's identity can observe, cancel or delete its upload.
//!
//! Each registered upload is owned by one driver task. The driver forwards
//! transport progress to the handle, reacts to cancellation broadcasts and
//! lifecycle events, and on the terminal event updates the status, memoizes
//! a completion record on success and runs the handle's cleanup, which
//! removes it from the table.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::{CancelScope, RegistryConfig, RestartPolicy, UploadOptions};
use crate::error::TransportError;
use crate::key::{Fingerprint, RequestIdentity, derive_key};
use crate::upload::handle::{UploadHandle, UploadOutcome, UploadStatus};
use crate::upload::transport::{
    TransportEvent, TransportUpload, UploadBody, UploadRequest, UploadTransport,
};

/// Application lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host is about to lose focus; every running upload is cancelled
    WillResignActive,
}

/// Broadcast emitted by [`UploadRegistry::cancel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSignal {
    /// Fingerprint the cancel was issued for
    pub origin: Fingerprint,
}

struct RegistryInner {
    table: Mutex<HashMap<Fingerprint, UploadHandle>>,
    transport: Arc<dyn UploadTransport>,
    cache: CacheStore,
    cancellations: broadcast::Sender<CancelSignal>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    config: RegistryConfig,
}

impl RegistryInner {
    /// Remove `handle` from the table if it is still the registered one
    fn deregister(&self, handle: &UploadHandle) -> bool {
        let mut table = self.table.lock();
        match table.get(handle.fingerprint()) {
            Some(current) if current.ptr_eq(handle) => {
                table.remove(handle.fingerprint());
                true
            }
            _ => false,
        }
    }
}

fn deregister_with(inner: Weak<RegistryInner>) -> impl FnOnce(&UploadHandle) + Send + 'static {
    move |handle| {
        let removed = inner
            .upgrade()
            .is_some_and(|inner| inner.deregister(handle));
        if removed {
            debug!(fingerprint = %handle.fingerprint(), "Upload deregistered");
        }
    }
}

/// Registry of in-flight uploads keyed by fingerprint.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct UploadRegistry {
    inner: Arc<RegistryInner>,
}

impl UploadRegistry {
    pub fn new<T: UploadTransport>(transport: T, cache: CacheStore) -> Self {
        Self::with_config(transport, cache, RegistryConfig::default())
    }

    pub fn with_config<T: UploadTransport>(
        transport: T,
        cache: CacheStore,
        config: RegistryConfig,
    ) -> Self {
        let capacity = config.broadcast_capacity.max(1);
        let (cancellations, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RegistryInner {
                table: Mutex::new(HashMap::new()),
                transport: Arc::new(transport),
                cache,
                cancellations,
                lifecycle,
                config,
            }),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Start uploading `body` and register the upload under the identity's
    /// fingerprint. Dynamic parameters are not consulted here.
    ///
    /// What happens when the fingerprint already has a live upload is decided
    /// by [`RestartPolicy`]. Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        identity: &RequestIdentity,
        body: impl Into<UploadBody>,
        options: UploadOptions,
    ) -> UploadHandle {
        let key = derive_key(&identity.url, identity.params.as_ref(), None);
        let request = UploadRequest {
            url: identity.url.clone(),
            method: options.method,
            headers: options.headers,
            body: body.into(),
        };

        // Transports start without blocking, so the lookup, start and insert
        // happen as one step. The driver subscribes before the handle becomes
        // visible so no cancellation sent after the insert is missed.
        let (handle, upload, replaced, cancellations, lifecycle) = {
            let mut table = self.inner.table.lock();
            let existing = table.get(&key).cloned();
            if let Some(existing) = &existing {
                if self.inner.config.restart_policy == RestartPolicy::ReuseExisting {
                    debug!(fingerprint = %key, "Reusing live upload");
                    return existing.clone();
                }
            }

            let upload = self.inner.transport.start_upload(request);
            let handle = UploadHandle::new(key.clone(), upload.cancel.clone());
            handle.set_status(UploadStatus::Uploading);
            handle.set_cleanup(deregister_with(Arc::downgrade(&self.inner)));
            let cancellations = self.inner.cancellations.subscribe();
            let lifecycle = self.inner.lifecycle.subscribe();
            table.insert(key.clone(), handle.clone());
            (handle, upload, existing, cancellations, lifecycle)
        };

        if let Some(previous) = replaced {
            match self.inner.config.restart_policy {
                RestartPolicy::CancelAndReplace => {
                    debug!(fingerprint = %key, "Cancelling replaced upload");
                    previous.cancel();
                }
                _ => warn!(
                    fingerprint = %key,
                    "Upload already registered for this fingerprint, replacing it"
                ),
            }
        }

        let driver = Driver {
            handle: handle.clone(),
            upload,
            cancellations,
            lifecycle,
            cache: self.inner.cache.clone(),
            scope: self.inner.config.cancel_scope,
        };
        tokio::spawn(driver.run());

        debug!(fingerprint = %key, url = %identity.url, "Upload started");
        handle
    }

    /// Live handle registered for `identity`
    pub fn handle(&self, identity: &RequestIdentity) -> Option<UploadHandle> {
        self.lookup(&identity.fingerprint())
    }

    fn lookup(&self, key: &Fingerprint) -> Option<UploadHandle> {
        self.inner.table.lock().get(key).cloned()
    }

    /// Cancel the upload for `identity` and broadcast the cancellation.
    ///
    /// The handle stays registered until its transport reports back.
    pub fn cancel(&self, identity: &RequestIdentity) {
        let key = identity.fingerprint();
        match self.lookup(&key) {
            Some(handle) => handle.cancel(),
            None => debug!(fingerprint = %key, "No live upload to cancel"),
        }
        let _ = self.inner.cancellations.send(CancelSignal { origin: key });
    }

    /// Cancel every live upload
    pub fn cancel_all(&self) {
        let handles: Vec<UploadHandle> = self.inner.table.lock().values().cloned().collect();
        debug!(count = handles.len(), "Cancelling all uploads");
        for handle in handles {
            handle.cancel();
        }
    }

    /// Cancel and deregister the upload for `identity`, then call
    /// `on_done(true)`. When nothing is registered `on_done` is never called.
    pub fn delete<F>(&self, identity: &RequestIdentity, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let key = identity.fingerprint();
        let Some(handle) = self.lookup(&key) else {
            debug!(fingerprint = %key, "No live upload to delete");
            return;
        };

        let deregister = deregister_with(Arc::downgrade(&self.inner));
        handle.set_cleanup(move |handle| {
            deregister(handle);
            on_done(true);
        });
        handle.cancel();
    }

    /// Future form of [`UploadRegistry::delete`]. Resolves to `false` when
    /// nothing was registered.
    pub async fn delete_async(&self, identity: &RequestIdentity) -> bool {
        let (tx, rx) = oneshot::channel();
        self.delete(identity, move |done| {
            let _ = tx.send(done);
        });
        rx.await.unwrap_or(false)
    }

    /// Status for `identity`. A memoized completion record wins over any live
    /// handle; without either the upload is `Suspended`.
    pub fn status(&self, identity: &RequestIdentity) -> UploadStatus {
        let key = identity.fingerprint();
        if self.inner.cache.is_complete(&key) {
            return UploadStatus::Complete;
        }
        self.lookup(&key)
            .map(|handle| handle.status())
            .unwrap_or_default()
    }

    /// Attach `observer` to the live upload for `identity`. Without one the
    /// observer is called once with `0.0` and `None` is returned.
    pub fn progress<F>(&self, identity: &RequestIdentity, observer: F) -> Option<UploadHandle>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        match self.lookup(&identity.fingerprint()) {
            Some(handle) => {
                handle.on_progress(observer);
                Some(handle)
            }
            None => {
                observer(0.0);
                None
            }
        }
    }

    pub fn contains(&self, identity: &RequestIdentity) -> bool {
        self.inner
            .table
            .lock()
            .contains_key(&identity.fingerprint())
    }

    pub fn len(&self) -> usize {
        self.inner.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.lock().is_empty()
    }

    /// Deliver a lifecycle event to every running upload
    pub fn notify_lifecycle(&self, event: LifecycleEvent) {
        debug!(?event, "Lifecycle event");
        let _ = self.inner.lifecycle.send(event);
    }

    pub fn subscribe_cancellations(&self) -> broadcast::Receiver<CancelSignal> {
        self.inner.cancellations.subscribe()
    }
}

/// Owns one upload from start to its terminal event
struct Driver {
    handle: UploadHandle,
    upload: TransportUpload,
    cancellations: broadcast::Receiver<CancelSignal>,
    lifecycle: broadcast::Receiver<LifecycleEvent>,
    cache: CacheStore,
    scope: CancelScope,
}

impl Driver {
    fn applies_to(&self, signal: &CancelSignal) -> bool {
        match self.scope {
            CancelScope::Global => true,
            CancelScope::PerKey => &signal.origin == self.handle.fingerprint(),
        }
    }

    async fn run(mut self) {
        let key = self.handle.fingerprint().clone();
        let mut cancellations_open = true;
        let mut lifecycle_open = true;

        let outcome: UploadOutcome = loop {
            tokio::select! {
                biased;

                signal = self.cancellations.recv(), if cancellations_open => match signal {
                    Ok(signal) => {
                        if self.applies_to(&signal) {
                            debug!(fingerprint = %key, origin = %signal.origin, "Upload suspended by cancellation");
                            self.handle.set_status(UploadStatus::Suspended);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(fingerprint = %key, skipped, "Missed cancellation signals");
                        if self.scope == CancelScope::Global {
                            self.handle.set_status(UploadStatus::Suspended);
                        }
                    }
                    Err(RecvError::Closed) => cancellations_open = false,
                },

                event = self.lifecycle.recv(), if lifecycle_open => match event {
                    Ok(LifecycleEvent::WillResignActive) | Err(RecvError::Lagged(_)) => {
                        debug!(fingerprint = %key, "Cancelling upload on lifecycle event");
                        self.handle.cancel();
                    }
                    Err(RecvError::Closed) => lifecycle_open = false,
                },

                event = self.upload.events.recv() => match event {
                    Some(TransportEvent::Progress(fraction)) => self.handle.report_progress(fraction),
                    Some(TransportEvent::Finished(result)) => break result,
                    None => break Err(TransportError::Disconnected),
                },
            }
        };

        match &outcome {
            Ok(response) => {
                let entry = CacheEntry::completion(response.body.clone());
                if !self.cache.set(key.clone(), entry).await.unwrap_or(false) {
                    warn!(fingerprint = %key, "Failed to record upload completion");
                }
                self.handle.report_progress(1.0);
                self.handle.set_status(UploadStatus::Complete);
                debug!(fingerprint = %key, status = %response.status, "Upload complete");
            }
            Err(e) => {
                self.handle.set_status(UploadStatus::Suspended);
                if e.is_cancelled() {
                    debug!(fingerprint = %key, "Upload cancelled");
                } else {
                    warn!(fingerprint = %key, error = %e, "Upload failed");
                }
            }
        }

        self.handle.run_cleanup();
        self.handle.finish(outcome);
    }
}
