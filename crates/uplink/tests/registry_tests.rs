// Upload registry behaviour against a scripted transport

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use common::{MockTransport, ScriptedUpload, identity, init_tracing};
use tokio::sync::mpsc;
use uplink_engine::cache::PERCENT_KEY;
use uplink_engine::{
    CacheStore, CancelScope, LifecycleEvent, RegistryConfig, RequestIdentity, RequestParams,
    RestartPolicy, TransportError, UploadOptions, UploadRegistry, UploadStatus, derive_key,
};

fn registry() -> (UploadRegistry, mpsc::UnboundedReceiver<ScriptedUpload>) {
    registry_with(RegistryConfig::default())
}

fn registry_with(
    config: RegistryConfig,
) -> (UploadRegistry, mpsc::UnboundedReceiver<ScriptedUpload>) {
    init_tracing();
    let (transport, started) = MockTransport::new();
    let registry = UploadRegistry::with_config(transport, CacheStore::in_memory(), config);
    (registry, started)
}

fn payload() -> Bytes {
    Bytes::from_static(b"jpeg bytes")
}

#[tokio::test]
async fn test_upload_progress_then_complete_then_absent() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 7);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    let upload = started.recv().await.unwrap();
    assert_eq!(upload.request.url, "http://up.example/img");
    assert_eq!(upload.request.method, reqwest::Method::POST);
    assert_eq!(registry.status(&id), UploadStatus::Uploading);
    assert!(registry.contains(&id));

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let attached = registry.progress(&id, move |p| {
        let _ = seen_tx.send(p);
    });
    assert!(attached.unwrap().ptr_eq(&handle));

    upload.progress(0.4);
    assert_eq!(seen_rx.recv().await, Some(0.4));
    assert_eq!(handle.progress(), 0.4);

    upload.succeed(b"stored");
    let response = handle.wait().await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"stored"));

    assert_eq!(handle.status(), UploadStatus::Complete);
    assert_eq!(registry.status(&id), UploadStatus::Complete);
    assert!(!registry.contains(&id));
    assert!(registry.is_empty());

    let record = registry.cache().get(&id.fingerprint()).unwrap();
    assert_eq!(record.data, Some(Bytes::from_static(b"stored")));
    assert_eq!(record.part(PERCENT_KEY).unwrap().as_ref(), b"1");
}

#[tokio::test]
async fn test_failed_upload_is_suspended_and_removed() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 1);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    let upload = started.recv().await.unwrap();
    upload.fail(TransportError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));

    let outcome = handle.wait().await;
    assert!(matches!(outcome, Err(TransportError::Status(_))));
    assert_eq!(handle.status(), UploadStatus::Suspended);
    assert_eq!(registry.status(&id), UploadStatus::Suspended);
    assert!(!registry.contains(&id));
    assert!(registry.cache().get(&id.fingerprint()).is_none());
}

#[tokio::test]
async fn test_cancel_stops_transport_and_deregisters() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 2);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    let upload = started.recv().await.unwrap();

    registry.cancel(&id);
    assert!(upload.cancel.is_cancelled());

    let outcome = handle.wait().await;
    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(registry.status(&id), UploadStatus::Suspended);
    assert!(!registry.contains(&id));
}

#[tokio::test]
async fn test_cancel_broadcast_suspends_untargeted_upload() {
    let (registry, mut started) = registry();
    let a = identity("http://up.example/a", 1);
    let b = identity("http://up.example/b", 1);

    let handle_a = registry.start(&a, payload(), UploadOptions::default());
    let _upload_a = started.recv().await.unwrap();
    let handle_b = registry.start(&b, payload(), UploadOptions::default());
    let upload_b = started.recv().await.unwrap();

    let mut signals = registry.subscribe_cancellations();
    registry.cancel(&a);
    assert_eq!(signals.recv().await.unwrap().origin, a.fingerprint());

    let mut status_b = handle_b.subscribe_status();
    status_b
        .wait_for(|s| *s == UploadStatus::Suspended)
        .await
        .unwrap();

    // Only the status of the untargeted upload changes
    assert!(!upload_b.cancel.is_cancelled());
    assert!(registry.contains(&b));
    assert_eq!(registry.status(&b), UploadStatus::Suspended);

    assert!(handle_a.wait().await.is_err());
    upload_b.succeed(b"ok");
    assert!(handle_b.wait().await.is_ok());
    assert_eq!(registry.status(&b), UploadStatus::Complete);
}

#[tokio::test]
async fn test_cancel_from_other_thread_right_after_start_is_observed() {
    let (registry, mut started) = registry();
    let a = identity("http://up.example/a", 1);
    let b = identity("http://up.example/b", 1);

    let handle_a = registry.start(&a, payload(), UploadOptions::default());
    let _upload_a = started.recv().await.unwrap();

    // The driver for `b` has not been polled when the signal goes out
    let handle_b = registry.start(&b, payload(), UploadOptions::default());
    let remote = registry.clone();
    let target = a.clone();
    std::thread::spawn(move || remote.cancel(&target))
        .join()
        .unwrap();

    let upload_b = started.recv().await.unwrap();
    let mut status_b = handle_b.subscribe_status();
    status_b
        .wait_for(|s| *s == UploadStatus::Suspended)
        .await
        .unwrap();
    assert!(!upload_b.cancel.is_cancelled());
    assert!(handle_a.wait().await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_per_key_scope_leaves_other_uploads_running() {
    let (registry, mut started) =
        registry_with(RegistryConfig::default().with_cancel_scope(CancelScope::PerKey));
    let a = identity("http://up.example/a", 1);
    let b = identity("http://up.example/b", 1);

    let handle_a = registry.start(&a, payload(), UploadOptions::default());
    let _upload_a = started.recv().await.unwrap();
    let handle_b = registry.start(&b, payload(), UploadOptions::default());
    let upload_b = started.recv().await.unwrap();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    handle_b.on_progress(move |p| {
        let _ = seen_tx.send(p);
    });

    registry.cancel(&a);
    // The driver handles the earlier broadcast before this progress update
    upload_b.progress(0.5);
    assert_eq!(seen_rx.recv().await, Some(0.5));

    assert_eq!(handle_b.status(), UploadStatus::Uploading);
    assert!(handle_a.wait().await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_unknown_key_defaults() {
    let (registry, _started) = registry();
    let id = identity("http://up.example/missing", 9);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handle = registry.progress(&id, move |p| {
        assert_eq!(p, 0.0);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(handle.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(registry.status(&id), UploadStatus::Suspended);
    registry.cancel(&id);

    let called = Arc::new(AtomicUsize::new(0));
    let counter = called.clone();
    registry.delete(&id, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(!registry.delete_async(&id).await);
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_delete_cancels_and_reports_done() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 3);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    let upload = started.recv().await.unwrap();

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    registry.delete(&id, move |done| {
        let _ = done_tx.send(done);
    });

    assert!(done_rx.await.unwrap());
    assert!(upload.cancel.is_cancelled());
    assert!(!registry.contains(&id));
    assert!(handle.wait().await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_delete_async_resolves_true_for_live_upload() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 4);

    registry.start(&id, payload(), UploadOptions::default());
    let _upload = started.recv().await.unwrap();

    assert!(registry.delete_async(&id).await);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_replace_policy_keeps_newest_registration() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 5);

    let first = registry.start(&id, payload(), UploadOptions::default());
    let first_upload = started.recv().await.unwrap();
    let second = registry.start(&id, payload(), UploadOptions::default());
    let _second_upload = started.recv().await.unwrap();

    assert!(!first.ptr_eq(&second));
    assert!(registry.handle(&id).unwrap().ptr_eq(&second));
    assert_eq!(registry.len(), 1);

    // The replaced upload finishing must not remove its successor
    first_upload.fail(TransportError::Disconnected);
    assert!(first.wait().await.is_err());
    assert!(registry.handle(&id).unwrap().ptr_eq(&second));
}

#[tokio::test]
async fn test_reuse_existing_policy_returns_live_handle() {
    let (registry, mut started) = registry_with(
        RegistryConfig::default().with_restart_policy(RestartPolicy::ReuseExisting),
    );
    let id = identity("http://up.example/img", 5);

    let first = registry.start(&id, payload(), UploadOptions::default());
    let _upload = started.recv().await.unwrap();
    let again = registry.start(&id, payload(), UploadOptions::default());

    assert!(first.ptr_eq(&again));
    assert!(started.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_and_replace_policy_cancels_previous() {
    let (registry, mut started) = registry_with(
        RegistryConfig::default().with_restart_policy(RestartPolicy::CancelAndReplace),
    );
    let id = identity("http://up.example/img", 5);

    let first = registry.start(&id, payload(), UploadOptions::default());
    let first_upload = started.recv().await.unwrap();
    let second = registry.start(&id, payload(), UploadOptions::default());
    let second_upload = started.recv().await.unwrap();

    assert!(first_upload.cancel.is_cancelled());
    assert!(!second_upload.cancel.is_cancelled());
    assert!(first.wait().await.unwrap_err().is_cancelled());
    assert!(registry.handle(&id).unwrap().ptr_eq(&second));
}

#[tokio::test]
async fn test_lifecycle_event_cancels_running_uploads() {
    let (registry, mut started) = registry();
    let a = identity("http://up.example/a", 1);
    let b = identity("http://up.example/b", 2);

    let handle_a = registry.start(&a, payload(), UploadOptions::default());
    let upload_a = started.recv().await.unwrap();
    let handle_b = registry.start(&b, payload(), UploadOptions::default());
    let upload_b = started.recv().await.unwrap();

    registry.notify_lifecycle(LifecycleEvent::WillResignActive);

    assert!(handle_a.wait().await.unwrap_err().is_cancelled());
    assert!(handle_b.wait().await.unwrap_err().is_cancelled());
    assert!(upload_a.cancel.is_cancelled());
    assert!(upload_b.cancel.is_cancelled());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_cancel_all_drains_table() {
    let (registry, mut started) = registry();
    let mut handles = Vec::new();
    for uid in 0..3 {
        let id = identity("http://up.example/img", uid);
        handles.push(registry.start(&id, payload(), UploadOptions::default()));
        let _ = started.recv().await.unwrap();
    }
    assert_eq!(registry.len(), 3);

    registry.cancel_all();
    for handle in &handles {
        assert!(handle.wait().await.unwrap_err().is_cancelled());
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_start_keys_on_full_parameter_set() {
    let (registry, mut started) = registry();
    let params = RequestParams::new()
        .with("uid", 7)
        .unwrap()
        .with("ts", 1_700_000_000)
        .unwrap();
    let dynamic = RequestParams::new().with("ts", 0).unwrap();
    let id = RequestIdentity::new("http://up.example/img")
        .with_params(params.clone())
        .with_dynamic_params(dynamic);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    let _upload = started.recv().await.unwrap();

    assert_eq!(
        handle.fingerprint(),
        &derive_key("http://up.example/img", Some(&params), None)
    );
    assert!(!registry.contains(&id));

    let without_dynamic = RequestIdentity::new("http://up.example/img").with_params(params);
    assert!(registry.contains(&without_dynamic));
}

#[tokio::test]
async fn test_late_response_observer_sees_outcome() {
    let (registry, mut started) = registry();
    let id = identity("http://up.example/img", 6);

    let handle = registry.start(&id, payload(), UploadOptions::default());
    started.recv().await.unwrap().succeed(b"late");
    handle.wait().await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    handle.on_response(move |outcome| {
        let _ = tx.send(outcome.map(|r| r.body));
    });
    assert_eq!(rx.await.unwrap().unwrap(), Bytes::from_static(b"late"));
}
