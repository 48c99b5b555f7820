use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use tracing::{debug, info, warn};
use uplink_engine::cache::PERCENT_KEY;
use uplink_engine::upload::FilePart;
use uplink_engine::{
    CacheStore, HttpTransport, MultipartPayload, RegistryConfig, RequestIdentity, TransportConfig,
    UploadBody, UploadOptions, UploadRegistry, UploadStatus,
};

use crate::cli::{RequestArgs, UploadArgs};
use crate::error::AppError;
use crate::utils::progress::UploadProgress;
use crate::utils::{format_bytes, parse_dynamic, parse_headers, parse_params};

fn identity(request: &RequestArgs) -> Result<RequestIdentity, AppError> {
    let mut identity = RequestIdentity::new(request.url.clone());
    if let Some(params) = parse_params(&request.params)? {
        identity = identity.with_params(params);
    }
    if let Some(dynamic) = parse_dynamic(&request.dynamic) {
        identity = identity.with_dynamic_params(dynamic);
    }
    Ok(identity)
}

pub fn key(request: &RequestArgs) -> Result<(), AppError> {
    let identity = identity(request)?;
    println!("{}", identity.fingerprint());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_owned())
}

fn build_body(args: &UploadArgs, identity: &RequestIdentity, data: Bytes) -> UploadBody {
    if args.image {
        return MultipartPayload::from_images(identity.params.as_ref(), vec![data]).into();
    }

    let Some(field) = &args.field else {
        return data.into();
    };

    let mut form = MultipartPayload::new();
    if let Some(params) = &identity.params {
        for (key, value) in params.sorted() {
            form = form.with_field(key.clone(), uplink_engine::key::render_value(value));
        }
    }
    form.with_file(FilePart {
        name: field.clone(),
        file_name: Some(file_name(&args.file)),
        mime: None,
        data,
    })
    .into()
}

pub async fn upload(args: UploadArgs, cache: CacheStore) -> Result<(), AppError> {
    let identity = identity(&args.request)?;
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| AppError::InvalidInput(format!("Invalid HTTP method: '{}'", args.method)))?;

    let data = Bytes::from(tokio::fs::read(&args.file).await?);
    let total = data.len() as u64;
    info!(
        file = %args.file.display(),
        size = %format_bytes(total),
        url = %identity.url,
        "Uploading"
    );

    let transport_config = TransportConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_system_proxy(!args.no_proxy)
        .build();
    let transport = HttpTransport::new(transport_config)?;
    let registry = UploadRegistry::with_config(
        transport,
        cache,
        RegistryConfig::default().with_restart_policy(args.restart_policy),
    );

    let progress = if args.no_progress {
        UploadProgress::new_disabled(total)
    } else {
        UploadProgress::new(total, format!("Uploading {}", file_name(&args.file)))
    };

    let body = build_body(&args, &identity, data);
    let options = UploadOptions::default()
        .with_method(method)
        .with_headers(parse_headers(&args.headers));
    let handle = registry.start(&identity, body, options);
    handle.on_progress(progress.observer());
    debug!(fingerprint = %handle.fingerprint(), "Upload registered");

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling upload");
            registry.cancel(&identity);
            handle.wait().await
        }
    };

    match outcome {
        Ok(response) => {
            progress.finish(format!("Uploaded {}", file_name(&args.file)));
            info!(status = %response.status, fingerprint = %handle.fingerprint(), "Upload complete");
            if !response.body.is_empty() {
                println!("{}", String::from_utf8_lossy(&response.body));
            }
            Ok(())
        }
        Err(e) => {
            progress.abandon(format!("Failed {}", file_name(&args.file)));
            Err(e.into())
        }
    }
}

pub fn status(request: &RequestArgs, cache: &CacheStore) -> Result<(), AppError> {
    let identity = identity(request)?;
    let key = identity.fingerprint();
    // Nothing is in flight in a fresh process, so only the cache can answer
    let status = if cache.is_complete(&key) {
        UploadStatus::Complete
    } else {
        debug!(fingerprint = %key, "No completion record");
        UploadStatus::Suspended
    };
    println!("{status}");
    Ok(())
}

pub async fn cache_get(request: &RequestArgs, cache: &CacheStore) -> Result<(), AppError> {
    let identity = identity(request)?;
    let key = identity.fingerprint();

    let Some(entry) = cache.get_async(&key).await else {
        println!("{key}: not cached");
        return Ok(());
    };

    println!("{key}");
    println!("  size: {}", format_bytes(entry.size()));
    if let Some(data) = &entry.data {
        println!("  data: {}", format_bytes(data.len() as u64));
    }
    if let Some(parts) = &entry.data_map {
        let mut names: Vec<&String> = parts.keys().collect();
        names.sort();
        for name in names {
            if name == PERCENT_KEY {
                continue;
            }
            println!("  part {name}: {}", format_bytes(parts[name].len() as u64));
        }
    }
    if let Some(percent) = entry.percent() {
        println!("  percent: {percent}");
    }
    Ok(())
}

pub async fn cache_clear(cache: &CacheStore) -> Result<(), AppError> {
    let cleared = cache.remove_all().await.unwrap_or(false);
    if !cleared {
        return Err(AppError::InvalidInput(format!(
            "Failed to clear cache at {}",
            cache.config().resolved_disk_path().display()
        )));
    }
    info!(dir = %cache.config().resolved_disk_path().display(), "Cache cleared");
    Ok(())
}
