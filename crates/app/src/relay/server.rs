//! Actix Web surface of the relay: the upload orchestrator, the recent
//! detection status endpoint, and static serving of stored images.

use std::path::{Path, PathBuf};

use actix_cors::Cors;
use actix_files::Files;
use actix_multipart::{Multipart, MultipartError};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, http::header, middleware, web};
use anyhow::{Context, Result};
use chrono::Local;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use lookout_upstream::{
    DetectClient, DetectMode, NotifyClient, PredictionResponse, UNKNOWN_WEATHER, WeatherClient,
};

use crate::relay::config::RelayConfig;
use crate::relay::data::{
    DETECTION_QUEUE_CAPACITY, DetectionRecord, DetectionView, RECENT_DETECTIONS_LIMIT,
};
use crate::relay::queue::DetectionQueue;

/// Shared state backing the HTTP handlers.
pub(crate) struct RelayContext {
    pub(crate) queue: DetectionQueue,
    pub(crate) detect: DetectClient,
    pub(crate) notify: Option<NotifyClient>,
    pub(crate) weather: Option<WeatherClient>,
    pub(crate) storage_dir: PathBuf,
    pub(crate) subjects: Vec<String>,
}

/// Wire the upstream clients and the queue to one shared HTTP client,
/// optionally armed with a timeout.
pub(crate) fn build_context(config: &RelayConfig) -> Result<RelayContext> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.upstream_timeout {
        builder = builder.timeout(timeout);
    }
    let http = builder.build().context("failed to build HTTP client")?;

    let mode = if config.detect_upload {
        DetectMode::Upload
    } else {
        DetectMode::JsonPath
    };
    let detect = DetectClient::new(
        http.clone(),
        config.detect_url.clone(),
        config.detect_service.clone(),
        config.detect_confidence,
        mode,
    );

    let notify = match &config.webhook_url {
        Some(url) => Some(NotifyClient::new(http.clone(), url.clone())),
        None => {
            warn!("DISCORD_WEBHOOK is not set; notifications disabled");
            None
        }
    };
    let weather = match &config.weather_api_key {
        Some(key) => Some(WeatherClient::new(
            http,
            config.weather_url.clone(),
            config.weather_city.clone(),
            key.clone(),
        )),
        None => {
            warn!("OPENWEATHER_API_KEY is not set; weather reported as {UNKNOWN_WEATHER}");
            None
        }
    };

    Ok(RelayContext {
        queue: DetectionQueue::new(DETECTION_QUEUE_CAPACITY, config.storage_dir.clone()),
        detect,
        notify,
        weather,
        storage_dir: config.storage_dir.clone(),
        subjects: config.subjects.clone(),
    })
}

/// Run the relay server until the process is stopped.
pub(crate) async fn serve(config: RelayConfig) -> Result<()> {
    std::fs::create_dir_all(&config.storage_dir).with_context(|| {
        format!(
            "failed to create storage directory {}",
            config.storage_dir.display()
        )
    })?;

    let data = web::Data::new(build_context(&config)?);
    let storage_dir = config.storage_dir.clone();

    info!("listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors())
            .app_data(data.clone())
            .configure(routes)
            .service(Files::new("/image", storage_dir.clone()))
    })
    .bind(config.bind.as_str())
    .with_context(|| format!("failed to bind {}", config.bind))?
    .run()
    .await?;
    Ok(())
}

/// Route table. `/upload` is a single-method resource, so other verbs get a
/// 405 from its default service.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(upload_handler)))
        .service(web::resource("/detection").route(web::get().to(detection_handler)));
}

/// Wide-open CORS, mirroring the relay's permissive defaults.
pub(crate) fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(["GET", "POST", "PUT", "DELETE"])
        .allowed_header(header::CONTENT_TYPE)
}

/// Accept a multipart upload, run detection, and dispatch on the labels.
async fn upload_handler(
    req: HttpRequest,
    payload: Multipart,
    context: web::Data<RelayContext>,
) -> HttpResponse {
    let peer = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let (file_name, bytes) = match read_file_field(payload).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            warn!("upload from {peer} carried no usable file field");
            return HttpResponse::BadRequest().body("missing file field");
        }
        Err(err) => {
            warn!("unreadable multipart upload from {peer}: {err}");
            return HttpResponse::BadRequest().body("invalid multipart upload");
        }
    };

    let stored_name = format!("upload-{file_name}");
    let stored_path = context.storage_dir.join(&stored_name);
    if let Err(err) = tokio::fs::write(&stored_path, &bytes).await {
        error!("failed to store upload {}: {err}", stored_path.display());
        return HttpResponse::InternalServerError().body("failed to store upload");
    }
    info!("stored {stored_name} ({} bytes) from {peer}", bytes.len());

    let response = match context.detect.detect(&stored_name, &stored_path).await {
        Ok(response) => response,
        Err(err) => {
            error!("detection failed for {stored_name}: {err}");
            remove_stored(&stored_path).await;
            return HttpResponse::InternalServerError().body("object detection failed");
        }
    };

    if subject_match(&response, &context.subjects) {
        info!("subject of interest in {stored_name}");
        match &context.notify {
            Some(notify) => match notify.send_image(&stored_path).await {
                Ok(()) => info!("relayed {stored_name} to the webhook"),
                Err(err) => warn!("webhook notification for {stored_name} failed: {err}"),
            },
            None => debug!("notifications disabled; keeping {stored_name} unannounced"),
        }
        context.queue.push(DetectionRecord {
            image: stored_name,
            time: Local::now(),
        });
    } else {
        info!("no subject of interest in {stored_name}");
        remove_stored(&stored_path).await;
    }

    HttpResponse::Ok().body("processing complete")
}

/// Report the most recent detections, annotated with the current weather.
async fn detection_handler(context: web::Data<RelayContext>) -> HttpResponse {
    let recent = context.queue.recent(RECENT_DETECTIONS_LIMIT);
    if recent.is_empty() {
        return HttpResponse::Ok().json(Vec::<DetectionView>::new());
    }

    let weather = match &context.weather {
        Some(weather) => weather.current_label().await.unwrap_or_else(|err| {
            warn!("weather lookup failed: {err}");
            UNKNOWN_WEATHER.to_string()
        }),
        None => UNKNOWN_WEATHER.to_string(),
    };

    let views: Vec<DetectionView> = recent
        .iter()
        .map(|record| DetectionView::new(record, &weather))
        .collect();
    HttpResponse::Ok().json(views)
}

/// Pull the `file` field out of a multipart form. `Ok(None)` means no field
/// carried a usable filename; `Err` means the stream itself was malformed.
async fn read_file_field(
    mut payload: Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = payload.next().await {
        let mut field = field?;
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .content_disposition()
            .and_then(|disposition| disposition.get_filename())
            .and_then(sanitize_file_name);
        let Some(file_name) = file_name else {
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        return Ok(Some((file_name, bytes)));
    }
    Ok(None)
}

/// Reduce a client-supplied filename to its final path component, so stored
/// names can never escape the storage directory.
fn sanitize_file_name(raw: &str) -> Option<String> {
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// True when any predicted class carries one of the subject labels. The scan
/// stops at the first match.
fn subject_match(response: &PredictionResponse, subjects: &[String]) -> bool {
    for prediction in &response.body.predictions {
        for class in &prediction.classes {
            debug!("predicted {} ({:.3})", class.cat, class.prob);
            if subjects.iter().any(|subject| subject == &class.cat) {
                return true;
            }
        }
    }
    false
}

/// Best-effort removal of a stored upload.
async fn remove_stored(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!("failed to remove {}: {err}", path.display());
    }
}
