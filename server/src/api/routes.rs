//! Request handlers and route table

use actix_web::http::header::{self, ContentType};
use actix_web::{web, HttpRequest, HttpResponse};
use metrics_core::crypto::sign;
use metrics_core::protocol::HASH_HEADER;
use metrics_core::types::{format_gauge, MetricQuery};
use metrics_core::{MetricBatch, MetricKind, MetricRecord};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

use super::error::{ApiError, Result};
use super::middleware::logging::client_ip;
use crate::audit::{AuditEvent, Auditor};
use crate::storage::MetricStorage;

/// Upper bound for the storage liveness probe
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

const HTML_OK: &str = "<html><body><h1>OK</h1></body></html>";

/// Shared handler state
pub struct AppState {
    pub storage: Arc<dyn MetricStorage>,
    /// HMAC key for response signatures; empty disables signing
    pub signing_key: String,
    pub auditor: Arc<Auditor>,
}

#[derive(Serialize)]
struct StatusReply {
    status: &'static str,
}

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(list_metrics))
        .route("/ping", web::get().to(ping))
        .route("/update", web::post().to(update_json))
        .route("/update/{kind}/{name}/{value}", web::post().to(update_from_path))
        .route("/updates", web::post().to(update_batch))
        .route("/value", web::post().to(value_json))
        .route("/value/{kind}/{name}", web::get().to(value_from_path));
}

/// Build a response, signing the body when a key is configured
fn signed_response(key: &str, content_type: ContentType, body: Vec<u8>) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.insert_header(content_type);
    if let Some(signature) = sign(&body, key) {
        builder.insert_header((HASH_HEADER, signature));
    }
    builder.body(body)
}

fn status_ok(key: &str) -> Result<HttpResponse> {
    let body = serde_json::to_vec(&StatusReply { status: "ok" })?;
    Ok(signed_response(key, ContentType::json(), body))
}

fn accepts(req: &HttpRequest, media_type: &str) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains(media_type))
        .unwrap_or(false)
}

async fn apply(storage: &dyn MetricStorage, record: &MetricRecord) -> Result<()> {
    record.validate()?;
    match record.kind {
        MetricKind::Gauge => {
            if let Some(value) = record.value {
                storage.set_gauge(&record.id, value).await?;
            }
        }
        MetricKind::Counter => {
            if let Some(delta) = record.delta {
                storage.set_counter(&record.id, delta).await?;
            }
        }
    }
    Ok(())
}

/// POST /update/{kind}/{name}/{value}
async fn update_from_path(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse> {
    let (kind, name, value) = path.into_inner();
    let record = MetricRecord::parse(&kind, &name, &value)?;
    apply(state.storage.as_ref(), &record).await?;
    debug!("Updated {} {} from path", record.kind, record.id);
    Ok(signed_response(
        &state.signing_key,
        ContentType::plaintext(),
        b"OK".to_vec(),
    ))
}

/// POST /update
async fn update_json(
    req: HttpRequest,
    state: web::Data<AppState>,
    record: web::Json<MetricRecord>,
) -> Result<HttpResponse> {
    let record = record.into_inner();
    apply(state.storage.as_ref(), &record).await?;

    if accepts(&req, "application/json") {
        status_ok(&state.signing_key)
    } else {
        Ok(signed_response(
            &state.signing_key,
            ContentType::html(),
            HTML_OK.as_bytes().to_vec(),
        ))
    }
}

/// POST /updates
async fn update_batch(
    req: HttpRequest,
    state: web::Data<AppState>,
    batch: web::Json<MetricBatch>,
) -> Result<HttpResponse> {
    let batch = batch.into_inner();
    state.storage.insert_batch(&batch).await?;
    debug!("Stored batch of {} records", batch.len());

    // Only records the store accepted are audited.
    let names: Vec<String> = batch
        .into_iter()
        .filter(|r| r.validate().is_ok())
        .map(|r| r.id)
        .collect();
    if !names.is_empty() {
        state.auditor.notify(AuditEvent::new(names, client_ip(&req)));
    }

    status_ok(&state.signing_key)
}

/// GET /value/{kind}/{name}
async fn value_from_path(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (kind, name) = path.into_inner();
    let text = match kind.parse::<MetricKind>()? {
        MetricKind::Gauge => format_gauge(state.storage.get_gauge(&name).await?),
        MetricKind::Counter => state.storage.get_counter(&name).await?.to_string(),
    };
    Ok(HttpResponse::Ok()
        .insert_header(ContentType::plaintext())
        .body(text))
}

/// POST /value
async fn value_json(
    state: web::Data<AppState>,
    query: web::Json<MetricQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let record = match query.kind.parse::<MetricKind>()? {
        MetricKind::Gauge => MetricRecord::gauge(
            query.id.clone(),
            state.storage.get_gauge(&query.id).await?,
        ),
        MetricKind::Counter => MetricRecord::counter(
            query.id.clone(),
            state.storage.get_counter(&query.id).await?,
        ),
    };
    let body = serde_json::to_vec(&record)?;
    Ok(signed_response(&state.signing_key, ContentType::json(), body))
}

fn render_html(records: &[MetricRecord]) -> String {
    let mut out = String::from("<html><body><h1>Metrics</h1>");
    for (kind, title) in [(MetricKind::Gauge, "Gauges"), (MetricKind::Counter, "Counters")] {
        let mut section = records.iter().filter(|r| r.kind == kind).peekable();
        if section.peek().is_none() {
            continue;
        }
        let _ = write!(out, "<h2>{}</h2><ul>", title);
        for record in section {
            if let Some(value) = record.display_value() {
                let _ = write!(out, "<li>{}: {}</li>", html_escape(&record.id), value);
            }
        }
        out.push_str("</ul>");
    }
    out.push_str("</body></html>");
    out
}

fn render_text(records: &[MetricRecord]) -> String {
    let mut out = String::new();
    for record in records {
        if let Some(value) = record.display_value() {
            let _ = writeln!(out, "{}: {}", record.id, value);
        }
    }
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// GET /
async fn list_metrics(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let mut records = state.storage.get_all().await?;
    records.sort_by(|a, b| a.id.cmp(&b.id));

    if accepts(&req, "text/html") {
        Ok(HttpResponse::Ok()
            .insert_header(ContentType::html())
            .body(render_html(&records)))
    } else {
        Ok(HttpResponse::Ok()
            .insert_header(ContentType::plaintext())
            .body(render_text(&records)))
    }
}

/// GET /ping
async fn ping(state: web::Data<AppState>) -> Result<HttpResponse> {
    match timeout(PING_TIMEOUT, state.storage.ping()).await {
        Ok(Ok(())) => Ok(HttpResponse::Ok().finish()),
        Ok(Err(e)) => {
            error!("Storage ping failed: {}", e);
            Err(ApiError::Unavailable)
        }
        Err(_) => {
            error!("Storage ping timed out after {:?}", PING_TIMEOUT);
            Err(ApiError::Unavailable)
        }
    }
}
