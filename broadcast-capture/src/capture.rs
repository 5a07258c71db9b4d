use bytes::Bytes;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use metrics::counter;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::instrument;

use crate::api::{CaptureError, ExportResponse, IngestResponse, SearchResponse};
use crate::event::{decode_events, Category};
use crate::index::SearchQuery;
use crate::router;

#[instrument(skip_all, fields(category, batch_size, user_agent))]
pub async fn ingest(
    state: State<router::State>,
    Path(category): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, CaptureError> {
    let user_agent = headers
        .get("user-agent")
        .map_or("unknown", |v| v.to_str().unwrap_or("unknown"));
    tracing::Span::current().record("user_agent", user_agent);

    tracing::Span::current().record("category", category.as_str());
    let category: Category = category.parse()?;
    let events = decode_events(&body)?;

    tracing::Span::current().record("batch_size", events.len());
    counter!("capture_events_received_total", "category" => category.as_str())
        .increment(events.len() as u64);

    let summary = state.pipeline.ingest(category, events).await?;

    Ok(Json(IngestResponse {
        ingested: summary.accepted,
        invalid: summary.rejected,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub index: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
}

#[instrument(skip_all)]
pub async fn search(
    state: State<router::State>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, CaptureError> {
    let category = match params.index.as_deref() {
        None | Some("") => Category::ChannelEvents,
        Some(name) => name.parse()?,
    };

    // An empty bound means unbounded, not the literal empty string.
    let from = params.from.filter(|bound| !bound.is_empty());
    let to = params.to.filter(|bound| !bound.is_empty());
    let query = SearchQuery::new(category, from, to, params.limit);
    let events = state.index.search(&query).await?;

    Ok(Json(SearchResponse { events }))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub channel_label: String,
    pub from: String,
    pub to: String,
}

fn parse_bound(name: &str, value: &str) -> Result<OffsetDateTime, CaptureError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|_| CaptureError::MalformedRequest(format!("{name} must be an RFC 3339 instant")))
}

#[instrument(skip_all, fields(channel))]
pub async fn export(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<ExportResponse>, CaptureError> {
    let request: ExportRequest = serde_json::from_slice(&body)?;
    tracing::Span::current().record("channel", request.channel_label.as_str());

    let from = parse_bound("from", &request.from)?;
    let to = parse_bound("to", &request.to)?;

    let export = state
        .exporter
        .export_window(&request.channel_label, from, to)
        .await?;

    Ok(Json(ExportResponse { url: export.url }))
}
