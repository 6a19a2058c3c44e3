//! HTTP surface: tile serving and publish administration.

use super::requests::{parse_flatfile_request, parse_map_query, FlatFileRequest, MapQuery};
use super::sessions::GlobeSessions;
use crate::globe::{GlobeError, GlobeHandle};
use crate::info::{GlobeInfo, INFO_FILE_PATH};
use crate::publish::{PublishDef, PublishError, PublishManager};
use crate::quadtree::qt_node_from_map_tile;
use crate::search::{load_search_db, SearchBackend};
use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<GlobeSessions>,
    pub manager: Arc<PublishManager>,
    pub search: Arc<dyn SearchBackend>,
}

/// Builds the server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/flatfile", get(flatfile))
        .route("/query", get(map_query))
        .route("/dbRoot.v5", get(dbroot))
        .route("/info", get(globe_info))
        .route("/admin/publish", post(admin_publish))
        .route("/admin/unpublish", post(admin_unpublish))
        .route("/admin/targets", get(admin_targets))
        .route("/admin/cleanup", post(admin_cleanup))
        .route("/admin/reset", post(admin_reset))
        .route("/admin/selectglobe", post(admin_select_globe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves until shutdown.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "portaglobe server listening");
    axum::serve(listener, router(state)).await
}

/// Maps a globe read result onto the tile response contract: packet bytes
/// on success, an empty 404 for missing packets (clients probe ancestors
/// routinely), 500 for unreadable containers.
fn packet_response(result: Result<Vec<u8>, GlobeError>) -> Response {
    match result {
        Ok(data) => data.into_response(),
        Err(e) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "container read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn active_globe(state: &AppState) -> Result<Arc<GlobeHandle>, Response> {
    state
        .sessions
        .active()
        .ok_or_else(|| (StatusCode::SERVICE_UNAVAILABLE, "no globe selected").into_response())
}

async fn flatfile(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let globe = match active_globe(&state) {
        Ok(globe) => globe,
        Err(response) => return response,
    };
    let raw = query.unwrap_or_default();

    let request = match parse_flatfile_request(&raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(query = %raw, error = %e, "bad flatfile request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let layer_id = 0;
    match request {
        FlatFileRequest::QtPacket { qtnode } => {
            packet_response(globe.read_qt_packet(&qtnode, layer_id))
        }
        FlatFileRequest::Imagery { qtnode } => {
            packet_response(globe.read_imagery_packet(&qtnode, layer_id))
        }
        FlatFileRequest::Terrain { qtnode } => {
            packet_response(globe.read_terrain_packet(&qtnode, layer_id))
        }
        FlatFileRequest::Vector { qtnode, channel } => {
            packet_response(globe.read_vector_packet(&qtnode, channel, layer_id))
        }
        FlatFileRequest::Icon { icon_path } => packet_response(globe.read_file(&icon_path)),
    }
}

async fn map_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let globe = match active_globe(&state) {
        Ok(globe) => globe,
        Err(response) => return response,
    };

    let query = match parse_map_query(&params) {
        Ok(query) => query,
        Err(e) => {
            warn!(error = %e, "bad map query");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let layer_id = 0;
    match query {
        MapQuery::Json => packet_response(globe.read_file("maps/map.json")),
        MapQuery::ImageryMaps { x, y, z, channel } => {
            if globe.descriptor().is_mbtiles {
                return packet_response(globe.read_map_imagery_tile(x, y, z));
            }
            let qtnode = match qt_node_from_map_tile(x, y, z) {
                Ok(qtnode) => qtnode,
                Err(_) => return StatusCode::BAD_REQUEST.into_response(),
            };
            packet_response(globe.read_map_imagery_packet(&qtnode, channel, layer_id))
        }
        MapQuery::VectorMapsRaster { x, y, z, channel } => {
            let qtnode = match qt_node_from_map_tile(x, y, z) {
                Ok(qtnode) => qtnode,
                Err(_) => return StatusCode::BAD_REQUEST.into_response(),
            };
            packet_response(globe.read_map_vector_packet(&qtnode, channel, layer_id))
        }
        MapQuery::Icon { icon_path } => packet_response(globe.read_file(&icon_path)),
    }
}

async fn dbroot(State(state): State<AppState>) -> Response {
    let globe = match active_globe(&state) {
        Ok(globe) => globe,
        Err(response) => return response,
    };
    if globe.descriptor().is_composite {
        return packet_response(globe.read_meta_dbroot());
    }
    packet_response(globe.read_dbroot("dbroot.v5", 0))
}

async fn globe_info(State(state): State<AppState>) -> Response {
    let globe = match active_globe(&state) {
        Ok(globe) => globe,
        Err(response) => return response,
    };

    let info = match globe.read_file(INFO_FILE_PATH) {
        Ok(content) => GlobeInfo::parse(globe.name(), &String::from_utf8_lossy(&content)),
        Err(_) => GlobeInfo::new(globe.name(), ""),
    };
    let descriptor = globe.descriptor();

    Json(json!({
        "name": info.name,
        "description": info.description,
        "created": info.created.map(|ts| ts.to_rfc3339()),
        "is_2d": descriptor.is_2d,
        "is_3d": descriptor.is_3d,
        "is_composite": descriptor.is_composite,
        "is_mbtiles": descriptor.is_mbtiles,
        "has_imagery": descriptor.has_imagery,
        "has_terrain": descriptor.has_terrain,
    }))
    .into_response()
}

/// Admin request/response plumbing: publish failures surface as a
/// structured status message, not a bare status code.
fn publish_response(result: Result<(), PublishError>) -> Response {
    match result {
        Ok(()) => Json(json!({"status": "success"})).into_response(),
        Err(e) => publish_error_response(e),
    }
}

fn publish_error_response(e: PublishError) -> Response {
    let status = match &e {
        PublishError::Catalog(_) | PublishError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({"status": "failed", "message": e.to_string()}))).into_response()
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    target_path: String,
    virtual_host_name: String,
    db_name: String,
    #[serde(default)]
    client_host_name: String,
    #[serde(default)]
    serve_wms: bool,
    #[serde(default)]
    snippets_set_name: Option<String>,
    #[serde(default)]
    search_def_names: Vec<String>,
    #[serde(default)]
    supplemental_search_def_names: Vec<String>,
    #[serde(default)]
    poi_federated: bool,
    #[serde(default)]
    ec_default_db: bool,
}

async fn admin_publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Response {
    let (_, db_type) = match crate::publish::identify_published_db(&request.db_name) {
        Ok(identified) => identified,
        Err(e) => return publish_error_response(e),
    };

    let publish_def = PublishDef {
        target_path: request.target_path,
        virtual_host_name: request.virtual_host_name,
        db_name: request.db_name,
        client_host_name: request.client_host_name,
        db_type,
        serve_wms: request.serve_wms,
        context: crate::publish::PublishContext {
            snippets_set_name: request.snippets_set_name,
            search_def_names: request.search_def_names,
            supplemental_search_def_names: request.supplemental_search_def_names,
            poi_federated: request.poi_federated,
            ec_default_db: request.ec_default_db,
        },
    };

    publish_response(state.manager.publish(&publish_def))
}

#[derive(Debug, Deserialize)]
struct UnpublishRequest {
    target_path: String,
}

async fn admin_unpublish(
    State(state): State<AppState>,
    Json(request): Json<UnpublishRequest>,
) -> Response {
    publish_response(state.manager.unpublish(&request.target_path).map(|_| ()))
}

async fn admin_targets(State(state): State<AppState>) -> Response {
    match state.manager.catalog().publish_info_list() {
        Ok(list) => {
            let targets: Vec<_> = list
                .into_iter()
                .map(|(target_path, host_name, db_name)| {
                    json!({
                        "target_path": target_path,
                        "host_name": host_name,
                        "db_name": db_name,
                    })
                })
                .collect();
            Json(json!({"status": "success", "targets": targets})).into_response()
        }
        Err(e) => publish_error_response(e),
    }
}

async fn admin_cleanup(State(state): State<AppState>) -> Response {
    match state.manager.cleanup() {
        Ok(unpublished) => {
            let entries: Vec<_> = unpublished
                .into_iter()
                .map(|(host, path)| json!({"host": host, "path": path}))
                .collect();
            Json(json!({"status": "success", "unpublished": entries})).into_response()
        }
        Err(e) => publish_error_response(e),
    }
}

async fn admin_reset(State(state): State<AppState>) -> Response {
    publish_response(state.manager.reset())
}

#[derive(Debug, Deserialize)]
struct SelectGlobeRequest {
    globe_path: PathBuf,
}

async fn admin_select_globe(
    State(state): State<AppState>,
    Json(request): Json<SelectGlobeRequest>,
) -> Response {
    match state.sessions.select(&request.globe_path) {
        Ok(globe) => {
            // Search tables follow the selected globe.
            if let Err(e) = load_search_db(globe.as_ref(), state.search.as_ref()) {
                warn!(error = %e, "search table reload failed");
            }
            Json(json!({"status": "success", "globe": globe.name()})).into_response()
        }
        Err(e) => {
            let status = match &e {
                GlobeError::UnknownFileType(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({"status": "failed", "message": e.to_string()})),
            )
                .into_response()
        }
    }
}
