//! Tile request decoding.
//!
//! Two request surfaces are reproduced for client compatibility: the
//! Earth-client flatfile scheme (`tag-qtnode-type.version` packed into the
//! query string) and the map query surface (`request=ImageryMaps&x=..`).

use crate::quadtree::{QtNode, QtNodeError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from request decoding.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Flatfile query did not have the tag-qtnode-type shape
    #[error("malformed flatfile request: {0}")]
    Malformed(String),

    /// Unknown flatfile tag or packet type
    #[error("unknown packet request: {0}")]
    UnknownPacketRequest(String),

    /// Unknown map query `request` value
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Required query parameter absent
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Numeric parameter failed to parse
    #[error("invalid value for parameter {0}")]
    InvalidParameter(&'static str),

    /// Qtnode failed validation
    #[error(transparent)]
    InvalidQtNode(#[from] QtNodeError),
}

/// A decoded flatfile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatFileRequest {
    /// `q2-<qtnode>-q.<version>`: quadtree index packet
    QtPacket { qtnode: QtNode },
    /// `f1[c]-<qtnode>-i.<version>`: imagery packet
    Imagery { qtnode: QtNode },
    /// `f1[c]-<qtnode>-t.<version>`: terrain packet
    Terrain { qtnode: QtNode },
    /// `f1[c]-<qtnode>-d.<channel>`: vector packet, channel in the
    /// version slot
    Vector { qtnode: QtNode, channel: u32 },
    /// `lf-<...>-<icon path>[&...]`: icon file
    Icon { icon_path: String },
}

/// Decodes the flatfile query string, e.g. `q2-0310-q.1` or
/// `f1c-03012-i.5`.
pub fn parse_flatfile_request(raw: &str) -> Result<FlatFileRequest, RequestError> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() < 3 {
        return Err(RequestError::Malformed(raw.to_string()));
    }
    let tag = parts[0];

    if tag == "lf" {
        // Icon names may themselves contain '-'; everything after the
        // second dash up to an '&' is the icon path.
        let joined = parts[2..].join("-");
        let icon_path = joined.split('&').next().unwrap_or_default().to_string();
        if icon_path.is_empty() {
            return Err(RequestError::Malformed(raw.to_string()));
        }
        return Ok(FlatFileRequest::Icon { icon_path });
    }

    let qtnode = QtNode::parse(parts[1])?;
    let type_version = parts[2];
    let request_type = type_version
        .chars()
        .next()
        .ok_or_else(|| RequestError::Malformed(raw.to_string()))?;
    let version = type_version.get(2..).unwrap_or_default();

    match (tag, request_type) {
        ("q2", 'q') => Ok(FlatFileRequest::QtPacket { qtnode }),
        ("f1" | "f1c", 'i') => Ok(FlatFileRequest::Imagery { qtnode }),
        ("f1" | "f1c", 't') => Ok(FlatFileRequest::Terrain { qtnode }),
        ("f1" | "f1c", 'd') => {
            // The channel rides in the version slot for vector packets.
            let channel = version
                .split('.')
                .next()
                .unwrap_or_default()
                .parse()
                .map_err(|_| RequestError::InvalidParameter("channel"))?;
            Ok(FlatFileRequest::Vector { qtnode, channel })
        }
        _ => Err(RequestError::UnknownPacketRequest(raw.to_string())),
    }
}

/// A decoded map query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapQuery {
    /// Server definitions JSON
    Json,
    /// 2D imagery tile
    ImageryMaps { x: u32, y: u32, z: u8, channel: u32 },
    /// 2D rasterized vector tile
    VectorMapsRaster { x: u32, y: u32, z: u8, channel: u32 },
    /// Icon file
    Icon { icon_path: String },
}

/// Decodes the `request=..` map query surface.
pub fn parse_map_query(params: &HashMap<String, String>) -> Result<MapQuery, RequestError> {
    let request = params
        .get("request")
        .ok_or(RequestError::MissingParameter("request"))?;

    match request.as_str() {
        "Json" => Ok(MapQuery::Json),
        "ImageryMaps" => {
            let (x, y, z, channel) = tile_params(params)?;
            Ok(MapQuery::ImageryMaps { x, y, z, channel })
        }
        "VectorMapsRaster" => {
            let (x, y, z, channel) = tile_params(params)?;
            Ok(MapQuery::VectorMapsRaster { x, y, z, channel })
        }
        "Icon" => {
            let icon_path = params
                .get("icon_path")
                .ok_or(RequestError::MissingParameter("icon_path"))?;
            Ok(MapQuery::Icon {
                icon_path: icon_path.clone(),
            })
        }
        other => Err(RequestError::UnknownRequest(other.to_string())),
    }
}

fn tile_params(params: &HashMap<String, String>) -> Result<(u32, u32, u8, u32), RequestError> {
    let get_num = |key: &'static str| -> Result<u32, RequestError> {
        params
            .get(key)
            .ok_or(RequestError::MissingParameter(key))?
            .parse()
            .map_err(|_| RequestError::InvalidParameter(key))
    };
    let x = get_num("x")?;
    let y = get_num("y")?;
    let z = params
        .get("z")
        .ok_or(RequestError::MissingParameter("z"))?
        .parse()
        .map_err(|_| RequestError::InvalidParameter("z"))?;
    // Channel defaults to 0 for single-channel globes.
    let channel = match params.get("channel") {
        Some(value) => value
            .parse()
            .map_err(|_| RequestError::InvalidParameter("channel"))?,
        None => 0,
    };
    Ok((x, y, z, channel))
}
