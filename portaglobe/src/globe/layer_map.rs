//! Composite layer base-map parsing.
//!
//! A 2D package embeds its server definitions as `maps/map.json`. Older
//! cutters wrote it as a javascript assignment with unquoted keys and
//! trailing commas, so the text is normalized before JSON parsing.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Per-layer server definition entry; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct LayerDef {
    id: u32,
    #[serde(default)]
    glm_id: u32,
    #[serde(default)]
    non_base_layer: bool,
}

#[derive(Debug, Deserialize)]
struct ServerDefs {
    #[serde(default)]
    layers: Vec<LayerDef>,
}

/// Mapping of `(layer_id, channel)` to base-layer status.
///
/// A base layer renders "no data" tiles where packets are missing; a
/// non-base (overlay) layer renders nothing.
#[derive(Debug, Default, Clone)]
pub struct LayerBaseMap {
    map: HashMap<(u32, u32), bool>,
}

impl LayerBaseMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the layer table out of server-definition JSON text.
    pub fn from_server_defs(json_text: &str) -> Result<Self, serde_json::Error> {
        let defs: ServerDefs = serde_json::from_str(&clean_server_defs(json_text))?;
        let mut map = HashMap::new();
        for layer in defs.layers {
            // The layer's channel is its server-defs "id"; glm_id is the
            // sub-layer the channel belongs to (0 for non-composite).
            map.insert((layer.glm_id, layer.id), !layer.non_base_layer);
        }
        Ok(LayerBaseMap { map })
    }

    /// Whether `(layer_id, channel)` is a base layer.
    ///
    /// Unknown combinations degrade to `false` with a logged warning:
    /// rendering nothing is safer than rendering a placeholder over an
    /// overlay.
    pub fn is_base_layer(&self, layer_id: u32, channel: u32) -> bool {
        match self.map.get(&(layer_id, channel)) {
            Some(is_base) => *is_base,
            None => {
                warn!(layer_id, channel, "unknown layer in base-layer lookup");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Normalizes legacy server-definition text into parseable JSON.
///
/// Strips the `geeServerDefs =` assignment prefix, quotes bare keys, and
/// removes trailing commas and the trailing semicolon.
pub fn clean_server_defs(text: &str) -> String {
    let mut out = match text.find("geeServerDefs =") {
        Some(idx) => text[idx + "geeServerDefs =".len()..].to_string(),
        None => text.to_string(),
    };
    out = out.replace('\r', "\n");

    // Quote fields and remove pre-colon spaces. The quoted-key pass runs
    // first so already-quoted keys are not double quoted by the bare pass.
    let quoted_key = Regex::new(r#"\n\s*"([\w-]+)"\s+:"#).unwrap();
    out = quoted_key.replace_all(&out, "\n\"$1\":").to_string();
    let bare_key = Regex::new(r"\n\s*([\w-]+)\s*:").unwrap();
    out = bare_key.replace_all(&out, "\n\"$1\":").to_string();

    // Remove extraneous commas before closing brackets.
    let comma_bracket = Regex::new(r",[\s\n]*\]").unwrap();
    out = comma_bracket.replace_all(&out, "\n]").to_string();
    let comma_brace = Regex::new(r",[\s\n]*\}").unwrap();
    out = comma_brace.replace_all(&out, "\n}").to_string();

    // Remove trailing semicolon.
    let semi = Regex::new(r"\}[\s\n]*;").unwrap();
    out = semi.replace_all(&out, "}").to_string();

    out
}
