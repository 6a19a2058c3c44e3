//! Apache rewrite-rule regeneration.
//!
//! Published targets are exposed through a block of rewrite rules in the
//! htdocs `.htaccess`, delimited by marker lines. Everything outside the
//! markers is preserved verbatim across regenerations. Rules are emitted
//! in descending order of target path so the web server's first-match
//! engine never lets a shorter prefix usurp a longer one.

use super::error::PublishError;
use super::types::DbType;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub const HTACCESS_GE_PUBLISH_BEGIN: &str = "### GE_PUBLISH BEGIN";
pub const HTACCESS_GE_PUBLISH_END: &str = "### GE_PUBLISH END";

/// Map database flag: tiles come from the Google basemap.
pub const USE_GOOGLE_BASEMAP: i64 = 1;

const POI_SEARCH_SERVICE_NAME: &str = "POISearch";

/// One published target's inputs to rule generation.
#[derive(Debug, Clone)]
pub struct RewriteTarget {
    /// Normalized target path, e.g. `/sf`
    pub target_path: String,
    /// Path component of the virtual host URL, e.g. `/public`
    pub virtual_host_path: String,
    pub db_type: DbType,
    pub db_flags: i64,
    pub serve_wms: bool,
}

/// Regenerates the publish block of the `.htaccess` at `htaccess_path`.
///
/// The write goes through a temp file in the same directory followed by an
/// atomic rename, so a crash mid-write cannot corrupt the live file.
pub fn update_htaccess_file(
    htaccess_path: &Path,
    mut targets: Vec<RewriteTarget>,
    ec_default_target: Option<&str>,
) -> Result<(), PublishError> {
    sort_for_rewrite(&mut targets);
    let block = render_publish_block(&targets, ec_default_target);

    let existing = match fs::read_to_string(htaccess_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let merged = splice_publish_block(&existing, &block);

    let dir = htaccess_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(merged.as_bytes())?;
    tmp.persist(htaccess_path).map_err(|e| e.error)?;

    debug!(path = %htaccess_path.display(), targets = targets.len(), "htaccess updated");
    Ok(())
}

/// Orders targets by lowercased path, descending. The order the rules are
/// written is the order the rewrite engine applies them.
pub fn sort_for_rewrite(targets: &mut [RewriteTarget]) {
    targets.sort_by(|a, b| {
        b.target_path
            .to_lowercase()
            .cmp(&a.target_path.to_lowercase())
    });
}

/// Replaces the marker-delimited block in `existing`, appending it when no
/// markers are present.
fn splice_publish_block(existing: &str, block: &str) -> String {
    let mut out = String::with_capacity(existing.len() + block.len());
    let mut in_section = false;
    let mut spliced = false;

    for line in existing.lines() {
        if line == HTACCESS_GE_PUBLISH_BEGIN {
            in_section = true;
            out.push_str(block);
            spliced = true;
            continue;
        }
        if line == HTACCESS_GE_PUBLISH_END {
            in_section = false;
            continue;
        }
        if !in_section {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !spliced {
        out.push_str(block);
    }
    out
}

/// Renders the publish block, markers included. `targets` must already be
/// in rewrite order.
pub fn render_publish_block(targets: &[RewriteTarget], ec_default_target: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(HTACCESS_GE_PUBLISH_BEGIN);
    out.push('\n');
    out.push_str("\nRewriteBase /\n");

    if let Some(default_target) = ec_default_target {
        let rel = default_target.trim_start_matches('/');
        out.push_str("RewriteCond %{HTTP_USER_AGENT}  ^EarthClient/(.*)$\n");
        out.push_str(&format!("Redirect '/dbRoot.v5' '/{}/dbRoot.v5'\n", rel));
        out.push_str(&format!("Redirect '/flatfile'  '/{}/flatfile'\n", rel));
    }

    for target in targets {
        render_target_rules(&mut out, target);
    }

    out.push('\n');
    out.push_str(HTACCESS_GE_PUBLISH_END);
    out.push('\n');
    out
}

fn render_target_rules(out: &mut String, target: &RewriteTarget) {
    let t_path = &target.target_path;
    let rel = t_path.trim_start_matches('/');
    let vh_path = &target.virtual_host_path;
    let db_type = target.db_type.as_str();

    out.push_str(&format!("\n# target: {}\n", t_path));
    out.push_str(&format!("RewriteRule '^{rel}$'  '{rel}/'  [NC,R]\n"));
    out.push_str(&format!(
        "RewriteRule '^{rel}/{poi}(.*)'  {poi}$1 [NC,PT]\n",
        poi = POI_SEARCH_SERVICE_NAME
    ));

    if target.serve_wms {
        out.push_str("RewriteCond %{QUERY_STRING}  ^(.*)$\n");
        out.push_str(&format!(
            "RewriteRule '^{rel}/wms'  'wms?%1&TargetPath={t_path}' [NC,PT]\n"
        ));
    } else {
        out.push_str(&format!("RewriteRule '^{rel}/wms' - [NC,R=404]\n"));
    }

    match target.db_type {
        DbType::Ge => {
            out.push_str(&format!(
                "RewriteRule '^{rel}/+$'  earth/earth_local.html [NC,PT]\n"
            ));
            out.push_str("RewriteCond %{QUERY_STRING}  ^(.*)$\n");
            out.push_str(&format!(
                "RewriteRule '^{rel}/(.*)'  '{vh_path}{t_path}/db/$1?%1&db_type={db_type}' [NC]\n"
            ));
        }
        DbType::Map => {
            if target.db_flags & USE_GOOGLE_BASEMAP == 0 {
                out.push_str(&format!(
                    "RewriteRule '^{rel}/+$'  maps/maps_local.html [NC,PT]\n"
                ));
            } else {
                out.push_str(&format!(
                    "RewriteRule '^{rel}/+$'  maps/maps_google.html [NC,PT]\n"
                ));
            }
            out.push_str(&format!(
                "RewriteRule '^{rel}/+maps/+mapfiles/(.*)$'  maps/mapfiles/$1 [NC,PT]\n"
            ));
            out.push_str("RewriteCond %{QUERY_STRING}  ^(.*)$\n");
            out.push_str(&format!(
                "RewriteRule '^{rel}/(.*)'  '{vh_path}{t_path}/db/$1?%1&db_type={db_type}' [NC]\n"
            ));
        }
        DbType::Glb | DbType::Glm | DbType::Glc => {
            out.push_str(&format!(
                "RewriteRule '^{rel}/+$'  portable/preview.html?{t_path} [NC,PT]\n"
            ));
            out.push_str("RewriteCond %{QUERY_STRING}  ^(.*)$\n");
            out.push_str(&format!(
                "RewriteRule '^{rel}/(.*)'  '{vh_path}{t_path}/db/$1?%1&db_type={db_type}' [NC]\n"
            ));
        }
    }
}
