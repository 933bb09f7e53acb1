//! Dashboard and widget page handlers.
//!
//! Layout on disk, relative to the webroot:
//!
//! ```text
//! dashboards/layout.html       shared page shell, receives {{ content }}
//! dashboards/<name>.html       one file per dashboard
//! widgets/<name>/<name>.html   widget markup fragments
//! ```

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
};
use std::path::Path as FsPath;
use tera::Context;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

const LAYOUT: &str = "layout";
const TEMPLATE_EXT: &str = "html";

/// Accept only plain file-name components.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn read_template(path: &FsPath, what: &str) -> Result<String, ApiError> {
    debug!(path = %path.display(), "Loading template");
    tokio::fs::read_to_string(path)
        .await
        .map_err(|_| ApiError::NotFound(what.to_string()))
}

/// First dashboard name in alphabetical order, ignoring the layout.
pub async fn default_dashboard(webroot: &FsPath) -> Option<String> {
    let mut entries = tokio::fs::read_dir(webroot.join("dashboards")).await.ok()?;
    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem != LAYOUT && valid_name(stem) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names.into_iter().next()
}

/// GET / - Redirect to the default dashboard.
pub async fn index(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let dashboard = default_dashboard(state.webroot())
        .await
        .ok_or_else(|| ApiError::NotFound("no dashboards".to_string()))?;
    Ok(Redirect::temporary(&format!("/{dashboard}")))
}

/// GET /{dashboard} - Render a dashboard inside the layout.
pub async fn dashboard(
    State(state): State<AppState>,
    Path(dashboard): Path<String>,
) -> Result<Html<String>, ApiError> {
    if !valid_name(&dashboard) || dashboard == LAYOUT {
        return Err(ApiError::NotFound(dashboard));
    }

    let dir = state.webroot().join("dashboards");
    let page = read_template(&dir.join(format!("{dashboard}.{TEMPLATE_EXT}")), &dashboard).await?;
    let layout = read_template(&dir.join(format!("{LAYOUT}.{TEMPLATE_EXT}")), LAYOUT).await?;

    let mut context = Context::new();
    context.insert("dashboard", &dashboard);
    context.insert("development", &state.development());

    let content = tera::Tera::one_off(&page, &context, false)
        .map_err(|e| ApiError::Internal(format!("dashboard '{dashboard}': {e}")))?;
    context.insert("content", &content);
    let html = tera::Tera::one_off(&layout, &context, false)
        .map_err(|e| ApiError::Internal(format!("layout: {e}")))?;

    Ok(Html(html))
}

/// GET /views/{widget} - Serve a widget fragment, `widget` being `<name>.html`.
pub async fn widget(
    State(state): State<AppState>,
    Path(widget): Path<String>,
) -> Result<Html<String>, ApiError> {
    let name = widget
        .strip_suffix(".html")
        .filter(|name| valid_name(name))
        .ok_or_else(|| ApiError::NotFound(widget.clone()))?;

    let path = state
        .webroot()
        .join("widgets")
        .join(name)
        .join(format!("{name}.{TEMPLATE_EXT}"));
    let html = read_template(&path, name).await?;
    Ok(Html(html))
}
