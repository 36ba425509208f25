//! Frontend bundle hosting with single-page-app fallback to `index.html`.

use axum::{
    body::Body,
    extract::{Path as UrlPath, Request, State},
    response::{IntoResponse, Response},
};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{config::absolute, error::AppError, routes::AppState};

pub const INDEX: &str = "index.html";

pub async fn serve_root(State(state): State<AppState>, req: Request) -> Result<Response, AppError> {
    serve(&state.static_dir, "", req).await
}

pub async fn serve_path(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    req: Request,
) -> Result<Response, AppError> {
    serve(&state.static_dir, &path, req).await
}

async fn serve(dir: &Path, path: &str, req: Request) -> Result<Response, AppError> {
    if !exists(dir).await {
        return Err(AppError::StaticFolderMissing {
            path: dir.display().to_string(),
            absolute_path: absolute(dir).display().to_string(),
        });
    }

    if let Some(file) = resolve(dir, path) {
        if is_file(&file).await {
            return Ok(send(file, req).await);
        }
    }

    let index = dir.join(INDEX);
    if is_file(&index).await {
        return Ok(send(index, req).await);
    }

    let files = list_entries(dir).await.unwrap_or_default();
    Err(AppError::IndexMissing { files })
}

/// Joins a request path under `dir`; only plain components are accepted.
fn resolve(dir: &Path, path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    let mut out = dir.to_path_buf();
    for comp in Path::new(path).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

async fn send(file: PathBuf, req: Request) -> Response {
    match ServeFile::new(file).oneshot(req).await {
        Ok(res) => res.map(Body::new).into_response(),
        Err(never) => match never {},
    }
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Sorted entry names of `dir`.
pub async fn list_entries(dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
