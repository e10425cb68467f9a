//! Upload directory routes: store multipart files, list them, delete one.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::error_response;
use crate::config::{RouteConfig, ServerConfig};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

#[derive(Debug, Serialize)]
struct StoredFile {
    field: String,
    filename: String,
    size: usize,
}

#[derive(Debug, Serialize)]
struct ListedFile {
    filename: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct FileList<T> {
    files: Vec<T>,
}

#[derive(Debug, Serialize)]
struct Deleted<'a> {
    message: &'static str,
    filename: &'a str,
}

/// Handles the request if it is an upload operation.
///
/// `None` leaves the request to static file serving.
pub fn handle(
    request: &Request,
    server: &ServerConfig,
    route: &RouteConfig,
    upload_dir: &Path,
) -> Option<Response> {
    match request.method {
        Method::POST => Some(store(request, server, route, upload_dir)),
        Method::GET if is_collection(&request.path, &route.path) => Some(list(server, upload_dir)),
        Method::DELETE => Some(delete(request, server, upload_dir)),
        _ => None,
    }
}

fn is_collection(request_path: &str, route_path: &str) -> bool {
    request_path.trim_end_matches('/') == route_path.trim_end_matches('/')
}

fn store(request: &Request, server: &ServerConfig, route: &RouteConfig, upload_dir: &Path) -> Response {
    if request.uploaded_files.is_empty() {
        warn!(path = %request.path, "upload request carried no files");
        return error_response(StatusCode::BadRequest, server);
    }

    let mut names = Vec::with_capacity(request.uploaded_files.len());
    for file in &request.uploaded_files {
        let Some(name) = sanitize_filename(&file.filename) else {
            warn!(filename = %file.filename, "rejected upload filename");
            return error_response(StatusCode::BadRequest, server);
        };
        if !extension_allowed(&name, &route.allowed_extensions) {
            warn!(filename = %name, "upload extension not allowed");
            return error_response(StatusCode::BadRequest, server);
        }
        names.push(name);
    }

    if let Err(e) = fs::create_dir_all(upload_dir) {
        warn!(dir = %upload_dir.display(), error = %e, "failed to create upload directory");
        return error_response(StatusCode::InternalServerError, server);
    }

    let mut stored = Vec::with_capacity(names.len());
    for (file, name) in request.uploaded_files.iter().zip(names) {
        let target = upload_dir.join(&name);
        if let Err(e) = fs::write(&target, &file.data) {
            warn!(path = %target.display(), error = %e, "failed to store upload");
            return error_response(StatusCode::InternalServerError, server);
        }
        info!(path = %target.display(), size = file.size(), "stored upload");
        stored.push(StoredFile {
            field: file.name.clone(),
            filename: name,
            size: file.size(),
        });
    }

    json_response(StatusCode::Created, &FileList { files: stored }, server)
}

fn list(server: &ServerConfig, upload_dir: &Path) -> Response {
    let entries = match fs::read_dir(upload_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return json_response(StatusCode::Ok, &FileList::<ListedFile> { files: Vec::new() }, server);
        }
        Err(e) => {
            warn!(dir = %upload_dir.display(), error = %e, "failed to list uploads");
            return error_response(StatusCode::InternalServerError, server);
        }
    };

    let mut files: Vec<ListedFile> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename.starts_with('.') {
                return None;
            }
            let meta = entry.metadata().ok()?;
            meta.is_file().then(|| ListedFile {
                filename,
                size: meta.len(),
            })
        })
        .collect();
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    json_response(StatusCode::Ok, &FileList { files }, server)
}

fn delete(request: &Request, server: &ServerConfig, upload_dir: &Path) -> Response {
    let Some(requested) = request.query_params.get("filename") else {
        warn!("DELETE without a filename parameter");
        return error_response(StatusCode::BadRequest, server);
    };
    let Some(name) = sanitize_filename(requested) else {
        warn!(filename = %requested, "rejected delete filename");
        return error_response(StatusCode::BadRequest, server);
    };

    let target = upload_dir.join(&name);
    match fs::remove_file(&target) {
        Ok(()) => {
            info!(path = %target.display(), "deleted upload");
            json_response(
                StatusCode::Ok,
                &Deleted {
                    message: "File successfully deleted.",
                    filename: &name,
                },
                server,
            )
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => error_response(StatusCode::NotFound, server),
        Err(e) => {
            warn!(path = %target.display(), error = %e, "failed to delete upload");
            error_response(StatusCode::InternalServerError, server)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T, server: &ServerConfig) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ResponseBuilder::new(status)
            .header("Content-Type", "application/json")
            .body(body)
            .build(),
        Err(e) => {
            warn!(error = %e, "failed to encode JSON body");
            error_response(StatusCode::InternalServerError, server)
        }
    }
}

/// Keeps the base name's ASCII letters, digits, `.`, `_` and `-`.
///
/// Returns `None` when nothing usable is left or the name still contains `..`.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if cleaned.is_empty() || cleaned.contains("..") || cleaned.chars().all(|c| c == '.') {
        return None;
    }
    Some(cleaned)
}

/// An empty allow-list accepts every extension. Entries may omit the dot.
fn extension_allowed(name: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    allowed
        .iter()
        .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
