use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

use super::error_response;
use crate::config::{RouteConfig, ServerConfig};
use crate::http::mime;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Serves a file or directory from disk.
///
/// Directories get the route's index file, else a generated listing when
/// the route enables it, else 403.
pub fn serve(path: &Path, request_path: &str, server: &ServerConfig, route: &RouteConfig) -> Response {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => return io_error_response(&e, path, server),
    };

    if !meta.is_dir() {
        return serve_file(path, server);
    }

    if !route.index.is_empty() {
        let index = path.join(&route.index);
        if index.is_file() {
            return serve_file(&index, server);
        }
    }

    if route.directory_listing {
        return listing(path, request_path, server);
    }

    error_response(StatusCode::Forbidden, server)
}

fn serve_file(path: &Path, server: &ServerConfig) -> Response {
    match fs::read(path) {
        Ok(body) => ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", mime::from_path(path))
            .body(body)
            .build(),
        Err(e) => io_error_response(&e, path, server),
    }
}

fn listing(dir: &Path, request_path: &str, server: &ServerConfig) -> Response {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => return io_error_response(&e, dir, server),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            name
        })
        .collect();
    names.sort();

    let base = request_path.trim_end_matches('/');
    let title = escape_html(if request_path.is_empty() { "/" } else { request_path });
    let mut html = format!("<html><head><title>Index of {title}</title></head><body>\n");
    html.push_str(&format!("<h1>Index of {title}</h1>\n<ul>\n"));
    for name in &names {
        let escaped = escape_html(name);
        html.push_str(&format!("<li><a href=\"{base}/{escaped}\">{escaped}</a></li>\n"));
    }
    html.push_str("</ul>\n</body></html>\n");

    ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/html")
        .body(html.into_bytes())
        .build()
}

fn io_error_response(e: &io::Error, path: &Path, server: &ServerConfig) -> Response {
    let status = match e.kind() {
        io::ErrorKind::NotFound => StatusCode::NotFound,
        io::ErrorKind::PermissionDenied => StatusCode::Forbidden,
        _ => {
            warn!(path = %path.display(), error = %e, "failed to read from disk");
            StatusCode::InternalServerError
        }
    };
    error_response(status, server)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
