//! Request dispatch: turns a routed request into a response.
//!
//! The reactor only knows the [`Handler`] trait. [`DefaultHandler`] checks,
//! in order: method, redirect, path safety, scripts, uploads, then static
//! files.

pub mod route;
pub mod static_files;
pub mod upload;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::cgi::{Gateway, ProcessGateway, split_path_info};
use crate::config::{Config, RouteConfig, ServerConfig};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

pub use route::match_route;

/// Builds the response for a request that matched `route` on `server`.
pub trait Handler {
    fn handle(&self, request: &Request, server: &ServerConfig, route: &RouteConfig) -> Response;
}

pub struct DefaultHandler<G = ProcessGateway> {
    gateway: G,
}

impl DefaultHandler<ProcessGateway> {
    pub fn new(config: &Config) -> Self {
        Self {
            gateway: ProcessGateway::new(&config.cgi),
        }
    }
}

impl<G: Gateway> DefaultHandler<G> {
    pub fn with_gateway(gateway: G) -> Self {
        Self { gateway }
    }

    fn run_script(&self, request: &Request, server: &ServerConfig, script: &Path) -> Response {
        if !script.is_file() {
            return error_response(StatusCode::NotFound, server);
        }

        match self.gateway.execute(request, script) {
            Ok(result) => result.into_response(),
            Err(e) => {
                error!(script = %script.display(), error = %e, "script execution failed");
                error_response(StatusCode::InternalServerError, server)
            }
        }
    }
}

impl<G: Gateway> Handler for DefaultHandler<G> {
    fn handle(&self, request: &Request, server: &ServerConfig, route: &RouteConfig) -> Response {
        if let Method::Other(_) = request.method {
            return error_response(StatusCode::NotImplemented, server);
        }

        if !method_allowed(route, &request.method) {
            let mut response = error_response(StatusCode::MethodNotAllowed, server);
            response.set_header("Allow", route.methods.join(", "));
            return response;
        }

        if let Some(target) = &route.redirect {
            return ResponseBuilder::new(StatusCode::MovedPermanently)
                .header("Location", target.as_str())
                .build();
        }

        let Some(path) = resolve_path(&request.path, server, route) else {
            warn!(path = %request.path, "rejected path traversal attempt");
            return error_response(StatusCode::Forbidden, server);
        };

        if route.cgi {
            let (script_url, _) = split_path_info(&request.path);
            if let Some(script) = resolve_path(script_url, server, route) {
                if self.gateway.supports(&script) {
                    return self.run_script(request, server, &script);
                }
            }
        }

        if let Some(upload_dir) = &route.upload_dir {
            if let Some(response) = upload::handle(request, server, route, upload_dir) {
                return response;
            }
        }

        match request.method {
            Method::GET | Method::HEAD => static_files::serve(&path, &request.path, server, route),
            _ => {
                let mut response = error_response(StatusCode::MethodNotAllowed, server);
                response.set_header("Allow", "GET, HEAD");
                response
            }
        }
    }
}

/// HEAD rides along with GET.
fn method_allowed(route: &RouteConfig, method: &Method) -> bool {
    route.allows(method.as_str()) || (*method == Method::HEAD && route.allows("GET"))
}

/// Maps a request path onto the filesystem.
///
/// With a route root the route prefix is replaced by that root, otherwise
/// the whole path is joined onto the server root. Returns `None` when any
/// segment is `..`.
pub fn resolve_path(request_path: &str, server: &ServerConfig, route: &RouteConfig) -> Option<PathBuf> {
    if request_path.split('/').any(|segment| segment == "..") {
        return None;
    }

    let (base, rest) = match &route.root {
        Some(root) => (
            root.as_path(),
            request_path
                .strip_prefix(route.path.as_str())
                .unwrap_or(request_path),
        ),
        None => (server.root.as_path(), request_path),
    };

    Some(base.join(rest.trim_start_matches('/')))
}

/// Error response for `status`, using the server's error page if one is
/// configured and readable.
pub fn error_response(status: StatusCode, server: &ServerConfig) -> Response {
    let Some(page) = server.error_pages.get(&status.as_u16()) else {
        return Response::error(status);
    };

    match fs::read(page) {
        Ok(body) => ResponseBuilder::new(status)
            .header("Content-Type", "text/html")
            .body(body)
            .build(),
        Err(e) => {
            warn!(page = %page.display(), error = %e, "failed to read error page");
            Response::error(status)
        }
    }
}
