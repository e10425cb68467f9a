//! webserv - single-threaded HTTP/1.x server
//!
//! A readiness-driven reactor serving static files, uploads and CGI scripts
//! for one or more configured virtual servers.

pub mod cgi;
pub mod config;
pub mod handler;
pub mod http;
pub mod server;
