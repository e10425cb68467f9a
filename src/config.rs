//! Server configuration.
//!
//! Loaded once from YAML at startup and never mutated afterwards; the reactor
//! and every handler read the same `Arc<Config>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::http::parser::{DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_HEADER_SIZE, ParseLimits};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// One entry per virtual server / listening socket
    pub servers: Vec<ServerConfig>,
    /// Script extension (with leading dot) to interpreter
    #[serde(default = "default_interpreters")]
    pub cgi: BTreeMap<String, Interpreter>,
}

/// Interpreter used for one script extension.
///
/// Either a bare program path or a program plus leading arguments; the
/// script path is always appended last.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Interpreter {
    Program(PathBuf),
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Interpreter {
    pub fn program(&self) -> &Path {
        match self {
            Interpreter::Program(program) => program,
            Interpreter::Command { program, .. } => program,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            Interpreter::Program(_) => &[],
            Interpreter::Command { args, .. } => args,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_max_body")]
    pub client_max_body_size: usize,
    #[serde(default = "default_max_header")]
    pub max_header_size: usize,
    /// Status code to HTML file served in place of the built-in error body
    #[serde(default)]
    pub error_pages: BTreeMap<u16, PathBuf>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Path prefix this route answers for
    pub path: String,
    /// Directory the prefix maps onto; the server root is used when absent
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub directory_listing: bool,
    /// Run files with a configured interpreter extension as scripts
    #[serde(default)]
    pub cgi: bool,
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    /// Accepted upload extensions; empty accepts everything
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_interpreters() -> BTreeMap<String, Interpreter> {
    BTreeMap::from([(
        ".py".to_string(),
        Interpreter::Program(PathBuf::from("/usr/bin/python3")),
    )])
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_root() -> PathBuf {
    PathBuf::from("www")
}

fn default_max_body() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_max_header() -> usize {
    DEFAULT_MAX_HEADER_SIZE
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_index() -> String {
    "index.html".to_string()
}

impl Config {
    /// Reads and validates a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw).context("failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            bail!("at least one server must be configured");
        }

        for server in &self.servers {
            if server.routes.is_empty() {
                tracing::warn!(
                    addr = %server.addr(),
                    "server has no routes, every request will get 404"
                );
            }
            for route in &server.routes {
                if !route.path.starts_with('/') {
                    bail!("route path {:?} must start with '/'", route.path);
                }
            }
        }

        for (ext, interpreter) in &self.cgi {
            if !ext.starts_with('.') || ext.len() < 2 {
                bail!("CGI extension {:?} must look like \".ext\"", ext);
            }
            if interpreter.program().as_os_str().is_empty() {
                bail!("CGI interpreter for {} is empty", ext);
            }
            if !interpreter.program().exists() {
                tracing::warn!(
                    ext = %ext,
                    program = %interpreter.program().display(),
                    "CGI interpreter not found, scripts with this extension will fail"
                );
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_header_size: self.max_header_size,
            max_body_size: self.client_max_body_size,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: None,
            root: default_root(),
            client_max_body_size: default_max_body(),
            max_header_size: default_max_header(),
            error_pages: BTreeMap::new(),
            routes: Vec::new(),
        }
    }
}

impl RouteConfig {
    /// A GET-only route for `path` with every other option at its default.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root: None,
            methods: default_methods(),
            redirect: None,
            index: default_index(),
            directory_listing: false,
            cgi: false,
            upload_dir: None,
            allowed_extensions: Vec::new(),
        }
    }

    pub fn allows(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}
