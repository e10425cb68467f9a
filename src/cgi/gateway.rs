use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::cgi::output::ProcessResult;
use crate::cgi::{GatewayError, split_path_info};
use crate::config::Interpreter;
use crate::http::SERVER_SOFTWARE;
use crate::http::request::Request;

/// Runs a script on behalf of a request.
pub trait Gateway {
    /// Whether `script` has an extension this gateway can run.
    fn supports(&self, script: &Path) -> bool;

    fn execute(&self, request: &Request, script: &Path) -> Result<ProcessResult, GatewayError>;
}

/// Script extension (with leading dot) to interpreter.
#[derive(Debug, Clone, Default)]
pub struct InterpreterTable {
    by_extension: HashMap<String, Interpreter>,
}

impl InterpreterTable {
    pub fn new(interpreters: &BTreeMap<String, Interpreter>) -> Self {
        Self {
            by_extension: interpreters
                .iter()
                .map(|(ext, interp)| (ext.clone(), interp.clone()))
                .collect(),
        }
    }

    pub fn lookup(&self, script: &Path) -> Option<&Interpreter> {
        let ext = script.extension()?.to_str()?;
        self.by_extension.get(&format!(".{ext}"))
    }
}

/// Gateway that forks one interpreter process per request.
#[derive(Debug, Clone)]
pub struct ProcessGateway {
    interpreters: InterpreterTable,
}

impl ProcessGateway {
    pub fn new(interpreters: &BTreeMap<String, Interpreter>) -> Self {
        Self {
            interpreters: InterpreterTable::new(interpreters),
        }
    }
}

impl Gateway for ProcessGateway {
    fn supports(&self, script: &Path) -> bool {
        self.interpreters.lookup(script).is_some()
    }

    fn execute(&self, request: &Request, script: &Path) -> Result<ProcessResult, GatewayError> {
        let interpreter = self
            .interpreters
            .lookup(script)
            .ok_or_else(|| GatewayError::UnsupportedExtension(script.display().to_string()))?;

        debug!(
            script = %script.display(),
            program = %interpreter.program().display(),
            body_len = request.body.len(),
            "spawning script"
        );

        let stdin = if request.body.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        };

        let mut child = Command::new(interpreter.program())
            .args(interpreter.args())
            .arg(script)
            .envs(cgi_environment(request, script))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(GatewayError::Spawn)?;

        let child_stdin = child.stdin.take();
        let Some(mut child_stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GatewayError::Read(io::Error::other("script stdout was not captured")));
        };

        // Body and output move concurrently so neither pipe can fill up and
        // deadlock the other.
        let read = thread::scope(|scope| {
            if let Some(mut child_stdin) = child_stdin {
                let body = &request.body;
                scope.spawn(move || {
                    if let Err(e) = child_stdin.write_all(body) {
                        // Scripts may exit without reading their input.
                        if e.kind() != io::ErrorKind::BrokenPipe {
                            warn!(error = %e, "failed to write request body to script");
                        }
                    }
                });
            }

            let mut output = Vec::new();
            child_stdout.read_to_end(&mut output).map(|_| output)
        });

        let output = match read {
            Ok(output) => output,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::Read(e));
            }
        };

        let status = child.wait().map_err(GatewayError::Wait)?;
        if !status.success() {
            if output.is_empty() {
                return Err(GatewayError::Exit(status));
            }
            warn!(
                script = %script.display(),
                %status,
                "script exited unsuccessfully, using its output anyway"
            );
        }

        Ok(ProcessResult::from_output(output))
    }
}

/// Environment passed to a script, CGI/1.1 style.
///
/// Every request header also appears as `HTTP_<NAME>` with dashes turned
/// into underscores.
pub fn cgi_environment(request: &Request, script: &Path) -> Vec<(String, String)> {
    let (script_name, path_info) = split_path_info(&request.path);
    let content_type = request.header("Content-Type").unwrap_or("text/plain");

    let mut env = vec![
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string()),
        ("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string()),
        ("REQUEST_METHOD".to_string(), request.method.to_string()),
        ("SCRIPT_NAME".to_string(), script_name.to_string()),
        ("SCRIPT_FILENAME".to_string(), script.display().to_string()),
        ("PATH_INFO".to_string(), path_info.to_string()),
        ("QUERY_STRING".to_string(), request.query_string.clone()),
        ("CONTENT_LENGTH".to_string(), request.body.len().to_string()),
        ("CONTENT_TYPE".to_string(), content_type.to_string()),
    ];

    let mut headers: Vec<_> = request.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
        env.push((key, value.clone()));
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Method, RequestBuilder};
    use std::path::PathBuf;

    fn lookup_env<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn environment_carries_request_metadata() {
        let req = RequestBuilder::new()
            .method(Method::POST)
            .path("/cgi-bin/app.py/users/7")
            .query("a=1&b=2")
            .header("X-Custom-Id", "42")
            .body(b"hello".to_vec())
            .build()
            .unwrap();

        let env = cgi_environment(&req, Path::new("www/cgi-bin/app.py"));
        assert_eq!(lookup_env(&env, "REQUEST_METHOD"), Some("POST"));
        assert_eq!(lookup_env(&env, "SCRIPT_FILENAME"), Some("www/cgi-bin/app.py"));
        assert_eq!(lookup_env(&env, "SCRIPT_NAME"), Some("/cgi-bin/app.py"));
        assert_eq!(lookup_env(&env, "PATH_INFO"), Some("/users/7"));
        assert_eq!(lookup_env(&env, "QUERY_STRING"), Some("a=1&b=2"));
        assert_eq!(lookup_env(&env, "CONTENT_LENGTH"), Some("5"));
        assert_eq!(lookup_env(&env, "CONTENT_TYPE"), Some("text/plain"));
        assert_eq!(lookup_env(&env, "HTTP_X_CUSTOM_ID"), Some("42"));
        assert_eq!(lookup_env(&env, "GATEWAY_INTERFACE"), Some("CGI/1.1"));
    }

    #[test]
    fn lookup_by_extension() {
        let table = InterpreterTable::new(&BTreeMap::from([(
            ".py".to_string(),
            Interpreter::Program(PathBuf::from("/usr/bin/python3")),
        )]));
        assert!(table.lookup(Path::new("a/b.py")).is_some());
        assert!(table.lookup(Path::new("a/b.rb")).is_none());
        assert!(table.lookup(Path::new("a/noext")).is_none());
    }
}
