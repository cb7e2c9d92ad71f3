//! HTTP daemon exposing the srcd orchestrator.
//!
//! Routes:
//! - `GET /health`
//! - `GET /components`: status of every known component
//! - `POST /components/<name>`: ensure the component and its dependencies run
//! - `DELETE /components/<name>`: remove the component's container
//!
//! Requests are served one at a time, so two remote ensures never race on
//! the same container. The [`TestServer`] helper starts a daemon on a random
//! port for integration testing.

use serde::Serialize;
use srcd_core::{CoreError, Engine};
use srcd_schema::RegistryError;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

/// Name in `/components/<name>`, if the path has that shape.
pub fn parse_component_route(path: &str) -> Option<&str> {
    let name = path.strip_prefix("/components/")?;
    let name = name.split('?').next().unwrap_or(name);
    if name.is_empty() || name.contains('/') {
        None
    } else {
        Some(name)
    }
}

/// HTTP status for an engine failure.
pub fn status_for(err: &CoreError) -> u16 {
    match err {
        CoreError::Registry(RegistryError::UnknownComponent(_)) => 404,
        e if e.is_bind_conflict() => 409,
        _ => 500,
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component: Option<&'a str>,
}

fn respond_json(req: Request, code: u16, body: &impl Serialize) {
    let json = match serde_json::to_vec(body) {
        Ok(json) => json,
        Err(e) => {
            error!("serializing response: {e}");
            let _ = req.respond(Response::empty(500));
            return;
        }
    };
    let mut response = Response::from_data(json).with_status_code(StatusCode(code));
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

fn respond_error(req: Request, err: &CoreError, component: Option<&str>) {
    let code = status_for(err);
    if code == 500 {
        error!("{err}");
    } else {
        warn!("{err}");
    }
    let body = ErrorBody {
        error: err.to_string(),
        hint: err.hint(),
        component,
    };
    respond_json(req, code, &body);
}

fn respond_plain_error(req: Request, code: u16, msg: &str) {
    let body = ErrorBody {
        error: msg.to_owned(),
        hint: None,
        component: None,
    };
    respond_json(req, code, &body);
}

fn handle_component(engine: &Engine, req: Request, method: &Method, name: &str) {
    match *method {
        Method::Post => match engine.ensure_running(name) {
            Ok(report) => {
                info!(
                    "ensured {} ({} started)",
                    report.component,
                    report.started.len()
                );
                respond_json(req, 200, &report);
            }
            Err(e) => respond_error(req, &e, Some(name)),
        },
        Method::Delete => {
            let resolved = match engine.registry().resolve(name) {
                Ok(c) => c.name.clone(),
                Err(e) => return respond_error(req, &CoreError::from(e), Some(name)),
            };
            match engine.stop(&resolved) {
                Ok(true) => respond_json(req, 200, &serde_json::json!({ "removed": resolved })),
                Ok(false) => respond_plain_error(req, 404, &format!("{resolved} is not running")),
                Err(e) => respond_error(req, &e, Some(name)),
            }
        }
        _ => respond_plain_error(req, 405, "method not allowed"),
    }
}

/// Handle a single HTTP request, dispatching to the matching route.
pub fn handle_request(engine: &Engine, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if let Some(name) = parse_component_route(&url) {
        handle_component(engine, req, &method, name);
        return;
    }
    match (url.as_str(), &method) {
        ("/health", Method::Get) => respond_json(
            req,
            200,
            &serde_json::json!({ "status": "ok", "runtime": engine.runtime().name() }),
        ),
        ("/components", Method::Get) => match engine.status() {
            Ok(statuses) => respond_json(req, 200, &statuses),
            Err(e) => respond_error(req, &e, None),
        },
        ("/health" | "/components", _) => respond_plain_error(req, 405, "method not allowed"),
        _ => respond_plain_error(req, 404, "not found"),
    }
}

fn bind(addr: &str) -> io::Result<Server> {
    Server::http(addr).map_err(|e| io::Error::other(format!("cannot bind {addr}: {e}")))
}

/// Serve requests on `addr`, blocking the current thread.
pub fn run_server(engine: &Engine, addr: &str) -> io::Result<()> {
    let server = bind(addr)?;
    info!("listening on {addr}");
    for request in server.incoming_requests() {
        handle_request(engine, request);
    }
    Ok(())
}

/// A daemon on a random local port, served from a background thread.
///
/// Dropping it unblocks the server and joins the thread.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start(engine: Engine) -> io::Result<Self> {
        let server = Arc::new(bind("127.0.0.1:0")?);
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| io::Error::other("server is not bound to an IP address"))?;
        let url = format!("http://127.0.0.1:{port}");

        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&engine, request);
            }
        });

        Ok(Self {
            url,
            port,
            server,
            handle: Some(handle),
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
