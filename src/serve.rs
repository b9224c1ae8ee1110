//! HTTP server for a content root.
//!
//! Built on `tiny_http`. Each request is handled on its own thread; HTML pages
//! are rendered on a further worker thread so the handler can give up at the
//! request deadline and answer `408`.
//!
//! # Request flow
//!
//! ```text
//! request ──► method / `..` / favicon checks
//!         ──► map path (`/` → index.html, `/a` → a.html) ──► .zinignore
//!         ──► robots.txt / sitemap.xml refresh
//!         ──► POST /zin-form ──► submit controller (JSON)
//!         ──► missing file ──► zin.config rewrite (302 or internal)
//!         ──► non-HTML ──► raw file
//!         ──► HTML ──► compose + directive pipeline ──► page or error page
//! ```

use crate::{
    config::{RenderConfig, cfg},
    directives::{self, form::SUBMIT_PATH},
    engine::{self, EngineError, Pipeline, PipelineConfig, RequestContext, ServerError, Services},
    log,
    logger::log_request,
    site::{
        env::load_env,
        ignore::IgnoreList,
        rewrite::{Rewrite, find_rewrite},
        robomap,
    },
    submit::{HttpRelay, Relay, handle_submission},
    utils::fs::guess_content_type,
};
use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Read,
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Fallback error page (embedded at compile time)
const ERROR_TEMPLATE: &str = include_str!("embed/serve/error.html");

/// Placeholder replaced by the error summary in error pages.
const ERROR_SUMMARY: &str = "{{.ERROR_SUMMARY}}";

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

const FAVICON: &str = "/favicon.ico";

/// Shared by every request thread.
struct Shared {
    pipeline: Pipeline,
    services: Services,
    relay: HttpRelay,
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the configured content root until Ctrl+C.
pub fn serve_site() -> Result<()> {
    let c = cfg();
    let interface: IpAddr = c
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", c.serve.interface))?;

    let (server, addr) = try_bind_port(interface, c.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let shared = Arc::new(Shared {
        pipeline: directives::standard(),
        services: Services::standard(),
        relay: HttpRelay::new(),
    });
    log!("serve"; "{} serving {} on http://{}", engine::context::SERVER_IDENTITY, c.root.display(), addr);
    log!("serve"; "passes: {}", shared.pipeline.names().join(" → "));

    for request in server.incoming_requests() {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            if let Err(e) = handle_request(request, &shared) {
                log!("serve"; "request error: {e}");
            }
        });
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

fn handle_request(mut request: Request, shared: &Arc<Shared>) -> Result<()> {
    let started = Instant::now();
    let config = cfg();
    let root = config.root.as_path();
    let method = request.method().as_str().to_owned();

    let url = request.url().to_owned();
    let (raw_path, query) = url.split_once('?').unwrap_or((&url, ""));
    let url_path = urlencoding::decode(raw_path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| raw_path.to_owned());

    let status = 'respond: {
        if !matches!(request.method(), Method::Get | Method::Post) {
            break 'respond send_error(request, root, 405, "Oops! Method Not Allowed")?;
        }
        if url_path.split(['/', '\\']).any(|segment| segment == "..") {
            let reason = "Forbidden: parent directory segments are not allowed";
            break 'respond send_error(request, root, 403, reason)?;
        }
        if url_path == FAVICON {
            break 'respond send_favicon(request, root)?;
        }

        let mapped = map_request_path(&url_path);
        let config_name = config
            .config_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let ignored = IgnoreList::load(root, &[config_name]);
        if ignored.is_ignored(&mapped) || ignored.is_ignored(&url_path) {
            let reason = "Forbidden: you do not have permission to access this file";
            break 'respond send_error(request, root, 403, reason)?;
        }

        let mut cx = new_request(root, &url_path, &mapped);
        cx.method = method.clone();
        cx.client_ip = request
            .remote_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default();
        cx.query = parse_query(query);
        cx.headers = request
            .headers()
            .iter()
            .map(|h| (h.field.to_string(), h.value.to_string()))
            .collect();
        cx.host = header_value(&cx.headers, "host").unwrap_or_default().to_owned();
        cx.deadline = Some(started + Duration::from_secs(config.serve.timeout));

        if robomap::is_robomap_path(&url_path)
            && let Err(e) = robomap::refresh_if_stale(root, &cx.host, &ignored)
        {
            log!("robomap"; "{e:#}");
        }

        if request.method() == &Method::Post && url_path.starts_with(SUBMIT_PATH) {
            let mut body = Vec::new();
            request.as_reader().read_to_end(&mut body)?;
            let relay: &dyn Relay = &shared.relay;
            let (status, json) = handle_submission(&body, &cx.client_ip, &cx.env, relay);
            let response = Response::from_string(json);
            break 'respond send(request, response, status, "application/json")?;
        }

        if !cx.content_source.is_file() {
            match find_rewrite(root, &url_path) {
                Some(Rewrite::External(location)) => {
                    break 'respond send_redirect(request, &location)?;
                }
                Some(Rewrite::Internal(target)) if target.is_file() => cx.content_source = target,
                _ => {
                    let reason = format!("Error: Unable to find file at `{url_path}`.");
                    break 'respond send_error(request, root, 404, &reason)?;
                }
            }
        }

        let content_type = guess_content_type(&cx.content_source);
        if !content_type.starts_with("text/html") {
            break 'respond send_file(request, &cx.content_source, content_type)?;
        }

        match render_with_deadline(cx, &config.render, shared) {
            Some(Rendered::Page(html)) => {
                send(request, Response::from_string(html), 200, "text/html; charset=utf-8")?
            }
            Some(Rendered::Failed { status, summary }) => {
                log!("render"; "{url_path} failed with {status}");
                send_error(request, root, status, &summary)?
            }
            None => {
                log!("render"; "{url_path} timed out after {}s", config.serve.timeout);
                send_error(request, root, 408, "Request Timeout")?
            }
        }
    };

    log_request(&method, &url_path, status, started.elapsed());
    Ok(())
}

/// Map a URL path onto a root-relative file path.
///
/// `/` and trailing slashes resolve to `index.html`; a last segment without
/// an extension gets `.html`.
pub fn map_request_path(url_path: &str) -> String {
    let path = if url_path.starts_with('/') {
        url_path.to_owned()
    } else {
        format!("/{url_path}")
    };
    if path.ends_with('/') {
        return format!("{path}index.html");
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    if Path::new(last).extension().is_none() {
        return format!("{path}.html");
    }
    path
}

/// Fresh context for `url_path`, served from `mapped` under `root`.
pub fn new_request(root: &Path, url_path: &str, mapped: &str) -> RequestContext {
    let mut cx = RequestContext::new(root, url_path);
    cx.content_source = root.join(mapped.trim_start_matches('/'));
    cx.env = load_env(root);
    cx
}

/// Parse `a=1&b=x+y`. The first value of a repeated key wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let decode = |s: &str| {
        let s = s.replace('+', " ");
        urlencoding::decode(&s).map_or_else(|_| s.clone(), std::borrow::Cow::into_owned)
    };
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.entry(decode(key)).or_insert_with(|| decode(value));
    }
    params
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

// ============================================================================
// Rendering
// ============================================================================

/// Outcome of rendering one HTML page.
pub enum Rendered {
    Page(String),
    Failed { status: u16, summary: String },
}

/// Render on a worker thread, giving up at the request deadline.
fn render_with_deadline(cx: RequestContext, render: &RenderConfig, shared: &Arc<Shared>) -> Option<Rendered> {
    let timeout = cx.remaining().unwrap_or_default();
    let (tx, rx) = mpsc::channel();
    let render = render.clone();
    let worker = Arc::clone(shared);

    thread::spawn(move || {
        let mut cx = cx;
        let rendered = render_request(&mut cx, &render, &worker.pipeline, &worker.services);
        // the handler may have given up already
        tx.send(rendered).ok();
    });

    rx.recv_timeout(timeout).ok()
}

/// Compose and run the pipeline for one request.
pub fn render_request(
    cx: &mut RequestContext,
    render: &RenderConfig,
    pipeline: &Pipeline,
    services: &Services,
) -> Rendered {
    let show_errors = PipelineConfig::for_request(cx, render).show_errors;
    match engine::render_page(cx, render, pipeline, services) {
        Ok(html) => match &cx.error {
            None => Rendered::Page(html),
            Some(error) => Rendered::Failed {
                status: 500,
                summary: error_summary(error, show_errors),
            },
        },
        Err(e @ EngineError::ContentRead { .. }) => Rendered::Failed {
            status: e.status(),
            summary: html_escape::encode_text(&e.to_string()).into_owned(),
        },
        Err(e) => Rendered::Failed {
            status: e.status(),
            summary: html_escape::encode_text(&format!("Template Parsing Error: {e}")).into_owned(),
        },
    }
}

/// Error page body for a global error; details only when errors are shown.
fn error_summary(error: &ServerError, show_errors: bool) -> String {
    let title = html_escape::encode_text(&error.title);
    if !show_errors {
        return title.into_owned();
    }
    format!(
        "<h4>{title}</h4><p>{}</p><br><details><summary>View Code Block</summary><code>{}</code></details>",
        html_escape::encode_text(&error.reason),
        html_escape::encode_text(&error.code),
    )
}

/// `<root>/<status>.html` with the summary filled in, else the bundled page.
fn error_page(root: &Path, status: u16, summary: &str) -> String {
    if let Ok(page) = fs::read_to_string(root.join(format!("{status}.html"))) {
        return page.replacen(ERROR_SUMMARY, summary, 1);
    }
    #[allow(clippy::literal_string_with_formatting_args)]
    // These are template placeholders, not format args
    let page = ERROR_TEMPLATE
        .replace("{status}", &status.to_string())
        .replace("{title}", StatusCode(status).default_reason_phrase())
        .replace("{version}", env!("CARGO_PKG_VERSION"));
    page.replacen(ERROR_SUMMARY, summary, 1)
}

// ============================================================================
// Response Helpers
// ============================================================================

/// Build a header, skipping values that are not valid header bytes.
fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name, value).ok()
}

/// Respond with `Server` and `Content-Type` headers; returns the status sent.
fn send<R: Read>(request: Request, mut response: Response<R>, status: u16, content_type: &str) -> Result<u16> {
    response = response.with_status_code(StatusCode(status));
    for h in [
        header("Content-Type", content_type),
        header("Server", engine::context::SERVER_IDENTITY),
    ]
    .into_iter()
    .flatten()
    {
        response.add_header(h);
    }
    request.respond(response)?;
    Ok(status)
}

fn send_error(request: Request, root: &Path, status: u16, summary: &str) -> Result<u16> {
    let page = error_page(root, status, summary);
    send(request, Response::from_string(page), status, "text/html; charset=utf-8")
}

fn send_file(request: Request, path: &Path, content_type: &str) -> Result<u16> {
    let file = File::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
    send(request, Response::from_file(file), 200, content_type)
}

fn send_redirect(request: Request, location: &str) -> Result<u16> {
    let mut response = Response::empty(StatusCode(302));
    if let Some(h) = header("Location", location) {
        response.add_header(h);
    }
    if let Some(h) = header("Server", engine::context::SERVER_IDENTITY) {
        response.add_header(h);
    }
    request.respond(response)?;
    Ok(302)
}

fn send_favicon(request: Request, root: &Path) -> Result<u16> {
    let path = root.join(FAVICON.trim_start_matches('/'));
    let Ok(file) = File::open(&path) else {
        return send_error(request, root, 404, "Error: Favicon icon not found");
    };
    let mut response = Response::from_file(file);
    if let Some(h) = header("Cache-Control", "max-age=86400") {
        response.add_header(h);
    }
    send(request, response, 200, "image/x-icon")
}
