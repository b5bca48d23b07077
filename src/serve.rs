//! Development server with live reload support.
//!
//! This module provides a lightweight HTTP server for local development,
//! built on `tiny_http` with the following features:
//!
//! - Static file serving from the target directory
//! - Pretty URL resolution (`/a/b` → `a/b.html` or `a/b/index.html`)
//! - File watching and incremental rebuild (via `watch` module)
//! - Live reload through a long-polled `/~` endpoint
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (HTTP Server)  │     │  (Rebuilder)     │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//!    Serve files             Render changes
//!    GET /~ (per thread) ◀── reload queue (browser paths)
//! ```

use crate::{
    build::build_site,
    config::{SiteConfig, paths},
    log,
    watch::{Rebuilder, watch},
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    thread,
    time::Duration,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Live reload client, injected into every served page
const RELOAD_SCRIPT: &str = include_str!("embed/serve/reload.js");

/// Long-poll endpoint for reload notifications
const RELOAD_PATH: &str = "/~";

/// How long a reload poll blocks before answering with no updates
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

type ReloadQueue = Arc<Mutex<Receiver<String>>>;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Build the site, then serve it until Ctrl+C.
///
/// With `serve.watch` set, source changes are rendered incrementally and
/// open pages reload when one of their resources changes.
pub fn serve_site(config: &'static SiteConfig) -> Result<()> {
    let site = build_site(config)?;

    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;
    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let (watcher, reload) = if config.serve.watch {
        let (tx, rx) = mpsc::channel();
        let mut rebuilder = Rebuilder::new(site, Some(tx));
        // A failed watcher stops serving so the error surfaces below
        let server_for_watch = Arc::clone(&server);
        let handle = watch(
            config.paths().source(),
            move |event| rebuilder.react(event),
            move || server_for_watch.unblock(),
        )?;
        (Some(handle), Some(Arc::new(Mutex::new(rx))))
    } else {
        (None, None)
    };

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    let stopper = watcher.as_ref().map(|handle| handle.stopper());
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        if let Some(stopper) = &stopper {
            stopper.stop();
        }
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    let root = config.paths().target();
    for request in server.incoming_requests() {
        if request.url() == RELOAD_PATH
            && let Some(queue) = &reload
        {
            let queue = Arc::clone(queue);
            thread::spawn(move || {
                if let Err(e) = serve_reload(request, &queue) {
                    log!("serve"; "reload poll error: {e}");
                }
            });
            continue;
        }

        if let Err(e) = handle_request(request, root, reload.is_some()) {
            log!("serve"; "request error: {e}");
        }
    }

    match watcher {
        Some(handle) => handle.stop(),
        None => Ok(()),
    }
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

    Err(anyhow!(
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

/// Handle a single HTTP request.
///
/// Request resolution order:
/// 1. Exact file match
/// 2. `path.html`
/// 3. `path/index.html`
/// 4. Nothing found → 404
fn handle_request(request: Request, root: &Path, live: bool) -> Result<()> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    // Strip query string (e.g., ?t=123456) before resolving path
    let path_without_query = url_path.split('?').next().unwrap_or(&url_path);

    match resolve(root, path_without_query) {
        Some(path) => serve_file(request, &path, live),
        None => serve_not_found(request),
    }
}

/// Map a request path to an existing file under `root`.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_matches('/');
    let local = paths::normalize(&root.join(relative));
    if !local.starts_with(root) {
        return None;
    }

    let mut candidates = vec![local.clone()];
    if !relative.is_empty() {
        let mut html = local.clone().into_os_string();
        html.push(".html");
        candidates.push(PathBuf::from(html));
    }
    candidates.push(local.join("index.html"));

    candidates.into_iter().find(|path| path.is_file())
}

/// Answer a reload poll with every queued browser path, or `[]` on timeout.
fn serve_reload(request: Request, queue: &ReloadQueue) -> Result<()> {
    let updates: Vec<String> = {
        let rx = queue.lock();
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(first) => std::iter::once(first).chain(rx.try_iter()).collect(),
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(POLL_TIMEOUT);
                Vec::new()
            }
        }
    };

    let body = serde_json::to_string(&updates)?;
    let response = Response::from_string(body)
        .with_header(header("Content-Type", "application/json; charset=utf-8")?)
        .with_header(header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Response Helpers
// ============================================================================

/// Serve a file with appropriate content type, injecting the reload client
/// into HTML pages when live reload is on.
fn serve_file(request: Request, path: &Path, live: bool) -> Result<()> {
    let mut content =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = guess_content_type(path);

    if live && content_type.starts_with("text/html") {
        content = inject_reload(&String::from_utf8_lossy(&content)).into_bytes();
    }

    let response = Response::from_data(content).with_header(header("Content-Type", content_type)?);

    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![header("Content-Type", "text/plain")?],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|()| anyhow!("invalid header {name}: {value}"))
}

/// Insert the reload client before the last `</body>`, or append it.
fn inject_reload(html: &str) -> String {
    let script = format!("<script>{RELOAD_SCRIPT}</script>");
    match html.rfind("</body>") {
        Some(pos) => format!("{}{script}{}", &html[..pos], &html[pos..]),
        None => format!("{html}{script}"),
    }
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_pretty_urls() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("guide")).unwrap();
        fs::write(root.join("index.html"), "home").unwrap();
        fs::write(root.join("about.html"), "about").unwrap();
        fs::write(root.join("guide/index.html"), "guide").unwrap();
        fs::write(root.join("guide/site.css"), "css").unwrap();

        assert_eq!(resolve(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve(root, "/about"), Some(root.join("about.html")));
        assert_eq!(resolve(root, "/about.html"), Some(root.join("about.html")));
        assert_eq!(resolve(root, "/guide/"), Some(root.join("guide/index.html")));
        assert_eq!(resolve(root, "/guide"), Some(root.join("guide/index.html")));
        assert_eq!(resolve(root, "/guide/site.css"), Some(root.join("guide/site.css")));
        assert_eq!(resolve(root, "/missing"), None);
        assert_eq!(resolve(&root.join("guide"), "/../about.html"), None);
    }

    #[test]
    fn test_inject_reload() {
        let html = inject_reload("<html><body><p>x</p></body></html>");
        assert!(html.starts_with("<html><body><p>x</p><script>"));
        assert!(html.ends_with("</script></body></html>"));

        let fragment = inject_reload("<p>x</p>");
        assert!(fragment.starts_with("<p>x</p><script>"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn test_try_bind_port() {
        let localhost: IpAddr = "127.0.0.1".parse().unwrap();
        let (_first, addr) = try_bind_port(localhost, 0, 1).unwrap();
        assert_eq!(addr.ip(), localhost);
    }
}
