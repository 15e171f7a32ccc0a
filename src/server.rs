//! Development HTTP server with live reload.
//!
//! Serves the distribution directory over plain HTTP/1.1, one thread per
//! connection, `Connection: close` on every response. HTML responses get a
//! small script injected before `</body>` that subscribes to
//! [`LIVE_RELOAD_PATH`], a Server-Sent Events stream fed by the
//! [`ReloadHub`]. The watcher tells the hub what changed:
//!
//! | Action | Browser does |
//! |--------|--------------|
//! | [`ReloadAction::Full`] | `location.reload()` |
//! | [`ReloadAction::InjectCss`] | swaps matching `<link rel="stylesheet">` without a reload |
//!
//! Path handling: percent-decoded, `..` segments rejected with 403, directory
//! URLs served from `index.html` (redirecting to add the trailing slash first
//! so relative links resolve), and extensionless URLs falling back to `.html`.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// URL path of the live-reload event stream.
pub const LIVE_RELOAD_PATH: &str = "/__livereload";

const RELOAD_SCRIPT: &str = r#"<script>(function(){var s=new EventSource("/__livereload");s.addEventListener("reload",function(){location.reload()});s.addEventListener("css",function(e){var name=e.data.split("/").pop();document.querySelectorAll('link[rel="stylesheet"]').forEach(function(l){var href=(l.getAttribute("href")||"").split("?")[0];if(href.split("/").pop()!==name)return;var n=l.cloneNode();n.href=href+"?v="+Date.now();n.onload=function(){l.remove()};l.after(n)})})})();</script>"#;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What connected browsers should do after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadAction {
    Full,
    /// Re-fetch these stylesheets (URL paths) in place.
    InjectCss(Vec<String>),
    None,
}

impl std::fmt::Display for ReloadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadAction::Full => write!(f, "full reload"),
            ReloadAction::InjectCss(urls) => write!(f, "css inject ({})", urls.join(", ")),
            ReloadAction::None => write!(f, "no reload"),
        }
    }
}

/// Connected live-reload clients.
#[derive(Debug, Default)]
pub struct ReloadHub {
    clients: Mutex<Vec<TcpStream>>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TcpStream>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer an event-stream request and keep the connection open.
    pub fn subscribe(&self, mut stream: TcpStream) -> io::Result<()> {
        stream.write_all(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: text/event-stream\r\n\
              Cache-Control: no-cache\r\n\
              Connection: keep-alive\r\n\
              \r\n\
              retry: 1000\n\n",
        )?;
        stream.flush()?;
        stream.set_write_timeout(Some(Duration::from_secs(1)))?;
        self.lock().push(stream);
        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Send `action` to every client, dropping those that have gone away.
    ///
    /// Returns the number of clients still connected.
    pub fn broadcast(&self, action: &ReloadAction) -> usize {
        let message = match action {
            ReloadAction::Full => "event: reload\ndata: reload\n\n".to_string(),
            ReloadAction::InjectCss(urls) => urls
                .iter()
                .map(|url| format!("event: css\ndata: {url}\n\n"))
                .collect(),
            ReloadAction::None => return self.client_count(),
        };
        let mut clients = self.lock();
        clients.retain_mut(|client| {
            client
                .write_all(message.as_bytes())
                .and_then(|()| client.flush())
                .is_ok()
        });
        clients.len()
    }
}

/// Insert the live-reload script before the last `</body>`, or append it.
pub fn inject_reload_script(html: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], RELOAD_SCRIPT, &html[at..]),
        None => format!("{html}{RELOAD_SCRIPT}"),
    }
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" | "webmanifest" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Decode `%XX` escapes. `None` on malformed escapes or invalid UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Where a request path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    Redirect(String),
    Forbidden,
    NotFound,
}

/// Map a URL path (no query string) onto a file under `root`.
pub fn resolve(root: &Path, url_path: &str) -> Resolution {
    let Some(decoded) = percent_decode(url_path) else {
        return Resolution::NotFound;
    };
    let mut rel = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Resolution::Forbidden,
            s if s.contains(['\\', '\0']) => return Resolution::Forbidden,
            s => rel.push(s),
        }
    }

    let candidate = root.join(&rel);
    if candidate.is_dir() {
        if !decoded.ends_with('/') {
            return Resolution::Redirect(format!("{url_path}/"));
        }
        let index = candidate.join("index.html");
        return if index.is_file() {
            Resolution::File(index)
        } else {
            Resolution::NotFound
        };
    }
    if candidate.is_file() {
        return Resolution::File(candidate);
    }
    if candidate.extension().is_none() {
        let html = candidate.with_extension("html");
        if html.is_file() {
            return Resolution::File(html);
        }
    }
    Resolution::NotFound
}

fn respond(
    stream: &mut TcpStream,
    status: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    let mut header = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        header.push_str(&format!("{name}: {value}\r\n"));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    if !head_only {
        stream.write_all(body)?;
    }
    stream.flush()
}

fn plain(stream: &mut TcpStream, status: &str, head_only: bool) -> io::Result<()> {
    respond(
        stream,
        status,
        &[("Content-Type", "text/plain; charset=utf-8")],
        status.as_bytes(),
        head_only,
    )
}

fn handle_connection(
    mut stream: TcpStream,
    root: &Path,
    hub: &ReloadHub,
    live_reload: bool,
) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim_end().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return plain(&mut stream, "400 Bad Request", false);
    };
    let path = target.split(['?', '#']).next().unwrap_or("/");
    tracing::debug!(method, path, "request");

    if path == LIVE_RELOAD_PATH && method == "GET" && live_reload {
        stream.set_read_timeout(None)?;
        return hub.subscribe(stream);
    }

    let head_only = match method {
        "GET" => false,
        "HEAD" => true,
        _ => {
            return respond(
                &mut stream,
                "405 Method Not Allowed",
                &[("Allow", "GET, HEAD"), ("Content-Type", "text/plain; charset=utf-8")],
                b"405 Method Not Allowed",
                false,
            );
        }
    };

    match resolve(root, path) {
        Resolution::File(file) => {
            let body = std::fs::read(&file)?;
            let ctype = content_type(&file);
            let body = if live_reload && ctype.starts_with("text/html") {
                inject_reload_script(&String::from_utf8_lossy(&body)).into_bytes()
            } else {
                body
            };
            respond(&mut stream, "200 OK", &[("Content-Type", ctype)], &body, head_only)
        }
        Resolution::Redirect(location) => respond(
            &mut stream,
            "301 Moved Permanently",
            &[("Location", location.as_str())],
            b"",
            head_only,
        ),
        Resolution::Forbidden => plain(&mut stream, "403 Forbidden", head_only),
        Resolution::NotFound => plain(&mut stream, "404 Not Found", head_only),
    }
}

/// A bound, not-yet-running development server.
pub struct DevServer {
    listener: TcpListener,
    root: PathBuf,
    hub: Arc<ReloadHub>,
    live_reload: bool,
}

impl DevServer {
    pub fn bind(
        addr: &str,
        root: impl Into<PathBuf>,
        hub: Arc<ReloadHub>,
        live_reload: bool,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            root: root.into(),
            hub,
            live_reload,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn url(&self) -> Result<String, ServeError> {
        Ok(format!("http://{}", self.local_addr()?))
    }

    /// Accept connections forever.
    pub fn run(self) -> Result<(), ServeError> {
        let DevServer {
            listener,
            root,
            hub,
            live_reload,
        } = self;
        let root = Arc::new(root);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let root = Arc::clone(&root);
                    let hub = Arc::clone(&hub);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &root, &hub, live_reload) {
                            tracing::debug!("connection error: {e}");
                        }
                    });
                }
                Err(e) => tracing::warn!("accept failed: {e}"),
            }
        }
        Ok(())
    }
}
