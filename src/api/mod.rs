//! HTTP surface: the MJPEG stream, manual tilt control and status endpoints.
//!
//! One accept thread, one thread per connection. Streaming connections run a
//! `StreamingSession`; a watcher thread per session reads the client socket and
//! cancels the session's bus subscription on EOF so a blocked wait ends promptly.

mod http;
pub mod multipart;
mod session;

use anyhow::{anyhow, Result};
use serde_json::json;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::actuator::ActuatorController;
use crate::bus::FrameBus;

use self::http::{
    read_request, write_json_response, write_redirect, write_response, write_text_response,
};
pub use self::session::{SessionEnd, StreamingSession};

const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Page title on `/index.html`.
    pub title: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            title: "tiltcam".to_string(),
        }
    }
}

/// Shared references every request handler works against.
#[derive(Clone)]
pub struct StreamContext {
    pub bus: Arc<FrameBus>,
    pub actuator: Arc<ActuatorController>,
    sessions: Arc<AtomicUsize>,
}

impl StreamContext {
    pub fn new(bus: Arc<FrameBus>, actuator: Arc<ActuatorController>) -> Self {
        Self {
            bus,
            actuator,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open streams end when the bus is closed.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    ctx: StreamContext,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, ctx: StreamContext) -> Self {
        Self { cfg, ctx }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("http server listening on {}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, self.cfg, self.ctx, shutdown_thread) {
                log::error!("http server stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    ctx: StreamContext,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let cfg = Arc::new(cfg);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &ctx) {
                        log::warn!("http request from {} failed: {:#}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                // Accept errors (e.g. fd exhaustion) are not fatal to the server.
                log::warn!("accept failed: {}", err);
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, ctx: &StreamContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let _ = write_json_response(&mut stream, 400, r#"{"error":"bad_request"}"#);
            return Err(err);
        }
    };
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/" => write_redirect(&mut stream, "/index.html"),
        "/index.html" => {
            let page = index_page(&cfg.title);
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        "/stream" | "/stream.mjpg" => {
            let agent = request
                .headers
                .get("user-agent")
                .cloned()
                .unwrap_or_default();
            serve_stream(stream, ctx, &agent)
        }
        "/up" => {
            let position = ctx.actuator.step_up();
            write_text_response(&mut stream, 200, &position.to_string())
        }
        "/down" => {
            let position = ctx.actuator.step_down();
            write_text_response(&mut stream, 200, &position.to_string())
        }
        "/position" => {
            write_text_response(&mut stream, 200, &ctx.actuator.position().to_string())
        }
        "/detections" => {
            let body = match ctx.bus.latest() {
                Some(latest) => json!({
                    "seq": latest.seq(),
                    "stale": latest.stale,
                    "detections": latest.detections,
                }),
                None => json!({ "seq": null, "stale": false, "detections": [] }),
            };
            write_response(&mut stream, 200, "application/json", &serde_json::to_vec(&body)?)
        }
        "/health" => {
            let state = ctx.actuator.state();
            let body = json!({
                "status": if ctx.bus.is_closed() { "closing" } else { "ok" },
                "published": ctx.bus.published_count(),
                "sessions": ctx.active_sessions(),
                "actuator": state,
            });
            write_response(&mut stream, 200, "application/json", &serde_json::to_vec(&body)?)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn serve_stream(stream: TcpStream, ctx: &StreamContext, agent: &str) -> Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;

    let subscriber = ctx.bus.subscribe();
    let cancel = subscriber.cancel_handle();
    let mut watch = stream.try_clone()?;
    watch.set_read_timeout(None)?;
    let watcher = std::thread::spawn(move || {
        let mut buf = [0u8; 256];
        loop {
            match watch.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        cancel.cancel();
    });

    let active = ctx.sessions.fetch_add(1, Ordering::SeqCst) + 1;
    log::info!("stream client {} connected ({}); {} active", peer, agent, active);

    let mut session = StreamingSession::new(&stream, subscriber);
    let end = session.run();
    let sent = session.frames_sent();
    let active = ctx.sessions.fetch_sub(1, Ordering::SeqCst) - 1;
    match end {
        SessionEnd::Disconnected(err) => log::warn!(
            "stream client {} disconnected after {} frames: {}; {} active",
            peer,
            sent,
            err,
            active
        ),
        SessionEnd::Cancelled => log::warn!(
            "stream client {} closed the connection after {} frames; {} active",
            peer,
            sent,
            active
        ),
        SessionEnd::Closed => log::info!(
            "stream to {} ended at shutdown after {} frames",
            peer,
            sent
        ),
    }

    // Unblocks the watcher if the session ended on our side.
    let _ = stream.shutdown(Shutdown::Both);
    let _ = watcher.join();
    Ok(())
}

fn index_page(title: &str) -> String {
    let title = escape_html(title);
    format!(
        "<html>\n<head>\n<title>{title}</title>\n</head>\n<body>\n\
         <h1>{title}</h1>\n\
         <img src=\"stream.mjpg\" width=\"640\" height=\"480\" />\n\
         <p><a href=\"up\">up</a> | <a href=\"down\">down</a></p>\n\
         </body>\n</html>\n",
        title = title
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
