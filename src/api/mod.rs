use crate::analysis::{analyze_and_save, AnalyzeRequest, Analyzer};
use crate::config::AppConfig;
use crate::detect::DetectionMode;
use crate::image_io::{decode_image, MAX_IMAGE_BYTES};
use crate::report::{csv_string, hazard_distribution, map_points, CSV_FILE_NAME};
use crate::storage::{open_log_store, LogStore};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEADER_BYTES: usize = 8192;
const DEFAULT_IMAGE_NAME: &str = "upload";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Mode used when a request does not name one.
    pub default_mode: DetectionMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8501".to_string(),
            default_mode: DetectionMode::default(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Operator HTTP surface over one analyzer and one log store.
///
/// Connections are accepted and served one at a time on a background thread
/// that owns both collaborators.
pub struct ApiServer {
    cfg: ApiConfig,
    analyzer: Analyzer,
    store: Box<dyn LogStore + Send>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, analyzer: Analyzer, store: Box<dyn LogStore + Send>) -> Self {
        Self {
            cfg,
            analyzer,
            store,
        }
    }

    /// Server backed by the configured log store and detector backends.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let analyzer = Analyzer::from_config(cfg)?;
        analyzer.registry().warm_up_all()?;
        log::info!(
            "detector backends ready: {}",
            analyzer.registry().list().join(", ")
        );
        let store = open_log_store(&cfg.db_path)?;
        let api_config = ApiConfig {
            addr: cfg.api_addr.clone(),
            default_mode: cfg.default_mode,
        };
        Ok(Self::new(api_config, analyzer, store))
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api addr '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind api on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let mut state = ApiState {
            default_mode: self.cfg.default_mode,
            analyzer: self.analyzer,
            store: self.store,
        };
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &mut state, shutdown_thread) {
                log::error!("railway api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ApiState {
    default_mode: DetectionMode,
    analyzer: Analyzer,
    store: Box<dyn LogStore + Send>,
}

fn run_api(listener: TcpListener, state: &mut ApiState, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, state) {
                    log::warn!("railway api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &mut ApiState) -> Result<()> {
    // accepted sockets may inherit the listener's non-blocking flag
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_response(&mut stream, &Response::error(403, "forbidden"))?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_response(&mut stream, &Response::error(400, &err.to_string()))?;
            return Err(err);
        }
    };
    let response = route(&request, state);
    if response.status >= 400 {
        log::warn!(
            "{} {} -> {}",
            request.method,
            request.path,
            response.status
        );
    }
    write_response(&mut stream, &response)
}

fn route(request: &HttpRequest, state: &mut ApiState) -> Response {
    let allowed = match request.path.as_str() {
        "/analyze" => "POST",
        "/health" | "/logs" | "/logs/hazards" | "/logs/map" | "/logs.csv" => "GET",
        _ => return Response::error(404, "not_found"),
    };
    if request.method != allowed {
        return Response::error(405, "method_not_allowed");
    }

    let result = match request.path.as_str() {
        "/health" => return Response::json_text(200, r#"{"status":"ok"}"#),
        "/analyze" => analyze(request, state),
        "/logs" => state
            .store
            .list_all()
            .and_then(|entries| Response::json(&entries)),
        "/logs/hazards" => state.store.list_all().and_then(|entries| {
            let counts: Vec<HazardCount> = hazard_distribution(&entries)
                .into_iter()
                .map(|(level, count)| HazardCount {
                    hazard_level: level.as_str(),
                    count,
                })
                .collect();
            Response::json(&counts)
        }),
        "/logs/map" => state
            .store
            .list_all()
            .and_then(|entries| Response::json(&map_points(&entries))),
        _ => state.store.list_all().and_then(|entries| {
            let body = csv_string(&entries)?;
            Ok(Response {
                status: 200,
                content_type: "text/csv; charset=utf-8",
                disposition: Some(format!("attachment; filename=\"{}\"", CSV_FILE_NAME)),
                body: body.into_bytes(),
            })
        }),
    };
    result.unwrap_or_else(|err| {
        log::warn!("railway api {} failed: {:#}", request.path, err);
        Response::error(500, &format!("{:#}", err))
    })
}

#[derive(Serialize)]
struct HazardCount {
    hazard_level: &'static str,
    count: usize,
}

/// Parsed `/analyze` parameters, or the reason they were rejected.
fn analyze_request(request: &HttpRequest, default_mode: DetectionMode) -> Result<AnalyzeRequest> {
    let query = request.query();
    let mode = match query.get("mode") {
        Some(mode) => mode.parse()?,
        None => default_mode,
    };
    let coordinate = |key: &str| -> Result<f64> {
        match query.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number, got '{}'", key, raw)),
            None => Ok(0.0),
        }
    };
    let name = query
        .get("name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string());
    Ok(AnalyzeRequest {
        image_name: name,
        latitude: coordinate("lat")?,
        longitude: coordinate("lon")?,
        mode,
    })
}

fn analyze(request: &HttpRequest, state: &mut ApiState) -> Result<Response> {
    let params = match analyze_request(request, state.default_mode) {
        Ok(params) => params,
        Err(err) => return Ok(Response::error(400, &err.to_string())),
    };
    let image = match decode_image(&request.body) {
        Ok(image) => image,
        Err(err) => return Ok(Response::error(400, &format!("{:#}", err))),
    };
    let outcome = analyze_and_save(&mut state.analyzer, state.store.as_mut(), &image, &params)?;
    Response::json(&outcome)
}

struct Response {
    status: u16,
    content_type: &'static str,
    disposition: Option<String>,
    body: Vec<u8>,
}

impl Response {
    fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self {
            status: 200,
            content_type: "application/json",
            disposition: None,
            body: serde_json::to_vec(value)?,
        })
    }

    fn json_text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            disposition: None,
            body: body.as_bytes().to_vec(),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::json_text(status, &body)
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_IMAGE_BYTES {
        return Err(anyhow!(
            "request body of {} bytes exceeds limit of {}",
            content_length,
            MAX_IMAGE_BYTES
        ));
    }
    let mut body = data.split_off(header_end + 4);
    if body.len() < content_length {
        let start = body.len();
        body.resize(content_length, 0);
        stream
            .read_exact(&mut body[start..])
            .context("request body ended early")?;
    }
    body.truncate(content_length);

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (raw_path.to_string(), String::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        query,
        body,
    })
}

fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let status_line = match response.status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        status_line = status_line,
        content_type = response.content_type,
        len = response.body.len()
    );
    if let Some(disposition) = &response.disposition {
        header.push_str(&format!("Content-Disposition: {}\r\n", disposition));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: String,
    body: Vec<u8>,
}

impl HttpRequest {
    /// Decoded query parameters; the last occurrence of a key wins.
    fn query(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .into_owned()
            .collect()
    }
}
