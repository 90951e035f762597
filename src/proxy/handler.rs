use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::cache::HttpCache;
use crate::config::PolicyStore;
use crate::error::{ProxyError, ProxyResult};
use crate::logger::{AccessLogger, RequestStatus};
use crate::stats::Statistics;

use super::resolver::HostResolver;
use super::tunnel;

/// Requests are read in a single call into a fixed buffer; a request
/// split across reads is not reassembled.
const BUFFER_SIZE: usize = 8192;

const HTTPS_DEFAULT_PORT: u16 = 443;
const HTTP_ORIGIN_PORT: u16 = 80;

/// Serves one client connection to completion.
///
/// The worker reads the first request, classifies it, applies the host
/// policy, then either relays bytes opaquely (CONNECT), answers from the
/// cache, or fetches from the origin. Every error is handled here; none
/// escape to the server loop. CONNECT never touches the cache.
pub struct RequestHandler {
    policy: Arc<PolicyStore>,
    cache: Arc<HttpCache>,
    stats: Arc<Statistics>,
    access_log: AccessLogger,
    resolver: Arc<dyn HostResolver>,
}

impl RequestHandler {
    pub fn new(
        policy: Arc<PolicyStore>,
        cache: Arc<HttpCache>,
        stats: Arc<Statistics>,
        access_log: AccessLogger,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            policy,
            cache,
            stats,
            access_log,
            resolver,
        }
    }

    /// Serve one accepted connection. The socket closes on return.
    pub async fn handle_client(&self, mut client: TcpStream, peer: SocketAddr) {
        let mut buf = vec![0u8; BUFFER_SIZE];
        let bytes_read = match client.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let request = String::from_utf8_lossy(&buf[..bytes_read]).into_owned();
        let client_ip = peer.ip();

        let result = if request.starts_with("GET /stats") {
            self.handle_stats(&mut client).await;
            Ok(())
        } else if request.starts_with("CONNECT ") {
            self.process_connect(&mut client, &request, client_ip).await
        } else {
            self.process_http(&mut client, &request, client_ip).await
        };

        if let Err(err) = result {
            self.reply_failure(&mut client, client_ip, err, &request)
                .await;
        }
    }

    /// Map a pipeline error to the client response and the accounting it
    /// owes. Client-side send failures never reach here; they tear the
    /// connection down silently.
    async fn reply_failure(
        &self,
        client: &mut TcpStream,
        client_ip: IpAddr,
        err: ProxyError,
        request: &str,
    ) {
        match &err {
            ProxyError::Blocked { host } => {
                let status = if request.starts_with("CONNECT ") {
                    RequestStatus::BlockedHttps
                } else {
                    RequestStatus::BlockedHttp
                };
                self.access_log
                    .log_request(client_ip, host, status, None)
                    .await;
                self.stats.record_blocked();
                send_forbidden(client).await;
            }
            _ => {
                if err.counts_as_error() {
                    error!("{}", err);
                    self.stats.record_error();
                }
                send_error(client, &client_message(&err)).await;
            }
        }
    }

    /// Admin endpoint: the statistics document, or 404 when disabled.
    async fn handle_stats(&self, client: &mut TcpStream) {
        if !self.stats.is_enabled() {
            send_not_found(client, "Stats not enabled").await;
            return;
        }
        let body = self.stats.json();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        if let Err(e) = client.write_all(response.as_bytes()).await {
            debug!("Failed to send stats response: {}", e);
        }
    }

    /// CONNECT: open a TCP connection to the target and relay opaquely.
    async fn process_connect(
        &self,
        client: &mut TcpStream,
        request: &str,
        client_ip: IpAddr,
    ) -> ProxyResult<()> {
        let (host, port) = parse_connect_target(request)
            .ok_or_else(|| ProxyError::malformed("Malformed CONNECT request"))?;

        if self.policy.is_blocked(&host) {
            return Err(ProxyError::blocked(host));
        }

        let started = Instant::now();
        let mut origin = self.connect_to_host(&host, port).await?;

        if client
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await
            .is_err()
        {
            return Ok(());
        }

        debug!("{} CONNECT https://{}", client_ip, host);
        self.access_log
            .log_request(client_ip, &host, RequestStatus::HttpsTunnel, None)
            .await;
        self.stats.record_request(&host, &client_ip.to_string());

        let idle_timeout = self.policy.current().connection_timeout();
        tunnel::relay(client, &mut origin, idle_timeout).await;

        self.stats
            .record_time(&host, started.elapsed().as_millis() as u64);
        Ok(())
    }

    /// HTTP: answer from the cache or fetch from the origin on port 80.
    async fn process_http(
        &self,
        client: &mut TcpStream,
        request: &str,
        client_ip: IpAddr,
    ) -> ProxyResult<()> {
        let host = extract_host(request).ok_or(ProxyError::MissingHostHeader)?;
        let path = extract_path(request);
        let method = request.split_whitespace().next().unwrap_or("");
        debug!("{} {} http://{}{}", client_ip, method, host, path);

        if self.policy.is_blocked(&host) {
            return Err(ProxyError::blocked(host));
        }

        if let Some(payload) = self.cache.get(&host) {
            let size = payload.len() as u64;
            if let Err(e) = client.write_all(&payload).await {
                debug!("Failed to send cached response: {}", e);
            }
            self.access_log
                .log_request(client_ip, &host, RequestStatus::Cached, Some(size))
                .await;
            self.stats.record_request(&host, &client_ip.to_string());
            self.stats.record_cached();
            self.stats.record_bytes(&host, size, 0);
            return Ok(());
        }

        let started = Instant::now();
        let mut origin = self.connect_to_host(&host, HTTP_ORIGIN_PORT).await?;

        let origin_request = format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, host
        );
        origin
            .write_all(origin_request.as_bytes())
            .await
            .map_err(|e| ProxyError::origin_send(e.to_string()))?;

        let mut response = Vec::new();
        let mut chunk = vec![0u8; BUFFER_SIZE];
        loop {
            match origin.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
            }
        }

        if response.is_empty() {
            return Err(ProxyError::EmptyOriginResponse);
        }

        let ttl = self.policy.current().cache_ttl();
        self.cache.put(&host, response.clone(), Some(ttl));

        let size = response.len() as u64;
        if let Err(e) = client.write_all(&response).await {
            debug!("Failed to send fetched response: {}", e);
        }

        self.access_log
            .log_request(client_ip, &host, RequestStatus::Fetched, Some(size))
            .await;
        self.stats.record_request(&host, &client_ip.to_string());
        self.stats
            .record_bytes(&host, size, origin_request.len() as u64);
        self.stats
            .record_time(&host, started.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Resolve and connect to the origin. Blocked hosts never reach here.
    async fn connect_to_host(&self, host: &str, port: u16) -> ProxyResult<TcpStream> {
        let addr = self.resolver.resolve(host, port).await?;
        TcpStream::connect(addr)
            .await
            .map_err(|e| ProxyError::connect(host, e.to_string()))
    }
}

/// The body sent to the client for a failed request.
fn client_message(err: &ProxyError) -> String {
    match err {
        ProxyError::MalformedRequest { message } => message.clone(),
        ProxyError::MissingHostHeader => "No Host header found".to_string(),
        ProxyError::Resolve { .. } | ProxyError::Connect { .. } => {
            "Failed to connect to remote host".to_string()
        }
        ProxyError::OriginSend { .. } => "Failed to send request to remote host".to_string(),
        ProxyError::EmptyOriginResponse => "Empty response from server".to_string(),
        _ => "Internal server error".to_string(),
    }
}

/// Parse `CONNECT host[:port] HTTP/x` into a target. Default port 443.
fn parse_connect_target(request: &str) -> Option<(String, u16)> {
    let first_line = request.split("\r\n").next()?;
    let mut tokens = first_line.split_whitespace();
    if tokens.next() != Some("CONNECT") {
        return None;
    }
    let target = tokens.next()?;
    // The request line must carry an HTTP version token.
    tokens.next()?;

    let (host, port) = match target.split_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()?),
        None => (target, HTTPS_DEFAULT_PORT),
    };
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Extract the `Host:` header value: skip leading spaces, read to CRLF.
fn extract_host(request: &str) -> Option<String> {
    let header_start = request.find("Host:")? + "Host:".len();
    let rest = request[header_start..].trim_start_matches(' ');
    let value_end = rest.find("\r\n")?;
    let host = &rest[..value_end];
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// Extract the request path from the first line: the second token, with
/// an absolute `http://` URI stripped down to its path. Falls back to `/`.
fn extract_path(request: &str) -> String {
    let first_line = request.split("\r\n").next().unwrap_or("");
    let Some(target) = first_line.split_whitespace().nth(1) else {
        return "/".to_string();
    };

    if let Some(stripped) = target.strip_prefix("http://") {
        match stripped.find('/') {
            Some(slash) => stripped[slash..].to_string(),
            None => "/".to_string(),
        }
    } else {
        target.to_string()
    }
}

async fn send_forbidden(client: &mut TcpStream) {
    let body = "<html><body><h1>403 Forbidden</h1></body></html>";
    let response = format!(
        "HTTP/1.1 403 Forbidden\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    if let Err(e) = client.write_all(response.as_bytes()).await {
        debug!("Failed to send 403 response: {}", e);
    }
}

async fn send_error(client: &mut TcpStream, message: &str) {
    let response = format!(
        "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        message.len(),
        message
    );
    if let Err(e) = client.write_all(response.as_bytes()).await {
        debug!("Failed to send 500 response: {}", e);
    }
}

async fn send_not_found(client: &mut TcpStream, body: &str) {
    let response = format!("HTTP/1.1 404 Not Found\r\n\r\n{}", body);
    if let Err(e) = client.write_all(response.as_bytes()).await {
        debug!("Failed to send 404 response: {}", e);
    }
}
