use crate::stream::StreamProtocol;
use crate::tcp::TcpProtocol;
use crate::{HelloError, Result};
use ::http::header::CONTENT_LENGTH;
use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

/// Configuration for HTTP clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Read timeout for operations
    pub read_timeout: Duration,
    /// Write timeout for operations
    pub write_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_response_size: 1024 * 1024,
        }
    }
}

/// A response as seen by the client
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ClientResponse {
    /// The body as UTF-8 text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(HelloError::Utf8)
    }

    /// Whether the server announced it will close the connection
    pub fn closes_connection(&self) -> bool {
        self.headers
            .get(::http::header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

/// Minimal keep-alive HTTP/1.1 client for exercising the fixture
///
/// # Examples
///
/// ```no_run
/// use hellosrv::HttpClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = HttpClient::connect("127.0.0.1:8080".parse()?).await?;
///     let response = client.get("/").await?;
///     assert_eq!(response.text()?, "Hello World!");
///     Ok(())
/// }
/// ```
pub struct Client<P: StreamProtocol> {
    stream: P::Stream,
    peer: SocketAddr,
    buffer: BytesMut,
    config: ClientConfig,
}

/// HTTP client over TCP
pub type HttpClient = Client<TcpProtocol>;

impl<P: StreamProtocol> Client<P> {
    /// Connect to a server with custom configuration
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, P::connect(addr))
            .await
            .map_err(|_| HelloError::Timeout("Connection timeout".to_string()))??;

        Ok(Self {
            stream,
            peer: addr,
            buffer: BytesMut::with_capacity(1024),
            config,
        })
    }

    /// Connect with default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn get(&mut self, path: &str) -> Result<ClientResponse> {
        self.request(Method::GET, path, &[]).await
    }

    /// Sends one request with a `Content-Length` body and reads its response
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: &[u8],
    ) -> Result<ClientResponse> {
        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nhost: {}\r\n",
            self.peer
        )
        .into_bytes();
        if !body.is_empty() || method == Method::POST || method == Method::PUT {
            request.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
        }
        request.extend_from_slice(b"\r\n");
        request.extend_from_slice(body);

        self.send_raw(&request).await?;
        self.read_response(method == Method::HEAD).await
    }

    /// Writes raw bytes to the connection
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        timeout(self.config.write_timeout, self.stream.write_all(data))
            .await
            .map_err(|_| HelloError::Timeout("Write timeout".to_string()))??;
        timeout(self.config.write_timeout, self.stream.flush())
            .await
            .map_err(|_| HelloError::Timeout("Flush timeout".to_string()))??;
        Ok(())
    }

    /// Reads the next response. Responses to `HEAD` carry no body.
    pub async fn read_response(&mut self, head_request: bool) -> Result<ClientResponse> {
        loop {
            if let Some(response) = self.try_parse(head_request)? {
                return Ok(response);
            }
            if self.buffer.len() > self.config.max_response_size {
                return Err(HelloError::Http(format!(
                    "response exceeds {} bytes",
                    self.config.max_response_size
                )));
            }
            if self.fill_buffer().await? == 0 {
                return Err(HelloError::Http(
                    "connection closed before response completed".to_string(),
                ));
            }
        }
    }

    /// Reads until the server closes the connection, returning any extra bytes
    pub async fn read_to_close(&mut self) -> Result<Vec<u8>> {
        while self.fill_buffer().await? > 0 {}
        Ok(self.buffer.split().to_vec())
    }

    async fn fill_buffer(&mut self) -> Result<usize> {
        timeout(self.config.read_timeout, self.stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| HelloError::Timeout("Read timeout".to_string()))?
            .map_err(HelloError::Io)
    }

    fn try_parse(&mut self, head_request: bool) -> Result<Option<ClientResponse>> {
        let parsed = {
            let mut headers = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut headers);
            match response.parse(&self.buffer[..]) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let status = StatusCode::from_u16(response.code.unwrap_or(0))
                        .map_err(|e| HelloError::Http(format!("invalid status: {e}")))?;
                    let mut map = HeaderMap::new();
                    for header in response.headers.iter() {
                        let name = HeaderName::from_bytes(header.name.as_bytes())
                            .map_err(|e| HelloError::Http(format!("invalid header name: {e}")))?;
                        let value = HeaderValue::from_bytes(header.value)
                            .map_err(|e| HelloError::Http(format!("invalid header value: {e}")))?;
                        map.append(name, value);
                    }
                    Some((head_len, status, map))
                }
                Ok(httparse::Status::Partial) => None,
                Err(e) => return Err(HelloError::Http(format!("Failed to parse response: {e}"))),
            }
        };

        let Some((head_len, status, headers)) = parsed else {
            return Ok(None);
        };

        let body_len = if head_request {
            0
        } else {
            headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or_else(|| HelloError::Http("response without Content-Length".to_string()))?
        };

        if self.buffer.len() < head_len + body_len {
            return Ok(None);
        }

        self.buffer.advance(head_len);
        let body = self.buffer.split_to(body_len).freeze();
        Ok(Some(ClientResponse {
            status,
            headers,
            body,
        }))
    }
}
