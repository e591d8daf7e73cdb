//! HTTP/1.1 framing for the fixture
//!
//! [`HttpCodec`] decodes request heads into [`http::Request<()>`] and encodes
//! [`http::Response<Bytes>`]. Request bodies are never surfaced: once a head is
//! decoded, the body it announces is skipped on the following `decode` calls
//! so keep-alive and pipelined requests stay framed.

use ::http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use ::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri, Version};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Header slots tried first; heads with more retry with room for the whole head
const INLINE_HEADERS: usize = 100;

/// Shortest possible header line, `a:\r\n`
const MIN_HEADER_LINE: usize = 4;

/// Longest chunk-size line (with extensions) accepted before giving up
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum HttpCodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("Connection closed mid-request")]
    IncompleteRequest,
}

/// The request target exactly as it appeared on the request line
///
/// Stored as a request extension. Targets that [`Uri`] cannot represent are
/// decoded with a `/` URI, so this is the only place their text survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget(pub String);

/// A decoded request head plus the connection decision it implies
#[derive(Debug)]
pub struct IncomingRequest {
    pub request: Request<()>,
    /// Whether the connection may carry another request after this one
    pub keep_alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Idle,
    Length { remaining: u64 },
    Chunked(ChunkState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
}

/// Request decoder and response encoder
#[derive(Debug)]
pub struct HttpCodec {
    max_head_size: usize,
    body: BodyState,
}

impl HttpCodec {
    pub fn new(max_head_size: usize) -> Self {
        Self {
            max_head_size,
            body: BodyState::Idle,
        }
    }

    /// Enough header slots for any head within `max_head_size`
    fn header_capacity(&self) -> usize {
        self.max_head_size / MIN_HEADER_LINE + 1
    }

    /// True while part of the last request's body has not been consumed
    pub fn body_pending(&self) -> bool {
        self.body != BodyState::Idle
    }

    /// Consumes body bytes from `src`. Returns true once the body is done.
    fn skip_body(&mut self, src: &mut BytesMut) -> Result<bool, HttpCodecError> {
        let capacity = self.header_capacity();
        loop {
            match &mut self.body {
                BodyState::Idle => return Ok(true),
                BodyState::Length { remaining } => {
                    *remaining -= skip_up_to(src, *remaining);
                    if *remaining > 0 {
                        return Ok(false);
                    }
                    self.body = BodyState::Idle;
                }
                BodyState::Chunked(state) => match state {
                    ChunkState::Size => match httparse::parse_chunk_size(&src[..]) {
                        Ok(httparse::Status::Complete((consumed, size))) => {
                            src.advance(consumed);
                            *state = if size == 0 {
                                ChunkState::Trailers
                            } else {
                                ChunkState::Data { remaining: size }
                            };
                        }
                        Ok(httparse::Status::Partial) => {
                            if src.len() > MAX_CHUNK_LINE {
                                return Err(HttpCodecError::InvalidRequest(
                                    "chunk size line too long".to_string(),
                                ));
                            }
                            return Ok(false);
                        }
                        Err(_) => {
                            return Err(HttpCodecError::InvalidRequest(
                                "invalid chunk size".to_string(),
                            ));
                        }
                    },
                    ChunkState::Data { remaining } => {
                        *remaining -= skip_up_to(src, *remaining);
                        if *remaining > 0 {
                            return Ok(false);
                        }
                        *state = ChunkState::DataEnd;
                    }
                    ChunkState::DataEnd => {
                        if src.len() < 2 {
                            return Ok(false);
                        }
                        if &src[..2] != b"\r\n" {
                            return Err(HttpCodecError::InvalidRequest(
                                "chunk data not terminated by CRLF".to_string(),
                            ));
                        }
                        src.advance(2);
                        *state = ChunkState::Size;
                    }
                    ChunkState::Trailers => {
                        let consumed = match trailer_len(&src[..], capacity) {
                            Ok(httparse::Status::Complete(n)) => Some(n),
                            Err(httparse::Error::TooManyHeaders) => {
                                return Err(HttpCodecError::HeadTooLarge(self.max_head_size));
                            }
                            Ok(httparse::Status::Partial) => None,
                            Err(e) => {
                                return Err(HttpCodecError::HttpParse(format!(
                                    "Failed to parse trailers: {e}"
                                )));
                            }
                        };
                        match consumed {
                            Some(n) => {
                                src.advance(n);
                                self.body = BodyState::Idle;
                            }
                            None if src.len() > self.max_head_size => {
                                return Err(HttpCodecError::HeadTooLarge(self.max_head_size));
                            }
                            None => return Ok(false),
                        }
                    }
                },
            }
        }
    }
}

/// Length of a complete trailer section, retrying with `capacity` slots when
/// the inline ones run out
fn trailer_len(src: &[u8], capacity: usize) -> httparse::Result<usize> {
    let mut trailers = [httparse::EMPTY_HEADER; INLINE_HEADERS];
    let mut overflow = Vec::new();
    let mut status = httparse::parse_headers(src, &mut trailers);
    if matches!(status, Err(httparse::Error::TooManyHeaders)) {
        overflow.resize(capacity, httparse::EMPTY_HEADER);
        status = httparse::parse_headers(src, &mut overflow);
    }
    Ok(match status? {
        httparse::Status::Complete((n, _)) => httparse::Status::Complete(n),
        httparse::Status::Partial => httparse::Status::Partial,
    })
}

/// Drops up to `limit` bytes from the front of `src`, returning how many went
fn skip_up_to(src: &mut BytesMut, limit: u64) -> u64 {
    let n = limit.min(src.len() as u64);
    src.advance(n as usize);
    n
}

/// Iterates the comma-separated tokens of every `name` header, lowercased
fn header_tokens(headers: &HeaderMap, name: HeaderName) -> impl Iterator<Item = String> + '_ {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
}

fn body_framing(headers: &HeaderMap) -> Result<BodyState, HttpCodecError> {
    if headers.contains_key(TRANSFER_ENCODING) {
        if headers.contains_key(CONTENT_LENGTH) {
            return Err(HttpCodecError::InvalidRequest(
                "both Transfer-Encoding and Content-Length present".to_string(),
            ));
        }
        return match header_tokens(headers, TRANSFER_ENCODING).last() {
            Some(last) if last == "chunked" => Ok(BodyState::Chunked(ChunkState::Size)),
            _ => Err(HttpCodecError::InvalidRequest(
                "request body must end with chunked transfer coding".to_string(),
            )),
        };
    }

    let mut length: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| HttpCodecError::InvalidRequest("invalid Content-Length".to_string()))?;
        match length {
            Some(existing) if existing != parsed => {
                return Err(HttpCodecError::InvalidRequest(
                    "conflicting Content-Length values".to_string(),
                ));
            }
            _ => length = Some(parsed),
        }
    }

    Ok(match length {
        Some(remaining) if remaining > 0 => BodyState::Length { remaining },
        _ => BodyState::Idle,
    })
}

fn wants_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let mut close = false;
    let mut keep_alive = false;
    for token in header_tokens(headers, CONNECTION) {
        match token.as_str() {
            "close" => close = true,
            "keep-alive" => keep_alive = true,
            _ => {}
        }
    }

    if close {
        false
    } else if version == Version::HTTP_10 {
        keep_alive
    } else {
        true
    }
}

fn expects_continue(headers: &HeaderMap) -> bool {
    header_tokens(headers, EXPECT).any(|token| token == "100-continue")
}

fn build_request(parsed: &httparse::Request<'_, '_>) -> Result<Request<()>, HttpCodecError> {
    let method = parsed
        .method
        .ok_or_else(|| HttpCodecError::HttpParse("missing method".to_string()))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| HttpCodecError::InvalidRequest(format!("invalid method: {e}")))?;

    let path = parsed
        .path
        .ok_or_else(|| HttpCodecError::HttpParse("missing request target".to_string()))?;
    let uri = path.parse::<Uri>().unwrap_or_else(|e| {
        debug!(request_target = path, error = %e, "Request target is not a URI, decoding as /");
        Uri::from_static("/")
    });

    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut request = Request::new(());
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.version_mut() = version;
    request
        .extensions_mut()
        .insert(RequestTarget(path.to_string()));

    let headers = request.headers_mut();
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| HttpCodecError::InvalidRequest(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| HttpCodecError::InvalidRequest(format!("invalid header value: {e}")))?;
        headers.append(name, value);
    }

    Ok(request)
}

impl Decoder for HttpCodec {
    type Item = IncomingRequest;
    type Error = HttpCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.skip_body(src)? || src.is_empty() {
            return Ok(None);
        }

        let parsed = {
            let mut headers = [httparse::EMPTY_HEADER; INLINE_HEADERS];
            let mut overflow = Vec::new();
            let mut req = httparse::Request::new(&mut headers[..]);
            let mut status = req.parse(&src[..]);
            if matches!(status, Err(httparse::Error::TooManyHeaders)) {
                overflow.resize(self.header_capacity(), httparse::EMPTY_HEADER);
                req = httparse::Request::new(&mut overflow[..]);
                status = req.parse(&src[..]);
            }
            match status {
                Ok(httparse::Status::Complete(head_len)) => {
                    if head_len > self.max_head_size {
                        return Err(HttpCodecError::HeadTooLarge(self.max_head_size));
                    }
                    Some((head_len, build_request(&req)?))
                }
                Ok(httparse::Status::Partial) => None,
                Err(httparse::Error::TooManyHeaders) => {
                    return Err(HttpCodecError::HeadTooLarge(self.max_head_size));
                }
                Err(e) => {
                    return Err(HttpCodecError::HttpParse(format!(
                        "Failed to parse headers: {e}"
                    )));
                }
            }
        };

        let Some((head_len, request)) = parsed else {
            if src.len() > self.max_head_size {
                return Err(HttpCodecError::HeadTooLarge(self.max_head_size));
            }
            return Ok(None);
        };

        src.advance(head_len);
        self.body = body_framing(request.headers())?;

        let mut keep_alive = wants_keep_alive(request.version(), request.headers());
        // We answer without a 100 Continue; the client may never send the body.
        if self.body_pending() && expects_continue(request.headers()) {
            keep_alive = false;
        }

        Ok(Some(IncomingRequest {
            request,
            keep_alive,
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        let only_line_breaks = buf.iter().all(|b| *b == b'\r' || *b == b'\n');
        if only_line_breaks && !self.body_pending() {
            buf.clear();
            Ok(None)
        } else {
            Err(HttpCodecError::IncompleteRequest)
        }
    }
}

impl Encoder<Response<Bytes>> for HttpCodec {
    type Error = HttpCodecError;

    fn encode(&mut self, item: Response<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (parts, body) = item.into_parts();

        let status_line = format!(
            "HTTP/1.1 {} {}\r\n",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or("")
        );
        dst.reserve(status_line.len() + body.len() + 64);
        dst.extend_from_slice(status_line.as_bytes());

        for (name, value) in parts.headers.iter() {
            dst.extend_from_slice(name.as_str().as_bytes());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(value.as_bytes());
            dst.extend_from_slice(b"\r\n");
        }
        if !parts.headers.contains_key(CONTENT_LENGTH) {
            dst.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
        }

        dst.extend_from_slice(b"\r\n");
        dst.extend_from_slice(&body);
        Ok(())
    }
}
