use super::codec::{HttpCodec, HttpCodecError, IncomingRequest};
use super::handler::RequestHandler;
use crate::common::ServerConfig;
use crate::Result;
use ::http::header::{CONNECTION, CONTENT_LENGTH};
use ::http::{HeaderValue, Method, Response, StatusCode};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Serves requests on one connection until it closes, idles out or errs
///
/// Requests are answered in arrival order. A malformed request gets a
/// `400` (or `431` for an oversized head) and ends the connection.
pub async fn serve_connection<S, H>(
    stream: S,
    peer: SocketAddr,
    handler: &H,
    config: &ServerConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: RequestHandler + ?Sized,
{
    let mut framed = Framed::new(stream, HttpCodec::new(config.max_head_size));

    loop {
        let next = match timeout(config.idle_timeout, framed.next()).await {
            Ok(next) => next,
            Err(_) => {
                debug!(%peer, "Idle timeout");
                break;
            }
        };

        let IncomingRequest {
            request,
            keep_alive,
        } = match next {
            None => {
                debug!(%peer, "Client closed connection");
                break;
            }
            Some(Ok(incoming)) => incoming,
            Some(Err(HttpCodecError::Io(e))) => return Err(e.into()),
            Some(Err(HttpCodecError::IncompleteRequest)) => {
                debug!(%peer, "Client closed connection mid-request");
                break;
            }
            Some(Err(e)) => {
                warn!(%peer, error = %e, "Rejecting malformed request");
                let status = match e {
                    HttpCodecError::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                send_response(&mut framed, error_response(status), peer, config.write_timeout)
                    .await?;
                break;
            }
        };

        debug!(
            %peer,
            method = %request.method(),
            uri = %request.uri(),
            "Received request"
        );

        let mut response = handler.handle(&request);
        prepare_response(&mut response, request.method(), keep_alive);

        if !send_response(&mut framed, response, peer, config.write_timeout).await? {
            return Ok(());
        }
        if !keep_alive {
            break;
        }
    }

    if framed.codec().body_pending() {
        lingering_close(framed, config.idle_timeout).await;
    }
    Ok(())
}

/// Writes one response. Returns false if the write timed out.
async fn send_response<S>(
    framed: &mut Framed<S, HttpCodec>,
    response: Response<Bytes>,
    peer: SocketAddr,
    write_timeout: Duration,
) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = response.status();
    match timeout(write_timeout, framed.send(response)).await {
        Ok(result) => {
            result?;
            debug!(%peer, status = status.as_u16(), "Sent response");
            Ok(true)
        }
        Err(_) => {
            warn!(%peer, "Write timeout");
            Ok(false)
        }
    }
}

/// Adds the headers every response carries and strips bodies from `HEAD`
fn prepare_response(response: &mut Response<Bytes>, method: &Method, keep_alive: bool) {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static(connection));

    if method == Method::HEAD {
        let len = response.body().len();
        response
            .headers_mut()
            .entry(CONTENT_LENGTH)
            .or_insert_with(|| HeaderValue::from(len));
        *response.body_mut() = Bytes::new();
    }
}

fn error_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Half-closes the connection and discards whatever the client still sends.
///
/// Dropping a socket with unread input makes the kernel send RST, which can
/// destroy the response before the client reads it.
async fn lingering_close<S>(framed: Framed<S, HttpCodec>, linger: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut io = framed.into_inner();
    if io.shutdown().await.is_err() {
        return;
    }
    let _ = timeout(linger, tokio::io::copy(&mut io, &mut tokio::io::sink())).await;
}
