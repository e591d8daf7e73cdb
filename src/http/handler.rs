use ::http::{Request, Response};
use bytes::Bytes;

/// Body every fixture response carries
pub const HELLO_BODY: &str = "Hello World!";

/// Produces the response for a decoded request head
///
/// Handlers are shared across connections and must not block. Closures of
/// the right shape are handlers too:
///
/// ```
/// use bytes::Bytes;
/// use hellosrv::http::RequestHandler;
///
/// let teapot = |_req: &http::Request<()>| {
///     let mut response = http::Response::new(Bytes::from_static(b"short and stout"));
///     *response.status_mut() = http::StatusCode::IM_A_TEAPOT;
///     response
/// };
/// let response = teapot.handle(&http::Request::new(()));
/// assert_eq!(response.status(), 418);
/// ```
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: &Request<()>) -> Response<Bytes>;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request<()>) -> Response<Bytes> + Send + Sync + 'static,
{
    fn handle(&self, request: &Request<()>) -> Response<Bytes> {
        self(request)
    }
}

/// Answers every request with `200 OK` and [`HELLO_BODY`]
#[derive(Debug, Clone)]
pub struct HelloHandler {
    body: Bytes,
}

impl HelloHandler {
    pub fn new() -> Self {
        Self {
            body: Bytes::from_static(HELLO_BODY.as_bytes()),
        }
    }
}

impl Default for HelloHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for HelloHandler {
    fn handle(&self, _request: &Request<()>) -> Response<Bytes> {
        Response::new(self.body.clone())
    }
}
