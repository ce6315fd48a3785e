//! Helpers for testing the docsearch service and binary.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test. When dropped too early, the directory is deleted while the
//!    test still reads from it.
//!
//!  - When using an [`Origin`] or a [`Server`], make sure it is held until all requests to it
//!    have been made. Dropping it stops serving, and further requests fail to connect.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

pub use axum::http::StatusCode;
pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the docsearch crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("docsearch=trace,docsearch_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it as a guard to
/// automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving the given router.
    pub fn with_router(router: Router) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = std::net::TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://{}/{}", self.addr(), path).parse().unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
struct OriginState {
    body: Vec<u8>,
    etag: Option<String>,
    fail_with: Option<StatusCode>,
    delay: Option<Duration>,
    always_not_modified: bool,

    hits: usize,
    not_modified: usize,
    last_if_none_match: Option<String>,
}

/// A web server hosting a single resource at `/index.json` that supports `ETag` revalidation.
///
/// The resource, its `ETag`, failures and response delays can be changed while the server runs.
/// Every request is counted, and the last `If-None-Match` header is recorded.
#[derive(Debug)]
pub struct Origin {
    server: Server,
    state: Arc<Mutex<OriginState>>,
}

impl Origin {
    /// Starts serving `body`, with the given `ETag` if any.
    pub fn new(body: impl Into<Vec<u8>>, etag: Option<&str>) -> Self {
        let state = Arc::new(Mutex::new(OriginState {
            body: body.into(),
            etag: etag.map(str::to_owned),
            ..Default::default()
        }));

        let router = Router::new()
            .route("/index.json", get(serve_resource))
            .with_state(Arc::clone(&state));

        Self {
            server: Server::with_router(router),
            state,
        }
    }

    /// The URL of the hosted resource.
    pub fn url(&self) -> Url {
        self.server.url("index.json")
    }

    /// Replaces the hosted resource and its `ETag`.
    pub fn set_body(&self, body: impl Into<Vec<u8>>, etag: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.body = body.into();
        state.etag = etag.map(str::to_owned);
    }

    /// Makes every following request fail with `status`, or stops failing with `None`.
    pub fn fail_with(&self, status: Option<StatusCode>) {
        self.state.lock().unwrap().fail_with = status;
    }

    /// Delays every following response.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Answers every following request with `304 Not Modified`, even unconditional ones.
    pub fn set_always_not_modified(&self, always: bool) {
        self.state.lock().unwrap().always_not_modified = always;
    }

    /// The number of requests received so far.
    pub fn hits(&self) -> usize {
        self.state.lock().unwrap().hits
    }

    /// The number of `304 Not Modified` responses sent so far.
    pub fn not_modified(&self) -> usize {
        self.state.lock().unwrap().not_modified
    }

    /// The `If-None-Match` header of the last request.
    pub fn last_if_none_match(&self) -> Option<String> {
        self.state.lock().unwrap().last_if_none_match.clone()
    }
}

async fn serve_resource(
    State(state): State<Arc<Mutex<OriginState>>>,
    headers: HeaderMap,
) -> Response {
    let delay = {
        let mut state = state.lock().unwrap();
        state.hits += 1;
        state.last_if_none_match = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        state.delay
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    if let Some(status) = state.fail_with {
        return status.into_response();
    }

    let matches = match (&state.etag, &state.last_if_none_match) {
        (Some(etag), Some(sent)) => etag == sent,
        _ => false,
    };
    if matches || state.always_not_modified {
        state.not_modified += 1;
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let mut response = state.body.clone().into_response();
    if let Some(etag) = state.etag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}
