//! Response pipeline: JSON envelopes, JSON errors and streamed payloads.
//!
//! Every handler response goes through one of three writers:
//!
//! - [`send_json`]: a success envelope rendered as indented JSON
//! - [`send_json_error`]: `{"error": <message>, "status_code": <n>}`
//! - [`stream_bytes`]: a payload copied chunk by chunk from a reader
//!
//! [`send_headers`] answers `HEAD` for a payload without reading it.
//!
//! Each writer records the final status (and any error) on the request's
//! trace record before the response leaves the handler. Streamed bodies may
//! downgrade the record to 500 later if the copy fails.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio_util::io::poll_read_buf;
use tracing::{error, warn};

use crate::context::{RequestContext, TraceHandle};
use crate::error::ServiceError;
use crate::io::ByteSource;

/// Read size for streamed payloads.
const CHUNK_SIZE: usize = 32 * 1024;

/// Client-facing message for internal failures.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

// =============================================================================
// Error Response
// =============================================================================

/// An error to report to the client.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Client-facing message; a string or a field -> message object
    pub message: Value,

    pub status: StatusCode,

    /// Underlying cause, recorded on the trace but never sent to the client
    pub err: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<Value>) -> Self {
        Self {
            message: message.into(),
            status,
            err: None,
        }
    }

    pub fn with_err(mut self, err: impl ToString) -> Self {
        self.err = Some(err.to_string());
        self
    }

    pub fn bad_request(message: impl Into<Value>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ServiceError::NotFound.to_string())
    }

    pub fn unauthorized(message: impl Into<Value>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn server_error(err: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE).with_err(err)
    }
}

impl From<ServiceError> for ErrorResponse {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound => Self::not_found(),
            ServiceError::Forbidden => Self::new(StatusCode::FORBIDDEN, err.to_string()),
            ServiceError::EditConflict => Self::new(StatusCode::CONFLICT, err.to_string()),
            ServiceError::Validation(v) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                Value::Object(
                    v.iter()
                        .map(|(field, msg)| (field.to_string(), Value::from(msg)))
                        .collect(),
                ),
            ),
            ServiceError::Store(store_err) => Self::server_error(store_err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a Value,
    status_code: u16,
}

// =============================================================================
// JSON Writers
// =============================================================================

/// Render `data` as indented JSON with a trailing newline.
fn write_json<T: Serialize + ?Sized>(
    status: StatusCode,
    data: &T,
    headers: HeaderMap,
) -> Result<Response, serde_json::Error> {
    let mut body = serde_json::to_vec_pretty(data)?;
    body.push(b'\n');

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// Write a success envelope and mark the trace with `status`.
///
/// If `data` fails to serialize the trace is marked 500 and an empty 500
/// response is returned instead.
pub fn send_json<T: Serialize + ?Sized>(
    ctx: &RequestContext,
    status: StatusCode,
    data: &T,
    headers: HeaderMap,
) -> Response {
    let trace = ctx.trace();
    trace.update(|r| {
        r.http_status = status.as_u16();
        r.err = None;
    });

    match write_json(status, data, headers) {
        Ok(response) => response,
        Err(err) => {
            error!(trace_id = %trace.id(), error = %err, "failed to encode JSON response");
            trace.update(|r| {
                r.http_status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
                r.err = Some(err.to_string());
            });
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Write an error body and record status, message and cause on the trace.
pub fn send_json_error(ctx: &RequestContext, resp: ErrorResponse) -> Response {
    let trace = ctx.trace();
    trace.update(|r| {
        r.http_status = resp.status.as_u16();
        r.message = Some(resp.message.clone());
        r.err = resp.err.clone();
    });

    if resp.status.is_server_error() {
        error!(
            trace_id = %trace.id(),
            status = resp.status.as_u16(),
            error = resp.err.as_deref(),
            "server error"
        );
    }

    let body = ErrorBody {
        error: &resp.message,
        status_code: resp.status.as_u16(),
    };
    match write_json(resp.status, &body, HeaderMap::new()) {
        Ok(response) => response,
        Err(err) => {
            error!(trace_id = %trace.id(), error = %err, "failed to encode JSON error");
            trace.update(|r| {
                r.http_status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
                r.err = Some(err.to_string());
            });
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

// =============================================================================
// Streaming
// =============================================================================

/// Stream `source` to the client with the given headers and status 200.
///
/// The trace is marked 200 up front. If the copy later fails, or the client
/// goes away before the end, the trace is downgraded to 500. A releasable
/// source is released exactly once when the stream ends, fails or is dropped.
///
/// When `headers` declare a `Content-Length`, the payload counts as delivered
/// once that many bytes have been produced. The server stops polling at that
/// point and drops the body without waiting for end of stream.
pub fn stream_bytes(
    ctx: &RequestContext,
    source: impl Into<ByteSource>,
    headers: HeaderMap,
) -> Response {
    let trace = ctx.trace().clone();
    trace.update(|r| {
        r.http_status = StatusCode::OK.as_u16();
        r.err = None;
    });

    let body = PayloadStream {
        source: Some(source.into()),
        buf: BytesMut::with_capacity(CHUNK_SIZE),
        expected: content_length(&headers),
        sent: 0,
        trace,
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().extend(headers);
    response
}

/// Answer a `HEAD` request for a payload: headers only, source released.
pub fn send_headers(
    ctx: &RequestContext,
    source: impl Into<ByteSource>,
    headers: HeaderMap,
) -> Response {
    let trace = ctx.trace();
    trace.update(|r| {
        r.http_status = StatusCode::OK.as_u16();
        r.err = None;
    });

    if let Err(err) = source.into().release() {
        error!(trace_id = %trace.id(), error = %err, "failed to release content reader");
    }

    let mut response = empty_response(StatusCode::OK);
    response.headers_mut().extend(headers);
    response
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Whether a read error came from the connection rather than the source.
fn is_transport_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
    )
}

struct PayloadStream {
    /// `None` once the source has been released
    source: Option<ByteSource>,
    buf: BytesMut,
    /// Declared `Content-Length`, if any
    expected: Option<u64>,
    sent: u64,
    trace: TraceHandle,
}

impl PayloadStream {
    fn delivered(&self) -> bool {
        self.expected.is_some_and(|expected| self.sent >= expected)
    }

    fn fail(&self, err: String, transport: bool) {
        let trace_id = self.trace.id();
        if transport {
            warn!(trace_id = %trace_id, error = %err, "payload stream interrupted");
        } else {
            error!(trace_id = %trace_id, error = %err, "failed to stream payload");
        }
        self.trace.update(|r| {
            r.http_status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
            r.err = Some(err);
        });
    }

    fn release(&mut self) {
        if let Some(source) = self.source.take() {
            if let Err(err) = source.release() {
                error!(
                    trace_id = %self.trace.id(),
                    error = %err,
                    "failed to release content reader"
                );
            }
        }
    }
}

impl Stream for PayloadStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(source) = this.source.as_mut() else {
            return Poll::Ready(None);
        };

        if this.buf.capacity() == 0 {
            this.buf.reserve(CHUNK_SIZE);
        }

        match ready!(poll_read_buf(Pin::new(source), cx, &mut this.buf)) {
            Ok(0) => {
                this.release();
                Poll::Ready(None)
            }
            Ok(n) => {
                this.sent += n as u64;
                if this.delivered() {
                    this.release();
                }
                Poll::Ready(Some(Ok(this.buf.split().freeze())))
            }
            Err(err) => {
                this.fail(err.to_string(), is_transport_error(&err));
                this.release();
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        if self.source.is_some() && !self.delivered() {
            self.fail("client disconnected before the payload was sent".to_string(), true);
        }
        self.release();
    }
}
