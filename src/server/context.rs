//! Wiring between axum requests and [`RequestContext`].

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, Extensions, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::context::{RequestContext, TraceHandle};
use crate::store::AuthData;

/// Response header carrying the trace id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Start a trace for every request and expose its id to the client.
///
/// The handle stored in the request extensions is shared with the handler's
/// context, so the record is emitted once both the handler and any streamed
/// body have let go of it.
pub async fn trace_requests(mut request: Request, next: Next) -> Response {
    let trace = TraceHandle::start(request.method().as_str(), request.uri().path());
    let trace_id = trace.id();
    request.extensions_mut().insert(trace);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Build a context from whatever the middleware stack stored on the request.
pub fn context_from_extensions(extensions: &Extensions) -> RequestContext {
    let trace = extensions
        .get::<TraceHandle>()
        .cloned()
        .unwrap_or_else(|| TraceHandle::start("-", "-"));
    RequestContext::new(trace, extensions.get::<AuthData>().copied())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(context_from_extensions(&parts.extensions))
    }
}
