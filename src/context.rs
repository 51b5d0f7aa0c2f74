//! Request-scoped context: caller identity and the per-request trace record.
//!
//! A [`RequestContext`] is built once per inbound request and passed by
//! reference into every media service and response pipeline call. Nothing in
//! it is shared between requests.
//!
//! The trace record is finalized by the response pipeline and emitted to the
//! log sink (target `snap_vault::trace`) when the last [`TraceHandle`] is
//! dropped. For streamed responses that happens only after the body has been
//! fully sent or abandoned by the client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::AuthData;

/// Observability state of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub id: Uuid,

    /// Status the server considers final (0 until a response is written)
    pub http_status: u16,

    /// Error that caused a failure status, if any
    pub err: Option<String>,

    /// Client-facing message attached by the error writer
    pub message: Option<Value>,
}

impl TraceRecord {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            http_status: 0,
            err: None,
            message: None,
        }
    }
}

struct TraceCell {
    method: String,
    path: String,
    started: Instant,
    record: Mutex<TraceRecord>,
}

impl TraceCell {
    fn lock(&self) -> MutexGuard<'_, TraceRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TraceCell {
    fn drop(&mut self) {
        let record = self.lock().clone();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let message = record.message.as_ref().map(Value::to_string);

        match record.http_status {
            500.. => error!(
                target: "snap_vault::trace",
                trace_id = %record.id,
                method = %self.method,
                path = %self.path,
                status = record.http_status,
                elapsed_ms,
                error = record.err.as_deref(),
                message = message.as_deref(),
                "request finished"
            ),
            400..=499 => warn!(
                target: "snap_vault::trace",
                trace_id = %record.id,
                method = %self.method,
                path = %self.path,
                status = record.http_status,
                elapsed_ms,
                error = record.err.as_deref(),
                message = message.as_deref(),
                "request finished"
            ),
            _ => info!(
                target: "snap_vault::trace",
                trace_id = %record.id,
                method = %self.method,
                path = %self.path,
                status = record.http_status,
                elapsed_ms,
                "request finished"
            ),
        }
    }
}

/// Shared handle to a request's trace record.
#[derive(Clone)]
pub struct TraceHandle(Arc<TraceCell>);

impl TraceHandle {
    /// Start a new trace for a request.
    pub fn start(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self(Arc::new(TraceCell {
            method: method.into(),
            path: path.into(),
            started: Instant::now(),
            record: Mutex::new(TraceRecord::new(Uuid::new_v4())),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.0.lock().id
    }

    /// Mutate the record under its lock.
    pub fn update(&self, f: impl FnOnce(&mut TraceRecord)) {
        f(&mut self.0.lock());
    }

    /// Copy of the record as it stands now.
    pub fn snapshot(&self) -> TraceRecord {
        self.0.lock().clone()
    }
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle")
            .field("method", &self.0.method)
            .field("path", &self.0.path)
            .field("record", &self.snapshot())
            .finish()
    }
}

/// Per-request context carried into the service and response pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace: TraceHandle,
    auth: Option<AuthData>,
}

impl RequestContext {
    pub fn new(trace: TraceHandle, auth: Option<AuthData>) -> Self {
        Self { trace, auth }
    }

    /// An anonymous context with a fresh trace, for callers outside HTTP.
    pub fn detached() -> Self {
        Self::new(TraceHandle::start("-", "-"), None)
    }

    pub fn with_auth(mut self, auth: AuthData) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The authenticated caller, if any.
    pub fn auth(&self) -> Option<&AuthData> {
        self.auth.as_ref()
    }

    pub fn trace(&self) -> &TraceHandle {
        &self.trace
    }
}
