use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::extractors::{JsonBody, SessionCodePath};
use crate::response::{created, ok, AppError, SessionEnvelope};
use crate::session::events::SessionEvent;
use crate::session::log::{self, PostMessage};
use crate::session::{self, create_session};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create))
        .route("/:code", get(get_session))
        .route("/:code/messages", get(list_messages).post(post_message))
        .route("/:code/events", get(events))
}

/// Allocates a session and reports the outcome through the `{state, msg, data}` envelope.
pub async fn create(State(state): State<AppState>) -> SessionEnvelope {
    match create_session(state.store(), &state.config().session, session::timestamp()) {
        Ok(code) => SessionEnvelope::created(&code),
        Err(err) => {
            if matches!(err, session::AllocationError::Store(_)) {
                tracing::error!(error = %err, "Session allocation failed");
            }
            SessionEnvelope::from(&err)
        }
    }
}

async fn get_session(
    SessionCodePath(code): SessionCodePath,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let view = log::load_session(state.store(), &code, state.config().session.ttl())?;
    Ok(ok(view))
}

async fn list_messages(
    SessionCodePath(code): SessionCodePath,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let messages = log::read_messages(state.store(), &code)?;
    Ok(ok(messages))
}

async fn post_message(
    SessionCodePath(code): SessionCodePath,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PostMessage>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let stored = {
        let mut rng = rand::thread_rng();
        log::post_message(state.store(), &code, req, session::timestamp(), &mut rng)?
    };

    let listeners = state.events().publish(SessionEvent::Message {
        code: code.to_string(),
        message: stored.clone(),
    });
    tracing::debug!(code = %code, id = %stored.id, listeners, "Message appended");

    Ok(created(stored))
}

async fn events(
    SessionCodePath(code): SessionCodePath,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe first; a sweep landing after the liveness check must still reach this stream.
    let mut rx = state.events().subscribe();
    log::ensure_live(state.store(), &code)?;

    let slot = state
        .try_acquire_sse()
        .ok_or_else(|| AppError::too_many_requests("Too many SSE connections"))?;

    let mut shutdown_rx = state.shutdown_rx();
    let code = code.to_string();

    let stream = async_stream::stream! {
        let _slot = slot;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) if event.code() != code => {}
                    Ok(SessionEvent::Message { message, .. }) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            yield Ok(Event::default().event("message").id(message.id.clone()).data(json));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to encode session event"),
                    },
                    Ok(SessionEvent::Closed { .. }) => {
                        yield Ok(Event::default().event("closed").data(code.clone()));
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(code = %code, skipped, "Event stream lagged");
                        yield Ok(Event::default().event("lagged").data(skipped.to_string()));
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
