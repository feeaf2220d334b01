//! Session endpoints.
//!
//! Each handler rebuilds the session from the request cookie, applies its
//! change, and saves it back so the refreshed cookie rides on the response.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::session::{DataMap, Session, SessionError, Value, CREATED_TIME_KEY};

pub const SESSION_ROUTE_PREFIX: &str = "/api/v1";

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub is_new: bool,
    pub values: JsonMap<String, JsonValue>,
}

impl SessionResponse {
    fn from_session(session: &Session) -> Result<Self> {
        let mut values = JsonMap::with_capacity(session.values.len());
        for (key, value) in &session.values {
            values.insert(key.to_string(), value.to_json().map_err(SessionError::from)?);
        }
        Ok(Self {
            is_new: session.is_new,
            values,
        })
    }
}

/// Load the request's session, failing when the backend could not be read
async fn load_session(state: &AppState, headers: &HeaderMap) -> Result<Session> {
    state
        .session_store
        .get(headers, state.cookie_name())
        .await
        .map_err(|e| AppError::Session(e.source))
}

fn check_writable(key: &str) -> Result<()> {
    if key == CREATED_TIME_KEY {
        return Err(AppError::Validation(format!("'{}' is reserved", key)));
    }
    Ok(())
}

/// GET /api/v1/session - Current session values
///
/// A backend failure degrades to an empty session instead of an error.
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>> {
    let session = match state.session_store.get(&headers, state.cookie_name()).await {
        Ok(session) => session,
        Err(e) => e.into_session(),
    };

    Ok(Json(SessionResponse::from_session(&session)?))
}

/// PUT /api/v1/session/{key} - Set one value and save
pub async fn put_session_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Result<(HeaderMap, Json<SessionResponse>)> {
    check_writable(&key)?;

    let mut session = load_session(&state, &headers).await?;
    session.insert(key, Value::from_json(body));

    let mut response = HeaderMap::new();
    state.session_store.save(&mut response, &mut session).await?;

    Ok((response, Json(SessionResponse::from_session(&session)?)))
}

/// DELETE /api/v1/session/{key} - Remove one value and save
pub async fn delete_session_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<SessionResponse>)> {
    check_writable(&key)?;

    let mut session = load_session(&state, &headers).await?;
    if session.remove(key.as_str()).is_none() {
        return Err(AppError::NotFound(format!("Session value '{}'", key)));
    }

    let mut response = HeaderMap::new();
    state.session_store.save(&mut response, &mut session).await?;

    Ok((response, Json(SessionResponse::from_session(&session)?)))
}

/// POST /api/v1/session/logout - Delete the record and expire the cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap)> {
    let mut session = load_session(&state, &headers).await?;

    let mut response = HeaderMap::new();
    state.session_store.delete(&mut response, &mut session).await?;

    Ok((StatusCode::NO_CONTENT, response))
}

/// GET /api/v1/data/{id} - Read a bare record
pub async fn get_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonMap<String, JsonValue>>> {
    let data = state
        .session_store
        .load(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record '{}'", id)))?;

    let mut body = JsonMap::with_capacity(data.len());
    for (key, value) in data {
        body.insert(key, value.to_json().map_err(SessionError::from)?);
    }
    Ok(Json(body))
}

/// PUT /api/v1/data/{id} - Replace a bare record
pub async fn put_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JsonMap<String, JsonValue>>,
) -> Result<StatusCode> {
    if id.is_empty() {
        return Err(AppError::Validation("Record id must not be empty".to_string()));
    }

    let data: DataMap = body
        .into_iter()
        .map(|(key, value)| (key, Value::from_json(value)))
        .collect();
    state.session_store.store(&id, &data).await?;

    Ok(StatusCode::NO_CONTENT)
}
