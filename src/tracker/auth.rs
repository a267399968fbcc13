//! Caller identity and permission checks.
//!
//! Tinyissue sits behind a front proxy that authenticates users and forwards
//! the user id in a header (`app.user_header`). [`authenticate`] resolves that
//! id to a [`User`] and installs it, together with the user's locale, as
//! request extensions for the protected routes.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::api::SharedState;
use super::models::{Permission, User};
use crate::errors::TrackerError;
use crate::lang;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Locale for rendering this request.
#[derive(Debug, Clone)]
pub struct Locale(pub String);

/// True for requests made by client-side scripts.
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
}

fn caller_id(headers: &HeaderMap, state: &SharedState) -> Option<i64> {
    headers
        .get(&state.settings.user_header)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Middleware for protected routes. Guests get 401 on AJAX requests and a
/// redirect to the landing page otherwise.
pub async fn authenticate(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match caller_id(request.headers(), &state) {
        Some(id) => match state.db.call(move |db| db.get_user(id)).await {
            Ok(user) => user.filter(|u| !u.deleted),
            Err(e) => return TrackerError::Database(e).into_response(),
        },
        None => None,
    };

    let Some(user) = user else {
        debug!(path = %request.uri().path(), "Guest request to protected route");
        if is_ajax(request.headers()) {
            return TrackerError::Unauthenticated.into_response();
        }
        return Redirect::to("/").into_response();
    };

    let locale = if lang::is_supported(&user.language) {
        user.language.clone()
    } else {
        state.settings.language.clone()
    };
    request.extensions_mut().insert(Locale(locale));
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

pub fn require(user: &User, permission: Permission) -> Result<(), TrackerError> {
    if user.permission(permission) {
        Ok(())
    } else {
        Err(TrackerError::Forbidden {
            permission: permission.as_str(),
        })
    }
}
