use axum::http::{header, HeaderMap};

use crate::session_manager::CallerIdentity;
use crate::settings::AuthSettings;

/// Resolve the caller from an `Authorization: Bearer <token>` header.
pub fn caller_identity(headers: &HeaderMap, auth: &AuthSettings) -> Option<CallerIdentity> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        return None;
    }
    auth.tokens.get(token).map(|user_id| CallerIdentity {
        user_id: user_id.clone(),
    })
}
