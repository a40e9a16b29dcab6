use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{info, instrument, warn};

use crate::shared::{AppError, AppState};

/// Admin authentication middleware - validates the Authorization Bearer header,
/// requires the admin role and adds AdminClaims to the request.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), auth::require_admin))
#[instrument(skip(state, req, next))]
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header in request");
            AppError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid Authorization header format (expected Bearer token)");
        AppError::Unauthorized("Invalid authorization header format".to_string())
    })?;

    let claims = match state.token_config.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Admin authentication failed: {}", e);
            return Err(e);
        }
    };

    if !claims.is_admin() {
        warn!(sub = %claims.sub, "Non-admin token rejected");
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    info!(sub = %claims.sub, uri = %req.uri(), "Admin request authenticated");

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
