use actix_web::body::MessageBody;
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::http::header::AUTHORIZATION;
use actix_web::middleware::Next;
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::errors::ServiceError;
use super::ApiState;

// ============================================================================
// Bearer authentication
// ============================================================================
//
// The middleware hands the bearer token to the identity service and leaves
// an `AuthContext` in the request extensions. Handlers pull it back out
// with the extractor; the raw token travels on because warehouse calls
// need it.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub token: String,
}

fn bearer_token(req: &ServiceRequest) -> Result<String, ServiceError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthenticated("missing authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| ServiceError::Unauthenticated("malformed authorization header".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim().to_string())
        }
        _ => Err(ServiceError::Unauthenticated("expected a bearer token".to_string())),
    }
}

async fn verify(req: &ServiceRequest) -> Result<AuthContext, ServiceError> {
    let token = bearer_token(req)?;
    let state = req
        .app_data::<web::Data<ApiState>>()
        .ok_or_else(|| ServiceError::Unauthenticated("no token verifier configured".to_string()))?;

    let user_id = state.verifier.verify(&token).await?;
    Ok(AuthContext { user_id, token })
}

pub async fn authenticate(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    match verify(&req).await {
        Ok(context) => {
            tracing::debug!(user_id = %context.user_id, path = %req.path(), "Request authenticated");
            req.extensions_mut().insert(context);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(e) => {
            tracing::warn!(path = %req.path(), error = %e, "🔒 Rejected request");
            Ok(req.error_response(e).map_into_right_body())
        }
    }
}

impl FromRequest for AuthContext {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthContext>()
                .cloned()
                .ok_or_else(|| ServiceError::Unauthenticated("request was not authenticated".to_string())),
        )
    }
}
