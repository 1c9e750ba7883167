use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::domain::order::{OrderStatus, TransitionOutcome};
use crate::errors::ServiceError;
use super::auth::AuthContext;
use super::dto::{ApiResponse, ListOrdersQuery, PlaceOrderRequest, StatusUpdateRequest, TtlResponse};
use super::ApiState;

// ============================================================================
// Order endpoints
// ============================================================================

#[tracing::instrument(name = "http::place_order", skip_all, fields(user_id = %auth.user_id))]
pub async fn place_order(
    state: web::Data<ApiState>,
    auth: AuthContext,
    body: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse, ServiceError> {
    let command = body.into_inner().into_command(auth.user_id);
    let order = state.commands.place_order(command, &auth.token).await?;

    Ok(HttpResponse::Created().json(ApiResponse::created(order)))
}

pub async fn get_user_orders(state: web::Data<ApiState>, auth: AuthContext) -> Result<HttpResponse, ServiceError> {
    let views = state.queries.get_by_user_id(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(views)))
}

pub async fn get_order(state: web::Data<ApiState>, path: web::Path<Uuid>) -> Result<HttpResponse, ServiceError> {
    let view = state.queries.get_by_order_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(view)))
}

/// Lists every order, or those matching `status` / `payment_id`.
/// `payment_id` wins when both are given.
pub async fn list_orders(
    state: web::Data<ApiState>,
    query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, ServiceError> {
    let query = query.into_inner();

    let views = match (query.payment_id, query.status) {
        (Some(payment_id), _) => state.queries.get_by_payment_id(payment_id).await?,
        (None, Some(status)) => {
            let status: OrderStatus = status.parse()?;
            state.queries.get_by_status(status).await?
        }
        (None, None) => state.queries.get_all().await?,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(views)))
}

#[tracing::instrument(name = "http::update_status", skip_all, fields(order_id = %path))]
pub async fn update_status(
    state: web::Data<ApiState>,
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse, ServiceError> {
    let order_id = path.into_inner();
    let target: OrderStatus = body.status.parse()?;

    match state.commands.set_status(order_id, target).await? {
        TransitionOutcome::Changed { from, to } => {
            tracing::info!(order_id = %order_id, from = %from, to = %to, "Order status changed");
        }
        TransitionOutcome::Unchanged(status) => {
            tracing::debug!(order_id = %order_id, status = %status, "Order already in requested status");
        }
    }

    Ok(HttpResponse::Ok().json(ApiResponse::updated()))
}

pub async fn get_ttl(state: web::Data<ApiState>, path: web::Path<Uuid>) -> Result<HttpResponse, ServiceError> {
    let remaining = state.commands.get_ttl(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(TtlResponse {
        ttl_seconds: remaining.as_secs(),
    })))
}
