// ============================================================================
// HTTP API
// ============================================================================
//
// /health            - aggregated component health, always 200
// /v1/orders/...     - order endpoints, behind bearer authentication
//
// Extractor failures (bad JSON, bad path id, bad query) are reported with
// the same error body as every other failure.
//
// ============================================================================

pub mod auth;
pub mod dto;
mod handlers;

use actix::Addr;
use actix_web::middleware::from_fn;
use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::actors::{GetSystemHealth, HealthMonitorActor};
use crate::clients::TokenVerifier;
use crate::domain::order::{OrderCommandHandler, OrderQueryHandler};
use crate::errors::ServiceError;

/// Shared application state handed to every request.
pub struct ApiState {
    pub commands: Arc<OrderCommandHandler>,
    pub queries: Arc<OrderQueryHandler>,
    pub verifier: Arc<dyn TokenVerifier>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/v1")
            .app_data(web::JsonConfig::default().error_handler(|err, _| ServiceError::BadInput(err.to_string()).into()))
            .app_data(web::PathConfig::default().error_handler(|err, _| ServiceError::BadInput(err.to_string()).into()))
            .app_data(
                web::QueryConfig::default().error_handler(|err, _| ServiceError::BadInput(err.to_string()).into()),
            )
            .service(
                web::scope("/orders")
                    .wrap(from_fn(auth::authenticate))
                    .route("", web::post().to(handlers::place_order))
                    .route("", web::get().to(handlers::list_orders))
                    .route("/user", web::get().to(handlers::get_user_orders))
                    .route("/{id}", web::get().to(handlers::get_order))
                    .route("/{id}/status", web::patch().to(handlers::update_status))
                    .route("/{id}/ttl", web::get().to(handlers::get_ttl)),
            ),
    );
}

async fn health(monitor: web::Data<Addr<HealthMonitorActor>>) -> HttpResponse {
    match monitor.send(GetSystemHealth).await {
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            tracing::warn!(error = %e, "Health monitor unreachable");
            HttpResponse::Ok().json(serde_json::json!({ "overall_status": "unknown" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderCreatedEvent, OrderStatus};
    use crate::testing::{self, CommandHarness, FakeTokenVerifier, InMemoryViewStore};
    use actix::Actor;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use uuid::Uuid;

    const TOKEN: &str = "good-token";

    struct Fixture {
        harness: CommandHarness,
        queries: Arc<OrderQueryHandler>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                harness: CommandHarness::new(false),
                queries: Arc::new(OrderQueryHandler::new(Arc::new(InMemoryViewStore::default()))),
            }
        }

        fn state(&self, user_id: Uuid) -> web::Data<ApiState> {
            web::Data::new(ApiState {
                commands: self.harness.handler.clone(),
                queries: self.queries.clone(),
                verifier: Arc::new(FakeTokenVerifier::with_token(TOKEN, user_id)),
            })
        }

        async fn materialize(&self, order: &Order) {
            let products: HashMap<Uuid, _> = order
                .items
                .iter()
                .map(|item| (item.product_id, testing::product(item.product_id, item.product_price)))
                .collect();
            self.queries
                .materialize_order_view(&OrderCreatedEvent::from_order(order), &products)
                .await
                .unwrap();
        }
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state)
                    .app_data(web::Data::new(HealthMonitorActor::new(None).start()))
                    .configure(configure),
            )
            .await
        };
    }

    fn authed(req: test::TestRequest) -> test::TestRequest {
        req.insert_header(("Authorization", format!("Bearer {}", TOKEN)))
    }

    fn place_body() -> Value {
        json!({
            "items": [{"product_id": Uuid::now_v7(), "quantity": 2, "price": 10.0}],
            "address": {"street": "350 5th Ave", "city": "New York", "state": "NY", "zipcode": "10001", "note": ""}
        })
    }

    #[actix_web::test]
    async fn test_place_order_returns_created_order() {
        let fixture = Fixture::new();
        let user_id = Uuid::now_v7();
        let app = init_app!(fixture.state(user_id));

        let req = authed(test::TestRequest::post().uri("/v1/orders"))
            .set_json(place_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 201);
        assert_eq!(body["data"]["status"], "PENDING");
        assert_eq!(body["data"]["total_price"], 23.5);
        assert_eq!(body["data"]["user_id"], user_id.to_string());
        assert_eq!(fixture.harness.store.len(), 1);
        assert_eq!(fixture.harness.warehouse.movements.lock().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_requests_without_valid_token_are_rejected() {
        let fixture = Fixture::new();
        let app = init_app!(fixture.state(Uuid::now_v7()));

        let missing = test::TestRequest::get().uri("/v1/orders").to_request();
        let resp = test::call_service(&app, missing).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "UNAUTHENTICATED");

        let wrong = test::TestRequest::post()
            .uri("/v1/orders")
            .insert_header(("Authorization", "Bearer someone-else"))
            .set_json(place_body())
            .to_request();
        let resp = test::call_service(&app, wrong).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fixture.harness.store.len(), 0);

        let basic = test::TestRequest::get()
            .uri("/v1/orders")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_request();
        assert_eq!(test::call_service(&app, basic).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_invalid_placement_is_bad_input() {
        let fixture = Fixture::new();
        let app = init_app!(fixture.state(Uuid::now_v7()));

        let empty = authed(test::TestRequest::post().uri("/v1/orders"))
            .set_json(json!({
                "items": [],
                "address": {"street": "s", "city": "c", "state": "st", "zipcode": "10001"}
            }))
            .to_request();
        let resp = test::call_service(&app, empty).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "BAD_INPUT");

        let malformed = authed(test::TestRequest::post().uri("/v1/orders"))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"items\": ")
            .to_request();
        let resp = test::call_service(&app, malformed).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "BAD_INPUT");
        assert!(fixture.harness.warehouse.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_get_order_reads_the_view() {
        let fixture = Fixture::new();
        let order = fixture.harness.placed_order().await;
        fixture.materialize(&order).await;
        let app = init_app!(fixture.state(order.user_id));

        let req = authed(test::TestRequest::get().uri(&format!("/v1/orders/{}", order.id))).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["order_id"], order.id.to_string());
        assert_eq!(body["data"]["items"][0]["product_name"], "Desk lamp");

        let unknown = authed(test::TestRequest::get().uri(&format!("/v1/orders/{}", Uuid::now_v7()))).to_request();
        let resp = test::call_service(&app, unknown).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bad_id = authed(test::TestRequest::get().uri("/v1/orders/not-a-uuid")).to_request();
        let resp = test::call_service(&app, bad_id).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_user_orders_are_scoped_to_caller() {
        let fixture = Fixture::new();
        let mine = fixture.harness.placed_order().await;
        let theirs = fixture.harness.placed_order().await;
        fixture.materialize(&mine).await;
        fixture.materialize(&theirs).await;
        let app = init_app!(fixture.state(mine.user_id));

        let req = authed(test::TestRequest::get().uri("/v1/orders/user")).to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;

        let views = body["data"].as_array().unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0]["order_id"], mine.id.to_string());
    }

    #[actix_web::test]
    async fn test_list_orders_filters() {
        let fixture = Fixture::new();
        let order = fixture.harness.placed_order().await;
        fixture.materialize(&order).await;
        let app = init_app!(fixture.state(Uuid::now_v7()));

        let all = authed(test::TestRequest::get().uri("/v1/orders")).to_request();
        let body: Value = test::read_body_json(test::call_service(&app, all).await).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let delivered = authed(test::TestRequest::get().uri("/v1/orders?status=DELIVERED")).to_request();
        let body: Value = test::read_body_json(test::call_service(&app, delivered).await).await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let pending = authed(test::TestRequest::get().uri("/v1/orders?status=pending")).to_request();
        let body: Value = test::read_body_json(test::call_service(&app, pending).await).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let bogus = authed(test::TestRequest::get().uri("/v1/orders?status=SHIPPED")).to_request();
        assert_eq!(test::call_service(&app, bogus).await.status(), StatusCode::BAD_REQUEST);

        let bad_payment = authed(test::TestRequest::get().uri("/v1/orders?payment_id=nope")).to_request();
        assert_eq!(test::call_service(&app, bad_payment).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_status_update_and_ttl() {
        let fixture = Fixture::new();
        let order = fixture.harness.placed_order().await;
        let app = init_app!(fixture.state(order.user_id));

        let ttl = authed(test::TestRequest::get().uri(&format!("/v1/orders/{}/ttl", order.id))).to_request();
        let resp = test::call_service(&app, ttl).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["ttl_seconds"], 24 * 3600);

        let illegal = authed(test::TestRequest::patch().uri(&format!("/v1/orders/{}/status", order.id)))
            .set_json(json!({"status": "DELIVERED"}))
            .to_request();
        let resp = test::call_service(&app, illegal).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "INVALID_TRANSITION");

        let unknown = authed(test::TestRequest::patch().uri(&format!("/v1/orders/{}/status", order.id)))
            .set_json(json!({"status": "LOST"}))
            .to_request();
        assert_eq!(test::call_service(&app, unknown).await.status(), StatusCode::BAD_REQUEST);

        let expire = authed(test::TestRequest::patch().uri(&format!("/v1/orders/{}/status", order.id)))
            .set_json(json!({"status": "EXPIRED"}))
            .to_request();
        assert_eq!(test::call_service(&app, expire).await.status(), StatusCode::OK);
        assert_eq!(fixture.harness.store.get(order.id).unwrap().status, OrderStatus::Expired);

        let ttl = authed(test::TestRequest::get().uri(&format!("/v1/orders/{}/ttl", order.id))).to_request();
        let resp = test::call_service(&app, ttl).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "NOT_PENDING");

        let missing = authed(test::TestRequest::patch().uri(&format!("/v1/orders/{}/status", Uuid::now_v7())))
            .set_json(json!({"status": "EXPIRED"}))
            .to_request();
        assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health_needs_no_token() {
        let fixture = Fixture::new();
        let app = init_app!(fixture.state(Uuid::now_v7()));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert!(body.get("overall_status").is_some());
    }
}
