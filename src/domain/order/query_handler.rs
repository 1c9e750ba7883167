use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::store::OrderViewStore;

use super::events::{OrderCreatedEvent, PaymentUpdatedEvent};
use super::value_objects::{to_money, OrderStatus, PaymentStatus};
use super::view::{
    OrderAddressView, OrderItemView, OrderView, PaymentViewUpdate, ProductDetails, StatusViewUpdate, ViewFilter,
    ViewUpdate, ViewWrite,
};

// ============================================================================
// Order Query Handler - view projection and reads
// ============================================================================
//
// Writes arrive only through broker events; the command store is never read
// here. Payment and status updates that overtake order-created are buffered
// by the view store and folded in when the view is materialized.
//
// ============================================================================

pub struct OrderQueryHandler {
    views: Arc<dyn OrderViewStore>,
}

impl OrderQueryHandler {
    pub fn new(views: Arc<dyn OrderViewStore>) -> Self {
        Self { views }
    }

    /// Build and store the view of a freshly created order.
    ///
    /// `products` must hold one record per distinct product in the order.
    /// A redelivered event returns the view that already exists.
    pub async fn materialize_order_view(
        &self,
        created: &OrderCreatedEvent,
        products: &HashMap<Uuid, ProductDetails>,
    ) -> ServiceResult<OrderView> {
        let view = build_view(created, products)?;

        if let Some(stored) = self.views.insert(&view).await? {
            tracing::info!(
                order_id = %created.order_id,
                view_id = %stored.id,
                status = %stored.status,
                "✅ Order view materialized"
            );
            return Ok(stored);
        }

        tracing::debug!(order_id = %created.order_id, "Order view already exists");
        self.views
            .find_by_order_id(created.order_id)
            .await?
            .ok_or(ServiceError::ViewNotReady(created.order_id))
    }

    pub async fn apply_payment_to_view(&self, event: &PaymentUpdatedEvent) -> ServiceResult<()> {
        let update = ViewUpdate::Payment(PaymentViewUpdate {
            order_id: event.order_id,
            payment_id: event.payment_id,
            payment_status: PaymentStatus::from_wire(&event.status),
            image_url: event.image_url.clone(),
            admin_note: event.note.clone(),
            updated_at: Utc::now(),
        });

        match self.views.apply(&update).await? {
            ViewWrite::Applied => {
                tracing::info!(order_id = %event.order_id, payment_id = %event.payment_id, status = %event.status, "Payment applied to view");
            }
            ViewWrite::Buffered => {
                tracing::info!(order_id = %event.order_id, payment_id = %event.payment_id, "⏳ View not materialized yet, payment buffered");
            }
        }
        Ok(())
    }

    pub async fn apply_status_to_view(&self, order_id: Uuid, status: OrderStatus) -> ServiceResult<()> {
        let update = ViewUpdate::Status(StatusViewUpdate {
            order_id,
            status,
            updated_at: Utc::now(),
        });

        match self.views.apply(&update).await? {
            ViewWrite::Applied => tracing::info!(order_id = %order_id, status = %status, "Status applied to view"),
            ViewWrite::Buffered => {
                tracing::info!(order_id = %order_id, status = %status, "⏳ View not materialized yet, status buffered")
            }
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_by_order_id(&self, order_id: Uuid) -> ServiceResult<OrderView> {
        self.views
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
    }

    pub async fn get_by_user_id(&self, user_id: Uuid) -> ServiceResult<Vec<OrderView>> {
        self.views.list(ViewFilter::User(user_id)).await
    }

    pub async fn get_all(&self) -> ServiceResult<Vec<OrderView>> {
        self.views.list(ViewFilter::All).await
    }

    pub async fn get_by_payment_id(&self, payment_id: Uuid) -> ServiceResult<Vec<OrderView>> {
        self.views.list(ViewFilter::Payment(payment_id)).await
    }

    pub async fn get_by_status(&self, status: OrderStatus) -> ServiceResult<Vec<OrderView>> {
        self.views.list(ViewFilter::Status(status)).await
    }
}

fn build_view(created: &OrderCreatedEvent, products: &HashMap<Uuid, ProductDetails>) -> ServiceResult<OrderView> {
    let now = Utc::now();

    let items = created
        .items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ServiceError::unavailable("product", format!("no record for product {}", item.product_id))
            })?;
            Ok(OrderItemView {
                id: item.id,
                order_id: created.order_id,
                product_id: item.product_id,
                product_name: product.name.clone(),
                product_price: to_money(product.price),
                product_quantity: item.product_quantity,
                product_image_url: product.image_url.clone(),
                product_description: product.description.clone(),
                product_category_id: product.category_id,
                product_category_name: product.category_name.clone(),
                shipping_cost: item.shipping_cost,
                note: item.note.clone(),
                created_at: created.created_at,
                updated_at: now,
            })
        })
        .collect::<ServiceResult<Vec<_>>>()?;

    let address = &created.address;
    Ok(OrderView {
        id: Uuid::now_v7(),
        order_id: created.order_id,
        user_id: created.user_id,
        status: OrderStatus::Pending,
        total_price: created.total_price,
        payment_id: None,
        payment_status: PaymentStatus::Pending,
        payment_image_url: String::new(),
        payment_admin_note: String::new(),
        items,
        address: OrderAddressView {
            id: address.id,
            order_id: created.order_id,
            street: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            zipcode: address.zipcode.clone(),
            note: address.note.clone(),
            created_at: created.created_at,
            updated_at: now,
        },
        created_at: created.created_at,
        updated_at: now,
    })
}
