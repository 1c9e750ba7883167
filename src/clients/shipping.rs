use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{ServiceError, ServiceResult};
use super::{ServiceClient, ShippingCostClient};

/// Shipping-Cost service; unauthenticated.
pub struct HttpShippingCostClient {
    client: ServiceClient,
}

impl HttpShippingCostClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct ShippingCostRequest<'a> {
    from_zip: &'a str,
    to_zip: &'a str,
}

#[derive(Deserialize)]
struct ShippingCost {
    shipping_cost: Decimal,
}

#[async_trait]
impl ShippingCostClient for HttpShippingCostClient {
    async fn shipping_cost(&self, from_zip: &str, to_zip: &str) -> ServiceResult<Decimal> {
        let request = self
            .client
            .post("/shipping-cost")
            .json(&ShippingCostRequest { from_zip, to_zip });

        let response = self.client.send(request).await?;
        let quote: ShippingCost = self.client.read_data(response, StatusCode::OK).await?;

        if quote.shipping_cost.is_sign_negative() {
            return Err(ServiceError::unavailable(
                self.client.service(),
                format!("negative shipping cost {}", quote.shipping_cost),
            ));
        }
        Ok(quote.shipping_cost)
    }
}
