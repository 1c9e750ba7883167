use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceResult;
use super::{ServiceClient, StockMovement, WarehouseClient};

pub struct HttpWarehouseClient {
    client: ServiceClient,
}

impl HttpWarehouseClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct NearestRequest<'a> {
    zip_code: &'a str,
    product_id: Uuid,
}

#[derive(Deserialize)]
struct NearestWarehouse {
    zip_code: String,
}

#[async_trait]
impl WarehouseClient for HttpWarehouseClient {
    async fn nearest_warehouse_zip(&self, token: &str, product_id: Uuid, zipcode: &str) -> ServiceResult<String> {
        let request = self
            .client
            .post("/v1/warehouse-products/nearest")
            .bearer_auth(token)
            .json(&NearestRequest {
                zip_code: zipcode,
                product_id,
            });

        let response = self.client.send(request).await?;
        let nearest: NearestWarehouse = self.client.read_data(response, StatusCode::OK).await?;

        tracing::debug!(product_id = %product_id, warehouse_zip = %nearest.zip_code, "Resolved nearest warehouse");
        Ok(nearest.zip_code)
    }

    async fn move_out(&self, token: &str, movement: &StockMovement) -> ServiceResult<()> {
        let request = self
            .client
            .post("/v1/stock-movements/moveout")
            .bearer_auth(token)
            .json(movement);

        let response = self.client.send(request).await?;
        self.client.require_status(response, StatusCode::CREATED)?;

        tracing::info!(items = movement.items.len(), zipcode = %movement.zipcode, "📦 Stock moved out");
        Ok(())
    }
}
