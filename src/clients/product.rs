use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::domain::order::ProductDetails;
use crate::errors::ServiceResult;
use super::{ProductCatalog, ServiceClient};

pub struct HttpProductCatalog {
    client: ServiceClient,
}

impl HttpProductCatalog {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn product(&self, token: Option<&str>, product_id: Uuid) -> ServiceResult<ProductDetails> {
        let mut request = self.client.get(&format!("/v1/products/{}", product_id));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = self.client.send(request).await?;
        self.client.read_data(response, StatusCode::OK).await
    }
}
