use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use super::{ServiceClient, TokenVerifier};

/// Token verification against the identity provider's `/v1/auth/verify`.
pub struct HttpTokenVerifier {
    client: ServiceClient,
}

impl HttpTokenVerifier {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct VerifiedToken {
    user_id: Uuid,
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> ServiceResult<Uuid> {
        let request = self.client.get("/v1/auth/verify").bearer_auth(token);
        let response = self.client.send(request).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ServiceError::Unauthenticated("token rejected".to_string()))
            }
            _ => {
                let verified: VerifiedToken = self.client.read_data(response, StatusCode::OK).await?;
                Ok(verified.user_id)
            }
        }
    }
}
