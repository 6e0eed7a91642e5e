//! Route selection and billing validation clients

use async_trait::async_trait;
use callctl_core::{
    models::{Address, Dialroute, Provider},
    traits::{BillingValidator, RouteService},
    AppResult,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::client::PeerClient;

/// HTTP client of the route manager
pub struct HttpRouteService {
    client: PeerClient,
}

impl HttpRouteService {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RouteService for HttpRouteService {
    async fn dialroutes_get(&self, customer_id: Uuid, target: &str) -> AppResult<Vec<Dialroute>> {
        self.client
            .get_query(
                "/v1/dialroutes",
                &[
                    ("customer_id", customer_id.to_string()),
                    ("target", target.to_string()),
                ],
            )
            .await
    }

    async fn provider_get(&self, provider_id: Uuid) -> AppResult<Provider> {
        self.client
            .get(&format!("/v1/providers/{}", provider_id))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct Validity {
    valid: bool,
}

/// HTTP client of the billing manager
pub struct HttpBillingValidator {
    client: PeerClient,
}

impl HttpBillingValidator {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BillingValidator for HttpBillingValidator {
    async fn is_valid_balance(&self, customer_id: Uuid, country: Option<&str>) -> AppResult<bool> {
        let res: Validity = self
            .client
            .post(
                "/v1/billings/validate/balance",
                &json!({
                    "customer_id": customer_id,
                    "reference_type": "call",
                    "country": country.unwrap_or_default(),
                    "count": 1,
                }),
            )
            .await?;
        Ok(res.valid)
    }

    async fn is_valid_destination(
        &self,
        customer_id: Uuid,
        source: &Address,
        destination: &Address,
    ) -> AppResult<bool> {
        let res: Validity = self
            .client
            .post(
                "/v1/billings/validate/destination",
                &json!({
                    "customer_id": customer_id,
                    "source": source,
                    "destinations": [destination],
                }),
            )
            .await?;
        Ok(res.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_dialroutes_get_passes_target() {
        let server = MockServer::start().await;
        let customer = Uuid::new_v4();
        let route = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/v1/dialroutes"))
            .and(query_param("target", "+82"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": route, "provider_id": Uuid::new_v4(), "priority": 1, "target": "+82" }
            ])))
            .mount(&server)
            .await;

        let svc = HttpRouteService::new(PeerClient::new("route", &server.uri(), 3000).unwrap());
        let routes = svc.dialroutes_get(customer, "+82").await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, route);
    }

    #[tokio::test]
    async fn test_balance_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/billings/validate/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valid": false })))
            .mount(&server)
            .await;

        let svc =
            HttpBillingValidator::new(PeerClient::new("billing", &server.uri(), 3000).unwrap());
        assert!(!svc.is_valid_balance(Uuid::new_v4(), Some("+82")).await.unwrap());
    }
}
