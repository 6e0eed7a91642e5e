//! Workflow engine client

use async_trait::async_trait;
use callctl_core::{
    models::{Action, Activeflow},
    traits::WorkflowEngine,
    AppResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use crate::client::PeerClient;

#[derive(Debug, Serialize, Deserialize, Default)]
struct Variables {
    #[serde(default)]
    variables: HashMap<String, String>,
}

/// HTTP client of the workflow engine
pub struct HttpWorkflowEngine {
    client: PeerClient,
}

impl HttpWorkflowEngine {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    #[instrument(skip(self))]
    async fn activeflow_create(
        &self,
        id: Uuid,
        customer_id: Uuid,
        flow_id: Uuid,
        reference_id: Uuid,
    ) -> AppResult<Activeflow> {
        self.client
            .post(
                "/v1/activeflows",
                &json!({
                    "id": id,
                    "customer_id": customer_id,
                    "flow_id": flow_id,
                    "reference_type": Activeflow::REFERENCE_TYPE_CALL,
                    "reference_id": reference_id,
                }),
            )
            .await
    }

    async fn activeflow_next_action(
        &self,
        activeflow_id: Uuid,
        current_action_id: Uuid,
    ) -> AppResult<Action> {
        self.client
            .post(
                &format!("/v1/activeflows/{}/next", activeflow_id),
                &json!({ "current_action_id": current_action_id }),
            )
            .await
    }

    async fn activeflow_stop(&self, activeflow_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(&format!("/v1/activeflows/{}/stop", activeflow_id), &json!({}))
            .await
    }

    async fn variables_set(
        &self,
        activeflow_id: Uuid,
        variables: &HashMap<String, String>,
    ) -> AppResult<()> {
        self.client
            .put_unit(
                &format!("/v1/activeflows/{}/variables", activeflow_id),
                &json!({ "variables": variables }),
            )
            .await
    }

    async fn variables_get(&self, activeflow_id: Uuid) -> AppResult<HashMap<String, String>> {
        let vars: Variables = self
            .client
            .get(&format!("/v1/activeflows/{}/variables", activeflow_id))
            .await?;
        Ok(vars.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callctl_core::models::ActionType;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_next_action() {
        let server = MockServer::start().await;
        let af = Uuid::new_v4();
        let current = Uuid::new_v4();
        let next = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/v1/activeflows/{}/next", af)))
            .and(body_json(json!({ "current_action_id": current })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": next,
                "type": "play",
                "option": { "stream_urls": ["https://example.com/a.wav"] }
            })))
            .mount(&server)
            .await;

        let engine = HttpWorkflowEngine::new(PeerClient::new("flow", &server.uri(), 3000).unwrap());
        let action = engine.activeflow_next_action(af, current).await.unwrap();
        assert_eq!(action.id, next);
        assert_eq!(action.kind, ActionType::Play);
    }

    #[tokio::test]
    async fn test_variables_get() {
        let server = MockServer::start().await;
        let af = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/activeflows/{}/variables", af)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "variables": { "callctl.call.digits": "12#" }
            })))
            .mount(&server)
            .await;

        let engine = HttpWorkflowEngine::new(PeerClient::new("flow", &server.uri(), 3000).unwrap());
        let vars = engine.variables_get(af).await.unwrap();
        assert_eq!(vars.get("callctl.call.digits").map(String::as_str), Some("12#"));
    }
}
