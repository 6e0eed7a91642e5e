//! Ring group and conference clients

use async_trait::async_trait;
use callctl_core::{
    models::{Address, Groupcall},
    traits::{ConfbridgeService, GroupcallCoordinator},
    AppResult,
};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::client::PeerClient;

/// HTTP client of the groupcall coordinator
pub struct HttpGroupcallCoordinator {
    client: PeerClient,
}

impl HttpGroupcallCoordinator {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GroupcallCoordinator for HttpGroupcallCoordinator {
    #[instrument(skip(self, source, destinations), fields(destinations = destinations.len()))]
    async fn groupcall_start(
        &self,
        customer_id: Uuid,
        flow_id: Uuid,
        master_call_id: Uuid,
        source: &Address,
        destinations: &[Address],
        early_execution: bool,
        connect: bool,
    ) -> AppResult<Groupcall> {
        self.client
            .post(
                "/v1/groupcalls",
                &json!({
                    "customer_id": customer_id,
                    "flow_id": flow_id,
                    "master_call_id": master_call_id,
                    "source": source,
                    "destinations": destinations,
                    "ring_method": "ring_all",
                    "answer_method": "hangup_others",
                    "early_execution": early_execution,
                    "connect": connect,
                }),
            )
            .await
    }

    async fn groupcall_answer_call(&self, groupcall_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/groupcalls/{}/answer", groupcall_id),
                &json!({ "call_id": call_id }),
            )
            .await
    }

    async fn groupcall_hangup_call(&self, groupcall_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/groupcalls/{}/hangup-call", groupcall_id),
                &json!({ "call_id": call_id }),
            )
            .await
    }
}

/// HTTP client of the conference manager
pub struct HttpConfbridgeService {
    client: PeerClient,
}

impl HttpConfbridgeService {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfbridgeService for HttpConfbridgeService {
    async fn confbridge_join(&self, confbridge_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/confbridges/{}/calls", confbridge_id),
                &json!({ "call_id": call_id }),
            )
            .await
    }

    async fn confbridge_kick(&self, confbridge_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.client
            .delete_unit(&format!("/v1/confbridges/{}/calls/{}", confbridge_id, call_id))
            .await
    }

    async fn confbridge_answer(&self, confbridge_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/confbridges/{}/answer", confbridge_id),
                &json!({ "call_id": call_id }),
            )
            .await
    }
}
