//! Call record operations
//!
//! Every mutation writes, fetches the fresh record and publishes it.

use callctl_core::{
    models::{Action, Call, CallEvent, CallStatus, HangupBy, HangupReason, MuteDirection},
    traits::CallFilter,
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;

impl CallHandler {
    /// Persist a new call and start its health check loop
    #[instrument(skip(self, call), fields(call_id = %call.id, direction = call.direction.as_str()))]
    pub async fn create(&self, call: Call) -> AppResult<Call> {
        self.calls.create(&call).await?;
        self.metrics.call_created(call.direction);

        let res = self.calls.get(call.id).await?;
        info!("Created a call. status: {}", res.status);
        self.publish(CallEvent::Created, &res).await;

        if let Err(e) = self
            .scheduler
            .health_check(res.id, self.settings.health_check_delay_ms as i64, 0)
            .await
        {
            warn!("Could not start the health check: {}", e);
        }

        Ok(res)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Call> {
        self.calls.get(id).await
    }

    pub async fn get_by_channel_id(&self, channel_id: &str) -> AppResult<Call> {
        self.calls.get_by_channel_id(channel_id).await
    }

    /// Newest first. A missing token pages from now.
    pub async fn gets(
        &self,
        size: u64,
        token: Option<DateTime<Utc>>,
        filter: &CallFilter,
    ) -> AppResult<Vec<Call>> {
        self.calls
            .gets(size, token.unwrap_or_else(Utc::now), filter)
            .await
    }

    /// Soft delete a hung up call
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<Call> {
        let call = self.calls.get(id).await?;
        if call.status != CallStatus::Hangup {
            return Err(AppError::InvalidStatus(format!(
                "call {} is {}, only hung up calls can be deleted",
                id, call.status
            )));
        }

        self.calls.delete(id).await?;
        let res = self.calls.get(id).await?;
        self.publish(CallEvent::Deleted, &res).await;

        Ok(res)
    }

    /// Fails with `InvalidStatus` when the stored status does not allow the move
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: CallStatus) -> AppResult<Call> {
        if !self.calls.set_status(id, status).await? {
            return Err(AppError::InvalidStatus(format!(
                "call {} can not move to {}",
                id, status
            )));
        }
        let res = self.calls.get(id).await?;

        if let Some(event) = status.event() {
            self.publish(event, &res).await;
        }

        Ok(res)
    }

    /// Terminal write. Publishes `call_hangup` and counts the hangup.
    #[instrument(skip(self))]
    pub async fn update_hangup_info(
        &self,
        id: Uuid,
        reason: HangupReason,
        hangup_by: HangupBy,
    ) -> AppResult<Call> {
        self.calls.set_hangup(id, reason, hangup_by).await?;
        let res = self.calls.get(id).await?;

        self.metrics.call_hungup(res.direction, reason);
        self.publish(CallEvent::Hangup, &res).await;

        Ok(res)
    }

    pub async fn update_recording_id(&self, id: Uuid, recording_id: Uuid) -> AppResult<Call> {
        self.calls.set_recording_id(id, recording_id).await?;
        self.fetch_and_publish_updated(id).await
    }

    pub async fn update_confbridge_id(&self, id: Uuid, confbridge_id: Uuid) -> AppResult<Call> {
        self.calls.set_confbridge_id(id, confbridge_id).await?;
        self.fetch_and_publish_updated(id).await
    }

    pub async fn update_bridge_id(&self, id: Uuid, bridge_id: &str) -> AppResult<Call> {
        self.calls.set_bridge_id(id, bridge_id).await?;
        self.fetch_and_publish_updated(id).await
    }

    pub async fn update_data(&self, id: Uuid, data: &HashMap<String, String>) -> AppResult<Call> {
        self.calls.set_data(id, data).await?;
        self.fetch_and_publish_updated(id).await
    }

    pub async fn update_mute_direction(
        &self,
        id: Uuid,
        direction: MuteDirection,
    ) -> AppResult<Call> {
        self.calls.set_mute_direction(id, direction).await?;
        self.fetch_and_publish_updated(id).await
    }

    /// Point the call at a fresh channel and the next dial route
    pub(crate) async fn update_for_route_failover(
        &self,
        id: Uuid,
        channel_id: &str,
        dialroute_id: Uuid,
    ) -> AppResult<Call> {
        self.calls
            .set_for_route_failover(id, channel_id, dialroute_id)
            .await?;
        self.fetch_and_publish_updated(id).await
    }

    /// Store the action about to execute and release the advancement hold
    pub(crate) async fn update_action_and_action_next_hold(
        &self,
        id: Uuid,
        action: &Action,
    ) -> AppResult<Call> {
        self.calls
            .set_action_and_action_next_hold(id, action, false)
            .await?;
        self.fetch_and_publish_updated(id).await
    }

    pub(crate) async fn fetch_and_publish_updated(&self, id: Uuid) -> AppResult<Call> {
        let res = self.calls.get(id).await?;
        self.publish(CallEvent::Updated, &res).await;
        Ok(res)
    }

    /// Link `chained_call_id` under `master_call_id`
    ///
    /// Neither call may be hung up and the chained call must not already have a master.
    #[instrument(skip(self))]
    pub async fn chained_call_id_add(
        &self,
        master_call_id: Uuid,
        chained_call_id: Uuid,
    ) -> AppResult<Call> {
        let (mut tx, master) = self.calls.call_tx_start(master_call_id).await?;

        let result = async {
            if master.status == CallStatus::Hangup {
                return Err(AppError::InvalidStatus(format!(
                    "master call {} is already hung up",
                    master.id
                )));
            }

            let chained = tx.get(chained_call_id).await?;
            if chained.status == CallStatus::Hangup {
                return Err(AppError::InvalidStatus(format!(
                    "chained call {} is already hung up",
                    chained.id
                )));
            }
            if chained.has_master() {
                return Err(AppError::Conflict(format!(
                    "chained call {} already has master call {}",
                    chained.id, chained.master_call_id
                )));
            }

            tx.add_chained_call_id(master_call_id, chained_call_id).await?;
            tx.set_master_call_id(chained_call_id, master_call_id).await?;
            Ok::<(), AppError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(re) = tx.finish(false).await {
                warn!("Could not roll back the chained call link: {}", re);
            }
            return Err(e);
        }
        tx.finish(true).await?;
        debug!("Linked chained call.");

        if let Ok(chained) = self.calls.get(chained_call_id).await {
            self.publish(CallEvent::Updated, &chained).await;
        }
        self.fetch_and_publish_updated(master_call_id).await
    }

    /// Unlink `chained_call_id` from `master_call_id`
    #[instrument(skip(self))]
    pub async fn chained_call_id_remove(
        &self,
        master_call_id: Uuid,
        chained_call_id: Uuid,
    ) -> AppResult<Call> {
        let (mut tx, _master) = self.calls.call_tx_start(master_call_id).await?;

        let result = async {
            let chained = tx.get(chained_call_id).await?;

            tx.remove_chained_call_id(master_call_id, chained_call_id)
                .await?;
            if chained.master_call_id == master_call_id {
                tx.set_master_call_id(chained_call_id, Uuid::nil()).await?;
            }
            Ok::<(), AppError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(re) = tx.finish(false).await {
                warn!("Could not roll back the chained call unlink: {}", re);
            }
            return Err(e);
        }
        tx.finish(true).await?;

        if let Ok(chained) = self.calls.get(chained_call_id).await {
            self.publish(CallEvent::Updated, &chained).await;
        }
        self.fetch_and_publish_updated(master_call_id).await
    }
}
