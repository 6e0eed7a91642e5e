//! Hangup coordinator
//!
//! `hangup` reacts to a destroyed channel and either fails the call over to
//! the next dial route or finishes it. `hanging_up` starts a local hangup.

use callctl_core::{
    models::{
        AddressType, Call, CallStatus, Channel, ChannelCause, Direction, HangupBy, HangupReason,
    },
    AppError, AppResult,
};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;

impl CallHandler {
    /// The call's channel is gone
    #[instrument(skip(self, channel), fields(channel_id = %channel.id, cause = %channel.hangup_cause))]
    pub async fn hangup(&self, channel: &Channel) -> AppResult<Call> {
        let call = self.calls.get_by_channel_id(&channel.id).await?;
        if call.status == CallStatus::Hangup {
            debug!("The call {} is already hung up.", call.id);
            return Ok(call);
        }

        if !call.bridge_id.is_empty() {
            if let Err(e) = self.bridges.bridge_delete(&call.bridge_id).await {
                warn!("Could not destroy the call bridge {}. err: {}", call.bridge_id, e);
            }
        }

        if self.is_retryable(&call, channel) {
            match self.create_failover_channel(&call).await {
                Ok(res) => {
                    info!(
                        "Failed over to the next dial route. call_id: {}, dialroute_id: {}",
                        res.id, res.dialroute_id
                    );
                    return Ok(res);
                }
                Err(e) => warn!("Could not fail over. Hanging up the call. err: {}", e),
            }
        }

        let reason = HangupReason::calculate(call.direction, call.status, channel.hangup_cause);
        let hangup_by = HangupBy::from_status(call.status);
        let res = self.update_hangup_info(call.id, reason, hangup_by).await?;
        info!(
            "Hung up the call. call_id: {}, reason: {}, hangup_by: {}",
            res.id,
            reason,
            hangup_by.as_str()
        );

        if !res.groupcall_id.is_nil() {
            if let Err(e) = self
                .groupcalls
                .groupcall_hangup_call(res.groupcall_id, res.id)
                .await
            {
                warn!("Could not notify the groupcall {}. err: {}", res.groupcall_id, e);
            }
        }

        if res.has_activeflow() {
            if let Err(e) = self.flow.activeflow_stop(res.activeflow_id).await {
                warn!("Could not stop the activeflow {}. err: {}", res.activeflow_id, e);
            }
        }

        for chained_call_id in &res.chained_call_ids {
            self.spawn_detached(self.hanging_up_detached(*chained_call_id, HangupReason::Normal));
        }

        if res.has_master() && res.is_execute_next_master_on_hangup() {
            if let Err(e) = self.scheduler.action_next(res.master_call_id, true).await {
                warn!("Could not advance the master call {}. err: {}", res.master_call_id, e);
            }
        }

        Ok(res)
    }

    /// Owned future of a cascaded hangup. Failures are logged.
    fn hanging_up_detached(&self, call_id: Uuid, reason: HangupReason) -> BoxFuture<'static, ()> {
        let handler = self.clone();
        async move {
            if let Err(e) = handler.hanging_up(call_id, reason).await {
                error!("Could not hang up the chained call {}. err: {}", call_id, e);
            }
        }
        .boxed()
    }

    /// Whether a destroyed outbound channel should be retried on another dial route
    pub fn is_retryable(&self, call: &Call, channel: &Channel) -> bool {
        if call.direction != Direction::Outgoing || call.destination.kind != AddressType::Tel {
            return false;
        }

        if call.is_early_execution() && call.status == CallStatus::Ringing {
            return false;
        }

        if !channel.hangup_cause.is_retryable() {
            return false;
        }

        if !matches!(call.status, CallStatus::Dialing | CallStatus::Ringing) {
            return false;
        }

        call.next_dialroute().is_some()
    }

    /// Move the call to the next dial route on a fresh channel
    pub(crate) async fn create_failover_channel(&self, call: &Call) -> AppResult<Call> {
        let next = call.next_dialroute().ok_or(AppError::NoMoreDialroute)?;

        let channel_id = Uuid::new_v4().to_string();
        let res = self
            .update_for_route_failover(call.id, &channel_id, next.id)
            .await?;

        self.create_channel(&res).await?;
        Ok(res)
    }

    /// Start hanging up the call with the cause matching `reason`
    pub async fn hanging_up(&self, call_id: Uuid, reason: HangupReason) -> AppResult<Call> {
        self.hanging_up_with_cause(call_id, reason.channel_cause())
            .await
    }

    /// Start hanging up the call with an explicit channel cause
    ///
    /// Calls already on their way down are returned unchanged.
    #[instrument(skip(self))]
    pub async fn hanging_up_with_cause(
        &self,
        call_id: Uuid,
        cause: ChannelCause,
    ) -> AppResult<Call> {
        let call = self.calls.get(call_id).await?;
        if call.status.is_ending() {
            debug!("The call is already {}.", call.status);
            return Ok(call);
        }

        let status = if call.direction == Direction::Outgoing
            && call.status.can_transition_to(CallStatus::Canceling)
        {
            CallStatus::Canceling
        } else {
            CallStatus::Terminating
        };

        let res = match self.update_status(call.id, status).await {
            Ok(res) => res,
            Err(AppError::InvalidStatus(msg)) => {
                debug!("The call moved on before hanging up. {}", msg);
                return self.calls.get(call_id).await;
            }
            Err(e) => return Err(e),
        };

        let channel = self.channels.channel_hangup(&res.channel_id, cause).await?;
        if channel.tm_end.is_some() {
            debug!("The channel has already ended. Completing the hangup.");
            return self.hangup(&channel).await;
        }

        Ok(res)
    }

    /// Hang up with the same cause the referenced call ended with
    pub(crate) async fn hanging_up_with_reference(
        &self,
        call: &Call,
        reference_id: Uuid,
    ) -> AppResult<Call> {
        let reference = self.calls.get(reference_id).await?;
        if reference.status != CallStatus::Hangup {
            return Err(AppError::InvalidStatus(format!(
                "reference call {} is not hung up",
                reference.id
            )));
        }

        let channel = self.channels.channel_get(&reference.channel_id).await?;
        self.hanging_up_with_cause(call.id, channel.hangup_cause)
            .await
    }
}
