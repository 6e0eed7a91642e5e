//! Channel start paths
//!
//! Inbound channels become new calls; outbound channels created by the
//! builder are bridged and dialed; AMD snoop channels are handed to the
//! detection service and report back through `amd_result`.

use callctl_core::{
    models::{
        activeflow::variables,
        channel::{format_stasis_data, stasis},
        groupcall::AMD_RESULT_MACHINE,
        Action, Address, Call, CallStatus, CallType, Channel, ChannelCause, Direction,
        HangupReason,
    },
    AppError, AppResult,
};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;
use crate::constants::{BRIDGE_REFERENCE_TYPE_CALL, CONTEXT_AMD, DEFAULT_EXTEN, DEFAULT_PRIORITY};

impl CallHandler {
    /// Turn an inbound channel into a call and start its workflow
    #[instrument(skip(self, channel, source, destination), fields(channel_id = %channel.id))]
    pub async fn start_incoming(
        &self,
        channel: &Channel,
        customer_id: Uuid,
        flow_id: Uuid,
        source: Address,
        destination: Address,
    ) -> AppResult<Call> {
        let id = Uuid::new_v4();
        self.arm_call_duration(&channel.id).await;

        let valid = match self.billing.is_valid_balance(customer_id, None).await {
            Ok(true) => {
                self.billing
                    .is_valid_destination(customer_id, &source, &destination)
                    .await
            }
            other => other,
        };
        match valid {
            Ok(true) => {}
            Ok(false) => {
                self.hangup_channel_failed(&channel.id).await;
                return Err(AppError::Validation(
                    "could not pass the incoming call validation".to_string(),
                ));
            }
            Err(e) => {
                self.hangup_channel_failed(&channel.id).await;
                return Err(e);
            }
        }

        let bridge_id = match self.join_call_bridge(id, &channel.id).await {
            Ok(b) => b,
            Err(e) => {
                error!("Could not put the channel into a call bridge. err: {}", e);
                self.hangup_channel_failed(&channel.id).await;
                return Err(e);
            }
        };

        let activeflow = match self
            .flow
            .activeflow_create(Uuid::nil(), customer_id, flow_id, id)
            .await
        {
            Ok(af) => af,
            Err(e) => {
                error!("Could not create the activeflow. err: {}", e);
                self.hangup_channel_failed(&channel.id).await;
                return Err(e);
            }
        };

        let call = Call {
            id,
            customer_id,
            channel_id: channel.id.clone(),
            bridge_id,
            flow_id,
            activeflow_id: activeflow.id,
            kind: CallType::Flow,
            source,
            destination,
            status: CallStatus::from_channel_state(channel.state),
            action: Action::empty(),
            direction: Direction::Incoming,
            ..Default::default()
        };
        let res = match self.create(call).await {
            Ok(c) => c,
            Err(e) => {
                self.hangup_channel_failed(&channel.id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.set_variables_call(&res).await {
            error!("Could not set the call variables. Hanging up. err: {}", e);
            if let Err(e) = self
                .hanging_up_with_cause(res.id, ChannelCause::NETWORK_OUT_OF_ORDER)
                .await
            {
                warn!("Could not hang up the call. err: {}", e);
            }
            return Err(e);
        }

        self.action_next(&res).await?;
        Ok(res)
    }

    /// Bridge and dial an outbound channel that entered the control application
    #[instrument(skip(self, channel), fields(channel_id = %channel.id))]
    pub async fn start_outgoing_channel(&self, channel: &Channel) -> AppResult<()> {
        let call_id = channel
            .stasis(stasis::CALL_ID)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| AppError::MissingField(stasis::CALL_ID.to_string()))?;
        let call = self.calls.get(call_id).await?;

        let result = async {
            self.arm_call_duration(&channel.id).await;

            let bridge_id = self.join_call_bridge(call.id, &channel.id).await?;
            self.update_bridge_id(call.id, &bridge_id).await?;

            self.channels
                .channel_dial(&channel.id, "", self.settings.dial_timeout_secs)
                .await
        }
        .await;

        if let Err(e) = result {
            error!("Could not start the outgoing channel. Hanging up. err: {}", e);
            if let Err(e) = self.hanging_up(call.id, HangupReason::Normal).await {
                warn!("Could not hang up the call. err: {}", e);
            }
            return Err(e);
        }

        info!("Dialing the outgoing call {}.", call.id);
        Ok(())
    }

    /// Hand an AMD snoop channel to the detection service
    pub async fn start_amd_channel(&self, channel: &Channel) -> AppResult<()> {
        self.channels
            .channel_continue(&channel.id, CONTEXT_AMD, DEFAULT_EXTEN, DEFAULT_PRIORITY)
            .await
    }

    /// Result of answering machine detection on snoop channel `snoop_id`
    #[instrument(skip(self))]
    pub async fn amd_result(&self, snoop_id: &str, result: &str) -> AppResult<()> {
        let amd = match self.amd.amd_get(snoop_id).await? {
            Some(a) => a,
            None => {
                debug!("No amd option for the snoop channel.");
                return Ok(());
            }
        };

        if result == AMD_RESULT_MACHINE && amd.hangs_up_machine() {
            info!("Answering machine detected. Hanging up the call {}.", amd.call_id);
            self.hanging_up_with_cause(amd.call_id, ChannelCause::CALL_AMD)
                .await?;
            return Ok(());
        }

        if !amd.is_async {
            self.scheduler.action_next(amd.call_id, false).await?;
        }
        Ok(())
    }

    /// Publish the call's addressing into its activeflow variables
    pub(crate) async fn set_variables_call(&self, call: &Call) -> AppResult<()> {
        if !call.has_activeflow() {
            return Ok(());
        }

        let vars = HashMap::from([
            (variables::CALL_ID.to_string(), call.id.to_string()),
            (variables::SOURCE_TYPE.to_string(), call.source.kind.to_string()),
            (variables::SOURCE_TARGET.to_string(), call.source.target.clone()),
            (
                variables::SOURCE_TARGET_NAME.to_string(),
                call.source.target_name.clone(),
            ),
            (
                variables::DESTINATION_TYPE.to_string(),
                call.destination.kind.to_string(),
            ),
            (
                variables::DESTINATION_TARGET.to_string(),
                call.destination.target.clone(),
            ),
            (
                variables::DESTINATION_TARGET_NAME.to_string(),
                call.destination.target_name.clone(),
            ),
            (
                variables::DIRECTION.to_string(),
                call.direction.as_str().to_string(),
            ),
            (variables::DIGITS.to_string(), String::new()),
        ]);

        self.flow.variables_set(call.activeflow_id, &vars).await
    }

    /// Create the call bridge and put the channel in it
    async fn join_call_bridge(&self, call_id: Uuid, channel_id: &str) -> AppResult<String> {
        let reference_id = call_id.to_string();
        let name = format_stasis_data(&[
            ("reference_type", BRIDGE_REFERENCE_TYPE_CALL),
            ("reference_id", &reference_id),
        ]);

        let bridge_id = self.bridges.bridge_create(&name).await?;
        self.bridges
            .bridge_channel_join(&bridge_id, channel_id)
            .await?;
        Ok(bridge_id)
    }

    async fn arm_call_duration(&self, channel_id: &str) {
        if let Err(e) = self
            .scheduler
            .channel_hangup(
                channel_id,
                ChannelCause::CALL_DURATION_TIMEOUT,
                self.settings.call_duration_timeout_ms as i64,
            )
            .await
        {
            warn!("Could not arm the call duration timeout. err: {}", e);
        }
    }

    async fn hangup_channel_failed(&self, channel_id: &str) {
        if let Err(e) = self
            .channels
            .channel_hangup(channel_id, ChannelCause::NETWORK_OUT_OF_ORDER)
            .await
        {
            warn!("Could not hang up the channel {}. err: {}", channel_id, e);
        }
    }
}
