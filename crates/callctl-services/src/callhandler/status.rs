//! Ringing and progressing transitions

use callctl_core::{
    models::{Call, CallStatus, Channel, Direction},
    AppError, AppResult,
};
use tracing::{debug, instrument, warn};

use super::CallHandler;

impl CallHandler {
    fn check_transition(call: &Call, next: CallStatus) -> AppResult<()> {
        if !call.status.can_transition_to(next) {
            return Err(AppError::InvalidStatus(format!(
                "call {} can not move from {} to {}",
                call.id, call.status, next
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, call), fields(call_id = %call.id))]
    pub async fn update_status_ringing(&self, call: &Call) -> AppResult<Call> {
        Self::check_transition(call, CallStatus::Ringing)?;

        let res = self.update_status(call.id, CallStatus::Ringing).await?;
        if res.is_early_execution() {
            debug!("Early execution. Starting the workflow on ringing.");
            self.action_next(&res).await?;
        }

        Ok(res)
    }

    #[instrument(skip(self, call), fields(call_id = %call.id))]
    pub async fn update_status_progressing(&self, call: &Call) -> AppResult<Call> {
        Self::check_transition(call, CallStatus::Progressing)?;

        let res = self.update_status(call.id, CallStatus::Progressing).await?;
        if res.direction == Direction::Incoming {
            return Ok(res);
        }

        if !res.groupcall_id.is_nil() {
            if let Err(e) = self
                .groupcalls
                .groupcall_answer_call(res.groupcall_id, res.id)
                .await
            {
                warn!("Could not answer the groupcall {}. err: {}", res.groupcall_id, e);
            }
        }

        if !res.confbridge_id.is_nil() {
            if let Err(e) = self
                .confbridges
                .confbridge_answer(res.confbridge_id, res.id)
                .await
            {
                warn!("Could not answer the conference {}. err: {}", res.confbridge_id, e);
            }
        }

        if res.is_early_execution() && !res.action.id.is_nil() {
            debug!("The workflow already started on ringing.");
            return Ok(res);
        }

        self.action_next(&res).await?;
        Ok(res)
    }

    /// Apply a channel state change to the call owning the channel
    pub async fn update_status_by_channel(&self, channel: &Channel) -> AppResult<()> {
        let call = match self.calls.get_by_channel_id(&channel.id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                debug!("No call owns the channel {}.", channel.id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let res = match CallStatus::from_channel_state(channel.state) {
            CallStatus::Ringing => self.update_status_ringing(&call).await,
            CallStatus::Progressing => self.update_status_progressing(&call).await,
            other => {
                debug!("Nothing to do for channel state {:?} ({}).", channel.state, other);
                return Ok(());
            }
        };

        match res {
            Ok(_) => Ok(()),
            Err(AppError::InvalidStatus(msg)) => {
                debug!("Ignoring the channel state change. {}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
