//! Action dispatcher
//!
//! Advancement is serialized per call by the persisted hold flag: whoever
//! acquires it fetches the next action, stores it and releases the hold in one
//! write, then executes it. Competing advancements are no-ops.

use callctl_core::{
    models::{
        action::{
            OptionAmd, OptionConfbridgeJoin, OptionDigitsReceive, OptionDigitsSend, OptionEcho,
            OptionExternalMediaStart, OptionHangup, OptionPlay, OptionRecordingStart,
            OptionSleep, OptionTalk,
        },
        channel::{format_stasis_data, stasis},
        Action, ActionType, Call, CallAmd, ChannelCause, HangupReason,
    },
    traits::{ExternalMediaStartRequest, RecordingStartRequest},
    AppError, AppResult,
};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;
use crate::constants::{
    CONTEXT_CALL_AMD, CONTEXT_ECHO, CONTEXT_STASIS, CONTEXT_STREAM_ECHO, DEFAULT_EXTEN,
    DEFAULT_PRIORITY, DTMF_DEFAULT_DURATION_MS, MEDIA_BEEP,
};

impl CallHandler {
    fn hold_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.settings.action_next_hold_lease_secs)
    }

    /// Non-positive durations fall back to the default action timeout
    fn timeout_or_default(&self, duration_ms: i64) -> i64 {
        if duration_ms <= 0 {
            self.settings.default_action_timeout_ms
        } else {
            duration_ms
        }
    }

    /// Advance the call's workflow by one action
    #[instrument(skip(self, call), fields(call_id = %call.id, action_id = %call.action.id))]
    pub async fn action_next(&self, call: &Call) -> AppResult<()> {
        if call.status.is_ending() {
            debug!("The call is already hanging up. Nothing to do. status: {}", call.status);
            return Ok(());
        }

        if !call.has_activeflow() {
            info!("The call has no activeflow. Hanging up the call.");
            self.hanging_up(call.id, HangupReason::Normal).await?;
            return Ok(());
        }

        let lease = self.hold_lease();
        if call.is_action_next_held(Utc::now(), lease) {
            debug!("The call's action next is on hold.");
            return Ok(());
        }

        match self.calls.acquire_action_next_hold(call.id, lease).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Another advancement took the hold first.");
                return Ok(());
            }
            Err(e) => {
                error!("Could not set the action next hold. Hanging up. err: {}", e);
                self.hanging_up(call.id, HangupReason::Normal).await?;
                return Err(e);
            }
        }

        let mut next = match self
            .flow
            .activeflow_next_action(call.activeflow_id, call.action.id)
            .await
        {
            Ok(action) => action,
            Err(e) => {
                // the workflow moved on under a stale action id
                debug!("Could not get the next action. err: {}", e);
                if let Err(e) = self.calls.set_action_next_hold(call.id, false).await {
                    warn!("Could not release the action next hold. err: {}", e);
                }
                return Ok(());
            }
        };
        next.tm_execute = Some(Utc::now());

        let updated = match self.update_action_and_action_next_hold(call.id, &next).await {
            Ok(c) => c,
            Err(e) => {
                error!("Could not store the next action. err: {}", e);
                if let Err(e) = self.scheduler.action_next(call.id, false).await {
                    warn!("Could not request the next action. err: {}", e);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.action_execute(&updated).await {
            error!("Could not execute the action. Hanging up. err: {}", e);
            self.hanging_up(call.id, HangupReason::Normal).await?;
            return Err(e);
        }

        Ok(())
    }

    /// Advance past a blocking action
    ///
    /// A running playback or conference membership is torn down first; the
    /// resulting channel event re-enters normal advancement.
    #[instrument(skip(self, call), fields(call_id = %call.id))]
    pub async fn action_next_force(&self, call: &Call) -> AppResult<()> {
        if let Err(e) = self.calls.set_action_next_hold(call.id, false).await {
            error!("Could not release the action next hold. Hanging up. err: {}", e);
            self.hanging_up(call.id, HangupReason::Normal).await?;
            return Ok(());
        }

        let channel = match self.channels.channel_get(&call.channel_id).await {
            Ok(cn) => cn,
            Err(e) => {
                error!("Could not get the channel. err: {}", e);
                return Ok(());
            }
        };

        if !channel.playback_id.is_empty() {
            debug!("Stopping the playback {}.", channel.playback_id);
            if let Err(e) = self.channels.channel_playback_stop(&channel.id).await {
                error!("Could not stop the playback. err: {}", e);
            }
            return Ok(());
        }

        if !call.confbridge_id.is_nil() {
            debug!("Leaving the conference {}.", call.confbridge_id);
            if let Err(e) = self
                .confbridges
                .confbridge_kick(call.confbridge_id, call.id)
                .await
            {
                error!("Could not kick the call from the conference. err: {}", e);
            }
            return Ok(());
        }

        let fresh = self.calls.get(call.id).await?;
        self.action_next(&fresh).await
    }

    /// Entry point of the scheduler callback
    pub async fn action_next_by_id(&self, id: Uuid, force: bool) -> AppResult<()> {
        let call = self.calls.get(id).await?;
        if force {
            self.action_next_force(&call).await
        } else {
            self.action_next(&call).await
        }
    }

    /// The action armed with a timer has run out of time
    ///
    /// Fails unless `action` is still the executing instance and no advancement is in flight.
    #[instrument(skip(self, action), fields(action_id = %action.id, action_type = %action.kind))]
    pub async fn action_timeout(&self, call_id: Uuid, action: &Action) -> AppResult<()> {
        let call = self.calls.get(call_id).await?;

        if !call.action.is_same_execution(action)
            || call.is_action_next_held(Utc::now(), self.hold_lease())
        {
            return Err(AppError::InvalidTimedOutAction);
        }

        let channel = self.channels.channel_get(&call.channel_id).await?;
        if channel.stasis_name.is_empty() {
            debug!("The channel left the control application. Redirecting it back.");
            return self
                .channels
                .channel_redirect(&channel.id, CONTEXT_STASIS, DEFAULT_EXTEN, DEFAULT_PRIORITY)
                .await;
        }

        self.scheduler.action_next(call.id, false).await
    }

    /// Execute the call's current action
    ///
    /// Executor errors are not fatal: the call moves on to its next action.
    pub(crate) async fn action_execute(&self, call: &Call) -> AppResult<()> {
        let kind = if call.action.is_terminal_sentinel() {
            info!("No more actions for the call. Hanging up.");
            ActionType::Hangup
        } else {
            call.action.kind
        };
        debug!("Executing the action. action_type: {}", kind);

        let start = Instant::now();
        let res = match kind {
            ActionType::Amd => self.action_execute_amd(call).await,
            ActionType::Answer => self.action_execute_answer(call).await,
            ActionType::Beep => self.action_execute_beep(call).await,
            ActionType::ConfbridgeJoin => self.action_execute_confbridge_join(call).await,
            ActionType::DigitsReceive => self.action_execute_digits_receive(call).await,
            ActionType::DigitsSend => self.action_execute_digits_send(call).await,
            ActionType::Echo => self.action_execute_echo(call, CONTEXT_ECHO).await,
            ActionType::ExternalMediaStart => self.action_execute_external_media_start(call).await,
            ActionType::ExternalMediaStop => self.action_execute_external_media_stop(call).await,
            ActionType::Hangup => self.action_execute_hangup(call).await,
            ActionType::Play => self.action_execute_play(call).await,
            ActionType::RecordingStart => self.action_execute_recording_start(call).await,
            ActionType::RecordingStop => self.action_execute_recording_stop(call).await,
            ActionType::Sleep => self.action_execute_sleep(call).await,
            ActionType::StreamEcho => self.action_execute_echo(call, CONTEXT_STREAM_ECHO).await,
            ActionType::Talk => self.action_execute_talk(call).await,
            ActionType::Unknown => {
                return Err(AppError::UnsupportedAction(format!(
                    "action {} has an unsupported type",
                    call.action.id
                )));
            }
        };
        self.metrics.action_executed(kind.as_str(), start.elapsed());

        if let Err(e) = res {
            warn!("Could not execute the {} action. Moving to the next action. err: {}", kind, e);
            self.scheduler.action_next(call.id, false).await?;
        }

        Ok(())
    }

    async fn action_execute_answer(&self, call: &Call) -> AppResult<()> {
        self.channels.channel_answer(&call.channel_id).await?;
        self.scheduler.action_next(call.id, false).await
    }

    async fn action_execute_beep(&self, call: &Call) -> AppResult<()> {
        self.channels
            .channel_play(
                &call.channel_id,
                call.action.id,
                &[MEDIA_BEEP.to_string()],
                "",
            )
            .await
    }

    async fn action_execute_echo(&self, call: &Call, context: &str) -> AppResult<()> {
        let opt: OptionEcho = call.action.parse_option()?;
        let duration = self.timeout_or_default(opt.duration);

        self.channels
            .channel_continue(&call.channel_id, context, DEFAULT_EXTEN, DEFAULT_PRIORITY)
            .await?;
        self.scheduler
            .action_timeout(call.id, duration, &call.action)
            .await
    }

    async fn action_execute_confbridge_join(&self, call: &Call) -> AppResult<()> {
        let opt: OptionConfbridgeJoin = call.action.parse_option()?;
        self.confbridges
            .confbridge_join(opt.confbridge_id, call.id)
            .await
    }

    async fn action_execute_play(&self, call: &Call) -> AppResult<()> {
        let opt: OptionPlay = call.action.parse_option()?;
        self.channels
            .channel_play(&call.channel_id, call.action.id, &opt.stream_urls, "")
            .await
    }

    async fn action_execute_talk(&self, call: &Call) -> AppResult<()> {
        let opt: OptionTalk = call.action.parse_option()?;
        let media_uri = self
            .media
            .speech_create(call.id, &opt.text, &opt.gender, &opt.language)
            .await?;

        self.channels
            .channel_play(&call.channel_id, call.action.id, &[media_uri], &opt.language)
            .await
    }

    async fn action_execute_sleep(&self, call: &Call) -> AppResult<()> {
        let opt: OptionSleep = call.action.parse_option()?;
        self.scheduler
            .action_timeout(call.id, opt.duration, &call.action)
            .await
    }

    async fn action_execute_digits_receive(&self, call: &Call) -> AppResult<()> {
        let opt: OptionDigitsReceive = call.action.parse_option()?;

        let digits = self.digits_of(call).await?;
        if is_digits_condition(&digits, &opt) {
            debug!("Collected digits already satisfy the condition. digits: {}", digits);
            return self.scheduler.action_next(call.id, false).await;
        }

        self.scheduler
            .action_timeout(call.id, self.timeout_or_default(opt.duration), &call.action)
            .await
    }

    async fn action_execute_digits_send(&self, call: &Call) -> AppResult<()> {
        let opt: OptionDigitsSend = call.action.parse_option()?;
        let duration = if opt.duration <= 0 {
            DTMF_DEFAULT_DURATION_MS
        } else {
            opt.duration
        };
        let interval = opt.interval.max(0);

        self.channels
            .channel_dtmf_send(&call.channel_id, &opt.digits, duration, interval)
            .await?;

        let timeout = digits_send_timeout(opt.digits.chars().count() as i64, duration, interval);
        self.scheduler
            .action_timeout(call.id, timeout, &call.action)
            .await
    }

    async fn action_execute_recording_start(&self, call: &Call) -> AppResult<()> {
        let opt: OptionRecordingStart = call.action.parse_option()?;
        let req = RecordingStartRequest {
            call_id: call.id,
            channel_id: call.channel_id.clone(),
            format: opt.format,
            end_of_silence: opt.end_of_silence,
            end_of_key: opt.end_of_key,
            duration: opt.duration,
            beep_start: opt.beep_start,
            on_end_flow_id: opt.on_end_flow_id,
        };

        self.recording_start(call.id, &req).await?;
        self.scheduler.action_next(call.id, false).await
    }

    async fn action_execute_recording_stop(&self, call: &Call) -> AppResult<()> {
        if !call.recording_id.is_nil() {
            if let Err(e) = self.media.recording_stop(call.recording_id).await {
                warn!("Could not stop the recording {}. err: {}", call.recording_id, e);
            }
        }

        self.scheduler.action_next(call.id, false).await
    }

    async fn action_execute_external_media_start(&self, call: &Call) -> AppResult<()> {
        let opt: OptionExternalMediaStart = call.action.parse_option()?;
        let req = ExternalMediaStartRequest {
            call_id: call.id,
            channel_id: call.channel_id.clone(),
            external_host: opt.external_host,
            encapsulation: opt.encapsulation,
            transport: opt.transport,
            connection_type: opt.connection_type,
            format: opt.format,
            direction: opt.direction,
            data: opt.data,
        };

        self.external_media_start(call.id, &req).await?;
        self.scheduler.action_next(call.id, false).await
    }

    async fn action_execute_external_media_stop(&self, call: &Call) -> AppResult<()> {
        for external_media_id in &call.external_media_ids {
            if let Err(e) = self.external_media_stop(call.id, *external_media_id).await {
                warn!("Could not stop the external media {}. err: {}", external_media_id, e);
            }
        }

        self.scheduler.action_next(call.id, false).await
    }

    async fn action_execute_amd(&self, call: &Call) -> AppResult<()> {
        let opt: OptionAmd = call.action.parse_option()?;

        let snoop_id = Uuid::new_v4().to_string();
        let call_id = call.id.to_string();
        let app_args = format_stasis_data(&[
            (stasis::CONTEXT_TYPE, stasis::CONTEXT_TYPE_CALL),
            (stasis::CONTEXT, CONTEXT_CALL_AMD),
            (stasis::CALL_ID, &call_id),
        ]);
        self.channels
            .channel_snoop(&call.channel_id, &snoop_id, &app_args)
            .await?;

        let amd = CallAmd {
            call_id: call.id,
            machine_handle: opt.machine_handle,
            is_async: opt.is_async,
        };
        if let Err(e) = self.amd.amd_set(&snoop_id, &amd).await {
            error!("Could not cache the amd option. Hanging up the snoop channel. err: {}", e);
            if let Err(e) = self
                .channels
                .channel_hangup(&snoop_id, ChannelCause::NORMAL_CLEARING)
                .await
            {
                warn!("Could not hang up the snoop channel. err: {}", e);
            }
            return Err(e);
        }

        if amd.is_async {
            return self.scheduler.action_next(call.id, false).await;
        }
        Ok(())
    }

    /// Never fails; the call is on its way down regardless
    async fn action_execute_hangup(&self, call: &Call) -> AppResult<()> {
        let opt: OptionHangup = call.action.parse_option().unwrap_or_default();

        if !opt.reference_id.is_nil() {
            if let Err(e) = self.hanging_up_with_reference(call, opt.reference_id).await {
                warn!("Could not mirror the reference call's hangup. err: {}", e);
                if let Err(e) = self.hanging_up(call.id, HangupReason::Normal).await {
                    warn!("Could not hang up the call. err: {}", e);
                }
            }
            return Ok(());
        }

        let reason = HangupReason::from_str(&opt.reason)
            .filter(|r| *r != HangupReason::None)
            .unwrap_or(HangupReason::Normal);
        if let Err(e) = self.hanging_up(call.id, reason).await {
            warn!("Could not hang up the call. err: {}", e);
        }
        Ok(())
    }
}

/// Whether the collected digits complete a `digits_receive`
pub fn is_digits_condition(digits: &str, opt: &OptionDigitsReceive) -> bool {
    if opt.length > 0 && digits.chars().count() as i64 >= opt.length {
        return true;
    }

    !opt.key.is_empty() && digits.chars().any(|d| opt.key.contains(d))
}

/// Time needed to send `count` tones, saturating at `i64::MAX`
pub fn digits_send_timeout(count: i64, duration_ms: i64, interval_ms: i64) -> i64 {
    let tones = duration_ms.saturating_mul(count);
    if count <= 1 {
        tones
    } else {
        tones.saturating_add(interval_ms.saturating_mul(count - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use callctl_core::models::{
        action::ACTION_ID_FINISH, activeflow::variables, CallStatus, Channel, HangupBy,
    };
    use proptest::prelude::*;
    use serde_json::json;

    fn receive(length: i64, key: &str) -> OptionDigitsReceive {
        OptionDigitsReceive {
            duration: 0,
            length,
            key: key.to_string(),
        }
    }

    #[test]
    fn test_digits_condition() {
        assert!(is_digits_condition("123", &receive(3, "")));
        assert!(!is_digits_condition("12", &receive(3, "")));
        assert!(is_digits_condition("1#", &receive(0, "#")));
        assert!(is_digits_condition("5", &receive(4, "*5")));
        assert!(!is_digits_condition("", &receive(0, "")));
        assert!(!is_digits_condition("999", &receive(0, "")));
    }

    #[test]
    fn test_digits_send_timeout() {
        assert_eq!(digits_send_timeout(0, 100, 50), 0);
        assert_eq!(digits_send_timeout(1, 100, 50), 100);
        assert_eq!(digits_send_timeout(4, 100, 50), 550);
        assert_eq!(digits_send_timeout(4, i64::MAX, 50), i64::MAX);
        assert_eq!(digits_send_timeout(3, 100, i64::MAX / 2 + 1), i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_length_condition(digits in "[0-9]{0,12}", length in 1i64..12) {
            let met = is_digits_condition(&digits, &receive(length, ""));
            prop_assert_eq!(met, digits.len() as i64 >= length);
        }

        #[test]
        fn prop_send_timeout(count in 2i64..20, duration in 0i64..1000, interval in 0i64..1000) {
            let t = digits_send_timeout(count, duration, interval);
            prop_assert_eq!(t, duration * count + interval * (count - 1));
            prop_assert!(t >= digits_send_timeout(count - 1, duration, interval));
        }
    }

    #[tokio::test]
    async fn test_action_next_noop_on_hangup() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Hangup,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.flow.next_action_calls(), 0);
        assert!(h.events.all().is_empty());
    }

    #[tokio::test]
    async fn test_action_next_noop_while_ending() {
        for status in [CallStatus::Terminating, CallStatus::Canceling] {
            let h = Harness::new();
            let call = h.insert_call(Call {
                status,
                activeflow_id: Uuid::new_v4(),
                ..Default::default()
            });
            h.flow
                .push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

            h.handler.action_next(&call).await.unwrap();
            assert_eq!(h.flow.next_action_calls(), 0, "status {}", status);
            assert!(h.channels.answered().is_empty());
            assert_eq!(h.calls.call(call.id).status, status);
        }
    }

    #[tokio::test]
    async fn test_action_next_noop_while_held() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action_next_hold: true,
            tm_action_next_hold: Some(Utc::now()),
            ..Default::default()
        });

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.flow.next_action_calls(), 0);
        assert_eq!(h.calls.call(call.id).action, call.action);
    }

    #[tokio::test]
    async fn test_action_next_takes_expired_hold() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action_next_hold: true,
            tm_action_next_hold: Some(Utc::now() - chrono::Duration::seconds(120)),
            ..Default::default()
        });
        h.flow.push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.channels.answered(), vec![call.channel_id.clone()]);
    }

    #[tokio::test]
    async fn test_action_next_without_activeflow_hangs_up() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });

        h.handler.action_next(&call).await.unwrap();
        let res = h.calls.call(call.id);
        assert_eq!(res.status, CallStatus::Terminating);
        assert_eq!(
            h.channels.hangups(),
            vec![(call.channel_id.clone(), ChannelCause::NORMAL_CLEARING)]
        );
    }

    #[tokio::test]
    async fn test_action_next_stores_and_executes() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        let next = Action::new(Uuid::new_v4(), ActionType::Answer, json!(null));
        h.flow.push_action(next.clone());

        h.handler.action_next(&call).await.unwrap();

        let res = h.calls.call(call.id);
        assert_eq!(res.action.id, next.id);
        assert!(res.action.tm_execute.is_some());
        assert!(!res.action_next_hold);
        assert_eq!(h.channels.answered(), vec![call.channel_id.clone()]);
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
        assert_eq!(
            h.metrics
                .sample("call_action_process_time_ms_count", &[("type", "answer")]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_action_next_fetch_failure_releases_hold() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.fail_next_action();

        h.handler.action_next(&call).await.unwrap();
        let res = h.calls.call(call.id);
        assert!(!res.action_next_hold);
        assert_eq!(res.status, CallStatus::Progressing);
    }

    #[tokio::test]
    async fn test_finish_sentinel_hangs_up() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(ACTION_ID_FINISH, ActionType::Unknown, json!(null)));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.calls.call(call.id).status, CallStatus::Terminating);
    }

    #[tokio::test]
    async fn test_unknown_action_hangs_up() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Unknown, json!(null)));

        let err = h.handler.action_next(&call).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedAction(_)));
        assert_eq!(h.calls.call(call.id).status, CallStatus::Terminating);
    }

    #[tokio::test]
    async fn test_executor_error_requests_next() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::ConfbridgeJoin,
            json!({"confbridge_id": "broken"}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
        assert_eq!(h.calls.call(call.id).status, CallStatus::Progressing);
    }

    #[tokio::test]
    async fn test_echo_defaults_timeout() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Echo, json!({"duration": 0})));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(
            h.channels.continues(),
            vec![(call.channel_id.clone(), CONTEXT_ECHO.to_string())]
        );
        let timeouts = h.scheduler.action_timeouts();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].1, 180_000);
    }

    #[tokio::test]
    async fn test_digits_send_arms_timeout() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::DigitsSend,
            json!({"digits": "1234", "duration": 100, "interval": 50}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.channels.dtmf_sent(), vec![(call.channel_id.clone(), "1234".to_string())]);
        assert_eq!(h.scheduler.action_timeouts()[0].1, 550);
    }

    #[tokio::test]
    async fn test_digits_send_default_duration() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::DigitsSend,
            json!({"digits": "12", "interval": 50}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.scheduler.action_timeouts()[0].1, 250);
    }

    #[tokio::test]
    async fn test_digits_send_huge_option_saturates() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::DigitsSend,
            json!({"digits": "1234", "duration": i64::MAX, "interval": i64::MAX}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.scheduler.action_timeouts()[0].1, i64::MAX);
    }

    #[tokio::test]
    async fn test_digits_receive_already_satisfied() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.set_variable(call.activeflow_id, variables::DIGITS, "12#");
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::DigitsReceive,
            json!({"duration": 5000, "key": "#"}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
        assert!(h.scheduler.action_timeouts().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_action_with_reason() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::Hangup,
            json!({"reason": "busy"}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(
            h.channels.hangups(),
            vec![(call.channel_id.clone(), ChannelCause::USER_BUSY)]
        );
    }

    #[tokio::test]
    async fn test_hangup_action_mirrors_reference() {
        let h = Harness::new();
        let reference = h.insert_call(Call {
            status: CallStatus::Hangup,
            hangup_by: HangupBy::Remote,
            ..Default::default()
        });
        h.channels.insert(Channel {
            id: reference.channel_id.clone(),
            hangup_cause: ChannelCause::NO_ANSWER,
            ..Default::default()
        });
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::Hangup,
            json!({"reference_id": reference.id}),
        ));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(
            h.channels.hangups(),
            vec![(call.channel_id.clone(), ChannelCause::NO_ANSWER)]
        );
    }

    #[tokio::test]
    async fn test_amd_caches_option() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow.push_action(Action::new(
            Uuid::new_v4(),
            ActionType::Amd,
            json!({"machine_handle": "hangup", "async": true}),
        ));

        h.handler.action_next(&call).await.unwrap();

        let snoops = h.channels.snoops();
        assert_eq!(snoops.len(), 1);
        let cached = h.amd.get(&snoops[0]).unwrap();
        assert_eq!(cached.call_id, call.id);
        assert!(cached.hangs_up_machine());
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
    }

    #[tokio::test]
    async fn test_amd_cache_failure_hangs_up_snoop() {
        let h = Harness::new();
        h.amd.fail();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Amd, json!({})));

        h.handler.action_next(&call).await.unwrap();

        let snoop = h.channels.snoops()[0].clone();
        assert_eq!(
            h.channels.hangups(),
            vec![(snoop, ChannelCause::NORMAL_CLEARING)]
        );
        // executor failure moves on
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
    }

    #[tokio::test]
    async fn test_action_timeout_stale() {
        let h = Harness::new();
        let mut action = Action::new(Uuid::new_v4(), ActionType::Sleep, json!({"duration": 10}));
        action.tm_execute = Some(Utc::now());
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            action: action.clone(),
            ..Default::default()
        });

        let mut stale = action.clone();
        stale.tm_execute = Some(Utc::now() - chrono::Duration::seconds(10));
        let err = h.handler.action_timeout(call.id, &stale).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTimedOutAction));
        assert_eq!(err.to_string(), "invalid timed out action condition");
    }

    #[tokio::test]
    async fn test_action_timeout_redirects_detached_channel() {
        let h = Harness::new();
        let mut action = Action::new(Uuid::new_v4(), ActionType::Echo, json!({}));
        action.tm_execute = Some(Utc::now());
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            action: action.clone(),
            ..Default::default()
        });
        h.channels.update(&call.channel_id, |cn| cn.stasis_name = String::new());

        h.handler.action_timeout(call.id, &action).await.unwrap();
        assert_eq!(
            h.channels.redirects(),
            vec![(call.channel_id.clone(), CONTEXT_STASIS.to_string())]
        );
        assert!(h.scheduler.action_nexts().is_empty());
    }

    #[tokio::test]
    async fn test_action_timeout_requests_next() {
        let h = Harness::new();
        let mut action = Action::new(Uuid::new_v4(), ActionType::Sleep, json!({}));
        action.tm_execute = Some(Utc::now());
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            action: action.clone(),
            ..Default::default()
        });

        h.handler.action_timeout(call.id, &action).await.unwrap();
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
    }

    #[tokio::test]
    async fn test_action_next_force_stops_playback() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action_next_hold: true,
            ..Default::default()
        });
        h.channels
            .update(&call.channel_id, |cn| cn.playback_id = "pb-1".to_string());

        h.handler.action_next_force(&call).await.unwrap();
        assert!(!h.calls.call(call.id).action_next_hold);
        assert_eq!(h.channels.playback_stops(), vec![call.channel_id.clone()]);
        assert_eq!(h.flow.next_action_calls(), 0);
    }

    #[tokio::test]
    async fn test_action_next_force_kicks_conference() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            confbridge_id: Uuid::new_v4(),
            ..Default::default()
        });

        h.handler.action_next_force(&call).await.unwrap();
        assert_eq!(h.confbridges.kicks(), vec![(call.confbridge_id, call.id)]);
        assert_eq!(h.flow.next_action_calls(), 0);
    }

    #[tokio::test]
    async fn test_action_next_force_advances() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action_next_hold: true,
            ..Default::default()
        });
        h.flow.push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

        h.handler.action_next_force(&call).await.unwrap();
        assert_eq!(h.flow.next_action_calls(), 1);
        assert_eq!(h.channels.answered(), vec![call.channel_id.clone()]);
    }
}
