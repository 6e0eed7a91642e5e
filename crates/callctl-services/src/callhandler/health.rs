//! Health supervisor
//!
//! Each live call polls its channel through the scheduler. A channel that
//! stays gone for more than the allowed retries forces the call down.

use callctl_core::models::{CallStatus, Channel, ChannelCause, HangupReason};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;

impl CallHandler {
    /// Never fails; problems are logged and the loop either continues or stops
    #[instrument(skip(self))]
    pub async fn health_check(&self, id: Uuid, retry_count: u32) {
        if retry_count > self.settings.health_check_max_retry {
            info!("The call exceeded the health check retries. Hanging up.");
            self.health_check_exceeded(id, retry_count).await;
            return;
        }

        let call = match self.calls.get(id).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not get the call. Stopping the health check. err: {}", e);
                return;
            }
        };
        if call.is_finished() {
            debug!("The call has finished. Stopping the health check.");
            return;
        }

        let next_retry = match self.channels.channel_get(&call.channel_id).await {
            Ok(cn) if !cn.is_ended() => 0,
            Ok(_) => retry_count + 1,
            Err(e) => {
                debug!("Could not get the channel. err: {}", e);
                retry_count + 1
            }
        };

        if let Err(e) = self
            .scheduler
            .health_check(id, self.settings.health_check_delay_ms as i64, next_retry)
            .await
        {
            warn!("Could not reschedule the health check. err: {}", e);
        }
    }

    async fn health_check_exceeded(&self, id: Uuid, retry_count: u32) {
        let call = match self.calls.get(id).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not get the call. Stopping the health check. err: {}", e);
                return;
            }
        };

        match call.status {
            CallStatus::Hangup => {}
            CallStatus::Terminating | CallStatus::Canceling => {
                // the channel destroyed event never arrived
                let channel = match self.channels.channel_get(&call.channel_id).await {
                    Ok(cn) if cn.is_ended() => cn,
                    Ok(_) => self
                        .channels
                        .channel_hangup(&call.channel_id, ChannelCause::NORMAL_CLEARING)
                        .await
                        .unwrap_or_else(|e| {
                            warn!("Could not hang up the channel. err: {}", e);
                            gone_channel(&call.channel_id)
                        }),
                    Err(e) => {
                        debug!("Could not get the channel. err: {}", e);
                        gone_channel(&call.channel_id)
                    }
                };

                if let Err(e) = self.hangup(&channel).await {
                    warn!("Could not complete the hangup. err: {}", e);
                }
            }
            _ => match self.hanging_up(id, HangupReason::Normal).await {
                Ok(res) if res.status != CallStatus::Hangup => {
                    // one more round completes the hangup if the channel event is lost
                    if let Err(e) = self
                        .scheduler
                        .health_check(id, self.settings.health_check_delay_ms as i64, retry_count + 1)
                        .await
                    {
                        warn!("Could not reschedule the health check. err: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Could not hang up the call. err: {}", e),
            },
        }
    }
}

fn gone_channel(id: &str) -> Channel {
    Channel {
        id: id.to_string(),
        hangup_cause: ChannelCause::NORMAL_CLEARING,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use callctl_core::models::{Call, CallEvent, CallStatus, ChannelCause, HangupBy};
    use chrono::Utc;

    #[tokio::test]
    async fn test_live_channel_resets_counter() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });

        h.handler.health_check(call.id, 2).await;
        assert_eq!(h.scheduler.health_checks(), vec![(call.id, 10_000, 0)]);
    }

    #[tokio::test]
    async fn test_ended_channel_increments_counter() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });
        h.channels
            .update(&call.channel_id, |cn| cn.tm_end = Some(Utc::now()));

        h.handler.health_check(call.id, 1).await;
        assert_eq!(h.scheduler.health_checks(), vec![(call.id, 10_000, 2)]);
    }

    #[tokio::test]
    async fn test_retry_exceeded_forces_hangup() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });

        h.handler.health_check(call.id, 3).await;
        assert_eq!(h.calls.call(call.id).status, CallStatus::Terminating);
        assert_eq!(
            h.channels.hangups(),
            vec![(call.channel_id.clone(), ChannelCause::NORMAL_CLEARING)]
        );
        assert_eq!(h.scheduler.health_checks(), vec![(call.id, 10_000, 4)]);
    }

    #[tokio::test]
    async fn test_retry_exceeded_completes_lost_hangup() {
        for status in [CallStatus::Terminating, CallStatus::Canceling] {
            let h = Harness::new();
            let call = h.insert_call(Call {
                status,
                ..Default::default()
            });
            h.channels
                .update(&call.channel_id, |cn| cn.tm_end = Some(Utc::now()));

            h.handler.health_check(call.id, 3).await;

            let res = h.calls.call(call.id);
            assert_eq!(res.status, CallStatus::Hangup, "from {}", status);
            assert_eq!(res.hangup_by, HangupBy::Local);
            assert!(h.events.contains(CallEvent::Hangup, call.id));
            assert!(h.scheduler.health_checks().is_empty());
        }
    }

    #[tokio::test]
    async fn test_retry_exceeded_without_channel() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Terminating,
            channel_id: "vanished".into(),
            ..Default::default()
        });
        h.channels.remove("vanished");

        h.handler.health_check(call.id, 3).await;
        assert_eq!(h.calls.call(call.id).status, CallStatus::Hangup);
    }

    #[tokio::test]
    async fn test_retry_exceeded_twice_finishes_call() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });

        h.handler.health_check(call.id, 3).await;
        assert_eq!(h.calls.call(call.id).status, CallStatus::Terminating);

        // the channel destroyed event is lost; the next round completes it
        h.handler.health_check(call.id, 4).await;
        assert_eq!(h.calls.call(call.id).status, CallStatus::Hangup);
    }

    #[tokio::test]
    async fn test_finished_call_stops_loop() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Hangup,
            ..Default::default()
        });

        h.handler.health_check(call.id, 0).await;
        assert!(h.scheduler.health_checks().is_empty());
    }
}
