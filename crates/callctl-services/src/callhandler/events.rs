//! Signaling event router
//!
//! Events from the channel adapter are delivered here one at a time and
//! dispatched to the lifecycle operations of the handler.

use callctl_core::{
    models::{channel::stasis, Address, Channel},
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::CallHandler;
use crate::constants::CONTEXT_CALL_AMD;

/// Event reported by the channel adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingEvent {
    StasisStart {
        channel: Channel,
    },
    ChannelStateChanged {
        channel: Channel,
    },
    ChannelLeftBridge {
        channel: Channel,
        bridge_id: String,
    },
    ChannelDestroyed {
        channel: Channel,
    },
    DtmfReceived {
        channel_id: String,
        digit: String,
        #[serde(default)]
        duration: i64,
    },
    PlaybackFinished {
        channel_id: String,
        playback_id: String,
    },
    AmdResult {
        snoop_id: String,
        result: String,
    },
}

impl SignalingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SignalingEvent::StasisStart { .. } => "stasis_start",
            SignalingEvent::ChannelStateChanged { .. } => "channel_state_changed",
            SignalingEvent::ChannelLeftBridge { .. } => "channel_left_bridge",
            SignalingEvent::ChannelDestroyed { .. } => "channel_destroyed",
            SignalingEvent::DtmfReceived { .. } => "dtmf_received",
            SignalingEvent::PlaybackFinished { .. } => "playback_finished",
            SignalingEvent::AmdResult { .. } => "amd_result",
        }
    }
}

/// Address carried in stasis data: E.164 numbers are tel, anything else sip
fn stasis_address(value: Option<&str>) -> Address {
    match value {
        Some(v) if v.starts_with('+') => Address::tel(v),
        Some(v) => Address::sip(v),
        None => Address::default(),
    }
}

fn stasis_uuid(channel: &Channel, key: &str) -> AppResult<Uuid> {
    channel
        .stasis(key)
        .ok_or_else(|| AppError::MissingField(key.to_string()))
        .and_then(|v| {
            Uuid::parse_str(v)
                .map_err(|e| AppError::InvalidInput(format!("stasis {}: {}", key, e)))
        })
}

impl CallHandler {
    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn handle_event(&self, event: SignalingEvent) -> AppResult<()> {
        match event {
            SignalingEvent::StasisStart { channel } => self.on_stasis_start(&channel).await,
            SignalingEvent::ChannelStateChanged { channel } => {
                self.update_status_by_channel(&channel).await
            }
            SignalingEvent::ChannelLeftBridge { channel, bridge_id } => {
                self.on_channel_left_bridge(&channel, &bridge_id).await
            }
            SignalingEvent::ChannelDestroyed { channel } => match self.hangup(&channel).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!("No call owns the destroyed channel {}.", channel.id);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            SignalingEvent::DtmfReceived {
                channel_id,
                digit,
                duration,
            } => self.digits_received(&channel_id, &digit, duration).await,
            SignalingEvent::PlaybackFinished {
                channel_id,
                playback_id,
            } => self.on_playback_finished(&channel_id, &playback_id).await,
            SignalingEvent::AmdResult { snoop_id, result } => {
                self.amd_result(&snoop_id, &result).await
            }
        }
    }

    async fn on_stasis_start(&self, channel: &Channel) -> AppResult<()> {
        let owner = match self.calls.get_by_channel_id(&channel.id).await {
            Ok(call) => Some(call),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match (channel.stasis(stasis::CONTEXT).unwrap_or_default(), owner) {
            (CONTEXT_CALL_AMD, _) => self.start_amd_channel(channel).await,
            (stasis::CONTEXT_CALL_OUTGOING, Some(call)) if call.bridge_id.is_empty() => {
                self.start_outgoing_channel(channel).await
            }
            // a channel re-entering the application after a dialplan detour
            (_, Some(call)) => {
                debug!("The channel returned to the application. Moving the call {} on.", call.id);
                self.action_next(&call).await
            }
            (stasis::CONTEXT_CALL_INCOMING, None) => {
                let customer_id = stasis_uuid(channel, stasis::CUSTOMER_ID)?;
                let flow_id = stasis_uuid(channel, stasis::FLOW_ID)?;
                let source = stasis_address(channel.stasis(stasis::SOURCE));
                let destination = stasis_address(channel.stasis(stasis::DESTINATION));

                self.start_incoming(channel, customer_id, flow_id, source, destination)
                    .await
                    .map(|_| ())
            }
            (other, None) => {
                warn!("No call for the channel in context '{}'. Ignoring the channel.", other);
                Ok(())
            }
        }
    }

    async fn on_playback_finished(&self, channel_id: &str, playback_id: &str) -> AppResult<()> {
        let call = match self.calls.get_by_channel_id(channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if call.action.id.to_string() != playback_id {
            debug!("The playback {} is not the current action. Ignoring.", playback_id);
            return Ok(());
        }

        self.action_next(&call).await
    }

    async fn on_channel_left_bridge(&self, channel: &Channel, bridge_id: &str) -> AppResult<()> {
        let call = match self.calls.get_by_channel_id(&channel.id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if call.confbridge_id.is_nil() || call.confbridge_id.to_string() != bridge_id {
            return Ok(());
        }

        let res = self.update_confbridge_id(call.id, Uuid::nil()).await?;
        if res.is_finished() {
            return Ok(());
        }
        self.scheduler.action_next(res.id, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTEXT_AMD;
    use crate::testing::Harness;
    use callctl_core::models::{
        channel::parse_stasis_data, Action, ActionType, AddressType, Call, CallStatus,
        ChannelCause, ChannelState, Dialroute, Direction,
    };
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let raw = json!({
            "type": "dtmf_received",
            "channel_id": "c1",
            "digit": "5",
        });
        let ev: SignalingEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            ev,
            SignalingEvent::DtmfReceived {
                channel_id: "c1".into(),
                digit: "5".into(),
                duration: 0,
            }
        );
        assert_eq!(ev.name(), "dtmf_received");

        let raw = json!({"type": "channel_destroyed", "channel": {"id": "c2", "hangup_cause": 17}});
        match serde_json::from_value::<SignalingEvent>(raw).unwrap() {
            SignalingEvent::ChannelDestroyed { channel } => assert_eq!(channel.id, "c2"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_stasis_address() {
        assert_eq!(stasis_address(Some("+821100000001")).kind, AddressType::Tel);
        assert_eq!(stasis_address(Some("alice@example.com")).kind, AddressType::Sip);
        assert_eq!(stasis_address(None), Address::default());
    }

    #[tokio::test]
    async fn test_stasis_start_incoming() {
        let h = Harness::new();
        let customer_id = Uuid::new_v4();
        let cn = Channel {
            id: "in-1".into(),
            state: ChannelState::Ring,
            stasis_name: "callctl".into(),
            stasis_data: [
                (stasis::CONTEXT, stasis::CONTEXT_CALL_INCOMING.to_string()),
                (stasis::CUSTOMER_ID, customer_id.to_string()),
                (stasis::FLOW_ID, Uuid::new_v4().to_string()),
                (stasis::SOURCE, "+821100000001".to_string()),
                (stasis::DESTINATION, "+821100000002".to_string()),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            ..Default::default()
        };
        h.channels.insert(cn.clone());

        h.handler
            .handle_event(SignalingEvent::StasisStart { channel: cn })
            .await
            .unwrap();

        let call = h.calls.by_channel("in-1").unwrap();
        assert_eq!(call.customer_id, customer_id);
        assert_eq!(call.source, Address::tel("+821100000001"));
    }

    #[tokio::test]
    async fn test_stasis_start_incoming_requires_customer() {
        let h = Harness::new();
        let cn = Channel {
            id: "in-2".into(),
            stasis_data: [(
                stasis::CONTEXT.to_string(),
                stasis::CONTEXT_CALL_INCOMING.to_string(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let err = h
            .handler
            .handle_event(SignalingEvent::StasisStart { channel: cn })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField(_)));
    }

    #[tokio::test]
    async fn test_stasis_start_amd_snoop() {
        let h = Harness::new();
        let cn = Channel {
            id: "snoop-1".into(),
            stasis_data: [(stasis::CONTEXT.to_string(), CONTEXT_CALL_AMD.to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };

        h.handler
            .handle_event(SignalingEvent::StasisStart { channel: cn })
            .await
            .unwrap();
        assert_eq!(
            h.channels.continues(),
            vec![("snoop-1".to_string(), CONTEXT_AMD.to_string())]
        );
    }

    #[tokio::test]
    async fn test_playback_finished_matches_action() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action: Action::new(Uuid::new_v4(), ActionType::Play, json!({})),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

        h.handler
            .handle_event(SignalingEvent::PlaybackFinished {
                channel_id: call.channel_id.clone(),
                playback_id: Uuid::new_v4().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(h.flow.next_action_calls(), 0);

        h.handler
            .handle_event(SignalingEvent::PlaybackFinished {
                channel_id: call.channel_id.clone(),
                playback_id: call.action.id.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(h.flow.next_action_calls(), 1);
    }

    #[tokio::test]
    async fn test_left_confbridge_requests_next() {
        let h = Harness::new();
        let call = h.insert_call(Call {
            status: CallStatus::Progressing,
            confbridge_id: Uuid::new_v4(),
            ..Default::default()
        });
        let cn = h.channels.get(&call.channel_id);

        h.handler
            .handle_event(SignalingEvent::ChannelLeftBridge {
                channel: cn.clone(),
                bridge_id: "some-other-bridge".into(),
            })
            .await
            .unwrap();
        assert!(h.scheduler.action_nexts().is_empty());

        h.handler
            .handle_event(SignalingEvent::ChannelLeftBridge {
                channel: cn,
                bridge_id: call.confbridge_id.to_string(),
            })
            .await
            .unwrap();
        assert!(h.calls.call(call.id).confbridge_id.is_nil());
        assert_eq!(h.scheduler.action_nexts(), vec![(call.id, false)]);
    }

    #[tokio::test]
    async fn test_failover_channel_dials_on_stasis_start() {
        let h = Harness::new();
        let dialroutes: Vec<Dialroute> = (0..2u128)
            .map(|i| Dialroute {
                id: Uuid::from_u128(0x100 + i),
                provider_id: Uuid::from_u128(0x200 + i),
                ..Default::default()
            })
            .collect();
        let call = h.insert_call(Call {
            direction: Direction::Outgoing,
            status: CallStatus::Dialing,
            destination: Address::tel("+821100000001"),
            activeflow_id: Uuid::new_v4(),
            bridge_id: "bridge-first".into(),
            dialroute_id: dialroutes[0].id,
            dialroutes,
            ..Default::default()
        });

        h.handler
            .handle_event(SignalingEvent::ChannelDestroyed {
                channel: Channel {
                    id: call.channel_id.clone(),
                    hangup_cause: ChannelCause::NETWORK_OUT_OF_ORDER,
                    tm_end: Some(Utc::now()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let res = h.calls.call(call.id);
        assert!(res.bridge_id.is_empty());
        assert_eq!(h.channels.bridges_deleted(), vec!["bridge-first".to_string()]);
        let created = h.channels.created();
        assert_eq!(created.len(), 1);

        let cn = Channel {
            id: res.channel_id.clone(),
            stasis_data: parse_stasis_data(&created[0].app_args),
            ..Default::default()
        };
        h.handler
            .handle_event(SignalingEvent::StasisStart { channel: cn })
            .await
            .unwrap();

        assert_eq!(h.channels.dialed(), vec![res.channel_id.clone()]);
        assert!(!h.calls.call(call.id).bridge_id.is_empty());
        assert_eq!(h.flow.next_action_calls(), 0);
    }

    #[tokio::test]
    async fn test_destroyed_unknown_channel_is_ignored() {
        let h = Harness::new();
        h.handler
            .handle_event(SignalingEvent::ChannelDestroyed {
                channel: Channel {
                    id: "ghost".into(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
    }
}
