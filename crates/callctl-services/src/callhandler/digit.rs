//! Digit collector
//!
//! Received digits are accumulated in the activeflow variable
//! `callctl.call.digits`.

use callctl_core::{
    models::{
        action::{OptionDigitsReceive, OptionTalk, DIGITS_HANDLE_NEXT},
        activeflow::variables,
        ActionType, Call,
    },
    AppResult,
};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::action::is_digits_condition;
use super::CallHandler;

impl CallHandler {
    /// A DTMF digit arrived on `channel_id`
    #[instrument(skip(self))]
    pub async fn digits_received(&self, channel_id: &str, digit: &str, duration: i64) -> AppResult<()> {
        let call = match self.calls.get_by_channel_id(channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                debug!("The channel does not belong to a call. Ignoring the digit.");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let append = HashMap::from([(
            variables::DIGITS.to_string(),
            variables::digits_append_template(digit),
        )]);
        self.flow.variables_set(call.activeflow_id, &append).await?;

        match call.action.kind {
            ActionType::DigitsReceive => {
                let opt: OptionDigitsReceive = call.action.parse_option()?;
                let digits = self.digits_of(&call).await?;
                if is_digits_condition(&digits, &opt) {
                    debug!("Digits condition met. digits: {}", digits);
                    self.action_next(&call).await?;
                }
            }
            ActionType::Talk => {
                let opt: OptionTalk = call.action.parse_option()?;
                if opt.digits_handle == DIGITS_HANDLE_NEXT {
                    self.action_next_force(&call).await?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub async fn digits_get(&self, id: Uuid) -> AppResult<String> {
        let call = self.calls.get(id).await?;
        self.digits_of(&call).await
    }

    /// Overwrite the collected digits
    pub async fn digits_set(&self, id: Uuid, digits: &str) -> AppResult<()> {
        let call = self.calls.get(id).await?;
        let vars = HashMap::from([(variables::DIGITS.to_string(), digits.to_string())]);
        self.flow.variables_set(call.activeflow_id, &vars).await
    }

    pub(crate) async fn digits_of(&self, call: &Call) -> AppResult<String> {
        let vars = self.flow.variables_get(call.activeflow_id).await?;
        Ok(vars.get(variables::DIGITS).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use callctl_core::models::{activeflow::variables, Action, ActionType, Call, CallStatus};
    use serde_json::json;
    use uuid::Uuid;

    fn waiting_call(h: &Harness, kind: ActionType, option: serde_json::Value) -> Call {
        h.insert_call(Call {
            status: CallStatus::Progressing,
            activeflow_id: Uuid::new_v4(),
            action: Action::new(Uuid::new_v4(), kind, option),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_digits_accumulate() {
        let h = Harness::new();
        let call = waiting_call(&h, ActionType::Sleep, json!({}));

        for d in ["1", "2", "3"] {
            h.handler
                .digits_received(&call.channel_id, d, 100)
                .await
                .unwrap();
        }
        assert_eq!(h.handler.digits_get(call.id).await.unwrap(), "123");
        assert_eq!(h.flow.next_action_calls(), 0);
    }

    #[tokio::test]
    async fn test_digits_receive_terminator_advances() {
        let h = Harness::new();
        let call = waiting_call(&h, ActionType::DigitsReceive, json!({"key": "#", "length": 10}));
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

        h.handler
            .digits_received(&call.channel_id, "4", 100)
            .await
            .unwrap();
        assert_eq!(h.flow.next_action_calls(), 0);

        h.handler
            .digits_received(&call.channel_id, "#", 100)
            .await
            .unwrap();
        assert_eq!(h.flow.next_action_calls(), 1);
    }

    #[tokio::test]
    async fn test_talk_next_forces_advance() {
        let h = Harness::new();
        let call = waiting_call(&h, ActionType::Talk, json!({"text": "hi", "digits_handle": "next"}));
        h.channels
            .update(&call.channel_id, |cn| cn.playback_id = call.action.id.to_string());

        h.handler
            .digits_received(&call.channel_id, "5", 100)
            .await
            .unwrap();
        assert_eq!(h.channels.playback_stops(), vec![call.channel_id.clone()]);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_ignored() {
        let h = Harness::new();
        h.handler.digits_received("nobody", "1", 100).await.unwrap();
    }

    #[tokio::test]
    async fn test_digits_set_overwrites() {
        let h = Harness::new();
        let call = waiting_call(&h, ActionType::Sleep, json!({}));
        h.flow.set_variable(call.activeflow_id, variables::DIGITS, "999");

        h.handler.digits_set(call.id, "12").await.unwrap();
        assert_eq!(h.handler.digits_get(call.id).await.unwrap(), "12");
    }
}
