//! Outbound call builder

use callctl_core::{
    models::{
        call::data_keys,
        channel::{format_stasis_data, stasis},
        Action, Address, AddressType, Call, CallStatus, CallType, Direction, Groupcall,
        SipTransport,
    },
    traits::ChannelCreateRequest,
    AppError, AppResult,
};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;
use crate::constants::{PJSIP_ENDPOINT_OUTGOING, PJSIP_ENDPOINT_OUTGOING_DIRECT, PROVIDER_TRANSPORT};

/// Channel variable carrying the SDP media transport profile
const VAR_SDP_TRANSPORT: &str = "PJSIP_HEADER(add,X-SDP-Transport)";

/// Parameters of a single outbound call
#[derive(Debug, Clone, Default)]
pub struct OutgoingCall {
    /// Nil generates a new id
    pub id: Uuid,
    pub customer_id: Uuid,
    pub flow_id: Uuid,
    /// Nil lets the workflow engine pick one
    pub activeflow_id: Uuid,
    pub master_call_id: Uuid,
    pub groupcall_id: Uuid,
    pub source: Address,
    pub destination: Address,
    pub early_execution: bool,
    pub execute_next_master_on_hangup: bool,
}

impl CallHandler {
    /// Build, persist and dial an outbound call
    #[instrument(skip(self, req), fields(customer_id = %req.customer_id, destination = %req.destination.target))]
    pub async fn create_call_outgoing(&self, req: OutgoingCall) -> AppResult<Call> {
        let id = if req.id.is_nil() { Uuid::new_v4() } else { req.id };

        if !req.destination.is_dialable() {
            return Err(AppError::InvalidInput(format!(
                "the destination type must be sip or tel, got '{}'",
                req.destination.kind
            )));
        }

        let country = req.destination.country_calling_code();
        if !self
            .billing
            .is_valid_balance(req.customer_id, country.as_deref())
            .await?
        {
            return Err(AppError::Validation(
                "could not pass the balance validation".to_string(),
            ));
        }
        if !self
            .billing
            .is_valid_destination(req.customer_id, &req.source, &req.destination)
            .await?
        {
            return Err(AppError::Validation(
                "could not pass the destination validation".to_string(),
            ));
        }

        let (dialroutes, dialroute_id) = if req.destination.kind == AddressType::Tel {
            let code = country.ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "'{}' is not an E.164 number",
                    req.destination.target
                ))
            })?;

            let routes = self.routes.dialroutes_get(req.customer_id, &code).await?;
            let first = routes
                .first()
                .map(|r| r.id)
                .ok_or_else(|| AppError::NotFound(format!("dialroute for {}", code)))?;
            (routes, first)
        } else {
            (Vec::new(), Uuid::nil())
        };

        let activeflow_id = match self
            .flow
            .activeflow_create(req.activeflow_id, req.customer_id, req.flow_id, id)
            .await
        {
            Ok(af) => af.id,
            Err(e) => {
                // a call without an activeflow hangs itself up on its first advancement
                error!("Could not create the activeflow. err: {}", e);
                Uuid::nil()
            }
        };

        let data = HashMap::from([
            (
                data_keys::EARLY_EXECUTION.to_string(),
                req.early_execution.to_string(),
            ),
            (
                data_keys::EXECUTE_NEXT_MASTER_ON_HANGUP.to_string(),
                req.execute_next_master_on_hangup.to_string(),
            ),
        ]);

        let call = Call {
            id,
            customer_id: req.customer_id,
            channel_id: Uuid::new_v4().to_string(),
            flow_id: req.flow_id,
            activeflow_id,
            kind: CallType::Flow,
            groupcall_id: req.groupcall_id,
            source: outgoing_source(&req.source, &req.destination),
            destination: req.destination,
            status: CallStatus::Dialing,
            data,
            action: Action::empty(),
            direction: Direction::Outgoing,
            dialroute_id,
            dialroutes,
            ..Default::default()
        };
        let res = self.create(call).await?;

        self.set_variables_call(&res).await?;

        if !req.master_call_id.is_nil() {
            if let Err(e) = self.chained_call_id_add(req.master_call_id, res.id).await {
                warn!(
                    "Could not link the call to the master call {}. err: {}",
                    req.master_call_id, e
                );
            }
        }

        self.create_channel(&res).await?;
        Ok(res)
    }

    /// One call per dialable destination, one groupcall per group destination
    ///
    /// Failed destinations are logged and skipped.
    #[instrument(skip(self, source, destinations), fields(destinations = destinations.len()))]
    pub async fn create_calls_outgoing(
        &self,
        customer_id: Uuid,
        flow_id: Uuid,
        master_call_id: Uuid,
        source: &Address,
        destinations: &[Address],
        early_execution: bool,
        connect: bool,
    ) -> (Vec<Call>, Vec<Groupcall>) {
        let mut calls = Vec::new();
        let mut groupcalls = Vec::new();

        for destination in destinations {
            if destination.is_dialable() {
                let req = OutgoingCall {
                    customer_id,
                    flow_id,
                    master_call_id,
                    source: source.clone(),
                    destination: destination.clone(),
                    early_execution,
                    execute_next_master_on_hangup: connect,
                    ..Default::default()
                };
                match self.create_call_outgoing(req).await {
                    Ok(c) => calls.push(c),
                    Err(e) => warn!("Could not create a call to {}. err: {}", destination.target, e),
                }
            } else if destination.is_groupcall_type() {
                match self
                    .groupcalls
                    .groupcall_start(
                        customer_id,
                        flow_id,
                        master_call_id,
                        source,
                        std::slice::from_ref(destination),
                        early_execution,
                        connect,
                    )
                    .await
                {
                    Ok(gc) => groupcalls.push(gc),
                    Err(e) => warn!(
                        "Could not start a groupcall to {}. err: {}",
                        destination.target, e
                    ),
                }
            } else {
                debug!("Skipping unsupported destination type {}.", destination.kind);
            }
        }

        info!(
            "Created outgoing calls. calls: {}, groupcalls: {}",
            calls.len(),
            groupcalls.len()
        );
        (calls, groupcalls)
    }

    /// Originate the call's channel
    pub(crate) async fn create_channel(&self, call: &Call) -> AppResult<()> {
        let endpoint = self.dial_uri(call).await?;
        let transport = SipTransport::detect(&endpoint);

        let mut variables = HashMap::new();
        variables.insert(
            VAR_SDP_TRANSPORT.to_string(),
            transport.sdp_transport().to_string(),
        );
        self.caller_id_variables(&mut variables, call);

        let call_id = call.id.to_string();
        let app_args = format_stasis_data(&[
            (stasis::CONTEXT_TYPE, stasis::CONTEXT_TYPE_CALL),
            (stasis::CONTEXT, stasis::CONTEXT_CALL_OUTGOING),
            (stasis::CALL_ID, &call_id),
            (stasis::TRANSPORT, transport.as_str()),
        ]);

        debug!("Creating a channel. endpoint: {}", endpoint);
        self.channels
            .channel_create(&ChannelCreateRequest {
                channel_id: call.channel_id.clone(),
                app_args,
                endpoint,
                variables,
                ..Default::default()
            })
            .await?;

        Ok(())
    }

    async fn dial_uri(&self, call: &Call) -> AppResult<String> {
        match call.destination.kind {
            AddressType::Tel => {
                let route = call
                    .dialroutes
                    .iter()
                    .find(|r| r.id == call.dialroute_id)
                    .ok_or(AppError::NoMoreDialroute)?;
                let provider = self.routes.provider_get(route.provider_id).await?;

                // the provider's tech prefix and postfix are not part of the dial uri
                Ok(format!(
                    "pjsip/{}/sip:{}@{};transport={}",
                    PJSIP_ENDPOINT_OUTGOING,
                    call.destination.target,
                    provider.hostname,
                    PROVIDER_TRANSPORT
                ))
            }
            AddressType::Sip => Ok(sip_dial_uri(&call.destination.target)),
            other => Err(AppError::InvalidInput(format!(
                "no dial uri for destination type '{}'",
                other
            ))),
        }
    }

    fn caller_id_variables(&self, variables: &mut HashMap<String, String>, call: &Call) {
        if call.destination.kind == AddressType::Tel && call.source.is_anonymous() {
            variables.insert("CALLERID(pres)".to_string(), "prohib".to_string());
            variables.insert(
                "PJSIP_HEADER(add,P-Asserted-Identity)".to_string(),
                format!("\"Anonymous\" <{}>", self.settings.anonymous_caller_uri),
            );
            variables.insert("PJSIP_HEADER(add,Privacy)".to_string(), "id".to_string());
            return;
        }

        variables.insert(
            "CALLERID(name)".to_string(),
            call.source.target_name.clone(),
        );
        variables.insert("CALLERID(num)".to_string(), call.source.target.clone());
    }
}

/// Tel destinations need an E.164 caller id; anything else is presented anonymously
fn outgoing_source(source: &Address, destination: &Address) -> Address {
    if destination.kind != AddressType::Tel || source.target.starts_with('+') {
        return source.clone();
    }
    source.anonymous_of()
}

/// Dial string of a sip destination
///
/// WebSocket targets are sent straight to their outbound proxy.
fn sip_dial_uri(target: &str) -> String {
    let uri = if target.starts_with("sip:") || target.starts_with("sips:") {
        target.to_string()
    } else {
        format!("sip:{}", target)
    };

    if !target.contains("transport=ws") {
        return format!("pjsip/{}/{}", PJSIP_ENDPOINT_OUTGOING, uri);
    }

    let proxy = uri
        .split(';')
        .find_map(|p| p.strip_prefix("outbound_proxy="))
        .unwrap_or_default();
    format!("pjsip/{}{}/{}", PJSIP_ENDPOINT_OUTGOING_DIRECT, proxy, uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use callctl_core::models::{CallEvent, Dialroute, Provider};

    fn tel_request(customer_id: Uuid) -> OutgoingCall {
        OutgoingCall {
            customer_id,
            flow_id: Uuid::new_v4(),
            source: Address::tel("+821100000001"),
            destination: Address::tel("+821100000002"),
            ..Default::default()
        }
    }

    #[test]
    fn test_sip_dial_uri() {
        assert_eq!(
            sip_dial_uri("alice@example.com"),
            "pjsip/call-out/sip:alice@example.com"
        );
        assert_eq!(
            sip_dial_uri("sips:bob@example.com"),
            "pjsip/call-out/sips:bob@example.com"
        );
        assert_eq!(
            sip_dial_uri("sip:carol@10.0.0.5;transport=ws;outbound_proxy=proxy.example.com:5060"),
            "pjsip/call-out-direct-proxy.example.com:5060/sip:carol@10.0.0.5;transport=ws;outbound_proxy=proxy.example.com:5060"
        );
    }

    #[test]
    fn test_outgoing_source() {
        let tel = Address::tel("+821100000002");
        let plain = Address::tel("1234");
        let res = outgoing_source(&plain, &tel);
        assert!(res.is_anonymous());
        assert_eq!(res.target_name, "Anonymous");

        let e164 = Address::tel("+821100000001");
        assert_eq!(outgoing_source(&e164, &tel), e164);

        let sip = Address::sip("alice@example.com");
        assert_eq!(outgoing_source(&plain, &sip), plain);
    }

    #[tokio::test]
    async fn test_create_tel_call() {
        let h = Harness::new();
        let customer_id = Uuid::new_v4();
        let route = Dialroute {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            ..Default::default()
        };
        h.routes.set_dialroutes("+82", vec![route.clone()]);
        h.routes.set_provider(Provider {
            id: route.provider_id,
            hostname: "sip.carrier.example".into(),
            tech_prefix: "0099".into(),
            tech_postfix: ";npdi".into(),
            ..Default::default()
        });

        let res = h
            .handler
            .create_call_outgoing(tel_request(customer_id))
            .await
            .unwrap();

        assert_eq!(res.status, CallStatus::Dialing);
        assert_eq!(res.direction, Direction::Outgoing);
        assert_eq!(res.dialroute_id, route.id);
        assert!(res.has_activeflow());
        assert!(h.events.contains(CallEvent::Created, res.id));

        let created = h.channels.created();
        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].endpoint,
            "pjsip/call-out/sip:+821100000002@sip.carrier.example;transport=udp"
        );
        assert_eq!(created[0].variables["CALLERID(num)"], "+821100000001");
        assert_eq!(created[0].variables[VAR_SDP_TRANSPORT], "RTP/AVP");
        assert!(created[0].app_args.contains("context=call-out"));

        let vars = h.flow.variables(res.activeflow_id);
        assert_eq!(vars["callctl.call.direction"], "outgoing");
        assert_eq!(vars["callctl.call.destination.target"], "+821100000002");
    }

    #[tokio::test]
    async fn test_anonymous_caller_id() {
        let h = Harness::new();
        h.routes.set_dialroutes(
            "+82",
            vec![Dialroute {
                id: Uuid::new_v4(),
                provider_id: Uuid::new_v4(),
                ..Default::default()
            }],
        );
        let mut req = tel_request(Uuid::new_v4());
        req.source = Address::tel("private");

        let res = h.handler.create_call_outgoing(req).await.unwrap();
        assert!(res.source.is_anonymous());

        let vars = &h.channels.created()[0].variables;
        assert_eq!(vars["CALLERID(pres)"], "prohib");
        assert_eq!(vars["PJSIP_HEADER(add,Privacy)"], "id");
        assert!(!vars.contains_key("CALLERID(num)"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let h = Harness::new();

        let mut req = tel_request(Uuid::new_v4());
        req.destination = Address::new(AddressType::Agent, Uuid::new_v4().to_string());
        assert!(matches!(
            h.handler.create_call_outgoing(req).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        h.billing.deny_balance();
        let err = h
            .handler
            .create_call_outgoing(tel_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.channels.created().is_empty());
    }

    #[tokio::test]
    async fn test_no_dialroute() {
        let h = Harness::new();
        let err = h
            .handler
            .create_call_outgoing(tel_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_activeflow_failure_keeps_call() {
        let h = Harness::new();
        h.flow.fail_create();
        let req = OutgoingCall {
            customer_id: Uuid::new_v4(),
            destination: Address::sip("alice@example.com"),
            ..Default::default()
        };

        let res = h.handler.create_call_outgoing(req).await.unwrap();
        assert!(!res.has_activeflow());
        assert_eq!(h.channels.created().len(), 1);
    }

    #[tokio::test]
    async fn test_links_master() {
        let h = Harness::new();
        let master = h.insert_call(Call {
            status: CallStatus::Progressing,
            ..Default::default()
        });
        let req = OutgoingCall {
            customer_id: Uuid::new_v4(),
            master_call_id: master.id,
            destination: Address::sip("alice@example.com"),
            execute_next_master_on_hangup: true,
            ..Default::default()
        };

        let res = h.handler.create_call_outgoing(req).await.unwrap();
        let res = h.calls.call(res.id);
        assert_eq!(res.master_call_id, master.id);
        assert!(res.is_execute_next_master_on_hangup());
        assert_eq!(h.calls.call(master.id).chained_call_ids, vec![res.id]);
    }

    #[tokio::test]
    async fn test_create_calls_outgoing_mixed() {
        let h = Harness::new();
        let destinations = vec![
            Address::sip("alice@example.com"),
            Address::new(AddressType::Agent, Uuid::new_v4().to_string()),
            Address::new(AddressType::Conference, Uuid::new_v4().to_string()),
            // no dial route configured, skipped
            Address::tel("+821100000009"),
        ];

        let (calls, groupcalls) = h
            .handler
            .create_calls_outgoing(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::nil(),
                &Address::sip("bot@example.com"),
                &destinations,
                false,
                false,
            )
            .await;

        assert_eq!(calls.len(), 1);
        assert_eq!(groupcalls.len(), 1);
        assert_eq!(h.groupcalls.started(), 1);
    }
}
