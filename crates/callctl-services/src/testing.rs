//! In-memory collaborators for exercising the call handler
//!
//! Every fake records what it was asked to do so tests can assert on the
//! requests the handler made. Failure switches (`fail_*`, `deny_*`) make the
//! next matching request fail.

use async_trait::async_trait;
use callctl_core::{
    models::{
        Action, Activeflow, Address, Call, CallAmd, CallEvent, CallStatus, Channel, ChannelCause,
        ChannelState, Dialroute, Groupcall, HangupBy, HangupReason, MuteDirection, Provider,
    },
    traits::{
        AmdCache, BillingValidator, BridgeAdapter, CallFilter, CallRepository, CallTransaction,
        ChannelAdapter, ChannelCreateRequest, ConfbridgeService, EventPublisher,
        ExternalMediaStartRequest, GroupcallCoordinator, MediaService, MetricsSink,
        RecordingStartRequest, RequestScheduler, RouteService, WorkflowEngine,
    },
    AppError, AppResult, CallSettings,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::callhandler::{CallHandler, CallHandlerDeps};
use crate::telemetry::CallMetrics;

/// Stasis application name given to fake channels
pub const STASIS_NAME: &str = "callctl";

// ==================== Call store ====================

#[derive(Default)]
pub struct FakeCalls {
    store: Arc<Mutex<HashMap<Uuid, Call>>>,
}

impl FakeCalls {
    /// Current record; panics when missing
    pub fn call(&self, id: Uuid) -> Call {
        self.store
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no call {}", id))
    }

    pub fn by_channel(&self, channel_id: &str) -> Option<Call> {
        self.store
            .lock()
            .values()
            .find(|c| c.channel_id == channel_id)
            .cloned()
    }

    pub fn put(&self, call: Call) {
        self.store.lock().insert(call.id, call);
    }

    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut Call)) {
        if let Some(c) = self.store.lock().get_mut(&id) {
            f(c);
        }
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut Call)) -> AppResult<()> {
        let mut store = self.store.lock();
        let call = store
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;
        f(call);
        call.tm_update = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl CallRepository for FakeCalls {
    async fn create(&self, call: &Call) -> AppResult<()> {
        let mut store = self.store.lock();
        if store.contains_key(&call.id) {
            return Err(AppError::Conflict(format!("call {} exists", call.id)));
        }
        let mut c = call.clone();
        c.tm_create.get_or_insert_with(Utc::now);
        store.insert(c.id, c);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Call> {
        self.store
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))
    }

    async fn get_by_channel_id(&self, channel_id: &str) -> AppResult<Call> {
        self.by_channel(channel_id)
            .ok_or_else(|| AppError::CallNotFound(format!("channel {}", channel_id)))
    }

    async fn gets(
        &self,
        size: u64,
        token: DateTime<Utc>,
        filter: &CallFilter,
    ) -> AppResult<Vec<Call>> {
        let mut res: Vec<Call> = self
            .store
            .lock()
            .values()
            .filter(|c| c.tm_create.map(|t| t < token).unwrap_or(false))
            .filter(|c| filter.customer_id.map_or(true, |id| c.customer_id == id))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.deleted.map_or(true, |d| c.tm_delete.is_some() == d))
            .cloned()
            .collect();
        res.sort_by(|a, b| b.tm_create.cmp(&a.tm_create));
        res.truncate(size as usize);
        Ok(res)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.modify(id, |c| c.tm_delete = Some(Utc::now()))
    }

    async fn set_status(&self, id: Uuid, status: CallStatus) -> AppResult<bool> {
        let mut store = self.store.lock();
        let call = store
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        if !call.status.can_transition_to(status) {
            return Ok(false);
        }
        call.status = status;
        match status {
            CallStatus::Ringing => call.tm_ringing = Some(Utc::now()),
            CallStatus::Progressing => call.tm_progressing = Some(Utc::now()),
            _ => {}
        }
        Ok(true)
    }

    async fn set_hangup(&self, id: Uuid, reason: HangupReason, hangup_by: HangupBy) -> AppResult<()> {
        self.modify(id, |c| {
            c.status = CallStatus::Hangup;
            c.hangup_reason = reason;
            c.hangup_by = hangup_by;
            c.tm_hangup = Some(Utc::now());
        })
    }

    async fn acquire_action_next_hold(&self, id: Uuid, lease: Duration) -> AppResult<bool> {
        let mut store = self.store.lock();
        let call = store
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        let now = Utc::now();
        if call.is_action_next_held(now, lease) {
            return Ok(false);
        }
        call.action_next_hold = true;
        call.tm_action_next_hold = Some(now);
        Ok(true)
    }

    async fn set_action_next_hold(&self, id: Uuid, hold: bool) -> AppResult<()> {
        self.modify(id, |c| {
            c.action_next_hold = hold;
            c.tm_action_next_hold = hold.then(Utc::now);
        })
    }

    async fn set_action_and_action_next_hold(
        &self,
        id: Uuid,
        action: &Action,
        hold: bool,
    ) -> AppResult<()> {
        self.modify(id, |c| {
            c.action = action.clone();
            c.action_next_hold = hold;
            c.tm_action_next_hold = hold.then(Utc::now);
        })
    }

    async fn set_recording_id(&self, id: Uuid, recording_id: Uuid) -> AppResult<()> {
        self.modify(id, |c| {
            c.recording_id = recording_id;
            if !recording_id.is_nil() {
                c.recording_ids.push(recording_id);
            }
        })
    }

    async fn set_confbridge_id(&self, id: Uuid, confbridge_id: Uuid) -> AppResult<()> {
        self.modify(id, |c| c.confbridge_id = confbridge_id)
    }

    async fn set_bridge_id(&self, id: Uuid, bridge_id: &str) -> AppResult<()> {
        self.modify(id, |c| c.bridge_id = bridge_id.to_string())
    }

    async fn set_data(&self, id: Uuid, data: &HashMap<String, String>) -> AppResult<()> {
        self.modify(id, |c| c.data = data.clone())
    }

    async fn set_mute_direction(&self, id: Uuid, direction: MuteDirection) -> AppResult<()> {
        self.modify(id, |c| c.mute_direction = direction)
    }

    async fn set_for_route_failover(
        &self,
        id: Uuid,
        channel_id: &str,
        dialroute_id: Uuid,
    ) -> AppResult<()> {
        self.modify(id, |c| {
            c.channel_id = channel_id.to_string();
            c.dialroute_id = dialroute_id;
            c.bridge_id.clear();
        })
    }

    async fn add_external_media_id(
        &self,
        id: Uuid,
        external_media_id: Uuid,
        capacity: usize,
    ) -> AppResult<bool> {
        let mut store = self.store.lock();
        let call = store
            .get_mut(&id)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))?;

        if call.external_media_ids.len() >= capacity {
            return Ok(false);
        }
        call.external_media_ids.push(external_media_id);
        Ok(true)
    }

    async fn remove_external_media_id(&self, id: Uuid, external_media_id: Uuid) -> AppResult<()> {
        self.modify(id, |c| c.external_media_ids.retain(|e| *e != external_media_id))
    }

    async fn call_tx_start(&self, id: Uuid) -> AppResult<(Box<dyn CallTransaction>, Call)> {
        let call = self.get(id).await?;
        let tx = FakeTx {
            store: self.store.clone(),
            staged: Vec::new(),
        };
        Ok((Box::new(tx), call))
    }
}

enum Staged {
    AddChained(Uuid, Uuid),
    RemoveChained(Uuid, Uuid),
    SetMaster(Uuid, Uuid),
}

/// Writes are staged and applied on commit
struct FakeTx {
    store: Arc<Mutex<HashMap<Uuid, Call>>>,
    staged: Vec<Staged>,
}

#[async_trait]
impl CallTransaction for FakeTx {
    async fn get(&mut self, id: Uuid) -> AppResult<Call> {
        self.store
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))
    }

    async fn add_chained_call_id(&mut self, id: Uuid, chained_call_id: Uuid) -> AppResult<()> {
        self.staged.push(Staged::AddChained(id, chained_call_id));
        Ok(())
    }

    async fn remove_chained_call_id(&mut self, id: Uuid, chained_call_id: Uuid) -> AppResult<()> {
        self.staged.push(Staged::RemoveChained(id, chained_call_id));
        Ok(())
    }

    async fn set_master_call_id(&mut self, id: Uuid, master_call_id: Uuid) -> AppResult<()> {
        self.staged.push(Staged::SetMaster(id, master_call_id));
        Ok(())
    }

    async fn finish(self: Box<Self>, commit: bool) -> AppResult<()> {
        if !commit {
            return Ok(());
        }

        let mut store = self.store.lock();
        for op in self.staged {
            match op {
                Staged::AddChained(id, chained) => {
                    if let Some(c) = store.get_mut(&id) {
                        c.chained_call_ids.push(chained);
                    }
                }
                Staged::RemoveChained(id, chained) => {
                    if let Some(c) = store.get_mut(&id) {
                        c.chained_call_ids.retain(|x| *x != chained);
                    }
                }
                Staged::SetMaster(id, master) => {
                    if let Some(c) = store.get_mut(&id) {
                        c.master_call_id = master;
                    }
                }
            }
        }
        Ok(())
    }
}

// ==================== Channels and bridges ====================

#[derive(Default)]
struct ChannelLog {
    answered: Vec<String>,
    hangups: Vec<(String, ChannelCause)>,
    continues: Vec<(String, String)>,
    redirects: Vec<(String, String)>,
    dtmf: Vec<(String, String)>,
    snoops: Vec<String>,
    playback_stops: Vec<String>,
    plays: Vec<(String, Vec<String>)>,
    created: Vec<ChannelCreateRequest>,
    dialed: Vec<String>,
    joined: Vec<(String, String)>,
    bridges_deleted: Vec<String>,
}

#[derive(Default)]
pub struct FakeChannels {
    channels: Mutex<HashMap<String, Channel>>,
    log: Mutex<ChannelLog>,
    failing_hangups: Mutex<HashSet<String>>,
    fail_create: AtomicBool,
    fail_dial: AtomicBool,
    end_on_hangup: AtomicBool,
}

impl FakeChannels {
    pub fn insert(&self, channel: Channel) {
        self.channels.lock().insert(channel.id.clone(), channel);
    }

    /// Forget a channel as if the adapter had already cleaned it up
    pub fn remove(&self, id: &str) {
        self.channels.lock().remove(id);
    }

    /// Current channel; panics when missing
    pub fn get(&self, id: &str) -> Channel {
        self.channels
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no channel {}", id))
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut Channel)) {
        if let Some(cn) = self.channels.lock().get_mut(id) {
            f(cn);
        }
    }

    pub fn fail_hangup(&self, id: &str) {
        self.failing_hangups.lock().insert(id.to_string());
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_dial(&self) {
        self.fail_dial.store(true, Ordering::SeqCst);
    }

    /// Hung up channels come back already ended
    pub fn end_on_hangup(&self) {
        self.end_on_hangup.store(true, Ordering::SeqCst);
    }

    pub fn answered(&self) -> Vec<String> {
        self.log.lock().answered.clone()
    }

    /// Every hangup request, including failed ones
    pub fn hangups(&self) -> Vec<(String, ChannelCause)> {
        self.log.lock().hangups.clone()
    }

    pub fn continues(&self) -> Vec<(String, String)> {
        self.log.lock().continues.clone()
    }

    pub fn redirects(&self) -> Vec<(String, String)> {
        self.log.lock().redirects.clone()
    }

    pub fn dtmf_sent(&self) -> Vec<(String, String)> {
        self.log.lock().dtmf.clone()
    }

    /// Ids of snoop channels
    pub fn snoops(&self) -> Vec<String> {
        self.log.lock().snoops.clone()
    }

    pub fn playback_stops(&self) -> Vec<String> {
        self.log.lock().playback_stops.clone()
    }

    pub fn plays(&self) -> Vec<(String, Vec<String>)> {
        self.log.lock().plays.clone()
    }

    pub fn created(&self) -> Vec<ChannelCreateRequest> {
        self.log.lock().created.clone()
    }

    pub fn dialed(&self) -> Vec<String> {
        self.log.lock().dialed.clone()
    }

    /// `(bridge_id, channel_id)` pairs
    pub fn joined(&self) -> Vec<(String, String)> {
        self.log.lock().joined.clone()
    }

    pub fn bridges_deleted(&self) -> Vec<String> {
        self.log.lock().bridges_deleted.clone()
    }
}

#[async_trait]
impl ChannelAdapter for FakeChannels {
    async fn channel_get(&self, id: &str) -> AppResult<Channel> {
        self.channels
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("channel {}", id)))
    }

    async fn channel_create(&self, req: &ChannelCreateRequest) -> AppResult<Channel> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::peer("channel", "could not originate"));
        }

        self.log.lock().created.push(req.clone());
        let cn = Channel {
            id: req.channel_id.clone(),
            state: ChannelState::Down,
            stasis_name: STASIS_NAME.to_string(),
            ..Default::default()
        };
        self.insert(cn.clone());
        Ok(cn)
    }

    async fn channel_hangup(&self, id: &str, cause: ChannelCause) -> AppResult<Channel> {
        self.log.lock().hangups.push((id.to_string(), cause));
        if self.failing_hangups.lock().contains(id) {
            return Err(AppError::peer("channel", format!("could not hang up {}", id)));
        }

        let mut channels = self.channels.lock();
        let cn = channels.entry(id.to_string()).or_insert_with(|| Channel {
            id: id.to_string(),
            ..Default::default()
        });
        cn.hangup_cause = cause;
        if self.end_on_hangup.load(Ordering::SeqCst) {
            cn.tm_end = Some(Utc::now());
        }
        Ok(cn.clone())
    }

    async fn channel_answer(&self, id: &str) -> AppResult<()> {
        self.log.lock().answered.push(id.to_string());
        Ok(())
    }

    async fn channel_dial(&self, id: &str, _caller: &str, _timeout_secs: u64) -> AppResult<()> {
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(AppError::peer("channel", "could not dial"));
        }
        self.log.lock().dialed.push(id.to_string());
        Ok(())
    }

    async fn channel_continue(
        &self,
        id: &str,
        context: &str,
        _exten: &str,
        _priority: i32,
    ) -> AppResult<()> {
        self.log
            .lock()
            .continues
            .push((id.to_string(), context.to_string()));
        Ok(())
    }

    async fn channel_redirect(
        &self,
        id: &str,
        context: &str,
        _exten: &str,
        _priority: i32,
    ) -> AppResult<()> {
        self.log
            .lock()
            .redirects
            .push((id.to_string(), context.to_string()));
        Ok(())
    }

    async fn channel_play(
        &self,
        id: &str,
        _playback_id: Uuid,
        medias: &[String],
        _language: &str,
    ) -> AppResult<()> {
        self.log.lock().plays.push((id.to_string(), medias.to_vec()));
        Ok(())
    }

    async fn channel_playback_stop(&self, id: &str) -> AppResult<()> {
        self.log.lock().playback_stops.push(id.to_string());
        Ok(())
    }

    async fn channel_dtmf_send(
        &self,
        id: &str,
        digits: &str,
        _duration_ms: i64,
        _interval_ms: i64,
    ) -> AppResult<()> {
        self.log
            .lock()
            .dtmf
            .push((id.to_string(), digits.to_string()));
        Ok(())
    }

    async fn channel_snoop(&self, _id: &str, snoop_id: &str, _app_args: &str) -> AppResult<Channel> {
        self.log.lock().snoops.push(snoop_id.to_string());
        Ok(Channel {
            id: snoop_id.to_string(),
            ..Default::default()
        })
    }

    async fn channel_variable_set(&self, _id: &str, _key: &str, _value: &str) -> AppResult<()> {
        Ok(())
    }

    async fn channel_hold(&self, _id: &str, _on: bool) -> AppResult<()> {
        Ok(())
    }

    async fn channel_mute(&self, _id: &str, _direction: MuteDirection, _on: bool) -> AppResult<()> {
        Ok(())
    }

    async fn channel_moh(&self, _id: &str, _on: bool) -> AppResult<()> {
        Ok(())
    }

    async fn channel_silence(&self, _id: &str, _on: bool) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BridgeAdapter for FakeChannels {
    async fn bridge_create(&self, _name: &str) -> AppResult<String> {
        Ok(format!("bridge-{}", Uuid::new_v4()))
    }

    async fn bridge_delete(&self, bridge_id: &str) -> AppResult<()> {
        self.log.lock().bridges_deleted.push(bridge_id.to_string());
        Ok(())
    }

    async fn bridge_channel_join(&self, bridge_id: &str, channel_id: &str) -> AppResult<()> {
        self.log
            .lock()
            .joined
            .push((bridge_id.to_string(), channel_id.to_string()));
        Ok(())
    }

    async fn bridge_channel_kick(&self, _bridge_id: &str, _channel_id: &str) -> AppResult<()> {
        Ok(())
    }
}

// ==================== Workflow engine ====================

#[derive(Default)]
pub struct FakeFlow {
    actions: Mutex<VecDeque<Action>>,
    variables: Mutex<HashMap<Uuid, HashMap<String, String>>>,
    stopped: Mutex<Vec<Uuid>>,
    next_calls: AtomicUsize,
    fail_next: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeFlow {
    /// Queue the action returned by the next `activeflow_next_action`
    pub fn push_action(&self, action: Action) {
        self.actions.lock().push_back(action);
    }

    pub fn fail_next_action(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn next_action_calls(&self) -> usize {
        self.next_calls.load(Ordering::SeqCst)
    }

    pub fn set_variable(&self, activeflow_id: Uuid, key: &str, value: &str) {
        self.variables
            .lock()
            .entry(activeflow_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn variables(&self, activeflow_id: Uuid) -> HashMap<String, String> {
        self.variables
            .lock()
            .get(&activeflow_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stopped(&self) -> Vec<Uuid> {
        self.stopped.lock().clone()
    }
}

/// Replace `${name}` references with the current values
fn substitute(value: &str, vars: &HashMap<String, String>) -> String {
    let mut res = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        res.push_str(&rest[..start]);
        let name = &rest[start + 2..start + len];
        res.push_str(vars.get(name).map(String::as_str).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    res.push_str(rest);
    res
}

#[async_trait]
impl WorkflowEngine for FakeFlow {
    async fn activeflow_create(
        &self,
        id: Uuid,
        customer_id: Uuid,
        flow_id: Uuid,
        reference_id: Uuid,
    ) -> AppResult<Activeflow> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::peer("flow", "could not create the activeflow"));
        }

        Ok(Activeflow {
            id: if id.is_nil() { Uuid::new_v4() } else { id },
            customer_id,
            flow_id,
            reference_type: Activeflow::REFERENCE_TYPE_CALL.to_string(),
            reference_id,
            ..Default::default()
        })
    }

    async fn activeflow_next_action(
        &self,
        activeflow_id: Uuid,
        _current_action_id: Uuid,
    ) -> AppResult<Action> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.load(Ordering::SeqCst) {
            return Err(AppError::peer("flow", "could not get the next action"));
        }

        self.actions
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::NotFound(format!("next action of {}", activeflow_id)))
    }

    async fn activeflow_stop(&self, activeflow_id: Uuid) -> AppResult<()> {
        self.stopped.lock().push(activeflow_id);
        Ok(())
    }

    async fn variables_set(
        &self,
        activeflow_id: Uuid,
        variables: &HashMap<String, String>,
    ) -> AppResult<()> {
        let mut all = self.variables.lock();
        let vars = all.entry(activeflow_id).or_default();
        for (k, v) in variables {
            let value = substitute(v, vars);
            vars.insert(k.clone(), value);
        }
        Ok(())
    }

    async fn variables_get(&self, activeflow_id: Uuid) -> AppResult<HashMap<String, String>> {
        Ok(self.variables(activeflow_id))
    }
}

// ==================== Peer services ====================

#[derive(Default)]
pub struct FakeRoutes {
    dialroutes: Mutex<HashMap<String, Vec<Dialroute>>>,
    providers: Mutex<HashMap<Uuid, Provider>>,
}

impl FakeRoutes {
    /// Routes returned for a country calling code
    pub fn set_dialroutes(&self, target: &str, routes: Vec<Dialroute>) {
        self.dialroutes.lock().insert(target.to_string(), routes);
    }

    pub fn set_provider(&self, provider: Provider) {
        self.providers.lock().insert(provider.id, provider);
    }
}

#[async_trait]
impl RouteService for FakeRoutes {
    async fn dialroutes_get(&self, _customer_id: Uuid, target: &str) -> AppResult<Vec<Dialroute>> {
        Ok(self
            .dialroutes
            .lock()
            .get(target)
            .cloned()
            .unwrap_or_default())
    }

    async fn provider_get(&self, provider_id: Uuid) -> AppResult<Provider> {
        Ok(self
            .providers
            .lock()
            .get(&provider_id)
            .cloned()
            .unwrap_or_else(|| Provider {
                id: provider_id,
                hostname: "sip.provider.invalid".to_string(),
                ..Default::default()
            }))
    }
}

#[derive(Default)]
pub struct FakeBilling {
    deny_balance: AtomicBool,
}

impl FakeBilling {
    pub fn deny_balance(&self) {
        self.deny_balance.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingValidator for FakeBilling {
    async fn is_valid_balance(&self, _customer_id: Uuid, _country: Option<&str>) -> AppResult<bool> {
        Ok(!self.deny_balance.load(Ordering::SeqCst))
    }

    async fn is_valid_destination(
        &self,
        _customer_id: Uuid,
        _source: &Address,
        _destination: &Address,
    ) -> AppResult<bool> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeGroupcalls {
    started: AtomicUsize,
    answers: Mutex<Vec<(Uuid, Uuid)>>,
    hangups: Mutex<Vec<(Uuid, Uuid)>>,
}

impl FakeGroupcalls {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn answer_calls(&self) -> Vec<(Uuid, Uuid)> {
        self.answers.lock().clone()
    }

    pub fn hangup_calls(&self) -> Vec<(Uuid, Uuid)> {
        self.hangups.lock().clone()
    }
}

#[async_trait]
impl GroupcallCoordinator for FakeGroupcalls {
    async fn groupcall_start(
        &self,
        customer_id: Uuid,
        _flow_id: Uuid,
        master_call_id: Uuid,
        source: &Address,
        destinations: &[Address],
        _early_execution: bool,
        _connect: bool,
    ) -> AppResult<Groupcall> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Groupcall {
            id: Uuid::new_v4(),
            customer_id,
            source: source.clone(),
            destinations: destinations.to_vec(),
            master_call_id,
            ..Default::default()
        })
    }

    async fn groupcall_answer_call(&self, groupcall_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.answers.lock().push((groupcall_id, call_id));
        Ok(())
    }

    async fn groupcall_hangup_call(&self, groupcall_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.hangups.lock().push((groupcall_id, call_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConfbridges {
    joins: Mutex<Vec<(Uuid, Uuid)>>,
    kicks: Mutex<Vec<(Uuid, Uuid)>>,
}

impl FakeConfbridges {
    pub fn joins(&self) -> Vec<(Uuid, Uuid)> {
        self.joins.lock().clone()
    }

    pub fn kicks(&self) -> Vec<(Uuid, Uuid)> {
        self.kicks.lock().clone()
    }
}

#[async_trait]
impl ConfbridgeService for FakeConfbridges {
    async fn confbridge_join(&self, confbridge_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.joins.lock().push((confbridge_id, call_id));
        Ok(())
    }

    async fn confbridge_kick(&self, confbridge_id: Uuid, call_id: Uuid) -> AppResult<()> {
        self.kicks.lock().push((confbridge_id, call_id));
        Ok(())
    }

    async fn confbridge_answer(&self, _confbridge_id: Uuid, _call_id: Uuid) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMedia {
    recordings: Mutex<Vec<RecordingStartRequest>>,
    external_media_stopped: Mutex<Vec<Uuid>>,
    on_external_media_start: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeMedia {
    /// Run `f` while each external media session is being started
    pub fn on_external_media_start(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_external_media_start.lock() = Some(Box::new(f));
    }

    pub fn recordings(&self) -> Vec<RecordingStartRequest> {
        self.recordings.lock().clone()
    }

    pub fn external_media_stopped(&self) -> Vec<Uuid> {
        self.external_media_stopped.lock().clone()
    }
}

#[async_trait]
impl MediaService for FakeMedia {
    async fn recording_start(&self, req: &RecordingStartRequest) -> AppResult<Uuid> {
        self.recordings.lock().push(req.clone());
        Ok(Uuid::new_v4())
    }

    async fn recording_stop(&self, _recording_id: Uuid) -> AppResult<()> {
        Ok(())
    }

    async fn external_media_start(&self, _req: &ExternalMediaStartRequest) -> AppResult<Uuid> {
        if let Some(f) = self.on_external_media_start.lock().as_ref() {
            f();
        }
        Ok(Uuid::new_v4())
    }

    async fn external_media_stop(&self, external_media_id: Uuid) -> AppResult<()> {
        self.external_media_stopped.lock().push(external_media_id);
        Ok(())
    }

    async fn speech_create(
        &self,
        _call_id: Uuid,
        _text: &str,
        _gender: &str,
        _language: &str,
    ) -> AppResult<String> {
        Ok(format!("tts:{}", Uuid::new_v4()))
    }
}

#[derive(Default)]
pub struct FakeEvents {
    published: Mutex<Vec<(CallEvent, Uuid)>>,
}

impl FakeEvents {
    pub fn all(&self) -> Vec<(CallEvent, Uuid)> {
        self.published.lock().clone()
    }

    pub fn contains(&self, event: CallEvent, call_id: Uuid) -> bool {
        self.published
            .lock()
            .iter()
            .any(|(e, id)| *e == event && *id == call_id)
    }
}

#[async_trait]
impl EventPublisher for FakeEvents {
    async fn publish(&self, event: CallEvent, call: &Call) -> AppResult<()> {
        self.published.lock().push((event, call.id));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    action_nexts: Mutex<Vec<(Uuid, bool)>>,
    action_timeouts: Mutex<Vec<(Uuid, i64, Action)>>,
    health_checks: Mutex<Vec<(Uuid, i64, u32)>>,
    channel_hangups: Mutex<Vec<(String, ChannelCause)>>,
}

impl FakeScheduler {
    pub fn action_nexts(&self) -> Vec<(Uuid, bool)> {
        self.action_nexts.lock().clone()
    }

    pub fn action_timeouts(&self) -> Vec<(Uuid, i64, Action)> {
        self.action_timeouts.lock().clone()
    }

    pub fn health_checks(&self) -> Vec<(Uuid, i64, u32)> {
        self.health_checks.lock().clone()
    }

    pub fn channel_hangups(&self) -> Vec<(String, ChannelCause)> {
        self.channel_hangups.lock().clone()
    }
}

#[async_trait]
impl RequestScheduler for FakeScheduler {
    async fn action_next(&self, call_id: Uuid, force: bool) -> AppResult<()> {
        self.action_nexts.lock().push((call_id, force));
        Ok(())
    }

    async fn action_timeout(&self, call_id: Uuid, delay_ms: i64, action: &Action) -> AppResult<()> {
        self.action_timeouts
            .lock()
            .push((call_id, delay_ms, action.clone()));
        Ok(())
    }

    async fn health_check(&self, call_id: Uuid, delay_ms: i64, retry_count: u32) -> AppResult<()> {
        self.health_checks
            .lock()
            .push((call_id, delay_ms, retry_count));
        Ok(())
    }

    async fn channel_hangup(
        &self,
        channel_id: &str,
        cause: ChannelCause,
        _delay_ms: i64,
    ) -> AppResult<()> {
        self.channel_hangups
            .lock()
            .push((channel_id.to_string(), cause));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAmd {
    entries: Mutex<HashMap<String, CallAmd>>,
    fail: AtomicBool,
}

impl FakeAmd {
    pub fn get(&self, snoop_id: &str) -> Option<CallAmd> {
        self.entries.lock().get(snoop_id).cloned()
    }

    pub fn put(&self, snoop_id: &str, amd: CallAmd) {
        self.entries.lock().insert(snoop_id.to_string(), amd);
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AmdCache for FakeAmd {
    async fn amd_set(&self, snoop_id: &str, amd: &CallAmd) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Cache("amd cache unavailable".to_string()));
        }
        self.put(snoop_id, amd.clone());
        Ok(())
    }

    async fn amd_get(&self, snoop_id: &str) -> AppResult<Option<CallAmd>> {
        Ok(self.get(snoop_id))
    }
}

// ==================== Harness ====================

/// A call handler wired to fresh fakes
pub struct Harness {
    pub handler: CallHandler,
    pub calls: Arc<FakeCalls>,
    pub channels: Arc<FakeChannels>,
    pub flow: Arc<FakeFlow>,
    pub routes: Arc<FakeRoutes>,
    pub billing: Arc<FakeBilling>,
    pub groupcalls: Arc<FakeGroupcalls>,
    pub confbridges: Arc<FakeConfbridges>,
    pub media: Arc<FakeMedia>,
    pub events: Arc<FakeEvents>,
    pub scheduler: Arc<FakeScheduler>,
    pub metrics: Arc<CallMetrics>,
    pub amd: Arc<FakeAmd>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let metrics = Arc::new(CallMetrics::new());
        Self::with_metrics(metrics.clone(), metrics)
    }

    /// Harness whose handler reports to `sink` instead of `metrics`
    pub fn with_metrics(metrics: Arc<CallMetrics>, sink: Arc<dyn MetricsSink>) -> Self {
        let calls = Arc::new(FakeCalls::default());
        let channels = Arc::new(FakeChannels::default());
        let flow = Arc::new(FakeFlow::default());
        let routes = Arc::new(FakeRoutes::default());
        let billing = Arc::new(FakeBilling::default());
        let groupcalls = Arc::new(FakeGroupcalls::default());
        let confbridges = Arc::new(FakeConfbridges::default());
        let media = Arc::new(FakeMedia::default());
        let events = Arc::new(FakeEvents::default());
        let scheduler = Arc::new(FakeScheduler::default());
        let amd = Arc::new(FakeAmd::default());

        let handler = CallHandler::new(CallHandlerDeps {
            calls: calls.clone(),
            channels: channels.clone(),
            bridges: channels.clone(),
            flow: flow.clone(),
            routes: routes.clone(),
            billing: billing.clone(),
            groupcalls: groupcalls.clone(),
            confbridges: confbridges.clone(),
            media: media.clone(),
            events: events.clone(),
            scheduler: scheduler.clone(),
            metrics: sink,
            amd: amd.clone(),
            settings: CallSettings::default(),
        });

        Self {
            handler,
            calls,
            channels,
            flow,
            routes,
            billing,
            groupcalls,
            confbridges,
            media,
            events,
            scheduler,
            metrics,
            amd,
        }
    }

    /// Store a call directly, bypassing events and the health check.
    ///
    /// Missing ids are generated and the call's channel is created as a live
    /// channel in the control application unless one exists already.
    pub fn insert_call(&self, mut call: Call) -> Call {
        if call.id.is_nil() {
            call.id = Uuid::new_v4();
        }
        if call.channel_id.is_empty() {
            call.channel_id = Uuid::new_v4().to_string();
        }
        call.tm_create.get_or_insert_with(Utc::now);

        let mut channels = self.channels.channels.lock();
        channels
            .entry(call.channel_id.clone())
            .or_insert_with(|| Channel {
                id: call.channel_id.clone(),
                state: ChannelState::Up,
                stasis_name: STASIS_NAME.to_string(),
                ..Default::default()
            });
        drop(channels);

        self.calls.put(call.clone());
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callctl_core::models::{ActionType, Direction};
    use mockall::mock;
    use serde_json::json;

    mock! {
        Sink {}

        impl MetricsSink for Sink {
            fn call_created(&self, direction: Direction);
            fn call_hungup(&self, direction: Direction, reason: HangupReason);
            fn action_executed(&self, action: &str, elapsed: std::time::Duration);
        }
    }

    #[test]
    fn test_substitute() {
        let vars = HashMap::from([("a".to_string(), "12".to_string())]);
        assert_eq!(substitute("${a}3", &vars), "123");
        assert_eq!(substitute("${missing}x", &vars), "x");
        assert_eq!(substitute("plain", &vars), "plain");
        assert_eq!(substitute("${open", &vars), "${open");
    }

    #[tokio::test]
    async fn test_handler_reports_to_metrics_sink() {
        let mut sink = MockSink::new();
        sink.expect_call_created()
            .withf(|d| *d == Direction::Incoming)
            .times(1)
            .return_const(());
        sink.expect_action_executed()
            .withf(|action, _| action.to_string() == "answer")
            .times(1)
            .return_const(());
        sink.expect_call_hungup().never();

        let h = Harness::with_metrics(Arc::new(CallMetrics::new()), Arc::new(sink));
        let call = h
            .handler
            .create(Call {
                id: Uuid::new_v4(),
                channel_id: "chan-1".into(),
                activeflow_id: Uuid::new_v4(),
                status: CallStatus::Progressing,
                ..Default::default()
            })
            .await
            .unwrap();
        h.channels.insert(Channel {
            id: "chan-1".into(),
            ..Default::default()
        });
        h.flow
            .push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));

        h.handler.action_next(&call).await.unwrap();
        assert_eq!(h.channels.answered(), vec!["chan-1".to_string()]);
    }
}
