//! Call repository implementation
//!
//! PostgreSQL-backed call record store. List-valued and structured fields are
//! stored as JSONB so single-element changes can be made in place.

use callctl_core::{
    models::{
        Action, Address, Call, CallStatus, CallType, Dialroute, Direction, HangupBy,
        HangupReason, MuteDirection,
    },
    traits::{CallFilter, CallRepository, CallTransaction},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const SELECT_CALL: &str = r#"
    SELECT
        id, customer_id, owner_type, owner_id,
        channel_id, bridge_id,
        flow_id, activeflow_id, confbridge_id, call_type,
        master_call_id, chained_call_ids,
        recording_id, recording_ids, external_media_ids, groupcall_id,
        source, destination,
        status, data, action, action_next_hold, tm_action_next_hold,
        direction, mute_direction, hangup_by, hangup_reason,
        dialroute_id, dialroutes,
        tm_ringing, tm_progressing, tm_hangup,
        tm_create, tm_update, tm_delete
    FROM calls
"#;

/// Turn an update result into `CallNotFound` when nothing matched
fn ensure_updated(result: PgQueryResult, id: Uuid) -> AppResult<()> {
    if result.rows_affected() == 0 {
        return Err(AppError::CallNotFound(id.to_string()));
    }
    Ok(())
}

fn db_error(op: &'static str, id: Uuid) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        error!("Database error on {} for call {}: {}", op, id, e);
        AppError::Database(format!("Failed to {}: {}", op, e))
    }
}

/// PostgreSQL implementation of CallRepository
#[derive(Clone)]
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, call), fields(call_id = %call.id))]
    async fn create(&self, call: &Call) -> AppResult<()> {
        debug!("Creating call");

        sqlx::query(
            r#"
            INSERT INTO calls (
                id, customer_id, owner_type, owner_id,
                channel_id, bridge_id,
                flow_id, activeflow_id, confbridge_id, call_type,
                master_call_id, chained_call_ids,
                recording_id, recording_ids, external_media_ids, groupcall_id,
                source, destination,
                status, data, action, action_next_hold,
                direction, mute_direction, hangup_by, hangup_reason,
                dialroute_id, dialroutes,
                tm_create
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, NOW()
            )
            "#,
        )
        .bind(call.id)
        .bind(call.customer_id)
        .bind(&call.owner_type)
        .bind(call.owner_id)
        .bind(&call.channel_id)
        .bind(&call.bridge_id)
        .bind(call.flow_id)
        .bind(call.activeflow_id)
        .bind(call.confbridge_id)
        .bind(call.kind.as_str())
        .bind(call.master_call_id)
        .bind(Json(&call.chained_call_ids))
        .bind(call.recording_id)
        .bind(Json(&call.recording_ids))
        .bind(Json(&call.external_media_ids))
        .bind(call.groupcall_id)
        .bind(Json(&call.source))
        .bind(Json(&call.destination))
        .bind(call.status.as_str())
        .bind(Json(&call.data))
        .bind(Json(&call.action))
        .bind(call.action_next_hold)
        .bind(call.direction.as_str())
        .bind(call.mute_direction.as_str())
        .bind(call.hangup_by.as_str())
        .bind(call.hangup_reason.as_str())
        .bind(call.dialroute_id)
        .bind(Json(&call.dialroutes))
        .execute(&self.pool)
        .await
        .map_err(db_error("create call", call.id))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> AppResult<Call> {
        let row = sqlx::query_as::<Postgres, CallRow>(&format!("{} WHERE id = $1", SELECT_CALL))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get call", id))?;

        row.map(Into::into)
            .ok_or_else(|| AppError::CallNotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_by_channel_id(&self, channel_id: &str) -> AppResult<Call> {
        let row = sqlx::query_as::<Postgres, CallRow>(&format!(
            "{} WHERE channel_id = $1 ORDER BY tm_create DESC LIMIT 1",
            SELECT_CALL
        ))
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding call by channel {}: {}", channel_id, e);
            AppError::Database(format!("Failed to get call by channel: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::CallNotFound(format!("channel {}", channel_id)))
    }

    #[instrument(skip(self))]
    async fn gets(
        &self,
        size: u64,
        token: DateTime<Utc>,
        filter: &CallFilter,
    ) -> AppResult<Vec<Call>> {
        debug!("Listing calls before {}", token);

        let rows = sqlx::query_as::<Postgres, CallRow>(&format!(
            r#"{}
            WHERE tm_create < $1
                AND ($2::uuid IS NULL OR customer_id = $2)
                AND ($3::text IS NULL OR status = $3)
                AND ($4::bool IS NULL OR (tm_delete IS NOT NULL) = $4)
            ORDER BY tm_create DESC
            LIMIT $5
            "#,
            SELECT_CALL
        ))
        .bind(token)
        .bind(filter.customer_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.deleted)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing calls: {}", e);
            AppError::Database(format!("Failed to list calls: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE calls SET tm_delete = NOW(), tm_update = NOW() WHERE id = $1 AND tm_delete IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_error("delete call", id))?;

        if result.rows_affected() == 0 {
            warn!("Call {} was already deleted or does not exist", id);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_status(&self, id: Uuid, status: CallStatus) -> AppResult<bool> {
        let from: Vec<&str> = CallStatus::predecessors(status)
            .iter()
            .map(CallStatus::as_str)
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE calls
            SET status = $2,
                tm_ringing = CASE WHEN $2 = 'ringing' THEN NOW() ELSE tm_ringing END,
                tm_progressing = CASE WHEN $2 = 'progressing' THEN NOW() ELSE tm_progressing END,
                tm_update = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&from)
        .execute(&self.pool)
        .await
        .map_err(db_error("update call status", id))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // missing rows surface as CallNotFound
        let current = self.get(id).await?;
        debug!("Call {} stays {}, can not move to {}", id, current.status, status);
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn set_hangup(
        &self,
        id: Uuid,
        reason: HangupReason,
        hangup_by: HangupBy,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET status = 'hangup',
                hangup_reason = $2,
                hangup_by = $3,
                tm_hangup = COALESCE(tm_hangup, NOW()),
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason.as_str())
        .bind(hangup_by.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("update hangup info", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn acquire_action_next_hold(&self, id: Uuid, lease: Duration) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET action_next_hold = TRUE,
                tm_action_next_hold = NOW(),
                tm_update = NOW()
            WHERE id = $1
                AND (action_next_hold = FALSE
                     OR tm_action_next_hold < NOW() - make_interval(secs => $2))
            "#,
        )
        .bind(id)
        .bind(lease.num_milliseconds() as f64 / 1000.0)
        .execute(&self.pool)
        .await
        .map_err(db_error("acquire action next hold", id))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn set_action_next_hold(&self, id: Uuid, hold: bool) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET action_next_hold = $2,
                tm_action_next_hold = CASE WHEN $2 THEN NOW() ELSE NULL END,
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hold)
        .execute(&self.pool)
        .await
        .map_err(db_error("update action next hold", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self, action), fields(action_id = %action.id))]
    async fn set_action_and_action_next_hold(
        &self,
        id: Uuid,
        action: &Action,
        hold: bool,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET action = $2,
                action_next_hold = $3,
                tm_action_next_hold = CASE WHEN $3 THEN NOW() ELSE NULL END,
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(action))
        .bind(hold)
        .execute(&self.pool)
        .await
        .map_err(db_error("update action", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn set_recording_id(&self, id: Uuid, recording_id: Uuid) -> AppResult<()> {
        let query = if recording_id.is_nil() {
            "UPDATE calls SET recording_id = $2, tm_update = NOW() WHERE id = $1"
        } else {
            r#"
            UPDATE calls
            SET recording_id = $2,
                recording_ids = recording_ids || to_jsonb($2::text),
                tm_update = NOW()
            WHERE id = $1
            "#
        };

        let result = sqlx::query(query)
            .bind(id)
            .bind(recording_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("update recording id", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn set_confbridge_id(&self, id: Uuid, confbridge_id: Uuid) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE calls SET confbridge_id = $2, tm_update = NOW() WHERE id = $1")
                .bind(id)
                .bind(confbridge_id)
                .execute(&self.pool)
                .await
                .map_err(db_error("update confbridge id", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn set_bridge_id(&self, id: Uuid, bridge_id: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE calls SET bridge_id = $2, tm_update = NOW() WHERE id = $1")
            .bind(id)
            .bind(bridge_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("update bridge id", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self, data))]
    async fn set_data(&self, id: Uuid, data: &HashMap<String, String>) -> AppResult<()> {
        let result = sqlx::query("UPDATE calls SET data = $2, tm_update = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(data))
            .execute(&self.pool)
            .await
            .map_err(db_error("update data", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn set_mute_direction(&self, id: Uuid, direction: MuteDirection) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE calls SET mute_direction = $2, tm_update = NOW() WHERE id = $1")
                .bind(id)
                .bind(direction.as_str())
                .execute(&self.pool)
                .await
                .map_err(db_error("update mute direction", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn set_for_route_failover(
        &self,
        id: Uuid,
        channel_id: &str,
        dialroute_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET channel_id = $2,
                dialroute_id = $3,
                bridge_id = '',
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(channel_id)
        .bind(dialroute_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("update route failover", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn add_external_media_id(
        &self,
        id: Uuid,
        external_media_id: Uuid,
        capacity: usize,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET external_media_ids = external_media_ids || to_jsonb($2::text),
                tm_update = NOW()
            WHERE id = $1 AND jsonb_array_length(external_media_ids) < $3
            "#,
        )
        .bind(id)
        .bind(external_media_id)
        .bind(i32::try_from(capacity).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(db_error("add external media id", id))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // missing rows surface as CallNotFound
        self.get(id).await?;
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn remove_external_media_id(&self, id: Uuid, external_media_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET external_media_ids = external_media_ids - $2::text,
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(external_media_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("remove external media id", id))?;

        ensure_updated(result, id)
    }

    #[instrument(skip(self))]
    async fn call_tx_start(&self, id: Uuid) -> AppResult<(Box<dyn CallTransaction>, Call)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let call = lock_call(&mut tx, id).await?;

        Ok((Box::new(PgCallTransaction { tx }), call))
    }
}

async fn lock_call(tx: &mut Transaction<'static, Postgres>, id: Uuid) -> AppResult<Call> {
    let row = sqlx::query_as::<Postgres, CallRow>(&format!(
        "{} WHERE id = $1 FOR UPDATE",
        SELECT_CALL
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("lock call", id))?;

    row.map(Into::into)
        .ok_or_else(|| AppError::CallNotFound(id.to_string()))
}

/// Open transaction on the calls table
pub struct PgCallTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CallTransaction for PgCallTransaction {
    async fn get(&mut self, id: Uuid) -> AppResult<Call> {
        lock_call(&mut self.tx, id).await
    }

    async fn add_chained_call_id(&mut self, id: Uuid, chained_call_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET chained_call_ids = chained_call_ids || to_jsonb($2::text),
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(chained_call_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("add chained call id", id))?;

        ensure_updated(result, id)
    }

    async fn remove_chained_call_id(&mut self, id: Uuid, chained_call_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls
            SET chained_call_ids = chained_call_ids - $2::text,
                tm_update = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(chained_call_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("remove chained call id", id))?;

        ensure_updated(result, id)
    }

    async fn set_master_call_id(&mut self, id: Uuid, master_call_id: Uuid) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE calls SET master_call_id = $2, tm_update = NOW() WHERE id = $1")
                .bind(id)
                .bind(master_call_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_error("update master call id", id))?;

        ensure_updated(result, id)
    }

    async fn finish(self: Box<Self>, commit: bool) -> AppResult<()> {
        let result = if commit {
            self.tx.commit().await
        } else {
            self.tx.rollback().await
        };

        result.map_err(|e| {
            error!("Failed to finish transaction (commit: {}): {}", commit, e);
            AppError::Transaction(format!("Failed to finish transaction: {}", e))
        })
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    customer_id: Uuid,
    owner_type: String,
    owner_id: Uuid,
    channel_id: String,
    bridge_id: String,
    flow_id: Uuid,
    activeflow_id: Uuid,
    confbridge_id: Uuid,
    call_type: String,
    master_call_id: Uuid,
    chained_call_ids: Json<Vec<Uuid>>,
    recording_id: Uuid,
    recording_ids: Json<Vec<Uuid>>,
    external_media_ids: Json<Vec<Uuid>>,
    groupcall_id: Uuid,
    source: Json<Address>,
    destination: Json<Address>,
    status: String,
    data: Json<HashMap<String, String>>,
    action: Json<Action>,
    action_next_hold: bool,
    tm_action_next_hold: Option<DateTime<Utc>>,
    direction: String,
    mute_direction: String,
    hangup_by: String,
    hangup_reason: String,
    dialroute_id: Uuid,
    dialroutes: Json<Vec<Dialroute>>,
    tm_ringing: Option<DateTime<Utc>>,
    tm_progressing: Option<DateTime<Utc>>,
    tm_hangup: Option<DateTime<Utc>>,
    tm_create: DateTime<Utc>,
    tm_update: Option<DateTime<Utc>>,
    tm_delete: Option<DateTime<Utc>>,
}

impl From<CallRow> for Call {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            owner_type: row.owner_type,
            owner_id: row.owner_id,
            channel_id: row.channel_id,
            bridge_id: row.bridge_id,
            flow_id: row.flow_id,
            activeflow_id: row.activeflow_id,
            confbridge_id: row.confbridge_id,
            kind: CallType::from_str(&row.call_type).unwrap_or_default(),
            master_call_id: row.master_call_id,
            chained_call_ids: row.chained_call_ids.0,
            recording_id: row.recording_id,
            recording_ids: row.recording_ids.0,
            external_media_ids: row.external_media_ids.0,
            groupcall_id: row.groupcall_id,
            source: row.source.0,
            destination: row.destination.0,
            status: CallStatus::from_str(&row.status).unwrap_or_else(|| {
                warn!("Unknown call status '{}' for call {}", row.status, row.id);
                CallStatus::Hangup
            }),
            data: row.data.0,
            action: row.action.0,
            action_next_hold: row.action_next_hold,
            tm_action_next_hold: row.tm_action_next_hold,
            direction: Direction::from_str(&row.direction).unwrap_or_default(),
            mute_direction: MuteDirection::from_str(&row.mute_direction).unwrap_or_default(),
            hangup_by: HangupBy::from_str(&row.hangup_by).unwrap_or_default(),
            hangup_reason: HangupReason::from_str(&row.hangup_reason).unwrap_or_default(),
            dialroute_id: row.dialroute_id,
            dialroutes: row.dialroutes.0,
            tm_ringing: row.tm_ringing,
            tm_progressing: row.tm_progressing,
            tm_hangup: row.tm_hangup,
            tm_create: Some(row.tm_create),
            tm_update: row.tm_update,
            tm_delete: row.tm_delete,
        }
    }
}
