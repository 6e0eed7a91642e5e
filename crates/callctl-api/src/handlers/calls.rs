//! Call handlers
//!
//! RPC endpoints over the call handler: listing and creation, lifecycle
//! callbacks from the scheduler, and media controls on live calls.

use crate::dto::{
    ActionNextRequest, ActionTimeoutRequest, ApiResponse, CallCreateRequest, CallCreateResponse,
    CallExternalMediaRequest, CallListParams, CallRecordingStartRequest, ChainedCallIdRequest,
    ConfbridgeIdRequest, DigitsRequest, HealthCheckRequest, MuteRequest, PagedResponse,
    PlayRequest, RecordingIdRequest, TalkRequest,
};
use actix_web::{web, HttpResponse};
use callctl_core::models::{HangupReason, MuteDirection};
use callctl_core::AppError;
use callctl_services::CallHandler;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// List calls, newest first
///
/// GET /v1/calls
#[instrument(skip(handler))]
pub async fn list_calls(
    handler: web::Data<CallHandler>,
    query: web::Query<CallListParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("List validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let calls = handler
        .gets(query.page_size, query.page_token, &query.filter())
        .await?;
    debug!("Listed {} calls", calls.len());

    let next_page_token = calls.last().and_then(|c| c.tm_create);
    Ok(HttpResponse::Ok().json(PagedResponse {
        data: calls,
        next_page_token,
    }))
}

/// Dial every destination of the request
///
/// POST /v1/calls
#[instrument(skip(handler, req), fields(customer_id = %req.customer_id))]
pub async fn create_calls(
    handler: web::Data<CallHandler>,
    req: web::Json<CallCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (calls, groupcalls) = handler
        .create_calls_outgoing(
            req.customer_id,
            req.flow_id,
            req.master_call_id,
            &req.source,
            &req.destinations,
            req.early_execution,
            req.connect,
        )
        .await;

    if calls.is_empty() && groupcalls.is_empty() {
        return Err(AppError::InvalidInput(
            "none of the destinations could be dialed".to_string(),
        ));
    }

    info!(
        "Created {} calls and {} groupcalls",
        calls.len(),
        groupcalls.len()
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(CallCreateResponse {
        calls,
        groupcalls,
    })))
}

/// GET /v1/calls/{id}
#[instrument(skip(handler))]
pub async fn get_call(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = handler.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// Soft delete a hung up call
///
/// DELETE /v1/calls/{id}
#[instrument(skip(handler))]
pub async fn delete_call(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = handler.delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(call, "Call deleted")))
}

/// POST /v1/calls/{id}/hangup
#[instrument(skip(handler))]
pub async fn hangup_call(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = handler
        .hanging_up(path.into_inner(), HangupReason::Normal)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// Scheduler callback of the health supervisor
///
/// POST /v1/calls/{id}/health-check
#[instrument(skip(handler, req))]
pub async fn health_check(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: Option<web::Json<HealthCheckRequest>>,
) -> Result<HttpResponse, AppError> {
    let retry_count = req.map(|r| r.retry_count).unwrap_or_default();
    handler.health_check(path.into_inner(), retry_count).await;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /v1/calls/{id}/action-next
#[instrument(skip(handler, req))]
pub async fn action_next(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: Option<web::Json<ActionNextRequest>>,
) -> Result<HttpResponse, AppError> {
    let force = req.map(|r| r.force).unwrap_or_default();
    handler.action_next_by_id(path.into_inner(), force).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /v1/calls/{id}/action-timeout
#[instrument(skip(handler, req))]
pub async fn action_timeout(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<ActionTimeoutRequest>,
) -> Result<HttpResponse, AppError> {
    handler
        .action_timeout(path.into_inner(), &req.action)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /v1/calls/{id}/digits
pub async fn get_digits(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let digits = handler.digits_get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(DigitsRequest { digits })))
}

/// PUT /v1/calls/{id}/digits
#[instrument(skip(handler, req))]
pub async fn set_digits(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<DigitsRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Digits validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    handler.digits_set(path.into_inner(), &req.digits).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /v1/calls/{id}/chained-call-ids
#[instrument(skip(handler, req))]
pub async fn add_chained_call_id(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<ChainedCallIdRequest>,
) -> Result<HttpResponse, AppError> {
    let call = handler
        .chained_call_id_add(path.into_inner(), req.chained_call_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// DELETE /v1/calls/{id}/chained-call-ids/{chained_call_id}
#[instrument(skip(handler))]
pub async fn remove_chained_call_id(
    handler: web::Data<CallHandler>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (id, chained_call_id) = path.into_inner();
    let call = handler.chained_call_id_remove(id, chained_call_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /v1/calls/{id}/external-media
#[instrument(skip(handler, req))]
pub async fn start_external_media(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<CallExternalMediaRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("External media validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = handler
        .external_media_start(path.into_inner(), &req.into_inner().into())
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(call)))
}

/// DELETE /v1/calls/{id}/external-media/{external_media_id}
#[instrument(skip(handler))]
pub async fn stop_external_media(
    handler: web::Data<CallHandler>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (id, external_media_id) = path.into_inner();
    let call = handler.external_media_stop(id, external_media_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// PUT /v1/calls/{id}/confbridge_id
#[instrument(skip(handler, req))]
pub async fn update_confbridge_id(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<ConfbridgeIdRequest>,
) -> Result<HttpResponse, AppError> {
    let call = handler
        .update_confbridge_id(path.into_inner(), req.confbridge_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// PUT /v1/calls/{id}/recording_id
#[instrument(skip(handler, req))]
pub async fn update_recording_id(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<RecordingIdRequest>,
) -> Result<HttpResponse, AppError> {
    let call = handler
        .update_recording_id(path.into_inner(), req.recording_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /v1/calls/{id}/recording_start
#[instrument(skip(handler, req))]
pub async fn recording_start(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<CallRecordingStartRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Recording validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = handler
        .recording_start(path.into_inner(), &req.into_inner().into())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /v1/calls/{id}/recording_stop
#[instrument(skip(handler))]
pub async fn recording_stop(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = handler.recording_stop(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /v1/calls/{id}/talk
#[instrument(skip(handler, req))]
pub async fn talk(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<TalkRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Talk validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    handler
        .talk(path.into_inner(), &req.text, &req.gender, &req.language)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /v1/calls/{id}/play
#[instrument(skip(handler, req))]
pub async fn play(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: web::Json<PlayRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Play validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    handler.play(path.into_inner(), &req.media_urls).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /v1/calls/{id}/media_stop
pub async fn media_stop(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.media_stop(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// Switches: POST turns on, DELETE turns off
// ============================================================================

pub async fn hold_on(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.hold(path.into_inner(), true).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn hold_off(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.hold(path.into_inner(), false).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(skip(handler, req))]
pub async fn mute_on(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    req: Option<web::Json<MuteRequest>>,
) -> Result<HttpResponse, AppError> {
    let direction = req.map(|r| r.direction).unwrap_or(MuteDirection::Both);
    if direction == MuteDirection::None {
        return Err(AppError::InvalidInput(
            "mute direction must be both, in or out".to_string(),
        ));
    }

    let call = handler.mute(path.into_inner(), direction, true).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

#[instrument(skip(handler, query))]
pub async fn mute_off(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
    query: web::Query<MuteRequest>,
) -> Result<HttpResponse, AppError> {
    let call = handler
        .mute(path.into_inner(), query.direction, false)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

pub async fn moh_on(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.moh(path.into_inner(), true).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn moh_off(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.moh(path.into_inner(), false).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn silence_on(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.silence(path.into_inner(), true).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn silence_off(
    handler: web::Data<CallHandler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    handler.silence(path.into_inner(), false).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::get().to(list_calls))
            .route("", web::post().to(create_calls))
            .route("/{id}", web::get().to(get_call))
            .route("/{id}", web::delete().to(delete_call))
            .route("/{id}/hangup", web::post().to(hangup_call))
            .route("/{id}/health-check", web::post().to(health_check))
            .route("/{id}/action-next", web::post().to(action_next))
            .route("/{id}/action-timeout", web::post().to(action_timeout))
            .route("/{id}/digits", web::get().to(get_digits))
            .route("/{id}/digits", web::put().to(set_digits))
            .route("/{id}/chained-call-ids", web::post().to(add_chained_call_id))
            .route(
                "/{id}/chained-call-ids/{chained_call_id}",
                web::delete().to(remove_chained_call_id),
            )
            .route("/{id}/external-media", web::post().to(start_external_media))
            .route(
                "/{id}/external-media/{external_media_id}",
                web::delete().to(stop_external_media),
            )
            .route("/{id}/confbridge_id", web::put().to(update_confbridge_id))
            .route("/{id}/recording_id", web::put().to(update_recording_id))
            .route("/{id}/recording_start", web::post().to(recording_start))
            .route("/{id}/recording_stop", web::post().to(recording_stop))
            .route("/{id}/talk", web::post().to(talk))
            .route("/{id}/play", web::post().to(play))
            .route("/{id}/media_stop", web::post().to(media_stop))
            .route("/{id}/hold", web::post().to(hold_on))
            .route("/{id}/hold", web::delete().to(hold_off))
            .route("/{id}/mute", web::post().to(mute_on))
            .route("/{id}/mute", web::delete().to(mute_off))
            .route("/{id}/moh", web::post().to(moh_on))
            .route("/{id}/moh", web::delete().to(moh_off))
            .route("/{id}/silence", web::post().to(silence_on))
            .route("/{id}/silence", web::delete().to(silence_off)),
    );
}
