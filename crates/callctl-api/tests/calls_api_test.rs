//! Routing tests for the RPC surface
//!
//! Every request runs against the in-memory collaborator harness.

use actix_web::{
    http::{header, StatusCode},
    test, web, App,
};
use callctl_core::models::{Action, ActionType, Call, CallStatus, Direction, MuteDirection};
use callctl_core::traits::MetricsSink;
use callctl_services::testing::Harness;
use serde_json::{json, Value};
use uuid::Uuid;

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($h.handler.clone()))
                .app_data(web::Data::from($h.metrics.clone()))
                .configure(callctl_api::configure),
        )
        .await
    };
}

fn progressing(h: &Harness) -> Call {
    h.insert_call(Call {
        status: CallStatus::Progressing,
        activeflow_id: Uuid::new_v4(),
        ..Default::default()
    })
}

#[actix_web::test]
async fn test_health() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
}

#[actix_web::test]
async fn test_get_call() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri(&format!("/v1/calls/{}", call.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["id"], call.id.to_string());
    assert_eq!(body["data"]["status"], "progressing");

    let req = test::TestRequest::get()
        .uri(&format!("/v1/calls/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_delete_live_call_conflicts() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::delete()
        .uri(&format!("/v1/calls/{}", call.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_create_calls_requires_destinations() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/v1/calls")
        .set_json(json!({
            "customer_id": Uuid::new_v4(),
            "flow_id": Uuid::new_v4(),
            "source": {"type": "tel", "target": "+821100000001"},
            "destinations": [],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_hangup() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/hangup", call.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "terminating");
    assert_eq!(h.channels.hangups()[0].0, call.channel_id);
}

#[actix_web::test]
async fn test_action_next_force() {
    let h = Harness::new();
    let call = h.insert_call(Call {
        status: CallStatus::Progressing,
        activeflow_id: Uuid::new_v4(),
        action_next_hold: true,
        ..Default::default()
    });
    h.flow
        .push_action(Action::new(Uuid::new_v4(), ActionType::Answer, json!(null)));
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/action-next", call.id))
        .set_json(json!({"force": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.flow.next_action_calls(), 1);
}

#[actix_web::test]
async fn test_action_timeout_stale_action() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/action-timeout", call.id))
        .set_json(json!({
            "action": Action::new(Uuid::new_v4(), ActionType::Talk, json!(null)),
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_health_check_without_body() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/health-check", call.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.scheduler.health_checks(), vec![(call.id, 10_000, 0)]);
}

#[actix_web::test]
async fn test_digits_roundtrip() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::put()
        .uri(&format!("/v1/calls/{}/digits", call.id))
        .set_json(json!({"digits": "1234"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/v1/calls/{}/digits", call.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["digits"], "1234");
}

#[actix_web::test]
async fn test_mute_switch() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/mute", call.id))
        .set_json(json!({"direction": "in"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["mute_direction"], "in");

    let req = test::TestRequest::delete()
        .uri(&format!("/v1/calls/{}/mute?direction=in", call.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.calls.call(call.id).mute_direction, MuteDirection::None);
}

#[actix_web::test]
async fn test_external_media_validation() {
    let h = Harness::new();
    let call = progressing(&h);
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/external-media", call.id))
        .set_json(json!({"external_host": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/calls/{}/external-media", call.id))
        .set_json(json!({"external_host": "127.0.0.1:9000"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["external_media_ids"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_event_intake() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/v1/events")
        .set_json(json!({"type": "channel_destroyed", "channel": {"id": "ghost"}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::post()
        .uri("/v1/events")
        .set_json(json!({"type": "no_such_event"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_metrics_exposition() {
    let h = Harness::new();
    h.metrics.call_created(Direction::Incoming);
    let app = app!(h);

    let req = test::TestRequest::get().uri("/v1/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::CONTENT_TYPE).unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("call_create_total{direction=\"incoming\"} 1"));
}
