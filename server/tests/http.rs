mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tiket_server::auth::Role;
use tiket_server::services::checkin::{self, ScanRequest};
use tiket_server::services::transactions::{self, RegisterFreeRequest};
use tiket_server::routes::create_routes;
use tiket_server::state::AppState;

use common::{app_state, seed_event, seed_ticket_type, seed_user};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn send_json(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn app(state: &AppState) -> Router {
    create_routes(state.clone())
}

#[tokio::test]
async fn health_check_carries_security_headers() {
    let state = app_state();
    let response = app(&state)
        .oneshot(get("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().get("strict-transport-security").is_none());
}

#[tokio::test]
async fn login_then_logout_revokes_the_session() {
    let state = app_state();
    let app = app(&state);

    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/firebase",
            None,
            json!({ "firebase_token": "valid:uid-sari:sari@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["name"], "sari");
    assert_eq!(body["data"]["roles"], json!(["User"]));
    assert!(body["data"]["user"].get("api_token").is_none());
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["email"], "sari@example.com");

    let (status, _) = send(&app, post_json("/api/auth/logout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn invalid_identity_token_is_unauthorized() {
    let state = app_state();
    let (status, body) = send(
        &app(&state),
        post_json("/api/auth/firebase", None, json!({ "firebase_token": "forged" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let state = app_state();
    let (status, body) = send(&app(&state), get("/api/tiket/my-tickets", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn scanning_requires_the_scan_capability() {
    let state = app_state();
    let visitor = seed_user(&state, "visitor", Role::User).await;
    let (status, body) = send(
        &app(&state),
        post_json(
            "/api/tiket/scan",
            Some(&visitor.token),
            json!({ "qr_code": "TKT-X-1-AAAAAAAA" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn malformed_json_gets_the_error_envelope() {
    let state = app_state();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/midtrans/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app(&state), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn register_and_scan_over_http() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Bazar Buku", false).await;
    let ticket_type = seed_ticket_type(&state, &event, 0, 5).await;
    let app = app(&state);

    let (status, body) = send(&app, get("/api/events/public", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["slug"], "bazar-buku");
    assert_eq!(body["data"][0]["ticket_types"][0]["is_free"], true);

    let (status, body) = send(
        &app,
        post_json(
            "/api/transaksi/register-free",
            Some(&buyer.token),
            json!({ "ticket_type_id": ticket_type.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["transaction"]["status"], "free");
    let qr = body["data"]["tickets"][0]["qr_code"].as_str().unwrap().to_string();

    let scan = json!({ "qr_code": qr });
    let (status, body) = send(&app, post_json("/api/tiket/scan", Some(&eo.token), scan.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ticket"]["status"], "used");
    assert_eq!(body["data"]["ticket"]["attendance"], "attended");

    let (status, body) = send(&app, post_json("/api/tiket/scan", Some(&eo.token), scan)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(body["data"]["scanned_by"], "eo");

    let (status, body) = send(&app, get("/api/tiket/my-tickets", Some(&buyer.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn role_changes_take_effect_on_the_next_request() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let helper = seed_user(&state, "helper", Role::User).await;
    let app = app(&state);

    let scan = json!({ "qr_code": "TKT-X-1-AAAAAAAA" });
    let (status, _) = send(&app, post_json("/api/tiket/scan", Some(&helper.token), scan.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/users/{}/roles", helper.id());
    let (status, body) = send(&app, post_json(&uri, Some(&admin.token), json!({ "role": "Panitia" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("tiket.scan")));

    // unknown QR now, not forbidden
    let (status, _) = send(&app, post_json("/api/tiket/scan", Some(&helper.token), scan)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post_json(&uri, Some(&admin.token), json!({ "role": "Superuser" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_json(&uri, Some(&helper.token), json!({ "role": "Admin" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_manages_accounts_and_deactivation_ends_the_session() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let sari = seed_user(&state, "sari", Role::User).await;
    seed_user(&state, "budi", Role::User).await;
    let app = app(&state);

    let created = json!({
        "firebase_uid": "uid-rina",
        "name": "Rina",
        "email": "rina@example.com",
        "roles": ["EO"]
    });
    let (status, body) = send(&app, post_json("/api/users", Some(&admin.token), created)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["roles"], json!(["EO"]));
    let rina_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, post_json("/api/users", Some(&admin.token), json!({
        "firebase_uid": "uid-rina-2",
        "name": "Rina",
        "email": "rina@example.com"
    })))
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send(&app, get("/api/users?search=sari", Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["email"], "sari@example.com");

    let (status, body) = send(&app, get("/api/users?role=EO", Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"].as_i64(), Some(rina_id));

    let (status, body) = send(&app, get(&format!("/api/users/{rina_id}"), Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["all_permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("event.create")));

    let uri = format!("/api/users/{}", sari.id());
    let (status, body) = send(
        &app,
        send_json(Method::PUT, &uri, &admin.token, json!({ "phone": "08123456789" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phone"], "08123456789");
    assert_eq!(body["data"]["name"], "sari");

    let (status, _) = send(
        &app,
        send_json(Method::PUT, &uri, &admin.token, json!({ "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, get("/api/auth/me", Some(&sari.token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, delete(&uri, &admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/api/auth/me", Some(&sari.token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let stored = state.store.find_user(sari.id()).await.unwrap().unwrap();
    assert!(!stored.is_active());

    let (status, body) = send(&app, delete(&format!("/api/users/{}", admin.id()), &admin.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You cannot delete your own account");
}

#[tokio::test]
async fn user_management_needs_its_capabilities() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let visitor = seed_user(&state, "visitor", Role::User).await;
    let app = app(&state);

    // EO may list but not create accounts
    let (status, _) = send(&app, get("/api/users", Some(&eo.token))).await;
    assert_eq!(status, StatusCode::OK);
    let request = json!({ "firebase_uid": "uid-x", "name": "X", "email": "x@example.com" });
    let (status, _) = send(&app, post_json("/api/users", Some(&eo.token), request)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get("/api/users", Some(&visitor.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, delete(&format!("/api/users/{}", eo.id()), &visitor.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_update_changes_only_own_editable_fields() {
    let state = app_state();
    let user = seed_user(&state, "dewi", Role::User).await;
    let app = app(&state);

    let update = json!({
        "name": "Dewi Lestari",
        "phone": "0811111111",
        "email": "hijack@example.com",
        "status": "inactive"
    });
    let (status, body) = send(
        &app,
        send_json(Method::PUT, "/api/auth/profile", &user.token, update),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["name"], "Dewi Lestari");
    assert_eq!(body["data"]["user"]["email"], "dewi@example.com");
    assert_eq!(body["data"]["user"]["status"], "active");

    let (status, body) = send(
        &app,
        send_json(Method::PUT, "/api/auth/profile", &user.token, json!({ "photo": "avatar" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["photo"].is_array());
}

#[tokio::test]
async fn managed_events_report_the_callers_role() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let other_eo = seed_user(&state, "other", Role::Eo).await;
    let panitia = seed_user(&state, "panitia", Role::Panitia).await;
    let own = seed_event(&state, &eo, "Seminar", false).await;
    let helped = seed_event(&state, &other_eo, "Pameran", false).await;
    seed_event(&state, &other_eo, "Lomba", false).await;
    state.store.add_event_member(helped.id, eo.id()).await.unwrap();
    state.store.add_event_member(helped.id, panitia.id()).await.unwrap();
    let app = app(&state);

    let (status, body) = send(&app, get("/api/events/my-managed", Some(&eo.token))).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total"], 2);
    assert_eq!(data["as_owner"], 1);
    assert_eq!(data["as_panitia"], 1);
    for event in data["events"].as_array().unwrap() {
        if event["id"].as_i64() == Some(own.id) {
            assert_eq!(event["my_role"], "Owner");
            assert_eq!(event["can_manage"], true);
        } else {
            assert_eq!(event["id"].as_i64(), Some(helped.id));
            assert_eq!(event["my_role"], "Panitia");
            assert_eq!(event["can_manage"], false);
        }
    }

    let (_, body) = send(&app, get("/api/events/my-managed", Some(&panitia.token))).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["as_owner"], 0);
}

#[tokio::test]
async fn ticket_type_index_is_scoped_to_the_organizers_events() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let rival = seed_user(&state, "rival", Role::Eo).await;
    let own = seed_event(&state, &eo, "Seminar", false).await;
    let foreign = seed_event(&state, &rival, "Pameran", true).await;
    let own_type = seed_ticket_type(&state, &own, 0, 10).await;
    seed_ticket_type(&state, &foreign, 25_000, 10).await;
    seed_ticket_type(&state, &foreign, 40_000, 10).await;
    let app = app(&state);

    let (status, body) = send(&app, get("/api/jenis-tiket", Some(&eo.token))).await;
    assert_eq!(status, StatusCode::OK);
    let types = body["data"].as_array().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0]["id"].as_i64(), Some(own_type.id));

    let (_, body) = send(&app, get("/api/jenis-tiket", Some(&admin.token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let uri = format!("/api/jenis-tiket?event_id={}", foreign.id);
    let (_, body) = send(&app, get(&uri, Some(&admin.token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    let (_, body) = send(&app, get(&uri, Some(&eo.token))).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn event_ticket_list_filters_by_attendance_for_managers_only() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let rival = seed_user(&state, "rival", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Talkshow", false).await;
    let ticket_type = seed_ticket_type(&state, &event, 0, 10).await;
    let registration = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: ticket_type.id,
            quantity: 3,
        },
    )
    .await
    .unwrap();
    checkin::scan(
        &state,
        &eo,
        ScanRequest {
            qr_code: registration.tickets[0].qr_code.clone(),
        },
    )
    .await
    .unwrap();
    let app = app(&state);

    let base = format!("/api/tiket/event/{}", event.id);
    let (status, body) = send(&app, get(&base, Some(&eo.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = send(&app, get(&format!("{base}?attendance=attended"), Some(&eo.token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = send(&app, get(&format!("{base}?status=active"), Some(&eo.token))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, get(&format!("{base}?status=lost"), Some(&eo.token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get(&base, Some(&rival.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, get(&base, Some(&buyer.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn scan_history_reports_are_limited_to_admins_and_scanners() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let gate = seed_user(&state, "gate", Role::Panitia).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Festival", false).await;
    let ticket_type = seed_ticket_type(&state, &event, 0, 10).await;
    let registration = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: ticket_type.id,
            quantity: 3,
        },
    )
    .await
    .unwrap();
    for (ticket, scanner) in registration.tickets.iter().zip([&gate, &gate, &eo]) {
        checkin::scan(
            &state,
            scanner,
            ScanRequest {
                qr_code: ticket.qr_code.clone(),
            },
        )
        .await
        .unwrap();
    }
    let app = app(&state);

    let own = format!("/api/scan-history/user/{}", gate.id());
    let (status, body) = send(&app, get(&own, Some(&gate.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    let (status, _) = send(&app, get(&own, Some(&eo.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, get(&own, Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/api/scan-history?page=2&limit=2", Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["last_page"], 2);
    assert_eq!(body["data"]["entries"].as_array().unwrap().len(), 1);
    let (status, _) = send(&app, get("/api/scan-history", Some(&eo.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get("/api/scan-history/statistics", Some(&admin.token))).await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["total_scans"], 3);
    assert_eq!(stats["scans_today"], 3);
    assert_eq!(stats["scans_this_month"], 3);
    assert_eq!(stats["top_scanners"][0]["user_id"].as_i64(), Some(gate.id()));
    assert_eq!(stats["top_scanners"][0]["total_scans"], 2);
    let (status, _) = send(&app, get("/api/scan-history/statistics", Some(&gate.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
