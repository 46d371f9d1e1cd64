use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    auth, events, health_check, midtrans, scan_history, ticket_types, tickets, transactions,
    users,
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let cors = create_cors_layer(state.config.cors_allowed_origins.as_deref());
    let security = create_security_headers_layer(state.config.is_production);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(security)
        .layer(cors)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/firebase", post(auth::login_firebase))
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/logout", post(auth::logout))
        .route("/events/public", get(events::list_public))
        .route("/events/my-managed", get(events::managed))
        .route("/events", get(events::list).post(events::create))
        .route(
            "/events/:id",
            get(events::show).put(events::update).delete(events::delete),
        )
        .route(
            "/events/:id/members",
            get(events::members).post(events::add_member),
        )
        .route("/events/:id/members/:user_id", delete(events::remove_member))
        .route(
            "/events/:id/transfer-ownership",
            post(events::transfer_ownership),
        )
        .route("/events/:id/jenis-tiket", get(events::ticket_types))
        .route(
            "/jenis-tiket",
            get(ticket_types::index).post(ticket_types::create),
        )
        .route(
            "/jenis-tiket/:id",
            get(ticket_types::show)
                .put(ticket_types::update)
                .delete(ticket_types::delete),
        )
        .route("/jenis-tiket/:id/available", get(ticket_types::availability))
        .route(
            "/transaksi",
            get(transactions::list).post(transactions::purchase),
        )
        .route("/transaksi/register-free", post(transactions::register_free))
        .route("/transaksi/order/:order_id", get(transactions::show_by_order))
        .route(
            "/transaksi/can-register/:event_id",
            get(transactions::can_register),
        )
        .route("/transaksi/:id", get(transactions::show))
        .route("/transaksi/:id/cancel", post(transactions::cancel))
        .route("/transaksi/:id/approve", post(transactions::approve))
        .route("/transaksi/:id/reject", post(transactions::reject))
        .route("/midtrans/callback", post(midtrans::callback))
        .route("/midtrans/status/:order_id", get(midtrans::status))
        .route("/tiket/my-tickets", get(tickets::my_tickets))
        .route("/tiket/scan", post(tickets::scan))
        .route("/tiket/qr/:code", get(tickets::verify))
        .route("/tiket/event/:event_id", get(tickets::for_event))
        .route("/tiket/event/:event_id/statistics", get(tickets::statistics))
        .route("/tiket/:id", get(tickets::show))
        .route("/tiket/:id/cancel", post(tickets::cancel))
        .route("/scan-history/tiket/:ticket_id", get(scan_history::for_ticket))
        .route("/scan-history/event/:event_id", get(scan_history::for_event))
        .route("/scan-history/user/:user_id", get(scan_history::by_user))
        .route("/scan-history", get(scan_history::all))
        .route("/scan-history/statistics", get(scan_history::statistics))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:id",
            get(users::show).put(users::update).delete(users::deactivate),
        )
        .route(
            "/users/:id/permissions",
            get(users::permissions).post(users::grant_permission),
        )
        .route(
            "/users/:id/permissions/:permission",
            delete(users::revoke_permission),
        )
        .route("/users/:id/roles", post(users::assign_role))
        .route("/users/:id/roles/:role", delete(users::remove_role))
}
