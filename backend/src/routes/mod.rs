//! Route definitions for the Field Service Management backend

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let auth_layer = middleware::from_fn_with_state(state, auth_middleware);

    let account = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/password", put(handlers::change_password))
        .route_layer(auth_layer.clone());

    let protected = Router::new()
        .nest("/clients", client_routes())
        .nest("/technicians", technician_routes())
        .nest("/equipment", equipment_routes())
        .nest("/services", service_routes())
        .nest("/quotes", quote_routes())
        .nest("/stats", stats_routes())
        .route_layer(auth_layer);

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes().merge(account))
        .merge(protected)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
}

fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_clients).post(handlers::create_client))
        .route(
            "/:id",
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/:id/equipment", get(handlers::list_client_equipment))
        .route("/:id/services", get(handlers::list_client_services))
}

fn technician_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_technicians).post(handlers::create_technician),
        )
        .route(
            "/:id",
            get(handlers::get_technician)
                .put(handlers::update_technician)
                .delete(handlers::delete_technician),
        )
        .route("/:id/services", get(handlers::list_technician_services))
}

fn equipment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_equipment).post(handlers::create_equipment))
        .route(
            "/:id",
            get(handlers::get_equipment)
                .put(handlers::update_equipment)
                .delete(handlers::delete_equipment),
        )
        .route("/:id/services", get(handlers::equipment_history))
}

fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_services).post(handlers::create_service))
        .route(
            "/:id",
            get(handlers::get_service)
                .put(handlers::update_service)
                .delete(handlers::delete_service),
        )
        .route("/:id/assign", post(handlers::assign_service))
        .route("/:id/status", post(handlers::update_service_status))
}

fn quote_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_quotes).post(handlers::create_quote))
        .route(
            "/:id",
            get(handlers::get_quote)
                .put(handlers::update_quote)
                .delete(handlers::delete_quote),
        )
        .route("/:id/send", post(handlers::send_quote))
        .route("/:id/accept", post(handlers::accept_quote))
        .route("/:id/reject", post(handlers::reject_quote))
}

fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(handlers::get_overview))
        .route("/services/monthly", get(handlers::get_services_by_month))
        .route("/quotes/monthly", get(handlers::get_quotes_by_month))
        .route("/technicians", get(handlers::get_technician_ranking))
        .route("/me", get(handlers::get_my_stats))
}
