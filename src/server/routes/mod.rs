//! HTTP routes

pub mod internal;
pub mod search;
pub mod status;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use super::state::AppState;

/// Build every route of the service
pub fn routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Tenant-scoped
        .route(
            "/upload/single",
            post(upload::upload_single).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/upload/bulk",
            post(upload::upload_bulk).layer(DefaultBodyLimit::max(max_upload_size * 4)),
        )
        .route("/status/:document_id", get(status::document_status))
        .route("/documents/:document_id", delete(status::delete_document))
        .route("/metrics/me", get(status::tenant_metrics))
        .route("/search", post(search::search))
        // Internal-scoped
        .route("/internal/auth", get(internal::authenticate_service))
        .route("/internal/health", get(internal::health))
        .route(
            "/internal/tenants",
            get(internal::list_tenants).post(internal::create_tenant),
        )
        .route("/internal/tenants/:name", delete(internal::delete_tenant))
        .route(
            "/internal/tenants/:name/rotate-key",
            post(internal::rotate_tenant_key),
        )
        .route("/internal/stats", get(internal::stats))
        .route("/internal/documents", get(internal::list_documents))
        .route("/internal/documents/:document_id", get(internal::get_document))
        .route("/internal/search", post(internal::search_all_tenants))
}
