// Web服务器模块

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 构建完整应用
///
/// API 路由优先，其余请求全部交给路由器拦截
pub fn build_app(state: AppState) -> Router {
    let api_routes = Router::new().route("/hosts", get(handlers::list_hosts));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health_check))
        .fallback(handlers::intercept)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
