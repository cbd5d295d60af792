// 请求拦截入口：未匹配任何 API 路由的请求都交给路由器

use axum::{body::Body, extract::State, http::Request, response::Response};

use crate::server::AppState;

pub async fn intercept(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.router.dispatch(request).await
}
