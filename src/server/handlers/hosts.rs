// 主机列表API

use axum::{extract::State, http::StatusCode, Json};
use tracing::error;

use super::ApiResponse;
use crate::router::HostSummary;
use crate::server::AppState;

/// 列出注册表中的主机
///
/// GET /api/v1/hosts
pub async fn list_hosts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<HostSummary>>>, (StatusCode, Json<ApiResponse<()>>)> {
    match state.router.hosts().await {
        Ok(hosts) => Ok(Json(ApiResponse::success(hosts))),
        Err(e) => {
            error!("读取主机注册表失败: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(500, format!("读取主机注册表失败: {}", e))),
            ))
        }
    }
}
