use crate::group::{CameraGroup, GroupSummary};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }
}

/// 健康检查
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

/// 获取控制组状态（发布端是否在线、成员数、最近状态）
pub async fn get_status(State(group): State<CameraGroup>) -> Json<ApiResponse<GroupSummary>> {
    Json(ApiResponse::success(group.summary()))
}
