use crate::group::CameraGroup;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(group: CameraGroup) -> Router {
    Router::new()
        // 摄像头控制通道（发布端与浏览器共用）
        .route("/ws/camera/", get(super::ws::camera_socket))

        // 状态查询
        .route("/api/v1/status", get(super::handlers::get_status))

        // 健康检查
        .route("/health", get(super::handlers::health_check))

        .with_state(group)

        // CORS中间件
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
