use crate::group::CameraGroup;
use std::future::Future;
use std::net::SocketAddr;
use tracing::info;

#[derive(Clone)]
pub struct HttpServer {
    addr: SocketAddr,
    group: CameraGroup,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, group: CameraGroup) -> Self {
        Self { addr, group }
    }

    /// 运行HTTP服务器，`shutdown` 完成后优雅退出
    pub async fn run<F>(&self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = super::routes::create_router(self.group.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("HTTP server running on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
