// 摄像头控制通道 - WebSocket连接处理
//
// 每个连接在单个任务内协作调度：一边把组内事件写给对端，一边读取对端的帧。
// 二进制帧是发布端的摄像头状态，文本帧是浏览器（或发布端hello）的JSON消息。
// 单个坏帧只记录日志，不会断开连接。

use crate::group::{CameraGroup, OutboundFrame};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

/// GET /ws/camera/
pub async fn camera_socket(
    ws: WebSocketUpgrade,
    State(group): State<CameraGroup>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, group))
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Binary(data) => Message::Binary(data.to_vec()),
        OutboundFrame::Text(text) => Message::Text(text),
    }
}

async fn handle_socket(socket: WebSocket, group: CameraGroup) {
    let mut membership = group.join();
    let id = membership.id();
    let (mut sink, mut stream) = socket.split();

    for frame in group.snapshot() {
        if let Err(e) = sink.send(to_message(frame)).await {
            debug!("Connection {} closed before snapshot was sent: {}", id, e);
            return;
        }
    }

    loop {
        tokio::select! {
            frame = membership.next_frame() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(to_message(frame)).await {
                    debug!("Send to {} failed: {}", id, e);
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Binary(data))) => {
                        if let Err(e) = group.handle_binary(id, &data) {
                            warn!("Discarded binary frame from {}: {}", id, e);
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = group.handle_text(id, &text) {
                            warn!("Discarded text frame from {}: {}", id, e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Connection {} closed by peer ({:?})", id, frame.map(|f| f.code));
                        break;
                    }
                    // ping/pong由axum自动处理
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection {} dropped: {}", id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    drop(membership);
}

#[cfg(test)]
mod tests {
    use crate::group::CameraGroup;
    use common::{CameraSettingsCommand, CameraStatus, TextMessage};
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server(group: CameraGroup) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = crate::http::create_router(group);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let url = format!("ws://{}/ws/camera/", addr);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        ws
    }

    async fn next_text(client: &mut Client) -> TextMessage {
        loop {
            let msg = timeout(Duration::from_secs(2), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = msg {
                return TextMessage::from_text(&text).unwrap();
            }
        }
    }

    async fn next_binary(client: &mut Client) -> Vec<u8> {
        loop {
            let msg = timeout(Duration::from_secs(2), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .unwrap();
            if let Message::Binary(data) = msg {
                return data;
            }
        }
    }

    async fn wait_for_members(group: &CameraGroup, count: usize) {
        timeout(Duration::from_secs(2), async {
            while group.member_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("member count not reached");
    }

    #[tokio::test]
    async fn test_publisher_and_browser_over_websocket() {
        let group = CameraGroup::new("camera_group", 64);
        let addr = spawn_server(group.clone()).await;

        let mut browser = connect(addr).await;
        assert_eq!(
            next_text(&mut browser).await,
            TextMessage::ConnectionStatus { is_connected: false }
        );

        let mut publisher = connect(addr).await;
        let _ = next_text(&mut publisher).await;
        publisher
            .send(Message::Text(r#"{"type":"hello","role":"publisher"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(
            next_text(&mut browser).await,
            TextMessage::ConnectionStatus { is_connected: true }
        );

        // 发布端状态 → 浏览器JSON
        let status = CameraStatus {
            is_connected: true,
            brightness: 61,
            contrast: None,
            exposure: 80,
            focus: 2,
            fps: 24.0,
        };
        publisher
            .send(Message::Binary(status.encode_frame().to_vec()))
            .await
            .unwrap();
        assert_eq!(next_text(&mut browser).await, TextMessage::from(&status));

        // 坏帧不会断开发布端
        publisher
            .send(Message::Binary(vec![0xff, 0xff, 0xff]))
            .await
            .unwrap();

        // 浏览器设置 → 发布端二进制命令
        browser
            .send(Message::Text(
                r#"{"type":"camera_setting","setting":"exposure","value":95}"#.to_string(),
            ))
            .await
            .unwrap();
        let command = CameraSettingsCommand::decode_frame(&next_binary(&mut publisher).await).unwrap();
        assert_eq!(command, CameraSettingsCommand::new("exposure", 95));

        // 发布端断开 → 浏览器收到离线通知，成员被移除
        publisher.close(None).await.unwrap();
        assert_eq!(
            next_text(&mut browser).await,
            TextMessage::ConnectionStatus { is_connected: false }
        );
        wait_for_members(&group, 1).await;
    }

    #[tokio::test]
    async fn test_late_browser_gets_last_status() {
        let group = CameraGroup::new("camera_group", 64);
        let addr = spawn_server(group.clone()).await;

        let mut publisher = connect(addr).await;
        let _ = next_text(&mut publisher).await;
        let status = CameraStatus {
            is_connected: true,
            brightness: 33,
            contrast: Some(5),
            exposure: 120,
            focus: 1,
            fps: 30.0,
        };
        publisher
            .send(Message::Binary(status.encode_frame().to_vec()))
            .await
            .unwrap();
        timeout(Duration::from_secs(2), async {
            while group.publisher().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let mut browser = connect(addr).await;
        assert_eq!(
            next_text(&mut browser).await,
            TextMessage::ConnectionStatus { is_connected: true }
        );
        assert_eq!(next_text(&mut browser).await, TextMessage::from(&status));
    }
}
