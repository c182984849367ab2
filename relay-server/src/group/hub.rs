use chrono::{DateTime, Utc};
use common::{
    decode_exposure, CameraSettingsCommand, CameraStatus, ConnectionId, RelayError, Result, Role,
    TextMessage,
};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// 组内广播事件
///
/// 每个成员各自订阅，并在投递时按角色和来源过滤。
#[derive(Debug, Clone)]
pub enum GroupEvent {
    /// 发布端上报的摄像头状态，转发给浏览器
    CameraStatusUpdate {
        status: CameraStatus,
        origin: ConnectionId,
    },
    /// 浏览器发起的参数修改，只投递给发布端
    ForwardSettingToPi {
        command: CameraSettingsCommand,
        origin: ConnectionId,
    },
    /// 发布端上线/下线
    ConnectionStatus {
        is_connected: bool,
        origin: ConnectionId,
    },
}

/// 发往单个连接的帧
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Binary(Bytes),
    Text(String),
}

#[derive(Debug, Clone)]
struct MemberInfo {
    role: Role,
    /// 通过hello显式声明过角色
    declared: bool,
    joined_at: DateTime<Utc>,
}

/// 供状态接口使用的摄像头状态
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub brightness: i32,
    pub contrast: Option<i32>,
    pub exposure: f64,
    pub focus: i32,
    pub fps: f32,
}

impl From<&CameraStatus> for StatusView {
    fn from(status: &CameraStatus) -> Self {
        Self {
            brightness: status.brightness,
            contrast: status.contrast,
            exposure: decode_exposure(status.exposure),
            focus: status.focus,
            fps: status.fps,
        }
    }
}

/// 组状态摘要
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub members: usize,
    pub publisher_connected: bool,
    pub publisher_id: Option<String>,
    pub publisher_since: Option<DateTime<Utc>>,
    pub last_status: Option<StatusView>,
}

/// 摄像头控制组
///
/// 维护组成员集合，识别唯一的发布端连接，并将状态/命令扇出到各成员。
#[derive(Clone)]
pub struct CameraGroup {
    name: Arc<str>,
    members: Arc<DashMap<ConnectionId, MemberInfo>>,
    tx: broadcast::Sender<GroupEvent>,
    last_status: Arc<watch::Sender<Option<CameraStatus>>>,
}

impl CameraGroup {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        let (status_tx, _) = watch::channel(None);
        Self {
            name: Arc::from(name.into()),
            members: Arc::new(DashMap::new()),
            tx,
            last_status: Arc::new(status_tx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 加入组，返回的成员句柄在drop时离开组
    pub fn join(&self) -> Membership {
        let id = ConnectionId::new();
        let rx = self.tx.subscribe();
        self.members.insert(
            id,
            MemberInfo {
                role: Role::Browser,
                declared: false,
                joined_at: Utc::now(),
            },
        );
        info!("Connection {} joined group {} ({} members)", id, self.name, self.members.len());
        Membership {
            id,
            rx,
            group: self.clone(),
        }
    }

    /// 离开组，真正移除成员
    pub fn leave(&self, id: ConnectionId) {
        let Some((_, member)) = self.members.remove(&id) else {
            return;
        };
        info!("Connection {} left group {} ({} members)", id, self.name, self.members.len());

        if member.role == Role::Publisher {
            warn!("Publisher {} disconnected", id);
            self.broadcast(GroupEvent::ConnectionStatus {
                is_connected: false,
                origin: id,
            });
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        self.members.get(id).map(|m| m.role)
    }

    pub fn is_publisher(&self, id: &ConnectionId) -> bool {
        self.role_of(id) == Some(Role::Publisher)
    }

    /// 当前发布端
    pub fn publisher(&self) -> Option<ConnectionId> {
        self.members
            .iter()
            .find(|entry| entry.role == Role::Publisher)
            .map(|entry| *entry.key())
    }

    /// 通过hello声明角色
    pub fn declare_role(&self, id: ConnectionId, role: Role) {
        match role {
            Role::Publisher => self.claim_publisher(id, true),
            Role::Browser => {
                let was_publisher = match self.members.get_mut(&id) {
                    Some(mut member) => {
                        let was = member.role == Role::Publisher;
                        member.role = Role::Browser;
                        member.declared = true;
                        was
                    }
                    None => return,
                };
                debug!("Connection {} declared role browser", id);
                if was_publisher {
                    self.broadcast(GroupEvent::ConnectionStatus {
                        is_connected: false,
                        origin: id,
                    });
                }
            }
        }
    }

    /// 标记发布端，同一时刻只保留一个，新的声明替换旧的
    fn claim_publisher(&self, id: ConnectionId, declared: bool) {
        if !self.members.contains_key(&id) {
            return;
        }

        let mut demoted = Vec::new();
        for mut entry in self.members.iter_mut() {
            if *entry.key() != id && entry.role == Role::Publisher {
                entry.role = Role::Browser;
                demoted.push(*entry.key());
            }
        }
        for old in &demoted {
            warn!("Publisher {} replaced by {}", old, id);
        }

        let newly_assigned = match self.members.get_mut(&id) {
            Some(mut member) => {
                let newly = member.role != Role::Publisher;
                member.role = Role::Publisher;
                member.declared |= declared;
                newly
            }
            None => return,
        };

        if newly_assigned {
            if declared {
                info!("Connection {} declared role publisher", id);
            } else {
                info!("Connection {} discovered as publisher (first binary frame)", id);
            }
            self.broadcast(GroupEvent::ConnectionStatus {
                is_connected: true,
                origin: id,
            });
        }
    }

    /// 处理二进制帧：只接受发布端的摄像头状态
    pub fn handle_binary(&self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let declared_browser = self
            .members
            .get(&id)
            .map(|m| m.declared && m.role == Role::Browser)
            .unwrap_or(true);
        if declared_browser {
            return Err(RelayError::MalformedMessage(format!(
                "binary frame from non-publisher connection {}",
                id
            )));
        }

        let status = CameraStatus::decode_frame(data)?;
        if !self.is_publisher(&id) {
            self.claim_publisher(id, false);
        }

        debug!(
            "Camera status from {}: brightness={} exposure={} fps={:.1}",
            id, status.brightness, status.exposure, status.fps
        );
        self.last_status.send_replace(Some(status.clone()));
        self.broadcast(GroupEvent::CameraStatusUpdate { status, origin: id });
        Ok(())
    }

    /// 处理文本帧（JSON）
    pub fn handle_text(&self, id: ConnectionId, text: &str) -> Result<()> {
        match TextMessage::from_text(text)? {
            TextMessage::Hello { role } => self.declare_role(id, role),
            message @ TextMessage::CameraSetting { .. } => {
                if let Some(command) = message.to_command() {
                    if self.publisher().is_none() {
                        debug!(
                            "Setting {}={} from {} while no publisher is connected",
                            command.setting, command.value, id
                        );
                    }
                    info!("Forwarding setting {}={} from {}", command.setting, command.value, id);
                    self.broadcast(GroupEvent::ForwardSettingToPi { command, origin: id });
                }
            }
            other => {
                debug!("Ignoring unexpected text message from {}: {:?}", id, other);
            }
        }
        Ok(())
    }

    fn broadcast(&self, event: GroupEvent) {
        match self.tx.send(event) {
            Ok(count) => debug!("Broadcasted group event to {} subscribers", count),
            Err(_) => debug!("No subscribers in group {}", self.name),
        }
    }

    /// 将组事件转换为发往指定成员的帧，不应投递时返回None
    pub fn render_for(&self, member: ConnectionId, event: &GroupEvent) -> Option<OutboundFrame> {
        let is_publisher = self.is_publisher(&member);
        match event {
            GroupEvent::CameraStatusUpdate { status, origin } => {
                if is_publisher || *origin == member {
                    return None;
                }
                text_frame(&TextMessage::from(status))
            }
            GroupEvent::ForwardSettingToPi { command, .. } => {
                is_publisher.then(|| OutboundFrame::Binary(command.encode_frame()))
            }
            GroupEvent::ConnectionStatus {
                is_connected,
                origin,
            } => {
                if is_publisher || *origin == member {
                    return None;
                }
                text_frame(&TextMessage::ConnectionStatus {
                    is_connected: *is_connected,
                })
            }
        }
    }

    /// 新加入成员的初始帧：发布端在线状态及最近一次摄像头状态
    pub fn snapshot(&self) -> Vec<OutboundFrame> {
        let publisher_connected = self.publisher().is_some();
        let mut frames = Vec::new();
        frames.extend(text_frame(&TextMessage::ConnectionStatus {
            is_connected: publisher_connected,
        }));
        if publisher_connected {
            if let Some(status) = self.last_status.borrow().as_ref() {
                frames.extend(text_frame(&TextMessage::from(status)));
            }
        }
        frames
    }

    pub fn summary(&self) -> GroupSummary {
        let publisher = self
            .members
            .iter()
            .find(|entry| entry.role == Role::Publisher)
            .map(|entry| (*entry.key(), entry.joined_at));

        GroupSummary {
            group: self.name.to_string(),
            members: self.members.len(),
            publisher_connected: publisher.is_some(),
            publisher_id: publisher.map(|(id, _)| id.to_string()),
            publisher_since: publisher.map(|(_, joined_at)| joined_at),
            last_status: self.last_status.borrow().as_ref().map(StatusView::from),
        }
    }
}

fn text_frame(message: &TextMessage) -> Option<OutboundFrame> {
    match message.to_text() {
        Ok(text) => Some(OutboundFrame::Text(text)),
        Err(e) => {
            warn!("Failed to encode text frame: {}", e);
            None
        }
    }
}

/// 组成员句柄
pub struct Membership {
    id: ConnectionId,
    rx: broadcast::Receiver<GroupEvent>,
    group: CameraGroup,
}

impl Membership {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 等待下一帧需要投递给本成员的数据，组关闭时返回None
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(frame) = self.group.render_for(self.id, &event) {
                        return Some(frame);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Connection {} lagged, skipped {} group events", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.group.leave(self.id);
    }
}
