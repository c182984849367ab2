mod hub;

pub use hub::{CameraGroup, GroupSummary, OutboundFrame};

/// 默认广播组名
pub const DEFAULT_GROUP: &str = "camera_group";
