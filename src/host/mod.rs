//! 宿主协作接口
//!
//! 运行时只通过这里的窄接口与宿主交互：命令面（声明命令）、命令发送者（权限与消息）、
//! UI 面（网格界面与物品）、文本格式化、本地化消息，以及一次性的能力表来源。

pub mod mock;

use std::fmt;

use uuid::Uuid;

use crate::capability::CapabilityTable;
use crate::menu::ItemStack;

pub use mock::{MockHost, MockSender};

/// 行为者 ID（例如已连接的玩家）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 宿主 UI 面句柄（一个已创建的网格界面）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 能力表来源：启动时交付一次，之后不再变化
pub trait DiscoveryFeed {
    /// 返回 None 表示宿主没有提供任何能力表（启动期致命配置错误）
    fn load(&self) -> Option<CapabilityTable>;
}

impl DiscoveryFeed for CapabilityTable {
    fn load(&self) -> Option<CapabilityTable> {
        Some(self.clone())
    }
}

/// 向宿主命令面声明的命令信息
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandRegistration {
    pub name: String,
    pub aliases: Vec<String>,
    pub permission: Option<String>,
    pub usage: Option<String>,
    pub description: Option<String>,
}

/// 宿主命令面
pub trait CommandHost: Send + Sync {
    /// 声明命令；宿主不认识该命令时返回 false
    fn declare(&self, registration: &CommandRegistration) -> bool;
}

/// 命令发送者：行为者身份、权限谓词与消息回送
pub trait CommandSender: Send + Sync {
    /// 控制台等非玩家发送者没有行为者 ID，不参与冷却
    fn actor_id(&self) -> Option<ActorId>;

    fn name(&self) -> &str;

    fn has_permission(&self, permission: &str) -> bool;

    /// 发送已格式化的文本
    fn send_message(&self, text: &str);
}

/// 宿主 UI 面：类背包网格界面
pub trait UiHost: Send + Sync {
    fn create_surface(&self, size: usize, title: &str) -> SurfaceId;

    fn set_item(&self, surface: SurfaceId, slot: usize, item: ItemStack);

    fn show(&self, actor: ActorId, surface: SurfaceId);

    /// 以编程方式关闭行为者当前界面；宿主随后应投递关闭事件
    fn close(&self, actor: ActorId);
}

/// 文本格式化协作者
pub trait TextFormatter: Send + Sync {
    fn format(&self, markup: &str) -> String;
}

/// 本地化消息协作者：未解析时回退为原始 key
pub trait MessageResolver: Send + Sync {
    fn resolve(&self, actor: Option<ActorId>, key: &str, replacements: &[(&str, &str)]) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_ids_are_unique() {
        assert_ne!(ActorId::new(), ActorId::new());
        let uuid = Uuid::new_v4();
        assert_eq!(ActorId::from_uuid(uuid).as_uuid(), &uuid);
    }

    #[test]
    fn test_table_is_its_own_discovery_feed() {
        let table = CapabilityTable::new();
        assert!(table.load().is_some());
    }
}
