//! Mock 宿主（用于测试与本地嵌入实验，无需真实服务器）
//!
//! 记录所有声明的命令、创建的界面、放置的物品与展示/关闭请求。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{ActorId, CommandHost, CommandRegistration, CommandSender, SurfaceId, UiHost};
use crate::menu::ItemStack;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock 界面
#[derive(Debug, Clone, Default)]
pub struct MockSurface {
    pub size: usize,
    pub title: String,
    pub items: BTreeMap<usize, ItemStack>,
}

/// Mock 宿主：同时实现命令面与 UI 面
#[derive(Debug, Default)]
pub struct MockHost {
    declared: Mutex<Vec<CommandRegistration>>,
    /// 宿主“认识”的命令；为空表示接受全部
    known_commands: Mutex<HashSet<String>>,
    surfaces: Mutex<HashMap<SurfaceId, MockSurface>>,
    shown: Mutex<HashMap<ActorId, SurfaceId>>,
    close_requests: Mutex<Vec<ActorId>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只接受给定的命令名，其他声明返回 false
    pub fn with_known_commands<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::default();
        *lock(&host.known_commands) = names.into_iter().map(Into::into).collect();
        host
    }

    pub fn declared(&self) -> Vec<CommandRegistration> {
        lock(&self.declared).clone()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<MockSurface> {
        lock(&self.surfaces).get(&id).cloned()
    }

    pub fn surface_count(&self) -> usize {
        lock(&self.surfaces).len()
    }

    /// 行为者当前看到的界面
    pub fn shown_to(&self, actor: ActorId) -> Option<SurfaceId> {
        lock(&self.shown).get(&actor).copied()
    }

    pub fn close_requests(&self) -> Vec<ActorId> {
        lock(&self.close_requests).clone()
    }
}

impl CommandHost for MockHost {
    fn declare(&self, registration: &CommandRegistration) -> bool {
        let known = lock(&self.known_commands);
        if !known.is_empty() && !known.contains(&registration.name) {
            return false;
        }
        drop(known);
        lock(&self.declared).push(registration.clone());
        true
    }
}

impl UiHost for MockHost {
    fn create_surface(&self, size: usize, title: &str) -> SurfaceId {
        let id = SurfaceId::new();
        lock(&self.surfaces).insert(
            id,
            MockSurface {
                size,
                title: title.to_string(),
                items: BTreeMap::new(),
            },
        );
        id
    }

    fn set_item(&self, surface: SurfaceId, slot: usize, item: ItemStack) {
        if let Some(s) = lock(&self.surfaces).get_mut(&surface) {
            s.items.insert(slot, item);
        }
    }

    fn show(&self, actor: ActorId, surface: SurfaceId) {
        lock(&self.shown).insert(actor, surface);
    }

    fn close(&self, actor: ActorId) {
        lock(&self.shown).remove(&actor);
        lock(&self.close_requests).push(actor);
    }
}

/// Mock 命令发送者：固定权限集合，收集收到的消息
#[derive(Debug)]
pub struct MockSender {
    actor: Option<ActorId>,
    name: String,
    permissions: HashSet<String>,
    messages: Mutex<Vec<String>>,
}

impl MockSender {
    /// 玩家发送者（有行为者 ID）
    pub fn player(name: impl Into<String>) -> Self {
        Self {
            actor: Some(ActorId::new()),
            name: name.into(),
            permissions: HashSet::new(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// 控制台发送者（无行为者 ID，拥有全部权限）
    pub fn console() -> Self {
        Self {
            actor: None,
            name: "CONSOLE".to_string(),
            permissions: HashSet::from(["*".to_string()]),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    pub fn last_message(&self) -> Option<String> {
        lock(&self.messages).last().cloned()
    }
}

impl CommandSender for MockSender {
    fn actor_id(&self) -> Option<ActorId> {
        self.actor
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains("*") || self.permissions.contains(permission)
    }

    fn send_message(&self, text: &str) {
        lock(&self.messages).push(text.to_string());
    }
}
