//! 交互菜单会话状态机
//!
//! 每个行为者至多一个活跃会话：NoSession → Active → NoSession。
//! 打开新菜单直接替换旧会话（不触发旧会话的关闭钩子）；只有宿主投递的真实关闭事件才会触发钩子。
//! 会话表为 DashMap，调用处理器前总是先释放表项引用，处理器里可以安全地再次打开菜单。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::item::ItemRenderer;
use super::MenuDescriptor;
use crate::core::isolation::invoke_isolated;
use crate::host::{ActorId, SurfaceId, TextFormatter, UiHost};

/// 宿主投递的点击事件
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub surface: SurfaceId,
    pub actor: ActorId,
    pub slot: usize,
    /// 宿主附带的原始数据（点击类型等）
    pub payload: serde_json::Value,
    cancelled: bool,
}

impl ClickEvent {
    pub fn new(surface: SurfaceId, actor: ActorId, slot: usize) -> Self {
        Self {
            surface,
            actor,
            slot,
            payload: serde_json::Value::Null,
            cancelled: false,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// 阻止宿主的默认处理（物品不会被拿走或移动）
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// 单个行为者的活跃菜单
#[derive(Clone)]
pub struct MenuSession {
    pub descriptor: Arc<MenuDescriptor>,
    pub surface: SurfaceId,
    pub opened_at: DateTime<Utc>,
}

impl std::fmt::Debug for MenuSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuSession")
            .field("menu", &self.descriptor.id)
            .field("surface", &self.surface)
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// 点击处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// 行为者没有活跃会话
    NoSession,
    /// 事件指向的界面不是当前会话的界面
    Stale,
    /// 未注册按钮的槽位
    Ignored,
    Invoked,
    /// 处理器失败（已隔离并记录）
    Failed,
}

/// 会话管理器
pub struct SessionManager {
    sessions: DashMap<ActorId, MenuSession>,
    ui: Arc<dyn UiHost>,
    formatter: Arc<dyn TextFormatter>,
    renderer: ItemRenderer,
}

impl SessionManager {
    pub fn new(
        ui: Arc<dyn UiHost>,
        formatter: Arc<dyn TextFormatter>,
        renderer: ItemRenderer,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            ui,
            formatter,
            renderer,
        }
    }

    pub fn renderer(&self) -> &ItemRenderer {
        &self.renderer
    }

    /// 为行为者打开菜单：创建界面、渲染全部按钮、保存会话并展示
    pub fn open(&self, actor: ActorId, descriptor: Arc<MenuDescriptor>) -> SurfaceId {
        let title = self.formatter.format(&descriptor.title);
        let surface = self.ui.create_surface(descriptor.size(), &title);
        for (slot, button) in &descriptor.buttons {
            self.ui.set_item(surface, *slot, self.renderer.render(&button.item));
        }

        let menu_id = descriptor.id.clone();
        let session = MenuSession {
            descriptor,
            surface,
            opened_at: Utc::now(),
        };
        if let Some(previous) = self.sessions.insert(actor, session) {
            tracing::debug!(
                "Replaced menu session '{}' for {} without close hook",
                previous.descriptor.id,
                actor
            );
        }
        self.ui.show(actor, surface);
        tracing::debug!("Opened menu '{}' for {}", menu_id, actor);
        surface
    }

    /// 以编程方式关闭；会话在宿主投递关闭事件时结束
    pub fn close(&self, actor: ActorId) {
        if self.sessions.contains_key(&actor) {
            self.ui.close(actor);
        }
    }

    /// 点击：先无条件取消宿主默认处理，再分发到槽位上的按钮
    pub fn on_click(&self, event: &mut ClickEvent) -> ClickOutcome {
        let Some((descriptor, surface)) = self
            .sessions
            .get(&event.actor)
            .map(|s| (Arc::clone(&s.descriptor), s.surface))
        else {
            return ClickOutcome::NoSession;
        };
        if surface != event.surface {
            tracing::debug!("Dropped stale click from {} on {}", event.actor, event.surface);
            return ClickOutcome::Stale;
        }

        event.cancel();
        let event: &ClickEvent = event;
        let Some(button) = descriptor.buttons.get(&event.slot) else {
            return ClickOutcome::Ignored;
        };
        match invoke_isolated(&button.capability, || button.action.invoke(event.actor, event)) {
            Ok(()) => ClickOutcome::Invoked,
            Err(_) => ClickOutcome::Failed,
        }
    }

    /// 关闭事件：移除会话并触发关闭钩子；没有会话或界面不匹配时为空操作
    pub fn on_close(&self, actor: ActorId, surface: SurfaceId) -> Option<MenuSession> {
        let (_, session) = self
            .sessions
            .remove_if(&actor, |_, s| s.surface == surface)?;

        if let Some(hook) = &session.descriptor.close_hook {
            // 钩子失败已在隔离边界记录，会话照常结束
            let _ = invoke_isolated(&hook.capability, || (hook.handler)(actor));
        }
        tracing::debug!("Closed menu '{}' for {}", session.descriptor.id, actor);
        Some(session)
    }

    /// 丢弃全部会话，不触发关闭钩子（进程关闭）
    pub fn discard_all(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    pub fn session(&self, actor: ActorId) -> Option<MenuSession> {
        self.sessions.get(&actor).map(|s| s.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
