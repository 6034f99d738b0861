//! 事件反应
//!
//! EventListener 能力按事件类型分组，按优先级（Lowest → Monitor）再按注册顺序调用；
//! 声明了 ignore_cancelled 的监听器在事件已被取消时跳过。每次调用都经过失败隔离。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilitySpec, CapabilityTable, EventHandler};
use crate::core::isolation::invoke_isolated;
use crate::host::ActorId;

/// 监听优先级；数值小的先执行，Monitor 最后
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    Monitor,
}

/// 宿主投递的事件
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub kind: String,
    pub actor: Option<ActorId>,
    pub payload: serde_json::Value,
    cancelled: bool,
}

impl HostEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            actor: None,
            payload: serde_json::Value::Null,
            cancelled: false,
        }
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[derive(Clone)]
struct Listener {
    capability: String,
    priority: EventPriority,
    ignore_cancelled: bool,
    handler: EventHandler,
}

/// 事件类型 → 已排序的监听器列表
#[derive(Clone, Default)]
pub struct EventTable {
    by_kind: HashMap<String, Vec<Listener>>,
}

impl EventTable {
    pub fn build(table: &CapabilityTable) -> Self {
        let mut by_kind: HashMap<String, Vec<Listener>> = HashMap::new();
        for descriptor in table {
            if let CapabilitySpec::EventListener {
                event,
                priority,
                ignore_cancelled,
                handler,
            } = &descriptor.spec
            {
                by_kind.entry(event.clone()).or_default().push(Listener {
                    capability: descriptor.name.clone(),
                    priority: *priority,
                    ignore_cancelled: *ignore_cancelled,
                    handler: handler.clone(),
                });
                tracing::info!("Registered event listener: {} for {}", descriptor.name, event);
            }
        }
        // 稳定排序，同优先级保持注册顺序
        for listeners in by_kind.values_mut() {
            listeners.sort_by_key(|l| l.priority);
        }
        Self { by_kind }
    }

    /// 分发事件，返回实际调用（含失败）的监听器数量
    pub fn dispatch(&self, event: &mut HostEvent) -> usize {
        let Some(listeners) = self.by_kind.get(&event.kind) else {
            return 0;
        };
        let mut invoked = 0;
        for listener in listeners {
            if listener.ignore_cancelled && event.is_cancelled() {
                continue;
            }
            invoked += 1;
            let _ = invoke_isolated(&listener.capability, || (listener.handler)(&mut *event));
        }
        invoked
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.by_kind.get(kind).map_or(0, Vec::len)
    }
}
