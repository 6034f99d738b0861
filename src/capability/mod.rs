//! 能力描述表
//!
//! 发现机制（外部）交付一张完成的 CapabilityTable；每个 CapabilityDescriptor 是一条只读声明：
//! 名称 + 按种类区分的元数据 + 处理器。处理器是启动时构造一次的长生命周期闭包，
//! 自行捕获所需上下文，运行时只负责按位置参数调用。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::{EventPriority, HostEvent};
use crate::host::{ActorId, CommandSender};
use crate::menu::ClickEvent;

/// 处理器统一返回类型；Err 与 panic 均在分发边界被隔离
pub type HandlerResult = anyhow::Result<()>;

pub type CommandHandler = Arc<dyn Fn(&dyn CommandSender, &[String]) -> HandlerResult + Send + Sync>;
pub type CompletionHandler = Arc<dyn Fn(&[String]) -> anyhow::Result<Vec<String>> + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn(ActorId) -> HandlerResult + Send + Sync>;
pub type TaskHandler = Arc<dyn Fn() -> HandlerResult + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(&mut HostEvent) -> HandlerResult + Send + Sync>;

/// 按钮处理器：是否接收原始点击事件由声明决定
#[derive(Clone)]
pub enum ButtonAction {
    Actor(Arc<dyn Fn(ActorId) -> HandlerResult + Send + Sync>),
    WithEvent(Arc<dyn Fn(ActorId, &ClickEvent) -> HandlerResult + Send + Sync>),
}

impl ButtonAction {
    pub fn invoke(&self, actor: ActorId, event: &ClickEvent) -> HandlerResult {
        match self {
            Self::Actor(f) => f(actor),
            Self::WithEvent(f) => f(actor, event),
        }
    }
}

/// 能力种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    Command,
    Subcommand,
    TabCompleter,
    Menu,
    Button,
    CloseHook,
    ScheduledTask,
    EventListener,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 冷却声明：秒数、可选提示模板（含 %time%）、可选桶名（默认为命令名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSpec {
    pub seconds: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl CooldownSpec {
    pub fn seconds(seconds: u64) -> Self {
        Self {
            seconds,
            message: None,
            bucket: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }
}

/// 命令元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMeta {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cooldown: Option<CooldownSpec>,
}

impl CommandMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// 空字符串视为未声明权限
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        let permission = permission.into();
        self.permission = (!permission.is_empty()).then_some(permission);
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cooldown(mut self, cooldown: CooldownSpec) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

/// 定时任务声明：delay / period 以宿主 tick 计；period <= 0 表示一次性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub delay: u64,
    pub period: i64,
    #[serde(rename = "async")]
    pub is_async: bool,
}

impl ScheduleSpec {
    pub fn once(delay: u64) -> Self {
        Self {
            delay,
            period: -1,
            is_async: false,
        }
    }

    pub fn repeating(delay: u64, period: i64) -> Self {
        Self {
            delay,
            period,
            is_async: false,
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn is_repeating(&self) -> bool {
        self.period > 0
    }
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self::once(0)
    }
}

/// 按种类区分的声明内容
#[derive(Clone)]
pub enum CapabilitySpec {
    Command {
        meta: CommandMeta,
        handler: CommandHandler,
    },
    /// 名称形如 `parent.child`
    Subcommand { handler: CommandHandler },
    /// 名称为目标命令名
    TabCompleter { handler: CompletionHandler },
    /// 名称为菜单 ID
    Menu { title: String, rows: usize },
    Button {
        menu: String,
        slot: usize,
        item: String,
        action: ButtonAction,
    },
    CloseHook { menu: String, handler: CloseHandler },
    ScheduledTask {
        schedule: ScheduleSpec,
        handler: TaskHandler,
    },
    EventListener {
        event: String,
        priority: EventPriority,
        ignore_cancelled: bool,
        handler: EventHandler,
    },
}

/// 一条能力声明
#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub spec: CapabilitySpec,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

impl CapabilityDescriptor {
    pub fn kind(&self) -> CapabilityKind {
        match &self.spec {
            CapabilitySpec::Command { .. } => CapabilityKind::Command,
            CapabilitySpec::Subcommand { .. } => CapabilityKind::Subcommand,
            CapabilitySpec::TabCompleter { .. } => CapabilityKind::TabCompleter,
            CapabilitySpec::Menu { .. } => CapabilityKind::Menu,
            CapabilitySpec::Button { .. } => CapabilityKind::Button,
            CapabilitySpec::CloseHook { .. } => CapabilityKind::CloseHook,
            CapabilitySpec::ScheduledTask { .. } => CapabilityKind::ScheduledTask,
            CapabilitySpec::EventListener { .. } => CapabilityKind::EventListener,
        }
    }

    pub fn command<F>(name: impl Into<String>, meta: CommandMeta, handler: F) -> Self
    where
        F: Fn(&dyn CommandSender, &[String]) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            spec: CapabilitySpec::Command {
                meta,
                handler: Arc::new(handler),
            },
        }
    }

    pub fn subcommand<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&dyn CommandSender, &[String]) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            spec: CapabilitySpec::Subcommand {
                handler: Arc::new(handler),
            },
        }
    }

    pub fn tab_completer<F>(command: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<Vec<String>> + Send + Sync + 'static,
    {
        Self {
            name: command.into(),
            spec: CapabilitySpec::TabCompleter {
                handler: Arc::new(handler),
            },
        }
    }

    pub fn menu(id: impl Into<String>, title: impl Into<String>, rows: usize) -> Self {
        Self {
            name: id.into(),
            spec: CapabilitySpec::Menu {
                title: title.into(),
                rows,
            },
        }
    }

    pub fn button<F>(
        menu: impl Into<String>,
        slot: usize,
        item: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(ActorId) -> HandlerResult + Send + Sync + 'static,
    {
        Self::button_action(menu, slot, item, ButtonAction::Actor(Arc::new(handler)))
    }

    /// 需要原始点击事件的按钮
    pub fn button_with_event<F>(
        menu: impl Into<String>,
        slot: usize,
        item: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(ActorId, &ClickEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self::button_action(menu, slot, item, ButtonAction::WithEvent(Arc::new(handler)))
    }

    fn button_action(
        menu: impl Into<String>,
        slot: usize,
        item: impl Into<String>,
        action: ButtonAction,
    ) -> Self {
        let menu = menu.into();
        Self {
            name: format!("{menu}#{slot}"),
            spec: CapabilitySpec::Button {
                menu,
                slot,
                item: item.into(),
                action,
            },
        }
    }

    pub fn close_hook<F>(menu: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActorId) -> HandlerResult + Send + Sync + 'static,
    {
        let menu = menu.into();
        Self {
            name: format!("{menu}#close"),
            spec: CapabilitySpec::CloseHook {
                menu,
                handler: Arc::new(handler),
            },
        }
    }

    pub fn task<F>(name: impl Into<String>, schedule: ScheduleSpec, handler: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            spec: CapabilitySpec::ScheduledTask {
                schedule,
                handler: Arc::new(handler),
            },
        }
    }

    pub fn event_listener<F>(
        name: impl Into<String>,
        event: impl Into<String>,
        priority: EventPriority,
        ignore_cancelled: bool,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut HostEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            spec: CapabilitySpec::EventListener {
                event: event.into(),
                priority,
                ignore_cancelled,
                handler: Arc::new(handler),
            },
        }
    }
}

/// 能力表：发现阶段的最终产物，按发现顺序保存
#[derive(Clone, Default, Debug)]
pub struct CapabilityTable {
    descriptors: Vec<CapabilityDescriptor>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: CapabilityDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn with(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.push(descriptor);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CapabilityDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// 某种类的声明数量
    pub fn count(&self, kind: CapabilityKind) -> usize {
        self.descriptors.iter().filter(|d| d.kind() == kind).count()
    }
}

impl FromIterator<CapabilityDescriptor> for CapabilityTable {
    fn from_iter<T: IntoIterator<Item = CapabilityDescriptor>>(iter: T) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CapabilityTable {
    type Item = &'a CapabilityDescriptor;
    type IntoIter = std::slice::Iter<'a, CapabilityDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
