//! 命令路由器
//!
//! 顺序：精确查找 → 权限 → 冷却（原子获取）→ 子命令 / 主处理器 → 失败隔离。
//! 路由表经 ArcSwap 发布，热重载时整表替换，读取方不会看到半建好的表。

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use super::{CommandRoute, CommandTable};
use crate::capability::CapabilityKind;
use crate::cooldown::CooldownTracker;
use crate::core::isolation::invoke_isolated;
use crate::core::DispatchError;
use crate::host::{CommandHost, CommandSender, MessageResolver, TextFormatter};
use crate::lang::{NO_PERMISSION, ON_COOLDOWN};

/// 已找到命令时的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Executed,
    PermissionDenied,
    /// 剩余整秒数（向上取整）
    CooldownActive { remaining: u64 },
    HandlerFailed,
}

/// 路由结果；NotFound 交由宿主按未知命令处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    NotFound,
    Handled(Disposition),
}

impl RouteOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

pub struct CommandRouter {
    table: ArcSwap<CommandTable>,
    cooldowns: Arc<CooldownTracker>,
    messages: Arc<dyn MessageResolver>,
    formatter: Arc<dyn TextFormatter>,
}

impl CommandRouter {
    pub fn new(
        table: CommandTable,
        cooldowns: Arc<CooldownTracker>,
        messages: Arc<dyn MessageResolver>,
        formatter: Arc<dyn TextFormatter>,
    ) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
            cooldowns,
            messages,
            formatter,
        }
    }

    /// 当前路由表快照
    pub fn table(&self) -> Arc<CommandTable> {
        self.table.load_full()
    }

    /// 原子替换路由表
    pub fn replace(&self, table: CommandTable) {
        self.table.store(Arc::new(table));
    }

    /// 向宿主命令面声明全部命令，返回被接受的数量；被拒绝的命令仍可路由
    pub fn declare_all(&self, host: &dyn CommandHost) -> usize {
        let table = self.table.load();
        let mut accepted = 0;
        for route in table.iter() {
            if host.declare(&route.registration()) {
                accepted += 1;
                tracing::info!("Registered command: {}", route.name);
            } else {
                let err = DispatchError::NotRegistered {
                    kind: CapabilityKind::Command,
                    name: route.name.clone(),
                };
                tracing::warn!("{}", err);
            }
        }
        accepted
    }

    pub fn route(&self, sender: &dyn CommandSender, name: &str, args: &[String]) -> RouteOutcome {
        let table = self.table.load();
        let Some(route) = table.get(name) else {
            return RouteOutcome::NotFound;
        };

        if let Some(permission) = route.permission() {
            if !sender.has_permission(permission) {
                tracing::debug!(
                    "{} lacks permission '{}' for /{}",
                    sender.name(),
                    permission,
                    name
                );
                self.reply(sender, NO_PERMISSION, &[]);
                return RouteOutcome::Handled(Disposition::PermissionDenied);
            }
        }

        if let Err(remaining) = self.acquire_cooldown(route, sender) {
            self.reply_cooldown(route, sender, remaining);
            return RouteOutcome::Handled(Disposition::CooldownActive { remaining });
        }

        let subcommand = args.first().and_then(|a| route.find_subcommand(a));
        let (capability, handler, rest) = match subcommand {
            Some(sub) => (sub.capability.as_str(), &sub.handler, &args[1..]),
            None => (route.name.as_str(), &route.handler, args),
        };
        match invoke_isolated(capability, || handler(sender, rest)) {
            Ok(()) => RouteOutcome::Handled(Disposition::Executed),
            Err(_) => RouteOutcome::Handled(Disposition::HandlerFailed),
        }
    }

    /// Tab 补全；未知命令或补全处理器失败时返回空
    pub fn complete(&self, name: &str, args: &[String]) -> Vec<String> {
        let table = self.table.load();
        let Some(route) = table.get(name) else {
            return Vec::new();
        };

        if let Some(completer) = &route.completer {
            return invoke_isolated(&route.name, || completer(args)).unwrap_or_default();
        }

        match args {
            [partial] => {
                let partial = partial.to_lowercase();
                route
                    .subcommands
                    .iter()
                    .filter(|s| s.name.starts_with(&partial))
                    .map(|s| s.declared.clone())
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// 只有带行为者身份的发送者参与冷却
    fn acquire_cooldown(
        &self,
        route: &CommandRoute,
        sender: &dyn CommandSender,
    ) -> Result<(), u64> {
        let (Some(cooldown), Some(actor)) = (route.cooldown(), sender.actor_id()) else {
            return Ok(());
        };
        self.cooldowns.try_acquire(
            route.cooldown_bucket(),
            actor,
            Duration::from_secs(cooldown.seconds),
        )
    }

    fn reply_cooldown(&self, route: &CommandRoute, sender: &dyn CommandSender, remaining: u64) {
        let time = remaining.to_string();
        let template = route
            .cooldown()
            .and_then(|c| c.message.as_deref())
            .filter(|m| !m.is_empty());
        match template {
            Some(template) => {
                let text = template.replace("%time%", &time);
                sender.send_message(&self.formatter.format(&text));
            }
            None => self.reply(sender, ON_COOLDOWN, &[("%time%", &time)]),
        }
    }

    fn reply(&self, sender: &dyn CommandSender, key: &str, replacements: &[(&str, &str)]) {
        let text = self.messages.resolve(sender.actor_id(), key, replacements);
        sender.send_message(&self.formatter.format(&text));
    }
}
