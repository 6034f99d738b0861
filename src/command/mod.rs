//! 命令路由表
//!
//! 从能力表构建：每个顶层命令名对应一条 CommandRoute（主处理器、按注册顺序的子命令、
//! 冷却、权限、可选补全处理器）。重复或无法挂靠的声明在构建时告警并丢弃，不会报错。

pub mod router;

use std::collections::HashMap;

use crate::capability::{
    CapabilitySpec, CapabilityTable, CommandHandler, CommandMeta, CompletionHandler, CooldownSpec,
};
use crate::host::CommandRegistration;

pub use router::{CommandRouter, Disposition, RouteOutcome};

/// 子命令条目
#[derive(Clone)]
pub struct SubcommandRoute {
    /// 小写名，用于匹配
    pub name: String,
    /// 声明时的原始写法，用于补全
    pub declared: String,
    /// 完整能力名（`parent.child`），用于日志
    pub capability: String,
    pub handler: CommandHandler,
}

/// 单个顶层命令的路由
#[derive(Clone)]
pub struct CommandRoute {
    pub name: String,
    pub meta: CommandMeta,
    pub handler: CommandHandler,
    pub subcommands: Vec<SubcommandRoute>,
    pub completer: Option<CompletionHandler>,
}

impl CommandRoute {
    pub fn permission(&self) -> Option<&str> {
        self.meta.permission.as_deref()
    }

    /// 秒数为 0 的冷却视为未声明
    pub fn cooldown(&self) -> Option<&CooldownSpec> {
        self.meta.cooldown.as_ref().filter(|c| c.seconds > 0)
    }

    /// 冷却桶名：显式声明的桶，否则为命令名
    pub fn cooldown_bucket(&self) -> &str {
        self.meta
            .cooldown
            .as_ref()
            .and_then(|c| c.bucket.as_deref())
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.name)
    }

    /// 大小写不敏感匹配，先注册者优先
    pub fn find_subcommand(&self, name: &str) -> Option<&SubcommandRoute> {
        let lower = name.to_lowercase();
        self.subcommands.iter().find(|s| s.name == lower)
    }

    pub fn registration(&self) -> CommandRegistration {
        CommandRegistration {
            name: self.name.clone(),
            aliases: self.meta.aliases.clone(),
            permission: self.meta.permission.clone(),
            usage: self.meta.usage.clone(),
            description: self.meta.description.clone(),
        }
    }
}

/// 命令名 → 路由；保留注册顺序用于向宿主声明
#[derive(Clone, Default)]
pub struct CommandTable {
    routes: HashMap<String, CommandRoute>,
    order: Vec<String>,
}

impl CommandTable {
    pub fn build(table: &CapabilityTable) -> Self {
        let mut commands = Self::default();

        for descriptor in table {
            if let CapabilitySpec::Command { meta, handler } = &descriptor.spec {
                if commands.routes.contains_key(&descriptor.name) {
                    tracing::warn!(
                        "Duplicate command '{}', keeping the first registration",
                        descriptor.name
                    );
                    continue;
                }
                commands.order.push(descriptor.name.clone());
                commands.routes.insert(
                    descriptor.name.clone(),
                    CommandRoute {
                        name: descriptor.name.clone(),
                        meta: meta.clone(),
                        handler: handler.clone(),
                        subcommands: Vec::new(),
                        completer: None,
                    },
                );
            }
        }

        for descriptor in table {
            match &descriptor.spec {
                CapabilitySpec::Subcommand { handler } => {
                    let Some((parent, child)) = descriptor.name.split_once('.') else {
                        tracing::warn!(
                            "Subcommand '{}' must be named 'parent.child', skipped",
                            descriptor.name
                        );
                        continue;
                    };
                    let Some(route) = commands.routes.get_mut(parent) else {
                        tracing::warn!(
                            "Subcommand '{}' has no parent command '{}', skipped",
                            descriptor.name,
                            parent
                        );
                        continue;
                    };
                    let lower = child.to_lowercase();
                    if route.subcommands.iter().any(|s| s.name == lower) {
                        tracing::warn!(
                            "Duplicate subcommand '{}' for '{}', the first one wins",
                            lower,
                            parent
                        );
                    }
                    route.subcommands.push(SubcommandRoute {
                        name: lower,
                        declared: child.to_string(),
                        capability: descriptor.name.clone(),
                        handler: handler.clone(),
                    });
                }
                CapabilitySpec::TabCompleter { handler } => {
                    let Some(route) = commands.routes.get_mut(&descriptor.name) else {
                        tracing::warn!("Tab completer for unknown command '{}'", descriptor.name);
                        continue;
                    };
                    if route.completer.is_some() {
                        tracing::warn!(
                            "Duplicate tab completer for '{}', keeping the first",
                            descriptor.name
                        );
                        continue;
                    }
                    route.completer = Some(handler.clone());
                }
                _ => {}
            }
        }

        commands
    }

    pub fn get(&self, name: &str) -> Option<&CommandRoute> {
        self.routes.get(name)
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &CommandRoute> {
        self.order.iter().filter_map(|name| self.routes.get(name))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
