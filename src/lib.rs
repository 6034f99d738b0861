//! Hive - 声明式能力分发运行时
//!
//! 第三方作者以元数据声明能力（命令、子命令、补全、菜单与按钮、定时任务、事件反应），
//! 运行时在启动时接收完成的能力表，构建路由表，然后把宿主投递的触发分发到对应处理器，
//! 并统一执行权限、冷却与失败隔离。
//!
//! 模块划分：
//! - **capability**: 能力描述与能力表
//! - **command**: 命令路由与 Tab 补全
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **cooldown**: 按 (桶, 行为者) 的冷却追踪
//! - **core**: 分发组合根、错误、失败隔离、优雅关闭
//! - **events**: 事件反应（优先级与取消过滤）
//! - **host**: 宿主协作者接口与 Mock 实现
//! - **lang**: 本地化消息
//! - **menu**: 交互菜单、物品小语言与会话状态机
//! - **scheduler**: 定时任务适配与主执行上下文
//! - **text**: 默认文本格式化

pub mod capability;
pub mod command;
pub mod config;
pub mod cooldown;
pub mod core;
pub mod events;
pub mod host;
pub mod lang;
pub mod menu;
pub mod observability;
pub mod scheduler;
pub mod text;

pub use capability::{
    CapabilityDescriptor, CapabilityKind, CapabilityTable, CommandMeta, CooldownSpec, ScheduleSpec,
};
pub use command::{Disposition, RouteOutcome};
pub use crate::core::{Collaborators, DispatchError, Dispatcher};
