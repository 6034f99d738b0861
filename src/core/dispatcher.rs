//! 分发核心：组合根
//!
//! 启动时从能力表构建命令 / 菜单 / 事件表并调度任务，之后把宿主投递的触发
//! （命令、补全、点击、关闭、事件）路由到对应组件。协作者通过 Collaborators 显式注入，
//! 没有全局单例。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;

use super::DispatchError;
use crate::capability::{CapabilityKind, CapabilityTable, ScheduleSpec};
use crate::command::{CommandRouter, CommandTable, RouteOutcome};
use crate::config::AppConfig;
use crate::cooldown::CooldownTracker;
use crate::events::{EventTable, HostEvent};
use crate::host::{
    ActorId, CommandHost, CommandSender, DiscoveryFeed, MessageResolver, SurfaceId, TextFormatter,
    UiHost,
};
use crate::lang::LanguageManager;
use crate::menu::{
    build_menu_table, ClickEvent, ClickOutcome, ItemRenderer, MaterialCatalog, MenuTable,
    SessionManager,
};
use crate::scheduler::{PrimaryContext, TaskScheduler};
use crate::text::MarkupFormatter;

/// 清理任务名
const SWEEP_TASK: &str = "cooldown-sweep";

/// 宿主提供的协作者
#[derive(Clone)]
pub struct Collaborators {
    pub command_host: Arc<dyn CommandHost>,
    pub ui: Arc<dyn UiHost>,
    pub formatter: Arc<dyn TextFormatter>,
    pub messages: Arc<dyn MessageResolver>,
}

impl Collaborators {
    /// 默认格式化器与按配置加载的语言文件
    pub fn with_defaults(
        command_host: Arc<dyn CommandHost>,
        ui: Arc<dyn UiHost>,
        config: &AppConfig,
    ) -> Result<Self, DispatchError> {
        let languages = match &config.lang.folder {
            Some(folder) => LanguageManager::load(folder, &config.lang.default_language)?,
            None => {
                let mut builtin = LanguageManager::builtin();
                if !builtin.set_default_language(&config.lang.default_language) {
                    tracing::warn!(
                        "Default language '{}' has no built-in messages, using 'en'",
                        config.lang.default_language
                    );
                }
                builtin
            }
        };
        Ok(Self {
            command_host,
            ui,
            formatter: Arc::new(MarkupFormatter::new()),
            messages: Arc::new(languages),
        })
    }
}

/// 分发器
pub struct Dispatcher {
    config: AppConfig,
    collaborators: Collaborators,
    cooldowns: Arc<CooldownTracker>,
    router: CommandRouter,
    menus: ArcSwap<MenuTable>,
    events: ArcSwap<EventTable>,
    sessions: SessionManager,
    scheduler: TaskScheduler,
    primary_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// 启动：读取能力表、构建路由、声明命令并调度任务。必须在 tokio 运行时内调用。
    ///
    /// 宿主没有提供能力表时返回 NoCapabilityTable（唯一的致命错误）。
    pub fn bootstrap(
        feed: &dyn DiscoveryFeed,
        collaborators: Collaborators,
        config: &AppConfig,
    ) -> Result<Self, DispatchError> {
        let table = feed.load().ok_or(DispatchError::NoCapabilityTable)?;

        let cooldowns = Arc::new(CooldownTracker::new());
        let router = CommandRouter::new(
            CommandTable::build(&table),
            Arc::clone(&cooldowns),
            Arc::clone(&collaborators.messages),
            Arc::clone(&collaborators.formatter),
        );
        let catalog = MaterialCatalog::new(config.menu.fallback_material.as_str())
            .with_materials(&config.menu.extra_materials);
        let renderer = ItemRenderer::new(catalog, Arc::clone(&collaborators.formatter));
        let sessions = SessionManager::new(
            Arc::clone(&collaborators.ui),
            Arc::clone(&collaborators.formatter),
            renderer,
        );
        let (primary, primary_loop) = PrimaryContext::spawn();
        let scheduler = TaskScheduler::new(primary, config.scheduler.tick_millis);

        let dispatcher = Self {
            config: config.clone(),
            cooldowns,
            router,
            menus: ArcSwap::from_pointee(build_menu_table(&table)),
            events: ArcSwap::from_pointee(EventTable::build(&table)),
            sessions,
            scheduler,
            primary_loop: Mutex::new(Some(primary_loop)),
            collaborators,
        };

        dispatcher.router.declare_all(dispatcher.collaborators.command_host.as_ref());
        dispatcher.start_tasks(&table);
        tracing::info!(
            "Dispatcher ready: {} capabilities, {} commands, {} menus",
            table.len(),
            dispatcher.router.table().len(),
            dispatcher.menus.load().len()
        );
        Ok(dispatcher)
    }

    fn start_tasks(&self, table: &CapabilityTable) {
        self.scheduler.schedule_all(table);
        self.schedule_sweep();
    }

    /// 定期清理过期冷却记录
    fn schedule_sweep(&self) {
        let section = &self.config.cooldown;
        if section.sweep_interval_secs == 0 {
            return;
        }
        let tick_millis = self.scheduler.tick().as_millis().max(1) as u64;
        let period = section
            .sweep_interval_secs
            .saturating_mul(1000)
            .div_ceil(tick_millis)
            .clamp(1, i64::MAX as u64);
        let max_age = Duration::from_secs(section.max_age_secs);
        let cooldowns = Arc::clone(&self.cooldowns);
        self.scheduler.schedule(
            SWEEP_TASK,
            Arc::new(move || {
                cooldowns.sweep(max_age);
                Ok(())
            }),
            ScheduleSpec::repeating(period, period as i64).asynchronous(),
        );
    }

    pub fn route(&self, sender: &dyn CommandSender, name: &str, args: &[String]) -> RouteOutcome {
        self.router.route(sender, name, args)
    }

    pub fn complete(&self, name: &str, args: &[String]) -> Vec<String> {
        self.router.complete(name, args)
    }

    /// 为行为者打开菜单；未注册的菜单 ID 返回 NotRegistered，状态不变
    pub fn open_menu(&self, actor: ActorId, menu_id: &str) -> Result<SurfaceId, DispatchError> {
        let descriptor = self.menus.load().get(menu_id).cloned();
        match descriptor {
            Some(descriptor) => Ok(self.sessions.open(actor, descriptor)),
            None => {
                let err = DispatchError::NotRegistered {
                    kind: CapabilityKind::Menu,
                    name: menu_id.to_string(),
                };
                tracing::warn!("{}", err);
                Err(err)
            }
        }
    }

    pub fn close_menu(&self, actor: ActorId) {
        self.sessions.close(actor);
    }

    pub fn on_click(&self, event: &mut ClickEvent) -> ClickOutcome {
        self.sessions.on_click(event)
    }

    /// 宿主的关闭事件；返回是否结束了一个会话
    pub fn on_close(&self, actor: ActorId, surface: SurfaceId) -> bool {
        self.sessions.on_close(actor, surface).is_some()
    }

    pub fn dispatch_event(&self, event: &mut HostEvent) -> usize {
        self.events.load().dispatch(event)
    }

    /// 解析并格式化一条本地化消息
    pub fn message(
        &self,
        actor: Option<ActorId>,
        key: &str,
        replacements: &[(&str, &str)],
    ) -> String {
        let text = self.collaborators.messages.resolve(actor, key, replacements);
        self.collaborators.formatter.format(&text)
    }

    /// 热重载：整表替换路由 / 菜单 / 事件表，重新声明命令并重新调度任务。
    /// 已打开的会话继续使用旧描述符直到关闭。
    pub fn reload(&self, table: CapabilityTable) {
        self.router.replace(CommandTable::build(&table));
        self.menus.store(Arc::new(build_menu_table(&table)));
        self.events.store(Arc::new(EventTable::build(&table)));
        self.router.declare_all(self.collaborators.command_host.as_ref());
        self.scheduler.cancel_all();
        self.start_tasks(&table);
        tracing::info!("Reloaded {} capabilities", table.len());
    }

    /// 关闭：先取消全部任务，再丢弃会话（不触发关闭钩子）。可重复调用。
    pub fn shutdown(&self) {
        let tasks = self.scheduler.cancel_all();
        let sessions = self.sessions.discard_all();
        let primary_loop = self
            .primary_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = primary_loop {
            handle.abort();
            tracing::info!(
                "Dispatcher shut down: {} tasks cancelled, {} sessions discarded",
                tasks,
                sessions
            );
        }
    }

    pub fn primary(&self) -> &PrimaryContext {
        self.scheduler.primary()
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::capability::{CapabilityDescriptor, CommandMeta};
    use crate::command::Disposition;
    use crate::host::{MockHost, MockSender};
    use crate::lang::MENU_NOT_FOUND;

    struct EmptyFeed;

    impl DiscoveryFeed for EmptyFeed {
        fn load(&self) -> Option<CapabilityTable> {
            None
        }
    }

    fn collaborators(host: &Arc<MockHost>) -> Collaborators {
        Collaborators::with_defaults(host.clone(), host.clone(), &AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_table_is_fatal() {
        let host = Arc::new(MockHost::new());
        let result = Dispatcher::bootstrap(&EmptyFeed, collaborators(&host), &AppConfig::default());
        assert!(matches!(result, Err(DispatchError::NoCapabilityTable)));
    }

    #[tokio::test]
    async fn test_huge_sweep_interval_does_not_overflow() {
        let host = Arc::new(MockHost::new());
        let mut config = AppConfig::default();
        config.cooldown.sweep_interval_secs = u64::MAX;
        let table = CapabilityTable::new();
        let dispatcher = Dispatcher::bootstrap(&table, collaborators(&host), &config).unwrap();
        assert_eq!(dispatcher.scheduler().active_count(), 1);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn test_open_unknown_menu() {
        let host = Arc::new(MockHost::new());
        let table = CapabilityTable::new();
        let dispatcher =
            Dispatcher::bootstrap(&table, collaborators(&host), &AppConfig::default()).unwrap();
        let actor = ActorId::new();
        let err = dispatcher.open_menu(actor, "ghost").unwrap_err();
        assert!(matches!(err, DispatchError::NotRegistered { kind: CapabilityKind::Menu, .. }));
        assert_eq!(dispatcher.sessions().active_count(), 0);
        assert_eq!(host.surface_count(), 0);
        assert_eq!(
            dispatcher.message(Some(actor), MENU_NOT_FOUND, &[]),
            "That menu is not available."
        );
    }

    #[tokio::test]
    async fn test_reload_swaps_tables() {
        let host = Arc::new(MockHost::new());
        let v1 = CapabilityTable::new()
            .with(CapabilityDescriptor::command("old", CommandMeta::new(), |_, _| Ok(())))
            .with(CapabilityDescriptor::menu("main", "Main", 1));
        let dispatcher =
            Dispatcher::bootstrap(&v1, collaborators(&host), &AppConfig::default()).unwrap();
        let sender = MockSender::console();
        assert!(dispatcher.route(&sender, "old", &[]).is_handled());
        // 只有冷却清理任务
        assert_eq!(dispatcher.scheduler().active_count(), 1);

        let v2 = CapabilityTable::new()
            .with(CapabilityDescriptor::command("new", CommandMeta::new(), |_, _| Ok(())))
            .with(CapabilityDescriptor::task("tick", ScheduleSpec::repeating(100, 100), || Ok(())));
        dispatcher.reload(v2);

        assert_eq!(dispatcher.route(&sender, "old", &[]), RouteOutcome::NotFound);
        assert_eq!(
            dispatcher.route(&sender, "new", &[]),
            RouteOutcome::Handled(Disposition::Executed)
        );
        assert!(dispatcher.open_menu(ActorId::new(), "main").is_err());
        assert_eq!(dispatcher.scheduler().active_count(), 2);
        assert_eq!(host.declared().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let host = Arc::new(MockHost::new());
        let closes = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&closes);
        let table = CapabilityTable::new()
            .with(CapabilityDescriptor::menu("main", "Main", 1))
            .with(CapabilityDescriptor::close_hook("main", move |_| {
                hook.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with(CapabilityDescriptor::task("t", ScheduleSpec::repeating(1, 1), || Ok(())));
        let dispatcher =
            Dispatcher::bootstrap(&table, collaborators(&host), &AppConfig::default()).unwrap();
        dispatcher.open_menu(ActorId::new(), "main").unwrap();

        dispatcher.shutdown();
        dispatcher.shutdown();
        assert_eq!(dispatcher.scheduler().active_count(), 0);
        assert_eq!(dispatcher.sessions().active_count(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }
}
