//! Hive 控制台宿主
//!
//! 从标准输入读取触发并投递到主执行上下文，演示完整的分发流程：
//!
//! ```text
//! /heal              执行命令（/shop buy 42 走子命令）
//! tab shop b         Tab 补全
//! open shop          打开菜单
//! click 11           点击当前菜单的槽位
//! close              关闭当前菜单
//! event join         投递事件
//! quit               退出
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use hive::capability::{
    CapabilityDescriptor, CapabilityTable, CommandMeta, CooldownSpec, ScheduleSpec,
};
use hive::config::load_config;
use hive::core::shutdown::run_with_graceful_shutdown;
use hive::core::{
    Collaborators, DispatcherCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
use hive::events::{EventPriority, HostEvent};
use hive::host::{ActorId, CommandHost, CommandRegistration, CommandSender, SurfaceId, UiHost};
use hive::lang::MENU_NOT_FOUND;
use hive::menu::{ClickEvent, ItemStack};
use hive::{observability, Dispatcher, RouteOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

/// 控制台宿主：把界面与命令声明打印到标准输出
#[derive(Default)]
struct ConsoleHost {
    shown: Mutex<HashMap<ActorId, SurfaceId>>,
}

impl ConsoleHost {
    fn shown_to(&self, actor: ActorId) -> Option<SurfaceId> {
        self.shown.lock().ok().and_then(|s| s.get(&actor).copied())
    }
}

impl CommandHost for ConsoleHost {
    fn declare(&self, registration: &CommandRegistration) -> bool {
        println!(
            "[host] command /{} {}",
            registration.name,
            registration.usage.as_deref().unwrap_or("")
        );
        true
    }
}

impl UiHost for ConsoleHost {
    fn create_surface(&self, size: usize, title: &str) -> SurfaceId {
        let id = SurfaceId::new();
        println!("[ui] {} ({} slots)", title, size);
        id
    }

    fn set_item(&self, _surface: SurfaceId, slot: usize, item: ItemStack) {
        println!(
            "[ui]   slot {:>2}: {} {}",
            slot,
            item.material,
            item.display_name.unwrap_or_default()
        );
    }

    fn show(&self, actor: ActorId, surface: SurfaceId) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.insert(actor, surface);
        }
    }

    fn close(&self, actor: ActorId) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.remove(&actor);
        }
    }
}

/// 控制台玩家：固定行为者 ID，拥有全部权限
struct ConsolePlayer {
    actor: ActorId,
}

impl CommandSender for ConsolePlayer {
    fn actor_id(&self) -> Option<ActorId> {
        Some(self.actor)
    }

    fn name(&self) -> &str {
        "console-player"
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }

    fn send_message(&self, text: &str) {
        println!("{}", text);
    }
}

fn sample_capabilities() -> CapabilityTable {
    let balance = Arc::new(Mutex::new(100u64));
    let buy_balance = Arc::clone(&balance);
    let bal_balance = Arc::clone(&balance);

    CapabilityTable::new()
        .with(CapabilityDescriptor::command(
            "heal",
            CommandMeta::new()
                .usage("/heal")
                .description("Restore health")
                .cooldown(CooldownSpec::seconds(10)),
            |sender, _| {
                sender.send_message("You have been healed.");
                Ok(())
            },
        ))
        .with(CapabilityDescriptor::command(
            "shop",
            CommandMeta::new().alias("store").usage("/shop <buy|balance>"),
            |sender, _| {
                sender.send_message("Usage: /shop <buy|balance>");
                Ok(())
            },
        ))
        .with(CapabilityDescriptor::subcommand("shop.buy", move |sender, args| {
            let cost: u64 = args
                .first()
                .context("missing amount")?
                .parse()
                .context("amount must be a number")?;
            let mut balance = buy_balance
                .lock()
                .map_err(|_| anyhow::anyhow!("balance lock poisoned"))?;
            anyhow::ensure!(*balance >= cost, "insufficient balance");
            *balance -= cost;
            sender.send_message(&format!("Bought for {cost}, {} left.", *balance));
            Ok(())
        }))
        .with(CapabilityDescriptor::subcommand("shop.balance", move |sender, _| {
            let balance = bal_balance.lock().map_err(|_| anyhow::anyhow!("balance lock poisoned"))?;
            sender.send_message(&format!("Balance: {}", *balance));
            Ok(())
        }))
        .with(CapabilityDescriptor::menu("shop", "<gold>Shop", 3))
        .with(CapabilityDescriptor::button(
            "shop",
            11,
            "DIAMOND_SWORD{name='<aqua>Sword',lore=['<gray>Costs 50']}",
            |actor| {
                println!("{actor} clicked the sword");
                Ok(())
            },
        ))
        .with(CapabilityDescriptor::button_with_event(
            "shop",
            15,
            "GOLDEN_APPLE{name='<gold>Apple'}",
            |actor, event| {
                println!("{actor} clicked slot {} ({})", event.slot, event.payload);
                Ok(())
            },
        ))
        .with(CapabilityDescriptor::close_hook("shop", |actor| {
            println!("{actor} left the shop");
            Ok(())
        }))
        .with(CapabilityDescriptor::event_listener(
            "welcome",
            "join",
            EventPriority::Normal,
            true,
            |event| {
                println!("Welcome! ({})", event.payload);
                Ok(())
            },
        ))
        .with(CapabilityDescriptor::task(
            "heartbeat",
            ScheduleSpec::repeating(20, 600).asynchronous(),
            || {
                tracing::debug!("heartbeat");
                Ok(())
            },
        ))
}

/// 解析并投递一行输入；返回 false 表示退出
async fn handle_line(
    dispatcher: &Arc<Dispatcher>,
    host: &Arc<ConsoleHost>,
    actor: ActorId,
    line: &str,
) -> bool {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return true;
    };
    let rest: Vec<String> = words.map(str::to_string).collect();
    let d = Arc::clone(dispatcher);
    let primary = dispatcher.primary().clone();

    let reply = match head {
        "quit" | "exit" => return false,
        cmd if cmd.starts_with('/') => {
            let name = cmd.trim_start_matches('/').to_string();
            primary
                .run(move || {
                    let player = ConsolePlayer { actor };
                    match d.route(&player, &name, &rest) {
                        RouteOutcome::NotFound => format!("Unknown command: /{name}"),
                        RouteOutcome::Handled(disposition) => format!("-> {disposition:?}"),
                    }
                })
                .await
        }
        "tab" => {
            let Some((name, args)) = rest.split_first() else {
                return true;
            };
            let (name, args) = (name.clone(), args.to_vec());
            primary
                .run(move || format!("{:?}", d.complete(&name, &args)))
                .await
        }
        "open" => {
            let Some(menu) = rest.first().cloned() else {
                return true;
            };
            primary
                .run(move || match d.open_menu(actor, &menu) {
                    Ok(surface) => format!("-> opened {surface}"),
                    Err(_) => d.message(Some(actor), MENU_NOT_FOUND, &[]),
                })
                .await
        }
        "click" => {
            let (Some(surface), Some(slot)) = (
                host.shown_to(actor),
                rest.first().and_then(|s| s.parse::<usize>().ok()),
            ) else {
                return true;
            };
            primary
                .run(move || {
                    let mut event = ClickEvent::new(surface, actor, slot)
                        .with_payload(serde_json::json!({ "click": "left" }));
                    format!("-> {:?}", d.on_click(&mut event))
                })
                .await
        }
        "close" => {
            let Some(surface) = host.shown_to(actor) else {
                return true;
            };
            // 控制台直接投递宿主关闭事件
            primary
                .run(move || {
                    d.close_menu(actor);
                    format!("-> closed: {}", d.on_close(actor, surface))
                })
                .await
        }
        "event" => {
            let Some(kind) = rest.first().cloned() else {
                return true;
            };
            primary
                .run(move || {
                    let mut event = HostEvent::new(kind)
                        .with_actor(actor)
                        .with_payload(serde_json::json!({ "source": "console" }));
                    format!("-> {} listeners", d.dispatch_event(&mut event))
                })
                .await
        }
        other => Some(format!("Unknown input: {other}")),
    };

    if let Some(reply) = reply {
        println!("{reply}");
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let host = Arc::new(ConsoleHost::default());
    let collaborators = Collaborators::with_defaults(host.clone(), host.clone(), &config)
        .context("Failed to prepare collaborators")?;
    let dispatcher = Arc::new(
        Dispatcher::bootstrap(&sample_capabilities(), collaborators, &config)
            .context("Failed to bootstrap dispatcher")?,
    );
    tracing::info!(
        "{} started, type 'quit' to exit",
        config.app.name.as_deref().unwrap_or("hive")
    );

    let manager = Arc::new(ShutdownManager::new());
    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&manager));
    coordinator.register(DispatcherCleanup::new(Arc::clone(&dispatcher)));

    let app_manager = Arc::clone(&manager);
    let app = async move {
        let actor = ActorId::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !handle_line(&dispatcher, &host, actor, line.trim()).await {
                        app_manager.shutdown(ShutdownReason::UserInitiated);
                        break;
                    }
                }
                Ok(None) => {
                    app_manager.shutdown(ShutdownReason::HostDisconnected);
                    break;
                }
                Err(e) => {
                    app_manager.shutdown(ShutdownReason::FatalError(e.to_string()));
                    break;
                }
            }
        }
    };

    let mut reasons = manager.subscribe();
    run_with_graceful_shutdown(Arc::clone(&manager), app, || coordinator.run_cleanup()).await;
    if let Ok(reason) = reasons.try_recv() {
        tracing::info!("Shutdown reason: {:?}", reason);
    }
    Ok(())
}
