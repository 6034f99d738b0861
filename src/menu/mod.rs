//! 交互菜单：描述符、物品小语言、会话状态机
//!
//! 菜单表在注册阶段从能力表一次性构建，之后只读；热重载时整表替换。

pub mod item;
pub mod session;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::capability::{ButtonAction, CapabilitySpec, CapabilityTable, CloseHandler};

pub use item::{ItemDescription, ItemRenderer, ItemStack, MaterialCatalog};
pub use session::{ClickEvent, ClickOutcome, MenuSession, SessionManager};

/// 每行槽位数
pub const SLOTS_PER_ROW: usize = 9;
/// 宿主网格界面的最大行数
pub const MAX_ROWS: usize = 6;

/// 按钮声明
#[derive(Clone)]
pub struct ButtonDescriptor {
    pub slot: usize,
    /// 物品描述小语言
    pub item: String,
    /// 日志中使用的能力名
    pub capability: String,
    pub action: ButtonAction,
}

#[derive(Clone)]
pub struct CloseHook {
    pub capability: String,
    pub handler: CloseHandler,
}

/// 菜单描述符（注册后不可变）
#[derive(Clone)]
pub struct MenuDescriptor {
    pub id: String,
    /// 标题模板（经文本格式化后展示）
    pub title: String,
    pub rows: usize,
    pub buttons: BTreeMap<usize, ButtonDescriptor>,
    pub close_hook: Option<CloseHook>,
}

impl MenuDescriptor {
    /// 槽位空间大小 rows * 9
    pub fn size(&self) -> usize {
        self.rows * SLOTS_PER_ROW
    }
}

/// 菜单 ID → 描述符
pub type MenuTable = HashMap<String, Arc<MenuDescriptor>>;

/// 从能力表构建菜单表
///
/// - 重复的菜单 ID 保留第一个
/// - 同一槽位重复注册按钮时后注册的覆盖先注册的
/// - 指向未知菜单或越界槽位的按钮、钩子被丢弃并告警
pub fn build_menu_table(table: &CapabilityTable) -> MenuTable {
    let mut menus: HashMap<String, MenuDescriptor> = HashMap::new();

    for descriptor in table {
        if let CapabilitySpec::Menu { title, rows } = &descriptor.spec {
            if menus.contains_key(&descriptor.name) {
                tracing::warn!(
                    "Duplicate menu '{}', keeping the first registration",
                    descriptor.name
                );
                continue;
            }
            let clamped = (*rows).clamp(1, MAX_ROWS);
            if clamped != *rows {
                tracing::warn!(
                    "Menu '{}' declares {} rows, clamped to {}",
                    descriptor.name,
                    rows,
                    clamped
                );
            }
            menus.insert(
                descriptor.name.clone(),
                MenuDescriptor {
                    id: descriptor.name.clone(),
                    title: title.clone(),
                    rows: clamped,
                    buttons: BTreeMap::new(),
                    close_hook: None,
                },
            );
        }
    }

    for descriptor in table {
        match &descriptor.spec {
            CapabilitySpec::Button {
                menu,
                slot,
                item,
                action,
            } => {
                let Some(target) = menus.get_mut(menu) else {
                    tracing::warn!("Button '{}' targets unknown menu '{}'", descriptor.name, menu);
                    continue;
                };
                if *slot >= target.size() {
                    tracing::warn!(
                        "Button '{}' slot {} is outside menu '{}' ({} slots)",
                        descriptor.name,
                        slot,
                        menu,
                        target.size()
                    );
                    continue;
                }
                let button = ButtonDescriptor {
                    slot: *slot,
                    item: item.clone(),
                    capability: descriptor.name.clone(),
                    action: action.clone(),
                };
                if target.buttons.insert(*slot, button).is_some() {
                    tracing::debug!("Button slot {} of menu '{}' overwritten", slot, menu);
                }
            }
            CapabilitySpec::CloseHook { menu, handler } => {
                let Some(target) = menus.get_mut(menu) else {
                    tracing::warn!(
                        "Close hook '{}' targets unknown menu '{}'",
                        descriptor.name,
                        menu
                    );
                    continue;
                };
                target.close_hook = Some(CloseHook {
                    capability: descriptor.name.clone(),
                    handler: Arc::clone(handler),
                });
            }
            _ => {}
        }
    }

    menus
        .into_iter()
        .map(|(id, menu)| {
            tracing::info!("Registered menu: {} ({} buttons)", menu.title, menu.buttons.len());
            (id, Arc::new(menu))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityDescriptor;

    #[test]
    fn test_build_menu_table() {
        let table = CapabilityTable::new()
            .with(CapabilityDescriptor::menu("shop", "<gold>Shop", 2))
            .with(CapabilityDescriptor::button("shop", 0, "EMERALD", |_| Ok(())))
            .with(CapabilityDescriptor::button("shop", 0, "DIAMOND", |_| Ok(())))
            .with(CapabilityDescriptor::button("shop", 18, "STONE", |_| Ok(())))
            .with(CapabilityDescriptor::button("missing", 1, "STONE", |_| Ok(())))
            .with(CapabilityDescriptor::close_hook("shop", |_| Ok(())));

        let menus = build_menu_table(&table);
        assert_eq!(menus.len(), 1);
        let shop = &menus["shop"];
        assert_eq!(shop.size(), 18);
        assert_eq!(shop.buttons.len(), 1);
        // 同槽位后注册的覆盖
        assert_eq!(shop.buttons[&0].item, "DIAMOND");
        assert!(shop.close_hook.is_some());
    }

    #[test]
    fn test_rows_are_clamped() {
        let table = CapabilityTable::new()
            .with(CapabilityDescriptor::menu("big", "Big", 10))
            .with(CapabilityDescriptor::menu("none", "None", 0))
            .with(CapabilityDescriptor::menu("big", "Duplicate", 1));
        let menus = build_menu_table(&table);
        assert_eq!(menus["big"].rows, MAX_ROWS);
        assert_eq!(menus["big"].title, "Big");
        assert_eq!(menus["none"].rows, 1);
    }
}
