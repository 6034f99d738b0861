//! 物品描述小语言与渲染
//!
//! 语法：`IDENT ['{' props '}']`，props 为逗号分隔的 `key='value'` 或 `key=['v1','v2']`。
//! 识别 `name` 与 `lore`，二者都经过文本格式化；未知材质回退为填充材质。
//! 格式错误的属性块不会报错，无法解析的 key 在结果中缺席。

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::host::TextFormatter;

pub const DEFAULT_FILLER: &str = "STONE";

const BUILTIN_MATERIALS: &[&str] = &[
    "AIR", "STONE", "GRASS_BLOCK", "DIRT", "COBBLESTONE", "OAK_PLANKS", "GLASS", "GLASS_PANE",
    "BLACK_STAINED_GLASS_PANE", "GRAY_STAINED_GLASS_PANE", "WHITE_STAINED_GLASS_PANE",
    "RED_STAINED_GLASS_PANE", "LIME_STAINED_GLASS_PANE", "CHEST", "ENDER_CHEST", "BARRIER",
    "BOOK", "WRITABLE_BOOK", "PAPER", "MAP", "COMPASS", "CLOCK", "ARROW", "BOW", "CROSSBOW",
    "WOODEN_SWORD", "STONE_SWORD", "IRON_SWORD", "GOLDEN_SWORD", "DIAMOND_SWORD",
    "NETHERITE_SWORD", "DIAMOND_PICKAXE", "DIAMOND_AXE", "DIAMOND_HELMET", "DIAMOND_CHESTPLATE",
    "SHIELD", "APPLE", "GOLDEN_APPLE", "BREAD", "COOKED_BEEF", "POTION", "EMERALD", "DIAMOND",
    "GOLD_INGOT", "IRON_INGOT", "NETHER_STAR", "PLAYER_HEAD", "OAK_SIGN", "LEVER",
    "REDSTONE", "TORCH", "ANVIL", "ENCHANTING_TABLE", "EXPERIENCE_BOTTLE", "FIREWORK_ROCKET",
];

/// 渲染后的具体物品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub material: String,
    pub display_name: Option<String>,
    pub lore: Vec<String>,
}

impl ItemStack {
    pub fn of(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            display_name: None,
            lore: Vec::new(),
        }
    }
}

/// 解析结果（未格式化）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDescription {
    pub material: String,
    pub name: Option<String>,
    pub lore: Option<Vec<String>>,
}

/// 材质目录：名称匹配忽略大小写，支持 `minecraft:` 前缀，空格与 `-` 视作 `_`
#[derive(Debug, Clone)]
pub struct MaterialCatalog {
    known: HashSet<String>,
    filler: String,
}

impl MaterialCatalog {
    pub fn new(filler: impl Into<String>) -> Self {
        let known = BUILTIN_MATERIALS.iter().map(|m| m.to_string()).collect();
        let mut catalog = Self {
            known,
            filler: DEFAULT_FILLER.to_string(),
        };
        let filler = normalize(&filler.into());
        catalog.known.insert(filler.clone());
        catalog.filler = filler;
        catalog
    }

    pub fn with_materials<I, S>(mut self, materials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known
            .extend(materials.into_iter().map(|m| normalize(m.as_ref())));
        self
    }

    pub fn filler(&self) -> &str {
        &self.filler
    }

    pub fn matches(&self, name: &str) -> Option<String> {
        let normalized = normalize(name);
        self.known.contains(&normalized).then_some(normalized)
    }

    /// 未知材质返回填充材质
    pub fn resolve(&self, name: &str) -> String {
        self.matches(name).unwrap_or_else(|| self.filler.clone())
    }
}

impl Default for MaterialCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FILLER)
    }
}

fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    let stripped = trimmed
        .get(..10)
        .filter(|p| p.eq_ignore_ascii_case("minecraft:"))
        .map(|_| &trimmed[10..])
        .unwrap_or(trimmed);
    stripped.to_ascii_uppercase().replace([' ', '-'], "_")
}

/// 物品渲染器：解析描述并通过格式化协作者生成 ItemStack
pub struct ItemRenderer {
    catalog: MaterialCatalog,
    formatter: Arc<dyn TextFormatter>,
    property: Regex,
    list_item: Regex,
}

impl ItemRenderer {
    pub fn new(catalog: MaterialCatalog, formatter: Arc<dyn TextFormatter>) -> Self {
        Self {
            catalog,
            formatter,
            property: Regex::new(concat!(
                r"(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*",
                r"(?:'(?P<value>[^']*)'|\[(?P<list>[^\]]*)\])",
            ))
            .expect("valid property regex"),
            list_item: Regex::new(r"'([^']*)'").expect("valid list regex"),
        }
    }

    pub fn catalog(&self) -> &MaterialCatalog {
        &self.catalog
    }

    /// 解析物品描述；永不失败
    pub fn parse(&self, description: &str) -> ItemDescription {
        let (ident, props) = match description.split_once('{') {
            Some((ident, rest)) => {
                let rest = rest.trim_end();
                (ident, rest.strip_suffix('}').unwrap_or(rest))
            }
            None => (description, ""),
        };

        let mut parsed = ItemDescription {
            material: ident.trim().to_string(),
            ..Default::default()
        };

        for caps in self.property.captures_iter(props) {
            match (&caps["key"], caps.name("value"), caps.name("list")) {
                ("name", Some(value), _) if parsed.name.is_none() => {
                    parsed.name = Some(value.as_str().to_string());
                }
                ("lore", _, Some(list)) if parsed.lore.is_none() => {
                    let lines = self
                        .list_item
                        .captures_iter(list.as_str())
                        .map(|c| c[1].to_string())
                        .collect();
                    parsed.lore = Some(lines);
                }
                ("lore", Some(value), _) if parsed.lore.is_none() => {
                    parsed.lore = Some(vec![value.as_str().to_string()]);
                }
                _ => {}
            }
        }
        parsed
    }

    pub fn render(&self, description: &str) -> ItemStack {
        let parsed = self.parse(description);
        ItemStack {
            material: self.catalog.resolve(&parsed.material),
            display_name: parsed.name.map(|n| self.formatter.format(&n)),
            lore: parsed
                .lore
                .unwrap_or_default()
                .iter()
                .map(|line| self.formatter.format(line))
                .collect(),
        }
    }
}
