//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SCHEDULER__TICK_MILLIS=20`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::menu::item::DEFAULT_FILLER;
use crate::scheduler::DEFAULT_TICK_MILLIS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub scheduler: SchedulerSection,
    pub cooldown: CooldownSection,
    pub lang: LangSection,
    pub menu: MenuSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [scheduler] 段：一个宿主 tick 的时长
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
        }
    }
}

/// [cooldown] 段：过期冷却记录的定期清理；interval 为 0 时不清理
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownSection {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// 早于该时长的记录视为过期（应不小于最长的冷却时长）
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_age_secs() -> u64 {
    3600
}

impl Default for CooldownSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// [lang] 段：语言目录为空时只使用内置 en 消息
#[derive(Debug, Clone, Deserialize)]
pub struct LangSection {
    pub folder: Option<PathBuf>,
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for LangSection {
    fn default() -> Self {
        Self {
            folder: None,
            default_language: default_language(),
        }
    }
}

/// [menu] 段：未知材质的回退填充物
#[derive(Debug, Clone, Deserialize)]
pub struct MenuSection {
    #[serde(default = "default_fallback_material")]
    pub fallback_material: String,
    /// 额外识别的材质名
    #[serde(default)]
    pub extra_materials: Vec<String>,
}

fn default_fallback_material() -> String {
    DEFAULT_FILLER.to_string()
}

impl Default for MenuSection {
    fn default() -> Self {
        Self {
            fallback_material: default_fallback_material(),
            extra_materials: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（热重载时由调用方决定如何应用新配置）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
