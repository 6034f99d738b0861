//! 本地化消息
//!
//! 从语言目录加载 `<code>.toml`（目录不存在时创建并写入默认 en），支持按行为者选择语言、
//! `%placeholder%` 替换；查找顺序：行为者语言 → 默认语言 → 原始 key。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;

use crate::host::{ActorId, MessageResolver};

pub const NO_PERMISSION: &str = "no-permission";
pub const ON_COOLDOWN: &str = "on-cooldown";
pub const MENU_NOT_FOUND: &str = "menu-not-found";

/// 内置 en 消息（语言目录缺失 en 时也会使用）
fn builtin_english() -> HashMap<String, String> {
    [
        (NO_PERMISSION, "<red>You don't have permission to use this command!"),
        (ON_COOLDOWN, "<red>Please wait %time%s before using this again."),
        (MENU_NOT_FOUND, "<red>That menu is not available."),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Error, Debug)]
pub enum LangError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse language file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize default language file: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// 语言管理器
#[derive(Debug)]
pub struct LanguageManager {
    languages: HashMap<String, HashMap<String, String>>,
    default_language: String,
    actor_languages: DashMap<ActorId, String>,
}

impl LanguageManager {
    /// 仅含内置 en 消息
    pub fn builtin() -> Self {
        let mut languages = HashMap::new();
        languages.insert("en".to_string(), builtin_english());
        Self {
            languages,
            default_language: "en".to_string(),
            actor_languages: DashMap::new(),
        }
    }

    /// 从目录加载所有 `*.toml` 语言文件
    pub fn load(folder: impl AsRef<Path>, default_language: &str) -> Result<Self, LangError> {
        let folder = folder.as_ref();
        if !folder.exists() {
            std::fs::create_dir_all(folder).map_err(|source| LangError::Io {
                path: folder.to_path_buf(),
                source,
            })?;
            write_default_file(folder)?;
        }

        let entries = std::fs::read_dir(folder).map_err(|source| LangError::Io {
            path: folder.to_path_buf(),
            source,
        })?;

        let mut languages = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(code) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|source| LangError::Io {
                path: path.clone(),
                source,
            })?;
            let table: toml::Table = toml::from_str(&content).map_err(|source| LangError::Parse {
                path: path.clone(),
                source,
            })?;
            let mut messages = HashMap::new();
            flatten_into(&mut messages, "", &toml::Value::Table(table));
            tracing::info!("Loaded language: {}", code);
            languages.insert(code, messages);
        }

        if !languages.contains_key("en") {
            tracing::warn!("No English language file found, using defaults");
            languages.insert("en".to_string(), builtin_english());
        }

        let mut manager = Self {
            languages,
            default_language: "en".to_string(),
            actor_languages: DashMap::new(),
        };
        if !manager.set_default_language(default_language) {
            tracing::warn!(
                "Default language '{}' not available, keeping 'en'",
                default_language
            );
        }
        Ok(manager)
    }

    /// 只接受已加载的语言
    pub fn set_default_language(&mut self, language: &str) -> bool {
        if self.languages.contains_key(language) {
            self.default_language = language.to_string();
            true
        } else {
            false
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// 设置行为者语言；未加载的语言被忽略
    pub fn set_actor_language(&self, actor: ActorId, language: &str) -> bool {
        if self.languages.contains_key(language) {
            self.actor_languages.insert(actor, language.to_string());
            true
        } else {
            false
        }
    }

    pub fn actor_language(&self, actor: ActorId) -> String {
        self.actor_languages
            .get(&actor)
            .map(|l| l.value().clone())
            .unwrap_or_else(|| self.default_language.clone())
    }

    pub fn available_languages(&self) -> Vec<String> {
        let mut codes: Vec<_> = self.languages.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// 按语言取原始消息，找不到时依次回退到默认语言与 key 本身
    pub fn message(&self, key: &str, language: &str) -> String {
        self.languages
            .get(language)
            .and_then(|m| m.get(key))
            .or_else(|| {
                self.languages
                    .get(&self.default_language)
                    .and_then(|m| m.get(key))
            })
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for LanguageManager {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MessageResolver for LanguageManager {
    fn resolve(&self, actor: Option<ActorId>, key: &str, replacements: &[(&str, &str)]) -> String {
        let language = match actor {
            Some(actor) => self.actor_language(actor),
            None => self.default_language.clone(),
        };
        let mut message = self.message(key, &language);
        for (placeholder, value) in replacements {
            message = message.replace(placeholder, value);
        }
        message
    }
}

fn write_default_file(folder: &Path) -> Result<(), LangError> {
    let path = folder.join("en.toml");
    let table: toml::Table = builtin_english()
        .into_iter()
        .map(|(k, v)| (k, toml::Value::String(v)))
        .collect();
    let content = toml::to_string(&table)?;
    std::fs::write(&path, content).map_err(|source| LangError::Io { path, source })
}

/// 嵌套表展平为点分 key
fn flatten_into(out: &mut HashMap<String, String>, prefix: &str, value: &toml::Value) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(out, &key, v);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolve_and_replacements() {
        let lang = LanguageManager::builtin();
        let text = lang.resolve(None, ON_COOLDOWN, &[("%time%", "7")]);
        assert_eq!(text, "<red>Please wait 7s before using this again.");
        assert_eq!(lang.resolve(None, "missing.key", &[]), "missing.key");
    }

    #[test]
    fn test_load_creates_default_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("lang");
        let lang = LanguageManager::load(&folder, "en").unwrap();
        assert!(folder.join("en.toml").exists());
        assert_eq!(
            lang.message(NO_PERMISSION, "en"),
            "<red>You don't have permission to use this command!"
        );
    }

    #[test]
    fn test_actor_language_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("en.toml"),
            "greeting = \"Hello %name%\"\nfarewell = \"Bye\"\n[shop]\ntitle = \"Shop\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("fr.toml"), "greeting = \"Bonjour %name%\"\n").unwrap();

        let lang = LanguageManager::load(dir.path(), "en").unwrap();
        assert_eq!(lang.available_languages(), vec!["en", "fr"]);

        let actor = ActorId::new();
        assert!(lang.set_actor_language(actor, "fr"));
        assert!(!lang.set_actor_language(actor, "de"));
        assert_eq!(lang.actor_language(actor), "fr");

        assert_eq!(lang.resolve(Some(actor), "greeting", &[("%name%", "Ana")]), "Bonjour Ana");
        // fr 缺失的 key 回退到默认语言
        assert_eq!(lang.resolve(Some(actor), "farewell", &[]), "Bye");
        assert_eq!(lang.resolve(Some(actor), "shop.title", &[]), "Shop");
        assert_eq!(lang.resolve(None, "greeting", &[("%name%", "Bo")]), "Hello Bo");
    }

    #[test]
    fn test_unknown_default_language_keeps_english() {
        let dir = tempfile::tempdir().unwrap();
        let lang = LanguageManager::load(dir.path(), "de").unwrap();
        assert_eq!(lang.default_language(), "en");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.toml"), "this is = = not toml").unwrap();
        assert!(matches!(
            LanguageManager::load(dir.path(), "en"),
            Err(LangError::Parse { .. })
        ));
    }
}
