//! 默认文本格式化：把标签式标记（`<red>`、`<gradient:#f00:#0f0>`）与旧式 `&` 颜色码剥离为纯文本
//!
//! 真正的富文本渲染由宿主负责；这里只保证玩家可见文本不会带出原始标记。

use regex::Regex;

use crate::host::TextFormatter;

/// 剥离标记的格式化器
#[derive(Debug, Clone)]
pub struct MarkupFormatter {
    tags: Regex,
    legacy: Regex,
}

impl MarkupFormatter {
    pub fn new() -> Self {
        Self {
            tags: Regex::new(r"</?[a-zA-Z_#!][^<>]*>").expect("valid tag regex"),
            legacy: Regex::new(r"[&§](?:#[0-9a-fA-F]{6}|[0-9a-fA-Fk-oK-OrR])")
                .expect("valid legacy regex"),
        }
    }
}

impl Default for MarkupFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFormatter for MarkupFormatter {
    fn format(&self, markup: &str) -> String {
        // 与常见宿主一致：含 & 时按旧式颜色码处理，否则按标签处理
        if markup.contains('&') || markup.contains('§') {
            self.legacy.replace_all(markup, "").into_owned()
        } else {
            self.tags.replace_all(markup, "").into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        let f = MarkupFormatter::new();
        assert_eq!(f.format("<red>No permission!"), "No permission!");
        assert_eq!(
            f.format("<gradient:#00ff00:#00aa00>[Hive]</gradient> hi"),
            "[Hive] hi"
        );
        assert_eq!(f.format("a < b"), "a < b");
    }

    #[test]
    fn test_strips_legacy_codes() {
        let f = MarkupFormatter::new();
        assert_eq!(f.format("&aGreen &lbold"), "Green bold");
        assert_eq!(f.format("&#ff0000Red"), "Red");
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(MarkupFormatter::new().format("Sword"), "Sword");
    }
}
