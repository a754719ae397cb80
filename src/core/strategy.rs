//! 策略表：按消息类别切换提示词与工具子集
//!
//! 入口策略 triage 负责分诊（可直接回答，或移交专职策略）；
//! documentation / bug / feature_request 各持自己的提示词与工具白名单。
//! 移交由模型以 {"delegate": "<category>"} 表达，路由层校验后生效。

/// 一个策略：名称、system 提示词、允许的工具名（空表示注册表全部）
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: &'static str,
    pub prompt: &'static str,
    pub allowed_tools: &'static [&'static str],
}

const TRIAGE_PROMPT: &str = "\
You are a helpful assistant on a slack channel. You are a top-notch customer support agent.

Answer the user directly when you can. When the request needs a specialist, classify it \
into one of these categories and hand it off:

1. documentation - Questions about the product, different apis, or existing features.
2. bug - Issues with the product, different apis, or existing features.
3. feature_request - Suggestions for new features or improvements.

To hand off, reply with exactly one JSON object: {\"delegate\": \"<category>\"}.";

const DOCUMENTATION_PROMPT: &str = "\
You are a helpful assistant that searches for documentation relevant to a message from a \
slack channel. Use the search tool, then answer from what it returns.";

const BUG_PROMPT: &str = "\
You are a helpful assistant that files a bug report regarding a message from a slack \
channel. Collect title, description and severity from the message, file the report, then \
confirm to the user.";

const FEATURE_REQUEST_PROMPT: &str = "\
You are a helpful assistant that suggests a feature regarding a message from a slack \
channel. Turn the message into a feature request, create it, then confirm to the user.";

/// 内置策略表；首个条目为入口策略
#[derive(Debug, Clone)]
pub struct StrategyTable {
    entries: Vec<Strategy>,
}

impl StrategyTable {
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                Strategy {
                    name: "triage",
                    prompt: TRIAGE_PROMPT,
                    allowed_tools: &[],
                },
                Strategy {
                    name: "documentation",
                    prompt: DOCUMENTATION_PROMPT,
                    allowed_tools: &["search_docs"],
                },
                Strategy {
                    name: "bug",
                    prompt: BUG_PROMPT,
                    allowed_tools: &["file_bug_report"],
                },
                Strategy {
                    name: "feature_request",
                    prompt: FEATURE_REQUEST_PROMPT,
                    allowed_tools: &["create_feature_request"],
                },
            ],
        }
    }

    pub fn default_strategy(&self) -> &Strategy {
        &self.entries[0]
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.entries.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_is_entry_strategy() {
        let table = StrategyTable::builtin();
        assert_eq!(table.default_strategy().name, "triage");
        // 入口策略不限制工具
        assert!(table.default_strategy().allowed_tools.is_empty());
    }

    #[test]
    fn test_specialists_restrict_tools() {
        let table = StrategyTable::builtin();
        assert_eq!(table.get("bug").unwrap().allowed_tools, &["file_bug_report"]);
        assert!(table.get("nonexistent").is_none());
    }
}
