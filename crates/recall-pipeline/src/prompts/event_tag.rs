use std::collections::HashSet;

use recall_core::project::EventTagDef;
use recall_core::types::{normalize_attribute, EventTag};

use super::{bullet_parts, Lang, SEP};

pub const PROMPT_ID: &str = "event_tagging";

const EN_PROMPT: &str = r#"You label a session record with tags. You are given the session's profile changes and summary, plus the list of allowed tags with their meanings.

## Allowed tags
{tags}

## Output format
One line per applicable tag:
- TAG{sep}VALUE
Only use tags from the allowed list. If no tag applies, return "NONE"."#;

const ZH_PROMPT: &str = r#"为一条会话记录打标签。给定会话的画像变更与总结，以及允许的标签列表和含义。

## 允许的标签
{tags}

## 输出格式
每个适用的标签一行：
- 标签{sep}值
只能使用允许列表中的标签。没有适用标签时返回 "NONE"。"#;

pub fn system_prompt(lang: Lang, tags: &[EventTagDef]) -> String {
    let rendered: Vec<String> = tags
        .iter()
        .map(|t| match &t.description {
            Some(d) => format!("- {}({d})", t.name),
            None => format!("- {}", t.name),
        })
        .collect();
    let template = match lang {
        Lang::En => EN_PROMPT,
        Lang::Zh => ZH_PROMPT,
    };
    template
        .replace("{tags}", &rendered.join("\n"))
        .replace("{sep}", SEP)
}

pub fn build_input(profile_delta: &str, event_summary: &str) -> String {
    format!("{profile_delta}\n\n{event_summary}")
}

/// Parse tag lines, dropping tags not declared in the project config.
pub fn parse_tags(response: &str, allowed: &[EventTagDef]) -> Vec<EventTag> {
    let allowed: HashSet<String> = allowed
        .iter()
        .map(|t| normalize_attribute(&t.name))
        .collect();
    response
        .lines()
        .filter_map(|line| bullet_parts(line, 2))
        .filter_map(|parts| {
            let tag = normalize_attribute(parts[0]);
            let value = parts[1].trim().to_string();
            if value.is_empty() || !allowed.contains(&tag) {
                return None;
            }
            Some(EventTag { tag, value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<EventTagDef> {
        vec![
            EventTagDef {
                name: "emotion".into(),
                description: Some("how the user felt".into()),
            },
            EventTagDef {
                name: "goal".into(),
                description: None,
            },
        ]
    }

    #[test]
    fn keeps_declared_tags_only() {
        let tags = parse_tags(
            "- emotion::stressed\n- romance::high\n- goal::find a job",
            &defs(),
        );
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag, "emotion");
        assert_eq!(tags[1].value, "find a job");
    }

    #[test]
    fn none_and_garbage_yield_empty() {
        assert!(parse_tags("NONE", &defs()).is_empty());
        assert!(parse_tags("emotion: stressed", &defs()).is_empty());
    }

    #[test]
    fn system_prompt_lists_tags() {
        let p = system_prompt(Lang::En, &defs());
        assert!(p.contains("- emotion(how the user felt)"));
        assert!(p.contains("- goal"));
    }
}
