use recall_core::types::normalize_attribute;

use super::{bullet_parts, Lang, SEP};

pub const PROMPT_ID: &str = "extract_profile";

/// One atomic fact implied by the chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub topic: String,
    pub sub_topic: String,
    pub memo: String,
}

const EN_PROMPT: &str = r#"You carefully read conversations between a user and another party, then extract relevant, important facts and preferences about the user. Record both what is explicitly stated and what is clearly implied. Use the same language as the user's input.

## Topics to consider
{topics}
You can create your own topic/sub_topic if something valuable falls outside this list.

## Output format
Return the facts as a markdown list, one per line:
- TOPIC{sep}SUB_TOPIC{sep}MEMO
For example:
- basic_info{sep}name{sep}melinda
- work{sep}title{sep}software engineer

Remember:
- Today is {today}. Resolve relative dates against it.
- Place everything about one topic/sub_topic in a single line, no repeats.
- If the conversation contains nothing worth keeping, return "NONE".

## Topics the user already has
{already_topics}
Reuse the same topic/sub_topic when the conversation touches it again."#;

const ZH_PROMPT: &str = r#"你需要仔细阅读用户与对方的对话，提取与用户有关的重要事实和偏好，包括明确陈述的和明显暗示的内容。使用与用户输入相同的语言记录。

## 可参考的主题
{topics}
如果有价值的信息不在列表中，可以自行创建主题/子主题。

## 输出格式
以 markdown 列表返回，每行一条：
- 主题{sep}子主题{sep}备忘
例如：
- basic_info{sep}name{sep}melinda

注意：
- 今天是 {today}，相对时间请换算。
- 同一主题/子主题的内容合并到一行，不要重复。
- 如果对话中没有值得记录的内容，返回 "NONE"。

## 用户已有的主题
{already_topics}
对话再次涉及时请复用相同的主题/子主题。"#;

/// Render the system prompt. `already_topics` is the user's existing
/// topic/sub_topic hint list; it varies per user, so this prompt is rebuilt
/// per call rather than registered.
pub fn system_prompt(lang: Lang, topics: &str, already_topics: &str, today: &str) -> String {
    let template = match lang {
        Lang::En => EN_PROMPT,
        Lang::Zh => ZH_PROMPT,
    };
    template
        .replace("{topics}", topics)
        .replace("{already_topics}", already_topics)
        .replace("{today}", today)
        .replace("{sep}", SEP)
}

/// Render the hint list of already-known (topic, sub_topic) pairs.
pub fn render_already_topics(pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return "NONE".to_string();
    }
    pairs
        .iter()
        .map(|(t, s)| format!("- {t}{SEP}{s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse extraction output. Lines that do not match the grammar are dropped
/// (per-fact granularity); attributes come back normalized. "NONE" and
/// "NO FACTS" mean an empty list.
pub fn parse_facts(response: &str) -> Vec<ExtractedFact> {
    let trimmed = response.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("no facts") {
        return Vec::new();
    }
    trimmed
        .lines()
        .filter_map(|line| bullet_parts(line, 3))
        .filter_map(|parts| {
            let topic = normalize_attribute(parts[0]);
            let sub_topic = normalize_attribute(parts[1]);
            let memo = parts[2].trim().to_string();
            if topic.is_empty() || sub_topic.is_empty() || memo.is_empty() {
                return None;
            }
            Some(ExtractedFact {
                topic,
                sub_topic,
                memo,
            })
        })
        .collect()
}

/// Collapse facts sharing a (topic, sub_topic) pair, joining memos with "; ".
/// Order of first appearance is preserved.
pub fn coalesce_facts(facts: Vec<ExtractedFact>) -> Vec<ExtractedFact> {
    let mut out: Vec<ExtractedFact> = Vec::with_capacity(facts.len());
    for fact in facts {
        match out
            .iter_mut()
            .find(|f| f.topic == fact.topic && f.sub_topic == fact.sub_topic)
        {
            Some(existing) => {
                existing.memo.push_str("; ");
                existing.memo.push_str(&fact.memo);
            }
            None => out.push(fact),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let facts = parse_facts(
            "- basic_info::Name::Gus\n- Work::title::engineer at ACME\nnot a bullet\n- broken::line",
        );
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].topic, "basic_info");
        assert_eq!(facts[0].sub_topic, "name");
        assert_eq!(facts[0].memo, "Gus");
        assert_eq!(facts[1].topic, "work");
    }

    #[test]
    fn none_means_empty() {
        assert!(parse_facts("NONE").is_empty());
        assert!(parse_facts("no facts").is_empty());
        assert!(parse_facts("").is_empty());
    }

    #[test]
    fn duplicate_pairs_collapse_with_join() {
        let facts = parse_facts("- interest::movie::Inception\n- interest::movie::Tenet");
        let merged = coalesce_facts(facts);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].memo, "Inception; Tenet");
    }

    #[test]
    fn already_topics_rendering() {
        assert_eq!(render_already_topics(&[]), "NONE");
        let rendered =
            render_already_topics(&[("work".into(), "title".into())]);
        assert_eq!(rendered, "- work::title");
    }

    #[test]
    fn system_prompt_fills_placeholders() {
        let p = system_prompt(Lang::En, "- 'x'", "NONE", "2025-08-01");
        assert!(p.contains("- 'x'"));
        assert!(p.contains("2025-08-01"));
        assert!(!p.contains("{sep}"));
        assert!(!p.contains("{topics}"));
    }
}
