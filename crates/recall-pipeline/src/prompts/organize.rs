use recall_core::types::normalize_attribute;

use super::{bullet_parts, Lang, SEP};

pub const PROMPT_ID: &str = "organize_profile";

/// One consolidated slot proposed by the organize stage.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizedSlot {
    pub sub_topic: String,
    pub memo: String,
}

const EN_PROMPT: &str = r#"You reorganize a user profile. All given memos share one topic but their sub-topics have become fragmented or overlapping. Consolidate them into at most {max_subtopics} coherent sub-topics.

Principles:
- Merge related memos; remove redundancy and contradictions.
- Preserve concrete evidence such as dates.
- Discard memos that carry no lasting information about the user.
- Use the same language as the input.

## Reference sub-topics
Prefer these established sub-topics, create new ones only when necessary:
{suggested_subtopics}

## Input format
topic: TOPIC
- SUB_TOPIC{sep}MEMO
- ...

## Output format
- NEW_SUB_TOPIC{sep}CONSOLIDATED_MEMO
- ...
At most {max_subtopics} lines."#;

const ZH_PROMPT: &str = r#"你负责整理用户画像。给定的备忘都属于同一主题，但子主题已经碎片化或相互重叠。请将它们整合为不超过 {max_subtopics} 个连贯的子主题。

原则：
- 合并相关内容，去除冗余和矛盾。
- 保留日期等具体证据。
- 丢弃没有长期价值的条目。
- 使用与输入相同的语言。

## 参考子主题
优先使用以下子主题，必要时才新建：
{suggested_subtopics}

## 输出格式
- 新子主题{sep}整合后的备忘
- ...
最多 {max_subtopics} 行。"#;

pub fn system_prompt(lang: Lang, max_subtopics: usize, suggested_subtopics: &str) -> String {
    let template = match lang {
        Lang::En => EN_PROMPT,
        Lang::Zh => ZH_PROMPT,
    };
    template
        .replace("{max_subtopics}", &max_subtopics.to_string())
        .replace("{suggested_subtopics}", suggested_subtopics)
        .replace("{sep}", SEP)
}

/// Render one topic's slots as organize input.
pub fn build_input(topic: &str, slots: &[(String, String)]) -> String {
    let lines: Vec<String> = slots
        .iter()
        .map(|(sub_topic, memo)| format!("- {sub_topic}{SEP}{memo}"))
        .collect();
    format!("topic: {topic}\n{}\n", lines.join("\n"))
}

/// Parse organize output into consolidated slots. Malformed lines are
/// skipped; an empty result is the caller's signal to abort the step.
pub fn parse_slots(response: &str) -> Vec<OrganizedSlot> {
    response
        .lines()
        .filter_map(|line| bullet_parts(line, 2))
        .filter_map(|parts| {
            let sub_topic = normalize_attribute(parts[0]);
            let memo = parts[1].trim().to_string();
            if sub_topic.is_empty() || memo.is_empty() {
                return None;
            }
            Some(OrganizedSlot { sub_topic, memo })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_consolidated_slots() {
        let out = parse_slots(
            "- romantic_preference::slow-burn development [2025-03]\n\
             - Attachment Style::protective of companions\n\
             garbage line",
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sub_topic, "romantic_preference");
        assert_eq!(out[1].sub_topic, "attachment_style");
    }

    #[test]
    fn empty_output_parses_to_nothing() {
        assert!(parse_slots("I could not consolidate these.").is_empty());
    }

    #[test]
    fn input_renders_topic_header() {
        let input = build_input(
            "habits",
            &[("eating".into(), "eats slowly".into())],
        );
        assert!(input.starts_with("topic: habits\n"));
        assert!(input.contains("- eating::eats slowly"));
    }
}
