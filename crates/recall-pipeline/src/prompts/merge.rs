use super::{bullet_parts, Lang, SEP};

pub const PROMPT_ID: &str = "merge_profile";

/// Outcome of the merge stage for one fact.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    /// Apply the given memo as the slot's new canonical value.
    Update(String),
    /// Discard the new memo; the old value stands.
    Abort,
}

const EN_PROMPT: &str = r#"You maintain one evolving memo about a user. You are given the old memo and a new memo for the same topic/sub_topic and must produce the single canonical value.

Guidelines:
- Replace the old memo when the new one clearly supersedes it (state changed, newer dated evidence).
- Merge them when they complement each other without conflict.
- Keep the old memo (abort) when the new one is irrelevant to the topic, or is a one-off that contradicts an established pattern.
- Preserve dates and concrete evidence. Never invent facts. Final memo stays concise (max 3 sentences).
- When a Topic Description is given, abort memos that do not belong to that topic.
- Follow the Update Instruction when one is given.

## Input format
<template>
Today is [YYYY-MM-DD]
## Update Instruction
[update_instruction]
## Topic Description
[topic_description]
## User Topic
[topic], [sub_topic]
## Old Memo
[old_memo]
## New Memo
[new_memo]
</template>
Fields may be "NONE" when empty.

## Output format
Think briefly, then end your reply with exactly one action line:
- UPDATE{sep}FINAL_MEMO
or:
- ABORT{sep}invalid"#;

const ZH_PROMPT: &str = r#"你维护关于用户的一条持续演化的备忘。给定同一主题/子主题下的旧备忘和新备忘，输出唯一的最终值。

准则：
- 新备忘明显取代旧备忘时（状态变化、更新的日期证据），进行替换。
- 互补且不冲突时，进行合并。
- 新备忘与主题无关，或只是与既有模式矛盾的孤立事件时，保留旧备忘（abort）。
- 保留日期与具体证据，不要编造。最终备忘保持简洁（不超过3句）。
- 给出主题描述时，不属于该主题的内容应 abort。
- 给出更新指令时，遵循该指令。

## 输出格式
简要分析后，在回复末尾输出且仅输出一行动作：
- UPDATE{sep}最终备忘
或：
- ABORT{sep}invalid"#;

/// Stable system prompt, registered once per language.
pub fn system_prompt(lang: Lang) -> String {
    match lang {
        Lang::En => EN_PROMPT.replace("{sep}", SEP),
        Lang::Zh => ZH_PROMPT.replace("{sep}", SEP),
    }
}

/// Render the per-fact input block.
#[allow(clippy::too_many_arguments)]
pub fn build_input(
    today: &str,
    topic: &str,
    sub_topic: &str,
    old_memo: &str,
    new_memo: &str,
    topic_description: Option<&str>,
    update_instruction: Option<&str>,
) -> String {
    format!(
        "Today is {today}\n\
         ## Update Instruction\n{}\n\
         ## Topic Description\n{}\n\
         ## User Topic\n{topic}, {sub_topic}\n\
         ## Old Memo\n{}\n\
         ## New Memo\n{new_memo}\n",
        update_instruction.unwrap_or("NONE"),
        topic_description.unwrap_or("NONE"),
        if old_memo.is_empty() { "NONE" } else { old_memo },
    )
}

/// Parse the merge output: the last well-formed action line wins, anything
/// else is a parse failure (`None`).
pub fn parse_action(response: &str) -> Option<MergeAction> {
    response
        .lines()
        .rev()
        .filter_map(|line| bullet_parts(line, 2))
        .find_map(|parts| match parts[0].trim().to_uppercase().as_str() {
            "UPDATE" => {
                let memo = parts[1].trim();
                if memo.is_empty() {
                    None
                } else {
                    Some(MergeAction::Update(memo.to_string()))
                }
            }
            "ABORT" => Some(MergeAction::Abort),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_after_analysis() {
        let response = "The new memo supersedes the old one.\n---\n- UPDATE::User is happy today";
        assert_eq!(
            parse_action(response),
            Some(MergeAction::Update("User is happy today".into()))
        );
    }

    #[test]
    fn parses_abort() {
        assert_eq!(parse_action("- ABORT::invalid"), Some(MergeAction::Abort));
        assert_eq!(
            parse_action("analysis first\n- abort::invalid"),
            Some(MergeAction::Abort)
        );
    }

    #[test]
    fn last_action_line_wins() {
        let response = "- UPDATE::draft\nmore thought\n- UPDATE::final";
        assert_eq!(
            parse_action(response),
            Some(MergeAction::Update("final".into()))
        );
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert_eq!(parse_action("UPDATE the memo"), None);
        assert_eq!(parse_action("- REPLACE::x"), None);
        assert_eq!(parse_action("- UPDATE::"), None);
        assert_eq!(parse_action(""), None);
    }

    #[test]
    fn input_block_marks_empty_fields() {
        let input = build_input("2025-08-01", "work", "title", "", "engineer", None, None);
        assert!(input.contains("## Old Memo\nNONE"));
        assert!(input.contains("## New Memo\nengineer"));
        assert!(input.contains("work, title"));
    }
}
