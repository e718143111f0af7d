use super::Lang;

pub const CHAT_PROMPT_ID: &str = "summary_chats";
pub const PROFILE_PROMPT_ID: &str = "summary_profile";

const EN_CHAT_PROMPT: &str = r#"You summarize a conversation between a user and an assistant into one narrative paragraph, written from the user's perspective ("user did/said/felt ...").

Requirements:
- Capture what happened, decisions made, and the user's state.
- Keep concrete details: names, dates, places.
- Timestamps in the log are when messages occurred; resolve relative time references against them.
- One paragraph, no lists, no preamble. Use the same language as the chat."#;

const ZH_CHAT_PROMPT: &str = r#"把用户与助手的对话总结为一段叙述性文字，以用户为主语（"用户做了/说了/感到……"）。

要求：
- 涵盖发生的事情、做出的决定以及用户的状态。
- 保留具体细节：人名、日期、地点。
- 日志中的时间戳是消息发生的时间，相对时间请据此换算。
- 只输出一个段落，不要列表，不要开场白。使用与对话相同的语言。"#;

const EN_PROFILE_PROMPT: &str = r#"You compress one over-long user-profile memo. Rewrite it in at most 3 sentences.

Keep, in priority order: the most recent dated facts, concrete evidence, and stable preferences. Drop repetition and stale details. Use the memo's own language. Output only the rewritten memo."#;

const ZH_PROFILE_PROMPT: &str = r#"压缩一条过长的用户画像备忘，改写为不超过3句话。

按优先级保留：最近的带日期事实、具体证据、稳定偏好。删除重复与过时内容。使用备忘本身的语言。只输出改写后的备忘。"#;

/// Stable system prompt for the chat (event tip) summary.
pub fn chat_system_prompt(lang: Lang) -> String {
    match lang {
        Lang::En => EN_CHAT_PROMPT.to_string(),
        Lang::Zh => ZH_CHAT_PROMPT.to_string(),
    }
}

/// Stable system prompt for compacting one over-long slot value.
pub fn profile_system_prompt(lang: Lang) -> String {
    match lang {
        Lang::En => EN_PROFILE_PROMPT.to_string(),
        Lang::Zh => ZH_PROFILE_PROMPT.to_string(),
    }
}

/// Both summaries return free text; the only malformed output is an empty
/// one.
pub fn parse_summary(response: &str) -> Option<String> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_is_rejected() {
        assert_eq!(parse_summary("  \n "), None);
        assert_eq!(parse_summary("User met Gus."), Some("User met Gus.".into()));
    }
}
