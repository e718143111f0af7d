use super::Lang;

pub const PROMPT_ID: &str = "pick_related";

const EN_PROMPT: &str = r#"You select which of a user's memory slots are relevant to the current conversation turn.

You get the numbered slot list and the latest chat messages. Reply with a JSON array of the relevant slot indices, most relevant first, at most {max_picks} items, e.g. [0, 3]. Reply [] when nothing is relevant. Output the array only."#;

const ZH_PROMPT: &str = r#"从用户的记忆条目中挑选与当前对话相关的条目。

给定编号的条目列表和最新的聊天消息。回复相关条目下标的 JSON 数组，最相关的在前，最多 {max_picks} 项，例如 [0, 3]。没有相关条目时回复 []。只输出数组。"#;

pub fn system_prompt(lang: Lang, max_picks: usize) -> String {
    let template = match lang {
        Lang::En => EN_PROMPT,
        Lang::Zh => ZH_PROMPT,
    };
    template.replace("{max_picks}", &max_picks.to_string())
}

pub fn build_input(slots: &[String], chat: &str) -> String {
    let numbered: Vec<String> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{i}. {s}"))
        .collect();
    format!("## Memory slots\n{}\n\n## Chat\n{chat}", numbered.join("\n"))
}

/// Extract the first JSON integer array from the response. Out-of-range
/// indices are dropped; no array at all is a parse failure.
pub fn parse_picks(response: &str, slot_count: usize) -> Option<Vec<usize>> {
    let start = response.find('[')?;
    let end = response[start..].find(']')? + start;
    let picks: Vec<usize> = serde_json::from_str(&response[start..=end]).ok()?;
    Some(picks.into_iter().filter(|&i| i < slot_count).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_with_prose_around() {
        assert_eq!(
            parse_picks("Relevant: [2, 0] because ...", 5),
            Some(vec![2, 0])
        );
        assert_eq!(parse_picks("[]", 5), Some(vec![]));
    }

    #[test]
    fn drops_out_of_range_and_rejects_garbage() {
        assert_eq!(parse_picks("[1, 9]", 3), Some(vec![1]));
        assert_eq!(parse_picks("none of them", 3), None);
        assert_eq!(parse_picks("[a, b]", 3), None);
    }
}
