//! Prompt contracts: per stage, the input rendering, the output grammar, and
//! a deterministic parser that rejects malformed output. Parsers never try to
//! repair what the model produced.

pub mod context_pack;
pub mod event_tag;
pub mod extract;
pub mod merge;
pub mod organize;
pub mod pick;
pub mod summary;
pub mod topics;

/// Field separator in all line-oriented prompt grammars.
pub const SEP: &str = "::";

/// Prompt-pack language. Unknown codes fall back to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    En,
    Zh,
}

impl Lang {
    pub fn from_code(code: &str) -> Self {
        match code {
            "zh" => Lang::Zh,
            _ => Lang::En,
        }
    }
}

/// Wrap rendered transcripts in indexed tags, oldest first, so extraction
/// output can cite which chat a fact came from.
pub fn tag_transcripts(rendered: &[String]) -> String {
    rendered
        .iter()
        .enumerate()
        .map(|(i, text)| format!("<chat data_index={i}>\n{text}\n</chat>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Today's date as rendered into prompts.
pub fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Split a grammar line of the form `- A::B[::C]`. Returns the parts after
/// the bullet, or `None` when the line is not a bullet.
pub(crate) fn bullet_parts(line: &str, n: usize) -> Option<Vec<&str>> {
    let line = line.trim();
    let rest = line.strip_prefix("- ")?;
    let parts: Vec<&str> = rest.splitn(n, SEP).collect();
    if parts.len() == n {
        Some(parts)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_keep_order_and_index() {
        let out = tag_transcripts(&["a".into(), "b".into()]);
        assert!(out.starts_with("<chat data_index=0>\na\n</chat>"));
        assert!(out.contains("<chat data_index=1>\nb\n</chat>"));
    }

    #[test]
    fn bullet_parsing() {
        assert_eq!(
            bullet_parts("- a::b::c", 3),
            Some(vec!["a", "b", "c"])
        );
        // memo may itself contain the separator
        assert_eq!(
            bullet_parts("- a::b::c::d", 3),
            Some(vec!["a", "b", "c::d"])
        );
        assert_eq!(bullet_parts("a::b::c", 3), None);
        assert_eq!(bullet_parts("- a::b", 3), None);
    }
}
