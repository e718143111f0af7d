use recall_core::project::TopicEntry;

/// Render the taxonomy the way the extract prompt expects it:
/// one topic per line with its example sub-topics.
pub fn render_topics(topics: &[TopicEntry]) -> String {
    let mut out: String = topics
        .iter()
        .map(|t| {
            let subs: Vec<&str> = t.sub_topics.iter().map(|s| s.name()).collect();
            if subs.is_empty() {
                format!("- '{}'", t.topic)
            } else {
                format!("- '{}', for example: {}", t.topic, subs.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str("\n...");
    out
}

/// Sub-topics suggested to the organize prompt for one topic, or "None" when
/// the topic is not declared.
pub fn suggested_subtopics(topics: &[TopicEntry], topic: &str) -> String {
    topics
        .iter()
        .find(|t| recall_core::types::normalize_attribute(&t.topic) == topic)
        .map(|t| {
            t.sub_topics
                .iter()
                .map(|s| format!("- {}", s.name()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "None".to_string())
}
