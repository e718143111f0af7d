use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use recall_core::config::MemoryConfig;
use recall_core::project::ProfileConfig;
use recall_core::tokens::count_tokens;
use recall_core::types::{normalize_attribute, ChatMessage};
use recall_llm::{CompleteOptions, LlmGateway};
use recall_store::events::EventStore;
use recall_store::profiles::ProfileStore;
use recall_store::types::ProfileRow;

use crate::error::Result;
use crate::prompts::{context_pack, pick, Lang};

/// Hard cap on events considered before token truncation.
const MAX_EVENTS: usize = 40;
/// Upper bound for the chat-aware slot filter.
const MAX_PICKS: usize = 10;

#[derive(Debug, Clone)]
pub struct ContextParams {
    pub max_tokens: usize,
    /// Topics to sort first, in the given order.
    pub prefer_topics: Vec<String>,
    /// When non-empty, all other topics are excluded.
    pub only_topics: Vec<String>,
    /// Per-topic slot caps; overrides `max_subtopic_size`.
    pub topic_limits: HashMap<String, usize>,
    /// Default per-topic slot cap.
    pub max_subtopic_size: Option<usize>,
    /// Share of the budget given to the profile section.
    pub profile_event_ratio: f64,
    /// Only include events that carry a summary tip.
    pub require_event_summary: bool,
    /// Recent chat turns; when present, an LLM pass filters the profile
    /// selection down to slots relevant to the current turn.
    pub chat_hint: Vec<ChatMessage>,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            prefer_topics: Vec::new(),
            only_topics: Vec::new(),
            topic_limits: HashMap::new(),
            max_subtopic_size: None,
            profile_event_ratio: 0.8,
            require_event_summary: false,
            chat_hint: Vec::new(),
        }
    }
}

/// Assembles the retrieval payload: selected profile slots plus the event
/// timeline, rendered within a token budget.
pub struct ContextComposer {
    profiles: Arc<ProfileStore>,
    events: Arc<EventStore>,
    llm: Arc<LlmGateway>,
    memory: MemoryConfig,
}

impl ContextComposer {
    pub fn new(
        profiles: Arc<ProfileStore>,
        events: Arc<EventStore>,
        llm: Arc<LlmGateway>,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            profiles,
            events,
            llm,
            memory,
        }
    }

    pub async fn compose(
        &self,
        project_id: &str,
        user_id: &str,
        config: &ProfileConfig,
        params: &ContextParams,
    ) -> Result<String> {
        let lang = Lang::from_code(config.language(&self.memory));
        let profile_budget =
            (params.max_tokens as f64 * params.profile_event_ratio.clamp(0.0, 1.0)) as usize;
        let event_budget = params.max_tokens.saturating_sub(profile_budget);

        let slots = self.profiles.list(project_id, user_id)?;
        let mut selected = select_slots(slots, params);
        if !params.chat_hint.is_empty() {
            selected = self
                .filter_by_chat(project_id, selected, &params.chat_hint, lang)
                .await;
        }

        let mut used = 0;
        let mut lines: Vec<String> = Vec::new();
        for slot in &selected {
            let line = format!("{}: {}", slot.attributes, slot.content);
            used += count_tokens(&line);
            if used > profile_budget {
                break;
            }
            lines.push(line);
        }
        let profile_section = if lines.is_empty() {
            String::new()
        } else {
            format!("- {}", lines.join("\n- "))
        };

        // events may use the profile section's leftover, never more than the
        // overall budget allows
        let profile_tokens = count_tokens(&profile_section);
        let event_budget = event_budget.min(params.max_tokens.saturating_sub(profile_tokens));
        let event_section = if event_budget == 0 {
            String::new()
        } else {
            let events = self.events.list(
                project_id,
                user_id,
                MAX_EVENTS,
                Some(event_budget),
                params.require_event_summary,
            )?;
            events
                .iter()
                .map(|e| e.data.render(&e.created_at))
                .collect::<Vec<_>>()
                .join("\n---\n")
        };

        debug!(
            profile_slots = lines.len(),
            profile_tokens,
            event_budget,
            "context composed"
        );
        Ok(context_pack::render(lang, &profile_section, &event_section))
    }

    /// Chat-aware narrowing of the slot selection. Any model or parse
    /// failure falls back to the unfiltered selection.
    async fn filter_by_chat(
        &self,
        project_id: &str,
        selected: Vec<ProfileRow>,
        chat: &[ChatMessage],
        lang: Lang,
    ) -> Vec<ProfileRow> {
        if selected.is_empty() {
            return selected;
        }
        let rendered: Vec<String> = selected
            .iter()
            .map(|s| format!("{}: {}", s.attributes, s.content))
            .collect();
        let chat_str = chat
            .iter()
            .map(|m| format!("{}: {}", m.speaker(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let result = self
            .llm
            .complete(
                project_id,
                &pick::build_input(&rendered, &chat_str),
                &pick::system_prompt(lang, MAX_PICKS),
                CompleteOptions {
                    prompt_id: Some(pick::PROMPT_ID),
                    max_tokens: 128,
                    ..Default::default()
                },
            )
            .await;
        match result {
            Ok(raw) => match pick::parse_picks(&raw, selected.len()) {
                Some(picks) => picks
                    .into_iter()
                    .take(MAX_PICKS)
                    .map(|i| selected[i].clone())
                    .collect(),
                None => {
                    warn!("pick-related output rejected, using unfiltered selection");
                    selected
                }
            },
            Err(e) => {
                warn!(error = %e, "pick-related call failed, using unfiltered selection");
                selected
            }
        }
    }
}

/// Filter by `only_topics`, order `prefer_topics` first (in the given
/// order), then by recency, and apply per-topic cardinality caps.
fn select_slots(slots: Vec<ProfileRow>, params: &ContextParams) -> Vec<ProfileRow> {
    // incoming order is updated_at desc from the store
    let mut slots = slots;

    if !params.only_topics.is_empty() {
        let only: Vec<String> = params
            .only_topics
            .iter()
            .map(|t| normalize_attribute(t))
            .collect();
        slots.retain(|s| only.contains(&s.attributes.topic));
    }

    if !params.prefer_topics.is_empty() {
        let weight: HashMap<String, usize> = params
            .prefer_topics
            .iter()
            .enumerate()
            .map(|(i, t)| (normalize_attribute(t), i))
            .collect();
        // stable sort keeps the recency order within each bucket
        slots.sort_by_key(|s| weight.get(&s.attributes.topic).copied().unwrap_or(usize::MAX));
    }

    if params.max_subtopic_size.is_some() || !params.topic_limits.is_empty() {
        let limits: HashMap<String, usize> = params
            .topic_limits
            .iter()
            .map(|(t, n)| (normalize_attribute(t), *n))
            .collect();
        let mut seen: HashMap<String, usize> = HashMap::new();
        slots.retain(|s| {
            let cap = limits
                .get(&s.attributes.topic)
                .copied()
                .or(params.max_subtopic_size);
            let count = seen.entry(s.attributes.topic.clone()).or_insert(0);
            *count += 1;
            match cap {
                Some(cap) => *count <= cap,
                None => true,
            }
        });
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::types::ProfileAttributes;

    fn slot(topic: &str, sub: &str, updated_at: &str) -> ProfileRow {
        ProfileRow {
            id: format!("{topic}-{sub}"),
            attributes: ProfileAttributes::new(topic, sub),
            content: format!("{sub} memo"),
            update_hits: 0,
            created_at: updated_at.to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    #[test]
    fn only_topics_excludes_everything_else() {
        let slots = vec![
            slot("work", "title", "3"),
            slot("interest", "movie", "2"),
            slot("psychological", "mood", "1"),
        ];
        let params = ContextParams {
            only_topics: vec!["Interest".into()],
            ..Default::default()
        };
        let out = select_slots(slots, &params);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].attributes.topic, "interest");
    }

    #[test]
    fn prefer_topics_lead_in_given_order() {
        let slots = vec![
            slot("work", "title", "5"),
            slot("interest", "movie", "4"),
            slot("psychological", "mood", "3"),
            slot("interest", "food", "2"),
        ];
        let params = ContextParams {
            prefer_topics: vec!["psychological".into(), "interest".into()],
            ..Default::default()
        };
        let out = select_slots(slots, &params);
        let topics: Vec<&str> = out.iter().map(|s| s.attributes.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec!["psychological", "interest", "interest", "work"]
        );
        // recency preserved inside the preferred bucket
        assert_eq!(out[1].attributes.sub_topic, "movie");
    }

    #[test]
    fn topic_limits_override_default_cap() {
        let slots = vec![
            slot("interest", "a", "5"),
            slot("interest", "b", "4"),
            slot("interest", "c", "3"),
            slot("work", "x", "2"),
            slot("work", "y", "1"),
        ];
        let params = ContextParams {
            max_subtopic_size: Some(1),
            topic_limits: HashMap::from([("interest".to_string(), 2)]),
            ..Default::default()
        };
        let out = select_slots(slots, &params);
        let interest = out.iter().filter(|s| s.attributes.topic == "interest").count();
        let work = out.iter().filter(|s| s.attributes.topic == "work").count();
        assert_eq!(interest, 2);
        assert_eq!(work, 1);
    }
}
