use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use recall_core::config::MemoryConfig;
use recall_core::project::ProfileConfig;
use recall_core::tokens::count_tokens;
use recall_core::types::{EventData, EventTag, FlushResult, ProfileAttributes, ProfileDelta};
use recall_llm::{CompleteOptions, LlmGateway};
use recall_store::events::EventStore;
use recall_store::profiles::{ProfileStore, SlotUpdate};
use recall_store::types::{BufferedBlob, ProfileRow};

use crate::error::{PipelineError, Result};
use crate::prompts::{
    self, event_tag, extract, merge, organize, summary, tag_transcripts, today, Lang,
};

/// A slot the flush wants to create.
#[derive(Debug, Clone)]
struct PendingAdd {
    content: String,
    attributes: ProfileAttributes,
}

/// A slot the flush wants to overwrite.
#[derive(Debug, Clone)]
struct PendingUpdate {
    id: String,
    content: String,
    attributes: ProfileAttributes,
}

#[derive(Debug, Default)]
struct MergeOutcome {
    adds: Vec<PendingAdd>,
    updates: Vec<PendingUpdate>,
    deletes: Vec<String>,
}

/// The extract -> merge -> organize -> re-summarize -> commit state machine
/// one flush runs over a batch of buffered chat blobs.
pub struct Consolidator {
    profiles: Arc<ProfileStore>,
    events: Arc<EventStore>,
    llm: Arc<LlmGateway>,
    memory: MemoryConfig,
}

impl Consolidator {
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

    /// Run the full pipeline for one batch. On success the profile delta is
    /// committed atomically and an event is appended iff the delta is
    /// non-empty. Any error before commit leaves profiles and events
    /// untouched; the caller owns buffer status transitions.
    #[instrument(skip(self, batch, config), fields(project_id, user_id, blobs = batch.len()))]
    pub async fn process_chat_blobs(
        &self,
        project_id: &str,
        user_id: &str,
        batch: &[BufferedBlob],
        config: &ProfileConfig,
    ) -> Result<FlushResult> {
        let kept = truncate_batch(batch, self.memory.max_process_tokens);
        if kept.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        if kept.len() < batch.len() {
            info!(
                dropped = batch.len() - kept.len(),
                "batch over process budget, older blobs stay buffered for a later flush"
            );
        }

        let rendered: Vec<String> = kept
            .iter()
            .map(|b| b.blob.render(&b.blob_created_at))
            .collect();
        let transcript = tag_transcripts(&rendered);
        let lang = Lang::from_code(config.language(&self.memory));

        let existing = self.profiles.list(project_id, user_id)?;
        let facts = self
            .extract_facts(project_id, &transcript, &existing, config, lang)
            .await?;
        if facts.is_empty() {
            debug!("no facts extracted, flush is a no-op");
            return Ok(FlushResult::default());
        }

        // profile path and the chat summary run concurrently; event tagging
        // needs the merged delta, so it waits for both
        let (outcome, event_tip) = tokio::join!(
            self.profile_path(project_id, user_id, facts, &existing, config, lang),
            self.summarize_chat(project_id, &transcript, config, lang),
        );
        let outcome = outcome?;

        let delta: Vec<ProfileDelta> = outcome
            .adds
            .iter()
            .map(|a| ProfileDelta {
                content: a.content.clone(),
                attributes: a.attributes.clone(),
            })
            .chain(outcome.updates.iter().map(|u| ProfileDelta {
                content: u.content.clone(),
                attributes: u.attributes.clone(),
            }))
            .collect();

        let event_tags = self
            .tag_event(project_id, &delta, event_tip.as_deref(), config, lang)
            .await;

        // single atomic write against the profile store
        let adds: Vec<(String, ProfileAttributes)> = outcome
            .adds
            .iter()
            .map(|a| (a.content.clone(), a.attributes.clone()))
            .collect();
        let updates: Vec<SlotUpdate> = outcome
            .updates
            .iter()
            .map(|u| SlotUpdate {
                id: u.id.clone(),
                content: u.content.clone(),
                attributes: None,
            })
            .collect();
        let added_ids = self
            .profiles
            .commit_delta(project_id, user_id, &adds, &updates, &outcome.deletes)?;

        let event_id = if delta.is_empty() && outcome.deletes.is_empty() {
            None
        } else {
            Some(
                self.append_event(project_id, user_id, event_tip, event_tags, delta)
                    .await?,
            )
        };

        info!(
            added = added_ids.len(),
            updated = outcome.updates.len(),
            deleted = outcome.deletes.len(),
            event = event_id.is_some(),
            "flush committed"
        );
        Ok(FlushResult {
            event_id,
            added: added_ids,
            updated: outcome.updates.into_iter().map(|u| u.id).collect(),
            deleted: outcome.deletes,
        })
    }

    async fn extract_facts(
        &self,
        project_id: &str,
        transcript: &str,
        existing: &[ProfileRow],
        config: &ProfileConfig,
        lang: Lang,
    ) -> Result<Vec<extract::ExtractedFact>> {
        let mut pairs: Vec<(String, String)> = existing
            .iter()
            .map(|p| (p.attributes.topic.clone(), p.attributes.sub_topic.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();

        let system = extract::system_prompt(
            lang,
            &prompts::topics::render_topics(&config.effective_topics()),
            &extract::render_already_topics(&pairs),
            &today(),
        );
        let raw = self
            .llm
            .complete(
                project_id,
                transcript,
                &system,
                CompleteOptions {
                    prompt_id: Some(extract::PROMPT_ID),
                    max_tokens: 2048,
                    ..Default::default()
                },
            )
            .await?;

        let mut facts = extract::coalesce_facts(extract::parse_facts(&raw));
        if config.strict_mode(&self.memory) {
            let allowed: std::collections::HashSet<(String, String)> =
                config.allowed_pairs().into_iter().collect();
            let before = facts.len();
            facts.retain(|f| allowed.contains(&(f.topic.clone(), f.sub_topic.clone())));
            if facts.len() < before {
                debug!(
                    dropped = before - facts.len(),
                    "strict mode dropped out-of-taxonomy facts"
                );
            }
        }
        Ok(facts)
    }

    async fn profile_path(
        &self,
        project_id: &str,
        user_id: &str,
        facts: Vec<extract::ExtractedFact>,
        existing: &[ProfileRow],
        config: &ProfileConfig,
        lang: Lang,
    ) -> Result<MergeOutcome> {
        let mut outcome = self
            .merge_or_validate(project_id, facts, existing, config, lang)
            .await;
        self.organize(project_id, user_id, &mut outcome, existing, config, lang)
            .await;
        self.re_summarize(project_id, &mut outcome, lang).await;
        Ok(outcome)
    }

    /// For each fact: no existing slot -> add; existing slot -> ask the merge
    /// prompt. Per-fact failures drop that fact only.
    async fn merge_or_validate(
        &self,
        project_id: &str,
        facts: Vec<extract::ExtractedFact>,
        existing: &[ProfileRow],
        config: &ProfileConfig,
        lang: Lang,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let system = merge::system_prompt(lang);
        let today = today();
        let topics = config.effective_topics();

        let mut merge_jobs = Vec::new();
        for fact in facts {
            let attrs = ProfileAttributes {
                topic: fact.topic.clone(),
                sub_topic: fact.sub_topic.clone(),
            };
            match existing.iter().find(|p| p.attributes == attrs) {
                None => outcome.adds.push(PendingAdd {
                    content: fact.memo,
                    attributes: attrs,
                }),
                Some(slot) => {
                    let description = topics
                        .iter()
                        .find(|t| {
                            recall_core::types::normalize_attribute(&t.topic) == fact.topic
                        })
                        .and_then(|t| t.description.clone());
                    let input = merge::build_input(
                        &today,
                        &fact.topic,
                        &fact.sub_topic,
                        &slot.content,
                        &fact.memo,
                        description.as_deref(),
                        None,
                    );
                    merge_jobs.push((slot.clone(), input));
                }
            }
        }

        let calls = merge_jobs.iter().map(|(_, input)| {
            self.llm.complete(
                project_id,
                input,
                &system,
                CompleteOptions {
                    prompt_id: Some(merge::PROMPT_ID),
                    ..Default::default()
                },
            )
        });
        let results = join_all(calls).await;

        for ((slot, _), result) in merge_jobs.into_iter().zip(results) {
            let raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(slot = %slot.attributes, error = %e, "merge call failed, fact dropped");
                    continue;
                }
            };
            match merge::parse_action(&raw) {
                Some(merge::MergeAction::Update(memo)) => {
                    let memo = if count_tokens(&memo) > self.memory.max_pre_profile_token_size {
                        // compact inline; an uncompactable memo drops the update
                        match self.summarize_value(project_id, &memo, lang).await {
                            Some(short) => short,
                            None => {
                                warn!(slot = %slot.attributes, "over-long merge result could not be compacted, update dropped");
                                continue;
                            }
                        }
                    } else {
                        memo
                    };
                    outcome.updates.push(PendingUpdate {
                        id: slot.id,
                        content: memo,
                        attributes: slot.attributes,
                    });
                }
                Some(merge::MergeAction::Abort) => {
                    debug!(slot = %slot.attributes, "merge aborted, old memo retained");
                }
                None => {
                    warn!(slot = %slot.attributes, "merge output rejected, fact dropped");
                }
            }
        }
        outcome
    }

    /// Rewrite saturated topics into a smaller consolidated slot set.
    /// A failed reorganization keeps the post-merge set for that topic.
    async fn organize(
        &self,
        project_id: &str,
        user_id: &str,
        outcome: &mut MergeOutcome,
        existing: &[ProfileRow],
        config: &ProfileConfig,
        lang: Lang,
    ) {
        let max = self.memory.max_profile_subtopics;
        // consolidated set is capped at ceil(max/2) + 1
        let target = max.div_ceil(2) + 1;

        // post-merge view per topic: existing slots (with pending updates
        // applied) plus pending adds
        let updated_content: HashMap<&str, &str> = outcome
            .updates
            .iter()
            .map(|u| (u.id.as_str(), u.content.as_str()))
            .collect();
        let mut by_topic: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut ids_by_topic: HashMap<String, Vec<String>> = HashMap::new();
        for slot in existing {
            let content = updated_content
                .get(slot.id.as_str())
                .copied()
                .unwrap_or(slot.content.as_str());
            by_topic
                .entry(slot.attributes.topic.clone())
                .or_default()
                .push((slot.attributes.sub_topic.clone(), content.to_string()));
            ids_by_topic
                .entry(slot.attributes.topic.clone())
                .or_default()
                .push(slot.id.clone());
        }
        for add in &outcome.adds {
            by_topic
                .entry(add.attributes.topic.clone())
                .or_default()
                .push((add.attributes.sub_topic.clone(), add.content.clone()));
        }

        let saturated: Vec<(String, Vec<(String, String)>)> = by_topic
            .into_iter()
            .filter(|(_, slots)| slots.len() > max)
            .collect();
        if saturated.is_empty() {
            return;
        }

        let topics = config.effective_topics();
        let calls = saturated.iter().map(|(topic, slots)| {
            let system = organize::system_prompt(
                lang,
                target,
                &prompts::topics::suggested_subtopics(&topics, topic),
            );
            let input = organize::build_input(topic, slots);
            async move {
                self.llm
                    .complete(
                        project_id,
                        &input,
                        &system,
                        CompleteOptions {
                            prompt_id: Some(organize::PROMPT_ID),
                            max_tokens: 2048,
                            ..Default::default()
                        },
                    )
                    .await
            }
        });
        let results = join_all(calls).await;

        for ((topic, _), result) in saturated.into_iter().zip(results) {
            let slots = match result {
                Ok(raw) => organize::parse_slots(&raw),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "organize call failed, keeping post-merge slots");
                    continue;
                }
            };
            if slots.is_empty() {
                warn!(topic = %topic, user_id, "organize returned no slots, keeping post-merge slots");
                continue;
            }
            info!(topic = %topic, slots = slots.len(), "topic reorganized");
            // replace the topic wholesale: delete its existing slots, drop
            // its pending adds and (superseded) updates, insert the
            // consolidated set with fresh counters
            if let Some(ids) = ids_by_topic.get(&topic) {
                outcome.deletes.extend(ids.iter().cloned());
            }
            outcome.adds.retain(|a| a.attributes.topic != topic);
            outcome.updates.retain(|u| u.attributes.topic != topic);
            outcome
                .adds
                .extend(slots.into_iter().take(target).map(|s| PendingAdd {
                    content: s.memo,
                    attributes: ProfileAttributes {
                        topic: topic.clone(),
                        sub_topic: s.sub_topic,
                    },
                }));
        }

        dedupe_adds(&mut outcome.adds);
    }

    /// Compact any add/update whose content exceeds the per-slot token cap.
    /// Failures keep the long value.
    async fn re_summarize(&self, project_id: &str, outcome: &mut MergeOutcome, lang: Lang) {
        let cap = self.memory.max_pre_profile_token_size;

        let add_jobs: Vec<usize> = outcome
            .adds
            .iter()
            .enumerate()
            .filter(|(_, a)| count_tokens(&a.content) > cap)
            .map(|(i, _)| i)
            .collect();
        let update_jobs: Vec<usize> = outcome
            .updates
            .iter()
            .enumerate()
            .filter(|(_, u)| count_tokens(&u.content) > cap)
            .map(|(i, _)| i)
            .collect();
        if add_jobs.is_empty() && update_jobs.is_empty() {
            return;
        }

        let calls = add_jobs
            .iter()
            .map(|&i| outcome.adds[i].content.clone())
            .chain(update_jobs.iter().map(|&i| outcome.updates[i].content.clone()))
            .map(|content| async move { self.summarize_value(project_id, &content, lang).await });
        let results = join_all(calls).await;

        let (add_results, update_results) = results.split_at(add_jobs.len());
        for (&i, result) in add_jobs.iter().zip(add_results) {
            if let Some(short) = result {
                outcome.adds[i].content = short.clone();
            }
        }
        for (&i, result) in update_jobs.iter().zip(update_results) {
            if let Some(short) = result {
                outcome.updates[i].content = short.clone();
            }
        }
    }

    async fn summarize_value(&self, project_id: &str, content: &str, lang: Lang) -> Option<String> {
        let result = self
            .llm
            .complete(
                project_id,
                content,
                &summary::profile_system_prompt(lang),
                CompleteOptions {
                    prompt_id: Some(summary::PROFILE_PROMPT_ID),
                    ..Default::default()
                },
            )
            .await;
        match result {
            Ok(raw) => summary::parse_summary(&raw),
            Err(e) => {
                warn!(error = %e, "profile summary call failed");
                None
            }
        }
    }

    /// Event-path summary of the transcript. Skipped when disabled or the
    /// transcript is below the threshold; failures are logged and skipped.
    async fn summarize_chat(
        &self,
        project_id: &str,
        transcript: &str,
        config: &ProfileConfig,
        lang: Lang,
    ) -> Option<String> {
        if !config.event_summary_enabled(&self.memory) {
            return None;
        }
        if count_tokens(transcript) < self.memory.min_event_summary_tokens {
            debug!("transcript under event-summary threshold, skipping");
            return None;
        }
        let model = self.llm.config().summary_model.clone();
        let result = self
            .llm
            .complete(
                project_id,
                transcript,
                &summary::chat_system_prompt(lang),
                CompleteOptions {
                    prompt_id: Some(summary::CHAT_PROMPT_ID),
                    model: Some(model),
                    ..Default::default()
                },
            )
            .await;
        match result {
            Ok(raw) => summary::parse_summary(&raw),
            Err(e) => {
                warn!(error = %e, "chat summary call failed, event tip skipped");
                None
            }
        }
    }

    /// Tag the session against the project's declared tags. Undeclared tags
    /// are dropped; failures skip tagging.
    async fn tag_event(
        &self,
        project_id: &str,
        delta: &[ProfileDelta],
        event_tip: Option<&str>,
        config: &ProfileConfig,
        lang: Lang,
    ) -> Option<Vec<EventTag>> {
        if config.event_tags.is_empty() || (delta.is_empty() && event_tip.is_none()) {
            return None;
        }
        let delta_str = delta
            .iter()
            .map(|d| format!("- {}: {}", d.attributes, d.content))
            .collect::<Vec<_>>()
            .join("\n");
        let input = event_tag::build_input(&delta_str, event_tip.unwrap_or(""));
        let result = self
            .llm
            .complete(
                project_id,
                &input,
                &event_tag::system_prompt(lang, &config.event_tags),
                CompleteOptions {
                    prompt_id: Some(event_tag::PROMPT_ID),
                    ..Default::default()
                },
            )
            .await;
        match result {
            Ok(raw) => Some(event_tag::parse_tags(&raw, &config.event_tags)),
            Err(e) => {
                warn!(error = %e, "event tagging failed, tags skipped");
                None
            }
        }
    }

    async fn append_event(
        &self,
        project_id: &str,
        user_id: &str,
        event_tip: Option<String>,
        event_tags: Option<Vec<EventTag>>,
        delta: Vec<ProfileDelta>,
    ) -> Result<String> {
        let embed_text = event_tip.clone().unwrap_or_else(|| {
            delta
                .iter()
                .map(|d| format!("{}: {}", d.attributes, d.content))
                .collect::<Vec<_>>()
                .join("\n")
        });
        let embedding = match self
            .llm
            .embed(project_id, &[embed_text], "event_append")
            .await
        {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "event embedding failed, stored without vector");
                None
            }
        };
        let data = EventData {
            event_tip,
            event_tags: event_tags.filter(|t| !t.is_empty()),
            profile_delta: delta,
        };
        let id = self
            .events
            .append(project_id, user_id, &data, embedding.as_deref())?;
        Ok(id)
    }
}

/// Keep the newest suffix whose aggregate token size fits the process budget.
/// Returned oldest-first. Older blobs are discarded from this flush only.
fn truncate_batch(batch: &[BufferedBlob], max_tokens: usize) -> Vec<BufferedBlob> {
    let mut total: i64 = 0;
    let mut kept: Vec<BufferedBlob> = Vec::new();
    for blob in batch.iter().rev() {
        total += blob.token_size;
        if total as usize > max_tokens {
            break;
        }
        kept.push(blob.clone());
    }
    kept.reverse();
    kept
}

/// Collapse pending adds sharing (topic, sub_topic), joining contents.
fn dedupe_adds(adds: &mut Vec<PendingAdd>) {
    let mut out: Vec<PendingAdd> = Vec::with_capacity(adds.len());
    for add in adds.drain(..) {
        match out.iter_mut().find(|a| a.attributes == add.attributes) {
            Some(existing) => {
                existing.content.push_str("; ");
                existing.content.push_str(&add.content);
            }
            None => out.push(add),
        }
    }
    *adds = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recall_core::types::Blob;

    fn blob(tokens: i64) -> BufferedBlob {
        BufferedBlob {
            entry_id: format!("e{tokens}"),
            blob_id: format!("b{tokens}"),
            token_size: tokens,
            blob: Blob::Doc {
                content: "x".into(),
            },
            blob_created_at: Utc::now(),
        }
    }

    #[test]
    fn truncate_keeps_newest_suffix() {
        let batch = vec![blob(100), blob(200), blob(300)];
        let kept = truncate_batch(&batch, 550);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].token_size, 200);
        assert_eq!(kept[1].token_size, 300);

        assert!(truncate_batch(&batch, 50).is_empty());
        assert_eq!(truncate_batch(&batch, 600).len(), 3);
    }

    #[test]
    fn dedupe_joins_contents() {
        let attrs = ProfileAttributes::new("interest", "movie");
        let mut adds = vec![
            PendingAdd {
                content: "Inception".into(),
                attributes: attrs.clone(),
            },
            PendingAdd {
                content: "Tenet".into(),
                attributes: attrs.clone(),
            },
            PendingAdd {
                content: "hiking".into(),
                attributes: ProfileAttributes::new("interest", "sports"),
            },
        ];
        dedupe_adds(&mut adds);
        assert_eq!(adds.len(), 2);
        assert_eq!(adds[0].content, "Inception; Tenet");
    }
}
