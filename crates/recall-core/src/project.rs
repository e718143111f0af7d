use serde::{Deserialize, Serialize};

use crate::config::{MemoryConfig, MAX_PROFILE_CONFIG_BYTES};
use crate::error::{MemoryError, Result};
use crate::types::normalize_attribute;

/// One sub-topic of a declared profile topic. The YAML document accepts a
/// bare name or a `{name, description}` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubTopicEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SubTopicEntry {
    pub fn name(&self) -> &str {
        match self {
            SubTopicEntry::Name(n) => n,
            SubTopicEntry::Full { name, .. } => name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            SubTopicEntry::Name(_) => None,
            SubTopicEntry::Full { description, .. } => description.as_deref(),
        }
    }
}

/// A declared profile topic with optional description and sub-topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub sub_topics: Vec<SubTopicEntry>,
}

impl TopicEntry {
    fn simple(topic: &str, sub_topics: &[&str]) -> Self {
        Self {
            topic: topic.to_string(),
            description: None,
            sub_topics: sub_topics
                .iter()
                .map(|s| SubTopicEntry::Name(s.to_string()))
                .collect(),
        }
    }
}

/// One event tag the project allows on events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTagDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-project profile configuration (the YAML document stored on the
/// project row). Unset fields fall back to the process-wide `MemoryConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Topics appended to the default taxonomy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_user_profiles: Vec<TopicEntry>,
    /// When set, replaces the default taxonomy entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_user_profiles: Option<Vec<TopicEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_event_summary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_strict_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_tags: Vec<EventTagDef>,
}

impl ProfileConfig {
    /// Parse and validate a profile-config document. Empty input yields the
    /// all-defaults config.
    pub fn from_yaml(doc: &str) -> Result<Self> {
        if doc.len() > MAX_PROFILE_CONFIG_BYTES {
            return Err(MemoryError::BadRequest(format!(
                "profile config exceeds {} bytes",
                MAX_PROFILE_CONFIG_BYTES
            )));
        }
        if doc.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ProfileConfig = serde_yaml::from_str(doc)
            .map_err(|e| MemoryError::BadRequest(format!("invalid profile config: {e}")))?;
        if let Some(lang) = &config.language {
            if lang != "en" && lang != "zh" {
                return Err(MemoryError::BadRequest(format!(
                    "unsupported language: {lang}"
                )));
            }
        }
        Ok(config)
    }

    pub fn language<'a>(&'a self, defaults: &'a MemoryConfig) -> &'a str {
        self.language.as_deref().unwrap_or(&defaults.language)
    }

    pub fn event_summary_enabled(&self, defaults: &MemoryConfig) -> bool {
        self.enable_event_summary
            .unwrap_or(defaults.enable_event_summary)
    }

    pub fn strict_mode(&self, defaults: &MemoryConfig) -> bool {
        self.profile_strict_mode
            .unwrap_or(defaults.profile_strict_mode)
    }

    /// The effective topic taxonomy: overwrite replaces the defaults,
    /// additional topics are appended to them.
    pub fn effective_topics(&self) -> Vec<TopicEntry> {
        match &self.overwrite_user_profiles {
            Some(topics) => topics.clone(),
            None => {
                let mut topics = default_profile_topics();
                topics.extend(self.additional_user_profiles.iter().cloned());
                topics
            }
        }
    }

    /// Normalized (topic, sub_topic) pairs allowed under strict mode.
    pub fn allowed_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for t in self.effective_topics() {
            let topic = normalize_attribute(&t.topic);
            for st in &t.sub_topics {
                pairs.push((topic.clone(), normalize_attribute(st.name())));
            }
        }
        pairs
    }
}

/// Built-in taxonomy offered to the extract prompt when a project does not
/// overwrite it.
pub fn default_profile_topics() -> Vec<TopicEntry> {
    vec![
        TopicEntry::simple(
            "basic_info",
            &[
                "name",
                "age",
                "gender",
                "birth_date",
                "nationality",
                "language_spoken",
            ],
        ),
        TopicEntry::simple(
            "contact_info",
            &["email", "phone", "city", "state", "country"],
        ),
        TopicEntry::simple(
            "education",
            &["school", "degree", "major", "graduation_year"],
        ),
        TopicEntry::simple(
            "demographics",
            &["marital_status", "number_of_children", "household_income"],
        ),
        TopicEntry::simple(
            "work",
            &["company", "title", "working_industry", "previous_projects", "work_skills"],
        ),
        TopicEntry::simple(
            "interest",
            &["books", "movies", "music", "foods", "sports", "games", "travel"],
        ),
        TopicEntry::simple(
            "lifestyle",
            &["dietary_preferences", "exercise_habits", "sleep_patterns"],
        ),
        TopicEntry::simple(
            "psychological",
            &["personality", "values", "beliefs", "motivations", "goals", "mood"],
        ),
        TopicEntry::simple("life_event", &["marriage", "relocation", "retirement"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_doc_is_default() {
        let c = ProfileConfig::from_yaml("").unwrap();
        assert!(c.language.is_none());
        assert!(c.overwrite_user_profiles.is_none());
        assert!(!c.effective_topics().is_empty());
    }

    #[test]
    fn parses_full_document() {
        let doc = r#"
language: en
enable_event_summary: true
profile_strict_mode: true
event_tags:
  - name: emotion
    description: how the user felt
  - name: goal
additional_user_profiles:
  - topic: gaming
    description: gaming habits
    sub_topics:
      - favorite_genre
      - name: platform
        description: console or pc
"#;
        let c = ProfileConfig::from_yaml(doc).unwrap();
        assert_eq!(c.language.as_deref(), Some("en"));
        assert_eq!(c.event_tags.len(), 2);
        assert_eq!(c.event_tags[1].name, "goal");
        let topics = c.effective_topics();
        let gaming = topics.iter().find(|t| t.topic == "gaming").unwrap();
        assert_eq!(gaming.sub_topics.len(), 2);
        assert_eq!(gaming.sub_topics[1].name(), "platform");
        assert_eq!(gaming.sub_topics[1].description(), Some("console or pc"));
    }

    #[test]
    fn overwrite_replaces_defaults() {
        let doc = r#"
overwrite_user_profiles:
  - topic: psychological
    sub_topics: [mood]
  - topic: interest
    sub_topics: [travel]
"#;
        let c = ProfileConfig::from_yaml(doc).unwrap();
        let pairs = c.allowed_pairs();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("psychological".into(), "mood".into())));
        assert!(pairs.contains(&("interest".into(), "travel".into())));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ProfileConfig::from_yaml("language: fr").is_err());
        assert!(ProfileConfig::from_yaml("event_tags: 12").is_err());
        let huge = "x".repeat(MAX_PROFILE_CONFIG_BYTES + 1);
        assert!(ProfileConfig::from_yaml(&huge).is_err());
    }
}
