use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::ai::{AiClientError, ChatCompleter, ChatMessage, CompletionRequest};
use crate::constants::{JOB_CATEGORIES, NIGERIAN_STATES};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    pub title: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub remote: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Greeting,
    Help,
    Status,
    AboutService,
    Reset,
    Chat { response: String },
    Clarify { response: String },
    SearchJobs { filters: SearchFilters },
    ApplyJob { apply_all: bool, job_numbers: Vec<u32> },
}

/// A short window of prior turns, most recent last, used to disambiguate vague
/// single-word queries ("engineer" alone) and to power the context-aware fallback.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub recent_turns: Vec<String>,
}

impl ConversationContext {
    fn contains_any(&self, needles: &[&str]) -> bool {
        self.recent_turns.iter().any(|turn| {
            let lower = turn.to_ascii_lowercase();
            needles.iter().any(|needle| lower.contains(needle))
        })
    }

    fn find_category(&self) -> Option<&'static str> {
        JOB_CATEGORIES
            .iter()
            .find(|category| category.split('_').any(|word| self.contains_any(&[word])))
            .copied()
    }

    fn find_state(&self) -> Option<&'static str> {
        NIGERIAN_STATES.iter().find(|state| self.contains_any(&[&state.to_ascii_lowercase()])).copied()
    }
}

#[derive(Debug, Deserialize)]
struct AiIntentPayload {
    action: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    filters: Option<AiIntentFilters>,
}

#[derive(Debug, Deserialize)]
struct AiIntentFilters {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    remote: Option<bool>,
}

/// Two-stage resolver. Stage 1 is a deterministic ordered-check matcher over fixed
/// commands and job-category/state patterns, mirroring the teacher's
/// `rules::deterministic` first-match-wins evaluation. Stage 2 falls through to an
/// `LLMClient`-shaped AI call, parsed leniently, with a deterministic
/// context-aware guess as the final fallback.
pub struct IntentResolver {
    ai: Arc<dyn ChatCompleter>,
}

impl IntentResolver {
    pub fn new(ai: Arc<dyn ChatCompleter>) -> Self {
        Self { ai }
    }

    pub async fn resolve(&self, text: &str, context: &ConversationContext) -> Intent {
        if let Some(intent) = resolve_deterministic(text, context) {
            return intent;
        }

        match self.resolve_with_ai(text, context).await {
            Some(intent) => intent,
            None => context_aware_fallback(context),
        }
    }

    async fn resolve_with_ai(&self, text: &str, context: &ConversationContext) -> Option<Intent> {
        let mut messages = vec![ChatMessage::system(AI_SYSTEM_PROMPT)];
        messages.extend(context.recent_turns.iter().rev().take(6).rev().cloned().map(ChatMessage::user));
        messages.push(ChatMessage::user(text));

        let request = CompletionRequest {
            messages,
            temperature: 0.3,
            max_tokens: 400,
            json_mode: true,
        };

        let response = match self.ai.complete(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "intent resolution AI call failed");
                return None;
            }
        };

        parse_ai_intent(&response.content)
    }
}

const AI_SYSTEM_PROMPT: &str = "Classify the user's message into one of \
{about_service, chat, search_jobs, clarify, help}. Respond with a single JSON \
object: {\"action\": ..., \"response\": ..., \"filters\"?: {\"title\", \"location\", \"remote\"}}.";

fn parse_ai_intent(raw: &str) -> Option<Intent> {
    let cleaned = strip_code_fence(raw);
    let repaired = repair_trailing_brace(&cleaned);
    let value: Value = serde_json::from_str(&repaired).ok()?;
    let payload: AiIntentPayload = serde_json::from_value(value).ok()?;

    if payload.action.is_empty() {
        return None;
    }

    Some(match payload.action.as_str() {
        "about_service" => Intent::AboutService,
        "help" => Intent::Help,
        "clarify" => Intent::Clarify { response: payload.response },
        "search_jobs" => Intent::SearchJobs {
            filters: SearchFilters {
                title: payload.filters.as_ref().and_then(|f| f.title.clone()),
                category: None,
                location: payload.filters.as_ref().and_then(|f| f.location.clone()),
                remote: payload.filters.as_ref().and_then(|f| f.remote),
            },
        },
        _ => Intent::Chat { response: payload.response },
    })
}

fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_start = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_start.strip_suffix("```").unwrap_or(without_start).trim().to_string()
}

fn repair_trailing_brace(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('{') && !trimmed.ends_with('}') {
        format!("{trimmed}}}")
    } else {
        trimmed.to_string()
    }
}

fn resolve_deterministic(text: &str, context: &ConversationContext) -> Option<Intent> {
    let normalized = text.trim().to_ascii_lowercase();

    if normalized.is_empty() {
        return None;
    }

    if matches!(normalized.as_str(), "hi" | "hello" | "hey" | "good morning" | "good afternoon" | "good evening") {
        return Some(Intent::Greeting);
    }
    if normalized == "help" {
        return Some(Intent::Help);
    }
    if normalized == "status" {
        return Some(Intent::Status);
    }
    if normalized == "reset" {
        return Some(Intent::Reset);
    }
    if normalized == "about" || normalized == "about service" || normalized == "who are you" {
        return Some(Intent::AboutService);
    }

    if let Some(intent) = parse_apply_command(&normalized) {
        return Some(intent);
    }

    resolve_job_and_location(&normalized, context)
}

fn parse_apply_command(normalized: &str) -> Option<Intent> {
    if normalized == "apply all" {
        return Some(Intent::ApplyJob { apply_all: true, job_numbers: Vec::new() });
    }

    let rest = normalized.strip_prefix("apply ").or_else(|| (normalized == "apply").then_some(""))?;
    if rest.is_empty() {
        return Some(Intent::ApplyJob { apply_all: false, job_numbers: vec![1] });
    }

    let numbers: Vec<u32> = rest
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<u32>().ok())
        .collect();

    if numbers.is_empty() {
        return None;
    }
    Some(Intent::ApplyJob { apply_all: false, job_numbers: numbers })
}

fn resolve_job_and_location(normalized: &str, context: &ConversationContext) -> Option<Intent> {
    let category = match_job_category(normalized, context);
    let location = NIGERIAN_STATES
        .iter()
        .find(|state| normalized.contains(&state.to_ascii_lowercase()))
        .copied();

    match (category, location) {
        (Some(category), Some(location)) => Some(Intent::SearchJobs {
            filters: SearchFilters {
                title: None,
                category: Some(category.to_string()),
                location: Some(location.to_string()),
                remote: None,
            },
        }),
        (Some(_), None) => Some(Intent::Clarify {
            response: "Which state or city are you looking in?".to_string(),
        }),
        (None, Some(_)) => Some(Intent::Clarify {
            response: "What kind of job are you looking for?".to_string(),
        }),
        (None, None) => None,
    }
}

fn match_job_category(normalized: &str, context: &ConversationContext) -> Option<&'static str> {
    if normalized.contains("engineer") {
        if context.contains_any(&["software", "developer", "programming"]) {
            return Some("it_software");
        }
        if context.contains_any(&["network", "mechanical", "civil", "electrical"]) {
            return Some("engineering_technical");
        }
        return context.find_category().or(Some("engineering_technical"));
    }

    JOB_CATEGORIES
        .iter()
        .find(|category| normalized.contains(&category.replace('_', " ")))
        .copied()
}

fn context_aware_fallback(context: &ConversationContext) -> Intent {
    match (context.find_category(), context.find_state()) {
        (Some(category), Some(location)) => Intent::SearchJobs {
            filters: SearchFilters {
                title: None,
                category: Some(category.to_string()),
                location: Some(location.to_string()),
                remote: None,
            },
        },
        (Some(_), None) => Intent::Clarify {
            response: "Which state or city are you looking in?".to_string(),
        },
        (None, Some(_)) => Intent::Clarify {
            response: "What kind of job are you looking for?".to_string(),
        },
        (None, None) => Intent::Clarify {
            response: "Could you tell me what job you're looking for, and where?".to_string(),
        },
    }
}
