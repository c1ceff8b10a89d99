//! Workflow automation: inbound events become delayed `WorkflowLog` jobs.
//!
//! ## Architecture
//! ```text
//! InboundEvent (message, webhook)
//!   → AutomationEngine.evaluate(event)
//!     → for each enabled rule whose trigger matches:
//!       → one WorkflowLog job per action
//!         (trigger_time = now + delay_secs, contact merged into payload)
//!   → Engine.submit_all(jobs) → Scheduler
//! ```

use chrono::{DateTime, Utc};
use reachly_core::types::{Job, JobKind};
use serde::{Deserialize, Serialize};

/// Something a contact did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Inbound chat message.
    Message {
        contact_id: String,
        text: String,
        /// e.g. "whatsapp", "instagram"
        channel: String,
    },
    /// Named event posted by an external system, e.g. "order_paid".
    Webhook { contact_id: String, name: String },
}

impl InboundEvent {
    pub fn message(contact_id: &str, text: &str, channel: &str) -> Self {
        Self::Message {
            contact_id: contact_id.to_string(),
            text: text.to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn webhook(contact_id: &str, name: &str) -> Self {
        Self::Webhook {
            contact_id: contact_id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn contact_id(&self) -> &str {
        match self {
            Self::Message { contact_id, .. } | Self::Webhook { contact_id, .. } => contact_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Webhook { .. } => "webhook",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Message text contains the keywords (case-insensitive).
    Keyword {
        keywords: Vec<String>,
        #[serde(default)]
        match_mode: MatchMode,
        /// Empty = every channel.
        #[serde(default)]
        channels: Vec<String>,
    },
    /// Webhook event with this name.
    WebhookEvent { name: String },
}

/// One step run for the contact when the rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    /// Handler action, e.g. `send-message`.
    pub action: String,
    #[serde(default)]
    pub delay_secs: u64,
    /// Handler payload. String values may use `{{event.text}}`,
    /// `{{event.channel}}`, `{{event.name}}` and `{{event.contact_id}}`.
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub trigger: RuleTrigger,
    pub actions: Vec<RuleAction>,
}

fn default_true() -> bool {
    true
}

impl AutomationRule {
    pub fn new(name: &str, trigger: RuleTrigger, actions: Vec<RuleAction>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            enabled: true,
            trigger,
            actions,
        }
    }

    pub fn matches(&self, event: &InboundEvent) -> bool {
        if !self.enabled {
            return false;
        }
        match (&self.trigger, event) {
            (
                RuleTrigger::Keyword {
                    keywords,
                    match_mode,
                    channels,
                },
                InboundEvent::Message { text, channel, .. },
            ) => {
                if keywords.is_empty() {
                    return false;
                }
                if !channels.is_empty() && !channels.iter().any(|c| c.eq_ignore_ascii_case(channel)) {
                    return false;
                }
                let text = text.to_lowercase();
                let hit = |kw: &String| text.contains(&kw.to_lowercase());
                match match_mode {
                    MatchMode::Any => keywords.iter().any(hit),
                    MatchMode::All => keywords.iter().all(hit),
                }
            }
            (RuleTrigger::WebhookEvent { name }, InboundEvent::Webhook { name: fired, .. }) => {
                name == fired
            }
            _ => false,
        }
    }
}

/// Evaluates inbound events against automation rules.
#[derive(Debug, Default)]
pub struct AutomationEngine {
    rules: Vec<AutomationRule>,
}

impl AutomationEngine {
    pub fn new(rules: Vec<AutomationRule>) -> Self {
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: AutomationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[AutomationRule] {
        &self.rules
    }

    /// Jobs for every action of every matching rule.
    pub fn evaluate(&self, event: &InboundEvent, now: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(event)) {
            tracing::info!(
                "⚡ Automation '{}' matched {} event for {}",
                rule.name,
                event.kind(),
                event.contact_id()
            );
            for step in &rule.actions {
                let payload = action_payload(&step.params, event, &rule.id);
                let trigger_time = now + chrono::Duration::seconds(step.delay_secs as i64);
                jobs.push(Job::new(JobKind::WorkflowLog, &step.action, payload).at(trigger_time));
            }
        }
        jobs
    }
}

/// Interpolate event fields into `params` and attach the contact.
fn action_payload(params: &serde_json::Value, event: &InboundEvent, rule_id: &str) -> serde_json::Value {
    let mut payload = interpolate(params, event);
    if !payload.is_object() {
        payload = serde_json::json!({});
    }
    if let Some(map) = payload.as_object_mut() {
        let contact = serde_json::Value::String(event.contact_id().to_string());
        map.entry("contact_id").or_insert_with(|| contact.clone());
        map.entry("recipient_id").or_insert(contact);
        map.insert("rule_id".into(), serde_json::Value::String(rule_id.to_string()));
    }
    payload
}

fn interpolate(value: &serde_json::Value, event: &InboundEvent) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => {
            let (text, channel, name) = match event {
                InboundEvent::Message { text, channel, .. } => (text.as_str(), channel.as_str(), ""),
                InboundEvent::Webhook { name, .. } => ("", "", name.as_str()),
            };
            Value::String(
                s.replace("{{event.text}}", text)
                    .replace("{{event.channel}}", channel)
                    .replace("{{event.name}}", name)
                    .replace("{{event.contact_id}}", event.contact_id()),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, event)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, event)))
                .collect(),
        ),
        other => other.clone(),
    }
}
