//! Message personalization: `{{placeholder}}` substitution then spintax.
//!
//! Built-in placeholders are `name`, `first_name`, `phone`, `date`
//! (YYYY-MM-DD) and `time` (HH:MM); personalization keys on the job extend
//! and override them. Unknown placeholders are left as written, even
//! inside a spintax group.
//!
//! Spintax `{Hi|Hello|Hey}` picks one option uniformly per occurrence.
//! Groups may nest; the innermost ones are resolved first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::{Captures, Regex};
use reachly_core::error::{ReachlyError, Result};
use reachly_core::types::Recipient;

pub struct TemplateRenderer {
    placeholder: Regex,
    spintax: Regex,
    parked: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let placeholder = Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}")
            .map_err(|e| ReachlyError::Other(format!("placeholder pattern: {e}")))?;
        let spintax = Regex::new(r"\{([^{}]*\|[^{}]*)\}")
            .map_err(|e| ReachlyError::Other(format!("spintax pattern: {e}")))?;
        let parked = Regex::new(r"\x01(\d+)\x02")
            .map_err(|e| ReachlyError::Other(format!("parked pattern: {e}")))?;
        Ok(Self {
            placeholder,
            spintax,
            parked,
        })
    }

    /// Placeholders and spintax, using the thread-local RNG.
    pub fn render(
        &self,
        text: &str,
        recipient: &Recipient,
        vars: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> String {
        self.render_with_rng(text, recipient, vars, now, &mut rand::thread_rng())
    }

    pub fn render_with_rng<R: Rng + ?Sized>(
        &self,
        text: &str,
        recipient: &Recipient,
        vars: &HashMap<String, String>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> String {
        // Unknown placeholders are parked brace-free so spintax around
        // them still resolves, then restored as written.
        let mut unknown = Vec::new();
        let substituted = self.substitute(text, recipient, vars, now, &mut unknown);
        let spun = self.spin(&substituted, rng);
        if unknown.is_empty() {
            return spun;
        }
        self.parked
            .replace_all(&spun, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| unknown.get(i).cloned())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Apply [`render`](Self::render) to every string inside a JSON value,
    /// used for template `components`.
    pub fn render_value(
        &self,
        value: &serde_json::Value,
        recipient: &Recipient,
        vars: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => Value::String(self.render(s, recipient, vars, now)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_value(v, recipient, vars, now))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v, recipient, vars, now)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn substitute(
        &self,
        text: &str,
        recipient: &Recipient,
        vars: &HashMap<String, String>,
        now: DateTime<Utc>,
        unknown: &mut Vec<String>,
    ) -> String {
        self.placeholder
            .replace_all(text, |caps: &Captures| {
                let key = &caps[1];
                if let Some(value) = vars.get(key) {
                    return value.clone();
                }
                match key {
                    "name" => recipient.name.clone(),
                    "first_name" => recipient
                        .name
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    "phone" => recipient.phone.clone(),
                    "date" => now.format("%Y-%m-%d").to_string(),
                    "time" => now.format("%H:%M").to_string(),
                    _ => {
                        unknown.push(caps[0].to_string());
                        format!("\u{1}{}\u{2}", unknown.len() - 1)
                    }
                }
            })
            .into_owned()
    }

    /// Resolve spintax groups.
    pub fn spin<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> String {
        let mut out = text.to_string();
        // Each pass removes at least one brace pair, so this terminates.
        while self.spintax.is_match(&out) {
            out = self
                .spintax
                .replace_all(&out, |caps: &Captures| {
                    let options: Vec<&str> = caps[1].split('|').collect();
                    options[rng.gen_range(0..options.len())].to_string()
                })
                .into_owned();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn recipient() -> Recipient {
        Recipient {
            id: "r-1".into(),
            name: "Nguyen Van An".into(),
            phone: "+84912345678".into(),
            scope_id: "proj-1".into(),
            last_sender: None,
            last_contacted_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_builtin_placeholders() {
        let renderer = TemplateRenderer::new().unwrap();
        let out = renderer.render(
            "Hi {{first_name}} ({{ name }}), today is {{date}} {{time}}",
            &recipient(),
            &HashMap::new(),
            now(),
        );
        assert_eq!(out, "Hi Nguyen (Nguyen Van An), today is 2025-03-14 09:05");
    }

    #[test]
    fn test_vars_override_and_unknown_kept() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "An".to_string());
        vars.insert("code".to_string(), "SALE20".to_string());
        let out = renderer.render("{{name}} use {{code}} {{missing}}", &recipient(), &vars, now());
        assert_eq!(out, "An use SALE20 {{missing}}");
    }

    #[test]
    fn test_spintax_around_unknown_placeholder() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let out = renderer.render_with_rng(
                "{Hi {{ missing }}|Hello} {{first_name}}",
                &recipient(),
                &HashMap::new(),
                now(),
                &mut rng,
            );
            assert!(["Hi {{ missing }} Nguyen", "Hello Nguyen"].contains(&out.as_str()), "{out}");
            seen.insert(out);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_spintax_picks_an_option() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let out = renderer.spin("{Hi|Hello|Hey} there", &mut rng);
            assert!(["Hi there", "Hello there", "Hey there"].contains(&out.as_str()), "{out}");
        }
    }

    #[test]
    fn test_nested_spintax() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let out = renderer.spin("{a|b{c|d}}", &mut rng);
            assert!(["a", "bc", "bd"].contains(&out.as_str()), "{out}");
            seen.insert(out);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_braces_without_options_untouched() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(renderer.spin("{single} {{kept}}", &mut rng), "{single} {{kept}}");
    }

    #[test]
    fn test_render_value_walks_components() {
        let renderer = TemplateRenderer::new().unwrap();
        let components = serde_json::json!([
            {"type": "body", "parameters": [{"type": "text", "text": "{{first_name}}"}]}
        ]);
        let out = renderer.render_value(&components, &recipient(), &HashMap::new(), now());
        assert_eq!(out[0]["parameters"][0]["text"], "Nguyen");
        assert_eq!(out[0]["type"], "body");
    }
}
