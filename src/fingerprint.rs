//! Request fingerprinting.
//!
//! A fingerprint is the identity of a generation request: the processing
//! table and the response cache are both keyed by it. It is derived from the
//! semantic inputs only (prompt, model, system prompt, temperature) through a
//! canonical, key-sorted JSON encoding, so field order never influences it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Stable identifier for a request's semantic inputs.
///
/// Always 43 characters from `[A-Za-z0-9_-]`, safe as a map key and as an
/// external cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Prefix lengths used when truncation is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixTruncation {
    pub prompt_chars: usize,
    pub system_prompt_chars: usize,
}

impl Default for PrefixTruncation {
    fn default() -> Self {
        Self {
            prompt_chars: 100,
            system_prompt_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintGenerator {
    truncation: Option<PrefixTruncation>,
    salt: Option<String>,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash only a prefix of the prompt and system prompt.
    ///
    /// Two long prompts that share the prefix and every other field collide
    /// and are answered with the same response. That false positive is
    /// accepted in exchange for bounded hash input.
    pub fn with_prefix_truncation(mut self, truncation: PrefixTruncation) -> Self {
        self.truncation = Some(truncation);
        self
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: &str,
        temperature: f64,
    ) -> Fingerprint {
        let (prompt, system_prompt) = match self.truncation {
            Some(t) => (
                char_prefix(prompt, t.prompt_chars),
                char_prefix(system_prompt, t.system_prompt_chars),
            ),
            None => (prompt, system_prompt),
        };

        let mut parts: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        parts.insert("prompt", prompt.into());
        parts.insert("model", model.into());
        parts.insert("system_prompt", system_prompt.into());
        // -0.0 and 0.0 are the same temperature
        let temperature = if temperature == 0.0 { 0.0 } else { temperature };
        parts.insert(
            "temperature",
            serde_json::Number::from_f64(temperature)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(temperature.to_string())),
        );
        if let Some(ref s) = self.salt {
            parts.insert("salt", s.as_str().into());
        }

        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        Fingerprint(URL_SAFE_NO_PAD.encode(digest))
    }
}

fn char_prefix(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "models/gemini-2.0-flash";

    #[test]
    fn test_deterministic() {
        let gen = FingerprintGenerator::new();
        let a = gen.generate("Explain gravity", MODEL, "", 0.7);
        let b = gen.generate("Explain gravity", MODEL, "", 0.7);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_each_field_changes_fingerprint() {
        let gen = FingerprintGenerator::new();
        let base = gen.generate("Explain gravity", MODEL, "Be brief", 0.7);
        assert_ne!(base, gen.generate("Explain gravity!", MODEL, "Be brief", 0.7));
        assert_ne!(
            base,
            gen.generate("Explain gravity", "models/gemini-1.5-pro", "Be brief", 0.7)
        );
        assert_ne!(base, gen.generate("Explain gravity", MODEL, "Be long", 0.7));
        assert_ne!(base, gen.generate("Explain gravity", MODEL, "Be brief", 0.8));
        assert_ne!(base, gen.generate("Explain gravity", MODEL, "Be brief", 0.701));
    }

    #[test]
    fn test_field_boundaries_do_not_alias() {
        // a naive "prompt|model" join would make these equal
        let gen = FingerprintGenerator::new();
        let a = gen.generate("a|b", "c", "", 0.5);
        let b = gen.generate("a", "b|c", "", 0.5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_full_input_distinguishes_long_prompts() {
        let gen = FingerprintGenerator::new();
        let prefix = "x".repeat(100);
        let a = gen.generate(&format!("{prefix}one"), MODEL, "", 0.7);
        let b = gen.generate(&format!("{prefix}two"), MODEL, "", 0.7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_truncation_collides_on_shared_prefix() {
        let gen = FingerprintGenerator::new().with_prefix_truncation(PrefixTruncation::default());
        let prefix = "y".repeat(100);
        let a = gen.generate(&format!("{prefix}one"), MODEL, "", 0.7);
        let b = gen.generate(&format!("{prefix}two"), MODEL, "", 0.7);
        assert_eq!(a, b);
        // a difference inside the prefix still matters
        assert_ne!(a, gen.generate("short", MODEL, "", 0.7));
    }

    #[test]
    fn test_char_prefix_respects_utf8() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("hi", 10), "hi");
    }

    #[test]
    fn test_salt_changes_fingerprint() {
        let plain = FingerprintGenerator::new().generate("p", MODEL, "", 0.1);
        let salted = FingerprintGenerator::new()
            .with_salt("tenant-a")
            .generate("p", MODEL, "", 0.1);
        assert_ne!(plain, salted);
    }
}
