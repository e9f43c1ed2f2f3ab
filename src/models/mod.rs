//! 模型目录：受支持的 Gemini 模型及旧模型名称迁移。
//!
//! # Model Catalog
//!
//! Formulas written against older releases may still name retired models
//! (`gemini-pro`). [`migrate_model`] maps those, and anything unknown, onto a
//! current catalog entry so that equivalent requests share one fingerprint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub experimental: bool,
    pub legacy: bool,
}

pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "models/gemini-2.0-flash",
        display_name: "Gemini 2.0 Flash",
        experimental: false,
        legacy: false,
    },
    ModelInfo {
        id: "models/gemini-2.0-flash-lite",
        display_name: "Gemini 2.0 Flash Lite",
        experimental: true,
        legacy: false,
    },
    ModelInfo {
        id: "models/gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        experimental: false,
        legacy: false,
    },
];

static LEGACY_MODEL_MAPPING: once_cell::sync::Lazy<HashMap<&'static str, &'static str>> =
    once_cell::sync::Lazy::new(|| {
        HashMap::from([
            ("gemini-pro", DEFAULT_MODEL),
            ("gemini-pro-flash", DEFAULT_MODEL),
        ])
    });

/// Entry shown by the settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOption {
    pub name: String,
    pub display_name: String,
}

pub fn lookup(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}

/// Resolve a requested model name to a catalog model.
///
/// Empty → `fallback`; legacy alias → its replacement; catalog id → itself;
/// anything else → `fallback`.
pub fn migrate_model(model: Option<&str>, fallback: &str) -> String {
    let model = match model.map(str::trim) {
        Some(m) if !m.is_empty() => m,
        _ => return fallback.to_string(),
    };
    if let Some(mapped) = LEGACY_MODEL_MAPPING.get(model) {
        return mapped.to_string();
    }
    if lookup(model).is_some() {
        return model.to_string();
    }
    // bare names such as "gemini-1.5-pro"
    let qualified = format!("models/{}", model);
    if lookup(&qualified).is_some() {
        return qualified;
    }
    fallback.to_string()
}

/// Catalog entries visible under the given feature flags.
pub fn visible_models(experimental: bool, show_legacy: bool) -> Vec<ModelOption> {
    MODELS
        .iter()
        .filter(|m| experimental || !m.experimental)
        .filter(|m| show_legacy || !m.legacy)
        .map(|m| ModelOption {
            name: m.id.to_string(),
            display_name: m.display_name.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_names_migrate_to_default() {
        assert_eq!(migrate_model(Some("gemini-pro"), DEFAULT_MODEL), DEFAULT_MODEL);
        assert_eq!(migrate_model(Some("gemini-pro-flash"), DEFAULT_MODEL), DEFAULT_MODEL);
    }

    #[test]
    fn test_catalog_models_are_kept() {
        assert_eq!(
            migrate_model(Some("models/gemini-1.5-pro"), DEFAULT_MODEL),
            "models/gemini-1.5-pro"
        );
        assert_eq!(
            migrate_model(Some("gemini-2.0-flash-lite"), DEFAULT_MODEL),
            "models/gemini-2.0-flash-lite"
        );
    }

    #[test]
    fn test_empty_and_unknown_fall_back() {
        assert_eq!(migrate_model(None, "models/gemini-1.5-pro"), "models/gemini-1.5-pro");
        assert_eq!(migrate_model(Some("  "), DEFAULT_MODEL), DEFAULT_MODEL);
        assert_eq!(migrate_model(Some("gpt-4o"), DEFAULT_MODEL), DEFAULT_MODEL);
    }

    #[test]
    fn test_visible_models_hide_experimental() {
        let names: Vec<String> = visible_models(false, false).into_iter().map(|m| m.name).collect();
        assert!(!names.contains(&"models/gemini-2.0-flash-lite".to_string()));
        assert_eq!(visible_models(true, false).len(), MODELS.len());
    }
}
