//! Model-family detection from the model file path.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Unknown,
    Lfm2,
    Phi4,
    Qwen,
    DeepSeek,
}

/// Matched in order; first hit wins. `deepseek` precedes `qwen` because
/// distilled R1 files are named like `DeepSeek-R1-Distill-Qwen-1.5B`.
const KEYWORDS: &[(&str, ModelVariant)] = &[
    ("deepseek", ModelVariant::DeepSeek),
    ("lfm2", ModelVariant::Lfm2),
    ("phi4", ModelVariant::Phi4),
    ("phi-4", ModelVariant::Phi4),
    ("qwen", ModelVariant::Qwen),
];

impl ModelVariant {
    pub const ALL: [ModelVariant; 5] = [
        Self::Unknown,
        Self::Lfm2,
        Self::Phi4,
        Self::Qwen,
        Self::DeepSeek,
    ];

    /// Classify a model by its path. Never fails; no match is `Unknown`.
    pub fn detect(path: &str) -> Self {
        let lower = path.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(kw, _)| lower.contains(kw))
            .map(|&(_, v)| v)
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Lfm2 => "lfm2",
            Self::Phi4 => "phi4",
            Self::Qwen => "qwen",
            Self::DeepSeek => "deepseek",
        };
        f.write_str(s)
    }
}
