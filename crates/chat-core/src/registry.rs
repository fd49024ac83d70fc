//! Per-variant templates, stop sets and decoding defaults.
//!
//! [`PROFILES`] is the only place that differs by model family; everything
//! else reads a [`VariantProfile`] instead of matching on [`ModelVariant`].

use crate::context::ContextConfig;
use crate::sampler::{DEFAULT_SEED, SamplingParams};
use crate::template::{PLACEHOLDER, PromptTemplate, ResidualRule, StopSet};
use crate::variant::ModelVariant;

/// Everything that differs between model families.
#[derive(Debug, Clone, Copy)]
pub struct VariantProfile {
    pub variant: ModelVariant,
    pub display_name: &'static str,
    pub template: PromptTemplate,
    pub stop_sequences: &'static [&'static str],
    pub context_length: u32,
    pub sampling: SamplingParams,
    /// Whether tokenization prepends a beginning-of-sequence marker.
    pub add_bos: bool,
    /// Upper bound on newly generated tokens.
    pub max_new_tokens: u32,
    /// Tokens kept free at the end of the context.
    pub safety_margin: u32,
    pub residual: ResidualRule,
}

pub static PROFILES: [VariantProfile; 5] = [
    VariantProfile {
        variant: ModelVariant::Unknown,
        display_name: "Unknown model",
        template: PromptTemplate {
            system_preamble: concat!(
                "<|im_start|>system\n",
                "You are a helpful offline AI assistant. You work entirely on the user's device ",
                "to keep conversations private and secure. Provide helpful, accurate, and ",
                "informative responses.<|im_end|>\n"
            ),
            user_prefix: "<|im_start|>user\n",
            user_suffix: "<|im_end|>\n",
            assistant_prefix: "<|im_start|>assistant\n",
            placeholder: Some(PLACEHOLDER),
        },
        stop_sequences: &["<|im_end|>", "<|endoftext|>", "</s>", "<|im_start|>"],
        context_length: 2048,
        sampling: SamplingParams {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
            seed: DEFAULT_SEED,
        },
        add_bos: true,
        max_new_tokens: 1024,
        safety_margin: 50,
        residual: ResidualRule::Tags(&["<s>"]),
    },
    VariantProfile {
        variant: ModelVariant::Lfm2,
        display_name: "LFM2 1.2B",
        template: PromptTemplate {
            // The template carries its own `<|startoftext|>`, so no BOS is added.
            system_preamble: concat!(
                "<|startoftext|><|im_start|>system\n",
                "You are a helpful offline AI assistant. You work entirely on the user's device ",
                "to keep conversations private and secure. Provide helpful, accurate, and ",
                "informative responses.<|im_end|>\n"
            ),
            user_prefix: "<|im_start|>user\n",
            user_suffix: "<|im_end|>\n",
            assistant_prefix: "<|im_start|>assistant\n",
            placeholder: Some(PLACEHOLDER),
        },
        stop_sequences: &["<|im_end|>", "<|endoftext|>", "<|im_start|>"],
        context_length: 4096,
        sampling: SamplingParams {
            top_k: 50,
            top_p: 0.9,
            temperature: 0.3,
            seed: DEFAULT_SEED,
        },
        add_bos: false,
        max_new_tokens: 1024,
        safety_margin: 64,
        residual: ResidualRule::Tags(&["<|startoftext|>"]),
    },
    VariantProfile {
        variant: ModelVariant::Phi4,
        display_name: "Phi-4 Mini Instruct",
        template: PromptTemplate {
            system_preamble: concat!(
                "<|system|>",
                "You are a helpful offline AI assistant. You work entirely on the user's device ",
                "to keep conversations private and secure. Provide helpful, accurate, and ",
                "informative responses.<|end|>"
            ),
            user_prefix: "<|user|>",
            user_suffix: "<|end|>",
            assistant_prefix: "<|assistant|>",
            placeholder: Some(PLACEHOLDER),
        },
        stop_sequences: &["<|end|>", "<|endoftext|>", "<|user|>"],
        context_length: 4096,
        sampling: SamplingParams {
            top_k: 40,
            top_p: 0.9,
            temperature: 0.7,
            seed: DEFAULT_SEED,
        },
        add_bos: true,
        max_new_tokens: 1024,
        safety_margin: 64,
        residual: ResidualRule::Tags(&["<|assistant|>", "<|system|>"]),
    },
    VariantProfile {
        variant: ModelVariant::Qwen,
        display_name: "Qwen 1.5 1.8B",
        template: PromptTemplate {
            system_preamble: concat!(
                "<|im_start|>system\n",
                "You are Qwen, a helpful offline AI assistant. You work entirely on the user's ",
                "device to keep conversations private and secure. Provide helpful, accurate, and ",
                "informative responses.<|im_end|>\n"
            ),
            user_prefix: "<|im_start|>user\n",
            user_suffix: "<|im_end|>\n",
            assistant_prefix: "<|im_start|>assistant\n",
            placeholder: Some(PLACEHOLDER),
        },
        stop_sequences: &["<|im_end|>", "<|endoftext|>", "<|im_start|>"],
        context_length: 4096,
        sampling: SamplingParams {
            top_k: 20,
            top_p: 0.8,
            temperature: 0.7,
            seed: DEFAULT_SEED,
        },
        add_bos: true,
        max_new_tokens: 1024,
        safety_margin: 64,
        residual: ResidualRule::Tags(&[]),
    },
    VariantProfile {
        variant: ModelVariant::DeepSeek,
        display_name: "DeepSeek-R1 Distill 1.5B",
        template: PromptTemplate {
            // R1 distills are tuned without a system turn.
            system_preamble: "",
            user_prefix: "<｜User｜>",
            user_suffix: "",
            assistant_prefix: "<｜Assistant｜>",
            placeholder: Some(PLACEHOLDER),
        },
        stop_sequences: &["<｜end▁of▁sentence｜>", "<｜User｜>"],
        context_length: 4096,
        sampling: SamplingParams {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.6,
            seed: DEFAULT_SEED,
        },
        add_bos: true,
        // Room for the reasoning block.
        max_new_tokens: 2048,
        safety_margin: 64,
        residual: ResidualRule::ThinkBlocks(&["<｜Assistant｜>"]),
    },
];

/// Profile for `variant`; falls back to the generic `Unknown` profile.
pub fn profile(variant: ModelVariant) -> &'static VariantProfile {
    PROFILES
        .iter()
        .find(|p| p.variant == variant)
        .unwrap_or(&PROFILES[0])
}

pub fn template_for(variant: ModelVariant) -> PromptTemplate {
    profile(variant).template
}

pub fn stop_sequences_for(variant: ModelVariant) -> StopSet {
    StopSet::new(profile(variant).stop_sequences.iter().copied())
}

pub fn context_defaults_for(variant: ModelVariant) -> ContextConfig {
    ContextConfig::with_length(profile(variant).context_length)
}

pub fn sampling_defaults_for(variant: ModelVariant) -> SamplingParams {
    profile(variant).sampling
}
