//! Sampler chain description and a CPU reference implementation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::TokenId;

/// Default seed for the final categorical draw.
pub const DEFAULT_SEED: u32 = 1234;

/// Decoding parameters for one model variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// 0 disables top-k.
    pub top_k: i32,
    /// 1.0 disables top-p.
    pub top_p: f32,
    /// 0.0 means greedy decoding.
    pub temperature: f32,
    #[serde(default = "default_seed")]
    pub seed: u32,
}

fn default_seed() -> u32 {
    DEFAULT_SEED
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
            seed: DEFAULT_SEED,
        }
    }
}

/// One step of a sampler chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SamplerStage {
    TopK(i32),
    TopP(f32),
    Temperature(f32),
    /// Seeded categorical draw over the remaining candidates.
    Dist(u32),
    Greedy,
}

impl SamplingParams {
    pub fn with_seed(mut self, seed: Option<u32>) -> Self {
        if let Some(seed) = seed {
            self.seed = seed;
        }
        self
    }

    /// Chain stages in application order: top-k, top-p, temperature, draw.
    ///
    /// Each filter only sees what the previous one kept, so the order is
    /// part of the sampling semantics.
    pub fn stages(&self) -> Vec<SamplerStage> {
        let mut stages = Vec::with_capacity(4);
        if self.top_k > 0 {
            stages.push(SamplerStage::TopK(self.top_k));
        }
        if self.top_p < 1.0 {
            stages.push(SamplerStage::TopP(self.top_p));
        }
        if self.temperature > 0.0 {
            stages.push(SamplerStage::Temperature(self.temperature));
            stages.push(SamplerStage::Dist(self.seed));
        } else {
            stages.push(SamplerStage::Greedy);
        }
        stages
    }
}

/// Applies a stage list to raw logits, for engines without a native sampler.
pub struct CpuSampler {
    stages: Vec<SamplerStage>,
    rng: StdRng,
}

impl CpuSampler {
    pub fn new(stages: &[SamplerStage]) -> Self {
        let seed = stages
            .iter()
            .find_map(|s| match s {
                SamplerStage::Dist(seed) => Some(*seed),
                _ => None,
            })
            .unwrap_or(DEFAULT_SEED);
        Self {
            stages: stages.to_vec(),
            rng: StdRng::seed_from_u64(u64::from(seed)),
        }
    }

    /// Pick one token id from `logits` (indexed by token id).
    ///
    /// Returns `None` only for an empty logits slice.
    pub fn sample(&mut self, logits: &[f32]) -> Option<TokenId> {
        let mut candidates: Vec<(TokenId, f32)> = logits
            .iter()
            .enumerate()
            .map(|(i, &l)| (i as TokenId, l))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        for stage in &self.stages {
            match *stage {
                SamplerStage::TopK(k) => {
                    sort_desc(&mut candidates);
                    candidates.truncate((k.max(1)) as usize);
                }
                SamplerStage::TopP(p) => {
                    sort_desc(&mut candidates);
                    let probs = softmax(&candidates);
                    let mut cumsum = 0.0f32;
                    let mut keep = candidates.len();
                    for (i, prob) in probs.iter().enumerate() {
                        cumsum += prob;
                        if cumsum >= p {
                            keep = i + 1;
                            break;
                        }
                    }
                    candidates.truncate(keep.max(1));
                }
                SamplerStage::Temperature(t) => {
                    let inv = 1.0 / t.max(f32::EPSILON);
                    for (_, l) in candidates.iter_mut() {
                        *l *= inv;
                    }
                }
                SamplerStage::Dist(_) => {
                    let probs = softmax(&candidates);
                    let r: f32 = self.rng.r#gen::<f32>();
                    let mut acc = 0.0f32;
                    for (i, prob) in probs.iter().enumerate() {
                        acc += prob;
                        if acc >= r {
                            return Some(candidates[i].0);
                        }
                    }
                    return candidates.last().map(|c| c.0);
                }
                SamplerStage::Greedy => {
                    return candidates
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(&b.1))
                        .map(|c| c.0);
                }
            }
        }

        // A chain without a terminal stage behaves greedily.
        candidates
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|c| c.0)
    }
}

fn sort_desc(candidates: &mut [(TokenId, f32)]) {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
}

fn softmax(candidates: &[(TokenId, f32)]) -> Vec<f32> {
    let max = candidates
        .iter()
        .map(|c| c.1)
        .fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = candidates.iter().map(|c| (c.1 - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
