//! Sampler pipeline planning.
//!
//! A request's sampling parameters are turned into an ordered list of
//! [`SamplerStage`]s; the backend instantiates that list as a real sampler
//! chain. Keeping the plan as plain data lets the ordering rules be tested
//! without an engine.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One stage of a sampler chain, in the order it is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStage {
    /// Keep the `k` most probable candidates.
    TopK(i32),
    /// Keep the smallest set whose cumulative probability reaches `p`.
    TopP { p: f32, min_keep: usize },
    /// Rescale logits by `1 / t`.
    Temperature(f32),
    /// Pick the arg-max candidate.
    Greedy,
    /// Draw from the remaining distribution.
    Distribution { seed: u32 },
}

impl SamplerStage {
    /// Whether this stage selects the token (as opposed to filtering).
    pub fn is_selector(&self) -> bool {
        matches!(self, Self::Greedy | Self::Distribution { .. })
    }
}

/// User-facing sampling configuration for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// `<= 0` selects greedy decoding.
    #[serde(default = "default_temp")]
    pub temperature: f32,
    /// `0` disables the top-k filter.
    #[serde(default = "default_top_k")]
    pub top_k: i32,
    /// `1.0` disables the nucleus filter.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temp() -> f32 {
    0.7
}
fn default_top_k() -> i32 {
    30
}
fn default_top_p() -> f32 {
    0.95
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temp(),
            top_k: default_top_k(),
            top_p: default_top_p(),
        }
    }
}

impl SamplingParams {
    /// Deterministic arg-max decoding with every filter disabled.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_k: 0,
            top_p: 1.0,
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    /// Ordered stage list: filters first, then temperature, then exactly
    /// one selector. `seed` is only used by the distribution selector.
    pub fn plan(&self, seed: u32) -> Vec<SamplerStage> {
        let mut stages = Vec::with_capacity(4);

        if self.top_k > 0 {
            stages.push(SamplerStage::TopK(self.top_k));
        }
        if self.top_p < 1.0 {
            stages.push(SamplerStage::TopP {
                p: self.top_p,
                min_keep: 1,
            });
        }
        if self.temperature > 0.0 && self.temperature != 1.0 {
            stages.push(SamplerStage::Temperature(self.temperature));
        }

        if self.is_greedy() {
            stages.push(SamplerStage::Greedy);
        } else {
            stages.push(SamplerStage::Distribution { seed });
        }

        stages
    }
}

/// Seed derived from the wall clock in microseconds.
pub fn timestamp_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_has_single_stage() {
        assert_eq!(SamplingParams::greedy().plan(7), vec![SamplerStage::Greedy]);
    }

    #[test]
    fn full_pipeline_order() {
        let params = SamplingParams {
            temperature: 0.6,
            top_k: 40,
            top_p: 0.9,
        };
        assert_eq!(
            params.plan(42),
            vec![
                SamplerStage::TopK(40),
                SamplerStage::TopP {
                    p: 0.9,
                    min_keep: 1
                },
                SamplerStage::Temperature(0.6),
                SamplerStage::Distribution { seed: 42 },
            ]
        );
    }

    #[test]
    fn unit_temperature_skips_rescaling() {
        let params = SamplingParams {
            temperature: 1.0,
            top_k: 0,
            top_p: 1.0,
        };
        assert_eq!(
            params.plan(3),
            vec![SamplerStage::Distribution { seed: 3 }]
        );
    }

    #[test]
    fn filters_still_apply_under_greedy() {
        let params = SamplingParams {
            temperature: 0.0,
            top_k: 5,
            top_p: 0.5,
        };
        let stages = params.plan(0);
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[2], SamplerStage::Greedy);
        assert!(!stages.iter().any(|s| matches!(s, SamplerStage::Temperature(_))));
    }

    #[test]
    fn negative_temperature_is_greedy() {
        let params = SamplingParams {
            temperature: -0.5,
            ..SamplingParams::greedy()
        };
        assert!(params.is_greedy());
        assert_eq!(params.plan(1), vec![SamplerStage::Greedy]);
    }

    #[test]
    fn negative_top_k_is_disabled() {
        let params = SamplingParams {
            top_k: -3,
            ..SamplingParams::greedy()
        };
        assert_eq!(params.plan(0), vec![SamplerStage::Greedy]);
    }

    #[test]
    fn exactly_one_selector_last() {
        for temperature in [0.0, 0.2, 1.0, 1.5] {
            let params = SamplingParams {
                temperature,
                ..Default::default()
            };
            let stages = params.plan(9);
            let selectors = stages.iter().filter(|s| s.is_selector()).count();
            assert_eq!(selectors, 1);
            assert!(stages.last().is_some_and(SamplerStage::is_selector));
        }
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let params: SamplingParams = serde_json::from_str(r#"{"top_k": 10}"#).unwrap();
        assert_eq!(params.top_k, 10);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.95);
    }
}
