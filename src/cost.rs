//! Cost accounting for remote generation calls.
//!
//! Costs are *estimates* from a static price list keyed by model id, with a
//! per-category fallback for unknown models. They are not derived from
//! actual billing and must be updated by hand when provider pricing moves.
//! Projects can override prices through the `[pricing]` table of
//! `scenecast.toml`, keyed by model-id glob patterns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scenecast_config::pattern_matches;

/// Kind of generation work, used for fallback pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Image,
    ImageEdit,
    Video,
    Speech,
    SoundEffect,
    Music,
    Transcription,
}

impl CostCategory {
    /// Fallback estimate in USD per call.
    pub fn default_cost(self) -> f64 {
        match self {
            CostCategory::Image => 0.03,
            CostCategory::ImageEdit => 0.04,
            CostCategory::Video => 0.25,
            CostCategory::Speech => 0.01,
            CostCategory::SoundEffect => 0.02,
            CostCategory::Music => 0.05,
            CostCategory::Transcription => 0.005,
        }
    }
}

/// Known per-call prices (USD), approximate.
const KNOWN_PRICES: &[(&str, f64)] = &[
    ("fal-ai/flux/dev", 0.025),
    ("fal-ai/flux/schnell", 0.003),
    ("fal-ai/flux-pro/v1.1", 0.04),
    ("fal-ai/flux-pro/kontext", 0.04),
    ("fal-ai/nano-banana", 0.039),
    ("fal-ai/nano-banana/edit", 0.039),
    ("fal-ai/kling-video/v2.1/standard/image-to-video", 0.25),
    ("fal-ai/kling-video/v2.1/pro/image-to-video", 0.45),
    ("fal-ai/minimax/hailuo-02/standard/image-to-video", 0.27),
    ("fal-ai/f5-tts", 0.01),
    ("fal-ai/elevenlabs/sound-effects", 0.02),
    ("fal-ai/stable-audio", 0.05),
    ("fal-ai/whisper", 0.005),
];

/// Resolves a price for a model: overrides first, then the built-in list,
/// then the category default.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    overrides: BTreeMap<String, f64>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: BTreeMap<String, f64>) -> Self {
        Self { overrides }
    }

    pub fn estimate(&self, model: &str, category: CostCategory) -> f64 {
        if let Some(price) = self.overrides.get(model) {
            return *price;
        }
        if let Some((_, price)) = self
            .overrides
            .iter()
            .find(|(pattern, _)| pattern_matches(pattern, model))
        {
            return *price;
        }
        KNOWN_PRICES
            .iter()
            .find(|(id, _)| *id == model)
            .map(|(_, price)| *price)
            .unwrap_or_else(|| category.default_cost())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    pub model: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total: f64,
    pub breakdown: BTreeMap<String, f64>,
}

/// Per-run accumulator of cost records, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    records: Vec<CostRecord>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, model: impl Into<String>, cost: f64) {
        self.records.push(CostRecord {
            model: model.into(),
            cost,
        });
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> CostSummary {
        let mut breakdown: BTreeMap<String, f64> = BTreeMap::new();
        for record in &self.records {
            *breakdown.entry(record.model.clone()).or_default() += record.cost;
        }
        CostSummary {
            total: self.records.iter().map(|r| r.cost).sum(),
            breakdown,
        }
    }
}

/// Render a summary for terminal output.
pub fn format_summary(summary: &CostSummary) -> String {
    let mut out = format!("Estimated cost: ${:.3}\n", summary.total);
    for (model, cost) in &summary.breakdown {
        out.push_str(&format!("  {:<50} ${:.3}\n", model, cost));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_summary_groups_by_model() {
        let mut ledger = CostLedger::new();
        ledger.record("modelA", 0.03);
        ledger.record("modelB", 0.08);
        ledger.record("modelA", 0.03);

        let summary = ledger.summary();
        assert!(approx(summary.total, 0.14));
        assert_eq!(summary.breakdown.len(), 2);
        assert!(approx(summary.breakdown["modelA"], 0.06));
        assert!(approx(summary.breakdown["modelB"], 0.08));
        assert_eq!(ledger.records()[1].model, "modelB");
    }

    #[test]
    fn test_empty_summary() {
        let summary = CostLedger::new().summary();
        assert_eq!(summary.total, 0.0);
        assert!(summary.breakdown.is_empty());
    }

    #[test]
    fn test_known_model_price() {
        let table = PricingTable::new();
        assert!(approx(table.estimate("fal-ai/flux/dev", CostCategory::Image), 0.025));
    }

    #[test]
    fn test_unknown_model_uses_category_default() {
        let table = PricingTable::new();
        assert!(approx(table.estimate("acme/new-model", CostCategory::Video), 0.25));
        assert!(approx(
            table.estimate("acme/new-model", CostCategory::Transcription),
            0.005
        ));
    }

    #[test]
    fn test_overrides_exact_then_glob() {
        let mut overrides = BTreeMap::new();
        overrides.insert("fal-ai/kling-video/*".to_string(), 0.5);
        overrides.insert("fal-ai/flux/dev".to_string(), 0.02);
        let table = PricingTable::with_overrides(overrides);

        assert!(approx(table.estimate("fal-ai/flux/dev", CostCategory::Image), 0.02));
        assert!(approx(
            table.estimate(
                "fal-ai/kling-video/v2.1/pro/image-to-video",
                CostCategory::Video
            ),
            0.5
        ));
        assert!(approx(
            table.estimate("fal-ai/flux/schnell", CostCategory::Image),
            0.003
        ));
    }

    #[test]
    fn test_format_summary_lists_models() {
        let mut ledger = CostLedger::new();
        ledger.record("fal-ai/flux/dev", 0.025);
        let out = format_summary(&ledger.summary());
        assert!(out.contains("Estimated cost: $0.025"));
        assert!(out.contains("fal-ai/flux/dev"));
    }
}
