//! Up-front cost estimation.
//!
//! Works from the batch description alone: requested durations, never
//! measured ones, and no network or filesystem access.

use crate::pricing::clip_cost;
use crate::types::{BatchSpec, JobKind, round_cost};
use serde::{Deserialize, Serialize};

/// Lower bound of the estimate band, as a fraction of the nominal total.
pub const MIN_ESTIMATE_FACTOR: f64 = 0.9;
/// Upper bound of the estimate band, as a fraction of the nominal total.
pub const MAX_ESTIMATE_FACTOR: f64 = 1.2;

/// Cost band for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_jobs: usize,
    /// Sum of every job's list price.
    pub nominal_cost: f64,
    pub min_estimate: f64,
    pub max_estimate: f64,
    pub breakdown: CostBreakdown,
}

/// Nominal cost split by job kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub text_to_video: KindCost,
    pub image_to_video: KindCost,
    pub remix: KindCost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindCost {
    pub count: usize,
    pub cost: f64,
}

impl CostBreakdown {
    fn entry(&mut self, kind: JobKind) -> &mut KindCost {
        match kind {
            JobKind::TextToVideo => &mut self.text_to_video,
            JobKind::ImageToVideo => &mut self.image_to_video,
            JobKind::Remix => &mut self.remix,
        }
    }
}

/// Estimates what a batch will cost.
///
/// Remix jobs are priced with the batch defaults since their real parameters
/// come from the source video.
pub fn estimate_cost(spec: &BatchSpec) -> CostEstimate {
    let mut breakdown = CostBreakdown::default();
    let mut nominal = 0.0;

    for job in &spec.jobs {
        let params = job.effective(&spec.defaults);
        let cost = clip_cost(params.model, params.size, params.seconds);

        let entry = breakdown.entry(job.kind());
        entry.count += 1;
        entry.cost += cost;
        nominal += cost;
    }

    for kind in [JobKind::TextToVideo, JobKind::ImageToVideo, JobKind::Remix] {
        let entry = breakdown.entry(kind);
        entry.cost = round_cost(entry.cost);
    }

    CostEstimate {
        total_jobs: spec.jobs.len(),
        nominal_cost: round_cost(nominal),
        min_estimate: round_cost(nominal * MIN_ESTIMATE_FACTOR),
        max_estimate: round_cost(nominal * MAX_ESTIMATE_FACTOR),
        breakdown,
    }
}
