//! Counter-mode score adjustment. Applied to the raw oracle score before smoothing.

use crate::config::CounterPolicy;
use crate::features::{FeatureSource, FeatureVector};

/// Boost sustained heavy downstream, penalize near-idle links. Packet-mode vectors pass through.
pub fn adjust_score(raw: f32, features: &FeatureVector, policy: &CounterPolicy) -> f32 {
    if features.source != FeatureSource::Counters || !policy.heuristic {
        return raw;
    }
    let bps = features.bitrate_down_bps();
    if bps > policy.boost_min_bps && features.down_up_ratio() > policy.boost_min_ratio {
        (raw + policy.boost).min(1.0)
    } else if bps < policy.penalty_max_bps {
        (raw - policy.penalty).max(0.0)
    } else {
        raw
    }
}
