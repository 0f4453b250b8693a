//! Severity and combination formulas
//!
//! Kept apart from detection so they can be recalibrated without touching
//! the detectors. Every function returns a value in `[0, 1]` (or `[0, 100]`
//! for [`noisy_or`]).

/// Lowest hop factor a long cycle can fall to
pub const CYCLE_HOP_FLOOR: f64 = 0.4;

/// Hop count at which the hop factor starts to decay
pub const CYCLE_REFERENCE_HOPS: f64 = 3.0;

/// Fan weight at exactly the threshold
pub const FAN_BASE_WEIGHT: f64 = 0.5;

/// Share of fan severity driven by amount uniformity
pub const FAN_UNIFORMITY_SHARE: f64 = 0.4;

/// Layering weight before any pass-through hop
pub const LAYERING_BASE_WEIGHT: f64 = 0.4;

/// Layering weight added per pass-through hop
pub const LAYERING_HOP_WEIGHT: f64 = 0.15;

/// Cycle severity from hop count and amount retention
///
/// `retention` is min/max of the closing and opening amounts; a cycle that
/// brings back most of the value scores higher.
pub fn cycle_severity(hops: usize, retention: f64) -> f64 {
    if hops == 0 {
        return 0.0;
    }
    let hop_factor = (CYCLE_REFERENCE_HOPS / hops as f64).clamp(CYCLE_HOP_FLOOR, 1.0);
    let consistency = 0.5 + 0.5 * retention.clamp(0.0, 1.0);
    (hop_factor * consistency).clamp(0.0, 1.0)
}

/// Fan severity from distinct counterparties, threshold and amount uniformity
pub fn fan_severity(distinct: usize, threshold: usize, uniformity: f64) -> f64 {
    if threshold == 0 || distinct < threshold {
        return 0.0;
    }
    let excess = ((distinct - threshold) as f64 / threshold as f64).min(1.0);
    let size = FAN_BASE_WEIGHT + (1.0 - FAN_BASE_WEIGHT) * excess;
    let shape = (1.0 - FAN_UNIFORMITY_SHARE) + FAN_UNIFORMITY_SHARE * uniformity.clamp(0.0, 1.0);
    (size * shape).clamp(0.0, 1.0)
}

/// Layering severity from pass-through hops and cumulative leakage
pub fn layering_severity(passthrough_hops: usize, leakage: f64) -> f64 {
    let length = (LAYERING_BASE_WEIGHT + LAYERING_HOP_WEIGHT * passthrough_hops as f64).min(1.0);
    (length * (1.0 - leakage.clamp(0.0, 1.0))).clamp(0.0, 1.0)
}

/// Ratio of the smaller to the larger amount
pub fn amount_retention(first: f64, last: f64) -> f64 {
    let (lo, hi) = if first <= last { (first, last) } else { (last, first) };
    if hi <= 0.0 {
        0.0
    } else {
        lo / hi
    }
}

/// `1 - min(1, cv)` of the amounts; 1.0 when all amounts are equal
pub fn amount_uniformity(amounts: &[f64]) -> f64 {
    if amounts.len() < 2 {
        return 1.0;
    }
    let n = amounts.len() as f64;
    let mean = amounts.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    1.0 - cv.min(1.0)
}

/// Noisy-OR combination, scaled to `[0, 100]`
pub fn noisy_or<I: IntoIterator<Item = f64>>(weights: I) -> f64 {
    let miss: f64 = weights
        .into_iter()
        .map(|w| 1.0 - w.clamp(0.0, 1.0))
        .product();
    (100.0 * (1.0 - miss)).clamp(0.0, 100.0)
}
