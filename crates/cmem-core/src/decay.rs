use cmem_types::{DecayConfig, DecayTier};

/// Evaluates a decay kernel at a given hop distance, clamped to `[0, 1]`.
pub fn weight(kernel: &DecayConfig, hop: u64) -> f64 {
    let raw = match kernel {
        DecayConfig::Linear { rate } => 1.0 - rate * hop as f64,
        DecayConfig::Exponential { weight_per_hop } => weight_per_hop.powi(hop as i32),
        DecayConfig::DelayedLinear { hold, rate } => delayed_linear(hop, *hold, *rate),
        DecayConfig::MultiTier { tiers } => tiers.iter().map(|t| tier_weight(hop, t)).sum(),
    };
    raw.clamp(0.0, 1.0)
}

fn delayed_linear(hop: u64, hold: u32, rate: f64) -> f64 {
    if hop <= hold as u64 {
        1.0
    } else {
        1.0 - rate * (hop - hold as u64) as f64
    }
}

fn tier_weight(hop: u64, tier: &DecayTier) -> f64 {
    tier.init * delayed_linear(hop, tier.hold, tier.rate)
}

/// Logarithmic boost applied for edges backed by multiple links between the
/// same pair of chunks: `1 + ln(link_count) * 0.1`. A single link (or zero,
/// treated the same as one) applies no boost.
pub fn link_boost(link_count: u32) -> f64 {
    if link_count <= 1 {
        1.0
    } else {
        1.0 + (link_count as f64).ln() * 0.1
    }
}
