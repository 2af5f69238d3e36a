use cmem_types::VectorClock;

/// Returns a new clock with `agent`'s tick incremented by one.
pub fn tick(clock: &VectorClock, agent: &str) -> VectorClock {
    let mut next = clock.clone();
    next.set(agent, clock.get(agent) + 1);
    next
}

/// Element-wise max of two clocks, over the union of their agents.
pub fn merge(a: &VectorClock, b: &VectorClock) -> VectorClock {
    let mut out = VectorClock::new();
    for agent in a.agents().chain(b.agents()) {
        out.set(agent, a.get(agent).max(b.get(agent)));
    }
    out
}

/// Folds `merge` over a sequence of clocks, returning an empty clock for
/// an empty input (used to recompute a project's reference clock from its
/// per-agent clocks).
pub fn fold_merge<'a>(clocks: impl IntoIterator<Item = &'a VectorClock>) -> VectorClock {
    clocks
        .into_iter()
        .fold(VectorClock::new(), |acc, c| merge(&acc, c))
}

/// The logical hop count of an edge clock against a reference clock
/// the sum, over every agent present in `edge_clock`, of
/// `max(0, ref_clock[agent] - edge_clock[agent])`. Agents present only in
/// `ref_clock` do not contribute (they did not exist at edge time); agents
/// missing from `ref_clock` contribute 0 (a terminated stream).
pub fn hop_count(edge_clock: &VectorClock, ref_clock: &VectorClock) -> u64 {
    edge_clock
        .agents()
        .map(|agent| {
            let edge_tick = edge_clock.get(agent);
            let ref_tick = ref_clock.get(agent);
            ref_tick.saturating_sub(edge_tick)
        })
        .sum()
}

/// `a <= b` component-wise, with strict inequality on at least one
/// component present in either clock.
pub fn happened_before(a: &VectorClock, b: &VectorClock) -> bool {
    let mut strictly_less = false;
    for agent in a.agents().chain(b.agents()) {
        let av = a.get(agent);
        let bv = b.get(agent);
        if av > bv {
            return false;
        }
        if av < bv {
            strictly_less = true;
        }
    }
    strictly_less
}

/// Two clocks are concurrent iff neither happened-before the other and
/// they are not equal.
pub fn concurrent(a: &VectorClock, b: &VectorClock) -> bool {
    !happened_before(a, b) && !happened_before(b, a) && !clocks_equal(a, b)
}

fn clocks_equal(a: &VectorClock, b: &VectorClock) -> bool {
    a.agents().chain(b.agents()).all(|agent| a.get(agent) == b.get(agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(pairs: &[(&str, u64)]) -> VectorClock {
        let mut c = VectorClock::new();
        for (agent, n) in pairs {
            c.set(agent, *n);
        }
        c
    }

    #[test]
    fn tick_is_monotonic() {
        let c0 = VectorClock::new();
        let c1 = tick(&c0, "a");
        let c2 = tick(&c1, "a");
        assert!(c1.get("a") < c2.get("a"));
    }

    #[test]
    fn merge_is_elementwise_max() {
        let a = clock(&[("x", 1), ("y", 5)]);
        let b = clock(&[("x", 3), ("z", 2)]);
        let m = merge(&a, &b);
        assert_eq!(m.get("x"), 3);
        assert_eq!(m.get("y"), 5);
        assert_eq!(m.get("z"), 2);
    }

    #[test]
    fn fold_merge_of_empty_is_empty() {
        let folded = fold_merge(std::iter::empty());
        assert!(folded.is_empty());
    }

    #[test]
    fn hop_symmetry_of_reference() {
        // hop_count(c, ref) == 0 iff c <= ref with equality on every agent
        // present in c.
        let edge_clock = clock(&[("a", 2), ("b", 1)]);
        let ref_equal = clock(&[("a", 2), ("b", 1), ("c", 9)]);
        assert_eq!(hop_count(&edge_clock, &ref_equal), 0);

        let ref_ahead = clock(&[("a", 5), ("b", 1)]);
        assert_eq!(hop_count(&edge_clock, &ref_ahead), 3);
    }

    #[test]
    fn hop_count_ignores_agents_only_in_reference() {
        let edge_clock = clock(&[("a", 1)]);
        let ref_clock = clock(&[("a", 1), ("new-agent", 50)]);
        assert_eq!(hop_count(&edge_clock, &ref_clock), 0);
    }

    #[test]
    fn hop_count_treats_missing_reference_agent_as_zero() {
        let edge_clock = clock(&[("gone", 7)]);
        let ref_clock = clock(&[("other", 3)]);
        assert_eq!(hop_count(&edge_clock, &ref_clock), 0);
    }

    #[test]
    fn happened_before_requires_strict_improvement() {
        let a = clock(&[("x", 1)]);
        let b = clock(&[("x", 1)]);
        assert!(!happened_before(&a, &b));

        let c = clock(&[("x", 2)]);
        assert!(happened_before(&a, &c));
    }

    #[test]
    fn concurrent_clocks_are_detected() {
        let a = clock(&[("x", 2), ("y", 0)]);
        let b = clock(&[("x", 0), ("y", 2)]);
        assert!(concurrent(&a, &b));
        assert!(!happened_before(&a, &b));
        assert!(!happened_before(&b, &a));
    }
}
