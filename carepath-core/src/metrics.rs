//! Distribution metrics over referral destinations.
use std::collections::BTreeMap;

use crate::numbers::count_to_f64;

/// Referral counts keyed by destination id. Ordered for stable reports.
pub type DestinationCounts = BTreeMap<String, usize>;

/// Increment the count for `destination`.
pub fn record(counts: &mut DestinationCounts, destination: &str) {
    *counts.entry(destination.to_string()).or_insert(0) += 1;
}

fn shares(counts: &DestinationCounts) -> Vec<f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }
    let total = count_to_f64(total);
    counts
        .values()
        .filter(|&&count| count > 0)
        .map(|&count| count_to_f64(count) / total)
        .collect()
}

/// Shannon entropy divided by `ln(k)` over the `k` destinations actually
/// used. Zero when `k <= 1`.
#[must_use]
pub fn normalized_entropy(counts: &DestinationCounts) -> f64 {
    let shares = shares(counts);
    if shares.len() <= 1 {
        return 0.0;
    }
    let entropy: f64 = -shares.iter().map(|p| p * p.ln()).sum::<f64>();
    entropy / count_to_f64(shares.len()).ln()
}

/// Herfindahl-Hirschman index `sum(p^2)`. Zero when nothing was counted.
#[must_use]
pub fn concentration_hhi(counts: &DestinationCounts) -> f64 {
    shares(counts).iter().map(|p| p * p).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(&str, usize)]) -> DestinationCounts {
        entries
            .iter()
            .map(|(id, count)| ((*id).to_string(), *count))
            .collect()
    }

    #[test]
    fn single_destination_is_fully_concentrated() {
        let c = counts(&[("A", 12)]);
        assert!(normalized_entropy(&c).abs() < 1e-12);
        assert!((concentration_hhi(&c) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn even_spread_maximizes_entropy() {
        for k in 2..6 {
            let entries: Vec<(String, usize)> = (0..k).map(|i| (format!("D{i}"), 7)).collect();
            let c: DestinationCounts = entries.into_iter().collect();
            assert!((normalized_entropy(&c) - 1.0).abs() < 1e-12);
            assert!((concentration_hhi(&c) - 1.0 / count_to_f64(k)).abs() < 1e-12);
        }
    }

    #[test]
    fn skewed_spread_sits_between_bounds() {
        let c = counts(&[("A", 9), ("B", 1)]);
        let entropy = normalized_entropy(&c);
        let hhi = concentration_hhi(&c);
        assert!(entropy > 0.0 && entropy < 1.0);
        assert!(hhi > 0.5 && hhi < 1.0);
    }

    #[test]
    fn empty_counts_are_zero() {
        let c = DestinationCounts::new();
        assert!(normalized_entropy(&c).abs() < f64::EPSILON);
        assert!(concentration_hhi(&c).abs() < f64::EPSILON);
    }

    #[test]
    fn record_accumulates() {
        let mut a = DestinationCounts::new();
        record(&mut a, "A");
        record(&mut a, "B");
        record(&mut a, "A");
        assert_eq!(a, counts(&[("A", 2), ("B", 1)]));
    }
}
