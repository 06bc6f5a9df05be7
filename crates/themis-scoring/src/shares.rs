//! Splitting a maximum score into per-test shares.

/// Split `max_score` evenly across `n` tests.
pub fn equal_shares(max_score: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![max_score / n as f64; n]
}

/// Split `max_score` across tests in proportion to their strengths.
///
/// An all-zero strength vector yields all-zero shares: the strength sum is
/// treated as infinite instead of dividing by zero.
pub fn proportional_shares(max_score: f64, strengths: &[f64]) -> Vec<f64> {
    let mut total: f64 = strengths.iter().sum();
    if total == 0.0 {
        total = f64::INFINITY;
    }
    strengths.iter().map(|s| max_score / total * s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_equal_shares_sum_to_max() {
        for n in 1..=50 {
            let shares = equal_shares(100.0, n);
            assert_eq!(shares.len(), n);
            assert!(close(shares.iter().sum::<f64>(), 100.0), "n = {n}");
        }
        assert!(equal_shares(10.0, 0).is_empty());
    }

    #[test]
    fn test_proportional_shares() {
        let shares = proportional_shares(30.0, &[1.0, 2.0, 3.0]);
        assert!(close(shares[0], 5.0));
        assert!(close(shares[1], 10.0));
        assert!(close(shares[2], 15.0));
    }

    #[test]
    fn test_proportional_shares_all_zero() {
        let shares = proportional_shares(100.0, &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(shares, vec![0.0; 4]);
        assert!(shares.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_equal_strengths_match_equal_shares() {
        let a = proportional_shares(30.0, &[1.0, 1.0, 1.0]);
        let b = equal_shares(30.0, 3);
        for (x, y) in a.iter().zip(&b) {
            assert!(close(*x, *y));
        }
    }
}
