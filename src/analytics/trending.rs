use std::collections::HashMap;

use crate::models::stats::ExtendedServer;
use crate::models::stats::ServerStats;

/// Pure scoring/padding half of the trending algorithm (§4.3). The I/O half
/// — fetching `recent`/`previous` install-event counts per server and the
/// top-rated pool for padding — lives in `analytics::mod`.
pub fn rank(
    recent_counts: &HashMap<String, u64>,
    previous_counts: &HashMap<String, u64>,
    stats_by_server: &HashMap<String, ServerStats>,
    top_rated_pool: &[ServerStats],
    limit: i64,
) -> Vec<ExtendedServer> {
    let mut scored: Vec<(String, f64, f64)> = recent_counts
        .keys()
        .map(|server_id| {
            let recent = *recent_counts.get(server_id).unwrap_or(&0) as f64;
            let previous = *previous_counts.get(server_id).unwrap_or(&0) as f64;
            let velocity = recent / 24.0;
            let momentum_change = if previous == 0.0 {
                100.0
            } else {
                100.0 * (recent - previous) / previous
            };
            let trending_score = velocity + 0.1 * momentum_change;
            (server_id.clone(), trending_score, momentum_change)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit.max(0) as usize);

    let mut included: std::collections::HashSet<String> = scored.iter().map(|(id, _, _)| id.clone()).collect();
    let mut out: Vec<ExtendedServer> = scored
        .into_iter()
        .map(|(server_id, trending_score, momentum_change)| {
            let stats = stats_by_server
                .get(&server_id)
                .cloned()
                .unwrap_or_else(|| ServerStats::empty(&server_id, Default::default(), ""));
            ExtendedServer {
                server_id,
                stats,
                trending_score: Some(trending_score),
                momentum_change: Some(momentum_change),
                trend_period: Some("24h".to_string()),
            }
        })
        .collect();

    if out.len() < limit as usize {
        let mut pool: Vec<&ServerStats> = top_rated_pool
            .iter()
            .filter(|s| s.rating >= 4.0 && !included.contains(&s.server_id))
            .collect();
        pool.sort_by(|a, b| {
            b.rating
                .partial_cmp(&a.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.install_count.cmp(&a.install_count))
        });
        for stats in pool {
            if out.len() >= limit as usize {
                break;
            }
            included.insert(stats.server_id.clone());
            out.push(ExtendedServer {
                server_id: stats.server_id.clone(),
                stats: stats.clone(),
                trending_score: None,
                momentum_change: Some(0.0),
                trend_period: Some("all-time".to_string()),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::Source;

    fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
        assert!(
            (actual - expected).abs() < epsilon,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn scores_velocity_and_momentum() {
        let mut recent = HashMap::new();
        recent.insert("a".to_string(), 48u64);
        let mut previous = HashMap::new();
        previous.insert("a".to_string(), 24u64);
        let stats = HashMap::new();
        let ranked = rank(&recent, &previous, &stats, &[], 5);
        assert_eq!(ranked.len(), 1);
        // velocity = 48/24 = 2.0, momentum = 100*(48-24)/24 = 100, score = 2 + 10 = 12
        assert_approx(ranked[0].trending_score.unwrap(), 12.0, 1e-6);
    }

    #[test]
    fn zero_previous_yields_momentum_100() {
        let mut recent = HashMap::new();
        recent.insert("a".to_string(), 24u64);
        let previous = HashMap::new();
        let stats = HashMap::new();
        let ranked = rank(&recent, &previous, &stats, &[], 5);
        assert_approx(ranked[0].momentum_change.unwrap(), 100.0, 1e-6);
    }

    #[test]
    fn pads_from_top_rated_when_short() {
        let recent = HashMap::new();
        let previous = HashMap::new();
        let stats = HashMap::new();
        let pool = vec![
            ServerStats { rating: 4.5, install_count: 10, ..empty("x") },
            ServerStats { rating: 4.2, install_count: 5, ..empty("y") },
            ServerStats { rating: 3.9, install_count: 100, ..empty("z") },
        ];
        let ranked = rank(&recent, &previous, &stats, &pool, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].server_id, "x");
        assert_eq!(ranked[1].server_id, "y");
        assert_eq!(ranked[0].trend_period.as_deref(), Some("all-time"));
        assert_eq!(ranked[0].momentum_change, Some(0.0));
    }

    fn empty(id: &str) -> ServerStats {
        ServerStats::empty(id, Source::Registry, "2026-01-01T00:00:00Z")
    }
}
