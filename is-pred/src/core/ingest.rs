use config::{EvalueRank, PredParams};
use hashbrown::{HashMap, HashSet};
use ispack::{HitMap, HmmHit};
use log::{info, warn};
use rayon::prelude::*;

/// Ranks hits by e-value and keeps the best one per locus
///
/// The sort is stable, so hits with equal e-values keep their input
/// order. Two hits share a locus when their compound IDs only differ
/// in the strand token. Applying this twice is a no-op.
///
/// # Arguments
///
/// * `hits` - hits of a single sequence
/// * `rank` - e-value field used for ordering
///
/// # Returns
///
/// * `Vec<HmmHit>` - ascending by the ranked e-value, one hit per locus
///
/// # Example
///
/// ```rust, ignore
/// let hits = rank_and_deduplicate_by_locus(hits, EvalueRank::default());
/// ```
pub fn rank_and_deduplicate_by_locus(mut hits: Vec<HmmHit>, rank: EvalueRank) -> Vec<HmmHit> {
    hits.sort_by(|a, b| a.evalue(rank).total_cmp(&b.evalue(rank)));

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.locus_key().to_string()))
        .collect()
}

/// Truncates an ascending hit list at the first e-value above `cutoff`
///
/// The input must be sorted by the same field `rank` selects.
pub fn apply_evalue_cutoff(mut hits: Vec<HmmHit>, cutoff: f64, rank: EvalueRank) -> Vec<HmmHit> {
    if let Some(idx) = hits.iter().position(|hit| hit.evalue(rank) > cutoff) {
        hits.truncate(idx);
    }

    hits
}

/// Ranks, deduplicates and cuts the hits of every sequence
///
/// Sequences left without significant hits are reported and dropped.
pub fn refine_hits(groups: HitMap, params: &PredParams) -> HashMap<String, Vec<HmmHit>> {
    let refined = groups
        .into_par_iter()
        .filter_map(|(seq_id, hits)| {
            let ranked = rank_and_deduplicate_by_locus(hits, params.rank);
            let significant = apply_evalue_cutoff(ranked, params.evalue_cutoff, params.rank);

            if significant.is_empty() {
                warn!(
                    "WARN: no significant hit with E-value <= {} found for {}",
                    params.evalue_cutoff, seq_id
                );
                return None;
            }

            Some((seq_id, significant))
        })
        .collect::<HashMap<_, _>>();

    info!(
        "Significant hits: {} in {} sequences",
        refined.values().map(|v| v.len()).sum::<usize>(),
        refined.len()
    );

    refined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, evalue: f64) -> HmmHit {
        let line = format!(
            "{id} - IS3_1 - {evalue:e} 10.0 0.0 {evalue:e} 10.0 0.0 1.0 1 0 0 1 1 1 1 -"
        );
        HmmHit::parse(&line).unwrap()
    }

    #[test]
    fn test_opposite_strand_hits_collapse_to_best() {
        let hits = vec![hit("s_100_400_+", 1e-20), hit("s_100_400_-", 1e-30)];
        let ranked = rank_and_deduplicate_by_locus(hits, EvalueRank::default());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].compound_id, "s_100_400_-");
        assert_eq!(ranked[0].best_domain_evalue, 1e-30);
    }

    #[test]
    fn test_rank_and_deduplicate_is_idempotent() {
        let hits = vec![
            hit("s_1_300_+", 1e-8),
            hit("s_500_900_-", 1e-12),
            hit("s_500_900_+", 1e-12),
            hit("s_1_300_-", 1e-3),
            hit("s_1000_1300_+", 1e-12),
        ];

        let once = rank_and_deduplicate_by_locus(hits, EvalueRank::DomainEvalue);
        let twice = rank_and_deduplicate_by_locus(once.clone(), EvalueRank::DomainEvalue);

        assert_eq!(once, twice);
        assert_eq!(
            once.iter().map(|h| h.compound_id.as_str()).collect::<Vec<_>>(),
            vec!["s_500_900_-", "s_1000_1300_+", "s_1_300_+"]
        );
    }

    #[test]
    fn test_cutoff_is_monotonic() {
        let hits = rank_and_deduplicate_by_locus(
            vec![
                hit("s_1_300_+", 1e-3),
                hit("s_400_700_+", 1e-6),
                hit("s_800_1100_+", 1e-9),
                hit("s_1200_1500_+", 1e-5),
            ],
            EvalueRank::default(),
        );

        let strict = apply_evalue_cutoff(hits.clone(), 1e-7, EvalueRank::default());
        let loose = apply_evalue_cutoff(hits.clone(), 1e-5, EvalueRank::default());

        assert_eq!(strict.len(), 1);
        assert_eq!(loose.len(), 3);
        assert!(strict.iter().all(|h| loose.contains(h)));
        assert!(apply_evalue_cutoff(hits, 1e-12, EvalueRank::default()).is_empty());
    }

    #[test]
    fn test_refine_hits_drops_empty_sequences() {
        let mut groups = HitMap::new();
        groups.insert("s".to_string(), vec![hit("s_1_300_+", 1e-20)]);
        groups.insert("t".to_string(), vec![hit("t_1_300_+", 1e-2)]);

        let refined = refine_hits(groups, &PredParams::default());

        assert_eq!(refined.len(), 1);
        assert!(refined.contains_key("s"));
    }
}
