use config::{overlap_fraction, EvalueRank, FamilyTable, PredError, PredParams, MIN_COPIES};
use ispack::Candidate;

use crate::core::cluster::{condensed_matrix, fcluster, single_linkage};

use std::collections::BTreeSet;

/// Drops candidates shorter than the minimum element length of their family
pub fn filter_short(
    candidates: Vec<Candidate>,
    families: &FamilyTable,
) -> Result<Vec<Candidate>, PredError> {
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let bounds = families.get(candidate.family())?;
        if candidate.boundary.len() < bounds.min {
            log::debug!(
                "Dropping short element {:?} of {} [{} < {}]",
                candidate.boundary,
                candidate.orf,
                candidate.boundary.len(),
                bounds.min
            );
            continue;
        }
        kept.push(candidate);
    }

    Ok(kept)
}

/// Drops single-copy candidates with a weak hit and no convincing repeat
///
/// A candidate whose full-sequence e-value is above `evalue_single_copy`
/// and that was seen less than twice must carry a gapless TIR with an
/// identity ratio of at least `ir_identity_single_copy`.
pub fn filter_low_confidence_single_copy(
    candidates: Vec<Candidate>,
    params: &PredParams,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| {
            if candidate.hmm_hit.full_sequence_evalue <= params.evalue_single_copy
                || candidate.occurrence.copy_number_for_element >= MIN_COPIES
            {
                return true;
            }

            let confident = candidate.best_tir().is_some_and(|tir| {
                tir.gap_count == 0 && tir.identity_ratio() >= params.ir_identity_single_copy
            });
            if !confident {
                log::debug!("Dropping low-confidence single-copy element {}", candidate.orf);
            }
            confident
        })
        .collect()
}

/// Keeps one candidate per boundary, the one with the lowest e-value
///
/// Two neighboring ORFs extended to the same repeat pair end up with the
/// same boundary; only the most significant hit survives. The output is
/// ordered by boundary.
///
/// # Arguments
///
/// * `candidates` - candidates of one sequence
/// * `rank` - e-value used to pick the survivor
///
/// # Returns
///
/// * `Vec<Candidate>` - one candidate per distinct boundary
///
/// # Example
///
/// ```rust, ignore
/// let unique = deduplicate_by_locus(candidates, EvalueRank::FullSequenceEvalue);
/// ```
pub fn deduplicate_by_locus(mut candidates: Vec<Candidate>, rank: EvalueRank) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.boundary);

    let mut unique: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut group: Vec<Candidate> = Vec::new();

    let flush = |group: &mut Vec<Candidate>, unique: &mut Vec<Candidate>| {
        if group.len() > 1 {
            group.sort_by(|a, b| a.evalue(rank).total_cmp(&b.evalue(rank)));
            for redundant in group.iter().skip(1) {
                log::info!(
                    "Redundant element {:?} from {} [{}], keeping {}",
                    redundant.boundary,
                    redundant.orf,
                    redundant.evalue(rank),
                    group[0].orf
                );
            }
        }
        if !group.is_empty() {
            unique.push(group.swap_remove(0));
            group.clear();
        }
    };

    for candidate in candidates {
        if group.first().is_some_and(|g| g.boundary != candidate.boundary) {
            flush(&mut group, &mut unique);
        }
        group.push(candidate);
    }
    flush(&mut group, &mut unique);

    unique
}

/// Picks the representative of one overlap cluster
///
/// Multi-copy candidates win over single-copy ones, then the lowest
/// best-domain e-value, then input order.
fn representative(candidates: &[Candidate], members: &[usize]) -> usize {
    let multi = members
        .iter()
        .copied()
        .filter(|&idx| candidates[idx].is_multi_copy())
        .collect::<Vec<_>>();
    let pool = if multi.is_empty() { members.to_vec() } else { multi };

    // INFO: min_by keeps the first of equal elements
    pool.into_iter()
        .min_by(|&a, &b| {
            candidates[a]
                .hmm_hit
                .best_domain_evalue
                .total_cmp(&candidates[b].hmm_hit.best_domain_evalue)
        })
        .unwrap_or(members[0])
}

/// Collapses candidates whose boundaries overlap into one per cluster
///
/// Candidates taking part in at least one pair with an overlap fraction
/// of `overlap_fraction` or more are clustered by single linkage on
/// boundary dissimilarity and cut at `cluster_cut`. Every cluster is
/// replaced by its representative; the rest pass through untouched.
///
/// # Arguments
///
/// * `candidates` - candidates of one sequence
/// * `params` - run parameters
///
/// # Returns
///
/// * `Vec<Candidate>` - survivors sorted by boundary begin
///
/// # Example
///
/// ```rust, ignore
/// let survivors = resolve_overlaps(candidates, &PredParams::default());
/// ```
pub fn resolve_overlaps(candidates: Vec<Candidate>, params: &PredParams) -> Vec<Candidate> {
    let mut overlapping = BTreeSet::new();
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let fraction = overlap_fraction(
                candidates[i].boundary.span(),
                candidates[j].boundary.span(),
            );
            if fraction >= params.overlap_fraction {
                overlapping.insert(i);
                overlapping.insert(j);
            }
        }
    }

    if overlapping.is_empty() {
        return candidates;
    }

    let ids = overlapping.into_iter().collect::<Vec<_>>();
    let boundaries = ids.iter().map(|&i| candidates[i].boundary).collect::<Vec<_>>();
    let merges = single_linkage(ids.len(), &condensed_matrix(&boundaries));
    let labels = fcluster(ids.len(), &merges, params.cluster_cut);

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (pos, label) in labels.into_iter().enumerate() {
        if clusters.len() < label {
            clusters.resize_with(label, Vec::new);
        }
        clusters[label - 1].push(ids[pos]);
    }

    let keep = clusters
        .iter()
        .map(|members| {
            let rep = representative(&candidates, members);
            log::info!(
                "{} overlapping elements collapsed into {:?} from {}",
                members.len(),
                candidates[rep].boundary,
                candidates[rep].orf
            );
            rep
        })
        .collect::<BTreeSet<_>>();

    let ids = ids.into_iter().collect::<BTreeSet<_>>();
    let mut survivors = candidates
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !ids.contains(idx) || keep.contains(idx))
        .map(|(_, candidate)| candidate)
        .collect::<Vec<_>>();

    survivors.sort_by_key(|c| c.boundary.begin);
    survivors
}

/// Runs every refinement step on the candidates of one sequence
///
/// The short and low-confidence filters only run with `remove_short`.
/// Returns `None` when nothing survives them.
pub fn refine_candidates(
    seq_id: &str,
    candidates: Vec<Candidate>,
    params: &PredParams,
) -> Result<Option<Vec<Candidate>>, PredError> {
    // INFO: remove_short gates both length and single-copy confidence filters
    let candidates = if params.remove_short {
        let candidates = filter_short(candidates, &params.families)?;
        filter_low_confidence_single_copy(candidates, params)
    } else {
        candidates
    };

    if candidates.is_empty() {
        log::warn!("No IS element left in {} after filtering", seq_id);
        return Ok(None);
    }

    let candidates = deduplicate_by_locus(candidates, params.rank);
    Ok(Some(resolve_overlaps(candidates, params)))
}
