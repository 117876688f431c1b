use ispack::{Candidate, ScoreBreakdown};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Weight of every sub-score in the total
///
/// All weights default to zero: copy numbers and the repeat identity
/// are still reported, but the total stays at 0.0 until a weight is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub evalue: f64,
    pub tir: f64,
    pub occurrence: f64,
}

#[inline(always)]
fn weighted(weight: f64, value: f64) -> f64 {
    // INFO: a zero weight must give 0.0, not -0.0 or NaN
    if weight == 0.0 {
        0.0
    } else {
        weight * value
    }
}

/// -log10 of the e-value, capped for an e-value of zero
pub fn evalue_term(evalue: f64) -> f64 {
    if evalue > 0.0 {
        -evalue.log10()
    } else {
        -(f64::MIN_10_EXP as f64)
    }
}

/// F2 measure over element and ORF copy numbers
///
/// Copies of the whole element weigh twice as much as copies of the ORF
/// alone; a single copy of both gives 5 / 5 = 1.0.
pub fn occurrence_term(copies_for_element: usize, copies_for_orf: usize) -> f64 {
    let (n_is, n_orf) = (copies_for_element as f64, copies_for_orf as f64);
    let denominator = n_is + 4.0 * n_orf;
    if denominator == 0.0 {
        return 0.0;
    }

    let sum = n_is + n_orf - 1.0;
    5.0 * sum * sum / denominator
}

/// Scores one candidate
///
/// # Arguments
///
/// * `candidate` - refined candidate
/// * `weights` - sub-score weights
///
/// # Returns
///
/// * `ScoreBreakdown` - every sub-score, their sum and the evidence they
///   were computed from
///
/// # Example
///
/// ```rust, ignore
/// let breakdown = score(&candidate, &ScoreWeights::default());
/// assert_eq!(breakdown.total_score, 0.0);
/// ```
pub fn score(candidate: &Candidate, weights: &ScoreWeights) -> ScoreBreakdown {
    let occurrence = &candidate.occurrence;

    let evalue_score = weighted(
        weights.evalue,
        evalue_term(candidate.hmm_hit.full_sequence_evalue),
    );

    let (tir_identity_ratio, tir_score) = match candidate.best_tir() {
        Some(tir) => {
            let ratio = tir.identity_ratio();
            (ratio, weighted(weights.tir, tir.score * ratio * ratio))
        }
        None => (0.0, 0.0),
    };

    let direct_repeat_score = 0.0;
    let occurrence_score = weighted(
        weights.occurrence,
        occurrence_term(
            occurrence.copy_number_for_element,
            occurrence.copy_number_for_orf,
        ) * occurrence.similarity_for_element,
    );

    ScoreBreakdown {
        evalue_score,
        tir_score,
        direct_repeat_score,
        occurrence_score,
        total_score: evalue_score + tir_score + direct_repeat_score + occurrence_score,
        copy_number_for_orf: occurrence.copy_number_for_orf,
        copy_number_for_element: occurrence.copy_number_for_element,
        tir_identity_ratio,
    }
}

/// Attaches a score breakdown to every candidate
pub fn score_all(candidates: &mut [Candidate], weights: &ScoreWeights) {
    candidates.par_iter_mut().for_each(|candidate| {
        candidate.score = Some(score(candidate, weights));
    });
}
