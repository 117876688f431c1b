use serde::{Deserialize, Serialize};

use crate::{
    EvalueRank, FamilyTable, CLUSTER_CUT, COPY_IDENTITY, EVALUE_CUTOFF, EVALUE_SINGLE_COPY,
    FAR_TERMINUS_DISTANCE, IR_IDENTITY_SINGLE_COPY, MAX_ORF_GAP, MIN_TERMINUS_DISTANCE,
    MIN_THREADS, NEAR_TERMINUS_DISTANCE, OVERLAP_FRACTION,
};

/// Filter handed to the TIR detector
///
/// Repeats shorter than `min_length`, longer than `max_length`, with an
/// identity ratio below `min_identity` or with more than `max_gaps`
/// internal gaps are not reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TirFilter {
    pub min_length: usize,
    pub max_length: usize,
    pub min_identity: f64,
    pub max_gaps: usize,
}

// INFO: a permissive long-repeat pass and a stringent short-repeat pass
pub const TIR_FILTERS: [TirFilter; 2] = [
    TirFilter {
        min_length: 10,
        max_length: 55,
        min_identity: 0.6,
        max_gaps: 4,
    },
    TirFilter {
        min_length: 8,
        max_length: 30,
        min_identity: 0.85,
        max_gaps: 0,
    },
];

/// Every value the pipeline core consumes
#[derive(Debug, Clone)]
pub struct PredParams {
    pub rank: EvalueRank,
    pub evalue_cutoff: f64,
    pub max_orf_gap: u64,
    pub near_distance: i64,
    pub far_distance: i64,
    pub min_distance: i64,
    pub evalue_single_copy: f64,
    pub ir_identity_single_copy: f64,
    pub overlap_fraction: f64,
    pub cluster_cut: f64,
    pub copy_identity: f64,
    pub threads: usize,
    pub split_composite: bool,
    pub remove_short: bool,
    pub families: FamilyTable,
    pub tir_filters: Vec<TirFilter>,
}

impl Default for PredParams {
    fn default() -> Self {
        Self {
            rank: EvalueRank::default(),
            evalue_cutoff: EVALUE_CUTOFF,
            max_orf_gap: MAX_ORF_GAP,
            near_distance: NEAR_TERMINUS_DISTANCE,
            far_distance: FAR_TERMINUS_DISTANCE,
            min_distance: MIN_TERMINUS_DISTANCE,
            evalue_single_copy: EVALUE_SINGLE_COPY,
            ir_identity_single_copy: IR_IDENTITY_SINGLE_COPY,
            overlap_fraction: OVERLAP_FRACTION,
            cluster_cut: CLUSTER_CUT,
            copy_identity: COPY_IDENTITY,
            threads: MIN_THREADS,
            split_composite: true,
            remove_short: true,
            families: FamilyTable::default(),
            tir_filters: TIR_FILTERS.to_vec(),
        }
    }
}
