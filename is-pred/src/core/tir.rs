use bio::alignment::pairwise::Aligner as PairwiseAligner;
use bio::alignment::AlignmentOperation;
use config::TirFilter;
use hashbrown::HashMap;
use ispack::{reverse_complement, SequenceRecord, Tir};

use crate::core::align::AlignmentGroup;

/// Left and right flanks searched for a terminal inverted repeat
///
/// Both flanks are stored in forward orientation with 1-based, inclusive
/// genomic limits.
#[derive(Debug, Clone, PartialEq)]
pub struct TirWindow {
    pub key: String,
    pub left_begin: u64,
    pub left_end: u64,
    pub right_begin: u64,
    pub right_end: u64,
    pub left_seq: Vec<u8>,
    pub right_seq: Vec<u8>,
}

impl TirWindow {
    /// moves a TIR from flank-local to genomic coordinates
    pub fn restore(&self, tir: &Tir) -> Tir {
        Tir {
            left_start: self.left_begin + tir.left_start - 1,
            left_end: self.left_begin + tir.left_end - 1,
            right_start: self.right_begin + tir.right_start - 1,
            right_end: self.right_begin + tir.right_end - 1,
            ..tir.clone()
        }
    }
}

/// Finds inverted repeats between the two flanks of every window
///
/// Repeats passing at least one filter are returned per window key, in
/// filter order. Coordinates are local to each flank (1-based).
pub trait TirDetector: Send + Sync {
    fn detect(&self, windows: &[TirWindow], filters: &[TirFilter]) -> HashMap<String, Vec<Tir>>;
}

/// Smith-Waterman local alignment of the left flank against the
/// reverse complement of the right flank
#[derive(Debug, Clone, Copy)]
pub struct SswTirDetector {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for SswTirDetector {
    fn default() -> Self {
        Self {
            match_score: 2,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
        }
    }
}

impl SswTirDetector {
    fn align_flanks(&self, window: &TirWindow) -> Option<Tir> {
        if window.left_seq.is_empty() || window.right_seq.is_empty() {
            return None;
        }

        let x = window.left_seq.as_slice();
        let y = reverse_complement(&window.right_seq);
        let (matched, mismatched) = (self.match_score, self.mismatch_score);
        let score = |a: u8, b: u8| if a == b { matched } else { mismatched };

        let mut aligner = PairwiseAligner::with_capacity(
            x.len(),
            y.len(),
            self.gap_open,
            self.gap_extend,
            &score,
        );
        let alignment = aligner.local(x, &y);
        if alignment.score <= 0 {
            return None;
        }

        let (mut identity_count, mut length, mut gap_count) = (0u32, 0u32, 0u32);
        for op in alignment.operations.iter() {
            match op {
                AlignmentOperation::Match => {
                    identity_count += 1;
                    length += 1;
                }
                AlignmentOperation::Subst => length += 1,
                AlignmentOperation::Del | AlignmentOperation::Ins => {
                    gap_count += 1;
                    length += 1;
                }
                _ => {}
            }
        }

        // INFO: y runs backwards over the right flank
        let m = y.len();
        let right_start = m - alignment.yend;
        let right_end = m - alignment.ystart;

        Some(Tir {
            score: alignment.score as f64,
            identity_count,
            length,
            gap_count,
            left_start: alignment.xstart as u64 + 1,
            left_end: alignment.xend as u64,
            right_start: right_start as u64 + 1,
            right_end: right_end as u64,
            left_seq: String::from_utf8_lossy(&x[alignment.xstart..alignment.xend]).to_string(),
            right_seq: String::from_utf8_lossy(&window.right_seq[right_start..right_end])
                .to_string(),
        })
    }
}

/// true if a repeat satisfies every limit of the filter
pub fn passes(tir: &Tir, filter: &TirFilter) -> bool {
    let length = tir.length as usize;

    length >= filter.min_length
        && length <= filter.max_length
        && tir.identity_ratio() >= filter.min_identity
        && tir.gap_count as usize <= filter.max_gaps
}

impl TirDetector for SswTirDetector {
    fn detect(&self, windows: &[TirWindow], filters: &[TirFilter]) -> HashMap<String, Vec<Tir>> {
        // INFO: one alignment per window, every filter reads the same repeat
        windows
            .iter()
            .filter_map(|window| {
                self.align_flanks(window)
                    .filter(|tir| filters.iter().any(|filter| passes(tir, filter)))
                    .map(|tir| (window.key.clone(), vec![tir]))
            })
            .collect()
    }
}

/// Builds the flank pair searched around one alignment group
///
/// The left flank spans `[outer_begin - max_dist, begin - min_dist]` and
/// the right one `[end + min_dist, outer_end + max_dist]`, both clipped to
/// the sequence. `begin`/`end` are the ORF limits; the outer limits are
/// the ORF too, widened to the longest copy for multi-copy elements, so a
/// repeat right next to the ORF stays reachable.
pub fn flank_window(
    group: &AlignmentGroup,
    record: &SequenceRecord,
    max_dist: i64,
    min_dist: i64,
) -> Option<TirWindow> {
    let orf = &group.hit().orf;
    let (begin, end) = orf.span();
    let (outer_begin, outer_end) = match group.best_copy() {
        Some(copy) => (begin.min(copy.query_start), end.max(copy.query_end)),
        None => (begin, end),
    };

    let len = record.len() as i64;
    let clip = |a: i64, b: i64| {
        let (a, b) = (a.max(1), b.min(len));
        (a <= b).then_some((a as u64, b as u64))
    };

    let (left_begin, left_end) = clip(outer_begin as i64 - max_dist, begin as i64 - min_dist)?;
    let (right_begin, right_end) = clip(end as i64 + min_dist, outer_end as i64 + max_dist)?;

    Some(TirWindow {
        key: orf.to_string(),
        left_begin,
        left_end,
        right_begin,
        right_end,
        left_seq: record.slice(left_begin, left_end).to_vec(),
        right_seq: record.slice(right_begin, right_end).to_vec(),
    })
}

/// Runs the detector and keeps the best repeat per window, in genomic coordinates
///
/// The highest score wins; on ties the repeat from the earlier filter stays.
pub fn best_tirs(
    windows: &[TirWindow],
    filters: &[TirFilter],
    detector: &dyn TirDetector,
) -> HashMap<String, Tir> {
    let best = detector
        .detect(windows, filters)
        .into_iter()
        .filter_map(|(key, tirs)| {
            tirs.into_iter()
                .reduce(|a, b| if b.score > a.score { b } else { a })
                .map(|top| (key, top))
        })
        .collect::<HashMap<_, _>>();

    let by_key = windows
        .iter()
        .map(|w| (w.key.as_str(), w))
        .collect::<HashMap<_, _>>();

    best.into_iter()
        .filter_map(|(key, tir)| {
            let window = by_key.get(key.as_str())?;
            let restored = window.restore(&tir);
            Some((key, restored))
        })
        .collect()
}
