use config::PredParams;
use hashbrown::HashMap;
use ispack::{Boundary, Candidate, HmmHitInfo, Occurrence, Orf, SequenceRecord, Tir};

use crate::core::align::AlignmentGroup;
use crate::core::orfs::{NeighborIndex, Neighbors};
use crate::core::tir::{best_tirs, flank_window, TirDetector};

/// Evidence an element boundary was drawn from
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryEvidence {
    /// outer span of the terminal inverted repeat
    HasTir(Tir),
    /// span of the longest copy, or the ORF when that copy reached a neighbor ORF
    MultiCopyNoTir { span: Boundary, clipped: bool },
    /// the ORF itself
    SingleCopyNoTir,
}

impl BoundaryEvidence {
    pub fn boundary(&self, orf: &Orf) -> Boundary {
        match self {
            BoundaryEvidence::HasTir(tir) => Boundary::new(tir.left_start, tir.right_end),
            BoundaryEvidence::MultiCopyNoTir { span, .. } => *span,
            BoundaryEvidence::SingleCopyNoTir => Boundary::new(orf.begin, orf.end),
        }
    }
}

/// Picks the boundary evidence for one alignment group
///
/// A repeat always wins. Without one, an element seen more than once
/// takes the span of its longest copy; with `split_composite` that span
/// falls back to the ORF as soon as it touches the previous or next ORF,
/// which is how composite transposons get split into their members.
pub fn choose_boundary(
    group: &AlignmentGroup,
    tir: Option<Tir>,
    neighbors: &Neighbors,
    split_composite: bool,
) -> BoundaryEvidence {
    if let Some(tir) = tir {
        return BoundaryEvidence::HasTir(tir);
    }

    let Some(copy) = group.best_copy() else {
        return BoundaryEvidence::SingleCopyNoTir;
    };

    let orf = &group.hit().orf;
    let (start, end) = (copy.query_start, copy.query_end);
    let reaches_prev = neighbors.prev.as_ref().is_some_and(|prev| start <= prev.end);
    let reaches_next = neighbors.next.as_ref().is_some_and(|next| end >= next.begin);

    if split_composite && (reaches_prev || reaches_next) {
        BoundaryEvidence::MultiCopyNoTir {
            span: Boundary::new(orf.begin, orf.end),
            clipped: true,
        }
    } else {
        BoundaryEvidence::MultiCopyNoTir {
            span: Boundary::new(start, end),
            clipped: false,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Copy numbers and mean identities of an element and of its ORF
pub fn occurrence(group: &AlignmentGroup) -> Occurrence {
    let orf = &group.hit().orf;
    let covering = group
        .copies
        .iter()
        .filter(|copy| copy.query_start <= orf.begin && copy.query_end >= orf.end)
        .collect::<Vec<_>>();

    Occurrence {
        copy_number_for_element: group.copy_number(),
        similarity_for_element: mean(group.copies.iter().skip(1).map(|c| c.identity_fraction())),
        copy_number_for_orf: covering.len(),
        similarity_for_orf: mean(covering.iter().map(|c| c.identity_fraction())),
    }
}

/// Draws a candidate for every alignment group of one sequence
///
/// `max_dist` is the outer distance between a terminus and the ORF;
/// the near and far passes only differ in it.
///
/// # Arguments
///
/// * `groups` - alignment groups of the sequence
/// * `record` - the sequence
/// * `neighbors` - neighbor index of the sequence's ORFs
/// * `params` - run parameters
/// * `max_dist` - outer terminus distance of this pass
/// * `detector` - TIR detector
///
/// # Returns
///
/// * `Vec<Candidate>` - sorted by boundary begin
///
/// # Example
///
/// ```rust, ignore
/// let near = resolve_pass(&groups, &record, &index, &params, 300, &SswTirDetector::default());
/// ```
pub fn resolve_pass(
    groups: &[AlignmentGroup],
    record: &SequenceRecord,
    neighbors: &NeighborIndex,
    params: &PredParams,
    max_dist: i64,
    detector: &dyn TirDetector,
) -> Vec<Candidate> {
    let windows = groups
        .iter()
        .filter_map(|group| flank_window(group, record, max_dist, params.min_distance))
        .collect::<Vec<_>>();
    let tirs = best_tirs(&windows, &params.tir_filters, detector);

    let lonely = Neighbors::default();
    let mut candidates = groups
        .iter()
        .map(|group| {
            let orf = group.hit().orf.clone();
            let tir = tirs.get(&orf.to_string()).cloned();
            let evidence = choose_boundary(
                group,
                tir.clone(),
                neighbors.get(&orf).unwrap_or(&lonely),
                params.split_composite,
            );

            Candidate {
                boundary: evidence.boundary(&orf),
                tirs: tir.into_iter().collect(),
                hmm_hit: HmmHitInfo::from(group.hit()),
                occurrence: occurrence(group),
                score: None,
                orf,
            }
        })
        .collect::<Vec<_>>();

    candidates.sort_by_key(|c| c.boundary.begin);
    candidates
}

/// Reconciles the near and far passes of one sequence
///
/// For an ORF present in both, the candidate with the higher TIR score
/// is kept (no TIR scores 0, ties go to the near pass). ORFs seen by a
/// single pass are kept from that pass.
pub fn choose_hits(near: Vec<Candidate>, far: Vec<Candidate>) -> Vec<Candidate> {
    let mut far = far
        .into_iter()
        .map(|c| (c.orf.clone(), c))
        .collect::<HashMap<_, _>>();

    let mut chosen = near
        .into_iter()
        .map(|near| match far.remove(&near.orf) {
            Some(far) if far.tir_score() > near.tir_score() => far,
            _ => near,
        })
        .collect::<Vec<_>>();

    let mut rest = far.into_values().collect::<Vec<_>>();
    rest.sort_by_key(|c| c.orf.begin);
    chosen.extend(rest);

    chosen.sort_by_key(|c| c.boundary.begin);
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::align::ExtendedOrf;
    use crate::core::tir::TirWindow;
    use config::{Strand, TirFilter};
    use ispack::{Alignment, OrfHit};

    fn orf(begin: u64, end: u64) -> Orf {
        Orf::new("seq", begin, end, Strand::Forward)
    }

    fn copy(length: u64, start: u64, end: u64, identity: u64) -> Alignment {
        Alignment {
            query_id: "q".to_string(),
            subject_id: "seq".to_string(),
            aligned_length: length,
            query_start: start,
            query_end: end,
            subject_start: 1,
            subject_end: length,
            identity_count: identity,
            percent_identity: identity as f64 / length as f64 * 100.0,
        }
    }

    fn group(orf: Orf, copies: Vec<Alignment>) -> AlignmentGroup {
        AlignmentGroup {
            window: ExtendedOrf {
                hit: OrfHit {
                    orf,
                    family_name: "IS3_1".to_string(),
                    best_domain_evalue: 1e-20,
                    full_sequence_evalue: 1e-20,
                    overlap_count: 0,
                },
                begin: 2001,
                end: 4999,
            },
            copies,
        }
    }

    fn tir(score: f64, left_start: u64, right_end: u64) -> Tir {
        Tir {
            score,
            identity_count: 20,
            length: 20,
            gap_count: 0,
            left_start,
            left_end: left_start + 19,
            right_start: right_end - 19,
            right_end,
            left_seq: String::new(),
            right_seq: String::new(),
        }
    }

    #[test]
    fn test_multi_copy_boundary_uses_second_alignment() {
        let g = group(
            orf(3000, 4000),
            vec![
                copy(2999, 2001, 4999, 2999),
                copy(1700, 2500, 4199, 1690),
                copy(900, 3000, 3899, 899),
            ],
        );

        let evidence = choose_boundary(&g, None, &Neighbors::default(), true);
        assert_eq!(
            evidence,
            BoundaryEvidence::MultiCopyNoTir {
                span: Boundary::new(2500, 4199),
                clipped: false
            }
        );
    }

    #[test]
    fn test_split_composite_clips_to_orf() {
        let g = group(
            orf(3000, 4000),
            vec![copy(2999, 2001, 4999, 2999), copy(2000, 2200, 4199, 2000)],
        );
        let neighbors = Neighbors {
            prev: Some(orf(1000, 2300)),
            next: None,
        };

        let clipped = choose_boundary(&g, None, &neighbors, true);
        assert_eq!(clipped.boundary(&g.hit().orf), Boundary::new(3000, 4000));

        let kept = choose_boundary(&g, None, &neighbors, false);
        assert_eq!(kept.boundary(&g.hit().orf), Boundary::new(2200, 4199));
    }

    #[test]
    fn test_tir_and_single_copy_boundaries() {
        let single = group(orf(3000, 4000), vec![copy(2999, 2001, 4999, 2999)]);

        let with_tir = choose_boundary(
            &single,
            Some(tir(40.0, 2850, 4120)),
            &Neighbors::default(),
            true,
        );
        assert_eq!(with_tir.boundary(&single.hit().orf), Boundary::new(2850, 4120));

        let bare = choose_boundary(&single, None, &Neighbors::default(), true);
        assert_eq!(bare, BoundaryEvidence::SingleCopyNoTir);
        assert_eq!(bare.boundary(&single.hit().orf), Boundary::new(3000, 4000));
    }

    #[test]
    fn test_occurrence() {
        let g = group(
            orf(3000, 4000),
            vec![
                copy(2999, 2001, 4999, 2999),
                copy(2000, 2500, 4499, 1800),
                copy(500, 3200, 3699, 500),
            ],
        );

        let occ = occurrence(&g);
        assert_eq!(occ.copy_number_for_element, 3);
        assert!((occ.similarity_for_element - 0.95).abs() < 1e-12);
        assert_eq!(occ.copy_number_for_orf, 2);
        assert!((occ.similarity_for_orf - 0.95).abs() < 1e-12);

        let lone = occurrence(&group(orf(3000, 4000), vec![copy(2999, 2001, 4999, 2999)]));
        assert_eq!(lone.similarity_for_element, 0.0);
        assert_eq!(lone.copy_number_for_orf, 1);
    }

    fn candidate(begin: u64, end: u64, tir_score: Option<f64>) -> Candidate {
        let g = group(orf(begin, end), vec![copy(end - begin + 1, begin, end, 10)]);
        let tirs = tir_score
            .map(|s| vec![tir(s, begin - 100, end + 100)])
            .unwrap_or_default();
        let boundary = tirs
            .first()
            .map(|t| Boundary::new(t.left_start, t.right_end))
            .unwrap_or(Boundary::new(begin, end));

        Candidate {
            orf: g.hit().orf.clone(),
            tirs,
            hmm_hit: HmmHitInfo::from(g.hit()),
            boundary,
            occurrence: occurrence(&g),
            score: None,
        }
    }

    #[test]
    fn test_choose_hits_prefers_higher_tir_score() {
        let near = vec![
            candidate(1000, 2000, Some(30.0)),
            candidate(5000, 6000, None),
            candidate(8000, 9000, Some(20.0)),
        ];
        let far = vec![
            candidate(1000, 2000, Some(30.0)),
            candidate(5000, 6000, Some(12.0)),
            candidate(8000, 9000, Some(10.0)),
            candidate(12000, 13000, None),
        ];

        let chosen = choose_hits(near.clone(), far.clone());

        assert_eq!(chosen.len(), 4);
        assert_eq!(chosen[0], near[0]);
        assert_eq!(chosen[1], far[1]);
        assert_eq!(chosen[2], near[2]);
        assert_eq!(chosen[3], far[3]);
    }

    struct NoTir;

    impl TirDetector for NoTir {
        fn detect(&self, _: &[TirWindow], _: &[TirFilter]) -> HashMap<String, Vec<Tir>> {
            HashMap::new()
        }
    }

    #[test]
    fn test_resolve_pass_boundaries_stay_inside_sequence() {
        let record = SequenceRecord {
            id: "seq".to_string(),
            organism: "org".to_string(),
            file_id: "seq.fna".to_string(),
            seq: vec![b'A'; 6000],
        };
        let groups = vec![
            group(
                orf(3000, 4000),
                vec![copy(2999, 2001, 4999, 2999), copy(2000, 1, 2000, 2000)],
            ),
            group(orf(100, 900), vec![copy(900, 1, 900, 900)]),
        ];
        let hits = groups.iter().map(|g| g.hit().clone()).collect::<Vec<_>>();
        let index = crate::core::orfs::build_neighbor_index(&hits);

        let params = PredParams::default();
        let candidates = resolve_pass(&groups, &record, &index, &params, 300, &NoTir);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].orf.begin, 100);
        for c in candidates.iter() {
            assert!(c.boundary.begin >= 1 && c.boundary.begin <= c.boundary.end);
            assert!(c.boundary.end <= record.len());
        }
        // the second copy reaches the ORF at 100..900 and is clipped
        assert_eq!(candidates[1].boundary, Boundary::new(3000, 4000));
    }
}
