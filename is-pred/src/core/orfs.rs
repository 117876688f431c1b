use config::{intergap, FamilyTable, PredError, MIN_LENGTH_RATIO};
use hashbrown::{HashMap, HashSet};
use ispack::{HmmHit, Orf, OrfHit};

/// ORFs absorbed into a merged virtual ORF
pub type MergedOrfs = HashSet<Orf>;

/// Predecessor and successor of an ORF along the sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub prev: Option<Orf>,
    pub next: Option<Orf>,
}

pub type NeighborIndex = HashMap<Orf, Neighbors>;

/// Converts ranked hits of one sequence into ORF hits
///
/// Every hit must belong to a family present in the length table;
/// anything else stops the run.
pub fn to_orf_hits(hits: Vec<HmmHit>, families: &FamilyTable) -> Result<Vec<OrfHit>, PredError> {
    hits.into_iter()
        .map(|hit| {
            let compound_id = hit.compound_id.clone();
            let orf_hit =
                OrfHit::from_hit(hit).map_err(|_| PredError::UnknownFamily(compound_id))?;

            families.get(orf_hit.family())?;
            Ok(orf_hit)
        })
        .collect()
}

/// Merges adjacent ORF pairs of the two-gene family into virtual ORFs
///
/// Only pairs where both hits belong to the two-gene family and the
/// longer ORF is at least twice as long as the shorter one qualify.
/// Pairs are visited by increasing gap and the scan stops at the first
/// gap above `max_gap`; an ORF is merged at most once. The merged hit
/// takes strand and metadata from the member with the lower
/// full-sequence e-value (the first member on ties).
///
/// # Arguments
///
/// * `hits` - ORF hits of one sequence
/// * `max_gap` - largest gap allowed between the two ORFs
///
/// # Returns
///
/// * `(Vec<OrfHit>, MergedOrfs)` - hits sorted by ORF begin and the
///   set of ORFs absorbed into merged hits
///
/// # Example
///
/// ```rust, ignore
/// let (hits, merged) = merge_two_gene_family_orfs(hits, 100);
/// ```
pub fn merge_two_gene_family_orfs(hits: Vec<OrfHit>, max_gap: u64) -> (Vec<OrfHit>, MergedOrfs) {
    let mut pairs = Vec::new();
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            let (a, b) = (&hits[i], &hits[j]);
            if !a.is_two_gene_family() || !b.is_two_gene_family() {
                continue;
            }

            let (len_a, len_b) = (a.orf.len(), b.orf.len());
            if len_a.max(len_b) < MIN_LENGTH_RATIO * len_a.min(len_b) {
                continue;
            }

            pairs.push((intergap(a.orf.span(), b.orf.span()), i, j));
        }
    }
    pairs.sort_by_key(|(gap, _, _)| *gap);

    let mut consumed = vec![false; hits.len()];
    let mut merged_hits = Vec::new();
    for (gap, i, j) in pairs {
        if gap > max_gap as i64 {
            break;
        }
        if consumed[i] || consumed[j] {
            continue;
        }
        consumed[i] = true;
        consumed[j] = true;

        let (a, b) = (&hits[i], &hits[j]);
        let keeper = if b.full_sequence_evalue < a.full_sequence_evalue {
            b
        } else {
            a
        };

        let mut merged = keeper.clone();
        merged.orf = Orf::new(
            &keeper.orf.seq_id,
            a.orf.begin.min(b.orf.begin),
            a.orf.end.max(b.orf.end),
            keeper.orf.strand,
        );

        log::info!("Merging {} and {} into {}", a.orf, b.orf, merged.orf);
        merged_hits.push(merged);
    }

    let mut absorbed = MergedOrfs::new();
    let mut updated = Vec::with_capacity(hits.len());
    for (hit, used) in hits.into_iter().zip(consumed) {
        if used {
            absorbed.insert(hit.orf);
        } else {
            updated.push(hit);
        }
    }
    updated.extend(merged_hits);
    updated.sort_by_key(|hit| hit.orf.begin);

    (updated, absorbed)
}

/// Records the ORF hit before and after every ORF, ordered by begin
pub fn build_neighbor_index(hits: &[OrfHit]) -> NeighborIndex {
    let mut orfs = hits.iter().map(|hit| &hit.orf).collect::<Vec<_>>();
    orfs.sort_by_key(|orf| orf.begin);

    orfs.iter()
        .enumerate()
        .map(|(idx, orf)| {
            let prev = idx.checked_sub(1).map(|p| orfs[p].clone());
            let next = orfs.get(idx + 1).map(|n| (*n).clone());
            ((*orf).clone(), Neighbors { prev, next })
        })
        .collect()
}
