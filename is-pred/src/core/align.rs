use std::io::Write;
use std::process::Command;

use config::{
    get_progress_bar, FamilyTable, PredError, Strand, BLASTN, BLASTN_OUTFMT, BLASTN_TASK,
    FASTA_LINE_WIDTH,
};
use dashmap::DashMap;
use hashbrown::HashMap;
use ispack::{format_fasta, reverse_complement, Alignment, OrfHit, SequenceRecord};
use log::{error, info, warn};
use rayon::prelude::*;
use tempfile::NamedTempFile;

/// Aligns a multi-record query FASTA against a subject FASTA
///
/// Implementations return the tabular records plus whatever the tool
/// wrote as error text; a non-empty error text fails the task.
pub trait Aligner: Send + Sync {
    fn align(&self, query_fasta: &str, subject_fasta: &str) -> (Vec<Alignment>, String);
}

/// `blastn` run on two temporary FASTA files, both strands, megablast
#[derive(Debug, Clone)]
pub struct BlastnAligner {
    pub program: String,
    pub perc_identity: f64,
}

impl BlastnAligner {
    pub fn new(program: &str, perc_identity: f64) -> Self {
        Self {
            program: program.to_string(),
            perc_identity,
        }
    }
}

impl Default for BlastnAligner {
    fn default() -> Self {
        Self::new(BLASTN, config::COPY_IDENTITY)
    }
}

fn stage(fasta: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("is-pred.")
        .suffix(".fna")
        .tempfile()?;
    file.write_all(fasta.as_bytes())?;
    file.flush()?;

    Ok(file)
}

impl Aligner for BlastnAligner {
    fn align(&self, query_fasta: &str, subject_fasta: &str) -> (Vec<Alignment>, String) {
        // INFO: both files are removed when the handles drop
        let (query, subject) = match (stage(query_fasta), stage(subject_fasta)) {
            (Ok(query), Ok(subject)) => (query, subject),
            (Err(e), _) | (_, Err(e)) => return (Vec::new(), e.to_string()),
        };

        let output = Command::new(&self.program)
            .arg("-query")
            .arg(query.path())
            .arg("-subject")
            .arg(subject.path())
            .args(["-strand", "both", "-task", BLASTN_TASK])
            .arg("-perc_identity")
            .arg(self.perc_identity.to_string())
            .arg("-outfmt")
            .arg(BLASTN_OUTFMT)
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => return (Vec::new(), format!("cannot run {}: {}", self.program, e)),
        };

        let mut errors = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() && errors.is_empty() {
            errors = format!("{} exited with {}", self.program, output.status);
        }

        let mut alignments = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if line.trim().is_empty() {
                continue;
            }
            match Alignment::parse(line) {
                Ok(alignment) => alignments.push(alignment),
                Err(e) => {
                    errors.push_str(&e);
                    break;
                }
            }
        }

        (alignments, errors)
    }
}

/// ORF hit plus the window around it that is aligned against the genome
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedOrf {
    pub hit: OrfHit,
    pub begin: u64,
    pub end: u64,
}

impl ExtendedOrf {
    /// `{seqId}_{familyCluster}_{wBegin}_{wEnd}_{orfBegin}_{orfEnd}_{strand}`
    pub fn header(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.hit.orf.seq_id,
            self.hit.family_cluster(),
            self.begin,
            self.end,
            self.hit.orf.begin,
            self.hit.orf.end,
            self.hit.orf.strand
        )
    }

    /// maps a 1-based window position back onto the genome
    pub fn to_genomic(&self, pos: u64) -> u64 {
        match self.hit.orf.strand {
            Strand::Forward => self.begin + pos - 1,
            Strand::Reverse => self.end + 1 - pos.min(self.end),
        }
    }
}

/// Extends an ORF to the longest element its family can have
///
/// ORFs at least as long as the family maximum are used as they are.
/// Otherwise the window reaches `max - 1` bp upstream of the ORF end and
/// downstream of the ORF begin, clipped to the sequence.
///
/// # Arguments
///
/// * `hit` - ORF hit to extend
/// * `seq_len` - length of the sequence holding the ORF
/// * `families` - element length table
///
/// # Returns
///
/// * `Result<ExtendedOrf, PredError>` - `InvalidRange` when the clipped
///   window is empty or a single base
///
/// # Example
///
/// ```rust, ignore
/// let ext = extend_orf(&hit, 5_000_000, &FamilyTable::default()).unwrap();
/// ```
pub fn extend_orf(
    hit: &OrfHit,
    seq_len: u64,
    families: &FamilyTable,
) -> Result<ExtendedOrf, PredError> {
    let max_len = families.get(hit.family())?.max;
    let orf = &hit.orf;

    let (begin, end) = if orf.len() >= max_len {
        (orf.begin, orf.end)
    } else {
        let begin = orf.end.saturating_sub(max_len - 1).max(1);
        let end = (orf.begin + max_len - 1).min(seq_len);
        (begin, end)
    };

    if begin >= end {
        return Err(PredError::InvalidRange {
            begin,
            end,
            orf_begin: orf.begin,
            orf_end: orf.end,
            max_len,
            family: hit.family().to_string(),
        });
    }

    Ok(ExtendedOrf {
        hit: hit.clone(),
        begin,
        end,
    })
}

/// Query FASTA of all windows; reverse-strand windows are reverse-complemented
pub fn windows_to_fasta(windows: &[ExtendedOrf], record: &SequenceRecord) -> String {
    windows
        .iter()
        .map(|ext| {
            let seq = record.slice(ext.begin, ext.end);
            match ext.hit.orf.strand {
                Strand::Forward => format_fasta(&ext.header(), seq, FASTA_LINE_WIDTH),
                Strand::Reverse => format_fasta(
                    &ext.header(),
                    &reverse_complement(seq),
                    FASTA_LINE_WIDTH,
                ),
            }
        })
        .collect()
}

/// Copies of one extended ORF found in its own sequence
///
/// Copies are sorted by aligned length, longest first, so the first copy
/// is the window aligned to itself. Query coordinates are genomic.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentGroup {
    pub window: ExtendedOrf,
    pub copies: Vec<Alignment>,
}

impl AlignmentGroup {
    pub fn hit(&self) -> &OrfHit {
        &self.window.hit
    }

    /// longest copy other than the window itself
    pub fn best_copy(&self) -> Option<&Alignment> {
        self.copies.get(1)
    }

    pub fn copy_number(&self) -> usize {
        self.copies.len()
    }
}

/// `{wBegin}_{wEnd}_{orfBegin}_{orfEnd}_{strand}` tail of a window header
///
/// The aligner may rewrite the sequence id part of a query id that looks
/// like a Seq-id (`gi|..|ref|..|`), so windows are only matched on it.
pub fn window_key(query_id: &str) -> Option<&str> {
    let mut cut = query_id.len();
    for _ in 0..5 {
        cut = query_id[..cut].rfind('_')?;
    }
    Some(&query_id[cut + 1..])
}

/// Groups raw alignments by query and links each group to its window
///
/// Queries are matched on their coordinate tail; alignments matching no
/// window are ignored.
pub fn group_alignments(
    alignments: Vec<Alignment>,
    windows: &[ExtendedOrf],
) -> Vec<AlignmentGroup> {
    let headers = windows.iter().map(|ext| ext.header()).collect::<Vec<_>>();
    let by_key = headers
        .iter()
        .zip(windows.iter())
        .filter_map(|(header, ext)| window_key(header).map(|key| (key, ext)))
        .collect::<HashMap<_, _>>();

    let mut groups: Vec<AlignmentGroup> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for mut alignment in alignments {
        let Some((key, window)) = window_key(&alignment.query_id)
            .and_then(|key| by_key.get_key_value(key))
            .map(|(key, window)| (*key, *window))
        else {
            warn!("WARN: alignment for unknown query {}", alignment.query_id);
            continue;
        };

        let (a, b) = (
            window.to_genomic(alignment.query_start),
            window.to_genomic(alignment.query_end),
        );
        alignment.query_start = a.min(b);
        alignment.query_end = a.max(b);

        let idx = *slot.entry(key).or_insert_with(|| {
            groups.push(AlignmentGroup {
                window: window.clone(),
                copies: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].copies.push(alignment);
    }

    for group in groups.iter_mut() {
        group
            .copies
            .sort_by(|a, b| b.aligned_length.cmp(&a.aligned_length));
    }
    groups.sort_by_key(|group| group.hit().orf.begin);

    groups
}

/// One self-alignment job: every window of a sequence against the sequence
#[derive(Debug)]
pub struct AlignTask<'a> {
    pub record: &'a SequenceRecord,
    pub windows: Vec<ExtendedOrf>,
}

/// Partial results of a parallel batch
///
/// Failed sequences are absent from `results` and listed in `failures`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: DashMap<String, Vec<AlignmentGroup>>,
    pub failures: DashMap<String, PredError>,
}

impl BatchOutcome {
    pub fn num_failures(&self) -> usize {
        self.failures.len()
    }
}

/// Runs one self-alignment task
pub fn align_task(
    task: &AlignTask,
    aligner: &dyn Aligner,
) -> Result<Vec<AlignmentGroup>, PredError> {
    let query = windows_to_fasta(&task.windows, task.record);
    let subject = format_fasta(&task.record.id, &task.record.seq, FASTA_LINE_WIDTH);

    let (alignments, errors) = aligner.align(&query, &subject);
    if !errors.is_empty() {
        return Err(PredError::Alignment {
            seq_id: task.record.id.clone(),
            reason: errors,
        });
    }

    Ok(group_alignments(alignments, &task.windows))
}

/// Aligns every task on a dedicated pool of `min(threads, tasks)` workers
///
/// A failing task never aborts the batch: its error is logged and kept
/// in the failure side channel.
///
/// # Example
///
/// ```rust, ignore
/// let outcome = align_batch(tasks, &BlastnAligner::default(), 8).unwrap();
/// ```
pub fn align_batch(
    tasks: Vec<AlignTask>,
    aligner: &dyn Aligner,
    threads: usize,
) -> anyhow::Result<BatchOutcome> {
    let outcome = BatchOutcome::default();
    if tasks.is_empty() {
        return Ok(outcome);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.clamp(1, tasks.len()))
        .build()?;

    info!(
        "Aligning {} sequences with {} threads...",
        tasks.len(),
        pool.current_num_threads()
    );
    let pb = get_progress_bar(tasks.len() as u64, "Aligning ORF windows");

    pool.install(|| {
        tasks.par_iter().for_each(|task| {
            match align_task(task, aligner) {
                Ok(groups) => {
                    outcome.results.insert(task.record.id.clone(), groups);
                }
                Err(e) => {
                    error!("ERROR: alignment of {} failed: {}", task.record.id, e);
                    outcome.failures.insert(task.record.id.clone(), e);
                }
            }
            pb.inc(1);
        });
    });

    pb.finish_and_clear();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ispack::Orf;

    fn hit(family: &str, begin: u64, end: u64, strand: Strand) -> OrfHit {
        OrfHit {
            orf: Orf::new("seq", begin, end, strand),
            family_name: family.to_string(),
            best_domain_evalue: 1e-20,
            full_sequence_evalue: 1e-20,
            overlap_count: 0,
        }
    }

    fn record(len: usize) -> SequenceRecord {
        SequenceRecord {
            id: "seq".to_string(),
            organism: "org".to_string(),
            file_id: "seq.fna".to_string(),
            seq: b"ACGT".iter().cycle().take(len).copied().collect(),
        }
    }

    fn aln(query: &str, length: u64, qstart: u64, qend: u64) -> Alignment {
        Alignment {
            query_id: query.to_string(),
            subject_id: "seq".to_string(),
            aligned_length: length,
            query_start: qstart,
            query_end: qend,
            subject_start: 1,
            subject_end: length,
            identity_count: length,
            percent_identity: 100.0,
        }
    }

    #[test]
    fn test_extend_orf_window() {
        let families = FamilyTable::default();

        // IS3 max length 2000
        let ext = extend_orf(&hit("IS3_1", 3000, 4000, Strand::Forward), 10_000, &families).unwrap();
        assert_eq!((ext.begin, ext.end), (2001, 4999));

        let clipped = extend_orf(&hit("IS3_1", 100, 1100, Strand::Forward), 2500, &families).unwrap();
        assert_eq!((clipped.begin, clipped.end), (1, 2099));

        let long = extend_orf(&hit("IS3_1", 100, 2300, Strand::Forward), 10_000, &families).unwrap();
        assert_eq!((long.begin, long.end), (100, 2300));
    }

    #[test]
    fn test_extend_orf_invalid_range() {
        let tiny = hit("IS3_1", 1, 1, Strand::Forward);

        let err = extend_orf(&tiny, 1, &FamilyTable::default()).unwrap_err();
        assert!(matches!(err, PredError::InvalidRange { begin: 1, end: 1, .. }));
    }

    #[test]
    fn test_header_and_reverse_coordinates() {
        let ext = ExtendedOrf {
            hit: hit("IS3_1|IS3|IS2|", 3000, 4000, Strand::Reverse),
            begin: 2001,
            end: 4999,
        };

        assert_eq!(ext.header(), "seq_IS3_1_2001_4999_3000_4000_-");
        assert_eq!(ext.to_genomic(1), 4999);
        assert_eq!(ext.to_genomic(2999), 2001);
    }

    #[test]
    fn test_group_alignments_sorts_and_converts() {
        let ext = ExtendedOrf {
            hit: hit("IS3_1", 3000, 4000, Strand::Forward),
            begin: 2001,
            end: 4999,
        };
        let header = ext.header();

        let groups = group_alignments(
            vec![
                aln(&header, 1200, 500, 1699),
                aln(&header, 2999, 1, 2999),
                aln("someone_else", 50, 1, 50),
            ],
            &[ext],
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].copy_number(), 2);
        assert_eq!(groups[0].copies[0].aligned_length, 2999);
        let best = groups[0].best_copy().unwrap();
        assert_eq!((best.query_start, best.query_end), (2500, 3699));
    }

    #[test]
    fn test_group_alignments_matches_rewritten_query_ids() {
        let mut orf = hit("IS3_1", 3000, 4000, Strand::Forward);
        orf.orf.seq_id = "gi|1|ref|NC_1.1|".to_string();
        let ext = ExtendedOrf {
            hit: orf,
            begin: 2001,
            end: 4999,
        };

        assert_eq!(window_key(&ext.header()), Some("2001_4999_3000_4000_+"));
        assert_eq!(window_key("seq_4000_+"), None);

        let groups = group_alignments(
            vec![
                aln("ref|NC_1.1|_IS3_1_2001_4999_3000_4000_+", 900, 1, 900),
                aln("NC_1.1_IS3_1_2001_4999_3000_4000_+", 2999, 1, 2999),
                aln("NC_1.1_IS3_1_2001_4999_3000_4000_-", 2999, 1, 2999),
            ],
            &[ext],
        );

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].copy_number(), 2);
        assert_eq!(groups[0].copies[0].aligned_length, 2999);
    }

    struct FailingOn(&'static str);

    impl Aligner for FailingOn {
        fn align(&self, query_fasta: &str, subject_fasta: &str) -> (Vec<Alignment>, String) {
            if subject_fasta.starts_with(&format!(">{}\n", self.0)) {
                return (Vec::new(), "boom".to_string());
            }

            let header = query_fasta.lines().next().unwrap().trim_start_matches('>');
            (vec![aln(header, 100, 1, 100)], String::new())
        }
    }

    #[test]
    fn test_align_batch_isolates_failures() {
        let good = record(6000);
        let mut bad = record(6000);
        bad.id = "bad".to_string();

        let window = extend_orf(
            &hit("IS3_1", 3000, 4000, Strand::Forward),
            6000,
            &FamilyTable::default(),
        )
        .unwrap();
        let tasks = vec![
            AlignTask {
                record: &good,
                windows: vec![window.clone()],
            },
            AlignTask {
                record: &bad,
                windows: vec![window],
            },
        ];

        let outcome = align_batch(tasks, &FailingOn("bad"), 4).unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results.contains_key("seq"));
        assert_eq!(outcome.num_failures(), 1);
        assert!(matches!(
            outcome.failures.get("bad").as_deref(),
            Some(PredError::Alignment { .. })
        ));
    }

    #[test]
    fn test_blastn_aligner_reports_missing_program() {
        let aligner = BlastnAligner::new("definitely-not-a-blastn-binary", 90.0);
        let (alignments, errors) = aligner.align(">q\nACGT\n", ">s\nACGT\n");

        assert!(alignments.is_empty());
        assert!(!errors.is_empty());
    }
}
