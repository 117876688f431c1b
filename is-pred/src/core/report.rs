use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{
    write_collection, PredError, Strand, ELEMENT_FASTA, FAMILY_SUMMARY, FASTA_LINE_WIDTH,
    FEATURES, GFF_SOURCE, ORF_FASTA, ORF_PROTEIN_FASTA, PREDICTIONS, SUMMARY, VERSION,
};
use ispack::record::family_cluster;
use ispack::{
    format_fasta, reverse_complement, Candidate, Genome, Orf, Proteome, SequenceRecord,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::core::orfs::MergedOrfs;
use crate::core::Prediction;

pub const PREDICTION_COLUMNS: [&str; 22] = [
    "seqID", "family", "cluster", "isBegin", "isEnd", "len4is", "ncopy4is", "start1", "end1",
    "start2", "end2", "score", "irId", "irLen", "nGaps", "orfBegin", "orfEnd", "strand",
    "len4orf", "E-value", "ov", "isScore",
];

/// Per-file counts written to the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub organism: String,
    pub file_id: String,
    pub sequences: usize,
    pub elements: usize,
    pub element_bases: u64,
    pub genome_length: u64,
    pub families: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub elements: usize,
    pub files: Vec<FileSummary>,
    pub failed_sequences: Vec<String>,
}

/// One line of the prediction table
pub fn prediction_row(candidate: &Candidate) -> String {
    let (score, identity, length, gaps, left_start, left_end, right_start, right_end) =
        match candidate.best_tir() {
            Some(tir) => (
                tir.score,
                tir.identity_count,
                tir.length,
                tir.gap_count,
                tir.left_start,
                tir.left_end,
                tir.right_start,
                tir.right_end,
            ),
            None => (0.0, 0, 0, 0, 0, 0, 0, 0),
        };
    let total = candidate
        .score
        .as_ref()
        .map(|s| s.total_score)
        .unwrap_or_default();

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2e}\t{}\t{}",
        candidate.orf.seq_id,
        candidate.family(),
        family_cluster(&candidate.hmm_hit.family_name),
        candidate.boundary.begin,
        candidate.boundary.end,
        candidate.boundary.len(),
        candidate.occurrence.copy_number_for_element,
        left_start,
        left_end,
        right_start,
        right_end,
        score,
        identity,
        length,
        gaps,
        candidate.orf.begin,
        candidate.orf.end,
        candidate.orf.strand,
        candidate.orf.len(),
        candidate.hmm_hit.best_domain_evalue,
        candidate.hmm_hit.overlap_count,
        total
    )
}

/// GFF3 records of one element: the element itself and both repeat arms
///
/// Elements carry the strand of their transposase ORF.
pub fn gff_records(candidate: &Candidate, id: usize) -> Vec<String> {
    let seq_id = &candidate.orf.seq_id;
    let strand = candidate.orf.strand;

    let mut records = vec![format!(
        "{}\t{}\tinsertion_sequence\t{}\t{}\t.\t{}\t.\tID=is{};family={};cluster={}",
        seq_id,
        GFF_SOURCE,
        candidate.boundary.begin,
        candidate.boundary.end,
        strand,
        id,
        candidate.family(),
        family_cluster(&candidate.hmm_hit.family_name)
    )];

    if let Some(tir) = candidate.best_tir().filter(|tir| tir.length > 0) {
        for (arm, begin, end) in [
            ("l", tir.left_start, tir.left_end),
            ("r", tir.right_start, tir.right_end),
        ] {
            records.push(format!(
                "{}\t{}\tterminal_inverted_repeat\t{}\t{}\t.\t{}\t.\tID=tir{}_{};Parent=is{}",
                seq_id, GFF_SOURCE, begin, end, strand, id, arm, id
            ));
        }
    }

    records
}

fn stranded(record: &SequenceRecord, begin: u64, end: u64, strand: Strand) -> Vec<u8> {
    let seq = record.slice(begin, end);
    match strand {
        Strand::Forward => seq.to_vec(),
        Strand::Reverse => reverse_complement(seq),
    }
}

/// Nucleotide sequence of the element, on the strand of its ORF
pub fn element_fasta(candidate: &Candidate, record: &SequenceRecord) -> String {
    let header = format!(
        "{}_{}_{}_{} {}",
        candidate.orf.seq_id,
        candidate.boundary.begin,
        candidate.boundary.end,
        candidate.orf.strand,
        family_cluster(&candidate.hmm_hit.family_name)
    );
    let seq = stranded(
        record,
        candidate.boundary.begin,
        candidate.boundary.end,
        candidate.orf.strand,
    );

    format_fasta(&header, &seq, FASTA_LINE_WIDTH)
}

/// members of a virtual ORF sorted by position, empty for a plain ORF
fn merged_members<'a>(orf: &Orf, merged: Option<&'a MergedOrfs>) -> Vec<&'a Orf> {
    let mut members = merged
        .map(|set| {
            set.iter()
                .filter(|m| orf.begin <= m.begin && orf.end >= m.end)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    members.sort_by_key(|m| (m.begin, m.end));
    members
}

fn member_header(member: &Orf, orf: &Orf) -> String {
    format!(
        "{} {} merged in virtual ORF {}",
        member,
        member.coord_key(),
        orf.coord_key()
    )
}

/// Nucleotide sequence of the transposase ORF
///
/// A merged virtual ORF is written as its original members, each one
/// labelled with the virtual ORF it was merged in.
pub fn orf_fasta(
    candidate: &Candidate,
    record: &SequenceRecord,
    merged: Option<&MergedOrfs>,
) -> String {
    let orf = &candidate.orf;
    let members = merged_members(orf, merged);

    if members.is_empty() {
        let seq = stranded(record, orf.begin, orf.end, orf.strand);
        return format_fasta(&orf.to_string(), &seq, FASTA_LINE_WIDTH);
    }

    members
        .into_iter()
        .map(|member| {
            let seq = stranded(record, member.begin, member.end, member.strand);
            format_fasta(&member_header(member, orf), &seq, FASTA_LINE_WIDTH)
        })
        .collect()
}

/// Protein sequence of the transposase ORF, looked up by ORF id
///
/// Virtual ORFs are written member by member like [`orf_fasta`]. ORFs
/// missing from the proteome are skipped.
pub fn orf_faa(candidate: &Candidate, merged: Option<&MergedOrfs>, proteome: &Proteome) -> String {
    let orf = &candidate.orf;
    let members = merged_members(orf, merged);

    let entries = if members.is_empty() {
        vec![(orf, orf.to_string())]
    } else {
        members
            .into_iter()
            .map(|member| (member, member_header(member, orf)))
            .collect()
    };

    entries
        .into_iter()
        .filter_map(|(orf, header)| match proteome.get(&orf.to_string()) {
            Some(protein) => Some(format_fasta(&header, protein, FASTA_LINE_WIDTH)),
            None => {
                warn!("WARN: no protein for ORF {}", orf);
                None
            }
        })
        .collect()
}

/// Family table of one file: count, genome share and bases per family
pub fn family_summary(candidates: &[&Candidate], genome_length: u64) -> Vec<String> {
    let mut families: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for candidate in candidates {
        let entry = families.entry(candidate.family()).or_default();
        entry.0 += 1;
        entry.1 += candidate.boundary.len();
    }

    let share = |bases: u64| {
        if genome_length == 0 {
            0.0
        } else {
            bases as f64 / genome_length as f64 * 100.0
        }
    };

    let mut lines = vec![format!(
        "{:<11} {:>6} {:>7} {:>15}",
        "family", "nIS", "%Genome", "bps4IS"
    )];
    let (mut total, mut bases) = (0, 0);
    for (family, (count, bps)) in families {
        lines.push(format!(
            "{:<11} {:>6} {:>7.2} {:>15}",
            family,
            count,
            share(bps),
            bps
        ));
        total += count;
        bases += bps;
    }
    lines.push(format!(
        "{:<11} {:>6} {:>7.2} {:>15} {:>15}",
        "total",
        total,
        share(bases),
        bases,
        genome_length
    ));

    lines
}

fn trimmed(records: Vec<String>) -> Vec<String> {
    records
        .into_iter()
        .map(|r| r.trim_end().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

/// Writes the per-file outputs under `{outdir}/{organism}/`
///
/// The ORF protein FASTA is only written when a proteome is given.
///
/// # Arguments
///
/// * `outdir` - output root
/// * `source` - organism and file id
/// * `seq_ids` - sequences of the file with at least one element, sorted
/// * `genome_length` - summed length of every sequence of the file
/// * `prediction` - pipeline result
/// * `genome` - sequence table
/// * `proteome` - ORF proteins, if any
///
/// # Returns
///
/// * `anyhow::Result<FileSummary>`
///
/// # Example
///
/// ```rust, ignore
/// let summary = write_file_report(
///     Path::new("out"),
///     ("ecoli", "NC_000913.fna"),
///     &["NC_000913.3"],
///     4_641_652,
///     &prediction,
///     &genome,
///     None,
/// )?;
/// ```
pub fn write_file_report(
    outdir: &Path,
    source: (&str, &str),
    seq_ids: &[&str],
    genome_length: u64,
    prediction: &Prediction,
    genome: &Genome,
    proteome: Option<&Proteome>,
) -> anyhow::Result<FileSummary> {
    let (organism, file_id) = source;
    let dir = outdir.join(organism);
    let path = |ext: &str| -> PathBuf { dir.join(format!("{}.{}", file_id, ext)) };

    let mut rows = vec![PREDICTION_COLUMNS.join("\t")];
    let mut features = vec!["##gff-version 3".to_string()];
    let mut elements = Vec::new();
    let mut orfs = Vec::new();
    let mut proteins = Vec::new();
    let mut all = Vec::new();

    let mut id = 0;
    for seq_id in seq_ids {
        let record = genome
            .get(*seq_id)
            .ok_or_else(|| PredError::MissingSequence(seq_id.to_string()))?;
        let candidates = prediction
            .candidates
            .get(*seq_id)
            .map(|c| c.as_slice())
            .unwrap_or_default();

        for candidate in candidates {
            id += 1;
            rows.push(prediction_row(candidate));
            features.extend(gff_records(candidate, id));
            elements.push(element_fasta(candidate, record));
            let merged = prediction.merged.get(*seq_id);
            orfs.push(orf_fasta(candidate, record, merged));
            if let Some(proteome) = proteome {
                proteins.push(orf_faa(candidate, merged, proteome));
            }
            all.push(candidate);
        }
    }

    write_collection(&rows, path(PREDICTIONS))?;
    write_collection(&features, path(FEATURES))?;
    write_collection(&family_summary(&all, genome_length), path(FAMILY_SUMMARY))?;
    write_collection(&trimmed(elements), path(ELEMENT_FASTA))?;
    write_collection(&trimmed(orfs), path(ORF_FASTA))?;
    if proteome.is_some() {
        write_collection(&trimmed(proteins), path(ORF_PROTEIN_FASTA))?;
    }

    let mut families = BTreeMap::new();
    for candidate in all.iter() {
        *families.entry(candidate.family().to_string()).or_insert(0) += 1;
    }

    Ok(FileSummary {
        organism: organism.to_string(),
        file_id: file_id.to_string(),
        sequences: seq_ids.len(),
        elements: all.len(),
        element_bases: all.iter().map(|c| c.boundary.len()).sum(),
        genome_length,
        families,
    })
}

/// Writes every per-file report and the JSON run summary
///
/// Files are grouped by organism and file id; only files holding at
/// least one element get outputs.
pub fn write_reports(
    prediction: &Prediction,
    genome: &Genome,
    proteome: Option<&Proteome>,
    outdir: &Path,
) -> anyhow::Result<RunSummary> {
    let mut lengths: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for record in genome.values() {
        *lengths
            .entry((record.organism.as_str(), record.file_id.as_str()))
            .or_default() += record.len();
    }

    let mut files: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for (seq_id, candidates) in prediction.candidates.iter() {
        if candidates.is_empty() {
            continue;
        }

        let record = genome
            .get(seq_id)
            .ok_or_else(|| PredError::MissingSequence(seq_id.clone()))?;
        files
            .entry((record.organism.as_str(), record.file_id.as_str()))
            .or_default()
            .push(seq_id.as_str());
    }

    let summaries = files
        .into_par_iter()
        .map(|(source, mut seq_ids)| {
            seq_ids.sort_unstable();
            let genome_length = lengths.get(&source).copied().unwrap_or_default();
            write_file_report(
                outdir,
                source,
                &seq_ids,
                genome_length,
                prediction,
                genome,
                proteome,
            )
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut failed_sequences = prediction
        .failures
        .iter()
        .map(|(seq_id, _)| seq_id.clone())
        .collect::<Vec<_>>();
    failed_sequences.sort_unstable();

    let summary = RunSummary {
        version: VERSION.to_string(),
        elements: summaries.iter().map(|s| s.elements).sum(),
        files: summaries,
        failed_sequences,
    };

    std::fs::create_dir_all(outdir)?;
    let writer = std::io::BufWriter::new(std::fs::File::create(outdir.join(SUMMARY))?);
    serde_json::to_writer_pretty(writer, &summary)?;

    info!(
        "{} IS elements written for {} files",
        summary.elements,
        summary.files.len()
    );

    Ok(summary)
}
