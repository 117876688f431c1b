//! Core module for IS element prediction
//!
//! This module threads the hits of every genomic sequence through the
//! prediction stages. Model hits are ranked, deduplicated by locus and
//! cut by e-value, then placed on the genome as ORF hits; adjacent
//! IS200/IS605 ORFs are merged into virtual ORFs. Every ORF is extended
//! to the longest element its family allows and aligned against its own
//! sequence (one parallel task per sequence) to count genomic copies.
//! Element boundaries are drawn from terminal inverted repeats searched
//! at a near and a far distance, from the longest copy, or from the ORF
//! itself. Candidates are then filtered, deduplicated, collapsed when
//! they overlap and finally scored.
//!
//! A failing alignment task only removes its own sequence from the
//! result; malformed input, unknown families and impossible extension
//! windows stop the run.

use config::{PredError, PredParams};
use hashbrown::HashMap;
use ispack::{
    discover_hit_files, par_parse_hits, read_genome, read_proteomes, read_sequence_list, Candidate,
    Genome, HitMap,
};
use log::{info, warn};
use rayon::prelude::*;

use crate::cli::Args;

pub mod align;
pub mod boundary;
pub mod cluster;
pub mod ingest;
pub mod orfs;
pub mod refine;
pub mod report;
pub mod score;
pub mod tir;

use align::{align_batch, extend_orf, AlignTask, Aligner, BlastnAligner};
use boundary::{choose_hits, resolve_pass};
use ingest::refine_hits;
use orfs::{build_neighbor_index, merge_two_gene_family_orfs, to_orf_hits, MergedOrfs};
use refine::refine_candidates;
use report::write_reports;
use score::{score_all, ScoreWeights};
use tir::{SswTirDetector, TirDetector};

/// Result of a pipeline run
#[derive(Debug, Default)]
pub struct Prediction {
    /// sequence id -> scored elements sorted by boundary begin
    pub candidates: HashMap<String, Vec<Candidate>>,
    /// sequence id -> ORFs absorbed into virtual ORFs
    pub merged: HashMap<String, MergedOrfs>,
    /// sequences whose alignment task failed, with the error text
    pub failures: Vec<(String, String)>,
}

impl Prediction {
    pub fn num_elements(&self) -> usize {
        self.candidates.values().map(|c| c.len()).sum()
    }
}

/// Runs every prediction stage on the hits of a genome
///
/// # Arguments
///
/// * `genome` - sequence table
/// * `hits` - parsed tblout hits grouped by sequence id
/// * `params` - run parameters
/// * `aligner` - self-alignment tool
/// * `detector` - TIR detector
/// * `weights` - score weights
///
/// # Returns
///
/// * `anyhow::Result<Prediction>` - elements per sequence plus merge and
///   failure bookkeeping
///
/// # Example
///
/// ```rust, ignore
/// let prediction = run_pipeline(
///     &genome,
///     hits,
///     &PredParams::default(),
///     &BlastnAligner::default(),
///     &SswTirDetector::default(),
///     &ScoreWeights::default(),
/// )?;
/// ```
pub fn run_pipeline(
    genome: &Genome,
    hits: HitMap,
    params: &PredParams,
    aligner: &dyn Aligner,
    detector: &dyn TirDetector,
    weights: &ScoreWeights,
) -> anyhow::Result<Prediction> {
    let mut prediction = Prediction::default();
    let ranked = refine_hits(hits, params);

    let mut neighbors = HashMap::new();
    let mut tasks = Vec::with_capacity(ranked.len());
    for (seq_id, hits) in ranked {
        let record = genome
            .get(&seq_id)
            .ok_or_else(|| PredError::MissingSequence(seq_id.clone()))?;

        let orf_hits = to_orf_hits(hits, &params.families)?;
        let (orf_hits, absorbed) = merge_two_gene_family_orfs(orf_hits, params.max_orf_gap);
        if !absorbed.is_empty() {
            prediction.merged.insert(seq_id.clone(), absorbed);
        }

        // WARN: an impossible window means the length table is inconsistent, stop here
        let windows = orf_hits
            .iter()
            .map(|hit| extend_orf(hit, record.len(), &params.families))
            .collect::<Result<Vec<_>, PredError>>()?;

        neighbors.insert(seq_id, build_neighbor_index(&orf_hits));
        tasks.push(AlignTask { record, windows });
    }
    tasks.sort_by(|a, b| a.record.id.cmp(&b.record.id));

    let outcome = align_batch(tasks, aligner, params.threads)?;
    if outcome.num_failures() > 0 {
        warn!(
            "WARN: {} sequences dropped after failed alignments",
            outcome.num_failures()
        );
    }

    prediction.failures = outcome
        .failures
        .into_iter()
        .map(|(seq_id, e)| (seq_id, e.to_string()))
        .collect();
    prediction.failures.sort();

    let empty = HashMap::new();
    let resolved = outcome
        .results
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(seq_id, groups)| -> Result<Option<(String, Vec<Candidate>)>, PredError> {
            let record = genome
                .get(&seq_id)
                .ok_or_else(|| PredError::MissingSequence(seq_id.clone()))?;
            let index = neighbors.get(&seq_id).unwrap_or(&empty);

            // INFO: one alignment serves both TIR passes
            let near = resolve_pass(&groups, record, index, params, params.near_distance, detector);
            let far = resolve_pass(&groups, record, index, params, params.far_distance, detector);

            let refined = refine_candidates(&seq_id, choose_hits(near, far), params)?;
            Ok(refined.map(|mut candidates| {
                score_all(&mut candidates, weights);
                (seq_id, candidates)
            }))
        })
        .collect::<Result<Vec<_>, PredError>>()?;

    prediction.candidates = resolved.into_iter().flatten().collect();

    info!(
        "IS elements predicted: {} in {} sequences",
        prediction.num_elements(),
        prediction.candidates.len()
    );

    Ok(prediction)
}

/// Entry point of the binary: reads the inputs, predicts and writes reports
pub fn predict_elements(args: Args) -> anyhow::Result<()> {
    let params = args.params()?;

    let sources = read_sequence_list(&args.sequences)?;
    let genome = read_genome(&sources)?;

    let tables = match &args.hmm_dir {
        _ if !args.hits.is_empty() => args.hits.clone(),
        Some(dir) => discover_hit_files(dir, &sources),
        None => Vec::new(),
    };
    if tables.is_empty() {
        warn!("WARN: no tblout file to read");
        info!("No IS element found");
        return Ok(());
    }

    let hits = par_parse_hits(&tables)?;
    let aligner = BlastnAligner::new(&args.blastn, params.copy_identity);

    let prediction = run_pipeline(
        &genome,
        hits,
        &params,
        &aligner,
        &SswTirDetector::default(),
        &ScoreWeights::default(),
    )?;

    if prediction.num_elements() == 0 {
        info!("No IS element found");
        return Ok(());
    }

    let proteome = args
        .proteome_dir
        .as_ref()
        .map(|dir| read_proteomes(dir, &sources))
        .transpose()?;

    write_reports(&prediction, &genome, proteome.as_ref(), &args.outdir)?;
    Ok(())
}
