//! Readers and record types shared by the is-pred pipeline
//!
//! This crate knows how to turn the three kinds of input files into typed
//! records: the sequence list (FASTA path + organism per line), the
//! genomic FASTA files themselves and HMMER `--tblout` hit tables. Files
//! are read in parallel; records keep the order they had on disk so every
//! downstream stable sort is reproducible.

use std::fmt::Debug;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use config::{get_progress_bar, PredError, HMM_LIBRARY, PEPTIDE_LIBRARY, PROTEOME_EXT};
use hashbrown::HashMap;
use log::{info, warn};
use rayon::prelude::*;

pub mod fasta;
pub mod record;

pub use fasta::{format_fasta, read_fasta, reverse_complement};
pub use record::{
    Alignment, Boundary, Candidate, HmmHit, HmmHitInfo, Occurrence, Orf, OrfHit, ScoreBreakdown,
    SequenceRecord, Tir,
};

/// sequence id -> DNA record
pub type Genome = HashMap<String, SequenceRecord>;
/// sequence id -> hits in file order
pub type HitMap = HashMap<String, Vec<HmmHit>>;
/// ORF id (`{seqId}_{begin}_{end}_{strand}`) -> protein
pub type Proteome = HashMap<String, Vec<u8>>;

/// One line of the sequence list
#[derive(Debug, PartialEq, Clone)]
pub struct SequenceSource {
    pub path: PathBuf,
    pub organism: String,
    pub file_id: String,
}

fn reader<P: AsRef<Path> + Debug>(file: P) -> Result<String, PredError> {
    let mut file = File::open(file)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parses the sequence list
///
/// Each non-comment line holds a FASTA path and an organism name separated
/// by tabs or spaces. The file id is the base name of the FASTA path.
///
/// # Arguments
///
/// * `path` - path to the sequence list
///
/// # Returns
///
/// * `Result<Vec<SequenceSource>, PredError>` - sources sorted by file id
///
/// # Example
///
/// ```rust, no_run
/// # use ispack::read_sequence_list;
/// let sources = read_sequence_list("dna.list").unwrap();
/// ```
pub fn read_sequence_list<P: AsRef<Path> + Debug>(
    path: P,
) -> Result<Vec<SequenceSource>, PredError> {
    let contents = reader(&path)?;
    let mut sources = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (file, organism) = match (fields.next(), fields.next()) {
            (Some(file), Some(organism)) => (PathBuf::from(file), organism.to_string()),
            _ => {
                return Err(PredError::MalformedRecord {
                    path: path.as_ref().to_path_buf(),
                    line: idx + 1,
                    reason: "expected '<fasta path> <organism>'".to_string(),
                })
            }
        };

        let file_id = file
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();

        sources.push(SequenceSource {
            path: file,
            organism,
            file_id,
        });
    }

    sources.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    Ok(sources)
}

/// Reads every FASTA file of the list in parallel
///
/// A sequence id seen twice keeps its first occurrence; files without
/// records are reported and skipped.
pub fn read_genome(sources: &[SequenceSource]) -> Result<Genome, PredError> {
    let pb = get_progress_bar(sources.len() as u64, "Reading FASTA files");

    let files = sources
        .par_iter()
        .map(|source| {
            let records = fasta::read_fasta(&source.path);
            pb.inc(1);
            records.map(|records| (source, records))
        })
        .collect::<Result<Vec<_>, PredError>>()?;

    pb.finish_and_clear();

    let mut genome = Genome::new();
    for (source, records) in files {
        if records.is_empty() {
            warn!("WARN: no sequence found in {:?}", source.path);
            continue;
        }

        for (id, seq) in records {
            if genome.contains_key(&id) {
                warn!("WARN: duplicated sequence id {} in {:?}", id, source.path);
                continue;
            }

            genome.insert(
                id.clone(),
                SequenceRecord {
                    id,
                    organism: source.organism.clone(),
                    file_id: source.file_id.clone(),
                    seq,
                },
            );
        }
    }

    info!("Sequences read: {}", genome.len());
    Ok(genome)
}

/// Parses one HMMER `--tblout` file
///
/// Comment and blank lines are skipped. A malformed line is fatal and
/// reported with its 1-based line number.
///
/// # Example
///
/// ```rust, no_run
/// # use ispack::parse_hits;
/// let hits = parse_hits("clusters.faa.hmm.NC_000913.fna.faa").unwrap();
/// ```
pub fn parse_hits<P: AsRef<Path> + Debug>(path: P) -> Result<Vec<HmmHit>, PredError> {
    let contents = reader(&path)?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
        .map(|(idx, line)| {
            HmmHit::parse(line).map_err(|reason| PredError::MalformedRecord {
                path: path.as_ref().to_path_buf(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

/// Parses several tblout files and groups their hits by sequence id
///
/// Files are parsed in parallel, then concatenated in the order given so
/// hits of one sequence keep a stable order across files.
pub fn par_parse_hits<P: AsRef<Path> + Debug + Sync>(paths: &[P]) -> Result<HitMap, PredError> {
    let pb = get_progress_bar(paths.len() as u64, "Parsing tblout files");

    let parsed = paths
        .par_iter()
        .map(|path| {
            let hits = parse_hits(path);
            pb.inc(1);
            hits
        })
        .collect::<Result<Vec<_>, PredError>>()?;

    pb.finish_and_clear();

    let mut groups = HitMap::new();
    for hit in parsed.into_iter().flatten() {
        groups.entry(hit.seq_id().to_string()).or_default().push(hit);
    }

    info!(
        "Hits parsed: {} in {} sequences",
        groups.values().map(|v| v.len()).sum::<usize>(),
        groups.len()
    );

    Ok(groups)
}

/// Locates the tblout files produced for every entry of the sequence list
///
/// Two tables may exist per entry, one from the profile search
/// (`{hmm_dir}/{org}/clusters.faa.hmm.{file}.faa`) and one from the
/// single-sequence search (`{hmm_dir}/{org}/clusters.single.faa.{file}.faa`).
/// Missing or empty tables are logged and skipped.
pub fn discover_hit_files<P: AsRef<Path>>(hmm_dir: P, sources: &[SequenceSource]) -> Vec<PathBuf> {
    let mut tables = Vec::new();

    for source in sources {
        for library in [HMM_LIBRARY, PEPTIDE_LIBRARY] {
            let table = hmm_dir
                .as_ref()
                .join(&source.organism)
                .join(format!("{}.{}.faa", library, source.file_id));

            match std::fs::metadata(&table) {
                Ok(meta) if meta.len() == 0 => warn!("WARN: empty file {:?}", table),
                Ok(_) => tables.push(table),
                Err(_) => warn!("WARN: no such file {:?}", table),
            }
        }
    }

    tables
}

/// Reads the predicted proteins of every source file
///
/// Each file lives at `{proteome_dir}/{organism}/{file_id}.faa` and names
/// its proteins after the ORF they were translated from. Missing or empty
/// files are skipped with a warning.
///
/// # Arguments
///
/// * `proteome_dir` - root of the protein FASTA files
/// * `sources` - entries of the sequence list
///
/// # Returns
///
/// * `Result<Proteome, PredError>`
pub fn read_proteomes<P: AsRef<Path> + Sync>(
    proteome_dir: P,
    sources: &[SequenceSource],
) -> Result<Proteome, PredError> {
    let paths = sources
        .iter()
        .map(|source| {
            proteome_dir
                .as_ref()
                .join(&source.organism)
                .join(format!("{}.{}", source.file_id, PROTEOME_EXT))
        })
        .filter(|path| match std::fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                warn!("WARN: empty file {:?}", path);
                false
            }
            Ok(_) => true,
            Err(_) => {
                warn!("WARN: no such file {:?}", path);
                false
            }
        })
        .collect::<Vec<_>>();

    let pb = get_progress_bar(paths.len() as u64, "Reading proteomes");
    let files = paths
        .par_iter()
        .map(|path| {
            let records = fasta::read_fasta(path);
            pb.inc(1);
            records
        })
        .collect::<Result<Vec<_>, PredError>>()?;
    pb.finish_and_clear();

    let proteome = files.into_iter().flatten().collect::<Proteome>();

    info!("Proteins read: {}", proteome.len());
    Ok(proteome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIT_A: &str = "seqA_100_400_+ - IS3_12|IS3|IS2| - 1e-30 100.0 0.0 1e-31 99.0 0.0 1.0 1 0 0 1 1 1 1 # description";
    const HIT_B: &str = "seq_B_10_90_- - IS30_3 - 1e-10 50.0 0.0 1e-11 49.0 0.0 1.0 1 0 0 1 1 1 1 -";

    #[test]
    fn test_read_sequence_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("dna.list");
        std::fs::write(
            &list,
            "# comment\n/data/org2/b.fna\torg2\n\n/data/org1/a.fna org1\n",
        )
        .unwrap();

        let sources = read_sequence_list(&list).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].file_id, "a.fna");
        assert_eq!(sources[0].organism, "org1");
        assert_eq!(sources[1].path, PathBuf::from("/data/org2/b.fna"));

        std::fs::write(&list, "/data/org1/a.fna\n").unwrap();
        assert!(matches!(
            read_sequence_list(&list),
            Err(PredError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_read_genome_keeps_first_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.fna");
        let b = dir.path().join("b.fna");
        std::fs::write(&a, ">s1\nACGT\n>s2\nGGGG\n").unwrap();
        std::fs::write(&b, ">s1\nTTTT\n").unwrap();

        let sources = vec![
            SequenceSource {
                path: a,
                organism: "org".to_string(),
                file_id: "a.fna".to_string(),
            },
            SequenceSource {
                path: b,
                organism: "org".to_string(),
                file_id: "b.fna".to_string(),
            },
        ];

        let genome = read_genome(&sources).unwrap();
        assert_eq!(genome.len(), 2);
        assert_eq!(genome["s1"].seq, b"ACGT".to_vec());
        assert_eq!(genome["s2"].file_id, "a.fna");
    }

    #[test]
    fn test_parse_hits_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("hits.tblout");
        std::fs::write(&table, format!("# header\n{}\nbroken line\n", HIT_A)).unwrap();

        match parse_hits(&table) {
            Err(PredError::MalformedRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_par_parse_hits_groups_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.tblout");
        let second = dir.path().join("second.tblout");
        std::fs::write(&first, format!("{}\n{}\n", HIT_A, HIT_B)).unwrap();
        std::fs::write(&second, format!("#\n{}\n", HIT_A)).unwrap();

        let groups = par_parse_hits(&[first, second]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["seqA"].len(), 2);
        assert_eq!(groups["seq_B"][0].query_name, "IS30_3");
    }

    #[test]
    fn test_discover_hit_files_skips_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let org = dir.path().join("org1");
        std::fs::create_dir_all(&org).unwrap();
        std::fs::write(org.join("clusters.faa.hmm.a.fna.faa"), HIT_A).unwrap();
        std::fs::write(org.join("clusters.single.faa.a.fna.faa"), "").unwrap();

        let sources = vec![SequenceSource {
            path: PathBuf::from("a.fna"),
            organism: "org1".to_string(),
            file_id: "a.fna".to_string(),
        }];

        let tables = discover_hit_files(dir.path(), &sources);
        assert_eq!(tables, vec![org.join("clusters.faa.hmm.a.fna.faa")]);
    }

    #[test]
    fn test_read_proteomes_by_organism_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let org = dir.path().join("org1");
        std::fs::create_dir_all(&org).unwrap();
        std::fs::write(
            org.join("a.fna.faa"),
            ">seqA_100_400_+ partial\nmkl\nQV\n>seqA_900_500_-\nMA\n",
        )
        .unwrap();
        std::fs::write(org.join("b.fna.faa"), "").unwrap();

        let sources = ["a.fna", "b.fna", "c.fna"]
            .into_iter()
            .map(|file_id| SequenceSource {
                path: PathBuf::from(file_id),
                organism: "org1".to_string(),
                file_id: file_id.to_string(),
            })
            .collect::<Vec<_>>();

        let proteome = read_proteomes(dir.path(), &sources).unwrap();
        assert_eq!(proteome.len(), 2);
        assert_eq!(proteome["seqA_100_400_+"], b"MKLQV".to_vec());
        assert_eq!(proteome["seqA_900_500_-"], b"MA".to_vec());
    }
}
