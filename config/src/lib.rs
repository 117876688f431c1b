//! Universal constants, shared types and helpers for the is-pred pipeline
//!
//! Every crate in the workspace reads its defaults from here, so
//! changing a threshold in this file changes it for the whole run.

pub mod families;
pub mod fns;
pub mod params;
pub mod types;

pub use families::*;
pub use fns::*;
pub use params::*;
pub use types::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// numeric values
pub const MIN_THREADS: usize = 1;
pub const HMM_MIN_FIELDS: usize = 14;
pub const EVALUE_CUTOFF: f64 = 1e-5;
pub const EVALUE_SINGLE_COPY: f64 = 1e-10;
pub const IR_IDENTITY_SINGLE_COPY: f64 = 0.85;
pub const MAX_ORF_GAP: u64 = 100;
pub const NEAR_TERMINUS_DISTANCE: i64 = 300;
pub const FAR_TERMINUS_DISTANCE: i64 = 1000;
pub const MIN_TERMINUS_DISTANCE: i64 = -150; // INFO: negative lets a terminus reach into the ORF
pub const OVERLAP_FRACTION: f64 = 0.1;
pub const CLUSTER_CUT: f64 = 1.1; // INFO: 1bp intersections still land in the same cluster
pub const COPY_IDENTITY: f64 = 90.0;
pub const MIN_COPIES: usize = 2;
pub const FASTA_LINE_WIDTH: usize = 70;
pub const GFF_SOURCE: &str = "is-pred";

// families
pub const TWO_GENE_FAMILY: &str = "IS200/IS605";
pub const TWO_GENE_FAMILY_RAW: &str = "IS200_IS605";
pub const MIN_LENGTH_RATIO: u64 = 2;

// file names
pub const PREDICTIONS: &str = "is.tsv";
pub const FEATURES: &str = "is.gff";
pub const FAMILY_SUMMARY: &str = "sum";
pub const ELEMENT_FASTA: &str = "is.fna";
pub const ORF_FASTA: &str = "orf.fna";
pub const ORF_PROTEIN_FASTA: &str = "orf.faa";
pub const PROTEOME_EXT: &str = "faa";
pub const SUMMARY: &str = "summary.json";
pub const HMM_LIBRARY: &str = "clusters.faa.hmm";
pub const PEPTIDE_LIBRARY: &str = "clusters.single.faa";

// external tools
pub const BLASTN: &str = "blastn";
pub const BLASTN_TASK: &str = "megablast";
pub const BLASTN_OUTFMT: &str =
    "6 qseqid sseqid length qstart qend sstart send nident pident";
