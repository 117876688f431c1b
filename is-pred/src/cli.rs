use clap::{ArgAction, Parser};
use config::{
    ArgCheck, EvalueRank, FamilyTable, PredError, PredParams, BLASTN, CLUSTER_CUT, COPY_IDENTITY,
    EVALUE_CUTOFF, EVALUE_SINGLE_COPY, FAR_TERMINUS_DISTANCE, IR_IDENTITY_SINGLE_COPY,
    MAX_ORF_GAP, MIN_TERMINUS_DISTANCE, NEAR_TERMINUS_DISTANCE, OVERLAP_FRACTION, TIR_FILTERS,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Predict full-length IS elements from profile-model hits", long_about = None)]
pub struct Args {
    #[arg(
        short = 's',
        long = "sequences",
        required = true,
        value_name = "PATH",
        help = "Path to the sequence list [one '<fasta path> <organism>' per line]"
    )]
    pub sequences: PathBuf,

    #[arg(
        long = "hits",
        required = false,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to HMMER --tblout files delimited by comma [skips discovery]"
    )]
    pub hits: Vec<PathBuf>,

    #[arg(
        long = "hmm-dir",
        required = false,
        value_name = "PATH",
        help = "Directory holding {organism}/{library}.{file}.faa tblout files"
    )]
    pub hmm_dir: Option<PathBuf>,

    #[arg(
        long = "proteome-dir",
        required = false,
        value_name = "PATH",
        help = "Directory holding {organism}/{file}.faa proteins [writes ORF proteins]"
    )]
    pub proteome_dir: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        required = false,
        value_name = "PATH",
        default_value("."),
        help = "Output directory"
    )]
    pub outdir: PathBuf,

    #[arg(
        short = 't',
        long = "threads",
        help = "Number of threads",
        value_name = "THREADS",
        default_value_t = num_cpus::get()
    )]
    pub threads: usize,

    #[arg(
        short = 'e',
        long = "evalue",
        value_name = "FLOAT",
        default_value_t = EVALUE_CUTOFF,
        help = "E-value cutoff for model hits"
    )]
    pub evalue: f64,

    #[arg(
        long = "rank",
        value_name = "FIELD",
        default_value("full"),
        help = "E-value used to rank hits [full, domain]"
    )]
    pub rank: String,

    #[arg(
        long = "max-orf-gap",
        value_name = "BP",
        default_value_t = MAX_ORF_GAP,
        help = "Largest gap between two IS200/IS605 ORFs merged into one"
    )]
    pub max_orf_gap: u64,

    #[arg(
        long = "near",
        value_name = "BP",
        default_value_t = NEAR_TERMINUS_DISTANCE,
        allow_hyphen_values = true,
        help = "Outer terminus distance of the near TIR search"
    )]
    pub near: i64,

    #[arg(
        long = "far",
        value_name = "BP",
        default_value_t = FAR_TERMINUS_DISTANCE,
        allow_hyphen_values = true,
        help = "Outer terminus distance of the far TIR search"
    )]
    pub far: i64,

    #[arg(
        long = "min-distance",
        value_name = "BP",
        default_value_t = MIN_TERMINUS_DISTANCE,
        allow_hyphen_values = true,
        help = "Inner terminus distance of both TIR searches [negative reaches into the ORF]"
    )]
    pub min_distance: i64,

    #[arg(
        long = "evalue-single-copy",
        value_name = "FLOAT",
        default_value_t = EVALUE_SINGLE_COPY,
        help = "Single-copy elements above this e-value need a clean TIR"
    )]
    pub evalue_single_copy: f64,

    #[arg(
        long = "ir-identity",
        value_name = "FLOAT",
        default_value_t = IR_IDENTITY_SINGLE_COPY,
        help = "Minimum TIR identity ratio of weak single-copy elements"
    )]
    pub ir_identity: f64,

    #[arg(
        long = "overlap-fraction",
        value_name = "FLOAT",
        default_value_t = OVERLAP_FRACTION,
        help = "Overlap over the shorter element above which elements are clustered"
    )]
    pub overlap_fraction: f64,

    #[arg(
        long = "cluster-cut",
        value_name = "FLOAT",
        default_value_t = CLUSTER_CUT,
        help = "Distance at which overlap clusters are cut"
    )]
    pub cluster_cut: f64,

    #[arg(
        long = "copy-identity",
        value_name = "PERCENT",
        default_value_t = COPY_IDENTITY,
        help = "Percent identity of a genomic copy"
    )]
    pub copy_identity: f64,

    #[arg(
        long = "split-composite",
        help = "Flag to clip copies reaching a neighbor ORF back to the ORF",
        value_name = "FLAG",
        default_missing_value("true"),
        default_value("true"),
        num_args(0..=1),
        require_equals(true),
        action = ArgAction::Set,
    )]
    pub split_composite: bool,

    #[arg(
        long = "remove-short",
        help = "Flag to drop elements shorter than their family minimum",
        value_name = "FLAG",
        default_missing_value("true"),
        default_value("true"),
        num_args(0..=1),
        require_equals(true),
        action = ArgAction::Set,
    )]
    pub remove_short: bool,

    #[arg(
        long = "lengths",
        required = false,
        value_name = "PATH",
        help = "JSON file overriding family element lengths [{\"IS3\": {\"min\": 1000, \"max\": 2000}}]"
    )]
    pub lengths: Option<PathBuf>,

    #[arg(
        long = "blastn",
        value_name = "PROGRAM",
        default_value(BLASTN),
        help = "blastn executable"
    )]
    pub blastn: String,
}

impl ArgCheck for Args {
    fn get_sequence_list(&self) -> &PathBuf {
        &self.sequences
    }

    fn get_hits(&self) -> &Vec<PathBuf> {
        &self.hits
    }

    fn get_hmm_dir(&self) -> Option<&PathBuf> {
        self.hmm_dir.as_ref()
    }

    fn get_threads(&self) -> usize {
        self.threads
    }
}

impl Args {
    /// Builds the run parameters, reading the length overrides if given
    pub fn params(&self) -> Result<PredParams, PredError> {
        let families = match &self.lengths {
            Some(path) => FamilyTable::with_overrides(path)?,
            None => FamilyTable::default(),
        };

        Ok(PredParams {
            rank: EvalueRank::from(self.rank.as_str()),
            evalue_cutoff: self.evalue,
            max_orf_gap: self.max_orf_gap,
            near_distance: self.near,
            far_distance: self.far,
            min_distance: self.min_distance,
            evalue_single_copy: self.evalue_single_copy,
            ir_identity_single_copy: self.ir_identity,
            overlap_fraction: self.overlap_fraction,
            cluster_cut: self.cluster_cut,
            copy_identity: self.copy_identity,
            threads: self.threads,
            split_composite: self.split_composite,
            remove_short: self.remove_short,
            families,
            tir_filters: TIR_FILTERS.to_vec(),
        })
    }
}

impl From<Vec<String>> for Args {
    fn from(args: Vec<String>) -> Self {
        let mut full_args = vec![env!("CARGO_PKG_NAME").to_string()];
        full_args.extend(args);

        Args::parse_from(full_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::from(
            ["--sequences", "dna.list", "--hits", "a.tbl,b.tbl"]
                .iter()
                .chain(extra.iter())
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_defaults_match_params_default() {
        let args = args(&[]);
        let params = args.params().unwrap();
        let defaults = PredParams::default();

        assert_eq!(args.hits.len(), 2);
        assert!(args.split_composite);
        assert!(args.proteome_dir.is_none());
        assert_eq!(params.rank, defaults.rank);
        assert_eq!(params.near_distance, defaults.near_distance);
        assert_eq!(params.min_distance, defaults.min_distance);
        assert_eq!(params.cluster_cut, defaults.cluster_cut);
        assert_eq!(params.families, defaults.families);
    }

    #[test]
    fn test_flags_and_negative_distances() {
        let parsed = args(&["--split-composite=false", "--min-distance", "-50", "--rank", "domain"]);
        let params = parsed.params().unwrap();

        assert!(!params.split_composite);
        assert_eq!(params.min_distance, -50);
        assert_eq!(params.rank, EvalueRank::DomainEvalue);

        let args2 = args(&["--proteome-dir", "proteins"]);
        assert_eq!(args2.proteome_dir, Some(PathBuf::from("proteins")));
    }

    #[test]
    fn test_check_requires_hits_or_hmm_dir() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("dna.list");
        std::fs::write(&list, "genome.fna ecoli\n").unwrap();

        let args = Args::from(vec![
            "--sequences".to_string(),
            list.to_string_lossy().to_string(),
        ]);
        assert!(args.check().is_err());

        let args = Args::from(vec![
            "--sequences".to_string(),
            list.to_string_lossy().to_string(),
            "--hmm-dir".to_string(),
            dir.path().to_string_lossy().to_string(),
        ]);
        assert!(args.check().is_ok());
    }
}
