use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::path::PathBuf;

/// DNA strand of an ORF or feature
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

/// E-value used to rank, deduplicate and cut model hits
///
/// Replaces a hidden module-level switch: whichever variant is chosen
/// must be threaded through ranking, cutoff and redundancy removal alike.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum EvalueRank {
    DomainEvalue,
    #[default]
    FullSequenceEvalue,
}

impl std::fmt::Display for EvalueRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalueRank::DomainEvalue => write!(f, "domain"),
            EvalueRank::FullSequenceEvalue => write!(f, "full"),
        }
    }
}

impl From<&str> for EvalueRank {
    fn from(value: &str) -> Self {
        match value {
            "domain" | "dom" => EvalueRank::DomainEvalue,
            _ => EvalueRank::FullSequenceEvalue,
        }
    }
}

/// error handling for CLI
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// error handling for the prediction pipeline
#[derive(Debug, Error)]
pub enum PredError {
    #[error("Malformed record in {path:?} at line {line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Unknown IS family '{0}' [not in the element length table]")]
    UnknownFamily(String),
    #[error(
        "Invalid sequence range: begin={begin} end={end} orfBegin={orf_begin} orfEnd={orf_end} maxLen={max_len} family={family}"
    )]
    InvalidRange {
        begin: u64,
        end: u64,
        orf_begin: u64,
        orf_end: u64,
        max_len: u64,
        family: String,
    },
    #[error("Alignment failed for {seq_id}: {reason}")]
    Alignment { seq_id: String, reason: String },
    #[error("Missing sequence '{0}' in the genome tables")]
    MissingSequence(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
