//! Prediction of full-length IS elements from profile-model hits
//!
//! Combines HMMER hits on translated ORFs with terminal inverted repeat
//! and copy-number evidence to call non-redundant, scored IS elements
//! for every sequence of a genome list.

use anyhow::Result;

pub mod cli;
pub mod core;

pub fn lib_is_pred(args: Vec<String>) -> Result<()> {
    let args = cli::Args::from(args);
    crate::core::predict_elements(args)
}
