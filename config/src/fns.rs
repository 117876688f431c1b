use indicatif::{ProgressBar, ProgressStyle};
use num_traits::{Num, NumCast, ToPrimitive};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::CliError;

// os
#[cfg(not(windows))]
const TICK_SETTINGS: (&str, u64) = ("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ", 80);
#[cfg(windows)]
const TICK_SETTINGS: (&str, u64) = (r"+-x| ", 200);

/// return a pre-configured progress bar
pub fn get_progress_bar(length: u64, msg: &str) -> ProgressBar {
    let progressbar_style = ProgressStyle::default_spinner()
        .tick_chars(TICK_SETTINGS.0)
        .template(" {spinner} {msg:<30} {wide_bar} ETA {eta_precise} ")
        .expect("no template error");

    let progress_bar = ProgressBar::new(length);

    progress_bar.set_style(progressbar_style);
    progress_bar.enable_steady_tick(Duration::from_millis(TICK_SETTINGS.1));
    progress_bar.set_message(msg.to_owned());

    progress_bar
}

/// write any collection of lines to a file
pub fn write_collection<P: AsRef<Path>>(data: &[String], fname: P) -> Result<(), CliError> {
    log::info!(
        "Records in {}: {:?}. Writing...",
        fname.as_ref().display(),
        data.len()
    );

    if let Some(parent) = fname.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let f = File::create(fname.as_ref())?;
    let mut writer = BufWriter::new(f);

    for line in data.iter() {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;

    Ok(())
}

/// argument checker for all subcommands
pub trait ArgCheck {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()
    }

    fn validate_args(&self) -> Result<(), CliError> {
        validate(self.get_sequence_list(), &["list", "txt", "tsv"])?;

        if !self.get_hits().is_empty() {
            for hits in self.get_hits() {
                validate(hits, &[])?;
            }
        } else {
            match self.get_hmm_dir() {
                Some(dir) if dir.is_dir() => (),
                Some(dir) => {
                    return Err(CliError::InvalidInput(format!(
                        "{:?} is not a directory",
                        dir
                    )))
                }
                None => {
                    return Err(CliError::InvalidInput(
                        "Either --hits or --hmm-dir must be provided".to_string(),
                    ))
                }
            }
        }

        if self.get_threads() < crate::MIN_THREADS {
            return Err(CliError::InvalidInput(format!(
                "Number of threads must be at least {}",
                crate::MIN_THREADS
            )));
        }

        Ok(())
    }

    fn get_sequence_list(&self) -> &PathBuf;
    fn get_hits(&self) -> &Vec<PathBuf>;
    fn get_hmm_dir(&self) -> Option<&PathBuf>;
    fn get_threads(&self) -> usize;
}

/// argument validation; an empty `extensions` slice accepts any extension
pub fn validate(arg: &PathBuf, extensions: &[&str]) -> Result<(), CliError> {
    if !arg.exists() {
        return Err(CliError::InvalidInput(format!("{:?} does not exist", arg)));
    }

    if !arg.is_file() {
        return Err(CliError::InvalidInput(format!("{:?} is not a file", arg)));
    }

    if !extensions.is_empty() {
        match arg.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if extensions.contains(&ext) => (),
            _ => {
                return Err(CliError::InvalidInput(format!(
                    "file {:?} is not one of {:?}",
                    arg, extensions
                )))
            }
        }
    }

    match std::fs::metadata(arg) {
        Ok(metadata) if metadata.len() == 0 => {
            Err(CliError::InvalidInput(format!("file {:?} is empty", arg)))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(CliError::IoError(e)),
    }
}

// quality of life improvement fns

/// distance between two closed intervals; negative when they intersect
#[inline(always)]
pub fn intergap<N>(a: (N, N), b: (N, N)) -> i64
where
    N: Num + NumCast + Copy + PartialOrd + ToPrimitive,
{
    let start = if a.0 > b.0 { a.0 } else { b.0 };
    let end = if a.1 < b.1 { a.1 } else { b.1 };

    start.to_i64().unwrap_or(i64::MAX) - end.to_i64().unwrap_or(i64::MAX)
}

/// number of shared positions between two closed intervals [0 if disjoint]
#[inline(always)]
pub fn intersection(a: (u64, u64), b: (u64, u64)) -> u64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);

    if end >= start {
        end - start + 1
    } else {
        0
    }
}

/// intersection over the length of the shorter interval
#[inline(always)]
pub fn overlap_fraction(a: (u64, u64), b: (u64, u64)) -> f64 {
    let shorter = (a.1 - a.0 + 1).min(b.1 - b.0 + 1);
    intersection(a, b) as f64 / shorter as f64
}
