use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bio::alphabets::dna::revcomp;
use config::PredError;
use flate2::read::MultiGzDecoder;
use memchr::{memchr, memchr_iter};
use memmap2::Mmap;

const FA_NEEDLE: u8 = b'>';
const NEWLINE: u8 = b'\n';

/// Reads every record of a (optionally gzipped) FASTA file
///
/// # Arguments
///
/// * `path` - path to a .fa/.fna/.fasta file, with or without .gz
///
/// # Returns
///
/// * `Result<Vec<(String, Vec<u8>)>, PredError>` - (id, upper-case sequence)
///   pairs in file order; the id is the header up to the first whitespace
///
/// # Example
///
/// ```rust, no_run
/// # use ispack::read_fasta;
/// let records = read_fasta("NC_000913.fna").unwrap();
/// assert!(!records.is_empty());
/// ```
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Vec<u8>)>, PredError> {
    let path = path.as_ref();
    let is_gz = path
        .file_name()
        .and_then(|f| f.to_str())
        .map(|f| f.ends_with(".gz"))
        .unwrap_or(false);

    if is_gz {
        let mut data = Vec::new();
        BufReader::new(MultiGzDecoder::new(File::open(path)?)).read_to_end(&mut data)?;
        return Ok(parse_fasta(&data));
    }

    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }

    let mmap = unsafe { Mmap::map(&file)? };
    Ok(parse_fasta(mmap.as_ref()))
}

/// splits a FASTA buffer at every '>' that opens a line
pub fn parse_fasta(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let header: Vec<usize> = memchr_iter(FA_NEEDLE, data)
        .filter(|&pos| pos == 0 || data[pos - 1] == NEWLINE)
        .collect();

    let mut records = Vec::with_capacity(header.len());
    for (i, &start) in header.iter().enumerate() {
        let end = *header.get(i + 1).unwrap_or(&data.len());
        let chunk = &data[start + 1..end];

        let line_end = memchr(NEWLINE, chunk).unwrap_or(chunk.len());
        let id = String::from_utf8_lossy(&chunk[..line_end])
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        if id.is_empty() {
            log::warn!("WARN: skipping FASTA record without identifier");
            continue;
        }

        let seq = chunk[line_end..]
            .iter()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|b| b.to_ascii_uppercase())
            .collect::<Vec<u8>>();

        records.push((id, seq));
    }

    records
}

/// reverse complement over the IUPAC alphabet, case preserved
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    revcomp(seq)
}

/// `>id` followed by the sequence wrapped at `width` columns
pub fn format_fasta(id: &str, seq: &[u8], width: usize) -> String {
    let width = width.max(1);
    let mut out = String::with_capacity(seq.len() + seq.len() / width + id.len() + 3);

    out.push('>');
    out.push_str(id);
    out.push('\n');
    for line in seq.chunks(width) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const FASTA: &[u8] = b">seq1 some description\nACGT\nacgt\n>seq2\nTTTT\r\nGG\n";

    #[test]
    fn test_parse_fasta_multiple_records() {
        let records = parse_fasta(FASTA);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "seq1");
        assert_eq!(records[0].1, b"ACGTACGT".to_vec());
        assert_eq!(records[1].0, "seq2");
        assert_eq!(records[1].1, b"TTTTGG".to_vec());
    }

    #[test]
    fn test_read_fasta_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("genome.fna");
        std::fs::write(&plain, FASTA).unwrap();
        assert_eq!(read_fasta(&plain).unwrap().len(), 2);

        let gz = dir.path().join("genome.fna.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(FASTA).unwrap();
        encoder.finish().unwrap();
        assert_eq!(read_fasta(&gz).unwrap(), read_fasta(&plain).unwrap());

        let empty = dir.path().join("empty.fna");
        std::fs::write(&empty, b"").unwrap();
        assert!(read_fasta(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGTN"), b"NACGTT".to_vec());
        assert_eq!(reverse_complement(b"acgR"), b"Ycgt".to_vec());
    }

    #[test]
    fn test_format_fasta_wraps_lines() {
        assert_eq!(format_fasta("s", b"ACGTACG", 3), ">s\nACG\nTAC\nG\n");
    }
}
