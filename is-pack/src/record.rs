use config::{EvalueRank, Strand, HMM_MIN_FIELDS, TWO_GENE_FAMILY, TWO_GENE_FAMILY_RAW};
use serde::{Deserialize, Serialize};

/// One record of a HMMER `--tblout` table
///
/// Both e-value fields carry the best 1-domain e-value: the reported
/// full-sequence e-value (column 5) is deliberately replaced so every
/// ranking and cutoff downstream works on the domain e-value. The
/// untouched value is still available in `line`.
#[derive(Debug, PartialEq, Clone)]
pub struct HmmHit {
    pub best_domain_evalue: f64,
    pub full_sequence_evalue: f64,
    pub line: String,
    pub compound_id: String,
    pub query_name: String,
    pub overlap_count: u32,
}

impl HmmHit {
    pub fn parse(line: &str) -> Result<HmmHit, String> {
        if line.trim().is_empty() {
            return Err("Empty line".to_string());
        }

        let fields = line.split_whitespace().take(15).collect::<Vec<_>>();
        if fields.len() < HMM_MIN_FIELDS {
            return Err(format!(
                "Expected at least {} fields, found {}",
                HMM_MIN_FIELDS,
                fields.len()
            ));
        }

        let evalue = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|_| format!("Cannot parse e-value '{}'", field))
        };

        let compound_id = fields[0].to_string();
        let query_name = fields[2].replace(TWO_GENE_FAMILY_RAW, TWO_GENE_FAMILY);
        let _reported_full_sequence_evalue = evalue(fields[4])?;
        let best_domain_evalue = evalue(fields[7])?;
        let overlap_count = fields[13]
            .parse::<u32>()
            .map_err(|_| format!("Cannot parse overlap number '{}'", fields[13]))?;

        // WARN: compound IDs must carry the ORF coordinates, fail early otherwise
        Orf::from_compound_id(&compound_id)?;

        Ok(HmmHit {
            best_domain_evalue,
            full_sequence_evalue: best_domain_evalue,
            line: line.to_string(),
            compound_id,
            query_name,
            overlap_count,
        })
    }

    pub fn evalue(&self, rank: EvalueRank) -> f64 {
        match rank {
            EvalueRank::DomainEvalue => self.best_domain_evalue,
            EvalueRank::FullSequenceEvalue => self.full_sequence_evalue,
        }
    }

    /// sequence identifier: the compound ID without its last three tokens
    pub fn seq_id(&self) -> &str {
        self.compound_id
            .rsplitn(4, '_')
            .last()
            .unwrap_or(self.compound_id.as_str())
    }

    /// compound ID with the strand token removed
    ///
    /// Hits at the same coordinates on opposite strands share a locus.
    pub fn locus_key(&self) -> &str {
        self.compound_id
            .rsplit_once('_')
            .map(|(locus, _)| locus)
            .unwrap_or(self.compound_id.as_str())
    }
}

/// Open reading frame in 1-based, inclusive genomic coordinates
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Orf {
    pub seq_id: String,
    pub begin: u64,
    pub end: u64,
    pub strand: Strand,
}

impl Orf {
    pub fn new(seq_id: &str, begin: u64, end: u64, strand: Strand) -> Self {
        Orf {
            seq_id: seq_id.to_string(),
            begin: begin.min(end),
            end: begin.max(end),
            strand,
        }
    }

    /// parses `{seqid}_{begin}_{end}_{strand}`; the sequence id may hold underscores
    pub fn from_compound_id(id: &str) -> Result<Orf, String> {
        let mut tokens = id.rsplitn(4, '_');
        fn get<'a>(field: Option<&'a str>, name: &str, id: &str) -> Result<&'a str, String> {
            field.ok_or_else(|| format!("Cannot parse {} from '{}'", name, id))
        }

        let strand = get(tokens.next(), "strand", id)?;
        let end = get(tokens.next(), "end", id)?;
        let begin = get(tokens.next(), "begin", id)?;
        let seq_id = get(tokens.next(), "sequence id", id)?;

        let strand =
            Strand::parse(strand).ok_or_else(|| format!("Strand is not + or - in '{}'", id))?;
        let begin = begin
            .parse::<u64>()
            .map_err(|_| format!("Cannot parse begin from '{}'", id))?;
        let end = end
            .parse::<u64>()
            .map_err(|_| format!("Cannot parse end from '{}'", id))?;

        if seq_id.is_empty() || begin == 0 || begin > end {
            return Err(format!("Invalid ORF coordinates in '{}'", id));
        }

        Ok(Orf::new(seq_id, begin, end, strand))
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    pub fn span(&self) -> (u64, u64) {
        (self.begin, self.end)
    }

    /// `{begin}_{end}_{strand}`, the coordinate part of a compound ID
    pub fn coord_key(&self) -> String {
        format!("{}_{}_{}", self.begin, self.end, self.strand)
    }
}

impl std::fmt::Display for Orf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.seq_id, self.begin, self.end, self.strand
        )
    }
}

/// Model hit placed on the genome
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrfHit {
    pub orf: Orf,
    pub family_name: String,
    pub best_domain_evalue: f64,
    pub full_sequence_evalue: f64,
    pub overlap_count: u32,
}

impl OrfHit {
    pub fn from_hit(hit: HmmHit) -> Result<OrfHit, String> {
        let orf = Orf::from_compound_id(&hit.compound_id)?;
        let family_name = hit
            .query_name
            .split('.')
            .next()
            .unwrap_or(hit.query_name.as_str())
            .to_string();

        if family_name.is_empty() {
            return Err(format!("Empty query name in '{}'", hit.compound_id));
        }

        Ok(OrfHit {
            orf,
            family_name,
            best_domain_evalue: hit.best_domain_evalue,
            full_sequence_evalue: hit.full_sequence_evalue,
            overlap_count: hit.overlap_count,
        })
    }

    /// `IS200/IS605_4|IS200/IS605|IS1341|` -> `IS200/IS605_4`
    pub fn family_cluster(&self) -> &str {
        family_cluster(&self.family_name)
    }

    /// `IS200/IS605_4|IS200/IS605|IS1341|` -> `IS200/IS605`
    pub fn family(&self) -> &str {
        family_of(&self.family_name)
    }

    pub fn evalue(&self, rank: EvalueRank) -> f64 {
        match rank {
            EvalueRank::DomainEvalue => self.best_domain_evalue,
            EvalueRank::FullSequenceEvalue => self.full_sequence_evalue,
        }
    }

    pub fn is_two_gene_family(&self) -> bool {
        self.family_name.contains(TWO_GENE_FAMILY)
    }
}

pub fn family_cluster(family_name: &str) -> &str {
    family_name.split('|').next().unwrap_or(family_name)
}

pub fn family_of(family_name: &str) -> &str {
    let cluster = family_cluster(family_name);
    cluster
        .rsplit_once('_')
        .map(|(family, _)| family)
        .unwrap_or(cluster)
}

/// Terminal inverted repeat in genomic coordinates
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Tir {
    pub score: f64,
    pub identity_count: u32,
    pub length: u32,
    pub gap_count: u32,
    pub left_start: u64,
    pub left_end: u64,
    pub right_start: u64,
    pub right_end: u64,
    pub left_seq: String,
    pub right_seq: String,
}

impl Tir {
    pub fn identity_ratio(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        self.identity_count as f64 / self.length as f64
    }

    /// outer span of the repeat pair
    pub fn span(&self) -> (u64, u64) {
        (self.left_start, self.right_end)
    }
}

/// Model metadata carried by a candidate
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct HmmHitInfo {
    pub family_name: String,
    pub best_domain_evalue: f64,
    pub full_sequence_evalue: f64,
    pub overlap_count: u32,
}

impl From<&OrfHit> for HmmHitInfo {
    fn from(hit: &OrfHit) -> Self {
        HmmHitInfo {
            family_name: hit.family_name.clone(),
            best_domain_evalue: hit.best_domain_evalue,
            full_sequence_evalue: hit.full_sequence_evalue,
            overlap_count: hit.overlap_count,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Boundary {
    pub begin: u64,
    pub end: u64,
}

impl Boundary {
    pub fn new(begin: u64, end: u64) -> Self {
        Boundary {
            begin: begin.min(end),
            end: begin.max(end),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    pub fn span(&self) -> (u64, u64) {
        (self.begin, self.end)
    }
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct Occurrence {
    pub copy_number_for_element: usize,
    pub similarity_for_element: f64,
    pub copy_number_for_orf: usize,
    pub similarity_for_orf: f64,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub evalue_score: f64,
    pub tir_score: f64,
    pub direct_repeat_score: f64,
    pub occurrence_score: f64,
    pub total_score: f64,
    pub copy_number_for_orf: usize,
    pub copy_number_for_element: usize,
    pub tir_identity_ratio: f64,
}

/// IS element candidate threaded through refinement and scoring
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub orf: Orf,
    pub tirs: Vec<Tir>,
    pub hmm_hit: HmmHitInfo,
    pub boundary: Boundary,
    pub occurrence: Occurrence,
    pub score: Option<ScoreBreakdown>,
}

impl Candidate {
    pub fn family(&self) -> &str {
        family_of(&self.hmm_hit.family_name)
    }

    pub fn evalue(&self, rank: EvalueRank) -> f64 {
        match rank {
            EvalueRank::DomainEvalue => self.hmm_hit.best_domain_evalue,
            EvalueRank::FullSequenceEvalue => self.hmm_hit.full_sequence_evalue,
        }
    }

    pub fn best_tir(&self) -> Option<&Tir> {
        self.tirs.first()
    }

    pub fn is_multi_copy(&self) -> bool {
        self.occurrence.copy_number_for_element > 1
    }

    pub fn tir_score(&self) -> f64 {
        self.best_tir().map(|tir| tir.score).unwrap_or(0.0)
    }
}

/// Tabular alignment record [blastn -outfmt 6 subset]
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Alignment {
    pub query_id: String,
    pub subject_id: String,
    pub aligned_length: u64,
    pub query_start: u64,
    pub query_end: u64,
    pub subject_start: u64,
    pub subject_end: u64,
    pub identity_count: u64,
    pub percent_identity: f64,
}

impl Alignment {
    pub fn parse(line: &str) -> Result<Alignment, String> {
        let mut fields = line.split('\t');
        let mut next = |name: &str| {
            fields
                .next()
                .map(|f| f.trim())
                .ok_or_else(|| format!("Cannot parse {} from '{}'", name, line))
        };
        let int = |field: &str| {
            field
                .parse::<u64>()
                .map_err(|_| format!("Cannot parse integer '{}'", field))
        };

        let query_id = next("qseqid")?.to_string();
        let subject_id = next("sseqid")?.to_string();
        let aligned_length = int(next("length")?)?;
        let query_start = int(next("qstart")?)?;
        let query_end = int(next("qend")?)?;
        let subject_start = int(next("sstart")?)?;
        let subject_end = int(next("send")?)?;
        let identity_count = int(next("nident")?)?;
        let percent_identity = next("pident")?
            .parse::<f64>()
            .map_err(|_| format!("Cannot parse pident from '{}'", line))?;

        Ok(Alignment {
            query_id,
            subject_id,
            aligned_length,
            query_start,
            query_end,
            subject_start,
            subject_end,
            identity_count,
            percent_identity,
        })
    }

    pub fn identity_fraction(&self) -> f64 {
        if self.aligned_length == 0 {
            return 0.0;
        }
        self.identity_count as f64 / self.aligned_length as f64
    }
}

/// DNA record plus the organism/file it came from
#[derive(Debug, PartialEq, Clone)]
pub struct SequenceRecord {
    pub id: String,
    pub organism: String,
    pub file_id: String,
    pub seq: Vec<u8>,
}

impl SequenceRecord {
    pub fn len(&self) -> u64 {
        self.seq.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// 1-based inclusive slice
    pub fn slice(&self, begin: u64, end: u64) -> &[u8] {
        let begin = begin.max(1) as usize - 1;
        let end = (end as usize).min(self.seq.len());

        if begin >= end {
            return &[];
        }
        &self.seq[begin..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "gi|256374160|ref|NC_013093.1|_6781872_6782144_- - IS200_IS605_0.faa - 3.2e-20 70.1 0.1 1.1e-19 68.4 0.1 1.8 1 0 0 1 1 1 1 # 6781872 # 6782144 # -1 # ID=1_1";

    #[test]
    fn test_hmm_hit_parse_aliases_full_sequence_evalue() {
        let hit = HmmHit::parse(LINE).unwrap();

        assert_eq!(hit.best_domain_evalue, 1.1e-19);
        assert_eq!(hit.full_sequence_evalue, 1.1e-19);
        assert_eq!(hit.query_name, "IS200/IS605_0.faa");
        assert_eq!(hit.overlap_count, 0);
        assert_eq!(hit.seq_id(), "gi|256374160|ref|NC_013093.1|");
        assert_eq!(hit.locus_key(), "gi|256374160|ref|NC_013093.1|_6781872_6782144");
    }

    #[test]
    fn test_hmm_hit_parse_rejects_short_and_bad_ids() {
        assert!(HmmHit::parse("seq1_1_2_+ - IS3_1 - 1e-5").is_err());

        let bad = LINE.replacen("_6782144_-", "_6782144_x", 1);
        assert!(HmmHit::parse(&bad).is_err());
    }

    #[test]
    fn test_orf_from_compound_id_with_underscored_seqid() {
        let orf = Orf::from_compound_id("SRS078176_LANL_scaffold_27612_1219_2391_-").unwrap();

        assert_eq!(orf.seq_id, "SRS078176_LANL_scaffold_27612");
        assert_eq!(orf.span(), (1219, 2391));
        assert_eq!(orf.strand, Strand::Reverse);
        assert_eq!(orf.len(), 1173);
        assert_eq!(orf.to_string(), "SRS078176_LANL_scaffold_27612_1219_2391_-");
    }

    #[test]
    fn test_orf_hit_family_names() {
        let hit = HmmHit::parse(LINE).unwrap();
        let orf_hit = OrfHit::from_hit(hit).unwrap();

        assert_eq!(orf_hit.family_name, "IS200/IS605_0");
        assert_eq!(orf_hit.family(), "IS200/IS605");
        assert!(orf_hit.is_two_gene_family());

        assert_eq!(family_of("IS110_25|IS110||ISLIN1|"), "IS110");
        assert_eq!(family_cluster("IS110_25|IS110||ISLIN1|"), "IS110_25");
        assert_eq!(family_of("IS30"), "IS30");
    }

    #[test]
    fn test_alignment_parse() {
        let aln = Alignment::parse("q1\ts1\t1200\t1\t1200\t5001\t6200\t1188\t99.0").unwrap();

        assert_eq!(aln.aligned_length, 1200);
        assert_eq!(aln.subject_start, 5001);
        assert!((aln.identity_fraction() - 0.99).abs() < 1e-12);
        assert!(Alignment::parse("q1\ts1\tNaN").is_err());
    }

    #[test]
    fn test_sequence_record_slice_is_one_based() {
        let record = SequenceRecord {
            id: "s".to_string(),
            organism: "o".to_string(),
            file_id: "f".to_string(),
            seq: b"ACGTACGT".to_vec(),
        };

        assert_eq!(record.slice(1, 4), b"ACGT");
        assert_eq!(record.slice(7, 100), b"GT");
        assert_eq!(record.slice(9, 10), b"");
    }
}
