use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::PredError;

// family -> (min element length, max element length) in bp
pub const FAMILY_LENGTHS: [(&str, u64, u64); 26] = [
    ("IS1", 700, 2500),
    ("IS110", 1000, 2500),
    ("IS1182", 1300, 2500),
    ("IS1380", 1500, 2500),
    ("IS1595", 700, 2000),
    ("IS1634", 1500, 3000),
    ("IS200/IS605", 600, 2500),
    ("IS21", 1700, 3500),
    ("IS256", 1100, 2000),
    ("IS3", 1000, 2000),
    ("IS30", 900, 2000),
    ("IS4", 1100, 2500),
    ("IS481", 900, 2000),
    ("IS5", 700, 2500),
    ("IS6", 700, 1500),
    ("IS607", 1500, 2600),
    ("IS630", 900, 1500),
    ("IS66", 1800, 3500),
    ("IS701", 1200, 1600),
    ("IS91", 1500, 2500),
    ("IS982", 900, 1500),
    ("ISAS1", 1100, 1500),
    ("ISAzo13", 1200, 2000),
    ("ISH3", 1100, 1500),
    ("ISL3", 1200, 2500),
    ("ISNCY", 500, 4000),
];

/// Min/max element length bounds for one IS family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: u64,
    pub max: u64,
}

/// Per-family element length table
///
/// Starts from the built-in table and can be patched from a JSON
/// object of the form `{"IS3": {"min": 1000, "max": 2000}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyTable {
    lengths: HashMap<String, LengthBounds>,
}

impl Default for FamilyTable {
    fn default() -> Self {
        let lengths = FAMILY_LENGTHS
            .iter()
            .map(|(family, min, max)| {
                (
                    family.to_string(),
                    LengthBounds {
                        min: *min,
                        max: *max,
                    },
                )
            })
            .collect();

        Self { lengths }
    }
}

impl FamilyTable {
    pub fn with_overrides<P: AsRef<Path>>(path: P) -> Result<Self, PredError> {
        let mut table = FamilyTable::default();
        let contents = std::fs::read_to_string(path.as_ref())?;
        let overrides: HashMap<String, LengthBounds> =
            serde_json::from_str(&contents)?;

        for (family, bounds) in overrides {
            log::info!(
                "Overriding element lengths for {}: {}-{}",
                family,
                bounds.min,
                bounds.max
            );
            table.lengths.insert(family, bounds);
        }

        Ok(table)
    }

    pub fn get(&self, family: &str) -> Result<LengthBounds, PredError> {
        self.lengths
            .get(family)
            .copied()
            .ok_or_else(|| PredError::UnknownFamily(family.to_string()))
    }

    pub fn contains(&self, family: &str) -> bool {
        self.lengths.contains_key(family)
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}
