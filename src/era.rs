//! Production-era classification from the reconstruction tag in a dataset name.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;

/// First reconstruction tag belonging to the mc12b campaign.
pub const MC12B_FIRST_RECO_TAG: u32 = 4485;

static RECO_TAG_PREFIX: OnceLock<Regex> = OnceLock::new();

fn reco_tag_prefix() -> &'static Regex {
    // Greedy: consumes everything up to the last "<digit>??_r" in the name.
    RECO_TAG_PREFIX.get_or_init(|| Regex::new(r".*[0-9].._r").expect("static regex is valid"))
}

/// Coarse production campaign of a simulated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McProduction {
    /// Era "A": reconstruction tags below [`MC12B_FIRST_RECO_TAG`].
    Mc12a,
    /// Era "B": reconstruction tags at or above [`MC12B_FIRST_RECO_TAG`].
    Mc12b,
}

impl McProduction {
    /// Classifies a numeric reconstruction tag.
    pub fn from_reco_tag(tag: u32) -> Self {
        if tag < MC12B_FIRST_RECO_TAG {
            McProduction::Mc12a
        } else {
            McProduction::Mc12b
        }
    }

    /// Short era letter.
    pub fn era(&self) -> &'static str {
        match self {
            McProduction::Mc12a => "A",
            McProduction::Mc12b => "B",
        }
    }

    /// Label passed to the grid executable.
    pub fn as_str(&self) -> &'static str {
        match self {
            McProduction::Mc12a => "mc12a",
            McProduction::Mc12b => "mc12b",
        }
    }
}

impl fmt::Display for McProduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the numeric reconstruction tag from a dataset name.
///
/// The tag is the text following the last `_r` that is preceded by a digit
/// and two further characters, up to the next underscore. For
/// `...e1193_s1469_s1470_r3542_r3549_p1328/` this yields `3549`.
pub fn reco_tag(dataset: &str) -> Result<u32, ParseError> {
    let rest = match reco_tag_prefix().find(dataset) {
        Some(m) => &dataset[m.end()..],
        None => dataset,
    };
    let extracted = rest.split('_').next().unwrap_or(rest);

    extracted.parse::<u32>().map_err(|_| ParseError::RecoTag {
        dataset: dataset.to_string(),
        extracted: extracted.to_string(),
    })
}

/// Determines the production campaign of a dataset.
///
/// Fails rather than guessing when no reconstruction tag can be found.
pub fn classify(dataset: &str) -> Result<McProduction, ParseError> {
    reco_tag(dataset).map(McProduction::from_reco_tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(McProduction::from_reco_tag(4484), McProduction::Mc12a);
        assert_eq!(McProduction::from_reco_tag(4485), McProduction::Mc12b);
        assert_eq!(McProduction::from_reco_tag(0).era(), "A");
        assert_eq!(McProduction::from_reco_tag(u32::MAX).era(), "B");
    }

    #[test]
    fn test_classify_uses_last_reco_tag() {
        let ds = "mc12_8TeV.105200.McAtNloJimmy_CT10_ttbar_LeptonFilter.merge.NTUP_SUSY.e1193_s1469_s1470_r3542_r3549_p1328/";
        assert_eq!(reco_tag(ds).unwrap(), 3549);
        assert_eq!(classify(ds).unwrap(), McProduction::Mc12a);
    }

    #[test]
    fn test_classify_mc12b() {
        let ds = "mc12_8TeV.176270.Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_1.merge.NTUP_SUSY.e1702_a188_a171_r4485_p1512/";
        assert_eq!(reco_tag(ds).unwrap(), 4485);
        assert_eq!(classify(ds).unwrap(), McProduction::Mc12b);
        assert_eq!(classify(ds).unwrap().to_string(), "mc12b");
    }

    #[test]
    fn test_missing_tag_is_an_error() {
        let ds = "data12_8TeV.periodB.physics_Egamma.PhysCont.NTUP_SUSY.grp14_v01_p1512/";
        match classify(ds) {
            Err(ParseError::RecoTag { dataset, extracted }) => {
                assert_eq!(dataset, ds);
                assert_eq!(extracted, "data12");
            }
            other => panic!("Expected RecoTag error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_tag_is_an_error() {
        let ds = "mc12_8TeV.1.proc.e100_s200_rXYZ_p1/";
        let err = classify(ds).unwrap_err();
        assert!(err.to_string().contains("XYZ"));
    }
}
