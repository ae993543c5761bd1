//! Human-readable sample labels.

use crate::rules::NamingRules;

/// Strips campaign and physics-group boilerplate from a dataset name.
///
/// The label is cosmetic and is not guaranteed to be unique.
pub fn sample_label(dataset: &str, rules: &NamingRules) -> String {
    rules.sample.apply(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mc_sample_label() {
        let rules = NamingRules::builtin().unwrap();
        assert_eq!(
            sample_label(
                "mc12_8TeV.105200.McAtNloJimmy_CT10_ttbar_LeptonFilter.merge.NTUP_SUSY.e1193_s1469_s1470_r3542_r3549_p1328/",
                &rules
            ),
            "McAtNloJimmy_CT10_ttbar_LeptonFilter"
        );
    }

    #[test]
    fn test_data_sample_label() {
        let rules = NamingRules::builtin().unwrap();
        assert_eq!(
            sample_label(
                "group.phys-susy.data12_8TeV.periodB.physics_Egamma.PhysCont.NTUP_SUSYSKIM.grp14_v01_p1542/",
                &rules
            ),
            "data12_8TeV.periodB.Egamma"
        );
    }
}
