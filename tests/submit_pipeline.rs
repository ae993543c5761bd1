//! End-to-end tests for a submission run.
//!
//! These drive the library from manifest files to recorded prun commands
//! without invoking any grid tools.

use std::fs;
use std::sync::Arc;

use ntsubmit::config::{JobKind, SubmitConfig};
use ntsubmit::naming::{DatasetNamer, NamingContext, MAX_DATASET_NAME_LENGTH};
use ntsubmit::orchestrator::SubmissionOrchestrator;
use ntsubmit::rules::NamingRules;
use ntsubmit::submit::RecordingSubmitter;

const SIGNAL_MANIFEST: &str = "\
# SUSY signal, p1512
mc12_8TeV.176270.Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_1.merge.NTUP_SUSY.e1702_a188_a171_r4485_p1512/ 20000 0.12*0.5 0.01
mc12_8TeV.176271.Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_2.merge.NTUP_SUSY.e1702_s1469_s1470_r3542_r3549_p1512/
# mc12_8TeV.176272.commented_out.merge.NTUP_SUSY.e1702_s1469_s1470_r4485_p1512/
data12_8TeV.periodB.physics_Muons.PhysCont.NTUP_SUSY.grp14_v01_p1512/
";

#[tokio::test]
async fn test_signal_manifest_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let manifest = dir.path().join("signal.txt");
    fs::write(&manifest, SIGNAL_MANIFEST).unwrap();

    let mut config = SubmitConfig::new(JobKind::Susy)
        .with_input_files(vec![manifest])
        .with_nickname("alice");
    config.prun.excluded_sites = "BAD_SITE_1,BAD_SITE_2".to_string();

    let recorder = Arc::new(RecordingSubmitter::new());
    let orchestrator =
        SubmissionOrchestrator::new(config, NamingRules::builtin().unwrap(), recorder.clone());

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.failed, 0);

    let jobs = recorder.jobs().await;
    assert_eq!(jobs.len(), 2);

    let first = &jobs[0];
    assert_eq!(first.sample, "Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_1");
    assert_eq!(first.production.as_deref(), Some("mc12b"));
    assert_eq!(
        first.output_dataset,
        "user.alice.mc12_8TeV.176270.Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_1.SusyNt.e1702_a188_a171_r4485_p1512_n0146/"
    );
    assert!(first.grid_command.contains("-w 20000 -x 0.06 -s Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_1 --errXsec 0.01"));
    assert!(first.grid_command.ends_with("--saveContTau --sys --af2"));
    assert!(first.prun_command.contains("--excludedSite=BAD_SITE_1,BAD_SITE_2"));
    assert!(first.prun_command.contains(&format!("--inDS {}", first.input_dataset)));

    let second = &jobs[1];
    assert_eq!(second.production.as_deref(), Some("mc12a"));
    assert!(second.grid_command.contains("-w 1 -x -1 -s Herwigpp_sM_wA_noslep_notauhad_WH_2Lep_2 --errXsec -1"));
    assert!(!second.grid_command.contains("--af2"));
}

#[tokio::test]
async fn test_data_run_with_group_role() {
    let dir = tempfile::TempDir::new().unwrap();
    let manifest = dir.path().join("data12_Muons.txt");
    fs::write(
        &manifest,
        "group.phys-susy.data12_8TeV.periodB.physics_Muons.PhysCont.NTUP_SUSYSKIM.grp14_v01_p1542/\n\
         group.phys-susy.data12_8TeV.periodC.physics_Muons.PhysCont.NTUP_SUSYSKIM.grp14_v01_p1542/\n",
    )
    .unwrap();

    let config = SubmitConfig::new(JobKind::Data)
        .with_input_files(vec![manifest])
        .with_pattern("periodB")
        .with_group_role(true);

    let recorder = Arc::new(RecordingSubmitter::new());
    let orchestrator =
        SubmissionOrchestrator::new(config, NamingRules::builtin().unwrap(), recorder.clone());
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.submitted, 1);

    let jobs = recorder.jobs().await;
    let job = &jobs[0];
    assert_eq!(job.sample, "data12_8TeV.periodB.Muons");
    assert!(job.production.is_none());
    assert_eq!(
        job.output_dataset,
        "group.phys-susy.data12_8TeV.periodB.physics_Muons.PhysCont.SusyNt.grp14_v01_p1542_n0146/"
    );
    assert!(job
        .prun_command
        .contains("--destSE=SLACXRD_SCRATCHDISK,SWT2_CPB_PHYS-SUSY,LRZ-LMU_PHYS-SUSY"));
    assert!(job
        .prun_command
        .contains("--official --voms atlas:/atlas/phys-susy/Role=production"));
}

#[test]
fn test_namer_length_and_separator_invariants() {
    let rules = NamingRules::builtin().unwrap();
    let context = NamingContext::new("n0146", "a_rather_long_grid_nickname").with_prun_suffix("_nt");
    let namer = DatasetNamer::new(&context, &rules);

    let inputs = [
        "mc12_8TeV.164274.MadGraphPythia_AUET2BCTEQ6L1_SM_TT_directCC_2LeptonFilter_plus_additional_words.merge.NTUP_SUSY.e1990_a188_a171_r3549_p1512/",
        "mc12_8TeV.157955.Sherpa_CT10_WZ_lllnu_MassiveCB_extended.merge.NTUP_SUSY.e1685_s1469_s1470_r3542_r3549_p1512/",
        "mc12_8TeV.999999.someProcess.merge.NTUP_SUSY.r4485_p1512/",
    ];

    for input in inputs {
        let out = namer.name(input);
        let name = out.as_str();
        assert!(!out.is_over_length(), "{name} should fit");
        assert!(name.len() + context.prun_suffix.len() + 1 <= MAX_DATASET_NAME_LENGTH);
        for bad in ["__", "..", "_.", "._"] {
            assert!(!name.contains(bad), "{name} contains {bad}");
        }
        assert!(name.starts_with("user.a_rather_long_grid_nickname."));
        assert!(name.ends_with("_n0146/"));
    }
}
