//! Monte Carlo and global sensitivity analysis over the demo project

mod common;

use abcalc::calc::contribution::{Compare, Cutoff, TotalMode};
use abcalc::calc::engine::InputKind;
use abcalc::calc::montecarlo::{IncludeFlags, McOptions};
use abcalc::calc::sensitivity::GsaOptions;
use abcalc::core::error::ErrorKind;
use abcalc::core::progress::Checkpoint;
use common::{assert_close, demo_project, load_setup, nan_sum, view, GWP_A};

fn technosphere_only() -> IncludeFlags {
    IncludeFlags {
        technosphere: true,
        ..IncludeFlags::none()
    }
}

#[test]
fn test_seeded_runs_are_identical() {
    let tmp = demo_project();
    let options = McOptions::new(50).seed(42).include(technosphere_only());

    let mut first = view(load_setup(&tmp, "compare", false));
    let mut second = view(load_setup(&tmp, "compare", false));
    let a = first.run_mc(&options, &mut Checkpoint::none()).unwrap().clone();
    let b = second.run_mc(&options, &mut Checkpoint::none()).unwrap().clone();
    assert_eq!(a, b);
    assert_eq!(a.shape(), (50, 2, 2));
    assert_eq!(a.seed, 42);

    let samples = a.by_fu_method(0, 0).unwrap();
    assert!(samples.iter().any(|v| (v - samples[0]).abs() > 1e-12));
}

#[test]
fn test_different_seeds_differ() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));
    let a = vm
        .run_mc(&McOptions::new(20).seed(1), &mut Checkpoint::none())
        .unwrap()
        .by_fu_method(0, 0)
        .unwrap();
    let b = vm
        .run_mc(&McOptions::new(20).seed(2), &mut Checkpoint::none())
        .unwrap()
        .by_fu_method(0, 0)
        .unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_technosphere_sampling_is_centred() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));
    let options = McOptions::new(200).seed(5).include(technosphere_only());
    let stats = vm
        .run_mc(&options, &mut Checkpoint::none())
        .unwrap()
        .statistics(0, 0)
        .unwrap();
    assert_eq!(stats.count, 200);
    assert!((stats.mean - GWP_A).abs() < 0.05, "mean {}", stats.mean);
    assert!(stats.min <= stats.percentile_2_5);
    assert!(stats.percentile_97_5 <= stats.max);
}

#[test]
fn test_nothing_included_reproduces_baseline() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));
    let options = McOptions::new(5).seed(3).include(IncludeFlags::none());
    let mc = vm.run_mc(&options, &mut Checkpoint::none()).unwrap();
    for v in mc.by_fu_method(0, 0).unwrap() {
        assert_close(v, GWP_A);
    }
}

#[test]
fn test_engine_is_restored_after_sampling() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "compare", false));
    vm.run_mc(&McOptions::new(10).seed(9), &mut Checkpoint::none())
        .unwrap();

    let frame = vm
        .first_tier_contributions(
            Compare::FunctionalUnits {
                method: 0,
                scenario: 0,
            },
            Cutoff::number(100),
            false,
            TotalMode::Score,
            None,
        )
        .unwrap();
    for i in 0..2 {
        let total = nan_sum(frame.contributors().map(|r| r.values[i]));
        assert_close(total, vm.scores().get(i, 0, 0));
    }
}

#[test]
fn test_sampling_a_scenario() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", true));
    let options = McOptions {
        scenario: Some(1),
        ..McOptions::new(4).seed(1).include(IncludeFlags::none())
    };
    let mc = vm.run_mc(&options, &mut Checkpoint::none()).unwrap();
    for v in mc.by_fu_method(0, 0).unwrap() {
        assert_close(v, 3.2);
    }

    let mut plain = view(load_setup(&tmp, "basic", false));
    let err = plain.run_mc(&options, &mut Checkpoint::none()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
}

#[test]
fn test_zero_iterations_rejected() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));
    let err = vm
        .run_mc(&McOptions::new(0), &mut Checkpoint::none())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Incompatible);
}

#[test]
fn test_histogram_frame() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "compare", false));
    vm.run_mc(&McOptions::new(12).seed(4), &mut Checkpoint::none())
        .unwrap();
    let frame = vm.mc_histogram(1).unwrap();
    assert_eq!(frame.rows.len(), 12);
    assert!(vm.mc_histogram(2).is_err());
}

#[test]
fn test_gsa_ranks_uniform_emission_first() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));

    let err = vm.run_gsa(&GsaOptions::new(0, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Insufficient);

    vm.run_mc(&McOptions::new(200).seed(7), &mut Checkpoint::none())
        .unwrap();
    let result = vm.run_gsa(&GsaOptions::new(0, 0)).unwrap();
    assert_eq!(result.rows.len(), 2);
    assert!(result.log_transformed);
    assert!(result.r_squared > 0.5);

    let top = &result.rows[0];
    assert_eq!(top.rank, 1);
    assert_eq!(top.kind, InputKind::Biosphere);
    assert_eq!(
        top.name,
        "B: carbon dioxide // electricity production (electricity) [FR]"
    );
    assert!(top.src > 0.0);
    assert!(top.src.abs() >= result.rows[1].src.abs());
    assert_eq!(result.rows[1].kind, InputKind::Technosphere);
    assert_eq!(result.to_frame().rows.len(), 2);
}

#[test]
fn test_gsa_needs_enough_iterations() {
    let tmp = demo_project();
    let mut vm = view(load_setup(&tmp, "basic", false));
    vm.run_mc(&McOptions::new(3).seed(7), &mut Checkpoint::none())
        .unwrap();
    let err = vm.run_gsa(&GsaOptions::new(0, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Insufficient);
}
