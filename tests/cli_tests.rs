//! CLI command tests

mod common;

use common::{abcalc, demo_project, scenario_file};
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    abcalc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Life cycle assessment"));
}

#[test]
fn test_version_displays() {
    abcalc()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("abcalc"));
}

#[test]
fn test_unknown_command_fails() {
    abcalc()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_project_fails() {
    let tmp = TempDir::new().unwrap();
    abcalc()
        .current_dir(tmp.path())
        .arg("setups")
        .assert()
        .failure()
        .stderr(predicate::str::contains("project.yaml"));
}

#[test]
fn test_completions() {
    abcalc()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abcalc"));
}

// ============================================================================
// Setup and Score Tests
// ============================================================================

#[test]
fn test_setups_lists_names() {
    let tmp = demo_project();
    abcalc()
        .current_dir(tmp.path())
        .args(["setups", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("basic"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn test_scores_csv() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["scores", "basic", "-f", "csv", "--precision", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("IPCC | GWP100"))
        .stdout(predicate::str::contains("2.100"));
}

#[test]
fn test_scores_json() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["scores", "compare", "--long", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["))
        .stdout(predicate::str::contains("CED | fossil"));
}

#[test]
fn test_scores_with_scenarios() {
    let tmp = demo_project();
    let scenarios = scenario_file(&tmp);
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["scores", "basic", "-f", "csv", "--precision", "2", "--scenarios"])
        .arg(&scenarios)
        .assert()
        .success()
        .stdout(predicate::str::contains("IPCC | GWP100 | low"))
        .stdout(predicate::str::contains("3.20"));
}

#[test]
fn test_scores_export_to_file() {
    let tmp = demo_project();
    let out = tmp.path().join("scores.csv");
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["scores", "basic", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote 1 rows"));
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.contains("steel production"));
}

#[test]
fn test_unknown_setup_fails() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["scores", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_setup_required_without_terminal() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .arg("scores")
        .assert()
        .failure()
        .stderr(predicate::str::contains("setup name is required"));
}

#[test]
fn test_inventory_lists_flows() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["inventory", "basic", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("carbon dioxide"))
        .stdout(predicate::str::contains("methane"))
        .stdout(predicate::str::contains("water").not());
}

// ============================================================================
// Contribution Tests
// ============================================================================

#[test]
fn test_contrib_elementary() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["contrib", "basic", "-k", "elementary", "--absolute", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rest (+)"))
        .stdout(predicate::str::contains("carbon dioxide"));
}

#[test]
fn test_contrib_first_tier_by_method() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args([
            "contrib", "compare", "-k", "first-tier", "-c", "method", "--relative", "-f", "csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CED | fossil"))
        .stderr(predicate::str::contains("different units"));
}

#[test]
fn test_contrib_mixed_units_absolute_fails() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["contrib", "compare", "-c", "method", "--absolute"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("different units"));
}

#[test]
fn test_contrib_compare_scenarios() {
    let tmp = demo_project();
    let scenarios = scenario_file(&tmp);
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["contrib", "basic", "-c", "scenario", "-f", "csv", "-s"])
        .arg(&scenarios)
        .assert()
        .success()
        .stdout(predicate::str::contains("low"))
        .stdout(predicate::str::contains("high"));
}

#[test]
fn test_contrib_invalid_cutoff_fails() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["contrib", "basic", "--cutoff", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cutoff"));
}

// ============================================================================
// Monte Carlo and GSA Tests
// ============================================================================

#[test]
fn test_mc_seeded_output_is_reproducible() {
    let tmp = demo_project();
    let run = || {
        abcalc()
            .arg("--project")
            .arg(tmp.path())
            .args(["mc", "basic", "-n", "20", "--seed", "42", "-m", "0", "-f", "csv"])
            .output()
            .unwrap()
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert!(!first.stdout.is_empty());
}

#[test]
fn test_mc_statistics() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["mc", "basic", "-n", "10", "--seed", "1", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mean"))
        .stderr(predicate::str::contains("seed 1"));
}

#[test]
fn test_mc_histogram() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["mc", "basic", "-n", "30", "--seed", "3", "-m", "0", "--histogram", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Distribution"));
}

#[test]
fn test_mc_histogram_requires_method() {
    abcalc()
        .args(["mc", "basic", "--histogram", "0"])
        .assert()
        .failure();
}

#[test]
fn test_gsa_table() {
    let tmp = demo_project();
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["gsa", "basic", "-n", "200", "--seed", "7", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spearman"))
        .stdout(predicate::str::contains("B: carbon dioxide"));
}

// ============================================================================
// SQLite Store Tests
// ============================================================================

#[test]
fn test_import_then_read_from_store() {
    let tmp = demo_project();
    let db = tmp.path().join("store.db");
    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["import", "--to"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 'demo'"));

    abcalc()
        .arg("--project")
        .arg(tmp.path())
        .args(["import", "--to"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    abcalc()
        .arg("--db")
        .arg(&db)
        .args(["scores", "basic", "-f", "csv", "--precision", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2.100"));
}

#[test]
fn test_missing_store_fails() {
    let tmp = TempDir::new().unwrap();
    abcalc()
        .arg("--db")
        .arg(tmp.path().join("none.db"))
        .args(["scores", "basic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
