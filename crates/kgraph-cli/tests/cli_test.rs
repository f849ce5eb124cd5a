use assert_cmd::Command;
use predicates::prelude::*;

fn kgraph() -> Command {
    Command::cargo_bin("kgraph").unwrap()
}

#[test]
fn help_lists_all_subcommands() {
    kgraph()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("clear"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn run_requires_repo_flag() {
    kgraph().arg("run").assert().failure();
}

#[test]
fn run_rejects_unknown_mode() {
    kgraph()
        .args(["run", "--repo", "/tmp/does-not-exist", "--mode", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn run_rejects_unknown_resolution_strategy() {
    kgraph()
        .args(["run", "--repo", "/tmp/does-not-exist", "--resolution-strategy", "bogus"])
        .assert()
        .failure();
}

#[test]
fn clear_without_repository_or_force_fails_without_contacting_a_database() {
    // Wiping every repository in one call needs an explicit --force, since
    // there's no single repository name to confirm against. This must be
    // rejected before `clear` ever tries to open a Neo4j connection, so the
    // test must not hang or time out.
    kgraph()
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn clear_single_repository_without_force_prompts_then_times_out_without_input() {
    // Without --force, clearing a named repository prompts for confirmation
    // on stdout rather than touching the database; closing stdin makes the
    // read fail immediately instead of hanging.
    kgraph()
        .args(["clear", "--repository", "some-repo"])
        .write_stdin("")
        .assert()
        .stdout(predicate::str::contains("Continue?"));
}
