use std::fs;

use assert_cmd::Command;

fn write_levels(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn solve_prints_stats_line() {
    let path = write_levels(
        "boulder-cli-solve.xsb",
        "; 1\n\n#######\n#@ $ .#\n#######\n",
    );

    let mut cmd = Command::cargo_bin("boulder").unwrap();
    cmd.args([
        "solve",
        path.to_str().unwrap(),
        "1",
        "--no-deadlocks",
        "--print-solution",
    ]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("solved: Y"))
        .stdout(predicates::str::contains("rRR"));
}

#[test]
fn optimize_prints_improved_solution() {
    let path = write_levels(
        "boulder-cli-optimize.xsb",
        "#######\n#     #\n#@$  .#\n#     #\n#######\n",
    );

    let mut cmd = Command::cargo_bin("boulder").unwrap();
    cmd.args([
        "optimize",
        path.to_str().unwrap(),
        "1",
        "--solution",
        "RurrdLulldRRR",
        "--metric",
        "pushes-moves",
    ]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("RRR"));
}

#[test]
fn invalid_solution_fails() {
    let path = write_levels("boulder-cli-invalid.xsb", "#####\n#@$.#\n#####\n");

    let mut cmd = Command::cargo_bin("boulder").unwrap();
    cmd.args(["optimize", path.to_str().unwrap(), "1", "--solution", "L"]);
    cmd.assert().failure();
}
