use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_chart_prints_grid() {
    let expected = [
        "    3.00  ┤ ╭╮",
        "    2.25  ┤╭╯╰╮",
        "    1.50  ┤│  │",
        "    0.75  ┼╯  ╰",
        "    0.00  ┼",
        "",
    ]
    .join("\n");

    cargo_bin_cmd!("pulse")
        .args(["chart", "--height", "4", "1", "2", "3", "2", "1"])
        .assert()
        .success()
        .stdout(predicate::str::diff(expected));
}

#[test]
fn test_chart_reads_stdin() {
    cargo_bin_cmd!("pulse")
        .args(["chart", "--height", "2"])
        .write_stdin("0 -1 nan 1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("-1.00"))
        .stdout(predicate::str::contains("╴"));
}

#[test]
fn test_chart_rejects_inverted_bounds() {
    cargo_bin_cmd!("pulse")
        .args(["chart", "--min", "5", "--max", "1", "1", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot exceed"));
}

#[test]
fn test_chart_without_values_prints_nothing() {
    cargo_bin_cmd!("pulse")
        .arg("chart")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_chart_rejects_huge_range_without_height() {
    cargo_bin_cmd!("pulse")
        .args(["chart", "0", "1e300"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass a height"));
}
