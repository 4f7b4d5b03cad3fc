use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const CITIES: &str = "Paris\nLyon\nMarseille\nToulouse\nNice\nNantes\nStrasbourg\nBordeaux\n";

fn run_bench(db_path: &Path, cities_file: &Path, extra: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_citybench");
    Command::new(exe)
        .arg(db_path)
        .arg(cities_file)
        .args(["--cities", "40", "--unique-cities", "8", "--neighbours", "4"])
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run benchmark")
}

fn write_cities(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("cities.txt");
    fs::write(&path, CITIES).expect("write cities");
    path
}

#[test]
fn json_report_describes_a_consistent_graph() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cities_file = write_cities(temp.path());
    let db_path = temp.path().join("db");

    let output = run_bench(
        &db_path,
        &cities_file,
        &["--runs", "3", "--seed", "17", "--format", "json"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: Value = serde_json::from_slice(&output.stdout).expect("invalid json");
    assert_eq!(report["seed"], 17);
    assert_eq!(report["cities_found"], 8);
    assert_eq!(report["cities"]["count"], 40);
    assert_eq!(report["graph"]["nodes"], 40);
    assert_eq!(report["graph"]["duplicate_pairs"], 0);
    assert_eq!(report["graph"]["self_loops"], 0);
    assert_eq!(
        report["graph"]["relationships"],
        report["edges"]["relationships_created"]
    );

    let runs = report["runs"].as_array().expect("runs");
    assert_eq!(runs.len(), 3);
    for run in runs {
        let min = run["min"].as_f64().unwrap();
        let mean = run["mean"].as_f64().unwrap();
        let max = run["max"].as_f64().unwrap();
        let median = run["median"].as_f64().unwrap();
        assert!(min <= median && median <= max);
        assert!(min <= mean && mean <= max);
    }
    assert!(db_path.join("graph.redb").exists());
}

#[test]
fn text_report_prints_one_line_per_run() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cities_file = write_cities(temp.path());
    let db_path = temp.path().join("db");

    let output = run_bench(&db_path, &cities_file, &[]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.starts_with("Found 8 cities in "));
    assert!(stdout.contains("40 cities added in "));
    assert!(stdout.contains("Fetching adjacent cities for all cities : "));
    let runs: Vec<&str> = stdout.lines().filter(|line| line.starts_with("Run #")).collect();
    assert_eq!(runs.len(), 10);
    assert!(runs[9].starts_with("Run #10 min : "));
}

#[test]
fn stale_database_directory_is_replaced() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cities_file = write_cities(temp.path());
    let db_path = temp.path().join("db");
    fs::create_dir_all(&db_path).expect("mkdir");
    fs::write(db_path.join("leftover"), b"old run").expect("write");

    let output = run_bench(&db_path, &cities_file, &["--runs", "1", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert!(!db_path.join("leftover").exists());
    let report: Value = serde_json::from_slice(&output.stdout).expect("invalid json");
    assert_eq!(report["graph"]["nodes"], 40);
}

#[test]
fn missing_cities_file_fails() {
    let temp = tempfile::tempdir().expect("temp dir");
    let db_path = temp.path().join("db");

    let output = run_bench(&db_path, &temp.path().join("absent.txt"), &[]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
