use crate::error::BenchResult;
use crate::stats::LatencySummary;
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub count: usize,
    pub secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    /// (city, neighbour) pairs visited.
    pub links: usize,
    pub relationships_created: usize,
    pub secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: usize,
    #[serde(flatten)]
    pub latency: LatencySummary,
}

/// Shape of the graph after linking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphAudit {
    pub nodes: u64,
    pub relationships: u64,
    pub near: u64,
    pub duplicate_pairs: usize,
    pub self_loops: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub seed: u64,
    pub cities_file: PathBuf,
    pub cities_found: usize,
    pub cities: PhaseReport,
    pub edges: LinkReport,
    pub runs: Vec<RunReport>,
    pub graph: GraphAudit,
}

impl BenchReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "Found {} cities in {}",
            self.cities_found,
            self.cities_file.display()
        );
        let _ = writeln!(
            out,
            "{} cities added in {} secs",
            self.cities.count, self.cities.secs
        );
        let _ = writeln!(out, "{} edges added in {} secs", self.edges.links, self.edges.secs);
        let _ = writeln!(out);
        let _ = writeln!(out, "Fetching adjacent cities for all cities : ");
        for run in &self.runs {
            let _ = writeln!(
                out,
                "Run #{} min : {}, avg : {}, max : {}, median : {}",
                run.run, run.latency.min, run.latency.mean, run.latency.max, run.latency.median
            );
        }
        out
    }

    pub fn render_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> BenchReport {
        BenchReport {
            seed: 42,
            cities_file: PathBuf::from("cities.txt"),
            cities_found: 3,
            cities: PhaseReport { count: 6, secs: 0.5 },
            edges: LinkReport {
                links: 12,
                relationships_created: 20,
                secs: 1.25,
            },
            runs: vec![RunReport {
                run: 1,
                latency: LatencySummary {
                    min: 0.01,
                    mean: 0.02,
                    max: 0.05,
                    median: 0.015,
                },
            }],
            graph: GraphAudit::default(),
        }
    }

    #[test]
    fn text_report_lists_phases_and_runs() {
        let text = sample_report().render_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Found 3 cities in cities.txt");
        assert_eq!(lines[1], "6 cities added in 0.5 secs");
        assert_eq!(lines[2], "12 edges added in 1.25 secs");
        assert_eq!(lines[3], "");
        assert_eq!(
            lines[5],
            "Run #1 min : 0.01, avg : 0.02, max : 0.05, median : 0.015"
        );
    }

    #[test]
    fn json_report_flattens_run_latency() {
        let json = sample_report().render_json().expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["runs"][0]["run"], 1);
        assert!(json.contains("\"median\": 0.015"));
        assert_eq!(value["edges"]["relationships_created"], 20);
    }
}
