use crate::error::{BenchError, BenchResult};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Reads one city name per line. Blank lines are skipped and repeated names
/// are kept once, in order of first appearance.
pub fn load_city_names(path: &Path) -> BenchResult<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|source| BenchError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::new();
    let names: Vec<String> = contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(BenchError::NoCities(path.to_path_buf()));
    }
    Ok(names)
}

pub fn copies_for(num_cities: usize, num_unique: usize) -> usize {
    (num_cities / num_unique.max(1)).max(1)
}

/// Expands every name into `copies` suffixed instances, `<name>_<copy>`,
/// highest copy index first.
pub fn synthesize_instances(unique: &[String], copies: usize) -> Vec<String> {
    let mut instances = Vec::with_capacity(unique.len() * copies);
    for copy in (0..copies).rev() {
        for name in unique {
            instances.push(format!("{name}_{copy}"));
        }
    }
    instances
}

/// Shuffles `instances` and keeps up to `count` distinct names.
pub fn sample_cities<R: Rng + ?Sized>(
    mut instances: Vec<String>,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    if instances.len() < count {
        warn!(
            requested = count,
            available = instances.len(),
            "not enough city instances, using all of them"
        );
    }
    instances.shuffle(rng);
    instances.truncate(count);

    let mut seen = HashSet::with_capacity(instances.len());
    instances.retain(|name| seen.insert(name.clone()));
    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Write;

    #[test]
    fn loading_skips_blanks_and_repeats() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "Paris\nLyon\r\n\nParis\nNice  \n").expect("write");

        let names = load_city_names(file.path()).expect("load");
        assert_eq!(names, vec!["Paris", "Lyon", "Nice"]);
    }

    #[test]
    fn empty_file_has_no_cities() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        assert!(matches!(
            load_city_names(file.path()),
            Err(BenchError::NoCities(_))
        ));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.txt");
        match load_city_names(&path) {
            Err(BenchError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn instances_carry_copy_suffixes() {
        let unique = vec!["Oslo".to_string(), "Rome".to_string()];
        let instances = synthesize_instances(&unique, 2);
        assert_eq!(instances, vec!["Oslo_1", "Rome_1", "Oslo_0", "Rome_0"]);
        assert_eq!(copies_for(10_000, 1_000), 10);
        assert_eq!(copies_for(5, 1_000), 1);
    }

    #[test]
    fn sample_has_requested_size_when_enough_instances() {
        let unique: Vec<String> = (0..50).map(|i| format!("city{i}")).collect();
        let instances = synthesize_instances(&unique, 4);
        let mut rng = StdRng::seed_from_u64(7);

        let sample = sample_cities(instances, 120, &mut rng);
        assert_eq!(sample.len(), 120);
        let distinct: HashSet<&String> = sample.iter().collect();
        assert_eq!(distinct.len(), 120);
    }

    #[test]
    fn sample_is_bounded_by_available_instances() {
        let unique = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let instances = synthesize_instances(&unique, 2);
        let mut rng = StdRng::seed_from_u64(7);

        let sample = sample_cities(instances, 100, &mut rng);
        assert_eq!(sample.len(), 6);
    }

    #[test]
    fn sample_drops_colliding_names() {
        let instances = vec!["X_0".to_string(), "X_0".to_string(), "Y_0".to_string()];
        let mut rng = StdRng::seed_from_u64(1);

        let mut sample = sample_cities(instances, 3, &mut rng);
        sample.sort();
        assert_eq!(sample, vec!["X_0", "Y_0"]);
    }
}
