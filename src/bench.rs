//! Benchmark phases: build the city graph, link it, then time adjacency reads.

use crate::cities::{copies_for, load_city_names, sample_cities, synthesize_instances};
use crate::config::Config;
use crate::error::BenchResult;
use crate::report::{BenchReport, GraphAudit, LinkReport, PhaseReport, RunReport};
use crate::stats::{DescriptiveStats, LatencySummary};
use crate::store::{GraphDb, GraphWriter, NodeId, StoreError, StoreResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const CITY_LABEL: &str = "City";
pub const NEAR: &str = "NEAR";
pub const NAME_KEY: &str = "name";
pub const PLACES_INDEX: &str = "places";
pub const NEIGHBOURS_INDEX: &str = "neighbours";

pub fn run(config: &Config) -> BenchResult<BenchReport> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, "seeding random number generator");
    let mut rng = StdRng::seed_from_u64(seed);

    delete_db(&config.db_path);
    let db = GraphDb::open(&config.db_path)?;

    let unique = load_city_names(&config.cities_file)?;
    info!(
        count = unique.len(),
        file = %config.cities_file.display(),
        "loaded city names"
    );
    let copies = copies_for(config.cities, config.unique_cities);
    let instances = synthesize_instances(&unique, copies);
    let cities = sample_cities(instances, config.cities, &mut rng);

    let created = create_cities(&db, &cities)?;
    info!(count = created.count, secs = created.secs, "cities added");
    let linked = link_cities(&db, &cities, config.neighbours, &mut rng)?;
    info!(
        links = linked.links,
        relationships = linked.relationships_created,
        secs = linked.secs,
        "edges added"
    );

    let mut runs = Vec::with_capacity(config.runs);
    for run in 1..=config.runs {
        match measure_adjacency(&db, &cities)? {
            Some(latency) => {
                debug!(run, ?latency, "adjacency run finished");
                runs.push(RunReport { run, latency });
            }
            None => warn!(run, "no cities to measure"),
        }
    }

    let graph = audit_graph(&db)?;
    info!(path = %db.path().display(), "closing graph database");

    Ok(BenchReport {
        seed,
        cities_file: config.cities_file.clone(),
        cities_found: unique.len(),
        cities: created,
        edges: linked,
        runs,
        graph,
    })
}

/// Removes a previous database at `path`. Failures are logged, not returned.
pub fn delete_db(path: &Path) {
    if !path.exists() {
        return;
    }
    info!(path = %path.display(), "deleting existing db");
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(error) = result {
        error!(path = %path.display(), %error, "failed to delete existing db, continuing");
    }
}

pub fn create_cities(db: &GraphDb, cities: &[String]) -> StoreResult<PhaseReport> {
    db.write(|graph| {
        let started = Instant::now();
        for name in cities {
            let node = graph.create_node(CITY_LABEL)?;
            graph.set_node_property(node, NAME_KEY, name)?;
            graph.index_node(PLACES_INDEX, NAME_KEY, name, node)?;
        }
        Ok(PhaseReport {
            count: cities.len(),
            secs: started.elapsed().as_secs_f64(),
        })
    })
}

/// Shuffles `pool` and returns its first `count` entries other than `city`.
pub fn pick_neighbours<R: Rng + ?Sized>(
    pool: &mut [String],
    city: &str,
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    pool.shuffle(rng);
    pool.iter()
        .take(count)
        .filter(|name| name.as_str() != city)
        .cloned()
        .collect()
}

pub fn link_cities<R: Rng + ?Sized>(
    db: &GraphDb,
    cities: &[String],
    neighbours: usize,
    rng: &mut R,
) -> StoreResult<LinkReport> {
    let mut pool = cities.to_vec();
    db.write(|graph| {
        let started = Instant::now();
        let mut links = 0;
        let mut relationships_created = 0;

        for city_name in cities {
            let city = city_node(graph.single_node(PLACES_INDEX, NAME_KEY, city_name)?, city_name)?;
            for neighbour_name in pick_neighbours(&mut pool, city_name, neighbours, &mut *rng) {
                let neighbour = city_node(
                    graph.single_node(PLACES_INDEX, NAME_KEY, &neighbour_name)?,
                    &neighbour_name,
                )?;
                if link_once(graph, city_name, city, &neighbour_name, neighbour)? {
                    relationships_created += 1;
                }
                if link_once(graph, &neighbour_name, neighbour, city_name, city)? {
                    relationships_created += 1;
                }
                links += 1;
            }
        }

        Ok(LinkReport {
            links,
            relationships_created,
            secs: started.elapsed().as_secs_f64(),
        })
    })
}

/// Creates `from -> to` unless the neighbours index already holds it.
fn link_once(
    graph: &mut GraphWriter<'_>,
    from_name: &str,
    from: NodeId,
    to_name: &str,
    to: NodeId,
) -> StoreResult<bool> {
    let key = format!("{from_name}_{to_name}");
    if graph.single_relationship(NEIGHBOURS_INDEX, NAME_KEY, &key)?.is_some() {
        return Ok(false);
    }
    let relationship = graph.create_relationship(from, to, NEAR)?;
    graph.index_relationship(NEIGHBOURS_INDEX, NAME_KEY, &key, relationship)?;
    Ok(true)
}

fn city_node(found: Option<NodeId>, name: &str) -> StoreResult<NodeId> {
    found.ok_or_else(|| StoreError::MissingIndexEntry {
        index: PLACES_INDEX.to_string(),
        key: NAME_KEY.to_string(),
        value: name.to_string(),
    })
}

/// Times, per city, the name lookup plus reading every outgoing neighbour's
/// name. All reads share one snapshot.
pub fn measure_adjacency(db: &GraphDb, cities: &[String]) -> StoreResult<Option<LatencySummary>> {
    let graph = db.read()?;
    let mut stats = DescriptiveStats::with_capacity(cities.len());

    for city_name in cities {
        let started = Instant::now();
        let city = city_node(graph.single_node(PLACES_INDEX, NAME_KEY, city_name)?, city_name)?;
        let mut neighbours = Vec::new();
        for relationship in graph.outgoing(city)? {
            neighbours.extend(graph.node_property(relationship.end, NAME_KEY)?);
        }
        let elapsed = started.elapsed();
        black_box(neighbours);
        stats.add(elapsed.as_nanos() as f64);
    }

    Ok(stats.summary_millis())
}

pub fn audit_graph(db: &GraphDb) -> StoreResult<GraphAudit> {
    let graph = db.read()?;
    let relationships = graph.relationships()?;

    let mut audit = GraphAudit {
        nodes: graph.node_count()?,
        relationships: graph.relationship_count()?,
        ..GraphAudit::default()
    };
    let mut pairs = HashSet::with_capacity(relationships.len());
    for relationship in &relationships {
        if graph.relationship_type(relationship.id)?.as_deref() == Some(NEAR) {
            audit.near += 1;
        }
        if relationship.start == relationship.end {
            audit.self_loops += 1;
        }
        if !pairs.insert((relationship.start, relationship.end)) {
            audit.duplicate_pairs += 1;
        }
    }

    if audit.duplicate_pairs > 0 || audit.self_loops > 0 {
        warn!(?audit, "graph contains duplicate or self-referencing edges");
    } else {
        info!(nodes = audit.nodes, relationships = audit.relationships, "graph audited");
    }
    Ok(audit)
}
