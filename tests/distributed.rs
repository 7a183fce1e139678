//! Multi-machine bin construction through the allgather seam.

mod common;

use std::sync::Arc;

use common::{write_file, RankNetwork, SharedGather};
use treeline::{Dataset, DatasetLoader, LoadConfig};

/// Run one simulated rank against a shared in-process allgather.
fn load_rank(
    path: &std::path::Path,
    shared: Arc<SharedGather>,
    rank: usize,
    num_machines: usize,
    config: LoadConfig,
) -> Dataset {
    let mut loader = DatasetLoader::new(config)
        .with_network(Arc::new(RankNetwork::new(shared, rank)));
    loader.load_from_file(path, rank, num_machines).unwrap()
}

/// Five feature columns (one trivial) over twenty rows.
fn make_csv() -> String {
    (0..20)
        .map(|i| {
            format!(
                "{},{},{},{},{},{}\n",
                i % 2,          // label
                i + 1,          // f0
                (i % 5) as f64, // f1
                7.0,            // f2: trivial
                (i * 3) % 11,   // f3
                i as f64 / 4.0, // f4
            )
        })
        .collect()
}

#[test]
fn distributed_mappers_match_single_machine() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "train.csv", &make_csv());

    // Single-machine reference over the full file.
    let mut solo_loader = DatasetLoader::new(LoadConfig::default());
    let solo = solo_loader.load_from_file(&path, 0, 1).unwrap();

    // Two ranks, each reading the full file as its pre-partitioned share:
    // samples coincide, so the gathered mappers must equal the local ones.
    let num_machines = 2;
    let shared = SharedGather::new(num_machines);
    let config = LoadConfig::builder().is_pre_partition(true).build();
    let datasets: Vec<Dataset> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_machines)
            .map(|rank| {
                let shared = Arc::clone(&shared);
                let config = config.clone();
                let path = path.as_path();
                scope.spawn(move || load_rank(path, shared, rank, num_machines, config))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for dataset in &datasets {
        assert_eq!(dataset.num_data(), solo.num_data());
        assert_eq!(dataset.num_total_features(), solo.num_total_features());
        assert_eq!(dataset.num_features(), solo.num_features());
        assert_eq!(dataset.used_feature_map(), solo.used_feature_map());
        for f in 0..solo.num_features() {
            assert_eq!(
                dataset.feature(f).bin_mapper(),
                solo.feature(f).bin_mapper(),
                "mapper mismatch on feature {f}"
            );
        }
    }
}

#[test]
fn all_ranks_agree_with_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "train.csv", &make_csv());

    let num_machines = 3;
    let shared = SharedGather::new(num_machines);
    let config = LoadConfig::builder().is_pre_partition(true).build();
    let datasets: Vec<Dataset> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_machines)
            .map(|rank| {
                let shared = Arc::clone(&shared);
                let config = config.clone();
                let path = path.as_path();
                scope.spawn(move || load_rank(path, shared, rank, num_machines, config))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first = &datasets[0];
    // The trivial column f2 is dropped identically everywhere.
    assert_eq!(first.used_feature_map()[2], -1);
    for other in &datasets[1..] {
        assert_eq!(other.used_feature_map(), first.used_feature_map());
        for f in 0..first.num_features() {
            assert_eq!(other.feature(f).bin_mapper(), first.feature(f).bin_mapper());
        }
    }
}
