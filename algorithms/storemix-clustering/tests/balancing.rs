use std::collections::BTreeSet;

use ndarray::{array, Array, Array2, Axis};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use storemix::prelude::*;
use storemix_clustering::{
    BalanceParams, BalanceReport, BalanceState, ConstraintSpecError, KMeans, Partition,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Six "Hot" stores around the origin and six "Cold" stores around (10, 10)
fn two_bands() -> (Array2<f64>, Vec<StoreId>, Vec<TemperatureBand>) {
    let hot = array![
        [0.0, 0.0],
        [0.0, 1.0],
        [1.0, 0.0],
        [1.0, 1.0],
        [0.5, 0.5],
        [0.2, 0.8]
    ];
    let cold = &hot + 10.0;
    let records = ndarray::concatenate(Axis(0), &[hot.view(), cold.view()]).unwrap();
    let ids = (0..12).map(|i| format!("store-{:02}", i)).collect();
    let bands = (0..12)
        .map(|i| TemperatureBand::from(if i < 6 { "Hot" } else { "Cold" }))
        .collect();
    (records, ids, bands)
}

fn cluster_and_balance(
    records: &Array2<f64>,
    ids: &[StoreId],
    bands: &[TemperatureBand],
    k: usize,
    params: BalanceParams,
) -> (BalanceReport, Vec<usize>, Vec<usize>) {
    let model = KMeans::params(k).fit(records).expect("KMeans fitted");
    let memberships = model.memberships().to_vec();
    let mut partition =
        Partition::new(records.view(), ids, bands, &memberships, model.centroids()).unwrap();
    let report = params.balance(&mut partition).unwrap();
    assert_partition_invariant(&partition);
    assert_eq!(report.violations, params.check_ref().unwrap().violations(&partition));
    assert_no_return_moves(&report);
    let sizes = partition.clusters().iter().map(|c| c.size()).collect();
    (report, partition.memberships().to_vec(), sizes)
}

fn assert_partition_invariant(partition: &Partition<f64>) {
    let mut seen = BTreeSet::new();
    for cluster in partition.clusters() {
        for &row in cluster.members() {
            assert!(seen.insert(row), "store {} in two clusters", row);
            assert_eq!(partition.memberships()[row], cluster.id());
        }
    }
    assert_eq!(seen.len(), partition.n_stores());
}

fn assert_no_return_moves(report: &BalanceReport) {
    let mut left = BTreeSet::new();
    for mv in &report.moves {
        assert!(
            !left.contains(&(mv.store_id.clone(), mv.to)),
            "{} moved back into cluster {}",
            mv.store_id,
            mv.to
        );
        left.insert((mv.store_id.clone(), mv.from));
    }
}

#[test]
fn two_bands_with_room_for_three_pure_clusters() {
    init_logger();
    let (records, ids, bands) = two_bands();
    let (report, memberships, sizes) =
        cluster_and_balance(&records, &ids, &bands, 3, BalanceParams::new(3, 6));

    assert_eq!(report.state, BalanceState::Satisfied);
    assert_eq!(sizes.len(), 3);
    assert_eq!(sizes.iter().sum::<usize>(), 12);
    assert!(sizes.iter().all(|&s| (3..=6).contains(&s)));
    for (row, &c) in memberships.iter().enumerate() {
        for (other, &d) in memberships.iter().enumerate() {
            if c == d {
                assert_eq!(bands[row], bands[other]);
            }
        }
    }
}

#[test]
fn two_bands_growing_to_four_pure_clusters() {
    init_logger();
    let (records, ids, bands) = two_bands();
    let (report, memberships, sizes) = cluster_and_balance(
        &records,
        &ids,
        &bands,
        3,
        BalanceParams::new(3, 5).max_clusters(4),
    );

    assert_eq!(report.state, BalanceState::Satisfied);
    assert_eq!(report.opened_clusters, vec![3]);
    assert_eq!(sizes, vec![3, 3, 3, 3]);
    for (row, &c) in memberships.iter().enumerate() {
        for (other, &d) in memberships.iter().enumerate() {
            if c == d {
                assert_eq!(bands[row], bands[other]);
            }
        }
    }
}

#[test]
fn two_bands_without_growth_is_partial() {
    init_logger();
    let (records, ids, bands) = two_bands();
    let (report, _, sizes) =
        cluster_and_balance(&records, &ids, &bands, 3, BalanceParams::new(3, 5));

    // six stores of a band need two pure clusters of at most five, four clusters in total
    assert_eq!(report.state, BalanceState::Partial);
    assert!(!report.budget_exhausted);
    assert_eq!(sizes.len(), 3);
    assert_eq!(report.violations.len(), 1);
    let violation = &report.violations[0];
    assert_eq!(violation.size, 6);
    assert_eq!(violation.store_ids.len(), 6);
    assert_eq!(sizes[violation.cluster_id], 6);
}

#[test]
fn minimum_size_above_the_population_is_rejected() {
    let (records, ids, bands) = two_bands();
    let model = KMeans::params(3).fit(&records).unwrap();
    let mut partition = Partition::new(
        records.view(),
        &ids,
        &bands,
        model.memberships().as_slice().unwrap(),
        model.centroids(),
    )
    .unwrap();

    let res = BalanceParams::new(7, 10).balance(&mut partition);
    assert_eq!(
        res,
        Err(ConstraintSpecError::Infeasible {
            min_cluster_size: 7,
            n_clusters: 3,
            n_stores: 12
        })
    );
    assert_eq!(
        BalanceParams::new(10, 5).balance(&mut partition),
        Err(ConstraintSpecError::ContradictorySizes { min: 10, max: 5 })
    );
}

#[test]
fn random_population_keeps_every_store() {
    init_logger();
    let mut rng = Xoshiro256Plus::seed_from_u64(7);
    let records = Array::random_using((90, 3), Uniform::new(-1.0, 1.0), &mut rng);
    let ids = (0..90).map(|i| format!("s{}", i)).collect::<Vec<_>>();
    let bands = records
        .rows()
        .into_iter()
        .map(|row| {
            let band = if rng.gen_bool(0.1) {
                "Mild"
            } else if row[0] < 0.0 {
                "Cold"
            } else {
                "Hot"
            };
            TemperatureBand::from(band)
        })
        .collect::<Vec<_>>();

    for tolerance in &[0.0, 0.2] {
        let params = BalanceParams::new(6, 15)
            .temperature_tolerance(*tolerance)
            .max_clusters(10);
        let (report, _, sizes) = cluster_and_balance(&records, &ids, &bands, 8, params);
        assert_eq!(sizes.iter().sum::<usize>(), 90);
        if report.state == BalanceState::Satisfied {
            assert!(sizes.iter().all(|&s| (6..=15).contains(&s)));
            assert!(report.violations.is_empty());
        } else {
            assert!(!report.violations.is_empty());
        }
    }
}
