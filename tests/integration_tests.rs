// End-to-end scenarios: count tables straight into the bootstrap, and the
// full pipeline from raw intensities to similarity scores and verdicts.

use approx::assert_relative_eq;
use ndarray::Array2;
use single_similarity::bootstrap::{Verdict, bootstrap_significance};
use single_similarity::similarity::CountTable;
use single_similarity::{AnalysisConfig, SimilarityPipeline};

/// Expand (index, reference count, test count) rows into labeled points.
fn labeled_counts(rows: &[(u128, u64, u64)]) -> (Vec<u128>, Vec<String>) {
    let mut indices = Vec::new();
    let mut labels = Vec::new();
    for &(index, reference, test) in rows {
        for _ in 0..reference {
            indices.push(index);
            labels.push("reference".to_string());
        }
        for _ in 0..test {
            indices.push(index);
            labels.push("stim".to_string());
        }
    }
    (indices, labels)
}

#[test]
fn dominant_index_flagged_decreased() {
    // Index 10 holds 900 of 1000 reference points but only 100 of 500 stim
    // points; index 40 carries the rest. With flim=2 the stim fold at index
    // 10 is ~log2(0.22) = -2.2, well past the threshold in every draw.
    let (indices, labels) = labeled_counts(&[(10, 900, 100), (40, 100, 400)]);
    let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
    let config = AnalysisConfig {
        min_index_count: 50,
        n_repetitions: 400,
        fold_threshold: 2.0,
        significance: 0.95,
        granularity: 100,
        seed: Some(2024),
        ..Default::default()
    };
    let result = bootstrap_significance(&table, "reference", &config).unwrap();

    assert_eq!(result.conditions, vec!["stim".to_string()]);
    assert_eq!(result.indices, vec![10, 40]);
    // Smallest restricted condition holds 500 points, floored to 500.
    assert_eq!(result.sample_size, 500);

    let tally = result.tally(10, "stim").unwrap();
    assert_eq!(tally.total(), 400);
    assert!(
        tally.decreased >= 380,
        "expected >=380 decreased repetitions, got {}",
        tally.decreased
    );
    assert_eq!(result.verdict(0, 0), Verdict::Decreased);
    // The mirror index gained mass.
    assert_eq!(result.verdict(1, 0), Verdict::Increased);
}

#[test]
fn identical_distributions_yield_no_flags() {
    let (indices, labels) = labeled_counts(&[
        (3, 250, 250),
        (7, 250, 250),
        (11, 250, 250),
        (19, 250, 250),
    ]);
    let table = CountTable::from_labeled_indices(&indices, &labels).unwrap();
    let config = AnalysisConfig {
        min_index_count: 50,
        n_repetitions: 400,
        fold_threshold: 2.0,
        significance: 0.95,
        granularity: 100,
        seed: Some(99),
        ..Default::default()
    };
    let result = bootstrap_significance(&table, "reference", &config).unwrap();
    assert!(
        result.significant().is_empty(),
        "no index should be flagged: {:?}",
        result.significant()
    );
}

fn pipeline_config() -> AnalysisConfig {
    AnalysisConfig {
        n_bins: 4,
        min_bin_count: 20,
        curve_order: 2,
        min_index_count: 20,
        n_repetitions: 100,
        fold_threshold: 2.0,
        significance: 0.9,
        granularity: 100,
        seed: Some(7),
        ..Default::default()
    }
}

/// Deterministic point cloud: three channels cycling through 0..50.
fn cyclic_cloud(n: usize, offset: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(n * 3);
    for i in 0..n {
        values.push(offset + ((i * 13) % 50) as f64);
        values.push(offset + ((i * 29) % 50) as f64);
        values.push(offset + ((i * 7) % 50) as f64);
    }
    values
}

#[test]
fn identical_conditions_through_the_full_pipeline() {
    let n = 600;
    let mut values = cyclic_cloud(n, 0.0);
    values.extend(cyclic_cloud(n, 0.0));
    let matrix = Array2::from_shape_vec((2 * n, 3), values).unwrap();
    let mut labels = vec!["a".to_string(); n];
    labels.extend(vec!["b".to_string(); n]);

    let pipeline = SimilarityPipeline::new(pipeline_config());
    let artifacts = pipeline.run(matrix.view(), &labels).unwrap();

    let divergence = artifacts.similarity_matrix().unwrap();
    assert_relative_eq!(divergence[[0, 1]], 0.0, epsilon = 1e-12);

    let result = artifacts.bootstrap("a").unwrap();
    assert!(
        result.significant().is_empty(),
        "identical conditions flagged: {:?}",
        result.significant()
    );
}

#[test]
fn shifted_condition_is_dissimilar_and_flagged() {
    let n = 600;
    let mut values = cyclic_cloud(n, 0.0);
    // Condition b lives in a disjoint region of intensity space.
    values.extend(cyclic_cloud(n, 200.0));
    let matrix = Array2::from_shape_vec((2 * n, 3), values).unwrap();
    let mut labels = vec!["a".to_string(); n];
    labels.extend(vec!["b".to_string(); n]);

    let pipeline = SimilarityPipeline::new(pipeline_config());
    let artifacts = pipeline.run(matrix.view(), &labels).unwrap();

    let divergence = artifacts.similarity_matrix().unwrap();
    assert!(
        divergence[[0, 1]] > 0.9,
        "disjoint conditions should diverge, got {}",
        divergence[[0, 1]]
    );

    let result = artifacts.bootstrap("a").unwrap();
    let flagged = result.significant();
    assert!(!flagged.is_empty());
    assert!(
        flagged
            .iter()
            .any(|&(_, _, verdict)| verdict == Verdict::Decreased),
        "regions populated only by the reference must read as decreased: {flagged:?}"
    );
}

#[test]
fn pipeline_runs_are_reproducible() {
    let n = 600;
    let mut values = cyclic_cloud(n, 0.0);
    values.extend(cyclic_cloud(n, 200.0));
    let matrix = Array2::from_shape_vec((2 * n, 3), values).unwrap();
    let mut labels = vec!["a".to_string(); n];
    labels.extend(vec!["b".to_string(); n]);

    let pipeline = SimilarityPipeline::new(pipeline_config());
    let first = pipeline.run(matrix.view(), &labels).unwrap();
    let second = pipeline.run(matrix.view(), &labels).unwrap();

    assert_eq!(first.indices, second.indices);
    assert_eq!(first.ordering.permutation, second.ordering.permutation);
    assert_eq!(
        first.bootstrap("a").unwrap(),
        second.bootstrap("a").unwrap()
    );
}
