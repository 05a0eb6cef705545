use std::cell::{Cell, RefCell};

use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use crate::classifier::{Classifier, KnnClassifier};
use crate::clustering::{
    Cluster, Clustering, ClusteringResult, Copac, CopacConfig, Dbscan, DbscanConfig,
};
use crate::codec::{Codec, CodecConfig, CodecResult};
use crate::database::{
    Association, AssociationId, Database, InMemoryDatabase, ObjectId, QueryResult, RealVector,
};
use crate::dependency::{CorrelationModel, DependencyDerivator, DependencyDeriving};
use crate::distance::DistanceFunction;
use crate::evaluation::{
    ClassifierEvaluation, ConfusionMatrix, EvaluationConfig, EvaluationResult, Evaluating,
};
use crate::label::LabelType;
use crate::math::l2_distance;
use crate::preprocessing::{HiscConfig, HiscPreprocessor};
use crate::{ClusteringAlgorithm, KddError};

fn two_unit_clusters() -> InMemoryDatabase {
    InMemoryDatabase::from_vectors(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![10.0, 10.0],
        vec![11.0, 10.0],
        vec![10.0, 11.0],
    ])
    .expect("build database")
}

fn preference_strings(db: &dyn Database) -> Vec<String> {
    db.ids()
        .into_iter()
        .map(|id| {
            db.association(AssociationId::PreferenceVector, id)
                .expect("known id")
                .and_then(Association::as_preference_vector)
                .expect("preference vector set")
                .to_string()
        })
        .collect()
}

const STORE_FAILURE: KddError = KddError::Precondition("store unavailable");

/// Forwards to an in-memory database and counts queries and writes. The
/// n-th kNN query or write (1-based) fails when configured to.
struct CountingDatabase {
    inner: InMemoryDatabase,
    queries: Cell<usize>,
    writes: usize,
    failing_query: Option<usize>,
    failing_write: Option<usize>,
}

impl CountingDatabase {
    fn new(inner: InMemoryDatabase) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            writes: 0,
            failing_query: None,
            failing_write: None,
        }
    }
}

impl Database for CountingDatabase {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn ids(&self) -> Vec<ObjectId> {
        self.inner.ids()
    }

    fn dimensionality(&self) -> Option<usize> {
        self.inner.dimensionality()
    }

    fn get(&self, id: ObjectId) -> Result<&RealVector, KddError> {
        self.inner.get(id)
    }

    fn associate(&mut self, id: ObjectId, association: Association) -> Result<(), KddError> {
        self.writes += 1;
        if self.failing_write == Some(self.writes) {
            return Err(STORE_FAILURE);
        }
        self.inner.associate(id, association)
    }

    fn association(
        &self,
        key: AssociationId,
        id: ObjectId,
    ) -> Result<Option<&Association>, KddError> {
        self.inner.association(key, id)
    }

    fn is_set(&self, key: AssociationId) -> bool {
        self.inner.is_set(key)
    }

    fn knn_query_for_id(
        &self,
        id: ObjectId,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        self.queries.set(self.queries.get() + 1);
        if self.failing_query == Some(self.queries.get()) {
            return Err(STORE_FAILURE);
        }
        self.inner.knn_query_for_id(id, k, distance)
    }

    fn knn_query_for_object(
        &self,
        object: &RealVector,
        k: usize,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        self.queries.set(self.queries.get() + 1);
        self.inner.knn_query_for_object(object, k, distance)
    }

    fn range_query_for_id(
        &self,
        id: ObjectId,
        epsilon: f64,
        distance: &dyn DistanceFunction,
    ) -> Result<Vec<QueryResult>, KddError> {
        self.queries.set(self.queries.get() + 1);
        self.inner.range_query_for_id(id, epsilon, distance)
    }
}

/// Returns a fixed partition regardless of the data.
struct FixedClustering {
    clusters: Vec<(&'static str, Vec<ObjectId>)>,
}

impl Clustering for FixedClustering {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn run(&self, database: &mut dyn Database) -> Result<ClusteringResult, KddError> {
        let clusters = self
            .clusters
            .iter()
            .map(|(name, ids)| Cluster::new(*name, ids.clone()))
            .collect();
        ClusteringResult::new(clusters, &*database)
    }
}

/// Records the class label of every store it is asked to describe.
#[derive(Default)]
struct RecordingDerivator {
    visited: RefCell<Vec<String>>,
}

impl DependencyDeriving for RecordingDerivator {
    type Model = CorrelationModel;

    fn run(&self, database: &dyn Database) -> Result<CorrelationModel, KddError> {
        let first = database
            .ids()
            .first()
            .copied()
            .ok_or(KddError::Precondition("empty cluster"))?;
        let label = database.class_label(first)?.name().to_owned();
        self.visited.borrow_mut().push(label);
        DependencyDerivator::default().run(database)
    }
}

/// Hands back a prepared result and remembers what it was given.
struct SentinelEvaluation {
    result: EvaluationResult,
    seen: RefCell<Option<(usize, bool)>>,
}

impl Evaluating for SentinelEvaluation {
    fn run(&self, database: &dyn Database) -> Result<EvaluationResult, KddError> {
        *self.seen.borrow_mut() = Some((database.size(), database.is_set(AssociationId::Class)));
        Ok(self.result.clone())
    }
}

/// Counts the objects of every cluster, failing on the n-th call (1-based).
struct FailingDerivator {
    calls: Cell<usize>,
    failing_call: usize,
}

impl DependencyDeriving for FailingDerivator {
    type Model = usize;

    fn run(&self, database: &dyn Database) -> Result<usize, KddError> {
        self.calls.set(self.calls.get() + 1);
        if self.calls.get() == self.failing_call {
            return Err(KddError::Precondition("derivation failed"));
        }
        Ok(database.size())
    }
}

struct FailingEvaluation;

impl Evaluating for FailingEvaluation {
    fn run(&self, database: &dyn Database) -> Result<EvaluationResult, KddError> {
        Err(KddError::MissingAssociation {
            key: AssociationId::Label,
            id: database.ids().first().copied().unwrap_or_default(),
        })
    }
}

fn dbscan(epsilon: f64, min_pts: usize) -> Dbscan {
    Dbscan::new(DbscanConfig::new(epsilon, min_pts)).expect("valid dbscan config")
}

#[test]
fn six_point_preference_vectors() {
    let mut db = two_unit_clusters();
    let preprocessor = HiscPreprocessor::new(HiscConfig::new(0.01, Some(2))).expect("config");
    preprocessor.run(&mut db).expect("preprocess");
    assert_eq!(
        preference_strings(&db),
        vec!["01", "01", "10", "01", "01", "10"]
    );
}

#[test]
fn preference_bits_follow_neighborhood_deviation() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let alpha = 0.3;
    for dim in 1..=4 {
        // Axis d spreads with standard deviation 0.2 * (d + 1).
        let normals: Vec<Normal<f64>> = (0..dim)
            .map(|d| Normal::new(0.0, 0.2 * (d + 1) as f64).expect("normal distribution"))
            .collect();
        let vectors: Vec<Vec<f64>> = (0..12)
            .map(|_| normals.iter().map(|n| n.sample(&mut rng)).collect())
            .collect();
        let n = vectors.len();

        for k in 1..n {
            let mut db =
                InMemoryDatabase::from_vectors(vectors.clone()).expect("build database");
            HiscPreprocessor::new(HiscConfig::new(alpha, Some(k)))
                .expect("config")
                .run(&mut db)
                .expect("preprocess");
            assert!(db.is_set(AssociationId::PreferenceVector));

            for (id, object) in vectors.iter().enumerate() {
                let mut by_distance: Vec<(f64, usize)> = vectors
                    .iter()
                    .enumerate()
                    .map(|(other, v)| (l2_distance(object, v), other))
                    .collect();
                by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                let neighbors = &by_distance[..k];

                let expected: String = (0..dim)
                    .map(|d| {
                        let deviation = neighbors
                            .iter()
                            .map(|&(_, other)| (object[d] - vectors[other][d]).powi(2))
                            .sum::<f64>()
                            / k as f64;
                        if deviation < alpha {
                            '1'
                        } else {
                            '0'
                        }
                    })
                    .collect();
                let actual = db
                    .association(AssociationId::PreferenceVector, id)
                    .expect("known id")
                    .and_then(Association::as_preference_vector)
                    .expect("preference vector set");
                assert_eq!(actual.dimensionality(), dim);
                assert_eq!(actual.to_string(), expected, "dim {dim}, k {k}, object {id}");
            }
        }
    }
}

#[test]
fn empty_database_is_never_queried() {
    let mut db = CountingDatabase::new(InMemoryDatabase::new());
    HiscPreprocessor::default().run(&mut db).expect("preprocess");
    assert_eq!(db.queries.get(), 0);
    assert_eq!(db.writes, 0);
}

#[test]
fn preprocessing_queries_once_per_object() {
    let mut db = CountingDatabase::new(two_unit_clusters());
    HiscPreprocessor::default().run(&mut db).expect("preprocess");
    assert_eq!(db.queries.get(), 6);
    assert_eq!(db.writes, 6);
}

#[test]
fn knn_distribution_of_three_neighbors() {
    let mut db = InMemoryDatabase::new();
    for (x, class) in [(0.0, "a"), (1.0, "a"), (2.0, "b"), (10.0, "b")] {
        let id = db.insert(RealVector::new(vec![x])).expect("insert");
        db.associate(id, Association::Class(LabelType::Simple.label(class)))
            .expect("associate");
    }
    let labels = vec![LabelType::Simple.label("a"), LabelType::Simple.label("b")];
    let mut classifier = KnnClassifier::new(3).expect("classifier");
    classifier.build_classifier(&db, &labels).expect("build");

    let distribution = classifier
        .class_distribution(&RealVector::new(vec![0.5]))
        .expect("distribution");
    assert_eq!(distribution.neighbors(), 3);
    assert!((distribution.probabilities()[0] - 2.0 / 3.0).abs() < 1e-12);
    assert!((distribution.probabilities()[1] - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn distributions_sum_to_one() {
    let mut rng = StdRng::seed_from_u64(7);
    let classes = ["x", "y", "z"];
    let mut db = InMemoryDatabase::new();
    for _ in 0..30 {
        let vector = RealVector::new(vec![rng.gen::<f64>(), rng.gen::<f64>()]);
        let id = db.insert(vector).expect("insert");
        let class = classes[rng.gen_range(0..classes.len())];
        db.associate(id, Association::Class(LabelType::Simple.label(class)))
            .expect("associate");
    }
    let labels: Vec<_> = classes.iter().map(|c| LabelType::Simple.label(c)).collect();

    for k in [1, 2, 5, 30, 50] {
        let mut classifier = KnnClassifier::new(k).expect("classifier");
        classifier.build_classifier(&db, &labels).expect("build");
        for _ in 0..10 {
            let query = RealVector::new(vec![rng.gen::<f64>(), rng.gen::<f64>()]);
            let distribution = classifier.class_distribution(&query).expect("distribution");
            assert_eq!(distribution.neighbors(), k.min(db.size()));
            assert!((distribution.total() - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn dependency_mode_derives_once_per_label() {
    let mut db = two_unit_clusters();
    let codec = Codec::with_strategies(
        false,
        LabelType::Hierarchical,
        dbscan(1.5, 2),
        ClassifierEvaluation::default(),
        RecordingDerivator::default(),
    )
    .expect("codec");
    let result = codec.run(&mut db).expect("run");

    let visited = codec.derivator().visited.borrow().clone();
    assert_eq!(visited, vec!["cluster.1", "cluster.2"]);

    let clustering = result.as_clustering().expect("clustering result");
    assert_eq!(clustering.models().len(), 2);
    assert!(result.as_evaluation().is_none());
}

#[test]
fn labels_are_visited_in_ascending_order() {
    let mut db = InMemoryDatabase::from_vectors((0..9).map(|i| vec![i as f64, (i * i) as f64]))
        .expect("build database");
    let clustering = FixedClustering {
        clusters: vec![
            ("C", vec![6, 7, 8]),
            ("A", vec![0, 1, 2]),
            ("B", vec![3, 4, 5]),
        ],
    };
    let codec = Codec::with_strategies(
        false,
        LabelType::Simple,
        clustering,
        ClassifierEvaluation::default(),
        RecordingDerivator::default(),
    )
    .expect("codec");
    codec.run(&mut db).expect("run");
    assert_eq!(*codec.derivator().visited.borrow(), vec!["A", "B", "C"]);
}

#[test]
fn hierarchical_labels_order_numerically() {
    let mut db = InMemoryDatabase::from_vectors((0..6).map(|i| vec![i as f64, 1.0]))
        .expect("build database");
    let clustering = FixedClustering {
        clusters: vec![
            ("cluster.10", vec![0, 1]),
            ("cluster.2", vec![2, 3]),
            ("cluster.1", vec![4, 5]),
        ],
    };
    let codec = Codec::with_strategies(
        false,
        LabelType::Hierarchical,
        clustering,
        ClassifierEvaluation::default(),
        RecordingDerivator::default(),
    )
    .expect("codec");
    codec.run(&mut db).expect("run");
    assert_eq!(
        *codec.derivator().visited.borrow(),
        vec!["cluster.1", "cluster.2", "cluster.10"]
    );
}

#[test]
fn classifier_mode_returns_the_evaluation_result() {
    let sentinel = EvaluationResult {
        matrix: ConfusionMatrix::new(vec![LabelType::Simple.label("sentinel")]),
        folds: 99,
        k: 42,
    };
    let mut db = two_unit_clusters();
    let codec = Codec::with_strategies(
        true,
        LabelType::Simple,
        dbscan(1.5, 2),
        SentinelEvaluation {
            result: sentinel.clone(),
            seen: RefCell::new(None),
        },
        DependencyDerivator::default(),
    )
    .expect("codec");
    let result = codec.run(&mut db).expect("run");

    assert_eq!(result.as_evaluation(), Some(&sentinel));
    assert!(result.as_clustering().is_none());
    assert_eq!(*codec.evaluator().seen.borrow(), Some((6, true)));
    // The caller's store only receives associations from the clustering.
    assert!(!db.is_set(AssociationId::Class));
}

#[test]
fn classifier_mode_validates_well_separated_clusters() {
    let config = CodecConfig {
        evaluate_as_classifier: true,
        clustering: ClusteringAlgorithm::Dbscan(dbscan(1.5, 2)),
        evaluation: EvaluationConfig { k: 1, folds: 3 },
        ..CodecConfig::default()
    };
    let codec = Codec::new(config).expect("codec");
    let mut db = two_unit_clusters();
    match codec.run(&mut db).expect("run") {
        CodecResult::Evaluation(evaluation) => {
            assert_eq!(evaluation.folds, 3);
            assert_eq!(evaluation.matrix.total(), 6);
            assert_eq!(evaluation.accuracy(), 1.0);
        }
        CodecResult::Clustering(_) => panic!("expected an evaluation result"),
    }
}

#[test]
fn copac_dependency_models_describe_each_cluster() {
    let mut vectors: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 0.0]).collect();
    for x in 0..5 {
        for y in 0..5 {
            vectors.push(vec![100.0 + x as f64, 100.0 + y as f64]);
        }
    }
    let mut db = InMemoryDatabase::from_vectors(vectors).expect("build database");
    let copac = Copac::new(CopacConfig {
        k: Some(6),
        alpha: 0.85,
        dbscan: DbscanConfig::new(1.5, 3),
    })
    .expect("copac");
    let config = CodecConfig {
        clustering: ClusteringAlgorithm::Copac(copac),
        ..CodecConfig::default()
    };
    let result = Codec::new(config).expect("codec").run(&mut db).expect("run");
    let clustering = result.as_clustering().expect("clustering result");

    let line = clustering
        .model(&LabelType::Hierarchical.label("cluster.1.1"))
        .expect("line model");
    assert_eq!(line.correlation_dimensionality, 1);
    assert_eq!(line.equations.len(), 1);
    assert_eq!(line.equations[0].to_string(), "1.0000*x2 = 0.0000");

    let plane = clustering
        .model(&LabelType::Hierarchical.label("cluster.2.1"))
        .expect("plane model");
    assert_eq!(plane.correlation_dimensionality, 2);
    assert!(plane.equations.is_empty());

    assert!(db.is_set(AssociationId::LocalDimensionality));
    assert!(result.to_string().contains("cluster.1.1 (10 objects)"));
}

#[test]
fn clustering_failures_abort_the_run() {
    let mut db = two_unit_clusters();
    let clustering = FixedClustering {
        clusters: vec![("only", vec![0, 1])],
    };
    let codec = Codec::with_strategies(
        false,
        LabelType::Simple,
        clustering,
        ClassifierEvaluation::default(),
        RecordingDerivator::default(),
    )
    .expect("codec");
    assert!(matches!(
        codec.run(&mut db),
        Err(KddError::Precondition(_))
    ));
    assert!(codec.derivator().visited.borrow().is_empty());
}

#[test]
fn preprocessing_with_k_beyond_store_uses_every_object() {
    let mut exact = two_unit_clusters();
    HiscPreprocessor::new(HiscConfig::new(0.5, Some(6)))
        .expect("config")
        .run(&mut exact)
        .expect("preprocess");
    let expected = preference_strings(&exact);

    for k in [7, 1000, usize::MAX / 2, usize::MAX] {
        let mut db = two_unit_clusters();
        HiscPreprocessor::new(HiscConfig::new(0.5, Some(k)))
            .expect("config")
            .run(&mut db)
            .expect("preprocess");
        assert_eq!(preference_strings(&db), expected, "k = {k}");
    }
}

#[test]
fn classifier_with_k_beyond_store_sees_every_object() {
    let mut db = InMemoryDatabase::new();
    for (x, class) in [(0.0, "a"), (1.0, "a"), (2.0, "b")] {
        let id = db.insert(RealVector::new(vec![x])).expect("insert");
        db.associate(id, Association::Class(LabelType::Simple.label(class)))
            .expect("associate");
    }
    let labels = vec![LabelType::Simple.label("a"), LabelType::Simple.label("b")];
    for k in [4, usize::MAX / 2, usize::MAX] {
        let mut classifier = KnnClassifier::new(k).expect("classifier");
        classifier.build_classifier(&db, &labels).expect("build");
        let distribution = classifier
            .class_distribution(&RealVector::new(vec![5.0]))
            .expect("distribution");
        assert_eq!(distribution.neighbors(), 3);
        assert!((distribution.probabilities()[0] - 2.0 / 3.0).abs() < 1e-12);
    }
}

#[test]
fn failing_query_aborts_preprocessing() {
    let mut db = CountingDatabase::new(two_unit_clusters());
    db.failing_query = Some(3);
    let err = HiscPreprocessor::default().run(&mut db).unwrap_err();
    assert!(matches!(err, KddError::Precondition("store unavailable")));
    assert_eq!(db.queries.get(), 3);
    assert_eq!(db.writes, 2);
    // Objects processed before the failure keep their vectors.
    assert!(db
        .association(AssociationId::PreferenceVector, 1)
        .expect("known id")
        .is_some());
    assert!(db
        .association(AssociationId::PreferenceVector, 2)
        .expect("known id")
        .is_none());
    assert!(!db.is_set(AssociationId::PreferenceVector));
}

#[test]
fn failing_write_aborts_preprocessing() {
    let mut db = CountingDatabase::new(two_unit_clusters());
    db.failing_write = Some(1);
    let err = HiscPreprocessor::default().run(&mut db).unwrap_err();
    assert!(matches!(err, KddError::Precondition("store unavailable")));
    assert_eq!(db.queries.get(), 1);
    assert_eq!(db.writes, 1);
    assert!(db
        .association(AssociationId::PreferenceVector, 0)
        .expect("known id")
        .is_none());
}

#[test]
fn derivator_failure_aborts_the_run() {
    let mut db = two_unit_clusters();
    let codec = Codec::with_strategies(
        false,
        LabelType::Hierarchical,
        FixedClustering {
            clusters: vec![
                ("cluster.1", vec![0, 1]),
                ("cluster.2", vec![2, 3]),
                ("cluster.3", vec![4, 5]),
            ],
        },
        ClassifierEvaluation::default(),
        FailingDerivator {
            calls: Cell::new(0),
            failing_call: 2,
        },
    )
    .expect("codec");
    let err = codec.run(&mut db).unwrap_err();
    assert!(matches!(err, KddError::Precondition("derivation failed")));
    assert_eq!(codec.derivator().calls.get(), 2);
}

#[test]
fn derivator_models_need_not_be_correlation_models() {
    let mut db = two_unit_clusters();
    let codec = Codec::with_strategies(
        false,
        LabelType::Simple,
        dbscan(1.5, 2),
        ClassifierEvaluation::default(),
        FailingDerivator {
            calls: Cell::new(0),
            failing_call: usize::MAX,
        },
    )
    .expect("codec");
    let result = codec.run(&mut db).expect("run");
    let clustering = result.as_clustering().expect("clustering result");
    let sizes: Vec<(&str, usize)> = clustering
        .models()
        .iter()
        .map(|(label, size)| (label.name(), *size))
        .collect();
    assert_eq!(sizes, vec![("cluster.1", 3), ("cluster.2", 3)]);
    assert!(result.to_string().contains("cluster.1 (3 objects)\n  3"));
}

#[test]
fn evaluator_failure_aborts_the_run() {
    let mut db = two_unit_clusters();
    let codec = Codec::with_strategies(
        true,
        LabelType::Simple,
        dbscan(1.5, 2),
        FailingEvaluation,
        DependencyDerivator::default(),
    )
    .expect("codec");
    let err = codec.run(&mut db).unwrap_err();
    assert!(matches!(
        err,
        KddError::MissingAssociation {
            key: AssociationId::Label,
            id: 0
        }
    ));
}
