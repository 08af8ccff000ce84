use super::*;

fn id(n: usize) -> LogEntryId {
    format!("log_{:06}", n)
}

fn unit(dimension: usize, axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    vector[axis] = 1.0;
    vector
}

fn populated() -> FlatIndex {
    let mut index = FlatIndex::new();
    index
        .add(vec![
            (id(1), unit(3, 0)),
            (id(2), unit(3, 1)),
            (id(3), vec![0.6, 0.8, 0.0]),
        ])
        .expect("add");
    index
}

#[test]
fn new_index_is_unbound_and_empty() {
    let index = FlatIndex::new();
    assert_eq!(index.state(), IndexState::Unbound);
    assert!(index.is_empty());
    assert_eq!(index.search(&[1.0, 0.0], 5).expect("search"), Vec::new());
}

#[test]
fn first_add_binds_dimension() {
    let index = populated();
    assert_eq!(index.state(), IndexState::Bound { dimension: 3 });
    assert_eq!(index.len(), 3);
    assert_eq!(index.ids().len() * 3, index.data().len());
    assert_eq!(index.position_of("log_000003"), Some(2));
    assert_eq!(index.vector(1), Some(&[0.0, 1.0, 0.0][..]));
    assert_eq!(index.vector(3), None);
}

#[test]
fn empty_add_leaves_index_unbound() {
    let mut index = FlatIndex::new();
    assert_eq!(index.add(Vec::new()).expect("add"), 0);
    assert_eq!(index.state(), IndexState::Unbound);
}

#[test]
fn wrong_dimension_rejects_whole_batch() {
    let mut index = populated();
    let before = index.clone();

    let err = index
        .add(vec![(id(4), unit(3, 2)), (id(5), vec![1.0, 0.0])])
        .unwrap_err();

    assert!(matches!(
        err,
        IndexError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(index, before);
}

#[test]
fn mixed_dimensions_on_unbound_index_are_rejected() {
    let mut index = FlatIndex::new();
    let err = index
        .add(vec![(id(1), unit(4, 0)), (id(2), unit(3, 0))])
        .unwrap_err();
    assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    assert_eq!(index.state(), IndexState::Unbound);
    assert!(index.is_empty());
}

#[test]
fn empty_and_non_finite_vectors_are_invalid() {
    let mut index = FlatIndex::new();
    assert!(matches!(
        index.add(vec![(id(1), Vec::new())]).unwrap_err(),
        IndexError::InvalidVector(_)
    ));

    let mut index = populated();
    assert!(matches!(
        index
            .add(vec![(id(9), vec![f32::INFINITY, 0.0, 0.0])])
            .unwrap_err(),
        IndexError::InvalidVector(_)
    ));
    assert_eq!(index.len(), 3);
}

#[test]
fn duplicate_ids_are_skipped() {
    let mut index = populated();
    let added = index
        .add(vec![
            (id(2), unit(3, 2)),
            (id(4), unit(3, 2)),
            (id(4), unit(3, 0)),
        ])
        .expect("add");

    assert_eq!(added, 1);
    assert_eq!(index.len(), 4);
    assert_eq!(index.vector(1), Some(&[0.0, 1.0, 0.0][..]));
    assert_eq!(index.vector(3), Some(&[0.0, 0.0, 1.0][..]));
}

#[test]
fn search_orders_by_descending_score() {
    let index = populated();
    let hits = index.search(&[1.0, 0.0, 0.0], 10).expect("search");

    let ids: Vec<&str> = hits.iter().map(|h| h.log_id.as_str()).collect();
    assert_eq!(ids, vec!["log_000001", "log_000003", "log_000002"]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!((hits[1].score - 0.6).abs() < 1e-6);
}

#[test]
fn search_respects_k() {
    let index = populated();
    assert_eq!(index.search(&[0.0, 1.0, 0.0], 1).expect("search").len(), 1);
    assert!(index.search(&[0.0, 1.0, 0.0], 0).expect("search").is_empty());
}

#[test]
fn search_ties_keep_insertion_order() {
    let mut index = FlatIndex::new();
    index
        .add(vec![(id(7), unit(2, 0)), (id(3), unit(2, 0))])
        .expect("add");
    let hits = index.search(&[1.0, 0.0], 2).expect("search");
    assert_eq!(hits[0].log_id, "log_000007");
    assert_eq!(hits[1].log_id, "log_000003");
}

#[test]
fn search_with_wrong_dimension_fails() {
    let index = populated();
    assert!(matches!(
        index.search(&[1.0, 0.0], 3).unwrap_err(),
        IndexError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
}

#[test]
fn remove_compacts_positions() {
    let mut index = populated();
    let removed = index.remove(&[id(1), id(42)]);

    assert_eq!(removed, 1);
    assert_eq!(index.ids(), &[id(2), id(3)]);
    assert_eq!(index.position_of("log_000003"), Some(1));
    assert!(!index.contains("log_000001"));
    assert_eq!(index.vector(1), Some(&[0.6, 0.8, 0.0][..]));
    assert_eq!(index.data().len(), 6);

    index.remove(&[id(2), id(3)]);
    assert!(index.is_empty());
    assert_eq!(index.state(), IndexState::Bound { dimension: 3 });
}

#[test]
fn from_parts_checks_cardinality() {
    let index = populated();

    let rebuilt = FlatIndex::from_parts(
        index.state(),
        index.data().to_vec(),
        index.ids().to_vec(),
    )
    .expect("consistent parts");
    assert_eq!(rebuilt, index);

    let truncated = FlatIndex::from_parts(
        index.state(),
        index.data().to_vec(),
        index.ids()[..2].to_vec(),
    );
    assert!(matches!(truncated.unwrap_err(), IndexError::IndexCorrupt(_)));

    let unbound = FlatIndex::from_parts(IndexState::Unbound, Vec::new(), vec![id(1)]);
    assert!(matches!(unbound.unwrap_err(), IndexError::IndexCorrupt(_)));

    let duplicated = FlatIndex::from_parts(
        IndexState::Bound { dimension: 1 },
        vec![1.0, 1.0],
        vec![id(1), id(1)],
    );
    assert!(matches!(duplicated.unwrap_err(), IndexError::IndexCorrupt(_)));
}

#[test]
fn from_parts_rejects_overflowing_dimension() {
    let oversized = FlatIndex::from_parts(
        IndexState::Bound {
            dimension: usize::MAX / 2 + 1,
        },
        Vec::new(),
        vec![id(1), id(2)],
    );
    assert!(matches!(oversized.unwrap_err(), IndexError::IndexCorrupt(_)));
}

#[test]
fn vector_out_of_range_is_none() {
    let index = populated();
    assert_eq!(index.vector(usize::MAX), None);
    assert_eq!(index.vector(usize::MAX / 3), None);
}
