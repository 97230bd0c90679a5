use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Annotation, AnnotationError, AnnotationId, AnnotationSet, FeatureMap};

const DOC_LEN: usize = 200;

fn ids(annotations: Vec<&Annotation>) -> Vec<AnnotationId> {
    annotations.into_iter().map(Annotation::id).collect()
}

/// Brute-force reference: the set's annotations in document order, filtered.
fn brute(set: &AnnotationSet, keep: impl Fn(&Annotation) -> bool) -> Vec<AnnotationId> {
    set.iter().filter(|a| keep(*a)).map(Annotation::id).collect()
}

/// Independent document order: by start, then by insertion.
fn reference_order(inserted: &[(AnnotationId, usize, usize)]) -> Vec<AnnotationId> {
    let mut order: Vec<_> = inserted.to_vec();
    order.sort_by_key(|&(_, start, _)| start);
    order.into_iter().map(|(id, _, _)| id).collect()
}

fn random_set(rng: &mut StdRng, count: usize) -> AnnotationSet {
    let mut set = AnnotationSet::new("", DOC_LEN);
    for _ in 0..count {
        let start = rng.gen_range(0..=DOC_LEN);
        let end = rng.gen_range(start..=DOC_LEN.min(start + 40));
        let annotation_type = ["Token", "Sentence", "Entity"][rng.gen_range(0..3)];
        set.add(start, end, annotation_type, FeatureMap::new()).unwrap();
    }
    set
}

#[test]
fn test_iteration_is_document_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut set = AnnotationSet::new("", DOC_LEN);
    let mut inserted = Vec::new();
    for _ in 0..500 {
        let start = rng.gen_range(0..DOC_LEN);
        let end = rng.gen_range(start..=DOC_LEN);
        let id = set.add(start, end, "T", FeatureMap::new()).unwrap();
        inserted.push((id, start, end));
    }

    let iterated: Vec<_> = set.iter().map(Annotation::id).collect();
    assert_eq!(iterated, reference_order(&inserted));
    assert_eq!(set.len(), 500);
    set.assert_invariants();
}

#[test]
fn test_queries_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let set = random_set(&mut rng, 400);
    set.assert_invariants();

    for _ in 0..300 {
        let left = rng.gen_range(0..=DOC_LEN);
        let right = rng.gen_range(left..=DOC_LEN);

        assert_eq!(
            ids(set.overlapping(left, right)),
            brute(&set, |a| a.start() < right && a.end() > left),
            "overlapping({}, {})",
            left,
            right
        );
        assert_eq!(
            ids(set.within(left, right)),
            brute(&set, |a| left <= a.start() && a.end() <= right),
            "within({}, {})",
            left,
            right
        );
        assert_eq!(
            ids(set.covering(left, right)),
            brute(&set, |a| a.start() <= left && a.end() >= right),
            "covering({}, {})",
            left,
            right
        );
        assert_eq!(ids(set.before(left)), brute(&set, |a| a.start() < left));
        assert_eq!(ids(set.after(left)), brute(&set, |a| a.start() >= left));
        assert_eq!(ids(set.at(left)), brute(&set, |a| a.start() == left));
        assert_eq!(ids(set.ending_at(right)), brute(&set, |a| a.end() == right));

        let next_start = set.iter().map(Annotation::start).find(|&s| s >= left);
        assert_eq!(
            ids(set.first_after(left)),
            brute(&set, |a| Some(a.start()) == next_start)
        );
    }
}

#[test]
fn test_queries_survive_random_removals() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut set = random_set(&mut rng, 600);

    for round in 0..400 {
        if round % 3 == 0 {
            let start = rng.gen_range(0..DOC_LEN);
            let end = rng.gen_range(start..=DOC_LEN);
            set.add(start, end, "Late", FeatureMap::new()).unwrap();
        } else {
            let live: Vec<_> = set.iter().map(Annotation::id).collect();
            let victim = live[rng.gen_range(0..live.len())];
            set.remove(victim).unwrap();
        }

        let left = rng.gen_range(0..=DOC_LEN);
        let right = rng.gen_range(left..=DOC_LEN);
        assert_eq!(
            ids(set.overlapping(left, right)),
            brute(&set, |a| a.start() < right && a.end() > left)
        );
        assert_eq!(
            ids(set.by_type("Late")),
            brute(&set, |a| a.annotation_type() == "Late")
        );
    }
    set.assert_invariants();
}

#[test]
fn test_trees_stay_logarithmic_under_skewed_workloads() {
    let mut set = AnnotationSet::new("", 10_000);
    for start in 0..4096 {
        set.add(start, start + 1, "T", FeatureMap::new()).unwrap();
    }
    let (by_start, by_end) = set.tree_heights();
    // 1.44 * log2(4096) rounded up
    assert!(by_start <= 18, "start tree height {}", by_start);
    assert!(by_end <= 18, "end tree height {}", by_end);

    for id in 1..=3000 {
        set.remove(id).unwrap();
    }
    let (by_start, by_end) = set.tree_heights();
    assert!(by_start <= 15, "start tree height {}", by_start);
    assert!(by_end <= 15, "end tree height {}", by_end);
    set.assert_invariants();
}

#[test]
fn test_narrow_range_queries_visit_few_nodes() {
    const COUNT: usize = 4096;
    let mut set = AnnotationSet::new("", COUNT * 2);
    for i in 0..COUNT {
        set.add(i * 2, i * 2 + 1, "T", FeatureMap::new()).unwrap();
    }
    let log_n = (COUNT as f64).log2() as usize;
    // a full scan would enter all 4096 nodes
    let budget = |matches: usize| 8 * log_n + 2 * matches;

    for left in [0, 1001, 4000, 8185] {
        let right = left + 6;

        let found = set.overlapping(left, right).len();
        let (visited, _) = set.last_query_visits();
        assert!(found > 0);
        assert!(visited <= budget(found), "overlapping visited {} for {} matches", visited, found);

        let found = set.within(left, right).len();
        let (visited, _) = set.last_query_visits();
        assert!(visited <= budget(found), "within visited {} for {} matches", visited, found);

        let found = set.covering(left + 1, left + 1).len();
        let (_, visited) = set.last_query_visits();
        assert!(visited <= budget(found), "covering visited {} for {} matches", visited, found);
    }
}

#[test]
fn test_overlapping_finds_enclosing_spans() {
    let mut set = AnnotationSet::new("", 100);
    let outer = set.add(0, 100, "Outer", FeatureMap::new()).unwrap();
    set.add(10, 20, "Left", FeatureMap::new()).unwrap();
    set.add(80, 90, "Right", FeatureMap::new()).unwrap();

    assert_eq!(ids(set.overlapping(40, 60)), vec![outer]);
    assert_eq!(ids(set.covering(40, 60)), vec![outer]);
    assert!(set.within(40, 60).is_empty());
}

#[test]
fn test_within_and_covering_are_independent() {
    let mut set = AnnotationSet::new("", 20);
    let inner = set.add(5, 8, "Inner", FeatureMap::new()).unwrap();
    let outer = set.add(2, 15, "Outer", FeatureMap::new()).unwrap();

    assert_eq!(ids(set.within(4, 10)), vec![inner]);
    assert_eq!(ids(set.covering(4, 10)), vec![outer]);
}

#[test]
fn test_insert_then_remove_restores_order() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut set = random_set(&mut rng, 100);
    let before: Vec<_> = set.iter().map(Annotation::id).collect();

    let id = set.add(50, 60, "Extra", FeatureMap::new()).unwrap();
    set.remove(id).unwrap();

    let after: Vec<_> = set.iter().map(Annotation::id).collect();
    assert_eq!(before, after);
    set.assert_invariants();
}

#[test]
fn test_co_located_annotations_keep_insertion_order() {
    let mut set = AnnotationSet::new("", 10);
    let a = set.add(3, 9, "A", FeatureMap::new()).unwrap();
    let b = set.add(3, 4, "B", FeatureMap::new()).unwrap();
    let c = set.add(3, 9, "C", FeatureMap::new()).unwrap();

    assert_eq!(ids(set.at(3)), vec![a, b, c]);
    assert_eq!(ids(set.ending_at(9)), vec![a, c]);
    set.remove(b).unwrap();
    assert_eq!(ids(set.at(3)), vec![a, c]);
    assert_eq!(set.first().map(Annotation::id), Some(a));
    assert_eq!(set.last().map(Annotation::id), Some(c));
}

#[test]
fn test_removing_absent_annotation_is_not_found() {
    let mut set = AnnotationSet::new("tokens", 10);
    let id = set.add(0, 1, "T", FeatureMap::new()).unwrap();
    set.remove(id).unwrap();

    assert_eq!(
        set.remove(id),
        Err(AnnotationError::NotFound {
            set: "tokens".to_string(),
            id
        })
    );
    assert!(matches!(set.by_id(12), Err(AnnotationError::NotFound { id: 12, .. })));
}

#[test]
fn test_inverted_span_is_rejected_without_mutation() {
    let mut set = AnnotationSet::new("", 100);
    set.add(0, 10, "T", FeatureMap::new()).unwrap();

    let err = set.add(5, 3, "T", FeatureMap::new()).unwrap_err();
    assert!(matches!(err, AnnotationError::InvalidOffset { .. }));
    assert!(set.add(90, 101, "T", FeatureMap::new()).is_err());
    assert!(set.add_with_id(40, 101, 101, "T", FeatureMap::new()).is_err());

    assert_eq!(set.len(), 1);
    assert!(!set.contains(40));
    set.assert_invariants();
}

#[test]
fn test_huge_offsets_are_out_of_bounds() {
    let mut set = AnnotationSet::new("", 10);

    for (start, end) in [(usize::MAX, usize::MAX), (3, usize::MAX)] {
        match set.add(start, end, "T", FeatureMap::new()) {
            Err(AnnotationError::InvalidOffset { reason, len, .. }) => {
                assert_eq!(reason, "offset is past any document end");
                assert_eq!(len, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(set.is_empty());
}

#[test]
fn test_ids_are_max_plus_one() {
    let mut set = AnnotationSet::new("", 10);
    assert_eq!(set.add(0, 1, "T", FeatureMap::new()), Ok(1));
    assert_eq!(set.add_with_id(10, 0, 1, "T", FeatureMap::new()), Ok(Some(10)));
    assert_eq!(set.add(0, 1, "T", FeatureMap::new()), Ok(11));

    set.remove(11).unwrap();
    set.remove(10).unwrap();
    assert_eq!(set.next_id(), 2);
}

#[test]
fn test_duplicate_id_is_absent_result() {
    let mut set = AnnotationSet::new("", 10);
    set.add_with_id(3, 0, 4, "First", FeatureMap::new()).unwrap();

    assert_eq!(set.add_with_id(3, 5, 6, "Second", FeatureMap::new()), Ok(None));
    assert_eq!(set.len(), 1);
    assert_eq!(set.by_id(3).unwrap().annotation_type(), "First");
}

#[test]
fn test_type_index_is_maintained_after_first_build() {
    let mut set = AnnotationSet::new("", 50);
    let late = set.add(30, 35, "Token", FeatureMap::new()).unwrap();
    set.add(0, 50, "Sentence", FeatureMap::new()).unwrap();
    assert_eq!(ids(set.by_type("Token")), vec![late]);

    let early = set.add(2, 4, "Token", FeatureMap::new()).unwrap();
    let same_start = set.add(30, 31, "Token", FeatureMap::new()).unwrap();
    assert_eq!(ids(set.by_type("Token")), vec![early, late, same_start]);

    set.remove(late).unwrap();
    assert_eq!(ids(set.by_type("Token")), vec![early, same_start]);
    assert!(set.by_type("Missing").is_empty());
    assert_eq!(set.types().into_iter().collect::<Vec<_>>(), vec!["Sentence", "Token"]);
}

#[test]
fn test_set_algebra_leaves_operands_untouched() {
    let mut left = AnnotationSet::new("", 20);
    let mut right = AnnotationSet::new("", 20);
    for (id, start) in [(1, 0), (2, 4), (3, 8)] {
        left.add_with_id(id, start, start + 2, "L", FeatureMap::new()).unwrap();
    }
    for (id, start) in [(3, 8), (4, 1), (5, 12)] {
        right.add_with_id(id, start, start + 2, "R", FeatureMap::new()).unwrap();
    }

    let all_ids = |set: &AnnotationSet| set.iter().map(Annotation::id).collect::<Vec<_>>();

    let union = left.union(&right);
    assert_eq!(all_ids(&union), vec![1, 4, 2, 3, 5]);
    // shared ids resolve to the left operand
    assert_eq!(union.by_id(3).unwrap().annotation_type(), "L");

    assert_eq!(all_ids(&left.intersection(&right)), vec![3]);
    assert_eq!(all_ids(&left.difference(&right)), vec![1, 2]);
    assert_eq!(all_ids(&left.symmetric_difference(&right)), vec![1, 4, 2, 5]);
    assert_eq!(all_ids(&left.restrict([3, 1, 99])), vec![1, 3]);

    assert_eq!(all_ids(&left), vec![1, 2, 3]);
    assert_eq!(all_ids(&right), vec![4, 3, 5]);

    // detached sets are queryable stores in their own right
    let union = left.union(&right);
    assert_eq!(ids(union.overlapping(0, 3)), vec![1, 4]);
    union.assert_invariants();
}
