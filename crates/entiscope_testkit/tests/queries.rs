//! Query strategy tests.

use entiscope_core::Config;
use entiscope_store::Datastore;
use entiscope_testkit::prelude::*;

fn abc(env: &TestEnv) {
    env.seed(&[
        Trivial::with_id(1, "A", 1),
        Trivial::with_id(2, "B", 2),
        Trivial::with_id(3, "C", 3),
    ]);
}

fn names(entities: Vec<Trivial>) -> Vec<String> {
    entities.into_iter().map(|t| t.some_string).collect()
}

#[test]
fn hybrid_query_loads_only_session_misses() {
    let env = TestEnv::new();
    abc(&env);
    let scope = env.factory.begin();
    let _: Option<Trivial> = scope.load().key(&Trivial::key(1)).unwrap();
    env.store.reset_counts();

    let results = scope
        .load()
        .kind::<Trivial>()
        .order("someNumber")
        .list()
        .unwrap();

    assert_eq!(names(results), vec!["A", "B", "C"]);
    let counts = env.store.counts();
    assert_eq!(counts.queries, 1);
    assert_eq!(counts.gets, 1);
    assert_eq!(counts.keys_fetched, 2);
}

#[test]
fn hybrid_query_loads_in_chunks() {
    let env = TestEnv::new();
    env.seed(&random_trivials(7, 11));
    let scope = env.factory.begin();

    let results = scope.load().kind::<Trivial>().chunk(3).list().unwrap();

    assert_eq!(results.len(), 7);
    assert_eq!(env.store.counts().gets, 3);
}

#[test]
fn default_chunk_size_comes_from_config() {
    let env = TestEnv::builder()
        .config(Config::default().default_chunk_size(2))
        .build();
    env.seed(&random_trivials(5, 3));

    let results = env.factory.begin().load().kind::<Trivial>().list().unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(env.store.counts().gets, 3);
}

#[test]
fn session_values_win_over_query_results() {
    for hybrid in [true, false] {
        let env = TestEnv::new();
        abc(&env);
        let scope = env.factory.begin();
        let _: Option<Trivial> = scope.load().key(&Trivial::key(2)).unwrap();

        let metadata = env.factory.registry().metadata::<Trivial>().unwrap();
        let changed = metadata.to_storage(&Trivial::with_id(2, "B2", 2)).unwrap();
        env.store.put(None, vec![changed]).unwrap();

        let results = scope
            .load()
            .kind::<Trivial>()
            .order("someNumber")
            .hybrid(hybrid)
            .list()
            .unwrap();
        assert_eq!(names(results), vec!["A", "B", "C"], "hybrid = {hybrid}");
    }
}

#[test]
fn deleted_entities_are_skipped() {
    for hybrid in [true, false] {
        let env = TestEnv::new();
        abc(&env);
        let scope = env.factory.begin();
        scope.defer().delete().key(&Trivial::key(2)).unwrap();

        let results = scope
            .load()
            .kind::<Trivial>()
            .order("someNumber")
            .hybrid(hybrid)
            .list()
            .unwrap();
        assert_eq!(names(results), vec!["A", "C"], "hybrid = {hybrid}");
        scope.close().unwrap();
        assert!(!env.store.inner().contains(&Trivial::key(2)));
    }
}

#[test]
fn normal_query_fills_session() {
    let env = TestEnv::builder()
        .config(Config::default().hybrid_queries(false))
        .build();
    abc(&env);
    let scope = env.factory.begin();

    let results = scope.load().kind::<Trivial>().list().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(env.store.counts().gets, 0);

    env.store.reset_counts();
    let _: Option<Trivial> = scope.load().key(&Trivial::key(3)).unwrap();
    assert_eq!(env.store.counts().total(), 0);
}

#[test]
fn keys_only_and_count_leave_session_alone() {
    let env = TestEnv::new();
    abc(&env);
    let scope = env.factory.begin();

    let keys = scope
        .load()
        .kind::<Trivial>()
        .filter("someNumber >=", 2)
        .keys()
        .unwrap();
    let count = scope.load().kind::<Trivial>().filter("someNumber >=", 2).count().unwrap();

    assert_eq!(keys, vec![Trivial::key(2), Trivial::key(3)]);
    assert_eq!(count, 2);
    assert!(!scope.is_loaded(&Trivial::key(2)));
    assert_eq!(env.store.counts().gets, 0);
}

#[test]
fn projection_bypasses_session_and_cache() {
    let env = TestEnv::cached();
    abc(&env);
    let scope = env.factory.begin();

    let projected = scope
        .load()
        .kind::<Trivial>()
        .project("someNumber")
        .order("someNumber")
        .list()
        .unwrap();

    assert_eq!(
        projected.iter().map(|t| t.some_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(projected.iter().all(|t| t.some_string.is_empty()));
    assert!(!scope.is_loaded(&Trivial::key(1)));
    assert_eq!(env.cache().calls(), 0);
}

#[test]
fn limit_offset_and_first() {
    let env = TestEnv::new();
    abc(&env);
    let scope = env.factory.begin();

    let page = scope
        .load()
        .kind::<Trivial>()
        .order("-someNumber")
        .offset(1)
        .limit(1)
        .list()
        .unwrap();
    let first = scope
        .load()
        .kind::<Trivial>()
        .order("someString")
        .first()
        .unwrap();

    assert_eq!(names(page), vec!["B"]);
    assert_eq!(first.map(|t| t.some_string).as_deref(), Some("A"));
}

#[test]
fn hybrid_queries_use_the_cache() {
    let env = TestEnv::cached();
    abc(&env);

    let first = env.factory.begin().load().kind::<Trivial>().list().unwrap();
    let second = env.factory.begin().load().kind::<Trivial>().list().unwrap();

    assert_eq!(first, second);
    assert_eq!(env.store.counts().gets, 1);
    assert_eq!(env.store.counts().queries, 2);
}

#[test]
fn lazy_iteration_stops_early() {
    let env = TestEnv::new();
    env.seed(&random_trivials(10, 5));
    let scope = env.factory.begin();

    let taken: Vec<Trivial> = scope
        .load()
        .kind::<Trivial>()
        .chunk(2)
        .iter()
        .unwrap()
        .take(3)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(taken.len(), 3);
    assert_eq!(env.store.counts().gets, 2);
}
