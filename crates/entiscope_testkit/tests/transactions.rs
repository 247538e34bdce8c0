//! Transaction propagation and retry tests.

use entiscope_core::{CoreError, CoreResult, Propagation};
use entiscope_testkit::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn conflicts_then_success_runs_work_k_plus_one_times() {
    for k in 0..4 {
        let env = TestEnv::new();
        env.store.fail_next_commits(k);
        let runs = Cell::new(0);

        let scope = env.factory.begin();
        scope
            .transact(|txn| {
                runs.set(runs.get() + 1);
                txn.save().entity(&mut Trivial::with_id(1, "a", 1))?.now()?;
                Ok(())
            })
            .unwrap();

        let counts = env.store.counts();
        assert_eq!(runs.get(), k + 1);
        assert_eq!(counts.begins, k + 1);
        assert_eq!(counts.commits, k + 1);
        assert_eq!(counts.rollbacks, k);
        assert_eq!(env.store.inner().open_transactions(), 0);
        assert!(env.store.inner().contains(&Trivial::key(1)));
    }
}

#[test]
fn exhausted_attempts_surface_the_conflict() {
    let env = TestEnv::new();
    env.store.fail_next_commits(10);
    let runs = Cell::new(0);

    let err = env
        .factory
        .begin()
        .transact_new(3, |txn| {
            runs.set(runs.get() + 1);
            txn.save().entity(&mut Trivial::with_id(1, "a", 1))?.now()?;
            Ok(())
        })
        .unwrap_err();

    assert!(err.is_concurrent_modification());
    assert_eq!(runs.get(), 3);
    assert!(!env.store.inner().contains(&Trivial::key(1)));
    assert_eq!(env.store.inner().open_transactions(), 0);
}

#[test]
fn other_failures_are_not_retried() {
    let env = TestEnv::new();
    let runs = Cell::new(0);

    let result: CoreResult<()> = env.factory.begin().transact(|_| {
        runs.set(runs.get() + 1);
        Err(CoreError::work("not a conflict"))
    });

    assert!(matches!(result, Err(CoreError::Work(_))));
    assert_eq!(runs.get(), 1);
    assert_eq!(env.store.counts().rollbacks, 1);
}

#[test]
fn mandatory_without_transaction_does_no_io() {
    let env = TestEnv::new();
    let scope = env.factory.begin();
    let ran = Cell::new(false);

    let result = scope.execute(Propagation::Mandatory, |_| {
        ran.set(true);
        Ok(())
    });

    assert!(matches!(result, Err(CoreError::NoTransaction)));
    assert!(!ran.get());
    assert_eq!(env.store.counts().total(), 0);
}

#[test]
fn never_inside_transaction_fails() {
    let env = TestEnv::new();
    let result = env.factory.begin().transact(|txn| {
        txn.execute(Propagation::Never, |_| Ok(()))
    });
    assert!(matches!(result, Err(CoreError::TransactionPresent)));
}

#[test]
fn commit_listener_fires_once_after_second_attempt() {
    let env = TestEnv::new();
    env.store.fail_next_commits(1);
    let attempt = Rc::new(Cell::new(0));
    let fired: Rc<RefCell<Vec<u32>>> = Rc::default();

    env.factory
        .begin()
        .transact(|txn| {
            attempt.set(attempt.get() + 1);
            let seen_attempt = attempt.get();
            let fired = Rc::clone(&fired);
            txn.transaction()
                .ok_or(CoreError::NoTransaction)?
                .listen_for_commit(move || fired.borrow_mut().push(seen_attempt));
            Ok(())
        })
        .unwrap();

    assert_eq!(*fired.borrow(), vec![2]);
}

#[test]
fn listeners_do_not_fire_on_rollback() {
    let env = TestEnv::new();
    let fired = Rc::new(Cell::new(false));

    let flag = Rc::clone(&fired);
    let result: CoreResult<()> = env.factory.begin().transact(move |txn| {
        let flag = Rc::clone(&flag);
        txn.transaction()
            .ok_or(CoreError::NoTransaction)?
            .listen_for_commit(move || flag.set(true));
        Err(CoreError::work("abort"))
    });

    assert!(result.is_err());
    assert!(!fired.get());
}

#[test]
fn each_attempt_gets_a_fresh_session() {
    let env = TestEnv::new();
    env.seed(&[Trivial::with_id(1, "a", 1)]);
    env.store.fail_next_commits(1);
    let loaded_before: RefCell<Vec<bool>> = RefCell::default();

    env.factory
        .begin()
        .transact(|txn| {
            loaded_before.borrow_mut().push(txn.is_loaded(&Trivial::key(1)));
            let _: Option<Trivial> = txn.load().key(&Trivial::key(1))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(*loaded_before.borrow(), vec![false, false]);
}

#[test]
fn committed_session_merges_into_parent() {
    let env = TestEnv::new();
    env.seed(&[Trivial::with_id(1, "a", 1)]);
    let scope = env.factory.begin();

    scope
        .transact(|txn| txn.load().key::<Trivial>(&Trivial::key(1)).map(|_| ()))
        .unwrap();
    env.store.reset_counts();

    let loaded: Trivial = scope.load().key(&Trivial::key(1)).unwrap().unwrap();
    assert_eq!(loaded.some_string, "a");
    assert_eq!(env.store.counts().gets, 0);
}

#[test]
fn requires_new_suspends_the_outer_transaction() {
    let env = TestEnv::new();
    let result: CoreResult<()> = env.factory.begin().transact(|outer| {
        outer.execute(Propagation::RequiresNew, |inner| {
            inner.save().entity(&mut Trivial::with_id(7, "inner", 7))?.now()?;
            Ok(())
        })?;
        Err(CoreError::work("outer fails"))
    });

    assert!(result.is_err());
    assert!(env.store.inner().contains(&Trivial::key(7)));
}

#[test]
fn transactionless_writes_survive_rollback() {
    let env = TestEnv::new();
    let result: CoreResult<()> = env.factory.begin().transact(|txn| {
        txn.transactionless(|plain| {
            assert!(plain.transaction().is_none());
            plain.save().entity(&mut Trivial::with_id(3, "kept", 3))?.now()?;
            Ok(())
        })?;
        txn.save().entity(&mut Trivial::with_id(4, "lost", 4))?.now()?;
        Err(CoreError::work("abort"))
    });

    assert!(result.is_err());
    assert!(env.store.inner().contains(&Trivial::key(3)));
    assert!(!env.store.inner().contains(&Trivial::key(4)));
}

#[test]
fn entity_group_transactions_with_children() {
    let env = TestEnv::new();
    let parent = Trivial::key(1);
    env.seed(&[Trivial::with_id(1, "parent", 0)]);

    let labels = env
        .factory
        .begin()
        .transact(|txn| {
            let mut child = Child::new(parent.clone(), "first");
            txn.save().entity(&mut child)?.now()?;
            txn.load()
                .kind::<Child>()
                .ancestor(parent.clone())
                .list()
                .map(|children| children.into_iter().map(|c| c.label).collect::<Vec<_>>())
        })
        .unwrap();

    // Transactional puts are not visible to queries until commit.
    assert!(labels.is_empty());
    let children = env
        .factory
        .begin()
        .load()
        .kind::<Child>()
        .ancestor(parent.clone())
        .list()
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].parent.as_ref(), Some(&parent));
}

#[test]
fn transactional_query_requires_ancestor() {
    let env = TestEnv::new();
    let err = env
        .factory
        .begin()
        .transact(|txn| txn.load().kind::<Trivial>().list())
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
}
