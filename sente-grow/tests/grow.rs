//! End-to-end expansion scenarios with the uniform evaluator stub.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashSet;

use sente_core::book::{Book, BookParams, LATEST_BOOK_VERSION};
use sente_core::eval::UniformEvaluator;
use sente_grow::config::GrowConfig;
use sente_grow::driver::{grow_book, GrowOptions};
use sente_grow::shared::SharedBook;

mod common;
use common::{make_searcher_factory, test_config};

fn grown_book(config: &GrowConfig, iterations: u32, dir: &std::path::Path) -> Book {
    let initial = config.initial_board().unwrap();
    let mut book = Book::new(
        LATEST_BOOK_VERSION,
        initial,
        config.board.rep_bound,
        config.book_params(),
    );
    book.recompute_everything();

    let shared = SharedBook::new(book);
    let stop = Arc::new(AtomicBool::new(false));
    let options = GrowOptions {
        book_file: dir.join("book.sente"),
        num_iterations: iterations,
        save_every: 2,
        config_text: "{}".to_string(),
    };

    grow_book(
        &shared,
        config,
        Arc::new(UniformEvaluator),
        stop.clone(),
        &options,
        make_searcher_factory(config, stop.clone()),
    )
    .unwrap();

    shared.into_inner()
}

fn check_invariants(book: &mut Book) {
    // a value overwrite on a transposed child may not have been propagated
    // yet, so bring every derived aggregate up to date first
    book.recompute_everything();

    assert!(book.integrity_check().is_empty());

    for id in book.node_ids() {
        let node = book.node(id);

        // edge uniqueness under symmetry reduction
        let mut seen = FxHashSet::default();
        for edge in &node.children {
            assert_eq!(node.canonical_move_rep(edge.mv), edge.mv);
            assert!(seen.insert(node.canonical_move_rep(edge.mv)));
        }

        // visits aggregate children plus own summary
        let child_sum: f64 = node
            .children
            .iter()
            .map(|edge| book.node(edge.child).recursive.visits)
            .sum();
        assert_eq!(node.recursive.visits, node.this_values.visits + child_sum);
    }
}

#[test]
fn single_thread_growth() {
    let dir = std::env::temp_dir().join(format!("sente-grow-single-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = test_config(9, 1, 1);
    let mut book = grown_book(&config, 4, &dir);

    // four iterations at one expansion each
    assert!(book.size() >= 5, "book only has {} nodes", book.size());
    assert!(book.node(0).recursive.visits > 0.0);
    check_invariants(&mut book);

    // save / load / save round trip is stable
    let path_a = dir.join("round_a.sente");
    let path_b = dir.join("round_b.sente");
    book.save_to_file(&path_a).unwrap();
    let loaded = Book::load_from_file(&path_a, book.params.sharp_score_outlier_cap).unwrap();
    loaded.save_to_file(&path_b).unwrap();
    assert_eq!(std::fs::read(&path_a).unwrap(), std::fs::read(&path_b).unwrap());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn multi_thread_growth_matches_invariants() {
    let dir = std::env::temp_dir().join(format!("sente-grow-multi-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let single = grown_book(&test_config(9, 1, 1), 4, &dir);
    let mut multi = grown_book(&test_config(9, 4, 1), 4, &dir);

    // the same amount of work happens, though which worker's searcher does
    // it is scheduling-dependent
    assert!(multi.size() >= 5, "book only has {} nodes", multi.size());
    assert!(single.size() >= 5);
    check_invariants(&mut multi);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn reload_with_changed_params() {
    let dir = std::env::temp_dir().join(format!("sente-grow-params-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("book.sente");

    let config = test_config(9, 1, 1);
    let book = grown_book(&config, 2, &dir);
    book.save_to_file(&path).unwrap();

    let mut wanted: BookParams = config.book_params();
    wanted.cost_per_move = 2.5;

    // without permission the load is rejected
    let mut loaded = Book::load_from_file(&path, wanted.sharp_score_outlier_cap).unwrap();
    assert!(loaded.params.reconcile(&wanted, false).is_err());

    // with permission the change is adopted and reported
    let mut loaded = Book::load_from_file(&path, wanted.sharp_score_outlier_cap).unwrap();
    let changes = loaded.params.reconcile(&wanted, true).unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].contains("cost_per_move"));
    assert_eq!(loaded.params.cost_per_move, 2.5);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn bonus_lowers_expansion_cost_by_its_value() {
    let dir = std::env::temp_dir().join(format!("sente-grow-bonus-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = test_config(9, 1, 1);
    let mut book = grown_book(&config, 2, &dir);

    // pick a non-root expandable node
    let target = book
        .node_ids()
        .find(|&id| id != 0 && book.node(id).can_expand)
        .expect("Grown book has an expandable non-root node");
    let hash = book.node(target).hash;

    book.recompute_everything();
    let before = book.node(target).recursive.total_expansion_cost;

    let mut bonus = rustc_hash::FxHashMap::default();
    bonus.insert(hash, 1.0);
    book.set_bonus_by_hash(bonus);
    book.recompute_everything();
    let after = book.node(target).recursive.total_expansion_cost;

    assert!((before - after - 1.0).abs() < 1e-9, "cost went {} -> {}", before, after);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn stop_flag_prevents_expansion_but_still_saves() {
    let dir = std::env::temp_dir().join(format!("sente-grow-stop-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = test_config(9, 1, 1);
    let initial = config.initial_board().unwrap();
    let mut book = Book::new(
        LATEST_BOOK_VERSION,
        initial,
        config.board.rep_bound,
        config.book_params(),
    );
    book.recompute_everything();
    let shared = SharedBook::new(book);

    let stop = Arc::new(AtomicBool::new(false));
    stop.store(true, Ordering::Release);

    let path = dir.join("book.sente");
    let options = GrowOptions {
        book_file: path.clone(),
        num_iterations: 10,
        save_every: 3,
        config_text: "{}".to_string(),
    };
    grow_book(
        &shared,
        &config,
        Arc::new(UniformEvaluator),
        stop.clone(),
        &options,
        make_searcher_factory(&config, stop.clone()),
    )
    .unwrap();

    // nothing expanded, but the final save still happened and loads cleanly
    let book = shared.into_inner();
    assert_eq!(book.size(), 1);
    let loaded = Book::load_from_file(&path, 2.0).unwrap();
    assert_eq!(loaded.size(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
