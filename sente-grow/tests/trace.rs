//! Trace import: every sufficiently-visited leaf of a source book must be
//! reachable in the destination book after the copy.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sente_core::book::{Book, LATEST_BOOK_VERSION};
use sente_core::eval::UniformEvaluator;
use sente_grow::driver::{grow_book, GrowOptions};
use sente_grow::shared::SharedBook;
use sente_grow::trace::trace_from_book;

mod common;
use common::{make_searcher_factory, test_config};

#[test]
fn traced_leaves_are_reachable_in_the_new_book() {
    let dir = std::env::temp_dir().join(format!("sente-trace-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = test_config(9, 1, 2);

    // grow a small source book
    let source = {
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
            book_file: dir.join("source.sente"),
            num_iterations: 3,
            save_every: 10,
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
        let mut source = shared.into_inner();
        source.recompute_everything();
        source
    };
    assert!(source.size() > 1);

    // trace it into a fresh book
    let target = {
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
        trace_from_book(
            &shared,
            &source,
            0.0,
            &config,
            Arc::new(UniformEvaluator),
            stop.clone(),
            make_searcher_factory(&config, stop.clone()),
        )
        .unwrap();
        shared.into_inner()
    };

    // canonical hashing is shared, so a successfully traced variation ends
    // on a node with the same hash in both books
    for leaf in source.all_leaves(0.0) {
        let hash = source.node(leaf).hash;
        assert!(
            target.get_by_hash(hash).is_some(),
            "leaf {} was not traced into the new book",
            hash
        );
    }

    assert!(target.integrity_check().is_empty());

    std::fs::remove_dir_all(&dir).ok();
}
