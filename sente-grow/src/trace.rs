//! Trace import: copy every sufficiently-visited line of another book into
//! this one, without running any evaluation during the walk. Each touched
//! node is refreshed afterwards in one batched parallel pass.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use board_game::board::{Board, BoardMoves, BoardSymmetry};
use board_game::games::go::Move;
use crossbeam::channel;
use internal_iterator::InternalIterator;
use itertools::Itertools;
use log::info;
use rustc_hash::FxHashSet;

use sente_core::book::graph::{replay_chain, ROOT};
use sente_core::book::node::move_rep_with_sym;
use sente_core::book::sym::compose;
use sente_core::book::{Book, BookError, BookHash};
use sente_core::eval::{full_symmetry_evaluation, Evaluator};
use sente_core::go::MoveIndex;
use sente_core::search::BookSearcher;

use crate::config::GrowConfig;
use crate::refresh::search_and_update_node_values;
use crate::shared::{NodeSnapshot, SharedBook, WorkerCtx};

/// Copy all leaves of `trace_book` with at least `min_visits` recursive
/// visits into the shared book, then refresh and repropagate. Fails without
/// touching the save path if interrupted partway.
pub fn trace_from_book<S, F>(
    shared: &SharedBook,
    trace_book: &Book,
    min_visits: f64,
    config: &GrowConfig,
    evaluator: Arc<dyn Evaluator>,
    stop: Arc<AtomicBool>,
    make_searcher: F,
) -> Result<(), BookError>
where
    S: BookSearcher + Send,
    F: Fn(u64) -> S + Sync,
{
    {
        let book = shared.lock();
        if trace_book.initial_board() != book.initial_board() {
            return Err(BookError::Format(
                "trace book does not start from the same position".to_string(),
            ));
        }
    }

    let book_version = shared.lock().book_version;
    let leaves = trace_book.all_leaves(min_visits);
    let leaves_len = leaves.len();
    info!("Tracing {} variations from source book", leaves_len);

    let to_update = Mutex::new(FxHashSet::default());
    let variations_added = AtomicI64::new(0);

    {
        let (sender, receiver) = channel::unbounded();
        for &leaf in &leaves {
            sender.send(leaf).expect("Queue cannot be closed yet");
        }
        drop(sender);

        crossbeam::scope(|s| {
            for worker in 0..config.run.num_game_threads {
                let receiver = receiver.clone();
                let stop = stop.clone();
                let evaluator = evaluator.clone();
                let to_update = &to_update;
                let variations_added = &variations_added;

                s.builder()
                    .name(format!("tracer-{}", worker))
                    .spawn(move |_| loop {
                        if stop.load(Ordering::Acquire) {
                            return;
                        }
                        let leaf = match receiver.try_recv() {
                            Ok(leaf) => leaf,
                            Err(_) => return,
                        };

                        let chain = trace_book.move_chain(leaf);
                        let recon = match replay_chain(
                            trace_book.initial_board(),
                            trace_book.book_version,
                            &chain,
                            trace_book.node(leaf).hash,
                        ) {
                            Ok(recon) => recon,
                            Err(err) => {
                                log::warn!("Skipping unreplayable trace variation: {}", err);
                                continue;
                            }
                        };

                        add_variation_without_update(shared, evaluator.as_ref(), book_version, &recon.moves, to_update);

                        let added = variations_added.fetch_add(1, Ordering::Relaxed) + 1;
                        if added % 400 == 0 {
                            info!("Tracing book, currentVariationsAdded {}/{}", added, leaves_len);
                        }
                    })
                    .unwrap();
            }
        })
        .unwrap();

        info!(
            "Tracing book, currentVariationsAdded {}/{}",
            variations_added.load(Ordering::Relaxed),
            leaves_len
        );
    }

    // batched refresh of everything the walks touched
    {
        let mut hashes: Vec<BookHash> = to_update.into_inner().unwrap().into_iter().collect();
        hashes.sort();
        let total = hashes.len();
        let updated = AtomicI64::new(0);

        let (sender, receiver) = channel::unbounded();
        for hash in hashes {
            sender.send(hash).expect("Queue cannot be closed yet");
        }
        drop(sender);

        crossbeam::scope(|s| {
            for worker in 0..config.run.num_game_threads {
                let receiver = receiver.clone();
                let stop = stop.clone();
                let evaluator = evaluator.clone();
                let updated = &updated;
                let make_searcher = &make_searcher;
                let seed = config.run.seed.wrapping_add(worker as u64);

                s.builder()
                    .name(format!("trace-refresh-{}", worker))
                    .spawn(move |_| {
                        let mut ctx = WorkerCtx {
                            shared,
                            searcher: make_searcher(seed),
                            evaluator,
                            config,
                            search_settings: config.search_settings(),
                            book_version,
                            stop: stop.clone(),
                        };
                        loop {
                            if stop.load(Ordering::Acquire) {
                                return;
                            }
                            let hash = match receiver.try_recv() {
                                Ok(hash) => hash,
                                Err(_) => return,
                            };
                            search_and_update_node_values(&mut ctx, hash);

                            let done = updated.fetch_add(1, Ordering::Relaxed) + 1;
                            if done % 100 == 0 {
                                info!("Updating book, currentHashesUpdated {}/{}", done, total);
                            }
                        }
                    })
                    .unwrap();
            }
        })
        .unwrap();
    }

    if stop.load(Ordering::Acquire) {
        return Err(BookError::Cancelled);
    }

    info!("Recomputing recursive values for entire book");
    shared.lock().recompute_everything();
    Ok(())
}

/// Walk one variation through the shared book in add-only mode: follow
/// existing edges, add the target move plus any noticeably higher-policy
/// sibling at the first unexpanded node, set no values.
fn add_variation_without_update(
    shared: &SharedBook,
    evaluator: &dyn Evaluator,
    book_version: u32,
    moves: &[Move],
    to_update: &Mutex<FxHashSet<BookHash>>,
) {
    let initial = shared.lock().initial_board().clone();
    let mut real_board = initial.clone();
    let mut v = Book::canonicalize(&initial, book_version).align;
    let mut node_id = ROOT;

    for &real_mv in moves {
        if real_board.is_done() {
            let mut book = shared.lock();
            let hash = book.node(node_id).hash;
            info!("Skipping trace variation at this book hash {} since game over", hash);
            book.node_mut(node_id).can_expand = false;
            break;
        }

        if !real_board.is_available_move(real_mv).unwrap_or(false) {
            let hash = shared.lock().node(node_id).hash;
            info!("Skipping trace variation at this book hash {} since illegal", hash);
            break;
        }

        let mv_canon = real_board.map_move(v, real_mv);

        let (snapshot, in_book, can_expand) = {
            let book = shared.lock();
            let node = book.node(node_id);
            (
                NodeSnapshot {
                    id: node_id,
                    hash: node.hash,
                    board: node.board.clone(),
                    symmetries: node.symmetries.clone(),
                },
                node.is_move_in_book(mv_canon),
                node.can_expand,
            )
        };

        if !in_book {
            // following existing moves past a nonexpandable node is fine,
            // adding new ones is not
            if !can_expand {
                info!(
                    "Skipping trace variation at this book hash {} since nonexpandable",
                    snapshot.hash
                );
                break;
            }

            // expensive symmetry/net work happens unlocked
            let fs_eval = full_symmetry_evaluation(evaluator, &snapshot.board);
            let index = MoveIndex::new(snapshot.board.size());
            let (target_rep, _) = move_rep_with_sym(&snapshot.board, &snapshot.symmetries, mv_canon);
            let target_policy = fs_eval.policy[index.move_to_index(target_rep)];

            // expand every sibling with a noticeably higher raw policy, so a
            // rules mismatch between the books cannot hide an obvious move
            let mut extras: Vec<(Move, f32)> = vec![];
            snapshot.board.available_moves().unwrap().for_each(|mv: Move| {
                let (rep, _) = move_rep_with_sym(&snapshot.board, &snapshot.symmetries, mv);
                if rep == target_rep || extras.iter().any(|&(existing, _)| existing == rep) {
                    return;
                }
                let p = fs_eval.policy[index.move_to_index(rep)];
                if p > 0.0 && p > 1.5 * target_policy + 0.05 {
                    extras.push((rep, p));
                }
            });
            let extras = extras
                .into_iter()
                .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                .collect_vec();

            let mut additions = vec![(target_rep, target_policy)];
            additions.extend(extras);

            let canons: Vec<_> = additions
                .iter()
                .filter_map(|&(rep, policy)| {
                    let mut child_board = snapshot.board.clone();
                    child_board.play(rep).ok()?;
                    Some((rep, policy, Book::canonicalize(&child_board, book_version)))
                })
                .collect();

            let mut book = shared.lock();
            to_update.lock().unwrap().insert(snapshot.hash);
            for (rep, policy, canon) in &canons {
                // possibly another thread added it meanwhile, adds are idempotent
                let outcome = book.play_and_add_move(node_id, *rep, *policy as f64, canon);
                if !outcome.edge_existed && !outcome.is_transposition {
                    to_update.lock().unwrap().insert(canon.hash);
                }
            }
        }

        // follow the edge
        let followed = {
            let book = shared.lock();
            let node = book.node(node_id);
            let (_, rep_sym) = node.canonical_move_rep_with_sym(mv_canon);
            node.edge_for(mv_canon).map(|edge| (edge.child, edge.symmetry, rep_sym))
        };
        match followed {
            Some((child, edge_symmetry, rep_sym)) => {
                node_id = child;
                v = compose(compose(v, rep_sym), edge_symmetry);
            }
            None => break,
        }

        real_board
            .play(real_mv)
            .expect("Move was just checked to be available");
    }
}
