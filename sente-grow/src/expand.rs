//! The expander: one worker takes one selected node, runs a bounded search
//! on it with the already-booked moves forbidden, and splices the search's
//! discoveries back into the graph.

use std::sync::atomic::Ordering;

use board_game::board::{Board, BoardMoves, BoardSymmetry};
use board_game::symmetry::{D4Symmetry, Symmetry};
use internal_iterator::InternalIterator;
use log::{info, warn};
use rustc_hash::FxHashSet;

use sente_core::book::graph::replay_chain;
use sente_core::book::node::move_rep_with_sym;
use sente_core::book::sym::compose;
use sente_core::book::{Book, BookHash};
use sente_core::eval::full_symmetry_evaluation;
use sente_core::go::{final_score_diff, format_move, MoveIndex};
use sente_core::search::{BookSearcher, SearchRequest, SearchTree};

use crate::refresh::{search_and_update_node_values, set_node_values_from_search, set_node_values_terminal};
use crate::shared::{NodeSnapshot, WorkerCtx};

#[derive(Debug)]
pub struct FoundMoves {
    /// Flat move-index mask of moves to forbid at the search root.
    pub avoid: Vec<bool>,
    /// At least one legal move remains outside the avoid set.
    pub has_new: bool,
    pub is_re_expansion: bool,
}

/// Collect the moves already in the book at `id`. Call with the lock held.
/// In re-expansion mode the avoid set stays empty so everything is
/// re-searched freshly.
pub fn find_new_moves(book: &Book, id: usize, allow_re_expansion: bool) -> FoundMoves {
    let node = book.node(id);
    let index = MoveIndex::new(node.board.size());

    let is_re_expansion = allow_re_expansion
        && node.can_re_expand
        && node.recursive.visits < book.params.max_visits_for_re_expansion;

    let mut avoid = vec![false; index.policy_len()];
    let mut has_new = false;

    if !node.board.is_done() {
        node.board.available_moves().unwrap().for_each(|mv| {
            if !is_re_expansion && node.is_move_in_book(mv) {
                avoid[index.move_to_index(mv)] = true;
            } else {
                has_new = true;
            }
        });
    }

    FoundMoves {
        avoid,
        has_new,
        is_re_expansion,
    }
}

/// Exploration compensation: when the avoid set removes most of the policy
/// mass, scale cpuct up so the remaining moves still get explored.
pub fn cpuct_scale_for(avoid: &[bool], policy: &[f32], wide_root_noise: f64) -> f64 {
    let p_remain: f64 = policy
        .iter()
        .enumerate()
        .filter(|&(i, _)| !avoid.get(i).copied().unwrap_or(false))
        .map(|(_, &p)| p.max(0.0) as f64)
        .sum();
    let p_remain = p_remain.clamp(1e-5, 1.0);
    1.0 / p_remain.powf(1.0 / (4.0 * wide_root_noise + 1.0))
}

/// Expand one node. Appends every node whose values changed to `changed` for
/// the propagator.
pub fn expand_node<S: BookSearcher>(ctx: &mut WorkerCtx<S>, hash: BookHash, changed: &mut Vec<BookHash>) {
    let (snapshot, chain, initial_board, version, cost) = {
        let book = ctx.shared.lock();
        let id = match book.get_by_hash(hash) {
            Some(id) => id,
            None => return,
        };
        let node = book.node(id);
        (
            NodeSnapshot {
                id,
                hash,
                board: node.board.clone(),
                symmetries: node.symmetries.clone(),
            },
            book.move_chain(id),
            book.initial_board().clone(),
            book.book_version,
            node.recursive.total_expansion_cost,
        )
    };

    // walk the recorded moves and verify the canonical-hash invariant;
    // older book versions are exempt since their hashes cannot be recomputed
    // faithfully after a rules drift
    if version >= 2 {
        let verified = replay_chain(&initial_board, version, &chain, hash).and_then(|recon| {
            let computed = Book::canonicalize(&recon.board, version).hash;
            if computed == hash {
                Ok(())
            } else {
                Err(sente_core::book::BookError::IntegrityFailure { hash, computed })
            }
        });
        if let Err(err) = verified {
            let mut book = ctx.shared.lock();
            warn!("Failed to verify node while trying to expand book: {}", err);
            warn!("Marking node {} as done so we don't try to expand it again, but something is probably wrong.", hash);
            book.node_mut(snapshot.id).can_expand = false;
            return;
        }
    }

    if snapshot.board.is_done() {
        let score = final_score_diff(&snapshot.board);
        let visits = ctx.config.run.max_visits_for_leaves as f64;
        set_node_values_terminal(ctx.shared, snapshot.id, score, visits);
        changed.push(hash);
        return;
    }

    let found = {
        let book = ctx.shared.lock();
        info!("Expanding {} cost {:.3}\n{}", hash, cost, snapshot.board);
        find_new_moves(&book, snapshot.id, true)
    };
    if !found.has_new {
        let mut book = ctx.shared.lock();
        book.node_mut(snapshot.id).can_expand = false;
        return;
    }

    let fs_eval = full_symmetry_evaluation(ctx.evaluator.as_ref(), &snapshot.board);
    let wide_root_noise = ctx.config.wide_root_noise_explore();
    let avoid = if found.is_re_expansion { vec![] } else { found.avoid.clone() };
    let cpuct_scale = cpuct_scale_for(&avoid, &fs_eval.policy, wide_root_noise);

    let tree = ctx.searcher.run(SearchRequest {
        board: &snapshot.board,
        avoid: &avoid,
        symmetries: &snapshot.symmetries,
        max_visits: ctx.search_settings.max_visits,
        cpuct_scale,
        wide_root_noise,
        cpuct_exploration_log: ctx.config.cpuct_exploration_log_explore(),
    });

    // a cancelled search is discarded without splicing
    if ctx.stop.load(Ordering::Acquire) {
        return;
    }

    if ctx.config.run.log_search_info {
        let stats = tree.stats(tree.root());
        info!(
            "Search result at {}: wl {:.3} score {:.1} visits {}",
            hash, stats.win_loss, stats.score_mean, stats.visits
        );
    }

    let mut to_search = FxHashSet::default();
    let mut to_update = FxHashSet::default();
    let mut recursed = FxHashSet::default();
    let anything_added = expand_from_search_result_recursively(
        ctx,
        &tree,
        tree.root(),
        &snapshot,
        D4Symmetry::default(),
        ctx.config.run.max_depth_to_record,
        &mut to_search,
        &mut to_update,
        &mut recursed,
    );

    // a re-expansion adds no edges when everything was already booked, but
    // its summary must still be refreshed
    if found.is_re_expansion {
        to_search.insert(hash);
    }

    // refresh every node whose avoid set changed, in deterministic order
    let mut to_search: Vec<BookHash> = to_search.into_iter().collect();
    to_search.sort();
    for refresh_hash in to_search {
        search_and_update_node_values(ctx, refresh_hash);
    }

    changed.extend(to_update);
    changed.push(hash);

    {
        let mut book = ctx.shared.lock();
        // only nodes that were never a primary target stay re-expandable
        book.node_mut(snapshot.id).can_re_expand = false;

        if !anything_added && !found.is_re_expansion {
            warn!(
                "Could not expand {} since search obtained no new moves, despite earlier checks about legal moves existing not yet in book",
                hash
            );
            warn!("Marking node as done so we don't try to expand it again, but something is probably wrong.");
            book.node_mut(snapshot.id).can_expand = false;
        }
    }
}

/// Splice a finished search into the book, recursing into subtrees that were
/// searched deeply enough. Returns whether any child was added directly to
/// `snapshot`'s node (recursive additions don't count).
#[allow(clippy::too_many_arguments)]
fn expand_from_search_result_recursively<S: BookSearcher>(
    ctx: &mut WorkerCtx<S>,
    tree: &S::Tree,
    tree_node: usize,
    snapshot: &NodeSnapshot,
    view: D4Symmetry,
    depth_left: u32,
    to_search: &mut FxHashSet<BookHash>,
    to_update: &mut FxHashSet<BookHash>,
    recursed: &mut FxHashSet<usize>,
) -> bool {
    if depth_left == 0 {
        return false;
    }
    // quit out immediately when the search transposed back into a node we
    // already handled
    if !recursed.insert(tree_node) {
        return false;
    }

    let children = tree.children(tree_node);
    if children.is_empty() {
        return false;
    }
    let best_move = match tree.best_move(tree_node) {
        Some(mv) => mv,
        None => return false,
    };

    // full-symmetry policy in this node's canonical frame; the recorded raw
    // policy is the best move's, for every child added here
    let fs_eval = full_symmetry_evaluation(ctx.evaluator.as_ref(), &snapshot.board);
    let index = MoveIndex::new(snapshot.board.size());
    let best_in_frame = snapshot.board.map_move(view, best_move);
    let raw_policy = fs_eval.policy[index.move_to_index(best_in_frame)] as f64;

    let min_visits = ctx.config.run.min_tree_visits_to_record;
    let mut anything_added = false;
    let mut any_recursion = false;

    for (tree_mv, tree_child) in children {
        let child_visits = tree.visits(tree_child);
        if !(tree_mv == best_move || child_visits >= min_visits) {
            continue;
        }

        let mv_in_frame = snapshot.board.map_move(view, tree_mv);
        // snapshot data is immutable, so the representative needs no lock
        let (rep, rep_sym) = move_rep_with_sym(&snapshot.board, &snapshot.symmetries, mv_in_frame);

        // follow an existing edge if there is one
        let existing = {
            let book = ctx.shared.lock();
            book.node(snapshot.id).edge_for(rep).map(|edge| {
                let child = book.node(edge.child);
                let overwrite = child.children.is_empty() && child.recursive.visits < child_visits as f64;
                (
                    NodeSnapshot {
                        id: edge.child,
                        hash: child.hash,
                        board: child.board.clone(),
                        symmetries: child.symmetries.clone(),
                    },
                    edge.symmetry,
                    overwrite,
                )
            })
        };

        let (child_snapshot, child_view, overwrite_values) = match existing {
            Some((child_snapshot, edge_symmetry, overwrite)) => {
                let child_view = compose(compose(view, rep_sym), edge_symmetry);
                (child_snapshot, child_view, overwrite)
            }
            None => {
                // canonicalize outside the lock, then add
                let mut child_board = snapshot.board.clone();
                if child_board.play(rep).is_err() {
                    let mut book = ctx.shared.lock();
                    warn!(
                        "Illegal move {} at node {}",
                        format_move(rep, snapshot.board.size()),
                        snapshot.hash
                    );
                    warn!("Marking node as done so we don't try to expand it again, but something is probably wrong.");
                    book.node_mut(snapshot.id).can_expand = false;
                    continue;
                }
                let canon = Book::canonicalize(&child_board, ctx.book_version);

                let (outcome, child_snapshot, overwrite) = {
                    let mut book = ctx.shared.lock();
                    let outcome = book.play_and_add_move(snapshot.id, rep, raw_policy, &canon);
                    let child = book.node(outcome.child);
                    let overwrite = !outcome.is_transposition
                        || (child.children.is_empty() && child.recursive.visits < child_visits as f64);
                    let child_snapshot = NodeSnapshot {
                        id: outcome.child,
                        hash: child.hash,
                        board: child.board.clone(),
                        symmetries: child.symmetries.clone(),
                    };
                    (outcome, child_snapshot, overwrite)
                };

                if !outcome.edge_existed {
                    to_update.insert(child_snapshot.hash);
                    info!(
                        "Adding {} -> {} move {}",
                        snapshot.hash,
                        child_snapshot.hash,
                        format_move(rep, snapshot.board.size())
                    );
                    anything_added = true;
                }

                let child_view = compose(compose(view, rep_sym), canon.align);
                (child_snapshot, child_view, overwrite)
            }
        };

        if overwrite_values {
            set_node_values_from_search(
                ctx.shared,
                ctx.evaluator.as_ref(),
                child_snapshot.id,
                tree,
                tree_child,
                &child_snapshot.board,
                &[],
            );
        }

        if child_visits >= min_visits {
            any_recursion = true;
            expand_from_search_result_recursively(
                ctx,
                tree,
                tree_child,
                &child_snapshot,
                child_view,
                depth_left - 1,
                to_search,
                to_update,
                recursed,
            );
        }
    }

    if anything_added || any_recursion {
        to_update.insert(snapshot.hash);
    }
    if anything_added {
        to_search.insert(snapshot.hash);
    }

    anything_added
}
