//! Value refreshing: short searches restricted to moves *outside* the book,
//! keeping every node's "best move we haven't booked yet" summary fresh.

use board_game::board::Board;
use board_game::games::go::GoBoard;
use log::{info, warn};

use sente_core::book::{Book, BookHash, LeafValues};
use sente_core::eval::{full_symmetry_evaluation, Evaluator};
use sente_core::go::final_score_diff;
use sente_core::search::{BookSearcher, SearchRequest, SearchTree};

use crate::expand::{cpuct_scale_for, find_new_moves};
use crate::shared::{NodeSnapshot, SharedBook, WorkerCtx};

/// No legal move remains outside the book: park a sentinel biased against
/// the side to move and stop expanding here.
pub fn set_node_values_no_moves(shared: &SharedBook, id: usize) {
    let mut book = shared.lock();
    let side = book.node(id).side_to_move();
    let node = book.node_mut(id);
    node.this_values = LeafValues::no_moves(side);
    node.can_expand = false;
}

/// Exact values for a finished game.
pub fn set_node_values_terminal(shared: &SharedBook, id: usize, score_diff: f64, visits: f64) {
    let mut book = shared.lock();
    let node = book.node_mut(id);
    node.this_values = LeafValues::terminal(score_diff, visits);
    node.can_expand = false;
}

/// Write a node's summary from a finished search. The policy recorded is the
/// maximum of the full-symmetry policy over non-avoided moves, so it is
/// independent of the search's own symmetry choices.
pub fn set_node_values_from_search(
    shared: &SharedBook,
    evaluator: &dyn Evaluator,
    id: usize,
    tree: &impl SearchTree,
    tree_node: usize,
    board: &GoBoard,
    avoid: &[bool],
) {
    let stats = tree.stats(tree_node);
    if stats.visits == 0.0 {
        // a cancelled search carries no information
        return;
    }
    let sharp_score = tree.sharp_score(tree_node);

    let fs_eval = full_symmetry_evaluation(evaluator, board);
    let max_policy = fs_eval
        .policy
        .iter()
        .enumerate()
        .filter(|&(i, _)| !avoid.get(i).copied().unwrap_or(false))
        .map(|(_, &p)| p as f64)
        .fold(0.0, f64::max);

    let mut book = shared.lock();
    let cap = book.params.sharp_score_outlier_cap;
    book.node_mut(id).this_values = LeafValues {
        win_loss: stats.win_loss,
        score_mean: stats.score_mean,
        sharp_score_mean: sharp_score
            .max(stats.score_mean - cap)
            .min(stats.score_mean + cap),
        win_loss_error: stats.win_loss_error,
        score_error: stats.score_error,
        score_stdev: stats.score_stdev,
        max_policy,
        weight: stats.weight,
        visits: stats.visits,
    };
}

/// Refresh one node: search only the moves not yet in the book and record
/// the result as the node's not-in-book summary.
pub fn search_and_update_node_values<S: BookSearcher>(ctx: &mut WorkerCtx<S>, hash: BookHash) {
    let snapshot = {
        let book = ctx.shared.lock();
        match book.get_by_hash(hash) {
            Some(id) => Some(ctx_snapshot(&book, id)),
            None => None,
        }
    };
    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => {
            warn!("Refresh requested for unknown hash {}", hash);
            return;
        }
    };

    if snapshot.board.is_done() {
        let score = final_score_diff(&snapshot.board);
        let visits = ctx.config.run.max_visits_for_leaves as f64;
        set_node_values_terminal(ctx.shared, snapshot.id, score, visits);
        return;
    }

    let found = {
        let book = ctx.shared.lock();
        find_new_moves(&book, snapshot.id, false)
    };

    if !found.has_new {
        set_node_values_no_moves(ctx.shared, snapshot.id);
        return;
    }

    let fs_eval = full_symmetry_evaluation(ctx.evaluator.as_ref(), &snapshot.board);
    let cpuct_scale = cpuct_scale_for(&found.avoid, &fs_eval.policy, ctx.search_settings.wide_root_noise);

    let max_visits = ctx.search_settings.max_visits.min(ctx.config.run.max_visits_for_leaves);
    let tree = ctx.searcher.run(SearchRequest {
        board: &snapshot.board,
        avoid: &found.avoid,
        symmetries: &snapshot.symmetries,
        max_visits,
        cpuct_scale,
        wide_root_noise: ctx.search_settings.wide_root_noise,
        cpuct_exploration_log: ctx.search_settings.cpuct_exploration_log,
    });

    if ctx.config.run.log_search_info {
        let stats = tree.stats(tree.root());
        info!(
            "Quick search on remaining moves at {}: wl {:.3} score {:.1} visits {}",
            hash, stats.win_loss, stats.score_mean, stats.visits
        );
    }

    set_node_values_from_search(
        ctx.shared,
        ctx.evaluator.as_ref(),
        snapshot.id,
        &tree,
        tree.root(),
        &snapshot.board,
        &found.avoid,
    );
}

fn ctx_snapshot(book: &Book, id: usize) -> NodeSnapshot {
    let node = book.node(id);
    NodeSnapshot {
        id,
        hash: node.hash,
        board: node.board.clone(),
        symmetries: node.symmetries.clone(),
    }
}
