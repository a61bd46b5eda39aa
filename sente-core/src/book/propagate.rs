//! Recomputation of derived per-node values.
//!
//! Two passes. Bottom-up: recursive value aggregates over the ancestor
//! closure of the dirty set, children first. Top-down: min cost from root,
//! principal-variation markers and total expansion costs over the whole
//! graph (cheap, one relaxation per edge).

use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use board_game::board::Player;

use crate::book::cost;
use crate::book::graph::{Book, ROOT};
use crate::book::hash::BookHash;
use crate::book::values::{pov_sign, RecursiveValues};

pub(crate) fn recompute_everything(book: &mut Book) {
    let closure: FxHashSet<usize> = book.node_ids().collect();
    bottom_up(book, &closure);
    top_down(book);
}

pub(crate) fn recompute(book: &mut Book, dirty: &[BookHash]) {
    let mut closure = FxHashSet::default();
    let mut stack: Vec<usize> = dirty.iter().filter_map(|&h| book.get_by_hash(h)).collect();

    while let Some(id) = stack.pop() {
        if !closure.insert(id) {
            continue;
        }
        for &(parent, _) in &book.node(id).parents {
            stack.push(parent);
        }
    }

    bottom_up(book, &closure);
    top_down(book);
}

/// Process the closure children-first, so every node sees up-to-date child
/// aggregates. Children outside the closure are unchanged by definition.
fn bottom_up(book: &mut Book, closure: &FxHashSet<usize>) {
    // count distinct children inside the closure; two edges to the same
    // child (symmetric moves that transpose) must count once
    let mut deps: FxHashMap<usize, usize> = FxHashMap::default();
    for &id in closure {
        let children: FxHashSet<usize> = book
            .node(id)
            .children
            .iter()
            .map(|edge| edge.child)
            .filter(|&child| closure.contains(&child) && child != id)
            .collect();
        deps.insert(id, children.len());
    }

    let mut queue: Vec<usize> = deps
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut processed = 0;

    while let Some(id) = queue.pop() {
        recompute_node_values(book, id);
        processed += 1;

        let parents: FxHashSet<usize> = book.node(id).parents.iter().map(|&(parent, _)| parent).collect();
        for parent in parents {
            if parent == id {
                continue;
            }
            if let Some(count) = deps.get_mut(&parent) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(parent);
                    }
                }
            }
        }
    }

    if processed < closure.len() {
        // should be impossible in a well-formed book
        warn!(
            "value propagation found {} nodes in a dependency cycle, processing them in hash order",
            closure.len() - processed
        );
        let mut rest: Vec<usize> = closure.iter().copied().filter(|id| deps[id] > 0).collect();
        rest.sort_by_key(|&id| book.node(id).hash);
        for id in rest {
            recompute_node_values(book, id);
        }
    }
}

/// Recompute one node's recursive aggregates from its children plus its own
/// not-in-book summary.
fn recompute_node_values(book: &mut Book, id: usize) {
    struct Cand {
        wl: f64,
        wl_ucb: f64,
        wl_lcb: f64,
        score: f64,
        score_ucb: f64,
        score_lcb: f64,
        sharp_score: f64,
        tiebreak: BookHash,
    }

    let node = book.node(id);
    let side = node.side_to_move();
    let sign = pov_sign(side);

    let mut cands = vec![];
    let mut visits = node.this_values.visits;
    let mut weight = node.this_values.weight;

    for edge in &node.children {
        let child = book.node(edge.child);
        let rv = &child.recursive;
        visits += rv.visits;
        weight += rv.weight;

        let (wl_ucb, wl_lcb, score_ucb, score_lcb) = match side {
            Player::A => (rv.win_loss_ucb, rv.win_loss_lcb, rv.score_ucb, rv.score_lcb),
            Player::B => (-rv.win_loss_lcb, -rv.win_loss_ucb, -rv.score_lcb, -rv.score_ucb),
        };
        cands.push(Cand {
            wl: sign * rv.win_loss,
            wl_ucb,
            wl_lcb,
            score: sign * rv.score_mean,
            score_ucb,
            score_lcb,
            sharp_score: sign * rv.sharp_score_mean,
            tiebreak: child.hash,
        });
    }

    {
        let tv = &node.this_values;
        let e = book.params.error_factor;
        cands.push(Cand {
            wl: sign * tv.win_loss,
            wl_ucb: sign * tv.win_loss + e * tv.win_loss_error,
            wl_lcb: sign * tv.win_loss - e * tv.win_loss_error,
            score: sign * tv.score_mean,
            score_ucb: sign * tv.score_mean + e * tv.score_error,
            score_lcb: sign * tv.score_mean - e * tv.score_error,
            sharp_score: sign * tv.sharp_score_mean,
            tiebreak: node.hash,
        });
    }

    // the side to move picks the best candidate, so every aggregate is a
    // max over candidates in pov space
    let best = cands
        .iter()
        .max_by(|a, b| {
            a.wl.partial_cmp(&b.wl)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.tiebreak.cmp(&a.tiebreak))
        })
        .expect("There is always at least the phantom candidate");

    let max_of = |f: fn(&Cand) -> f64| cands.iter().map(f).fold(f64::NEG_INFINITY, f64::max);
    let (wl_lcb_pov, wl_ucb_pov) = (max_of(|c| c.wl_lcb), max_of(|c| c.wl_ucb));
    let (score_lcb_pov, score_ucb_pov) = (max_of(|c| c.score_lcb), max_of(|c| c.score_ucb));

    let (win_loss_lcb, win_loss_ucb) = match side {
        Player::A => (wl_lcb_pov, wl_ucb_pov),
        Player::B => (-wl_ucb_pov, -wl_lcb_pov),
    };
    let (score_lcb, score_ucb) = match side {
        Player::A => (score_lcb_pov, score_ucb_pov),
        Player::B => (-score_ucb_pov, -score_lcb_pov),
    };

    let prev = book.node(id).recursive;
    book.node_mut(id).recursive = RecursiveValues {
        win_loss: sign * best.wl,
        score_mean: sign * best.score,
        sharp_score_mean: sign * best.sharp_score,
        win_loss_ucb,
        win_loss_lcb,
        score_ucb,
        score_lcb,
        weight,
        visits,
        // the top-down pass fills these in
        min_cost_from_root: prev.min_cost_from_root,
        total_expansion_cost: prev.total_expansion_cost,
        is_wlpv1: prev.is_wlpv1,
        is_wlpv2: prev.is_wlpv2,
        has_biggest_wl_cost: prev.has_biggest_wl_cost,
    };
}

/// Topological order over in-book edges starting from the root, parents
/// before children.
fn topological_order(book: &Book) -> Vec<usize> {
    let mut order = vec![];
    let mut visited = vec![false; book.size()];
    // (node, next child index to visit)
    let mut stack = vec![(ROOT, 0)];
    visited[ROOT] = true;

    while let Some(&mut (id, ref mut next)) = stack.last_mut() {
        let children = &book.node(id).children;
        if *next < children.len() {
            let child = children[*next].child;
            *next += 1;
            if !visited[child] {
                visited[child] = true;
                stack.push((child, 0));
            }
        } else {
            order.push(id);
            stack.pop();
        }
    }

    order.reverse();
    order
}

fn top_down(book: &mut Book) {
    let order = topological_order(book);

    for id in book.node_ids() {
        let rv = &mut book.node_mut(id).recursive;
        rv.min_cost_from_root = f64::INFINITY;
        rv.is_wlpv1 = false;
        rv.is_wlpv2 = false;
        rv.has_biggest_wl_cost = false;
    }
    book.node_mut(ROOT).recursive.min_cost_from_root = 0.0;

    // relax edge costs along the DAG, remembering each node's phantom cost
    let mut phantom_costs: FxHashMap<usize, f64> = FxHashMap::default();
    for &id in &order {
        let from = book.node(id).recursive.min_cost_from_root;
        let costs = cost::node_costs(book, id);
        phantom_costs.insert(id, costs.phantom_cost);

        for (i, edge_cost) in costs.edge_costs.iter().enumerate() {
            let child = book.node(id).children[i].child;
            let through = from + edge_cost;
            let child_rv = &mut book.node_mut(child).recursive;
            if through < child_rv.min_cost_from_root {
                child_rv.min_cost_from_root = through;
            }
        }
    }

    mark_wl_principal_variation(book);

    for &id in &order {
        let bonus = cost::node_bonus(book, id);
        let rv = &mut book.node_mut(id).recursive;
        rv.total_expansion_cost = rv.min_cost_from_root + phantom_costs[&id] - bonus;
    }
}

/// Walk the best-by-win/loss line from the root, marking its first and
/// second nodes and the single node whose incoming step contributes the
/// largest win/loss-gap cost.
fn mark_wl_principal_variation(book: &mut Book) {
    let mut id = ROOT;
    let mut depth = 0;
    let mut visited = FxHashSet::default();
    let mut biggest: Option<(usize, f64)> = None;

    loop {
        if !visited.insert(id) {
            break;
        }

        let cands = cost::candidates(book, id);
        let (phantom, edges) = cands.split_last().expect("Candidates always include the phantom");

        let best_edge = edges
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.wl.partial_cmp(&b.wl)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.wl_ucb.partial_cmp(&b.wl_ucb).unwrap_or(std::cmp::Ordering::Equal))
            })
            .filter(|(_, best)| best.wl >= phantom.wl);

        let (edge_index, _) = match best_edge {
            Some(found) => found,
            // the principal variation leaves the book here
            None => break,
        };

        let wl_cost = cost::node_costs(book, id).edge_wl_costs[edge_index];
        let child = book.node(id).children[edge_index].child;

        if biggest.map_or(true, |(_, cost)| wl_cost > cost) {
            biggest = Some((child, wl_cost));
        }

        depth += 1;
        if depth == 1 {
            book.node_mut(child).recursive.is_wlpv1 = true;
        } else if depth == 2 {
            book.node_mut(child).recursive.is_wlpv2 = true;
        }

        id = child;
    }

    if let Some((id, _)) = biggest {
        book.node_mut(id).recursive.has_biggest_wl_cost = true;
    }
}

#[cfg(test)]
mod tests {
    use board_game::board::{Board, BoardMoves};
    use board_game::games::go::{GoBoard, Komi, Move, Rules};
    use internal_iterator::InternalIterator;

    use crate::book::graph::{Book, ROOT};
    use crate::book::values::LeafValues;
    use crate::book::{BookParams, LATEST_BOOK_VERSION};

    fn empty_book(size: u8) -> Book {
        let board = GoBoard::new(size, Komi::try_from(7.5).unwrap(), Rules::tromp_taylor());
        Book::new(LATEST_BOOK_VERSION, board, 3, BookParams::default())
    }

    fn add(book: &mut Book, parent: usize, mv: Move, policy: f64) -> usize {
        let node = book.node(parent);
        let (rep, _) = node.canonical_move_rep_with_sym(mv);
        let mut board = node.board.clone();
        board.play(rep).unwrap();
        let canon = Book::canonicalize(&board, book.book_version);
        book.play_and_add_move(parent, rep, policy, &canon).child
    }

    fn two_child_book() -> (Book, usize, usize) {
        let mut book = empty_book(5);
        let moves: Vec<Move> = {
            let mut moves = vec![];
            book.node(ROOT).board.available_moves().unwrap().for_each(|mv| {
                if mv != Move::Pass {
                    moves.push(mv)
                }
            });
            moves
        };

        let a = book.node(ROOT).canonical_move_rep(moves[0]);
        let b = moves
            .iter()
            .map(|&mv| book.node(ROOT).canonical_move_rep(mv))
            .find(|&mv| mv != a)
            .unwrap();

        let ca = add(&mut book, ROOT, a, 0.4);
        let cb = add(&mut book, ROOT, b, 0.2);

        book.node_mut(ROOT).this_values = LeafValues {
            win_loss: 0.1,
            score_mean: 1.0,
            sharp_score_mean: 1.5,
            win_loss_error: 0.05,
            score_error: 0.5,
            score_stdev: 1.0,
            max_policy: 0.2,
            weight: 50.0,
            visits: 50.0,
        };
        book.node_mut(ca).this_values = LeafValues {
            win_loss: -0.3,
            score_mean: -2.0,
            sharp_score_mean: -2.0,
            win_loss_error: 0.1,
            score_error: 1.0,
            score_stdev: 2.0,
            max_policy: 0.5,
            weight: 100.0,
            visits: 100.0,
        };
        book.node_mut(cb).this_values = LeafValues {
            win_loss: 0.2,
            score_mean: 3.0,
            sharp_score_mean: 3.0,
            win_loss_error: 0.1,
            score_error: 1.0,
            score_stdev: 2.0,
            max_policy: 0.4,
            weight: 80.0,
            visits: 80.0,
        };

        (book, ca, cb)
    }

    #[test]
    fn recompute_is_idempotent() {
        let (mut book, _, _) = two_child_book();
        book.recompute_everything();
        let snapshot: Vec<_> = book.node_ids().map(|id| book.node(id).recursive).collect();
        book.recompute_everything();
        let again: Vec<_> = book.node_ids().map(|id| book.node(id).recursive).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn visits_accumulate_to_the_root() {
        let (mut book, ca, cb) = two_child_book();
        book.recompute_everything();

        let root = book.node(ROOT).recursive;
        assert_eq!(root.visits, 50.0 + 100.0 + 80.0);
        assert_eq!(book.node(ca).recursive.visits, 100.0);
        assert_eq!(book.node(cb).recursive.visits, 80.0);
    }

    #[test]
    fn root_prefers_the_better_child() {
        let (mut book, _, _) = two_child_book();
        book.recompute_everything();

        // root is player A: child b (+0.2 absolute) beats child a (-0.3)
        // and the root's own +0.1 phantom
        let root = book.node(ROOT).recursive;
        assert_eq!(root.win_loss, 0.2);
        assert!(root.win_loss_ucb >= root.win_loss);
        assert!(root.win_loss_lcb <= root.win_loss);
    }

    #[test]
    fn wlpv_marks_one_child() {
        let (mut book, ca, cb) = two_child_book();
        book.recompute_everything();

        let marked: Vec<bool> = [ca, cb].iter().map(|&id| book.node(id).recursive.is_wlpv1).collect();
        assert_eq!(marked.iter().filter(|&&m| m).count(), 1);
        assert!(!book.node(ROOT).recursive.is_wlpv1);
    }

    #[test]
    fn partial_recompute_matches_full() {
        let (mut book, ca, _) = two_child_book();
        book.recompute_everything();

        // perturb a leaf and propagate only from it
        book.node_mut(ca).this_values.win_loss = 0.9;
        let hash = book.node(ca).hash;
        book.recompute(&[hash]);
        let partial: Vec<_> = book.node_ids().map(|id| book.node(id).recursive).collect();

        book.recompute_everything();
        let full: Vec<_> = book.node_ids().map(|id| book.node(id).recursive).collect();
        assert_eq!(partial, full);
    }
}
