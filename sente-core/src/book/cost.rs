//! Expansion-cost model. Lower cost = more promising leaf.
//!
//! Each node's total cost is the cheapest path cost from the root (edge
//! costs summed along the way, computed by the propagator's top-down pass)
//! plus the cost of the phantom "best move outside the book" edge, minus the
//! node's bonuses.

use board_game::board::Player;
use board_game::games::go::Move;
use itertools::Itertools;

use crate::book::graph::Book;
use crate::book::params::BookParams;
use crate::book::values::pov;

/// A candidate action at a node, oriented for that node's side to move:
/// either an in-book edge or the phantom move summarized by the node's TV.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Candidate {
    pub mv: Option<Move>,
    pub wl: f64,
    pub wl_ucb: f64,
    pub score: f64,
    pub score_ucb: f64,
    pub policy: f64,
}

/// Costs of all actions at one node, aligned with `children` order.
#[derive(Debug)]
pub(crate) struct NodeCosts {
    pub edge_costs: Vec<f64>,
    /// The win/loss-gap component only, for the biggest-WL-cost marker.
    pub edge_wl_costs: Vec<f64>,
    pub phantom_cost: f64,
}

pub(crate) fn candidates(book: &Book, id: usize) -> Vec<Candidate> {
    let node = book.node(id);
    let side = node.side_to_move();
    let mut result = Vec::with_capacity(node.children.len() + 1);

    for edge in &node.children {
        let rv = &book.node(edge.child).recursive;
        let (wl_ucb, score_ucb) = match side {
            Player::A => (rv.win_loss_ucb, rv.score_ucb),
            Player::B => (-rv.win_loss_lcb, -rv.score_lcb),
        };
        result.push(Candidate {
            mv: Some(edge.mv),
            wl: pov(side, rv.win_loss),
            wl_ucb,
            score: pov(side, rv.score_mean),
            score_ucb,
            policy: edge.raw_policy,
        });
    }

    let tv = &node.this_values;
    let e = book.params.error_factor;
    let (wl_ucb, score_ucb) = match side {
        Player::A => (
            tv.win_loss + e * tv.win_loss_error,
            tv.score_mean + e * tv.score_error,
        ),
        Player::B => (
            -(tv.win_loss - e * tv.win_loss_error),
            -(tv.score_mean - e * tv.score_error),
        ),
    };
    result.push(Candidate {
        mv: None,
        wl: pov(side, tv.win_loss),
        wl_ucb,
        score: pov(side, tv.score_mean),
        score_ucb,
        policy: tv.max_policy,
    });

    result
}

/// Bounded compression of log-policy, so vanishing policies cannot dominate
/// the sorting utility. Maps (0, 1] into (-scale, 0].
fn soft_log(policy: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    let x = policy.max(1e-30).ln();
    scale * x / (scale - x)
}

pub(crate) fn sorting_utility(params: &BookParams, cand: &Candidate) -> f64 {
    cand.wl
        + params.utility_per_score * cand.score
        + params.utility_per_policy_for_sorting * soft_log(cand.policy, params.policy_boost_soft_utility_scale)
}

/// The win/loss-gap portion of an edge cost.
fn wl_gap_cost(params: &BookParams, gap: f64) -> f64 {
    params.cost_per_ucb_win_loss_loss * gap
        + params.cost_per_ucb_win_loss_loss_pow3 * gap.powi(3)
        + params.cost_per_ucb_win_loss_loss_pow7 * gap.powi(7)
}

fn action_cost(params: &BookParams, cand: &Candidate, best_wl_ucb: f64, best_score_ucb: f64, rank: usize) -> f64 {
    let wl_gap = (best_wl_ucb - cand.wl_ucb).max(0.0);
    let score_gap = (best_score_ucb - cand.score_ucb).max(0.0).min(params.score_loss_cap);
    let rank = rank as f64;

    params.cost_per_move
        + wl_gap_cost(params, wl_gap)
        + params.cost_per_ucb_score_loss * score_gap * params.utility_per_score
        + params.cost_per_log_policy * -cand.policy.max(1e-30).ln()
        + params.cost_per_moves_expanded * rank
        + params.cost_per_squared_moves_expanded * rank * rank
}

pub(crate) fn node_costs(book: &Book, id: usize) -> NodeCosts {
    let params = &book.params;
    let cands = candidates(book, id);
    let (phantom, edges) = cands.split_last().expect("Candidates always include the phantom");

    let best_wl_ucb = cands.iter().map(|c| c.wl_ucb).fold(f64::NEG_INFINITY, f64::max);
    let best_score_ucb = cands.iter().map(|c| c.score_ucb).fold(f64::NEG_INFINITY, f64::max);

    // rank in-book edges by sorting utility; the phantom edge always ranks
    // after every expanded move
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&a, &b| {
        sorting_utility(params, &edges[b])
            .partial_cmp(&sorting_utility(params, &edges[a]))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut rank_of = vec![0; edges.len()];
    for (rank, &i) in order.iter().enumerate() {
        rank_of[i] = rank;
    }

    let edge_costs: Vec<f64> = edges
        .iter()
        .enumerate()
        .map(|(i, cand)| action_cost(params, cand, best_wl_ucb, best_score_ucb, rank_of[i]))
        .collect();
    let edge_wl_costs: Vec<f64> = edges
        .iter()
        .map(|cand| wl_gap_cost(params, (best_wl_ucb - cand.wl_ucb).max(0.0)))
        .collect();

    let mut phantom_cost = action_cost(params, phantom, best_wl_ucb, best_score_ucb, edges.len());

    // expanding further is rarely useful when passing is already best here
    let pass_favored = edges
        .iter()
        .max_by(|a, b| a.wl_ucb.partial_cmp(&b.wl_ucb).unwrap_or(std::cmp::Ordering::Equal))
        .map_or(false, |best| best.mv == Some(Move::Pass) && best.wl_ucb >= phantom.wl_ucb);
    if pass_favored {
        phantom_cost += params.cost_when_pass_favored;
    }

    NodeCosts {
        edge_costs,
        edge_wl_costs,
        phantom_cost,
    }
}

/// Bonuses subtracted from a node's total expansion cost.
pub(crate) fn node_bonus(book: &Book, id: usize) -> f64 {
    let params = &book.params;
    let node = book.node(id);
    let tv = &node.this_values;

    let sharp_discrepancy = (tv.score_mean - tv.sharp_score_mean)
        .abs()
        .min(params.sharp_score_outlier_cap);
    let excess_policy = (tv.max_policy - node.expanded_policy_mass()).max(0.0);

    let mut bonus = params.bonus_per_win_loss_error * tv.win_loss_error
        + params.bonus_per_score_error * tv.score_error
        + params.bonus_per_sharp_score_discrepancy * sharp_discrepancy
        + params.bonus_per_excess_unexpanded_policy * excess_policy
        + book.bonus_for(node.hash);

    if node.recursive.is_wlpv1 {
        bonus += params.bonus_for_wlpv1;
    }
    if node.recursive.is_wlpv2 {
        bonus += params.bonus_for_wlpv2;
    }
    if node.recursive.has_biggest_wl_cost {
        bonus += params.bonus_for_biggest_wl_cost;
    }

    bonus
}

/// The best `n` expandable nodes by total expansion cost, ascending, ties
/// broken by hash so selection is deterministic.
pub(crate) fn select_nodes_to_expand(book: &Book, n: usize) -> Vec<usize> {
    book.node_ids()
        .filter(|&id| {
            let node = book.node(id);
            node.can_expand && node.recursive.total_expansion_cost.is_finite()
        })
        .sorted_by(|&a, &b| {
            let ca = book.node(a).recursive.total_expansion_cost;
            let cb = book.node(b).recursive.total_expansion_cost;
            ca.partial_cmp(&cb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| book.node(a).hash.cmp(&book.node(b).hash))
        })
        .take(n)
        .collect_vec()
}
