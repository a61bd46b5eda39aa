//! Per-node value summaries.
//!
//! All values are stored absolute: positive favors the first player. `pov`
//! helpers orient them for the side to move where the selector needs that.

use board_game::board::Player;

/// Summary of the best move *outside* the node's current child set, written
/// by the value refresher ("TV" in the book design).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct LeafValues {
    pub win_loss: f64,
    pub score_mean: f64,
    pub sharp_score_mean: f64,
    pub win_loss_error: f64,
    pub score_error: f64,
    pub score_stdev: f64,
    pub max_policy: f64,
    pub weight: f64,
    pub visits: f64,
}

/// Sentinel magnitude for "there is no move outside the book here".
pub const NO_MOVES_SENTINEL: f64 = 1e20;

impl LeafValues {
    /// Sentinel biased against `side`, so the selector never prefers
    /// expanding a node with no remaining legal moves.
    pub fn no_moves(side: Player) -> LeafValues {
        let value = match side {
            Player::A => -NO_MOVES_SENTINEL,
            Player::B => NO_MOVES_SENTINEL,
        };
        LeafValues {
            win_loss: value,
            score_mean: value,
            sharp_score_mean: value,
            win_loss_error: 0.0,
            score_error: 0.0,
            score_stdev: 0.0,
            max_policy: 0.0,
            weight: 0.0,
            visits: 0.0,
        }
    }

    /// Exact values for a finished game.
    pub fn terminal(score_diff: f64, visits: f64) -> LeafValues {
        let win_loss = if score_diff > 0.0 {
            1.0
        } else if score_diff < 0.0 {
            -1.0
        } else {
            0.0
        };
        LeafValues {
            win_loss,
            score_mean: score_diff,
            sharp_score_mean: score_diff,
            win_loss_error: 0.0,
            score_error: 0.0,
            score_stdev: 0.0,
            max_policy: 1.0,
            weight: visits,
            visits,
        }
    }
}

/// Aggregates over the subtree below a node, recomputed by the propagator
/// ("RV" in the book design). Everything here is derived state.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct RecursiveValues {
    pub win_loss: f64,
    pub score_mean: f64,
    pub sharp_score_mean: f64,
    /// Plausible value range given the accumulated error estimates.
    pub win_loss_ucb: f64,
    pub win_loss_lcb: f64,
    pub score_ucb: f64,
    pub score_lcb: f64,
    pub weight: f64,
    pub visits: f64,

    /// Cheapest way to reach this node from the root, in expansion cost.
    pub min_cost_from_root: f64,
    /// Full cost of expanding this node next, bonuses already subtracted.
    pub total_expansion_cost: f64,
    /// First and second node on the principal win/loss variation.
    pub is_wlpv1: bool,
    pub is_wlpv2: bool,
    /// Largest win/loss-gap contributor on the principal variation.
    pub has_biggest_wl_cost: bool,
}

pub fn pov_sign(side: Player) -> f64 {
    match side {
        Player::A => 1.0,
        Player::B => -1.0,
    }
}

pub fn pov(side: Player, value: f64) -> f64 {
    pov_sign(side) * value
}

#[cfg(test)]
mod tests {
    use board_game::board::Player;

    use super::*;

    #[test]
    fn no_moves_sentinel_is_against_side() {
        assert!(LeafValues::no_moves(Player::A).win_loss < 0.0);
        assert!(LeafValues::no_moves(Player::B).win_loss > 0.0);
    }

    #[test]
    fn terminal_sign_follows_score() {
        assert_eq!(LeafValues::terminal(12.5, 100.0).win_loss, 1.0);
        assert_eq!(LeafValues::terminal(-0.5, 100.0).win_loss, -1.0);
        assert_eq!(LeafValues::terminal(0.0, 100.0).win_loss, 0.0);
        assert_eq!(LeafValues::terminal(7.0, 50.0).visits, 50.0);
        assert_eq!(LeafValues::terminal(7.0, 50.0).max_policy, 1.0);
    }
}
