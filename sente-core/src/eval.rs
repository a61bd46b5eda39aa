//! The neural-evaluator seam. The engine never sees a network, only this
//! trait; the shipped [UniformEvaluator] is enough to drive tests and runs
//! without one.

use std::fmt::Debug;

use board_game::board::{Board, BoardMoves, BoardSymmetry, Player};
use board_game::games::go::{GoBoard, Move, Tile};
use board_game::symmetry::{D4Symmetry, Symmetry};
use internal_iterator::InternalIterator;

use crate::go::MoveIndex;

/// A single-position evaluation. Values are absolute, positive favoring the
/// first player. The policy is in flat move-index layout over the evaluated
/// board's own frame, zero on illegal moves, summing to one.
#[derive(Debug, Clone)]
pub struct NetEvaluation {
    pub win_loss: f32,
    pub score_mean: f32,
    pub score_stdev: f32,
    pub win_loss_error: f32,
    pub score_error: f32,
    pub policy: Vec<f32>,
}

pub trait Evaluator: Debug + Send + Sync {
    fn evaluate(&self, board: &GoBoard) -> NetEvaluation;
}

/// Evaluate a position under all 8 symmetries and average, un-mapping each
/// policy back into the input frame. Book-side policy queries go through
/// this so stored policies are independent of any search symmetry choice.
pub fn full_symmetry_evaluation(evaluator: &dyn Evaluator, board: &GoBoard) -> NetEvaluation {
    let index = MoveIndex::new(board.size());
    let mut result = NetEvaluation {
        win_loss: 0.0,
        score_mean: 0.0,
        score_stdev: 0.0,
        win_loss_error: 0.0,
        score_error: 0.0,
        policy: vec![0.0; index.policy_len()],
    };

    let syms = D4Symmetry::all();
    for &sym in syms {
        let mapped = board.map(sym);
        let eval = evaluator.evaluate(&mapped);

        result.win_loss += eval.win_loss;
        result.score_mean += eval.score_mean;
        result.score_stdev += eval.score_stdev;
        result.win_loss_error += eval.win_loss_error;
        result.score_error += eval.score_error;

        if !board.is_done() {
            board.available_moves().unwrap().for_each(|mv| {
                let mapped_mv = board.map_move(sym, mv);
                result.policy[index.move_to_index(mv)] += eval.policy[index.move_to_index(mapped_mv)];
            });
        }
    }

    let n = syms.len() as f32;
    result.win_loss /= n;
    result.score_mean /= n;
    result.score_stdev /= n;
    result.win_loss_error /= n;
    result.score_error /= n;
    for p in result.policy.iter_mut() {
        *p /= n;
    }

    result
}

/// Deterministic evaluator: uniform policy over legal moves and a shallow
/// stone-count heuristic for the values. Stands in for the external network
/// in tests and default runs.
#[derive(Debug, Clone)]
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, board: &GoBoard) -> NetEvaluation {
        let index = MoveIndex::new(board.size());
        let size = board.size();

        let mut stones_a = 0i32;
        let mut stones_b = 0i32;
        for tile in Tile::all(size) {
            match board.stone_at(tile) {
                Some(Player::A) => stones_a += 1,
                Some(Player::B) => stones_b += 1,
                None => {}
            }
        }

        let score = (stones_a - stones_b) as f32 - board.komi().as_float();
        let win_loss = (score / size as f32).tanh();

        let mut policy = vec![0.0f32; index.policy_len()];
        if !board.is_done() {
            let count = board.available_moves().unwrap().count();
            let p = 1.0 / count as f32;
            board.available_moves().unwrap().for_each(|mv: Move| {
                policy[index.move_to_index(mv)] = p;
            });
        }

        NetEvaluation {
            win_loss,
            score_mean: score,
            score_stdev: size as f32 / 2.0,
            win_loss_error: 0.1,
            score_error: 1.0,
            policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use board_game::games::go::{GoBoard, Komi, Rules};

    use super::*;

    fn board(size: u8) -> GoBoard {
        GoBoard::new(size, Komi::try_from(7.5).unwrap(), Rules::tromp_taylor())
    }

    #[test]
    fn uniform_policy_sums_to_one() {
        let eval = UniformEvaluator.evaluate(&board(5));
        let total: f32 = eval.policy.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn full_symmetry_policy_is_symmetric() {
        let mut b = board(5);
        // break symmetry with one corner stone so per-symmetry evals differ
        let mv = {
            let index = MoveIndex::new(5);
            index.index_to_move(1)
        };
        b.play(mv).unwrap();

        let eval = full_symmetry_evaluation(&UniformEvaluator, &b);
        // moves equivalent under the remaining diagonal symmetry get equal policy
        let index = MoveIndex::new(5);
        for &sym in D4Symmetry::all() {
            let mapped_board = b.map(sym);
            if mapped_board == b {
                b.available_moves().unwrap().for_each(|mv| {
                    let mapped = b.map_move(sym, mv);
                    let a = eval.policy[index.move_to_index(mv)];
                    let bb = eval.policy[index.move_to_index(mapped)];
                    assert!((a - bb).abs() < 1e-6);
                });
            }
        }
    }
}
