//! One search step: walk down by PUCT, evaluate or settle the reached leaf,
//! back the values up. Fully synchronous; the evaluator is called inline.

use board_game::board::{Board, BoardMoves, BoardSymmetry};
use board_game::games::go::{GoBoard, Move};
use board_game::symmetry::D4Symmetry;
use decorum::N64;
use internal_iterator::InternalIterator;
use rand::Rng;

use sente_util::sequence::choose_max_by_key;

use crate::eval::Evaluator;
use crate::go::{final_score_diff, MoveIndex};
use crate::zero::node::Node;
use crate::zero::range::IdxRange;
use crate::zero::tree::ZeroTree;
use crate::zero::values::SearchValues;

/// Everything fixed for the duration of one search invocation.
#[derive(Debug)]
pub struct StepContext<'a> {
    pub move_index: MoveIndex,
    pub avoid: &'a [bool],
    pub symmetries: &'a [D4Symmetry],
    pub cpuct_exploration: f64,
    pub cpuct_exploration_log: f64,
    pub cpuct_scale: f64,
    pub wide_root_noise: f64,
    pub fpu_loss: f64,
}

impl StepContext<'_> {
    fn cpuct(&self, parent_visits: u64) -> f64 {
        let log_term = ((parent_visits as f64 + 361.0) / 361.0).ln();
        self.cpuct_scale * (self.cpuct_exploration + self.cpuct_exploration_log * log_term)
    }

    fn is_avoided(&self, mv: Move) -> bool {
        if self.avoid.is_empty() {
            false
        } else {
            self.avoid[self.move_index.move_to_index(mv)]
        }
    }
}

/// Perform one gather/backup step. Returns false if the root has no
/// searchable moves at all.
pub fn zero_step(tree: &mut ZeroTree, ctx: &StepContext, evaluator: &dyn Evaluator, rng: &mut impl Rng) -> bool {
    let mut curr_node = 0;
    let mut curr_board = tree.root_board().clone();

    loop {
        if curr_board.is_done() {
            propagate_values(tree, curr_node, SearchValues::from_terminal(final_score_diff(&curr_board)));
            return true;
        }

        let children = match tree[curr_node].children {
            None => {
                let eval = evaluator.evaluate(&curr_board);

                let moves = if curr_node == 0 {
                    root_moves(&curr_board, ctx, &eval.policy)
                } else {
                    all_moves(&curr_board, ctx, &eval.policy)
                };
                if moves.is_empty() {
                    // only possible at an all-avoided root
                    return false;
                }

                let start = tree.len();
                for (mv, policy) in moves {
                    tree.nodes.push(Node::new(Some(curr_node), Some(mv), policy));
                }
                let end = tree.len();
                tree[curr_node].children = Some(IdxRange::new(start, end));

                propagate_values(tree, curr_node, SearchValues::from_net(&eval));
                return true;
            }
            Some(children) => children,
        };

        let player = curr_board.next_player();
        let parent_visits = tree[curr_node].visits;
        let parent_mean_wl = if parent_visits == 0 {
            0.0
        } else {
            tree[curr_node].mean().win_loss
        };
        let cpuct = ctx.cpuct(parent_visits);

        let selected = choose_max_by_key(
            children,
            |&child| N64::from_inner(tree[child].uct(player, parent_visits, parent_mean_wl, cpuct, ctx.fpu_loss)),
            rng,
        )
        .expect("Expanded node must have children");

        curr_node = selected;
        curr_board
            .play(tree[curr_node].last_move.unwrap())
            .expect("Tree moves are always legal");
    }
}

/// Root children: legal moves minus the avoid set, reduced to one
/// representative per symmetry class. A class representative collects the
/// policy mass of its whole class, then wide root noise mixes in uniform.
fn root_moves(board: &GoBoard, ctx: &StepContext, policy: &[f32]) -> Vec<(Move, f32)> {
    let mut moves: Vec<(Move, f32)> = vec![];

    board.available_moves().unwrap().for_each(|mv: Move| {
        if ctx.is_avoided(mv) {
            return;
        }
        let rep = symmetry_rep(board, ctx, mv);
        if ctx.is_avoided(rep) {
            return;
        }
        let p = policy[ctx.move_index.move_to_index(mv)];
        match moves.iter_mut().find(|(existing, _)| *existing == rep) {
            Some((_, mass)) => *mass += p,
            None => moves.push((rep, p)),
        }
    });

    let noise = ctx.wide_root_noise as f32;
    if noise > 0.0 && !moves.is_empty() {
        let uniform = 1.0 / moves.len() as f32;
        for (_, p) in moves.iter_mut() {
            *p = (*p + noise * uniform) / (1.0 + noise);
        }
    }

    moves
}

fn all_moves(board: &GoBoard, ctx: &StepContext, policy: &[f32]) -> Vec<(Move, f32)> {
    let mut moves = vec![];
    board.available_moves().unwrap().for_each(|mv: Move| {
        moves.push((mv, policy[ctx.move_index.move_to_index(mv)]));
    });
    moves
}

fn symmetry_rep(board: &GoBoard, ctx: &StepContext, mv: Move) -> Move {
    ctx.symmetries
        .iter()
        .map(|&sym| board.map_move(sym, mv))
        .min_by_key(|&mapped| ctx.move_index.move_to_index(mapped))
        .unwrap_or(mv)
}

fn propagate_values(tree: &mut ZeroTree, node: usize, values: SearchValues) {
    let mut curr = Some(node);
    while let Some(index) = curr {
        tree[index].visits += 1;
        tree[index].sum += values;
        curr = tree[index].parent;
    }
}
