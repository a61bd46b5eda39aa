use std::ops::{Index, IndexMut};

use board_game::board::Board;
use board_game::games::go::{GoBoard, Move};
use decorum::N32;

use crate::search::{SearchStats, SearchTree};
use crate::zero::node::Node;

/// The result of a search: an arena of nodes rooted at index 0, every move
/// expressed in the root board's frame.
#[derive(Debug, Clone)]
pub struct ZeroTree {
    root_board: GoBoard,
    pub(super) nodes: Vec<Node>,
}

impl ZeroTree {
    pub fn new(root_board: GoBoard) -> ZeroTree {
        assert!(!root_board.is_done(), "Cannot search a finished game");
        let root = Node::new(None, None, f32::NAN);
        ZeroTree {
            root_board,
            nodes: vec![root],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_board(&self) -> &GoBoard {
        &self.root_board
    }

    pub fn root_visits(&self) -> u64 {
        self.nodes[0].visits
    }
}

impl SearchTree for ZeroTree {
    fn root(&self) -> usize {
        0
    }

    fn visits(&self, node: usize) -> u64 {
        self.nodes[node].visits
    }

    fn children(&self, node: usize) -> Vec<(Move, usize)> {
        match self.nodes[node].children {
            None => vec![],
            Some(range) => range
                .iter()
                .map(|child| {
                    let mv = self.nodes[child].last_move.expect("Non-root node has a move");
                    (mv, child)
                })
                .collect(),
        }
    }

    fn stats(&self, node: usize) -> SearchStats {
        let node = &self.nodes[node];
        if node.visits == 0 {
            return SearchStats::default();
        }

        let mean = node.mean();
        let variance = (mean.score_sq - mean.score * mean.score).max(0.0);
        SearchStats {
            win_loss: mean.win_loss,
            score_mean: mean.score,
            score_stdev: variance.sqrt(),
            win_loss_error: mean.win_loss_error,
            score_error: mean.score_error,
            weight: node.visits as f64,
            visits: node.visits as f64,
        }
    }

    fn best_move(&self, node: usize) -> Option<Move> {
        let range = self.nodes[node].children?;
        let best = range
            .iter()
            .max_by_key(|&child| (self.nodes[child].visits, N32::from_inner(self.nodes[child].net_policy)))?;
        self.nodes[best].last_move
    }

    fn sharp_score(&self, node: usize) -> f64 {
        // follow the most-visited line as deep as it has real visits
        let mut curr = node;
        loop {
            let next = match self.nodes[curr].children {
                None => break,
                Some(range) => range.iter().max_by_key(|&child| self.nodes[child].visits),
            };
            match next {
                Some(child) if self.nodes[child].visits > 0 => curr = child,
                _ => break,
            }
        }
        if self.nodes[curr].visits == 0 {
            0.0
        } else {
            self.nodes[curr].mean().score
        }
    }
}

impl Index<usize> for ZeroTree {
    type Output = Node;

    fn index(&self, index: usize) -> &Self::Output {
        &self.nodes[index]
    }
}

impl IndexMut<usize> for ZeroTree {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.nodes[index]
    }
}
