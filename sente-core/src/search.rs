//! Seam between the book engine and the tree search. The engine only ever
//! talks to these traits, so it can be driven by a stub in tests; the real
//! implementation lives in [crate::zero].

use board_game::games::go::{GoBoard, Move};
use board_game::symmetry::D4Symmetry;

/// Fixed search parameters owned by one worker's searcher.
#[derive(Debug, Copy, Clone)]
pub struct SearchSettings {
    pub max_visits: u64,
    pub cpuct_exploration: f64,
    pub cpuct_exploration_log: f64,
    pub wide_root_noise: f64,
    /// First-play-urgency penalty for unvisited children.
    pub fpu_loss: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            max_visits: 400,
            cpuct_exploration: 1.1,
            cpuct_exploration_log: 0.45,
            wide_root_noise: 0.04,
            fpu_loss: 0.2,
        }
    }
}

/// One search invocation. `avoid` is a mask in flat move-index layout over
/// the root position's frame; masked moves are never searched at the root.
#[derive(Debug)]
pub struct SearchRequest<'a> {
    pub board: &'a GoBoard,
    pub avoid: &'a [bool],
    /// Self-symmetries of the root position, used to prune symmetric root
    /// moves down to one representative each.
    pub symmetries: &'a [D4Symmetry],
    pub max_visits: u64,
    /// Exploration compensation for removed policy mass.
    pub cpuct_scale: f64,
    pub wide_root_noise: f64,
    pub cpuct_exploration_log: f64,
}

/// Aggregated values of one search node. Win/loss and scores are absolute,
/// positive favoring the first player.
#[derive(Debug, Copy, Clone, Default)]
pub struct SearchStats {
    pub win_loss: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
    pub win_loss_error: f64,
    pub score_error: f64,
    pub weight: f64,
    pub visits: f64,
}

/// Read-only view of a finished search, the only thing the splice step sees.
/// All moves are expressed in the root position's frame.
pub trait SearchTree {
    fn root(&self) -> usize;
    fn visits(&self, node: usize) -> u64;
    fn children(&self, node: usize) -> Vec<(Move, usize)>;
    fn stats(&self, node: usize) -> SearchStats;
    /// The move the search itself would play from this node.
    fn best_move(&self, node: usize) -> Option<Move>;
    /// Score estimate biased toward the most-visited line.
    fn sharp_score(&self, node: usize) -> f64;
}

pub trait BookSearcher {
    type Tree: SearchTree;
    fn run(&mut self, request: SearchRequest) -> Self::Tree;
}
