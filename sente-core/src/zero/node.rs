use board_game::board::Player;
use board_game::games::go::Move;

use crate::book::values::pov;
use crate::zero::range::IdxRange;
use crate::zero::values::SearchValues;

#[derive(Debug, Clone)]
pub struct Node {
    /// The parent node. `None` only for the root.
    pub parent: Option<usize>,
    /// The move just made to get here, in the root frame. `None` only for
    /// the root.
    pub last_move: Option<Move>,
    /// `None` until the node has been evaluated.
    pub children: Option<IdxRange>,

    pub visits: u64,
    /// Sum of backed-up values; divide by `visits` for the mean.
    pub sum: SearchValues,
    /// Prior probability assigned by the parent's evaluation.
    pub net_policy: f32,
}

impl Node {
    pub fn new(parent: Option<usize>, last_move: Option<Move>, net_policy: f32) -> Node {
        Node {
            parent,
            last_move,
            children: None,
            visits: 0,
            sum: SearchValues::default(),
            net_policy,
        }
    }

    pub fn mean(&self) -> SearchValues {
        self.sum / self.visits as f64
    }

    /// PUCT selection value from `player`'s point of view.
    pub fn uct(&self, player: Player, parent_visits: u64, parent_mean_wl: f64, cpuct: f64, fpu_loss: f64) -> f64 {
        let q = if self.visits == 0 {
            pov(player, parent_mean_wl) - fpu_loss
        } else {
            pov(player, self.mean().win_loss)
        };
        let u = cpuct * self.net_policy as f64 * (parent_visits as f64).sqrt() / (1 + self.visits) as f64;
        q + u
    }
}
