use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::eval::Evaluator;
use crate::go::MoveIndex;
use crate::search::{BookSearcher, SearchRequest, SearchSettings};
use crate::zero::step::{zero_step, StepContext};
use crate::zero::tree::ZeroTree;

/// One worker's search handle. Runs until the requested visit cap or until
/// the shared stop flag is raised; a stopped search returns its partial tree
/// and the caller is expected to discard it.
#[derive(Debug)]
pub struct ZeroSearcher {
    settings: SearchSettings,
    evaluator: Arc<dyn Evaluator>,
    rng: StdRng,
    stop: Arc<AtomicBool>,
}

impl ZeroSearcher {
    pub fn new(settings: SearchSettings, evaluator: Arc<dyn Evaluator>, seed: u64, stop: Arc<AtomicBool>) -> Self {
        ZeroSearcher {
            settings,
            evaluator,
            rng: StdRng::seed_from_u64(seed),
            stop,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }
}

impl BookSearcher for ZeroSearcher {
    type Tree = ZeroTree;

    fn run(&mut self, request: SearchRequest) -> ZeroTree {
        let mut tree = ZeroTree::new(request.board.clone());
        let ctx = StepContext {
            move_index: MoveIndex::new(request.board.size()),
            avoid: request.avoid,
            symmetries: request.symmetries,
            cpuct_exploration: self.settings.cpuct_exploration,
            cpuct_exploration_log: request.cpuct_exploration_log,
            cpuct_scale: request.cpuct_scale,
            wide_root_noise: request.wide_root_noise,
            fpu_loss: self.settings.fpu_loss,
        };

        while tree.root_visits() < request.max_visits {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            if !zero_step(&mut tree, &ctx, self.evaluator.as_ref(), &mut self.rng) {
                break;
            }
        }

        tree
    }
}
