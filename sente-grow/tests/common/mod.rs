use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sente_core::eval::UniformEvaluator;
use sente_core::search::SearchSettings;
use sente_core::zero::ZeroSearcher;

use sente_grow::config::{BoardConfig, BookParamsConfig, GrowConfig, RunConfig, SearchConfig};

pub fn test_config(size: u8, threads: usize, expand_per_iteration: usize) -> GrowConfig {
    GrowConfig {
        board: BoardConfig {
            size,
            komi: 7.5,
            multi_stone_suicide: false,
            rep_bound: 3,
        },
        book: BookParamsConfig {
            error_factor: 1.0,
            cost_per_move: 0.5,
            cost_per_ucb_win_loss_loss: 3.0,
            cost_per_ucb_win_loss_loss_pow3: 1.0,
            cost_per_ucb_win_loss_loss_pow7: 0.5,
            cost_per_ucb_score_loss: 0.1,
            cost_per_log_policy: 0.1,
            cost_per_moves_expanded: 0.2,
            cost_per_squared_moves_expanded: 0.01,
            cost_when_pass_favored: 1.0,
            bonus_per_win_loss_error: 0.5,
            bonus_per_score_error: 0.05,
            bonus_per_sharp_score_discrepancy: 0.05,
            bonus_per_excess_unexpanded_policy: 1.0,
            bonus_for_wlpv1: 0.5,
            bonus_for_wlpv2: 0.25,
            bonus_for_biggest_wl_cost: 0.5,
            score_loss_cap: 10.0,
            utility_per_score: 0.1,
            policy_boost_soft_utility_scale: 1.0,
            utility_per_policy_for_sorting: 0.03,
            max_visits_for_re_expansion: 0.0,
            sharp_score_outlier_cap: 2.0,
        },
        search: SearchConfig {
            max_visits: 40,
            cpuct_exploration: 1.1,
            cpuct_exploration_log: 0.45,
            wide_root_noise: 0.04,
            fpu_loss: 0.2,
            wide_root_noise_book_explore: Some(0.25),
            cpuct_exploration_log_book_explore: Some(0.9),
        },
        run: RunConfig {
            num_game_threads: threads,
            num_to_expand_per_iteration: expand_per_iteration,
            min_tree_visits_to_record: 10,
            max_depth_to_record: 2,
            max_visits_for_leaves: 20,
            log_search_info: false,
            evaluator: "uniform".to_string(),
            seed: 12345,
        },
    }
}

pub fn make_searcher_factory(
    config: &GrowConfig,
    stop: Arc<AtomicBool>,
) -> impl Fn(u64) -> ZeroSearcher + Sync {
    let settings: SearchSettings = config.search_settings();
    move |seed| ZeroSearcher::new(settings, Arc::new(UniformEvaluator), seed, stop.clone())
}
