//! Run configuration. A single JSON file carries everything a run needs;
//! its raw text is echoed into the book's `.cfg` sidecar on every save so a
//! book always travels with the configuration that produced it.

use std::path::Path;

use board_game::games::go::{GoBoard, Komi, Rules};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sente_core::book::BookParams;
use sente_core::search::SearchSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub size: u8,
    pub komi: f32,
    #[serde(default)]
    pub multi_stone_suicide: bool,
    #[serde(default = "default_rep_bound")]
    pub rep_bound: u32,
}

fn default_rep_bound() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookParamsConfig {
    pub error_factor: f64,
    pub cost_per_move: f64,
    pub cost_per_ucb_win_loss_loss: f64,
    pub cost_per_ucb_win_loss_loss_pow3: f64,
    pub cost_per_ucb_win_loss_loss_pow7: f64,
    pub cost_per_ucb_score_loss: f64,
    pub cost_per_log_policy: f64,
    pub cost_per_moves_expanded: f64,
    pub cost_per_squared_moves_expanded: f64,
    pub cost_when_pass_favored: f64,
    pub bonus_per_win_loss_error: f64,
    pub bonus_per_score_error: f64,
    pub bonus_per_sharp_score_discrepancy: f64,
    pub bonus_per_excess_unexpanded_policy: f64,
    #[serde(default)]
    pub bonus_for_wlpv1: f64,
    #[serde(default)]
    pub bonus_for_wlpv2: f64,
    #[serde(default)]
    pub bonus_for_biggest_wl_cost: f64,
    pub score_loss_cap: f64,
    pub utility_per_score: f64,
    pub policy_boost_soft_utility_scale: f64,
    pub utility_per_policy_for_sorting: f64,
    #[serde(default)]
    pub max_visits_for_re_expansion: f64,
    pub sharp_score_outlier_cap: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_visits: u64,
    pub cpuct_exploration: f64,
    pub cpuct_exploration_log: f64,
    pub wide_root_noise: f64,
    #[serde(default = "default_fpu_loss")]
    pub fpu_loss: f64,
    /// Overrides applied to primary expansion searches only.
    pub wide_root_noise_book_explore: Option<f64>,
    pub cpuct_exploration_log_book_explore: Option<f64>,
}

fn default_fpu_loss() -> f64 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub num_game_threads: usize,
    pub num_to_expand_per_iteration: usize,
    pub min_tree_visits_to_record: u64,
    pub max_depth_to_record: u32,
    pub max_visits_for_leaves: u64,
    #[serde(default)]
    pub log_search_info: bool,
    #[serde(default = "default_evaluator")]
    pub evaluator: String,
    #[serde(default)]
    pub seed: u64,
}

fn default_evaluator() -> String {
    "uniform".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowConfig {
    pub board: BoardConfig,
    pub book: BookParamsConfig,
    pub search: SearchConfig,
    pub run: RunConfig,
}

impl GrowConfig {
    /// Load a config file, returning both the parsed config and the raw text
    /// for the sidecar.
    pub fn load(path: impl AsRef<Path>) -> Result<(GrowConfig, String), ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: GrowConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok((config, text))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=19).contains(&self.board.size) {
            return Err(ConfigError::Invalid(format!("board size {} out of range", self.board.size)));
        }
        if self.run.num_game_threads == 0 {
            return Err(ConfigError::Invalid("num_game_threads must be positive".to_string()));
        }
        if self.run.num_to_expand_per_iteration == 0 {
            return Err(ConfigError::Invalid(
                "num_to_expand_per_iteration must be positive".to_string(),
            ));
        }
        if self.run.max_depth_to_record == 0 {
            return Err(ConfigError::Invalid("max_depth_to_record must be positive".to_string()));
        }
        if self.search.max_visits == 0 || self.run.max_visits_for_leaves == 0 {
            return Err(ConfigError::Invalid("visit caps must be positive".to_string()));
        }
        Ok(())
    }

    pub fn initial_board(&self) -> Result<GoBoard, ConfigError> {
        let komi = Komi::try_from(self.board.komi)
            .map_err(|_| ConfigError::Invalid(format!("invalid komi {}", self.board.komi)))?;
        let rules = Rules {
            allow_multi_stone_suicide: self.board.multi_stone_suicide,
        };
        Ok(GoBoard::new(self.board.size, komi, rules))
    }

    pub fn book_params(&self) -> BookParams {
        let b = &self.book;
        BookParams {
            error_factor: b.error_factor,
            cost_per_move: b.cost_per_move,
            cost_per_ucb_win_loss_loss: b.cost_per_ucb_win_loss_loss,
            cost_per_ucb_win_loss_loss_pow3: b.cost_per_ucb_win_loss_loss_pow3,
            cost_per_ucb_win_loss_loss_pow7: b.cost_per_ucb_win_loss_loss_pow7,
            cost_per_ucb_score_loss: b.cost_per_ucb_score_loss,
            cost_per_log_policy: b.cost_per_log_policy,
            cost_per_moves_expanded: b.cost_per_moves_expanded,
            cost_per_squared_moves_expanded: b.cost_per_squared_moves_expanded,
            cost_when_pass_favored: b.cost_when_pass_favored,
            bonus_per_win_loss_error: b.bonus_per_win_loss_error,
            bonus_per_score_error: b.bonus_per_score_error,
            bonus_per_sharp_score_discrepancy: b.bonus_per_sharp_score_discrepancy,
            bonus_per_excess_unexpanded_policy: b.bonus_per_excess_unexpanded_policy,
            bonus_for_wlpv1: b.bonus_for_wlpv1,
            bonus_for_wlpv2: b.bonus_for_wlpv2,
            bonus_for_biggest_wl_cost: b.bonus_for_biggest_wl_cost,
            score_loss_cap: b.score_loss_cap,
            utility_per_score: b.utility_per_score,
            policy_boost_soft_utility_scale: b.policy_boost_soft_utility_scale,
            utility_per_policy_for_sorting: b.utility_per_policy_for_sorting,
            max_visits_for_re_expansion: b.max_visits_for_re_expansion,
            sharp_score_outlier_cap: b.sharp_score_outlier_cap,
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            max_visits: self.search.max_visits,
            cpuct_exploration: self.search.cpuct_exploration,
            cpuct_exploration_log: self.search.cpuct_exploration_log,
            wide_root_noise: self.search.wide_root_noise,
            fpu_loss: self.search.fpu_loss,
        }
    }

    /// Wide root noise for primary expansion searches.
    pub fn wide_root_noise_explore(&self) -> f64 {
        self.search
            .wide_root_noise_book_explore
            .unwrap_or(self.search.wide_root_noise)
    }

    /// Log-exploration constant for primary expansion searches.
    pub fn cpuct_exploration_log_explore(&self) -> f64 {
        self.search
            .cpuct_exploration_log_book_explore
            .unwrap_or(self.search.cpuct_exploration_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config_json(size: u8, threads: usize) -> String {
        format!(
            r#"{{
  "board": {{ "size": {size}, "komi": 7.5 }},
  "book": {{
    "error_factor": 1.0,
    "cost_per_move": 0.5,
    "cost_per_ucb_win_loss_loss": 3.0,
    "cost_per_ucb_win_loss_loss_pow3": 1.0,
    "cost_per_ucb_win_loss_loss_pow7": 0.5,
    "cost_per_ucb_score_loss": 0.1,
    "cost_per_log_policy": 0.1,
    "cost_per_moves_expanded": 0.2,
    "cost_per_squared_moves_expanded": 0.01,
    "cost_when_pass_favored": 1.0,
    "bonus_per_win_loss_error": 0.5,
    "bonus_per_score_error": 0.05,
    "bonus_per_sharp_score_discrepancy": 0.05,
    "bonus_per_excess_unexpanded_policy": 1.0,
    "bonus_for_wlpv1": 0.5,
    "bonus_for_wlpv2": 0.25,
    "bonus_for_biggest_wl_cost": 0.5,
    "score_loss_cap": 10.0,
    "utility_per_score": 0.1,
    "policy_boost_soft_utility_scale": 1.0,
    "utility_per_policy_for_sorting": 0.03,
    "sharp_score_outlier_cap": 2.0
  }},
  "search": {{
    "max_visits": 40,
    "cpuct_exploration": 1.1,
    "cpuct_exploration_log": 0.45,
    "wide_root_noise": 0.04,
    "wide_root_noise_book_explore": 0.25,
    "cpuct_exploration_log_book_explore": 0.9
  }},
  "run": {{
    "num_game_threads": {threads},
    "num_to_expand_per_iteration": 2,
    "min_tree_visits_to_record": 10,
    "max_depth_to_record": 2,
    "max_visits_for_leaves": 20,
    "seed": 12345
  }}
}}"#
        )
    }

    #[test]
    fn parse_and_validate() {
        let text = test_config_json(9, 1);
        let config: GrowConfig = serde_json::from_str(&text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.board.size, 9);
        assert_eq!(config.board.rep_bound, 3);
        assert_eq!(config.wide_root_noise_explore(), 0.25);
        assert_eq!(config.book_params().cost_per_move, 0.5);
        assert!(config.initial_board().is_ok());
    }

    #[test]
    fn invalid_threads_rejected() {
        let text = test_config_json(9, 1).replace("\"num_game_threads\": 1", "\"num_game_threads\": 0");
        let config: GrowConfig = serde_json::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }
}
