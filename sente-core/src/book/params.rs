//! The cost/bonus scalars that shape leaf selection. These are persisted in
//! the book header and must match between runs unless the caller explicitly
//! allows changing them.

use crate::book::error::BookError;

#[derive(Debug, Clone, PartialEq)]
pub struct BookParams {
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
    pub bonus_for_wlpv1: f64,
    pub bonus_for_wlpv2: f64,
    pub bonus_for_biggest_wl_cost: f64,
    pub score_loss_cap: f64,
    pub utility_per_score: f64,
    pub policy_boost_soft_utility_scale: f64,
    pub utility_per_policy_for_sorting: f64,
    pub max_visits_for_re_expansion: f64,
    pub sharp_score_outlier_cap: f64,
}

impl BookParams {
    /// Field order used by persistence and by [Self::reconcile]. Names match
    /// the run-config keys.
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "error_factor",
        "cost_per_move",
        "cost_per_ucb_win_loss_loss",
        "cost_per_ucb_win_loss_loss_pow3",
        "cost_per_ucb_win_loss_loss_pow7",
        "cost_per_ucb_score_loss",
        "cost_per_log_policy",
        "cost_per_moves_expanded",
        "cost_per_squared_moves_expanded",
        "cost_when_pass_favored",
        "bonus_per_win_loss_error",
        "bonus_per_score_error",
        "bonus_per_sharp_score_discrepancy",
        "bonus_per_excess_unexpanded_policy",
        "bonus_for_wlpv1",
        "bonus_for_wlpv2",
        "bonus_for_biggest_wl_cost",
        "score_loss_cap",
        "utility_per_score",
        "policy_boost_soft_utility_scale",
        "utility_per_policy_for_sorting",
        "max_visits_for_re_expansion",
        "sharp_score_outlier_cap",
    ];

    pub fn to_array(&self) -> [f64; 23] {
        [
            self.error_factor,
            self.cost_per_move,
            self.cost_per_ucb_win_loss_loss,
            self.cost_per_ucb_win_loss_loss_pow3,
            self.cost_per_ucb_win_loss_loss_pow7,
            self.cost_per_ucb_score_loss,
            self.cost_per_log_policy,
            self.cost_per_moves_expanded,
            self.cost_per_squared_moves_expanded,
            self.cost_when_pass_favored,
            self.bonus_per_win_loss_error,
            self.bonus_per_score_error,
            self.bonus_per_sharp_score_discrepancy,
            self.bonus_per_excess_unexpanded_policy,
            self.bonus_for_wlpv1,
            self.bonus_for_wlpv2,
            self.bonus_for_biggest_wl_cost,
            self.score_loss_cap,
            self.utility_per_score,
            self.policy_boost_soft_utility_scale,
            self.utility_per_policy_for_sorting,
            self.max_visits_for_re_expansion,
            self.sharp_score_outlier_cap,
        ]
    }

    pub fn from_array(values: [f64; 23]) -> BookParams {
        BookParams {
            error_factor: values[0],
            cost_per_move: values[1],
            cost_per_ucb_win_loss_loss: values[2],
            cost_per_ucb_win_loss_loss_pow3: values[3],
            cost_per_ucb_win_loss_loss_pow7: values[4],
            cost_per_ucb_score_loss: values[5],
            cost_per_log_policy: values[6],
            cost_per_moves_expanded: values[7],
            cost_per_squared_moves_expanded: values[8],
            cost_when_pass_favored: values[9],
            bonus_per_win_loss_error: values[10],
            bonus_per_score_error: values[11],
            bonus_per_sharp_score_discrepancy: values[12],
            bonus_per_excess_unexpanded_policy: values[13],
            bonus_for_wlpv1: values[14],
            bonus_for_wlpv2: values[15],
            bonus_for_biggest_wl_cost: values[16],
            score_loss_cap: values[17],
            utility_per_score: values[18],
            policy_boost_soft_utility_scale: values[19],
            utility_per_policy_for_sorting: values[20],
            max_visits_for_re_expansion: values[21],
            sharp_score_outlier_cap: values[22],
        }
    }

    /// Compare against the caller's intended parameters. If `allow_changing`,
    /// adopt every differing value and return a description per change;
    /// otherwise any difference is a [BookError::ConfigMismatch].
    pub fn reconcile(&mut self, wanted: &BookParams, allow_changing: bool) -> Result<Vec<String>, BookError> {
        let current = self.to_array();
        let target = wanted.to_array();

        let mut changes = vec![];
        for ((&name, &old), &new) in Self::FIELD_NAMES.iter().zip(current.iter()).zip(target.iter()) {
            if old != new {
                if !allow_changing {
                    return Err(BookError::ConfigMismatch {
                        param: name,
                        book: old,
                        wanted: new,
                    });
                }
                changes.push(format!("Changing {} from {} to {}", name, old, new));
            }
        }

        if !changes.is_empty() {
            *self = wanted.clone();
        }
        Ok(changes)
    }
}

impl Default for BookParams {
    fn default() -> Self {
        BookParams {
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
        }
    }
}
