//! The data accumulated along search paths. Everything is absolute, positive
//! favoring the first player, so backup needs no per-ply flipping.

use crate::eval::NetEvaluation;

#[derive(Debug, Copy, Clone, Default)]
pub struct SearchValues {
    pub win_loss: f64,
    pub score: f64,
    pub score_sq: f64,
    pub win_loss_error: f64,
    pub score_error: f64,
}

impl SearchValues {
    pub fn from_net(eval: &NetEvaluation) -> SearchValues {
        let score = eval.score_mean as f64;
        let stdev = eval.score_stdev as f64;
        SearchValues {
            win_loss: eval.win_loss as f64,
            score,
            score_sq: score * score + stdev * stdev,
            win_loss_error: eval.win_loss_error as f64,
            score_error: eval.score_error as f64,
        }
    }

    pub fn from_terminal(score_diff: f64) -> SearchValues {
        let win_loss = if score_diff > 0.0 {
            1.0
        } else if score_diff < 0.0 {
            -1.0
        } else {
            0.0
        };
        SearchValues {
            win_loss,
            score: score_diff,
            score_sq: score_diff * score_diff,
            win_loss_error: 0.0,
            score_error: 0.0,
        }
    }
}

impl std::ops::Add<Self> for SearchValues {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        SearchValues {
            win_loss: self.win_loss + rhs.win_loss,
            score: self.score + rhs.score,
            score_sq: self.score_sq + rhs.score_sq,
            win_loss_error: self.win_loss_error + rhs.win_loss_error,
            score_error: self.score_error + rhs.score_error,
        }
    }
}

impl std::ops::AddAssign<Self> for SearchValues {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs
    }
}

impl std::ops::Div<f64> for SearchValues {
    type Output = SearchValues;

    fn div(self, rhs: f64) -> Self::Output {
        SearchValues {
            win_loss: self.win_loss / rhs,
            score: self.score / rhs,
            score_sq: self.score_sq / rhs,
            win_loss_error: self.win_loss_error / rhs,
            score_error: self.score_error / rhs,
        }
    }
}
