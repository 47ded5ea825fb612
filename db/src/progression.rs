//! EXP and level rules.
//!
//! Every 100 EXP is worth one level on top of level 1. A credit may only raise
//! a level, a debit may only lower it, and neither EXP nor level ever leaves
//! its floor (0 and 1 respectively).

use chrono::{DateTime, Utc};

use crate::models::user;

pub const EXP_PER_LEVEL: i64 = 100;

/// `floor(exp / 100) + 1`, with negative balances treated as 0.
pub fn level_for_exp(exp: i64) -> i32 {
    let level = exp.max(0) / EXP_PER_LEVEL + 1;
    i32::try_from(level).unwrap_or(i32::MAX)
}

/// Outcome of removing a penalty from a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Debit {
    pub profile: user::Model,
    /// What was actually taken, capped at the previous balance.
    pub exp_lost: i64,
}

/// Returns the profile after receiving `reward` EXP from a check-in at `at`.
pub fn credit(profile: &user::Model, reward: i64, at: DateTime<Utc>) -> user::Model {
    let exp = profile.exp.max(0).saturating_add(reward.max(0));
    user::Model {
        exp,
        level: profile.level.max(level_for_exp(exp)),
        total_check_ins: profile.total_check_ins.saturating_add(1),
        last_check_in: Some(at),
        updated_at: at,
        ..profile.clone()
    }
}

/// Returns the profile after losing up to `penalty` EXP for a missed session at `at`.
pub fn debit(profile: &user::Model, penalty: i64, at: DateTime<Utc>) -> Debit {
    let balance = profile.exp.max(0);
    let exp_lost = balance.min(penalty.max(0));
    let exp = balance - exp_lost;
    Debit {
        profile: user::Model {
            exp,
            level: profile.level.min(level_for_exp(exp)).max(1),
            total_penalties: profile.total_penalties.saturating_add(1),
            last_penalty: Some(at),
            updated_at: at,
            ..profile.clone()
        },
        exp_lost,
    }
}
