//! Savings goals and their `locked -> active -> completed` lifecycle.
//!
//! Only one goal is active at a time. The planner here computes the whole
//! transition for a contribution so a backend can apply it in one step.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Locked,
    Active,
    Completed,
}

impl Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                GoalStatus::Locked => "locked",
                GoalStatus::Active => "active",
                GoalStatus::Completed => "completed",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    pub order_index: i32,
    pub status: GoalStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    /// Progress towards the target as a percentage clamped to `0..=100`.
    pub fn progress(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        ((self.current_amount / self.target_amount) * 100.0).clamp(0.0, 100.0)
    }

    pub fn remaining(&self) -> f64 {
        (self.target_amount - self.current_amount).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGoal {
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub order_index: i32,
    pub status: GoalStatus,
}

/// Result of a contribution: the updated goal and, when it completed, the
/// goal that became active after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalContribution {
    pub goal: Goal,
    #[serde(default)]
    pub unlocked: Option<Goal>,
}

impl GoalContribution {
    pub fn completed(&self) -> bool {
        self.goal.status == GoalStatus::Completed
    }
}

pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        bail!("Contribution must be a positive amount, got {amount}");
    }
    Ok(())
}

/// Computes the effect of contributing `amount` to the goal `goal_id`.
///
/// The goal must be active. When the new balance reaches the target the goal
/// is completed at `now`, and the locked goal with the lowest `order_index`
/// above it becomes active. Finding no such goal is not an error.
pub fn plan_contribution(
    goals: &[Goal],
    goal_id: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<GoalContribution> {
    validate_amount(amount)?;

    let goal = goals
        .iter()
        .find(|g| g.id == goal_id)
        .ok_or_else(|| anyhow!("Goal not found: {goal_id}"))?;
    if goal.status != GoalStatus::Active {
        bail!(
            "Goal '{}' is {} and cannot receive contributions",
            goal.name,
            goal.status
        );
    }

    let mut updated = goal.clone();
    updated.current_amount += amount;
    if updated.current_amount < updated.target_amount {
        return Ok(GoalContribution {
            goal: updated,
            unlocked: None,
        });
    }

    updated.status = GoalStatus::Completed;
    updated.completed_at = Some(now);

    let unlocked = goals
        .iter()
        .filter(|g| g.status == GoalStatus::Locked && g.order_index > goal.order_index)
        .min_by_key(|g| g.order_index)
        .map(|next| Goal {
            status: GoalStatus::Active,
            ..next.clone()
        });

    Ok(GoalContribution {
        goal: updated,
        unlocked,
    })
}

/// Builds the row for a new goal appended after the existing ones. It starts
/// active only when nothing else is active.
pub fn plan_new_goal(goals: &[Goal], name: &str, target_amount: f64) -> Result<NewGoal> {
    if name.trim().is_empty() {
        bail!("Goal name is required");
    }
    if !target_amount.is_finite() || target_amount <= 0.0 {
        bail!("Goal target must be a positive amount, got {target_amount}");
    }

    let order_index = match goals.iter().map(|g| g.order_index).max() {
        Some(last) => last
            .checked_add(1)
            .ok_or_else(|| anyhow!("No order index left after {last} for a new goal"))?,
        None => 0,
    };
    let has_active = goals.iter().any(|g| g.status == GoalStatus::Active);

    Ok(NewGoal {
        name: name.trim().to_string(),
        target_amount,
        current_amount: 0.0,
        order_index,
        status: if has_active {
            GoalStatus::Locked
        } else {
            GoalStatus::Active
        },
    })
}
