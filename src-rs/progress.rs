//! Goal progress, check-in streaks, and snapshot capture.

use crate::error::{Error, Result};
use crate::goal::{CheckIn, GoalId, Milestone, ProgressSnapshot, SnapshotTier};
use crate::store::{Datastore, NewSnapshot, Session};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

/// Percentage of completed milestones, rounded half up. No milestones is 0%.
pub fn progress_of(milestones: &[Milestone]) -> u8 {
    let completed = milestones.iter().filter(|m| m.is_completed).count();
    progress_from_counts(completed, milestones.len())
}

pub fn progress_from_counts(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed.min(total) as f64 / total as f64 * 100.0).round();
    pct as u8
}

/// Length of the run of consecutive days ending at the most recent check-in,
/// provided that check-in was `today` or the day before. Input order and
/// duplicates don't matter.
pub fn streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut days = dates.to_vec();
    days.sort_by(|a, b| b.cmp(a));
    days.dedup();

    let Some(&latest) = days.first() else {
        return 0;
    };
    if latest != today && Some(latest) != today.pred_opt() {
        return 0;
    }

    let mut expected = Some(latest);
    let mut run = 0u32;
    for day in days {
        if Some(day) != expected {
            break;
        }
        run += 1;
        expected = day.pred_opt();
    }
    run
}

/// Buckets a progress percentage into the tier it should be captured at.
/// The bands overlap the nominal tiers unevenly (36 hits nothing, 20 is
/// already a quarter); they are kept exactly as observed.
pub fn snapshot_tier(progress: u8) -> Option<SnapshotTier> {
    match progress {
        20..=35 => Some(SnapshotTier::Quarter),
        45..=60 => Some(SnapshotTier::Half),
        70..=85 => Some(SnapshotTier::ThreeQuarters),
        100 => Some(SnapshotTier::Complete),
        _ => None,
    }
}

/// Inserts a snapshot for `(goal_id, tier)` unless one exists. Returns the new
/// row, or `None` when the tier was already captured.
pub fn capture_snapshot<S: Datastore + ?Sized>(
    store: &mut S,
    session: &Session,
    goal_id: &GoalId,
    tier: SnapshotTier,
    milestones: &[Milestone],
) -> Result<Option<ProgressSnapshot>> {
    if store.find_snapshot(session, goal_id, tier)?.is_some() {
        return Ok(None);
    }
    let completed = milestones.iter().filter(|m| m.is_completed).count();
    let snapshot = store.insert_snapshot(
        session,
        NewSnapshot {
            goal_id: goal_id.clone(),
            tier,
            total_milestones: milestones.len() as u32,
            completed_milestones: completed as u32,
        },
    )?;
    info!(goal = %goal_id, %tier, "progress snapshot captured");
    Ok(Some(snapshot))
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ToggleOutcome {
    pub milestone: Milestone,
    pub progress: u8,
    pub snapshot: Option<ProgressSnapshot>,
}

/// Flips a milestone, recomputes its goal's progress and captures the
/// matching snapshot tier if it is new. A failed capture is logged and does
/// not undo the toggle.
pub fn toggle_milestone<S: Datastore + ?Sized>(
    store: &mut S,
    session: &Session,
    milestone_id: &str,
    now: DateTime<Utc>,
) -> Result<ToggleOutcome> {
    let mut milestone = store.milestone(session, milestone_id)?;
    milestone.toggle(now);
    store.update_milestone(session, &milestone)?;

    let milestones = store.milestones(session, &milestone.goal_id)?;
    let progress = progress_of(&milestones);

    let snapshot = match snapshot_tier(progress) {
        Some(tier) => {
            match capture_snapshot(store, session, &milestone.goal_id, tier, &milestones) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(goal = %milestone.goal_id, error = %err, "snapshot capture failed");
                    None
                }
            }
        }
        None => None,
    };

    Ok(ToggleOutcome {
        milestone,
        progress,
        snapshot,
    })
}

/// Appends a milestone after the goal's existing ones.
pub fn add_milestone<S: Datastore + ?Sized>(
    store: &mut S,
    session: &Session,
    goal_id: &GoalId,
    title: &str,
) -> Result<Milestone> {
    let position = store.milestones(session, goal_id)?.len() as u32;
    store.insert_milestone(session, goal_id, title, position)
}

pub fn goal_progress<S: Datastore + ?Sized>(
    store: &S,
    session: &Session,
    goal_id: &GoalId,
) -> Result<u8> {
    Ok(progress_of(&store.milestones(session, goal_id)?))
}

/// Records today's check-in; only one per day.
pub fn check_in<S: Datastore + ?Sized>(
    store: &mut S,
    session: &Session,
    today: NaiveDate,
    mood: &str,
    reflection: Option<&str>,
) -> Result<CheckIn> {
    let mood = mood.trim();
    if mood.is_empty() {
        return Err(Error::validation("Pick a mood to check in"));
    }
    if store.checkin_on(session, today)?.is_some() {
        return Err(Error::validation("You have already checked in today"));
    }
    store.insert_checkin(session, today, mood, reflection)
}

pub fn current_streak<S: Datastore + ?Sized>(
    store: &S,
    session: &Session,
    today: NaiveDate,
) -> Result<u32> {
    Ok(streak(&store.checkin_dates(session)?, today))
}
