//! Row storage for boards, goals, milestones, snapshots and check-ins.
//!
//! [`Datastore`] is the seam the rest of the crate talks to. Every call
//! carries an explicit [`Session`]; rows belonging to another user are
//! invisible. [`JsonStore`] keeps all tables in one pretty-printed JSON
//! document and rewrites it after each mutation.

use crate::error::{Error, Result};
use crate::goal::{
    CheckIn, GoalId, GoalRecord, Milestone, NewGoal, ProgressSnapshot, SnapshotTier, VisionBoard,
};
use crate::region::Region;
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::NotAuthenticated);
        }
        Ok(Self {
            user_id: user_id.trim().to_string(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Snapshot fields supplied by the caller; id and timestamp come from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub goal_id: GoalId,
    pub tier: SnapshotTier,
    pub total_milestones: u32,
    pub completed_milestones: u32,
}

pub trait Datastore {
    fn create_board(&mut self, session: &Session, image_path: &str) -> Result<VisionBoard>;

    /// Most recently created board of the session user.
    fn current_board(&self, session: &Session) -> Result<Option<VisionBoard>>;

    fn insert_goals(&mut self, session: &Session, goals: &[NewGoal]) -> Result<Vec<GoalRecord>>;

    fn update_goal_region(&mut self, session: &Session, id: &GoalId, region: Region) -> Result<()>;

    /// Marks goals inactive. Returns how many rows changed.
    fn soft_delete_goals(&mut self, session: &Session, ids: &[GoalId]) -> Result<usize>;

    fn goal(&self, session: &Session, id: &GoalId) -> Result<GoalRecord>;

    /// Active goals of a board in creation order.
    fn active_goals(&self, session: &Session, vision_board_id: &str) -> Result<Vec<GoalRecord>>;

    /// Milestones of a goal ordered by position.
    fn milestones(&self, session: &Session, goal_id: &GoalId) -> Result<Vec<Milestone>>;

    fn milestone(&self, session: &Session, id: &str) -> Result<Milestone>;

    fn insert_milestone(
        &mut self,
        session: &Session,
        goal_id: &GoalId,
        title: &str,
        position: u32,
    ) -> Result<Milestone>;

    fn update_milestone(&mut self, session: &Session, milestone: &Milestone) -> Result<()>;

    fn find_snapshot(
        &self,
        session: &Session,
        goal_id: &GoalId,
        tier: SnapshotTier,
    ) -> Result<Option<ProgressSnapshot>>;

    fn insert_snapshot(&mut self, session: &Session, snapshot: NewSnapshot)
        -> Result<ProgressSnapshot>;

    /// Snapshots of the session user, newest first.
    fn snapshots(&self, session: &Session) -> Result<Vec<ProgressSnapshot>>;

    fn checkin_on(&self, session: &Session, date: NaiveDate) -> Result<Option<CheckIn>>;

    fn insert_checkin(
        &mut self,
        session: &Session,
        date: NaiveDate,
        mood: &str,
        reflection: Option<&str>,
    ) -> Result<CheckIn>;

    /// Distinct check-in dates of the session user, newest first.
    fn checkin_dates(&self, session: &Session) -> Result<Vec<NaiveDate>>;
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
struct Tables {
    #[serde(default)]
    seq: u64,
    #[serde(default)]
    vision_boards: Vec<VisionBoard>,
    #[serde(default)]
    goals: Vec<GoalRecord>,
    #[serde(default)]
    milestones: Vec<Milestone>,
    #[serde(default)]
    progress_snapshots: Vec<ProgressSnapshot>,
    #[serde(default)]
    check_ins: Vec<CheckIn>,
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: Option<PathBuf>,
    tables: Tables,
}

impl JsonStore {
    /// Opens (or starts) the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|err| {
                Error::transport(format!("failed to read store {}: {err}", path.display()))
            })?;
            serde_json::from_str(&raw).map_err(|err| {
                Error::transport(format!("invalid store JSON {}: {err}", path.display()))
            })?
        } else {
            Tables::default()
        };
        Ok(Self {
            path: Some(path),
            tables,
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: Tables::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.tables.seq += 1;
        format!("{prefix}-{:06}", self.tables.seq)
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    Error::transport(format!(
                        "failed to create store directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.tables)?;
        fs::write(path, raw).map_err(|err| {
            Error::transport(format!("failed to write store {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "store flushed");
        Ok(())
    }

    fn owned_goal(&self, session: &Session, id: &GoalId) -> Result<&GoalRecord> {
        self.tables
            .goals
            .iter()
            .find(|g| &g.id == id && g.user_id == session.user_id())
            .ok_or_else(|| Error::not_found("goal", id.to_string()))
    }

    fn owned_goal_mut(&mut self, session: &Session, id: &GoalId) -> Result<&mut GoalRecord> {
        self.tables
            .goals
            .iter_mut()
            .find(|g| &g.id == id && g.user_id == session.user_id())
            .ok_or_else(|| Error::not_found("goal", id.to_string()))
    }

    fn owns_goal(&self, session: &Session, id: &GoalId) -> bool {
        self.owned_goal(session, id).is_ok()
    }

    /// Soft-deleted goals stay readable but take no new milestones or snapshots.
    fn owns_active_goal(&self, session: &Session, id: &GoalId) -> bool {
        self.owned_goal(session, id).is_ok_and(|g| g.is_active)
    }
}

impl Datastore for JsonStore {
    fn create_board(&mut self, session: &Session, image_path: &str) -> Result<VisionBoard> {
        if image_path.trim().is_empty() {
            return Err(Error::validation("vision board image path is empty"));
        }
        let board = VisionBoard {
            id: self.next_id("board"),
            user_id: session.user_id().to_string(),
            image_path: image_path.to_string(),
            created_at: Utc::now(),
        };
        self.tables.vision_boards.push(board.clone());
        self.flush()?;
        Ok(board)
    }

    fn current_board(&self, session: &Session) -> Result<Option<VisionBoard>> {
        // max_by_key keeps the last maximum, so later rows win ties.
        Ok(self
            .tables
            .vision_boards
            .iter()
            .filter(|b| b.user_id == session.user_id())
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    fn insert_goals(&mut self, session: &Session, goals: &[NewGoal]) -> Result<Vec<GoalRecord>> {
        for goal in goals {
            if goal.title.trim().is_empty() {
                return Err(Error::validation("Goal title cannot be empty"));
            }
            goal.region.validate()?;
            let owns_board = self
                .tables
                .vision_boards
                .iter()
                .any(|b| b.id == goal.vision_board_id && b.user_id == session.user_id());
            if !owns_board {
                return Err(Error::not_found("vision board", goal.vision_board_id.clone()));
            }
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(goals.len());
        for goal in goals {
            let record = GoalRecord {
                id: GoalId(self.next_id("goal")),
                user_id: session.user_id().to_string(),
                vision_board_id: goal.vision_board_id.clone(),
                title: goal.title.trim().to_string(),
                description: goal.description.clone(),
                category: goal.category.clone(),
                region: goal.region,
                is_active: true,
                created_at: now,
            };
            self.tables.goals.push(record.clone());
            created.push(record);
        }
        self.flush()?;
        Ok(created)
    }

    fn update_goal_region(&mut self, session: &Session, id: &GoalId, region: Region) -> Result<()> {
        region.validate()?;
        self.owned_goal_mut(session, id)?.region = region;
        self.flush()
    }

    fn soft_delete_goals(&mut self, session: &Session, ids: &[GoalId]) -> Result<usize> {
        let mut changed = 0usize;
        for goal in self.tables.goals.iter_mut() {
            if goal.user_id == session.user_id() && goal.is_active && ids.contains(&goal.id) {
                goal.is_active = false;
                changed += 1;
            }
        }
        self.flush()?;
        Ok(changed)
    }

    fn goal(&self, session: &Session, id: &GoalId) -> Result<GoalRecord> {
        self.owned_goal(session, id).cloned()
    }

    fn active_goals(&self, session: &Session, vision_board_id: &str) -> Result<Vec<GoalRecord>> {
        Ok(self
            .tables
            .goals
            .iter()
            .filter(|g| {
                g.user_id == session.user_id() && g.vision_board_id == vision_board_id && g.is_active
            })
            .cloned()
            .collect())
    }

    fn milestones(&self, session: &Session, goal_id: &GoalId) -> Result<Vec<Milestone>> {
        if !self.owns_goal(session, goal_id) {
            return Err(Error::not_found("goal", goal_id.to_string()));
        }
        let mut rows: Vec<Milestone> = self
            .tables
            .milestones
            .iter()
            .filter(|m| &m.goal_id == goal_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.position);
        Ok(rows)
    }

    fn milestone(&self, session: &Session, id: &str) -> Result<Milestone> {
        self.tables
            .milestones
            .iter()
            .find(|m| m.id == id && self.owns_goal(session, &m.goal_id))
            .cloned()
            .ok_or_else(|| Error::not_found("milestone", id))
    }

    fn insert_milestone(
        &mut self,
        session: &Session,
        goal_id: &GoalId,
        title: &str,
        position: u32,
    ) -> Result<Milestone> {
        if !self.owns_active_goal(session, goal_id) {
            return Err(Error::not_found("goal", goal_id.to_string()));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation("Milestone title cannot be empty"));
        }
        let milestone = Milestone {
            id: self.next_id("milestone"),
            goal_id: goal_id.clone(),
            title: title.to_string(),
            position,
            is_completed: false,
            completed_at: None,
        };
        self.tables.milestones.push(milestone.clone());
        self.flush()?;
        Ok(milestone)
    }

    fn update_milestone(&mut self, session: &Session, milestone: &Milestone) -> Result<()> {
        if !self.owns_active_goal(session, &milestone.goal_id) {
            return Err(Error::not_found("goal", milestone.goal_id.to_string()));
        }
        let row = self
            .tables
            .milestones
            .iter_mut()
            .find(|m| m.id == milestone.id)
            .ok_or_else(|| Error::not_found("milestone", milestone.id.clone()))?;
        row.title = milestone.title.clone();
        row.position = milestone.position;
        row.is_completed = milestone.is_completed;
        row.completed_at = milestone.completed_at;
        self.flush()
    }

    fn find_snapshot(
        &self,
        session: &Session,
        goal_id: &GoalId,
        tier: SnapshotTier,
    ) -> Result<Option<ProgressSnapshot>> {
        Ok(self
            .tables
            .progress_snapshots
            .iter()
            .find(|s| {
                &s.goal_id == goal_id
                    && s.milestone_percentage == tier
                    && s.user_id == session.user_id()
            })
            .cloned())
    }

    fn insert_snapshot(
        &mut self,
        session: &Session,
        snapshot: NewSnapshot,
    ) -> Result<ProgressSnapshot> {
        if !self.owns_active_goal(session, &snapshot.goal_id) {
            return Err(Error::not_found("goal", snapshot.goal_id.to_string()));
        }
        let row = ProgressSnapshot {
            id: self.next_id("snapshot"),
            goal_id: snapshot.goal_id,
            user_id: session.user_id().to_string(),
            milestone_percentage: snapshot.tier,
            total_milestones: snapshot.total_milestones,
            completed_milestones: snapshot.completed_milestones,
            captured_at: Utc::now(),
        };
        self.tables.progress_snapshots.push(row.clone());
        self.flush()?;
        Ok(row)
    }

    fn snapshots(&self, session: &Session) -> Result<Vec<ProgressSnapshot>> {
        let mut rows: Vec<ProgressSnapshot> = self
            .tables
            .progress_snapshots
            .iter()
            .filter(|s| s.user_id == session.user_id())
            .cloned()
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(rows)
    }

    fn checkin_on(&self, session: &Session, date: NaiveDate) -> Result<Option<CheckIn>> {
        Ok(self
            .tables
            .check_ins
            .iter()
            .find(|c| c.user_id == session.user_id() && c.date == date)
            .cloned())
    }

    fn insert_checkin(
        &mut self,
        session: &Session,
        date: NaiveDate,
        mood: &str,
        reflection: Option<&str>,
    ) -> Result<CheckIn> {
        let row = CheckIn {
            id: self.next_id("checkin"),
            user_id: session.user_id().to_string(),
            date,
            mood: mood.to_string(),
            reflection: reflection
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(ToString::to_string),
            created_at: Utc::now(),
        };
        self.tables.check_ins.push(row.clone());
        self.flush()?;
        Ok(row)
    }

    fn checkin_dates(&self, session: &Session) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .tables
            .check_ins
            .iter()
            .filter(|c| c.user_id == session.user_id())
            .map(|c| c.date)
            .collect();
        dates.sort_by(|a, b| b.cmp(a));
        dates.dedup();
        Ok(dates)
    }
}
