//! Goals, milestones, and the rows persisted around them.

use crate::region::Region;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub String);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GoalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Editor-local identifier of a goal that has never been saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub u64);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "draft-{}", self.0)
    }
}

/// Identity of a goal inside an editing session, saved or not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GoalKey {
    Draft(DraftId),
    Saved(GoalId),
}

impl fmt::Display for GoalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft(id) => id.fmt(f),
            Self::Saved(id) => id.fmt(f),
        }
    }
}

/// A goal as the region editor sees it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Goal {
    Unsaved {
        draft_id: DraftId,
        title: String,
        region: Region,
    },
    Persisted {
        id: GoalId,
        title: String,
        region: Region,
    },
}

impl Goal {
    pub fn key(&self) -> GoalKey {
        match self {
            Self::Unsaved { draft_id, .. } => GoalKey::Draft(*draft_id),
            Self::Persisted { id, .. } => GoalKey::Saved(id.clone()),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Unsaved { title, .. } | Self::Persisted { title, .. } => title,
        }
    }

    pub fn region(&self) -> &Region {
        match self {
            Self::Unsaved { region, .. } | Self::Persisted { region, .. } => region,
        }
    }

    pub fn region_mut(&mut self) -> &mut Region {
        match self {
            Self::Unsaved { region, .. } | Self::Persisted { region, .. } => region,
        }
    }

    pub fn persisted_id(&self) -> Option<&GoalId> {
        match self {
            Self::Persisted { id, .. } => Some(id),
            Self::Unsaved { .. } => None,
        }
    }
}

impl From<&GoalRecord> for Goal {
    fn from(record: &GoalRecord) -> Self {
        Self::Persisted {
            id: record.id.clone(),
            title: record.title.clone(),
            region: record.region,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VisionBoard {
    pub id: String,
    pub user_id: String,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

/// Stored goal row. Removal flips `is_active`; rows are never dropped so
/// snapshots keep pointing at something.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GoalRecord {
    pub id: GoalId,
    pub user_id: String,
    pub vision_board_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub region: Region,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when inserting a goal; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub vision_board_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Milestone {
    pub id: String,
    pub goal_id: GoalId,
    pub title: String,
    pub position: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Milestone {
    /// Flips completion, stamping or clearing `completed_at`.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.is_completed = !self.is_completed;
        self.completed_at = if self.is_completed { Some(now) } else { None };
    }
}

/// Progress level at which a snapshot is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SnapshotTier {
    Quarter,
    Half,
    ThreeQuarters,
    Complete,
}

impl SnapshotTier {
    pub const ALL: [SnapshotTier; 4] = [
        SnapshotTier::Quarter,
        SnapshotTier::Half,
        SnapshotTier::ThreeQuarters,
        SnapshotTier::Complete,
    ];

    pub fn percentage(self) -> u8 {
        match self {
            Self::Quarter => 25,
            Self::Half => 50,
            Self::ThreeQuarters => 75,
            Self::Complete => 100,
        }
    }

    pub fn badge(self) -> &'static str {
        match self.percentage() {
            p if p >= 100 => "Completed!",
            p if p >= 75 => "Almost Done",
            p if p >= 50 => "Halfway There",
            _ => "Getting Started",
        }
    }
}

impl TryFrom<u8> for SnapshotTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            25 => Ok(Self::Quarter),
            50 => Ok(Self::Half),
            75 => Ok(Self::ThreeQuarters),
            100 => Ok(Self::Complete),
            other => Err(format!("{other} is not a snapshot tier (25/50/75/100)")),
        }
    }
}

impl From<SnapshotTier> for u8 {
    fn from(tier: SnapshotTier) -> Self {
        tier.percentage()
    }
}

impl fmt::Display for SnapshotTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percentage())
    }
}

/// Immutable record of a goal reaching a tier; at most one per `(goal_id, tier)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgressSnapshot {
    pub id: String,
    pub goal_id: GoalId,
    pub user_id: String,
    pub milestone_percentage: SnapshotTier,
    pub total_milestones: u32,
    pub completed_milestones: u32,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckIn {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub mood: String,
    pub reflection: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tier_serializes_as_percentage() {
        let raw = serde_json::to_string(&SnapshotTier::ThreeQuarters).unwrap();
        assert_eq!(raw, "75");
        let back: SnapshotTier = serde_json::from_str("50").unwrap();
        assert_eq!(back, SnapshotTier::Half);
        assert!(serde_json::from_str::<SnapshotTier>("40").is_err());
    }

    #[test]
    fn toggle_stamps_and_clears_completion_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut m = Milestone {
            id: "m1".to_string(),
            goal_id: GoalId::from("g1"),
            title: "Run a 10K".to_string(),
            position: 0,
            is_completed: false,
            completed_at: None,
        };
        m.toggle(now);
        assert!(m.is_completed);
        assert_eq!(m.completed_at, Some(now));
        m.toggle(now);
        assert!(!m.is_completed);
        assert_eq!(m.completed_at, None);
    }

    #[test]
    fn goal_keys_distinguish_drafts_from_saved() {
        let region = Region::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let draft = Goal::Unsaved {
            draft_id: DraftId(1),
            title: "a".to_string(),
            region,
        };
        let saved = Goal::Persisted {
            id: GoalId::from("draft-1"),
            title: "a".to_string(),
            region,
        };
        assert_ne!(draft.key(), saved.key());
        assert_eq!(draft.persisted_id(), None);
        assert_eq!(saved.persisted_id(), Some(&GoalId::from("draft-1")));
    }

    #[test]
    fn badges_follow_tier() {
        assert_eq!(SnapshotTier::Complete.badge(), "Completed!");
        assert_eq!(SnapshotTier::Quarter.badge(), "Getting Started");
    }
}
