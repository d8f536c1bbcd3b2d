//! Persisting an editing session: a three-way diff between the last saved
//! state and the editor's current goal list.

use crate::editor::RegionEditor;
use crate::error::Result;
use crate::goal::{DraftId, Goal, GoalId, NewGoal};
use crate::region::Region;
use crate::store::{Datastore, Session};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SavePlan {
    /// Drafts drawn since the last save.
    pub inserts: Vec<(DraftId, String, Region)>,
    /// Persisted goals whose region changed.
    pub updates: Vec<(GoalId, Region)>,
    /// Persisted goals no longer in the list.
    pub soft_deletes: Vec<GoalId>,
}

impl SavePlan {
    pub fn diff(baseline: &[(GoalId, Region)], goals: &[Goal]) -> Self {
        let mut plan = Self::default();

        for goal in goals {
            match goal {
                Goal::Unsaved {
                    draft_id,
                    title,
                    region,
                } => plan.inserts.push((*draft_id, title.clone(), *region)),
                Goal::Persisted { id, region, .. } => {
                    let before = baseline.iter().find(|(saved, _)| saved == id);
                    if before.map(|(_, r)| r) != Some(region) {
                        plan.updates.push((id.clone(), *region));
                    }
                }
            }
        }

        for (id, _) in baseline {
            if !goals.iter().any(|g| g.persisted_id() == Some(id)) {
                plan.soft_deletes.push(id.clone());
            }
        }

        plan
    }

    pub fn of(editor: &RegionEditor) -> Self {
        Self::diff(editor.baseline(), editor.goals())
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.soft_deletes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct SaveReport {
    pub inserted: Vec<GoalId>,
    pub updated: Vec<GoalId>,
    pub soft_deleted: Vec<GoalId>,
}

/// Runs the plan as independent store calls (insert, update, soft-delete).
/// A failure part way through is returned as-is and earlier steps are not
/// rolled back. Every step that did succeed is folded into the editor's
/// baseline first, so a retry only plans the work that is left.
pub fn save_editor<S: Datastore + ?Sized>(
    editor: &mut RegionEditor,
    store: &mut S,
    session: &Session,
    vision_board_id: &str,
) -> Result<SaveReport> {
    let plan = SavePlan::of(editor);
    if plan.is_empty() {
        return Ok(SaveReport::default());
    }

    let mut report = SaveReport::default();
    execute(&plan, editor, store, session, vision_board_id, &mut report).inspect_err(|err| {
        warn!(
            error = %err,
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            "save did not complete; earlier steps are not rolled back"
        );
    })?;

    info!(
        inserted = report.inserted.len(),
        updated = report.updated.len(),
        soft_deleted = report.soft_deleted.len(),
        "goal regions saved"
    );
    Ok(report)
}

fn execute<S: Datastore + ?Sized>(
    plan: &SavePlan,
    editor: &mut RegionEditor,
    store: &mut S,
    session: &Session,
    vision_board_id: &str,
    report: &mut SaveReport,
) -> Result<()> {
    if !plan.inserts.is_empty() {
        let rows: Vec<NewGoal> = plan
            .inserts
            .iter()
            .map(|(_, title, region)| NewGoal {
                vision_board_id: vision_board_id.to_string(),
                title: title.clone(),
                description: String::new(),
                category: None,
                region: *region,
            })
            .collect();
        let created = store.insert_goals(session, &rows)?;
        let assigned: Vec<(DraftId, GoalId)> = plan
            .inserts
            .iter()
            .map(|(draft, _, _)| *draft)
            .zip(created.into_iter().map(|row| row.id))
            .collect();
        editor.commit_inserts(&assigned);
        report.inserted = assigned.into_iter().map(|(_, id)| id).collect();
    }

    for (id, region) in &plan.updates {
        store.update_goal_region(session, id, *region)?;
        editor.commit_update(id, *region);
        report.updated.push(id.clone());
    }

    if !plan.soft_deletes.is_empty() {
        store.soft_delete_goals(session, &plan.soft_deletes)?;
        editor.commit_removals(&plan.soft_deletes);
        report.soft_deleted = plan.soft_deletes.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f64) -> Region {
        Region::new(x, 10.0, 20.0, 20.0).unwrap()
    }

    fn saved(id: &str, x: f64) -> Goal {
        Goal::Persisted {
            id: GoalId::from(id),
            title: id.to_string(),
            region: region(x),
        }
    }

    #[test]
    fn diff_splits_inserts_updates_and_removals() {
        let baseline = vec![
            (GoalId::from("a"), region(0.0)),
            (GoalId::from("b"), region(30.0)),
            (GoalId::from("c"), region(60.0)),
        ];
        let current = vec![
            saved("a", 5.0),
            saved("b", 30.0),
            Goal::Unsaved {
                draft_id: DraftId(1),
                title: "d".to_string(),
                region: region(70.0),
            },
        ];

        let plan = SavePlan::diff(&baseline, &current);
        assert_eq!(plan.inserts, vec![(DraftId(1), "d".to_string(), region(70.0))]);
        assert_eq!(plan.updates, vec![(GoalId::from("a"), region(5.0))]);
        assert_eq!(plan.soft_deletes, vec![GoalId::from("c")]);
    }

    #[test]
    fn unchanged_list_plans_nothing() {
        let baseline = vec![(GoalId::from("a"), region(0.0))];
        let plan = SavePlan::diff(&baseline, &[saved("a", 0.0)]);
        assert!(plan.is_empty());
    }
}
