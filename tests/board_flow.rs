use chrono::{NaiveDate, Utc};
use image::{DynamicImage, Rgba, RgbaImage};
use tempfile::tempdir;
use visiontrack::ai::{self, ChatReply, ChatRequest, ImageSource, ModelClient, ModelRequest};
use visiontrack::goal::{
    CheckIn, GoalKey, GoalRecord, Milestone, NewGoal, ProgressSnapshot, SnapshotTier,
};
use visiontrack::progress;
use visiontrack::render::{FillTarget, ProgressRenderer};
use visiontrack::store::NewSnapshot;
use visiontrack::{
    save_editor, Datastore, Error, GoalId, JsonStore, Mode, Point, Region, RegionEditor, Result,
    SavePlan, Session, VisionBoard,
};

fn new_goal(board: &str, title: &str, region: Region) -> NewGoal {
    NewGoal {
        vision_board_id: board.to_string(),
        title: title.to_string(),
        description: String::new(),
        category: None,
        region,
    }
}

fn seeded(store: &mut JsonStore, me: &Session) -> (VisionBoard, Vec<GoalId>) {
    let board = store.create_board(me, "/boards/2026.png").unwrap();
    let ids = store
        .insert_goals(
            me,
            &[
                new_goal(&board.id, "A", Region::new(10.0, 10.0, 20.0, 20.0).unwrap()),
                new_goal(&board.id, "B", Region::new(10.0, 60.0, 20.0, 20.0).unwrap()),
                new_goal(&board.id, "C", Region::new(60.0, 10.0, 20.0, 20.0).unwrap()),
            ],
        )
        .unwrap()
        .into_iter()
        .map(|g| g.id)
        .collect();
    (board, ids)
}

fn open_editor(store: &JsonStore, me: &Session, board: &VisionBoard) -> RegionEditor {
    let goals = store.active_goals(me, &board.id).unwrap();
    RegionEditor::new(goals.iter().map(Into::into).collect())
}

/// Select A and drag it by (+5, +5), delete C, draw and name D.
fn edit_session(editor: &mut RegionEditor, c: &GoalId) {
    editor.pointer_down(Point::new(20.0, 20.0));
    editor.pointer_up();
    editor.pointer_down(Point::new(20.0, 20.0));
    editor.pointer_move(Point::new(22.0, 23.0));
    editor.pointer_move(Point::new(25.0, 25.0));
    editor.pointer_up();

    editor.delete(&GoalKey::Saved(c.clone())).unwrap();

    editor.set_mode(Mode::Draw);
    editor.pointer_down(Point::new(60.0, 60.0));
    editor.pointer_move(Point::new(80.0, 75.0));
    editor.pointer_up();
    editor.confirm_title("Visit Japan").unwrap();
}

#[test]
fn edit_and_save_issues_one_call_per_change() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    let me = Session::new("u1").unwrap();
    let mut store = JsonStore::open(&path).unwrap();
    let (board, ids) = seeded(&mut store, &me);
    let (a, b, c) = (ids[0].clone(), ids[1].clone(), ids[2].clone());

    let mut editor = open_editor(&store, &me, &board);
    edit_session(&mut editor, &c);

    let report = save_editor(&mut editor, &mut store, &me, &board.id).unwrap();
    assert_eq!(report.inserted.len(), 1);
    assert_eq!(report.updated, vec![a.clone()]);
    assert_eq!(report.soft_deleted, vec![c.clone()]);
    assert!(SavePlan::of(&editor).is_empty());

    let reopened = JsonStore::open(&path).unwrap();
    let active = reopened.active_goals(&me, &board.id).unwrap();
    let titles: Vec<&str> = active.iter().map(|g| g.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B", "Visit Japan"]);
    assert_eq!(active[0].region, Region::new(15.0, 15.0, 20.0, 20.0).unwrap());
    assert_eq!(active[1].id, b);
    assert_eq!(active[2].region, Region::new(60.0, 60.0, 20.0, 15.0).unwrap());
    assert!(!reopened.goal(&me, &c).unwrap().is_active);

    let again = save_editor(&mut editor, &mut store, &me, &board.id).unwrap();
    assert!(again.inserted.is_empty() && again.updated.is_empty() && again.soft_deleted.is_empty());
}

/// Datastore that lets `passes` region updates through, then fails the next
/// `failures` of them.
struct FlakyUpdates {
    inner: JsonStore,
    passes: u32,
    failures: u32,
}

impl Datastore for FlakyUpdates {
    fn create_board(&mut self, s: &Session, image_path: &str) -> Result<VisionBoard> {
        self.inner.create_board(s, image_path)
    }
    fn current_board(&self, s: &Session) -> Result<Option<VisionBoard>> {
        self.inner.current_board(s)
    }
    fn insert_goals(&mut self, s: &Session, goals: &[NewGoal]) -> Result<Vec<GoalRecord>> {
        self.inner.insert_goals(s, goals)
    }
    fn update_goal_region(&mut self, s: &Session, id: &GoalId, region: Region) -> Result<()> {
        if self.passes > 0 {
            self.passes -= 1;
        } else if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::transport("connection reset"));
        }
        self.inner.update_goal_region(s, id, region)
    }
    fn soft_delete_goals(&mut self, s: &Session, ids: &[GoalId]) -> Result<usize> {
        self.inner.soft_delete_goals(s, ids)
    }
    fn goal(&self, s: &Session, id: &GoalId) -> Result<GoalRecord> {
        self.inner.goal(s, id)
    }
    fn active_goals(&self, s: &Session, board: &str) -> Result<Vec<GoalRecord>> {
        self.inner.active_goals(s, board)
    }
    fn milestones(&self, s: &Session, goal_id: &GoalId) -> Result<Vec<Milestone>> {
        self.inner.milestones(s, goal_id)
    }
    fn milestone(&self, s: &Session, id: &str) -> Result<Milestone> {
        self.inner.milestone(s, id)
    }
    fn insert_milestone(
        &mut self,
        s: &Session,
        goal_id: &GoalId,
        title: &str,
        position: u32,
    ) -> Result<Milestone> {
        self.inner.insert_milestone(s, goal_id, title, position)
    }
    fn update_milestone(&mut self, s: &Session, milestone: &Milestone) -> Result<()> {
        self.inner.update_milestone(s, milestone)
    }
    fn find_snapshot(
        &self,
        s: &Session,
        goal_id: &GoalId,
        tier: SnapshotTier,
    ) -> Result<Option<ProgressSnapshot>> {
        self.inner.find_snapshot(s, goal_id, tier)
    }
    fn insert_snapshot(&mut self, s: &Session, snapshot: NewSnapshot) -> Result<ProgressSnapshot> {
        self.inner.insert_snapshot(s, snapshot)
    }
    fn snapshots(&self, s: &Session) -> Result<Vec<ProgressSnapshot>> {
        self.inner.snapshots(s)
    }
    fn checkin_on(&self, s: &Session, date: NaiveDate) -> Result<Option<CheckIn>> {
        self.inner.checkin_on(s, date)
    }
    fn insert_checkin(
        &mut self,
        s: &Session,
        date: NaiveDate,
        mood: &str,
        reflection: Option<&str>,
    ) -> Result<CheckIn> {
        self.inner.insert_checkin(s, date, mood, reflection)
    }
    fn checkin_dates(&self, s: &Session) -> Result<Vec<NaiveDate>> {
        self.inner.checkin_dates(s)
    }
}

#[test]
fn retry_after_failed_update_finishes_without_duplicates() {
    let me = Session::new("u1").unwrap();
    let mut inner = JsonStore::in_memory();
    let (board, ids) = seeded(&mut inner, &me);
    let (a, c) = (ids[0].clone(), ids[2].clone());
    let mut store = FlakyUpdates {
        inner,
        passes: 0,
        failures: 1,
    };

    let mut editor = open_editor(&store.inner, &me, &board);
    edit_session(&mut editor, &c);

    let err = save_editor(&mut editor, &mut store, &me, &board.id).unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(
        err.user_message(),
        "Could not reach the service. Please try again."
    );

    // the insert ran and is not rolled back; the soft delete never started
    assert_eq!(store.active_goals(&me, &board.id).unwrap().len(), 4);
    let plan = SavePlan::of(&editor);
    assert!(plan.inserts.is_empty());
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.soft_deletes, vec![c.clone()]);

    let report = save_editor(&mut editor, &mut store, &me, &board.id).unwrap();
    assert!(report.inserted.is_empty());
    assert_eq!(report.updated, vec![a.clone()]);
    assert_eq!(report.soft_deleted, vec![c.clone()]);

    let active = store.active_goals(&me, &board.id).unwrap();
    let titles: Vec<&str> = active.iter().map(|g| g.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "B", "Visit Japan"]);
    assert_eq!(active[0].region, Region::new(15.0, 15.0, 20.0, 20.0).unwrap());
    assert!(SavePlan::of(&editor).is_empty());
}

#[test]
fn completed_updates_are_not_replayed_on_retry() {
    let me = Session::new("u1").unwrap();
    let mut inner = JsonStore::in_memory();
    let (board, ids) = seeded(&mut inner, &me);
    let mut store = FlakyUpdates {
        inner,
        passes: 1,
        failures: 1,
    };

    let mut editor = open_editor(&store.inner, &me, &board);
    edit_session(&mut editor, &ids[2]);
    // also move B up by 5
    editor.pointer_down(Point::new(20.0, 70.0));
    editor.pointer_up();
    editor.pointer_down(Point::new(20.0, 70.0));
    editor.pointer_move(Point::new(20.0, 65.0));
    editor.pointer_up();

    let first = SavePlan::of(&editor);
    assert_eq!(first.updates.len(), 2);
    assert!(save_editor(&mut editor, &mut store, &me, &board.id).is_err());

    let retry = SavePlan::of(&editor);
    assert!(retry.inserts.is_empty());
    assert_eq!(retry.updates, vec![first.updates[1].clone()]);
    assert_eq!(retry.soft_deletes, vec![ids[2].clone()]);

    let report = save_editor(&mut editor, &mut store, &me, &board.id).unwrap();
    assert_eq!(report.updated, vec![ids[1].clone()]);
    assert_eq!(
        store.goal(&me, &ids[1]).unwrap().region,
        Region::new(10.0, 55.0, 20.0, 20.0).unwrap()
    );
}

#[test]
fn toggling_milestones_captures_tiers_once() {
    let me = Session::new("u1").unwrap();
    let mut store = JsonStore::in_memory();
    let (_, ids) = seeded(&mut store, &me);
    let goal = &ids[0];
    for i in 0..10 {
        progress::add_milestone(&mut store, &me, goal, &format!("week {i}")).unwrap();
    }
    let milestones = store.milestones(&me, goal).unwrap();
    assert_eq!(milestones.last().map(|m| m.position), Some(9));
    let now = Utc::now();

    let mut captured = Vec::new();
    for m in milestones.iter().take(3) {
        let outcome = progress::toggle_milestone(&mut store, &me, &m.id, now).unwrap();
        captured.extend(outcome.snapshot);
    }
    // 10% captures nothing, 20% and 30% both sit in the quarter band
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].milestone_percentage, SnapshotTier::Quarter);
    assert_eq!(captured[0].completed_milestones, 2);
    assert_eq!(progress::goal_progress(&store, &me, goal).unwrap(), 30);
    assert_eq!(store.snapshots(&me).unwrap().len(), 1);
}

#[test]
fn half_done_goal_reports_fifty_percent() {
    let me = Session::new("u1").unwrap();
    let mut store = JsonStore::in_memory();
    let (_, ids) = seeded(&mut store, &me);
    let goal = &ids[1];
    for title in ["Book flights", "Get visa", "Learn phrases", "Go"] {
        progress::add_milestone(&mut store, &me, goal, title).unwrap();
    }
    let milestones = store.milestones(&me, goal).unwrap();
    for m in &milestones[..2] {
        progress::toggle_milestone(&mut store, &me, &m.id, Utc::now()).unwrap();
    }
    assert_eq!(progress::goal_progress(&store, &me, goal).unwrap(), 50);
    let snaps = store.snapshots(&me).unwrap();
    assert_eq!(
        snaps.iter().map(|s| s.milestone_percentage).collect::<Vec<_>>(),
        vec![SnapshotTier::Half]
    );
    assert_eq!(snaps[0].milestone_percentage.badge(), "Halfway There");
}

#[test]
fn rendered_fill_rises_from_region_bottom() {
    let dir = tempdir().unwrap();
    let board = RgbaImage::from_pixel(100, 100, Rgba([200, 40, 40, 255]));
    let path = dir.path().join("board.png");
    board.save(&path).unwrap();
    let image = image::open(&path).unwrap();

    let renderer = ProgressRenderer {
        labels: false,
        ..ProgressRenderer::default()
    };
    let targets = [FillTarget {
        title: "Run a marathon".to_string(),
        region: Region::new(0.0, 0.0, 100.0, 100.0).unwrap(),
        progress: 50.0,
    }];
    let out = renderer.render(&image, &targets);
    assert_eq!(out.get_pixel(50, 80), &Rgba([200, 40, 40, 255]));
    let top = out.get_pixel(50, 20);
    assert_eq!(top[0], top[1]);
    assert_eq!(top[1], top[2]);
    assert!(top[0] < 100);

    let frames = renderer.animate(&DynamicImage::ImageRgba8(board), &targets, 0.0, 6);
    assert_eq!(frames.len(), 6);
    let colored = |img: &RgbaImage| img.pixels().filter(|p| p[0] != p[1]).count();
    let counts: Vec<usize> = frames.iter().map(colored).collect();
    assert_eq!(counts[0], 0);
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(counts[5], colored(&out));
}

struct Scripted(&'static str);

impl ModelClient for Scripted {
    fn complete(&self, _: &ModelRequest) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[test]
fn extracted_goals_import_and_open_in_editor() {
    let me = Session::new("u1").unwrap();
    let mut store = JsonStore::in_memory();
    let board = store.create_board(&me, "/boards/new.jpg").unwrap();
    let client = Scripted(
        "```json\n[{\"title\":\"Run a marathon\",\"description\":\"42km\",\"region\":{\"x\":5,\"y\":5,\"width\":40,\"height\":40}},\
         {\"title\":\"Buy a cabin\",\"description\":\"\",\"region\":{\"x\":70,\"y\":50,\"width\":50,\"height\":30}}]\n```",
    );

    let extracted =
        ai::extract_region_goals(&client, ImageSource::parse("/boards/new.jpg")).unwrap();
    let rows: Vec<NewGoal> = extracted
        .into_iter()
        .map(|g| g.into_new_goal(&board.id))
        .collect();
    store.insert_goals(&me, &rows).unwrap();

    let editor = open_editor(&store, &me, &board);
    assert_eq!(editor.goals().len(), 2);
    assert_eq!(
        *editor.goals()[1].region(),
        Region::new(70.0, 50.0, 30.0, 30.0).unwrap()
    );
    assert!(SavePlan::of(&editor).is_empty());
}

#[test]
fn chat_suggestion_can_be_accepted_as_milestone() {
    let me = Session::new("u1").unwrap();
    let mut store = JsonStore::in_memory();
    let (_, ids) = seeded(&mut store, &me);
    progress::add_milestone(&mut store, &me, &ids[0], "Buy running shoes").unwrap();

    let client = Scripted(
        r#"{"message":"Nice start!","suggestedMilestones":["Run 5K","Run 10K"],"quickReplies":["More","Done"]}"#,
    );
    let reply = ai::milestone_chat(
        &client,
        &ChatRequest {
            goal_title: "A".to_string(),
            existing_milestones: vec!["Buy running shoes".to_string()],
            user_message: Some("What next?".to_string()),
            ..ChatRequest::default()
        },
    );
    assert_ne!(reply, ChatReply::fallback());

    let added =
        progress::add_milestone(&mut store, &me, &ids[0], &reply.suggested_milestones[1]).unwrap();
    assert_eq!(added.position, 1);
    assert_eq!(added.title, "Run 10K");
}
