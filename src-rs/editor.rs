//! Pointer-driven editing of goal regions.
//!
//! The editor owns an in-memory goal list plus exactly one active gesture.
//! Pointer positions are image percentages (see [`Point::from_pixels`]) and
//! are clamped onto the image before use, so deltas never exceed the bounds.

use crate::error::{Error, Result};
use crate::goal::{DraftId, Goal, GoalId, GoalKey};
use crate::region::{Point, Region, FULL, MIN_RESIZE_SIZE};
use tracing::debug;

/// Distance (in percent) within which a press grabs a resize handle.
pub const HANDLE_TOLERANCE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Select,
    Draw,
}

/// Resize grips of the selected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    N,
    S,
    E,
    W,
    NW,
    NE,
    SW,
    SE,
}

impl Handle {
    /// Corners first so they win over the edges they touch.
    pub const ALL: [Handle; 8] = [
        Handle::NW,
        Handle::NE,
        Handle::SW,
        Handle::SE,
        Handle::N,
        Handle::S,
        Handle::E,
        Handle::W,
    ];

    fn north(self) -> bool {
        matches!(self, Self::N | Self::NW | Self::NE)
    }

    fn south(self) -> bool {
        matches!(self, Self::S | Self::SW | Self::SE)
    }

    fn west(self) -> bool {
        matches!(self, Self::W | Self::NW | Self::SW)
    }

    fn east(self) -> bool {
        matches!(self, Self::E | Self::NE | Self::SE)
    }

    /// Where the grip sits on `region`.
    pub fn anchor_on(self, region: &Region) -> Point {
        let cx = region.x + region.width / 2.0;
        let cy = region.y + region.height / 2.0;
        let x = if self.west() {
            region.x
        } else if self.east() {
            region.right()
        } else {
            cx
        };
        let y = if self.north() {
            region.y
        } else if self.south() {
            region.bottom()
        } else {
            cy
        };
        Point::new(x, y)
    }

    /// Applies one incremental drag step. Each axis rule whose guard fails is
    /// skipped for this step, which pins the edge at the minimum size or the
    /// image border.
    pub fn resize(self, region: &Region, dx: f64, dy: f64) -> Region {
        let Region {
            mut x,
            mut y,
            mut width,
            mut height,
        } = *region;

        if self.north() {
            let new_y = y + dy;
            let new_height = height - dy;
            if new_height > MIN_RESIZE_SIZE && new_y >= 0.0 {
                y = new_y;
                height = new_height;
            }
        }
        if self.south() {
            let new_height = height + dy;
            if new_height > MIN_RESIZE_SIZE && y + new_height <= FULL {
                height = new_height;
            }
        }
        if self.west() {
            let new_x = x + dx;
            let new_width = width - dx;
            if new_width > MIN_RESIZE_SIZE && new_x >= 0.0 {
                x = new_x;
                width = new_width;
            }
        }
        if self.east() {
            let new_width = width + dx;
            if new_width > MIN_RESIZE_SIZE && x + new_width <= FULL {
                width = new_width;
            }
        }

        Region {
            x,
            y,
            width,
            height,
        }
    }
}

/// The single interaction in flight.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Drawing {
        anchor: Point,
        draft: Region,
    },
    /// Drawn rectangle waiting for a title.
    Naming {
        draft: Region,
    },
    Moving {
        target: GoalKey,
        last: Point,
    },
    Resizing {
        target: GoalKey,
        handle: Handle,
        last: Point,
    },
}

/// What releasing the pointer did.
#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    Nothing,
    /// The draft was too small and was thrown away.
    Discarded,
    AwaitingTitle(Region),
    Committed(GoalKey),
}

/// Scripted editor input, used to replay sessions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditorAction {
    Mode { mode: Mode },
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Click { x: f64, y: f64 },
    Title { title: String },
    Cancel,
    Select { id: String },
    Delete { id: String },
    DeleteSelected,
}

#[derive(Debug, Clone)]
pub struct RegionEditor {
    goals: Vec<Goal>,
    baseline: Vec<(GoalId, Region)>,
    mode: Mode,
    selected: Option<GoalKey>,
    gesture: Gesture,
    next_draft: u64,
}

impl RegionEditor {
    /// Opens an editor over already-persisted goals.
    pub fn new(goals: Vec<Goal>) -> Self {
        let mut editor = Self {
            goals: Vec::new(),
            baseline: Vec::new(),
            mode: Mode::Select,
            selected: None,
            gesture: Gesture::Idle,
            next_draft: 1,
        };
        editor.reset_goals(goals);
        editor
    }

    /// Replaces the goal list and treats it as the last saved state.
    pub fn reset_goals(&mut self, goals: Vec<Goal>) {
        self.baseline = goals
            .iter()
            .filter_map(|g| g.persisted_id().map(|id| (id.clone(), *g.region())))
            .collect();
        self.goals = goals;
        self.selected = None;
        self.gesture = Gesture::Idle;
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Persisted goals with the regions they had at the last save.
    pub fn baseline(&self) -> &[(GoalId, Region)] {
        &self.baseline
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected(&self) -> Option<&GoalKey> {
        self.selected.as_ref()
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// Rectangle currently being drawn or named.
    pub fn draft(&self) -> Option<Region> {
        match &self.gesture {
            Gesture::Drawing { draft, .. } | Gesture::Naming { draft } => Some(*draft),
            _ => None,
        }
    }

    /// Switching modes abandons any gesture in flight.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.gesture = Gesture::Idle;
    }

    pub fn select(&mut self, key: &GoalKey) -> Result<()> {
        if self.index_of(key).is_none() {
            return Err(Error::not_found("goal", key.to_string()));
        }
        self.selected = Some(key.clone());
        Ok(())
    }

    /// Selects the topmost region under `p`. Empty canvas leaves the
    /// selection untouched.
    pub fn click(&mut self, p: Point) {
        if self.mode != Mode::Select || self.gesture != Gesture::Idle {
            return;
        }
        if let Some(key) = self.hit_test(p.clamped()) {
            self.selected = Some(key);
        }
    }

    pub fn pointer_down(&mut self, p: Point) {
        let p = p.clamped();
        if self.gesture != Gesture::Idle {
            return;
        }
        match self.mode {
            Mode::Draw => {
                self.gesture = Gesture::Drawing {
                    anchor: p,
                    draft: Region::from_corners(p, p),
                };
            }
            Mode::Select => {
                let Some(target) = self.selected.clone() else {
                    self.click(p);
                    return;
                };
                let Some(region) = self.region_of(&target) else {
                    self.selected = None;
                    self.click(p);
                    return;
                };
                if let Some(handle) = handle_at(&region, p) {
                    debug!(target = %target, ?handle, "resize started");
                    self.gesture = Gesture::Resizing {
                        target,
                        handle,
                        last: p,
                    };
                } else if region.contains(p) && self.hit_test(p).as_ref() == Some(&target) {
                    debug!(target = %target, "move started");
                    self.gesture = Gesture::Moving { target, last: p };
                } else {
                    self.click(p);
                }
            }
        }
    }

    pub fn pointer_move(&mut self, p: Point) {
        let p = p.clamped();
        match &mut self.gesture {
            Gesture::Drawing { anchor, draft } => {
                *draft = Region::from_corners(*anchor, p);
            }
            Gesture::Moving { target, last } => {
                let (dx, dy) = (p.x - last.x, p.y - last.y);
                *last = p;
                let target = target.clone();
                if let Some(region) = self.region_mut(&target) {
                    *region = region.translated_clamped(dx, dy);
                }
            }
            Gesture::Resizing {
                target,
                handle,
                last,
            } => {
                let (dx, dy) = (p.x - last.x, p.y - last.y);
                *last = p;
                let (target, handle) = (target.clone(), *handle);
                if let Some(region) = self.region_mut(&target) {
                    *region = handle.resize(region, dx, dy);
                }
            }
            Gesture::Idle | Gesture::Naming { .. } => {}
        }
    }

    pub fn pointer_up(&mut self) -> Release {
        match std::mem::take(&mut self.gesture) {
            Gesture::Drawing { draft, .. } => {
                if draft.is_drawable() {
                    self.gesture = Gesture::Naming { draft };
                    Release::AwaitingTitle(draft)
                } else {
                    debug!(?draft, "draft too small, discarded");
                    Release::Discarded
                }
            }
            Gesture::Moving { target, .. } | Gesture::Resizing { target, .. } => {
                Release::Committed(target)
            }
            naming @ Gesture::Naming { .. } => {
                self.gesture = naming;
                Release::Nothing
            }
            Gesture::Idle => Release::Nothing,
        }
    }

    /// Leaving the canvas ends the gesture the same way a release does.
    pub fn pointer_leave(&mut self) -> Release {
        self.pointer_up()
    }

    /// Turns the named draft into a new unsaved goal and returns to select mode.
    pub fn confirm_title(&mut self, title: &str) -> Result<DraftId> {
        let Gesture::Naming { draft } = self.gesture else {
            return Err(Error::validation("no drawn region is waiting for a title"));
        };
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation("Goal title cannot be empty"));
        }
        let draft_id = DraftId(self.next_draft);
        self.next_draft += 1;
        self.goals.push(Goal::Unsaved {
            draft_id,
            title: title.to_string(),
            region: draft,
        });
        self.gesture = Gesture::Idle;
        self.mode = Mode::Select;
        debug!(%draft_id, title, "goal drawn");
        Ok(draft_id)
    }

    /// Drops the draft; the editor stays in draw mode.
    pub fn cancel_naming(&mut self) {
        if matches!(self.gesture, Gesture::Naming { .. } | Gesture::Drawing { .. }) {
            self.gesture = Gesture::Idle;
        }
    }

    /// Removes a goal from the working list. Persisted goals are soft-deleted
    /// by the next save.
    pub fn delete(&mut self, key: &GoalKey) -> Result<Goal> {
        let idx = self
            .index_of(key)
            .ok_or_else(|| Error::not_found("goal", key.to_string()))?;
        let removed = self.goals.remove(idx);
        if self.selected.as_ref() == Some(key) {
            self.selected = None;
        }
        if matches!(&self.gesture, Gesture::Moving { target, .. } | Gesture::Resizing { target, .. } if target == key)
        {
            self.gesture = Gesture::Idle;
        }
        Ok(removed)
    }

    pub fn apply(&mut self, action: &EditorAction) -> Result<()> {
        match action {
            EditorAction::Mode { mode } => self.set_mode(*mode),
            EditorAction::Down { x, y } => self.pointer_down(Point::new(*x, *y)),
            EditorAction::Move { x, y } => self.pointer_move(Point::new(*x, *y)),
            EditorAction::Up => {
                self.pointer_up();
            }
            EditorAction::Click { x, y } => self.click(Point::new(*x, *y)),
            EditorAction::Title { title } => {
                self.confirm_title(title)?;
            }
            EditorAction::Cancel => self.cancel_naming(),
            EditorAction::Select { id } => {
                let key = self.resolve_key(id)?;
                self.select(&key)?;
            }
            EditorAction::Delete { id } => {
                let key = self.resolve_key(id)?;
                self.delete(&key)?;
            }
            EditorAction::DeleteSelected => {
                if let Some(key) = self.selected.clone() {
                    self.delete(&key)?;
                }
            }
        }
        Ok(())
    }

    /// Resolves a textual id (`draft-N` or a persisted id) to a goal key.
    pub fn resolve_key(&self, raw: &str) -> Result<GoalKey> {
        self.goals
            .iter()
            .map(Goal::key)
            .find(|key| key.to_string() == raw)
            .ok_or_else(|| Error::not_found("goal", raw))
    }

    /// Swaps saved drafts for the ids the store assigned and adds them to the
    /// baseline.
    pub(crate) fn commit_inserts(&mut self, assigned: &[(DraftId, GoalId)]) {
        for goal in &mut self.goals {
            let Goal::Unsaved {
                draft_id,
                title,
                region,
            } = goal
            else {
                continue;
            };
            let Some((_, id)) = assigned.iter().find(|(d, _)| d == draft_id) else {
                continue;
            };
            if self.selected == Some(GoalKey::Draft(*draft_id)) {
                self.selected = Some(GoalKey::Saved(id.clone()));
            }
            if let Gesture::Moving { target, .. } | Gesture::Resizing { target, .. } =
                &mut self.gesture
            {
                if *target == GoalKey::Draft(*draft_id) {
                    *target = GoalKey::Saved(id.clone());
                }
            }
            self.baseline.push((id.clone(), *region));
            *goal = Goal::Persisted {
                id: id.clone(),
                title: std::mem::take(title),
                region: *region,
            };
        }
    }

    /// Records the region a persisted goal now has in the store.
    pub(crate) fn commit_update(&mut self, id: &GoalId, region: Region) {
        match self.baseline.iter_mut().find(|(saved, _)| saved == id) {
            Some(entry) => entry.1 = region,
            None => self.baseline.push((id.clone(), region)),
        }
    }

    /// Forgets goals the store has soft-deleted.
    pub(crate) fn commit_removals(&mut self, ids: &[GoalId]) {
        self.baseline.retain(|(saved, _)| !ids.contains(saved));
    }

    fn hit_test(&self, p: Point) -> Option<GoalKey> {
        self.goals
            .iter()
            .rev()
            .find(|g| g.region().contains(p))
            .map(Goal::key)
    }

    fn index_of(&self, key: &GoalKey) -> Option<usize> {
        self.goals.iter().position(|g| &g.key() == key)
    }

    fn region_of(&self, key: &GoalKey) -> Option<Region> {
        self.index_of(key).map(|idx| *self.goals[idx].region())
    }

    fn region_mut(&mut self, key: &GoalKey) -> Option<&mut Region> {
        let idx = self.index_of(key)?;
        Some(self.goals[idx].region_mut())
    }
}

fn handle_at(region: &Region, p: Point) -> Option<Handle> {
    Handle::ALL.into_iter().find(|handle| {
        let grip = handle.anchor_on(region);
        (grip.x - p.x).abs() <= HANDLE_TOLERANCE && (grip.y - p.y).abs() <= HANDLE_TOLERANCE
    })
}
