//! VisionTrack: goals drawn as regions on a vision board photo, milestones
//! tracked per goal, and progress shown by colouring the regions back in.

pub mod ai;
pub mod config;
pub mod editor;
pub mod error;
pub mod goal;
pub mod progress;
pub mod region;
pub mod render;
pub mod save;
pub mod store;

pub use config::Config;
pub use editor::{EditorAction, Mode, RegionEditor};
pub use error::{Error, Result};
pub use goal::{Goal, GoalId, GoalKey, GoalRecord, Milestone, SnapshotTier, VisionBoard};
pub use region::{Point, Region};
pub use render::{FillAnimation, FillTarget, ProgressRenderer};
pub use save::{save_editor, SavePlan, SaveReport};
pub use store::{Datastore, JsonStore, Session};
