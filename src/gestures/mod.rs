pub mod db;
pub mod engine;
pub mod learn;

pub use db::{GestureDb, GestureId, Ranking, SharedGestureDb, StrokeInfo, NO_MATCH};
pub use engine::{Point, PreStroke, Stroke};
pub use learn::QuickLearn;
