use crate::gestures::db::SharedGestureDb;
use crate::gestures::engine::Stroke;
use crate::locking::Lock;
use crate::service::StrokeObserver;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCommand {
    name: String,
    cmd: String,
}

/// Stores the next finished stroke as a new command gesture instead of
/// matching it.
pub struct QuickLearn {
    db: SharedGestureDb,
    pending: Lock<Option<PendingCommand>>,
}

impl QuickLearn {
    pub fn new(db: SharedGestureDb) -> Self {
        Self {
            db,
            pending: Lock::new(None),
        }
    }

    /// Capture the next stroke as `name`, running `cmd` when matched.
    pub fn arm(&self, name: impl Into<String>, cmd: impl Into<String>) {
        self.pending.set(Some(PendingCommand {
            name: name.into(),
            cmd: cmd.into(),
        }));
    }

    pub fn cancel(&self) {
        self.pending.set(None);
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl StrokeObserver for QuickLearn {
    fn wants_stroke(&self) -> bool {
        self.is_armed()
    }

    /// An empty stroke is only learned as a button chord; a bare click of
    /// the trigger is left for the next attempt.
    fn capture(&self, stroke: &Arc<Stroke>) -> bool {
        if stroke.is_empty() && stroke.button() == 0 {
            return false;
        }
        let Some(pending) = self.pending.lock().take() else {
            return false;
        };
        let id = self
            .db
            .add_command(Arc::clone(stroke), &pending.name, &pending.cmd);
        tracing::info!(id, name = %pending.name, "learned gesture");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gestures::db::GestureDb;
    use crate::gestures::engine::Point;

    fn stroke() -> Arc<Stroke> {
        let points = [Point::new(0.0, 0.0, 0), Point::new(40.0, 40.0, 10)];
        Arc::new(Stroke::from_points(&points, 0))
    }

    #[test]
    fn armed_capture_adds_one_gesture() {
        let db: SharedGestureDb = Arc::new(Lock::new(GestureDb::new("unused.json")));
        let learn = QuickLearn::new(Arc::clone(&db));
        assert!(!learn.capture(&stroke()));

        learn.arm("open", "xterm");
        assert!(learn.wants_stroke());
        assert!(learn.capture(&stroke()));
        assert!(!learn.is_armed());
        assert_eq!(db.lock().size(), 1);
    }

    #[test]
    fn empty_stroke_keeps_learner_armed() {
        let db: SharedGestureDb = Arc::new(Lock::new(GestureDb::new("unused.json")));
        let learn = QuickLearn::new(db);
        learn.arm("open", "xterm");
        assert!(!learn.capture(&Arc::new(Stroke::empty(0))));
        assert!(learn.is_armed());
    }

    #[test]
    fn button_chord_without_movement_is_learned() {
        let db: SharedGestureDb = Arc::new(Lock::new(GestureDb::new("unused.json")));
        let learn = QuickLearn::new(Arc::clone(&db));
        learn.arm("middle", "xdotool key ctrl+w");
        assert!(learn.capture(&Arc::new(Stroke::empty(2))));
        assert!(!learn.is_armed());
        assert_eq!(db.handle(Arc::new(Stroke::empty(2))).name, "middle");
    }
}
