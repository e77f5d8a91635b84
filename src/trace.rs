//! On-screen feedback drawn while a stroke is being recorded.

use crate::gestures::engine::Point;
use serde::{Deserialize, Serialize};

pub trait Trace: Send {
    fn start(&mut self, origin: Point);
    fn draw(&mut self, point: Point);
    fn end(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStyle {
    #[default]
    Standard,
    Shape,
    None,
}

/// Builds the trace renderer for the configured style. The dispatch loop
/// asks for a new one whenever the style or the screen geometry changes.
pub trait TraceFactory: Send + Sync {
    fn create(&self, style: TraceStyle) -> Box<dyn Trace>;
}

#[derive(Debug, Default)]
pub struct NullTrace;

impl Trace for NullTrace {
    fn start(&mut self, _origin: Point) {}
    fn draw(&mut self, _point: Point) {}
    fn end(&mut self) {}
}

/// Factory used when no drawing backend is available; every style renders
/// nothing.
#[derive(Debug, Default)]
pub struct DefaultTraceFactory;

impl TraceFactory for DefaultTraceFactory {
    fn create(&self, style: TraceStyle) -> Box<dyn Trace> {
        if style != TraceStyle::None {
            tracing::debug!(?style, "no trace renderer available; drawing nothing");
        }
        Box::new(NullTrace)
    }
}
