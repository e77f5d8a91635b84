use crate::actions::Action;
use crate::gestures::engine::Stroke;
use crate::locking::Lock;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const GESTURES_FILE: &str = "gestures.json";
pub const SCHEMA_VERSION: u32 = 1;

/// Acceptance threshold used until the preferences say otherwise.
pub const DEFAULT_ACCEPTANCE: f64 = 0.5;

pub type GestureId = i32;

/// Id reported by a [`Ranking`] when nothing scored well enough.
pub const NO_MATCH: GestureId = -1;

/// Exemplar strokes of one gesture. Holding the same `Arc` twice is refused;
/// equal-looking strokes in separate allocations are distinct exemplars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeSet {
    strokes: Vec<Arc<Stroke>>,
}

impl StrokeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stroke: Arc<Stroke>) -> bool {
        if self.contains(&stroke) {
            return false;
        }
        self.strokes.push(stroke);
        true
    }

    pub fn remove(&mut self, stroke: &Arc<Stroke>) -> bool {
        let before = self.strokes.len();
        self.strokes.retain(|s| !Arc::ptr_eq(s, stroke));
        self.strokes.len() != before
    }

    pub fn contains(&self, stroke: &Arc<Stroke>) -> bool {
        self.strokes.iter().any(|s| Arc::ptr_eq(s, stroke))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stroke>> {
        self.strokes.iter()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeInfo {
    pub strokes: StrokeSet,
    pub action: Arc<Action>,
    #[serde(default)]
    pub name: String,
}

impl StrokeInfo {
    pub fn new(stroke: Arc<Stroke>, action: Arc<Action>) -> Self {
        let mut strokes = StrokeSet::new();
        strokes.insert(stroke);
        Self {
            strokes,
            action,
            name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// One row of the diagnostic list carried by a [`Ranking`].
#[derive(Debug, Clone)]
pub struct RankedStroke {
    pub score: f64,
    pub id: GestureId,
    pub name: String,
    pub stroke: Arc<Stroke>,
}

/// Outcome of matching a candidate stroke against the store.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub candidate: Arc<Stroke>,
    /// Best-scoring exemplar, present whenever the store had one to compare.
    pub stroke: Option<Arc<Stroke>>,
    /// Set only on a match.
    pub action: Option<Arc<Action>>,
    pub score: f64,
    pub id: GestureId,
    pub name: String,
    /// Every compared exemplar, best score first, ties by ascending id.
    pub ranked: Vec<RankedStroke>,
}

impl Ranking {
    pub fn is_match(&self) -> bool {
        self.id != NO_MATCH
    }
}

#[derive(Serialize, Deserialize)]
struct GestureFile {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    next_id: GestureId,
    #[serde(default)]
    gestures: BTreeMap<GestureId, StrokeInfo>,
}

/// Gesture id to [`StrokeInfo`] mapping plus its on-disk location.
#[derive(Debug)]
pub struct GestureDb {
    path: PathBuf,
    gestures: BTreeMap<GestureId, StrokeInfo>,
    next_id: GestureId,
    threshold: f64,
}

impl GestureDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gestures: BTreeMap::new(),
            next_id: 1,
            threshold: DEFAULT_ACCEPTANCE,
        }
    }

    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(GESTURES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn add(&mut self, info: StrokeInfo) -> GestureId {
        let id = self.next_id;
        self.next_id += 1;
        self.gestures.insert(id, info);
        id
    }

    pub fn add_command(&mut self, stroke: Arc<Stroke>, name: &str, cmd: &str) -> GestureId {
        let info = StrokeInfo::new(stroke, Arc::new(Action::command(cmd))).with_name(name);
        self.add(info)
    }

    pub fn remove(&mut self, id: GestureId) -> bool {
        self.gestures.remove(&id).is_some()
    }

    pub fn get(&self, id: GestureId) -> Option<&StrokeInfo> {
        self.gestures.get(&id)
    }

    pub fn get_mut(&mut self, id: GestureId) -> Option<&mut StrokeInfo> {
        self.gestures.get_mut(&id)
    }

    pub fn entries(&self) -> &BTreeMap<GestureId, StrokeInfo> {
        &self.gestures
    }

    pub fn iter(&self) -> impl Iterator<Item = (GestureId, &StrokeInfo)> {
        self.gestures.iter().map(|(id, info)| (*id, info))
    }

    /// Every exemplar, in ascending id then insertion order.
    pub fn strokes(&self) -> StrokeIter<'_> {
        StrokeIter {
            entries: self.gestures.iter(),
            current: None,
        }
    }

    pub fn size(&self) -> usize {
        self.gestures.len()
    }

    pub fn nested_size(&self) -> usize {
        self.gestures.values().map(|info| info.strokes.len()).sum()
    }

    pub fn handle(&self, candidate: Arc<Stroke>) -> Ranking {
        let mut ranked = Vec::new();
        let mut best: Option<(f64, GestureId, Arc<Stroke>)> = None;

        for (id, stroke, _action) in self.strokes() {
            let score = candidate.compare(stroke);
            let name = self
                .gestures
                .get(&id)
                .map(|info| info.name.clone())
                .unwrap_or_default();
            ranked.push(RankedStroke {
                score,
                id,
                name,
                stroke: Arc::clone(stroke),
            });
            if best.as_ref().map_or(true, |(best_score, _, _)| score > *best_score) {
                best = Some((score, id, Arc::clone(stroke)));
            }
        }
        // stable: equal scores keep ascending id order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut ranking = Ranking {
            candidate,
            stroke: None,
            action: None,
            score: 0.0,
            id: NO_MATCH,
            name: String::new(),
            ranked,
        };
        if let Some((score, id, stroke)) = best {
            ranking.score = score;
            ranking.stroke = Some(stroke);
            if score > 0.0 && score >= self.threshold {
                if let Some(info) = self.gestures.get(&id) {
                    ranking.id = id;
                    ranking.name = info.name.clone();
                    ranking.action = Some(Arc::clone(&info.action));
                }
            }
        }
        tracing::debug!(
            id = ranking.id,
            score = ranking.score,
            name = %ranking.name,
            "stroke ranked"
        );
        ranking
    }

    /// Replace the in-memory mapping with the file contents.
    ///
    /// A missing or blank file yields an empty store. On a parse failure or
    /// an unknown schema version the store is left empty and the error is
    /// returned.
    pub fn read(&mut self) -> anyhow::Result<()> {
        self.gestures.clear();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(());
        }
        let file: GestureFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        if file.schema_version > SCHEMA_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported gesture schema version {}",
                file.schema_version
            ));
        }
        let after_last = file.gestures.keys().next_back().map_or(1, |id| id + 1);
        self.next_id = self.next_id.max(file.next_id).max(after_last);
        self.gestures = file.gestures;
        tracing::info!(
            gestures = self.size(),
            strokes = self.nested_size(),
            "loaded gestures"
        );
        Ok(())
    }

    /// Persist the mapping. The previous file is only replaced once the new
    /// contents are completely on disk.
    pub fn write(&self) -> anyhow::Result<()> {
        let file = GestureFile {
            schema_version: SCHEMA_VERSION,
            next_id: self.next_id,
            gestures: self.gestures.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomically(&self.path, json.as_bytes())
    }
}

pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let result = (|| -> anyhow::Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    })();
    result.with_context(|| format!("failed to write {}", path.display()))
}

/// Iterator over `(id, exemplar, action)` triples of a [`GestureDb`].
pub struct StrokeIter<'a> {
    entries: std::collections::btree_map::Iter<'a, GestureId, StrokeInfo>,
    current: Option<(
        GestureId,
        &'a Arc<Action>,
        std::slice::Iter<'a, Arc<Stroke>>,
    )>,
}

impl<'a> Iterator for StrokeIter<'a> {
    type Item = (GestureId, &'a Arc<Stroke>, &'a Arc<Action>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((id, action, strokes)) = self.current.as_mut() {
                if let Some(stroke) = strokes.next() {
                    return Some((*id, stroke, *action));
                }
            }
            let (id, info) = self.entries.next()?;
            self.current = Some((*id, &info.action, info.strokes.strokes.iter()));
        }
    }
}

impl Lock<GestureDb> {
    pub fn read(&self) -> anyhow::Result<()> {
        self.lock().read()
    }

    pub fn write(&self) -> anyhow::Result<()> {
        self.lock().write()
    }

    pub fn handle(&self, stroke: Arc<Stroke>) -> Ranking {
        self.lock().handle(stroke)
    }

    pub fn remove(&self, id: GestureId) -> bool {
        self.lock().remove(id)
    }

    pub fn add_command(&self, stroke: Arc<Stroke>, name: &str, cmd: &str) -> GestureId {
        self.lock().add_command(stroke, name, cmd)
    }
}

pub type SharedGestureDb = Arc<Lock<GestureDb>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gestures::engine::Point;

    fn stroke(dx: f64, dy: f64) -> Arc<Stroke> {
        let points = [Point::new(0.0, 0.0, 0), Point::new(dx, dy, 10)];
        Arc::new(Stroke::from_points(&points, 0))
    }

    #[test]
    fn stroke_set_rejects_same_allocation() {
        let s = stroke(10.0, 0.0);
        let mut set = StrokeSet::new();
        assert!(set.insert(Arc::clone(&s)));
        assert!(!set.insert(Arc::clone(&s)));
        assert!(set.insert(stroke(10.0, 0.0)));
        assert_eq!(set.len(), 2);
        assert!(set.remove(&s));
        assert!(!set.remove(&s));
    }

    #[test]
    fn iterator_yields_every_exemplar_including_empty_ones() {
        let mut db = GestureDb::new("unused.json");
        let mut info = StrokeInfo::new(Arc::new(Stroke::empty(1)), Arc::new(Action::Ignore {
            mods: Default::default(),
        }));
        info.strokes.insert(stroke(0.0, 10.0));
        db.add(info);
        db.add(StrokeInfo::new(Arc::new(Stroke::empty(2)), Arc::new(Action::command("x"))));
        db.add_command(stroke(10.0, 0.0), "right", "true");

        let ids: Vec<GestureId> = db.strokes().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec![1, 1, 2, 3]);
        assert_eq!(db.strokes().count(), db.nested_size());
    }
}
