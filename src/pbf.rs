use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use osmpbf::{Element, ElementReader};

use crate::bbox::BoundingBox;
use crate::highway::{Highway, Point, Segment};
use crate::pattern::NamePattern;

/// A named highway way as read from the extract, before node lookup.
#[derive(Debug, Clone)]
struct WayEntry {
    id: u64,
    name: String,
    refs: Vec<u64>,
}

/// Reads named highways from a local `.osm.pbf` extract.
#[derive(Debug, Clone)]
pub struct PbfHighwaySource {
    path: PathBuf,
}

impl PbfHighwaySource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            bail!("PBF file not found: {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the extract once and return one highway per pattern, in order.
    ///
    /// Nodes are only kept inside `bbox`, so each way is cut wherever it
    /// leaves the box.
    pub fn load(&self, bbox: &BoundingBox, patterns: &[NamePattern]) -> Result<Vec<Highway>> {
        let start_time = Instant::now();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] {spinner} {pos} elements - {msg}")?,
        );
        pb.set_message(format!("Reading {}", self.path.display()));
        pb.enable_steady_tick(Duration::from_millis(200));

        let mut nodes: HashMap<u64, Point> = HashMap::new();
        let mut ways: Vec<WayEntry> = Vec::new();

        let reader = ElementReader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        reader
            .for_each(|element| {
                pb.inc(1);
                match element {
                    Element::Node(node) => {
                        let point = Point::with_id(node.lon(), node.lat(), node.id() as u64);
                        if bbox.contains(point.coord) {
                            nodes.insert(node.id() as u64, point);
                        }
                    }
                    Element::DenseNode(node) => {
                        let point = Point::with_id(node.lon(), node.lat(), node.id() as u64);
                        if bbox.contains(point.coord) {
                            nodes.insert(node.id() as u64, point);
                        }
                    }
                    Element::Way(way) => {
                        if !way.tags().any(|(key, _)| key == "highway") {
                            return;
                        }
                        let Some((_, name)) = way.tags().find(|(key, _)| *key == "name") else {
                            return;
                        };
                        if patterns.iter().any(|p| p.is_match(name)) {
                            ways.push(WayEntry {
                                id: way.id() as u64,
                                name: name.to_string(),
                                refs: way.refs().map(|r| r as u64).collect(),
                            });
                        }
                    }
                    _ => {}
                }
            })
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        pb.finish_with_message("Element extraction complete");
        info!(
            "Read {} nodes in box and {} matching ways in {:.2?}",
            nodes.len(),
            ways.len(),
            start_time.elapsed()
        );

        Ok(patterns
            .iter()
            .map(|pattern| {
                let segments: Vec<Segment> = ways
                    .iter()
                    .filter(|way| pattern.is_match(&way.name))
                    .flat_map(|way| clip_way(way, &nodes))
                    .collect();
                debug!("{}: {} segment(s)", pattern.as_str(), segments.len());
                Highway::new(pattern.clone(), segments)
            })
            .collect())
    }
}

/// Runs of consecutive refs whose nodes lie inside the box.
fn clip_way(way: &WayEntry, nodes: &HashMap<u64, Point>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut run: Vec<Point> = Vec::new();

    for id in way.refs.iter().map(Some).chain(std::iter::once(None)) {
        match id.and_then(|id| nodes.get(id)) {
            Some(point) => run.push(*point),
            None => {
                if run.len() > 1 {
                    if let Ok(segment) = Segment::new(Some(way.id), std::mem::take(&mut run)) {
                        segments.push(segment);
                    }
                }
                run.clear();
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let error = PbfHighwaySource::new(dir.path().join("absent.osm.pbf")).unwrap_err();
        assert!(error.to_string().contains("PBF file not found"));
    }

    #[test]
    fn way_is_cut_where_nodes_are_outside() {
        let nodes: HashMap<u64, Point> = [
            (1, Point::with_id(0.0, 0.0, 1)),
            (2, Point::with_id(0.1, 0.0, 2)),
            (4, Point::with_id(0.3, 0.0, 4)),
            (5, Point::with_id(0.4, 0.0, 5)),
            (6, Point::with_id(0.5, 0.0, 6)),
            (8, Point::with_id(0.7, 0.0, 8)),
        ]
        .into_iter()
        .collect();
        let way = WayEntry {
            id: 42,
            name: "Punt Road".to_string(),
            refs: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };

        let segments = clip_way(&way, &nodes);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 3);
        assert_eq!(segments[1].first().id, Some(4));
        assert!(segments.iter().all(|s| s.way_id() == Some(42)));
    }
}
