use serde_json::{Value, json};

use crate::bridging::Bridge;
use crate::connectivity::Cycle;
use crate::highway::Highway;

const PALETTE: [&str; 10] = [
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#a65628", "#f781bf", "#999999",
    "#66c2a5", "#ffd92f",
];

/// Diagnostic overlays for the highway-cycle connection
pub struct DebugVisualizer;

impl DebugVisualizer {
    pub fn colour(highway: usize) -> &'static str {
        PALETTE[highway % PALETTE.len()]
    }

    /// Every highway in its own colour with numbered segment endpoints.
    ///
    /// Meant for spotting why a highway stayed off the cycle, e.g. a street
    /// lying inside the region instead of on its edge.
    pub fn highways_geojson(highways: &[Highway], cycle: &Cycle, bridges: &[Bridge]) -> Value {
        let mut features = Vec::new();

        for (h, highway) in highways.iter().enumerate() {
            let colour = Self::colour(h);
            let on_cycle = cycle.contains(h);

            for (s, segment) in highway.segments.iter().enumerate() {
                let coords: Vec<Vec<f64>> = segment.points().map(|p| vec![p.lon(), p.lat()]).collect();

                let mut props = serde_json::Map::new();
                props.insert("highway".to_string(), json!(highway.name()));
                props.insert("highway_index".to_string(), json!(h));
                props.insert("segment".to_string(), json!(s));
                props.insert("on_cycle".to_string(), json!(on_cycle));
                props.insert("color".to_string(), json!(colour));
                props.insert("weight".to_string(), json!(if on_cycle { 4 } else { 2 }));
                if let Some(way_id) = segment.way_id() {
                    props.insert("osm_way_id".to_string(), json!(way_id));
                }
                props.insert(
                    "description".to_string(),
                    json!(format!(
                        "{} segment {} ({} nodes){}",
                        highway.name(),
                        s,
                        segment.len(),
                        if on_cycle { "" } else { ", not on cycle" }
                    )),
                );

                features.push(json!({
                    "type": "Feature",
                    "properties": props,
                    "geometry": {
                        "type": "LineString",
                        "coordinates": coords
                    }
                }));
            }

            // Endpoints numbered per highway: segment s has 2s+1 and 2s+2
            for (s, segment) in highway.segments.iter().enumerate() {
                for (end, point) in [("start", segment.first()), ("end", segment.last())] {
                    let number = 2 * s + if end == "start" { 1 } else { 2 };
                    features.push(json!({
                        "type": "Feature",
                        "properties": {
                            "highway": highway.name(),
                            "highway_index": h,
                            "segment": s,
                            "end": end,
                            "label": number.to_string(),
                            "color": colour,
                            "description": format!("{} #{} ({} of segment {})", highway.name(), number, end, s),
                        },
                        "geometry": {
                            "type": "Point",
                            "coordinates": [point.lon(), point.lat()]
                        }
                    }));
                }
            }
        }

        for bridge in bridges {
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "type": "bridge",
                    "from": highways[bridge.from_highway].name(),
                    "to": highways[bridge.to_highway].name(),
                    "distance": bridge.distance,
                    "color": "#000000",
                    "dashArray": "4 4",
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [
                        [bridge.from.lon(), bridge.from.lat()],
                        [bridge.to.lon(), bridge.to.lat()]
                    ]
                }
            }));
        }

        let cycle_names: Vec<&str> = cycle.iter().map(|h| highways[h].name()).collect();
        let excluded: Vec<&str> = highways
            .iter()
            .enumerate()
            .filter(|(h, _)| !cycle.contains(*h))
            .map(|(_, highway)| highway.name())
            .collect();

        json!({
            "type": "FeatureCollection",
            "properties": {
                "cycle": cycle_names,
                "excluded": excluded,
            },
            "features": features
        })
    }
}
