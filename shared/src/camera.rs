use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

use crate::model::{LatLon, Quest, SelectionState};

pub const QUEST_MAP_ZOOM: f64 = 4.5;
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 21.0;

/// Which rule produced a camera target.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraSource {
    /// No quests, so the device or manual location.
    Fallback,
    /// The selected quest's coordinates.
    Selection,
    /// Mean position of all quests.
    Centroid,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CameraTarget {
    pub center: LatLon,
    pub zoom: f64,
    pub source: CameraSource,
}

/// Unweighted mean of all quest coordinates. `None` for an empty list.
#[must_use]
pub fn centroid(quests: &[Quest]) -> Option<LatLon> {
    if quests.is_empty() {
        return None;
    }
    let n = quests.len() as f64;
    let (lat, lon) = quests
        .iter()
        .fold((0.0, 0.0), |(lat, lon), q| (lat + q.latitude, lon + q.longitude));
    Some(LatLon::new(lat / n, lon / n))
}

/// Where the map should look, at the default quest zoom.
#[must_use]
pub fn compute_camera_target(
    quests: &[Quest],
    selection: SelectionState,
    fallback: LatLon,
) -> CameraTarget {
    compute_camera_target_at(quests, selection, fallback, QUEST_MAP_ZOOM)
}

/// Same policy with a caller-chosen zoom. Only the centre depends on the
/// inputs:
///
/// 1. no quests: `fallback`
/// 2. selection present in `quests`: that quest
/// 3. otherwise: the centroid, including when the selected id is stale
#[must_use]
pub fn compute_camera_target_at(
    quests: &[Quest],
    selection: SelectionState,
    fallback: LatLon,
    zoom: f64,
) -> CameraTarget {
    let selected = selection
        .selected_id()
        .and_then(|id| quests.iter().find(|q| q.id == id));

    let (center, source) = match (centroid(quests), selected) {
        (None, _) => (fallback, CameraSource::Fallback),
        (Some(_), Some(quest)) => (quest.location(), CameraSource::Selection),
        (Some(mean), None) => (mean, CameraSource::Centroid),
    };

    CameraTarget {
        center,
        zoom,
        source,
    }
}

/// One GeoJSON point per quest for the map's marker layer.
#[must_use]
pub fn markers_geojson(quests: &[Quest]) -> FeatureCollection {
    let features = quests
        .iter()
        .map(|quest| {
            let mut properties = JsonObject::new();
            properties.insert("title".into(), quest.title.clone().into());
            properties.insert("difficulty".into(), quest.difficulty.into());
            properties.insert("completed".into(), quest.is_completed.into());
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    quest.longitude,
                    quest.latitude,
                ]))),
                id: Some(Id::Number(quest.id.0.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestId;

    fn at(id: i64, lat: f64, lon: f64) -> Quest {
        Quest {
            id: QuestId(id),
            title: format!("Quest {id}"),
            description: String::new(),
            difficulty: 1,
            image_ref: None,
            latitude: lat,
            longitude: lon,
            author: "GeoQuest".into(),
            is_completed: false,
        }
    }

    fn pair() -> Vec<Quest> {
        vec![at(1, 0.0, 0.0), at(2, 10.0, 10.0)]
    }

    #[test]
    fn test_empty_uses_fallback() {
        let target = compute_camera_target(
            &[],
            SelectionState::Selected(QuestId(1)),
            LatLon::new(10.0, 20.0),
        );
        assert_eq!(target.center, LatLon::new(10.0, 20.0));
        assert_eq!(target.source, CameraSource::Fallback);
        assert_eq!(target.zoom, QUEST_MAP_ZOOM);
    }

    #[test]
    fn test_selected_quest_wins() {
        let target =
            compute_camera_target(&pair(), SelectionState::Selected(QuestId(2)), LatLon::default());
        assert_eq!(target.center, LatLon::new(10.0, 10.0));
        assert_eq!(target.source, CameraSource::Selection);
    }

    #[test]
    fn test_stale_selection_falls_through_to_centroid() {
        let target = compute_camera_target(
            &pair(),
            SelectionState::Selected(QuestId(99)),
            LatLon::default(),
        );
        assert_eq!(target.center, LatLon::new(5.0, 5.0));
        assert_eq!(target.source, CameraSource::Centroid);
    }

    #[test]
    fn test_unselected_uses_centroid() {
        let target = compute_camera_target(&pair(), SelectionState::Unselected, LatLon::default());
        assert_eq!(target.center, LatLon::new(5.0, 5.0));
        assert_eq!(target.zoom, QUEST_MAP_ZOOM);
    }

    #[test]
    fn test_zoom_is_constant_across_branches() {
        let zooms = [
            compute_camera_target_at(&[], SelectionState::Unselected, LatLon::default(), 7.0),
            compute_camera_target_at(&pair(), SelectionState::Selected(QuestId(1)), LatLon::default(), 7.0),
            compute_camera_target_at(&pair(), SelectionState::Unselected, LatLon::default(), 7.0),
        ];
        assert!(zooms.iter().all(|t| t.zoom == 7.0));
    }

    #[test]
    fn test_centroid() {
        assert_eq!(centroid(&[]), None);
        let quests = vec![at(1, 1.0, -4.0), at(2, 2.0, 0.0), at(3, 3.0, 1.0)];
        assert_eq!(centroid(&quests), Some(LatLon::new(2.0, -1.0)));
    }

    #[test]
    fn test_markers_geojson() {
        let collection = markers_geojson(&pair());
        assert_eq!(collection.features.len(), 2);

        let json = serde_json::to_value(&collection).unwrap();
        let second = &json["features"][1];
        assert_eq!(second["id"], 2);
        assert_eq!(second["geometry"]["type"], "Point");
        assert_eq!(second["geometry"]["coordinates"][0], 10.0);
        assert_eq!(second["properties"]["title"], "Quest 2");
        assert_eq!(second["properties"]["completed"], false);
    }
}
