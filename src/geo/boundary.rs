//! State boundary polygons parsed from a GeoJSON feature collection.

use geo::{Contains, LineString, MultiPolygon, Point, Polygon};
use serde_json::Value;

/// Property keys that carry the state name in the known boundary documents.
const NAME_KEYS: &[&str] = &["name", "NAME_1", "st_nm", "state"];

/// Outline of one state in `(longitude, latitude)` coordinates.
///
/// The first ring of each GeoJSON polygon becomes its exterior; any further
/// rings are holes.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBoundary {
    /// State name.
    pub state: String,
    /// Polygons making up the state.
    pub polygons: MultiPolygon<f64>,
}

impl StateBoundary {
    /// Builds a boundary from one GeoJSON feature.
    ///
    /// Returns the reason the feature was rejected when the state name or a
    /// `Polygon`/`MultiPolygon` geometry is missing or malformed.
    pub(crate) fn from_feature(feature: &Value) -> Result<Self, String> {
        let props = feature
            .get("properties")
            .and_then(Value::as_object)
            .ok_or("feature has no properties")?;
        let state = NAME_KEYS
            .iter()
            .find_map(|k| props.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or("feature has no state name")?;

        let geometry = feature.get("geometry").ok_or("feature has no geometry")?;
        let coords = geometry
            .get("coordinates")
            .ok_or("geometry has no coordinates")?;
        let polygons = match geometry.get("type").and_then(Value::as_str) {
            Some("Polygon") => vec![parse_polygon(coords)?],
            Some("MultiPolygon") => coords
                .as_array()
                .ok_or("MultiPolygon coordinates are not an array")?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(format!("unsupported geometry type `{other}`")),
            None => return Err("geometry has no type".to_string()),
        };

        Ok(Self {
            state: state.to_string(),
            polygons: MultiPolygon::new(polygons),
        })
    }

    /// Whether the point lies strictly inside this state's outline.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.polygons.contains(&Point::new(longitude, latitude))
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>, String> {
    let rings = value.as_array().ok_or("polygon is not an array of rings")?;
    let (exterior, holes) = rings.split_first().ok_or("polygon has no rings")?;
    let interiors = holes.iter().map(parse_ring).collect::<Result<_, _>>()?;
    Ok(Polygon::new(parse_ring(exterior)?, interiors))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>, String> {
    let positions = value.as_array().ok_or("ring is not an array")?;
    let coords: Vec<(f64, f64)> = positions
        .iter()
        .map(|p| match p.as_array().map(Vec::as_slice) {
            Some([lon, lat, ..]) => lon
                .as_f64()
                .zip(lat.as_f64())
                .ok_or_else(|| "non-numeric position".to_string()),
            _ => Err("position is not a coordinate pair".to_string()),
        })
        .collect::<Result<_, _>>()?;
    if coords.len() < 3 {
        return Err(format!("ring has {} positions, need at least 3", coords.len()));
    }
    Ok(LineString::from(coords))
}
