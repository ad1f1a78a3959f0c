//! Point-cloud decoding of raster responses
//!
//! A raster response declares an element count and carries a flat sequence of
//! `(lat, lon, weight)` triples, either as a JSON array or as one comma-joined
//! string. Decoding produces a fresh [`PointCloud`]; clouds are never merged.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Zoom level above which the displayed maximum starts growing
const WEIGHT_SCALE_BASE_ZOOM: i32 = 11;

/// A single weighted location in the data projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
}

/// Display-ready samples of one raster response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    /// Maximum used for color normalization, already zoom-scaled
    pub maximum_weight: f64,
    pub samples: Vec<PointSample>,
    /// Point radius in degrees of latitude
    pub suggested_radius: f64,
}

impl PointCloud {
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One element of an array-shaped `datapoints` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

/// The two accepted wire shapes of `datapoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datapoints {
    List(Vec<Scalar>),
    Joined(String),
}

impl Default for Datapoints {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Datapoints {
    /// Flatten into numbers, failing on any non-numeric entry
    pub fn to_values(&self) -> Result<Vec<f64>> {
        let parse = |text: &str| {
            text.trim().parse::<f64>().map_err(|e| SyncError::MalformedPayload {
                reason: format!("non-numeric datapoint '{text}': {e}"),
            })
        };
        match self {
            Self::List(items) => items
                .iter()
                .map(|item| match item {
                    Scalar::Number(v) => Ok(*v),
                    Scalar::Text(s) => parse(s),
                })
                .collect(),
            Self::Joined(joined) => {
                // A single trailing comma is tolerated, inner empty fields are not
                let joined = joined.trim();
                let joined = joined.strip_suffix(',').unwrap_or(joined);
                if joined.trim().is_empty() {
                    return Ok(Vec::new());
                }
                joined.split(',').map(parse).collect()
            }
        }
    }
}

/// Raster response body as sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterPayload {
    /// Declared number of triples; must be a non-negative integer
    pub datacount: f64,
    /// Server-side maximum weight over the whole dataset
    pub max: f64,
    /// Suggested point radius in degrees of latitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, alias = "data")]
    pub datapoints: Datapoints,
}

/// Zoom-dependent factor applied to the server maximum
///
/// `sqrt(max(1, zoom - 11))`: keeps colors visually stable when zooming in,
/// where each raster cell covers fewer events.
#[inline]
pub fn weight_scale(zoom: u8) -> f64 {
    ((zoom as i32 - WEIGHT_SCALE_BASE_ZOOM).max(1) as f64).sqrt()
}

/// Decode a raster payload observed at `zoom`
///
/// `default_radius` is used when the payload carries no radius.
pub fn decode(payload: &RasterPayload, zoom: u8, default_radius: f64) -> Result<PointCloud> {
    #[cfg(feature = "profiling")]
    profiling::scope!("cloud::decode");

    let count = payload.datacount;
    if !count.is_finite() || count < 0.0 || count.fract() != 0.0 {
        return Err(SyncError::MalformedPayload {
            reason: format!("invalid datacount {count}"),
        });
    }
    let count = count as usize;

    let values = payload.datapoints.to_values()?;
    let needed = count
        .checked_mul(3)
        .ok_or_else(|| SyncError::MalformedPayload {
            reason: format!("datacount {count} overflows"),
        })?;
    if values.len() < needed {
        return Err(SyncError::MalformedPayload {
            reason: format!(
                "datacount {count} needs {needed} values, got {}",
                values.len()
            ),
        });
    }

    let mut samples = Vec::with_capacity(count);
    for triple in values[..needed].chunks_exact(3) {
        let (lat, lon, weight) = (triple[0], triple[1], triple[2]);
        if !lat.is_finite() || !lon.is_finite() || !weight.is_finite() || weight < 0.0 {
            return Err(SyncError::MalformedPayload {
                reason: format!("invalid sample ({lat}, {lon}, {weight})"),
            });
        }
        samples.push(PointSample { lat, lon, weight });
    }

    Ok(PointCloud {
        maximum_weight: payload.max * weight_scale(zoom),
        samples,
        suggested_radius: payload.radius.unwrap_or(default_radius),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(count: f64, points: Datapoints) -> RasterPayload {
        RasterPayload {
            datacount: count,
            max: 10.0,
            radius: Some(0.001),
            datapoints: points,
        }
    }

    fn numbers(values: &[f64]) -> Datapoints {
        Datapoints::List(values.iter().copied().map(Scalar::Number).collect())
    }

    #[test]
    fn test_decode_scenario_at_zoom_13() {
        let p = payload(2.0, numbers(&[10.0, 20.0, 5.0, 11.0, 21.0, 8.0]));
        let cloud = decode(&p, 13, 0.5).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!((cloud.maximum_weight - 10.0 * 2f64.sqrt()).abs() < 1e-12);
        assert!((cloud.maximum_weight - 14.14).abs() < 0.01);
        assert_eq!(cloud.suggested_radius, 0.001);
        assert_eq!(
            cloud.samples[1],
            PointSample {
                lat: 11.0,
                lon: 21.0,
                weight: 8.0
            }
        );
    }

    #[test]
    fn test_weight_scale() {
        for zoom in 0..=12 {
            assert_eq!(weight_scale(zoom), 1.0);
        }
        assert_eq!(weight_scale(15), 2.0);
    }

    #[test]
    fn test_joined_string_shape() {
        let p = payload(2.0, Datapoints::Joined("10,20,5, 11,21,8".to_string()));
        let cloud = decode(&p, 12, 0.5).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.samples[0].weight, 5.0);
        assert_eq!(cloud.maximum_weight, 10.0);
    }

    #[test]
    fn test_joined_empty_field_rejected() {
        let p = payload(1.0, Datapoints::Joined("10,,20,5".to_string()));
        assert!(matches!(
            decode(&p, 12, 0.5),
            Err(SyncError::MalformedPayload { .. })
        ));

        let trailing = payload(1.0, Datapoints::Joined("10,20,5,".to_string()));
        assert_eq!(decode(&trailing, 12, 0.5).unwrap().samples[0].lon, 20.0);

        let empty = payload(0.0, Datapoints::Joined(String::new()));
        assert!(decode(&empty, 12, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_string_array_shape() {
        let p = payload(
            1.0,
            Datapoints::List(vec![
                Scalar::Text("44.4".into()),
                Scalar::Text("26.1".into()),
                Scalar::Number(3.0),
            ]),
        );
        let cloud = decode(&p, 8, 0.5).unwrap();
        assert_eq!(cloud.samples[0].lat, 44.4);
        assert_eq!(cloud.samples[0].lon, 26.1);
    }

    #[test]
    fn test_short_datapoints_rejected() {
        let p = payload(3.0, numbers(&[10.0, 20.0, 5.0, 11.0, 21.0, 8.0]));
        assert!(matches!(
            decode(&p, 12, 0.5),
            Err(SyncError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_invalid_counts_rejected() {
        for count in [-1.0, 1.5, f64::NAN, f64::INFINITY] {
            let p = payload(count, numbers(&[10.0, 20.0, 5.0, 11.0, 21.0, 8.0]));
            assert!(decode(&p, 12, 0.5).is_err(), "count {count} accepted");
        }
    }

    #[test]
    fn test_negative_weight_rejected() {
        let p = payload(1.0, numbers(&[10.0, 20.0, -5.0]));
        assert!(decode(&p, 12, 0.5).is_err());
    }

    #[test]
    fn test_non_numeric_rejected() {
        let p = payload(1.0, Datapoints::Joined("10,abc,5".into()));
        assert!(decode(&p, 12, 0.5).is_err());
    }

    #[test]
    fn test_extra_values_ignored() {
        let p = payload(1.0, numbers(&[10.0, 20.0, 5.0, 11.0]));
        let cloud = decode(&p, 12, 0.5).unwrap();
        assert_eq!(cloud.len(), 1);
    }

    #[test]
    fn test_empty_payload_and_default_radius() {
        let mut p = payload(0.0, Datapoints::Joined(String::new()));
        p.radius = None;
        let cloud = decode(&p, 12, 0.25).unwrap();
        assert!(cloud.is_empty());
        assert_eq!(cloud.suggested_radius, 0.25);
    }

    #[test]
    fn test_deserialize_both_shapes() {
        let array: RasterPayload = serde_json::from_str(
            r#"{"datacount": 1, "max": 4.0, "radius": 0.01, "datapoints": [1.0, 2.0, 3.0]}"#,
        )
        .unwrap();
        assert_eq!(array.datapoints.to_values().unwrap(), vec![1.0, 2.0, 3.0]);

        let joined: RasterPayload =
            serde_json::from_str(r#"{"datacount": 1, "max": 4.0, "datapoints": "1.0,2.0,3.0"}"#)
                .unwrap();
        assert_eq!(joined.radius, None);
        assert_eq!(joined.datapoints.to_values().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
