//! Wire format of the heatmap server
//!
//! Requests are GET query strings appended to the configured base URL.
//! Responses are JSONP: `callback_name({ ... })`, where the callback name tells
//! which kind of message the body is. Bodies are JavaScript object literals and
//! may use unquoted keys, so keys are quoted before handing them to `serde_json`.

use crate::{
    DatasetId, Extent, FetchRequest, InitializationRequest, Projection, RasterPayload, Result,
    SyncError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const RASTER_CALLBACK: &str = "heatmap_request_callback";
const COLD_CACHE_CALLBACK: &str = "heatmap_request_callback_initialize_me";
const INITIALIZED_CALLBACK: &str = "initialization_callback";
const BOUNDS_CALLBACK: &str = "request_dataset_bounds_callback";

/// A request the controller wants sent to the server
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingRequest {
    Raster(FetchRequest),
    DatasetBounds(DatasetId),
    Initialization(InitializationRequest),
}

impl OutgoingRequest {
    /// Full request URL below `base_url`
    pub fn url(&self, base_url: &str) -> String {
        match self {
            Self::Raster(fetch) => format!(
                "{base_url}?heatmapRasterRequest={}&dataset={}&zoomlevel={}",
                fetch.key.bbox, fetch.key.dataset, fetch.key.zoom
            ),
            Self::DatasetBounds(dataset) => format!("{base_url}?datasetBoundsRequest={dataset}"),
            Self::Initialization(init) => format!(
                "{base_url}?initializationRequest={}&dataset={}",
                init.to_query_value(),
                init.dataset
            ),
        }
    }

    /// Dataset this request is about
    pub fn dataset(&self) -> DatasetId {
        match self {
            Self::Raster(fetch) => fetch.key.dataset,
            Self::DatasetBounds(dataset) => *dataset,
            Self::Initialization(init) => init.dataset,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Raster(_) => "raster",
            Self::DatasetBounds(_) => "dataset-bounds",
            Self::Initialization(_) => "initialization",
        }
    }
}

/// Sent in place of a raster payload when the server's raster cache is cold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdCacheSignal {
    pub minimum_longitude: f64,
    pub minimum_latitude: f64,
    pub maximum_longitude: f64,
    pub maximum_latitude: f64,
}

impl ColdCacheSignal {
    /// The dataset's overall bounds as a geographic extent
    pub fn to_extent(&self, zoom: u8) -> Result<Extent> {
        Extent::new(
            self.minimum_longitude,
            self.minimum_latitude,
            self.maximum_longitude,
            self.maximum_latitude,
            Projection::Geographic,
            zoom,
        )
    }
}

/// Answer to a dataset-bounds request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl DatasetBounds {
    pub fn to_extent(&self, zoom: u8) -> Result<Extent> {
        Extent::new(
            self.min_lon,
            self.min_lat,
            self.max_lon,
            self.max_lat,
            Projection::Geographic,
            zoom,
        )
    }
}

/// A classified server response
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Raster(RasterPayload),
    InitializeMe(ColdCacheSignal),
    InitializationComplete,
    DatasetBounds(DatasetBounds),
}

/// Classify and parse one JSONP (or plain JSON) response body
pub fn parse_response(body: &str) -> Result<ServerMessage> {
    let trimmed = body.trim().trim_end_matches(';').trim_end();

    // A bare object is a raster payload served without a callback wrapper
    if trimmed.starts_with('{') {
        return Ok(ServerMessage::Raster(parse_object(trimmed)?));
    }

    let open = trimmed
        .find('(')
        .ok_or_else(|| SyncError::Protocol("response is neither JSONP nor an object".into()))?;
    let close = trimmed
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or_else(|| SyncError::Protocol("unterminated JSONP call".into()))?;
    let name = trimmed[..open].trim();
    let inner = trimmed[open + 1..close].trim();

    match name {
        RASTER_CALLBACK => Ok(ServerMessage::Raster(parse_object(inner)?)),
        COLD_CACHE_CALLBACK => Ok(ServerMessage::InitializeMe(parse_object(inner)?)),
        INITIALIZED_CALLBACK => Ok(ServerMessage::InitializationComplete),
        BOUNDS_CALLBACK => Ok(ServerMessage::DatasetBounds(parse_object(inner)?)),
        other => Err(SyncError::Protocol(format!("unknown callback '{other}'"))),
    }
}

fn parse_object<T: DeserializeOwned>(literal: &str) -> Result<T> {
    if !literal.starts_with('{') {
        return Err(SyncError::Protocol(format!(
            "expected an object, got '{}'",
            literal.chars().take(32).collect::<String>()
        )));
    }
    Ok(serde_json::from_str(&quote_keys(literal))?)
}

/// Quote bare identifier keys of a JavaScript object literal
///
/// Only identifiers directly after `{` or `,` and followed by `:` are quoted;
/// string contents are copied untouched.
pub fn quote_keys(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len() + 16);
    let mut chars = literal.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    let mut expect_key = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                expect_key = false;
                out.push(c);
            }
            '{' | ',' => {
                expect_key = true;
                out.push(c);
            }
            c if c.is_whitespace() => out.push(c),
            c if expect_key && (c.is_ascii_alphabetic() || c == '_' || c == '$') => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '$' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let is_key = chars.clone().find(|c| !c.is_whitespace()) == Some(':');
                if is_key {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                expect_key = false;
            }
            _ => {
                expect_key = false;
                out.push(c);
            }
        }
    }
    out
}
