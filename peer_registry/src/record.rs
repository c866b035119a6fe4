use std::{fmt, str::FromStr};

use anyhow::{anyhow, Context};
use getset::{CopyGetters, Getters};
use serde_json::{Map, Value};

use crate::Error;

pub type PeerId = u64;

/// Every peer's published record, in insertion order.
pub type Registry = Vec<PeerRecord>;

/// Screen position and size of a peer.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Shape {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// JSON has no NaN or infinity, so only finite shapes can be published.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.w, self.h)
    }
}

/// Parses `x,y,w,h`.
impl FromStr for Shape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .with_context(|| format!("'{part}' is not a number"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [x, y, w, h] => {
                let shape = Self::new(*x, *y, *w, *h);
                if !shape.is_finite() {
                    return Err(anyhow!("A shape needs finite values, got '{s}'"));
                }
                Ok(shape)
            }
            _ => Err(anyhow!("A shape needs exactly four values, got '{s}'")),
        }
    }
}

/// Application data a peer publishes alongside its shape.
///
/// Keys the bundled consumers understand get a typed field. Anything else is
/// carried in `extra` untouched, so consumers with their own schema can still
/// exchange data through the registry.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball_y: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetaData {
    /// Validates an untyped JSON object against the known keys.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(Error::InvalidMetaData)
    }

    pub fn to_value(&self) -> Value {
        // Only string keys and JSON values in here, serialization can't fail.
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Name of the first known numeric key holding NaN or infinity.
    pub fn non_finite_key(&self) -> Option<&'static str> {
        [
            ("playerY", self.player_y),
            ("ballX", self.ball_x),
            ("ballY", self.ball_y),
        ]
        .into_iter()
        .find_map(|(key, value)| value.filter(|v| !v.is_finite()).map(|_| key))
    }

    pub fn with_start(mut self, start: bool) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_extra<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overlays every key present in `partial`.
    pub fn merge(&mut self, partial: MetaData) {
        if partial.start.is_some() {
            self.start = partial.start;
        }
        if partial.player_y.is_some() {
            self.player_y = partial.player_y;
        }
        if partial.ball_x.is_some() {
            self.ball_x = partial.ball_x;
        }
        if partial.ball_y.is_some() {
            self.ball_y = partial.ball_y;
        }
        self.extra.extend(partial.extra);
    }

    pub fn merged(&self, partial: MetaData) -> Self {
        let mut merged = self.clone();
        merged.merge(partial);
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Getters, CopyGetters, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    #[getset(get_copy = "pub")]
    id: PeerId,
    #[getset(get_copy = "pub")]
    shape: Shape,
    #[serde(default)]
    #[getset(get = "pub")]
    meta_data: MetaData,
}

impl PeerRecord {
    pub fn new(id: PeerId, shape: Shape, meta_data: MetaData) -> Self {
        Self {
            id,
            shape,
            meta_data,
        }
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub(crate) fn set_meta_data(&mut self, meta_data: MetaData) {
        self.meta_data = meta_data;
    }
}
