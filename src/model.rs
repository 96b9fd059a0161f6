use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// A UPRN with its British National Grid coordinate (EPSG:27700, metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AddressPoint {
    #[serde(rename = "UPRN")]
    pub uprn: u64,
    #[serde(rename = "X_COORDINATE")]
    pub x: f64,
    #[serde(rename = "Y_COORDINATE")]
    pub y: f64,
}

impl AddressPoint {
    pub fn tagged(self, code: String) -> AssignedPoint {
        AssignedPoint {
            uprn: self.uprn,
            x: self.x,
            y: self.y,
            code,
        }
    }
}

/// A UPRN tagged with the code of the areal unit that contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedPoint {
    #[serde(rename = "UPRN")]
    pub uprn: u64,
    #[serde(rename = "X_COORDINATE")]
    pub x: f64,
    #[serde(rename = "Y_COORDINATE")]
    pub y: f64,
    #[serde(rename = "OA11CD")]
    pub code: String,
}

impl AssignedPoint {
    pub fn coords(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn untagged(&self) -> AddressPoint {
        AddressPoint {
            uprn: self.uprn,
            x: self.x,
            y: self.y,
        }
    }
}

/// One polygon of a partition of the plane, e.g. a 2011 output area.
#[derive(Debug, Clone, PartialEq)]
pub struct ArealUnit {
    pub code: String,
    pub geometry: MultiPolygon<f64>,
}

impl ArealUnit {
    pub fn new(code: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        ArealUnit {
            code: code.into(),
            geometry: geometry.into(),
        }
    }
}

/// Strip every whitespace character, so "SW1A 1AA", "SW1A  1AA" and
/// "SW1A1AA" all join on the same key.
pub fn normalise_postcode(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}
