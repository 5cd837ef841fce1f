//! The record returned by a lookup

use serde::{Deserialize, Serialize};
use std::fmt;

/// One item record
///
/// Mirrors the JSON served by the record endpoint:
///
/// ```json
/// { "number": "007", "type": "Male", "image": "https://…/007.png", "accessories": ["Cap"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Normalized identifier of the record
    pub number: String,

    /// Record category
    #[serde(rename = "type")]
    pub kind: String,

    /// Image location
    #[serde(default)]
    pub image: String,

    /// Attached accessories, possibly none
    #[serde(default)]
    pub accessories: Vec<String>,
}

impl ItemRecord {
    /// Create a record without image or accessories
    #[must_use]
    pub fn new(number: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            kind: kind.into(),
            image: String::new(),
            accessories: Vec::new(),
        }
    }

    /// Set the image location
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Add an accessory
    #[must_use]
    pub fn with_accessory(mut self, accessory: impl Into<String>) -> Self {
        self.accessories.push(accessory.into());
        self
    }
}

impl fmt::Display for ItemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.number, self.kind)?;
        if !self.accessories.is_empty() {
            write!(f, " [{}]", self.accessories.join(", "))?;
        }
        if !self.image.is_empty() {
            write!(f, " <{}>", self.image)?;
        }
        Ok(())
    }
}
