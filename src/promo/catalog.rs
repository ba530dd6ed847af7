//! Promo code catalog files.
//!
//! A catalog seeds the store at start-up. It is either a mapping with a
//! `promo_codes` list or a bare list of codes:
//!
//! ```yaml
//! promo_codes:
//!   - code: SAVE20
//!     discount_percent: 20
//!     content_type: meditation
//!     valid_until: 2027-01-01T00:00:00Z
//!     max_uses: 100
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use tracing::info;

use super::code::NewPromoCode;
use crate::error::Result;

/// A set of codes to create at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoCatalog {
    #[serde(default)]
    pub promo_codes: Vec<NewPromoCode>,
}

impl PromoCatalog {
    /// Load a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading promo catalog");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a catalog from a YAML string.
    ///
    /// The document's shape picks the form, so parse errors describe the
    /// form actually written.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(yaml)?;
        match document {
            Value::Null => Ok(Self::default()),
            Value::Sequence(_) => Ok(Self {
                promo_codes: serde_yaml::from_value(document)?,
            }),
            other => Ok(serde_yaml::from_value(other)?),
        }
    }

    /// Number of codes in the catalog.
    pub fn len(&self) -> usize {
        self.promo_codes.len()
    }

    /// Whether the catalog holds no codes.
    pub fn is_empty(&self) -> bool {
        self.promo_codes.is_empty()
    }
}
