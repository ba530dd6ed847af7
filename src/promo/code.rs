//! Promo code records and their shape rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::PromoRejection;
use crate::error::{Result, StoreguardError};

/// Longest accepted code string.
const MAX_CODE_LEN: usize = 64;

/// Kinds of paid content a code can unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Meditation,
    Book,
}

impl ContentType {
    /// Wire name of the content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Meditation => "meditation",
            ContentType::Book => "book",
        }
    }

    /// Parse a scope where `""`, `"*"` and `"all"` mean every content type.
    pub fn parse_scope(value: &str) -> Result<Option<ContentType>> {
        match value.trim() {
            "" | "*" | "all" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = StoreguardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meditation" => Ok(ContentType::Meditation),
            "book" => Ok(ContentType::Book),
            other => Err(StoreguardError::validation(format!(
                "unknown content type: {:?}",
                other
            ))),
        }
    }
}

/// Canonical form of a code string: trimmed and uppercased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Canonical form of a content id scope; `""` and `"*"` mean every item.
pub fn normalize_content_id(raw: Option<String>) -> Option<String> {
    raw.map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && id != "*")
}

/// A promo code and its usage bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Normalized code string
    pub code: String,
    /// Discount in percent, 100 meaning free
    pub discount_percent: u8,
    /// Content type the code is limited to, `None` for every type
    pub applicable_content_type: Option<ContentType>,
    /// Content item the code is limited to, `None` for every item
    pub applicable_content_id: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Cap on total redemptions
    pub max_uses: Option<u32>,
    pub used_count: u32,
    /// Manual kill switch
    pub active: bool,
}

impl PromoCode {
    /// Check the code against a requested content item at `now`.
    ///
    /// Checks run in a fixed order and the first failure wins. Returns the
    /// discount when the code can be used.
    pub fn check(
        &self,
        now: DateTime<Utc>,
        content_type: ContentType,
        content_id: &str,
    ) -> std::result::Result<u8, PromoRejection> {
        if !self.active {
            return Err(PromoRejection::Inactive);
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return Err(PromoRejection::NotYetActive);
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(PromoRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(PromoRejection::UsageLimitReached);
        }
        if !self.applies_to(content_type, content_id) {
            return Err(PromoRejection::NotApplicable);
        }
        Ok(self.discount_percent)
    }

    /// Whether `max_uses` has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    /// Whether the code's scope covers the given content.
    pub fn applies_to(&self, content_type: ContentType, content_id: &str) -> bool {
        let type_matches = self
            .applicable_content_type
            .map_or(true, |scope| scope == content_type);
        let id_matches = self
            .applicable_content_id
            .as_deref()
            .map_or(true, |scope| scope == content_id.trim());
        type_matches && id_matches
    }

    fn validate(&self) -> Result<()> {
        validate_code_format(&self.code)?;

        if self.discount_percent > 100 {
            return Err(StoreguardError::validation(format!(
                "discount must be between 0 and 100, got {}",
                self.discount_percent
            )));
        }

        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err(StoreguardError::validation(format!(
                    "valid_from ({}) is after valid_until ({})",
                    from, until
                )));
            }
        }

        Ok(())
    }
}

fn validate_code_format(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(StoreguardError::validation("code must not be empty"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(StoreguardError::validation(format!(
            "code must be at most {} characters",
            MAX_CODE_LEN
        )));
    }
    if let Some(bad) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(StoreguardError::validation(format!(
            "code contains invalid character {:?}",
            bad
        )));
    }
    Ok(())
}

fn discount_from(value: u32) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|discount| *discount <= 100)
        .ok_or_else(|| {
            StoreguardError::validation(format!(
                "discount must be between 0 and 100, got {}",
                value
            ))
        })
}

fn default_active() -> bool {
    true
}

/// Input for creating a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPromoCode {
    pub code: String,
    pub discount_percent: u32,
    #[serde(default, rename = "content_type")]
    pub applicable_content_type: Option<ContentType>,
    #[serde(default, rename = "content_id")]
    pub applicable_content_id: Option<String>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewPromoCode {
    /// An active, unrestricted code.
    pub fn new(code: impl Into<String>, discount_percent: u32) -> Self {
        Self {
            code: code.into(),
            discount_percent,
            applicable_content_type: None,
            applicable_content_id: None,
            valid_from: None,
            valid_until: None,
            max_uses: None,
            active: true,
        }
    }

    /// Limit the code to one content type.
    pub fn for_content_type(mut self, content_type: ContentType) -> Self {
        self.applicable_content_type = Some(content_type);
        self
    }

    /// Limit the code to one content item.
    pub fn for_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.applicable_content_id = Some(content_id.into());
        self
    }

    /// Bound the code's active window.
    pub fn valid_between(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Cap the number of redemptions.
    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    /// Build the stored record, normalizing and checking every field.
    pub fn into_promo_code(self) -> Result<PromoCode> {
        let promo = PromoCode {
            code: normalize_code(&self.code),
            discount_percent: discount_from(self.discount_percent)?,
            applicable_content_type: self.applicable_content_type,
            applicable_content_id: normalize_content_id(self.applicable_content_id),
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            max_uses: self.max_uses,
            used_count: 0,
            active: self.active,
        };
        promo.validate()?;
        Ok(promo)
    }
}

/// Partial update of a promo code.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromoCodeUpdate {
    pub discount_percent: Option<u32>,
    pub applicable_content_type: Option<Option<ContentType>>,
    pub applicable_content_id: Option<Option<String>>,
    pub valid_from: Option<Option<DateTime<Utc>>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub max_uses: Option<Option<u32>>,
    pub active: Option<bool>,
}

impl PromoCodeUpdate {
    /// Merge into a copy of `current` and check the result.
    pub(crate) fn apply(self, current: &PromoCode) -> Result<PromoCode> {
        let mut updated = current.clone();

        if let Some(discount) = self.discount_percent {
            updated.discount_percent = discount_from(discount)?;
        }
        if let Some(content_type) = self.applicable_content_type {
            updated.applicable_content_type = content_type;
        }
        if let Some(content_id) = self.applicable_content_id {
            updated.applicable_content_id = normalize_content_id(content_id);
        }
        if let Some(valid_from) = self.valid_from {
            updated.valid_from = valid_from;
        }
        if let Some(valid_until) = self.valid_until {
            updated.valid_until = valid_until;
        }
        if let Some(max_uses) = self.max_uses {
            updated.max_uses = max_uses;
        }
        if let Some(active) = self.active {
            updated.active = active;
        }

        updated.validate()?;
        Ok(updated)
    }
}
