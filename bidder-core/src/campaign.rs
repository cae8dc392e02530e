use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Range;
use std::sync::Arc;

use crate::{CoreError, CoreResult};

/// A position window: `position - distance ..= position + distance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRule {
    pub position: i64,
    pub distance: i64,
}

impl PositionRule {
    pub fn new(position: i64, distance: i64) -> Self {
        Self { position, distance }
    }

    /// Inclusive on both ends. Saturates at the integer bounds.
    pub fn contains(&self, probe: i64) -> bool {
        self.position.saturating_sub(self.distance) <= probe
            && probe <= self.position.saturating_add(self.distance)
    }
}

/// Advertiser bid configuration as stored in the campaign hash.
///
/// Constraint lists are shared slices: cloning a campaign (or handing its
/// targets to a search partition) never copies the underlying data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    /// Empty means every position is eligible
    pub positions: Arc<[PositionRule]>,
    /// Empty means every publisher is eligible
    pub publishers: Arc<[i64]>,
    pub cpm: f64,
}

/// Wire shape of a stored record. Constraint lists stay untyped until
/// [`Targets::from_json`] has classified them; a missing or `null` list
/// decodes as `Value::Null` and means "unrestricted".
#[derive(Debug, Deserialize)]
struct CampaignRecord {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    positions: Value,
    #[serde(default)]
    publishers: Value,
    cpm: f64,
}

impl Campaign {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        positions: Vec<PositionRule>,
        publishers: Vec<i64>,
        cpm: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            positions: positions.into(),
            publishers: publishers.into(),
            cpm,
        }
    }

    /// Parse a raw record. `key` is the hash field the record was stored
    /// under and is carried in the error so the bad record can be located.
    ///
    /// A constraint list of the wrong shape (e.g. publisher ids that are not
    /// integers) fails with `UnsupportedCandidateType`.
    pub fn decode(key: &str, raw: &str) -> CoreResult<Self> {
        let record: CampaignRecord = serde_json::from_str(raw).map_err(|e| CoreError::MalformedRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let positions = match constraint_targets(key, &record.positions)? {
            Some(Targets::Positions(rules)) => rules,
            Some(Targets::Publishers(ids)) if ids.is_empty() => Arc::from(Vec::new()),
            None => Arc::from(Vec::new()),
            Some(Targets::Publishers(_)) => {
                return Err(CoreError::UnsupportedCandidateType(format!(
                    "record {}: positions must be position rules",
                    key
                )))
            }
        };

        let publishers = match constraint_targets(key, &record.publishers)? {
            Some(Targets::Publishers(ids)) => ids,
            None => Arc::from(Vec::new()),
            Some(Targets::Positions(_)) => {
                return Err(CoreError::UnsupportedCandidateType(format!(
                    "record {}: publishers must be integer ids",
                    key
                )))
            }
        };

        let campaign = Campaign {
            id: record.id,
            name: record.name.unwrap_or_default(),
            positions,
            publishers,
            cpm: record.cpm,
        };

        campaign.validate().map_err(|reason| CoreError::MalformedRecord {
            key: key.to_string(),
            reason,
        })?;

        Ok(campaign)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.cpm.is_finite() || self.cpm < 0.0 {
            return Err(format!("cpm must be a non-negative number, got {}", self.cpm));
        }
        if let Some(rule) = self.positions.iter().find(|r| r.distance < 0) {
            return Err(format!(
                "distance must be non-negative, got {} for position {}",
                rule.distance, rule.position
            ));
        }
        Ok(())
    }

    pub fn publisher_targets(&self) -> Targets {
        Targets::Publishers(self.publishers.clone())
    }

    pub fn position_targets(&self) -> Targets {
        Targets::Positions(self.positions.clone())
    }
}

/// What a probe value is tested against.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Discrete equality against each publisher id
    Publishers(Arc<[i64]>),
    /// Interval membership against each rule
    Positions(Arc<[PositionRule]>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Publishers(ids) => ids.len(),
            Targets::Positions(rules) => rules.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Test a single element. Out-of-range indexes never match.
    pub fn accepts(&self, index: usize, probe: i64) -> bool {
        match self {
            Targets::Publishers(ids) => ids.get(index).is_some_and(|id| *id == probe),
            Targets::Positions(rules) => rules.get(index).is_some_and(|rule| rule.contains(probe)),
        }
    }

    pub fn any_in(&self, range: Range<usize>, probe: i64) -> bool {
        range.into_iter().any(|i| self.accepts(i, probe))
    }

    /// Build targets from an untyped JSON list.
    ///
    /// An array of integers is a publisher set, an array of
    /// `{position, distance}` objects is a rule sequence. An empty array is
    /// an (unrestricted) publisher set.
    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(CoreError::UnsupportedCandidateType(format!(
                    "expected an array, got {}",
                    json_type(other)
                )))
            }
        };

        if items.iter().all(Value::is_i64) {
            let ids: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
            return Ok(Targets::Publishers(ids.into()));
        }

        if items.iter().all(Value::is_object) {
            if let Ok(rules) = serde_json::from_value::<Vec<PositionRule>>(value.clone()) {
                return Ok(Targets::Positions(rules.into()));
            }
        }

        Err(CoreError::UnsupportedCandidateType(format!(
            "array elements must all be integers or all be position rules: {}",
            value
        )))
    }
}

/// `None` for an absent or `null` list. Errors name the record key.
fn constraint_targets(key: &str, value: &Value) -> CoreResult<Option<Targets>> {
    if value.is_null() {
        return Ok(None);
    }
    Targets::from_json(value)
        .map(Some)
        .map_err(|e| match e {
            CoreError::UnsupportedCandidateType(reason) => {
                CoreError::UnsupportedCandidateType(format!("record {}: {}", key, reason))
            }
            other => other,
        })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
