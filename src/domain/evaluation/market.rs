//! Claimed versus externally validated market sizing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::ConfidenceLevel;
use crate::domain::context::EntityId;
use crate::domain::storage::StorageEntity;
use crate::domain::structured::{FieldSpec, FieldValue, RecordSchema, StructuredRecord};

pub const VALIDATION_UNAVAILABLE: &str = "Validation unavailable";
pub const GROWTH_UNAVAILABLE: &str = "Data unavailable";

pub const FIELD_TAM: &str = "tam";
pub const FIELD_SAM: &str = "sam";
pub const FIELD_SOM: &str = "som";
pub const FIELD_TAM_DESCRIPTION: &str = "tam_description";
pub const FIELD_SAM_DESCRIPTION: &str = "sam_description";
pub const FIELD_SOM_DESCRIPTION: &str = "som_description";
pub const FIELD_GROWTH_RATE: &str = "growth_rate";
pub const FIELD_SOURCE: &str = "source";

/// Share of TAM assumed serviceable when only TAM could be validated
const DERIVED_SAM_SHARE: f64 = 0.3;
/// Share of SAM assumed obtainable when only SAM is known
const DERIVED_SOM_SHARE: f64 = 0.1;

fn size_field(name: &str) -> FieldSpec {
    FieldSpec::number(name).with_default(FieldValue::Number(0.0))
}

fn optional_text(name: &str) -> FieldSpec {
    FieldSpec::text(name).with_default(FieldValue::Text(String::new()))
}

/// Fields requested when reading the entity's own market claims
pub fn claimed_market_schema() -> RecordSchema {
    RecordSchema::new(vec![
        size_field(FIELD_TAM),
        size_field(FIELD_SAM),
        size_field(FIELD_SOM),
        optional_text(FIELD_TAM_DESCRIPTION),
        optional_text(FIELD_SAM_DESCRIPTION),
        optional_text(FIELD_SOM_DESCRIPTION),
        optional_text(FIELD_GROWTH_RATE),
    ])
}

/// Fields requested when sizing the market from search evidence
pub fn validated_market_schema() -> RecordSchema {
    RecordSchema::new(vec![
        size_field(FIELD_TAM),
        size_field(FIELD_SAM),
        size_field(FIELD_SOM),
        FieldSpec::text(FIELD_SOURCE).with_default(FieldValue::Text(VALIDATION_UNAVAILABLE.to_string())),
    ])
}

/// TAM, SAM and SOM in billions of US dollars; zero means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSizes {
    pub tam: f64,
    pub sam: f64,
    pub som: f64,
}

impl MarketSizes {
    pub fn from_record(record: &StructuredRecord) -> Self {
        let size = |name: &str| record.number(name).filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0);
        Self {
            tam: size(FIELD_TAM),
            sam: size(FIELD_SAM),
            som: size(FIELD_SOM),
        }
    }

    /// Fill missing SAM and SOM from the tier above
    pub fn with_derived_tiers(mut self) -> Self {
        if self.sam == 0.0 {
            self.sam = self.tam * DERIVED_SAM_SHARE;
        }
        if self.som == 0.0 {
            self.som = self.sam * DERIVED_SOM_SHARE;
        }
        self
    }

    pub fn is_known(&self) -> bool {
        self.tam > 0.0
    }
}

/// Market sizing as stated in the entity's documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimedMarket {
    pub sizes: MarketSizes,
    pub tam_description: Option<String>,
    pub sam_description: Option<String>,
    pub som_description: Option<String>,
    pub growth_rate: Option<String>,
}

impl ClaimedMarket {
    pub fn from_record(record: &StructuredRecord) -> Self {
        let text = |name: &str| {
            record
                .text(name)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            sizes: MarketSizes::from_record(record),
            tam_description: text(FIELD_TAM_DESCRIPTION),
            sam_description: text(FIELD_SAM_DESCRIPTION),
            som_description: text(FIELD_SOM_DESCRIPTION),
            growth_rate: text(FIELD_GROWTH_RATE),
        }
    }
}

/// Market sizing found by web search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedMarket {
    pub sizes: MarketSizes,
    pub source: String,
}

impl ValidatedMarket {
    pub fn unavailable() -> Self {
        Self {
            sizes: MarketSizes::default(),
            source: VALIDATION_UNAVAILABLE.to_string(),
        }
    }

    pub fn from_record(record: &StructuredRecord) -> Self {
        let source = record
            .text(FIELD_SOURCE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(VALIDATION_UNAVAILABLE);
        Self {
            sizes: MarketSizes::from_record(record).with_derived_tiers(),
            source: source.to_string(),
        }
    }
}

/// How the claimed TAM compares with the validated one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingVerdict {
    /// More than ten times the validated figure
    Exaggerated,
    Overstated,
    Inflated,
    Realistic,
    Conservative,
    /// One side of the comparison is missing
    Unverified,
}

impl SizingVerdict {
    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match ratio {
            None => Self::Unverified,
            Some(r) if r > 10.0 => Self::Exaggerated,
            Some(r) if r > 5.0 => Self::Overstated,
            Some(r) if r > 2.0 => Self::Inflated,
            Some(r) if r < 0.8 => Self::Conservative,
            Some(_) => Self::Realistic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exaggerated => "exaggerated",
            Self::Overstated => "overstated",
            Self::Inflated => "inflated",
            Self::Realistic => "realistic",
            Self::Conservative => "conservative",
            Self::Unverified => "unverified",
        }
    }
}

/// Claimed over validated TAM, when both are known
pub fn inflation_ratio(claimed: &MarketSizes, validated: &MarketSizes) -> Option<f64> {
    (claimed.is_known() && validated.is_known()).then(|| claimed.tam / validated.tam)
}

/// Persisted outcome of one market analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub id: String,
    pub entity_id: EntityId,
    pub claimed: ClaimedMarket,
    pub validated: ValidatedMarket,
    pub inflation_ratio: Option<f64>,
    pub verdict: SizingVerdict,
    pub insights: Vec<String>,
    pub growth_rate: String,
    /// High only when an external figure backs the comparison
    pub confidence: ConfidenceLevel,
    pub analyzed_at: DateTime<Utc>,
}

impl MarketAnalysis {
    pub fn assess(
        id: impl Into<String>,
        entity_id: EntityId,
        claimed: ClaimedMarket,
        validated: ValidatedMarket,
    ) -> Self {
        let ratio = inflation_ratio(&claimed.sizes, &validated.sizes);
        let verdict = SizingVerdict::from_ratio(ratio);
        let insights = insights(&claimed.sizes, &validated.sizes, verdict, ratio);
        let confidence = if validated.sizes.is_known() {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Low
        };

        Self {
            id: id.into(),
            entity_id,
            growth_rate: claimed
                .growth_rate
                .clone()
                .unwrap_or_else(|| GROWTH_UNAVAILABLE.to_string()),
            claimed,
            validated,
            inflation_ratio: ratio,
            verdict,
            insights,
            confidence,
            analyzed_at: Utc::now(),
        }
    }
}

fn insights(claimed: &MarketSizes, validated: &MarketSizes, verdict: SizingVerdict, ratio: Option<f64>) -> Vec<String> {
    let mut out = Vec::new();

    if !claimed.is_known() {
        out.push("No market size claims found in the documents".to_string());
    }
    if !validated.is_known() {
        out.push("Market size could not be validated externally".to_string());
    }

    if let Some(ratio) = ratio {
        let figures = format!(
            "claimed ${:.1}B vs validated ${:.1}B",
            claimed.tam, validated.tam
        );
        out.push(match verdict {
            SizingVerdict::Exaggerated => format!("Critical: TAM inflated {:.1}x ({})", ratio, figures),
            SizingVerdict::Overstated => format!("TAM significantly overstated by {:.1}x ({})", ratio, figures),
            SizingVerdict::Inflated => format!("TAM appears inflated by {:.1}x ({})", ratio, figures),
            SizingVerdict::Conservative => format!("Conservative TAM estimate ({})", figures),
            SizingVerdict::Realistic | SizingVerdict::Unverified => format!("Realistic TAM estimate ({})", figures),
        });
    }

    if claimed.som > 0.0 && claimed.tam > 0.0 && claimed.som / claimed.tam > DERIVED_SAM_SHARE {
        out.push(format!(
            "Claimed SOM is {:.0}% of TAM, an aggressive capture assumption",
            claimed.som / claimed.tam * 100.0
        ));
    }

    out
}

impl StorageEntity for MarketAnalysis {
    type Key = String;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
