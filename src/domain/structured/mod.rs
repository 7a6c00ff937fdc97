//! Resilient extraction of typed records from model output

mod parser;
mod record;
mod schema;
mod strategy;

pub use parser::{ParseOutcome, StructuredParser};
pub use record::{FieldValue, StructuredRecord};
pub use schema::{FieldKind, FieldSpec, RecordSchema, FALLBACK_TEXT, NEUTRAL_SCORE};
pub use strategy::{
    balanced_object_span, strip_code_fences, CorrectedJsonStrategy, DirectJsonStrategy,
    FieldRegexStrategy, ParseStage, ParseStrategy,
};
