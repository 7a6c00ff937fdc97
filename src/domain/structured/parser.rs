//! Staged parser turning free-form model output into a typed record

use super::record::StructuredRecord;
use super::schema::RecordSchema;
use super::strategy::{
    CorrectedJsonStrategy, DirectJsonStrategy, FieldRegexStrategy, ParseStage, ParseStrategy,
};

/// Parsed record together with the stage that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub record: StructuredRecord,
    pub stage: ParseStage,
}

impl ParseOutcome {
    /// Anything past a direct parse is reported as degraded
    pub fn is_degraded(&self) -> bool {
        self.stage != ParseStage::Direct
    }
}

/// Ordered chain of parse strategies ending in a deterministic default record.
///
/// `parse` is total: every input, including empty strings and prose, yields a record.
#[derive(Debug)]
pub struct StructuredParser {
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Default for StructuredParser {
    fn default() -> Self {
        Self::new(vec![
            Box::new(DirectJsonStrategy),
            Box::new(CorrectedJsonStrategy),
            Box::new(FieldRegexStrategy),
        ])
    }
}

impl StructuredParser {
    pub fn new(strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn parse(&self, raw: &str, schema: &RecordSchema) -> ParseOutcome {
        for strategy in &self.strategies {
            if let Some(record) = strategy.attempt(raw, schema) {
                return ParseOutcome {
                    record,
                    stage: strategy.stage(),
                };
            }
        }

        ParseOutcome {
            record: schema.default_record(),
            stage: ParseStage::Fallback,
        }
    }
}
