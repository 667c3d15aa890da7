use bson::spec::ElementType;

/// Errors raised while building or normalizing an expression.
///
/// Operand/field type mismatches never reach here: they are compile errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("duplicate output alias in reducer stage: {0}")]
    DuplicateAlias(String),

    #[error("invalid output alias: {0:?}")]
    InvalidAlias(String),

    #[error("{0} reducer needs at least one field")]
    NoReducerFields(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("value of type {0:?} is not numeric")]
    NotNumeric(ElementType),

    #[error("numeric overflow converting {value} to {target}")]
    NumericOverflow { value: String, target: &'static str },

    #[error("decimal conversion failed: {0}")]
    Decimal(String),
}
