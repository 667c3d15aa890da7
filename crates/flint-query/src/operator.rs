use std::fmt;

/// Query language keywords emitted into filter documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    Nor,
    Not,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Regex,
    Options,
    All,
    Size,
    Exists,
    ElemMatch,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "$and",
            Operator::Or => "$or",
            Operator::Nor => "$nor",
            Operator::Not => "$not",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::NotIn => "$nin",
            Operator::Regex => "$regex",
            Operator::Options => "$options",
            Operator::All => "$all",
            Operator::Size => "$size",
            Operator::Exists => "$exists",
            Operator::ElemMatch => "$elemMatch",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `$options` value for case-insensitive regex matching.
pub const CASE_INSENSITIVE: &str = "i";
