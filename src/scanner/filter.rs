//! Filter rules and their evaluation against symbol records.
//!
//! A request carries one or more filter lists. Rules inside a list
//! combine under the list's mode (AND/OR); the lists themselves always
//! combine with AND. An empty list matches everything, so optional
//! request sections cost nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::fields::{Field, SymbolRecord};

// ============================================================================
// Operators
// ============================================================================

/// Comparison operator for a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Le),
            ">=" => Some(Self::Ge),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Gt => left > right,
            Self::Le => left <= right,
            Self::Ge => left >= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// How rules inside one list combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    #[default]
    And,
    Or,
}

// ============================================================================
// Rules
// ============================================================================

/// Comparison value: numeric for metrics, text for sector/industry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One comparison as it arrives in a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    /// Field name or alias (e.g., "rsi", "pe")
    pub field: String,
    /// Comparison operator
    pub operator: CompareOp,
    /// Value to compare against
    pub value: FilterValue,
}

impl FilterRule {
    pub fn new(field: impl Into<String>, operator: CompareOp, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Human-readable form, used in logs and match reports.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.field, self.operator, self.value)
    }
}

/// A group of rules sharing one combine mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterList {
    #[serde(default)]
    pub mode: CombineMode,
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

// ============================================================================
// Compiled Form
// ============================================================================

/// A rule with its field name resolved once, before the scan loop.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// `None` for unknown field names; such rules never match
    field: Option<Field>,
    operator: CompareOp,
    value: FilterValue,
    description: String,
}

impl CompiledRule {
    fn compile(rule: &FilterRule) -> Self {
        let field = Field::resolve(&rule.field);
        if field.is_none() {
            warn!(field = %rule.field, "Unknown filter field, rule will never match");
        }

        Self {
            field,
            operator: rule.operator,
            value: rule.value.clone(),
            description: rule.describe(),
        }
    }

    /// Whether a record satisfies this rule.
    ///
    /// A missing value never matches, whatever the operator; filters
    /// select on evidence, not on absence.
    pub fn matches(&self, record: &SymbolRecord) -> bool {
        let Some(field) = self.field else {
            return false;
        };

        if field.is_text() {
            let (Some(actual), FilterValue::Text(expected)) =
                (record.text(field), &self.value)
            else {
                return false;
            };
            return match self.operator {
                CompareOp::Eq => actual.eq_ignore_ascii_case(expected),
                CompareOp::Ne => !actual.eq_ignore_ascii_case(expected),
                // Ordering comparisons are meaningless for text
                _ => false,
            };
        }

        let (Some(actual), FilterValue::Number(expected)) =
            (record.numeric(field), &self.value)
        else {
            return false;
        };
        self.operator.apply(actual, *expected)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn uses_fundamentals(&self) -> bool {
        self.field.is_some_and(|f| f.is_fundamental())
    }
}

/// A filter list with all rules compiled.
#[derive(Debug, Clone)]
pub struct CompiledList {
    mode: CombineMode,
    rules: Vec<CompiledRule>,
}

impl CompiledList {
    pub fn compile(list: &FilterList) -> Self {
        Self {
            mode: list.mode,
            rules: list.rules.iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Evaluate the list against a record. Empty lists are vacuously true.
    pub fn matches(&self, record: &SymbolRecord) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        match self.mode {
            CombineMode::And => self.rules.iter().all(|r| r.matches(record)),
            CombineMode::Or => self.rules.iter().any(|r| r.matches(record)),
        }
    }

    /// Descriptions of the rules a record satisfied.
    pub fn matched_descriptions(&self, record: &SymbolRecord) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.matches(record))
            .map(|r| r.description().to_string())
            .collect()
    }

    /// Whether any rule in the list reads a fundamental field.
    pub fn uses_fundamentals(&self) -> bool {
        self.rules.iter().any(|r| r.uses_fundamentals())
    }
}

/// Compile all lists of a request.
pub fn compile_filters(lists: &[FilterList]) -> Vec<CompiledList> {
    lists.iter().map(CompiledList::compile).collect()
}

/// Evaluate all lists; every list must pass.
pub fn record_matches(lists: &[CompiledList], record: &SymbolRecord) -> bool {
    lists.iter().all(|l| l.matches(record))
}

/// Whether any compiled rule needs fundamental data. Scans without
/// fundamental rules skip the fundamentals fetch entirely.
pub fn filters_use_fundamentals(lists: &[CompiledList]) -> bool {
    lists.iter().any(|l| l.uses_fundamentals())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FundamentalSnapshot;
    use crate::indicators::IndicatorSnapshot;

    fn record_with_rsi(rsi: f64) -> SymbolRecord {
        let mut ind = IndicatorSnapshot::default();
        ind.rsi = Some(rsi);
        SymbolRecord {
            symbol: "TEST".to_string(),
            close: Some(100.0),
            indicators: Some(ind),
            ..Default::default()
        }
    }

    fn rule(field: &str, op: CompareOp, value: f64) -> FilterRule {
        FilterRule::new(field, op, FilterValue::Number(value))
    }

    #[test]
    fn test_operator_parse_and_display() {
        for op_str in ["<", ">", "<=", ">=", "==", "!="] {
            let op = CompareOp::parse(op_str).unwrap();
            assert_eq!(op.to_string(), op_str);
        }
        assert_eq!(CompareOp::parse("="), Some(CompareOp::Eq));
        assert_eq!(CompareOp::parse("<>"), None);
    }

    #[test]
    fn test_numeric_rule_matching() {
        let compiled = CompiledRule::compile(&rule("rsi", CompareOp::Lt, 30.0));
        assert!(compiled.matches(&record_with_rsi(25.0)));
        assert!(!compiled.matches(&record_with_rsi(35.0)));
    }

    #[test]
    fn test_alias_resolution_in_rule() {
        let mut fnd = FundamentalSnapshot::new("TEST");
        fnd.trailing_pe = Some(12.0);
        let record = SymbolRecord {
            symbol: "TEST".to_string(),
            fundamentals: Some(fnd),
            ..Default::default()
        };

        let compiled = CompiledRule::compile(&rule("pe", CompareOp::Lt, 15.0));
        assert!(compiled.matches(&record));
    }

    #[test]
    fn test_missing_value_never_matches() {
        let record = SymbolRecord {
            symbol: "TEST".to_string(),
            ..Default::default()
        };

        // Even != cannot match an absent value
        let compiled = CompiledRule::compile(&rule("rsi", CompareOp::Ne, 50.0));
        assert!(!compiled.matches(&record));
    }

    #[test]
    fn test_unknown_field_never_matches() {
        let compiled = CompiledRule::compile(&rule("quantum_score", CompareOp::Gt, 0.0));
        assert!(!compiled.matches(&record_with_rsi(50.0)));
    }

    #[test]
    fn test_text_rule_case_insensitive() {
        let mut fnd = FundamentalSnapshot::new("TEST");
        fnd.sector = Some("Technology".to_string());
        let record = SymbolRecord {
            symbol: "TEST".to_string(),
            fundamentals: Some(fnd),
            ..Default::default()
        };

        let eq = CompiledRule::compile(&FilterRule::new(
            "sector",
            CompareOp::Eq,
            FilterValue::Text("technology".to_string()),
        ));
        assert!(eq.matches(&record));

        let lt = CompiledRule::compile(&FilterRule::new(
            "sector",
            CompareOp::Lt,
            FilterValue::Text("technology".to_string()),
        ));
        assert!(!lt.matches(&record));
    }

    #[test]
    fn test_and_or_modes() {
        let record = record_with_rsi(25.0); // close = 100

        let and_list = CompiledList::compile(&FilterList {
            mode: CombineMode::And,
            rules: vec![rule("rsi", CompareOp::Lt, 30.0), rule("close", CompareOp::Gt, 200.0)],
        });
        assert!(!and_list.matches(&record));

        let or_list = CompiledList::compile(&FilterList {
            mode: CombineMode::Or,
            rules: vec![rule("rsi", CompareOp::Lt, 30.0), rule("close", CompareOp::Gt, 200.0)],
        });
        assert!(or_list.matches(&record));
    }

    #[test]
    fn test_empty_list_is_vacuously_true() {
        let list = CompiledList::compile(&FilterList::default());
        assert!(list.matches(&SymbolRecord::default()));
    }

    #[test]
    fn test_lists_combine_with_and() {
        let record = record_with_rsi(25.0);

        let passing = FilterList {
            mode: CombineMode::And,
            rules: vec![rule("rsi", CompareOp::Lt, 30.0)],
        };
        let failing = FilterList {
            mode: CombineMode::And,
            rules: vec![rule("close", CompareOp::Gt, 200.0)],
        };

        let both = compile_filters(&[passing.clone(), failing]);
        assert!(!record_matches(&both, &record));

        let alone = compile_filters(&[passing]);
        assert!(record_matches(&alone, &record));

        // No lists at all: everything passes
        assert!(record_matches(&[], &record));
    }

    #[test]
    fn test_fundamental_usage_detection() {
        let technical = compile_filters(&[FilterList {
            mode: CombineMode::And,
            rules: vec![rule("rsi", CompareOp::Lt, 30.0)],
        }]);
        assert!(!filters_use_fundamentals(&technical));

        let mixed = compile_filters(&[
            FilterList {
                mode: CombineMode::And,
                rules: vec![rule("rsi", CompareOp::Lt, 30.0)],
            },
            FilterList {
                mode: CombineMode::And,
                rules: vec![rule("pe", CompareOp::Lt, 15.0)],
            },
        ]);
        assert!(filters_use_fundamentals(&mixed));

        let sector_only = compile_filters(&[FilterList {
            mode: CombineMode::And,
            rules: vec![FilterRule::new(
                "sector",
                CompareOp::Eq,
                FilterValue::Text("Energy".to_string()),
            )],
        }]);
        assert!(filters_use_fundamentals(&sector_only));
    }

    #[test]
    fn test_filter_value_deserializes_untagged() {
        let rule: FilterRule =
            serde_json::from_str(r#"{"field": "rsi", "operator": "<", "value": 30}"#).unwrap();
        assert_eq!(rule.value, FilterValue::Number(30.0));

        let rule: FilterRule =
            serde_json::from_str(r#"{"field": "sector", "operator": "==", "value": "Energy"}"#)
                .unwrap();
        assert_eq!(rule.value, FilterValue::Text("Energy".to_string()));
    }
}
