//! Compliance audit over raw ledger lines.
//!
//! Reading is permissive; this is where the ledger is strict. Every line is
//! checked for the envelope fields and a well-formed `payload_hash`.

use serde_json::Value;
use tally_types::ContentHash;

use crate::traits::RawLine;

/// Result of auditing a receipt log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub total_lines: u64,
    pub compliant: u64,
    pub violations: Vec<AuditViolation>,
}

impl AuditReport {
    /// Returns `true` if every line passed.
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }

    /// Line numbers with at least one violation, ascending and deduplicated.
    pub fn failing_lines(&self) -> Vec<usize> {
        let mut lines: Vec<usize> = self.violations.iter().map(|v| v.line).collect();
        lines.dedup();
        lines
    }
}

/// A specific compliance failure on one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditViolation {
    pub line: usize,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// Not JSON, or JSON but not an object.
    Unparseable,
    MissingField(&'static str),
    WrongFieldType(&'static str),
    MalformedPayloadHash,
}

/// Audit lines in order. Never fails; every problem becomes a violation.
pub fn audit_lines(lines: &[RawLine]) -> AuditReport {
    let mut report = AuditReport {
        total_lines: lines.len() as u64,
        ..AuditReport::default()
    };

    for line in lines {
        let before = report.violations.len();
        match line {
            RawLine::Corrupt { number, reason } => report.violations.push(AuditViolation {
                line: *number,
                kind: ViolationKind::Unparseable,
                description: reason.clone(),
            }),
            RawLine::Parsed { number, value } => {
                audit_value(*number, value, &mut report.violations)
            }
        }
        if report.violations.len() == before {
            report.compliant += 1;
        }
    }

    report
}

fn audit_value(line: usize, value: &Value, violations: &mut Vec<AuditViolation>) {
    let Some(map) = value.as_object() else {
        violations.push(AuditViolation {
            line,
            kind: ViolationKind::Unparseable,
            description: "line is not a JSON object".into(),
        });
        return;
    };

    let mut require = |field: &'static str, ok: fn(&Value) -> bool, expected: &str| {
        match map.get(field) {
            None => violations.push(AuditViolation {
                line,
                kind: ViolationKind::MissingField(field),
                description: format!("missing required field `{field}`"),
            }),
            Some(v) if !ok(v) => violations.push(AuditViolation {
                line,
                kind: ViolationKind::WrongFieldType(field),
                description: format!("`{field}` must be {expected}"),
            }),
            Some(_) => {}
        }
    };

    require("receipt_type", Value::is_string, "a string");
    require(
        "ts",
        |v| v.is_string() || v.is_number(),
        "a number or an ISO-8601 string",
    );
    require("tenant_id", Value::is_string, "a string");
    require("payload_hash", Value::is_string, "a string");

    if let Some(hash) = map.get("payload_hash").and_then(Value::as_str) {
        if !ContentHash::from_raw(hash).is_well_formed() {
            violations.push(AuditViolation {
                line,
                kind: ViolationKind::MalformedPayloadHash,
                description: format!("payload_hash `{hash}` is not <64-hex>:<64-hex>"),
            });
        }
    }
}
