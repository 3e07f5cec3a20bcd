// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of rule a finding violated.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Duplicate,
    Malformed,
    OutOfRange,
    StructurallyInvalid,
    MissingRequired,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FindingCategory::Duplicate => "duplicate",
            FindingCategory::Malformed => "malformed",
            FindingCategory::OutOfRange => "out-of-range",
            FindingCategory::StructurallyInvalid => "structurally-invalid",
            FindingCategory::MissingRequired => "missing-required",
        };
        write!(f, "{}", s)
    }
}

/// One violated rule, addressed by the field path that tripped it.
///
/// Validation never fails on the first violation: callers collect every
/// finding for a topology and report them as a single aggregated failure.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationFinding {
    pub field: String,
    pub category: FindingCategory,
    pub message: String,
}

impl ValidationFinding {
    pub fn new(
        field: impl Into<String>,
        category: FindingCategory,
        message: impl Into<String>,
    ) -> Self {
        ValidationFinding {
            field: field.into(),
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Concatenates findings into the single failure string surfaced to callers.
pub fn report(findings: &[ValidationFinding]) -> String {
    findings
        .iter()
        .map(ValidationFinding::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
