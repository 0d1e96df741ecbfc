//! Warnings sink for layout runs.
//!
//! A layout run always terminates with *some* layout: stage-local problems
//! such as a disconnected graph, a cell that could not be merged into a
//! single block or subsections that contradict feeder orders are absorbed
//! and recorded here instead of aborting the pipeline. Recording also emits
//! a `tracing` warning, so the sink and the logs never disagree.
//!
//! ```
//! use sld_core::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! diag.record_warning("graph", "2 connected components found");
//! diag.record_warning_for("blocks", "cell kept as undefined block", "EXTERN[a, b]");
//!
//! assert_eq!(diag.warning_count(), 2);
//! assert_eq!(diag.in_stage("blocks").count(), 1);
//! assert_eq!(diag.summary(), "2 warnings (blocks: 1, graph: 1)");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// One problem met by a pipeline stage; the layout went on with a degraded
/// result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticIssue {
    /// `graph`, `cells`, `blocks`, `intern`, `subsections` or `position`
    pub category: String,
    pub message: String,
    /// Node id or cell full id the issue is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)?;
        match &self.entity {
            Some(entity) => write!(f, " [{entity}]"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_warning(&mut self, category: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(category, "{}", message);
        self.push(category, message, None);
    }

    pub fn record_warning_for(
        &mut self,
        category: &str,
        message: impl Into<String>,
        entity: &str,
    ) {
        let message = message.into();
        tracing::warn!(category, entity, "{}", message);
        self.push(category, message, Some(entity.to_string()));
    }

    fn push(&mut self, category: &str, message: String, entity: Option<String>) {
        self.issues.push(DiagnosticIssue {
            category: category.to_string(),
            message,
            entity,
        });
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len()
    }

    pub fn has_warnings(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Issues raised by one pipeline stage
    pub fn in_stage<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Warning count followed by a per-stage breakdown
    pub fn summary(&self) -> String {
        let count = self.warning_count();
        if count == 0 {
            return "no warnings".to_string();
        }
        let mut per_stage: BTreeMap<&str, usize> = BTreeMap::new();
        for issue in &self.issues {
            *per_stage.entry(issue.category.as_str()).or_default() += 1;
        }
        let stages: Vec<String> = per_stage
            .iter()
            .map(|(stage, n)| format!("{stage}: {n}"))
            .collect();
        let plural = if count == 1 { "" } else { "s" };
        format!("{count} warning{plural} ({})", stages.join(", "))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        for issue in &self.issues {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}
