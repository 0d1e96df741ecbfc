//! Per-run state threaded through every layout stage.

use sld_core::{CellId, Diagnostics};

/// Cell numbering and the warnings sink of one layout computation.
#[derive(Debug, Default)]
pub struct LayoutContext {
    next_cell: usize,
    pub diagnostics: Diagnostics,
}

impl LayoutContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next cell
    pub fn next_cell_id(&mut self) -> CellId {
        let id = CellId::new(self.next_cell);
        self.next_cell += 1;
        id
    }

    pub fn warn(&mut self, category: &str, message: impl Into<String>) {
        self.diagnostics.record_warning(category, message);
    }

    pub fn warn_for(&mut self, category: &str, message: impl Into<String>, entity: &str) {
        self.diagnostics.record_warning_for(category, message, entity);
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ids_increase() {
        let mut ctx = LayoutContext::new();
        assert_eq!(ctx.next_cell_id().value(), 0);
        assert_eq!(ctx.next_cell_id().value(), 1);
    }

    #[test]
    fn test_warn_lands_in_diagnostics() {
        let mut ctx = LayoutContext::new();
        ctx.warn("graph", "2 connected components found");
        ctx.warn_for("blocks", "cell kept as undefined block", "EXTERN[a]");
        let diag = ctx.into_diagnostics();
        assert_eq!(diag.warning_count(), 2);
    }
}
