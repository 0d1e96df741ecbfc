//! Sources of busbar structural positions and extern-cell order/direction.
//!
//! The positioner only needs two facts per voltage level: where every
//! busbar sits in the (section, row) grid and in which order and on which
//! side extern cells are drawn. [`PositionFromExtension`] reads them from
//! the hints carried by the graph; [`PositionFree`] derives them from the
//! topology alone.

mod free;
mod from_extension;

pub use free::PositionFree;
pub use from_extension::PositionFromExtension;

use sld_core::{Graph, SldResult};

use crate::context::LayoutContext;
use crate::params::PositionFinderKind;

/// Assigns a structural position to every busbar and an order and a
/// direction to every extern cell.
pub trait PositionFinder {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn build_layout(&self, graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()>;
}

/// Strategy selected by the layout options
pub fn position_finder_for(kind: PositionFinderKind) -> Box<dyn PositionFinder> {
    match kind {
        PositionFinderKind::FromExtension => Box::new(PositionFromExtension),
        PositionFinderKind::Free => Box::new(PositionFree),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            position_finder_for(PositionFinderKind::FromExtension).name(),
            "from-extension"
        );
        assert_eq!(position_finder_for(PositionFinderKind::Free).name(), "free");
    }
}
