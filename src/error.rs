use thiserror::Error;

use crate::mesh::CellType;

/// Errors raised by the cell locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("cells of kind `{0}` are not supported by this locator")]
    UnsupportedCellKind(CellType),
    #[error("no mesh is attached to the locator")]
    NotAttached,
    #[error("the locator has not been built")]
    NotBuilt,
    #[error("the cell tree is {depth} levels deep, more than the maximum of {max_depth}")]
    TraversalDepthExceeded { depth: usize, max_depth: usize },
}
