pub mod group;
pub mod merge;
pub mod operation;

pub use group::{AxisPermutation, LatticeFamily, SpaceGroup, WyckoffPosition};
pub use merge::{merge_special_position, MergedSite};
pub use operation::SymOp;
