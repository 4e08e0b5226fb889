pub mod elements;

pub use elements::{atomic_number, covalent_radius, is_bonded};
