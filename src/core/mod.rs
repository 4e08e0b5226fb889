pub mod connectivity;
pub mod structure;
