pub mod extractor;
pub mod molecular_site;
pub mod resolver;
pub mod symmetrized;

pub use extractor::{MoleculeSource, Resolution, ResolvedMolecule, SiteExtractor, StructureSource};
pub use molecular_site::{AtomSite, MolecularSite, Orientation};
pub use resolver::{ResolvedSite, SiteResolver};
pub use symmetrized::{SiteCollection, SymmetrizedCrystal};
