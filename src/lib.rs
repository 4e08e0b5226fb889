// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod analysis;
pub mod chemistry;
pub mod core;
pub mod error;
pub mod io;
pub mod site;
pub mod symmetry;

// ============================================================================
// RE-EXPORTS (Public API)
// ============================================================================
pub use crate::analysis::{align, Alignment, MatchResult, MoleculeMatcher};
pub use crate::core::connectivity::MoleculeFinder;
pub use crate::core::structure::{
    AlignedMolecule, Atom, CellEnergy, Crystal, Lattice, MolAtom, Molecule,
};
pub use crate::error::{SiteError, StructureError, SymmetryError};
pub use crate::io::writer::{to_cif, write_cif, WriteMode};
pub use crate::io::{parser, writer};
pub use crate::site::{
    AtomSite, MolecularSite, MoleculeSource, Orientation, Resolution, ResolvedMolecule,
    SiteCollection, SiteExtractor, StructureSource, SymmetrizedCrystal,
};
pub use crate::symmetry::{LatticeFamily, SpaceGroup, SymOp, WyckoffPosition};

use crate::core::connectivity::DEFAULT_NEIGHBOR_CUTOFF;
use crate::site::resolver::DEFAULT_MERGE_TOLERANCE;
use tracing::warn;

// ============================================================================
// HIGH-LEVEL INTERFACE
// ============================================================================

/// Configuration for the site extraction pipeline.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Fractional slack on covalent-radius sums when deciding bonds.
    pub bond_tolerance: f64,
    /// Radius of the periodic neighbor query during fragment search, in Å.
    pub neighbor_cutoff: f64,
    /// Search radius for special-position merging, in Å.
    pub merge_tolerance: f64,
    /// Keep the fragment's atoms in crystal order instead of visitation order.
    pub keep_order: bool,
    /// Build the site from the reference molecule plus an orientation rather
    /// than from the extracted fragment.
    pub use_reference: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            bond_tolerance: 0.2,
            neighbor_cutoff: DEFAULT_NEIGHBOR_CUTOFF,
            merge_tolerance: DEFAULT_MERGE_TOLERANCE,
            keep_order: false,
            use_reference: false,
        }
    }
}

/// Runs the pipeline and returns the matched molecule, or a
/// [`SiteError::ConnectivityMismatch`] after logging both molecules.
pub fn resolve_molecule(
    structure: impl Into<StructureSource>,
    reference: impl Into<MoleculeSource>,
    config: &ExtractionConfig,
) -> Result<ResolvedMolecule, SiteError> {
    let extractor = SiteExtractor::new(structure, reference, config)?;
    match extractor.resolve()? {
        Resolution::Matched(resolved) => Ok(*resolved),
        Resolution::Mismatch { reference, candidate } => {
            warn!("extracted molecule does not match the reference");
            warn!("reference:\n{}", reference);
            warn!("extracted:\n{}", candidate);
            Err(SiteError::ConnectivityMismatch {
                reference: reference.len(),
                candidate: candidate.len(),
            })
        }
    }
}

/// Extracts the molecular site of `structure` for the given reference molecule.
pub fn extract_site(
    structure: impl Into<StructureSource>,
    reference: impl Into<MoleculeSource>,
    config: &ExtractionConfig,
) -> Result<MolecularSite, SiteError> {
    resolve_molecule(structure, reference, config)?.make_site(config.use_reference)
}

/// The Master Pipeline function: symmetrized structure plus a short report.
pub fn extract_structure(
    structure: impl Into<StructureSource>,
    reference: impl Into<MoleculeSource>,
    config: &ExtractionConfig,
) -> Result<(SymmetrizedCrystal, String), SiteError> {
    let resolved = resolve_molecule(structure, reference, config)?;
    let symmetrized = resolved.to_symmetrized(config.use_reference)?;

    let p = resolved.site.position;
    let merge_line = match resolved.site.merged {
        Some(distance) => format!("merged onto special position ({:.4} Å shift)", distance),
        None => "general position".to_string(),
    };
    let report = format!(
        "--- Site Extraction Report ---\n\
         • Space group:     {} ({})\n\
         • Wyckoff site:    {} ({})\n\
         • Position:        ({:.6}, {:.6}, {:.6})\n\
         • Molecules/cell:  {}\n\
         • Alignment RMSD:  {:.4} Å",
        resolved.group.symbol,
        resolved.group.number,
        resolved.site.wyckoff.label(),
        merge_line,
        p.x,
        p.y,
        p.z,
        resolved.molecule_count,
        resolved.alignment.rmsd,
    );

    Ok((symmetrized, report))
}
