use crate::analysis::alignment::{align, Alignment};
use crate::analysis::matching::MoleculeMatcher;
use crate::core::connectivity::MoleculeFinder;
use crate::core::structure::{Crystal, Lattice, Molecule};
use crate::error::SiteError;
use crate::io::parser;
use crate::site::molecular_site::{MolecularSite, Orientation};
use crate::site::resolver::{ResolvedSite, SiteResolver};
use crate::site::symmetrized::SymmetrizedCrystal;
use crate::symmetry::{AxisPermutation, SpaceGroup, WyckoffPosition};
use crate::ExtractionConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

// ============================================================================
// INPUT SOURCES
// ============================================================================

/// Where the periodic structure comes from.
#[derive(Debug, Clone)]
pub enum StructureSource {
    /// A CIF file.
    FromPath(PathBuf),
    FromObject(Crystal),
}

/// Where the reference molecule comes from.
#[derive(Debug, Clone)]
pub enum MoleculeSource {
    /// An XYZ file.
    FromPath(PathBuf),
    FromObject(Molecule),
}

fn input_error(e: anyhow::Error) -> SiteError {
    SiteError::Input(format!("{:#}", e))
}

impl StructureSource {
    fn load(self) -> Result<Crystal, SiteError> {
        match self {
            Self::FromPath(path) => parser::from_cif(&path).map_err(input_error),
            Self::FromObject(crystal) => Ok(crystal),
        }
    }
}

impl MoleculeSource {
    fn load(self) -> Result<Molecule, SiteError> {
        match self {
            Self::FromPath(path) => parser::from_xyz(&path).map_err(input_error),
            Self::FromObject(molecule) => Ok(molecule),
        }
    }
}

impl From<Crystal> for StructureSource {
    fn from(crystal: Crystal) -> Self {
        Self::FromObject(crystal)
    }
}

impl From<&Path> for StructureSource {
    fn from(path: &Path) -> Self {
        Self::FromPath(path.to_path_buf())
    }
}

impl From<PathBuf> for StructureSource {
    fn from(path: PathBuf) -> Self {
        Self::FromPath(path)
    }
}

impl From<Molecule> for MoleculeSource {
    fn from(molecule: Molecule) -> Self {
        Self::FromObject(molecule)
    }
}

impl From<&Path> for MoleculeSource {
    fn from(path: &Path) -> Self {
        Self::FromPath(path.to_path_buf())
    }
}

impl From<PathBuf> for MoleculeSource {
    fn from(path: PathBuf) -> Self {
        Self::FromPath(path)
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Outcome of matching the extracted fragment against the reference.
#[derive(Debug, Clone)]
pub enum Resolution {
    Matched(Box<ResolvedMolecule>),
    /// The fragment is not the reference molecule. Both are returned for reporting.
    Mismatch { reference: Molecule, candidate: Molecule },
}

/// A matched molecule with its site and orientation worked out.
#[derive(Debug, Clone)]
pub struct ResolvedMolecule {
    /// Fragment in reference atom order, centered, in the crystal's orientation.
    pub molecule: Molecule,
    /// Centered reference molecule.
    pub reference: Molecule,
    pub site: ResolvedSite,
    pub alignment: Alignment,
    pub lattice: Lattice,
    pub group: SpaceGroup,
    /// Molecules per cell.
    pub molecule_count: usize,
    /// Total energy of the cell in eV.
    pub energy: Option<f64>,
}

impl ResolvedMolecule {
    /// Builds the site record.
    ///
    /// With `use_reference` the site carries the reference molecule and the
    /// rotation that reproduces the crystal geometry from it; otherwise it
    /// carries the extracted fragment with an identity orientation.
    pub fn make_site(&self, use_reference: bool) -> Result<MolecularSite, SiteError> {
        let (molecule, orientation) = if use_reference {
            // The alignment maps crystal -> reference; the site needs the inverse.
            (self.reference.clone(), Orientation::new(self.alignment.rotation.transpose()))
        } else {
            (self.molecule.clone(), Orientation::identity())
        };

        MolecularSite::assemble(
            molecule,
            self.site.position,
            orientation,
            self.site.wyckoff.clone(),
            self.lattice.clone(),
        )
    }

    /// The symmetrized structure holding this molecule's site.
    pub fn to_symmetrized(&self, use_reference: bool) -> Result<SymmetrizedCrystal, SiteError> {
        let site = self.make_site(use_reference)?;
        Ok(SymmetrizedCrystal::from_molecular_site(self.group.clone(), site)
            .with_num_mols(vec![self.molecule_count])
            .with_energy(self.energy))
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Extracts the asymmetric-unit molecule of a molecular crystal and places it
/// on its crystallographic site.
///
/// Construction loads both inputs, identifies the space group from the
/// structure's operator set and re-expresses the structure in the tabulated
/// axis setting. [`SiteExtractor::resolve`] does the rest.
#[derive(Debug, Clone)]
pub struct SiteExtractor {
    crystal: Crystal,
    reference: Molecule,
    group: SpaceGroup,
    generic: WyckoffPosition,
    permutation: AxisPermutation,
    config: ExtractionConfig,
}

impl SiteExtractor {
    #[instrument(level = "info", skip_all)]
    pub fn new(
        structure: impl Into<StructureSource>,
        reference: impl Into<MoleculeSource>,
        config: &ExtractionConfig,
    ) -> Result<Self, SiteError> {
        let structure: StructureSource = structure.into();
        let reference: MoleculeSource = reference.into();
        let crystal = structure.load()?;
        let reference = reference.load()?;
        if crystal.is_empty() {
            return Err(SiteError::Input("structure has no atoms".into()));
        }
        if reference.is_empty() {
            return Err(SiteError::EmptyMolecule);
        }

        let (generic, permutation) =
            SpaceGroup::from_symops(&crystal.symmetry_ops).ok_or(SiteError::NoSpaceGroup)?;
        let group = SpaceGroup::new(generic.number)?;
        if !permutation.is_identity() {
            info!(order = ?permutation.order, "swapping axes into the tabulated setting");
        }

        let mut crystal = crystal.permuted(&permutation)?;
        crystal.lattice.family = group.lattice_family;
        info!(
            group = %group,
            orbit = %generic.label(),
            atoms = crystal.len(),
            "space group identified"
        );

        Ok(Self {
            crystal,
            reference: reference.centered(),
            group,
            generic,
            permutation,
            config: config.clone(),
        })
    }

    /// Structure in the tabulated axis setting.
    pub fn crystal(&self) -> &Crystal {
        &self.crystal
    }

    pub fn reference(&self) -> &Molecule {
        &self.reference
    }

    pub fn group(&self) -> &SpaceGroup {
        &self.group
    }

    /// General position in the setting the structure's operators matched.
    pub fn generic(&self) -> &WyckoffPosition {
        &self.generic
    }

    pub fn permutation(&self) -> AxisPermutation {
        self.permutation
    }

    /// Extracts the fragment at atom 0, matches it, and resolves its site and
    /// orientation.
    #[instrument(level = "info", skip_all, fields(group = self.group.number))]
    pub fn resolve(&self) -> Result<Resolution, SiteError> {
        let finder = MoleculeFinder::new(self.config.bond_tolerance)
            .with_neighbor_cutoff(self.config.neighbor_cutoff);
        let candidate = finder.search_molecule(&self.crystal, self.config.keep_order)?;
        debug!(atoms = candidate.len(), "fragment extracted");

        let result =
            MoleculeMatcher::new(self.config.bond_tolerance).compare(&self.reference, &candidate);
        let Some(aligned) = result.reorder(&candidate) else {
            return Ok(Resolution::Mismatch {
                reference: self.reference.clone(),
                candidate,
            });
        };

        let molecule_count = self.crystal.len() as f64 / self.reference.len() as f64;
        let site = SiteResolver::new(self.config.merge_tolerance).resolve(
            &aligned,
            &self.crystal.lattice,
            &self.generic,
            molecule_count,
        )?;
        let alignment = align(&self.reference, &aligned)?;
        let cell_count = molecule_count.round() as usize;
        info!(orbit = %site.wyckoff.label(), rmsd = alignment.rmsd, "molecule resolved");

        Ok(Resolution::Matched(Box::new(ResolvedMolecule {
            molecule: aligned.into_inner().centered(),
            reference: self.reference.clone(),
            site,
            alignment,
            lattice: self.crystal.lattice.clone(),
            group: self.group.clone(),
            molecule_count: cell_count,
            energy: self.crystal.energy.map(|e| e.total(cell_count)),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::Atom;
    use crate::symmetry::SymOp;
    use nalgebra::{Rotation3, Vector3};

    fn water_reference() -> Molecule {
        Molecule::from_species_and_coords(
            &["O", "H", "H"],
            &[Vector3::zeros(), Vector3::new(0.96, 0.0, 0.0), Vector3::new(-0.24, 0.93, 0.0)],
        )
    }

    /// The reference rotated about z and dropped into a 10 Å P1 cell.
    fn rotated_water_crystal(angle: f64) -> Crystal {
        let lattice = Lattice::from_parameters(10.0, 10.0, 10.0, 90.0, 90.0, 90.0).unwrap();
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
        let center = Vector3::new(5.0, 5.0, 5.0);
        let atoms = water_reference()
            .atoms
            .iter()
            .map(|a| {
                let frac = lattice.to_fractional(&(rot * a.position + center));
                Atom::new(a.element.clone(), frac)
            })
            .collect();
        Crystal::new(lattice, atoms)
    }

    fn matched(extractor: &SiteExtractor) -> ResolvedMolecule {
        match extractor.resolve().unwrap() {
            Resolution::Matched(resolved) => *resolved,
            Resolution::Mismatch { .. } => panic!("expected a match"),
        }
    }

    #[test]
    fn p1_water_resolves_to_its_centroid() {
        let crystal = rotated_water_crystal(0.0);
        let extractor =
            SiteExtractor::new(crystal, water_reference(), &ExtractionConfig::default()).unwrap();
        assert_eq!(extractor.group().number, 1);

        let resolved = matched(&extractor);
        let expected = Vector3::new(5.24, 5.31, 5.0) / 10.0;
        assert!((resolved.site.position - expected).norm() < 1e-9);
        assert!(resolved.alignment.rmsd < 1e-8);
        assert_eq!(resolved.molecule_count, 1);
    }

    #[test]
    fn reference_site_reproduces_the_crystal_geometry() {
        let crystal = rotated_water_crystal(0.8);
        let extractor =
            SiteExtractor::new(crystal, water_reference(), &ExtractionConfig::default()).unwrap();
        let resolved = matched(&extractor);

        let from_fragment = resolved.make_site(false).unwrap().get_mol_object(0).unwrap();
        let from_reference = resolved.make_site(true).unwrap().get_mol_object(0).unwrap();
        for (a, b) in from_fragment.atoms.iter().zip(&from_reference.atoms) {
            assert_eq!(a.element, b.element);
            assert!((a.position - b.position).norm() < 1e-6);
        }
    }

    #[test]
    fn wrong_reference_is_reported_as_a_mismatch() {
        let crystal = rotated_water_crystal(0.0);
        let ammonia = Molecule::from_species_and_coords(
            &["N", "H", "H", "H"],
            &[
                Vector3::zeros(),
                Vector3::new(1.01, 0.0, 0.0),
                Vector3::new(-0.34, 0.95, 0.0),
                Vector3::new(-0.34, -0.48, 0.82),
            ],
        );
        let extractor = SiteExtractor::new(crystal, ammonia, &ExtractionConfig::default()).unwrap();
        match extractor.resolve().unwrap() {
            Resolution::Mismatch { reference, candidate } => {
                assert_eq!(reference.len(), 4);
                assert_eq!(candidate.len(), 3);
            }
            Resolution::Matched(_) => panic!("ammonia must not match water"),
        }
    }

    #[test]
    fn unknown_operator_sets_have_no_space_group() {
        let mut crystal = rotated_water_crystal(0.0);
        crystal.symmetry_ops =
            vec![SymOp::identity(), SymOp::from_xyz_string("-y, x, z").unwrap()];
        let err = SiteExtractor::new(crystal, water_reference(), &ExtractionConfig::default());
        assert!(matches!(err, Err(SiteError::NoSpaceGroup)));
    }

    #[test]
    fn empty_reference_is_rejected() {
        let err = SiteExtractor::new(
            rotated_water_crystal(0.0),
            Molecule::new(Vec::new()),
            &ExtractionConfig::default(),
        );
        assert!(matches!(err, Err(SiteError::EmptyMolecule)));
    }
}
