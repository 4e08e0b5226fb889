use crate::core::structure::{wrap_fractional, AlignedMolecule, Lattice};
use crate::error::SiteError;
use crate::symmetry::{merge_special_position, WyckoffPosition};
use nalgebra::Vector3;
use tracing::{debug, info};

/// Default search radius for special-position merging, in Å.
pub const DEFAULT_MERGE_TOLERANCE: f64 = 2.0;

/// Representative position and orbit of a molecule in its cell.
#[derive(Debug, Clone)]
pub struct ResolvedSite {
    /// Fractional center, every component in `[0, 1)`.
    pub position: Vector3<f64>,
    pub wyckoff: WyckoffPosition,
    /// Distance the center moved when merged onto a special position, in Å.
    pub merged: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SiteResolver {
    merge_tolerance: f64,
}

impl Default for SiteResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_TOLERANCE)
    }
}

impl SiteResolver {
    pub fn new(merge_tolerance: f64) -> Self {
        Self { merge_tolerance }
    }

    /// Places `fragment` on an orbit of `generic`'s space group.
    ///
    /// `molecule_count` is the number of molecules in the cell (atoms in the
    /// cell divided by atoms per molecule). Fewer molecules than the general
    /// multiplicity means the molecule sits on a special position, so the
    /// center is merged onto the nearest one.
    pub fn resolve(
        &self,
        fragment: &AlignedMolecule,
        lattice: &Lattice,
        generic: &WyckoffPosition,
        molecule_count: f64,
    ) -> Result<ResolvedSite, SiteError> {
        let molecule = fragment.molecule();
        if molecule.is_empty() {
            return Err(SiteError::EmptyMolecule);
        }

        let position = wrap_fractional(&lattice.to_fractional(&molecule.centroid()));
        debug!(?position, molecule_count, "tentative site center");

        let mut resolved = ResolvedSite {
            position,
            wyckoff: generic.clone(),
            merged: None,
        };

        if molecule_count < generic.multiplicity() as f64 {
            let site =
                merge_special_position(&position, &lattice.matrix, generic, self.merge_tolerance)?;
            info!(
                site = %site.wyckoff.label(),
                distance = site.distance,
                "molecule merged onto special position"
            );
            resolved = ResolvedSite {
                position: site.position,
                wyckoff: site.wyckoff,
                merged: Some(site.distance),
            };
        }

        let multiplicity = resolved.wyckoff.multiplicity();
        if multiplicity > generic.multiplicity() {
            return Err(SiteError::InconsistentOrbit(format!(
                "site {} is larger than the general position {}",
                resolved.wyckoff.label(),
                generic.label()
            )));
        }
        let count = molecule_count.round() as usize;
        if count % multiplicity != 0 {
            return Err(SiteError::InconsistentOrbit(format!(
                "{} molecules per cell cannot fill copies of site {}",
                count,
                resolved.wyckoff.label()
            )));
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::Molecule;
    use crate::error::SymmetryError;
    use crate::symmetry::SpaceGroup;

    fn cubic(a: f64) -> Lattice {
        Lattice::from_parameters(a, a, a, 90.0, 90.0, 90.0).unwrap()
    }

    fn fragment(points: &[Vector3<f64>]) -> AlignedMolecule {
        let species = vec!["C"; points.len()];
        AlignedMolecule::new(Molecule::from_species_and_coords(&species, points))
    }

    #[test]
    fn general_position_keeps_the_wrapped_centroid() {
        let lattice = cubic(10.0);
        let generic = SpaceGroup::new(1).unwrap().general_position().clone();
        let mol = fragment(&[Vector3::new(-1.0, 2.0, 13.0), Vector3::new(-2.0, 2.0, 13.0)]);

        let site = SiteResolver::default().resolve(&mol, &lattice, &generic, 1.0).unwrap();
        assert!((site.position - Vector3::new(0.85, 0.2, 0.3)).norm() < 1e-12);
        assert_eq!(site.wyckoff, generic);
        assert!(site.merged.is_none());
    }

    #[test]
    fn single_molecule_in_p_1_moves_to_an_inversion_center() {
        let lattice = cubic(8.0);
        let generic = SpaceGroup::new(2).unwrap().general_position().clone();
        let mol = fragment(&[Vector3::new(3.9, 0.1, -0.1), Vector3::new(4.3, -0.1, 0.1)]);

        let site = SiteResolver::default().resolve(&mol, &lattice, &generic, 1.0).unwrap();
        assert_eq!(site.wyckoff.label(), "1d");
        assert!((site.position - Vector3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
        assert!(site.position.iter().all(|x| (0.0..1.0).contains(x)));
        assert!(site.merged.is_some());
    }

    #[test]
    fn molecule_count_must_fill_whole_orbits() {
        let lattice = cubic(8.0);
        let generic = SpaceGroup::new(2).unwrap().general_position().clone();
        let mol = fragment(&[Vector3::new(1.0, 1.0, 1.0)]);

        let err = SiteResolver::default().resolve(&mol, &lattice, &generic, 3.0);
        assert!(matches!(err, Err(SiteError::InconsistentOrbit(_))));
        assert!(SiteResolver::default().resolve(&mol, &lattice, &generic, 4.0).is_ok());
    }

    #[test]
    fn unsupported_merges_surface_as_symmetry_errors() {
        let lattice = cubic(8.0);
        let generic = SpaceGroup::new(14).unwrap().general_position().clone();
        let mol = fragment(&[Vector3::new(1.0, 1.0, 1.0)]);

        let err = SiteResolver::default().resolve(&mol, &lattice, &generic, 2.0);
        assert!(matches!(err, Err(SiteError::Symmetry(SymmetryError::UnsupportedMerge { .. }))));
    }
}
