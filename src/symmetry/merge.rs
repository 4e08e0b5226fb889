use crate::core::structure::wrap_fractional;
use crate::error::SymmetryError;
use crate::symmetry::group::{SpaceGroup, WyckoffPosition};
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// How a general orbit collapses onto a special one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Project the center onto each tabulated special position and keep the closest.
    ProjectOntoSpecialSites,
}

/// `(space group, general multiplicity)` pairs with a merge rule.
///
/// P2_1 and Pc have no special positions; they are listed so the failure is
/// reported as "no special site" instead of "unsupported".
static REGISTRY: &[(u16, usize, MergeRule)] = &[
    (2, 2, MergeRule::ProjectOntoSpecialSites),
    (3, 2, MergeRule::ProjectOntoSpecialSites),
    (4, 2, MergeRule::ProjectOntoSpecialSites),
    (6, 2, MergeRule::ProjectOntoSpecialSites),
    (7, 2, MergeRule::ProjectOntoSpecialSites),
];

pub fn merge_rule(number: u16, multiplicity: usize) -> Option<MergeRule> {
    REGISTRY
        .iter()
        .find(|(n, m, _)| *n == number && *m == multiplicity)
        .map(|(_, _, rule)| *rule)
}

/// Result of collapsing a tentative position onto a special orbit.
#[derive(Debug, Clone)]
pub struct MergedSite {
    pub position: Vector3<f64>,
    pub wyckoff: WyckoffPosition,
    /// Cartesian distance the center moved, in Å.
    pub distance: f64,
}

/// Moves `position` onto the closest special Wyckoff position of `wp`'s group
/// lying within `tolerance` Å.
pub fn merge_special_position(
    position: &Vector3<f64>,
    lattice_matrix: &Matrix3<f64>,
    wp: &WyckoffPosition,
    tolerance: f64,
) -> Result<MergedSite, SymmetryError> {
    let rule = merge_rule(wp.number, wp.multiplicity()).ok_or(SymmetryError::UnsupportedMerge {
        number: wp.number,
        multiplicity: wp.multiplicity(),
    })?;

    match rule {
        MergeRule::ProjectOntoSpecialSites => {
            project_onto_special_sites(position, lattice_matrix, wp, tolerance)
        }
    }
}

fn project_onto_special_sites(
    position: &Vector3<f64>,
    lattice_matrix: &Matrix3<f64>,
    wp: &WyckoffPosition,
    tolerance: f64,
) -> Result<MergedSite, SymmetryError> {
    let group = SpaceGroup::new(wp.number)?;
    let mut best: Option<MergedSite> = None;

    for special in group.special_positions() {
        let Some(projector) = &special.site else {
            continue;
        };
        let projected = projector.apply(position);
        let diff = (position - projected).map(|x| x - x.round());
        let distance = (lattice_matrix * diff).norm();
        debug!(site = %special.label(), distance, "special position candidate");

        if distance <= tolerance && best.as_ref().map_or(true, |b| distance < b.distance) {
            best = Some(MergedSite {
                position: wrap_fractional(&projected),
                wyckoff: special.clone(),
                distance,
            });
        }
    }

    best.ok_or(SymmetryError::NoSpecialSite {
        number: wp.number,
        tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> Matrix3<f64> {
        Matrix3::identity() * a
    }

    #[test]
    fn inversion_center_absorbs_a_nearby_molecule() {
        let g = SpaceGroup::new(2).unwrap();
        let position = Vector3::new(0.01, 0.0, 0.99);
        let merged =
            merge_special_position(&position, &cubic(8.0), g.general_position(), 2.0).unwrap();

        assert_eq!(merged.wyckoff.label(), "1a");
        assert!(merged.position.norm() < 1e-12);
        assert!(merged.distance < 0.2);
    }

    #[test]
    fn twofold_axis_keeps_the_free_coordinate() {
        let g = SpaceGroup::new(3).unwrap();
        let position = Vector3::new(0.49, 0.3, 0.02);
        let merged =
            merge_special_position(&position, &cubic(10.0), g.general_position(), 2.0).unwrap();

        assert_eq!(merged.wyckoff.label(), "1c");
        assert!((merged.position - Vector3::new(0.5, 0.3, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn groups_without_special_sites_report_it() {
        let g = SpaceGroup::new(4).unwrap();
        let position = Vector3::new(0.1, 0.2, 0.3);
        let err = merge_special_position(&position, &cubic(10.0), g.general_position(), 2.0);
        assert!(matches!(err, Err(SymmetryError::NoSpecialSite { number: 4, .. })));
    }

    #[test]
    fn multiplicity_four_is_not_yet_supported() {
        let g = SpaceGroup::new(14).unwrap();
        let err =
            merge_special_position(&Vector3::zeros(), &cubic(10.0), g.general_position(), 2.0);
        assert!(matches!(
            err,
            Err(SymmetryError::UnsupportedMerge {
                number: 14,
                multiplicity: 4
            })
        ));
    }

    #[test]
    fn distant_sites_are_out_of_tolerance() {
        let g = SpaceGroup::new(2).unwrap();
        let position = Vector3::new(0.25, 0.25, 0.25);
        let err = merge_special_position(&position, &cubic(10.0), g.general_position(), 0.5);
        assert!(matches!(err, Err(SymmetryError::NoSpecialSite { .. })));
    }
}
