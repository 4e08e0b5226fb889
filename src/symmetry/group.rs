use crate::error::SymmetryError;
use crate::symmetry::operation::SymOp;
use nalgebra::Matrix3;
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// ENUMS & SEMANTICS
// ============================================================================

/// Crystal family used as the `_symmetry_cell_setting` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatticeFamily {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Trigonal,
    Hexagonal,
    Cubic,
}

impl LatticeFamily {
    /// Family of a space group, from the International Tables numbering.
    pub fn from_number(number: u16) -> Self {
        match number {
            0..=2 => Self::Triclinic,
            3..=15 => Self::Monoclinic,
            16..=74 => Self::Orthorhombic,
            75..=142 => Self::Tetragonal,
            143..=167 => Self::Trigonal,
            168..=194 => Self::Hexagonal,
            _ => Self::Cubic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triclinic => "triclinic",
            Self::Monoclinic => "monoclinic",
            Self::Orthorhombic => "orthorhombic",
            Self::Tetragonal => "tetragonal",
            Self::Trigonal => "trigonal",
            Self::Hexagonal => "hexagonal",
            Self::Cubic => "cubic",
        }
    }
}

impl fmt::Display for LatticeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WYCKOFF POSITIONS
// ============================================================================

/// A Wyckoff orbit: the generators that map the representative point onto
/// every symmetry-equivalent copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WyckoffPosition {
    pub number: u16,
    pub letter: char,
    pub generators: Vec<SymOp>,
    /// Projector onto the site (`0, y, 1/2`); `None` for the general position.
    pub site: Option<SymOp>,
}

impl WyckoffPosition {
    pub fn multiplicity(&self) -> usize {
        self.generators.len()
    }

    /// Label in the usual `4e` form.
    pub fn label(&self) -> String {
        format!("{}{}", self.multiplicity(), self.letter)
    }

    pub fn lattice_family(&self) -> LatticeFamily {
        LatticeFamily::from_number(self.number)
    }

    pub fn is_general(&self) -> bool {
        self.site.is_none()
    }

    fn general(number: u16, letter: char, ops: &[&str]) -> Result<Self, SymmetryError> {
        let generators = ops
            .iter()
            .map(|s| SymOp::from_xyz_string(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            number,
            letter,
            generators,
            site: None,
        })
    }

    /// Single-point orbit on the site `projector`, generated by the identity.
    fn special(number: u16, letter: char, projector: &str) -> Result<Self, SymmetryError> {
        Ok(Self {
            number,
            letter,
            generators: vec![SymOp::identity()],
            site: Some(SymOp::from_xyz_string(projector)?),
        })
    }
}

impl fmt::Display for WyckoffPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (space group {})", self.label(), self.number)
    }
}

// ============================================================================
// AXIS PERMUTATIONS
// ============================================================================

/// Reorders crystal axes: new axis `i` is old axis `order[i]`.
///
/// Odd permutations flip the last axis so the cell keeps its handedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPermutation {
    pub order: [usize; 3],
}

impl AxisPermutation {
    pub const IDENTITY: Self = Self { order: [0, 1, 2] };

    /// Even permutations first so that handedness-preserving settings win ties.
    pub const ALL: [Self; 6] = [
        Self { order: [0, 1, 2] },
        Self { order: [1, 2, 0] },
        Self { order: [2, 0, 1] },
        Self { order: [0, 2, 1] },
        Self { order: [2, 1, 0] },
        Self { order: [1, 0, 2] },
    ];

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    fn is_odd(&self) -> bool {
        let o = self.order;
        let inversions = (o[0] > o[1]) as u8 + (o[0] > o[2]) as u8 + (o[1] > o[2]) as u8;
        inversions % 2 == 1
    }

    /// Signed permutation matrix `Q` with `x_new = Q x_old`.
    pub fn matrix(&self) -> Matrix3<i32> {
        let mut q = Matrix3::zeros();
        for (i, &j) in self.order.iter().enumerate() {
            q[(i, j)] = 1;
        }
        if self.is_odd() {
            q[(2, self.order[2])] = -1;
        }
        q
    }

    pub fn matrix_f64(&self) -> Matrix3<f64> {
        self.matrix().map(|v| v as f64)
    }
}

// ============================================================================
// SPACE GROUP TABLE
// ============================================================================

struct GroupEntry {
    number: u16,
    symbol: &'static str,
    general: (char, &'static [&'static str]),
    /// Single-point special sites as projectors, highest letter first.
    special: &'static [(char, &'static str)],
    /// Equivalent cell choice whose glide is written `n` rather than `c`.
    alternate: Option<&'static [&'static str]>,
}

static TABLE: &[GroupEntry] = &[
    GroupEntry {
        number: 1,
        symbol: "P1",
        general: ('a', &["x, y, z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 2,
        symbol: "P-1",
        general: ('i', &["x, y, z", "-x, -y, -z"]),
        special: &[
            ('h', "1/2, 1/2, 1/2"),
            ('g', "0, 1/2, 1/2"),
            ('f', "1/2, 0, 1/2"),
            ('e', "1/2, 1/2, 0"),
            ('d', "1/2, 0, 0"),
            ('c', "0, 1/2, 0"),
            ('b', "0, 0, 1/2"),
            ('a', "0, 0, 0"),
        ],
        alternate: None,
    },
    GroupEntry {
        number: 3,
        symbol: "P2",
        general: ('e', &["x, y, z", "-x, y, -z"]),
        special: &[('d', "1/2, y, 1/2"), ('c', "1/2, y, 0"), ('b', "0, y, 1/2"), ('a', "0, y, 0")],
        alternate: None,
    },
    GroupEntry {
        number: 4,
        symbol: "P2_1",
        general: ('a', &["x, y, z", "-x, y+1/2, -z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 5,
        symbol: "C2",
        general: ('c', &["x, y, z", "-x, y, -z", "x+1/2, y+1/2, z", "-x+1/2, y+1/2, -z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 6,
        symbol: "Pm",
        general: ('c', &["x, y, z", "x, -y, z"]),
        special: &[('b', "x, 1/2, z"), ('a', "x, 0, z")],
        alternate: None,
    },
    GroupEntry {
        number: 7,
        symbol: "Pc",
        general: ('a', &["x, y, z", "x, -y, z+1/2"]),
        special: &[],
        alternate: Some(&["x, y, z", "x+1/2, -y, z+1/2"]),
    },
    GroupEntry {
        number: 8,
        symbol: "Cm",
        general: ('b', &["x, y, z", "x, -y, z", "x+1/2, y+1/2, z", "x+1/2, -y+1/2, z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 9,
        symbol: "Cc",
        general: ('a', &["x, y, z", "x, -y, z+1/2", "x+1/2, y+1/2, z", "x+1/2, -y+1/2, z+1/2"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 10,
        symbol: "P2/m",
        general: ('o', &["x, y, z", "-x, y, -z", "-x, -y, -z", "x, -y, z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 11,
        symbol: "P2_1/m",
        general: ('f', &["x, y, z", "-x, y+1/2, -z", "-x, -y, -z", "x, -y+1/2, z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 12,
        symbol: "C2/m",
        general: (
            'j',
            &[
                "x, y, z",
                "-x, y, -z",
                "-x, -y, -z",
                "x, -y, z",
                "x+1/2, y+1/2, z",
                "-x+1/2, y+1/2, -z",
                "-x+1/2, -y+1/2, -z",
                "x+1/2, -y+1/2, z",
            ],
        ),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 13,
        symbol: "P2/c",
        general: ('g', &["x, y, z", "-x, y, -z+1/2", "-x, -y, -z", "x, -y, z+1/2"]),
        special: &[],
        alternate: Some(&["x, y, z", "-x+1/2, y, -z+1/2", "-x, -y, -z", "x+1/2, -y, z+1/2"]),
    },
    GroupEntry {
        number: 14,
        symbol: "P2_1/c",
        general: ('e', &["x, y, z", "-x, y+1/2, -z+1/2", "-x, -y, -z", "x, -y+1/2, z+1/2"]),
        special: &[],
        alternate: Some(&[
            "x, y, z",
            "-x+1/2, y+1/2, -z+1/2",
            "-x, -y, -z",
            "x+1/2, -y+1/2, z+1/2",
        ]),
    },
    GroupEntry {
        number: 15,
        symbol: "C2/c",
        general: (
            'f',
            &[
                "x, y, z",
                "-x, y, -z+1/2",
                "-x, -y, -z",
                "x, -y, z+1/2",
                "x+1/2, y+1/2, z",
                "-x+1/2, y+1/2, -z+1/2",
                "-x+1/2, -y+1/2, -z",
                "x+1/2, -y+1/2, z+1/2",
            ],
        ),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 18,
        symbol: "P2_12_12",
        general: ('c', &["x, y, z", "-x, -y, z", "-x+1/2, y+1/2, -z", "x+1/2, -y+1/2, -z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 19,
        symbol: "P2_12_12_1",
        general: ('a', &["x, y, z", "-x+1/2, -y, z+1/2", "-x, y+1/2, -z+1/2", "x+1/2, -y+1/2, -z"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 29,
        symbol: "Pca2_1",
        general: ('a', &["x, y, z", "-x, -y, z+1/2", "x+1/2, -y, z", "-x+1/2, y, z+1/2"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 33,
        symbol: "Pna2_1",
        general: ('a', &["x, y, z", "-x, -y, z+1/2", "x+1/2, -y+1/2, z", "-x+1/2, y+1/2, z+1/2"]),
        special: &[],
        alternate: None,
    },
    GroupEntry {
        number: 61,
        symbol: "Pbca",
        general: (
            'c',
            &[
                "x, y, z",
                "-x+1/2, -y, z+1/2",
                "-x, y+1/2, -z+1/2",
                "x+1/2, -y+1/2, -z",
                "-x, -y, -z",
                "x+1/2, y, -z+1/2",
                "x, -y+1/2, z+1/2",
                "-x+1/2, y+1/2, z",
            ],
        ),
        special: &[],
        alternate: None,
    },
];

fn entry(number: u16) -> Option<&'static GroupEntry> {
    TABLE.iter().find(|e| e.number == number)
}

/// Numbers of every tabulated space group.
pub fn tabulated_numbers() -> impl Iterator<Item = u16> {
    TABLE.iter().map(|e| e.number)
}

/// A tabulated space group: symbol, family and Wyckoff positions.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceGroup {
    pub number: u16,
    pub symbol: String,
    pub lattice_family: LatticeFamily,
    /// General position first, followed by any tabulated special positions.
    pub wyckoff_positions: Vec<WyckoffPosition>,
}

impl SpaceGroup {
    pub fn new(number: u16) -> Result<Self, SymmetryError> {
        let e = entry(number).ok_or(SymmetryError::UnknownSpaceGroup(number))?;
        let (letter, general) = e.general;
        let mut wyckoff_positions = vec![WyckoffPosition::general(number, letter, general)?];
        for (letter, projector) in e.special {
            wyckoff_positions.push(WyckoffPosition::special(number, *letter, projector)?);
        }
        Ok(Self {
            number,
            symbol: e.symbol.to_string(),
            lattice_family: LatticeFamily::from_number(number),
            wyckoff_positions,
        })
    }

    /// The general position, whose generators form the G1 operator set.
    pub fn general_position(&self) -> &WyckoffPosition {
        &self.wyckoff_positions[0]
    }

    pub fn special_positions(&self) -> &[WyckoffPosition] {
        &self.wyckoff_positions[1..]
    }

    /// Identifies the tabulated group whose general position equals `ops` as a set,
    /// trying every axis permutation and the alternate `n`-glide cell choices.
    ///
    /// The returned orbit lists its generators in the order of the matching table
    /// row, so an alternate-setting match differs from [`Self::general_position`].
    pub fn from_symops(ops: &[SymOp]) -> Option<(WyckoffPosition, AxisPermutation)> {
        if ops.is_empty() {
            return None;
        }
        let input: HashSet<&SymOp> = ops.iter().collect();

        for perm in AxisPermutation::ALL {
            let q = perm.matrix();
            let permuted: HashSet<SymOp> = input.iter().map(|op| op.transformed(&q)).collect();

            for e in TABLE {
                let (letter, general) = e.general;
                if general.len() != permuted.len() {
                    continue;
                }
                for candidate in std::iter::once(general).chain(e.alternate) {
                    let Ok(wp) = WyckoffPosition::general(e.number, letter, candidate) else {
                        continue;
                    };
                    let tabulated: HashSet<SymOp> = wp.generators.iter().cloned().collect();
                    if tabulated == permuted {
                        return Some((wp, perm));
                    }
                }
            }
        }
        None
    }
}

impl fmt::Display for SpaceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::operation::parse_ops;

    #[test]
    fn every_table_row_parses() {
        for number in tabulated_numbers() {
            let group = SpaceGroup::new(number).unwrap();
            assert!(group.general_position().generators[0].is_identity(), "{}", group);
            assert!(group.general_position().is_general());
            for wp in group.special_positions() {
                assert!(wp.multiplicity() < group.general_position().multiplicity());
                assert!(wp.site.is_some());
            }
        }
    }

    #[test]
    fn unknown_group_is_an_error() {
        assert!(matches!(SpaceGroup::new(230), Err(SymmetryError::UnknownSpaceGroup(230))));
    }

    #[test]
    fn families_follow_the_numbering() {
        assert_eq!(LatticeFamily::from_number(2), LatticeFamily::Triclinic);
        assert_eq!(LatticeFamily::from_number(14), LatticeFamily::Monoclinic);
        assert_eq!(LatticeFamily::from_number(61), LatticeFamily::Orthorhombic);
        assert_eq!(LatticeFamily::from_number(221).as_str(), "cubic");
    }

    #[test]
    fn standard_setting_is_found_in_any_operator_order() {
        let ops =
            parse_ops(&["x, -y+1/2, z+1/2", "-x, -y, -z", "x, y, z", "-x, y+1/2, -z+1/2"]).unwrap();
        let (wp, perm) = SpaceGroup::from_symops(&ops).unwrap();
        assert_eq!(wp.number, 14);
        assert!(perm.is_identity());
        assert_eq!(wp.generators, SpaceGroup::new(14).unwrap().general_position().generators);
    }

    #[test]
    fn n_glide_setting_keeps_its_own_generators() {
        let ops = parse_ops(&[
            "x, y, z",
            "-x+1/2, y+1/2, -z+1/2",
            "-x, -y, -z",
            "x+1/2, -y+1/2, z+1/2",
        ])
        .unwrap();
        let (wp, _) = SpaceGroup::from_symops(&ops).unwrap();
        assert_eq!(wp.number, 14);
        assert_eq!(wp.label(), "4e");
        assert_ne!(wp.generators, SpaceGroup::new(14).unwrap().general_position().generators);
    }

    #[test]
    fn unique_axis_c_is_reconciled_by_permutation() {
        let ops = parse_ops(&["x, y, z", "-x, -y, z+1/2"]).unwrap();
        let (wp, perm) = SpaceGroup::from_symops(&ops).unwrap();
        assert_eq!(wp.number, 4);
        assert!(!perm.is_identity());
    }

    #[test]
    fn odd_permutations_preserve_handedness() {
        for perm in AxisPermutation::ALL {
            let det = perm.matrix_f64().determinant();
            assert!((det - 1.0).abs() < 1e-12, "{:?}", perm);
        }
    }

    #[test]
    fn unmatched_operator_sets_return_none() {
        let ops = parse_ops(&["x, y, z", "-y, x, z"]).unwrap();
        assert!(SpaceGroup::from_symops(&ops).is_none());
    }
}
