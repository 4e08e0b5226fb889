use crate::error::SymmetryError;
use nalgebra::{Matrix3, Vector3};
use std::fmt;
use std::str::FromStr;

/// Translations are stored as numerators over this denominator.
const TRANSLATION_DENOMINATOR: i32 = 12;

const AXES: [char; 3] = ['x', 'y', 'z'];

// ============================================================================
// SYMMETRY OPERATION
// ============================================================================

/// An affine symmetry operation acting on fractional coordinates.
///
/// Stored exactly so that operator sets can be hashed and compared:
///  - `rot` rows give the coefficients of (x, y, z) for each output component.
///  - `trans` holds twelfths, always reduced into `0..12`.
///
/// Rows of `rot` may be all zero. Such operators are projectors and are how
/// special Wyckoff positions such as `0, y, 1/2` are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymOp {
    rot: [[i32; 3]; 3],
    trans: [i32; 3],
}

impl Default for SymOp {
    fn default() -> Self {
        Self::identity()
    }
}

impl SymOp {
    pub fn identity() -> Self {
        Self {
            rot: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            trans: [0, 0, 0],
        }
    }

    /// Builds an operation from integer rows and a translation in twelfths.
    pub fn new(rot: [[i32; 3]; 3], trans_twelfths: [i32; 3]) -> Self {
        Self {
            rot,
            trans: trans_twelfths.map(|t| t.rem_euclid(TRANSLATION_DENOMINATOR)),
        }
    }

    /// Parses an operation written as `x, y, z`, `-x+1/2, y, -z` or `0, y, 1/2`.
    pub fn from_xyz_string(input: &str) -> Result<Self, SymmetryError> {
        let components: Vec<&str> = input.split(',').collect();
        if components.len() != 3 {
            return Err(invalid(input, "expected three comma-separated components"));
        }

        let mut rot = [[0; 3]; 3];
        let mut trans = [0; 3];
        for (i, component) in components.iter().enumerate() {
            let (row, t) = parse_component(component, input)?;
            rot[i] = row;
            trans[i] = t;
        }
        Ok(Self::new(rot, trans))
    }

    /// Canonical xyz form, e.g. `-x+1/2, y+1/2, -z+1/2`.
    pub fn as_xyz_string(&self) -> String {
        self.rot
            .iter()
            .zip(self.trans.iter())
            .map(|(row, &t)| format_component(row, t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|i, j| self.rot[i][j] as f64)
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.trans[i] as f64 / TRANSLATION_DENOMINATOR as f64)
    }

    /// Applies the operation to a fractional coordinate.
    pub fn apply(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * frac + self.translation()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Expresses the operation in a new basis `x' = Q x`, where `Q` is a signed
    /// permutation matrix (so `Q⁻¹ = Qᵀ`).
    pub fn transformed(&self, q: &Matrix3<i32>) -> Self {
        let rot = Matrix3::from_fn(|i, j| self.rot[i][j]);
        let trans = Vector3::from_fn(|i, _| self.trans[i]);

        let new_rot = q * rot * q.transpose();
        let new_trans = q * trans;

        Self::new(
            [
                [new_rot[(0, 0)], new_rot[(0, 1)], new_rot[(0, 2)]],
                [new_rot[(1, 0)], new_rot[(1, 1)], new_rot[(1, 2)]],
                [new_rot[(2, 0)], new_rot[(2, 1)], new_rot[(2, 2)]],
            ],
            [new_trans.x, new_trans.y, new_trans.z],
        )
    }
}

impl fmt::Display for SymOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_xyz_string())
    }
}

impl FromStr for SymOp {
    type Err = SymmetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_xyz_string(s)
    }
}

/// Parses a list of xyz strings, failing on the first malformed entry.
pub fn parse_ops(ops: &[&str]) -> Result<Vec<SymOp>, SymmetryError> {
    ops.iter().map(|s| SymOp::from_xyz_string(s)).collect()
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

fn invalid(input: &str, reason: impl Into<String>) -> SymmetryError {
    SymmetryError::InvalidOperation {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Parses one component (`-x+1/2`) into a coefficient row and a translation in twelfths.
fn parse_component(component: &str, full: &str) -> Result<([i32; 3], i32), SymmetryError> {
    let cleaned: String = component
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        return Err(invalid(full, "empty component"));
    }

    // Split into signed terms: "-x+1/2" -> ["-x", "+1/2"]
    let mut terms = Vec::new();
    let mut start = 0;
    for (i, c) in cleaned.char_indices() {
        if (c == '+' || c == '-') && i > start {
            terms.push(&cleaned[start..i]);
            start = i;
        }
    }
    terms.push(&cleaned[start..]);

    let mut row = [0; 3];
    let mut twelfths = 0;
    for term in terms {
        let (sign, body) = match term.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, term.strip_prefix('+').unwrap_or(term)),
        };
        if body.is_empty() {
            return Err(invalid(full, format!("dangling sign in '{}'", component.trim())));
        }

        let axis = body.chars().last().and_then(|c| AXES.iter().position(|&a| a == c));
        match axis {
            Some(axis) => {
                let coefficient = body[..body.len() - 1].trim_end_matches('*');
                let coefficient: i32 = if coefficient.is_empty() {
                    1
                } else {
                    coefficient
                        .parse()
                        .map_err(|_| invalid(full, format!("bad coefficient '{}'", coefficient)))?
                };
                row[axis] += sign * coefficient;
            }
            None => {
                let value = parse_fraction(body)
                    .ok_or_else(|| invalid(full, format!("bad term '{}'", body)))?;
                let scaled = value * TRANSLATION_DENOMINATOR as f64;
                if (scaled - scaled.round()).abs() > 1e-3 {
                    return Err(invalid(
                        full,
                        format!("translation {} is not a multiple of 1/12", value),
                    ));
                }
                twelfths += sign * scaled.round() as i32;
            }
        }
    }
    Ok((row, twelfths))
}

fn parse_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.parse().ok(),
    }
}

fn gcd(a: i32, b: i32) -> i32 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn format_component(row: &[i32; 3], twelfths: i32) -> String {
    let mut s = String::new();
    for (&c, axis) in row.iter().zip(AXES) {
        match c {
            0 => continue,
            1 => {
                if !s.is_empty() {
                    s.push('+');
                }
            }
            -1 => s.push('-'),
            c if c > 0 => {
                if !s.is_empty() {
                    s.push('+');
                }
                s.push_str(&c.to_string());
            }
            c => s.push_str(&c.to_string()),
        }
        s.push(axis);
    }

    if twelfths != 0 {
        let g = gcd(twelfths, TRANSLATION_DENOMINATOR);
        let (num, den) = (twelfths / g, TRANSLATION_DENOMINATOR / g);
        if !s.is_empty() {
            s.push('+');
        }
        if den == 1 {
            s.push_str(&num.to_string());
        } else {
            s.push_str(&format!("{}/{}", num, den));
        }
    }

    if s.is_empty() {
        s.push('0');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_and_formats() {
        let op = SymOp::from_xyz_string("x,y,z").unwrap();
        assert!(op.is_identity());
        assert_eq!(op.as_xyz_string(), "x, y, z");
    }

    #[test]
    fn screw_axis_with_translations_keeps_canonical_form() {
        let op: SymOp = "-x+1/2, y+1/2, -z+1/2".parse().unwrap();
        assert_eq!(op.to_string(), "-x+1/2, y+1/2, -z+1/2");

        let moved = op.apply(&Vector3::new(0.1, 0.2, 0.3));
        assert!((moved - Vector3::new(0.4, 0.7, 0.2)).norm() < 1e-12);
    }

    #[test]
    fn negative_translations_are_reduced_into_the_cell() {
        let a = SymOp::from_xyz_string("x-1/2, -y, z+0.25").unwrap();
        let b = SymOp::from_xyz_string("1/2+x, -y, z+1/4").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_xyz_string(), "x+1/2, -y, z+1/4");
    }

    #[test]
    fn special_position_projectors_round_trip() {
        let op = SymOp::from_xyz_string("0, y, 1/2").unwrap();
        assert_eq!(op.as_xyz_string(), "0, y, 1/2");
        let p = op.apply(&Vector3::new(0.3, 0.6, 0.9));
        assert!((p - Vector3::new(0.0, 0.6, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn malformed_operations_are_rejected() {
        assert!(SymOp::from_xyz_string("x, y").is_err());
        assert!(SymOp::from_xyz_string("x, y, q").is_err());
        assert!(SymOp::from_xyz_string("x, y, z+1/7").is_err());
        assert!(SymOp::from_xyz_string("x, -, z").is_err());
    }

    #[test]
    fn change_of_basis_moves_the_screw_axis() {
        // 2_1 along c, expressed with b as the unique axis.
        let op = SymOp::from_xyz_string("-x, -y, z+1/2").unwrap();
        let q = Matrix3::new(0, 1, 0, 0, 0, 1, 1, 0, 0);
        assert_eq!(op.transformed(&q).as_xyz_string(), "-x, y+1/2, -z");
    }
}
