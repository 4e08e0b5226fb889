use crate::chemistry::elements::normalize_symbol;
use crate::core::structure::{Atom, CellEnergy, Crystal, Lattice, MolAtom, Molecule};
use crate::symmetry::SymOp;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::Vector3;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const SYMOP_TAGS: [&str; 2] = ["_symmetry_equiv_pos_as_xyz", "_space_group_symop_operation_xyz"];

/// Parses a float value from a CIF string, safely removing uncertainty parentheses.
/// Example: "1.234(5)" -> 1.234
fn parse_cif_float(s: &str) -> Result<f64> {
    let clean_s = s.split('(').next().unwrap_or(s);
    clean_s.parse::<f64>().with_context(|| format!("Failed to parse '{}' as float", s))
}

/// Splits a CIF line into whitespace-separated values, keeping quoted values
/// (`'x, y, z'`) whole and unquoted.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '\'' || c == '"' {
            chars.next();
            // A quote only closes when followed by whitespace or the end of the line.
            while let Some(ch) = chars.next() {
                if ch == c && chars.peek().map_or(true, |n| n.is_whitespace()) {
                    break;
                }
                token.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}

/// Parses a CIF file into a Crystal structure.
pub fn from_cif(path: &Path) -> Result<Crystal> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not read CIF file: {:?}", path))?;
    from_cif_str(&contents).with_context(|| format!("Invalid CIF file: {:?}", path))
}

/// Parses the first data block of CIF text.
///
/// The atom loop is taken as the asymmetric unit and expanded by the symmetry
/// operator loop; without an operator loop the structure is P1.
pub fn from_cif_str(contents: &str) -> Result<Crystal> {
    let lines: Vec<&str> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let mut lattice_params: HashMap<&str, f64> = HashMap::new();
    let mut atoms = Vec::new();
    let mut ops = Vec::new();
    let mut energy = None;
    let mut blocks = 0;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("data_") {
            blocks += 1;
            if blocks > 1 {
                break;
            }
        } else if let Some(value) = line.strip_prefix("#Energy:") {
            // Written as energy per molecule, see `writer::write_cif`.
            energy = value
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .map(CellEnergy::PerMolecule);
        } else if line.starts_with("_cell_") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(value) = parse_cif_float(parts[1]) {
                    lattice_params.insert(parts[0], value);
                }
            }
        } else if line.starts_with("loop_") {
            i += 1;

            let mut headers = Vec::new();
            while i < lines.len() && lines[i].starts_with('_') {
                headers.push(lines[i]);
                i += 1;
            }

            let mut rows = Vec::new();
            while i < lines.len() && !is_section_start(lines[i]) {
                rows.push(lines[i]);
                i += 1;
            }

            if let Some(xyz_idx) = headers.iter().position(|h| SYMOP_TAGS.contains(h)) {
                for row in &rows {
                    ops.push(parse_symop_row(row, xyz_idx, headers.len())?);
                }
            } else if headers.contains(&"_atom_site_fract_x") {
                atoms.extend(parse_atom_rows(&headers, &rows)?);
            }
            continue;
        }
        i += 1;
    }

    let get_param = |key: &str| -> Result<f64> {
        lattice_params.get(key).copied().ok_or_else(|| anyhow!("CIF missing tag: {}", key))
    };

    let a = get_param("_cell_length_a")?;
    let b = get_param("_cell_length_b")?;
    let c = get_param("_cell_length_c")?;
    let alpha = get_param("_cell_angle_alpha")?;
    let beta = get_param("_cell_angle_beta")?;
    let gamma = get_param("_cell_angle_gamma")?;

    let lattice = Lattice::from_parameters(a, b, c, alpha, beta, gamma).map_err(|e| anyhow!(e))?;

    if atoms.is_empty() {
        return Err(anyhow!("No atoms found in CIF file."));
    }

    let asymmetric = atoms.len();
    let mut crystal = Crystal::from_asymmetric_unit(lattice, &atoms, ops);
    crystal.energy = energy;
    debug!(asymmetric, expanded = crystal.len(), ops = crystal.symmetry_ops.len(), "CIF parsed");
    Ok(crystal)
}

fn is_section_start(line: &str) -> bool {
    line.starts_with('_')
        || line.starts_with("loop_")
        || line.starts_with("data_")
        || line.starts_with('#')
}

fn parse_symop_row(row: &str, xyz_idx: usize, columns: usize) -> Result<SymOp> {
    let mut tokens = tokenize(row);
    // Unquoted operators written with spaces ("x, y, z") span several tokens.
    if tokens.len() > columns && xyz_idx == columns - 1 {
        let tail = tokens.split_off(xyz_idx).join("");
        tokens.push(tail);
    }
    let xyz = tokens
        .get(xyz_idx)
        .with_context(|| format!("Symmetry operator row '{}' has no xyz column", row))?;
    SymOp::from_xyz_string(xyz).map_err(|e| anyhow!(e))
}

fn parse_atom_rows(headers: &[&str], rows: &[&str]) -> Result<Vec<Atom>> {
    let column = |tag: &str| headers.iter().position(|&h| h == tag);

    let symbol_idx = column("_atom_site_type_symbol");
    let label_idx = column("_atom_site_label");
    let element_idx = symbol_idx
        .or(label_idx)
        .context("CIF needs '_atom_site_type_symbol' or '_atom_site_label'")?;
    let x_idx = column("_atom_site_fract_x").context("CIF missing '_atom_site_fract_x'")?;
    let y_idx = column("_atom_site_fract_y").context("CIF missing '_atom_site_fract_y'")?;
    let z_idx = column("_atom_site_fract_z").context("CIF missing '_atom_site_fract_z'")?;

    let max_idx = element_idx.max(x_idx).max(y_idx).max(z_idx);

    let mut atoms = Vec::with_capacity(rows.len());
    for row in rows {
        let parts = tokenize(row);
        if parts.len() <= max_idx {
            continue;
        }
        let element = normalize_symbol(&parts[element_idx]);
        if element.is_empty() {
            bail!("Cannot read an element from '{}'", parts[element_idx]);
        }
        let x = parse_cif_float(&parts[x_idx])?;
        let y = parse_cif_float(&parts[y_idx])?;
        let z = parse_cif_float(&parts[z_idx])?;
        atoms.push(Atom::new(element, Vector3::new(x, y, z)));
    }
    Ok(atoms)
}

/// Reads a molecule from an XYZ file.
pub fn from_xyz(path: &Path) -> Result<Molecule> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not read XYZ file: {:?}", path))?;
    from_xyz_str(&contents).with_context(|| format!("Invalid XYZ file: {:?}", path))
}

/// Parses XYZ text: atom count, a comment line, then `element x y z` rows.
pub fn from_xyz_str(contents: &str) -> Result<Molecule> {
    let mut lines = contents.lines();
    let count = lines
        .next()
        .map(str::trim)
        .context("XYZ text is empty")?
        .parse::<usize>()
        .context("First XYZ line must be the atom count")?;
    lines.next();

    let mut atoms = Vec::with_capacity(count);
    for line in lines.filter(|l| !l.trim().is_empty()).take(count) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            bail!("Malformed XYZ row: '{}'", line);
        }
        let coords = [parts[1], parts[2], parts[3]]
            .iter()
            .map(|v| v.parse::<f64>().with_context(|| format!("Failed to parse '{}' as float", v)))
            .collect::<Result<Vec<_>>>()?;
        atoms.push(MolAtom::new(
            normalize_symbol(parts[0]),
            Vector3::new(coords[0], coords[1], coords[2]),
        ));
    }

    if atoms.len() != count {
        bail!("XYZ header declares {} atoms but {} were found", count, atoms.len());
    }
    Ok(Molecule::new(atoms))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NACL_LIKE: &str = "\
data_test
_cell_length_a    5.640(2)
_cell_length_b    5.640
_cell_length_c    5.640
_cell_angle_alpha 90
_cell_angle_beta  90
_cell_angle_gamma 90

loop_
 _symmetry_equiv_pos_site_id
 _symmetry_equiv_pos_as_xyz
1 'x, y, z'
2 '-x, -y, -z'

loop_
 _atom_site_label
 _atom_site_fract_x
 _atom_site_fract_y
 _atom_site_fract_z
Cl1 0.1000(3) 0.2 0.3
Na1 0.0 0.0 0.0
";

    #[test]
    fn quoted_values_stay_whole() {
        assert_eq!(tokenize("1 'x, y, z'"), vec!["1", "x, y, z"]);
        assert_eq!(tokenize("  \"-x+1/2, y, z\"  "), vec!["-x+1/2, y, z"]);
        assert_eq!(tokenize("O1 O 0.1 0.2"), vec!["O1", "O", "0.1", "0.2"]);
    }

    #[test]
    fn labels_stand_in_for_missing_type_symbols() {
        let crystal = from_cif_str(NACL_LIKE).unwrap();
        assert_eq!(crystal.symmetry_ops.len(), 2);
        // Cl expands to two sites, Na sits on the inversion center.
        assert_eq!(crystal.len(), 3);
        assert_eq!(crystal.atoms[0].element, "Cl");
        assert_eq!(crystal.atoms[2].element, "Na");
        assert!((crystal.atoms[0].fractional_coords.x - 0.1).abs() < 1e-12);
        assert!((crystal.lattice.to_parameters().0 - 5.64).abs() < 1e-9);
    }

    #[test]
    fn unquoted_operators_with_spaces_are_rejoined() {
        let text = NACL_LIKE
            .replace("1 'x, y, z'", "1 x, y, z")
            .replace("2 '-x, -y, -z'", "2 -x, -y, -z");
        let crystal = from_cif_str(&text).unwrap();
        assert_eq!(crystal.symmetry_ops[1], SymOp::from_xyz_string("-x, -y, -z").unwrap());
    }

    #[test]
    fn missing_cell_is_an_error() {
        let text = NACL_LIKE.replace("_cell_length_c    5.640\n", "");
        let err = from_cif_str(&text).unwrap_err();
        assert!(err.to_string().contains("_cell_length_c"));
    }

    #[test]
    fn energy_comment_is_read_back() {
        let text = NACL_LIKE.replace("data_test\n", "data_test\n#Energy: -1.5 eV/cell\n");
        assert_eq!(from_cif_str(&text).unwrap().energy, Some(CellEnergy::PerMolecule(-1.5)));
    }

    #[test]
    fn xyz_reader_checks_the_atom_count() {
        let mol = from_xyz_str("3\nwater\nO 0 0 0\nH 0.96 0 0\nH -0.24 0.93 0\n").unwrap();
        assert_eq!(mol.species(), vec!["O", "H", "H"]);
        assert!((mol.atoms[2].position.y - 0.93).abs() < 1e-12);

        assert!(from_xyz_str("4\nwater\nO 0 0 0\nH 0.96 0 0\nH -0.24 0.93 0\n").is_err());
    }

    #[test]
    fn molecule_display_is_readable_xyz() {
        let mol = from_xyz_str("2\n\nN 0 0 0\nN 1.1 0 0\n").unwrap();
        let again = from_xyz_str(&mol.to_string()).unwrap();
        assert_eq!(again.len(), 2);
        assert!((again.atoms[1].position.x - 1.1).abs() < 1e-6);
    }
}
