//! Descriptor extraction.

use chem_types::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::smiles::{BondOrder, MolGraph};

/// Number of dimensions produced by [`smiles_fingerprint`].
pub const FINGERPRINT_LEN: usize = 12;

/// Whole-molecule counts derived from a parsed graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    pub heavy_atoms: usize,
    pub hydrogens: u32,
    pub carbons: usize,
    pub heteroatoms: usize,
    pub halogens: usize,
    pub aromatic_atoms: usize,
    pub rings: usize,
    pub double_bonds: usize,
    pub triple_bonds: usize,
    pub formal_charge: i32,
}

impl Descriptors {
    pub fn from_graph(graph: &MolGraph) -> Self {
        let count_bonds =
            |order: BondOrder| graph.bonds.iter().filter(|b| b.order == order).count();
        let carbons = graph.atoms.iter().filter(|a| a.element == "C").count();
        let halogens = graph.atoms.iter().filter(|a| a.is_halogen()).count();

        Self {
            heavy_atoms: graph.atoms.iter().filter(|a| a.element != "H").count(),
            hydrogens: graph.total_hydrogens(),
            carbons,
            heteroatoms: graph
                .atoms
                .iter()
                .filter(|a| a.element != "C" && a.element != "H")
                .count(),
            halogens,
            aromatic_atoms: graph.atoms.iter().filter(|a| a.aromatic).count(),
            rings: graph.ring_closures,
            double_bonds: count_bonds(BondOrder::Double),
            triple_bonds: count_bonds(BondOrder::Triple),
            formal_charge: graph.atoms.iter().map(|a| a.charge).sum(),
        }
    }

    /// Fraction of heavy atoms that are aromatic.
    pub fn aromatic_fraction(&self) -> f64 {
        if self.heavy_atoms == 0 {
            0.0
        } else {
            self.aromatic_atoms as f64 / self.heavy_atoms as f64
        }
    }
}

/// Character-level fingerprint of a SMILES string.
///
/// Never fails: malformed candidates still get a position in descriptor space
/// so optimizers can reason about them before they are scored.
pub fn smiles_fingerprint(smiles: &str) -> Fingerprint {
    let mut v = [0.0f64; FINGERPRINT_LEN];
    let chars: Vec<char> = smiles.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match (c, next) {
            ('C', Some('l')) | ('B', Some('r')) => {
                v[5] += 1.0;
                i += 1;
            }
            ('C', _) => v[0] += 1.0,
            ('c', _) => v[1] += 1.0,
            ('N', _) | ('n', _) => v[2] += 1.0,
            ('O', _) | ('o', _) => v[3] += 1.0,
            ('S', _) | ('s', _) => v[4] += 1.0,
            ('F', _) | ('I', _) => v[5] += 1.0,
            ('0'..='9', _) => v[6] += 0.5,
            ('=', _) => v[7] += 1.0,
            ('#', _) => v[8] += 1.0,
            ('(', _) => v[9] += 1.0,
            ('[', _) => v[10] += 1.0,
            _ => {}
        }
        i += 1;
    }
    v[11] = chars.len() as f64 / 10.0;
    Fingerprint::new(v.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    #[test]
    fn descriptors_of_aspirin() {
        let graph = parse_smiles("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        let d = Descriptors::from_graph(&graph);
        assert_eq!(d.heavy_atoms, 13);
        assert_eq!(d.carbons, 9);
        assert_eq!(d.heteroatoms, 4);
        assert_eq!(d.aromatic_atoms, 6);
        assert_eq!(d.rings, 1);
        assert_eq!(d.double_bonds, 2);
        assert_eq!(d.hydrogens, 8);
    }

    #[test]
    fn aromatic_fraction_bounds() {
        let d = Descriptors::from_graph(&parse_smiles("c1ccccc1").unwrap());
        assert_eq!(d.aromatic_fraction(), 1.0);

        let d = Descriptors::from_graph(&parse_smiles("CCCC").unwrap());
        assert_eq!(d.aromatic_fraction(), 0.0);
    }

    #[test]
    fn fingerprint_counts_halogens_once() {
        let fp = smiles_fingerprint("ClCCBr");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert_eq!(fp.as_slice()[5], 2.0);
        assert_eq!(fp.as_slice()[0], 2.0);
    }

    #[test]
    fn fingerprint_tolerates_garbage() {
        let fp = smiles_fingerprint("C(((C");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert_eq!(fp.as_slice()[9], 3.0);
    }

    #[test]
    fn similar_molecules_are_closer() {
        let ethanol = smiles_fingerprint("CCO");
        let propanol = smiles_fingerprint("CCCO");
        let benzene = smiles_fingerprint("c1ccccc1");
        assert!(ethanol.distance(&propanol) < ethanol.distance(&benzene));
    }
}
