//! Built-in candidate set used when no dataset is configured.

use chem_types::{Molecule, SynthesisPath};

const PURCHASABLE: &[&str] = &[
    "CCO",
    "CCCCO",
    "CCCCCC",
    "CC(C)Cc1ccc(cc1)C(C)C(=O)O",
    "CC(=O)Nc1ccc(O)cc1",
    "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
    "c1ccccc1",
    "Cc1ccccc1",
    "Clc1ccccc1",
    "c1ccc2ccccc2c1",
    "Oc1ccccc1",
    "Nc1ccccc1",
    "c1ccncc1",
    "C1CCCCC1",
    "C1CCOC1",
    "OCC(O)CO",
    "CC(C)=O",
    "CCN(CC)CC",
    "CCOCC",
    "ClC(Cl)Cl",
    "FC(F)(F)c1ccccc1",
    "Brc1ccccc1",
    "CCCCCCCC",
    "c1ccc(cc1)-c1ccccc1",
    "OC(=O)c1ccccc1",
    "CC(C)(C)c1ccc(O)cc1",
];

fn route(product: &str, reaction: &str, precursors: &[&str]) -> Molecule {
    Molecule::new(product).with_synthesis(SynthesisPath::step(
        product,
        reaction,
        precursors
            .iter()
            .map(|p| SynthesisPath::purchasable(*p))
            .collect(),
    ))
}

/// Sample molecules: purchasable compounds plus a few products with recorded
/// synthesis routes.
pub fn sample_molecules() -> Vec<Molecule> {
    let mut molecules: Vec<Molecule> = PURCHASABLE.iter().map(|s| Molecule::new(*s)).collect();

    molecules.push(route(
        "CC(=O)Oc1ccccc1C(=O)O",
        "acetylation",
        &["Oc1ccccc1C(=O)O", "CC(=O)OC(C)=O"],
    ));
    molecules.push(route("CCOC(=O)c1ccccc1", "esterification", &["OC(=O)c1ccccc1", "CCO"]));
    molecules.push(route("CC(=O)Nc1ccccc1", "amide coupling", &["Nc1ccccc1", "CC(=O)Cl"]));
    molecules.push(route(
        "CCCCCCCCOC(=O)c1ccccc1",
        "esterification",
        &["OC(=O)c1ccccc1", "CCCCCCCCO"],
    ));
    molecules.push(Molecule::new("Clc1ccc(cc1)-c1ccc(Cl)cc1").with_synthesis(
        SynthesisPath::step(
            "Clc1ccc(cc1)-c1ccc(Cl)cc1",
            "Suzuki coupling",
            vec![
                SynthesisPath::purchasable("Clc1ccc(Br)cc1"),
                SynthesisPath::step(
                    "OB(O)c1ccc(Cl)cc1",
                    "borylation",
                    vec![
                        SynthesisPath::purchasable("Clc1ccc(Br)cc1"),
                        SynthesisPath::purchasable("OB(O)O"),
                    ],
                ),
            ],
        ),
    ));

    molecules
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sample_is_unique() {
        let molecules = sample_molecules();
        let unique: HashSet<&str> = molecules.iter().map(|m| m.smiles()).collect();
        assert_eq!(unique.len(), molecules.len());
    }

    #[test]
    fn sample_has_recorded_routes() {
        let routed = sample_molecules()
            .into_iter()
            .filter(|m| m.has_recorded_synthesis())
            .count();
        assert_eq!(routed, 5);
    }
}
