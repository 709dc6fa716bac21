//! Objective functions over molecules.

use chem_types::{ChemError, ChemResult, Molecule, ObjectiveError};
use std::sync::Arc;

use crate::descriptors::Descriptors;
use crate::smiles::{parse_smiles, MolGraph};

/// Names accepted by [`objective_by_name`].
pub const OBJECTIVE_NAMES: &[&str] = &["logp", "heavy_atoms", "ring_count"];

/// A scalar property to maximize.
///
/// Implementations must be pure: the same molecule always scores the same,
/// and a malformed molecule is an error rather than a sentinel value.
pub trait Objective: Send + Sync {
    fn evaluate(&self, molecule: &Molecule) -> Result<f64, ObjectiveError>;

    fn name(&self) -> &str;
}

fn parse(molecule: &Molecule) -> Result<MolGraph, ObjectiveError> {
    parse_smiles(molecule.smiles()).map_err(|e| ObjectiveError::InvalidMolecule {
        smiles: molecule.smiles().to_string(),
        message: e.to_string(),
    })
}

fn finite(molecule: &Molecule, value: f64) -> Result<f64, ObjectiveError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ObjectiveError::NonFinite {
            smiles: molecule.smiles().to_string(),
        })
    }
}

/// Octanol-water partition coefficient estimated from atom contributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogP;

impl LogP {
    fn atom_contribution(graph: &MolGraph, idx: usize) -> f64 {
        let atom = &graph.atoms[idx];
        let base = match (atom.element.as_str(), atom.aromatic) {
            ("C", false) if graph.has_double_bond_to_heteroatom(idx) => -0.1002,
            ("C", false) => 0.1441,
            ("C", true) => 0.1581,
            ("N", false) => -0.7096,
            ("N", true) => -0.4806,
            ("O", false) if graph.has_double_bond(idx) => -0.1526,
            ("O", false) => -0.2893,
            ("O", true) => 0.1552,
            ("S", false) => 0.6482,
            ("S", true) => 0.6237,
            ("P", _) => 0.8612,
            ("F", _) => 0.4202,
            ("Cl", _) => 0.6895,
            ("Br", _) => 0.8456,
            ("I", _) => 0.8857,
            ("B", _) => -0.1,
            _ => 0.0,
        };
        let h_weight = if atom.element == "C" { 0.1230 } else { -0.2 };
        let charge_penalty = -1.0 * atom.charge.unsigned_abs() as f64;
        base + h_weight * graph.hydrogen_count(idx) as f64 + charge_penalty
    }

    pub fn compute(graph: &MolGraph) -> f64 {
        (0..graph.atoms.len())
            .map(|i| Self::atom_contribution(graph, i))
            .sum()
    }
}

impl Objective for LogP {
    fn evaluate(&self, molecule: &Molecule) -> Result<f64, ObjectiveError> {
        let graph = parse(molecule)?;
        finite(molecule, Self::compute(&graph))
    }

    fn name(&self) -> &str {
        "logp"
    }
}

/// Number of non-hydrogen atoms.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeavyAtomCount;

impl Objective for HeavyAtomCount {
    fn evaluate(&self, molecule: &Molecule) -> Result<f64, ObjectiveError> {
        let graph = parse(molecule)?;
        Ok(Descriptors::from_graph(&graph).heavy_atoms as f64)
    }

    fn name(&self) -> &str {
        "heavy_atoms"
    }
}

/// Number of ring closures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingCount;

impl Objective for RingCount {
    fn evaluate(&self, molecule: &Molecule) -> Result<f64, ObjectiveError> {
        let graph = parse(molecule)?;
        Ok(Descriptors::from_graph(&graph).rings as f64)
    }

    fn name(&self) -> &str {
        "ring_count"
    }
}

/// Wraps a closure as an objective.
pub struct FnObjective<F> {
    name: String,
    func: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&Molecule) -> Result<f64, ObjectiveError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&Molecule) -> Result<f64, ObjectiveError> + Send + Sync,
{
    fn evaluate(&self, molecule: &Molecule) -> Result<f64, ObjectiveError> {
        let value = (self.func)(molecule)?;
        finite(molecule, value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Resolve a configured objective name.
pub fn objective_by_name(name: &str) -> ChemResult<Arc<dyn Objective>> {
    match name {
        "logp" => Ok(Arc::new(LogP)),
        "heavy_atoms" => Ok(Arc::new(HeavyAtomCount)),
        "ring_count" => Ok(Arc::new(RingCount)),
        other => {
            tracing::warn!(
                objective = other,
                known = ?OBJECTIVE_NAMES,
                "unknown objective requested"
            );
            Err(ChemError::Config(
                ObjectiveError::UnknownObjective {
                    name: other.to_string(),
                }
                .to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logp(smiles: &str) -> f64 {
        LogP.evaluate(&Molecule::new(smiles)).unwrap()
    }

    #[test]
    fn logp_of_benzene() {
        // 6 aromatic carbons, each carrying one hydrogen
        assert!((logp("c1ccccc1") - 6.0 * (0.1581 + 0.1230)).abs() < 1e-9);
    }

    #[test]
    fn logp_orders_by_polarity() {
        assert!(logp("CCCCCC") > logp("CCCCCO"));
        assert!(logp("CCCCCO") > logp("OCC(O)CO"));
        assert!(logp("c1ccccc1Cl") > logp("c1ccccc1"));
    }

    #[test]
    fn logp_penalizes_charge() {
        assert!(logp("CC[NH3+]") < logp("CCN"));
    }

    #[test]
    fn logp_rejects_malformed_smiles() {
        let err = LogP.evaluate(&Molecule::new("C1CC(")).unwrap_err();
        assert!(matches!(err, ObjectiveError::InvalidMolecule { .. }));
    }

    #[test]
    fn oversized_bracket_counts_are_invalid_molecules() {
        for smiles in ["[CH4000000000][CH4000000000]", "[C+2000000000][C+2000000000]"] {
            let mol = Molecule::new(smiles);
            for objective in [&HeavyAtomCount as &dyn Objective, &LogP] {
                let err = objective.evaluate(&mol).unwrap_err();
                assert!(matches!(err, ObjectiveError::InvalidMolecule { .. }));
            }
        }
    }

    #[test]
    fn counting_objectives() {
        let mol = Molecule::new("c1ccc2ccccc2c1");
        assert_eq!(HeavyAtomCount.evaluate(&mol).unwrap(), 10.0);
        assert_eq!(RingCount.evaluate(&mol).unwrap(), 2.0);
    }

    #[test]
    fn fn_objective_rejects_non_finite() {
        let objective = FnObjective::new("nan", |_: &Molecule| -> Result<f64, ObjectiveError> {
            Ok(f64::NAN)
        });
        let err = objective.evaluate(&Molecule::new("C")).unwrap_err();
        assert!(matches!(err, ObjectiveError::NonFinite { .. }));
        assert_eq!(objective.name(), "nan");
    }

    #[test]
    fn objective_lookup() {
        for name in OBJECTIVE_NAMES {
            assert_eq!(objective_by_name(name).unwrap().name(), *name);
        }
        assert!(matches!(
            objective_by_name("qed"),
            Err(ChemError::Config(_))
        ));
    }
}
