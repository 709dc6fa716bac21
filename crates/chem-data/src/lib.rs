//! # chem-data
//!
//! Candidate pools for Chemist experiments: loading molecule lists from the
//! configured data directory, with a built-in sample set as fallback.

pub mod loaders;
pub mod sample;

pub use loaders::*;
pub use sample::sample_molecules;

use chem_types::{ChemResult, DataError, Molecule};
use std::collections::HashSet;
use std::path::Path;

/// The finite, ordered set of molecules an experiment searches.
///
/// Positions are stable for the lifetime of the pool and molecules are unique,
/// so an index identifies exactly one molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePool {
    name: String,
    molecules: Vec<Molecule>,
}

impl CandidatePool {
    /// Build a pool, dropping repeated SMILES while keeping first occurrences.
    pub fn new(name: impl Into<String>, molecules: Vec<Molecule>) -> ChemResult<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        let before = molecules.len();
        let molecules: Vec<Molecule> = molecules
            .into_iter()
            .filter(|m| seen.insert(m.smiles().to_string()))
            .collect();
        if molecules.len() < before {
            tracing::debug!(
                pool = %name,
                dropped = before - molecules.len(),
                "dropped duplicate candidates"
            );
        }
        if molecules.is_empty() {
            return Err(DataError::Empty { source_name: name }.into());
        }
        Ok(Self { name, molecules })
    }

    /// The built-in sample pool.
    pub fn builtin() -> Self {
        Self {
            name: "builtin".to_string(),
            molecules: sample_molecules(),
        }
    }

    /// Load `data_dir/dataset`. An empty dataset name selects the built-in pool.
    pub fn load(data_dir: impl AsRef<Path>, dataset: &str) -> ChemResult<Self> {
        if dataset.is_empty() {
            return Ok(Self::builtin());
        }
        let path = data_dir.as_ref().join(dataset);
        let molecules = MoleculeLoader::new().load_file(&path)?;
        Self::new(dataset, molecules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Molecule> {
        self.molecules.get(index)
    }

    /// Position of a molecule with the same SMILES.
    pub fn position(&self, molecule: &Molecule) -> Option<usize> {
        self.molecules
            .iter()
            .position(|m| m.smiles() == molecule.smiles())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Molecule> {
        self.molecules.iter()
    }
}
