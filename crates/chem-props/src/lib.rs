//! # chem-props
//!
//! Molecular property calculations for Chemist: a small SMILES parser,
//! descriptor extraction, and the objective functions experiments maximize.

pub mod descriptors;
pub mod objectives;
pub mod smiles;

pub use descriptors::{smiles_fingerprint, Descriptors, FINGERPRINT_LEN};
pub use objectives::{
    objective_by_name, FnObjective, HeavyAtomCount, LogP, Objective, RingCount, OBJECTIVE_NAMES,
};
pub use smiles::{parse_smiles, Atom, Bond, BondOrder, MolGraph, SmilesError};
