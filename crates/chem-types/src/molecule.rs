use serde::{Deserialize, Serialize};
use std::fmt;

/// A candidate molecule, identified by its SMILES string.
///
/// Molecules are opaque to the orchestration layer: nothing here checks that
/// the SMILES is chemically valid. Objectives reject malformed structures when
/// they score them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Molecule {
    smiles: String,
    synthesis: Option<SynthesisPath>,
}

impl Molecule {
    pub fn new(smiles: impl Into<String>) -> Self {
        Self {
            smiles: smiles.into(),
            synthesis: None,
        }
    }

    pub fn with_synthesis(mut self, path: SynthesisPath) -> Self {
        self.synthesis = Some(path);
        self
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    /// Whether a synthesis route was recorded when the molecule was built.
    pub fn has_recorded_synthesis(&self) -> bool {
        self.synthesis.is_some()
    }

    /// The synthesis route of this molecule. Molecules without provenance are
    /// treated as purchasable starting materials.
    pub fn synthesis_path(&self) -> SynthesisPath {
        self.synthesis
            .clone()
            .unwrap_or_else(|| SynthesisPath::purchasable(self.smiles.clone()))
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.smiles)
    }
}

/// Reaction tree producing a molecule from purchasable precursors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynthesisPath {
    pub product: String,
    pub reaction: Option<String>,
    pub precursors: Vec<SynthesisPath>,
}

impl SynthesisPath {
    /// A leaf node: the product is bought, not made.
    pub fn purchasable(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            reaction: None,
            precursors: Vec::new(),
        }
    }

    pub fn step(
        product: impl Into<String>,
        reaction: impl Into<String>,
        precursors: Vec<SynthesisPath>,
    ) -> Self {
        Self {
            product: product.into(),
            reaction: Some(reaction.into()),
            precursors,
        }
    }

    pub fn is_purchasable(&self) -> bool {
        self.precursors.is_empty()
    }

    /// Number of reaction steps in the whole tree.
    pub fn num_steps(&self) -> usize {
        if self.is_purchasable() {
            0
        } else {
            1 + self.precursors.iter().map(Self::num_steps).sum::<usize>()
        }
    }

    /// Length of the longest chain of reactions.
    pub fn depth(&self) -> usize {
        self.precursors
            .iter()
            .map(|p| p.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Starting materials, left to right.
    pub fn starting_materials(&self) -> Vec<&str> {
        if self.is_purchasable() {
            return vec![self.product.as_str()];
        }
        self.precursors
            .iter()
            .flat_map(|p| p.starting_materials())
            .collect()
    }
}

impl fmt::Display for SynthesisPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_purchasable() {
            return write!(f, "{}", self.product);
        }
        write!(f, "{} <= ", self.product)?;
        if let Some(reaction) = &self.reaction {
            write!(f, "[{reaction}] ")?;
        }
        write!(f, "(")?;
        for (i, precursor) in self.precursors.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{precursor}")?;
        }
        write!(f, ")")
    }
}
