//! Minimal SMILES reader.
//!
//! Covers the organic subset, bracket atoms (isotope, chirality, hydrogen
//! count, charge), bonds, branches, ring closures (including `%nn`) and
//! disconnected fragments. Stereo bond markers are read as single bonds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Elements accepted inside bracket atoms.
const BRACKET_ELEMENTS: &[&str] = &[
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Ti", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As", "Se", "Br",
    "Kr", "Rb", "Sr", "Ag", "Cd", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "Pt", "Au", "Hg", "Pb",
    "Bi", "Pd",
];

const AROMATIC_BRACKET: &[&str] = &["b", "c", "n", "o", "p", "s", "se", "as"];

/// Largest hydrogen count accepted inside a bracket atom.
const MAX_BRACKET_HYDROGENS: u32 = 9;

/// Largest formal charge magnitude accepted inside a bracket atom.
const MAX_BRACKET_CHARGE: u32 = 15;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unknown element '{symbol}' at position {pos}")]
    UnknownElement { pos: usize, symbol: String },

    #[error("invalid bracket atom at position {pos}: {message}")]
    InvalidBracket { pos: usize, message: String },

    #[error("unclosed branch")]
    UnclosedBranch,

    #[error("unmatched ')' at position {pos}")]
    UnmatchedClose { pos: usize },

    #[error("empty branch at position {pos}")]
    EmptyBranch { pos: usize },

    #[error("ring bond {label} is never closed")]
    UnclosedRing { label: u32 },

    #[error("bond at position {pos} has no atom to attach to")]
    DanglingBond { pos: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    pub fn valence(self) -> f64 {
        match self {
            Self::Single => 1.0,
            Self::Double => 2.0,
            Self::Triple => 3.0,
            Self::Aromatic => 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element: String,
    pub aromatic: bool,
    pub charge: i32,
    /// Hydrogen count written in a bracket atom. `None` for organic-subset atoms.
    pub explicit_h: Option<u32>,
}

impl Atom {
    fn organic(element: &str, aromatic: bool) -> Self {
        Self {
            element: element.to_string(),
            aromatic,
            charge: 0,
            explicit_h: None,
        }
    }

    pub fn is_halogen(&self) -> bool {
        matches!(self.element.as_str(), "F" | "Cl" | "Br" | "I")
    }

    fn default_valences(&self) -> &'static [u32] {
        match self.element.as_str() {
            "B" => &[3],
            "C" => &[4],
            "N" => &[3, 5],
            "O" => &[2],
            "P" => &[3, 5],
            "S" => &[2, 4, 6],
            "F" | "Cl" | "Br" | "I" => &[1],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
}

/// Parsed molecular graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MolGraph {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    pub ring_closures: usize,
    pub fragments: usize,
}

impl MolGraph {
    /// Sum of bond orders around an atom.
    pub fn bond_valence(&self, atom: usize) -> f64 {
        self.bonds
            .iter()
            .filter(|b| b.a == atom || b.b == atom)
            .map(|b| b.order.valence())
            .sum()
    }

    /// Hydrogens on an atom: the bracket count if given, otherwise the
    /// smallest default valence that fits the bonds already drawn.
    pub fn hydrogen_count(&self, atom: usize) -> u32 {
        let a = &self.atoms[atom];
        if let Some(h) = a.explicit_h {
            return h;
        }
        let used = self.bond_valence(atom).floor() as u32;
        a.default_valences()
            .iter()
            .find(|v| **v >= used)
            .map(|v| v - used)
            .unwrap_or(0)
    }

    pub fn total_hydrogens(&self) -> u32 {
        (0..self.atoms.len()).map(|i| self.hydrogen_count(i)).sum()
    }

    pub fn has_double_bond(&self, atom: usize) -> bool {
        self.bonds
            .iter()
            .any(|b| b.order == BondOrder::Double && (b.a == atom || b.b == atom))
    }

    /// Whether the atom carries a double bond to oxygen or nitrogen.
    pub fn has_double_bond_to_heteroatom(&self, atom: usize) -> bool {
        self.bonds.iter().any(|b| {
            if b.order != BondOrder::Double {
                return false;
            }
            let other = if b.a == atom {
                b.b
            } else if b.b == atom {
                b.a
            } else {
                return false;
            };
            matches!(self.atoms[other].element.as_str(), "O" | "N")
        })
    }
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    graph: MolGraph,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<(BondOrder, usize)>,
    rings: BTreeMap<u32, (usize, Option<BondOrder>)>,
    branch_opened: bool,
}

impl<'a> Parser<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            graph: MolGraph {
                fragments: 1,
                ..Default::default()
            },
            prev: None,
            branches: Vec::new(),
            pending_bond: None,
            rings: BTreeMap::new(),
            branch_opened: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn unexpected(&self) -> SmilesError {
        SmilesError::UnexpectedChar {
            pos: self.pos,
            ch: self.chars[self.pos],
        }
    }

    fn add_atom(&mut self, atom: Atom) {
        let idx = self.graph.atoms.len();
        let aromatic = atom.aromatic;
        self.graph.atoms.push(atom);
        if let Some(prev) = self.prev {
            let order = match self.pending_bond.take() {
                Some((order, _)) => order,
                None if aromatic && self.graph.atoms[prev].aromatic => BondOrder::Aromatic,
                None => BondOrder::Single,
            };
            self.graph.bonds.push(Bond {
                a: prev,
                b: idx,
                order,
            });
        }
        self.prev = Some(idx);
        self.branch_opened = false;
    }

    fn run(mut self) -> Result<MolGraph, SmilesError> {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                '(' => {
                    if self.prev.is_none() || self.branch_opened {
                        return Err(self.unexpected());
                    }
                    self.branches.push(self.prev);
                    self.branch_opened = true;
                    self.pos += 1;
                }
                ')' => {
                    if self.branch_opened {
                        return Err(SmilesError::EmptyBranch { pos: self.pos });
                    }
                    if let Some((_, pos)) = self.pending_bond {
                        return Err(SmilesError::DanglingBond { pos });
                    }
                    self.prev = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnmatchedClose { pos: self.pos })?;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.prev.is_none() || self.pending_bond.is_some() {
                        return Err(self.unexpected());
                    }
                    let order = match c {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending_bond = Some((order, self.pos));
                    self.branch_opened = false;
                    self.pos += 1;
                }
                '.' => {
                    let dangling = self.pending_bond.is_some() || !self.branches.is_empty();
                    if self.prev.is_none() || dangling {
                        return Err(self.unexpected());
                    }
                    self.prev = None;
                    self.graph.fragments += 1;
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.ring_closure()?,
                '[' => self.bracket_atom()?,
                _ => self.organic_atom()?,
            }
        }

        if let Some((_, pos)) = self.pending_bond {
            return Err(SmilesError::DanglingBond { pos });
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnclosedBranch);
        }
        if let Some((&label, _)) = self.rings.iter().next() {
            return Err(SmilesError::UnclosedRing { label });
        }
        if self.graph.atoms.is_empty() || self.prev.is_none() {
            return Err(SmilesError::Empty);
        }
        Ok(self.graph)
    }

    fn ring_closure(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        let Some(current) = self.prev else {
            return Err(self.unexpected());
        };
        let label = if self.chars[self.pos] == '%' {
            let digits: String = (1..=2).filter_map(|o| self.peek(o)).collect();
            if digits.len() != 2 || !digits.chars().all(|d| d.is_ascii_digit()) {
                return Err(self.unexpected());
            }
            self.pos += 3;
            digits.parse::<u32>().unwrap_or_default()
        } else {
            self.pos += 1;
            self.chars[start].to_digit(10).unwrap_or_default()
        };

        let bond = self.pending_bond.take().map(|(order, _)| order);
        match self.rings.remove(&label) {
            Some((opened, opened_bond)) => {
                if opened == current {
                    return Err(SmilesError::UnexpectedChar {
                        pos: start,
                        ch: self.chars[start],
                    });
                }
                let order = bond.or(opened_bond).unwrap_or(
                    if self.graph.atoms[opened].aromatic && self.graph.atoms[current].aromatic {
                        BondOrder::Aromatic
                    } else {
                        BondOrder::Single
                    },
                );
                self.graph.bonds.push(Bond {
                    a: opened,
                    b: current,
                    order,
                });
                self.graph.ring_closures += 1;
            }
            None => {
                self.rings.insert(label, (current, bond));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<(), SmilesError> {
        let c = self.chars[self.pos];
        let two = match (c, self.peek(1)) {
            ('C', Some('l')) => Some("Cl"),
            ('B', Some('r')) => Some("Br"),
            _ => None,
        };
        if let Some(symbol) = two {
            self.pos += 2;
            self.add_atom(Atom::organic(symbol, false));
            return Ok(());
        }
        let atom = match c {
            'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' => Atom::organic(&c.to_string(), false),
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                Atom::organic(&c.to_ascii_uppercase().to_string(), true)
            }
            _ if c.is_ascii_alphabetic() => {
                return Err(SmilesError::UnknownElement {
                    pos: self.pos,
                    symbol: c.to_string(),
                })
            }
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        self.add_atom(atom);
        Ok(())
    }

    fn bracket_atom(&mut self) -> Result<(), SmilesError> {
        let open = self.pos;
        let close = self.chars[open..]
            .iter()
            .position(|&c| c == ']')
            .map(|offset| open + offset)
            .ok_or_else(|| SmilesError::InvalidBracket {
                pos: open,
                message: "missing ']'".to_string(),
            })?;
        let body: Vec<char> = self.chars[open + 1..close].to_vec();
        let atom = parse_bracket(&body, open)?;
        self.pos = close + 1;
        self.add_atom(atom);
        Ok(())
    }
}

fn parse_bracket(body: &[char], pos: usize) -> Result<Atom, SmilesError> {
    let invalid = |message: &str| SmilesError::InvalidBracket {
        pos,
        message: message.to_string(),
    };
    let mut i = 0;
    while i < body.len() && body[i].is_ascii_digit() {
        i += 1;
    }

    let first = *body.get(i).ok_or_else(|| invalid("missing element"))?;
    let (element, aromatic) = if first.is_ascii_uppercase() {
        let two: String = body[i..].iter().take(2).collect();
        if two.len() == 2 && BRACKET_ELEMENTS.contains(&two.as_str()) {
            i += 2;
            (two, false)
        } else if BRACKET_ELEMENTS.contains(&first.to_string().as_str()) {
            i += 1;
            (first.to_string(), false)
        } else {
            return Err(SmilesError::UnknownElement {
                pos,
                symbol: first.to_string(),
            });
        }
    } else {
        let two: String = body[i..].iter().take(2).collect();
        if two.len() == 2 && AROMATIC_BRACKET.contains(&two.as_str()) {
            i += 2;
            (capitalize(&two), true)
        } else if AROMATIC_BRACKET.contains(&first.to_string().as_str()) {
            i += 1;
            (first.to_ascii_uppercase().to_string(), true)
        } else {
            return Err(SmilesError::UnknownElement {
                pos,
                symbol: first.to_string(),
            });
        }
    };

    while i < body.len() && body[i] == '@' {
        i += 1;
    }

    let mut explicit_h = 0;
    if i < body.len() && body[i] == 'H' {
        i += 1;
        explicit_h = 1;
        let start = i;
        while i < body.len() && body[i].is_ascii_digit() {
            i += 1;
        }
        if i > start {
            let digits: String = body[start..i].iter().collect();
            explicit_h = digits
                .parse::<u32>()
                .ok()
                .filter(|h| *h <= MAX_BRACKET_HYDROGENS)
                .ok_or_else(|| invalid("bad hydrogen count"))?;
        }
    }

    let mut charge = 0i32;
    if i < body.len() && (body[i] == '+' || body[i] == '-') {
        let sign = if body[i] == '+' { 1 } else { -1 };
        let symbol = body[i];
        i += 1;
        let start = i;
        while i < body.len() && body[i].is_ascii_digit() {
            i += 1;
        }
        if i > start {
            let digits: String = body[start..i].iter().collect();
            charge = sign * digits.parse::<i32>().map_err(|_| invalid("bad charge"))?;
        } else {
            let mut magnitude = 1;
            while i < body.len() && body[i] == symbol {
                magnitude += 1;
                i += 1;
            }
            charge = sign * magnitude;
        }
        if charge.unsigned_abs() > MAX_BRACKET_CHARGE {
            return Err(invalid("charge out of range"));
        }
    }

    if i != body.len() {
        return Err(invalid("trailing characters"));
    }

    Ok(Atom {
        element,
        aromatic,
        charge,
        explicit_h: Some(explicit_h),
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse a SMILES string into a molecular graph.
pub fn parse_smiles(smiles: &str) -> Result<MolGraph, SmilesError> {
    let chars: Vec<char> = smiles.trim().chars().collect();
    if chars.is_empty() {
        return Err(SmilesError::Empty);
    }
    Parser::new(&chars).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ethanol() {
        let graph = parse_smiles("CCO").unwrap();
        assert_eq!(graph.atoms.len(), 3);
        assert_eq!(graph.bonds.len(), 2);
        assert_eq!(graph.total_hydrogens(), 6);
    }

    #[test]
    fn parses_benzene_ring() {
        let graph = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(graph.atoms.len(), 6);
        assert_eq!(graph.bonds.len(), 6);
        assert_eq!(graph.ring_closures, 1);
        assert!(graph.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
        assert_eq!(graph.total_hydrogens(), 6);
    }

    #[test]
    fn parses_branches_and_double_bonds() {
        let graph = parse_smiles("CC(=O)O").unwrap();
        assert_eq!(graph.atoms.len(), 4);
        assert_eq!(
            graph.bonds.iter().filter(|b| b.order == BondOrder::Double).count(),
            1
        );
        assert!(graph.has_double_bond_to_heteroatom(1));
        assert_eq!(graph.total_hydrogens(), 4);
    }

    #[test]
    fn parses_bracket_atoms() {
        let graph = parse_smiles("[NH4+].[Cl-]").unwrap();
        assert_eq!(graph.fragments, 2);
        assert_eq!(graph.atoms[0].charge, 1);
        assert_eq!(graph.atoms[0].explicit_h, Some(4));
        assert_eq!(graph.atoms[1].element, "Cl");
        assert_eq!(graph.atoms[1].charge, -1);

        let pyrrole = parse_smiles("c1cc[nH]c1").unwrap();
        assert_eq!(pyrrole.atoms[3].element, "N");
        assert!(pyrrole.atoms[3].aromatic);
        assert_eq!(pyrrole.hydrogen_count(3), 1);
    }

    #[test]
    fn bracket_counts_are_bounded() {
        assert!(parse_smiles("[CH9]").is_ok());
        assert!(parse_smiles("[Fe+15]").is_ok());
        for smiles in ["[CH10]", "[CH4000000000]", "[C+16]", "[C+2000000000]", "[C-99999]"] {
            assert!(
                matches!(parse_smiles(smiles), Err(SmilesError::InvalidBracket { .. })),
                "{smiles} should be rejected"
            );
        }
        let many_plus = format!("[C{}]", "+".repeat(40));
        assert!(matches!(
            parse_smiles(&many_plus),
            Err(SmilesError::InvalidBracket { .. })
        ));
    }

    #[test]
    fn parses_two_letter_halogens() {
        let graph = parse_smiles("ClCCBr").unwrap();
        assert_eq!(graph.atoms[0].element, "Cl");
        assert_eq!(graph.atoms[3].element, "Br");
        assert!(graph.atoms[0].is_halogen());
    }

    #[test]
    fn parses_percent_ring_labels() {
        let graph = parse_smiles("C%10CCCCC%10").unwrap();
        assert_eq!(graph.ring_closures, 1);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_smiles(""), Err(SmilesError::Empty));
        assert_eq!(parse_smiles("C(C"), Err(SmilesError::UnclosedBranch));
        assert!(matches!(
            parse_smiles("CC)"),
            Err(SmilesError::UnmatchedClose { .. })
        ));
        assert!(matches!(
            parse_smiles("C()C"),
            Err(SmilesError::EmptyBranch { .. })
        ));
        assert_eq!(
            parse_smiles("C1CC"),
            Err(SmilesError::UnclosedRing { label: 1 })
        );
        assert!(matches!(
            parse_smiles("CC="),
            Err(SmilesError::DanglingBond { .. })
        ));
        assert!(matches!(
            parse_smiles("CXC"),
            Err(SmilesError::UnknownElement { .. })
        ));
        assert!(matches!(
            parse_smiles("C[Zz]"),
            Err(SmilesError::UnknownElement { .. })
        ));
        assert!(matches!(
            parse_smiles("=CC"),
            Err(SmilesError::UnexpectedChar { .. })
        ));
        assert!(matches!(
            parse_smiles("C[NH4"),
            Err(SmilesError::InvalidBracket { .. })
        ));
    }
}
