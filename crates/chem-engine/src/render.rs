//! Visualization of the optimal molecule's synthesis route.

use chem_types::{ChemError, ChemResult, Molecule, SynthesisPath};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Draws a molecule to disk.
pub trait MoleculeRenderer: Send + Sync {
    /// Render next to `stem` (a path without extension) and return the main
    /// artifact written.
    fn render(&self, molecule: &Molecule, stem: &Path) -> ChemResult<PathBuf>;

    fn name(&self) -> &str;
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn write_node(out: &mut String, path: &SynthesisPath, next_id: &mut usize) -> usize {
    let id = *next_id;
    *next_id += 1;
    let shape = if path.is_purchasable() { "box" } else { "doubleoctagon" };
    let _ = writeln!(
        out,
        "  m{id} [label=\"{}\", shape={shape}];",
        escape(&path.product)
    );

    if let Some(reaction) = &path.reaction {
        let rxn = *next_id;
        *next_id += 1;
        let _ = writeln!(
            out,
            "  m{rxn} [label=\"{}\", shape=ellipse, style=dashed];",
            escape(reaction)
        );
        let _ = writeln!(out, "  m{rxn} -> m{id};");
        for precursor in &path.precursors {
            let child = write_node(out, precursor, next_id);
            let _ = writeln!(out, "  m{child} -> m{rxn};");
        }
    }
    id
}

/// Graphviz source for a molecule's synthesis route, precursors at the top.
pub fn synthesis_dot(molecule: &Molecule) -> String {
    let mut out = String::from("digraph synthesis {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [fontname=\"Helvetica\"];\n");
    let mut next_id = 0;
    write_node(&mut out, &molecule.synthesis_path(), &mut next_id);
    out.push_str("}\n");
    out
}

/// Writes the synthesis route as a `.dot` file.
#[derive(Debug, Clone, Default)]
pub struct DotRenderer;

impl MoleculeRenderer for DotRenderer {
    fn render(&self, molecule: &Molecule, stem: &Path) -> ChemResult<PathBuf> {
        let path = stem.with_extension("dot");
        fs::write(&path, synthesis_dot(molecule))?;
        Ok(path)
    }

    fn name(&self) -> &str {
        "dot"
    }
}

/// Writes the `.dot` source and converts it to `.eps` with the graphviz
/// `dot` program.
#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    program: PathBuf,
}

impl GraphvizRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probe for `dot` on the PATH.
    pub fn detect() -> Option<Self> {
        let renderer = Self::new("dot");
        match Command::new(&renderer.program).arg("-V").output() {
            Ok(output) if output.status.success() => {
                tracing::debug!("graphviz found");
                Some(renderer)
            }
            Ok(output) => {
                tracing::debug!(status = %output.status, "graphviz probe failed");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "graphviz not installed");
                None
            }
        }
    }
}

impl MoleculeRenderer for GraphvizRenderer {
    fn render(&self, molecule: &Molecule, stem: &Path) -> ChemResult<PathBuf> {
        let source = DotRenderer.render(molecule, stem)?;
        let target = stem.with_extension("eps");
        let output = Command::new(&self.program)
            .arg("-Teps")
            .arg(&source)
            .arg("-o")
            .arg(&target)
            .output()
            .map_err(|e| ChemError::RendererUnavailable(e.to_string()))?;
        if !output.status.success() {
            return Err(ChemError::RendererUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(target)
    }

    fn name(&self) -> &str {
        "graphviz"
    }
}
