use chem_types::{ChemResult, DataError, Molecule};
use std::fs;
use std::path::Path;

/// Candidate file formats understood by [`MoleculeLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated with a header row; the SMILES column is detected by name.
    Csv,
    /// One molecule per line, SMILES first, anything after whitespace ignored.
    Smi,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "smi" | "smiles" | "txt" => Some(Self::Smi),
            _ => None,
        }
    }
}

/// Reads candidate molecules from disk.
#[derive(Debug, Default)]
pub struct MoleculeLoader;

impl MoleculeLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load molecules from a file, picking the reader by extension.
    pub fn load_file<P: AsRef<Path>>(&self, file_path: P) -> ChemResult<Vec<Molecule>> {
        let path = file_path.as_ref();
        if !path.exists() {
            return Err(DataError::SourceNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        match FileFormat::from_path(path) {
            Some(FileFormat::Csv) => self.load_csv_file(path),
            Some(FileFormat::Smi) => self.load_smi_file(path),
            None => Err(DataError::LoadingFailed {
                message: format!("unrecognized candidate file extension: {}", path.display()),
            }
            .into()),
        }
    }

    /// Load molecules from a CSV file using the csv crate
    pub fn load_csv_file<P: AsRef<Path>>(&self, file_path: P) -> ChemResult<Vec<Molecule>> {
        use csv::ReaderBuilder;

        let path = file_path.as_ref();
        tracing::info!("Loading CSV candidates from: {}", path.display());

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();
        let smiles_idx = Self::detect_smiles_column(&headers);
        tracing::debug!("CSV headers: {:?}, SMILES column {}", headers, smiles_idx);

        let mut molecules = Vec::new();
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line_num + 2, e),
            })?;

            match record.get(smiles_idx).map(str::trim) {
                Some(smiles) if !smiles.is_empty() => molecules.push(Molecule::new(smiles)),
                _ => {
                    tracing::warn!("Skipping record without SMILES at line {}", line_num + 2);
                }
            }
        }

        tracing::info!("Loaded {} molecules from CSV file", molecules.len());
        Ok(molecules)
    }

    /// Load molecules from a SMILES listing.
    pub fn load_smi_file<P: AsRef<Path>>(&self, file_path: P) -> ChemResult<Vec<Molecule>> {
        let path = file_path.as_ref();
        tracing::info!("Loading SMILES candidates from: {}", path.display());

        let contents = fs::read_to_string(path)?;
        let molecules: Vec<Molecule> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_whitespace().next())
            .map(Molecule::new)
            .collect();

        tracing::info!("Loaded {} molecules from SMILES file", molecules.len());
        Ok(molecules)
    }

    /// Column named "smiles" (any case), otherwise the first column.
    fn detect_smiles_column(headers: &csv::StringRecord) -> usize {
        headers
            .iter()
            .position(|h| {
                let h = h.trim().to_lowercase();
                h == "smiles" || h == "canonical_smiles"
            })
            .unwrap_or(0)
    }
}
