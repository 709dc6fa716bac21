//! Translation between molecules and processed points, and the function
//! caller that evaluates objectives on processed points.

use chem_data::CandidatePool;
use chem_props::{smiles_fingerprint, Objective};
use chem_types::{
    ChemResult, EvaluationError, Fingerprint, Molecule, ProcessedPoint, TranslationError,
};
use std::sync::Arc;

use crate::reporter::Reporter;

/// Bijection between raw molecules and the optimizer's encoding.
pub trait DomainTranslator: Send + Sync {
    fn to_processed(&self, molecule: &Molecule) -> Result<ProcessedPoint, TranslationError>;

    fn to_raw(&self, point: &ProcessedPoint) -> Result<Molecule, TranslationError>;
}

/// Translator over a fixed candidate pool. Fingerprints are computed once.
#[derive(Debug, Clone)]
pub struct PoolTranslator {
    pool: Arc<CandidatePool>,
    fingerprints: Vec<Fingerprint>,
}

impl PoolTranslator {
    pub fn new(pool: Arc<CandidatePool>) -> Self {
        let fingerprints = pool.iter().map(|m| smiles_fingerprint(m.smiles())).collect();
        Self { pool, fingerprints }
    }

    pub fn pool(&self) -> &CandidatePool {
        &self.pool
    }

    /// Every pool member in processed form, in pool order.
    pub fn processed_points(&self) -> Vec<ProcessedPoint> {
        self.fingerprints
            .iter()
            .enumerate()
            .map(|(index, fp)| ProcessedPoint::new(index, fp.clone()))
            .collect()
    }
}

impl DomainTranslator for PoolTranslator {
    fn to_processed(&self, molecule: &Molecule) -> Result<ProcessedPoint, TranslationError> {
        let index = self
            .pool
            .position(molecule)
            .ok_or_else(|| TranslationError::NotInPool {
                smiles: molecule.smiles().to_string(),
            })?;
        Ok(ProcessedPoint::new(index, self.fingerprints[index].clone()))
    }

    fn to_raw(&self, point: &ProcessedPoint) -> Result<Molecule, TranslationError> {
        let molecule = self
            .pool
            .get(point.index)
            .ok_or(TranslationError::IndexOutOfBounds {
                index: point.index,
                pool_size: self.pool.len(),
            })?;
        if self.fingerprints[point.index] != point.fingerprint {
            return Err(TranslationError::FingerprintMismatch { index: point.index });
        }
        Ok(molecule.clone())
    }
}

/// Evaluates processed points. Shared across worker threads.
pub trait FunctionCaller: Send + Sync {
    fn evaluate(&self, point: &ProcessedPoint) -> Result<f64, EvaluationError>;

    /// The raw molecule behind a processed point.
    fn raw_of(&self, point: &ProcessedPoint) -> ChemResult<Molecule>;
}

/// Translate, then score with an objective. Results are not cached.
pub struct MolFunctionCaller {
    objective: Arc<dyn Objective>,
    translator: Arc<dyn DomainTranslator>,
    reporter: Option<Reporter>,
}

impl MolFunctionCaller {
    pub fn new(objective: Arc<dyn Objective>, translator: Arc<dyn DomainTranslator>) -> Self {
        Self {
            objective,
            translator,
            reporter: None,
        }
    }

    /// Write one line per evaluation to `reporter`.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn objective_name(&self) -> &str {
        self.objective.name()
    }
}

impl FunctionCaller for MolFunctionCaller {
    fn evaluate(&self, point: &ProcessedPoint) -> Result<f64, EvaluationError> {
        let outcome = self
            .translator
            .to_raw(point)
            .map_err(EvaluationError::from)
            .and_then(|molecule| {
                let value = self.objective.evaluate(&molecule)?;
                Ok((molecule, value))
            });

        match outcome {
            Ok((molecule, value)) => {
                tracing::debug!(point = %point, smiles = %molecule, value, "objective evaluated");
                if let Some(reporter) = &self.reporter {
                    reporter.writeln(format!("Evaluated {} {}: {:.5}", point, molecule, value));
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(point = %point, error = %e, "evaluation failed");
                if let Some(reporter) = &self.reporter {
                    reporter.writeln(format!("Evaluation of {} failed: {}", point, e));
                }
                Err(e)
            }
        }
    }

    fn raw_of(&self, point: &ProcessedPoint) -> ChemResult<Molecule> {
        Ok(self.translator.to_raw(point)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chem_props::{FnObjective, LogP};
    use chem_types::ObjectiveError;

    fn pool() -> Arc<CandidatePool> {
        Arc::new(
            CandidatePool::new(
                "test",
                vec![Molecule::new("CCO"), Molecule::new("c1ccccc1"), Molecule::new("C1CC")],
            )
            .unwrap(),
        )
    }

    #[test]
    fn round_trip_over_pool() {
        let translator = PoolTranslator::new(Arc::new(CandidatePool::builtin()));
        for molecule in translator.pool().iter() {
            let point = translator.to_processed(molecule).unwrap();
            assert_eq!(&translator.to_raw(&point).unwrap(), molecule);
        }
    }

    #[test]
    fn processed_points_follow_pool_order() {
        let translator = PoolTranslator::new(pool());
        let points = translator.processed_points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].index, 1);
        assert_eq!(points[1].fingerprint, smiles_fingerprint("c1ccccc1"));
    }

    #[test]
    fn out_of_bounds_and_mismatch() {
        let translator = PoolTranslator::new(pool());
        let bogus = ProcessedPoint::new(9, Fingerprint::default());
        assert_eq!(
            translator.to_raw(&bogus),
            Err(TranslationError::IndexOutOfBounds { index: 9, pool_size: 3 })
        );

        let mismatched = ProcessedPoint::new(0, Fingerprint::new(vec![1.0]));
        assert_eq!(
            translator.to_raw(&mismatched),
            Err(TranslationError::FingerprintMismatch { index: 0 })
        );

        assert!(matches!(
            translator.to_processed(&Molecule::new("CCCl")),
            Err(TranslationError::NotInPool { .. })
        ));
    }

    #[test]
    fn caller_distinguishes_failure_kinds() {
        let translator: Arc<dyn DomainTranslator> = Arc::new(PoolTranslator::new(pool()));
        let caller = MolFunctionCaller::new(Arc::new(LogP), translator.clone());

        let ethanol = translator.to_processed(&Molecule::new("CCO")).unwrap();
        assert!(caller.evaluate(&ethanol).is_ok());

        let broken = translator.to_processed(&Molecule::new("C1CC")).unwrap();
        assert!(matches!(
            caller.evaluate(&broken),
            Err(EvaluationError::Objective(ObjectiveError::InvalidMolecule { .. }))
        ));

        let missing = ProcessedPoint::new(42, Fingerprint::default());
        assert!(matches!(
            caller.evaluate(&missing),
            Err(EvaluationError::Translation(_))
        ));
    }

    #[test]
    fn caller_reports_each_evaluation() {
        let (reporter, log) = Reporter::in_memory();
        let translator: Arc<dyn DomainTranslator> = Arc::new(PoolTranslator::new(pool()));
        let objective = FnObjective::new("length", |m: &Molecule| -> Result<f64, ObjectiveError> {
            Ok(m.smiles().len() as f64)
        });
        let caller =
            MolFunctionCaller::new(Arc::new(objective), translator.clone()).with_reporter(reporter);

        let point = translator.to_processed(&Molecule::new("c1ccccc1")).unwrap();
        assert_eq!(caller.evaluate(&point).unwrap(), 8.0);
        assert_eq!(caller.raw_of(&point).unwrap().smiles(), "c1ccccc1");
        assert_eq!(log.lines(), vec!["Evaluated #1 c1ccccc1: 8.00000"]);
    }
}
