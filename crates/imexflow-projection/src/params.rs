//! Run-time parameters.
//!
//! Every group deserializes from JSON with defaults for omitted fields and
//! is checked by a `validate()` pass before any solve runs.

use std::fmt;

pub use imexflow_core::ConvectiveTermWeakForm;
use imexflow_solver::{KrylovMethod, LinearSolverParameters, PreconditionerKind};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time discretization of the convective term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvectiveTermTimeDiscretization {
    /// Advection by the extrapolated velocity enters the system matrix.
    #[default]
    SemiImplicit,
    /// Extrapolated advection enters the right-hand side only.
    FullyExplicit,
}

/// Incremental pressure-correction variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureCorrectionScheme {
    Standard,
    #[default]
    Rotational,
}

impl fmt::Display for PressureCorrectionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureCorrectionScheme::Standard => write!(f, "standard"),
            PressureCorrectionScheme::Rotational => write!(f, "rotational"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    #[default]
    Hydrodynamic,
    HeatConvectionDiffusion,
    Boussinesq,
    RotatingBoussinesq,
}

/// Reynolds, Péclet, Prandtl, Rayleigh and Ekman numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionlessNumbers {
    #[serde(rename = "Re", skip_serializing_if = "Option::is_none")]
    pub reynolds: Option<f64>,
    #[serde(rename = "Pe", skip_serializing_if = "Option::is_none")]
    pub peclet: Option<f64>,
    #[serde(rename = "Pr", skip_serializing_if = "Option::is_none")]
    pub prandtl: Option<f64>,
    #[serde(rename = "Ra", skip_serializing_if = "Option::is_none")]
    pub rayleigh: Option<f64>,
    #[serde(rename = "Ek", skip_serializing_if = "Option::is_none")]
    pub ekman: Option<f64>,
}

fn required(value: Option<f64>, name: &str, problem: ProblemType) -> Result<f64> {
    match value {
        Some(v) if v > 0.0 && v.is_finite() => Ok(v),
        Some(v) => Err(Error::ConfigurationConflict(format!(
            "{} must be positive, got {}",
            name, v
        ))),
        None => Err(Error::ConfigurationConflict(format!(
            "{:?} problem needs the {} number",
            problem, name
        ))),
    }
}

/// Scaling constants of the non-dimensional equations.
///
/// ```text
/// du/dt + (u·∇)u + C1 e_Ω×u = -∇p + C2 Δu + C3 θ e_g + C5 f
/// dθ/dt + u·∇θ              = C4 Δθ + C6 r
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConstants {
    #[serde(rename = "C1")]
    pub c1: f64,
    #[serde(rename = "C2")]
    pub c2: f64,
    #[serde(rename = "C3")]
    pub c3: f64,
    #[serde(rename = "C4")]
    pub c4: f64,
    #[serde(rename = "C5")]
    pub c5: f64,
    #[serde(rename = "C6")]
    pub c6: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            c1: 0.0,
            c2: 1.0,
            c3: 0.0,
            c4: 1.0,
            c5: 0.0,
            c6: 0.0,
        }
    }
}

impl PhysicalConstants {
    /// Constants of a problem type from its dimensionless numbers.
    pub fn from_dimensionless(problem: ProblemType, numbers: &DimensionlessNumbers) -> Result<Self> {
        let base = Self {
            c5: 1.0,
            c6: 1.0,
            ..Self::default()
        };
        match problem {
            ProblemType::Hydrodynamic => {
                let re = required(numbers.reynolds, "Reynolds", problem)?;
                Ok(Self { c2: 1.0 / re, ..base })
            }
            ProblemType::HeatConvectionDiffusion => {
                let pe = required(numbers.peclet, "Peclet", problem)?;
                Ok(Self {
                    c2: 0.0,
                    c4: 1.0 / pe,
                    ..base
                })
            }
            ProblemType::Boussinesq => {
                let pr = required(numbers.prandtl, "Prandtl", problem)?;
                let ra = required(numbers.rayleigh, "Rayleigh", problem)?;
                Ok(Self {
                    c2: (pr / ra).sqrt(),
                    c3: 1.0,
                    c4: 1.0 / (ra * pr).sqrt(),
                    ..base
                })
            }
            ProblemType::RotatingBoussinesq => {
                let pr = required(numbers.prandtl, "Prandtl", problem)?;
                let ra = required(numbers.rayleigh, "Rayleigh", problem)?;
                let ek = required(numbers.ekman, "Ekman", problem)?;
                Ok(Self {
                    c1: 2.0 / ek,
                    c2: 1.0,
                    c3: ra / pr,
                    c4: 1.0 / pr,
                    ..base
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSteppingParameters {
    pub start_time: f64,
    pub end_time: f64,
    pub initial_step_size: f64,
    pub adaptive_time_stepping: bool,
    pub courant_number: f64,
    pub minimum_step_size: Option<f64>,
    pub maximum_step_size: Option<f64>,
    /// Largest admissible step as a fraction of `end_time - start_time`.
    pub max_step_fraction: Option<f64>,
    pub n_maximum_steps: Option<usize>,
    /// Lower bound on the cell velocity used by the CFL criterion.
    pub velocity_floor: f64,
}

impl Default for TimeSteppingParameters {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 1.0,
            initial_step_size: 1e-2,
            adaptive_time_stepping: false,
            courant_number: 1.0,
            minimum_step_size: None,
            maximum_step_size: None,
            max_step_fraction: Some(0.5),
            n_maximum_steps: None,
            velocity_floor: 1e-10,
        }
    }
}

impl TimeSteppingParameters {
    pub fn interval_length(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.end_time > self.start_time) {
            return Err(Error::ConfigurationConflict(format!(
                "end time {} must exceed start time {}",
                self.end_time, self.start_time
            )));
        }
        if !(self.initial_step_size > 0.0) {
            return Err(Error::ConfigurationConflict(format!(
                "initial step size must be positive, got {}",
                self.initial_step_size
            )));
        }
        if !(self.courant_number > 0.0) {
            return Err(Error::ConfigurationConflict(format!(
                "Courant number must be positive, got {}",
                self.courant_number
            )));
        }
        if !(self.velocity_floor > 0.0) {
            return Err(Error::ConfigurationConflict(
                "velocity floor must be positive".to_string(),
            ));
        }
        if let (Some(lo), Some(hi)) = (self.minimum_step_size, self.maximum_step_size) {
            if lo > hi {
                return Err(Error::ConfigurationConflict(format!(
                    "minimum step size {} exceeds maximum step size {}",
                    lo, hi
                )));
            }
        }
        if let Some(fraction) = self.max_step_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(Error::ConfigurationConflict(format!(
                    "max step fraction must lie in (0, 1], got {}",
                    fraction
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavierStokesParameters {
    pub convective_term_weak_form: ConvectiveTermWeakForm,
    pub convective_term_time_discretization: ConvectiveTermTimeDiscretization,
    pub pressure_correction_scheme: PressureCorrectionScheme,
    pub preconditioner_update_frequency: usize,
    pub physical_constants: PhysicalConstants,
    pub diffusion_step_solver: LinearSolverParameters,
    pub projection_step_solver: LinearSolverParameters,
    /// Mass-matrix solve of the rotational correction.
    pub correction_step_solver: Option<LinearSolverParameters>,
    /// `cg` or `direct` for the correction mass-matrix solve.
    pub correction_step_method: KrylovMethod,
    pub poisson_prestep_solver: LinearSolverParameters,
    /// Solve for an initial pressure before the first step.
    pub poisson_prestep: bool,
    pub verbose: bool,
}

impl Default for NavierStokesParameters {
    fn default() -> Self {
        Self {
            convective_term_weak_form: ConvectiveTermWeakForm::SkewSymmetric,
            convective_term_time_discretization: ConvectiveTermTimeDiscretization::SemiImplicit,
            pressure_correction_scheme: PressureCorrectionScheme::Rotational,
            preconditioner_update_frequency: 10,
            physical_constants: PhysicalConstants::default(),
            diffusion_step_solver: LinearSolverParameters::default(),
            projection_step_solver: LinearSolverParameters::default(),
            correction_step_solver: Some(
                LinearSolverParameters::default().with_preconditioner(PreconditionerKind::Jacobi),
            ),
            correction_step_method: KrylovMethod::Cg,
            poisson_prestep_solver: LinearSolverParameters::default(),
            poisson_prestep: true,
            verbose: false,
        }
    }
}

impl NavierStokesParameters {
    pub fn validate(&self) -> Result<()> {
        if self.preconditioner_update_frequency == 0 {
            return Err(Error::ConfigurationConflict(
                "preconditioner update frequency must be at least 1".to_string(),
            ));
        }
        if self.pressure_correction_scheme == PressureCorrectionScheme::Rotational
            && self.correction_step_solver.is_none()
        {
            return Err(Error::ConfigurationConflict(
                "rotational pressure correction needs a correction step solver".to_string(),
            ));
        }
        for (name, solver) in [
            ("diffusion", Some(&self.diffusion_step_solver)),
            ("projection", Some(&self.projection_step_solver)),
            ("correction", self.correction_step_solver.as_ref()),
            ("Poisson pre-step", Some(&self.poisson_prestep_solver)),
        ] {
            if let Some(solver) = solver {
                validate_solver(name, solver)?;
            }
        }
        Ok(())
    }
}

fn validate_solver(name: &str, solver: &LinearSolverParameters) -> Result<()> {
    if solver.n_maximum_iterations == 0 || solver.krylov_size == 0 {
        return Err(Error::ConfigurationConflict(format!(
            "{} solver needs a positive iteration cap and Krylov size",
            name
        )));
    }
    if !(solver.relative_tolerance >= 0.0 && solver.absolute_tolerance >= 0.0)
        || solver.relative_tolerance + solver.absolute_tolerance == 0.0
    {
        return Err(Error::ConfigurationConflict(format!(
            "{} solver tolerances must be non-negative and not both zero",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatEquationParameters {
    /// The rotational form has no scalar counterpart and acts as standard.
    pub convective_term_weak_form: ConvectiveTermWeakForm,
    pub convective_term_time_discretization: ConvectiveTermTimeDiscretization,
    pub preconditioner_update_frequency: usize,
    pub solver: LinearSolverParameters,
    pub verbose: bool,
}

impl Default for HeatEquationParameters {
    fn default() -> Self {
        Self {
            convective_term_weak_form: ConvectiveTermWeakForm::SkewSymmetric,
            convective_term_time_discretization: ConvectiveTermTimeDiscretization::SemiImplicit,
            preconditioner_update_frequency: 10,
            solver: LinearSolverParameters::default(),
            verbose: false,
        }
    }
}

impl HeatEquationParameters {
    pub fn validate(&self) -> Result<()> {
        if self.preconditioner_update_frequency == 0 {
            return Err(Error::ConfigurationConflict(
                "preconditioner update frequency must be at least 1".to_string(),
            ));
        }
        validate_solver("heat equation", &self.solver)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceTestType {
    Spatial,
    #[default]
    Temporal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceTestParameters {
    pub test_type: ConvergenceTestType,
    pub n_cycles: usize,
    /// Factor applied to the step size between temporal cycles.
    pub step_size_reduction_factor: f64,
    /// Global refinements of the coarsest mesh.
    pub n_global_refinements: usize,
}

impl Default for ConvergenceTestParameters {
    fn default() -> Self {
        Self {
            test_type: ConvergenceTestType::Temporal,
            n_cycles: 4,
            step_size_reduction_factor: 0.5,
            n_global_refinements: 3,
        }
    }
}

impl ConvergenceTestParameters {
    pub fn validate(&self) -> Result<()> {
        if self.n_cycles == 0 {
            return Err(Error::ConfigurationConflict(
                "a convergence test needs at least one cycle".to_string(),
            ));
        }
        if !(self.step_size_reduction_factor > 0.0 && self.step_size_reduction_factor < 1.0) {
            return Err(Error::ConfigurationConflict(format!(
                "step size reduction factor must lie in (0, 1), got {}",
                self.step_size_reduction_factor
            )));
        }
        Ok(())
    }
}

/// Top-level parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemParameters {
    pub problem_type: ProblemType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensionless_numbers: Option<DimensionlessNumbers>,
    /// Explicit constants; win over derived ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_constants: Option<PhysicalConstants>,
    pub time_stepping: TimeSteppingParameters,
    pub navier_stokes: NavierStokesParameters,
    pub heat_equation: HeatEquationParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence_test: Option<ConvergenceTestParameters>,
    pub terminal_output_frequency: usize,
    pub output_frequency: usize,
}

impl Default for ProblemParameters {
    fn default() -> Self {
        Self {
            problem_type: ProblemType::Hydrodynamic,
            dimensionless_numbers: None,
            physical_constants: None,
            time_stepping: TimeSteppingParameters::default(),
            navier_stokes: NavierStokesParameters::default(),
            heat_equation: HeatEquationParameters::default(),
            convergence_test: None,
            terminal_output_frequency: 100,
            output_frequency: 100,
        }
    }
}

impl ProblemParameters {
    /// Fix the constants used by the solvers: explicit ones, then ones
    /// derived from dimensionless numbers, then the Navier–Stokes block.
    pub fn resolve_constants(&mut self) -> Result<PhysicalConstants> {
        let constants = match (self.physical_constants, &self.dimensionless_numbers) {
            (Some(explicit), _) => explicit,
            (None, Some(numbers)) => PhysicalConstants::from_dimensionless(self.problem_type, numbers)?,
            (None, None) => self.navier_stokes.physical_constants,
        };
        self.navier_stokes.physical_constants = constants;
        Ok(constants)
    }

    pub fn validate(&self) -> Result<()> {
        self.time_stepping.validate()?;
        self.navier_stokes.validate()?;
        self.heat_equation.validate()?;
        if let Some(test) = &self.convergence_test {
            test.validate()?;
        }
        if self.terminal_output_frequency == 0 || self.output_frequency == 0 {
            return Err(Error::ConfigurationConflict(
                "output frequencies must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the problem carries a temperature field.
    pub fn has_heat_equation(&self) -> bool {
        !matches!(self.problem_type, ProblemType::Hydrodynamic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ProblemParameters::default().validate().unwrap();
    }

    #[test]
    fn test_rotational_without_correction_solver_conflicts() {
        let params = NavierStokesParameters {
            correction_step_solver: None,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(Error::ConfigurationConflict(_))));

        let standard = NavierStokesParameters {
            pressure_correction_scheme: PressureCorrectionScheme::Standard,
            correction_step_solver: None,
            ..Default::default()
        };
        standard.validate().unwrap();
    }

    #[test]
    fn test_constants_from_dimensionless_numbers() {
        let numbers = DimensionlessNumbers {
            reynolds: Some(100.0),
            prandtl: Some(1.0),
            rayleigh: Some(1e4),
            ekman: Some(1e-3),
            ..Default::default()
        };

        let hydro = PhysicalConstants::from_dimensionless(ProblemType::Hydrodynamic, &numbers).unwrap();
        assert!((hydro.c2 - 0.01).abs() < 1e-15);
        assert_eq!(hydro.c5, 1.0);

        let bous = PhysicalConstants::from_dimensionless(ProblemType::Boussinesq, &numbers).unwrap();
        assert!((bous.c2 - 0.01).abs() < 1e-15);
        assert!((bous.c4 - 0.01).abs() < 1e-15);
        assert_eq!(bous.c3, 1.0);

        let rot = PhysicalConstants::from_dimensionless(ProblemType::RotatingBoussinesq, &numbers).unwrap();
        assert!((rot.c1 - 2000.0).abs() < 1e-9);
        assert!((rot.c3 - 1e4).abs() < 1e-9);

        let missing = PhysicalConstants::from_dimensionless(ProblemType::HeatConvectionDiffusion, &numbers);
        assert!(matches!(missing, Err(Error::ConfigurationConflict(_))));
    }

    #[test]
    fn test_explicit_constants_win() {
        let mut params = ProblemParameters {
            dimensionless_numbers: Some(DimensionlessNumbers {
                reynolds: Some(10.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!((params.resolve_constants().unwrap().c2 - 0.1).abs() < 1e-15);

        params.physical_constants = Some(PhysicalConstants {
            c2: 0.5,
            ..Default::default()
        });
        assert_eq!(params.resolve_constants().unwrap().c2, 0.5);
        assert_eq!(params.navier_stokes.physical_constants.c2, 0.5);
    }

    #[test]
    fn test_json_partial_file() {
        let json = r#"{
            "problem_type": "boussinesq",
            "dimensionless_numbers": { "Pr": 0.71, "Ra": 1e5 },
            "time_stepping": { "end_time": 2.0, "adaptive_time_stepping": true },
            "navier_stokes": {
                "pressure_correction_scheme": "standard",
                "convective_term_weak_form": "rotational"
            },
            "heat_equation": { "convective_term_weak_form": "divergence" }
        }"#;
        let params: ProblemParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.problem_type, ProblemType::Boussinesq);
        assert_eq!(params.time_stepping.end_time, 2.0);
        assert_eq!(params.time_stepping.initial_step_size, 1e-2);
        assert_eq!(
            params.navier_stokes.pressure_correction_scheme,
            PressureCorrectionScheme::Standard
        );
        assert_eq!(
            params.navier_stokes.convective_term_weak_form,
            ConvectiveTermWeakForm::Rotational
        );
        assert_eq!(
            params.heat_equation.convective_term_weak_form,
            ConvectiveTermWeakForm::Divergence
        );
        assert!(params.has_heat_equation());
        params.validate().unwrap();

        let defaults = ProblemParameters::default();
        assert_eq!(
            defaults.navier_stokes.convective_term_weak_form,
            ConvectiveTermWeakForm::SkewSymmetric
        );
        assert_eq!(
            serde_json::to_value(ConvectiveTermWeakForm::SkewSymmetric).unwrap(),
            serde_json::json!("skew_symmetric")
        );
    }

    #[test]
    fn test_invalid_time_interval() {
        let params = TimeSteppingParameters {
            end_time: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
