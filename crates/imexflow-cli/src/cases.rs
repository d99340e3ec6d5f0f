//! Benchmark cases on the unit square.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use imexflow_core::vector::dot;
use imexflow_core::{FlowAssembler, SerialCommunicator};
use imexflow_fem::{BoundaryId, Q1Assembler, scalar_error, unit_square, vector_error};
use imexflow_projection::{
    ConvergenceTable, ConvergenceTestParameters, ConvergenceTestType, DimensionlessNumbers,
    HeatEquation, LoggingObserver, NavierStokesProjection,
    ProblemParameters, ProblemType, Simulation, SimulationSession, TimeSteppingParameters,
    TransportVelocity,
};
use imexflow_solver::KrylovSolver;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Case {
    /// Lid-driven cavity
    Cavity,
    /// Differentially heated cavity (Boussinesq)
    HeatedCavity,
    /// Plane Couette flow, exact in the bilinear space
    Couette,
    /// Manufactured solution with convergence table
    Guermond,
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Case::Cavity => "lid-driven cavity",
            Case::HeatedCavity => "heated cavity",
            Case::Couette => "Couette flow",
            Case::Guermond => "Guermond manufactured solution",
        };
        write!(f, "{}", name)
    }
}

impl Case {
    pub fn default_parameters(self) -> ProblemParameters {
        let mut params = ProblemParameters {
            terminal_output_frequency: 10,
            ..Default::default()
        };
        match self {
            Case::Cavity => {
                params.dimensionless_numbers = Some(DimensionlessNumbers {
                    reynolds: Some(100.0),
                    ..Default::default()
                });
                params.time_stepping = TimeSteppingParameters {
                    end_time: 2.0,
                    initial_step_size: 1e-2,
                    adaptive_time_stepping: true,
                    courant_number: 0.5,
                    ..Default::default()
                };
            }
            Case::HeatedCavity => {
                params.problem_type = ProblemType::Boussinesq;
                params.dimensionless_numbers = Some(DimensionlessNumbers {
                    prandtl: Some(0.71),
                    rayleigh: Some(1e4),
                    ..Default::default()
                });
                params.time_stepping = TimeSteppingParameters {
                    end_time: 5.0,
                    initial_step_size: 1e-2,
                    adaptive_time_stepping: true,
                    courant_number: 0.5,
                    ..Default::default()
                };
            }
            Case::Couette => {
                params.dimensionless_numbers = Some(DimensionlessNumbers {
                    reynolds: Some(1.0),
                    ..Default::default()
                });
                params.time_stepping = TimeSteppingParameters {
                    end_time: 0.5,
                    initial_step_size: 0.05,
                    ..Default::default()
                };
            }
            Case::Guermond => {
                params.dimensionless_numbers = Some(DimensionlessNumbers {
                    reynolds: Some(100.0),
                    ..Default::default()
                });
                params.time_stepping = TimeSteppingParameters {
                    end_time: 1.0,
                    initial_step_size: 0.1,
                    ..Default::default()
                };
                params.navier_stokes.poisson_prestep = false;
                params.convergence_test = Some(ConvergenceTestParameters {
                    test_type: ConvergenceTestType::Temporal,
                    n_cycles: 4,
                    step_size_reduction_factor: 0.5,
                    n_global_refinements: 5,
                });
                params.terminal_output_frequency = 1000;
            }
        }
        params
    }

    pub fn run(self, mut params: ProblemParameters, cells: usize) -> Result<()> {
        params.validate().context("Invalid parameters")?;
        let constants = params
            .resolve_constants()
            .context("Failed to derive physical constants")?;
        info!("running {} with {:?}", self, constants);

        match self {
            Case::Cavity => run_cavity(&params, cells),
            Case::HeatedCavity => run_heated_cavity(&params, cells),
            Case::Couette => run_couette(&params, cells),
            Case::Guermond => run_guermond(&params),
        }
    }
}

fn simulation(params: &ProblemParameters, assembler: &Arc<Q1Assembler>) -> Result<Simulation> {
    let flow = NavierStokesProjection::new(params.navier_stokes.clone(), assembler.clone())?;
    let sim = Simulation::new(
        params,
        assembler.clone(),
        Arc::new(KrylovSolver::new()),
        Arc::new(SerialCommunicator),
    )?;
    Ok(sim.with_flow(flow))
}

/// `½ uᵀ M u`.
fn kinetic_energy(assembler: &Q1Assembler, velocity: &[f64]) -> Result<f64> {
    let mass = assembler.velocity_mass_matrix()?;
    let mut mu = vec![0.0; velocity.len()];
    mass.mul_vec(velocity, &mut mu);
    Ok(0.5 * dot(velocity, &mu))
}

fn print_summary(sim: &Simulation, session: &SimulationSession, n_steps: usize) {
    println!();
    println!("Steps: {}", n_steps);
    println!("Final time: {:.6}", sim.time().current_time());
    println!();
    println!("{}", session.summary());
}

fn lid(_p: &[f64], _t: f64, v: &mut [f64]) {
    v[0] = 1.0;
    v[1] = 0.0;
}

fn run_cavity(params: &ProblemParameters, cells: usize) -> Result<()> {
    println!("Lid-Driven Cavity");
    println!("=================");

    let assembler = Arc::new(
        unit_square(cells)?
            .with_no_slip(BoundaryId::Left)
            .with_no_slip(BoundaryId::Right)
            .with_no_slip(BoundaryId::Bottom)
            .with_velocity_bc(BoundaryId::Top, lid),
    );
    let mut sim = simulation(params, &assembler)?;
    let mut session = SimulationSession::new();
    let n_steps = sim.run(&mut session, &mut LoggingObserver)?;

    print_summary(&sim, &session, n_steps);
    if let Some(flow) = sim.flow() {
        println!(
            "Kinetic energy: {:.6e}",
            kinetic_energy(&assembler, flow.velocity().solution())?
        );
        println!("Discrete divergence: {:.3e}", flow.divergence_norm(&SerialCommunicator)?);
    }
    Ok(())
}

fn run_heated_cavity(params: &ProblemParameters, cells: usize) -> Result<()> {
    println!("Differentially Heated Cavity");
    println!("============================");

    let assembler = Arc::new(
        BoundaryId::ALL
            .iter()
            .fold(unit_square(cells)?, |asm, &id| asm.with_no_slip(id))
            .with_temperature_bc(BoundaryId::Left, |_: &[f64], _: f64| 0.5)
            .with_temperature_bc(BoundaryId::Right, |_: &[f64], _: f64| -0.5),
    );
    let mut heat = HeatEquation::new(
        params.heat_equation.clone(),
        params.navier_stokes.physical_constants,
        assembler.clone(),
        TransportVelocity::Coupled,
    )?;
    heat.set_initial_condition(&assembler.interpolate_scalar(&|p: &[f64], _t: f64| 0.5 - p[0], 0.0))?;

    let mut sim = simulation(params, &assembler)?.with_heat(heat);
    let mut session = SimulationSession::new();
    let n_steps = sim.run(&mut session, &mut LoggingObserver)?;

    print_summary(&sim, &session, n_steps);
    if let Some(flow) = sim.flow() {
        let velocity = flow.velocity().solution();
        let n = assembler.n_nodes();
        let max_vertical = velocity[n..].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        println!("Kinetic energy: {:.6e}", kinetic_energy(&assembler, velocity)?);
        println!("Max vertical velocity: {:.6e}", max_vertical);
    }
    Ok(())
}

fn couette(p: &[f64], _t: f64, v: &mut [f64]) {
    v[0] = p[1];
    v[1] = 0.0;
}

fn run_couette(params: &ProblemParameters, cells: usize) -> Result<()> {
    println!("Couette Flow");
    println!("============");

    let assembler = Arc::new(
        BoundaryId::ALL
            .iter()
            .fold(unit_square(cells)?, |asm, &id| asm.with_velocity_bc(id, couette)),
    );
    let mut sim = simulation(params, &assembler)?;
    if let Some(flow) = sim.flow_mut() {
        flow.set_initial_conditions(
            &assembler.interpolate_velocity(&couette, 0.0),
            &vec![0.0; assembler.n_nodes()],
        )?;
    }
    let mut session = SimulationSession::new();
    let n_steps = sim.run(&mut session, &mut LoggingObserver)?;

    print_summary(&sim, &session, n_steps);
    if let Some(flow) = sim.flow() {
        let error = vector_error(
            assembler.mesh(),
            flow.velocity().solution(),
            &couette,
            sim.time().current_time(),
        )?;
        println!("Velocity error: L2 {:.3e}, nodal max {:.3e}", error.l2, error.linf);
    }
    Ok(())
}

fn guermond_velocity(p: &[f64], t: f64, v: &mut [f64]) {
    let (a, b) = (p[0] + t, p[1] + t);
    v[0] = a.sin() * b.sin();
    v[1] = a.cos() * b.cos();
}

fn guermond_pressure(p: &[f64], t: f64) -> f64 {
    (p[0] - p[1] + t).sin()
}

/// Body force of the manufactured solution for viscosity `nu`.
fn guermond_force(nu: f64) -> impl Fn(&[f64], f64, &mut [f64]) + Send + Sync + 'static {
    move |p: &[f64], t: f64, v: &mut [f64]| {
        let (a, b) = (p[0] + t, p[1] + t);
        let dp = (p[0] - p[1] + t).cos();
        v[0] = (a + b).sin() + a.sin() * a.cos() + 2.0 * nu * a.sin() * b.sin() + dp;
        v[1] = -(a + b).sin() - b.sin() * b.cos() + 2.0 * nu * a.cos() * b.cos() - dp;
    }
}

fn guermond_assembler(cells: usize, nu: f64) -> Result<Arc<Q1Assembler>> {
    let assembler = BoundaryId::ALL
        .iter()
        .fold(unit_square(cells)?, |asm, &id| asm.with_velocity_bc(id, guermond_velocity))
        .with_body_force(guermond_force(nu));
    Ok(Arc::new(assembler))
}

fn run_guermond(params: &ProblemParameters) -> Result<()> {
    println!("Guermond Manufactured Solution");
    println!("==============================");

    let Some(test) = params.convergence_test.clone() else {
        bail!("the Guermond case needs a convergence_test block");
    };
    if params.problem_type != ProblemType::Hydrodynamic {
        bail!("the Guermond case is a hydrodynamic problem");
    }
    let nu = params.navier_stokes.physical_constants.c2;
    let base_cells = 1usize << test.n_global_refinements;

    let title = match test.test_type {
        ConvergenceTestType::Temporal => format!("temporal convergence on {0}x{0} cells", base_cells),
        ConvergenceTestType::Spatial => format!(
            "spatial convergence with step size {}",
            params.time_stepping.initial_step_size
        ),
    };
    let mut table = ConvergenceTable::new(title, &["u L2", "u Linf", "p L2", "p Linf"]);

    let mut assembler = guermond_assembler(base_cells, nu)?;
    let mut sim = simulation(params, &assembler)?;
    let mut step_size = params.time_stepping.initial_step_size;
    let start = params.time_stepping.start_time;

    for cycle in 0..test.n_cycles {
        if cycle > 0 {
            match test.test_type {
                ConvergenceTestType::Temporal => {
                    step_size *= test.step_size_reduction_factor;
                    sim.restart();
                    sim.set_initial_step_size(step_size)?;
                }
                ConvergenceTestType::Spatial => {
                    assembler = guermond_assembler(base_cells << cycle, nu)?;
                    sim.replace_discretization(assembler.clone(), Some(assembler.clone()), None);
                }
            }
        }
        if let Some(flow) = sim.flow_mut() {
            flow.set_initial_conditions(
                &assembler.interpolate_velocity(&guermond_velocity, start),
                &assembler.interpolate_scalar(&guermond_pressure, start),
            )?;
        }

        let mut session = SimulationSession::new();
        let n_steps = sim.run(&mut session, &mut LoggingObserver)?;
        let time = sim.time().current_time();
        let Some(flow) = sim.flow() else {
            bail!("flow solver missing");
        };
        let mesh = assembler.mesh();
        let u = vector_error(mesh, flow.velocity().solution(), &guermond_velocity, time)?;
        let p = scalar_error(mesh, flow.pressure().solution(), &guermond_pressure, time, true)?;

        let h = match test.test_type {
            ConvergenceTestType::Temporal => step_size,
            ConvergenceTestType::Spatial => mesh.hx(),
        };
        let n_dofs = assembler.n_velocity_dofs() + assembler.n_pressure_dofs();
        info!(
            "cycle {}: {} steps, h = {:.4e}, |e_u| = {:.3e}, |e_p| = {:.3e}",
            cycle, n_steps, h, u.l2, p.l2
        );
        table.add_row(h, n_dofs, &[u.l2, u.linf, p.l2, p.linf]);
    }

    println!();
    print!("{}", table);
    if let Some(rate) = table.last_rate(0) {
        println!();
        println!("Observed velocity order: {:.2}", rate);
    }
    Ok(())
}
