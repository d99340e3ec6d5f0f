//! Temperature transport on its own and coupled to the flow.

use std::sync::Arc;

use imexflow_core::{HeatAssembler, SerialCommunicator};
use imexflow_fem::{BoundaryId, Q1Assembler, unit_square};
use imexflow_projection::{
    ConvectiveTermTimeDiscretization, Error, HeatEquation, NavierStokesProjection, NullObserver,
    PhysicalConstants, ProblemParameters, ProblemType, Simulation, SimulationSession, SolveStage,
    TimeSteppingParameters, TransportVelocity,
};
use imexflow_solver::{KrylovSolver, LinearSolverParameters};

fn rotation(p: &[f64], _t: f64, v: &mut [f64]) {
    v[0] = -(p[1] - 0.5);
    v[1] = p[0] - 0.5;
}

fn parameters(problem_type: ProblemType, constants: PhysicalConstants) -> ProblemParameters {
    let mut params = ProblemParameters {
        problem_type,
        physical_constants: Some(constants),
        time_stepping: TimeSteppingParameters {
            end_time: 0.04,
            initial_step_size: 0.01,
            ..Default::default()
        },
        ..Default::default()
    };
    params.heat_equation.solver = LinearSolverParameters::tight();
    let ns = &mut params.navier_stokes;
    ns.diffusion_step_solver = LinearSolverParameters::tight();
    ns.projection_step_solver = LinearSolverParameters::tight();
    ns.poisson_prestep_solver = LinearSolverParameters::tight();
    params.resolve_constants().unwrap();
    params
}

fn heat_only(params: &ProblemParameters, assembler: Q1Assembler, transport: TransportVelocity) -> Simulation {
    let assembler = Arc::new(assembler);
    let heat = HeatEquation::new(
        params.heat_equation.clone(),
        params.navier_stokes.physical_constants,
        assembler.clone(),
        transport,
    )
    .unwrap();
    Simulation::new(
        params,
        assembler,
        Arc::new(KrylovSolver::new()),
        Arc::new(SerialCommunicator),
    )
    .unwrap()
    .with_heat(heat)
}

fn unit_temperature(_p: &[f64], _t: f64) -> f64 {
    1.0
}

/// A constant temperature is invariant under solenoidal transport.
#[test]
fn test_constant_temperature_under_rotation() {
    let constants = PhysicalConstants {
        c4: 0.05,
        ..Default::default()
    };
    let params = parameters(ProblemType::HeatConvectionDiffusion, constants);
    let assembler = BoundaryId::ALL
        .iter()
        .fold(unit_square(6).unwrap(), |asm, &id| asm.with_temperature_bc(id, unit_temperature));
    let n = assembler.n_temperature_dofs();
    let mut sim = heat_only(&params, assembler, TransportVelocity::Analytic(Arc::new(rotation)));
    sim.heat_mut().unwrap().set_initial_condition(&vec![1.0; n]).unwrap();
    let mut session = SimulationSession::new();

    let n_steps = sim.run(&mut session, &mut NullObserver).unwrap();

    assert_eq!(n_steps, 4);
    assert_eq!(session.n_solves(SolveStage::HeatEquation), 4);
    assert_eq!(session.n_solves(SolveStage::Diffusion), 0);
    for &theta in sim.heat().unwrap().temperature().solution() {
        assert!((theta - 1.0).abs() < 1e-10, "θ = {} (expected 1)", theta);
    }
}

/// Pure diffusion of a bump decays without overshooting the boundary data.
#[test]
fn test_diffusion_decays_interior_bump() {
    let constants = PhysicalConstants {
        c4: 0.1,
        ..Default::default()
    };
    let params = parameters(ProblemType::HeatConvectionDiffusion, constants);
    let assembler = BoundaryId::ALL
        .iter()
        .fold(unit_square(8).unwrap(), |asm, &id| asm.with_temperature_bc(id, |_: &[f64], _: f64| 0.0));
    let bump = assembler.interpolate_scalar(
        &|p: &[f64], _t: f64| (std::f64::consts::PI * p[0]).sin() * (std::f64::consts::PI * p[1]).sin(),
        0.0,
    );
    let peak = bump.iter().cloned().fold(0.0, f64::max);
    let mut sim = heat_only(&params, assembler, TransportVelocity::None);
    sim.heat_mut().unwrap().set_initial_condition(&bump).unwrap();
    let mut session = SimulationSession::new();

    sim.run(&mut session, &mut NullObserver).unwrap();

    let theta = sim.heat().unwrap().temperature().solution();
    let new_peak = theta.iter().cloned().fold(0.0, f64::max);
    // exact decay factor exp(-2π² c4 t)
    let expected = peak * (-2.0 * std::f64::consts::PI.powi(2) * 0.1 * 0.04).exp();
    assert!(new_peak < peak);
    assert!((new_peak - expected).abs() < 0.05 * peak, "peak {} (expected about {})", new_peak, expected);
}

/// `θ = x` with matching side fluxes: diffusion is in balance and the
/// profile only moves with the transport.
fn sloped_box(n: usize) -> Q1Assembler {
    unit_square(n)
        .unwrap()
        .with_temperature_flux(BoundaryId::Left, |_: &[f64], _: f64| -1.0)
        .with_temperature_flux(BoundaryId::Right, |_: &[f64], _: f64| 1.0)
}

fn slope(p: &[f64], _t: f64) -> f64 {
    p[0]
}

fn shifted_slope_error(sim: &Simulation, assembler: &Q1Assembler, shift: f64) -> f64 {
    let theta = sim.heat().unwrap().temperature().solution();
    (0..assembler.n_nodes())
        .map(|node| (theta[node] - (assembler.mesh().node_coords(node)[0] + shift)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn test_side_fluxes_hold_a_linear_profile() {
    let constants = PhysicalConstants {
        c4: 0.1,
        ..Default::default()
    };
    let params = parameters(ProblemType::HeatConvectionDiffusion, constants);
    let assembler = sloped_box(6);
    let initial = assembler.interpolate_scalar(&slope, 0.0);
    let n_nodes = assembler.n_nodes();
    let mut sim = heat_only(&params, assembler, TransportVelocity::None);
    sim.heat_mut().unwrap().set_initial_condition(&initial).unwrap();

    sim.run(&mut SimulationSession::new(), &mut NullObserver).unwrap();

    let theta = sim.heat().unwrap().temperature().solution();
    assert_eq!(theta.len(), n_nodes);
    for (value, expected) in theta.iter().zip(&initial) {
        assert!((value - expected).abs() < 1e-10, "θ = {} (expected {})", value, expected);
    }
}

/// Heat entering through one side raises the total by `C4 q |Γ| t`.
#[test]
fn test_boundary_flux_feeds_the_heat_budget() {
    let constants = PhysicalConstants {
        c4: 0.1,
        ..Default::default()
    };
    let params = parameters(ProblemType::HeatConvectionDiffusion, constants);
    let assembler = Arc::new(
        unit_square(6)
            .unwrap()
            .with_temperature_flux(BoundaryId::Right, |_: &[f64], _: f64| 1.0),
    );
    let mass = assembler.temperature_mass_matrix().unwrap();
    let heat = HeatEquation::new(
        params.heat_equation.clone(),
        params.navier_stokes.physical_constants,
        assembler.clone(),
        TransportVelocity::None,
    )
    .unwrap();
    let mut sim = Simulation::new(
        &params,
        assembler.clone(),
        Arc::new(KrylovSolver::new()),
        Arc::new(SerialCommunicator),
    )
    .unwrap()
    .with_heat(heat);

    sim.run(&mut SimulationSession::new(), &mut NullObserver).unwrap();

    let theta = sim.heat().unwrap().temperature().solution();
    let mut m_theta = vec![0.0; theta.len()];
    mass.mul_vec(theta, &mut m_theta);
    let total: f64 = m_theta.iter().sum();
    let expected = 0.1 * sim.time().current_time();
    assert!((total - expected).abs() < 1e-10, "∫θ = {:.6e} (expected {:.6e})", total, expected);
}

/// Uniform transport shifts `θ = x` to `x - t` for either treatment of
/// the convective term.
#[test]
fn test_uniform_transport_shifts_a_slope() {
    let constants = PhysicalConstants {
        c4: 0.1,
        ..Default::default()
    };
    for discretization in [
        ConvectiveTermTimeDiscretization::SemiImplicit,
        ConvectiveTermTimeDiscretization::FullyExplicit,
    ] {
        let mut params = parameters(ProblemType::HeatConvectionDiffusion, constants);
        params.heat_equation.convective_term_time_discretization = discretization;
        let assembler = sloped_box(6);
        let initial = assembler.interpolate_scalar(&slope, 0.0);
        let reference = sloped_box(6);
        let transport = TransportVelocity::Analytic(Arc::new(|_p: &[f64], _t: f64, v: &mut [f64]| {
            v[0] = 1.0;
            v[1] = 0.0;
        }));
        let mut sim = heat_only(&params, assembler, transport);
        sim.heat_mut().unwrap().set_initial_condition(&initial).unwrap();
        let mut session = SimulationSession::new();

        let n_steps = sim.run(&mut session, &mut NullObserver).unwrap();

        assert_eq!(n_steps, 4);
        let error = shifted_slope_error(&sim, &reference, -sim.time().current_time());
        assert!(error < 1e-10, "{:?}: error {:.3e}", discretization, error);
    }
}

/// A time-dependent analytic velocity enters the implicit operator at
/// `t^{n+1}`: with `w = (2t, 0)` the first two steps give shifts of
/// `-2 dt²` and then `-16/3 dt²`.
#[test]
fn test_analytic_transport_is_evaluated_at_the_new_time() {
    let constants = PhysicalConstants {
        c4: 0.1,
        ..Default::default()
    };
    let mut params = parameters(ProblemType::HeatConvectionDiffusion, constants);
    params.time_stepping.initial_step_size = 0.125;
    params.time_stepping.end_time = 0.25;
    let assembler = sloped_box(4);
    let initial = assembler.interpolate_scalar(&slope, 0.0);
    let reference = sloped_box(4);
    let transport = TransportVelocity::Analytic(Arc::new(|_p: &[f64], t: f64, v: &mut [f64]| {
        v[0] = 2.0 * t;
        v[1] = 0.0;
    }));
    let mut sim = heat_only(&params, assembler, transport);
    sim.heat_mut().unwrap().set_initial_condition(&initial).unwrap();
    let mut session = SimulationSession::new();
    let dt: f64 = 0.125;

    sim.step(&mut session).unwrap();
    let error = shifted_slope_error(&sim, &reference, -2.0 * dt * dt);
    assert!(error < 1e-10, "first step error {:.3e}", error);

    sim.step(&mut session).unwrap();
    let error = shifted_slope_error(&sim, &reference, -16.0 / 3.0 * dt * dt);
    assert!(error < 1e-10, "second step error {:.3e}", error);
}

#[test]
fn test_coupled_transport_needs_flow() {
    let params = parameters(ProblemType::HeatConvectionDiffusion, PhysicalConstants::default());
    let mut sim = heat_only(&params, unit_square(2).unwrap(), TransportVelocity::Coupled);
    let mut session = SimulationSession::new();

    let err = sim.initialize(&mut session).unwrap_err();

    assert!(matches!(err, Error::ConfigurationConflict(_)));
}

#[test]
fn test_boussinesq_without_heat_equation_conflicts() {
    let params = parameters(ProblemType::Boussinesq, PhysicalConstants::default());
    let assembler = Arc::new(unit_square(2).unwrap());
    let flow = NavierStokesProjection::new(params.navier_stokes.clone(), assembler.clone()).unwrap();
    let mut sim = Simulation::new(
        &params,
        assembler,
        Arc::new(KrylovSolver::new()),
        Arc::new(SerialCommunicator),
    )
    .unwrap()
    .with_flow(flow);

    let err = sim.step(&mut SimulationSession::new()).unwrap_err();

    assert!(matches!(err, Error::ConfigurationConflict(_)));
}

/// Differentially heated cavity: buoyancy sets the fluid in motion.
#[test]
fn test_heated_cavity_starts_convecting() {
    let constants = PhysicalConstants {
        c2: 0.1,
        c3: 1.0,
        c4: 0.1,
        ..Default::default()
    };
    let params = parameters(ProblemType::Boussinesq, constants);
    let assembler = BoundaryId::ALL
        .iter()
        .fold(unit_square(8).unwrap(), |asm, &id| asm.with_no_slip(id))
        .with_temperature_bc(BoundaryId::Left, |_: &[f64], _: f64| 0.5)
        .with_temperature_bc(BoundaryId::Right, |_: &[f64], _: f64| -0.5);
    let assembler = Arc::new(assembler);
    let initial = assembler.interpolate_scalar(&|p: &[f64], _t: f64| 0.5 - p[0], 0.0);

    let flow = NavierStokesProjection::new(params.navier_stokes.clone(), assembler.clone()).unwrap();
    let mut heat = HeatEquation::new(
        params.heat_equation.clone(),
        params.navier_stokes.physical_constants,
        assembler.clone(),
        TransportVelocity::Coupled,
    )
    .unwrap();
    heat.set_initial_condition(&initial).unwrap();
    let mut sim = Simulation::new(
        &params,
        assembler.clone(),
        Arc::new(KrylovSolver::new()),
        Arc::new(SerialCommunicator),
    )
    .unwrap()
    .with_flow(flow)
    .with_heat(heat);
    let mut session = SimulationSession::new();

    let n_steps = sim.run(&mut session, &mut NullObserver).unwrap();

    assert_eq!(n_steps, 4);
    for stage in [SolveStage::HeatEquation, SolveStage::Diffusion, SolveStage::Projection] {
        assert_eq!(session.n_solves(stage), 4, "{}", stage);
    }
    assert_eq!(session.n_solves(SolveStage::PoissonPrestep), 1);

    let velocity = sim.flow().unwrap().velocity().solution();
    let speed = velocity.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    assert!(speed.is_finite() && speed > 1e-6, "max |u| = {:.3e}", speed);

    let mesh = assembler.mesh();
    let theta = sim.heat().unwrap().temperature().solution();
    for node in mesh.boundary_nodes(BoundaryId::Left) {
        assert_eq!(theta[node], 0.5);
    }
    for node in mesh.boundary_nodes(BoundaryId::Right) {
        assert_eq!(theta[node], -0.5);
    }
}
