use std::sync::Arc;
use std::time::Duration;
use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use optima_react::guarded_bounds::GuardedBoundsComputer;
use optima_react::kinematic_chain::{ChainModel, DHChain};
use optima_react::nonlinear_optimization::SolverStatus;
use optima_react::reactive_controller::ReactiveController;
use optima_react::reactive_controller::config::ReactiveControllerConfig;
use optima_react::reactive_nlp::ControlPoint;
use optima_react::utils::utils_console::{LogLevel, MemoryLogSink, NullLogSink, ReactLogEvent};

const DT: f64 = 0.05;

fn arm_at_interior_configuration() -> DHChain {
    let mut chain = DHChain::new_seven_dof_arm();
    chain.set_joint_angles(&DVector::from_vec(vec![0.3, 0.5, -0.2, -1.2, 0.4, 0.8, 0.1])).unwrap();
    chain
}

fn current_pose(chain: &dyn ChainModel) -> DVector<f64> {
    let h = chain.end_effector_transform();
    DVector::from_vec(vec![h[(0, 3)], h[(1, 3)], h[(2, 3)], 0.0, 0.0, 0.0])
}

fn symmetric_limits(d: usize, v: f64) -> DMatrix<f64> {
    DMatrix::from_fn(d, 2, |_, c| if c == 0 { -v } else { v })
}

fn config_with_generous_budget() -> ReactiveControllerConfig {
    let mut config = ReactiveControllerConfig::default();
    config.optimizer.max_time = Some(Duration::from_secs(5));
    config.optimizer.max_iterations = 2000;
    config
}

#[test]
fn zero_displacement_without_slack_penalties_gives_zero_velocity() {
    let chain = arm_at_interior_configuration();
    let mut config = config_with_generous_budget();
    config.weights.position_slack = 0.0;
    config.weights.orientation_slack = 0.0;
    let controller = ReactiveController::new(config, Arc::new(NullLogSink));

    let solution = controller.solve(&chain, &current_pose(&chain), &DVector::zeros(7), &symmetric_limits(7, 10.0), DT, vec![]).unwrap();
    assert_eq!(solution.joint_velocities().len(), 7);
    for v in solution.joint_velocities().iter() {
        assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-3);
    }
    assert_ne!(solution.status(), SolverStatus::NumericalError);
}

fn assert_within_guarded_bounds(chain: &dyn ChainModel, controller: &ReactiveController, velocities: &DVector<f64>, limits: &DMatrix<f64>) {
    let bounds = GuardedBoundsComputer::new(&chain.joint_limits(), &controller.config().guard).compute(&chain.current_joint_angles(), limits, &NullLogSink).unwrap();
    for i in 0..velocities.len() {
        let v = velocities[i];
        assert!(v.is_finite());
        assert!(v >= bounds.lower[i] - 1e-9 && v <= bounds.upper[i] + 1e-9);
    }
}

#[test]
fn small_translation_is_tracked_with_the_default_config() {
    let chain = arm_at_interior_configuration();
    let controller = ReactiveController::new(ReactiveControllerConfig::default(), Arc::new(NullLogSink));
    assert_eq!(controller.config().optimizer.max_time, None);

    let mut target = current_pose(&chain);
    target[0] += 0.05;
    let limits = symmetric_limits(7, 10.0);
    let solution = controller.solve(&chain, &target, &DVector::zeros(7), &limits, DT, vec![]).unwrap();
    assert!(solution.status().is_success());

    let jacobian = chain.geometric_jacobian(None).unwrap();
    let twist = &jacobian * solution.joint_velocities();
    assert_abs_diff_eq!(twist[0], 1.0, epsilon = 1e-2);
    assert_abs_diff_eq!(twist[1], 0.0, epsilon = 1e-2);
    assert_abs_diff_eq!(twist[2], 0.0, epsilon = 1e-2);
    for i in 3..6 {
        assert!(twist[i].abs() <= 0.4 + 1e-2);
    }
    assert_within_guarded_bounds(&chain, &controller, solution.joint_velocities(), &limits);
}

#[test]
fn iteration_limit_still_returns_the_best_iterate() {
    let chain = arm_at_interior_configuration();
    let mut config = config_with_generous_budget();
    config.optimizer.max_iterations = 1;
    config.optimizer.max_outer_iterations = 1;
    let controller = ReactiveController::new(config, Arc::new(NullLogSink));

    let mut target = current_pose(&chain);
    target[0] += 0.05;
    let limits = symmetric_limits(7, 1.0);
    let solution = controller.solve(&chain, &target, &DVector::from_element(7, 3.0), &limits, DT, vec![]).unwrap();
    assert!(matches!(solution.status(), SolverStatus::IterationLimit | SolverStatus::TimeLimit));
    assert_within_guarded_bounds(&chain, &controller, solution.joint_velocities(), &limits);
}

#[test]
fn exhausted_time_budget_still_returns_a_bounded_command() {
    let chain = arm_at_interior_configuration();
    let mut controller = ReactiveController::new(ReactiveControllerConfig::default(), Arc::new(NullLogSink));
    controller.set_max_time(Some(Duration::from_nanos(1)));

    let mut target = current_pose(&chain);
    target[0] += 0.05;
    let limits = symmetric_limits(7, 1.0);
    let solution = controller.solve(&chain, &target, &DVector::from_element(7, -3.0), &limits, DT, vec![]).unwrap();
    assert!(matches!(solution.status(), SolverStatus::TimeLimit | SolverStatus::IterationLimit));
    assert_within_guarded_bounds(&chain, &controller, solution.joint_velocities(), &limits);
}

#[test]
fn joint_at_its_upper_limit_cannot_move_further() {
    let mut chain = DHChain::new_seven_dof_arm();
    let upper = chain.joint_limits()[(1, 1)];
    chain.set_joint_angles(&DVector::from_vec(vec![0.3, upper, -0.2, -1.2, 0.4, 0.8, 0.1])).unwrap();
    let controller = ReactiveController::new(config_with_generous_budget(), Arc::new(NullLogSink));

    // ask for motion that the second joint would help with; its upper bound is zero
    let mut target = current_pose(&chain);
    target[2] -= 0.05;
    let solution = controller.solve(&chain, &target, &DVector::from_element(7, 0.5), &symmetric_limits(7, 10.0), DT, vec![]).unwrap();
    assert!(solution.joint_velocities()[1] <= 1e-9);
}

#[test]
fn empty_control_point_list_drops_the_extra_row_with_a_warning() {
    let mut chain = DHChain::new_humanoid_torso_and_arm();
    chain.set_joint_angles(&DVector::from_vec(vec![0.1, 0.0, 0.1, -0.5, 0.6, 0.3, 1.0, 0.0, -0.2, 0.0])).unwrap();
    let mut config = config_with_generous_budget();
    config.additional_control_points = true;
    let sink = MemoryLogSink::new_arc(LogLevel::Warn);
    let controller = ReactiveController::new(config, sink.clone());

    let solution = controller.solve(&chain, &current_pose(&chain), &DVector::zeros(10), &symmetric_limits(10, 5.0), DT, vec![]).unwrap();
    assert_eq!(solution.parameters().num_constraints, Some(6));
    assert!(!solution.parameters().additional_control_points);
    assert!(sink.contains(|e| *e == ReactLogEvent::ControlPointsListEmpty));
}

#[test]
fn humanoid_with_elbow_and_self_avoidance_returns_bounded_velocities() {
    let mut chain = DHChain::new_humanoid_torso_and_arm();
    chain.set_joint_angles(&DVector::from_vec(vec![0.1, 0.0, 0.1, -0.5, 0.6, 0.3, 1.0, 0.0, -0.2, 0.0])).unwrap();
    let mut config = config_with_generous_budget();
    config.additional_control_points = true;
    config.self_avoidance = true;
    config.control_point_tolerance = 1e-2;
    let controller = ReactiveController::new(config, Arc::new(NullLogSink));

    let elbow = chain.link_transform(5).unwrap();
    let elbow_point = ControlPoint::new_elbow(nalgebra::Vector3::new(elbow[(0, 3)], elbow[(1, 3)], elbow[(2, 3)]));
    let mut target = current_pose(&chain);
    target[1] += 0.02;

    let limits = symmetric_limits(10, 2.0);
    let solution = controller.solve(&chain, &target, &DVector::zeros(10), &limits, DT, vec![elbow_point]).unwrap();
    assert_eq!(solution.parameters().num_constraints, Some(6 + 1 + 4));
    assert_eq!(solution.parameters().num_jacobian_nonzeros, Some(6 * 11 + 6 + 9));
    for v in solution.joint_velocities().iter() {
        assert!(v.is_finite() && v.abs() <= 2.0 + 1e-9);
    }
    let in_degrees = solution.joint_velocities_in_deg_per_second();
    assert_abs_diff_eq!(in_degrees[3], solution.joint_velocities()[3].to_degrees(), epsilon = 1e-9);
}

#[test]
fn mismatched_inputs_fail_without_solving() {
    let chain = arm_at_interior_configuration();
    let controller = ReactiveController::new(ReactiveControllerConfig::default(), Arc::new(NullLogSink));
    let e = controller.solve(&chain, &current_pose(&chain), &DVector::zeros(6), &symmetric_limits(7, 1.0), DT, vec![]).unwrap_err();
    assert!(e.is_dimension_mismatch());
}

#[test]
fn non_positive_dt_still_produces_a_command() {
    let chain = arm_at_interior_configuration();
    let sink = MemoryLogSink::new_arc(LogLevel::Warn);
    let controller = ReactiveController::new(config_with_generous_budget(), sink.clone());
    let solution = controller.solve(&chain, &current_pose(&chain), &DVector::zeros(7), &symmetric_limits(7, 1.0), 0.0, vec![]).unwrap();
    assert_eq!(solution.parameters().dt, 0.05);
    assert!(sink.contains(|e| matches!(e, ReactLogEvent::NonPositiveDt { .. })));
}
