//! Optima React computes, once per control cycle, the joint velocities that move a robot arm's
//! end effector toward a target pose.  Each cycle is posed as a small nonlinear program over joint
//! velocities and slack variables: a linearized reaching constraint, velocity bounds that shrink
//! near joint limits, optional auxiliary control points, and optional self-collision avoidance
//! rows.  The program is solved with an augmented Lagrangian method from the `optimization_engine`
//! crate.

pub mod guarded_bounds;
pub mod kinematic_chain;
pub mod nonlinear_optimization;
pub mod reaching_constraints;
pub mod reaching_objective;
pub mod reactive_controller;
pub mod reactive_nlp;
pub mod self_avoidance;
pub mod utils;
