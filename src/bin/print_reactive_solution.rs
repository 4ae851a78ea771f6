extern crate optima_react;

use std::env;
use std::path::Path;
use std::sync::Arc;
use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use optima_react::kinematic_chain::{ChainModel, DHChain};
use optima_react::reactive_controller::ReactiveController;
use optima_react::reactive_controller::config::ReactiveControllerConfig;
use optima_react::reactive_nlp::ControlPoint;
use optima_react::utils::utils_console::{react_print, ConsoleLogSink, PrintColor, PrintMode};
use optima_react::utils::utils_errors::ReactError;
use optima_react::utils::utils_traits::{SaveAndLoadable, ToAndFromRonString};

/// One control cycle described in a file.  Velocity limits are `[min, max]` per joint in rad/s.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ReactiveScenario {
    chain: DHChain,
    target_pose: Vec<f64>,
    starting_velocity: Vec<f64>,
    velocity_limits: Vec<(f64, f64)>,
    dt: f64,
    #[serde(default)]
    control_points: Vec<ControlPoint>,
    #[serde(default)]
    config: ReactiveControllerConfig
}
impl ReactiveScenario {
    /// Seven dof arm nudged 5 cm along x.
    fn new_default() -> Result<Self, ReactError> {
        let mut chain = DHChain::new_seven_dof_arm();
        chain.set_joint_angles(&DVector::from_vec(vec![0.3, 0.5, -0.2, -1.2, 0.4, 0.8, 0.1]))?;
        let h = chain.end_effector_transform();
        Ok(Self {
            chain,
            target_pose: vec![h[(0, 3)] + 0.05, h[(1, 3)], h[(2, 3)], 0.0, 0.0, 0.0],
            starting_velocity: vec![0.0; 7],
            velocity_limits: vec![(-2.0, 2.0); 7],
            dt: 0.05,
            control_points: vec![],
            config: ReactiveControllerConfig::default()
        })
    }
    fn load(path: &Path) -> Result<Self, ReactError> {
        return match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => {
                let s = std::fs::read_to_string(path).map_err(|e| ReactError::new_config_load_error("ron", &format!("Could not read {:?}: {}", path, e), file!(), line!()))?;
                Self::load_from_ron_string(&s)
            }
            _ => { Self::load_from_path(path) }
        }
    }
}

fn main() -> Result<(), ReactError> {
    let args: Vec<String> = env::args().collect();
    let scenario = match args.get(1) {
        Some(path) => { ReactiveScenario::load(Path::new(path))? }
        None => {
            react_print("no scenario file given, using the built in seven dof scenario", PrintMode::Println, PrintColor::Yellow, false);
            ReactiveScenario::new_default()?
        }
    };

    scenario.chain.print_summary();

    let d = scenario.chain.num_dofs();
    if scenario.velocity_limits.len() != d {
        return Err(ReactError::new_dimension_mismatch_error("velocity limits", d, scenario.velocity_limits.len(), file!(), line!()));
    }
    let velocity_limits = DMatrix::from_fn(d, 2, |r, c| if c == 0 { scenario.velocity_limits[r].0 } else { scenario.velocity_limits[r].1 });
    let target_pose = DVector::from_vec(scenario.target_pose.clone());
    let starting_velocity = DVector::from_vec(scenario.starting_velocity.clone());

    let log_sink = Arc::new(ConsoleLogSink::new("react", scenario.config.log_level));
    let mut controller = ReactiveController::new(scenario.config.clone(), log_sink);
    controller.set_verbosity(1);
    let solution = controller.solve(&scenario.chain, &target_pose, &starting_velocity, &velocity_limits, scenario.dt, scenario.control_points.clone())?;

    react_print("joint velocities [deg/s] ---> ", PrintMode::Print, PrintColor::Blue, true);
    react_print(&format!("{:.4?}", solution.joint_velocities_in_deg_per_second().as_slice()), PrintMode::Println, PrintColor::None, false);
    react_print("problem ---> ", PrintMode::Print, PrintColor::Blue, true);
    react_print(&solution.parameters().get_serialization_string()?, PrintMode::Println, PrintColor::None, false);
    react_print(&format!("total time: {:?}", solution.solve_time()), PrintMode::Println, PrintColor::None, false);

    Ok(())
}
