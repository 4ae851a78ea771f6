use thiserror::Error;

/// A common error type returned by functions throughout the controller.
///
/// Only `DimensionMismatch` is expected to reach a well-behaved caller: every other numeric
/// anomaly inside a solve cycle is resolved in place (clamped, skipped, or warned about).
#[derive(Clone, Debug, Error)]
pub enum ReactError {
    #[error("{0}")]
    DimensionMismatch(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    IdxOutOfBoundError(String),
    #[error("{0}")]
    ConfigLoadError(String),
    #[error("{0}")]
    SolverError(String),
    #[error("{0}")]
    GenericError(String)
}
impl ReactError {
    pub fn new_generic_error_str(s: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: {} -- File: {}, Line: {}", s, file, line);
        return Self::GenericError(s);
    }
    pub fn new_dimension_mismatch_error(what: &str, expected: usize, given: usize, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Dimension mismatch for {}: expected {:?}, got {:?} -- File: {}, Line: {}", what, expected, given, file, line);
        return Self::DimensionMismatch(s);
    }
    pub fn new_dimension_mismatch_error_str(s: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Dimension mismatch: {} -- File: {}, Line: {}", s, file, line);
        return Self::DimensionMismatch(s);
    }
    pub fn new_invalid_state_error(function_name: &str, state: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: {} cannot be called while the problem is {} -- File: {}, Line: {}", function_name, state, file, line);
        return Self::InvalidState(s);
    }
    pub fn new_idx_out_of_bound_error(given_idx: usize, length_of_array: usize, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Index {:?} is too large for the array of length {:?} -- File: {}, Line: {}", given_idx, length_of_array, file, line);
        return Self::IdxOutOfBoundError(s);
    }
    pub fn new_check_for_idx_out_of_bound_error(given_idx: usize, length_of_array: usize, file: &str, line: u32) -> Result<(), Self> {
        return if given_idx < length_of_array {
            Ok(())
        } else {
            Err(Self::new_idx_out_of_bound_error(given_idx, length_of_array, file, line))
        }
    }
    pub fn new_config_load_error(format_name: &str, message: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Could not load {} configuration.  {} -- File: {}, Line: {}", format_name, message, file, line);
        return Self::ConfigLoadError(s);
    }
    pub fn new_solver_error(message: &str, file: &str, line: u32) -> Self {
        let s = format!("ERROR: Solver failure.  {} -- File: {}, Line: {}", message, file, line);
        return Self::SolverError(s);
    }
    pub fn is_dimension_mismatch(&self) -> bool {
        return match self {
            ReactError::DimensionMismatch(_) => { true }
            _ => { false }
        }
    }
}
