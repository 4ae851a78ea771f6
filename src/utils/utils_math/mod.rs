use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};

pub fn deg_to_rad(deg: f64) -> f64 {
    return deg * std::f64::consts::PI / 180.0;
}

pub fn rad_to_deg(rad: f64) -> f64 {
    return rad * 180.0 / std::f64::consts::PI;
}

pub fn dvector_rad_to_deg(v: &DVector<f64>) -> DVector<f64> {
    return v.map(rad_to_deg);
}

/// Rotation obtained by applying the world frame axis-angle vector `axis_angle` on top of
/// `current`, i.e. `Exp(axis_angle) * current`.
pub fn rotation_from_axis_angle_applied_to(axis_angle: &Vector3<f64>, current: &Matrix3<f64>) -> Matrix3<f64> {
    let delta = Rotation3::new(*axis_angle);
    return delta.matrix() * current;
}

/// World frame orientation error taking `current` to `desired`, returned as a scaled axis
/// (`log(desired * current^T)`).  Zero when both rotations agree.
pub fn rotation_error(desired: &Matrix3<f64>, current: &Matrix3<f64>) -> Vector3<f64> {
    let r = desired * current.transpose();
    return Rotation3::from_matrix_unchecked(r).scaled_axis();
}

/// Slope and intercept of the line through `(x0, y0)` and `(x1, y1)`, in the form `y = m*x + n`.
pub fn two_point_line_fit(x0: f64, y0: f64, x1: f64, y1: f64) -> (f64, f64) {
    let m = (y1 - y0) / (x1 - x0);
    let n = y0 - m * x0;
    return (m, n);
}

/// Central finite difference gradient of a scalar function.
pub fn finite_difference_gradient<F: Fn(&DVector<f64>) -> f64>(f: F, x: &DVector<f64>, h: f64) -> DVector<f64> {
    let mut out = DVector::zeros(x.len());
    let mut xh = x.clone();
    for i in 0..x.len() {
        xh[i] = x[i] + h;
        let f_plus = f(&xh);
        xh[i] = x[i] - h;
        let f_minus = f(&xh);
        xh[i] = x[i];
        out[i] = (f_plus - f_minus) / (2.0 * h);
    }
    return out;
}

/// Central finite difference Jacobian (`m x n`) of a vector valued function.
pub fn finite_difference_jacobian<F: Fn(&DVector<f64>) -> DVector<f64>>(f: F, x: &DVector<f64>, h: f64) -> DMatrix<f64> {
    let f0 = f(x);
    let mut out = DMatrix::zeros(f0.len(), x.len());
    let mut xh = x.clone();
    for j in 0..x.len() {
        xh[j] = x[j] + h;
        let f_plus = f(&xh);
        xh[j] = x[j] - h;
        let f_minus = f(&xh);
        xh[j] = x[j];
        let col = (f_plus - f_minus) / (2.0 * h);
        out.set_column(j, &col);
    }
    return out;
}
