use field::Shape;
use std::f64::consts::PI;

/// Analytic stand-in for a wave solver.
///
/// The forward field is a damped plane wave
/// `u(x, t) = exp(-gamma * t) * sin(k . x - omega * t)` over the unit box,
/// the adjoint field a counter-propagating `v(x, t) = cos(k . x + omega * t)`.
/// Both are cheap enough that the checkpoint store dominates the run time,
/// and `u` can be recomputed exactly to measure reconstruction error.
pub struct DampedWave {
    /// `k . x` for every grid point, row-major.
    phase: Vec<f64>,
    omega: f64,
    gamma: f64,
    dt: f64,
}

impl DampedWave {
    pub fn new(shape: &Shape, nt: u64) -> Self {
        let dims = shape.dims();
        let n = shape.elements() as usize;
        let mut phase = Vec::with_capacity(n);
        let mut coord = vec![0u64; dims.len()];
        for _ in 0..n {
            let p: f64 = coord
                .iter()
                .zip(dims)
                .enumerate()
                .map(|(axis, (&c, &len))| 2.0 * PI * (axis + 1) as f64 * c as f64 / len as f64)
                .sum();
            phase.push(p);

            // Row-major increment: last axis fastest.
            for axis in (0..dims.len()).rev() {
                coord[axis] += 1;
                if coord[axis] < dims[axis] {
                    break;
                }
                coord[axis] = 0;
            }
        }

        // Three periods and a tenfold decay over the run.
        let dt = 1.0 / nt.max(1) as f64;
        Self {
            phase,
            omega: 6.0 * PI,
            gamma: 10f64.ln(),
            dt,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Forward field at timestep `t`.
    pub fn forward(&self, t: u64) -> Vec<f64> {
        let time = t as f64 * self.dt;
        let amp = (-self.gamma * time).exp();
        let shift = self.omega * time;
        self.phase.iter().map(|p| amp * (p - shift).sin()).collect()
    }

    /// Adjoint field at timestep `t`.
    pub fn adjoint(&self, t: u64) -> Vec<f64> {
        let shift = self.omega * t as f64 * self.dt;
        self.phase.iter().map(|p| (p + shift).cos()).collect()
    }
}
