//! Retarded-time solution.
//!
//! For an observer at $\mathbf{r}$ and time $t$, the retarded time $t_r$ of a
//! charge is the root of
//!
//! $$
//! f(t_r) = |\mathbf{r} - \mathbf{r}_q(t_r)| - c\,(t - t_r)
//! $$
//!
//! which is unique while the charge moves slower than light. It is found by
//! Newton iteration with $f'(t_r) = c - \hat{\mathbf{R}} \cdot \mathbf{v}_q(t_r)$,
//! independently for every observation point.

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::charge::Charge;
use crate::constants::C;
use crate::error::SimulationError;
use crate::types::{dot, norm, sub, Vec3};

/// Newton solver settings for the light-cone equation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetardedTimeSolver {
    /// Absolute step tolerance (s).
    pub tolerance: f64,
    /// Offset of the initial guess from the observation time (s).
    pub initial_offset: f64,
    pub max_iterations: usize,
}

impl Default for RetardedTimeSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-22,
            initial_offset: -1e-12,
            max_iterations: 100,
        }
    }
}

impl RetardedTimeSolver {
    /// Retarded time of `charge` seen from `observer` at time `t`.
    pub fn solve<Q: Charge + ?Sized>(
        &self,
        charge: &Q,
        t: f64,
        observer: &Vec3,
    ) -> Result<f64, SimulationError> {
        let mut tr = t + self.initial_offset;
        let mut residual = f64::NAN;

        for _ in 0..self.max_iterations {
            let k = charge.kinematics(tr);
            let r = sub(observer, &k.position);
            let dist = norm(&r);
            residual = dist - C * (t - tr);
            if residual == 0.0 {
                return Ok(tr);
            }

            let slope = if dist > 0.0 {
                C - dot(&r, &k.velocity) / dist
            } else {
                C
            };
            let delta = residual / slope;
            let next = tr - delta;
            if !next.is_finite() {
                break;
            }
            tr = next;
            if delta.abs() <= self.tolerance.max(4.0 * f64::EPSILON * tr.abs()) {
                return Ok(tr);
            }
        }

        Err(SimulationError::RetardedTimeConvergence {
            t,
            iterations: self.max_iterations,
            residual,
        })
    }

    /// Retarded times for every point of an observation array.
    pub fn solve_array<Q, D>(
        &self,
        charge: &Q,
        t: f64,
        points: &Array<Vec3, D>,
    ) -> Result<Array<f64, D>, SimulationError>
    where
        Q: Charge + ?Sized,
        D: Dimension,
    {
        let mut out = Array::zeros(points.raw_dim());
        let mut failure = None;
        Zip::from(&mut out).and(points).for_each(|tr, p| {
            if failure.is_some() {
                return;
            }
            match self.solve(charge, t, p) {
                Ok(value) => *tr = value,
                Err(err) => failure = Some(err),
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}
