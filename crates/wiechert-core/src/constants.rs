//! Physical constants (CODATA 2018, SI units).

use std::f64::consts::PI;

/// Speed of light in vacuum (m/s).
pub const C: f64 = 299_792_458.0;

/// Vacuum permittivity $\epsilon_0$ (F/m).
pub const EPSILON_0: f64 = 8.854_187_812_8e-12;

/// Elementary charge (C).
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Electron rest mass (kg).
pub const ELECTRON_MASS: f64 = 9.109_383_701_5e-31;

/// Coulomb prefactor $1 / (4 \pi \epsilon_0)$.
pub const COULOMB: f64 = 1.0 / (4.0 * PI * EPSILON_0);
