//! Liénard–Wiechert fields and potentials.
//!
//! With $\mathbf{R} = \mathbf{r} - \mathbf{r}_q(t_r)$ and
//! $\mathbf{u} = c\hat{\mathbf{R}} - \mathbf{v}$, all evaluated at the
//! retarded time, the electric field of a point charge splits into
//!
//! $$
//! \mathbf{E} = \frac{q}{4\pi\epsilon_0} \frac{R}{(\mathbf{R}\cdot\mathbf{u})^3}
//! \Big[ \underbrace{(c^2 - v^2)\mathbf{u}}_{\text{velocity}}
//! + \underbrace{(\mathbf{R}\cdot\mathbf{a})\mathbf{u} - (\mathbf{R}\cdot\mathbf{u})\mathbf{a}}_{\text{acceleration}} \Big]
//! $$
//!
//! and $\mathbf{B} = \frac{1}{c} \hat{\mathbf{R}} \times \mathbf{E}$. The
//! potentials are
//!
//! $$
//! V = \frac{q c}{4\pi\epsilon_0 (R c - \mathbf{R}\cdot\mathbf{v})}, \qquad
//! \mathbf{A} = \frac{\mathbf{v}}{c^2} V.
//! $$
//!
//! An observation point that coincides with a charge's retarded position
//! receives no contribution from that charge.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array, Dimension, Zip};

use crate::charge::{Charge, Kinematics};
use crate::constants::{C, COULOMB};
use crate::error::SimulationError;
use crate::retarded::RetardedTimeSolver;
use crate::types::{add, cross, dot, norm, scale, sub, FieldComponent, FieldTerms, Vec3, VectorField};

/// An externally imposed field $\mathbf{F}(t, \mathbf{r})$.
pub type ExternalField = Arc<dyn Fn(f64, Vec3) -> Vec3 + Send + Sync>;

/// Optional external electric and magnetic fields.
#[derive(Clone, Default)]
pub struct ExternalFields {
    pub e: Option<ExternalField>,
    pub b: Option<ExternalField>,
}

impl fmt::Debug for ExternalFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFields")
            .field("e", &self.e.is_some())
            .field("b", &self.b.is_some())
            .finish()
    }
}

impl ExternalFields {
    pub fn e_at(&self, t: f64, point: &Vec3) -> Vec3 {
        self.e.as_ref().map_or([0.0; 3], |f| f(t, *point))
    }

    pub fn b_at(&self, t: f64, point: &Vec3) -> Vec3 {
        self.b.as_ref().map_or([0.0; 3], |f| f(t, *point))
    }
}

/// Electric field terms of one charge at `observer`, given its retarded
/// kinematics. `None` when the observer sits on the charge.
pub fn electric_terms(q: f64, observer: &Vec3, k: &Kinematics) -> Option<FieldTerms> {
    let r = sub(observer, &k.position);
    let dist = norm(&r);
    if dist == 0.0 {
        return None;
    }
    let u = sub(&scale(C / dist, &r), &k.velocity);
    let r_dot_u = dot(&r, &u);
    let prefactor = COULOMB * q * dist / r_dot_u.powi(3);

    let velocity = scale(prefactor * (C * C - dot(&k.velocity, &k.velocity)), &u);
    let acceleration = scale(
        prefactor,
        &sub(
            &scale(dot(&r, &k.acceleration), &u),
            &scale(r_dot_u, &k.acceleration),
        ),
    );
    Some(FieldTerms {
        velocity,
        acceleration,
    })
}

/// Magnetic field terms of one charge, $\mathbf{B} = \mathbf{R} \times \mathbf{E} / (cR)$.
pub fn magnetic_terms(q: f64, observer: &Vec3, k: &Kinematics) -> Option<FieldTerms> {
    let e = electric_terms(q, observer, k)?;
    let r = sub(observer, &k.position);
    let factor = 1.0 / (C * norm(&r));
    Some(FieldTerms {
        velocity: scale(factor, &cross(&r, &e.velocity)),
        acceleration: scale(factor, &cross(&r, &e.acceleration)),
    })
}

/// Scalar potential of one charge (V).
pub fn scalar_potential(q: f64, observer: &Vec3, k: &Kinematics) -> Option<f64> {
    let r = sub(observer, &k.position);
    let dist = norm(&r);
    if dist == 0.0 {
        return None;
    }
    Some(COULOMB * q * C / (dist * C - dot(&r, &k.velocity)))
}

/// Vector potential of one charge (T·m).
pub fn vector_potential(q: f64, observer: &Vec3, k: &Kinematics) -> Option<Vec3> {
    let v = scalar_potential(q, observer, k)?;
    Some(scale(v / (C * C), &k.velocity))
}

struct RetardedSource<D: Dimension> {
    q: f64,
    kinematics: Array<Kinematics, D>,
}

/// Retarded kinematics of a set of charges over one set of observation points.
///
/// Retarded times are solved once at construction; every field and potential
/// query afterwards reuses them.
pub struct RetardedSnapshot<'a, D: Dimension> {
    t: f64,
    points: Array<Vec3, D>,
    sources: Vec<RetardedSource<D>>,
    external: &'a ExternalFields,
}

impl<'a, D: Dimension> RetardedSnapshot<'a, D> {
    /// Solve the retarded kinematics of every charge at every point.
    pub fn new<Q, I>(
        solver: &RetardedTimeSolver,
        charges: I,
        external: &'a ExternalFields,
        t: f64,
        points: Array<Vec3, D>,
    ) -> Result<Self, SimulationError>
    where
        Q: Charge,
        I: IntoIterator<Item = Q>,
    {
        let mut sources = Vec::new();
        for charge in charges {
            let mut kinematics = Array::from_elem(points.raw_dim(), Kinematics::default());
            let mut failure = None;
            Zip::from(&mut kinematics).and(&points).for_each(|k, p| {
                if failure.is_some() {
                    return;
                }
                match solver.solve(&charge, t, p) {
                    Ok(tr) => *k = charge.kinematics(tr),
                    Err(err) => failure = Some(err),
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
            sources.push(RetardedSource {
                q: charge.q(),
                kinematics,
            });
        }
        Ok(Self {
            t,
            points,
            sources,
            external,
        })
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn points(&self) -> &Array<Vec3, D> {
        &self.points
    }

    fn sum_vectors(&self, kernel: impl Fn(f64, &Vec3, &Kinematics) -> Option<Vec3>) -> Array<Vec3, D> {
        let mut total = Array::from_elem(self.points.raw_dim(), [0.0; 3]);
        for source in &self.sources {
            Zip::from(&mut total)
                .and(&self.points)
                .and(&source.kinematics)
                .for_each(|acc, p, k| {
                    if let Some(value) = kernel(source.q, p, k) {
                        *acc = add(acc, &value);
                    }
                });
        }
        total
    }

    fn add_external(&self, total: &mut Array<Vec3, D>, field: Option<&ExternalField>) {
        if let Some(f) = field {
            Zip::from(total)
                .and(&self.points)
                .for_each(|acc, p| *acc = add(acc, &f(self.t, *p)));
        }
    }

    /// Electric field vectors; the external E field is included for
    /// [`FieldComponent::Total`] only.
    pub fn e_vectors(&self, component: FieldComponent) -> Array<Vec3, D> {
        let mut total = self.sum_vectors(|q, p, k| {
            electric_terms(q, p, k).map(|terms| terms.select(component))
        });
        if component == FieldComponent::Total {
            self.add_external(&mut total, self.external.e.as_ref());
        }
        total
    }

    pub fn e(&self, component: FieldComponent) -> VectorField<D> {
        VectorField::from_vectors(&self.e_vectors(component))
    }

    /// Magnetic field; the external B field is included for
    /// [`FieldComponent::Total`] only.
    pub fn b(&self, component: FieldComponent) -> VectorField<D> {
        let mut total = self.sum_vectors(|q, p, k| {
            magnetic_terms(q, p, k).map(|terms| terms.select(component))
        });
        if component == FieldComponent::Total {
            self.add_external(&mut total, self.external.b.as_ref());
        }
        VectorField::from_vectors(&total)
    }

    /// Scalar potential.
    pub fn v(&self) -> Array<f64, D> {
        let mut total = Array::zeros(self.points.raw_dim());
        for source in &self.sources {
            Zip::from(&mut total)
                .and(&self.points)
                .and(&source.kinematics)
                .for_each(|acc, p, k| {
                    if let Some(value) = scalar_potential(source.q, p, k) {
                        *acc += value;
                    }
                });
        }
        total
    }

    /// Vector potential.
    pub fn a(&self) -> VectorField<D> {
        VectorField::from_vectors(&self.sum_vectors(vector_potential))
    }
}
