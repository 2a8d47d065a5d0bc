//! The simulation: every source, the external fields, and field queries.
//!
//! Point charges and dipole members share one flat charge list addressed by
//! [`ChargeId`]. A dipole's two members are listed negative first, directly
//! after the sources added before it.

use std::sync::Arc;

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::charge::{Charge, ChargeKey, Kinematics, PointCharge};
use crate::dipole::{Dipole, DipoleCharge, Member};
use crate::error::SimulationError;
use crate::fields::{electric_terms, ExternalFields, RetardedSnapshot};
use crate::retarded::RetardedTimeSolver;
use crate::types::{FieldComponent, FieldTerms, Vec3, VectorField};

/// Anything that can be placed in a simulation.
#[derive(Debug, Clone)]
pub enum Source {
    Charge(PointCharge),
    Dipole(Dipole),
}

impl From<PointCharge> for Source {
    fn from(charge: PointCharge) -> Self {
        Source::Charge(charge)
    }
}

impl From<Dipole> for Source {
    fn from(dipole: Dipole) -> Self {
        Source::Dipole(dipole)
    }
}

/// Handle of a charge in the simulation's flat charge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChargeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChargeSlot {
    Point(usize),
    Member { dipole: usize, member: Member },
}

/// A borrowed charge of either kind.
#[derive(Debug, Clone, Copy)]
pub enum ChargeRef<'a> {
    Point(&'a PointCharge),
    Member(DipoleCharge<'a>),
}

impl Charge for ChargeRef<'_> {
    fn q(&self) -> f64 {
        match self {
            ChargeRef::Point(c) => c.q(),
            ChargeRef::Member(c) => c.q(),
        }
    }

    fn kinematics(&self, t: f64) -> Kinematics {
        match self {
            ChargeRef::Point(c) => c.kinematics(t),
            ChargeRef::Member(c) => c.kinematics(t),
        }
    }

    fn key(&self) -> ChargeKey {
        match self {
            ChargeRef::Point(c) => c.key(),
            ChargeRef::Member(c) => c.key(),
        }
    }
}

/// Point charges, dipoles and external fields, with the retarded-time
/// solver used by every query.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    point_charges: Vec<PointCharge>,
    pub(crate) dipoles: Vec<Dipole>,
    slots: Vec<ChargeSlot>,
    dipole_slots: Vec<[ChargeId; 2]>,
    external: ExternalFields,
    solver: RetardedTimeSolver,
}

impl Simulation {
    pub fn new<S, I>(sources: I) -> Self
    where
        S: Into<Source>,
        I: IntoIterator<Item = S>,
    {
        let mut sim = Self::default();
        for source in sources {
            sim.add_source(source);
        }
        sim
    }

    /// Append a source. Returns the handles of the charges it added.
    pub fn add_source(&mut self, source: impl Into<Source>) -> Vec<ChargeId> {
        match source.into() {
            Source::Charge(charge) => {
                let id = ChargeId(self.slots.len());
                self.slots.push(ChargeSlot::Point(self.point_charges.len()));
                self.point_charges.push(charge);
                vec![id]
            }
            Source::Dipole(dipole) => {
                let index = self.dipoles.len();
                let ids = Member::BOTH.map(|member| {
                    let id = ChargeId(self.slots.len());
                    self.slots.push(ChargeSlot::Member {
                        dipole: index,
                        member,
                    });
                    id
                });
                self.dipoles.push(dipole);
                self.dipole_slots.push(ids);
                ids.to_vec()
            }
        }
    }

    /// Add an external electric field, evaluated at the query time.
    pub fn with_external_e<F>(mut self, field: F) -> Self
    where
        F: Fn(f64, Vec3) -> Vec3 + Send + Sync + 'static,
    {
        self.external.e = Some(Arc::new(field));
        self
    }

    /// Add an external magnetic field, evaluated at the query time.
    pub fn with_external_b<F>(mut self, field: F) -> Self
    where
        F: Fn(f64, Vec3) -> Vec3 + Send + Sync + 'static,
    {
        self.external.b = Some(Arc::new(field));
        self
    }

    pub fn with_solver(mut self, solver: RetardedTimeSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn solver(&self) -> &RetardedTimeSolver {
        &self.solver
    }

    pub fn external_fields(&self) -> &ExternalFields {
        &self.external
    }

    /// Number of charges in the flat list, dipole members included.
    pub fn charge_count(&self) -> usize {
        self.slots.len()
    }

    pub fn charge_ids(&self) -> impl Iterator<Item = ChargeId> + '_ {
        (0..self.slots.len()).map(ChargeId)
    }

    pub fn charge(&self, id: ChargeId) -> Result<ChargeRef<'_>, SimulationError> {
        let slot = self
            .slots
            .get(id.0)
            .ok_or(SimulationError::UnknownCharge(id.0))?;
        Ok(self.resolve(*slot))
    }

    fn resolve(&self, slot: ChargeSlot) -> ChargeRef<'_> {
        match slot {
            ChargeSlot::Point(i) => ChargeRef::Point(&self.point_charges[i]),
            ChargeSlot::Member { dipole, member } => {
                ChargeRef::Member(self.dipoles[dipole].member(member))
            }
        }
    }

    /// Every charge, in handle order.
    pub fn charges(&self) -> impl Iterator<Item = ChargeRef<'_>> + '_ {
        self.slots.iter().map(|slot| self.resolve(*slot))
    }

    /// Identity keys of every charge, in handle order.
    pub fn charge_keys(&self) -> Vec<ChargeKey> {
        self.charges().map(|c| c.key()).collect()
    }

    pub fn point_charges(&self) -> &[PointCharge] {
        &self.point_charges
    }

    pub fn dipoles(&self) -> &[Dipole] {
        &self.dipoles
    }

    pub fn dipole_count(&self) -> usize {
        self.dipoles.len()
    }

    pub fn dipole(&self, index: usize) -> Result<&Dipole, SimulationError> {
        self.dipoles
            .get(index)
            .ok_or(SimulationError::UnknownDipole(index))
    }

    /// Handles of a dipole's negative and positive member.
    pub fn dipole_charges(&self, index: usize) -> Result<[ChargeId; 2], SimulationError> {
        self.dipole_slots
            .get(index)
            .copied()
            .ok_or(SimulationError::UnknownDipole(index))
    }

    fn included<'s>(
        &'s self,
        exclude: &'s [ChargeId],
    ) -> Result<impl Iterator<Item = ChargeRef<'s>> + 's, SimulationError> {
        if let Some(bad) = exclude.iter().find(|id| id.0 >= self.slots.len()) {
            return Err(SimulationError::UnknownCharge(bad.0));
        }
        Ok(self
            .charge_ids()
            .filter(move |id| !exclude.contains(id))
            .map(move |id| self.resolve(self.slots[id.0])))
    }

    /// Solve retarded kinematics of every non-excluded charge over a
    /// coordinate mesh. `x`, `y` and `z` must share one shape.
    pub fn retarded<D: Dimension>(
        &self,
        t: f64,
        x: &Array<f64, D>,
        y: &Array<f64, D>,
        z: &Array<f64, D>,
        exclude: &[ChargeId],
    ) -> Result<RetardedSnapshot<'_, D>, SimulationError> {
        if x.shape() != y.shape() || x.shape() != z.shape() {
            return Err(SimulationError::ShapeMismatch {
                x: x.shape().to_vec(),
                y: y.shape().to_vec(),
                z: z.shape().to_vec(),
            });
        }
        let points = Zip::from(x).and(y).and(z).map_collect(|&a, &b, &c| [a, b, c]);
        RetardedSnapshot::new(&self.solver, self.included(exclude)?, &self.external, t, points)
    }

    /// Electric field over a coordinate mesh at time `t`.
    pub fn calculate_e<D: Dimension>(
        &self,
        t: f64,
        x: &Array<f64, D>,
        y: &Array<f64, D>,
        z: &Array<f64, D>,
        component: FieldComponent,
        exclude: &[ChargeId],
    ) -> Result<VectorField<D>, SimulationError> {
        Ok(self.retarded(t, x, y, z, exclude)?.e(component))
    }

    /// Magnetic field over a coordinate mesh at time `t`.
    pub fn calculate_b<D: Dimension>(
        &self,
        t: f64,
        x: &Array<f64, D>,
        y: &Array<f64, D>,
        z: &Array<f64, D>,
        component: FieldComponent,
        exclude: &[ChargeId],
    ) -> Result<VectorField<D>, SimulationError> {
        Ok(self.retarded(t, x, y, z, exclude)?.b(component))
    }

    /// Scalar potential over a coordinate mesh at time `t`.
    pub fn calculate_v<D: Dimension>(
        &self,
        t: f64,
        x: &Array<f64, D>,
        y: &Array<f64, D>,
        z: &Array<f64, D>,
        exclude: &[ChargeId],
    ) -> Result<Array<f64, D>, SimulationError> {
        Ok(self.retarded(t, x, y, z, exclude)?.v())
    }

    /// Vector potential over a coordinate mesh at time `t`.
    pub fn calculate_a<D: Dimension>(
        &self,
        t: f64,
        x: &Array<f64, D>,
        y: &Array<f64, D>,
        z: &Array<f64, D>,
        exclude: &[ChargeId],
    ) -> Result<VectorField<D>, SimulationError> {
        Ok(self.retarded(t, x, y, z, exclude)?.a())
    }

    /// Velocity and acceleration terms of the charge field at one point,
    /// external fields not included.
    pub fn field_terms_at(
        &self,
        t: f64,
        point: &Vec3,
        exclude: &[ChargeId],
    ) -> Result<FieldTerms, SimulationError> {
        let mut terms = FieldTerms::default();
        for charge in self.included(exclude)? {
            let tr = self.solver.solve(&charge, t, point)?;
            if let Some(contribution) = electric_terms(charge.q(), point, &charge.kinematics(tr)) {
                terms.accumulate(&contribution);
            }
        }
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ELEMENTARY_CHARGE;
    use crate::trajectories::Stationary;

    fn sample() -> Simulation {
        let dipole = Dipole::new(1e15, Stationary::new([0.0; 3]), [1e-11, 0.0, 0.0]).unwrap();
        Simulation::new([
            Source::from(PointCharge::new(ELEMENTARY_CHARGE, Stationary::new([1e-9, 0.0, 0.0]))),
            Source::from(dipole),
            Source::from(PointCharge::new(-ELEMENTARY_CHARGE, Stationary::new([0.0, 1e-9, 0.0]))),
        ])
    }

    #[test]
    fn test_dipole_members_follow_insertion_order() {
        let sim = sample();
        assert_eq!(sim.charge_count(), 4);
        assert_eq!(sim.dipole_charges(0).unwrap(), [ChargeId(1), ChargeId(2)]);
        assert!(sim.charge(ChargeId(1)).unwrap().q() < 0.0);
        assert!(sim.charge(ChargeId(2)).unwrap().q() > 0.0);
        assert!(matches!(sim.charge(ChargeId(3)).unwrap(), ChargeRef::Point(_)));
    }

    #[test]
    fn test_unknown_handles_are_rejected() {
        let sim = sample();
        assert_eq!(
            sim.charge(ChargeId(9)).unwrap_err(),
            SimulationError::UnknownCharge(9)
        );
        assert_eq!(
            sim.dipole_charges(1).unwrap_err(),
            SimulationError::UnknownDipole(1)
        );
        let err = sim.field_terms_at(0.0, &[1.0, 0.0, 0.0], &[ChargeId(4)]).unwrap_err();
        assert_eq!(err, SimulationError::UnknownCharge(4));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let sim = sample();
        let x = ndarray::Array1::zeros(3);
        let y = ndarray::Array1::zeros(2);
        let err = sim
            .calculate_e(0.0, &x, &y, &x, FieldComponent::Total, &[])
            .unwrap_err();
        assert!(matches!(err, SimulationError::ShapeMismatch { .. }));
    }
}
