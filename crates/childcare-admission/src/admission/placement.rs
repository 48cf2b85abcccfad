use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{age_in_years, ClassId, ClassRoom, WaitlistReason};

/// Reasons a drawn applicant could not be seated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PlacementFailure {
    #[error("no class covers the applicant's age")]
    NoEligibleAgeBand,
    #[error("every class covering the applicant's age is full")]
    ClassFull,
}

impl PlacementFailure {
    pub const fn waitlist_reason(self) -> WaitlistReason {
        match self {
            PlacementFailure::NoEligibleAgeBand => WaitlistReason::NoEligibleAgeBand,
            PlacementFailure::ClassFull => WaitlistReason::ClassFull,
        }
    }
}

/// Errors raised when seating an applicant into a named class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatError {
    #[error("class {0} not found")]
    UnknownClass(ClassId),
    #[error("class {0} has no remaining seat")]
    ClassFull(ClassId),
}

/// In-memory capacity snapshot of an institution's classes for one operation.
///
/// Every seat handed out decrements the snapshot immediately, so later
/// assignments in the same run observe the reduced capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRoster {
    classes: Vec<ClassRoom>,
}

impl ClassRoster {
    pub fn new(mut classes: Vec<ClassRoom>) -> Self {
        classes.sort_by(|left, right| left.id.cmp(&right.id));
        Self { classes }
    }

    pub fn classes(&self) -> &[ClassRoom] {
        &self.classes
    }

    pub fn into_classes(self) -> Vec<ClassRoom> {
        self.classes
    }

    pub fn get(&self, id: &ClassId) -> Option<&ClassRoom> {
        self.classes.iter().find(|class| &class.id == id)
    }

    pub fn remaining_seats(&self) -> u32 {
        self.classes.iter().map(ClassRoom::remaining).sum()
    }

    /// Seat a child born on `birth_date` into the lowest-id eligible class with room.
    pub fn assign(
        &mut self,
        birth_date: NaiveDate,
        on: NaiveDate,
    ) -> Result<ClassId, PlacementFailure> {
        let age = age_in_years(birth_date, on);
        let mut covered = false;

        for class in self.classes.iter_mut().filter(|class| class.covers_age(age)) {
            covered = true;
            if class.remaining() > 0 {
                class.enrolled += 1;
                return Ok(class.id.clone());
            }
        }

        if covered {
            Err(PlacementFailure::ClassFull)
        } else {
            Err(PlacementFailure::NoEligibleAgeBand)
        }
    }

    /// Seat into a specific class, as staff do for manual admissions.
    pub fn seat(&mut self, id: &ClassId) -> Result<(), SeatError> {
        let class = self
            .classes
            .iter_mut()
            .find(|class| &class.id == id)
            .ok_or_else(|| SeatError::UnknownClass(id.clone()))?;

        if class.remaining() == 0 {
            return Err(SeatError::ClassFull(id.clone()));
        }
        class.enrolled += 1;
        Ok(())
    }

    /// Give a seat back after a withdrawal; unknown classes are ignored.
    pub fn release(&mut self, id: &ClassId) {
        if let Some(class) = self.classes.iter_mut().find(|class| &class.id == id) {
            class.enrolled = class.enrolled.saturating_sub(1);
        }
    }
}
