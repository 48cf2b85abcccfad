//! Per-institution waitlist ordering.
//!
//! The ledger works on the full applicant set of a single institution, loaded
//! under that institution's lock. Every operation leaves the orders held by
//! waitlisted children equal to the contiguous range `1..=N`; the caller
//! persists the mutated set as one atomic change.

use std::collections::BTreeMap;

use super::domain::{Applicant, ParticipantId};

/// Errors raised by ledger mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("participant {0} is not part of this institution")]
    UnknownParticipant(ParticipantId),
    #[error("participant {0} is not a child with a determinable tier")]
    NotOrderable(ParticipantId),
    #[error("participant {0} is not waitlisted")]
    NotWaitlisted(ParticipantId),
}

/// Breaches of the contiguous-order invariant reported by [`WaitlistLedger::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerViolation {
    #[error("order {order} is held by more than one participant")]
    Duplicate { order: u32 },
    #[error("expected order {expected}, found {found}")]
    Gap { expected: u32, found: u32 },
    #[error("participant {0} is waitlisted without an order")]
    Unordered(ParticipantId),
    #[error("participant {0} holds an order but is not a waitlisted child")]
    StrayOrder(ParticipantId),
}

pub struct WaitlistLedger<'a> {
    applicants: &'a mut [Applicant],
}

impl<'a> WaitlistLedger<'a> {
    pub fn new(applicants: &'a mut [Applicant]) -> Self {
        Self { applicants }
    }

    /// Highest order currently held, `0` when the waitlist is empty.
    pub fn max_order(&self) -> u32 {
        self.applicants
            .iter()
            .filter_map(|applicant| applicant.waitlist_order)
            .max()
            .unwrap_or(0)
    }

    pub fn order_of(&self, id: &ParticipantId) -> Option<u32> {
        self.applicants
            .iter()
            .find(|applicant| &applicant.id == id)
            .and_then(|applicant| applicant.waitlist_order)
    }

    /// Replace every order with `1..=N` following `ordered`.
    pub fn seed(&mut self, ordered: &[ParticipantId]) -> Result<u32, LedgerError> {
        let mut positions = BTreeMap::new();
        for id in ordered {
            let index = self.position(id)?;
            let applicant = &self.applicants[index];
            if !applicant.is_orderable() {
                return Err(LedgerError::NotOrderable(id.clone()));
            }
            if !applicant.is_waitlisted() {
                return Err(LedgerError::NotWaitlisted(id.clone()));
            }
            if !positions.contains_key(&index) {
                let next = positions.len() as u32 + 1;
                positions.insert(index, next);
            }
        }

        for (index, applicant) in self.applicants.iter_mut().enumerate() {
            applicant.waitlist_order = positions.get(&index).copied();
        }

        Ok(positions.len() as u32)
    }

    /// Give a newly waitlisted child the next order; existing orders are kept.
    pub fn append(&mut self, id: &ParticipantId) -> Result<u32, LedgerError> {
        let index = self.position(id)?;
        let applicant = &self.applicants[index];
        if !applicant.is_orderable() {
            return Err(LedgerError::NotOrderable(id.clone()));
        }
        if !applicant.is_waitlisted() {
            return Err(LedgerError::NotWaitlisted(id.clone()));
        }
        if let Some(order) = applicant.waitlist_order {
            return Ok(order);
        }

        let next = self.max_order() + 1;
        self.applicants[index].waitlist_order = Some(next);
        Ok(next)
    }

    /// Clear the order of an exiting participant and close the gap behind it.
    ///
    /// Returns the order that was released; `None` means the participant held
    /// no order and nothing else changed.
    pub fn close(&mut self, id: &ParticipantId) -> Result<Option<u32>, LedgerError> {
        let index = self.position(id)?;
        let Some(released) = self.applicants[index].waitlist_order.take() else {
            return Ok(None);
        };

        for applicant in self.applicants.iter_mut() {
            if let Some(order) = applicant.waitlist_order.as_mut() {
                if *order > released {
                    *order -= 1;
                }
            }
        }

        Ok(Some(released))
    }

    /// Drop every order ahead of the next lottery season.
    pub fn reset(&mut self) -> usize {
        self.applicants
            .iter_mut()
            .filter_map(|applicant| applicant.waitlist_order.take())
            .count()
    }

    pub fn verify(&self) -> Result<(), LedgerViolation> {
        verify_orders(&*self.applicants)
    }

    fn position(&self, id: &ParticipantId) -> Result<usize, LedgerError> {
        self.applicants
            .iter()
            .position(|applicant| &applicant.id == id)
            .ok_or_else(|| LedgerError::UnknownParticipant(id.clone()))
    }
}

/// Check that waitlisted children hold exactly the orders `1..=N`.
pub fn verify_orders(applicants: &[Applicant]) -> Result<(), LedgerViolation> {
    let mut orders = Vec::new();
    for applicant in applicants.iter() {
        let expected_holder = applicant.is_orderable() && applicant.is_waitlisted();
        match (applicant.waitlist_order, expected_holder) {
            (Some(order), true) => orders.push(order),
            (Some(_), false) => return Err(LedgerViolation::StrayOrder(applicant.id.clone())),
            (None, true) => return Err(LedgerViolation::Unordered(applicant.id.clone())),
            (None, false) => {}
        }
    }

    orders.sort_unstable();
    for (position, order) in orders.iter().enumerate() {
        let expected = position as u32 + 1;
        if *order < expected {
            return Err(LedgerViolation::Duplicate { order: *order });
        }
        if *order > expected {
            return Err(LedgerViolation::Gap {
                expected,
                found: *order,
            });
        }
    }
    Ok(())
}
