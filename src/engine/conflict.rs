use chrono::NaiveDate;

use crate::model::*;

use super::{EngineError, Rejection};

/// Outcome of the booking rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Allowed,
    Rejected(Rejection),
}

pub(crate) fn stay_of(check_in: NaiveDate, nights: u32) -> Result<Stay, EngineError> {
    Stay::from_nights(check_in, nights)
        .ok_or(EngineError::InvalidInput("check-out date out of range"))
}

/// Whether `[a_start, a_start + a_nights)` and `[b_start, b_start + b_nights)`
/// share a night. Checkout is exclusive, so back-to-back stays don't overlap.
pub fn intervals_overlap(
    a_start: NaiveDate,
    a_nights: u32,
    b_start: NaiveDate,
    b_nights: u32,
) -> Result<bool, EngineError> {
    let a = stay_of(a_start, a_nights)?;
    let b = stay_of(b_start, b_nights)?;
    Ok(a.overlaps(&b))
}

/// False iff any reservation on `unit` in `existing` overlaps the candidate.
/// Reservations for other units are ignored.
pub fn is_unit_available(
    unit: &str,
    start: NaiveDate,
    nights: u32,
    existing: &[Reservation],
) -> Result<bool, EngineError> {
    for r in existing.iter().filter(|r| r.unit == unit) {
        if intervals_overlap(start, nights, r.check_in, r.nights)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Run the booking rules in order; the first failing rule decides.
///
/// 1. the guest already holds this unit
/// 2. the guest holds any unit
/// 3. the unit is taken for the requested nights
///
/// Rule 1 is a special case of rule 2 and only exists to give the more
/// specific reason, so it must stay first.
pub fn evaluate_booking_eligibility(
    candidate: &NewReservation,
    guest_reservations: &[Reservation],
    unit_reservations: &[Reservation],
) -> Result<Eligibility, EngineError> {
    let mine = guest_reservations.iter().filter(|r| r.guest == candidate.guest);

    if mine.clone().any(|r| r.unit == candidate.unit) {
        return Ok(Eligibility::Rejected(Rejection::DuplicateGuestUnit));
    }
    if mine.clone().next().is_some() {
        return Ok(Eligibility::Rejected(Rejection::GuestInAnotherUnit));
    }
    if !unit_reservations.is_empty()
        && !is_unit_available(
            &candidate.unit,
            candidate.check_in,
            candidate.nights,
            unit_reservations,
        )?
    {
        return Ok(Eligibility::Rejected(Rejection::UnitOccupied));
    }
    Ok(Eligibility::Allowed)
}
