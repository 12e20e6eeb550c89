mod conflict;
mod error;
mod store;
mod validate;

pub use conflict::{evaluate_booking_eligibility, intervals_overlap, is_unit_available, Eligibility};
pub use error::{EngineError, Rejection};
pub use store::{InMemoryStore, ReservationStore};

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::limits::MAX_NIGHTS;
use crate::model::*;

use validate::{validate_check_in, validate_id, validate_nights};

/// What a request serializes on. Ordered so every request takes its locks
/// in the same sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Guest(String),
    Unit(String),
}

/// Locks held by one request. Dropping releases them and removes table
/// entries that no other request is holding or waiting on.
struct KeyLocks<'a> {
    table: &'a DashMap<LockKey, Arc<Mutex<()>>>,
    held: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl Drop for KeyLocks<'_> {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain(..) {
            drop(guard);
            // Cloning a lock out of the table takes the shard lock, so the
            // count can't rise while `remove_if` is looking at it.
            self.table.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

/// Books and extends reservations against a [`ReservationStore`].
///
/// Each request reads the guest's and the unit's reservations, decides, and
/// writes while holding both the guest lock and the unit lock. Requests that
/// share neither run in parallel.
pub struct ReservationService<S> {
    store: Arc<S>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl<S: ReservationStore> ReservationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Acquire the locks for `keys` in sorted order.
    async fn lock_all(&self, mut keys: Vec<LockKey>) -> KeyLocks<'_> {
        keys.sort();
        keys.dedup();
        // Built before the first await so a cancelled request still cleans up.
        let mut locks = KeyLocks {
            table: &self.locks,
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let lock = self.locks.entry(key.clone()).or_default().value().clone();
            locks.held.push((key, lock.lock_owned().await));
        }
        locks
    }

    /// Entries in the lock table. Zero whenever no request is in flight.
    pub fn lock_table_len(&self) -> usize {
        self.locks.len()
    }

    pub async fn create_booking(
        &self,
        guest: &str,
        unit: &str,
        check_in: NaiveDate,
        nights: u32,
    ) -> Result<Reservation, EngineError> {
        validate_id(guest, "guest must not be empty")?;
        validate_id(unit, "unit must not be empty")?;
        validate_nights(nights)?;
        validate_check_in(check_in)?;

        let _locks = self
            .lock_all(vec![LockKey::Guest(guest.into()), LockKey::Unit(unit.into())])
            .await;

        let guest_reservations = self.store.find_reservations(&ReservationFilter::guest(guest)).await?;
        let unit_reservations = self.store.find_reservations(&ReservationFilter::unit(unit)).await?;

        let candidate = NewReservation {
            guest: guest.into(),
            unit: unit.into(),
            check_in,
            nights,
        };
        match evaluate_booking_eligibility(&candidate, &guest_reservations, &unit_reservations)? {
            Eligibility::Rejected(rejection) => {
                debug!("booking {guest} in {unit} from {check_in} rejected: {rejection}");
                Err(rejection.into())
            }
            Eligibility::Allowed => {
                let reservation = self.store.insert_reservation(candidate).await?;
                info!(
                    "booked {} for {guest} in {unit}: {check_in} x{nights}",
                    reservation.id
                );
                Ok(reservation)
            }
        }
    }

    pub async fn extend_booking(
        &self,
        guest: &str,
        unit: &str,
        additional_nights: u32,
    ) -> Result<Reservation, EngineError> {
        validate_id(guest, "guest must not be empty")?;
        validate_id(unit, "unit must not be empty")?;
        validate_nights(additional_nights)?;

        let _locks = self
            .lock_all(vec![LockKey::Guest(guest.into()), LockKey::Unit(unit.into())])
            .await;

        let unit_reservations = self.store.find_reservations(&ReservationFilter::unit(unit)).await?;
        let Some(current) = unit_reservations
            .iter()
            .filter(|r| r.guest == guest)
            .max_by_key(|r| r.check_in)
            .cloned()
        else {
            debug!("extension for {guest} in {unit} rejected: no active booking");
            return Err(Rejection::NoActiveBooking.into());
        };

        let new_nights = current
            .nights
            .checked_add(additional_nights)
            .filter(|n| *n <= MAX_NIGHTS)
            .ok_or(EngineError::LimitExceeded("stay too long"))?;

        // The extension starts exactly at the current checkout, so the
        // reservation being extended has to be left out of the comparison.
        let start = conflict::stay_of(current.check_in, current.nights)?.check_out;
        let others: Vec<Reservation> = unit_reservations
            .into_iter()
            .filter(|r| r.id != current.id)
            .collect();
        if !is_unit_available(unit, start, additional_nights, &others)? {
            debug!("extension of {} from {start} rejected: unit reserved", current.id);
            return Err(Rejection::ExtensionUnavailable.into());
        }

        let updated = self.store.update_reservation_nights(current.id, new_nights).await?;
        info!(
            "extended {} for {guest} in {unit} by {additional_nights} to {new_nights} nights",
            updated.id
        );
        Ok(updated)
    }

    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.store.find_reservations(filter).await
    }
}
