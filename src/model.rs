use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)`. The checkout day itself is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    /// Stay of `nights` starting at `check_in`. `None` if the checkout date
    /// falls off the calendar.
    pub fn from_nights(check_in: NaiveDate, nights: u32) -> Option<Self> {
        let check_out = check_in.checked_add_days(Days::new(u64::from(nights)))?;
        debug_assert!(check_in <= check_out);
        Some(Self { check_in, check_out })
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_night(&self, night: NaiveDate) -> bool {
        self.check_in <= night && night < self.check_out
    }
}

/// A persisted reservation of one unit by one guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub guest: String,
    pub unit: String,
    pub check_in: NaiveDate,
    pub nights: u32,
}

impl Reservation {
    pub fn stay(&self) -> Option<Stay> {
        Stay::from_nights(self.check_in, self.nights)
    }

    /// Exclusive end of the stay.
    pub fn check_out(&self) -> Option<NaiveDate> {
        self.stay().map(|s| s.check_out)
    }
}

/// A reservation that has not been stored yet; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub guest: String,
    pub unit: String,
    pub check_in: NaiveDate,
    pub nights: u32,
}

impl NewReservation {
    pub fn into_reservation(self, id: Ulid) -> Reservation {
        Reservation {
            id,
            guest: self.guest,
            unit: self.unit,
            check_in: self.check_in,
            nights: self.nights,
        }
    }
}

/// Store query. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub guest: Option<String>,
    pub unit: Option<String>,
}

impl ReservationFilter {
    pub fn guest(guest: impl Into<String>) -> Self {
        Self {
            guest: Some(guest.into()),
            unit: None,
        }
    }

    pub fn unit(unit: impl Into<String>) -> Self {
        Self {
            guest: None,
            unit: Some(unit.into()),
        }
    }

    pub fn matches(&self, r: &Reservation) -> bool {
        self.guest.as_deref().is_none_or(|g| g == r.guest)
            && self.unit.as_deref().is_none_or(|u| u == r.unit)
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated { reservation: Reservation },
    /// `nights` is the new total, not the increment.
    ReservationExtended { id: Ulid, nights: u32 },
}
