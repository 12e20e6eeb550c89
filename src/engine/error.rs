use ulid::Ulid;

/// Why a booking or extension was refused. These are expected outcomes,
/// not failures: the caller gets the reason string verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DuplicateGuestUnit,
    GuestInAnotherUnit,
    UnitOccupied,
    NoActiveBooking,
    ExtensionUnavailable,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::DuplicateGuestUnit => "guest cannot book the same unit multiple times",
            Rejection::GuestInAnotherUnit => "guest cannot be in multiple units at the same time",
            Rejection::UnitOccupied => "unit already occupied for given check-in date",
            Rejection::NoActiveBooking => "no active booking found for this guest",
            Rejection::ExtensionUnavailable => "extend not possible, unit already reserved",
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::DuplicateGuestUnit => "duplicate_guest_unit",
            Rejection::GuestInAnotherUnit => "guest_in_another_unit",
            Rejection::UnitOccupied => "unit_occupied",
            Rejection::NoActiveBooking => "no_active_booking",
            Rejection::ExtensionUnavailable => "extension_unavailable",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// Business rule refused the request.
    Rejected(Rejection),
    NotFound(Ulid),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::Rejected(_))
    }
}

impl From<Rejection> for EngineError {
    fn from(r: Rejection) -> Self {
        EngineError::Rejected(r)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Rejected(r) => write!(f, "{r}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
