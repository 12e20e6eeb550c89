use chrono::NaiveDate;

use crate::limits::*;

use super::EngineError;

pub(crate) fn validate_id(value: &str, empty_msg: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(empty_msg));
    }
    if value.trim() != value {
        return Err(EngineError::InvalidInput(
            "identifiers must not have leading or trailing whitespace",
        ));
    }
    if value.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("identifier too long"));
    }
    Ok(())
}

pub(crate) fn validate_nights(nights: u32) -> Result<(), EngineError> {
    if nights == 0 {
        return Err(EngineError::InvalidInput("nights must be at least 1"));
    }
    if nights > MAX_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_check_in(check_in: NaiveDate) -> Result<(), EngineError> {
    if !(MIN_CHECK_IN..=MAX_CHECK_IN).contains(&check_in) {
        return Err(EngineError::LimitExceeded("check-in date out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_ids_rejected() {
        assert!(matches!(validate_id("", "guest"), Err(EngineError::InvalidInput("guest"))));
        assert!(matches!(validate_id("   ", "unit"), Err(EngineError::InvalidInput("unit"))));
        assert!(validate_id("alice", "guest").is_ok());
    }

    #[test]
    fn padded_ids_rejected() {
        for padded in ["alice ", " alice", "\talice", "alice\n"] {
            assert!(
                matches!(validate_id(padded, "guest"), Err(EngineError::InvalidInput(_))),
                "{padded:?} accepted"
            );
        }
        assert!(validate_id("alice smith", "guest").is_ok());
    }

    #[test]
    fn id_length_limit() {
        assert!(validate_id(&"x".repeat(MAX_ID_LEN), "guest").is_ok());
        assert!(matches!(
            validate_id(&"x".repeat(MAX_ID_LEN + 1), "guest"),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn nights_bounds() {
        assert!(matches!(validate_nights(0), Err(EngineError::InvalidInput(_))));
        assert!(validate_nights(1).is_ok());
        assert!(validate_nights(MAX_NIGHTS).is_ok());
        assert!(matches!(validate_nights(MAX_NIGHTS + 1), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn check_in_bounds() {
        assert!(validate_check_in(MIN_CHECK_IN).is_ok());
        assert!(validate_check_in(MAX_CHECK_IN).is_ok());
        assert!(validate_check_in(MIN_CHECK_IN.pred_opt().unwrap()).is_err());
        assert!(validate_check_in(MAX_CHECK_IN.succ_opt().unwrap()).is_err());
    }
}
