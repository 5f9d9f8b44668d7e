use std::convert::TryFrom;

use anyhow::{anyhow, Result};

use crate::error::Error;

pub fn to_i32(value: i64, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| anyhow!("{field} value {value} exceeds 32-bit range"))
}

/// Turns a zero-row UPDATE into a typed `NotFound` that survives the trip back
/// from the DB thread.
pub fn ensure_affected(rows_affected: usize, night_id: i64) -> Result<()> {
    if rows_affected == 0 {
        return Err(anyhow::Error::new(Error::NotFound(night_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_i32_rejects_overflow() {
        assert_eq!(to_i32(5, "quality_rating").unwrap(), 5);
        let err = to_i32(i64::from(i32::MAX) + 1, "quality_rating").unwrap_err();
        assert!(err.to_string().contains("quality_rating"));
    }

    #[test]
    fn zero_rows_is_not_found() {
        assert!(ensure_affected(1, 4).is_ok());
        let err = Error::from(ensure_affected(0, 4).unwrap_err());
        assert!(matches!(err, Error::NotFound(4)));
    }
}
