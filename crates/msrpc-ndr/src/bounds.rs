//! Bounds validation
//!
//! Two checks guard every session. Range checks run on encode before a value
//! is framed, so an out-of-range field never reaches the wire. Availability
//! checks run on decode before any container is allocated, so a forged count
//! cannot make the decoder reserve more memory than the input could fill.

use tracing::debug;

use crate::error::{NdrError, Result};

/// Fail unless `min <= value <= max`
pub fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<()>
where
    T: Into<i128> + Copy,
{
    let (value, min, max) = (value.into(), min.into(), max.into());
    if value < min || value > max {
        debug!(field, value = %value, min = %min, max = %max, "range check failed");
        return Err(NdrError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Fail unless `count` elements of at least `element_size` bytes fit in
/// `remaining` input bytes and under the `limit` allocation ceiling.
///
/// Returns the minimum number of bytes the elements will occupy.
pub fn check_available(count: usize, element_size: usize, remaining: usize, limit: usize) -> Result<usize> {
    let needed = count
        .checked_mul(element_size.max(1))
        .ok_or(NdrError::IntegerOverflow)?;
    if needed > remaining {
        debug!(count, element_size, remaining, "declared length exceeds remaining input");
        return Err(NdrError::BufferUnderflow {
            needed,
            have: remaining,
        });
    }
    if needed > limit {
        debug!(count, element_size, limit, "declared length exceeds allocation limit");
        return Err(NdrError::AllocationLimitExceeded {
            requested: needed,
            limit,
        });
    }
    Ok(needed)
}

/// Convert an in-memory count to its 32-bit wire form
pub fn wire_count(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| NdrError::IntegerOverflow)
}
