//! Join-code generation.

use rallypoint_protocol::RoomCode;
use rand::Rng;

use crate::StoreError;

/// Samples one code uniformly from the alphabet.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    let mut indices = [0usize; RoomCode::LEN];
    for slot in &mut indices {
        *slot = rng.random_range(0..RoomCode::ALPHABET.len());
    }
    RoomCode::from_indices(indices)
}

/// Samples codes until `is_taken` says one is free.
///
/// With 32^6 (about a billion) codes and a handful of active rooms a
/// collision is already unlikely; `attempts` bounds the pathological case.
///
/// # Errors
/// [`StoreError::CodeGenerationExhausted`] after `attempts` collisions, or
/// whatever `is_taken` returns.
pub fn generate_unique_code<R, F>(
    rng: &mut R,
    attempts: u32,
    mut is_taken: F,
) -> Result<RoomCode, StoreError>
where
    R: Rng + ?Sized,
    F: FnMut(&RoomCode) -> Result<bool, StoreError>,
{
    for attempt in 1..=attempts {
        let code = random_code(rng);
        if !is_taken(&code)? {
            return Ok(code);
        }
        tracing::debug!(%code, attempt, "room code collision, retrying");
    }
    Err(StoreError::CodeGenerationExhausted(attempts))
}
