//! Short, URL-safe identifiers for UUIDs.
//!
//! A slug is the 16 bytes of a UUID in URL-safe base64 without padding,
//! which always gives 22 characters instead of the 36 of the hyphenated form.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use uuid::Uuid;

/// Length of every slug produced by [`uuid_to_slug`].
pub const SLUG_LENGTH: usize = 22;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("expected {SLUG_LENGTH} characters, got {0}")]
    InvalidLength(usize),

    #[error("not a valid slug: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

pub fn uuid_to_slug(uuid: &Uuid) -> String {
    URL_SAFE_NO_PAD.encode(uuid.as_bytes())
}

/// Decodes a slug made by [`uuid_to_slug`].
///
/// Fails on anything that [`uuid_to_slug`] could not have produced, so a
/// decoded UUID always encodes back to the very same slug.
pub fn slug_to_uuid(slug: &str) -> Result<Uuid, SlugError> {
    if slug.len() != SLUG_LENGTH {
        return Err(SlugError::InvalidLength(slug.len()));
    }

    let bytes: [u8; 16] = URL_SAFE_NO_PAD
        .decode(slug)?
        .try_into()
        .map_err(|_| SlugError::InvalidLength(slug.len()))?;

    Ok(Uuid::from_bytes(bytes))
}
