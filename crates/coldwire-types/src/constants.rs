//! Wire-exact constants shared by every component.
//!
//! Values come straight from the protocol the relay implements; changing any of them
//! changes the wire format, so they live in one place rather than being re-derived.

pub const ML_KEM_1024_SK_LEN: usize = 3168;
pub const ML_KEM_1024_PK_LEN: usize = 1568;
pub const ML_KEM_1024_CT_LEN: usize = 1568;

pub const ML_DSA_87_SK_LEN: usize = 4896;
pub const ML_DSA_87_PK_LEN: usize = 2592;
pub const ML_DSA_87_SIGN_LEN: usize = 4627;

pub const CHALLENGE_LEN: usize = 64;
pub const ACK_ID_LEN: usize = 32;

pub const JWT_SECRET_LEN: usize = 256;

pub const LONGPOLL_MAX_SECS: u64 = 30;
pub const LONGPOLL_TICK_SECS: u64 = 1;

pub const COLDWIRE_DATA_SEP: u8 = 0x00;
pub const COLDWIRE_LEN_OFFSET: usize = 3;

pub const MAX_MULTIPART_MEMORY: usize = 3 * 1024 * 1024;

pub const USER_ID_LEN: usize = 16;

/// How long an unverified challenge survives before the background sweep reclaims it.
pub const CHALLENGE_TTL_SECS: i64 = 5 * 60;

/// Lifetime of a minted bearer token.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Min/max length of a federation-qualified recipient (`local-part@peer-url`). The range is
/// exclusive on the low end: 17 or fewer bytes is rejected, 270 or fewer is accepted.
pub const FEDERATED_RECIPIENT_MIN_LEN: usize = 17;
pub const FEDERATED_RECIPIENT_MAX_LEN: usize = 270;
