use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};

/// Derive a stable 20 character base62 id from an arbitrary key.
pub fn generate_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();

    // First 128 bits of the digest, shifted down to 119 bits so that
    // 20 base62 digits always cover the value.
    let mut num = [0u8; 16];
    num.copy_from_slice(&hash[..16]);
    let mut value = u128::from_be_bytes(num);
    value >>= 9;

    let mut id = String::with_capacity(20);
    for _ in 0..20 {
        let remainder = (value % 62) as u8;
        value /= 62;

        let c = if remainder < 10 {
            (remainder + b'0') as char
        } else if remainder < 36 {
            (remainder - 10 + b'A') as char
        } else {
            (remainder - 36 + b'a') as char
        };
        id.push(c);
    }

    id
}

/// Id for a movie submitted without one: the same title released in the
/// same year always maps to the same id, which is how duplicates are caught.
pub fn movie_id(name: &str, release_date: Option<NaiveDate>) -> String {
    let key = match release_date {
        Some(date) => format!("{} ({})", name.trim().to_lowercase(), date.year()),
        None => name.trim().to_lowercase(),
    };
    generate_id(&key)
}
