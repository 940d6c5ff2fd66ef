//! XOR masking (RFC 6455 section 5.3).

/// Mask or unmask `payload` in place; applying the same key twice restores it.
///
/// # Examples
///
/// ```
/// use wsframe::frame::apply_mask;
///
/// let key = [1, 2, 3, 4];
/// let mut data = b"hello".to_vec();
/// apply_mask(&mut data, key);
/// assert_ne!(data, b"hello");
/// apply_mask(&mut data, key);
/// assert_eq!(data, b"hello");
/// ```
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (byte, k) in payload.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}

/// Fresh masking key for a client-to-server frame.
#[must_use]
pub fn random_mask_key() -> [u8; 4] { rand::random() }
