use sha2::{Digest, Sha256};

/// SHA-256 of the raw document text, lower-case hex. Stamped into every artifact so
/// two runs over the same input carry the same header.
pub fn hash_spec_source(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    to_hex_lower(&hasher.finalize())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
