//! Log redaction for requester contact details
//!
//! Contact snapshots are personal data and must never appear in logs in
//! clear text. Handlers log a short digest instead, which still lets an
//! operator correlate repeated bookings by the same contact.

use sha2::{Digest, Sha256};

/// Stable, non-reversible digest of a contact field for log correlation
pub fn contact_digest(value: &str) -> String {
    let digest = Sha256::digest(value.trim().to_lowercase().as_bytes());
    // 12 hex chars are plenty for correlation and keep log lines short
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}
