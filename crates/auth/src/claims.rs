use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{Role, VerificationError};

/// Where a [`ClaimSet`] came from.
///
/// The two sources are never conflated: the gate refuses local-dev claims
/// whenever an identity provider is configured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    ExternalToken,
    LocalDevSession,
}

/// Verified identity of a caller.
///
/// Only the verifier constructs these; fields are private so a claim set
/// cannot be altered after verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimSet {
    subject: String,
    email: Option<String>,
    roles: BTreeSet<Role>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    source: ClaimSource,
}

impl ClaimSet {
    pub(crate) fn new(
        subject: String,
        email: Option<String>,
        roles: BTreeSet<Role>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        source: ClaimSource,
    ) -> Self {
        Self {
            subject,
            email,
            roles,
            issued_at,
            expires_at,
            source,
        }
    }

    /// Opaque unique identifier of the caller; the only identity used for
    /// ownership checks.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Display/contact address. Never consulted for authorization.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn source(&self) -> ClaimSource {
        self.source
    }
}

/// Validate the temporal window of a credential with a symmetric skew
/// tolerance.
///
/// `not_before` is the `nbf` claim, falling back to `iat` when the token has
/// none. The boundaries themselves are still valid: a token whose expiry is
/// exactly `now - skew` passes.
pub fn validate_time_window(
    not_before: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<(), VerificationError> {
    let earliest = now.checked_sub_signed(skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let latest = now.checked_add_signed(skew).unwrap_or(DateTime::<Utc>::MAX_UTC);

    if expires_at < earliest {
        return Err(VerificationError::Expired);
    }
    if let Some(nbf) = not_before {
        if nbf > latest {
            return Err(VerificationError::NotYetValid);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let skew = Duration::seconds(60);
        let now = at(10_000);

        assert_eq!(validate_time_window(None, at(9_940), now, skew), Ok(()));
        assert_eq!(
            validate_time_window(None, at(9_939), now, skew),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn skew_beyond_the_calendar_saturates() {
        let huge = Duration::try_days(100_000_000).unwrap();
        let now = at(10_000);
        assert_eq!(validate_time_window(Some(at(20_000)), at(1), now, huge), Ok(()));
    }

    #[test]
    fn zero_skew_rejects_anything_past_expiry() {
        let now = at(10_000);
        assert_eq!(validate_time_window(None, at(10_000), now, Duration::zero()), Ok(()));
        assert_eq!(
            validate_time_window(None, at(9_999), now, Duration::zero()),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn not_before_respects_skew() {
        let skew = Duration::seconds(60);
        let now = at(10_000);
        let exp = at(20_000);

        assert_eq!(validate_time_window(Some(at(10_060)), exp, now, skew), Ok(()));
        assert_eq!(
            validate_time_window(Some(at(10_061)), exp, now, skew),
            Err(VerificationError::NotYetValid)
        );
    }

    #[test]
    fn expiry_is_checked_before_not_before() {
        let now = at(10_000);
        let result = validate_time_window(Some(at(50_000)), at(1_000), now, Duration::zero());
        assert_eq!(result, Err(VerificationError::Expired));
    }
}
