//! VIP entitlement rules. Expiry is a plain wall-clock comparison; nothing
//! needs to run for an entitlement to lapse.

use crate::Account;
use chrono::{DateTime, Duration, Utc};

/// `vip_expires_at` is set and still in the future.
pub fn is_active(account: &Account, now: DateTime<Utc>) -> bool {
    account.vip_expires_at.is_some_and(|expires| now < expires)
}

/// Expiry of a grant of `duration_days` made at `now`.
pub fn expiry_after(now: DateTime<Utc>, duration_days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(duration_days))
}

/// Time left on an active entitlement.
pub fn remaining(account: &Account, now: DateTime<Utc>) -> Option<Duration> {
    account
        .vip_expires_at
        .filter(|expires| now < *expires)
        .map(|expires| expires - now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_exclusive() {
        let now = Utc::now();
        let mut acct = Account::new("vip", 0, now);
        assert!(!is_active(&acct, now));

        acct.vip_expires_at = Some(expiry_after(now, 30));
        assert!(is_active(&acct, now));
        assert_eq!(remaining(&acct, now), Some(Duration::days(30)));

        let expires = acct.vip_expires_at.unwrap();
        assert!(!is_active(&acct, expires));
        assert!(remaining(&acct, expires).is_none());
    }
}
