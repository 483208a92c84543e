use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Panel account tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Simple,
    Master,
    Franchise,
}

impl Role {
    /// Admin and franchise accounts never spend credits.
    pub fn has_unlimited_credits(self) -> bool {
        matches!(self, Role::Admin | Role::Franchise)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Simple => write!(f, "simple"),
            Role::Master => write!(f, "master"),
            Role::Franchise => write!(f, "franchise"),
        }
    }
}

/// Credit balance. Explicit variant instead of a float-infinity sentinel so
/// unlimited accounts never hit numeric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credits {
    Unlimited,
    Limited(u32),
}

impl Credits {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Credits::Unlimited)
    }

    /// Whether a debit of `cost` is affordable.
    pub fn covers(self, cost: u32) -> bool {
        match self {
            Credits::Unlimited => true,
            Credits::Limited(balance) => balance >= cost,
        }
    }

    /// Debit `cost`, clamping at zero. Unlimited balances are unchanged.
    pub fn debit(self, cost: u32) -> Self {
        match self {
            Credits::Unlimited => Credits::Unlimited,
            Credits::Limited(balance) => Credits::Limited(balance.saturating_sub(cost)),
        }
    }

    pub fn display(self) -> String {
        match self {
            Credits::Unlimited => "Infinitos".to_string(),
            Credits::Limited(balance) => balance.to_string(),
        }
    }
}

impl Default for Credits {
    fn default() -> Self {
        Credits::Limited(0)
    }
}

/// Panel-side account: the root admin(s) or a reseller. Stored keyed by
/// identifier, which doubles as the login username.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub credits: Credits,
    #[serde(default)]
    pub email: String,
    /// Client ids this account directly created.
    #[serde(default)]
    pub owned_clients: Vec<String>,
    /// Reseller identifiers this account directly created.
    #[serde(default)]
    pub sub_resellers: Vec<String>,
    /// Creator identifier; None for the bootstrap root.
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Client lifecycle. `Expired` is terminal: re-activation means re-creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Blocked,
    Expired,
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientStatus::Active => write!(f, "active"),
            ClientStatus::Blocked => write!(f, "blocked"),
            ClientStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Leaf account addressed by name+password on the playback endpoints.
/// Keyed by an opaque uuid, stable for the record's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    pub password: String,
    /// Max simultaneous streams. Static field, never checked against a live
    /// connection counter.
    pub connections: u32,
    pub expiry_date: NaiveDate,
    pub status: ClientStatus,
    pub owner: String,
}

impl Client {
    /// Access expires at midnight of `expiry_date`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.naive_utc() > self.expiry_date.and_time(NaiveTime::MIN)
    }

    /// Expiry as a UNIX timestamp, as the player API reports it.
    pub fn expiry_timestamp(&self) -> i64 {
        self.expiry_date.and_time(NaiveTime::MIN).and_utc().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debit_clamps_at_zero() {
        assert_eq!(Credits::Limited(5).debit(8), Credits::Limited(0));
        assert_eq!(Credits::Limited(8).debit(5), Credits::Limited(3));
        assert_eq!(Credits::Unlimited.debit(1000), Credits::Unlimited);
    }

    #[test]
    fn covers_checks_balance() {
        assert!(Credits::Limited(5).covers(5));
        assert!(!Credits::Limited(4).covers(5));
        assert!(Credits::Unlimited.covers(u32::MAX));
    }

    #[test]
    fn expiry_is_midnight_of_expiry_date() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let client = Client {
            name: "c".into(),
            password: "p".into(),
            connections: 1,
            expiry_date: (now + Duration::days(30)).date_naive(),
            status: ClientStatus::Active,
            owner: "admin".into(),
        };
        assert!(!client.is_expired_at(now));
        assert!(client.is_expired_at(now + Duration::days(31)));
        // On the expiry date itself, any time past midnight is expired.
        assert!(client.is_expired_at(now + Duration::days(30)));
    }
}
