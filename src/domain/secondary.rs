//! Secondary activity tracker record (on-chain sales history).

use crate::domain::{iso_millis, Decimal, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Buyer or seller of a tracked sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub dapper_id: UserId,
    pub username: Option<String>,
}

/// Moment metadata the tracker attaches to a sale when it knows the edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryMoment {
    pub player_name: String,
    pub play_category: String,
    pub set_visual_id: Option<String>,
    pub play_id: Option<String>,
    pub set_id: Option<String>,
    pub team: Option<String>,
}

/// Which side of a sale the caller was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn other(&self) -> Role {
        match self {
            Role::Buyer => Role::Seller,
            Role::Seller => Role::Buyer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryActivity {
    /// Stable unique identifier for this sale.
    ///
    /// Priority: `tx_hash` (if present) > hash of deterministic fields.
    pub key: String,
    pub buyer: Option<Party>,
    pub seller: Option<Party>,
    pub serial_number: u64,
    pub price: Decimal,
    pub block_timestamp: DateTime<Utc>,
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub moment: Option<SecondaryMoment>,
}

impl SecondaryActivity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buyer: Option<Party>,
        seller: Option<Party>,
        serial_number: u64,
        price: Decimal,
        block_timestamp: DateTime<Utc>,
        token_id: Option<String>,
        tx_hash: Option<String>,
        moment: Option<SecondaryMoment>,
    ) -> Self {
        let tx_hash = tx_hash
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let key = Self::compute_key(
            &block_timestamp,
            serial_number,
            &price,
            token_id.as_deref(),
            tx_hash.as_deref(),
        );
        Self {
            key,
            buyer,
            seller,
            serial_number,
            price,
            block_timestamp,
            token_id,
            tx_hash,
            moment,
        }
    }

    pub fn compute_key(
        block_timestamp: &DateTime<Utc>,
        serial_number: u64,
        price: &Decimal,
        token_id: Option<&str>,
        tx_hash: Option<&str>,
    ) -> String {
        if let Some(tx) = tx_hash.filter(|s| !s.trim().is_empty()) {
            return tx.trim().to_lowercase();
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(iso_millis(block_timestamp).as_bytes());
        hasher.update(serial_number.to_le_bytes());
        hasher.update(price.to_canonical_string().as_bytes());
        if let Some(token) = token_id {
            hasher.update(token.as_bytes());
        }
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    pub fn party(&self, role: Role) -> Option<&Party> {
        match role {
            Role::Buyer => self.buyer.as_ref(),
            Role::Seller => self.seller.as_ref(),
        }
    }

    /// Whether `user` held `role` in this sale.
    pub fn has_role(&self, role: Role, user: &UserId) -> bool {
        self.party(role).map(|p| &p.dapper_id == user).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn party(id: &str) -> Party {
        Party {
            dapper_id: UserId::new(id.to_string()),
            username: Some(format!("user_{}", id)),
        }
    }

    #[test]
    fn key_prefers_tx_hash() {
        let sale = SecondaryActivity::new(
            Some(party("b")),
            Some(party("s")),
            7,
            Decimal::from_i64(12),
            Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap(),
            Some("1234".to_string()),
            Some(" 0xABC ".to_string()),
            None,
        );
        assert_eq!(sale.key, "0xabc");
    }

    #[test]
    fn key_falls_back_to_hash() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        let a = SecondaryActivity::new(None, None, 7, Decimal::from_i64(12), ts, None, None, None);
        let b = SecondaryActivity::new(None, None, 8, Decimal::from_i64(12), ts, None, None, None);
        assert!(a.key.starts_with("hash:"));
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn role_lookup() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        let sale = SecondaryActivity::new(
            Some(party("b")),
            Some(party("s")),
            7,
            Decimal::from_i64(12),
            ts,
            None,
            None,
            None,
        );
        assert!(sale.has_role(Role::Seller, &UserId::new("s".to_string())));
        assert!(!sale.has_role(Role::Buyer, &UserId::new("s".to_string())));
        assert_eq!(Role::Seller.other(), Role::Buyer);
    }
}
