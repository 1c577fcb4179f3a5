//! Secondary sales tracker client.
//!
//! The tracker indexes on-chain sales by flow address. Results are paged;
//! `hasNextPage`/`nextPage` drive the loop.

use super::http::WireNumber;
use super::{DataSourceError, JsonHttp, RequestScheduler, TrackerSource};
use crate::domain::{parse_instant, Party, SecondaryActivity, SecondaryMoment, UserId};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TRACKER_URL: &str = "https://api.momentranks.com/v1/topshot/transactions";

/// Upper bound on pages fetched for one address.
const MAX_PAGES: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsPage {
    #[serde(default)]
    docs: Vec<WireTransaction>,
    #[serde(default)]
    has_next_page: bool,
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    buyer: Option<WireParty>,
    seller: Option<WireParty>,
    serial_number: WireNumber,
    price: WireNumber,
    block_timestamp: String,
    token_id: Option<WireNumber>,
    tx_hash: Option<String>,
    moment: Option<WireTrackedMoment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParty {
    dapper_id: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrackedMoment {
    player_name: Option<String>,
    play_category: Option<String>,
    set_visual_id: Option<String>,
    play_dapper_id: Option<String>,
    set_dapper_id: Option<String>,
    team: Option<String>,
}

fn decode_party(wire: Option<WireParty>) -> Option<Party> {
    let wire = wire?;
    Some(Party {
        dapper_id: UserId::new(wire.dapper_id?),
        username: wire.username,
    })
}

fn decode_transaction(wire: WireTransaction) -> Result<SecondaryActivity, DataSourceError> {
    let serial_number = wire
        .serial_number
        .to_u64()
        .ok_or_else(|| DataSourceError::ParseError("Invalid serialNumber".to_string()))?;
    let block_timestamp = parse_instant(&wire.block_timestamp).ok_or_else(|| {
        DataSourceError::ParseError(format!("Invalid blockTimestamp: {}", wire.block_timestamp))
    })?;
    let token_id = wire.token_id.map(|t| match t {
        WireNumber::Text(s) => s,
        WireNumber::Number(n) => n.to_string(),
    });
    let moment = wire.moment.map(|m| SecondaryMoment {
        player_name: m.player_name.unwrap_or_default(),
        play_category: m.play_category.unwrap_or_default(),
        set_visual_id: m.set_visual_id,
        play_id: m.play_dapper_id,
        set_id: m.set_dapper_id,
        team: m.team,
    });

    Ok(SecondaryActivity::new(
        decode_party(wire.buyer),
        decode_party(wire.seller),
        serial_number,
        wire.price.to_decimal()?,
        block_timestamp,
        token_id,
        wire.tx_hash,
        moment,
    ))
}

#[derive(Debug, Clone)]
pub struct TrackerClient {
    http: JsonHttp,
    url: String,
    scheduler: Arc<RequestScheduler>,
}

impl TrackerClient {
    pub fn new(url: String, scheduler: Arc<RequestScheduler>) -> Self {
        Self {
            http: JsonHttp::new(),
            url,
            scheduler,
        }
    }

    async fn fetch_page(
        &self,
        flow_address: &str,
        page: u32,
    ) -> Result<TransactionsPage, DataSourceError> {
        let address = flow_address.trim_start_matches("0x");
        let seller = format!("0x{}", address);
        let page = page.to_string();
        self.scheduler
            .run(|| {
                self.http.send(|client| {
                    client.get(&self.url).query(&[
                        ("buyer", address),
                        ("page", page.as_str()),
                        ("seller", seller.as_str()),
                        ("sortBy", "-blockTimestamp"),
                    ])
                })
            })
            .await
    }
}

#[async_trait]
impl TrackerSource for TrackerClient {
    async fn fetch_transactions(
        &self,
        flow_address: &str,
    ) -> Result<Vec<SecondaryActivity>, DataSourceError> {
        let mut sales = Vec::new();
        let mut page = 1;

        for _ in 0..MAX_PAGES {
            let response = self.fetch_page(flow_address, page).await?;
            debug!("Tracker page {}: {} transactions", page, response.docs.len());

            for wire in response.docs {
                match decode_transaction(wire) {
                    Ok(sale) => sales.push(sale),
                    Err(e) => warn!("Skipping tracker transaction: {}", e),
                }
            }

            match response.next_page {
                Some(next) if response.has_next_page && next > page => page = next,
                _ => return Ok(sales),
            }
        }

        warn!("Tracker paging stopped after {} pages", MAX_PAGES);
        Ok(sales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, Role};

    #[test]
    fn test_decode_transaction_page() {
        let page: TransactionsPage = serde_json::from_value(serde_json::json!({
            "docs": [{
                "buyer": { "dapperId": "me", "username": "collector" },
                "seller": { "dapperId": "them", "username": "seller" },
                "serialNumber": 812,
                "price": 14.25,
                "blockTimestamp": "2021-05-01T10:11:12.000Z",
                "tokenId": 123456,
                "moment": {
                    "playerName": "Ja Morant",
                    "playCategory": "Dunk",
                    "setVisualId": "SET_VISUAL_RARE",
                    "playDapperId": "play-9",
                    "setDapperId": "set-9",
                    "team": "Memphis Grizzlies"
                }
            }],
            "hasNextPage": false,
            "nextPage": null
        }))
        .unwrap();

        assert!(!page.has_next_page);
        let sale = decode_transaction(page.docs.into_iter().next().unwrap()).unwrap();
        assert_eq!(sale.serial_number, 812);
        assert_eq!(sale.price, Decimal::from_str_canonical("14.25").unwrap());
        assert_eq!(sale.token_id.as_deref(), Some("123456"));
        assert!(sale.has_role(Role::Buyer, &UserId::new("me".to_string())));
        assert!(sale.key.starts_with("hash:"));
        assert_eq!(sale.moment.unwrap().play_id.as_deref(), Some("play-9"));
    }

    #[test]
    fn test_party_without_id_is_dropped() {
        assert!(decode_party(Some(WireParty {
            dapper_id: None,
            username: Some("ghost".to_string()),
        }))
        .is_none());
    }

    #[test]
    fn test_tx_hash_becomes_key() {
        let sale = decode_transaction(WireTransaction {
            buyer: None,
            seller: None,
            serial_number: WireNumber::Text("5".to_string()),
            price: WireNumber::Text("3".to_string()),
            block_timestamp: "2021-05-01T10:11:12Z".to_string(),
            token_id: None,
            tx_hash: Some("0xABC".to_string()),
            moment: None,
        })
        .unwrap();
        assert_eq!(sale.key, "0xabc");
    }
}
