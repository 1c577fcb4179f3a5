//! Marketplace GraphQL client.

use super::http::WireNumber;
use super::queries::{GET_MY_PROFILE, GET_PACKS, SEARCH_ACTIVITY, SEARCH_MINTED_MOMENTS};
use super::{DataSourceError, JsonHttp, MarketplaceSource, Profile, RequestScheduler};
use crate::domain::{
    parse_instant, ActivityType, ExternalActivity, FeedStatus, MomentDetails, MomentId, PackRef,
    Subject, UserId,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MARKETPLACE_URL: &str = "https://api.nba.dapperlabs.com/marketplace/graphql";

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> Result<T, DataSourceError> {
        if let Some(first) = self.errors.as_ref().and_then(|e| e.first()) {
            return Err(DataSourceError::GraphQl(first.message.clone()));
        }
        self.data
            .ok_or_else(|| DataSourceError::ParseError("Missing data field".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    right_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchActivityData {
    #[serde(rename = "SearchActivity")]
    search_activity: SearchActivityResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchActivityResult {
    search_summary: ActivitySummary,
}

#[derive(Debug, Deserialize)]
struct ActivitySummary {
    pagination: Option<Pagination>,
    data: ActivityPage,
}

#[derive(Debug, Deserialize)]
struct ActivityPage {
    #[serde(default)]
    data: Vec<WireActivity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireActivity {
    id: String,
    activity_type: String,
    status: String,
    created_at: String,
    updated_at: String,
    #[serde(default)]
    subject: WireSubject,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSubject {
    offer: Option<WireOffer>,
    order: Option<WireOrder>,
    transfer: Option<WireTransfer>,
    trade_in: Option<WireTradeIn>,
}

#[derive(Debug, Deserialize)]
struct WireOffer {
    id: String,
    price: WireNumber,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    purchased: bool,
    moment: WireMoment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrder {
    id: String,
    price: Option<WireNumber>,
    quantity: Option<u32>,
    pack_listing: Option<WirePackListing>,
    packs: Option<Vec<WirePack>>,
    moment: Option<WireMoment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePackListing {
    title: Option<String>,
    price_v2: Option<WireMoney>,
}

#[derive(Debug, Deserialize)]
struct WireMoney {
    value: WireNumber,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePack {
    id: String,
    #[serde(default)]
    moment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireTransfer {
    id: String,
    #[serde(rename = "senderDapperID")]
    sender: Option<String>,
    #[serde(rename = "receiverDapperID")]
    receiver: Option<String>,
    moment: WireMoment,
}

#[derive(Debug, Deserialize)]
struct WireTradeIn {
    id: String,
    moment: Option<WireMoment>,
    #[serde(rename = "momentIDs", default)]
    moment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMoment {
    id: String,
    tier: Option<String>,
    flow_serial_number: Option<WireNumber>,
    play: WirePlay,
    set: WireSet,
}

#[derive(Debug, Deserialize)]
struct WirePlay {
    id: String,
    stats: WireStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStats {
    player_name: String,
    play_category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSet {
    id: String,
    set_visual_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetPacksData {
    #[serde(rename = "getPacks")]
    get_packs: GetPacksResult,
}

#[derive(Debug, Deserialize)]
struct GetPacksResult {
    packs: PackPage,
}

#[derive(Debug, Deserialize)]
struct PackPage {
    #[serde(default)]
    data: Vec<WirePack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchMomentsData {
    search_minted_moments: SearchMomentsResult,
}

#[derive(Debug, Deserialize)]
struct SearchMomentsResult {
    data: SearchMomentsInner,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchMomentsInner {
    search_summary: MomentSummary,
}

#[derive(Debug, Deserialize)]
struct MomentSummary {
    data: MomentPage,
}

#[derive(Debug, Deserialize)]
struct MomentPage {
    #[serde(default)]
    data: Vec<WireMoment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    get_my_profile: ProfileResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResult {
    public_info: PublicInfo,
}

#[derive(Debug, Deserialize)]
struct PublicInfo {
    #[serde(rename = "dapperID")]
    dapper_id: String,
    #[serde(rename = "flowAddress")]
    flow_address: String,
}

fn decode_moment(wire: WireMoment) -> MomentDetails {
    MomentDetails {
        id: MomentId::new(wire.id),
        play_id: wire.play.id,
        player_name: wire.play.stats.player_name,
        play_category: wire.play.stats.play_category,
        set_id: wire.set.id,
        set_visual_id: wire.set.set_visual_id,
        serial_number: wire.flow_serial_number.and_then(|n| n.to_u64()),
        tier: wire.tier,
    }
}

fn missing(activity_type: ActivityType, id: &str, field: &str) -> DataSourceError {
    DataSourceError::ParseError(format!(
        "{} activity {} has no {} payload",
        activity_type, id, field
    ))
}

/// Decode one activity into the domain sum type.
pub(crate) fn decode_activity(wire: WireActivity) -> Result<ExternalActivity, DataSourceError> {
    let activity_type = ActivityType::parse(&wire.activity_type).ok_or_else(|| {
        DataSourceError::ParseError(format!("Unknown activity type: {}", wire.activity_type))
    })?;
    let created_at = parse_instant(&wire.created_at)
        .ok_or_else(|| DataSourceError::ParseError(format!("Invalid createdAt: {}", wire.created_at)))?;
    let updated_at = parse_instant(&wire.updated_at).unwrap_or(created_at);
    let status = if wire.status == "SUCCESS" {
        FeedStatus::Success
    } else {
        FeedStatus::Other
    };

    let id = wire.id;
    let subject = wire.subject;
    let subject = match activity_type {
        ActivityType::OfferAvailable | ActivityType::OfferCompleted => {
            let offer = subject.offer.ok_or_else(|| missing(activity_type, &id, "offer"))?;
            Subject::Offer {
                id: offer.id,
                price: offer.price.to_decimal()?,
                completed: offer.completed,
                purchased: offer.purchased,
                moment: decode_moment(offer.moment),
            }
        }
        ActivityType::PurchasePack | ActivityType::PurchasePackWithTickets => {
            let order = subject.order.ok_or_else(|| missing(activity_type, &id, "order"))?;
            let listing = order.pack_listing;
            let listing_price = match listing.as_ref().and_then(|l| l.price_v2.as_ref()) {
                Some(money) => Some(money.value.to_decimal()?),
                None => None,
            };
            let price = match &order.price {
                Some(p) => p.to_decimal()?,
                None => listing_price.unwrap_or_default(),
            };
            Subject::PackOrder {
                id: order.id,
                price,
                quantity: order.quantity,
                listing_title: listing
                    .and_then(|l| l.title)
                    .unwrap_or_else(|| "Pack".to_string()),
                listing_price,
                packs: order
                    .packs
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PackRef {
                        id: p.id,
                        moment_ids: p.moment_ids.into_iter().map(MomentId::new).collect(),
                    })
                    .collect(),
            }
        }
        ActivityType::PurchaseVendorMoment
        | ActivityType::PurchaseP2pMoment
        | ActivityType::P2pMomentListingSold => {
            let order = subject.order.ok_or_else(|| missing(activity_type, &id, "order"))?;
            let moment = order.moment.ok_or_else(|| missing(activity_type, &id, "moment"))?;
            let price = order.price.ok_or_else(|| missing(activity_type, &id, "price"))?;
            Subject::Order {
                id: order.id,
                price: price.to_decimal()?,
                moment: decode_moment(moment),
            }
        }
        ActivityType::MomentTransferReceived | ActivityType::MomentTransferRequest => {
            let transfer = subject
                .transfer
                .ok_or_else(|| missing(activity_type, &id, "transfer"))?;
            let counterparty = if activity_type == ActivityType::MomentTransferReceived {
                transfer.sender
            } else {
                transfer.receiver
            };
            Subject::Transfer {
                id: transfer.id,
                counterparty: counterparty.map(UserId::new),
                moment: decode_moment(transfer.moment),
            }
        }
        ActivityType::MomentTradeInRequest => {
            let trade_in = subject
                .trade_in
                .ok_or_else(|| missing(activity_type, &id, "tradeIn"))?;
            let moment = trade_in
                .moment
                .ok_or_else(|| missing(activity_type, &id, "moment"))?;
            Subject::TradeIn {
                id: trade_in.id,
                moment: decode_moment(moment),
            }
        }
        ActivityType::MomentsTradeInRequest => {
            let trade_in = subject
                .trade_in
                .ok_or_else(|| missing(activity_type, &id, "tradeIn"))?;
            Subject::TradeInBatch {
                id: trade_in.id,
                moment_ids: trade_in.moment_ids.into_iter().map(MomentId::new).collect(),
            }
        }
    };

    Ok(ExternalActivity {
        id,
        activity_type,
        status,
        created_at,
        updated_at,
        subject,
    })
}

/// Marketplace data source backed by the public GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    http: JsonHttp,
    url: String,
    token: String,
    page_size: u32,
    scheduler: Arc<RequestScheduler>,
}

impl MarketplaceClient {
    pub fn new(url: String, token: String, scheduler: Arc<RequestScheduler>) -> Self {
        Self {
            http: JsonHttp::new(),
            url,
            token,
            page_size: 1000,
            scheduler,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
        authenticated: bool,
    ) -> Result<T, DataSourceError> {
        let body = serde_json::json!({ "query": document, "variables": variables });
        let response: GraphQlResponse<T> = self
            .scheduler
            .run(|| {
                self.http.send(|client| {
                    let request = client
                        .post(&self.url)
                        .header("Accept", "application/json")
                        .json(&body);
                    if authenticated {
                        request.header("x-id-token", &self.token)
                    } else {
                        request
                    }
                })
            })
            .await?;
        response.into_data()
    }
}

#[async_trait]
impl MarketplaceSource for MarketplaceClient {
    async fn fetch_activity(&self) -> Result<Vec<ExternalActivity>, DataSourceError> {
        let types: Vec<&str> = ActivityType::ALL.iter().map(|t| t.as_str()).collect();
        let mut cursor = String::new();
        let mut activities = Vec::new();

        loop {
            let variables = serde_json::json!({
                "byType": types,
                "sortBy": "CREATED_AT_DESC",
                "searchInput": {
                    "pagination": { "cursor": cursor, "direction": "RIGHT", "limit": self.page_size }
                }
            });
            let data: SearchActivityData = self.query(SEARCH_ACTIVITY, variables, true).await?;
            let summary = data.search_activity.search_summary;
            let page_len = summary.data.data.len();
            debug!("Fetched activity page of {} (cursor={:?})", page_len, cursor);

            for wire in summary.data.data {
                match decode_activity(wire) {
                    Ok(activity) => activities.push(activity),
                    Err(e) => warn!("Skipping activity: {}", e),
                }
            }

            let next = summary
                .pagination
                .and_then(|p| p.right_cursor)
                .filter(|c| !c.is_empty() && *c != cursor);
            match next {
                Some(next) if page_len as u32 >= self.page_size => cursor = next,
                _ => break,
            }
        }

        Ok(activities)
    }

    async fn fetch_pack_moments(&self, pack_ids: &[String]) -> Result<Vec<PackRef>, DataSourceError> {
        if pack_ids.is_empty() {
            return Ok(Vec::new());
        }
        let variables = serde_json::json!({ "input": { "packIDs": pack_ids } });
        let data: GetPacksData = self.query(GET_PACKS, variables, true).await?;
        Ok(data
            .get_packs
            .packs
            .data
            .into_iter()
            .map(|p| PackRef {
                id: p.id,
                moment_ids: p.moment_ids.into_iter().map(MomentId::new).collect(),
            })
            .collect())
    }

    async fn find_moment_by_token(
        &self,
        token_id: &str,
    ) -> Result<Option<MomentDetails>, DataSourceError> {
        let variables = serde_json::json!({
            "byFlowID": [token_id],
            "searchInput": { "pagination": { "cursor": "", "direction": "RIGHT", "limit": 1 } }
        });
        let data: SearchMomentsData = self.query(SEARCH_MINTED_MOMENTS, variables, false).await?;
        Ok(data
            .search_minted_moments
            .data
            .search_summary
            .data
            .data
            .into_iter()
            .next()
            .map(decode_moment))
    }

    async fn fetch_profile(&self) -> Result<Profile, DataSourceError> {
        let data: ProfileData = self
            .query(GET_MY_PROFILE, serde_json::json!({}), true)
            .await?;
        let info = data.get_my_profile.public_info;
        Ok(Profile {
            dapper_id: UserId::new(info.dapper_id),
            flow_address: info.flow_address,
        })
    }
}
