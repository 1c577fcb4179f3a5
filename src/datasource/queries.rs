//! GraphQL documents sent to the marketplace. Only the fields decoded in
//! `marketplace.rs` are requested.

pub const SEARCH_ACTIVITY: &str = r#"query SearchActivity($byType: [ActivityType!], $sortBy: ActivitySortType, $searchInput: BaseSearchInput!) {
  SearchActivity(input: { filters: { byType: $byType }, sortBy: $sortBy, searchInput: $searchInput }) {
    searchSummary {
      pagination { rightCursor }
      data {
        ... on Activities {
          size
          data {
            ... on Activity {
              id
              activityType
              status
              createdAt
              updatedAt
              subject {
                ... on OfferAvailableActivity { offer { id price completed purchased moment { ...Moment } } }
                ... on OfferCompletedActivity { offer { id price completed purchased moment { ...Moment } } }
                ... on PurchasePackActivity {
                  order {
                    id
                    price
                    quantity
                    packListing { id title priceV2 { value currency } }
                    packs { id momentIds }
                  }
                }
                ... on P2PMomentListingSoldActivity { order { id price moment { ...Moment } } }
                ... on PurchaseP2PMomentActivity { order { id price moment { ...Moment } } }
                ... on PurchaseVendorMomentActivity { order { id price moment { ...Moment } } }
                ... on MomentTransferReceivedActivity { transfer { id senderDapperID moment { ...Moment } } }
                ... on MomentTransferRequestActivity { transfer { id receiverDapperID moment { ...Moment } } }
                ... on MomentTradeInRequestActivity { tradeIn { id moment { ...Moment } } }
                ... on MomentsTradeInRequestActivity { tradeIn { id momentIDs } }
              }
            }
          }
        }
      }
    }
  }
}

fragment Moment on MintedMoment {
  id
  tier
  flowSerialNumber
  play { id stats { playerName playCategory } }
  set { id setVisualId }
}"#;

pub const GET_PACKS: &str = r#"query GetPacks($input: GetPacksInput!) {
  getPacks(input: $input) {
    packs { data { id momentIds } }
  }
}"#;

pub const SEARCH_MINTED_MOMENTS: &str = r#"query SearchMintedMoments($byFlowID: [ID], $searchInput: BaseSearchInput!) {
  searchMintedMoments(input: { filters: { byFlowID: $byFlowID }, searchInput: $searchInput }) {
    data {
      searchSummary {
        data {
          ... on MintedMoments {
            data {
              id
              tier
              flowSerialNumber
              play { id stats { playerName playCategory } }
              set { id setVisualId }
            }
          }
        }
      }
    }
  }
}"#;

pub const GET_MY_PROFILE: &str = r#"query GetMyProfile {
  getMyProfile {
    publicInfo { dapperID flowAddress username }
  }
}"#;
