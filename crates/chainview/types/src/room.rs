use crate::{BlockView, LatestTransactions, Statistics24h, Tip, TransactionView, TxId};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A named broadcast room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Every connection is a member.
    Global,
    /// Chain-wide statistics.
    Blockchain,
    /// New mempool transactions.
    Mempool,
    /// Recent and latest transaction lists.
    Transactions,
    /// Confirmation of one transaction.
    Transaction(TxId),
    /// Activity of one address.
    Address(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Blockchain => f.write_str("blockchain"),
            Self::Mempool => f.write_str("mempool"),
            Self::Transactions => f.write_str("transaction"),
            Self::Transaction(id) => write!(f, "transaction/{id}"),
            Self::Address(address) => write!(f, "address/{address}"),
        }
    }
}

/// Error returned when a room name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown room: {0}")]
pub struct RoomParseError(pub String);

impl FromStr for Room {
    type Err = RoomParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => return Ok(Self::Global),
            "blockchain" => return Ok(Self::Blockchain),
            "mempool" => return Ok(Self::Mempool),
            "transaction" => return Ok(Self::Transactions),
            _ => {}
        }
        if let Some(id) = s.strip_prefix("transaction/") {
            return B256::from_str(id)
                .map(Self::Transaction)
                .map_err(|_| RoomParseError(s.to_string()));
        }
        match s.strip_prefix("address/") {
            Some(address) if !address.is_empty() => Ok(Self::Address(address.to_string())),
            _ => Err(RoomParseError(s.to_string())),
        }
    }
}

/// A message pushed to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    /// The tip advanced.
    #[serde(rename = "tip")]
    Tip(Tip),
    /// A new canonical block.
    #[serde(rename = "block")]
    Block(BlockView),
    /// The chain reorganized to a new tip.
    #[serde(rename = "reorg")]
    Reorg(Tip),
    /// A watched transaction was confirmed.
    #[serde(rename = "transaction/confirm")]
    TransactionConfirm(TxId),
    /// A transaction touched a watched address.
    #[serde(rename = "address/transaction")]
    AddressTransaction {
        /// The address.
        address: String,
        /// The transaction.
        id: TxId,
    },
    /// A new mempool transaction.
    #[serde(rename = "mempool/transaction")]
    MempoolTransaction(Box<TransactionView>),
    /// Refreshed 24h statistics.
    #[serde(rename = "24h-statistics")]
    Statistics24h(Statistics24h),
    /// Timestamp of the newest block.
    #[serde(rename = "blocktime")]
    BlockTime(u64),
    /// Difficulty of the newest block.
    #[serde(rename = "difficulty")]
    Difficulty(f64),
    /// Estimated network stake weight.
    #[serde(rename = "stakeweight")]
    StakeWeight(f64),
    /// Number of non-contract addresses.
    #[serde(rename = "addresses")]
    AddressCount(u64),
    /// Newest confirmed non-reward transactions.
    #[serde(rename = "recent-transactions")]
    RecentTransactions(Vec<TransactionView>),
    /// Newest transactions, pending included.
    #[serde(rename = "latest-transactions")]
    LatestTransactions(LatestTransactions),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::global(Room::Global)]
    #[case::blockchain(Room::Blockchain)]
    #[case::mempool(Room::Mempool)]
    #[case::transaction_lists(Room::Transactions)]
    #[case::transaction(Room::Transaction(B256::repeat_byte(0xab)))]
    #[case::address(Room::Address("QXyz".to_string()))]
    fn test_room_names_parse_back(#[case] room: Room) {
        assert_eq!(room.to_string().parse::<Room>().unwrap(), room);
    }

    #[rstest]
    #[case("transaction/not-a-hash")]
    #[case("address/")]
    #[case("tips")]
    fn test_invalid_room_names(#[case] name: &str) {
        assert_eq!(name.parse::<Room>(), Err(RoomParseError(name.to_string())));
    }

    #[test]
    fn test_address_notification_shape() {
        let notification =
            Notification::AddressTransaction { address: "QXyz".to_string(), id: B256::ZERO };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["event"], "address/transaction");
        assert_eq!(json["data"]["address"], "QXyz");
    }

    #[test]
    fn test_transaction_list_room_is_distinct_from_single_transactions() {
        assert_eq!(Room::Transactions.to_string(), "transaction");
        assert_ne!("transaction".parse::<Room>().unwrap(), Room::Transaction(B256::ZERO));

        let json = serde_json::to_value(Notification::LatestTransactions(LatestTransactions {
            total_count: 3,
            transactions: Vec::new(),
        }))
        .unwrap();
        assert_eq!(json["event"], "latest-transactions");
        assert_eq!(json["data"]["totalCount"], 3);
    }
}
