use derive_more::Display;

/// A slow aggregate recomputed off the event path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RefreshJob {
    /// Rebuild the rich list snapshot.
    #[display("richlist")]
    RichList,
    /// Activity over the last 24 hours.
    #[display("24h-statistics")]
    Statistics24h,
    /// Per-day transaction counts.
    #[display("daily-transactions")]
    DailyTransactions,
    /// Block interval histogram.
    #[display("block-interval")]
    BlockIntervals,
    /// Cumulative address count per day.
    #[display("address-growth")]
    AddressGrowth,
    /// QRC20 holder and transfer counts.
    #[display("qrc20-statistics")]
    TokenStatistics,
    /// QRC721 holder and transfer counts.
    #[display("qrc721-statistics")]
    Qrc721Statistics,
    /// Timestamp of the newest block.
    #[display("blocktime")]
    BlockTime,
    /// Difficulty of the newest block.
    #[display("difficulty")]
    Difficulty,
    /// Network stake weight.
    #[display("stakeweight")]
    StakeWeight,
    /// Number of non-contract addresses.
    #[display("addresses")]
    AddressCount,
    /// Recent and latest transaction lists, pushed to the transaction list room.
    #[display("transaction-lists")]
    TransactionLists,
}

impl RefreshJob {
    /// Jobs run by the periodic schedule whenever the tip changed.
    pub const SCHEDULED: [Self; 6] = [
        Self::RichList,
        Self::TokenStatistics,
        Self::Qrc721Statistics,
        Self::DailyTransactions,
        Self::BlockIntervals,
        Self::AddressGrowth,
    ];

    /// Jobs run for every new block, and once when the first tip is known.
    pub const PER_BLOCK: [Self; 6] = [
        Self::BlockTime,
        Self::Difficulty,
        Self::StakeWeight,
        Self::AddressCount,
        Self::TransactionLists,
        Self::Statistics24h,
    ];

    /// Jobs run when the tip advances without a block.
    pub const PER_TIP: [Self; 1] = [Self::TransactionLists];

    /// Key of the job's result in the [`MetricCache`](super::MetricCache).
    pub const fn metric_name(&self) -> &'static str {
        match self {
            Self::RichList => "richlist",
            Self::Statistics24h => "24h-statistics",
            Self::DailyTransactions => "daily-transactions",
            Self::BlockIntervals => "block-interval",
            Self::AddressGrowth => "address-growth",
            Self::TokenStatistics => "qrc20-statistics",
            Self::Qrc721Statistics => "qrc721-statistics",
            Self::BlockTime => "blocktime",
            Self::Difficulty => "difficulty",
            Self::StakeWeight => "stakeweight",
            Self::AddressCount => "addresses",
            Self::TransactionLists => "transaction-lists",
        }
    }
}
