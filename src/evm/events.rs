//! ABI bindings for the L1 standard bridge events and the ERC-20 calls the
//! rebate service needs. Only the pieces that are actually decoded are declared.

use alloy_primitives::{Address, B256};
use alloy_sol_types::{sol, SolEvent};

use super::types::LogEntry;

sol! {
    /// Emitted by the Metis L1 standard bridge for ERC-20 deposits.
    #[derive(Debug, PartialEq, Eq)]
    event ERC20DepositInitiated(
        address indexed _l1Token,
        address indexed _l2Token,
        address indexed _from,
        address _to,
        uint256 _amount,
        bytes _data,
        uint256 chainId
    );

    /// Emitted by the Metis L1 standard bridge for native-currency deposits.
    #[derive(Debug, PartialEq, Eq)]
    event ETHDepositInitiated(
        address indexed _from,
        address indexed _to,
        uint256 _amount,
        bytes _data,
        uint256 chainId
    );

    function decimals() external view returns (uint8);
}

/// The two deposit event shapes the synchronizer follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DepositEventKind {
    Erc20,
    Native,
}

impl DepositEventKind {
    pub(crate) const ALL: [DepositEventKind; 2] = [DepositEventKind::Erc20, DepositEventKind::Native];

    /// Topic-0 selector of the event
    pub(crate) fn topic0(self) -> B256 {
        match self {
            DepositEventKind::Erc20 => ERC20DepositInitiated::SIGNATURE_HASH,
            DepositEventKind::Native => ETHDepositInitiated::SIGNATURE_HASH,
        }
    }

    pub(crate) fn from_topic0(topic0: &B256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic0() == *topic0)
    }
}

/// Uniform view over both deposit events
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodedDeposit {
    Erc20(ERC20DepositInitiated),
    Native(ETHDepositInitiated),
}

impl DecodedDeposit {
    /// Decodes a bridge log by its topic-0 selector.
    pub(crate) fn decode(log: &LogEntry) -> Result<Self, alloy_sol_types::Error> {
        let topics = log.topics.iter().copied();
        match log.topics.first().and_then(DepositEventKind::from_topic0) {
            Some(DepositEventKind::Erc20) => {
                ERC20DepositInitiated::decode_raw_log(topics, &log.data, true).map(Self::Erc20)
            }
            Some(DepositEventKind::Native) => {
                ETHDepositInitiated::decode_raw_log(topics, &log.data, true).map(Self::Native)
            }
            None => Err(alloy_sol_types::Error::custom("not a deposit event")),
        }
    }

    pub(crate) fn from(&self) -> Address {
        match self {
            DecodedDeposit::Erc20(event) => event._from,
            DecodedDeposit::Native(event) => event._from,
        }
    }

    pub(crate) fn to(&self) -> Address {
        match self {
            DecodedDeposit::Erc20(event) => event._to,
            DecodedDeposit::Native(event) => event._to,
        }
    }
}
