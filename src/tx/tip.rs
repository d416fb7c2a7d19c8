//! Tip request model and `tip(...)` calldata encoding

use crate::chain::ContractCall;
use crate::recipients::Recipient;

use alloy_sol_types::{sol, SolCall};
use ethers::types::{Address, Bytes, U256};
use serde::Deserialize;

sol! {
    struct TokenDescriptor {
        uint32 tokenType;
        address tokenAddress;
    }

    struct RecipientDescriptor {
        string idSource;
        string id;
        uint256 amount;
        uint256[] nftIds;
    }

    function tip(TokenDescriptor token, RecipientDescriptor recipient) payable;
}

/// Token kind understood by the tip contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Native,
    #[default]
    Erc20,
}

impl TokenType {
    pub fn as_u32(&self) -> u32 {
        match self {
            TokenType::Native => 0,
            TokenType::Erc20 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub token_address: Address,
}

/// One tip, built fresh for every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRequest {
    pub token: Token,
    pub recipient: Recipient,
    pub amount: U256,
    pub nft_ids: Vec<U256>,
}

impl TipRequest {
    pub fn new(token: Token, recipient: Recipient, amount: U256) -> Self {
        Self {
            token,
            recipient,
            amount,
            nft_ids: Vec::new(),
        }
    }

    /// ABI-encoded `tip(token, recipient)` call
    pub fn calldata(&self) -> Bytes {
        let call = tipCall {
            token: TokenDescriptor {
                tokenType: self.token.token_type.as_u32(),
                tokenAddress: to_alloy_address(self.token.token_address),
            },
            recipient: RecipientDescriptor {
                idSource: self.recipient.id_source.clone(),
                id: self.recipient.id.clone(),
                amount: to_alloy_u256(self.amount),
                nftIds: self.nft_ids.iter().copied().map(to_alloy_u256).collect(),
            },
        };

        Bytes::from(call.abi_encode())
    }

    /// The payable contract call carrying `amount` as native value
    pub fn to_call(&self, contract: Address) -> ContractCall {
        ContractCall {
            to: contract,
            value: self.amount,
            data: self.calldata(),
        }
    }
}

#[cfg(test)]
impl TipRequest {
    /// Recipient handle carried by encoded `tip(...)` calldata
    pub(crate) fn decode_recipient_id(data: &[u8]) -> String {
        tipCall::abi_decode(data, true)
            .map(|call| call.recipient.id)
            .unwrap_or_default()
    }
}

fn to_alloy_address(address: Address) -> alloy_primitives::Address {
    alloy_primitives::Address::from(address.0)
}

fn to_alloy_u256(value: U256) -> alloy_primitives::U256 {
    alloy_primitives::U256::from_limbs(value.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TipRequest {
        TipRequest::new(
            Token {
                token_type: TokenType::Erc20,
                token_address: Address::zero(),
            },
            Recipient::new("x", "alice"),
            U256::from(1_000_000_000_000_000u64),
        )
    }

    #[test]
    fn test_selector_matches_signature() {
        assert_eq!(
            tipCall::SIGNATURE,
            "tip((uint32,address),(string,string,uint256,uint256[]))"
        );
        let data = request().calldata();
        assert_eq!(&data[..4], &tipCall::SELECTOR[..]);
    }

    #[test]
    fn test_calldata_carries_fields() {
        let data = request().calldata();
        let decoded = tipCall::abi_decode(&data, true).unwrap();

        assert_eq!(decoded.token.tokenType, 1);
        assert_eq!(decoded.token.tokenAddress, alloy_primitives::Address::ZERO);
        assert_eq!(decoded.recipient.idSource, "x");
        assert_eq!(decoded.recipient.id, "alice");
        assert_eq!(
            decoded.recipient.amount,
            alloy_primitives::U256::from(1_000_000_000_000_000u64)
        );
        assert!(decoded.recipient.nftIds.is_empty());
    }

    #[test]
    fn test_call_value_equals_amount() {
        let contract = Address::repeat_byte(0xd1);
        let call = request().to_call(contract);
        assert_eq!(call.to, contract);
        assert_eq!(call.value, U256::from(1_000_000_000_000_000u64));
        assert_eq!(call.data, request().calldata());
    }

    #[test]
    fn test_u256_conversion_keeps_high_limbs() {
        let big = U256::MAX - U256::from(5u64);
        let converted = to_alloy_u256(big);
        assert_eq!(converted, alloy_primitives::U256::MAX - alloy_primitives::U256::from(5u64));
    }
}
