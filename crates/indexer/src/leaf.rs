// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decoding of ABI-encoded payment leaves.
//!
//! A leaf is the parameter encoding of
//! `(address rewardProgramID, uint256 paymentCycle, uint256 validFrom, uint256 validTo,
//! uint256 tokenType, address payee, bytes transferData)`, where `transferData` is itself
//! the parameter encoding of `(address token, uint256 amount)`.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolValue,
};
use thiserror::Error;

type PaymentLeaf = (Address, U256, U256, U256, U256, Address, Bytes);
type TransferData = (Address, U256);

#[derive(Error, Debug)]
pub enum LeafDecodeError {
    #[error("malformed payment leaf: {0}")]
    Leaf(#[source] alloy::sol_types::Error),

    #[error("malformed transfer data: {0}")]
    TransferData(#[source] alloy::sol_types::Error),
}

/// Token and amount committed to by a payment leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: Address,
    pub amount: U256,
}

/// Decode the token transfer carried in the last field of a payment leaf.
pub fn decode_leaf(leaf: &[u8]) -> Result<TokenTransfer, LeafDecodeError> {
    let (_, _, _, _, _, _, transfer_data) =
        PaymentLeaf::abi_decode_params_validate(leaf).map_err(LeafDecodeError::Leaf)?;
    let (token, amount) = TransferData::abi_decode_params_validate(&transfer_data)
        .map_err(LeafDecodeError::TransferData)?;

    Ok(TokenTransfer { token, amount })
}

/// Fields of a payment leaf other than the transfer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafHeader {
    pub reward_program_id: Address,
    pub payment_cycle: U256,
    pub valid_from: U256,
    pub valid_to: U256,
    pub token_type: U256,
    pub payee: Address,
}

/// Encode a payment leaf in the two-stage layout accepted by [`decode_leaf`].
pub fn encode_leaf(header: &LeafHeader, transfer: &TokenTransfer) -> Vec<u8> {
    let transfer_data: Bytes = (transfer.token, transfer.amount).abi_encode_params().into();
    (
        header.reward_program_id,
        header.payment_cycle,
        header.valid_from,
        header.valid_to,
        header.token_type,
        header.payee,
        transfer_data,
    )
        .abi_encode_params()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> LeafHeader {
        LeafHeader {
            reward_program_id: Address::repeat_byte(0x11),
            payment_cycle: U256::from(24_001_024u64),
            valid_from: U256::from(24_001_024u64),
            valid_to: U256::from(24_044_224u64),
            token_type: U256::from(1),
            payee: Address::repeat_byte(0x22),
        }
    }

    #[test]
    fn decodes_encoded_transfer() {
        let transfer = TokenTransfer {
            token: "0x999999cf1046e68e36E1aA2E0E07105eDDD1f08E".parse().unwrap(),
            amount: U256::from(90u64) * U256::from(10u64).pow(U256::from(18)),
        };
        let leaf = encode_leaf(&header(), &transfer);

        assert_eq!(decode_leaf(&leaf).unwrap(), transfer);
    }

    #[test]
    fn leaf_layout_is_word_aligned() {
        let transfer = TokenTransfer { token: Address::repeat_byte(0x33), amount: U256::MAX };
        let leaf = encode_leaf(&header(), &transfer);

        // 7 head words, length word, 2 words of transfer data
        assert_eq!(leaf.len(), 32 * 10);
        // offset of the dynamic bytes field points past the head
        assert_eq!(U256::from_be_slice(&leaf[6 * 32..7 * 32]), U256::from(7 * 32));
        assert_eq!(U256::from_be_slice(&leaf[7 * 32..8 * 32]), U256::from(64));
        assert_eq!(&leaf[8 * 32 + 12..9 * 32], transfer.token.as_slice());
    }

    #[test]
    fn truncated_leaf_fails() {
        let transfer = TokenTransfer { token: Address::repeat_byte(0x33), amount: U256::from(7) };
        let leaf = encode_leaf(&header(), &transfer);

        assert!(matches!(decode_leaf(&leaf[..leaf.len() - 1]), Err(LeafDecodeError::Leaf(_))));
        assert!(matches!(decode_leaf(&leaf[..6 * 32]), Err(LeafDecodeError::Leaf(_))));
        assert!(matches!(decode_leaf(&[]), Err(LeafDecodeError::Leaf(_))));
    }

    #[test]
    fn short_transfer_data_fails() {
        let transfer_data = Bytes::from(Address::repeat_byte(0x33).into_word().to_vec());
        let h = header();
        let leaf = (
            h.reward_program_id,
            h.payment_cycle,
            h.valid_from,
            h.valid_to,
            h.token_type,
            h.payee,
            transfer_data,
        )
            .abi_encode_params();

        assert!(matches!(decode_leaf(&leaf), Err(LeafDecodeError::TransferData(_))));
    }

    #[test]
    fn dirty_address_padding_fails() {
        let transfer = TokenTransfer { token: Address::repeat_byte(0x33), amount: U256::from(7) };
        let mut leaf = encode_leaf(&header(), &transfer);
        // first byte of the reward program address word must be zero padding
        leaf[0] = 0xff;

        assert!(decode_leaf(&leaf).is_err());
    }
}
