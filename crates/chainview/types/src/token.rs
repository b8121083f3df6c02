use alloy_primitives::{Address, U256};

/// Selector of `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Length of an ABI-encoded `transfer(address,uint256)` call.
const TRANSFER_CALL_LEN: usize = 4 + 32 + 32;

/// A decoded `transfer(address,uint256)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCall {
    /// Recipient of the transfer.
    pub to: Address,
    /// Transferred amount, in token base units.
    pub value: U256,
}

impl TransferCall {
    /// Decodes call data as a QRC20 `transfer`.
    ///
    /// Returns `None` unless the data is exactly one selector plus two words and the address
    /// word carries twelve zero bytes of padding.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != TRANSFER_CALL_LEN || data[..4] != TRANSFER_SELECTOR {
            return None;
        }
        if data[4..16].iter().any(|byte| *byte != 0) {
            return None;
        }
        let to = Address::from_slice(&data[16..36]);
        let value = U256::from_be_slice(&data[36..68]);
        Some(Self { to, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encode(to: Address, value: U256) -> Vec<u8> {
        let mut data = TRANSFER_SELECTOR.to_vec();
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(to.as_slice());
        data.extend_from_slice(&value.to_be_bytes::<32>());
        data
    }

    #[test]
    fn test_decode_transfer() {
        let to = Address::repeat_byte(0x42);
        let call = TransferCall::decode(&encode(to, U256::from(1_000u64))).unwrap();
        assert_eq!(call.to, to);
        assert_eq!(call.value, U256::from(1_000u64));
    }

    #[rstest]
    #[case::wrong_selector(0)]
    #[case::dirty_padding(4)]
    fn test_decode_rejects_corrupted_call(#[case] offset: usize) {
        let mut data = encode(Address::repeat_byte(1), U256::from(5u64));
        data[offset] ^= 0xff;
        assert!(TransferCall::decode(&data).is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let mut data = encode(Address::repeat_byte(1), U256::from(5u64));
        data.push(0);
        assert!(TransferCall::decode(&data).is_none());
        assert!(TransferCall::decode(&TRANSFER_SELECTOR).is_none());
    }
}
