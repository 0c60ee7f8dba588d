//! Conversions between the account representations of the dual-VM chain
//!
//! - a 32-byte public key, the canonical Substrate identity
//! - its SS58 string form
//! - a 20-byte H160 address on the EVM side
//!
//! H160 addresses map to chain identities in two directions that do not invert each other:
//! an EVM wallet maps to a hashed pseudo public key, and a Substrate key mirrors to the EVM
//! address made of its first 20 bytes.

use crate::types::{AccountId32, DecodeError};
use alloy_primitives::Address;
use sp_core::{blake2_256, hashing::blake2_512};
use std::fmt;

/// Default SS58 prefix of the chain (generic Substrate)
pub const DEFAULT_SS58_PREFIX: Ss58Prefix = Ss58Prefix(42);

/// Prefix hashed together with an EVM wallet address to get its chain identity
const EVM_WALLET_PREFIX: &[u8] = b"evm:";

/// Domain separator of the SS58 checksum
const SS58_CHECKSUM_PREFIX: &[u8] = b"SS58PRE";

const CHECKSUM_LEN: usize = 2;

/// Highest prefix the two-byte encoding can carry
const MAX_SS58_PREFIX: u16 = 16_383;

fn is_reserved_prefix(prefix: u16) -> bool {
    prefix == 46 || prefix == 47 || prefix > MAX_SS58_PREFIX
}

/// A network prefix SS58 can carry: at most 14 bits, and neither of the reserved 46 and 47
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ss58Prefix(u16);

impl Ss58Prefix {
    pub fn new(prefix: u16) -> Result<Self, DecodeError> {
        if is_reserved_prefix(prefix) {
            return Err(DecodeError::InvalidPrefix(prefix));
        }
        Ok(Self(prefix))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Ss58Prefix {
    type Error = DecodeError;

    fn try_from(prefix: u16) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}

impl fmt::Display for Ss58Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn ss58_checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut input = Vec::with_capacity(SS58_CHECKSUM_PREFIX.len() + data.len());
    input.extend_from_slice(SS58_CHECKSUM_PREFIX);
    input.extend_from_slice(data);
    let hash = blake2_512(&input);
    [hash[0], hash[1]]
}

/// Encode the network prefix, one byte for 0..=63, two bytes above
fn encode_prefix(prefix: u16) -> Vec<u8> {
    match prefix {
        0..=63 => vec![prefix as u8],
        _ => {
            let first = ((prefix & 0b0000_0000_1111_1100) as u8 >> 2) | 0b0100_0000;
            let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first, second]
        }
    }
}

/// Encode a public key as an SS58 string
pub fn ss58_encode(public_key: [u8; 32], network_prefix: Ss58Prefix) -> String {
    let mut data = encode_prefix(network_prefix.get());
    data.extend_from_slice(&public_key);
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum);
    bs58::encode(data).into_string()
}

/// Decode an SS58 string into the public key and the network prefix
pub fn ss58_decode(address: &str) -> Result<([u8; 32], u16), DecodeError> {
    let data = bs58::decode(address).into_vec()?;
    if data.len() < 2 {
        return Err(DecodeError::InvalidLength(data.len()));
    }

    let (prefix_len, prefix) = match data[0] {
        0..=63 => (1, data[0] as u16),
        64..=127 => {
            let lower = (data[0] << 2) | (data[1] >> 6);
            let upper = data[1] & 0b0011_1111;
            (2, (lower as u16) | ((upper as u16) << 8))
        }
        _ => return Err(DecodeError::InvalidPrefix(data[0] as u16)),
    };

    if data.len() != prefix_len + 32 + CHECKSUM_LEN {
        return Err(DecodeError::InvalidLength(data.len()));
    }
    if is_reserved_prefix(prefix) {
        return Err(DecodeError::InvalidPrefix(prefix));
    }

    let (body, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    if ss58_checksum(body).as_slice() != checksum {
        return Err(DecodeError::InvalidChecksum);
    }

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&body[prefix_len..]);
    Ok((public_key, prefix))
}

/// Decode an SS58 string, rejecting addresses of any other network
pub fn ss58_decode_with_prefix(address: &str, expected: u16) -> Result<[u8; 32], DecodeError> {
    let (public_key, found) = ss58_decode(address)?;
    if found != expected {
        return Err(DecodeError::PrefixMismatch { expected, found });
    }
    Ok(public_key)
}

/// Chain identity of an EVM wallet: `blake2_256("evm:" ++ address)`.
///
/// The result is used as a public key, but no private key exists for it.
pub fn h160_from_eth_wallet(eth_address: [u8; 20]) -> [u8; 32] {
    let mut input = [0u8; 24];
    input[..4].copy_from_slice(EVM_WALLET_PREFIX);
    input[4..].copy_from_slice(&eth_address);
    blake2_256(&input)
}

/// SS58 string of the chain identity of an EVM wallet
pub fn ss58_from_eth_wallet(eth_address: [u8; 20], network_prefix: Ss58Prefix) -> String {
    ss58_encode(h160_from_eth_wallet(eth_address), network_prefix)
}

/// Mirror EVM address of a Substrate key: its first 20 bytes.
///
/// This is the rule of the EVM pallet's truncating origin check, so funds sent to this address
/// can be withdrawn by the key through `EVM::withdraw`.
pub fn h160_from_substrate_key(public_key: [u8; 32]) -> [u8; 20] {
    let mut address = [0u8; 20];
    address.copy_from_slice(&public_key[..20]);
    address
}

/// Format a 20-byte address as `0x` followed by 40 lowercase hex characters
pub fn to_viem_style_hex(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.len() != 20 {
        return Err(DecodeError::InvalidLength(bytes.len()));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

fn decode_hex<const N: usize>(input: &str) -> Result<[u8; N], DecodeError> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(stripped)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| DecodeError::InvalidLength(bytes.len()))
}

/// Parse a hex H160, with or without `0x`, in any letter case
pub fn parse_h160(input: &str) -> Result<[u8; 20], DecodeError> {
    decode_hex::<20>(input)
}

/// Parse a hex 32-byte public key, with or without `0x`
pub fn parse_public_key(input: &str) -> Result<[u8; 32], DecodeError> {
    decode_hex::<32>(input)
}

/// Resolve any account representation to the chain identity.
///
/// Accepts an SS58 string of the given network, a 32-byte hex public key or a 20-byte hex EVM
/// wallet address (mapped with [`h160_from_eth_wallet`]).
pub fn parse_account(
    input: &str,
    network_prefix: Ss58Prefix,
) -> Result<AccountId32, DecodeError> {
    let public_key = if input.starts_with("0x") {
        match input.len() {
            42 => h160_from_eth_wallet(parse_h160(input)?),
            66 => parse_public_key(input)?,
            _ => return Err(DecodeError::InvalidLength((input.len() - 2) / 2)),
        }
    } else {
        ss58_decode_with_prefix(input, network_prefix.get())?
    };
    Ok(AccountId32::from(public_key))
}

/// Address mapping logic between `AccountId32` and `Address`
pub struct AddressMapping;

impl AddressMapping {
    /// Chain account of an EVM wallet
    pub fn to_account_id(address: Address) -> AccountId32 {
        AccountId32::from(h160_from_eth_wallet(address.0 .0))
    }

    /// Mirror EVM address of a chain account
    pub fn to_address(account_id: &AccountId32) -> Address {
        Address::from(h160_from_substrate_key(account_id.0))
    }
}
