//! Storage keys and the on-chain records read by the harness

use crate::types::AccountId32;
use parity_scale_codec::{Decode, Encode};
use sp_core::{blake2_128, blake2_256, twox_128, twox_256, twox_64};
use subxt::metadata::types::StorageHasher;

/// Pallet storage read structure
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StorageKey {
    /// Storage item name
    pub name: String,
    /// The rest of the keys, could be multiple if n-map storage
    pub keys: Vec<Vec<u8>>,
}

impl StorageKey {
    /// Key of a plain storage value
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: vec![],
        }
    }

    /// Key of a storage map entry, `key` is SCALE encoded
    pub fn map(name: impl Into<String>, key: &impl Encode) -> Self {
        Self {
            name: name.into(),
            keys: vec![key.encode()],
        }
    }
}

/// Hash the key to get the storage key
pub fn hash_key(key: &[u8], hasher: &StorageHasher) -> Vec<u8> {
    match hasher {
        StorageHasher::Blake2_128 => blake2_128(key).to_vec(),
        StorageHasher::Blake2_256 => blake2_256(key).to_vec(),
        StorageHasher::Blake2_128Concat => {
            let hash = blake2_128(key);
            let mut result = Vec::with_capacity(16 + key.len());
            result.extend_from_slice(&hash);
            result.extend_from_slice(key);
            result
        }
        StorageHasher::Twox128 => twox_128(key).to_vec(),
        StorageHasher::Twox256 => twox_256(key).to_vec(),
        StorageHasher::Twox64Concat => {
            let hash = twox_64(key);
            let mut result = Vec::with_capacity(8 + key.len());
            result.extend_from_slice(&hash);
            result.extend_from_slice(key);
            result
        }
        StorageHasher::Identity => key.to_vec(),
    }
}

/// `twox128(pallet) ++ twox128(item)`, the prefix shared by every entry of a storage item
pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
    use frame_support::StorageHasher as _;

    let mut prefix = Vec::with_capacity(32);
    prefix.extend_from_slice(&frame_support::Twox128::hash(pallet.as_bytes()));
    prefix.extend_from_slice(&frame_support::Twox128::hash(item.as_bytes()));
    prefix
}

/// Final storage key from the pallet name, the item key and the hashers declared in metadata
pub fn final_storage_key(pallet: &str, key: &StorageKey, hashers: &[StorageHasher]) -> Vec<u8> {
    let mut final_key = storage_prefix(pallet, &key.name);
    for (hasher, key_raw) in hashers.iter().zip(key.keys.iter()) {
        final_key.extend(hash_key(key_raw, hasher));
    }
    final_key
}

/// Balances held by an account, `pallet_balances::AccountData`
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

/// `frame_system::AccountInfo`
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

/// Call filters of a proxy relationship.
///
/// The variant order is the runtime's encoding and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub enum ProxyType {
    #[default]
    Any,
    Owner,
    NonCritical,
    NonTransfer,
    Senate,
    NonFungible,
    Triumvirate,
    Governance,
    Staking,
    Registration,
}

impl ProxyType {
    /// Variant name as it appears in the runtime metadata
    pub fn variant_name(&self) -> &'static str {
        match self {
            ProxyType::Any => "Any",
            ProxyType::Owner => "Owner",
            ProxyType::NonCritical => "NonCritical",
            ProxyType::NonTransfer => "NonTransfer",
            ProxyType::Senate => "Senate",
            // sic, the runtime spells it this way
            ProxyType::NonFungible => "NonFungibile",
            ProxyType::Triumvirate => "Triumvirate",
            ProxyType::Governance => "Governance",
            ProxyType::Staking => "Staking",
            ProxyType::Registration => "Registration",
        }
    }
}

/// One entry of `Proxy::Proxies(proxied)`
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ProxyDefinition {
    pub delegate: AccountId32,
    pub proxy_type: ProxyType,
    pub delay: u32,
}

/// `Proxy::Proxies` value: the relationships and the deposit reserved for them
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ProxyRecord {
    pub proxies: Vec<ProxyDefinition>,
    pub deposit: u128,
}

impl ProxyRecord {
    /// The proxy `Proxy::proxy` would pick for `delegate`.
    ///
    /// With `force_proxy_type` only a proxy of exactly that type matches, an `Any` proxy does not
    /// stand in for a narrower type. Without it the first proxy of the delegate is taken.
    pub fn find(
        &self,
        delegate: &AccountId32,
        force_proxy_type: Option<ProxyType>,
    ) -> Option<&ProxyDefinition> {
        self.proxies.iter().find(|p| {
            &p.delegate == delegate && force_proxy_type.map_or(true, |t| p.proxy_type == t)
        })
    }

    /// Whether `Proxy::proxy` from `delegate` with `force_proxy_type` gets past the proxy
    /// lookup. Proxies with a delay only dispatch announced calls.
    pub fn allows(&self, delegate: &AccountId32, force_proxy_type: Option<ProxyType>) -> bool {
        self.find(delegate, force_proxy_type).is_some_and(|p| p.delay == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn test_storage_prefix() {
        // well-known prefix of `System::Account`
        assert_eq!(
            storage_prefix("System", "Account"),
            hex!("26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9")
        );
    }

    #[test]
    fn test_final_key_blake2_128_concat() {
        let who = AccountId32::from([1u8; 32]);
        let key = StorageKey::map("Account", &who);
        let final_key = final_storage_key("System", &key, &[StorageHasher::Blake2_128Concat]);

        assert_eq!(final_key.len(), 32 + 16 + 32);
        assert_eq!(&final_key[..32], storage_prefix("System", "Account").as_slice());
        assert_eq!(&final_key[32..48], blake2_128(&[1u8; 32]).as_slice());
        assert_eq!(&final_key[48..], &[1u8; 32]);
    }

    #[test]
    fn test_final_key_plain_ignores_hashers() {
        let key = StorageKey::plain("Number");
        assert_eq!(
            final_storage_key("System", &key, &[]),
            storage_prefix("System", "Number")
        );
    }

    #[test]
    fn test_hash_key_twox64_concat() {
        let hashed = hash_key(b"abc", &StorageHasher::Twox64Concat);
        assert_eq!(&hashed[..8], twox_64(b"abc").as_slice());
        assert_eq!(&hashed[8..], b"abc");
        assert_eq!(hash_key(b"abc", &StorageHasher::Identity), b"abc".to_vec());
    }

    #[test]
    fn test_account_info_layout() {
        let info = AccountInfo {
            nonce: 3,
            consumers: 0,
            providers: 1,
            sufficients: 0,
            data: AccountData {
                free: 1_000_000_000,
                ..Default::default()
            },
        };
        let encoded = info.encode();
        // 4 x u32 followed by 4 x u128
        assert_eq!(encoded.len(), 16 + 64);
        assert_eq!(&encoded[..4], &3u32.to_le_bytes());
        assert_eq!(AccountInfo::decode(&mut &encoded[..]).unwrap(), info);
    }

    #[test]
    fn test_proxy_record_decoding() {
        let delegate = AccountId32::from([9u8; 32]);
        let mut raw = vec![];
        // compact length 1
        raw.push(4u8);
        raw.extend_from_slice(&[9u8; 32]);
        raw.push(8); // Staking
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&93_000_000u128.to_le_bytes());

        let record = ProxyRecord::decode(&mut &raw[..]).unwrap();
        assert_eq!(record.proxies.len(), 1);
        assert_eq!(record.proxies[0].proxy_type, ProxyType::Staking);
        assert_eq!(record.deposit, 93_000_000);
        assert!(record.allows(&delegate, Some(ProxyType::Staking)));
        assert!(record.allows(&delegate, None));
        assert!(!record.allows(&delegate, Some(ProxyType::Registration)));
        assert!(!record.allows(&AccountId32::from([8u8; 32]), Some(ProxyType::Staking)));
    }

    #[test]
    fn test_forced_type_matches_exactly() {
        let delegate = AccountId32::from([9u8; 32]);
        let record = ProxyRecord {
            proxies: vec![ProxyDefinition {
                delegate: delegate.clone(),
                proxy_type: ProxyType::Any,
                delay: 0,
            }],
            deposit: 0,
        };

        assert!(record.allows(&delegate, None));
        assert!(record.allows(&delegate, Some(ProxyType::Any)));
        // `Any` covers every call, but a forced type is looked up as is
        assert!(!record.allows(&delegate, Some(ProxyType::Registration)));
    }

    #[test]
    fn test_delayed_proxy_needs_announcement() {
        let delegate = AccountId32::from([9u8; 32]);
        let record = ProxyRecord {
            proxies: vec![
                ProxyDefinition {
                    delegate: delegate.clone(),
                    proxy_type: ProxyType::Staking,
                    delay: 10,
                },
                ProxyDefinition {
                    delegate: delegate.clone(),
                    proxy_type: ProxyType::Owner,
                    delay: 0,
                },
            ],
            deposit: 0,
        };

        assert!(!record.allows(&delegate, Some(ProxyType::Staking)));
        assert!(record.allows(&delegate, Some(ProxyType::Owner)));
        // the first proxy of the delegate is picked
        assert_eq!(
            record.find(&delegate, None).map(|p| p.proxy_type),
            Some(ProxyType::Staking)
        );
        assert!(!record.allows(&delegate, None));
    }
}
