//! Dynamic runtime calls
//!
//! Calls are described by pallet name, call name and named fields, so the harness does not need
//! code generated from the runtime metadata. The node checks the shape against its metadata at
//! submission time.

use crate::storage::ProxyType;
use crate::types::AccountId32;
use subxt::dynamic::Value;
use subxt::ext::scale_value::Composite;
use subxt::tx::DynamicPayload;

/// A runtime call with its arguments
#[derive(Clone, Debug, PartialEq)]
pub struct ChainCall {
    pallet: String,
    name: String,
    fields: Vec<(String, Value)>,
}

impl ChainCall {
    pub fn new(pallet: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pallet: pallet.into(),
            name: name.into(),
            fields: vec![],
        }
    }

    /// Add a named argument
    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn pallet(&self) -> &str {
        &self.pallet
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Payload ready to be signed and submitted
    pub fn to_payload(&self) -> DynamicPayload {
        subxt::dynamic::tx(
            self.pallet.as_str(),
            self.name.as_str(),
            Composite::named(self.fields.clone()),
        )
    }

    /// The call as a `RuntimeCall` value, to be nested into another call
    pub fn to_value(&self) -> Value {
        Value::unnamed_variant(
            self.pallet.as_str(),
            [Value::named_variant(self.name.as_str(), self.fields.clone())],
        )
    }
}

/// `MultiAddress::Id(account)`
pub fn multi_address(account: &AccountId32) -> Value {
    Value::unnamed_variant("Id", [Value::from_bytes(account.0)])
}

fn option(value: Option<Value>) -> Value {
    match value {
        Some(value) => Value::unnamed_variant("Some", [value]),
        None => Value::unnamed_variant("None", Vec::<Value>::new()),
    }
}

fn proxy_type(proxy_type: ProxyType) -> Value {
    Value::unnamed_variant(proxy_type.variant_name(), Vec::<Value>::new())
}

/// `Balances::transfer_keep_alive`
pub fn transfer_keep_alive(dest: &AccountId32, value: u128) -> ChainCall {
    ChainCall::new("Balances", "transfer_keep_alive")
        .arg("dest", multi_address(dest))
        .arg("value", Value::u128(value))
}

/// `Balances::force_set_balance`, needs root
pub fn force_set_balance(who: &AccountId32, new_free: u128) -> ChainCall {
    ChainCall::new("Balances", "force_set_balance")
        .arg("who", multi_address(who))
        .arg("new_free", Value::u128(new_free))
}

/// `Sudo::sudo`
pub fn sudo(call: &ChainCall) -> ChainCall {
    ChainCall::new("Sudo", "sudo").arg("call", call.to_value())
}

/// `Proxy::add_proxy`
pub fn add_proxy(delegate: &AccountId32, kind: ProxyType, delay: u32) -> ChainCall {
    ChainCall::new("Proxy", "add_proxy")
        .arg("delegate", multi_address(delegate))
        .arg("proxy_type", proxy_type(kind))
        .arg("delay", Value::u128(delay as u128))
}

/// `Proxy::remove_proxy`
pub fn remove_proxy(delegate: &AccountId32, kind: ProxyType, delay: u32) -> ChainCall {
    ChainCall::new("Proxy", "remove_proxy")
        .arg("delegate", multi_address(delegate))
        .arg("proxy_type", proxy_type(kind))
        .arg("delay", Value::u128(delay as u128))
}

/// `Proxy::proxy`, dispatching `call` as `real`
pub fn proxy(real: &AccountId32, force_proxy_type: Option<ProxyType>, call: &ChainCall) -> ChainCall {
    ChainCall::new("Proxy", "proxy")
        .arg("real", multi_address(real))
        .arg("force_proxy_type", option(force_proxy_type.map(proxy_type)))
        .arg("call", call.to_value())
}

/// `EVM::withdraw` from the mirror address of the signer
pub fn evm_withdraw(address: [u8; 20], value: u128) -> ChainCall {
    ChainCall::new("EVM", "withdraw")
        .arg("address", Value::from_bytes(address))
        .arg("value", Value::u128(value))
}
