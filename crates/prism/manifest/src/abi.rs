//! Ahead-of-time ABI descriptors.
//!
//! The descriptor is deserialized from the compiler's JSON ABI output. The
//! core never inspects contract source; everything it needs to know about a
//! facet's callable surface is in these entries.

use prism_types::{selector, Selector};
use serde::{Deserialize, Serialize};

/// One fragment of a contract ABI.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AbiEntry {
    Function(AbiFunction),
    Constructor(AbiConstructor),
    Event(AbiEvent),
    Error(AbiError),
    Fallback(AbiFallback),
    Receive(AbiReceive),
}

impl AbiEntry {
    pub fn as_function(&self) -> Option<&AbiFunction> {
        match self {
            AbiEntry::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiFunction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default)]
    pub state_mutability: StateMutability,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiConstructor {
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub state_mutability: StateMutability,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbiEvent {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbiError {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiFallback {
    #[serde(default)]
    pub state_mutability: StateMutability,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiReceive {
    #[serde(default)]
    pub state_mutability: StateMutability,
}

/// An ABI parameter. `components` is populated for tuple types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    #[default]
    Nonpayable,
    Payable,
}

impl AbiFunction {
    /// The canonical signature: parameter names omitted, no whitespace,
    /// tuples rendered as parenthesized component lists.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.inputs.iter().map(canonical_type).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// First 4 bytes of `keccak256(signature)`.
    pub fn selector(&self) -> Selector {
        selector(&self.signature())
    }

    /// `true` for `view` and `pure` functions.
    pub fn is_read_only(&self) -> bool {
        matches!(self.state_mutability, StateMutability::View | StateMutability::Pure)
    }
}

/// Renders an ABI type canonically. Tuples become `(t1,t2,…)` with any array
/// suffix preserved, e.g. `tuple[2][]` → `(address,uint256)[2][]`.
fn canonical_type(param: &AbiParam) -> String {
    if let Some(suffix) = param.ty.strip_prefix("tuple") {
        let inner: Vec<String> = param.components.iter().map(canonical_type).collect();
        format!("({}){}", inner.join(","), suffix)
    } else {
        param.ty.clone()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn param(ty: &str) -> AbiParam {
        AbiParam { name: "x".into(), ty: ty.into(), components: vec![] }
    }

    #[test]
    fn signature_omits_parameter_names() {
        let f = AbiFunction {
            name: "transfer".into(),
            inputs: vec![param("address"), param("uint256")],
            outputs: vec![param("bool")],
            state_mutability: StateMutability::Nonpayable,
        };
        assert_eq!(f.signature(), "transfer(address,uint256)");
        assert_eq!(f.selector().as_slice(), &hex!("a9059cbb"));
    }

    #[test]
    fn signature_flattens_tuples() {
        let tuple = AbiParam {
            name: "route".into(),
            ty: "tuple[]".into(),
            components: vec![param("bytes4"), param("address")],
        };
        let f = AbiFunction {
            name: "batch".into(),
            inputs: vec![tuple],
            outputs: vec![],
            state_mutability: StateMutability::Nonpayable,
        };
        assert_eq!(f.signature(), "batch((bytes4,address)[])");
    }

    #[test]
    fn parses_compiler_json() {
        let raw = r#"[
            {"type": "constructor", "inputs": [{"name": "owner", "type": "address"}]},
            {"type": "function", "name": "ping", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
            {"type": "function", "name": "totalRoutes", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view"},
            {"type": "event", "name": "Pinged", "inputs": []}
        ]"#;

        let abi: Vec<AbiEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(abi.len(), 4);

        let functions: Vec<&AbiFunction> = abi.iter().filter_map(AbiEntry::as_function).collect();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].signature(), "ping()");
        assert_eq!(functions[0].selector().as_slice(), &hex!("5c36b186"));
        assert!(!functions[0].is_read_only());
        assert!(functions[1].is_read_only());
    }
}
