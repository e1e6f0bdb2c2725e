//! Solidity ABI encoding of constructor arguments.
//!
//! Arguments arrive as JSON values next to the constructor's ABI inputs and are encoded with
//! the standard head/tail layout: static values sit inline in the head, dynamic values leave a
//! 32-byte offset there and append their payload to the tail in argument order.

use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use veriscan_utils::errors::EncodeError;

const WORD: usize = 32;

/// One entry of an ABI `inputs` (or `components`) list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
}

impl AbiParam {
    /// An unnamed parameter of a plain type.
    pub fn of(kind: &str) -> Self {
        Self {
            name: String::new(),
            kind: kind.to_string(),
            components: Vec::new(),
        }
    }
}

/// Parsed ABI type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiType {
    Address,
    Bool,
    Uint(usize),
    Int(usize),
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<AbiType>),
    FixedArray(Box<AbiType>, usize),
    Tuple(Vec<(String, AbiType)>),
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Bool => write!(f, "bool"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => write!(f, "bytes"),
            Self::String => write!(f, "string"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::FixedArray(inner, n) => write!(f, "{inner}[{n}]"),
            Self::Tuple(fields) => {
                write!(f, "(")?;
                for (i, (_, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl AbiType {
    /// Parses a type string; `components` describes the fields when the base type is a tuple.
    pub fn parse(ty: &str, components: &[AbiParam]) -> Result<Self, EncodeError> {
        let ty = ty.trim();
        if let Some(body) = ty.strip_suffix(']') {
            let open = body
                .rfind('[')
                .ok_or_else(|| EncodeError::UnknownType(ty.to_string()))?;
            let inner = Box::new(Self::parse(&body[..open], components)?);
            let size = &body[open + 1..];
            return if size.is_empty() {
                Ok(Self::Array(inner))
            } else {
                size.parse()
                    .map(|n| Self::FixedArray(inner, n))
                    .map_err(|_| EncodeError::UnknownType(ty.to_string()))
            };
        }

        let parsed = match ty {
            "address" => Self::Address,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            "uint" => Self::Uint(256),
            "int" => Self::Int(256),
            "tuple" => Self::Tuple(
                components
                    .iter()
                    .map(|c| -> Result<(String, Self), EncodeError> {
                        Ok((c.name.clone(), Self::parse(&c.kind, &c.components)?))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            _ => {
                if let Some(bits) = ty.strip_prefix("uint").and_then(int_width) {
                    Self::Uint(bits)
                } else if let Some(bits) = ty.strip_prefix("int").and_then(int_width) {
                    Self::Int(bits)
                } else if let Some(n) = ty
                    .strip_prefix("bytes")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| (1..=32).contains(n))
                {
                    Self::FixedBytes(n)
                } else {
                    return Err(EncodeError::UnknownType(ty.to_string()));
                }
            }
        };
        Ok(parsed)
    }

    /// True for types encoded through an offset in the head.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes | Self::String | Self::Array(_) => true,
            Self::FixedArray(inner, _) => inner.is_dynamic(),
            Self::Tuple(fields) => fields.iter().any(|(_, ty)| ty.is_dynamic()),
            _ => false,
        }
    }

    /// Bytes this type occupies in the head of an enclosing sequence.
    pub fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return WORD;
        }
        match self {
            Self::FixedArray(inner, n) => inner.head_size() * n,
            Self::Tuple(fields) => fields.iter().map(|(_, ty)| ty.head_size()).sum(),
            _ => WORD,
        }
    }
}

fn int_width(bits: &str) -> Option<usize> {
    bits.parse::<usize>()
        .ok()
        .filter(|b| *b >= 8 && *b <= 256 && b % 8 == 0)
}

/// Encodes constructor arguments against the constructor's ABI inputs.
///
/// # Arguments
/// * `inputs` - The constructor's `inputs` list.
/// * `args` - One JSON value per input.
///
/// # Returns
/// The encoded argument block, ready to be appended to creation code.
pub fn encode_constructor_args(
    inputs: &[AbiParam],
    args: &[Value],
) -> Result<Vec<u8>, EncodeError> {
    if inputs.len() != args.len() {
        return Err(EncodeError::ArityMismatch {
            expected: inputs.len(),
            actual: args.len(),
        });
    }
    let types = inputs
        .iter()
        .map(|p| AbiType::parse(&p.kind, &p.components))
        .collect::<Result<Vec<_>, _>>()?;
    let values: Vec<&Value> = args.iter().collect();
    encode_sequence(&types, &values, Radix::Hex)
}

/// Encodes `(type, value)` pairs for plain (non-tuple) types.
pub fn encode_values(pairs: &[(&str, Value)]) -> Result<Vec<u8>, EncodeError> {
    let (inputs, args): (Vec<AbiParam>, Vec<Value>) = pairs
        .iter()
        .map(|(ty, v)| (AbiParam::of(ty), v.clone()))
        .unzip();
    encode_constructor_args(&inputs, &args)
}

/// Inputs of the constructor entry in a contract ABI, if it has any.
pub fn constructor_inputs(abi: &Value) -> Result<Option<Vec<AbiParam>>, serde_json::Error> {
    let Some(entry) = abi
        .as_array()
        .and_then(|entries| entries.iter().find(|e| e["type"] == "constructor"))
    else {
        return Ok(None);
    };
    let inputs: Vec<AbiParam> = match entry.get("inputs") {
        Some(inputs) => serde_json::from_value(inputs.clone())?,
        None => Vec::new(),
    };
    Ok((!inputs.is_empty()).then_some(inputs))
}

/// Base used for integer strings without a `0x` prefix. Top-level constructor arguments are
/// hex, values nested in arrays and tuples are decimal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Radix {
    Hex,
    Decimal,
}

impl Radix {
    const fn base(self) -> u32 {
        match self {
            Self::Hex => 16,
            Self::Decimal => 10,
        }
    }
}

fn encode_sequence(
    types: &[AbiType],
    values: &[&Value],
    radix: Radix,
) -> Result<Vec<u8>, EncodeError> {
    let head_len: usize = types.iter().map(AbiType::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (ty, value) in types.iter().zip(values) {
        let encoded = encode_value(ty, value, radix)?;
        if ty.is_dynamic() {
            head.extend_from_slice(&uint_word(head_len + tail.len()));
            tail.extend_from_slice(&encoded);
        } else {
            head.extend_from_slice(&encoded);
        }
    }
    head.extend_from_slice(&tail);
    Ok(head)
}

fn encode_value(ty: &AbiType, value: &Value, radix: Radix) -> Result<Vec<u8>, EncodeError> {
    let name = ty.to_string();
    match ty {
        AbiType::Address => {
            let raw = value
                .as_str()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected a hex string"))?;
            let bytes = decode_hex(raw)?;
            if bytes.len() != 20 {
                return Err(EncodeError::invalid(&name, value, "address must be 20 bytes"));
            }
            Ok(left_pad(&bytes))
        }
        AbiType::Bool => {
            let flag = match value {
                Value::Bool(b) => *b,
                Value::String(s) if s == "true" => true,
                Value::String(s) if s == "false" => false,
                Value::Number(n) if n.as_u64() == Some(0) => false,
                Value::Number(n) if n.as_u64() == Some(1) => true,
                _ => return Err(EncodeError::invalid(&name, value, "expected a boolean")),
            };
            Ok(uint_word(flag as usize).to_vec())
        }
        AbiType::Uint(bits) => {
            let n = parse_integer(&name, value, radix)?;
            let limit = BigInt::from(1u8) << *bits;
            if n.sign() == Sign::Minus || n >= limit {
                return Err(EncodeError::invalid(&name, value, "out of range"));
            }
            Ok(int_word(&n))
        }
        AbiType::Int(bits) => {
            let n = parse_integer(&name, value, radix)?;
            let half = BigInt::from(1u8) << (*bits - 1);
            if n < -half.clone() || n >= half {
                return Err(EncodeError::invalid(&name, value, "out of range"));
            }
            Ok(int_word(&n))
        }
        AbiType::FixedBytes(size) => {
            let raw = value
                .as_str()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected a hex string"))?;
            let bytes = decode_hex(raw)?;
            if bytes.len() > *size {
                return Err(EncodeError::invalid(&name, value, "too many bytes"));
            }
            Ok(right_pad(&bytes))
        }
        AbiType::Bytes => {
            let raw = value
                .as_str()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected a hex string"))?;
            Ok(length_prefixed(&decode_hex(raw)?))
        }
        AbiType::String => {
            let text = value
                .as_str()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected a string"))?;
            Ok(length_prefixed(text.as_bytes()))
        }
        AbiType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected an array"))?;
            let types = vec![(**inner).clone(); items.len()];
            let values: Vec<&Value> = items.iter().collect();
            let mut out = uint_word(items.len()).to_vec();
            out.extend(encode_sequence(&types, &values, Radix::Decimal)?);
            Ok(out)
        }
        AbiType::FixedArray(inner, size) => {
            let items = value
                .as_array()
                .ok_or_else(|| EncodeError::invalid(&name, value, "expected an array"))?;
            if items.len() != *size {
                return Err(EncodeError::ArityMismatch {
                    expected: *size,
                    actual: items.len(),
                });
            }
            let types = vec![(**inner).clone(); *size];
            let values: Vec<&Value> = items.iter().collect();
            encode_sequence(&types, &values, Radix::Decimal)
        }
        AbiType::Tuple(fields) => {
            let values: Vec<&Value> = match value {
                Value::Array(items) if items.len() == fields.len() => items.iter().collect(),
                Value::Array(items) => {
                    return Err(EncodeError::ArityMismatch {
                        expected: fields.len(),
                        actual: items.len(),
                    });
                }
                Value::Object(map) => fields
                    .iter()
                    .map(|(field, _)| {
                        map.get(field).ok_or_else(|| {
                            EncodeError::invalid(&name, value, format!("missing field `{field}`"))
                        })
                    })
                    .collect::<Result<_, _>>()?,
                _ => return Err(EncodeError::invalid(&name, value, "expected a tuple")),
            };
            let types: Vec<AbiType> = fields.iter().map(|(_, ty)| ty.clone()).collect();
            encode_sequence(&types, &values, Radix::Decimal)
        }
    }
}

/// Accepts JSON integers and integer strings, optionally negative. `0x` strings are always hex,
/// unprefixed strings are read in `radix`.
fn parse_integer(ty: &str, value: &Value, radix: Radix) -> Result<BigInt, EncodeError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(BigInt::from)
            .or_else(|| n.as_u64().map(BigInt::from))
            .ok_or_else(|| EncodeError::invalid(ty, value, "not an integer")),
        Value::String(s) => {
            let s = s.trim();
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s),
            };
            let parsed = match digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
            {
                Some(hex_digits) => BigInt::parse_bytes(hex_digits.as_bytes(), 16),
                None => BigInt::parse_bytes(digits.as_bytes(), radix.base()),
            };
            let n = parsed.ok_or_else(|| EncodeError::invalid(ty, value, "not an integer"))?;
            Ok(if negative { -n } else { n })
        }
        _ => Err(EncodeError::invalid(ty, value, "expected a number")),
    }
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, EncodeError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    Ok(hex::decode(digits)?)
}

/// Two's complement over 256 bits, big-endian.
fn int_word(n: &BigInt) -> Vec<u8> {
    let twos = if n.sign() == Sign::Minus {
        (BigInt::from(1u8) << 256) + n
    } else {
        n.clone()
    };
    let (_, magnitude) = twos.to_bytes_be();
    left_pad(&magnitude)
}

fn uint_word(n: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(n as u64).to_be_bytes());
    word
}

fn left_pad(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; WORD.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

fn right_pad(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(bytes.len().div_ceil(WORD).max(1) * WORD, 0);
    out
}

fn length_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = uint_word(bytes.len()).to_vec();
    if !bytes.is_empty() {
        out.extend(right_pad(bytes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn static_arguments_are_single_words() {
        let out = encode_values(&[
            ("uint256", json!(5)),
            ("address", json!("0x0000000000000000000000000000000000000001")),
        ])
        .unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(out[31], 5);
        assert_eq!(out[63], 1);
        assert!(out[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn negative_int_is_sign_extended() {
        let out = encode_values(&[("int8", json!(-1))]).unwrap();
        assert_eq!(out, vec![0xff; 32]);
        let out = encode_values(&[("int256", json!("-0x2"))]).unwrap();
        assert_eq!(out[31], 0xfe);
        assert_eq!(out[0], 0xff);
    }

    #[test]
    fn unprefixed_integer_strings_depend_on_position() {
        // top level: hex, with or without the prefix
        let out = encode_values(&[("uint256", json!("10"))]).unwrap();
        assert_eq!(out[31], 0x10);
        assert_eq!(out, encode_values(&[("uint256", json!("0x10"))]).unwrap());
        assert_eq!(encode_values(&[("uint16", json!("ff"))]).unwrap()[31], 0xff);

        // nested in an array: decimal
        let out = encode_values(&[("uint256[]", json!(["10", "0x10"]))]).unwrap();
        assert_eq!(out[95], 10);
        assert_eq!(out[127], 0x10);
    }

    #[test]
    fn dynamic_string_uses_offset_and_tail() {
        let out = encode_values(&[("string", json!("hi")), ("uint8", json!(7))]).unwrap();
        assert_eq!(out.len(), 32 * 4);
        assert_eq!(out[31], 0x40); // offset past the two head words
        assert_eq!(out[63], 7);
        assert_eq!(out[95], 2); // length
        assert_eq!(&out[96..98], b"hi");
    }

    #[test]
    fn dynamic_array_of_addresses() {
        let out = encode_values(&[(
            "address[]",
            json!([
                "0x00000000000000000000000000000000000000aa",
                "0x00000000000000000000000000000000000000bb"
            ]),
        )])
        .unwrap();
        assert_eq!(out.len(), 32 * 4);
        assert_eq!(out[31], 0x20);
        assert_eq!(out[63], 2);
        assert_eq!(out[95], 0xaa);
        assert_eq!(out[127], 0xbb);
    }

    #[test]
    fn tuple_from_object_matches_tuple_from_array() {
        let inputs = vec![AbiParam {
            name: "cfg".into(),
            kind: "tuple".into(),
            components: vec![
                AbiParam {
                    name: "owner".into(),
                    ..AbiParam::of("address")
                },
                AbiParam {
                    name: "limit".into(),
                    ..AbiParam::of("uint64")
                },
            ],
        }];
        let owner = "0x00000000000000000000000000000000000000cc";
        let by_name = encode_constructor_args(&inputs, &[json!({"owner": owner, "limit": 9})]);
        let by_pos = encode_constructor_args(&inputs, &[json!([owner, 9])]);
        assert_eq!(by_name.unwrap(), by_pos.unwrap());
    }

    #[test]
    fn bytes_n_is_right_padded() {
        let out = encode_values(&[("bytes4", json!("0xdeadbeef"))]).unwrap();
        assert_eq!(&out[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert!(out[4..].iter().all(|b| *b == 0));
        assert!(encode_values(&[("bytes2", json!("0xdeadbeef"))]).is_err());
    }

    #[test]
    fn rejects_unknown_types_and_bad_ranges() {
        assert!(matches!(
            encode_values(&[("fixed128x18", json!(1))]),
            Err(EncodeError::UnknownType(_))
        ));
        assert!(encode_values(&[("uint8", json!(256))]).is_err());
        assert!(encode_values(&[("uint256", json!(-1))]).is_err());
        assert!(encode_values(&[("int8", json!(-129))]).is_err());
    }

    #[test]
    fn finds_constructor_inputs() {
        let abi = json!([
            {"type": "function", "name": "f", "inputs": []},
            {"type": "constructor", "inputs": [{"name": "x", "type": "uint256"}]}
        ]);
        let inputs = constructor_inputs(&abi).unwrap().unwrap();
        assert_eq!(inputs, vec![AbiParam { name: "x".into(), ..AbiParam::of("uint256") }]);
        assert!(constructor_inputs(&json!([])).unwrap().is_none());
    }
}
