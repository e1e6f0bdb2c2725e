use serde_json::json;
use veriscan_core::encoder::{constructor_inputs, encode_constructor_args, encode_values};
use veriscan_utils::errors::EncodeError;

fn words(hex_words: &[&str]) -> Vec<u8> {
    hex_words
        .iter()
        .flat_map(|w| hex::decode(format!("{w:0>64}")).unwrap())
        .collect()
}

#[test]
fn test_uint_and_address_are_two_words() {
    let out = encode_values(&[
        ("uint256", json!(5)),
        ("address", json!("0x0000000000000000000000000000000000000001")),
    ])
    .unwrap();
    assert_eq!(out, words(&["5", "1"]));
}

#[test]
fn test_constructor_from_compiler_abi() {
    let abi = json!([
        {"type": "event", "name": "Initialized", "inputs": []},
        {
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                {"name": "owner", "type": "address", "internalType": "address"},
                {"name": "name", "type": "string", "internalType": "string"},
                {"name": "limits", "type": "uint256[]", "internalType": "uint256[]"}
            ]
        }
    ]);
    let inputs = constructor_inputs(&abi).unwrap().unwrap();
    assert_eq!(inputs.len(), 3);

    let out = encode_constructor_args(
        &inputs,
        &[
            json!("0x00000000000000000000000000000000000000aa"),
            json!("abc"),
            json!([1, "0x2"]),
        ],
    )
    .unwrap();

    // head: address, offset of `name`, offset of `limits`
    let mut expected = words(&["aa", "60", "a0"]);
    expected.extend(words(&["3"]));
    expected.extend(hex::decode(format!("{:0<64}", hex::encode("abc"))).unwrap());
    expected.extend(words(&["2", "1", "2"]));
    assert_eq!(out, expected);
}

#[test]
fn test_tuple_by_field_name() {
    let abi = json!([{
        "type": "constructor",
        "inputs": [{
            "name": "cfg",
            "type": "tuple",
            "components": [
                {"name": "fee", "type": "uint16"},
                {"name": "enabled", "type": "bool"}
            ]
        }]
    }]);
    let inputs = constructor_inputs(&abi).unwrap().unwrap();
    let by_name = encode_constructor_args(&inputs, &[json!({"enabled": true, "fee": 30})]).unwrap();
    let by_position = encode_constructor_args(&inputs, &[json!([30, true])]).unwrap();
    assert_eq!(by_name, by_position);
    assert_eq!(by_name, words(&["1e", "1"]));
}

#[test]
fn test_config_style_hex_strings() {
    // constructor_args in configs store top-level integers as hex strings
    let abi = json!([{
        "type": "constructor",
        "inputs": [
            {"name": "delay", "type": "uint256"},
            {"name": "limits", "type": "uint32[2]"}
        ]
    }]);
    let inputs = constructor_inputs(&abi).unwrap().unwrap();
    let out = encode_constructor_args(&inputs, &[json!("1000"), json!(["1000", "7"])]).unwrap();
    assert_eq!(out, words(&["1000", "3e8", "7"]));
}

#[test]
fn test_negative_int_is_twos_complement() {
    let out = encode_values(&[("int8", json!(-1))]).unwrap();
    assert_eq!(out, vec![0xff; 32]);
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(matches!(
        encode_values(&[("uint8", json!(256))]),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        encode_values(&[("bytes2", json!("0x010203"))]),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        encode_values(&[("fixed128x18", json!(1))]),
        Err(EncodeError::UnknownType(_))
    ));

    let inputs = constructor_inputs(&json!([{
        "type": "constructor",
        "inputs": [{"name": "a", "type": "uint256"}]
    }]))
    .unwrap()
    .unwrap();
    assert!(matches!(
        encode_constructor_args(&inputs, &[]),
        Err(EncodeError::ArityMismatch {
            expected: 1,
            actual: 0
        })
    ));
}
