//! Payout address to output script resolution.
//!
//! Coinbase outputs pay to scripts, but pools are configured with addresses.
//! Altcoins reuse Bitcoin's address formats with their own version bytes and
//! bech32 prefixes, so resolution is driven by [`NetworkParams`] rather than
//! `bitcoin::Network`.

use bitcoin::base58;
use bitcoin::bech32::segwit;
use serde::Deserialize;
use thiserror::Error;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;

/// Errors from resolving an address or key into a script.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address {address:?}: {reason}")]
    Invalid { address: String, reason: String },

    #[error("address {address:?} has version byte {version:#04x} not used by this network")]
    WrongNetwork { address: String, version: u8 },

    #[error("invalid public key {0:?} (expected 33 bytes of hex)")]
    InvalidPubkey(String),

    #[error("invalid mining key {0:?} (expected 20 bytes of hex)")]
    InvalidMiningKey(String),
}

/// Address encoding parameters of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkParams {
    /// Base58 version byte of pay-to-pubkey-hash addresses.
    pub pub_key_hash: u8,

    /// Base58 version byte of pay-to-script-hash addresses.
    pub script_hash: u8,

    /// Human-readable part of segwit addresses, if the chain has them.
    #[serde(default)]
    pub bech32: Option<String>,
}

impl NetworkParams {
    pub fn bitcoin() -> Self {
        Self {
            pub_key_hash: 0x00,
            script_hash: 0x05,
            bech32: Some("bc".into()),
        }
    }

    pub fn testnet() -> Self {
        Self {
            pub_key_hash: 0x6f,
            script_hash: 0xc4,
            bech32: Some("tb".into()),
        }
    }

    pub fn regtest() -> Self {
        Self {
            bech32: Some("bcrt".into()),
            ..Self::testnet()
        }
    }
}

/// Resolve an address into the output script that pays it.
///
/// With no network, the address is taken to be a base58 pay-to-pubkey-hash
/// address of any version.
pub fn address_to_script(
    network: Option<&NetworkParams>,
    address: &str,
) -> Result<Vec<u8>, AddressError> {
    let Some(network) = network else {
        let payload = decode_base58(address)?;
        return Ok(p2pkh_script(&payload[1..]));
    };

    match base58::decode_check(address) {
        Ok(payload) => {
            let payload = check_base58_payload(address, payload)?;
            let version = payload[0];
            if version == network.pub_key_hash {
                Ok(p2pkh_script(&payload[1..]))
            } else if version == network.script_hash {
                Ok(p2sh_script(&payload[1..]))
            } else {
                Err(AddressError::WrongNetwork {
                    address: address.into(),
                    version,
                })
            }
        }
        Err(base58_err) => match &network.bech32 {
            Some(hrp) => decode_segwit(address, hrp),
            None => Err(invalid(address, base58_err)),
        },
    }
}

/// Whether an address resolves to a script on the given network.
pub fn check_address(network: &NetworkParams, address: &str) -> bool {
    address_to_script(Some(network), address).is_ok()
}

/// Pay-to-pubkey script from a hex compressed public key.
///
/// Used for the pool output on proof-of-stake chains, which pay to a key
/// rather than an address.
pub fn pubkey_to_script(pubkey_hex: &str) -> Result<Vec<u8>, AddressError> {
    let key = match hex::decode(pubkey_hex) {
        Ok(key) if key.len() == 33 => key,
        _ => return Err(AddressError::InvalidPubkey(pubkey_hex.into())),
    };
    let mut script = Vec::with_capacity(35);
    script.push(0x21);
    script.extend_from_slice(&key);
    script.push(OP_CHECKSIG);
    Ok(script)
}

/// Pay-to-pubkey-hash script from a hex hash160 ("mining key").
pub fn mining_key_to_script(key_hex: &str) -> Result<Vec<u8>, AddressError> {
    match hex::decode(key_hex) {
        Ok(key) if key.len() == 20 => Ok(p2pkh_script(&key)),
        _ => Err(AddressError::InvalidMiningKey(key_hex.into())),
    }
}

fn decode_base58(address: &str) -> Result<Vec<u8>, AddressError> {
    let payload = base58::decode_check(address).map_err(|e| invalid(address, e))?;
    check_base58_payload(address, payload)
}

fn check_base58_payload(address: &str, payload: Vec<u8>) -> Result<Vec<u8>, AddressError> {
    if payload.len() != 21 {
        return Err(invalid(
            address,
            format!("payload is {} bytes, expected 21", payload.len()),
        ));
    }
    Ok(payload)
}

fn decode_segwit(address: &str, expected_hrp: &str) -> Result<Vec<u8>, AddressError> {
    let (hrp, version, program) = segwit::decode(address).map_err(|e| invalid(address, e))?;
    if hrp.to_lowercase() != expected_hrp.to_lowercase() {
        return Err(invalid(
            address,
            format!("prefix {} does not match {expected_hrp}", hrp.to_lowercase()),
        ));
    }

    let version = version.to_u8();
    let mut script = Vec::with_capacity(program.len() + 2);
    script.push(if version == 0 { OP_0 } else { OP_1 + version - 1 });
    script.push(program.len() as u8);
    script.extend_from_slice(&program);
    Ok(script)
}

fn p2pkh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

fn p2sh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 0x14]);
    script.extend_from_slice(hash);
    script.push(OP_EQUAL);
    script
}

fn invalid(address: &str, reason: impl ToString) -> AddressError {
    AddressError::Invalid {
        address: address.into(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Address;
    use std::str::FromStr;
    use test_case::test_case;

    fn bitcoin_script(address: &str) -> Vec<u8> {
        Address::from_str(address)
            .unwrap()
            .assume_checked()
            .script_pubkey()
            .to_bytes()
    }

    #[test_case("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"; "p2pkh")]
    #[test_case("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"; "p2sh")]
    #[test_case("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"; "p2wpkh")]
    #[test_case("bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3"; "p2wsh")]
    #[test_case("bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297"; "p2tr")]
    fn test_matches_bitcoin_crate(address: &str) {
        let ours = address_to_script(Some(&NetworkParams::bitcoin()), address).unwrap();
        assert_eq!(ours, bitcoin_script(address));
    }

    #[test]
    fn test_p2pkh_layout() {
        let script =
            address_to_script(Some(&NetworkParams::bitcoin()), "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")
                .unwrap();
        assert_eq!(
            hex::encode(script),
            "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac"
        );
    }

    #[test]
    fn test_no_network_is_p2pkh_of_any_version() {
        // A testnet address resolves without network parameters
        let mut payload = vec![0x6f];
        payload.extend_from_slice(&[0x42; 20]);
        let address = base58::encode_check(&payload);

        let script = address_to_script(None, &address).unwrap();
        assert_eq!(script, p2pkh_script(&[0x42; 20]));
    }

    #[test]
    fn test_wrong_network() {
        let err = address_to_script(
            Some(&NetworkParams::testnet()),
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
        )
        .unwrap_err();
        assert!(matches!(err, AddressError::WrongNetwork { version: 0, .. }));

        assert!(!check_address(
            &NetworkParams::testnet(),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        ));
    }

    #[test]
    fn test_bad_checksum_fails_cleanly() {
        assert!(!check_address(
            &NetworkParams::bitcoin(),
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb"
        ));
        assert!(!check_address(&NetworkParams::bitcoin(), ""));
        assert!(address_to_script(None, "not an address").is_err());
    }

    #[test]
    fn test_network_without_segwit() {
        let network = NetworkParams {
            bech32: None,
            ..NetworkParams::bitcoin()
        };
        assert!(!check_address(
            &network,
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        ));
    }

    #[test]
    fn test_pubkey_to_script() {
        let key = "02".to_string() + &"11".repeat(32);
        let script = pubkey_to_script(&key).unwrap();
        assert_eq!(script.len(), 35);
        assert_eq!(script[0], 0x21);
        assert_eq!(script[34], OP_CHECKSIG);

        assert!(matches!(
            pubkey_to_script("02abcd"),
            Err(AddressError::InvalidPubkey(_))
        ));
    }

    #[test]
    fn test_mining_key_to_script() {
        let script = mining_key_to_script("62e907b15cbf27d5425399ebf6f0fb50ebb88f18").unwrap();
        assert_eq!(
            hex::encode(script),
            "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac"
        );
        assert!(mining_key_to_script("62e907").is_err());
    }
}
