//! Worker name authorization.
//!
//! Miners log in as `address[.worker]`. The worker suffix ends up in logs and
//! web pages, so it is restricted to a short plain identifier; the address
//! must be payable on the pool's network.

use std::sync::LazyLock;

use regex::Regex;

use crate::address::{self, NetworkParams};

static WORKER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{0,20}$").expect("worker id pattern"));

/// A login name split into payout address and worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerName {
    pub address: String,

    /// Everything after the first dot with further dots removed; empty when
    /// the login has no suffix.
    pub worker_id: String,
}

impl WorkerName {
    pub fn parse(login: &str) -> Self {
        let mut parts = login.split('.');
        let address = parts.next().unwrap_or_default().to_string();
        let worker_id = parts.collect::<String>();
        Self { address, worker_id }
    }

    /// Whether the worker id is acceptable.
    pub fn has_valid_worker_id(&self) -> bool {
        self.worker_id.is_empty() || WORKER_ID.is_match(&self.worker_id)
    }
}

/// Whether a login may mine on this pool.
pub fn authorize(network: &NetworkParams, login: &str) -> bool {
    let name = WorkerName::parse(login);
    name.has_valid_worker_id() && address::check_address(network, &name.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::base58;
    use test_case::test_case;

    fn testnet_address() -> String {
        let mut payload = vec![0x6f];
        payload.extend_from_slice(&[0x42; 20]);
        base58::encode_check(&payload)
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            WorkerName::parse("addr.rig1"),
            WorkerName {
                address: "addr".into(),
                worker_id: "rig1".into()
            }
        );
        assert_eq!(WorkerName::parse("addr").worker_id, "");
        assert_eq!(WorkerName::parse("addr.a.b").worker_id, "ab");
    }

    #[test_case("" ; "no worker")]
    #[test_case(".rig1" ; "simple")]
    #[test_case(".Rig_2-b" ; "underscore and dash")]
    #[test_case(".abcdefghij0123456789" ; "twenty characters")]
    fn test_authorized(suffix: &str) {
        let login = format!("{}{suffix}", testnet_address());
        assert!(authorize(&NetworkParams::testnet(), &login));
    }

    #[test_case(".<script>" ; "markup")]
    #[test_case(".rig 1" ; "space")]
    #[test_case(".abcdefghij0123456789x" ; "twenty one characters")]
    fn test_rejected_worker_id(suffix: &str) {
        let login = format!("{}{suffix}", testnet_address());
        assert!(!authorize(&NetworkParams::testnet(), &login));
    }

    #[test]
    fn test_rejected_address() {
        assert!(!authorize(&NetworkParams::testnet(), "notanaddress.rig1"));
        // Valid testnet address, wrong network
        let login = format!("{}.rig1", testnet_address());
        assert!(!authorize(&NetworkParams::bitcoin(), &login));
    }
}
