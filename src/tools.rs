use bluer::Address;
use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info,server_pos=debug";

/// Initializes the global logging facility.
///
/// If `RUST_LOG` is not set, this function will set the global default logging level to `info`,
/// and for `server_pos` it will set the `debug` logging level.
///
/// Log messages are formatted and printed to standard output by `tracing_subscriber::fmt`.
///
/// # Panics
///
/// Panics if the initialization was unsuccessful, likely because a global subscriber was already
/// installed by another call to try_init.
pub fn initialize_logging(json_output: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json_output {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Parse one group of a colon-separated Bluetooth address.
///
/// `u8::from_str_radix` alone would accept a leading `+`, so the digits are checked first.
fn parse_address_group(group: &str) -> Option<u8> {
    if group.is_empty() || group.len() > 2 || !group.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(group, 16).ok()
}

/// Check that `address` is made of exactly six colon-separated hex byte values.
pub fn is_valid_bluetooth_address(address: &str) -> bool {
    address.split(':').count() == 6
        && address
            .split(':')
            .all(|group| parse_address_group(group).is_some())
}

/// Parse a `XX:XX:XX:XX:XX:XX` Bluetooth address.
pub fn parse_bluetooth_address(address: &str) -> Option<Address> {
    if !is_valid_bluetooth_address(address) {
        return None;
    }

    let mut bytes = [0u8; 6];
    for (byte, group) in bytes.iter_mut().zip(address.split(':')) {
        *byte = parse_address_group(group)?;
    }
    Some(Address::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_hex_groups() {
        assert!(is_valid_bluetooth_address("04:B8:0E:20:AA:01"));
        assert!(is_valid_bluetooth_address("ff:ff:ff:ff:ff:ff"));
        assert!(is_valid_bluetooth_address("4:B8:E:20:AA:1"));
    }

    #[test]
    fn rejects_wrong_group_count() {
        assert!(!is_valid_bluetooth_address("04:B8"));
        assert!(!is_valid_bluetooth_address("04:B8:0E:20:AA:01:02"));
        assert!(!is_valid_bluetooth_address(""));
        assert!(!is_valid_bluetooth_address("None"));
    }

    #[test]
    fn rejects_non_hex_groups() {
        assert!(!is_valid_bluetooth_address("ZZ:00:00:00:00:00"));
        assert!(!is_valid_bluetooth_address("+F:00:00:00:00:00"));
        assert!(!is_valid_bluetooth_address("04:B8:0E:20:AA:"));
        assert!(!is_valid_bluetooth_address("100:00:00:00:00:00"));
        assert!(!is_valid_bluetooth_address(" 04:B8:0E:20:AA:01"));
    }

    #[test]
    fn parses_into_address_bytes() {
        let address = parse_bluetooth_address("04:b8:0e:20:aa:01").unwrap();
        assert_eq!(address, Address::new([0x04, 0xB8, 0x0E, 0x20, 0xAA, 0x01]));
        assert_eq!(address.to_string(), "04:B8:0E:20:AA:01");
    }
}
