use std::str::FromStr;

use alloy_primitives::{utils::format_units, Address, U256};
use alloy_sol_types::sol;

use crate::error::{ChainError, Result};

sol! {
    /// ERC20 surface plus the owner-only `mint` the bot relies on.
    interface IMintableToken {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256 balance);
        function transfer(address to, uint256 value) external returns (bool);
        function mint(address to, uint256 amount) external;
    }
}

/// Parses a `0x`-prefixed address. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lowercase or all-uppercase input is accepted as is.
pub fn parse_address(text: &str) -> Result<Address> {
    let invalid = || ChainError::InvalidAddress(text.to_string());

    let digits = text.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(text, None).map_err(|_| invalid())
    } else {
        Address::from_str(text).map_err(|_| invalid())
    }
}

/// Renders a wei amount as ether with six decimals, truncating the rest.
pub fn format_ether(wei: U256) -> String {
    let ether = match format_units(wei, "ether") {
        Ok(ether) => ether,
        Err(_) => return format!("{} wei", wei),
    };
    let (whole, fraction) = ether.split_once('.').unwrap_or((ether.as_str(), ""));
    format!("{}.{:0<6.6}", whole, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn accepts_checksummed_and_single_case_addresses() {
        let checksummed = parse_address(CHECKSUMMED).unwrap();
        let lower = parse_address(&CHECKSUMMED.to_lowercase()).unwrap();
        assert_eq!(checksummed, lower);

        let upper = format!("0x{}", CHECKSUMMED[2..].to_uppercase());
        assert_eq!(parse_address(&upper).unwrap(), checksummed);
    }

    #[test]
    fn rejects_bad_checksum_and_malformed_input() {
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD").is_err());
        assert!(parse_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzzzzb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(parse_address("alice").is_err());
    }

    #[test]
    fn formats_ether_with_six_decimals() {
        assert_eq!(format_ether(U256::ZERO), "0.000000");
        assert_eq!(format_ether(U256::from(1u64)), "0.000000");
        assert_eq!(format_ether(U256::from(100_000_000_000_000_000u64)), "0.100000");
        assert_eq!(format_ether(U256::from(1_500_000_000_000_000_000u64)), "1.500000");
        assert_eq!(format_ether(U256::from(1_234_567_890_000_000_000u64)), "1.234567");

        let whale = U256::from(12_345_678u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(format_ether(whale), "12345678.000000");
    }
}
