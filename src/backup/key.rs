// influxbackup/src/backup/key.rs

/// Turns a logical object name into the key actually used in the bucket.
pub trait KeyDeriver {
    fn derive_key(&self, symbol: &str) -> String;
}

/// Prefixes a key with (at most) the first eight hex characters of its own
/// bytes, so that keys spread across storage partitions instead of piling up
/// under a common `dump_` prefix.
///
/// Example: `thisIsTheValue` becomes `74686973_thisIsTheValue`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexKeyDeriver;

const MAX_PREFIX_LEN: usize = 8;

impl KeyDeriver for HexKeyDeriver {
    fn derive_key(&self, symbol: &str) -> String {
        // Four bytes are enough to fill the prefix.
        let head = &symbol.as_bytes()[..symbol.len().min(MAX_PREFIX_LEN / 2)];
        format!("{}_{}", hex::encode(head), symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_symbol_uses_whole_hex_encoding() {
        assert_eq!(HexKeyDeriver.derive_key("key"), "6b6579_key");
    }

    #[test]
    fn long_symbol_prefix_is_truncated_to_eight_chars() {
        assert_eq!(
            HexKeyDeriver.derive_key("thisIsTheValue"),
            "74686973_thisIsTheValue"
        );
    }

    #[test]
    fn prefix_matches_truncated_full_encoding() {
        let symbol = "dump_20240131235959.tar.gz";
        let full = hex::encode(symbol);
        assert_eq!(
            HexKeyDeriver.derive_key(symbol),
            format!("{}_{}", &full[..8], symbol)
        );
    }

    #[test]
    fn multibyte_symbol_is_split_on_bytes() {
        // "é" is two bytes, so four bytes cover "éé".
        assert_eq!(HexKeyDeriver.derive_key("ééé"), "c3a9c3a9_ééé");
    }

    #[test]
    fn empty_symbol_has_empty_prefix() {
        assert_eq!(HexKeyDeriver.derive_key(""), "_");
    }
}
