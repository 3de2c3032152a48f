//! Layer merging.

/// Recursively merge `overlay` into `base`.
///
/// Tables merge key by key. Scalars and arrays from the overlay replace the
/// base value, so a workspace `allow_patterns` list replaces the user's list
/// rather than extending it.
pub fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_tables_merge_per_key() {
        let mut base = parse("[approval]\nlow_timeout_secs = 120\nhigh_timeout_secs = 600\n");
        deep_merge(&mut base, &parse("[approval]\nhigh_timeout_secs = 60\n"));
        assert_eq!(base["approval"]["low_timeout_secs"].as_integer(), Some(120));
        assert_eq!(base["approval"]["high_timeout_secs"].as_integer(), Some(60));
    }

    #[test]
    fn test_arrays_replace() {
        let mut base = parse("[agents.coder.bash]\nallow_patterns = [\"git *\", \"ls\"]\n");
        deep_merge(
            &mut base,
            &parse("[agents.coder.bash]\nallow_patterns = [\"cargo *\"]\n"),
        );
        let list = base["agents"]["coder"]["bash"]["allow_patterns"]
            .as_array()
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].as_str(), Some("cargo *"));
    }

    #[test]
    fn test_new_keys_are_added() {
        let mut base = parse("[agents.coder]\n");
        deep_merge(&mut base, &parse("[agents.reviewer.files.read]\ndefault = \"allow\"\n"));
        let agents = base["agents"].as_table().unwrap();
        assert!(agents.contains_key("coder"));
        assert!(agents.contains_key("reviewer"));
    }
}
