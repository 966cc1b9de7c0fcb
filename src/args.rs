//! Additional request arguments
//!
//! Arguments travel in a single path segment as `arg1=val1;arg2=val2`.

use std::collections::BTreeMap;
use std::fmt;

const ARGS_DELIMITER: char = ';';
const ARGS_EQUAL: char = '=';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(BTreeMap<String, String>);

impl Args {
    /// Parse arguments, skipping components that are not exactly `key=value`
    pub fn parse(s: &str) -> Self {
        let mut args = BTreeMap::new();
        for component in s.split(ARGS_DELIMITER) {
            let kv: Vec<&str> = component.split(ARGS_EQUAL).collect();
            if kv.len() != 2 {
                continue;
            }
            args.insert(kv[0].to_string(), kv[1].to_string());
        }
        Args(args)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.parse().ok()
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key)?.parse().ok()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ARGS_DELIMITER)?;
            }
            write!(f, "{}{}{}", k, ARGS_EQUAL, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::parse("keystamp=1700000000-48ca001d3b;fileindex=42;xres=org");
        assert_eq!(args.len(), 3);
        assert_eq!(args.get("keystamp"), Some("1700000000-48ca001d3b"));
        assert_eq!(args.get_i64("fileindex"), Some(42));
        assert_eq!(args.get_u32("xres"), None);
        assert_eq!(args.get("missing"), None);
    }

    #[test]
    fn test_parse_skips_malformed_pairs() {
        let args = Args::parse("novalue;a=b=c;;ok=1;=empty");
        assert_eq!(args.get("ok"), Some("1"));
        assert_eq!(args.get("a"), None);
        assert_eq!(args.get("novalue"), None);
        // an empty key still splits into exactly two parts
        assert_eq!(args.get(""), Some("empty"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parse_empty() {
        assert!(Args::parse("").is_empty());
    }

    #[test]
    fn test_display_is_sorted() {
        let mut args = Args::default();
        args.insert("z", "1");
        args.insert("a", "2");
        assert_eq!(args.to_string(), "a=2;z=1");
        assert_eq!(Args::parse(&args.to_string()), args);
    }
}
