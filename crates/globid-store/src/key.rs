use std::fmt;

const KEY_TAG: &[u8] = b"gid\0";

/// Cache key of one global-id sequence, derived from (schema, table, column).
///
/// Every segment is length-prefixed, so two different triples can never
/// encode to the same bytes (`("ab", "cd", "x")` and `("a", "bcd", "x")`
/// stay distinct).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(Vec<u8>);

impl CounterKey {
    pub fn new(schema: &str, table: &str, column: &str) -> Self {
        let mut bytes =
            Vec::with_capacity(KEY_TAG.len() + 12 + schema.len() + table.len() + column.len());
        bytes.extend_from_slice(KEY_TAG);
        for segment in [schema, table, column] {
            bytes.extend_from_slice(&(segment.len() as u32).to_le_bytes());
            bytes.extend_from_slice(segment.as_bytes());
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CounterKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}
