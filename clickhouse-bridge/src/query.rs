use std::fmt;

use uuid::Uuid;

use crate::Result;
use crate::io::ClickHouseWrite;

/// Identifier of a single query, sent to the server and attached to tracing spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Qid(Uuid);

impl Default for Qid {
    fn default() -> Self { Self::new() }
}

impl Qid {
    /// Generate a new `v4` [`Uuid`]
    pub fn new() -> Self { Self(Uuid::new_v4()) }

    /// Take the inner [`Uuid`]
    pub fn into_inner(self) -> Uuid { self.0 }

    // 32-char hex string, no heap allocation
    pub(crate) async fn write_id<W: ClickHouseWrite>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; 32];
        let hex = self.0.as_simple().encode_lower(&mut buffer);
        writer.write_string(hex).await
    }
}

impl From<Uuid> for Qid {
    fn from(id: Uuid) -> Self { Self(id) }
}

impl fmt::Display for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0.as_simple()) }
}

/// Whether `sql` is an `INSERT` statement, ignoring leading whitespace and comments.
pub(crate) fn is_insert(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            break;
        }
    }
    rest.get(..6).is_some_and(|keyword| keyword.eq_ignore_ascii_case("insert"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::io::ClickHouseRead;

    #[tokio::test]
    async fn test_qid_wire_format() {
        let qid = Qid::new();
        let mut buf = Vec::new();
        qid.write_id(&mut buf).await.unwrap();
        let id = Cursor::new(buf).read_utf8_string().await.unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(id, qid.to_string());
    }

    #[test]
    fn test_is_insert() {
        assert!(is_insert("INSERT INTO t VALUES (1)"));
        assert!(is_insert("  insert into t values (1)"));
        assert!(is_insert("-- load\n/* rows */ Insert INTO t VALUES"));
        assert!(!is_insert("SELECT 'INSERT'"));
        assert!(!is_insert("ins"));
    }
}
