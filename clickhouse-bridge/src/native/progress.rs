use crate::Result;
use crate::io::ClickHouseRead;
use crate::native::protocol::{
    DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO, DBMS_MIN_REVISION_WITH_SERVER_LOGS,
};

/// Query execution progress.
/// Values are delta and must be summed.
///
/// See <https://clickhouse.com/codebrowser/ClickHouse/src/IO/Progress.h.html>
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub read_rows:          u64,
    pub read_bytes:         u64,
    pub total_rows_to_read: u64,
    pub written_rows:       Option<u64>,
    pub written_bytes:      Option<u64>,
}

impl Progress {
    pub(crate) async fn read<R: ClickHouseRead>(reader: &mut R, revision: u64) -> Result<Self> {
        let read_rows = reader.read_var_uint().await?;
        let read_bytes = reader.read_var_uint().await?;
        let total_rows_to_read = if revision >= DBMS_MIN_REVISION_WITH_SERVER_LOGS {
            reader.read_var_uint().await?
        } else {
            0
        };
        let (written_rows, written_bytes) = if revision >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            (Some(reader.read_var_uint().await?), Some(reader.read_var_uint().await?))
        } else {
            (None, None)
        };
        Ok(Progress { read_rows, read_bytes, total_rows_to_read, written_rows, written_bytes })
    }
}

impl std::ops::Add for Progress {
    type Output = Progress;

    fn add(self, rhs: Self) -> Self::Output {
        let sum_opt = |a: Option<u64>, b: Option<u64>| match (a, b) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        Progress {
            read_rows:          self.read_rows + rhs.read_rows,
            read_bytes:         self.read_bytes + rhs.read_bytes,
            total_rows_to_read: self.total_rows_to_read + rhs.total_rows_to_read,
            written_rows:       sum_opt(self.written_rows, rhs.written_rows),
            written_bytes:      sum_opt(self.written_bytes, rhs.written_bytes),
        }
    }
}

impl std::ops::AddAssign for Progress {
    fn add_assign(&mut self, rhs: Self) { *self = *self + rhs; }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "read {} rows / {} bytes of {} | written {} rows / {} bytes",
            self.read_rows,
            self.read_bytes,
            self.total_rows_to_read,
            self.written_rows.unwrap_or_default(),
            self.written_bytes.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::io::ClickHouseWrite;
    use crate::native::protocol::DBMS_TCP_PROTOCOL_VERSION;

    #[tokio::test]
    async fn test_read_and_accumulate() {
        let mut buf = Vec::new();
        for v in [10, 100, 1000, 0, 0] {
            buf.write_var_uint(v).await.unwrap();
        }
        let mut reader = Cursor::new(buf);
        let progress = Progress::read(&mut reader, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        assert_eq!(progress.read_rows, 10);
        assert_eq!(progress.total_rows_to_read, 1000);
        assert_eq!(progress.written_rows, Some(0));

        let mut total = Progress::default();
        total += progress;
        total += progress;
        assert_eq!(total.read_rows, 20);
        assert_eq!(total.read_bytes, 200);
    }
}
