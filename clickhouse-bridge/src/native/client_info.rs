use tokio::io::AsyncWriteExt;

use crate::Result;
use crate::constants::{CLIENT_NAME, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};
use crate::io::ClickHouseWrite;
use crate::native::protocol::{
    DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH,
    DBMS_MIN_PROTOCOL_VERSION_WITH_PARALLEL_REPLICAS,
    DBMS_MIN_PROTOCOL_VERSION_WITH_QUERY_START_TIME,
    DBMS_MIN_REVISION_WITH_OPENTELEMETRY, DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO,
    DBMS_MIN_REVISION_WITH_VERSION_PATCH, DBMS_TCP_PROTOCOL_VERSION,
};

const QUERY_KIND_INITIAL: u8 = 1;
const INTERFACE_TCP: u8 = 1;

/// Identity of the client sent along with every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClientInfo {
    pub(crate) os_user:         String,
    pub(crate) client_hostname: String,
    pub(crate) client_name:     String,
    pub(crate) quota_key:       String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            os_user:         whoami::username(),
            client_hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "localhost".to_string()),
            client_name:     CLIENT_NAME.to_string(),
            quota_key:       String::new(),
        }
    }
}

impl ClientInfo {
    pub(crate) async fn write<W: ClickHouseWrite>(&self, writer: &mut W, revision: u64) -> Result<()> {
        writer.write_u8(QUERY_KIND_INITIAL).await?;
        writer.write_string("").await?; // initial user
        writer.write_string("").await?; // initial query id
        writer.write_string("0.0.0.0:0").await?; // initial address
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_QUERY_START_TIME {
            writer.write_i64_le(chrono::Utc::now().timestamp_micros()).await?;
        }
        writer.write_u8(INTERFACE_TCP).await?;
        writer.write_string(&self.os_user).await?;
        writer.write_string(&self.client_hostname).await?;
        writer.write_string(&self.client_name).await?;
        writer.write_var_uint(VERSION_MAJOR).await?;
        writer.write_var_uint(VERSION_MINOR).await?;
        writer.write_var_uint(DBMS_TCP_PROTOCOL_VERSION).await?;
        if revision >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
            writer.write_string(&self.quota_key).await?;
        }
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH {
            writer.write_var_uint(0).await?;
        }
        if revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            writer.write_var_uint(VERSION_PATCH).await?;
        }
        if revision >= DBMS_MIN_REVISION_WITH_OPENTELEMETRY {
            writer.write_u8(0).await?; // no trace context
        }
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_PARALLEL_REPLICAS {
            writer.write_var_uint(0).await?; // collaborate_with_initiator
            writer.write_var_uint(0).await?; // count_participating_replicas
            writer.write_var_uint(0).await?; // number_of_current_replica
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::io::ClickHouseRead;

    #[tokio::test]
    async fn test_client_info_layout() {
        let info = ClientInfo {
            os_user:         "analyst".into(),
            client_hostname: "box".into(),
            client_name:     "bridge".into(),
            quota_key:       String::new(),
        };
        let mut buf = Vec::new();
        info.write(&mut buf, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();

        let mut reader = Cursor::new(buf);
        assert_eq!(reader.read_u8().await.unwrap(), QUERY_KIND_INITIAL);
        assert_eq!(reader.read_utf8_string().await.unwrap(), "");
        assert_eq!(reader.read_utf8_string().await.unwrap(), "");
        assert_eq!(reader.read_utf8_string().await.unwrap(), "0.0.0.0:0");
        let _ = reader.read_i64_le().await.unwrap();
        assert_eq!(reader.read_u8().await.unwrap(), INTERFACE_TCP);
        assert_eq!(reader.read_utf8_string().await.unwrap(), "analyst");
        assert_eq!(reader.read_utf8_string().await.unwrap(), "box");
        assert_eq!(reader.read_utf8_string().await.unwrap(), "bridge");
        assert_eq!(reader.read_var_uint().await.unwrap(), VERSION_MAJOR);
        assert_eq!(reader.read_var_uint().await.unwrap(), VERSION_MINOR);
        assert_eq!(reader.read_var_uint().await.unwrap(), DBMS_TCP_PROTOCOL_VERSION);
        assert_eq!(reader.read_utf8_string().await.unwrap(), "");
        assert_eq!(reader.read_var_uint().await.unwrap(), 0);
        assert_eq!(reader.read_var_uint().await.unwrap(), VERSION_PATCH);
        assert_eq!(reader.read_u8().await.unwrap(), 0);
        for _ in 0..3 {
            assert_eq!(reader.read_var_uint().await.unwrap(), 0);
        }
        let mut rest = Vec::new();
        let _ = reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
