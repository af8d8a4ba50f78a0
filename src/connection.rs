//! MySQL 연결 설정 및 SQL 연결

use crate::error::{CdcError, Result};
use crate::position::Position;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// MySQL 연결 설정
#[derive(Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    /// 복제 클라이언트의 server_id (서버의 다른 replica와 겹치면 안 됨)
    pub server_id: u32,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            server_id: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

// 비밀번호는 로그에 남기지 않음
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("server_id", &self.server_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.username = username.into();
        self.password = password.into();
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    fn build_opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone())
            .into()
    }
}

/// SQL 연결 래퍼 (복제 스트림 외의 조회용)
pub struct MySqlConnection {
    conn: Conn,
}

impl MySqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = Conn::new(config.build_opts()).await.map_err(|e| {
            CdcError::Connection(format!("Failed to connect to {}: {}", config.address(), e))
        })?;

        debug!("SQL connection established to {}", config.address());
        Ok(MySqlConnection { conn })
    }

    /// 서버의 현재 binlog 위치 조회
    ///
    /// MySQL 8.4부터는 `SHOW BINARY LOG STATUS`, 이전 버전은 `SHOW MASTER STATUS`.
    pub async fn get_binlog_status(&mut self) -> Result<BinlogStatus> {
        let row: Option<mysql_async::Row> = match self.conn.query_first("SHOW BINARY LOG STATUS").await {
            Ok(row) => row,
            Err(e) => {
                debug!("SHOW BINARY LOG STATUS failed ({}), falling back to SHOW MASTER STATUS", e);
                self.conn
                    .query_first("SHOW MASTER STATUS")
                    .await
                    .map_err(|e| CdcError::Query(format!("Failed to query binlog status: {}", e)))?
            }
        };

        let row = row.ok_or_else(|| {
            CdcError::Query("No binlog status available (is log_bin enabled?)".to_string())
        })?;

        let file: String = row
            .get(0)
            .ok_or_else(|| CdcError::Query("Missing binlog file column".to_string()))?;
        let position: u64 = row
            .get(1)
            .ok_or_else(|| CdcError::Query("Missing binlog position column".to_string()))?;

        Ok(BinlogStatus { file, position })
    }

    /// 변수 조회
    pub async fn get_variable(&mut self, name: &str) -> Result<Option<String>> {
        let result: Option<(String, String)> = self
            .conn
            .exec_first("SHOW GLOBAL VARIABLES LIKE ?", (name,))
            .await
            .map_err(|e| CdcError::Query(format!("Failed to query {}: {}", name, e)))?;

        Ok(result.map(|(_, v)| v))
    }

    /// Binlog 형식 확인 (ROW, STATEMENT, MIXED)
    pub async fn get_binlog_format(&mut self) -> Result<String> {
        self.get_variable("binlog_format")
            .await?
            .ok_or_else(|| CdcError::Query("Binlog format not found".to_string()))
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(|e| CdcError::Connection(format!("Failed to close connection: {}", e)))
    }
}

/// Binlog 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogStatus {
    pub file: String,
    pub position: u64,
}

impl BinlogStatus {
    pub fn to_position(&self) -> Position {
        Position::new(self.file.clone(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.hostname, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.address(), "localhost:3306");
    }

    #[test]
    fn test_connection_config_new() {
        let config = ConnectionConfig::new("127.0.0.1", "root");
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.username, "root");
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config = ConnectionConfig::new("db", "repl");
        config.set_credentials("repl", "s3cret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("repl"));
    }

    #[test]
    fn test_binlog_status_to_position() {
        let status = BinlogStatus {
            file: "mysql-bin.000003".to_string(),
            position: 4097,
        };
        assert_eq!(status.to_position().to_string(), "mysql-bin.000003#4097");
    }
}
