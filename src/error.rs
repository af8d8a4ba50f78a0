//! CDC 관련 에러 타입

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("MySQL 연결 에러: {0}")]
    Connection(String),

    #[error("Timeout 에러")]
    Timeout,

    #[error("잘못된 상태: {0}")]
    IllegalState(String),

    /// TABLE_MAP 이벤트 없이 행 이벤트가 도착한 경우 (프로토콜 순서 위반)
    #[error("알 수 없는 테이블 ID {table_id}: TABLE_MAP 이벤트가 먼저 도착해야 합니다")]
    ProtocolOrderingViolation { table_id: u64 },

    #[error("Binlog 파싱 에러: {0}")]
    BinlogParse(String),

    #[error("쿼리 실행 에러: {0}")]
    Query(String),

    #[error("I/O 에러: {0}")]
    Io(String),

    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CdcError {
    /// connect()/disconnect()가 호출자에게 돌려주는 연결 계열 에러인지 여부
    pub fn is_connection_error(&self) -> bool {
        matches!(self, CdcError::Connection(_) | CdcError::Timeout)
    }
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_kinds() {
        assert!(CdcError::Connection("refused".to_string()).is_connection_error());
        assert!(CdcError::Timeout.is_connection_error());
        assert!(!CdcError::ProtocolOrderingViolation { table_id: 7 }.is_connection_error());
    }

    #[test]
    fn test_ordering_violation_message() {
        let err = CdcError::ProtocolOrderingViolation { table_id: 42 };
        assert!(err.to_string().contains("42"));
    }
}
