//! Binlog 처리 위치 (재시작 지점)
//!
//! Binlog 파일명 + 오프셋으로 정확한 재시작 지점을 표현합니다.
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치

use crate::error::{CdcError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// MySQL binlog은 4 바이트 매직 넘버 다음부터 이벤트가 시작됨
pub const BINLOG_START_OFFSET: u64 = 4;

/// 복제 스트림 위치
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    file_name: String,
    /// 바이트 오프셋
    offset: u64,
}

impl Position {
    pub fn new(file_name: impl Into<String>, offset: u64) -> Self {
        Position {
            file_name: file_name.into(),
            offset,
        }
    }

    /// 파일의 첫 이벤트 위치
    pub fn start_of(file_name: impl Into<String>) -> Self {
        Position::new(file_name, BINLOG_START_OFFSET)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 파일명에서 시퀀스 번호 추출
    pub fn file_sequence(&self) -> Option<u64> {
        self.file_name
            .rsplit('.')
            .next()
            .and_then(|s| s.parse().ok())
    }

    /// 같은 파일 안에서 오프셋만 전진한 위치
    pub fn with_offset(&self, offset: u64) -> Self {
        Position::new(self.file_name.clone(), offset)
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_sequence()
            .cmp(&other.file_sequence())
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file_name, self.offset)
    }
}

/// "file#offset" 또는 "file:offset" 형식 파싱
impl FromStr for Position {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        let (file_name, offset) = s
            .rsplit_once('#')
            .or_else(|| s.rsplit_once(':'))
            .ok_or_else(|| CdcError::IllegalState(format!("Invalid position: {}", s)))?;

        if file_name.is_empty() {
            return Err(CdcError::IllegalState(format!(
                "Invalid position (empty file name): {}",
                s
            )));
        }

        let offset = offset
            .parse()
            .map_err(|_| CdcError::IllegalState(format!("Invalid position offset: {}", s)))?;

        Ok(Position::new(file_name, offset))
    }
}
