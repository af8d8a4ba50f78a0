//! MySQL 복제 스트림 CDC (Change Data Capture) 클라이언트
//!
//! MySQL 바이너리 로그를 복제 프로토콜로 읽어 행 변경을 디코딩하고,
//! 트랜잭션 단위로 묶어 등록된 리스너에게 전달합니다.
//! 주요 기능:
//! - Binlog 프로토콜 파싱
//! - 테이블 메타데이터 기반 행 변경 복원
//! - 트랜잭션 단위 이벤트 묶음
//! - 리스너 등록 및 장애 격리
//! - 재시작 위치 관리

pub mod auth;
pub mod binlog;
pub mod binlog_client;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod events;
pub mod listener;
pub mod position;
pub mod protocol;
pub mod replication_event;
pub mod source;
pub mod stream;
pub mod table_cache;
pub mod transaction;

pub use binlog_client::MySqlBinlogSource;
pub use connection::ConnectionConfig;
pub use error::{CdcError, Result};
pub use events::{BinlogEvent, EventType};
pub use listener::{ListenerError, ListenerRegistry, ReplicationListener};
pub use position::Position;
pub use replication_event::{ColumnValue, MutationKind, ReplicationEvent, RowMutation};
pub use source::{EventSource, SourceListener};
pub use stream::{ReplicationStream, StreamConfig};
