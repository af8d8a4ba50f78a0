//! MySQL Binlog 이벤트 타입 및 데이터 구조 정의 (wire 레벨)
//!
//! 업스트림 이벤트 소스가 내부 리스너에게 전달하는 원시 이벤트입니다.
//! 애플리케이션 레벨 이벤트는 `replication_event` 모듈을 참고하세요.

use serde::{Deserialize, Serialize};

/// MySQL Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// 알 수 없는 이벤트
    Unknown = 0,
    /// 쿼리 이벤트 (DDL, BEGIN)
    QueryEvent = 2,
    /// 정지 이벤트
    StopEvent = 3,
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent = 4,
    /// 포맷 설명 이벤트 (파일 첫 이벤트)
    FormatDescriptionEvent = 15,
    /// XID 이벤트 (트랜잭션 커밋)
    XidEvent = 16,
    /// 테이블 맵 이벤트 (스키마 정보)
    TableMapEvent = 19,
    /// WRITE_ROWS v1 (INSERT)
    WriteRowsEventV1 = 23,
    /// UPDATE_ROWS v1 (UPDATE)
    UpdateRowsEventV1 = 24,
    /// DELETE_ROWS v1 (DELETE)
    DeleteRowsEventV1 = 25,
    /// 하트비트 이벤트
    HeartbeatEvent = 27,
    /// WRITE_ROWS v2 (INSERT)
    WriteRowsEvent = 30,
    /// UPDATE_ROWS v2 (UPDATE)
    UpdateRowsEvent = 31,
    /// DELETE_ROWS v2 (DELETE)
    DeleteRowsEvent = 32,
    /// GTID 이벤트
    GtidEvent = 33,
    /// 익명 GTID 이벤트
    AnonymousGtidEvent = 34,
    /// Rows Query 이벤트 (원본 쿼리)
    RowsQueryEvent = 36,
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::QueryEvent,
            3 => EventType::StopEvent,
            4 => EventType::RotateEvent,
            15 => EventType::FormatDescriptionEvent,
            16 => EventType::XidEvent,
            19 => EventType::TableMapEvent,
            23 => EventType::WriteRowsEventV1,
            24 => EventType::UpdateRowsEventV1,
            25 => EventType::DeleteRowsEventV1,
            27 => EventType::HeartbeatEvent,
            30 => EventType::WriteRowsEvent,
            31 => EventType::UpdateRowsEvent,
            32 => EventType::DeleteRowsEvent,
            33 => EventType::GtidEvent,
            34 => EventType::AnonymousGtidEvent,
            36 => EventType::RowsQueryEvent,
            _ => EventType::Unknown,
        }
    }

    /// v2 행 이벤트는 추가 데이터 헤더를 가짐
    pub fn is_rows_v2(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsEvent | EventType::UpdateRowsEvent | EventType::DeleteRowsEvent
        )
    }
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (바이트)
    pub event_length: u32,
    /// 다음 이벤트 위치 (0이면 위치 정보 없음, e.g. fake rotate)
    pub next_pos: u32,
    /// 이벤트 플래그
    pub flags: u16,
}

impl EventHeader {
    /// 테스트 및 합성 이벤트용 헤더
    pub fn new(event_type: EventType, next_pos: u32) -> Self {
        EventHeader {
            timestamp: 0,
            event_type,
            server_id: 0,
            event_length: 0,
            next_pos,
            flags: 0,
        }
    }
}

/// 테이블 맵 정보 (컬럼 메타데이터)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapData {
    /// 테이블 ID
    pub table_id: u64,
    /// 데이터베이스명
    pub database: String,
    /// 테이블명
    pub table: String,
    /// 컬럼 타입들
    pub column_types: Vec<u8>,
    /// 컬럼별 메타데이터 (길이, 정밀도 등)
    pub column_meta: Vec<u16>,
    /// nullable 비트맵
    pub nullable_bitmap: Vec<u8>,
}

impl TableMapData {
    pub fn column_count(&self) -> usize {
        self.column_types.len()
    }
}

/// WRITE_ROWS / DELETE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 플래그
    pub flags: u16,
    /// 컬럼 개수
    pub column_count: u64,
    /// 사용된 컬럼 비트맵
    pub columns_present: Vec<u8>,
    /// 행 데이터들
    pub rows: Vec<Vec<CellValue>>,
}

/// UPDATE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 플래그
    pub flags: u16,
    /// 컬럼 개수
    pub column_count: u64,
    /// 변경 전 이미지 컬럼 비트맵
    pub columns_present: Vec<u8>,
    /// 변경 후 이미지 컬럼 비트맵
    pub columns_changed: Vec<u8>,
    /// 변경 전후 데이터 쌍들
    pub rows: Vec<(Vec<CellValue>, Vec<CellValue>)>,
}

/// 셀 값 (wire에서 디코딩된 그대로)
///
/// `Text`, `Decimal`, `Date`, `Time`, `DateTime`은 드라이버 레벨의 문자열 래퍼로,
/// 애플리케이션 이벤트로 변환될 때 일반 문자열로 정규화됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// CHAR/VARCHAR 원본 바이트 (문자셋 인코딩 그대로)
    Text(Vec<u8>),
    Bytes(Vec<u8>),
    Decimal(String),
    Date(String),
    Time(String),
    DateTime(String),
    /// TIMESTAMP (epoch 초 + 마이크로초)
    Timestamp { seconds: u32, micros: u32 },
}

/// 쿼리 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEventData {
    /// 스레드 ID
    pub thread_id: u32,
    /// 실행 시간 (초)
    pub exec_time: u32,
    /// 에러 코드
    pub error_code: u16,
    /// 데이터베이스명
    pub database: String,
    /// 쿼리 문자열
    pub query: String,
}

/// 회전 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateEventData {
    /// 새 바이너리 로그 파일명
    pub next_binlog_name: String,
    /// 새 파일의 시작 위치
    pub position: u64,
}

/// 포맷 설명 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptionData {
    pub binlog_version: u16,
    pub server_version: String,
    /// 체크섬 알고리즘 (0 = 없음, 1 = CRC32). 5.6.1 이전 서버는 `None`
    pub checksum_alg: Option<u8>,
}

/// 모든 Binlog 이벤트를 포함하는 열거형
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BinlogEventData {
    TableMap(TableMapData),
    WriteRows(RowsData),
    UpdateRows(UpdateRowsData),
    DeleteRows(RowsData),
    Query(QueryEventData),
    /// 트랜잭션 커밋 (XID)
    Xid(u64),
    Rotate(RotateEventData),
    FormatDescription(FormatDescriptionData),
    Heartbeat,
    Unknown(Vec<u8>),
}

/// 완성된 Binlog 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinlogEvent {
    /// 이벤트 헤더
    pub header: EventHeader,
    /// 이벤트 데이터
    pub data: BinlogEventData,
}

impl BinlogEvent {
    pub fn new(header: EventHeader, data: BinlogEventData) -> Self {
        BinlogEvent { header, data }
    }
}
