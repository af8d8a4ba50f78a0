//! 행 이벤트 디코더
//!
//! wire 레벨의 WRITE/UPDATE/DELETE_ROWS 레코드를 테이블 메타데이터로
//! 이름을 붙인 `RowMutation` 으로 변환합니다. 물리적인 행 하나당 하나의 변경이
//! 만들어집니다 (multi-row INSERT는 여러 개).

use crate::error::{CdcError, Result};
use crate::events::{BinlogEventData, CellValue, RowsData, UpdateRowsData};
use crate::replication_event::{ColumnValue, Row, RowMutation};
use crate::table_cache::TableMetadataCache;
use chrono::DateTime;

/// 원시 행 변경 레코드
#[derive(Debug, Clone, PartialEq)]
pub enum RowsRecord {
    Insert(RowsData),
    Update(UpdateRowsData),
    Delete(RowsData),
}

impl RowsRecord {
    /// 행 이벤트면 레코드로, 아니면 원래 데이터를 그대로 돌려줌
    pub fn from_event(data: BinlogEventData) -> std::result::Result<Self, BinlogEventData> {
        match data {
            BinlogEventData::WriteRows(rows) => Ok(RowsRecord::Insert(rows)),
            BinlogEventData::UpdateRows(rows) => Ok(RowsRecord::Update(rows)),
            BinlogEventData::DeleteRows(rows) => Ok(RowsRecord::Delete(rows)),
            other => Err(other),
        }
    }

    pub fn table_id(&self) -> u64 {
        match self {
            RowsRecord::Insert(rows) | RowsRecord::Delete(rows) => rows.table_id,
            RowsRecord::Update(rows) => rows.table_id,
        }
    }
}

/// 행 이벤트 디코더
pub struct RowEventDecoder;

impl RowEventDecoder {
    /// 레코드를 행 변경 목록으로 변환
    ///
    /// 캐시에 없는 테이블 ID는 `ProtocolOrderingViolation` 으로, 표현할 수 없는
    /// 값이 들어 있으면 `BinlogParse` 로 실패합니다.
    pub fn decode(cache: &TableMetadataCache, record: RowsRecord) -> Result<Vec<RowMutation>> {
        let descriptor = cache.get(record.table_id())?;
        let (schema, table) = (descriptor.schema.as_str(), descriptor.table.as_str());

        match record {
            RowsRecord::Insert(data) => data
                .rows
                .into_iter()
                .map(|row| Ok(RowMutation::insert(schema, table, normalize_row(row)?)))
                .collect(),
            RowsRecord::Update(data) => data
                .rows
                .into_iter()
                .map(|(before, after)| {
                    Ok(RowMutation::update(
                        schema,
                        table,
                        normalize_row(before)?,
                        normalize_row(after)?,
                    ))
                })
                .collect(),
            RowsRecord::Delete(data) => data
                .rows
                .into_iter()
                .map(|row| Ok(RowMutation::delete(schema, table, normalize_row(row)?)))
                .collect(),
        }
    }
}

fn normalize_row(row: Vec<CellValue>) -> Result<Row> {
    row.into_iter().map(normalize_value).collect()
}

/// 문자열 래퍼 타입만 일반 문자열로 바꾸고 나머지는 그대로 전달
pub fn normalize_value(value: CellValue) -> Result<ColumnValue> {
    let value = match value {
        CellValue::Null => ColumnValue::Null,
        CellValue::Int(v) => ColumnValue::Int(v),
        CellValue::UInt(v) => ColumnValue::UInt(v),
        CellValue::Float(v) => ColumnValue::Float(v),
        CellValue::Double(v) => ColumnValue::Double(v),
        CellValue::Bytes(v) => ColumnValue::Bytes(v),
        // UTF-8이 아니면 바이트 그대로
        CellValue::Text(bytes) => match String::from_utf8(bytes) {
            Ok(s) => ColumnValue::String(s),
            Err(e) => ColumnValue::Bytes(e.into_bytes()),
        },
        CellValue::Decimal(s) | CellValue::Date(s) | CellValue::Time(s) | CellValue::DateTime(s) => {
            ColumnValue::String(s)
        }
        CellValue::Timestamp { seconds, micros } => {
            let ts = DateTime::from_timestamp(i64::from(seconds), micros.saturating_mul(1000))
                .filter(|_| micros < 1_000_000)
                .ok_or_else(|| {
                    CdcError::BinlogParse(format!(
                        "TIMESTAMP out of range: {}.{:06}",
                        seconds, micros
                    ))
                })?;
            ColumnValue::Timestamp(ts)
        }
    };

    Ok(value)
}
