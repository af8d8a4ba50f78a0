//! MySQL Binlog 이벤트 파싱
//!
//! 각 이벤트:
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!   - Event Data (variable)
//!
//! 행 이미지를 디코딩하려면 컬럼 타입이 필요하므로, 파서는 TABLE_MAP 이벤트로
//! 받은 컬럼 정보를 테이블 ID별로 보관합니다.

use crate::error::{CdcError, Result};
use crate::events::*;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;

pub const EVENT_HEADER_SIZE: usize = 19;
const CHECKSUM_SIZE: usize = 4;

/// FORMAT_DESCRIPTION 고정 부분: binlog_version(2) + server_version(50) + timestamp(4) + header_length(1)
const FORMAT_DESCRIPTION_FIXED_SIZE: usize = 57;
const CHECKSUM_ALG_CRC32: u8 = 1;

/// wire에서 읽은 fsp(소수점 이하 자릿수) 상한
const MAX_FSP: u8 = 6;

/// MySQL 컬럼 타입 코드
pub mod column_type {
    pub const DECIMAL: u8 = 0;
    pub const TINY: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const LONG: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const NULL: u8 = 6;
    pub const TIMESTAMP: u8 = 7;
    pub const LONGLONG: u8 = 8;
    pub const INT24: u8 = 9;
    pub const DATE: u8 = 10;
    pub const TIME: u8 = 11;
    pub const DATETIME: u8 = 12;
    pub const YEAR: u8 = 13;
    pub const NEWDATE: u8 = 14;
    pub const VARCHAR: u8 = 15;
    pub const BIT: u8 = 16;
    pub const TIMESTAMP2: u8 = 17;
    pub const DATETIME2: u8 = 18;
    pub const TIME2: u8 = 19;
    pub const JSON: u8 = 245;
    pub const NEWDECIMAL: u8 = 246;
    pub const ENUM: u8 = 247;
    pub const SET: u8 = 248;
    pub const TINY_BLOB: u8 = 249;
    pub const MEDIUM_BLOB: u8 = 250;
    pub const LONG_BLOB: u8 = 251;
    pub const BLOB: u8 = 252;
    pub const VAR_STRING: u8 = 253;
    pub const STRING: u8 = 254;
    pub const GEOMETRY: u8 = 255;
}

/// Binlog 이벤트 파서
#[derive(Debug, Default)]
pub struct BinlogParser {
    /// 테이블 ID -> TABLE_MAP (행 디코딩용)
    tables: HashMap<u64, TableMapData>,
    /// 이벤트 끝에 CRC32 체크섬이 붙는지 여부
    checksum: bool,
}

impl BinlogParser {
    pub fn new() -> Self {
        BinlogParser::default()
    }

    /// 서버가 체크섬을 끄지 못한 경우 (CRC32가 이벤트 끝에 붙음)
    ///
    /// 이후 FORMAT_DESCRIPTION 이벤트가 알려 주는 알고리즘이 이 값을 덮어씁니다.
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// 이벤트 헤더 파싱
    pub fn parse_header(data: &[u8]) -> Result<EventHeader> {
        if data.len() < EVENT_HEADER_SIZE {
            return Err(CdcError::BinlogParse(
                "Invalid event header: too short".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let event_type = cursor.read_u8()?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_length = cursor.read_u32::<LittleEndian>()?;
        let next_pos = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        Ok(EventHeader {
            timestamp,
            event_type: EventType::from_u8(event_type),
            server_id,
            event_length,
            next_pos,
            flags,
        })
    }

    /// 헤더 + 본문으로 이루어진 이벤트 하나 파싱
    pub fn parse_event(&mut self, data: &[u8]) -> Result<BinlogEvent> {
        let header = Self::parse_header(data)?;

        let mut end = data.len();
        if self.checksum && header.event_type != EventType::FormatDescriptionEvent {
            end = end.saturating_sub(CHECKSUM_SIZE).max(EVENT_HEADER_SIZE);
        }
        let body = &data[EVENT_HEADER_SIZE..end];

        let event_data = match header.event_type {
            EventType::TableMapEvent => {
                let table_map = Self::parse_table_map_event(body)?;
                debug!(
                    "Table map: {}.{} (table_id={})",
                    table_map.database, table_map.table, table_map.table_id
                );
                self.tables.insert(table_map.table_id, table_map.clone());
                BinlogEventData::TableMap(table_map)
            }
            EventType::WriteRowsEvent | EventType::WriteRowsEventV1 => {
                BinlogEventData::WriteRows(self.parse_rows_event(body, header.event_type)?)
            }
            EventType::DeleteRowsEvent | EventType::DeleteRowsEventV1 => {
                BinlogEventData::DeleteRows(self.parse_rows_event(body, header.event_type)?)
            }
            EventType::UpdateRowsEvent | EventType::UpdateRowsEventV1 => {
                BinlogEventData::UpdateRows(self.parse_update_rows_event(body, header.event_type)?)
            }
            EventType::QueryEvent => BinlogEventData::Query(Self::parse_query_event(body)?),
            EventType::XidEvent => BinlogEventData::Xid(Cursor::new(body).read_u64::<LittleEndian>()?),
            EventType::RotateEvent => BinlogEventData::Rotate(Self::parse_rotate_event(body)?),
            EventType::FormatDescriptionEvent => {
                let format = Self::parse_format_description(body)?;
                if let Some(alg) = format.checksum_alg {
                    self.checksum = alg == CHECKSUM_ALG_CRC32;
                    debug!("Binlog checksum algorithm: {}", alg);
                }
                BinlogEventData::FormatDescription(format)
            }
            EventType::HeartbeatEvent => BinlogEventData::Heartbeat,
            _ => BinlogEventData::Unknown(body.to_vec()),
        };

        Ok(BinlogEvent::new(header, event_data))
    }

    /// 테이블 맵 이벤트 파싱 (19)
    pub fn parse_table_map_event(data: &[u8]) -> Result<TableMapData> {
        if data.len() < 8 {
            return Err(CdcError::BinlogParse(
                "Invalid table map event".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        let table_id = cursor.read_u48::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;

        let database = read_length_prefixed_name(&mut cursor)?;
        let table = read_length_prefixed_name(&mut cursor)?;

        // 컬럼 개수 및 타입
        let column_count = read_length(&mut cursor)?;
        let column_types = read_bytes(&mut cursor, column_count)?;

        // 컬럼 메타데이터 블록
        let metadata_length = read_length(&mut cursor)?;
        let metadata = read_bytes(&mut cursor, metadata_length)?;
        let column_meta = parse_column_metadata(&column_types, &metadata)?;

        // nullable bitmap
        let nullable_bitmap = read_bytes(&mut cursor, column_count.div_ceil(8))?;

        Ok(TableMapData {
            table_id,
            database,
            table,
            column_types,
            column_meta,
            nullable_bitmap,
        })
    }

    /// WRITE_ROWS / DELETE_ROWS 이벤트 파싱
    pub fn parse_rows_event(&self, data: &[u8], event_type: EventType) -> Result<RowsData> {
        let mut cursor = Cursor::new(data);
        let (table_id, flags, column_count) = read_rows_prefix(&mut cursor, event_type)?;
        let table_map = self.table(table_id)?;

        let bitmap_bytes = (column_count as usize).div_ceil(8);
        let columns_present = read_bytes(&mut cursor, bitmap_bytes)?;

        let mut rows = Vec::new();
        while (cursor.position() as usize) < data.len() {
            rows.push(parse_row_image(&mut cursor, table_map, &columns_present)?);
        }

        Ok(RowsData {
            table_id,
            flags,
            column_count,
            columns_present,
            rows,
        })
    }

    /// UPDATE_ROWS 이벤트 파싱
    pub fn parse_update_rows_event(
        &self,
        data: &[u8],
        event_type: EventType,
    ) -> Result<UpdateRowsData> {
        let mut cursor = Cursor::new(data);
        let (table_id, flags, column_count) = read_rows_prefix(&mut cursor, event_type)?;
        let table_map = self.table(table_id)?;

        let bitmap_bytes = (column_count as usize).div_ceil(8);
        let columns_present = read_bytes(&mut cursor, bitmap_bytes)?;
        let columns_changed = read_bytes(&mut cursor, bitmap_bytes)?;

        // 변경 전후 이미지가 번갈아 나옴
        let mut rows = Vec::new();
        while (cursor.position() as usize) < data.len() {
            let before = parse_row_image(&mut cursor, table_map, &columns_present)?;
            let after = parse_row_image(&mut cursor, table_map, &columns_changed)?;
            rows.push((before, after));
        }

        Ok(UpdateRowsData {
            table_id,
            flags,
            column_count,
            columns_present,
            columns_changed,
            rows,
        })
    }

    /// QUERY 이벤트 파싱 (2)
    pub fn parse_query_event(data: &[u8]) -> Result<QueryEventData> {
        if data.len() < 13 {
            return Err(CdcError::BinlogParse("Invalid query event".to_string()));
        }

        let mut cursor = Cursor::new(data);

        let thread_id = cursor.read_u32::<LittleEndian>()?;
        let exec_time = cursor.read_u32::<LittleEndian>()?;
        let db_len = cursor.read_u8()? as usize;
        let error_code = cursor.read_u16::<LittleEndian>()?;
        let status_len = cursor.read_u16::<LittleEndian>()? as u64;

        // Status variables skip
        cursor.set_position(cursor.position() + status_len);

        // 데이터베이스명
        let db_bytes = read_bytes(&mut cursor, db_len)?;
        let database = String::from_utf8_lossy(&db_bytes).to_string();

        // null terminator skip
        cursor.read_u8()?;

        let start = (cursor.position() as usize).min(data.len());
        let query = String::from_utf8_lossy(&data[start..]).to_string();

        Ok(QueryEventData {
            thread_id,
            exec_time,
            error_code,
            database,
            query,
        })
    }

    /// ROTATE 이벤트 파싱 (4)
    pub fn parse_rotate_event(data: &[u8]) -> Result<RotateEventData> {
        if data.len() < 8 {
            return Err(CdcError::BinlogParse("Invalid rotate event".to_string()));
        }

        let mut cursor = Cursor::new(data);

        let position = cursor.read_u64::<LittleEndian>()?;
        let filename = String::from_utf8_lossy(&data[8..])
            .trim_end_matches('\0')
            .to_string();

        Ok(RotateEventData {
            next_binlog_name: filename,
            position,
        })
    }

    /// FORMAT_DESCRIPTION 이벤트 파싱 (15)
    pub fn parse_format_description(data: &[u8]) -> Result<FormatDescriptionData> {
        if data.len() < 52 {
            return Err(CdcError::BinlogParse(
                "Invalid format description event".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);
        let binlog_version = cursor.read_u16::<LittleEndian>()?;
        let server_version = String::from_utf8_lossy(&data[2..52])
            .trim_end_matches('\0')
            .to_string();

        // 알고리즘 바이트 뒤에 CRC32 자리 4바이트가 항상 붙음
        let checksum_alg = if version_has_checksum(&server_version)
            && data.len() > FORMAT_DESCRIPTION_FIXED_SIZE + CHECKSUM_SIZE
        {
            Some(data[data.len() - CHECKSUM_SIZE - 1])
        } else {
            None
        };

        Ok(FormatDescriptionData {
            binlog_version,
            server_version,
            checksum_alg,
        })
    }

    fn table(&self, table_id: u64) -> Result<&TableMapData> {
        self.tables
            .get(&table_id)
            .ok_or(CdcError::ProtocolOrderingViolation { table_id })
    }
}

/// 5.6.1 이상이면 FORMAT_DESCRIPTION 에 체크섬 알고리즘이 실림
fn version_has_checksum(server_version: &str) -> bool {
    let mut parts = server_version
        .split(|c: char| !c.is_ascii_digit())
        .take(3)
        .map(|part| part.parse::<u32>().unwrap_or(0));
    let version = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    version >= (5, 6, 1)
}

/// 행 이벤트 공통 머리말: (table_id, flags, column_count)
fn read_rows_prefix(cursor: &mut Cursor<&[u8]>, event_type: EventType) -> Result<(u64, u16, u64)> {
    let table_id = cursor.read_u48::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;

    // v2 이벤트는 extra data 길이(자기 자신 2바이트 포함)가 붙음
    if event_type.is_rows_v2() {
        let extra_len = cursor.read_u16::<LittleEndian>()? as u64;
        cursor.set_position(cursor.position() + extra_len.saturating_sub(2));
    }

    let column_count = read_lcb(cursor)?;
    Ok((table_id, flags, column_count))
}

/// 길이 1바이트 + 이름 + null terminator
fn read_length_prefixed_name(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u8()? as usize;
    let bytes = read_bytes(cursor, len)?;
    cursor.read_u8()?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// 컬럼 타입별 메타데이터 디코딩
fn parse_column_metadata(column_types: &[u8], metadata: &[u8]) -> Result<Vec<u16>> {
    use column_type::*;

    let mut cursor = Cursor::new(metadata);
    let mut column_meta = Vec::with_capacity(column_types.len());

    for &col_type in column_types {
        let meta = match col_type {
            FLOAT | DOUBLE | BLOB | TINY_BLOB | MEDIUM_BLOB | LONG_BLOB | JSON | GEOMETRY
            | TIME2 | DATETIME2 | TIMESTAMP2 => cursor.read_u8()? as u16,
            VARCHAR | VAR_STRING | BIT => cursor.read_u16::<LittleEndian>()?,
            // (real_type << 8) | length, 또는 (precision << 8) | scale
            NEWDECIMAL | STRING | ENUM | SET => cursor.read_u16::<BigEndian>()?,
            _ => 0,
        };
        column_meta.push(meta);
    }

    Ok(column_meta)
}

/// 행 이미지 하나 파싱 (null 비트맵 + 존재하는 컬럼 값들)
fn parse_row_image(
    cursor: &mut Cursor<&[u8]>,
    table_map: &TableMapData,
    present_bitmap: &[u8],
) -> Result<Vec<CellValue>> {
    let column_count = table_map.column_count();
    let present_count: usize = present_bitmap.iter().map(|b| b.count_ones() as usize).sum();

    let null_bitmap = read_bytes(cursor, present_count.div_ceil(8))?;

    let mut row = Vec::with_capacity(present_count);
    let mut null_idx = 0;

    for col_idx in 0..column_count {
        if !is_bit_set(present_bitmap, col_idx) {
            continue;
        }

        if is_bit_set(&null_bitmap, null_idx) {
            row.push(CellValue::Null);
        } else {
            row.push(parse_cell(
                cursor,
                table_map.column_types[col_idx],
                table_map.column_meta.get(col_idx).copied().unwrap_or(0),
            )?);
        }
        null_idx += 1;
    }

    Ok(row)
}

/// 컬럼 값 하나 파싱
fn parse_cell(cursor: &mut Cursor<&[u8]>, col_type: u8, meta: u16) -> Result<CellValue> {
    use column_type::*;

    let value = match col_type {
        TINY => CellValue::Int(cursor.read_i8()? as i64),
        SHORT => CellValue::Int(cursor.read_i16::<LittleEndian>()? as i64),
        INT24 => CellValue::Int(cursor.read_i24::<LittleEndian>()? as i64),
        LONG => CellValue::Int(cursor.read_i32::<LittleEndian>()? as i64),
        LONGLONG => CellValue::Int(cursor.read_i64::<LittleEndian>()?),
        FLOAT => CellValue::Float(cursor.read_f32::<LittleEndian>()?),
        DOUBLE => CellValue::Double(cursor.read_f64::<LittleEndian>()?),
        NULL => CellValue::Null,
        YEAR => {
            let year = cursor.read_u8()? as u64;
            CellValue::UInt(if year == 0 { 0 } else { 1900 + year })
        }
        DATE | NEWDATE => {
            let packed = cursor.read_u24::<LittleEndian>()?;
            CellValue::Date(format!(
                "{:04}-{:02}-{:02}",
                (packed >> 9) & 0x7FFF,
                (packed >> 5) & 0x0F,
                packed & 0x1F
            ))
        }
        TIME => {
            let packed = cursor.read_u24::<LittleEndian>()?;
            CellValue::Time(format!(
                "{:02}:{:02}:{:02}",
                packed / 10000,
                (packed / 100) % 100,
                packed % 100
            ))
        }
        TIME2 => {
            let packed = cursor.read_u24::<BigEndian>()? as i64 - 0x800000;
            let micros = read_fractional_seconds(cursor, meta as u8)?;
            let value = packed.unsigned_abs();
            CellValue::Time(format!(
                "{}{:02}:{:02}:{:02}{}",
                if packed < 0 { "-" } else { "" },
                (value >> 12) & 0x3FF,
                (value >> 6) & 0x3F,
                value & 0x3F,
                format_fraction(micros, meta as u8)
            ))
        }
        DATETIME => {
            let packed = cursor.read_u64::<LittleEndian>()?;
            let date = packed / 1_000_000;
            let time = packed % 1_000_000;
            CellValue::DateTime(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date / 10000,
                (date / 100) % 100,
                date % 100,
                time / 10000,
                (time / 100) % 100,
                time % 100
            ))
        }
        DATETIME2 => {
            let packed = cursor.read_uint::<BigEndian>(5)?.wrapping_sub(0x80_0000_0000);
            let micros = read_fractional_seconds(cursor, meta as u8)?;
            let year_month = (packed >> 22) & 0x1FFFF;
            CellValue::DateTime(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
                year_month / 13,
                year_month % 13,
                (packed >> 17) & 0x1F,
                (packed >> 12) & 0x1F,
                (packed >> 6) & 0x3F,
                packed & 0x3F,
                format_fraction(micros, meta as u8)
            ))
        }
        TIMESTAMP => CellValue::Timestamp {
            seconds: cursor.read_u32::<LittleEndian>()?,
            micros: 0,
        },
        TIMESTAMP2 => {
            let seconds = cursor.read_u32::<BigEndian>()?;
            let micros = read_fractional_seconds(cursor, meta as u8)?;
            CellValue::Timestamp { seconds, micros }
        }
        VARCHAR | VAR_STRING => {
            let len = if meta < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            CellValue::Text(read_bytes(cursor, len)?)
        }
        STRING => {
            let real_type = (meta >> 8) as u8;
            if real_type == ENUM || real_type == SET {
                return parse_cell(cursor, real_type, meta & 0xFF);
            }
            // CHAR(N)의 최대 길이는 메타데이터 상위 비트에 섞여 있음
            let max_len = ((((meta >> 4) & 0x300) ^ 0x300) + (meta & 0xFF)) as usize;
            let len = if max_len < 256 {
                cursor.read_u8()? as usize
            } else {
                cursor.read_u16::<LittleEndian>()? as usize
            };
            CellValue::Text(read_bytes(cursor, len)?)
        }
        ENUM => {
            let value = match meta & 0xFF {
                1 => cursor.read_u8()? as u64,
                _ => cursor.read_u16::<LittleEndian>()? as u64,
            };
            CellValue::UInt(value)
        }
        SET => {
            let len = (meta & 0xFF) as usize;
            CellValue::UInt(cursor.read_uint::<LittleEndian>(len.clamp(1, 8))?)
        }
        BIT => {
            let nbits = ((meta >> 8) * 8 + (meta & 0xFF)) as usize;
            CellValue::Bytes(read_bytes(cursor, nbits.div_ceil(8))?)
        }
        BLOB | TINY_BLOB | MEDIUM_BLOB | LONG_BLOB | GEOMETRY | JSON => {
            // JSON은 MySQL 바이너리 JSON 포맷 그대로 전달
            let len_bytes = (meta as usize).clamp(1, 4);
            let len = cursor.read_uint::<LittleEndian>(len_bytes)? as usize;
            CellValue::Bytes(read_bytes(cursor, len)?)
        }
        NEWDECIMAL => CellValue::Decimal(decode_decimal(
            cursor,
            (meta >> 8) as usize,
            (meta & 0xFF) as usize,
        )?),
        other => {
            return Err(CdcError::BinlogParse(format!(
                "Unsupported column type: {}",
                other
            )))
        }
    };

    Ok(value)
}

/// LCB (Length-Coded Binary) 읽기
pub(crate) fn read_lcb(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let byte = cursor.read_u8()?;
    match byte {
        0..=0xfa => Ok(byte as u64),
        0xfb => Ok(0),
        0xfc => Ok(cursor.read_u16::<LittleEndian>()? as u64),
        0xfd => Ok(cursor.read_u24::<LittleEndian>()? as u64),
        0xfe => Ok(cursor.read_u64::<LittleEndian>()?),
        0xff => Err(CdcError::BinlogParse("Invalid LCB value".to_string())),
    }
}

/// LCB 길이 값. 남은 입력보다 길면 할당 전에 실패
fn read_length(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let len = read_lcb(cursor)?;
    usize::try_from(len)
        .map_err(|_| CdcError::BinlogParse(format!("Length out of range: {}", len)))
}

/// 길이가 wire에서 오므로 남은 입력을 넘으면 할당하지 않고 실패
fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor
        .get_ref()
        .len()
        .saturating_sub(cursor.position() as usize);
    if len > remaining {
        return Err(CdcError::BinlogParse(format!(
            "Length {} exceeds remaining {} byte(s)",
            len, remaining
        )));
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn is_bit_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap
        .get(idx / 8)
        .map(|byte| byte & (1 << (idx % 8)) != 0)
        .unwrap_or(false)
}

/// 소수점 이하 초 (fsp 1~6) 를 마이크로초로 변환
fn read_fractional_seconds(cursor: &mut Cursor<&[u8]>, fsp: u8) -> Result<u32> {
    let bytes = (fsp.min(MAX_FSP) as usize).div_ceil(2);
    if bytes == 0 {
        return Ok(0);
    }
    let value = cursor.read_uint::<BigEndian>(bytes)? as u32;
    Ok(value * 10u32.pow(6 - 2 * bytes as u32))
}

fn format_fraction(micros: u32, fsp: u8) -> String {
    if fsp == 0 {
        return String::new();
    }
    let digits = format!("{:06}", micros);
    format!(".{}", &digits[..digits.len().min(fsp.min(MAX_FSP) as usize)])
}

const DIGITS_PER_WORD: usize = 9;
const DIGITS_TO_BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];

/// NEWDECIMAL 바이너리 포맷을 십진 문자열로 디코딩
fn decode_decimal(cursor: &mut Cursor<&[u8]>, precision: usize, scale: usize) -> Result<String> {
    if scale > precision {
        return Err(CdcError::BinlogParse(format!(
            "Invalid decimal: precision={}, scale={}",
            precision, scale
        )));
    }

    let int_digits = precision - scale;
    let int_words = int_digits / DIGITS_PER_WORD;
    let int_rest = int_digits % DIGITS_PER_WORD;
    let frac_words = scale / DIGITS_PER_WORD;
    let frac_rest = scale % DIGITS_PER_WORD;

    let size = int_words * 4
        + DIGITS_TO_BYTES[int_rest]
        + frac_words * 4
        + DIGITS_TO_BYTES[frac_rest];
    let mut buf = read_bytes(cursor, size)?;
    if buf.is_empty() {
        return Ok("0".to_string());
    }

    // 최상위 비트가 부호, 음수는 모든 비트가 반전되어 저장됨
    let negative = buf[0] & 0x80 == 0;
    buf[0] ^= 0x80;
    if negative {
        buf.iter_mut().for_each(|b| *b ^= 0xFF);
    }

    let mut digits = Cursor::new(buf.as_slice());
    let mut integer = String::new();

    if int_rest > 0 {
        let value = digits.read_uint::<BigEndian>(DIGITS_TO_BYTES[int_rest])?;
        integer.push_str(&value.to_string());
    }
    for _ in 0..int_words {
        integer.push_str(&format!("{:09}", digits.read_u32::<BigEndian>()?));
    }

    let integer = integer.trim_start_matches('0');
    let mut decimal = String::new();
    if negative {
        decimal.push('-');
    }
    decimal.push_str(if integer.is_empty() { "0" } else { integer });

    if scale > 0 {
        decimal.push('.');
        for _ in 0..frac_words {
            decimal.push_str(&format!("{:09}", digits.read_u32::<BigEndian>()?));
        }
        if frac_rest > 0 {
            let value = digits.read_uint::<BigEndian>(DIGITS_TO_BYTES[frac_rest])?;
            decimal.push_str(&format!("{:0width$}", value, width = frac_rest));
        }
    }

    Ok(decimal)
}

#[cfg(test)]
mod tests {
    use super::column_type::*;
    use super::*;

    fn header_bytes(event_type: u8, body_len: usize, next_pos: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        data.push(event_type);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&((EVENT_HEADER_SIZE + body_len) as u32).to_le_bytes());
        data.extend_from_slice(&next_pos.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    fn event_bytes(event_type: u8, body: &[u8], next_pos: u32) -> Vec<u8> {
        let mut data = header_bytes(event_type, body.len(), next_pos);
        data.extend_from_slice(body);
        data
    }

    /// shop.orders (id INT, name VARCHAR(32), price DOUBLE)
    fn table_map_body(table_id: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&table_id.to_le_bytes()[..6]);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.push(4);
        body.extend_from_slice(b"shop\0");
        body.push(6);
        body.extend_from_slice(b"orders\0");
        body.push(3);
        body.extend_from_slice(&[LONG, VARCHAR, DOUBLE]);
        // metadata: VARCHAR max len 32 (2 bytes), DOUBLE size 8 (1 byte)
        body.push(3);
        body.extend_from_slice(&32u16.to_le_bytes());
        body.push(8);
        body.push(0b0000_0110);
        body
    }

    fn order_row(id: i32, name: &str, price: f64) -> Vec<u8> {
        let mut row = vec![0u8]; // null bitmap
        row.extend_from_slice(&id.to_le_bytes());
        row.push(name.len() as u8);
        row.extend_from_slice(name.as_bytes());
        row.extend_from_slice(&price.to_le_bytes());
        row
    }

    fn rows_body(table_id: u64, bitmaps: usize, rows: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&table_id.to_le_bytes()[..6]);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes()); // v2 extra data (empty)
        body.push(3);
        for _ in 0..bitmaps {
            body.push(0b0000_0111);
        }
        for row in rows {
            body.extend_from_slice(row);
        }
        body
    }

    #[test]
    fn test_parse_header() {
        let data = header_bytes(19, 0, 1234);
        let header = BinlogParser::parse_header(&data).unwrap();
        assert_eq!(header.event_type, EventType::TableMapEvent);
        assert_eq!(header.next_pos, 1234);
        assert_eq!(header.server_id, 1);
    }

    #[test]
    fn test_parse_header_too_short() {
        assert!(BinlogParser::parse_header(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_parse_table_map_event() {
        let table_map = BinlogParser::parse_table_map_event(&table_map_body(7)).unwrap();
        assert_eq!(table_map.table_id, 7);
        assert_eq!(table_map.database, "shop");
        assert_eq!(table_map.table, "orders");
        assert_eq!(table_map.column_types, vec![LONG, VARCHAR, DOUBLE]);
        assert_eq!(table_map.column_meta, vec![0, 32, 8]);
    }

    #[test]
    fn test_parse_write_rows_after_table_map() {
        let mut parser = BinlogParser::new();
        parser
            .parse_event(&event_bytes(19, &table_map_body(7), 200))
            .unwrap();

        let body = rows_body(7, 1, &[order_row(1, "A", 9.99), order_row(2, "B", 1.5)]);
        let event = parser.parse_event(&event_bytes(30, &body, 300)).unwrap();

        match event.data {
            BinlogEventData::WriteRows(rows) => {
                assert_eq!(rows.table_id, 7);
                assert_eq!(rows.rows.len(), 2);
                assert_eq!(
                    rows.rows[0],
                    vec![
                        CellValue::Int(1),
                        CellValue::Text(b"A".to_vec()),
                        CellValue::Double(9.99)
                    ]
                );
                assert_eq!(rows.rows[1][0], CellValue::Int(2));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(event.header.next_pos, 300);
    }

    #[test]
    fn test_parse_update_rows_pairs() {
        let mut parser = BinlogParser::new();
        parser
            .parse_event(&event_bytes(19, &table_map_body(7), 200))
            .unwrap();

        let body = rows_body(7, 2, &[order_row(1, "A", 9.99), order_row(1, "A", 19.99)]);
        let event = parser.parse_event(&event_bytes(31, &body, 300)).unwrap();

        match event.data {
            BinlogEventData::UpdateRows(rows) => {
                assert_eq!(rows.rows.len(), 1);
                assert_eq!(rows.rows[0].0[2], CellValue::Double(9.99));
                assert_eq!(rows.rows[0].1[2], CellValue::Double(19.99));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rows_with_null_column() {
        let mut parser = BinlogParser::new();
        parser
            .parse_event(&event_bytes(19, &table_map_body(7), 200))
            .unwrap();

        // name 컬럼이 NULL
        let mut row = vec![0b0000_0010u8];
        row.extend_from_slice(&5i32.to_le_bytes());
        row.extend_from_slice(&2.0f64.to_le_bytes());
        let body = rows_body(7, 1, &[row]);
        let event = parser.parse_event(&event_bytes(32, &body, 300)).unwrap();

        match event.data {
            BinlogEventData::DeleteRows(rows) => {
                assert_eq!(
                    rows.rows[0],
                    vec![CellValue::Int(5), CellValue::Null, CellValue::Double(2.0)]
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_rows_without_table_map_is_ordering_violation() {
        let mut parser = BinlogParser::new();
        let body = rows_body(9, 1, &[order_row(1, "A", 9.99)]);
        let err = parser.parse_event(&event_bytes(30, &body, 300)).unwrap_err();
        assert!(matches!(err, CdcError::ProtocolOrderingViolation { table_id: 9 }));
    }

    #[test]
    fn test_parse_query_event() {
        let mut body = Vec::new();
        body.extend_from_slice(&10u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(4);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(b"shop\0");
        body.extend_from_slice(b"BEGIN");

        let query = BinlogParser::parse_query_event(&body).unwrap();
        assert_eq!(query.thread_id, 10);
        assert_eq!(query.database, "shop");
        assert_eq!(query.query, "BEGIN");
    }

    #[test]
    fn test_parse_rotate_and_xid() {
        let mut parser = BinlogParser::new();

        let mut body = 4u64.to_le_bytes().to_vec();
        body.extend_from_slice(b"mysql-bin.000002");
        let event = parser.parse_event(&event_bytes(4, &body, 0)).unwrap();
        assert_eq!(
            event.data,
            BinlogEventData::Rotate(RotateEventData {
                next_binlog_name: "mysql-bin.000002".to_string(),
                position: 4,
            })
        );

        let event = parser
            .parse_event(&event_bytes(16, &77u64.to_le_bytes(), 500))
            .unwrap();
        assert_eq!(event.data, BinlogEventData::Xid(77));
    }

    #[test]
    fn test_checksum_is_stripped() {
        let mut parser = BinlogParser::new().with_checksum(true);
        let mut body = 77u64.to_le_bytes().to_vec();
        body.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let event = parser.parse_event(&event_bytes(16, &body, 500)).unwrap();
        assert_eq!(event.data, BinlogEventData::Xid(77));
    }

    fn format_description_body(server_version: &str, checksum_alg: u8) -> Vec<u8> {
        let mut body = 4u16.to_le_bytes().to_vec();
        let mut version = server_version.as_bytes().to_vec();
        version.resize(50, 0);
        body.extend_from_slice(&version);
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(EVENT_HEADER_SIZE as u8);
        body.extend_from_slice(&[0x38, 0x0d, 0x00, 0x08, 0x00, 0x12, 0x00, 0x04]);
        body.push(checksum_alg);
        body.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        body
    }

    fn begin_query_body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&10u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(4);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(b"shop\0");
        body.extend_from_slice(b"BEGIN");
        body
    }

    #[test]
    fn test_checksum_detected_from_format_description() {
        let mut parser = BinlogParser::new();
        let event = parser
            .parse_event(&event_bytes(15, &format_description_body("8.0.36-log", 1), 120))
            .unwrap();
        match event.data {
            BinlogEventData::FormatDescription(format) => {
                assert_eq!(format.server_version, "8.0.36-log");
                assert_eq!(format.checksum_alg, Some(1));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // 이후 이벤트의 CRC32는 본문에서 제외됨
        let mut body = begin_query_body();
        body.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let event = parser.parse_event(&event_bytes(2, &body, 200)).unwrap();
        match event.data {
            BinlogEventData::Query(query) => assert_eq!(query.query, "BEGIN"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_format_description_without_checksum_overrides_default() {
        let mut parser = BinlogParser::new().with_checksum(true);
        parser
            .parse_event(&event_bytes(15, &format_description_body("8.0.36", 0), 120))
            .unwrap();

        let event = parser.parse_event(&event_bytes(2, &begin_query_body(), 200)).unwrap();
        match event.data {
            BinlogEventData::Query(query) => assert_eq!(query.query, "BEGIN"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_old_server_has_no_checksum_alg() {
        let format = BinlogParser::parse_format_description(&format_description_body("5.5.62", 1))
            .unwrap();
        assert_eq!(format.checksum_alg, None);
        assert!(version_has_checksum("5.6.1"));
        assert!(version_has_checksum("10.11.6-MariaDB"));
        assert!(!version_has_checksum("5.6.0"));
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        // 컬럼 수 LCB가 입력보다 훨씬 큼
        let mut body = Vec::new();
        body.extend_from_slice(&7u64.to_le_bytes()[..6]);
        body.extend_from_slice(&0u16.to_le_bytes());
        body.push(4);
        body.extend_from_slice(b"shop\0");
        body.push(6);
        body.extend_from_slice(b"orders\0");
        body.push(0xfe);
        body.extend_from_slice(&u64::MAX.to_le_bytes());

        let err = BinlogParser::parse_table_map_event(&body).unwrap_err();
        assert!(matches!(err, CdcError::BinlogParse(_)));

        let data = [0xfc, 0xff, 0xff, 0x01];
        assert!(read_bytes(&mut Cursor::new(&data[..]), 0xffff).is_err());
    }

    #[test]
    fn test_fsp_above_six_is_clamped() {
        // TIMESTAMP2 with fsp 9: 초 4바이트 + 소수부 3바이트
        let mut data = 1_700_000_000u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0x07, 0xA1, 0x20]);
        let value = parse_cell(&mut Cursor::new(&data[..]), TIMESTAMP2, 9).unwrap();
        assert_eq!(
            value,
            CellValue::Timestamp {
                seconds: 1_700_000_000,
                micros: 500_000,
            }
        );

        assert_eq!(format_fraction(123_456, 9), ".123456");
    }

    #[test]
    fn test_read_lcb() {
        let data = [0xfc, 0x10, 0x27];
        assert_eq!(read_lcb(&mut Cursor::new(&data[..])).unwrap(), 10000);
        let data = [0x05];
        assert_eq!(read_lcb(&mut Cursor::new(&data[..])).unwrap(), 5);
    }

    #[test]
    fn test_decode_decimal() {
        // DECIMAL(5,2) 123.45: int 3자리(2바이트) + frac 2자리(1바이트)
        let data = [0x80, 0x7B, 0x2D];
        let value = decode_decimal(&mut Cursor::new(&data[..]), 5, 2).unwrap();
        assert_eq!(value, "123.45");

        // -123.45
        let data = [!0x80u8, !0x7Bu8, !0x2Du8];
        let value = decode_decimal(&mut Cursor::new(&data[..]), 5, 2).unwrap();
        assert_eq!(value, "-123.45");
    }

    #[test]
    fn test_parse_datetime2() {
        // 2024-03-15 10:20:30, fsp 0
        let year_month: u64 = 2024 * 13 + 3;
        let packed: u64 = 0x80_0000_0000
            | (year_month << 22)
            | (15 << 17)
            | (10 << 12)
            | (20 << 6)
            | 30;
        let bytes = packed.to_be_bytes();
        let value = parse_cell(&mut Cursor::new(&bytes[3..]), DATETIME2, 0).unwrap();
        assert_eq!(value, CellValue::DateTime("2024-03-15 10:20:30".to_string()));
    }
}
