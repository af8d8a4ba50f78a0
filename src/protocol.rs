//! MySQL 클라이언트/서버 프로토콜 패킷 처리

use crate::error::{CdcError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// 패킷 본문 최대 길이 (이 길이의 패킷은 다음 패킷으로 이어짐)
const MAX_PACKET_LENGTH: usize = 0xFF_FFFF;

pub const OK_HEADER: u8 = 0x00;
pub const EOF_HEADER: u8 = 0xFE;
pub const ERR_HEADER: u8 = 0xFF;

/// MySQL 패킷 채널
pub struct PacketChannel<S = TcpStream> {
    stream: S,
    sequence: u8,
}

impl PacketChannel<TcpStream> {
    /// 새 패킷 채널 생성 (TCP 연결)
    pub async fn connect(hostname: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", hostname, port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| CdcError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        debug!("Connected to MySQL at {}", addr);

        Ok(PacketChannel::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketChannel<S> {
    pub fn new(stream: S) -> Self {
        PacketChannel { stream, sequence: 0 }
    }

    /// 패킷 읽기. 16MB 이상으로 분할된 패킷은 합쳐서 반환
    pub async fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let chunk = self.read_chunk().await?;
            let more = chunk.len() == MAX_PACKET_LENGTH;
            payload.extend_from_slice(&chunk);
            if !more {
                return Ok(payload);
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        // 패킷 헤더 (3 bytes length + 1 byte sequence)
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| CdcError::Io(format!("Failed to read packet header: {}", e)))?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        self.sequence = header[3].wrapping_add(1);

        let mut buffer = vec![0u8; length];
        self.stream
            .read_exact(&mut buffer)
            .await
            .map_err(|e| CdcError::Io(format!("Failed to read packet body: {}", e)))?;

        Ok(buffer)
    }

    /// 직전에 읽은 패킷에 대한 응답 쓰기 (시퀀스 이어서)
    pub async fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        let sequence = self.sequence;
        self.write_packet_with_sequence(data, sequence).await
    }

    /// 새 명령 전송 (시퀀스 0부터)
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_packet_with_sequence(data, 0).await
    }

    async fn write_packet_with_sequence(&mut self, data: &[u8], sequence: u8) -> Result<()> {
        if data.len() >= MAX_PACKET_LENGTH {
            return Err(CdcError::Protocol(format!(
                "Packet too large: {} bytes",
                data.len()
            )));
        }

        let mut header = Vec::with_capacity(4);
        WriteBytesExt::write_u24::<LittleEndian>(&mut header, data.len() as u32)?;
        WriteBytesExt::write_u8(&mut header, sequence)?;

        self.stream
            .write_all(&header)
            .await
            .map_err(|e| CdcError::Io(format!("Failed to write header: {}", e)))?;
        self.stream
            .write_all(data)
            .await
            .map_err(|e| CdcError::Io(format!("Failed to write data: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| CdcError::Io(format!("Failed to flush: {}", e)))?;

        self.sequence = sequence.wrapping_add(1);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Greeting (Handshake v10) 패킷
#[derive(Debug, Clone)]
pub struct GreetingPacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: Vec<u8>,
    pub server_capabilities: u32,
    pub server_collation: u8,
    pub server_status: u16,
    pub auth_plugin_name: Option<String>,
}

impl GreetingPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if is_error_packet(data) {
            let err = ErrorPacket::parse(data)?;
            return Err(CdcError::Connection(format!(
                "Server refused connection: {}",
                err
            )));
        }

        let mut cursor = std::io::Cursor::new(data);

        let protocol_version = ReadBytesExt::read_u8(&mut cursor)
            .map_err(|e| CdcError::Protocol(format!("Failed to read protocol version: {}", e)))?;
        let server_version = read_null_terminated_string(&mut cursor)?;
        let thread_id = ReadBytesExt::read_u32::<LittleEndian>(&mut cursor)
            .map_err(|e| CdcError::Protocol(format!("Failed to read thread ID: {}", e)))?;

        // Auth plugin data part 1 (8 bytes) + filler
        let mut scramble = vec![0u8; 8];
        Read::read_exact(&mut cursor, &mut scramble)
            .map_err(|e| CdcError::Protocol(format!("Failed to read scramble: {}", e)))?;
        ReadBytesExt::read_u8(&mut cursor)?;

        let capabilities_lower = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)
            .map_err(|e| CdcError::Protocol(format!("Failed to read capabilities: {}", e)))?;
        let server_collation = ReadBytesExt::read_u8(&mut cursor)?;
        let server_status = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)?;
        let capabilities_upper = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)?;
        let server_capabilities = (capabilities_upper as u32) << 16 | capabilities_lower as u32;

        let auth_data_len = ReadBytesExt::read_u8(&mut cursor)?;
        let mut reserved = [0u8; 10];
        Read::read_exact(&mut cursor, &mut reserved)?;

        // Auth plugin data part 2 (최소 13 bytes, 마지막은 null)
        let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8)) as usize;
        let mut part2 = vec![0u8; part2_len];
        Read::read_exact(&mut cursor, &mut part2)
            .map_err(|e| CdcError::Protocol(format!("Failed to read scramble part 2: {}", e)))?;
        if part2.last() == Some(&0) {
            part2.pop();
        }
        scramble.extend_from_slice(&part2);

        let auth_plugin_name = if (cursor.position() as usize) < data.len() {
            Some(read_null_terminated_string(&mut cursor).unwrap_or_default())
        } else {
            None
        };

        Ok(GreetingPacket {
            protocol_version,
            server_version,
            thread_id,
            scramble,
            server_capabilities,
            server_collation,
            server_status,
            auth_plugin_name,
        })
    }
}

/// ERR 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
}

impl ErrorPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !is_error_packet(data) || data.len() < 3 {
            return Err(CdcError::Protocol("Not an error packet".to_string()));
        }

        let code = u16::from_le_bytes([data[1], data[2]]);
        let rest = &data[3..];
        // '#' + 5 bytes SQL state (PROTOCOL_41)
        let (sql_state, message) = if rest.first() == Some(&b'#') && rest.len() >= 6 {
            (
                Some(String::from_utf8_lossy(&rest[1..6]).into_owned()),
                &rest[6..],
            )
        } else {
            (None, rest)
        };

        Ok(ErrorPacket {
            code,
            sql_state,
            message: String::from_utf8_lossy(message).into_owned(),
        })
    }
}

impl std::fmt::Display for ErrorPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "[{}] ({}) {}", self.code, state, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// null로 끝나는 문자열 읽기
fn read_null_terminated_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = ReadBytesExt::read_u8(reader)
            .map_err(|e| CdcError::Protocol(format!("Failed to read string byte: {}", e)))?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|e| CdcError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

/// Error 패킷 확인
pub fn is_error_packet(data: &[u8]) -> bool {
    data.first() == Some(&ERR_HEADER)
}

/// OK 패킷 확인
pub fn is_ok_packet(data: &[u8]) -> bool {
    data.first() == Some(&OK_HEADER)
}

/// EOF 패킷 확인 (0xFE, 길이 < 9)
pub fn is_eof_packet(data: &[u8]) -> bool {
    data.first() == Some(&EOF_HEADER) && data.len() < 9
}
