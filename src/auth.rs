//! MySQL 인증 처리
//!
//! mysql_native_password 방식만 지원합니다. 서버가 다른 플러그인으로 시작하더라도
//! auth switch 요청으로 native password를 받으면 처리할 수 있습니다.

use crate::error::{CdcError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};
use std::io::Write;

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

/// Auth switch 요청 헤더
const AUTH_SWITCH_HEADER: u8 = 0xFE;

/// Client capability flags
pub mod capabilities {
    pub const LONG_PASSWORD: u32 = 1;
    pub const LONG_FLAG: u32 = 4;
    pub const CONNECT_WITH_DB: u32 = 8;
    pub const PROTOCOL_41: u32 = 512;
    pub const TRANSACTIONS: u32 = 8192;
    pub const SECURE_CONNECTION: u32 = 32768;
    pub const MULTI_RESULTS: u32 = 1 << 17;
    pub const PLUGIN_AUTH: u32 = 1 << 19;
}

/// Native password 인증 응답 생성
///
/// SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
pub fn create_auth_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// HandshakeResponse41 패킷 생성
pub fn create_handshake_response(
    username: &str,
    password: &str,
    database: Option<&str>,
    scramble: &[u8],
    collation: u8,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut flags = capabilities::LONG_PASSWORD
        | capabilities::LONG_FLAG
        | capabilities::PROTOCOL_41
        | capabilities::TRANSACTIONS
        | capabilities::SECURE_CONNECTION
        | capabilities::MULTI_RESULTS
        | capabilities::PLUGIN_AUTH;

    if database.is_some() {
        flags |= capabilities::CONNECT_WITH_DB;
    }

    buffer.write_u32::<LittleEndian>(flags)?;
    // Max packet size - 0이면 서버 기본값
    buffer.write_u32::<LittleEndian>(0)?;
    buffer.write_u8(collation)?;
    buffer.write_all(&[0u8; 23])?;

    buffer.write_all(username.as_bytes())?;
    buffer.write_u8(0)?;

    let auth_response = create_auth_response(password, scramble);
    buffer.write_u8(auth_response.len() as u8)?;
    buffer.write_all(&auth_response)?;

    if let Some(db) = database {
        buffer.write_all(db.as_bytes())?;
        buffer.write_u8(0)?;
    }

    buffer.write_all(NATIVE_PASSWORD_PLUGIN.as_bytes())?;
    buffer.write_u8(0)?;

    Ok(buffer)
}

/// Auth switch 요청 (0xFE + 플러그인 이름 + 새 scramble)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub scramble: Vec<u8>,
}

impl AuthSwitchRequest {
    /// auth switch 요청이 아니면 `None`
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.first() != Some(&AUTH_SWITCH_HEADER) || data.len() < 2 {
            return None;
        }

        let body = &data[1..];
        let name_end = body.iter().position(|&b| b == 0)?;
        let plugin_name = String::from_utf8_lossy(&body[..name_end]).into_owned();
        let mut scramble = body[name_end + 1..].to_vec();
        if scramble.last() == Some(&0) {
            scramble.pop();
        }

        Some(AuthSwitchRequest {
            plugin_name,
            scramble,
        })
    }

    /// 요청에 대한 응답 생성
    pub fn respond(&self, password: &str) -> Result<Vec<u8>> {
        if self.plugin_name != NATIVE_PASSWORD_PLUGIN {
            return Err(CdcError::Connection(format!(
                "Unsupported authentication plugin: {}",
                self.plugin_name
            )));
        }
        Ok(create_auth_response(password, &self.scramble))
    }
}
