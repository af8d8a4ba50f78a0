//! MySQL Binlog 클라이언트
//!
//! 복제 프로토콜로 서버에 접속해 binlog 이벤트를 읽는 `EventSource` 구현.
//! 이벤트 읽기는 전용 스레드(current-thread tokio 런타임)에서 이루어지고,
//! 파싱된 이벤트는 도착 순서대로 등록된 listener로 전달됩니다.

use crate::auth::{self, AuthSwitchRequest};
use crate::binlog::BinlogParser;
use crate::connection::{ConnectionConfig, MySqlConnection};
use crate::error::{CdcError, Result};
use crate::position::Position;
use crate::protocol::{self, ErrorPacket, GreetingPacket, PacketChannel};
use crate::source::{EventSource, SourceListener};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// COM_QUERY 명령어 코드
const COM_QUERY: u8 = 0x03;

/// COM_BINLOG_DUMP 명령어 코드
const COM_BINLOG_DUMP: u8 = 0x12;

/// 읽기 스레드 하나의 실행 상태
struct Session {
    shutdown: watch::Sender<bool>,
    connected: Arc<AtomicBool>,
    /// 스레드가 끝나면 끊어짐
    done: mpsc::Receiver<()>,
    reader: thread::JoinHandle<()>,
}

/// MySQL binlog 이벤트 소스
pub struct MySqlBinlogSource {
    config: ConnectionConfig,
    session: Option<Session>,
}

impl MySqlBinlogSource {
    pub fn new(config: ConnectionConfig) -> Self {
        MySqlBinlogSource {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// 연결 설정 변경 (다음 connect부터 적용)
    pub fn config_mut(&mut self) -> &mut ConnectionConfig {
        &mut self.config
    }

    /// 이전 세션의 스레드가 이미 끝났으면 정리
    fn reap_finished_session(&mut self) {
        let finished = self
            .session
            .as_ref()
            .map_or(false, |s| !s.connected.load(Ordering::SeqCst) && s.reader.is_finished());
        if finished {
            if let Some(session) = self.session.take() {
                let _ = session.reader.join();
            }
        }
    }

    /// COM_BINLOG_DUMP 명령어 생성
    fn create_binlog_dump_command(server_id: u32, position: &Position) -> Result<Vec<u8>> {
        let offset = u32::try_from(position.offset()).map_err(|_| {
            CdcError::Connection(format!("Binlog offset out of range: {}", position))
        })?;

        let mut buffer = Vec::new();
        buffer.write_u8(COM_BINLOG_DUMP)?;
        buffer.write_u32::<LittleEndian>(offset)?;
        // Flags - 0이면 마지막 이벤트 이후에도 연결 유지 (blocking)
        buffer.write_u16::<LittleEndian>(0)?;
        buffer.write_u32::<LittleEndian>(server_id)?;
        buffer.write_all(position.file_name().as_bytes())?;

        debug!(
            "Created COM_BINLOG_DUMP command: server_id={}, position={}",
            server_id, position
        );

        Ok(buffer)
    }
}

impl EventSource for MySqlBinlogSource {
    fn connect(
        &mut self,
        start: Option<Position>,
        listener: SourceListener,
        timeout: Duration,
    ) -> Result<Position> {
        self.reap_finished_session();
        if self.session.is_some() {
            return Err(CdcError::IllegalState(
                "Binlog source is already connected".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<Position>>(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let connected = Arc::new(AtomicBool::new(false));

        let config = self.config.clone();
        let reader_connected = connected.clone();
        let reader = thread::Builder::new()
            .name("binlog-reader".to_string())
            .spawn(move || {
                let _done = done_tx;
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(CdcError::Connection(format!(
                            "Failed to start reader runtime: {}",
                            e
                        ))));
                        return;
                    }
                };
                runtime.block_on(run_session(
                    config,
                    start,
                    listener,
                    ready_tx,
                    shutdown_rx,
                    reader_connected,
                ));
            })
            .map_err(|e| CdcError::Connection(format!("Failed to spawn reader thread: {}", e)))?;

        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(position)) => {
                self.session = Some(Session {
                    shutdown: shutdown_tx,
                    connected,
                    done: done_rx,
                    reader,
                });
                Ok(position)
            }
            Ok(Err(e)) => {
                let _ = reader.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // 핸드셰이크 중인 스레드는 종료 신호를 보고 스스로 끝남
                let _ = shutdown_tx.send(true);
                warn!(
                    "Handshake with {} did not complete within {:?}",
                    self.config.address(),
                    timeout
                );
                Err(CdcError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = reader.join();
                Err(CdcError::Connection(
                    "Reader thread exited before handshake completed".to_string(),
                ))
            }
        }
    }

    fn disconnect(&mut self, timeout: Duration) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let _ = session.shutdown.send(true);
        session.connected.store(false, Ordering::SeqCst);

        // listener 안에서 호출된 경우: 현재 이벤트 처리가 끝나면 스레드가 종료됨
        if thread::current().id() == session.reader.thread().id() {
            debug!("Disconnect requested from the reader thread");
            return Ok(());
        }

        match session.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(CdcError::Connection(format!(
                "Reader thread did not stop within {:?}",
                timeout
            ))),
            _ => {
                let _ = session.reader.join();
                info!("Disconnected from {}", self.config.address());
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.connected.load(Ordering::SeqCst))
    }
}

/// 읽기 스레드 본체: 핸드셰이크 후 이벤트 스트리밍
async fn run_session(
    config: ConnectionConfig,
    start: Option<Position>,
    mut listener: SourceListener,
    ready: mpsc::SyncSender<Result<Position>>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    let handshake = tokio::select! {
        _ = shutdown.changed() => return,
        result = open_stream(&config, start) => result,
    };

    let (mut channel, position, checksum) = match handshake {
        Ok(opened) => opened,
        Err(e) => {
            let e = if e.is_connection_error() {
                e
            } else {
                CdcError::Connection(e.to_string())
            };
            let _ = ready.send(Err(e));
            return;
        }
    };

    connected.store(true, Ordering::SeqCst);
    if ready.send(Ok(position.clone())).is_err() {
        connected.store(false, Ordering::SeqCst);
        return;
    }

    info!("Binlog streaming started from {}", position);

    // 체크섬 여부는 스트림 첫 FORMAT_DESCRIPTION 이벤트가 다시 알려 줌
    let mut parser = BinlogParser::new().with_checksum(checksum);
    let mut event_count: u64 = 0;

    loop {
        let packet = tokio::select! {
            _ = shutdown.changed() => {
                debug!("Shutdown requested, stopping binlog reader");
                break;
            }
            packet = channel.read_packet() => packet,
        };

        let packet = match packet {
            Ok(packet) => packet,
            Err(e) => {
                error!("Failed to read packet: {}", e);
                break;
            }
        };

        if protocol::is_error_packet(&packet) {
            match ErrorPacket::parse(&packet) {
                Ok(err) => error!("Received error packet from server: {}", err),
                Err(_) => error!("Received malformed error packet from server"),
            }
            break;
        }

        if protocol::is_eof_packet(&packet) {
            info!("Received EOF packet - stream ended");
            break;
        }

        if !protocol::is_ok_packet(&packet) {
            warn!(
                "Unexpected packet header {:02x?}, skipping",
                packet.first()
            );
            continue;
        }

        match parser.parse_event(&packet[1..]) {
            Ok(event) => {
                event_count += 1;
                debug!(
                    "Event #{}: type={:?}, next_pos={}",
                    event_count, event.header.event_type, event.header.next_pos
                );
                // disconnect 이후에는 전달하지 않음
                if *shutdown.borrow() {
                    break;
                }
                listener(event);
            }
            Err(e) => error!("Failed to parse binlog event: {}", e),
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = channel.shutdown().await;
    info!(
        "Binlog streaming ended. Total events received: {}",
        event_count
    );
}

/// 시작 위치 결정, 인증, 체크섬 해제, COM_BINLOG_DUMP 전송
async fn open_stream(
    config: &ConnectionConfig,
    start: Option<Position>,
) -> Result<(PacketChannel, Position, bool)> {
    let position = match start {
        Some(position) => position,
        None => resolve_head_position(config).await?,
    };

    info!("Connecting to {}", config.address());
    let mut channel = tokio::time::timeout(
        config.timeout,
        PacketChannel::connect(&config.hostname, config.port),
    )
    .await
    .map_err(|_| CdcError::Timeout)??;

    let greeting = GreetingPacket::parse(&channel.read_packet().await?)?;
    info!(
        "MySQL Server version: {}, Thread ID: {}",
        greeting.server_version, greeting.thread_id
    );

    let response = auth::create_handshake_response(
        &config.username,
        &config.password,
        config.database.as_deref(),
        &greeting.scramble,
        greeting.server_collation,
    )?;
    channel.write_packet(&response).await?;

    let mut result = channel.read_packet().await?;
    if let Some(switch) = AuthSwitchRequest::parse(&result) {
        debug!("Server requested auth switch to {}", switch.plugin_name);
        channel.write_packet(&switch.respond(&config.password)?).await?;
        result = channel.read_packet().await?;
    }
    expect_ok(&result, "Authentication failed")?;
    info!("Authentication successful");

    // 체크섬을 끄지 않으면 이벤트 끝에 CRC32가 붙음
    let mut query = vec![COM_QUERY];
    query.extend_from_slice(b"SET @master_binlog_checksum='NONE'");
    channel.write_command(&query).await?;
    let checksum_result = channel.read_packet().await?;
    let checksum = protocol::is_error_packet(&checksum_result);
    if checksum {
        warn!("Failed to set binlog checksum to NONE, expecting CRC32 trailers");
    } else {
        debug!("Binlog checksum set to NONE");
    }

    let dump = MySqlBinlogSource::create_binlog_dump_command(config.server_id, &position)?;
    channel.write_command(&dump).await?;
    info!("Sent COM_BINLOG_DUMP from {}", position);

    Ok((channel, position, checksum))
}

/// 시작 위치가 없으면 서버의 현재 binlog 위치부터
async fn resolve_head_position(config: &ConnectionConfig) -> Result<Position> {
    let mut conn = MySqlConnection::connect(config).await?;

    match conn.get_binlog_format().await {
        Ok(format) if !format.eq_ignore_ascii_case("ROW") => warn!(
            "binlog_format is {}, row events will not be available",
            format
        ),
        Ok(_) => {}
        Err(e) => debug!("Could not check binlog_format: {}", e),
    }

    let status = conn.get_binlog_status().await?;
    if let Err(e) = conn.close().await {
        debug!("Failed to close status connection: {}", e);
    }

    let position = status.to_position();
    info!("Resolved current binlog position: {}", position);
    Ok(position)
}

fn expect_ok(packet: &[u8], context: &str) -> Result<()> {
    if protocol::is_error_packet(packet) {
        let err = ErrorPacket::parse(packet)?;
        return Err(CdcError::Connection(format!("{}: {}", context, err)));
    }
    if !protocol::is_ok_packet(packet) {
        return Err(CdcError::Connection(format!(
            "{}: unexpected packet 0x{:02x}",
            context,
            packet.first().copied().unwrap_or_default()
        )));
    }
    Ok(())
}
