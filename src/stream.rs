//! 복제 스트림
//!
//! 이벤트 소스 연결 수명주기를 관리하고, 소스가 보내는 원시 binlog 이벤트를
//! 테이블 캐시 → 행 디코더 → 트랜잭션 누적기 → 리스너 순으로 흘려보냅니다.
//!
//! 이벤트 처리는 소스의 읽기 스레드 하나에서 도착 순서대로 이루어지며,
//! 리스너 호출도 그 스레드에서 동기적으로 일어납니다. 느린 리스너는 다음 이벤트
//! 처리를 늦춥니다.

use crate::decoder::{RowEventDecoder, RowsRecord};
use crate::error::{CdcError, Result};
use crate::events::{BinlogEvent, BinlogEventData};
use crate::listener::{ListenerRegistry, ReplicationListener};
use crate::position::Position;
use crate::replication_event::ReplicationEvent;
use crate::source::{EventSource, SourceListener};
use crate::table_cache::TableMetadataCache;
use crate::transaction::{self, TransactionAccumulator, TransactionState};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 다른 스레드가 소스를 잠그고 있을 때 disconnect 진행 여부를 다시 확인하는 간격
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 스트림 설정
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// BEGIN ~ 커밋 사이의 행 변경을 하나의 이벤트로 묶을지 여부
    pub group_events_by_transaction: bool,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            group_events_by_transaction: true,
            connect_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(10),
        }
    }
}

/// 복제 스트림 (연결 + 라우팅 + 리스너 관리)
pub struct ReplicationStream<S: EventSource> {
    source: Mutex<S>,
    registry: Arc<ListenerRegistry>,
    position: Arc<RwLock<Option<Position>>>,
    group_events: Arc<AtomicBool>,
    /// 소스 잠금을 쥔 채 읽기 스레드 종료를 기다리는 중
    stopping: AtomicBool,
    config: StreamConfig,
}

impl<S: EventSource> ReplicationStream<S> {
    pub fn new(source: S) -> Self {
        ReplicationStream::with_config(source, StreamConfig::default())
    }

    pub fn with_config(source: S, config: StreamConfig) -> Self {
        ReplicationStream {
            source: Mutex::new(source),
            registry: Arc::new(ListenerRegistry::new()),
            position: Arc::new(RwLock::new(None)),
            group_events: Arc::new(AtomicBool::new(config.group_events_by_transaction)),
            stopping: AtomicBool::new(false),
            config,
        }
    }

    /// 기본 타임아웃으로 연결
    pub fn connect(&self) -> Result<Position> {
        self.connect_with_timeout(self.config.connect_timeout)
    }

    /// 연결 후 스트리밍 시작. 스트리밍을 시작한 위치를 반환
    ///
    /// 위치가 설정되어 있으면 그 위치부터, 아니면 서버의 현재 위치부터 읽습니다.
    /// 테이블 캐시와 트랜잭션 상태는 연결마다 새로 시작합니다.
    pub fn connect_with_timeout(&self, timeout: Duration) -> Result<Position> {
        let mut source = self.lock_source().ok_or_else(|| {
            CdcError::IllegalState("Replication stream is disconnecting".to_string())
        })?;
        if source.is_connected() {
            return Err(CdcError::IllegalState(
                "Replication stream is already connected, disconnect first".to_string(),
            ));
        }

        let start = self.position.read().clone();
        match &start {
            Some(position) => info!("Connecting replication stream from {}", position),
            None => info!("Connecting replication stream from the server's current position"),
        }

        let mut router = EventRouter::new(
            self.registry.clone(),
            self.position.clone(),
            self.group_events.clone(),
        );
        let listener: SourceListener = Box::new(move |event| router.route(event));

        let started = source.connect(start, listener, timeout)?;

        // 읽기 스레드가 이미 위치를 전진시켰을 수 있으므로 더 앞선 위치는 덮어쓰지 않음
        {
            let mut position = self.position.write();
            if position.as_ref().map_or(true, |current| *current < started) {
                *position = Some(started.clone());
            }
        }

        info!("Replication stream connected at {}", started);
        Ok(started)
    }

    /// 연결 종료. 연결되지 않은 상태면 아무 일도 하지 않음
    ///
    /// 리스너 안에서 호출해도 되며, 이 경우 현재 이벤트 처리가 끝나면 멈춥니다.
    /// 다른 스레드가 이미 종료 중이면 그 종료에 맡기고 바로 반환합니다.
    pub fn disconnect(&self) -> Result<()> {
        let Some(mut source) = self.lock_source() else {
            debug!("Replication stream is already disconnecting");
            return Ok(());
        };
        if !source.is_connected() {
            debug!("Replication stream is not connected, nothing to disconnect");
            return Ok(());
        }

        self.stopping.store(true, Ordering::SeqCst);
        let result = source.disconnect(self.config.disconnect_timeout);
        self.stopping.store(false, Ordering::SeqCst);
        drop(source);

        result.map_err(|e| match e {
            CdcError::Connection(_) => e,
            other => CdcError::Connection(other.to_string()),
        })?;

        match self.position.read().as_ref() {
            Some(position) => info!("Replication stream disconnected at {}", position),
            None => info!("Replication stream disconnected"),
        }
        Ok(())
    }

    /// 다른 스레드가 종료 중이면 false
    pub fn is_connected(&self) -> bool {
        self.lock_source()
            .map_or(false, |source| source.is_connected())
    }

    pub fn register_listener<L: ReplicationListener>(&self, listener: Arc<L>) {
        self.registry.register(listener);
    }

    pub fn unregister_listener<L: ReplicationListener>(&self, listener: &Arc<L>) -> bool {
        self.registry.unregister(listener)
    }

    /// 타입이 `L` 인 리스너 전부 해제
    pub fn unregister_listeners_of<L: Any>(&self) -> usize {
        self.registry.unregister_by_type::<L>()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// 마지막으로 처리한 이벤트 다음 위치
    pub fn position(&self) -> Option<Position> {
        self.position.read().clone()
    }

    /// 다음 connect의 시작 위치 지정 (연결되지 않은 상태에서만)
    pub fn set_position(&self, position: Position) -> Result<()> {
        let _source = self.lock_disconnected("change position")?;
        *self.position.write() = Some(position);
        Ok(())
    }

    /// 저장된 위치를 지워 다음 connect가 서버의 현재 위치부터 시작하게 함
    pub fn clear_position(&self) -> Result<()> {
        let _source = self.lock_disconnected("change position")?;
        *self.position.write() = None;
        Ok(())
    }

    /// 실행 중인 스트림에도 다음 이벤트부터 적용됨
    pub fn set_group_events_by_transaction(&self, enabled: bool) {
        self.group_events.store(enabled, Ordering::SeqCst);
    }

    pub fn group_events_by_transaction(&self) -> bool {
        self.group_events.load(Ordering::SeqCst)
    }

    /// 소스 설정 변경 (호스트, 계정 등). 연결되지 않은 상태에서만
    pub fn configure_source<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        let mut source = self.lock_disconnected("reconfigure the source")?;
        Ok(f(&mut *source))
    }

    /// 소스 잠금. 다른 스레드가 disconnect 중이면 `None`
    ///
    /// disconnect는 잠금을 쥔 채 읽기 스레드를 기다리므로, 읽기 스레드의 리스너가
    /// 같은 잠금을 무작정 기다리면 양쪽이 서로를 기다리게 됩니다.
    fn lock_source(&self) -> Option<MutexGuard<'_, S>> {
        loop {
            if let Some(source) = self.source.try_lock_for(LOCK_POLL_INTERVAL) {
                return Some(source);
            }
            if self.stopping.load(Ordering::SeqCst) {
                return None;
            }
        }
    }

    fn lock_disconnected(&self, action: &str) -> Result<MutexGuard<'_, S>> {
        match self.lock_source() {
            Some(source) if !source.is_connected() => Ok(source),
            _ => Err(CdcError::IllegalState(format!(
                "Cannot {} while connected",
                action
            ))),
        }
    }
}

/// 연결 하나 동안 원시 이벤트를 처리하는 라우터
///
/// 읽기 스레드만 접근하므로 캐시와 누적기는 잠금 없이 소유합니다.
struct EventRouter {
    cache: TableMetadataCache,
    accumulator: TransactionAccumulator,
    registry: Arc<ListenerRegistry>,
    position: Arc<RwLock<Option<Position>>>,
    group_events: Arc<AtomicBool>,
}

impl EventRouter {
    fn new(
        registry: Arc<ListenerRegistry>,
        position: Arc<RwLock<Option<Position>>>,
        group_events: Arc<AtomicBool>,
    ) -> Self {
        EventRouter {
            cache: TableMetadataCache::new(),
            accumulator: TransactionAccumulator::new(),
            registry,
            position,
            group_events,
        }
    }

    fn route(&mut self, event: BinlogEvent) {
        let BinlogEvent { header, data } = event;

        match RowsRecord::from_event(data) {
            Ok(record) => self.apply_rows(record),
            Err(BinlogEventData::TableMap(table_map)) => {
                let column_count = table_map.column_count();
                self.cache.put(
                    table_map.table_id,
                    table_map.database,
                    table_map.table,
                    column_count,
                );
            }
            Err(BinlogEventData::Query(query)) => self.apply_query(&query.query),
            Err(BinlogEventData::Xid(xid)) => {
                debug!("Commit (xid={})", xid);
                self.commit();
            }
            Err(BinlogEventData::Rotate(rotate)) => {
                debug!(
                    "Rotating to {}#{}",
                    rotate.next_binlog_name, rotate.position
                );
                *self.position.write() =
                    Some(Position::new(rotate.next_binlog_name, rotate.position));
                return;
            }
            Err(_) => {}
        }

        self.advance(header.next_pos);
    }

    fn apply_query(&mut self, sql: &str) {
        if transaction::is_transaction_begin(sql) {
            if self.group_events.load(Ordering::SeqCst) {
                self.accumulator.begin();
            }
        } else if transaction::is_transaction_commit(sql) {
            self.commit();
        }
    }

    // 묶기가 꺼진 상태에서는 누적기가 Idle이므로 no-op
    fn commit(&mut self) {
        if let Some(event) = self.accumulator.commit() {
            self.dispatch(event);
        }
    }

    fn apply_rows(&mut self, record: RowsRecord) {
        let table_id = record.table_id();
        match RowEventDecoder::decode(&self.cache, record) {
            Ok(mutations) => {
                // 트랜잭션 도중 묶기가 꺼졌으면 남은 버퍼를 먼저 내보내고 이후 행은 바로 통과
                if !self.group_events.load(Ordering::SeqCst)
                    && self.accumulator.state() == TransactionState::InTransaction
                {
                    self.commit();
                }
                for mutation in mutations {
                    if let Some(event) = self.accumulator.accept(mutation) {
                        self.dispatch(event);
                    }
                }
            }
            Err(e) => error!("Dropping row event for table_id={}: {}", table_id, e),
        }
    }

    fn dispatch(&self, event: ReplicationEvent) {
        let failures = self.registry.dispatch(&event);
        if failures > 0 {
            debug!("{} listener(s) failed on {}", failures, event);
        }
    }

    fn advance(&self, next_pos: u32) {
        if next_pos == 0 {
            return;
        }
        let mut position = self.position.write();
        if let Some(current) = position.as_mut() {
            *current = current.with_offset(u64::from(next_pos));
        }
    }
}
