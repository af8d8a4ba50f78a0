//! 복제 이벤트 소스 계약
//!
//! 스트림은 wire 프로토콜을 직접 다루지 않고 이 트레이트를 통해 원시 binlog
//! 이벤트를 받습니다. 실제 MySQL 구현은 `binlog_client::MySqlBinlogSource` 입니다.

use crate::error::Result;
use crate::events::BinlogEvent;
use crate::position::Position;
use std::time::Duration;

/// 연결당 하나만 등록되는 내부 수신자. 도착 순서대로 호출됩니다.
pub type SourceListener = Box<dyn FnMut(BinlogEvent) + Send>;

pub trait EventSource: Send {
    /// 연결 후 스트리밍 시작
    ///
    /// `start` 가 `None` 이면 서버의 현재 head 위치부터 읽습니다.
    /// 실제로 스트리밍을 시작한 위치를 반환합니다.
    fn connect(
        &mut self,
        start: Option<Position>,
        listener: SourceListener,
        timeout: Duration,
    ) -> Result<Position>;

    /// 연결 종료. 반환 후에는 listener가 더 이상 호출되지 않습니다.
    fn disconnect(&mut self, timeout: Duration) -> Result<()>;

    fn is_connected(&self) -> bool;
}
