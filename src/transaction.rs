//! 트랜잭션 단위 이벤트 묶음
//!
//! BEGIN 과 커밋(XID) 사이의 행 변경을 모아 두었다가 커밋 시점에 한 번에
//! 내보냅니다. 트랜잭션 밖의 행 변경은 즉시 통과합니다.

use crate::replication_event::{ReplicationEvent, RowMutation};
use tracing::{debug, warn};

/// 트랜잭션 시작 마커 (QUERY 이벤트의 SQL 텍스트)
const BEGIN_MARKER: &str = "BEGIN";

/// 비트랜잭션 엔진(MyISAM 등)은 XID 대신 이 QUERY 이벤트로 커밋을 기록함
const COMMIT_MARKER: &str = "COMMIT";

/// QUERY 이벤트가 트랜잭션 시작을 뜻하는지 여부
pub fn is_transaction_begin(sql: &str) -> bool {
    sql.trim() == BEGIN_MARKER
}

/// QUERY 이벤트가 트랜잭션 커밋을 뜻하는지 여부
pub fn is_transaction_commit(sql: &str) -> bool {
    sql.trim() == COMMIT_MARKER
}

/// 누적기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

/// 트랜잭션 누적기
#[derive(Debug)]
pub struct TransactionAccumulator {
    state: TransactionState,
    buffer: Vec<RowMutation>,
}

impl Default for TransactionAccumulator {
    fn default() -> Self {
        TransactionAccumulator {
            state: TransactionState::Idle,
            buffer: Vec::new(),
        }
    }
}

impl TransactionAccumulator {
    pub fn new() -> Self {
        TransactionAccumulator::default()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 현재 버퍼에 쌓인 행 변경 수
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 트랜잭션 시작. 이미 트랜잭션 중이면 버퍼를 비우고 다시 시작
    pub fn begin(&mut self) {
        if self.state == TransactionState::InTransaction {
            warn!(
                "BEGIN received inside a transaction, discarding {} buffered mutation(s)",
                self.buffer.len()
            );
        }
        self.buffer.clear();
        self.state = TransactionState::InTransaction;
    }

    /// 행 변경 수신. 지금 내보내야 할 이벤트가 있으면 반환
    pub fn accept(&mut self, mutation: RowMutation) -> Option<ReplicationEvent> {
        match self.state {
            TransactionState::InTransaction => {
                self.buffer.push(mutation);
                None
            }
            TransactionState::Idle => Some(ReplicationEvent::RowMutation(mutation)),
        }
    }

    /// 트랜잭션 커밋. 버퍼가 하나면 그대로, 여러 개면 묶어서 반환
    pub fn commit(&mut self) -> Option<ReplicationEvent> {
        if self.state == TransactionState::Idle {
            debug!("Commit received outside a transaction, ignoring");
            return None;
        }

        self.state = TransactionState::Idle;
        let mut mutations = std::mem::take(&mut self.buffer);

        match mutations.len() {
            0 => None,
            1 => mutations.pop().map(ReplicationEvent::RowMutation),
            _ => Some(ReplicationEvent::TransactionGroup(mutations)),
        }
    }

    /// 새 연결 시 초기 상태로
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = TransactionState::Idle;
    }
}
