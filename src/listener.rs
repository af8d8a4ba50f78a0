//! 리스너 등록 및 이벤트 전달
//!
//! 등록 목록은 copy-on-write 스냅샷으로 관리합니다. 전달은 호출 시점의 스냅샷을
//! 등록 순서대로 순회하므로, 전달 도중 다른 스레드에서 등록/해제해도 진행 중인
//! 순회는 영향을 받지 않습니다.

use crate::replication_event::ReplicationEvent;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// 리스너가 돌려주는 에러
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// 복제 이벤트 구독자
///
/// 같은 스트림에 대한 호출은 항상 순서대로, 동시에 겹치지 않게 이루어지지만
/// 호출 스레드는 매번 같다고 가정하면 안 됩니다.
pub trait ReplicationListener: Send + Sync + 'static {
    fn on_event(&self, event: &ReplicationEvent) -> Result<(), ListenerError>;

    /// 로그에 표시할 이름
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> ReplicationListener for F
where
    F: Fn(&ReplicationEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &ReplicationEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

#[derive(Clone)]
struct Registration {
    listener: Arc<dyn ReplicationListener>,
    type_id: TypeId,
}

impl Registration {
    fn is<L: ReplicationListener>(&self, listener: &Arc<L>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.listener), Arc::as_ptr(listener))
    }
}

/// 스레드 안전한 리스너 레지스트리
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Arc<Vec<Registration>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry::default()
    }

    pub fn register<L: ReplicationListener>(&self, listener: Arc<L>) {
        let registration = Registration {
            listener,
            type_id: TypeId::of::<L>(),
        };
        let mut listeners = self.listeners.write();
        Arc::make_mut(&mut listeners).push(registration);
    }

    /// 동일한 인스턴스(첫 번째 등록) 해제
    pub fn unregister<L: ReplicationListener>(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.iter().position(|r| r.is(listener)) {
            Some(index) => {
                Arc::make_mut(&mut listeners).remove(index);
                true
            }
            None => false,
        }
    }

    /// 타입이 `L` 인 리스너 전부 해제. 해제된 수 반환
    pub fn unregister_by_type<L: Any>(&self) -> usize {
        let type_id = TypeId::of::<L>();
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        if listeners.iter().any(|r| r.type_id == type_id) {
            Arc::make_mut(&mut listeners).retain(|r| r.type_id != type_id);
        }
        before - listeners.len()
    }

    pub fn clear(&self) {
        *self.listeners.write() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// 모든 리스너에게 이벤트 전달. 실패한 리스너 수 반환
    ///
    /// 리스너의 에러나 panic은 로그만 남기고 다음 리스너로 넘어갑니다.
    pub fn dispatch(&self, event: &ReplicationEvent) -> usize {
        let snapshot = Arc::clone(&self.listeners.read());
        let mut failures = 0;

        for registration in snapshot.iter() {
            let listener = &registration.listener;
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("{} choked on {}: {}", listener.name(), event, e);
                }
                Err(payload) => {
                    failures += 1;
                    warn!(
                        "{} panicked on {}: {}",
                        listener.name(),
                        event,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
