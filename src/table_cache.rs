//! 테이블 메타데이터 캐시
//!
//! TABLE_MAP 이벤트로 전달되는 테이블 ID -> (스키마, 테이블) 매핑을 보관합니다.
//! 이벤트 처리 경로에서만 접근하므로 별도의 동기화는 없습니다.

use crate::error::{CdcError, Result};
use std::collections::HashMap;

/// 테이블 기술자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub column_count: usize,
}

/// 테이블 ID -> 테이블 기술자
#[derive(Debug, Default)]
pub struct TableMetadataCache {
    tables: HashMap<u64, TableDescriptor>,
}

impl TableMetadataCache {
    pub fn new() -> Self {
        TableMetadataCache::default()
    }

    /// 기술자 등록 (같은 ID는 덮어씀)
    pub fn put(
        &mut self,
        table_id: u64,
        schema: impl Into<String>,
        table: impl Into<String>,
        column_count: usize,
    ) {
        self.tables.insert(
            table_id,
            TableDescriptor {
                table_id,
                schema: schema.into(),
                table: table.into(),
                column_count,
            },
        );
    }

    /// 기술자 조회. 등록되지 않은 ID는 프로토콜 순서 위반
    pub fn get(&self, table_id: u64) -> Result<&TableDescriptor> {
        self.tables
            .get(&table_id)
            .ok_or(CdcError::ProtocolOrderingViolation { table_id })
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut cache = TableMetadataCache::new();
        cache.put(7, "shop", "orders", 3);

        let descriptor = cache.get(7).unwrap();
        assert_eq!(descriptor.schema, "shop");
        assert_eq!(descriptor.table, "orders");
        assert_eq!(descriptor.column_count, 3);
    }

    #[test]
    fn test_unknown_table_is_ordering_violation() {
        let cache = TableMetadataCache::new();
        assert!(matches!(
            cache.get(7),
            Err(CdcError::ProtocolOrderingViolation { table_id: 7 })
        ));
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = TableMetadataCache::new();
        cache.put(7, "shop", "orders", 3);
        cache.put(7, "shop", "orders_v2", 4);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(7).unwrap().table, "orders_v2");
    }

    #[test]
    fn test_clear() {
        let mut cache = TableMetadataCache::new();
        cache.put(1, "a", "b", 1);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(1).is_err());
    }
}
