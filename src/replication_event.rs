//! 애플리케이션 레벨 변경 이벤트
//!
//! 리스너가 받는 이벤트는 단일 행 변경(`RowMutation`) 또는 하나의 트랜잭션에 속한
//! 행 변경 묶음(`TransactionGroup`) 입니다. 묶음은 행 변경만 담을 수 있으므로
//! 중첩되지 않습니다.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 컬럼 값 (wire에서 디코딩된 그대로, 문자열 래퍼만 일반 문자열로 정규화)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::String(value.to_string())
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Double(value)
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => write!(f, "NULL"),
            ColumnValue::Int(v) => write!(f, "{}", v),
            ColumnValue::UInt(v) => write!(f, "{}", v),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::Double(v) => write!(f, "{}", v),
            ColumnValue::String(v) => write!(f, "{:?}", v),
            ColumnValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            ColumnValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// 컬럼 위치 순서대로 나열된 행
pub type Row = Vec<ColumnValue>;

/// 변경 연산 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "INSERT",
            MutationKind::Update => "UPDATE",
            MutationKind::Delete => "DELETE",
        }
    }
}

/// 단일 행 변경
///
/// INSERT는 `after`만, DELETE는 `before`만, UPDATE는 둘 다 가집니다.
/// 생성자를 통해서만 만들어지므로 이 조합이 항상 지켜집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMutation {
    kind: MutationKind,
    schema: String,
    table: String,
    before: Option<Row>,
    after: Option<Row>,
}

impl RowMutation {
    pub fn insert(schema: impl Into<String>, table: impl Into<String>, after: Row) -> Self {
        RowMutation {
            kind: MutationKind::Insert,
            schema: schema.into(),
            table: table.into(),
            before: None,
            after: Some(after),
        }
    }

    pub fn update(
        schema: impl Into<String>,
        table: impl Into<String>,
        before: Row,
        after: Row,
    ) -> Self {
        RowMutation {
            kind: MutationKind::Update,
            schema: schema.into(),
            table: table.into(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(schema: impl Into<String>, table: impl Into<String>, before: Row) -> Self {
        RowMutation {
            kind: MutationKind::Delete,
            schema: schema.into(),
            table: table.into(),
            before: Some(before),
            after: None,
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn before(&self) -> Option<&Row> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Row> {
        self.after.as_ref()
    }
}

impl fmt::Display for RowMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.kind.as_str(), self.schema, self.table)?;
        if let Some(before) = &self.before {
            write!(f, " before={}", format_row(before))?;
        }
        if let Some(after) = &self.after {
            write!(f, " after={}", format_row(after))?;
        }
        Ok(())
    }
}

fn format_row(row: &Row) -> String {
    let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(", "))
}

/// 리스너에게 전달되는 복제 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationEvent {
    /// 단일 행 변경
    RowMutation(RowMutation),
    /// 하나의 트랜잭션에서 발생한 행 변경들 (원래 순서 유지)
    TransactionGroup(Vec<RowMutation>),
}

impl ReplicationEvent {
    /// 이벤트에 포함된 행 변경 수
    pub fn len(&self) -> usize {
        match self {
            ReplicationEvent::RowMutation(_) => 1,
            ReplicationEvent::TransactionGroup(mutations) => mutations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 포함된 행 변경을 순서대로 순회
    pub fn mutations(&self) -> impl Iterator<Item = &RowMutation> {
        let slice = match self {
            ReplicationEvent::RowMutation(mutation) => std::slice::from_ref(mutation),
            ReplicationEvent::TransactionGroup(mutations) => mutations.as_slice(),
        };
        slice.iter()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl From<RowMutation> for ReplicationEvent {
    fn from(mutation: RowMutation) -> Self {
        ReplicationEvent::RowMutation(mutation)
    }
}

impl fmt::Display for ReplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationEvent::RowMutation(mutation) => write!(f, "{}", mutation),
            ReplicationEvent::TransactionGroup(mutations) => {
                write!(f, "TX[")?;
                for (i, mutation) in mutations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", mutation)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_mutation_images() {
        let insert = RowMutation::insert("shop", "orders", vec![ColumnValue::Int(1)]);
        assert!(insert.before().is_none());
        assert!(insert.after().is_some());

        let delete = RowMutation::delete("shop", "orders", vec![ColumnValue::Int(1)]);
        assert!(delete.before().is_some());
        assert!(delete.after().is_none());

        let update = RowMutation::update(
            "shop",
            "orders",
            vec![ColumnValue::Int(1)],
            vec![ColumnValue::Int(2)],
        );
        assert_eq!(update.kind(), MutationKind::Update);
        assert!(update.before().is_some() && update.after().is_some());
    }

    #[test]
    fn test_group_mutations_in_order() {
        let a = RowMutation::insert("shop", "orders", vec!["A".into()]);
        let b = RowMutation::insert("shop", "orders", vec!["B".into()]);
        let event = ReplicationEvent::TransactionGroup(vec![a.clone(), b.clone()]);

        assert_eq!(event.len(), 2);
        let mutations: Vec<_> = event.mutations().cloned().collect();
        assert_eq!(mutations, vec![a, b]);
    }

    #[test]
    fn test_display() {
        let event = ReplicationEvent::from(RowMutation::insert(
            "shop",
            "orders",
            vec![1i64.into(), "A".into(), 9.99f64.into()],
        ));
        assert_eq!(event.to_string(), "INSERT shop.orders after=[1, \"A\", 9.99]");
    }

    #[test]
    fn test_to_json() {
        let event = ReplicationEvent::from(RowMutation::delete(
            "shop",
            "orders",
            vec![ColumnValue::Null],
        ));
        let json = event.to_json().unwrap();
        assert_eq!(json["RowMutation"]["kind"], "Delete");
        assert_eq!(json["RowMutation"]["schema"], "shop");
    }
}
