/// MySQL 복제 스트림 사용 예제
///
/// 서버의 binlog를 읽어 행 변경 이벤트를 로그로 출력합니다. Ctrl+C로 종료하면
/// 다음 실행에서 이어 읽을 위치를 출력합니다.
use mysql_replication_stream::{
    ConnectionConfig, ListenerError, MySqlBinlogSource, Position, ReplicationEvent,
    ReplicationListener, ReplicationStream, StreamConfig,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 받은 이벤트를 JSON으로 출력하는 리스너
struct LoggingListener;

impl ReplicationListener for LoggingListener {
    fn on_event(&self, event: &ReplicationEvent) -> Result<(), ListenerError> {
        info!("{} mutation(s): {}", event.len(), event.to_json()?);
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt::init();

    // 연결 설정
    let connection = ConnectionConfig {
        hostname: env_or("DB_HOST", "localhost"),
        port: env_or("DB_PORT", "3306").parse().unwrap_or(3306),
        username: env_or("DB_USER", "testuser"),
        password: env_or("DB_PASSWORD", "testpass"),
        database: env::var("DB_NAME").ok(),
        server_id: env_or("DB_SERVER_ID", "1001").parse().unwrap_or(1001),
        timeout: Duration::from_secs(30),
    };

    let config = StreamConfig {
        group_events_by_transaction: env_or("GROUP_BY_TRANSACTION", "true") != "false",
        ..Default::default()
    };

    info!("Connecting to {}", connection.address());

    let stream = Arc::new(ReplicationStream::with_config(
        MySqlBinlogSource::new(connection),
        config,
    ));
    stream.register_listener(Arc::new(LoggingListener));

    // 이전 실행에서 출력된 위치부터 이어 읽기 (e.g. "mysql-bin.000003#4097")
    if let Ok(resume) = env::var("BINLOG_POSITION") {
        let position: Position = resume.parse()?;
        stream.set_position(position)?;
    }

    // connect/disconnect는 블로킹 API
    let connector = stream.clone();
    let started = tokio::task::spawn_blocking(move || connector.connect()).await??;
    info!("Streaming from {} - press Ctrl+C to stop", started);

    tokio::signal::ctrl_c().await?;

    let disconnector = stream.clone();
    tokio::task::spawn_blocking(move || disconnector.disconnect()).await??;

    if let Some(position) = stream.position() {
        info!("Stopped. Resume with BINLOG_POSITION={}", position);
    }

    Ok(())
}
