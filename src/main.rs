//! scaler-assist CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = scaler_assist::cli::Cli::parse();

    // 모든 외부 호출은 순차 실행
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(scaler_assist::cli::run(cli))
}
