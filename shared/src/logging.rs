//! 공통 로깅 초기화
//!
//! 모든 바이너리가 같은 방식으로 tracing 구독자를 설정합니다.
//! `ENV=DEV`면 개발용(컬러, 타겟 표시) 출력, 그 외에는 운영용 컴팩트
//! 출력을 사용합니다. 필터는 `RUST_LOG` 환경변수를 따르며 기본값은
//! `info`입니다.

use tracing_subscriber::EnvFilter;

/// tracing 구독자를 초기화합니다.
///
/// 이미 초기화된 경우(테스트 등) 조용히 무시합니다.
pub fn init(env: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if env == "DEV" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .pretty()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("로깅 구독자가 이미 초기화되어 있습니다");
    }
}
