//! 재시도 정책 - 고정 백오프
//!
//! 모델 호출, 템플릿 재생성, 저장소 쓰기에 동일하게 적용됩니다.
//! 시도 사이에만 대기하며 (마지막 실패 후에는 대기하지 않음), 지수 증가 없이
//! 같은 간격을 유지합니다.

use std::future::Future;
use std::time::Duration;

/// 기본 최대 시도 횟수
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 기본 백오프 (초)
pub const DEFAULT_BACKOFF_SECS: u64 = 5;

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최소 1)
    pub max_attempts: u32,
    /// 시도 사이 대기 시간
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(DEFAULT_BACKOFF_SECS))
    }
}

/// 모든 시도가 실패했을 때의 결과
#[derive(Debug)]
pub struct Exhausted<E> {
    /// 실제 수행한 시도 횟수
    pub attempts: u32,
    /// 마지막 시도의 에러
    pub last_error: E,
}

impl RetryPolicy {
    /// 새 정책 생성 (0회는 1회로 보정)
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// 대기 없이 1회만 시도하는 정책
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// 시도 사이 대기
    pub async fn pause(&self) {
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// 작업을 정책에 따라 실행
    ///
    /// `operation`은 1부터 시작하는 시도 번호를 받습니다. `should_retry`가
    /// false를 반환하는 에러는 즉시 반환됩니다 (남은 시도 무시).
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.max_attempts || !should_retry(&e) {
                        return Err(Exhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    tracing::warn!(
                        "{} failed, retrying in {:?} (attempt {}/{}): {}",
                        label,
                        self.backoff,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    self.pause().await;
                    attempt += 1;
                }
            }
        }
    }
}
