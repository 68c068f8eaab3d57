//! Key-rotating request dispatcher for the generative-language service.
//!
//! Quota faults belong to one credential and are absorbed by moving to the
//! next key; unavailability is service-wide and is absorbed by waiting on the
//! same key. Anything else fails immediately. Every retried fault consumes one
//! unit of a bounded retry budget.
//!
//! The pool cursor survives between calls, so the next request starts from the
//! key that last succeeded. The dispatcher is driven through `&mut self`; calls
//! cannot interleave, which is what keeps the cursor consistent without a lock.

mod gemini;

pub use gemini::{classify_error, GeminiClient, DEFAULT_API_BASE};

use crate::error::{DigestError, Result};
use crate::log::RunLogger;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// A fault reported by the generative service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateFault {
    /// The calling credential's allowance is used up.
    #[error("quota exceeded: {0}")]
    Quota(String),
    /// The service is temporarily down, regardless of credential.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

/// The generative-language service.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<String, GenerateFault>;
}

/// Suspends the dispatcher between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Ordered, non-empty credential list with a persistent cursor.
#[derive(Clone)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    current_index: usize,
}

impl ApiKeyPool {
    /// Build a pool. Blank keys are dropped; an empty pool is a configuration fault.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Result<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(DigestError::Config(
                "No API key configured. Set GEMINI_API_KEY (or GEMINI_API_KEYS=key1,key2).".into(),
            ));
        }

        Ok(Self {
            keys,
            current_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    fn key(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }

    fn set_current(&mut self, index: usize) {
        self.current_index = index % self.keys.len();
    }
}

impl std::fmt::Debug for ApiKeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPool")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("current_index", &self.current_index)
            .finish()
    }
}

/// Retry budget and pauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum faulted attempts per request.
    pub max_attempts: u32,
    /// Pause before moving to the next key.
    pub switch_delay: Duration,
    /// Pause after the whole pool has hit its quota.
    pub cooldown: Duration,
    /// Pause before retrying an unavailable service.
    pub unavailable_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            switch_delay: Duration::from_secs(2),
            cooldown: Duration::from_secs(60),
            unavailable_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, kind: DelayKind) -> Duration {
        match kind {
            DelayKind::KeySwitch => self.switch_delay,
            DelayKind::PoolCooldown => self.cooldown,
            DelayKind::Unavailable => self.unavailable_delay,
        }
    }
}

/// Which pause precedes the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    KeySwitch,
    PoolCooldown,
    Unavailable,
}

/// Retry loop state for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub key_index: usize,
    pub attempts_used: u32,
}

/// Transition out of a faulted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sleep, then attempt again from `next`.
    Retry { next: AttemptState, delay: DelayKind },
    /// The retry budget is spent.
    Exhausted { attempts: u32 },
    /// Not retryable.
    Abort,
}

impl AttemptState {
    pub fn start(key_index: usize) -> Self {
        Self {
            key_index,
            attempts_used: 0,
        }
    }

    /// Apply a fault to the state.
    pub fn on_fault(self, fault: &GenerateFault, pool_size: usize, max_attempts: u32) -> Step {
        let (next, delay) = match fault {
            GenerateFault::Other(_) => return Step::Abort,
            GenerateFault::Quota(_) => {
                let key_index = (self.key_index + 1) % pool_size.max(1);
                let delay = if key_index == 0 {
                    DelayKind::PoolCooldown
                } else {
                    DelayKind::KeySwitch
                };
                (key_index, delay)
            }
            GenerateFault::Unavailable(_) => (self.key_index, DelayKind::Unavailable),
        };

        let attempts_used = self.attempts_used + 1;
        if attempts_used >= max_attempts {
            return Step::Exhausted {
                attempts: attempts_used,
            };
        }

        Step::Retry {
            next: AttemptState {
                key_index: next,
                attempts_used,
            },
            delay,
        }
    }
}

/// Issues generation requests, rotating keys and backing off as needed.
pub struct KeyRotationDispatcher {
    client: Box<dyn GenerativeClient>,
    pool: ApiKeyPool,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl KeyRotationDispatcher {
    pub fn new(client: Box<dyn GenerativeClient>, pool: ApiKeyPool, policy: RetryPolicy) -> Self {
        Self::with_sleeper(client, pool, policy, Box::new(TokioSleeper))
    }

    pub fn with_sleeper(
        client: Box<dyn GenerativeClient>,
        pool: ApiKeyPool,
        policy: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            pool,
            policy,
            sleeper,
        }
    }

    pub fn pool(&self) -> &ApiKeyPool {
        &self.pool
    }

    /// Send `prompt` to `model`, returning the generated text.
    #[instrument(skip(self, prompt, log), fields(prompt_chars = prompt.len()))]
    pub async fn generate(&mut self, model: &str, prompt: &str, log: &RunLogger) -> Result<String> {
        let pool_size = self.pool.len();
        let mut state = AttemptState::start(self.pool.current_index());

        loop {
            debug!(key_index = state.key_index, attempts = state.attempts_used, "Attempting request");
            let fault = match self
                .client
                .generate(self.pool.key(state.key_index), model, prompt)
                .await
            {
                Ok(text) => {
                    self.pool.set_current(state.key_index);
                    return Ok(text);
                }
                Err(fault) => fault,
            };

            match state.on_fault(&fault, pool_size, self.policy.max_attempts) {
                Step::Retry { next, delay } => {
                    let pause = self.policy.delay_for(delay);
                    match delay {
                        DelayKind::KeySwitch => log.warning(format!(
                            "API key #{} hit its quota, switching to key #{} in {}s",
                            state.key_index + 1,
                            next.key_index + 1,
                            pause.as_secs()
                        )),
                        DelayKind::PoolCooldown => log.warning(format!(
                            "All {} API key(s) hit their quota, cooling down for {}s",
                            pool_size,
                            pause.as_secs()
                        )),
                        DelayKind::Unavailable => log.warning(format!(
                            "Service unavailable ({}), retrying in {}s (attempt {}/{})",
                            fault,
                            pause.as_secs(),
                            next.attempts_used,
                            self.policy.max_attempts
                        )),
                    }
                    self.sleeper.sleep(pause).await;
                    state = next;
                }
                Step::Exhausted { attempts } => {
                    log.warning(format!("Giving up after {} attempts: {}", attempts, fault));
                    return Err(DigestError::RetryBudgetExhausted {
                        attempts,
                        last_fault: fault.to_string(),
                    });
                }
                Step::Abort => {
                    return Err(DigestError::Provider(fault.to_string()));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::log::MemorySink;
    use std::sync::Arc;

    fn pool(keys: &[&str]) -> ApiKeyPool {
        ApiKeyPool::new(keys.iter().map(|k| k.to_string())).unwrap()
    }

    fn logger() -> RunLogger {
        RunLogger::new(Arc::new(MemorySink::new()))
    }

    fn quota() -> std::result::Result<String, GenerateFault> {
        Err(GenerateFault::Quota("429".into()))
    }

    fn dispatcher(
        client: &ScriptedClient,
        sleeper: &RecordingSleeper,
        keys: &[&str],
        max_attempts: u32,
    ) -> KeyRotationDispatcher {
        KeyRotationDispatcher::with_sleeper(
            Box::new(client.clone()),
            pool(keys),
            test_policy(max_attempts),
            Box::new(sleeper.clone()),
        )
    }

    #[test]
    fn test_empty_pool_is_config_error() {
        let result = ApiKeyPool::new(vec!["".to_string(), "  ".to_string()]);
        assert!(matches!(result, Err(DigestError::Config(_))));
    }

    #[test]
    fn test_pool_debug_redacts_keys() {
        let rendered = format!("{:?}", pool(&["secret-1", "secret-2"]));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("2 redacted"));
    }

    #[test]
    fn test_quota_fault_advances_key() {
        let step = AttemptState::start(0).on_fault(&GenerateFault::Quota("q".into()), 3, 10);
        assert_eq!(
            step,
            Step::Retry {
                next: AttemptState { key_index: 1, attempts_used: 1 },
                delay: DelayKind::KeySwitch,
            }
        );
    }

    #[test]
    fn test_quota_fault_wrapping_to_zero_cools_down() {
        let state = AttemptState { key_index: 2, attempts_used: 4 };
        let step = state.on_fault(&GenerateFault::Quota("q".into()), 3, 10);
        assert_eq!(
            step,
            Step::Retry {
                next: AttemptState { key_index: 0, attempts_used: 5 },
                delay: DelayKind::PoolCooldown,
            }
        );
    }

    #[test]
    fn test_unavailable_fault_keeps_key() {
        let state = AttemptState { key_index: 1, attempts_used: 0 };
        let step = state.on_fault(&GenerateFault::Unavailable("503".into()), 3, 10);
        assert_eq!(
            step,
            Step::Retry {
                next: AttemptState { key_index: 1, attempts_used: 1 },
                delay: DelayKind::Unavailable,
            }
        );
    }

    #[test]
    fn test_other_fault_aborts_without_budget() {
        let state = AttemptState { key_index: 0, attempts_used: 9 };
        assert_eq!(state.on_fault(&GenerateFault::Other("400".into()), 2, 10), Step::Abort);
    }

    #[test]
    fn test_budget_reached_is_exhausted() {
        let state = AttemptState { key_index: 0, attempts_used: 2 };
        assert_eq!(
            state.on_fault(&GenerateFault::Unavailable("503".into()), 2, 3),
            Step::Exhausted { attempts: 3 }
        );
    }

    #[tokio::test]
    async fn test_two_key_scenario_single_cooldown() {
        let client = ScriptedClient::new(vec![quota(), quota(), quota(), Ok("summary".into())]);
        let sleeper = RecordingSleeper::default();
        let mut dispatcher = dispatcher(&client, &sleeper, &["k1", "k2"], 10);

        let result = dispatcher.generate("model", "prompt", &logger()).await.unwrap();

        assert_eq!(result, "summary");
        assert_eq!(client.keys_used(), vec!["k1", "k2", "k1", "k2"]);

        let sleeps = sleeper.sleeps.lock().unwrap().clone();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(60),
                Duration::from_secs(2)
            ]
        );
        assert_eq!(sleeps.iter().filter(|d| **d == Duration::from_secs(60)).count(), 1);
        assert_eq!(dispatcher.pool().current_index(), 1);
    }

    #[tokio::test]
    async fn test_cycles_whole_pool_before_cooldown_and_respects_budget() {
        let client = ScriptedClient::new(Vec::new()); // every call is a quota fault
        let sleeper = RecordingSleeper::default();
        let mut dispatcher = dispatcher(&client, &sleeper, &["a", "b", "c"], 7);

        let err = dispatcher.generate("model", "prompt", &logger()).await.unwrap_err();

        assert!(matches!(err, DigestError::RetryBudgetExhausted { attempts: 7, .. }));
        assert_eq!(client.keys_used(), vec!["a", "b", "c", "a", "b", "c", "a"]);

        let sleeps = sleeper.sleeps.lock().unwrap().clone();
        assert_eq!(sleeps.len(), 6);
        let first_cooldown = sleeps
            .iter()
            .position(|d| *d == Duration::from_secs(60))
            .unwrap();
        // Sleeps after a, b are switches; the one after c is the first cooldown.
        assert_eq!(first_cooldown, 2);
    }

    #[tokio::test]
    async fn test_unavailable_retries_same_key() {
        let client = ScriptedClient::new(vec![
            Err(GenerateFault::Unavailable("503".into())),
            Err(GenerateFault::Unavailable("503".into())),
            Ok("ok".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let mut dispatcher = dispatcher(&client, &sleeper, &["k1", "k2"], 10);

        assert_eq!(dispatcher.generate("m", "p", &logger()).await.unwrap(), "ok");
        assert_eq!(client.keys_used(), vec!["k1", "k1", "k1"]);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn test_other_fault_propagates_immediately() {
        let client = ScriptedClient::new(vec![
            Err(GenerateFault::Other("invalid argument".into())),
            Ok("never".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let mut dispatcher = dispatcher(&client, &sleeper, &["k1", "k2"], 10);

        let err = dispatcher.generate("m", "p", &logger()).await.unwrap_err();

        assert!(matches!(err, DigestError::Provider(ref msg) if msg.contains("invalid argument")));
        assert_eq!(client.keys_used().len(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_persists_between_calls() {
        let client = ScriptedClient::new(vec![quota(), Ok("first".into()), Ok("second".into())]);
        let sleeper = RecordingSleeper::default();
        let mut dispatcher = dispatcher(&client, &sleeper, &["k1", "k2", "k3"], 10);
        let log = logger();

        assert_eq!(dispatcher.generate("m", "p1", &log).await.unwrap(), "first");
        assert_eq!(dispatcher.generate("m", "p2", &log).await.unwrap(), "second");

        assert_eq!(client.keys_used(), vec!["k1", "k2", "k2"]);
        assert_eq!(dispatcher.pool().current_index(), 1);
    }
}
