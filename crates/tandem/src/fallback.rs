use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{CaughtError, ErrorKind, FallbackError, LlmError};
use crate::providers::base::Provider;
use crate::response::Params;

/// Which error classes an attempt is allowed to swallow. An empty set
/// catches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catch {
    kinds: Vec<ErrorKind>,
}

impl Catch {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(kind: ErrorKind) -> Self {
        Self { kinds: vec![kind] }
    }

    pub fn any_of<I: IntoIterator<Item = ErrorKind>>(kinds: I) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn matches(&self, error: &LlmError) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&error.kind())
    }
}

/// One backup attempt: which errors it may swallow and how to override
/// the call. This list is the fallback component's entire configuration
/// surface.
#[derive(Clone)]
pub struct FallbackEntry {
    pub catch: Catch,
    pub provider: String,
    pub model: String,
    pub params: Option<Params>,
    pub client: Option<Arc<dyn Provider>>,
}

impl FallbackEntry {
    pub fn new<P, M>(catch: Catch, provider: P, model: M) -> Self
    where
        P: Into<String>,
        M: Into<String>,
    {
        Self {
            catch,
            provider: provider.into(),
            model: model.into(),
            params: None,
            client: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_client(mut self, client: Arc<dyn Provider>) -> Self {
        self.client = Some(client);
        self
    }
}

impl std::fmt::Debug for FallbackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEntry")
            .field("catch", &self.catch)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("params", &self.params)
            .field("client", &self.client.as_ref().map(|c| c.id().to_string()))
            .finish()
    }
}

/// A successful result plus the failures that preceded it, in attempt
/// order. Empty `caught` means the primary call succeeded outright.
#[derive(Debug)]
pub struct FallbackOutcome<R> {
    pub value: R,
    pub caught: Vec<CaughtError>,
}

/// Run `call` with sequential fallback.
///
/// The primary invocation receives `None`; each fallback entry is passed
/// in listed order until one succeeds, and later entries are never tried.
/// An error that does not match the applicable `catch` propagates
/// immediately. When every attempt fails, the returned `FallbackError`
/// enumerates the caught errors in attempt order.
///
/// Attempts run strictly one after another — never concurrently — and no
/// overall time budget is applied; the chain is bounded only by each
/// attempt's own timeout. The synchronous calling convention is
/// preserved: use [`run_fallback_async`] for async calls.
pub fn run_fallback<R, F>(
    catch: &Catch,
    fallbacks: &[FallbackEntry],
    mut call: F,
) -> Result<FallbackOutcome<R>, LlmError>
where
    F: FnMut(Option<&FallbackEntry>) -> Result<R, LlmError>,
{
    let mut caught: Vec<CaughtError> = Vec::new();

    match call(None) {
        Ok(value) => return Ok(FallbackOutcome { value, caught }),
        Err(error) if catch.matches(&error) => {
            warn!("primary call failed, trying fallbacks: {error}");
            caught.push(CaughtError {
                provider: None,
                model: None,
                error,
            });
        }
        Err(error) => return Err(error),
    }

    for entry in fallbacks {
        match call(Some(entry)) {
            Ok(value) => return Ok(FallbackOutcome { value, caught }),
            Err(error) if entry.catch.matches(&error) => {
                warn!(
                    provider = %entry.provider,
                    model = %entry.model,
                    "fallback attempt failed: {error}"
                );
                caught.push(CaughtError {
                    provider: Some(entry.provider.clone()),
                    model: Some(entry.model.clone()),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    Err(LlmError::Fallback(FallbackError { caught }))
}

/// Async mirror of [`run_fallback`], for calls that are themselves async.
/// Entries are passed by value so the returned future owns its override.
pub async fn run_fallback_async<R, F, Fut>(
    catch: &Catch,
    fallbacks: &[FallbackEntry],
    mut call: F,
) -> Result<FallbackOutcome<R>, LlmError>
where
    F: FnMut(Option<FallbackEntry>) -> Fut,
    Fut: Future<Output = Result<R, LlmError>>,
{
    let mut caught: Vec<CaughtError> = Vec::new();

    match call(None).await {
        Ok(value) => return Ok(FallbackOutcome { value, caught }),
        Err(error) if catch.matches(&error) => {
            warn!("primary call failed, trying fallbacks: {error}");
            caught.push(CaughtError {
                provider: None,
                model: None,
                error,
            });
        }
        Err(error) => return Err(error),
    }

    for entry in fallbacks {
        match call(Some(entry.clone())).await {
            Ok(value) => return Ok(FallbackOutcome { value, caught }),
            Err(error) if entry.catch.matches(&error) => {
                warn!(
                    provider = %entry.provider,
                    model = %entry.model,
                    "fallback attempt failed: {error}"
                );
                caught.push(CaughtError {
                    provider: Some(entry.provider.clone()),
                    model: Some(entry.model.clone()),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    Err(LlmError::Fallback(FallbackError { caught }))
}
