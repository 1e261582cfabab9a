//! Retry context and canned message templates used by the item client so every
//! operation reports retries and exhaustion with the same fields.

use crate::client::http::ClientError;
use crate::model::ItemId;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(item_id) = $ctx.item_id {
            tracing::$level!(item_id = item_id.get(), $($rest)*);
        } else {
            tracing::$level!($($rest)*);
        }
    }};
}

/// Logging labels for one client operation.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) success: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) absent: &'static str,
    pub(crate) exhausted: &'static str,
}

/// Context passed into the retry loop so callers can attach the item id being
/// fetched and reuse consistent log messaging.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    item_id: Option<ItemId>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            item_id: None,
            messages,
        }
    }

    pub(crate) fn with_item(messages: &'a RetryMessages, item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            messages,
        }
    }

    pub(crate) fn log_success(&self, attempt: usize) {
        log_with_retry_ctx!(trace, self, attempt, "{}", self.messages.success);
    }

    pub(crate) fn log_retry(&self, attempt: usize, next_backoff: Duration, err: &ClientError) {
        let backoff_ms = duration_to_millis(next_backoff);
        if err.is_absent() {
            log_with_retry_ctx!(
                debug,
                self,
                attempt,
                backoff_ms = backoff_ms,
                "{}",
                self.messages.absent
            );
        } else {
            log_with_retry_ctx!(
                warn,
                self,
                attempt,
                backoff_ms = backoff_ms,
                error = %err,
                "{}",
                self.messages.retry
            );
        }
    }

    pub(crate) fn log_exhausted(&self, attempts: usize, err: &ClientError) {
        log_with_retry_ctx!(
            error,
            self,
            attempts,
            error = %err,
            "{}",
            self.messages.exhausted
        );
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) const GET_MAX_ITEM_RETRY: RetryMessages = RetryMessages {
    success: "fetched max item id",
    retry: "maxitem request failed; retrying",
    absent: "maxitem not available yet; retrying",
    exhausted: "maxitem request exhausted retries",
};

pub(crate) const GET_ITEM_RETRY: RetryMessages = RetryMessages {
    success: "fetched item",
    retry: "item request failed; retrying",
    absent: "item not materialized yet; retrying",
    exhausted: "item request exhausted retries",
};

pub(crate) const GET_RAW_RETRY: RetryMessages = RetryMessages {
    success: "request completed",
    retry: "request failed; retrying",
    absent: "resource not available yet; retrying",
    exhausted: "request exhausted retries",
};
