//! Classification of chain failures into the submission taxonomy.
//!
//! JSON-RPC error codes of the author API are used whenever the node sends one. Pool statuses
//! and opaque transport errors only carry text, so those are matched on known substrings and
//! tagged with [`Classification::MessageText`].

use crate::evm::EvmError;
use crate::types::{
    BackendError, Classification, RejectReason, Rejection, SubmissionError, SubmissionState,
};
use std::time::Duration;

/// `author_*` error codes (`sc-rpc-api`)
mod codes {
    pub const POOL_INVALID_TX: i32 = 1010;
    pub const POOL_UNKNOWN_VALIDITY: i32 = 1011;
    pub const POOL_TEMPORARILY_BANNED: i32 = 1012;
    pub const POOL_ALREADY_IMPORTED: i32 = 1013;
    pub const POOL_TOO_LOW_PRIORITY: i32 = 1014;
    pub const POOL_IMMEDIATELY_DROPPED: i32 = 1016;
    pub const POOL_FUTURE_TX: i32 = 1020;
}

/// Whether a failure is worth another attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Retry with a fresh nonce
    Transient(SubmissionError),
    /// Surface to the caller
    Fatal(SubmissionError),
}

impl Verdict {
    fn from_rejection(rejection: Rejection) -> Self {
        if rejection.reason.is_transient() {
            Verdict::Transient(SubmissionError::Rejected(rejection))
        } else {
            Verdict::Fatal(SubmissionError::Rejected(rejection))
        }
    }

    pub fn into_error(self) -> SubmissionError {
        match self {
            Verdict::Transient(e) | Verdict::Fatal(e) => e,
        }
    }

    /// The same failure, never retried
    pub fn escalate(self) -> Self {
        Verdict::Fatal(self.into_error())
    }
}

/// Map the text of an invalid-transaction report to a reason.
///
/// Patterns are the `Display` strings of `InvalidTransaction`, the pool statuses relayed by
/// subxt and the errors of the EVM pool.
pub fn reason_from_message(message: &str) -> RejectReason {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("bad signature") || has("badproof") || has("invalid signing address") {
        RejectReason::BadProof
    } else if has("inability to pay") || has("insufficient funds") || has("payment") {
        RejectReason::Payment
    } else if has("outdated") || has("stale") || has("nonce too low") {
        RejectReason::Stale
    } else if has("usurped") || has("bad nonce") {
        // another transaction took the nonce, or the pool dropped this one on revalidation
        RejectReason::Stale
    } else if has("valid in the future") || has("future") {
        RejectReason::Future
    } else if has("exhaust") {
        RejectReason::ExhaustsResources
    } else if has("temporarily banned") {
        RejectReason::TemporarilyBanned
    } else if has("already imported") || has("already known") {
        RejectReason::AlreadyImported
    } else if has("priority is too low")
        || has("too low priority")
        || has("replacement transaction underpriced")
    {
        RejectReason::TooLowPriority
    } else {
        RejectReason::Other(message.to_string())
    }
}

/// Classify an error returned while submitting or watching an extrinsic
pub fn classify_backend_error(error: &BackendError) -> Verdict {
    match error {
        BackendError::Rpc {
            code,
            message,
            data,
        } => classify_rpc(*code, message, data.as_deref()),
        BackendError::Disconnected(reason) => Verdict::Transient(SubmissionError::Dropped {
            reason: format!("connection lost: {reason}"),
        }),
        BackendError::Decode(_) | BackendError::Metadata(_) => {
            Verdict::Fatal(SubmissionError::Rejected(Rejection {
                reason: RejectReason::Other(error.to_string()),
                code: None,
                classification: Classification::MessageText,
            }))
        }
        BackendError::Other(message) => {
            let reason = reason_from_message(message);
            if matches!(reason, RejectReason::Other(_)) {
                // opaque client failure, most likely the connection
                Verdict::Transient(SubmissionError::Dropped {
                    reason: message.clone(),
                })
            } else {
                Verdict::from_rejection(Rejection {
                    reason,
                    code: None,
                    classification: Classification::MessageText,
                })
            }
        }
    }
}

fn classify_rpc(code: i32, message: &str, data: Option<&str>) -> Verdict {
    let by_code = |reason| Rejection {
        reason,
        code: Some(code),
        classification: Classification::RpcCode,
    };

    match code {
        codes::POOL_TEMPORARILY_BANNED => {
            Verdict::from_rejection(by_code(RejectReason::TemporarilyBanned))
        }
        codes::POOL_ALREADY_IMPORTED => {
            Verdict::from_rejection(by_code(RejectReason::AlreadyImported))
        }
        codes::POOL_TOO_LOW_PRIORITY => {
            Verdict::from_rejection(by_code(RejectReason::TooLowPriority))
        }
        codes::POOL_FUTURE_TX => Verdict::from_rejection(by_code(RejectReason::Future)),
        codes::POOL_IMMEDIATELY_DROPPED => Verdict::Transient(SubmissionError::Dropped {
            reason: message.to_string(),
        }),
        // the code only says "invalid", the variant is in the error data
        codes::POOL_INVALID_TX | codes::POOL_UNKNOWN_VALIDITY => {
            Verdict::from_rejection(Rejection {
                reason: reason_from_message(data.unwrap_or(message)),
                code: Some(code),
                classification: Classification::MessageText,
            })
        }
        _ => Verdict::Fatal(SubmissionError::Rejected(Rejection {
            reason: RejectReason::Other(format!("{message} ({})", data.unwrap_or_default())),
            code: Some(code),
            classification: Classification::RpcCode,
        })),
    }
}

/// Classify a pool report about an already submitted extrinsic, `waited` after submission.
///
/// The node gives up on finality of an extrinsic that sits in a block for too long, and reports
/// it through the same invalid status.
pub fn classify_invalid(message: &str, waited: Duration) -> Verdict {
    if message.to_lowercase().contains("finality timeout") {
        return Verdict::Fatal(SubmissionError::Timeout {
            stage: SubmissionState::InBlock,
            after: waited,
        });
    }

    Verdict::from_rejection(Rejection {
        reason: reason_from_message(message),
        code: None,
        classification: Classification::MessageText,
    })
}

/// Classify a failure of an EVM transaction.
///
/// The EVM pool answers with generic JSON-RPC codes, so rejections are read from the text.
/// Failures after the transaction was accepted are classified as they are, callers that must not
/// resend it escalate them.
pub fn classify_evm_error(error: &EvmError) -> Verdict {
    match error {
        EvmError::Rpc(BackendError::Rpc {
            code,
            message,
            data,
        }) => {
            let text = match data {
                Some(data) => format!("{message}: {data}"),
                None => message.clone(),
            };
            let rejection = Rejection {
                reason: reason_from_message(&text),
                code: Some(*code),
                classification: Classification::MessageText,
            };
            Verdict::from_rejection(rejection)
        }
        EvmError::Rpc(other) => classify_backend_error(other),
        EvmError::ChainIdMismatch { .. } | EvmError::Signing(_) => {
            Verdict::Fatal(SubmissionError::Rejected(Rejection {
                reason: RejectReason::Other(error.to_string()),
                code: None,
                classification: Classification::MessageText,
            }))
        }
        EvmError::Reverted {
            transaction_hash, ..
        } => Verdict::Fatal(SubmissionError::Reverted {
            transaction_hash: *transaction_hash,
        }),
        EvmError::Timeout { waited, .. } => Verdict::Fatal(SubmissionError::Timeout {
            stage: SubmissionState::Submitted,
            after: *waited,
        }),
    }
}
