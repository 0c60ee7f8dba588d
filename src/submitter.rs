//! Submission of extrinsics until finality, with retries of transient failures

use crate::call::{self, ChainCall};
use crate::classify::{classify_backend_error, classify_invalid, Verdict};
use crate::storage::ProxyType;
use crate::traits::{ChainBackend, FinalizedInclusion, TxEvent};
use crate::types::{
    AccountId32, DispatchOutcome, SubmissionError, SubmissionState, TimeoutError, H256,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// How hard to try before giving up on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Deadline for a single attempt to reach finality
    pub per_attempt_timeout: Duration,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            per_attempt_timeout: Duration::from_secs(60),
            backoff: Duration::from_secs(1),
        }
    }
}

/// A finalized extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedReceipt {
    pub extrinsic_hash: H256,
    pub block_hash: H256,
    pub block_number: u64,
    /// Dispatch result of the extrinsic
    pub outcome: DispatchOutcome,
    /// Dispatch result of the inner call of a proxied extrinsic
    pub proxy_outcome: Option<DispatchOutcome>,
    /// Attempts it took, starting at 1
    pub attempts: u32,
}

impl FinalizedReceipt {
    fn new(inclusion: FinalizedInclusion, attempts: u32) -> Self {
        Self {
            extrinsic_hash: inclusion.extrinsic_hash,
            block_hash: inclusion.block_hash,
            block_number: inclusion.block_number,
            outcome: inclusion.outcome,
            proxy_outcome: inclusion.proxy_outcome,
            attempts,
        }
    }

    /// Turn a failed dispatch into [`SubmissionError::ModuleError`]
    pub fn into_result(self) -> Result<Self, SubmissionError> {
        if let DispatchOutcome::Failed(failure) = &self.outcome {
            return Err(SubmissionError::ModuleError(failure.clone()));
        }
        if let Some(DispatchOutcome::Failed(failure)) = &self.proxy_outcome {
            return Err(SubmissionError::ModuleError(failure.clone()));
        }
        Ok(self)
    }
}

/// Drives extrinsics through a [`ChainBackend`]
pub struct TransactionSubmitter<B> {
    backend: B,
}

impl<B: ChainBackend> TransactionSubmitter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Submit `call` signed by `signer` and wait for its finalization.
    ///
    /// Transient failures are retried up to `policy.max_attempts` times, with a fresh nonce on
    /// every attempt. A failed dispatch is not an error here, see [`FinalizedReceipt::into_result`].
    pub async fn submit_and_wait(
        &self,
        call: &ChainCall,
        signer: &B::Signer,
        policy: &RetryPolicy,
    ) -> Result<FinalizedReceipt, SubmissionError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            log::debug!(
                "{}::{} attempt {}/{}: {:?}",
                call.pallet(),
                call.name(),
                attempt,
                max_attempts,
                SubmissionState::Built
            );

            match self.attempt(call, signer, policy.per_attempt_timeout).await {
                Ok(inclusion) => {
                    log::info!(
                        "{}::{} finalized in block #{} ({:?}) after {} attempt(s)",
                        call.pallet(),
                        call.name(),
                        inclusion.block_number,
                        inclusion.block_hash,
                        attempt
                    );
                    return Ok(FinalizedReceipt::new(inclusion, attempt));
                }
                Err(Verdict::Transient(e)) if attempt < max_attempts => {
                    log::warn!(
                        "{}::{} attempt {} failed, retrying in {:?}: {}",
                        call.pallet(),
                        call.name(),
                        attempt,
                        policy.backoff,
                        e
                    );
                    sleep(policy.backoff).await;
                }
                Err(verdict) => {
                    let e = verdict.into_error();
                    log::warn!(
                        "{}::{} failed after {} attempt(s): {}",
                        call.pallet(),
                        call.name(),
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Dispatch `call` as `proxied` through `Proxy::proxy`, signed by the delegate.
    ///
    /// Unlike [`Self::submit_and_wait`] a failed dispatch is returned as an error, with
    /// authorization failures reported as [`SubmissionError::ProxyNotAuthorized`].
    pub async fn submit_via_proxy(
        &self,
        call: &ChainCall,
        proxied: &AccountId32,
        force_proxy_type: Option<ProxyType>,
        delegate_signer: &B::Signer,
        policy: &RetryPolicy,
    ) -> Result<FinalizedReceipt, SubmissionError> {
        let wrapped = call::proxy(proxied, force_proxy_type, call);
        let receipt = self
            .submit_and_wait(&wrapped, delegate_signer, policy)
            .await?;
        check_proxy_outcome(receipt)
    }

    /// Wait until the finalized chain reaches block `target`
    pub async fn wait_for_block_height(
        &self,
        target: u64,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<(), TimeoutError> {
        let started = Instant::now();
        let mut last_seen = None;

        let polled = timeout(deadline, self.poll_height(target, poll_interval, &mut last_seen)).await;

        match polled {
            Ok(()) => Ok(()),
            Err(_) => Err(TimeoutError {
                target,
                last_seen,
                waited: started.elapsed(),
            }),
        }
    }

    async fn poll_height(&self, target: u64, poll_interval: Duration, last_seen: &mut Option<u64>) {
        loop {
            match self.backend.finalized_block_number().await {
                Ok(number) => {
                    *last_seen = Some(number);
                    if number >= target {
                        log::debug!("reached block #{} (target #{})", number, target);
                        return;
                    }
                }
                Err(e) => log::warn!("failed to read the finalized block number: {}", e),
            }
            sleep(poll_interval).await;
        }
    }

    /// One attempt, bounded by `limit`
    async fn attempt(
        &self,
        call: &ChainCall,
        signer: &B::Signer,
        limit: Duration,
    ) -> Result<FinalizedInclusion, Verdict> {
        let mut stage = SubmissionState::Built;
        let followed = timeout(limit, self.follow(call, signer, &mut stage)).await;

        let verdict = match followed {
            Ok(Ok(inclusion)) => return Ok(inclusion),
            Ok(Err(verdict)) => verdict,
            Err(_) if executes(stage) => {
                Verdict::Fatal(SubmissionError::Timeout { stage, after: limit })
            }
            Err(_) => Verdict::Transient(SubmissionError::Dropped {
                reason: format!("not included after {:?}", limit),
            }),
        };

        Err(settle(verdict, stage))
    }

    async fn follow(
        &self,
        call: &ChainCall,
        signer: &B::Signer,
        stage: &mut SubmissionState,
    ) -> Result<FinalizedInclusion, Verdict> {
        let started = Instant::now();
        let mut events = self
            .backend
            .submit_and_watch(call, signer)
            .await
            .map_err(|e| classify_backend_error(&e))?;
        *stage = SubmissionState::Submitted;
        log::debug!("{}::{}: {:?}", call.pallet(), call.name(), stage);

        while let Some(event) = events.next().await {
            match event.map_err(|e| classify_backend_error(&e))? {
                TxEvent::Validated | TxEvent::Broadcast => {}
                TxEvent::InBlock { block_hash } => {
                    *stage = SubmissionState::InBlock;
                    log::debug!("{}::{}: {:?} {:?}", call.pallet(), call.name(), stage, block_hash);
                }
                TxEvent::Retracted => {
                    *stage = SubmissionState::Submitted;
                    log::debug!("{}::{}: retracted", call.pallet(), call.name());
                }
                TxEvent::InFinalizedBlock {
                    block_hash,
                    extrinsic_hash,
                } => {
                    *stage = SubmissionState::Finalized;
                    log::debug!(
                        "{}::{}: {:?} {:?} in {:?}",
                        call.pallet(),
                        call.name(),
                        stage,
                        extrinsic_hash,
                        block_hash
                    );
                }
                TxEvent::Finalized(inclusion) => {
                    *stage = SubmissionState::Finalized;
                    return Ok(inclusion);
                }
                TxEvent::Invalid(message) => {
                    let verdict = classify_invalid(&message, started.elapsed());
                    if !executes(*stage) {
                        *stage = SubmissionState::Rejected;
                    }
                    return Err(verdict);
                }
                TxEvent::Dropped(reason) | TxEvent::Error(reason) => {
                    return Err(Verdict::Transient(SubmissionError::Dropped { reason }));
                }
            }
        }

        Err(Verdict::Transient(SubmissionError::Dropped {
            reason: "status subscription ended".to_string(),
        }))
    }
}

/// Whether the extrinsic was seen in a block that is still part of the chain
fn executes(stage: SubmissionState) -> bool {
    matches!(stage, SubmissionState::InBlock | SubmissionState::Finalized)
}

/// An extrinsic seen in a block may have executed, so losing track of it is never retried
fn settle(verdict: Verdict, stage: SubmissionState) -> Verdict {
    if executes(stage) {
        verdict.escalate()
    } else {
        verdict
    }
}

fn check_proxy_outcome(receipt: FinalizedReceipt) -> Result<FinalizedReceipt, SubmissionError> {
    if let DispatchOutcome::Failed(failure) = &receipt.outcome {
        if failure.is_module_error("Proxy", "NotProxy") {
            return Err(SubmissionError::ProxyNotAuthorized);
        }
        return Err(SubmissionError::ModuleError(failure.clone()));
    }
    if let Some(DispatchOutcome::Failed(failure)) = &receipt.proxy_outcome {
        if failure.is_module_error("System", "CallFiltered") {
            return Err(SubmissionError::ProxyNotAuthorized);
        }
        return Err(SubmissionError::ModuleError(failure.clone()));
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TxEventStream;
    use crate::types::{BackendError, DispatchFailure, RejectReason};
    use futures::stream;
    use jsonrpsee::core::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// What the fake node does with one submission
    enum Script {
        /// Refuse it outright
        Refuse(BackendError),
        /// Report these events, then close the subscription
        Events(Vec<TxEvent>),
        /// Report these events, then go quiet
        Stall(Vec<TxEvent>),
        /// Report these events, then fail the subscription
        Fail(Vec<TxEvent>, BackendError),
    }

    #[derive(Default)]
    struct FakeBackend {
        script: Mutex<VecDeque<Script>>,
        submitted: Mutex<Vec<ChainCall>>,
        heights: Mutex<VecDeque<Result<u64, BackendError>>>,
    }

    impl FakeBackend {
        fn with_script(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn submissions(&self) -> usize {
            self.submitted.lock().len()
        }
    }

    #[async_trait]
    impl ChainBackend for FakeBackend {
        type Signer = ();

        async fn submit_and_watch(
            &self,
            call: &ChainCall,
            _signer: &(),
        ) -> Result<TxEventStream, BackendError> {
            self.submitted.lock().push(call.clone());
            let next = self
                .script
                .lock()
                .pop_front()
                .expect("more submissions than scripted");

            match next {
                Script::Refuse(e) => Err(e),
                Script::Events(events) => Ok(stream::iter(events.into_iter().map(Ok)).boxed()),
                Script::Stall(events) => Ok(stream::iter(events.into_iter().map(Ok))
                    .chain(stream::pending::<Result<TxEvent, BackendError>>())
                    .boxed()),
                Script::Fail(events, e) => Ok(stream::iter(events.into_iter().map(Ok))
                    .chain(stream::iter([Err(e)]))
                    .boxed()),
            }
        }

        async fn finalized_block_number(&self) -> Result<u64, BackendError> {
            let mut heights = self.heights.lock();
            match heights.len() {
                0 => Err(BackendError::Disconnected("no more heights".to_string())),
                // the last height sticks
                1 => heights[0].clone(),
                _ => heights.pop_front().expect("checked length"),
            }
        }
    }

    fn hash(n: u8) -> H256 {
        H256::from([n; 32])
    }

    fn finalized(outcome: DispatchOutcome, proxy_outcome: Option<DispatchOutcome>) -> Vec<TxEvent> {
        vec![
            TxEvent::Validated,
            TxEvent::Broadcast,
            TxEvent::InBlock {
                block_hash: hash(1),
            },
            TxEvent::InFinalizedBlock {
                block_hash: hash(1),
                extrinsic_hash: hash(2),
            },
            TxEvent::Finalized(FinalizedInclusion {
                block_hash: hash(1),
                block_number: 10,
                extrinsic_hash: hash(2),
                outcome,
                proxy_outcome,
            }),
        ]
    }

    fn pool_error(code: i32, data: &str) -> BackendError {
        BackendError::Rpc {
            code,
            message: "Invalid Transaction".to_string(),
            data: Some(data.to_string()),
        }
    }

    fn module(pallet: &str, error: &str) -> DispatchFailure {
        DispatchFailure::Module {
            pallet: pallet.to_string(),
            error: error.to_string(),
            pallet_index: 0,
            error_index: 0,
        }
    }

    fn some_call() -> ChainCall {
        call::transfer_keep_alive(&AccountId32::from([2u8; 32]), 1_000)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalized_first_attempt() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![Script::Events(
            finalized(DispatchOutcome::Success, None),
        )]));

        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.block_number, 10);
        assert_eq!(receipt.block_hash, hash(1));
        assert_eq!(receipt.extrinsic_hash, hash(2));
        assert!(receipt.outcome.is_success());
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Refuse(pool_error(1014, "Priority is too low")),
            Script::Refuse(pool_error(1010, "Transaction is outdated")),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let started = Instant::now();
        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(submitter.backend().submissions(), 3);
        // two backoffs
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_never_exceed_max() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Refuse(pool_error(1013, "")),
            Script::Refuse(pool_error(1013, "")),
            Script::Refuse(pool_error(1013, "")),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        match err {
            SubmissionError::Rejected(rejection) => {
                assert_eq!(rejection.reason, RejectReason::AlreadyImported)
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(submitter.backend().submissions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_rejection_is_not_retried() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Refuse(pool_error(
                1010,
                "Inability to pay some fees (e.g. account balance too low)",
            )),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::Rejected(ref r) if r.reason == RejectReason::Payment
        ));
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_invalid_status_is_retried() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(vec![
                TxEvent::Validated,
                TxEvent::Invalid(
                    "Transaction was usurped by another with the same nonce".to_string(),
                ),
            ]),
            Script::Events(vec![
                TxEvent::Validated,
                TxEvent::Invalid(
                    "Transaction is invalid (eg because of a bad nonce, signature etc)"
                        .to_string(),
                ),
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(submitter.backend().submissions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_after_inclusion_is_fatal() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(vec![
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
                TxEvent::Invalid(
                    "Transaction was usurped by another with the same nonce".to_string(),
                ),
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::Rejected(ref r) if r.reason == RejectReason::Stale
        ));
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finality_timeout_is_fatal() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(vec![
                TxEvent::Validated,
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
                TxEvent::Invalid("Finality timeout".to_string()),
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::Timeout {
                stage: SubmissionState::InBlock,
                ..
            }
        ));
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_and_disconnected_are_retried() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(vec![TxEvent::Validated, TxEvent::Dropped("pool full".to_string())]),
            Script::Refuse(BackendError::Disconnected("connection reset".to_string())),
            Script::Events(vec![TxEvent::Validated]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let policy = RetryPolicy {
            max_attempts: 4,
            ..policy()
        };
        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy)
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_before_inclusion_is_retried() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Stall(vec![TxEvent::Validated, TxEvent::Broadcast]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_inclusion_is_fatal() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Stall(vec![
                TxEvent::Validated,
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SubmissionError::Timeout {
                stage: SubmissionState::InBlock,
                after: Duration::from_secs(30),
            }
        );
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retracted_block_can_time_out_transiently() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Stall(vec![
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
                TxEvent::Retracted,
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_lost_after_inclusion_is_fatal() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(vec![
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
                TxEvent::Error("subscription dropped".to_string()),
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::Dropped { .. }));
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_events_after_finality_are_fatal() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            // finality without a best block, then the event read fails
            Script::Fail(
                vec![
                    TxEvent::Validated,
                    TxEvent::InFinalizedBlock {
                        block_hash: hash(1),
                        extrinsic_hash: hash(2),
                    },
                ],
                BackendError::Disconnected("connection reset".to_string()),
            ),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::Dropped { .. }));
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finality_after_retraction_is_never_resubmitted() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Stall(vec![
                TxEvent::InBlock {
                    block_hash: hash(1),
                },
                TxEvent::Retracted,
                TxEvent::InFinalizedBlock {
                    block_hash: hash(3),
                    extrinsic_hash: hash(2),
                },
            ]),
            Script::Events(finalized(DispatchOutcome::Success, None)),
        ]));

        let err = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SubmissionError::Timeout {
                stage: SubmissionState::Finalized,
                after: Duration::from_secs(30),
            }
        );
        assert_eq!(submitter.backend().submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_carried_in_receipt() {
        let failure = module("Balances", "InsufficientBalance");
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![Script::Events(
            finalized(DispatchOutcome::Failed(failure.clone()), None),
        )]));

        let receipt = submitter
            .submit_and_wait(&some_call(), &(), &policy())
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 1);
        assert_eq!(
            receipt.into_result().unwrap_err(),
            SubmissionError::ModuleError(failure)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_not_a_proxy() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![Script::Events(
            finalized(DispatchOutcome::Failed(module("Proxy", "NotProxy")), None),
        )]));
        let proxied = AccountId32::from([7u8; 32]);

        let err = submitter
            .submit_via_proxy(&some_call(), &proxied, None, &(), &policy())
            .await
            .unwrap_err();

        assert_eq!(err, SubmissionError::ProxyNotAuthorized);
        let submitted = submitter.backend().submitted.lock();
        assert_eq!(submitted[0].pallet(), "Proxy");
        assert_eq!(submitted[0].name(), "proxy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_call_filtered() {
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![Script::Events(
            finalized(
                DispatchOutcome::Success,
                Some(DispatchOutcome::Failed(module("System", "CallFiltered"))),
            ),
        )]));

        let err = submitter
            .submit_via_proxy(
                &some_call(),
                &AccountId32::from([7u8; 32]),
                Some(ProxyType::Staking),
                &(),
                &policy(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, SubmissionError::ProxyNotAuthorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_inner_failure() {
        let failure = module("Balances", "InsufficientBalance");
        let submitter = TransactionSubmitter::new(FakeBackend::with_script(vec![
            Script::Events(finalized(
                DispatchOutcome::Success,
                Some(DispatchOutcome::Failed(failure.clone())),
            )),
            Script::Events(finalized(
                DispatchOutcome::Success,
                Some(DispatchOutcome::Success),
            )),
        ]));
        let proxied = AccountId32::from([7u8; 32]);

        let err = submitter
            .submit_via_proxy(&some_call(), &proxied, None, &(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err, SubmissionError::ModuleError(failure));

        let receipt = submitter
            .submit_via_proxy(&some_call(), &proxied, None, &(), &policy())
            .await
            .unwrap();
        assert_eq!(receipt.proxy_outcome, Some(DispatchOutcome::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_block_height() {
        let backend = FakeBackend::default();
        *backend.heights.lock() = vec![
            Ok(5),
            Err(BackendError::Disconnected("blip".to_string())),
            Ok(7),
            Ok(8),
        ]
        .into();
        let submitter = TransactionSubmitter::new(backend);

        submitter
            .wait_for_block_height(8, Duration::from_secs(1), Duration::from_secs(10))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_block_height_times_out() {
        let backend = FakeBackend::default();
        *backend.heights.lock() = vec![Ok(3)].into();
        let submitter = TransactionSubmitter::new(backend);

        let err = submitter
            .wait_for_block_height(100, Duration::from_secs(1), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.target, 100);
        assert_eq!(err.last_seen, Some(3));
        assert!(err.waited >= Duration::from_secs(5));
    }
}
