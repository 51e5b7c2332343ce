//! Contract Test: Fetch-Token-Then-Invoke Retry
//!
//! Verifies the retry loop against counted test doubles.
//!
//! Constraints verified:
//! - Every attempt fetches exactly one fresh token and invokes the operation once
//! - Retryable failures are absorbed; the success value is returned
//! - Fatal failures are returned after a single attempt, annotated
//! - Token fetch failures are fatal unless their kind is retryable
//! - A token is never handed to more than one invocation

mod common;

use changetoken_core::{ChangeTokenRetryer, Error, ErrorKind, RetryContext};
use common::*;

#[tokio::test]
async fn stale_token_failures_then_success() {
    for n in 0..6usize {
        let source = ScriptedTokenSource::new();
        let op = ScriptedOperation::failing_then(
            (0..n).map(|i| Error::stale_token(format!("stale #{}", i))).collect(),
            99,
        );
        let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

        let value = retryer
            .retry_with_token(&RetryContext::new(), |token| op.call(token))
            .await
            .expect("retries absorb stale tokens");

        assert_eq!(value, 99);
        assert_eq!(source.fetch_count(), n + 1, "fetches for N={}", n);
        assert_eq!(op.call_count(), n + 1, "invocations for N={}", n);
    }
}

#[tokio::test]
async fn concurrent_modification_twice_then_success() {
    let source = ScriptedTokenSource::new();
    let op = ScriptedOperation::new(
        vec![
            Err(Error::concurrent_modification("attempt 1")),
            Err(Error::concurrent_modification("attempt 2")),
            Ok(3),
        ],
        || Ok(0),
    );
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    let value = retryer
        .retry_with_token(&RetryContext::new(), |token| op.call(token))
        .await
        .unwrap();

    assert_eq!(value, 3, "result must come from attempt 3");
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(op.call_count(), 3);
}

#[tokio::test]
async fn permission_denied_is_returned_immediately() {
    let source = ScriptedTokenSource::new();
    let op = ScriptedOperation::always_failing(|| Error::permission_denied("waf:UpdateRegexMatchSet"));
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    let ctx = RetryContext::new().for_operation("UpdateRegexMatchSet", "rms-1234");
    let err = retryer
        .retry_with_token(&ctx, |token| op.call(token))
        .await
        .unwrap_err();

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(op.call_count(), 1);

    match &err {
        Error::Fatal {
            operation,
            target,
            source,
        } => {
            assert_eq!(operation, "UpdateRegexMatchSet");
            assert_eq!(target, "rms-1234");
            assert_eq!(source.kind(), ErrorKind::PermissionDenied);
        }
        other => panic!("expected Fatal, got {:?}", other),
    }
    assert!(err.to_string().contains("waf:UpdateRegexMatchSet"));
}

#[tokio::test]
async fn every_fatal_kind_stops_after_one_attempt() {
    let fatal_errors: Vec<fn() -> Error> = vec![
        || Error::not_found("gone"),
        || Error::invalid_input("bad regex"),
        || Error::limit_exceeded("too many sets"),
        || Error::in_use("referenced by rule"),
        || Error::provider("waf", "internal error"),
        || Error::Other("unexpected".to_string()),
    ];

    for make in fatal_errors {
        let source = ScriptedTokenSource::new();
        let op = ScriptedOperation::always_failing(make);
        let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

        let err = retryer
            .retry_with_token(&RetryContext::new(), |token| op.call(token))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.root_cause().kind(), make().kind());
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(op.call_count(), 1);
    }
}

#[tokio::test]
async fn always_succeeding_operation_runs_once_per_call() {
    let source = ScriptedTokenSource::new();
    let op = ScriptedOperation::new(Vec::new(), || Ok(42));
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    for round in 1..=5 {
        let value = retryer
            .retry_with_token(&RetryContext::new(), |token| op.call(token))
            .await;
        tokio_test::assert_ok!(&value);
        assert_eq!(value.unwrap(), 42);
        assert_eq!(source.fetch_count(), round);
        assert_eq!(op.call_count(), round);
    }
}

#[tokio::test]
async fn fatal_fetch_error_skips_operation() {
    let source = ScriptedTokenSource::failing_with(vec![Error::permission_denied("waf:GetChangeToken")]);
    let op = ScriptedOperation::new(Vec::new(), || Ok(1));
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    let ctx = RetryContext::new().for_operation("DeleteRegexPatternSet", "rps-1");
    let err = retryer
        .retry_with_token(&ctx, |token| op.call(token))
        .await
        .unwrap_err();

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(op.call_count(), 0, "operation must not run without a token");
    match err {
        Error::Fatal {
            operation, target, ..
        } => {
            assert_eq!(operation, "GetChangeToken");
            assert_eq!(target, "rps-1");
        }
        other => panic!("expected Fatal, got {:?}", other),
    }
}

#[tokio::test]
async fn throttled_fetch_is_backed_off_and_retried() {
    let source = ScriptedTokenSource::failing_with(vec![
        Error::throttled("Rate exceeded"),
        Error::throttled("Rate exceeded"),
    ]);
    let op = ScriptedOperation::new(Vec::new(), || Ok(5));
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    let value = retryer
        .retry_with_token(&RetryContext::new(), |token| op.call(token))
        .await
        .unwrap();

    assert_eq!(value, 5);
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(op.call_count(), 1);
}

#[tokio::test]
async fn tokens_are_never_reused() {
    let source = ScriptedTokenSource::new();
    let op = ScriptedOperation::failing_then(
        vec![
            Error::stale_token("1"),
            Error::not_propagated("2"),
            Error::throttled("3"),
            Error::concurrent_modification("4"),
        ],
        0,
    );
    let retryer = ChangeTokenRetryer::new(source.clone()).with_policy(immediate_policy());

    retryer
        .retry_with_token(&RetryContext::new(), |token| op.call(token))
        .await
        .unwrap();

    let seen = op.tokens_seen();
    assert_eq!(seen, source.issued(), "each invocation gets the token fetched for it");

    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len(), "no token may be used twice");
}

#[tokio::test]
async fn not_found_retried_only_when_policy_allows() {
    let strict = ChangeTokenRetryer::new(ScriptedTokenSource::new()).with_policy(immediate_policy());
    let op = ScriptedOperation::failing_then(vec![Error::not_found("just created")], 8);
    let err = strict
        .retry_with_token(&RetryContext::new(), |token| op.call(token))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let lenient = ChangeTokenRetryer::new(ScriptedTokenSource::new())
        .with_policy(immediate_policy().with_retryable(ErrorKind::NotFound));
    let op = ScriptedOperation::failing_then(vec![Error::not_found("just created")], 8);
    let value = lenient
        .retry_with_token(&RetryContext::new(), |token| op.call(token))
        .await
        .unwrap();
    assert_eq!(value, 8);
    assert_eq!(op.call_count(), 2);
}
