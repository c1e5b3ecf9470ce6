//! Dispatcher Integration Tests
//!
//! Registration, fan-out and failure reporting through the public API.

mod common;

use async_trait::async_trait;
use common::{register_recorder, register_slow_recorder, CallCounter, EventLog};
use flux_dispatch::{Action, DispatchError, DispatchHandler, DispatchToken, Dispatcher, DispatcherConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Payload {
    some: String,
}

fn payload(value: &str) -> Payload {
    Payload {
        some: value.to_string(),
    }
}

#[tokio::test]
async fn register_returns_distinct_tokens() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let log = EventLog::new();

    let tokens: Vec<DispatchToken> = (0..10)
        .map(|i| register_recorder(&dispatcher, &log, &format!("h{i}")))
        .collect();

    let unique: HashSet<_> = tokens.iter().copied().collect();
    assert_eq!(unique.len(), tokens.len());
    assert_eq!(dispatcher.tokens(), tokens);
    assert_eq!(dispatcher.len(), 10);
}

#[tokio::test]
async fn tokens_use_the_id_wire_form() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let token = dispatcher.register(|_| async { Ok(()) });

    assert_eq!(token.to_string(), "ID_1");
    assert_eq!("ID_1".parse::<DispatchToken>().unwrap(), token);
    assert!(matches!(
        "abc".parse::<DispatchToken>(),
        Err(DispatchError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn dispatch_invokes_each_handler_once_with_the_payload() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for _ in 0..2 {
        let seen = seen.clone();
        dispatcher.register(move |action| {
            let seen = seen.clone();
            async move {
                seen.lock().push(action.payload().clone());
                Ok(())
            }
        });
    }

    dispatcher.dispatch(payload("payload")).await.unwrap();

    assert_eq!(*seen.lock(), vec![payload("payload"), payload("payload")]);
}

#[tokio::test]
async fn async_handlers_complete_before_dispatch_resolves() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let log = EventLog::new();

    register_slow_recorder(&dispatcher, &log, "slow", Duration::from_millis(30));
    register_recorder(&dispatcher, &log, "fast");

    dispatcher.dispatch(payload("x")).await.unwrap();

    assert_eq!(log.count("slow"), 1);
    assert_eq!(log.count("fast"), 1);
    assert_eq!(log.entries().len(), 2);
}

#[tokio::test]
async fn unregistered_handler_is_not_invoked() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let log = EventLog::new();

    let kept = register_recorder(&dispatcher, &log, "kept");
    let removed = register_recorder(&dispatcher, &log, "removed");

    dispatcher.unregister(removed).unwrap();
    dispatcher.dispatch(payload("x")).await.unwrap();

    assert!(dispatcher.is_registered(kept));
    assert!(!dispatcher.is_registered(removed));
    assert_eq!(log.entries(), vec!["kept".to_string()]);
}

#[tokio::test]
async fn unregister_unknown_token_fails() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let token = dispatcher.register(|_| async { Ok(()) });

    dispatcher.unregister(token).unwrap();
    let err = dispatcher.unregister(token).unwrap_err();

    assert!(matches!(err, DispatchError::UnknownHandler(t) if t == token));
    assert!(err.is_unknown_handler());
}

#[tokio::test]
async fn tokens_are_never_reused_after_unregister() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let first = dispatcher.register(|_| async { Ok(()) });
    dispatcher.unregister(first).unwrap();

    let second = dispatcher.register(|_| async { Ok(()) });
    assert_ne!(first, second);
}

#[tokio::test]
async fn handler_error_fails_the_dispatch() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let failing = dispatcher.register(|_| async { anyhow::bail!("Something went wrong") });

    let err = dispatcher.dispatch(payload("x")).await.unwrap_err();

    assert_eq!(err.token(), Some(failing));
    let source = err.handler_error().expect("handler error is attached");
    assert_eq!(source.to_string(), "Something went wrong");
}

#[tokio::test]
async fn handler_panic_fails_the_dispatch() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let panicking = dispatcher.register(|_| async { panic!("handler exploded") });

    let err = dispatcher.dispatch(payload("x")).await.unwrap_err();

    match err {
        DispatchError::HandlerPanicked { token, message } => {
            assert_eq!(token, panicking);
            assert_eq!(message, "handler exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn dispatcher_is_usable_after_a_failed_dispatch() {
    let dispatcher: Dispatcher<u32> = Dispatcher::new();
    let calls = CallCounter::new();

    let counter = calls.clone();
    dispatcher.register(move |action| {
        let counter = counter.clone();
        async move {
            counter.hit();
            anyhow::ensure!(*action.payload() != 0, "zero is not allowed");
            Ok(())
        }
    });

    assert!(dispatcher.dispatch(0).await.is_err());
    dispatcher.dispatch(1).await.unwrap();
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn siblings_keep_running_after_a_failure() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let log = EventLog::new();

    dispatcher.register(|_| async { anyhow::bail!("fail fast") });
    let quick = register_recorder(&dispatcher, &log, "quick");

    let waiter_log = log.clone();
    dispatcher.register(move |action| {
        let log = waiter_log.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            action.wait_for(&[quick]).await?;
            log.push("late");
            Ok(())
        }
    });

    assert!(dispatcher.dispatch(payload("x")).await.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log.count("quick"), 1);
    assert_eq!(log.count("late"), 1);
}

#[tokio::test]
async fn registration_during_dispatch_applies_to_later_messages() {
    let dispatcher: Dispatcher<u32> = Dispatcher::new();
    let log = EventLog::new();

    let registrar = dispatcher.clone();
    let registrar_log = log.clone();
    dispatcher.register(move |action| {
        let registrar = registrar.clone();
        let log = registrar_log.clone();
        async move {
            if *action.payload() == 1 {
                register_recorder(&registrar, &log, "late");
            }
            Ok(())
        }
    });

    dispatcher.dispatch(1).await.unwrap();
    assert_eq!(log.count("late"), 0);

    dispatcher.dispatch(2).await.unwrap();
    assert_eq!(log.count("late"), 1);
}

#[tokio::test]
async fn unregister_during_dispatch_applies_to_later_messages() {
    let dispatcher: Dispatcher<u32> = Dispatcher::new();
    let log = EventLog::new();

    let target = register_slow_recorder(&dispatcher, &log, "target", Duration::from_millis(10));

    let remover = dispatcher.clone();
    dispatcher.register(move |_action| {
        let remover = remover.clone();
        async move {
            if remover.is_registered(target) {
                remover.unregister(target)?;
            }
            Ok(())
        }
    });

    dispatcher.dispatch(1).await.unwrap();
    assert_eq!(log.count("target"), 1);

    dispatcher.dispatch(2).await.unwrap();
    assert_eq!(log.count("target"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_are_isolated() {
    let dispatcher: Dispatcher<u32> = Dispatcher::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let slow_seen = seen.clone();
    let slow = dispatcher.register(move |action| {
        let seen = slow_seen.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            seen.lock().push(("slow", *action.payload()));
            Ok(())
        }
    });

    let dependent_seen = seen.clone();
    dispatcher.register(move |action| {
        let seen = dependent_seen.clone();
        async move {
            action.wait_for(&[slow]).await?;
            seen.lock().push(("dependent", *action.payload()));
            Ok(())
        }
    });

    let (a, b, c) = tokio::join!(
        dispatcher.dispatch(1),
        dispatcher.dispatch(2),
        dispatcher.dispatch(3)
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 6);
    for message in 1..=3 {
        let slow_at = seen.iter().position(|e| *e == ("slow", message)).unwrap();
        let dependent_at = seen
            .iter()
            .position(|e| *e == ("dependent", message))
            .unwrap();
        assert!(slow_at < dependent_at);
    }
}

struct NamedHandler {
    calls: CallCounter,
}

#[async_trait]
impl DispatchHandler<Payload> for NamedHandler {
    async fn handle(&self, action: Action<Payload>) -> anyhow::Result<()> {
        assert_eq!(action.payload().some, "trait");
        self.calls.hit();
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "named_handler"
    }
}

#[tokio::test]
async fn trait_object_handlers_are_dispatched() {
    let dispatcher: Dispatcher<Payload> = Dispatcher::new();
    let calls = CallCounter::new();

    let token = dispatcher.register_handler(Arc::new(NamedHandler {
        calls: calls.clone(),
    }));

    dispatcher.dispatch(payload("trait")).await.unwrap();

    assert!(dispatcher.is_registered(token));
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn slow_handler_threshold_does_not_affect_outcome() {
    let config = DispatcherConfig {
        slow_handler_threshold_ms: 1,
        ..DispatcherConfig::default()
    };
    let dispatcher: Dispatcher<Payload> = Dispatcher::with_config(config);
    let log = EventLog::new();

    register_slow_recorder(&dispatcher, &log, "slow", Duration::from_millis(15));
    dispatcher.dispatch(payload("x")).await.unwrap();

    assert_eq!(log.count("slow"), 1);
}
