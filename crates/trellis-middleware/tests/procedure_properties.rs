//! Property tests for the procedure execution contract.
//!
//! Chains of arbitrary length are built from a single step stage that either
//! forwards a transformed input or rejects. For every generated chain:
//!
//! - each stage runs at most once, in order
//! - stage i+1 receives exactly what stage i forwarded
//! - nothing runs after the first rejecting stage, resolver included
//! - two chains built from the same plan return identical envelopes

use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use trellis_core::{Envelope, ErrorCode, Params};
use trellis_middleware::{BoxFuture, Middleware, Next, Procedure, Settled};

type Log = Arc<Mutex<Vec<(usize, u64)>>>;

#[derive(Debug, Clone, Copy)]
enum Action {
    Forward(u64),
    Reject(ErrorCode),
}

struct Step {
    index: usize,
    action: Action,
    log: Log,
}

impl Middleware<Params<(), u64>, u64> for Step {
    type Output = Params<(), u64>;

    fn name(&self) -> &'static str {
        "step"
    }

    fn process<'a>(
        &'a self,
        params: Params<(), u64>,
        next: Next<Params<(), u64>, u64>,
    ) -> BoxFuture<'a, Settled<u64>> {
        self.log.lock().unwrap().push((self.index, params.input));
        Box::pin(async move {
            match self.action {
                Action::Forward(add) => {
                    let forwarded = params.input.wrapping_add(add);
                    next.run(params.with_input(forwarded)).await
                }
                Action::Reject(code) => next.reject(code),
            }
        })
    }
}

fn build(plan: &[Action], log: &Log) -> Procedure<Params<(), u64>, u64> {
    let mut builder = Procedure::builder();
    for (index, action) in plan.iter().enumerate() {
        builder = builder.stage(Step {
            index,
            action: *action,
            log: Arc::clone(log),
        });
    }
    let resolver_log = Arc::clone(log);
    builder.resolve(move |params: Params<(), u64>| {
        resolver_log.lock().unwrap().push((usize::MAX, params.input));
        async move { Envelope::success(params.input) }
    })
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0_u64..1_000).prop_map(Action::Forward),
        1 => proptest::sample::select(ErrorCode::ALL.to_vec()).prop_map(Action::Reject),
    ]
}

proptest! {
    #[test]
    fn chain_contract_holds(plan in prop::collection::vec(action(), 0..12), start in 0_u64..1_000) {
        let log = Log::default();
        let procedure = build(&plan, &log);
        let result = tokio_test::block_on(procedure.invoke(Params::from_parts((), start)));
        let visits = log.lock().unwrap().clone();

        let rejecting = plan.iter().position(|a| matches!(a, Action::Reject(_)));
        let ran = rejecting.map_or(plan.len(), |i| i + 1);

        // Stages in order, each once, each seeing the previous stage's output.
        let mut expected = start;
        for (i, (index, seen)) in visits.iter().take(ran).enumerate() {
            prop_assert_eq!(*index, i);
            prop_assert_eq!(*seen, expected);
            if let Action::Forward(add) = plan[i] {
                expected = expected.wrapping_add(add);
            }
        }

        match rejecting {
            Some(i) => {
                let Action::Reject(code) = plan[i] else { unreachable!() };
                prop_assert_eq!(visits.len(), ran);
                prop_assert_eq!(result.code(), Some(code));
            }
            None => {
                prop_assert_eq!(visits.len(), plan.len() + 1);
                prop_assert_eq!(visits.last().copied(), Some((usize::MAX, expected)));
                prop_assert_eq!(result, Envelope::success(expected));
            }
        }
    }

    #[test]
    fn same_plan_same_result(plan in prop::collection::vec(action(), 0..8), start in any::<u64>()) {
        let first = build(&plan, &Log::default());
        let second = build(&plan, &Log::default());

        let left = tokio_test::block_on(first.invoke(Params::from_parts((), start)));
        let right = tokio_test::block_on(second.invoke(Params::from_parts((), start)));
        prop_assert_eq!(left, right);
        prop_assert_eq!(first.stage_count(), plan.len());
    }
}
