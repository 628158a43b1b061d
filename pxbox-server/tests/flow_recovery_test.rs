//! Durable flows: suspend on input, survive restarts, cascade on cancel

mod common;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use common::{name_schema, TestBroker};
use pxbox_server::events::entity_channel;
use pxbox_server::service::recovery::recover_flows;
use pxbox_server::service::{CreateRequestInput, FlowRunner, RunnerContext, StepResult};
use pxbox_server::AppState;
use shared::model::{cursor, EntityRef, Flow, FlowStatus, RequestStatus};

/// Test runner: asks the owner entity for an address, completes once the
/// answer arrives, fails on cancellation.
struct AddressRunner;

#[async_trait]
impl FlowRunner for AddressRunner {
    async fn run(&self, flow: &Flow, ctx: &RunnerContext) -> StepResult {
        let mut next = flow.cursor.clone();

        if let Some(event) = cursor::last_event(&next) {
            return match event.kind.as_str() {
                "request.answered" => {
                    cursor::set_step(&mut next, "done");
                    StepResult::completed(next)
                }
                "request.cancelled" | "request.expired" => {
                    StepResult::failed(next, format!("input lost: {}", event.kind))
                }
                _ => StepResult::running(next),
            };
        }

        match cursor::step(&next).unwrap_or("await-address") {
            "await-address" => {
                let input = CreateRequestInput {
                    entity: EntityRef {
                        id: Some(flow.owner_entity.clone()),
                        handle: None,
                    },
                    schema: name_schema(),
                    created_by: "flow-engine".into(),
                    ..Default::default()
                };
                match ctx.await_input(flow, &mut next, input).await {
                    Ok((_request, suspend)) => {
                        cursor::set_step(&mut next, "awaiting");
                        StepResult::suspended(next, suspend)
                    }
                    Err(e) => StepResult::failed(next, e.to_string()),
                }
            }
            "done" => StepResult::completed(next),
            _ => StepResult::running(next),
        }
    }
}

fn register_address_runner(state: &AppState) {
    state
        .flow_svc
        .register_runner("address", Arc::new(AddressRunner));
}

/// Variant that opens two inquiries in one step and waits on both.
struct TwoInputRunner;

#[async_trait]
impl FlowRunner for TwoInputRunner {
    async fn run(&self, flow: &Flow, ctx: &RunnerContext) -> StepResult {
        let mut next = flow.cursor.clone();

        if let Some(event) = cursor::last_event(&next) {
            return match event.kind.as_str() {
                "request.answered" => {
                    cursor::set_step(&mut next, "done");
                    StepResult::completed(next)
                }
                "request.cancelled" | "request.expired" => {
                    StepResult::failed(next, format!("input lost: {}", event.kind))
                }
                _ => StepResult::running(next),
            };
        }

        match cursor::step(&next).unwrap_or("collect") {
            "collect" => {
                let make_input = || CreateRequestInput {
                    entity: EntityRef {
                        id: Some(flow.owner_entity.clone()),
                        handle: None,
                    },
                    schema: name_schema(),
                    created_by: "flow-engine".into(),
                    ..Default::default()
                };
                if let Err(e) = ctx.await_input(flow, &mut next, make_input()).await {
                    return StepResult::failed(next, e.to_string());
                }
                match ctx.await_input(flow, &mut next, make_input()).await {
                    Ok((_request, suspend)) => {
                        cursor::set_step(&mut next, "awaiting");
                        StepResult::suspended(next, suspend)
                    }
                    Err(e) => StepResult::failed(next, e.to_string()),
                }
            }
            "done" => StepResult::completed(next),
            _ => StepResult::running(next),
        }
    }
}

fn register_two_input_runner(state: &AppState) {
    state
        .flow_svc
        .register_runner("two-input", Arc::new(TwoInputRunner));
}

async fn start_address_flow(broker: &TestBroker, owner: &str) -> (Flow, String) {
    register_address_runner(&broker.state);

    let mut initial = Map::new();
    initial.insert("step".into(), Value::String("await-address".into()));
    let flow = broker
        .state
        .flow_svc
        .create("address", owner, initial)
        .await
        .unwrap();

    // first tick runs await-input and suspends
    broker.state.flow_svc.tick(&flow.id).await.unwrap();
    let flow = broker.state.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(flow.status, FlowStatus::WaitingInput);

    let pending = cursor::pending(&flow.cursor);
    assert_eq!(pending.len(), 1);
    let request_id = pending[0].request_id.clone();
    (flow, request_id)
}

#[tokio::test]
async fn s5_suspend_resume_across_restart() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let (flow, request_id) = start_address_flow(&broker, &alice.id).await;

    // the inquiry is bound to the flow
    let request = broker.state.request_svc.get(&request_id).await.unwrap();
    assert_eq!(request.flow_id.as_deref(), Some(flow.id.as_str()));
    assert_eq!(request.status, RequestStatus::Pending);

    // ── simulated crash: fresh broker over the same database ──
    let state2 = broker.restart().await;
    register_address_runner(&state2);

    // recovery sees the request still PENDING → flow stays waiting
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();
    let after = state2.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(after.status, FlowStatus::WaitingInput);

    // answer the inquiry; the postResponse path resumes the flow
    state2
        .request_svc
        .post_response(
            &request_id,
            None,
            json!({"name": "12 Harbor Lane"})
                .as_object()
                .cloned()
                .unwrap(),
            &[],
        )
        .await
        .unwrap();

    let done = state2.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(done.status, FlowStatus::Completed);
    assert!(state2
        .bus
        .log()
        .replay(&entity_channel(&alice.id), 0, 1000)
        .await
        .unwrap()
        .iter()
        .any(|e| e.payload["type"] == "flow.completed"));

    // recovery after completion is a no-op (idempotent)
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();
    assert_eq!(
        state2.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Completed
    );
}

#[tokio::test]
async fn recovery_resumes_when_answer_arrived_before_restart() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let (flow, request_id) = start_address_flow(&broker, &alice.id).await;

    // answer while "down": write through the db layer only, so no flow
    // notification happens (the crash window)
    pxbox_server::db::responses::answer(
        &broker.state.pool,
        "01TESTRESPONSE0000000000000",
        &request_id,
        &alice.id,
        json!({"name": "12 Harbor Lane"}).as_object().unwrap(),
        &[],
    )
    .await
    .unwrap()
    .expect("request should accept the answer");

    let state2 = broker.restart().await;
    register_address_runner(&state2);
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();

    // recovery observed ANSWERED → resumed → runner completed
    assert_eq!(
        state2.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Completed
    );

    // running recovery again changes nothing
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();
    assert_eq!(
        state2.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Completed
    );
}

#[tokio::test]
async fn recovery_routes_cancellation_to_timeout_branch() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let (flow, request_id) = start_address_flow(&broker, &alice.id).await;

    // cancelled while "down"
    pxbox_server::db::requests::transition(
        &broker.state.pool,
        &request_id,
        RequestStatus::Cancelled,
        &[RequestStatus::Pending],
    )
    .await
    .unwrap();

    let state2 = broker.restart().await;
    register_address_runner(&state2);
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();

    assert_eq!(
        state2.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Failed
    );
}

#[tokio::test]
async fn recovery_prefers_an_answered_input_over_an_earlier_cancelled_one() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    register_two_input_runner(&broker.state);
    let mut initial = Map::new();
    initial.insert("step".into(), Value::String("collect".into()));
    let flow = broker
        .state
        .flow_svc
        .create("two-input", &alice.id, initial)
        .await
        .unwrap();

    broker.state.flow_svc.tick(&flow.id).await.unwrap();
    let suspended = broker.state.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(suspended.status, FlowStatus::WaitingInput);
    let pending = cursor::pending(&suspended.cursor);
    assert_eq!(pending.len(), 2);
    let first = pending[0].request_id.clone();
    let second = pending[1].request_id.clone();

    // While "down": the earlier entry is cancelled, the later one answered
    pxbox_server::db::requests::transition(
        &broker.state.pool,
        &first,
        RequestStatus::Cancelled,
        &[RequestStatus::Pending],
    )
    .await
    .unwrap();
    pxbox_server::db::responses::answer(
        &broker.state.pool,
        "01TESTRESPONSE0000000000001",
        &second,
        &alice.id,
        json!({"name": "12 Harbor Lane"}).as_object().unwrap(),
        &[],
    )
    .await
    .unwrap()
    .expect("request should accept the answer");

    let state2 = broker.restart().await;
    register_two_input_runner(&state2);
    recover_flows(&state2.flow_svc, &state2.request_svc).await.unwrap();

    // The answered entry wins over the earlier cancelled one: the flow
    // completes instead of taking the timeout branch
    assert_eq!(
        state2.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Completed
    );
}

#[tokio::test]
async fn live_cancel_notifies_the_owning_flow() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let (flow, request_id) = start_address_flow(&broker, &alice.id).await;

    broker.state.request_svc.cancel(&request_id).await.unwrap();

    // the cancel edge resumed the flow with request.cancelled
    let after = broker.state.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(after.status, FlowStatus::Failed);
}

#[tokio::test]
async fn flow_cancel_cascades_to_owned_requests() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let flow = broker
        .state
        .flow_svc
        .create("plain", &alice.id, Map::new())
        .await
        .unwrap();

    // three requests owned by the flow: open, claimed, answered
    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut input = CreateRequestInput {
            entity: EntityRef {
                id: Some(alice.id.clone()),
                handle: None,
            },
            schema: name_schema(),
            created_by: "flow-engine".into(),
            ..Default::default()
        };
        input.flow_id = Some(flow.id.clone());
        ids.push(broker.state.request_svc.create(input).await.unwrap().id);
    }
    broker.state.request_svc.claim(&ids[1]).await.unwrap();
    broker
        .state
        .request_svc
        .post_response(&ids[2], None, json!({"name": "x"}).as_object().cloned().unwrap(), &[])
        .await
        .unwrap();

    // one of the open ones is soft-deleted; the cascade still cancels it
    broker.state.request_svc.soft_delete(&ids[0]).await.unwrap();

    broker.state.flow_svc.cancel(&flow.id).await.unwrap();

    assert_eq!(
        broker.state.flow_svc.get(&flow.id).await.unwrap().status,
        FlowStatus::Cancelled
    );
    assert_eq!(
        broker.state.request_svc.get(&ids[0]).await.unwrap().status,
        RequestStatus::Cancelled
    );
    assert_eq!(
        broker.state.request_svc.get(&ids[1]).await.unwrap().status,
        RequestStatus::Cancelled
    );
    // terminal rows are untouched
    assert_eq!(
        broker.state.request_svc.get(&ids[2]).await.unwrap().status,
        RequestStatus::Answered
    );

    // cancelling a cancelled flow is rejected
    let err = broker.state.flow_svc.cancel(&flow.id).await.unwrap_err();
    assert_eq!(err.code, shared::error::ErrorCode::FlowTerminal);
}

#[tokio::test]
async fn basic_runner_completes_trivial_flow() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    let mut initial = Map::new();
    initial.insert("step".into(), Value::String("init".into()));
    let flow = broker
        .state
        .flow_svc
        .create("anything-unregistered", &alice.id, initial)
        .await
        .unwrap();
    assert_eq!(flow.status, FlowStatus::Running);

    broker.state.flow_svc.tick(&flow.id).await.unwrap();

    let done = broker.state.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(done.status, FlowStatus::Completed);
    assert_eq!(cursor::step(&done.cursor), Some("complete"));
}

#[tokio::test]
async fn resume_is_one_runner_invocation() {
    let broker = TestBroker::new().await;
    let alice = broker.make_entity("alice@example.com").await;

    register_address_runner(&broker.state);
    let mut initial = Map::new();
    initial.insert("step".into(), Value::String("await-address".into()));
    let flow = broker
        .state
        .flow_svc
        .create("address", &alice.id, initial)
        .await
        .unwrap();

    // an unrelated event resumes the flow once; the runner sees it,
    // continues, and the flow is RUNNING again — not completed, not
    // re-suspended
    broker
        .state
        .flow_svc
        .resume(&flow.id, "external.nudge", Map::new())
        .await
        .unwrap();

    let after = broker.state.flow_svc.get(&flow.id).await.unwrap();
    assert_eq!(after.status, FlowStatus::Running);
    assert!(cursor::is_event(&after.cursor, "external.nudge"));
}
