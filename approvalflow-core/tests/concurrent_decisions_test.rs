use approvalflow_core::models::{
    AuditAction, Configuration, Decision, DecisionRequest, NewWorkflow, StageDefinition, StageStatus,
};
use approvalflow_core::{
    ApprovalEngine, ApprovalError, AuditRecorder, InMemoryWorkflowStore, JsonFileStore,
    RoleResolver, WorkflowStore,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

fn engine_over(store: Arc<dyn WorkflowStore>) -> ApprovalEngine {
    let resolver =
        RoleResolver::from_configuration(&Configuration::default(), AuditRecorder::in_memory())
            .unwrap();
    ApprovalEngine::new(store, Arc::new(resolver))
}

fn two_stage_lease(entity_id: &str) -> NewWorkflow {
    NewWorkflow {
        module: "Lease".to_string(),
        entity_id: entity_id.to_string(),
        entity_type: "LeaseTermination".to_string(),
        created_by: "clerk".to_string(),
        stages: vec![
            StageDefinition::required("PropertyManager"),
            StageDefinition::required("Admin"),
        ],
        metadata: BTreeMap::new(),
        comments: None,
    }
}

/// Race one approve against one reject on stage 1 and check the outcome
fn race_on_first_stage(engine: &ApprovalEngine, entity_id: &str) {
    let workflow = engine.create_workflow(two_stage_lease(entity_id)).unwrap();
    let workflow_id = workflow.id;
    let stage_id = workflow.stages[0].id;
    let barrier = Barrier::new(2);

    let results: Vec<(Decision, Result<_, ApprovalError>)> = thread::scope(|scope| {
        let handles: Vec<_> = [Decision::Approve, Decision::Reject]
            .into_iter()
            .map(|decision| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let result = engine.decide(DecisionRequest {
                        workflow_id,
                        stage_id,
                        actor_role: "PropertyManager".to_string(),
                        decision,
                        actor_id: format!("{:?}-actor", decision),
                        comments: None,
                    });
                    (decision, result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<Decision> = results
        .iter()
        .filter(|(_, r)| r.is_ok())
        .map(|(d, _)| *d)
        .collect();
    assert_eq!(winners.len(), 1, "exactly one decision commits: {:?}", results);
    let loser = results.iter().find(|(_, r)| r.is_err()).unwrap();
    assert!(loser.1.as_ref().unwrap_err().is_conflict());

    let stored = engine.get_by_id(workflow.id).unwrap();
    assert_eq!(stored.stages[0].status, winners[0].stage_status());
    assert!(matches!(
        stored.stages[0].status,
        StageStatus::Approved | StageStatus::Rejected
    ));

    let decisions = engine
        .audit_trail(workflow.id)
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.action, AuditAction::Approve | AuditAction::Reject))
        .count();
    assert_eq!(decisions, 1);
}

#[test]
fn concurrent_deciders_in_memory() {
    let engine = engine_over(Arc::new(InMemoryWorkflowStore::new()));
    for round in 0..25 {
        race_on_first_stage(&engine, &format!("lease-{}", round));
    }
}

#[test]
fn concurrent_deciders_on_json_file() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("approvalworkflow.json")).unwrap();
    let engine = engine_over(Arc::new(store));
    for round in 0..5 {
        race_on_first_stage(&engine, &format!("lease-{}", round));
    }
}

/// Let `deciders` threads decide stage 1 at once
fn stampede_on_first_stage(engine: &ApprovalEngine, entity_id: &str, deciders: usize) {
    let workflow = engine.create_workflow(two_stage_lease(entity_id)).unwrap();
    let workflow_id = workflow.id;
    let stage_id = workflow.stages[0].id;
    let barrier = Barrier::new(deciders);

    let results: Vec<Result<_, ApprovalError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..deciders)
            .map(|n| {
                let barrier = &barrier;
                scope.spawn(move || {
                    let decision = if n % 2 == 0 {
                        Decision::Approve
                    } else {
                        Decision::Reject
                    };
                    barrier.wait();
                    engine.decide(DecisionRequest {
                        workflow_id,
                        stage_id,
                        actor_role: if n % 3 == 0 { "Admin" } else { "PropertyManager" }.to_string(),
                        decision,
                        actor_id: format!("actor-{}", n),
                        comments: None,
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1, "exactly one decision commits: {:?}", results);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, ApprovalError::ConcurrentModification(_)),
            "losers see a conflict, got {:?}",
            err
        );
    }

    let decisions = engine
        .audit_trail(workflow_id)
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.action, AuditAction::Approve | AuditAction::Reject))
        .count();
    assert_eq!(decisions, 1);
}

#[test]
fn many_concurrent_deciders_in_memory() {
    let engine = engine_over(Arc::new(InMemoryWorkflowStore::new()));
    for round in 0..10 {
        stampede_on_first_stage(&engine, &format!("lease-many-{}", round), 8);
    }
}

#[test]
fn many_concurrent_deciders_on_json_file() {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("approvalworkflow.json")).unwrap();
    let engine = engine_over(Arc::new(store));
    for round in 0..3 {
        stampede_on_first_stage(&engine, &format!("lease-many-{}", round), 8);
    }
}

#[test]
fn concurrent_cancel_and_decide() {
    let engine = engine_over(Arc::new(InMemoryWorkflowStore::new()));
    let mut request = two_stage_lease("lease-c");
    request.stages.truncate(1);
    let workflow = engine.create_workflow(request).unwrap();
    let stage_id = workflow.stages[0].id;
    let barrier = Barrier::new(2);

    let (decided, cancelled) = thread::scope(|scope| {
        let decide = scope.spawn(|| {
            barrier.wait();
            engine.decide(DecisionRequest {
                workflow_id: workflow.id,
                stage_id,
                actor_role: "Admin".to_string(),
                decision: Decision::Approve,
                actor_id: "admin-1".to_string(),
                comments: None,
            })
        });
        let cancel = scope.spawn(|| {
            barrier.wait();
            engine.cancel(workflow.id, "clerk", Some("withdrawn".to_string()))
        });
        (decide.join().unwrap(), cancel.join().unwrap())
    });

    let stored = engine.get_by_id(workflow.id).unwrap();
    match (decided, cancelled) {
        (Ok(_), Err(e)) => {
            assert!(e.is_conflict() || matches!(e, ApprovalError::InvalidState { .. }));
            assert_eq!(stored.stages[0].status, StageStatus::Approved);
        }
        (Err(e), Ok(_)) => {
            assert!(e.is_conflict() || matches!(e, ApprovalError::InvalidState { .. }));
            assert_eq!(stored.stages[0].status, StageStatus::Pending);
        }
        other => panic!("exactly one of decide/cancel must win: {:?}", other),
    }
}
