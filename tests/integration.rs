//! End-to-end scenarios (spec S1-S6) driven through the public `GraphClient`
//! surface rather than a bare backend+tx pair, covering one full
//! connect/bootstrap/commit cycle per scenario.

use assoc_memory_graph::domain::{
    MemoryPatch, NewMemory, NewPlan, NewTask, RelationshipInput, TaskPatch, TraversalDirection,
};
use assoc_memory_graph::repo::{memory_repo, plan_repo, task_repo};
use assoc_memory_graph::storage::MemoryBackend;
use assoc_memory_graph::tx::TxMode;
use assoc_memory_graph::{Error, GraphClient};

async fn client() -> GraphClient<MemoryBackend> {
    let client = GraphClient::new(MemoryBackend::new());
    client.connect().await.unwrap();
    client.bootstrap_schema().await.unwrap();
    client
}

#[tokio::test]
async fn s1_append_ordering() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let plan = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P".into(), ..Default::default() }).await.unwrap();
    let t1 = task_repo::add(client.backend(), &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let t2 = task_repo::add(client.backend(), &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let t3 = task_repo::add(client.backend(), &mut tx, NewTask { content: "c".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();

    client.commit(tx).await.unwrap();

    let tx = client.begin_tx(TxMode::ReadOnly).await.unwrap();
    let (_, tasks) = plan_repo::get_with_tasks(client.backend(), &tx, &plan.id).await.unwrap().unwrap();
    client.rollback(tx).await.unwrap();

    let ids: Vec<_> = tasks.iter().map(|e| e.task.id.clone()).collect();
    assert_eq!(ids, vec![t1.id, t2.id, t3.id]);

    for w in tasks.windows(2) {
        assert!(w[1].position - w[0].position >= 1000.0 - 1e-3);
    }
}

#[tokio::test]
async fn s2_insert_between() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let plan = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P".into(), ..Default::default() }).await.unwrap();
    let t1 = task_repo::add(client.backend(), &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let t2 = task_repo::add(client.backend(), &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let _t3 = task_repo::add(client.backend(), &mut tx, NewTask { content: "c".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();

    let t4 = task_repo::add(client.backend(), &mut tx, NewTask {
        content: "d".into(),
        plan_ids: vec![plan.id.clone()],
        after_task_id: Some(t1.id.clone()),
        before_task_id: Some(t2.id.clone()),
        ..Default::default()
    }).await.unwrap();

    client.commit(tx).await.unwrap();

    let tx = client.begin_tx(TxMode::ReadOnly).await.unwrap();
    let (_, tasks) = plan_repo::get_with_tasks(client.backend(), &tx, &plan.id).await.unwrap().unwrap();
    client.rollback(tx).await.unwrap();

    let ids: Vec<_> = tasks.iter().map(|e| e.task.id.clone()).collect();
    assert_eq!(ids, vec![t1.id.clone(), t4.id.clone(), t2.id.clone(), _t3.id.clone()]);

    let pos = |id: &str| tasks.iter().find(|e| e.task.id == id).unwrap().position;
    assert!(pos(&t1.id) < pos(&t4.id));
    assert!(pos(&t4.id) < pos(&t2.id));
}

#[tokio::test]
async fn s3_cascade_delete() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let x = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "X".into(), ..Default::default() }).await.unwrap();
    let y = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "Y".into(), ..Default::default() }).await.unwrap();

    let a = task_repo::add(client.backend(), &mut tx, NewTask { content: "only-X".into(), plan_ids: vec![x.id.clone()], ..Default::default() }).await.unwrap();
    let b = task_repo::add(client.backend(), &mut tx, NewTask { content: "shared".into(), plan_ids: vec![x.id.clone(), y.id.clone()], ..Default::default() }).await.unwrap();

    let deleted_count = plan_repo::delete(client.backend(), &mut tx, &x.id).await.unwrap();
    assert_eq!(deleted_count, Some(1));

    assert!(task_repo::get_by_id(client.backend(), &tx, &a.id).await.unwrap().is_none());
    let (_, b_plans) = task_repo::get_with_plans(client.backend(), &tx, &b.id).await.unwrap().unwrap();
    assert_eq!(b_plans, vec![y.id.clone()]);

    client.commit(tx).await.unwrap();
}

#[tokio::test]
async fn s4_idempotent_edge() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let m1 = memory_repo::add(client.backend(), &mut tx, NewMemory { content: "m1".into(), ..Default::default() }).await.unwrap();
    let m2 = memory_repo::add(client.backend(), &mut tx, NewMemory { content: "m2".into(), ..Default::default() }).await.unwrap();

    let patch = MemoryPatch {
        relationships: vec![RelationshipInput { to_id: m2.id.clone(), rel_type: "RELATES_TO".into() }],
        ..Default::default()
    };
    memory_repo::update(client.backend(), &mut tx, &m1.id, patch.clone()).await.unwrap();
    memory_repo::update(client.backend(), &mut tx, &m1.id, patch).await.unwrap();

    let related = memory_repo::get_related(client.backend(), &tx, &m1.id, Some("RELATES_TO"), TraversalDirection::Outgoing, 1).await.unwrap();
    client.commit(tx).await.unwrap();

    assert_eq!(related.len(), 1);
    assert_eq!(related[0].id, m2.id);
}

#[tokio::test]
async fn s5_reorder() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let plan = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P".into(), ..Default::default() }).await.unwrap();
    let t1 = task_repo::add(client.backend(), &mut tx, NewTask { content: "a".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let t2 = task_repo::add(client.backend(), &mut tx, NewTask { content: "b".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();
    let t3 = task_repo::add(client.backend(), &mut tx, NewTask { content: "c".into(), plan_ids: vec![plan.id.clone()], ..Default::default() }).await.unwrap();

    let positions = assoc_memory_graph::position::insert_positions(0.0, 0.0, 3);
    let written = task_repo::update_positions(client.backend(), &mut tx, &plan.id, &[
        (t3.id.clone(), positions[0]),
        (t1.id.clone(), positions[1]),
        (t2.id.clone(), positions[2]),
    ]).await.unwrap();
    assert_eq!(written.len(), 3);

    client.commit(tx).await.unwrap();

    let tx = client.begin_tx(TxMode::ReadOnly).await.unwrap();
    let (_, tasks) = plan_repo::get_with_tasks(client.backend(), &tx, &plan.id).await.unwrap().unwrap();
    client.rollback(tx).await.unwrap();

    let ids: Vec<_> = tasks.iter().map(|e| e.task.id.clone()).collect();
    assert_eq!(ids, vec![t3.id, t1.id, t2.id]);

    for w in tasks.windows(2) {
        assert!(w[1].position > w[0].position);
    }
}

#[tokio::test]
async fn s6_plan_membership_violation() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let err = task_repo::add(client.backend(), &mut tx, NewTask { content: "x".into(), ..Default::default() }).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = task_repo::add(client.backend(), &mut tx, NewTask { content: "x".into(), plan_ids: vec!["nope".into()], ..Default::default() }).await.unwrap_err();
    assert!(matches!(err, Error::InvalidReference(_)));

    let listed = task_repo::list(client.backend(), &tx, None, None, None, None).await.unwrap();
    assert!(listed.is_empty());

    client.commit(tx).await.unwrap();
}

/// Property 6: traversal completeness across a three-hop chain, deduped by
/// id with earliest-depth winning when a node is reachable by more than one
/// path length.
#[tokio::test]
async fn traversal_completeness_across_depth() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let a = memory_repo::add(client.backend(), &mut tx, NewMemory { content: "a".into(), ..Default::default() }).await.unwrap();
    let b = memory_repo::add(client.backend(), &mut tx, NewMemory { content: "b".into(), ..Default::default() }).await.unwrap();
    let c = memory_repo::add(client.backend(), &mut tx, NewMemory { content: "c".into(), ..Default::default() }).await.unwrap();

    memory_repo::update(client.backend(), &mut tx, &a.id, MemoryPatch {
        relationships: vec![RelationshipInput { to_id: b.id.clone(), rel_type: "RELATES_TO".into() }],
        ..Default::default()
    }).await.unwrap();
    memory_repo::update(client.backend(), &mut tx, &b.id, MemoryPatch {
        relationships: vec![RelationshipInput { to_id: c.id.clone(), rel_type: "RELATES_TO".into() }],
        ..Default::default()
    }).await.unwrap();
    // Also a direct a->c edge, so c is reachable at both depth 1 and depth 2;
    // earliest depth (1) must win.
    memory_repo::update(client.backend(), &mut tx, &a.id, MemoryPatch {
        relationships: vec![RelationshipInput { to_id: c.id.clone(), rel_type: "RELATES_TO".into() }],
        ..Default::default()
    }).await.unwrap();

    let related = memory_repo::get_related(client.backend(), &tx, &a.id, Some("RELATES_TO"), TraversalDirection::Outgoing, 2).await.unwrap();
    client.commit(tx).await.unwrap();

    assert_eq!(related.len(), 2);
    let c_entry = related.iter().find(|e| e.id == c.id).unwrap();
    assert_eq!(c_entry.depth, 1);
    let b_entry = related.iter().find(|e| e.id == b.id).unwrap();
    assert_eq!(b_entry.depth, 1);
}

/// Property 1: round-trip survives a commit/rollback-of-a-later-tx boundary
/// (the created record is still readable from a fresh transaction).
#[tokio::test]
async fn round_trip_survives_commit() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();
    let created = memory_repo::add(client.backend(), &mut tx, NewMemory {
        content: "durable note".into(),
        tags: vec!["rust".into()],
        ..Default::default()
    }).await.unwrap();
    client.commit(tx).await.unwrap();

    let tx = client.begin_tx(TxMode::ReadOnly).await.unwrap();
    let fetched = memory_repo::get_by_id(client.backend(), &tx, &created.id).await.unwrap().unwrap();
    client.rollback(tx).await.unwrap();

    assert_eq!(fetched.content, created.content);
    assert_eq!(fetched.tags, created.tags);
    assert_eq!(fetched.id, created.id);
}

/// A write that errors partway through must not leave a half-created task:
/// the content is valid but the plan id isn't, so `InvalidReference` is
/// returned and no task node survives in the transaction.
#[tokio::test]
async fn failed_task_creation_leaves_no_orphan_node() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let plan = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P".into(), ..Default::default() }).await.unwrap();
    let before = task_repo::list(client.backend(), &tx, Some(&plan.id), None, None, None).await.unwrap();
    assert!(before.is_empty());

    let err = task_repo::add(client.backend(), &mut tx, NewTask {
        content: "x".into(),
        plan_ids: vec![plan.id.clone(), "nope".into()],
        ..Default::default()
    }).await.unwrap_err();
    assert!(matches!(err, Error::InvalidReference(_)));

    let after = task_repo::list(client.backend(), &tx, Some(&plan.id), None, None, None).await.unwrap();
    assert!(after.is_empty());

    client.commit(tx).await.unwrap();
}

/// Plan/task updates round-trip through the public façade, including
/// attaching a task to an additional plan via `add_plan_ids`.
#[tokio::test]
async fn task_can_join_a_second_plan_via_update() {
    let client = client().await;
    let mut tx = client.begin_tx(TxMode::ReadWrite).await.unwrap();

    let p1 = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P1".into(), ..Default::default() }).await.unwrap();
    let p2 = plan_repo::add(client.backend(), &mut tx, NewPlan { name: "P2".into(), ..Default::default() }).await.unwrap();
    let task = task_repo::add(client.backend(), &mut tx, NewTask { content: "shared later".into(), plan_ids: vec![p1.id.clone()], ..Default::default() }).await.unwrap();

    task_repo::update(client.backend(), &mut tx, &task.id, TaskPatch {
        add_plan_ids: vec![p2.id.clone()],
        ..Default::default()
    }).await.unwrap();

    let (_, plans) = task_repo::get_with_plans(client.backend(), &tx, &task.id).await.unwrap().unwrap();
    client.commit(tx).await.unwrap();

    assert_eq!(plans.len(), 2);
    assert!(plans.contains(&p1.id));
    assert!(plans.contains(&p2.id));
}
