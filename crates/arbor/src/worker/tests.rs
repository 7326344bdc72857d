use super::*;

use std::sync::Mutex;
use std::time::Duration;

use arbor_backend_memory::MemoryBackend;
use arbor_flow_core::ErrorKind;
use arbor_scheduler_core::{ExpressionMethod, Schedulable};
use serde_json::json;

use crate::backends::WorkerConfiguration;
use crate::test_support::{memory_context, root_fei, run_until_quiet, tasks_with, test_worker};

type Seen = Arc<Mutex<Vec<Task>>>;

fn collector() -> (Seen, Arc<dyn Subscriber>) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscriber: Arc<dyn Subscriber> =
        Arc::new(move |task: &Task| sink.lock().unwrap().push(task.clone()));
    (seen, subscriber)
}

fn actions(seen: &Seen) -> Vec<TaskAction> {
    seen.lock().unwrap().iter().map(|task| task.action).collect()
}

#[tokio::test]
async fn test_sequence_runs_to_single_terminated() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (seen, subscriber) = collector();
    worker.subscribe(Subscription::All, subscriber);

    let mut workitem = Workitem::default();
    workitem.set_field("order", 42);
    let tree = TreeNode::new("sequence")
        .with_child(TreeNode::new("noop"))
        .with_child(TreeNode::new("echo").with_attribute("message", "second"));
    let wfid = worker.launch(tree, workitem, None).await.unwrap();

    run_until_quiet(&mut worker, &backend, 20).await;
    worker.step().await.unwrap();

    let terminated: Vec<Task> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|task| task.action == TaskAction::Terminated)
        .cloned()
        .collect();
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].wfid.as_deref(), Some(wfid.as_str()));
    let workitem = terminated[0].workitem.clone().unwrap();
    assert_eq!(workitem.field("order"), Some(&json!(42)));
    assert_eq!(
        workitem.fei,
        Some(FlowExpressionId::root(wfid, DEFAULT_DEFINITION_ID))
    );

    assert!(backend.expressions().is_empty());
    assert!(backend.tasks().is_empty());
    assert_eq!(actions(&seen)[0], TaskAction::Launch);
}

#[tokio::test]
async fn test_task_is_claimed_by_one_worker() {
    let (backend, ctx) = memory_context();
    let worker_a = test_worker(ctx.clone());
    let worker_b = test_worker(ctx);
    worker_a
        .launch(TreeNode::new("wait"), Workitem::default(), None)
        .await
        .unwrap();
    let task = backend.tasks().remove(0);

    let (a, b) = tokio::join!(worker_a.process(&task), worker_b.process(&task));
    assert!(a ^ b);
    assert_eq!(backend.expressions().len(), 1);
    assert!(backend.tasks().is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_becomes_error_task() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (seen, subscriber) = collector();
    worker.subscribe(Subscription::All, subscriber);

    worker
        .launch(
            TreeNode::new("error").with_attribute("message", "boom"),
            Workitem::default(),
            None,
        )
        .await
        .unwrap();
    worker
        .launch(TreeNode::new("noop"), Workitem::default(), None)
        .await
        .unwrap();

    worker.step().await.unwrap();

    let errors = tasks_with(&backend, TaskAction::Error);
    assert_eq!(errors.len(), 1);
    let error = errors[0].error.clone().unwrap();
    assert_eq!(error.kind, ErrorKind::Apply);
    assert_eq!(error.action, Some(TaskAction::Launch));
    assert_eq!(error.message, "boom");
    assert_eq!(errors[0].tree.as_ref().map(|tree| tree.name.as_str()), Some("error"));
    assert!(errors[0].wfid.is_some());

    // The failed launch is not reported; the next one still ran.
    assert_eq!(actions(&seen), vec![TaskAction::Launch]);
    assert_eq!(tasks_with(&backend, TaskAction::Terminated).len(), 1);
}

#[tokio::test]
async fn test_huge_timeout_becomes_error_task() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);

    worker
        .launch(
            TreeNode::new("wait").with_attribute("timeout", "1e30"),
            Workitem::default(),
            None,
        )
        .await
        .unwrap();
    worker.step().await.unwrap();

    let errors = tasks_with(&backend, TaskAction::Error);
    assert_eq!(errors.len(), 1);
    let error = errors[0].error.clone().unwrap();
    assert_eq!(error.kind, ErrorKind::Apply);
    assert_eq!(error.action, Some(TaskAction::Launch));
    assert!(error.message.contains("out of range"));
    assert!(worker.context().scheduler.jobs().await.unwrap().is_empty());

    worker
        .launch(TreeNode::new("noop"), Workitem::default(), None)
        .await
        .unwrap();
    run_until_quiet(&mut worker, &backend, 5).await;
    assert_eq!(tasks_with(&backend, TaskAction::Terminated).len(), 1);
}

#[tokio::test]
async fn test_malformed_task_is_reported() {
    let (backend, ctx) = memory_context();
    let worker = test_worker(ctx);
    let task = Task::new(TaskAction::Reply);
    worker.context().storage.put_task(task.clone()).await.unwrap();

    assert!(worker.process(&task).await);

    let errors = tasks_with(&backend, TaskAction::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].error.as_ref().map(|error| error.message.as_str()),
        Some("malformed reply task: missing fei")
    );
}

#[tokio::test]
async fn test_reply_and_cancel_for_missing_expression_are_ignored() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (seen, subscriber) = collector();
    worker.subscribe(Subscription::All, subscriber);
    let storage = Arc::clone(&worker.context().storage);
    storage
        .put_task(Task::new(TaskAction::Reply).with_fei(root_fei("wf-gone")))
        .await
        .unwrap();
    storage
        .put_task(
            Task::new(TaskAction::Cancel)
                .with_fei(root_fei("wf-gone"))
                .with_flavour(CancelFlavour::Kill),
        )
        .await
        .unwrap();

    let outcome = worker.step().await.unwrap();

    assert_eq!(outcome.tasks, 2);
    assert!(backend.tasks().is_empty());
    assert_eq!(actions(&seen), vec![TaskAction::Reply, TaskAction::Cancel]);
}

#[tokio::test]
async fn test_unknown_action_is_consumed_and_notified() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (seen, subscriber) = collector();
    worker.subscribe(Subscription::All, subscriber);

    let task: Task = serde_json::from_value(json!({"action": "frobnicate", "wfid": "wf-x"})).unwrap();
    assert_eq!(task.action, TaskAction::Unknown);
    worker.context().storage.put_task(task).await.unwrap();

    worker.step().await.unwrap();

    assert!(backend.tasks().is_empty());
    assert_eq!(actions(&seen), vec![TaskAction::Unknown]);
    assert!(tasks_with(&backend, TaskAction::Error).is_empty());
}

#[tokio::test]
async fn test_subscription_filters_actions() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (everything, all) = collector();
    let (terminal, only_terminal) = collector();
    worker.subscribe(Subscription::All, all);
    worker.subscribe(
        Subscription::actions([TaskAction::Terminated, TaskAction::Cancelled]),
        only_terminal,
    );

    let tree = TreeNode::new("concurrence")
        .with_child(TreeNode::new("noop"))
        .with_child(TreeNode::new("noop"));
    worker.launch(tree, Workitem::default(), None).await.unwrap();
    run_until_quiet(&mut worker, &backend, 20).await;
    worker.step().await.unwrap();

    assert_eq!(actions(&terminal), vec![TaskAction::Terminated]);
    let everything = actions(&everything);
    assert_eq!(everything.iter().filter(|a| **a == TaskAction::Apply).count(), 2);
    assert_eq!(everything.iter().filter(|a| **a == TaskAction::Reply).count(), 2);
    assert_eq!(everything.last(), Some(&TaskAction::Terminated));
}

#[tokio::test]
async fn test_launch_uses_supplied_variables() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let variables: Variables = [("region".to_string(), json!("eu"))].into_iter().collect();
    let wfid = worker
        .launch(TreeNode::new("wait"), Workitem::default(), Some(variables.clone()))
        .await
        .unwrap();

    worker.step().await.unwrap();

    let root = backend
        .expression(&FlowExpressionId::root(wfid, DEFAULT_DEFINITION_ID))
        .unwrap();
    assert_eq!(root.variables, Some(variables));
    assert_eq!(root.parent_id, None);
}

#[tokio::test]
async fn test_due_timer_is_fired_by_step() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let wfid = worker
        .launch(TreeNode::new("wait"), Workitem::default(), None)
        .await
        .unwrap();
    worker.step().await.unwrap();
    let fei = FlowExpressionId::root(wfid, DEFAULT_DEFINITION_ID);

    worker
        .context()
        .scheduler
        .schedule_at(
            Utc::now() - chrono::Duration::seconds(1),
            Schedulable::expression(fei.clone(), ExpressionMethod::Reply),
        )
        .await
        .unwrap();
    assert_eq!(worker.fire_schedules(Utc::now()).await.unwrap(), 1);
    assert_eq!(tasks_with(&backend, TaskAction::Reply).len(), 1);

    worker.step().await.unwrap();
    assert!(backend.expression(&fei).is_none());
    assert_eq!(tasks_with(&backend, TaskAction::Terminated).len(), 1);
}

#[tokio::test]
async fn test_configure_applies_storage_overrides() {
    let overrides: WorkerConfiguration = [
        ("name".to_string(), json!("night-shift")),
        ("idle_sleep_ms".to_string(), json!(250)),
    ]
    .into_iter()
    .collect();
    let backend = MemoryBackend::new().with_worker_configuration(overrides);
    let ctx = EngineContext::with_builtins(Arc::new(backend));
    let mut worker = test_worker(ctx);

    worker.configure().await.unwrap();

    assert_eq!(worker.config().name, "night-shift");
    assert_eq!(worker.config().idle_sleep, Duration::from_millis(250));
}

#[tokio::test]
async fn test_run_processes_until_shutdown() {
    let (backend, ctx) = memory_context();
    let mut worker = test_worker(ctx);
    let (seen, subscriber) = collector();
    worker.subscribe(
        Subscription::actions([TaskAction::Terminated]),
        subscriber,
    );
    worker
        .launch(
            TreeNode::new("sequence").with_child(TreeNode::new("noop")),
            Workitem::default(),
            None,
        )
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    let watcher = async {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stopper.cancel();
    };
    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(worker.run(shutdown), watcher);
    })
    .await
    .expect("worker stops after shutdown");

    assert_eq!(actions(&seen), vec![TaskAction::Terminated]);
    assert!(backend.expressions().is_empty());
}
