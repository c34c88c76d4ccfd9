//! 工作流端到端场景：编排器 + 内存后端

use std::sync::Arc;
use std::time::Duration;

use coursecheck::config::AppConfig;
use coursecheck::core::state::{APPROVE_LABEL, EXECUTING_LABEL};
use coursecheck::core::{
    spawn_workflow, Command, Device, DeviceKind, ExecutionError, Outcome, Plan, PlanError,
    PlanStep, Services, UiState, WorkflowPhase,
};
use coursecheck::remote::{Backends, InMemoryBackend};
use tokio::sync::{mpsc, watch};

type Handles = (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>);

fn d1() -> Device {
    Device::new("D1", "pi-kitchen")
}

fn d2() -> Device {
    Device::new("D2", "pi-garage")
}

fn backend() -> Arc<InMemoryBackend> {
    Arc::new(
        InMemoryBackend::new()
            .with_user("admin", "admin")
            .with_devices(DeviceKind::Primary, vec![d1(), d2()])
            .with_devices(DeviceKind::Secondary, vec![Device::new("L1", "laptop")]),
    )
}

fn ls_plan() -> Plan {
    Plan::new(vec![
        PlanStep::new("check dir", "ls /home/pi"),
        PlanStep::new("check disk", "df -h"),
    ])
}

fn start(backend: &Arc<InMemoryBackend>) -> Handles {
    let services = Services::new(Backends::from_shared(backend.clone()), &AppConfig::default());
    spawn_workflow(services)
}

async fn wait_for<F>(rx: &mut watch::Receiver<UiState>, pred: F) -> UiState
where
    F: Fn(&UiState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("workflow loop stopped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

async fn login((tx, rx): &mut Handles) -> UiState {
    tx.send(Command::Login {
        username: "admin".into(),
        password: "admin".into(),
    })
    .unwrap();
    wait_for(rx, |s| {
        s.authenticated && s.primary_devices.len() == 2 && s.secondary_devices.len() == 1
    })
    .await
}

async fn select(handles: &mut Handles, device: Device) -> UiState {
    let id = device.identifier.clone();
    handles.0.send(Command::SelectDevice(device)).unwrap();
    wait_for(&mut handles.1, |s| {
        s.selected_device.as_ref().map(|d| d.identifier == id).unwrap_or(false)
    })
    .await
}

async fn plan(handles: &mut Handles, goal: &str) -> UiState {
    handles.0.send(Command::RequestPlan(goal.into())).unwrap();
    wait_for(&mut handles.1, |s| {
        !s.planning && (s.approval.is_some() || s.plan_error.is_some() || !s.plan_steps.is_empty())
    })
    .await
}

#[tokio::test]
async fn test_happy_path_executes_exactly_the_displayed_command() {
    let backend = backend();
    backend.push_plan(Ok(ls_plan()));
    backend.push_execution(Ok("file1\nfile2".into()));
    let mut handles = start(&backend);

    let state = login(&mut handles).await;
    assert!(!state.can_request_plan);
    assert_eq!(
        state.status_hint,
        "Select a device to enable planning and execution."
    );

    let state = select(&mut handles, d1()).await;
    assert!(state.can_request_plan);
    assert!(!state.can_approve);

    let state = plan(&mut handles, "List files in /home/pi").await;
    assert_eq!(state.phase, WorkflowPhase::AwaitingApproval);
    assert_eq!(state.plan_steps.len(), 2);
    let pending = state.approval.clone().unwrap();
    assert_eq!(pending.command, "ls /home/pi");
    assert_eq!(pending.bound_device, "D1");
    assert!(state.can_approve);
    assert_eq!(state.breadcrumbs.last().unwrap().label, "Approve");

    handles.0.send(Command::Approve).unwrap();
    let state = wait_for(&mut handles.1, |s| s.execution.is_some()).await;
    let result = state.execution.unwrap();
    assert_eq!(result.outcome, Outcome::Ok);
    assert_eq!(result.output, "file1\nfile2");
    assert_eq!(result.approval_id, pending.id);
    assert_eq!(state.phase, WorkflowPhase::Reviewed);
    assert!(!state.can_approve);
    assert_eq!(state.approve_label, APPROVE_LABEL);

    assert_eq!(
        backend.plan_requests(),
        vec![("List files in /home/pi".to_string(), "D1".to_string())]
    );
    assert_eq!(
        backend.executed(),
        vec![("ls /home/pi".to_string(), "D1".to_string())]
    );
}

#[tokio::test]
async fn test_device_change_after_planning_blocks_execution() {
    let backend = backend();
    backend.push_plan(Ok(ls_plan()));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "List files in /home/pi").await;

    let state = select(&mut handles, d2()).await;
    assert!(state.approval.is_none());
    assert!(state.plan_steps.is_empty());
    assert!(!state.can_approve);
    assert_eq!(state.phase, WorkflowPhase::NoPlan);

    handles.0.send(Command::Approve).unwrap();
    let state = wait_for(&mut handles.1, |s| s.approve_error.is_some()).await;
    assert_eq!(
        state.approve_error.as_deref(),
        Some("No planned command is awaiting approval.")
    );
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_planner_error_is_shown_and_leaves_no_approval() {
    let backend = backend();
    backend.push_plan(Ok(ls_plan()));
    backend.push_plan(Err(PlanError::Rejected {
        message: "timeout".into(),
        raw: "<empty>".into(),
    }));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "first").await;

    handles.0.send(Command::RequestPlan("second".into())).unwrap();
    let state = wait_for(&mut handles.1, |s| s.plan_error.is_some()).await;
    let err = state.plan_error.unwrap();
    assert!(err.contains("timeout"));
    assert!(err.contains("<empty>"));
    assert!(state.approval.is_none());
    assert!(state.plan_steps.is_empty());
    assert!(!state.can_approve);
}

#[tokio::test]
async fn test_plan_without_device_makes_no_network_call() {
    let backend = backend();
    let mut handles = start(&backend);
    login(&mut handles).await;

    handles.0.send(Command::RequestPlan("List files".into())).unwrap();
    let state = wait_for(&mut handles.1, |s| s.plan_error.is_some()).await;
    assert_eq!(state.plan_error.as_deref(), Some("Please select a device first."));
    assert!(state.approval.is_none());
    assert!(backend.plan_requests().is_empty());
}

#[tokio::test]
async fn test_execution_result_after_device_change_is_discarded() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_user("admin", "admin")
            .with_devices(DeviceKind::Primary, vec![d1(), d2()])
            .with_devices(DeviceKind::Secondary, vec![Device::new("L1", "laptop")])
            .with_execution_delay(Duration::from_millis(200)),
    );
    backend.push_plan(Ok(ls_plan()));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "List files").await;

    handles.0.send(Command::Approve).unwrap();
    let state = wait_for(&mut handles.1, |s| s.phase == WorkflowPhase::Executing).await;
    assert_eq!(state.approve_label, EXECUTING_LABEL);
    assert!(!state.can_approve);

    let state = select(&mut handles, d2()).await;
    assert_eq!(state.phase, WorkflowPhase::NoPlan);
    // 执行锁保持到远端返回
    assert_eq!(state.approve_label, EXECUTING_LABEL);

    let state = wait_for(&mut handles.1, |s| s.approve_label == APPROVE_LABEL).await;
    assert!(state.execution.is_none());
    assert_eq!(state.selected_device.unwrap().identifier, "D2");
    assert_eq!(backend.executed().len(), 1);
}

#[tokio::test]
async fn test_forbidden_command_fails_without_reaching_executor() {
    let backend = backend();
    backend.push_plan(Ok(Plan::new(vec![PlanStep::new("restart", "sudo reboot")])));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "Restart it").await;

    handles.0.send(Command::Approve).unwrap();
    let state = wait_for(&mut handles.1, |s| s.execution.is_some()).await;
    let result = state.execution.unwrap();
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(
        result.error_detail.as_deref(),
        Some("Command contains dangerous keyword: reboot")
    );
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_remote_failure_shows_output_and_allows_new_plan() {
    let backend = backend();
    backend.push_plan(Ok(ls_plan()));
    backend.push_plan(Ok(ls_plan()));
    backend.push_execution(Err(ExecutionError::Remote {
        detail: "exit status 2".into(),
        output: Some("ls: cannot access '/home/pi'".into()),
    }));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "List files").await;

    handles.0.send(Command::Approve).unwrap();
    let state = wait_for(&mut handles.1, |s| s.execution.is_some()).await;
    let result = state.execution.unwrap();
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(result.output, "ls: cannot access '/home/pi'");
    assert_eq!(state.approve_error.as_deref(), Some("exit status 2"));

    handles.0.send(Command::RequestPlan("List files".into())).unwrap();
    let state = wait_for(&mut handles.1, |s| s.can_approve).await;
    assert!(state.execution.is_none());
    assert!(state.approve_error.is_none());
}

#[tokio::test]
async fn test_login_failure_shows_inline_error() {
    let backend = backend();
    let (tx, mut rx) = start(&backend);
    tx.send(Command::Login {
        username: "admin".into(),
        password: "wrong".into(),
    })
    .unwrap();
    let state = wait_for(&mut rx, |s| s.login_error.is_some()).await;
    assert!(!state.authenticated);
    assert_eq!(
        state.login_error.as_deref(),
        Some("Incorrect username or password")
    );
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let backend = backend();
    backend.push_plan(Ok(ls_plan()));
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;
    plan(&mut handles, "List files").await;

    handles.0.send(Command::Logout).unwrap();
    let state = wait_for(&mut handles.1, |s| !s.authenticated).await;
    assert!(state.approval.is_none());
    assert!(state.selected_device.is_none());
    assert!(state.primary_devices.is_empty());
    assert_eq!(state.phase, WorkflowPhase::NoPlan);
    assert_eq!(state.status_hint, "Log in to continue.");

    // 远端登出尽力而为
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.is_authenticated() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_login_right_after_logout_keeps_new_session() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_user("admin", "admin")
            .with_devices(DeviceKind::Primary, vec![d1(), d2()])
            .with_devices(DeviceKind::Secondary, vec![Device::new("L1", "laptop")])
            .with_logout_delay(Duration::from_millis(150)),
    );
    let mut handles = start(&backend);
    login(&mut handles).await;

    handles.0.send(Command::Logout).unwrap();
    wait_for(&mut handles.1, |s| !s.authenticated).await;
    // 远端登出仍在进行中
    assert!(backend.is_authenticated());
    let state = login(&mut handles).await;
    assert!(state.authenticated);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(backend.is_authenticated());

    handles.0.send(Command::Probe).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(backend.is_authenticated());
    assert!(handles.1.borrow().authenticated);
}

#[tokio::test]
async fn test_expired_session_is_detected_on_next_call() {
    let backend = backend();
    let mut handles = start(&backend);
    login(&mut handles).await;
    select(&mut handles, d1()).await;

    backend.expire_session();
    handles.0.send(Command::RequestPlan("List files".into())).unwrap();
    let state = wait_for(&mut handles.1, |s| !s.authenticated).await;
    assert!(state.approval.is_none());
    assert!(state.selected_device.is_none());
}

#[tokio::test]
async fn test_probe_restores_existing_session() {
    let backend = backend();
    let (tx, mut rx) = start(&backend);
    tx.send(Command::Login {
        username: "admin".into(),
        password: "admin".into(),
    })
    .unwrap();
    wait_for(&mut rx, |s| s.authenticated).await;
    drop(tx);

    // 新的客户端实例：只靠 probe 推导登录状态
    let (tx, mut rx) = start(&backend);
    tx.send(Command::Probe).unwrap();
    let state = wait_for(&mut rx, |s| s.authenticated && s.primary_devices.len() == 2).await;
    assert_eq!(state.secondary_devices.len(), 1);
}

#[tokio::test]
async fn test_file_tree_and_password_change() {
    let backend = Arc::new(InMemoryBackend::demo());
    let (tx, mut rx) = start(&backend);
    tx.send(Command::Login {
        username: "admin".into(),
        password: "admin".into(),
    })
    .unwrap();
    let state = wait_for(&mut rx, |s| s.authenticated && s.session_log.is_some()).await;
    let device = state.primary_devices[0].clone();
    tx.send(Command::SelectDevice(device)).unwrap();
    tx.send(Command::BrowseFiles("/home/pi".into())).unwrap();
    let state = wait_for(&mut rx, |s| s.file_tree.is_some()).await;
    let tree = state.file_tree.unwrap();
    assert_eq!(tree.path, "/home/pi");
    assert!(!tree.entries.is_empty());

    tx.send(Command::ChangePassword("s3cret".into())).unwrap();
    let state = wait_for(&mut rx, |s| s.notice.is_some()).await;
    assert_eq!(state.notice.as_deref(), Some("Password updated"));
}
