//! 编排器：主控循环
//!
//! 负责：加载配置、选择后端（HTTP / 内存演示）、建立 cmd/state 两个通道，
//! 并在后台任务中串行处理用户命令与网络调用完成事件。网络调用各自在独立任务中运行，
//! 结果以 Completion 事件回到主循环，由 Workflow 根据 Ticket 决定采用还是丢弃。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, AppConfig};
use crate::core::dispatcher::ExecutionDispatcher;
use crate::core::error::{AuthError, ExecutionError, PlanError, TransportError};
use crate::core::planner::PlanRequester;
use crate::core::registry::DeviceRegistry;
use crate::core::session::SessionGate;
use crate::core::state::{reduce, UiState};
use crate::core::types::{Device, DeviceKind, ExecutionResult, FileEntry, Plan};
use crate::core::workflow::{Ticket, Workflow};
use crate::remote::{Backends, HttpBackend, InMemoryBackend, RemoteConsole};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 重新探测会话
    Probe,
    Login { username: String, password: String },
    /// 本地立即登出，远端登出尽力而为
    Logout,
    ChangePassword(String),
    /// 重新加载两个设备池
    LoadDevices,
    SelectDevice(Device),
    /// 以给定目标为当前设备请求计划
    RequestPlan(String),
    /// 批准并执行当前 PendingApproval
    Approve,
    RefreshSessionLog,
    BrowseFiles(String),
    Quit,
}

/// 网络调用完成事件
enum Completion {
    Probed {
        ticket: Ticket,
        authenticated: bool,
    },
    LoggedIn {
        ticket: Ticket,
        result: Result<(), AuthError>,
    },
    LoggedOut,
    PasswordChanged(Result<String, AuthError>),
    Devices {
        ticket: Ticket,
        kind: DeviceKind,
        result: Result<Vec<Device>, TransportError>,
    },
    Planned {
        ticket: Ticket,
        result: Result<Plan, PlanError>,
    },
    Executed {
        ticket: Ticket,
        result: Result<ExecutionResult, ExecutionError>,
    },
    SessionLog {
        ticket: Ticket,
        result: Result<Vec<String>, TransportError>,
    },
    FileTree {
        ticket: Ticket,
        path: String,
        result: Result<Vec<FileEntry>, TransportError>,
    },
}

/// 主循环使用的各组件
#[derive(Clone)]
pub struct Services {
    pub session: SessionGate,
    pub registry: DeviceRegistry,
    pub requester: PlanRequester,
    pub dispatcher: ExecutionDispatcher,
    pub console: Arc<dyn RemoteConsole>,
}

impl Services {
    pub fn new(backends: Backends, cfg: &AppConfig) -> Self {
        Self {
            session: SessionGate::new(backends.session),
            registry: DeviceRegistry::new(backends.devices),
            requester: PlanRequester::new(backends.planner),
            dispatcher: ExecutionDispatcher::new(
                backends.executor,
                cfg.executor.forbidden_keywords.clone(),
            ),
            console: backends.console,
        }
    }
}

/// UI 持有的句柄
pub struct WorkflowHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub state: watch::Receiver<UiState>,
    /// 计划目标输入框的初始内容
    pub default_goal: String,
}

struct EventLoop {
    services: Services,
    workflow: Workflow,
    state_tx: watch::Sender<UiState>,
    done_tx: mpsc::UnboundedSender<Completion>,
    shutdown: CancellationToken,
    /// 尚未完成的远端登出；完成前登录与探测都要等待，否则旧的登出会销毁新会话
    logouts_in_flight: usize,
    deferred_login: Option<(String, String)>,
    deferred_probe: bool,
}

impl EventLoop {
    /// 在独立任务中运行一次网络调用；退出时未完成的调用被取消
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let done_tx = self.done_tx.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                done = call => {
                    let _ = done_tx.send(done);
                }
            }
        });
    }

    fn probe(&mut self) {
        if self.logouts_in_flight > 0 {
            self.deferred_probe = true;
            return;
        }
        let ticket = self.workflow.ticket();
        let session = self.services.session.clone();
        self.spawn_call(async move {
            Completion::Probed {
                ticket,
                authenticated: session.probe().await,
            }
        });
    }

    fn login(&mut self, username: String, password: String) {
        if self.logouts_in_flight > 0 {
            tracing::debug!("login queued behind remote logout");
            self.deferred_login = Some((username, password));
            return;
        }
        let ticket = self.workflow.ticket();
        let session = self.services.session.clone();
        self.spawn_call(async move {
            let result = session.login(&username, &password).await;
            Completion::LoggedIn { ticket, result }
        });
    }

    /// 认证成功后加载设备池与会话日志
    fn load_dashboard(&mut self) {
        self.load_devices();
        self.refresh_session_log();
    }

    fn load_devices(&mut self) {
        let Ok(ticket) = self.workflow.begin_device_load() else {
            return;
        };
        for kind in DeviceKind::ALL {
            let registry = self.services.registry.clone();
            self.spawn_call(async move {
                let result = registry.list_devices(kind).await;
                Completion::Devices {
                    ticket,
                    kind,
                    result,
                }
            });
        }
    }

    fn refresh_session_log(&self) {
        if !self.workflow.is_authenticated() {
            return;
        }
        let ticket = self.workflow.ticket();
        let console = self.services.console.clone();
        self.spawn_call(async move {
            let result = console.session_log().await;
            Completion::SessionLog { ticket, result }
        });
    }

    /// 处理一条用户命令；返回 false 表示退出
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Probe => self.probe(),
            Command::Login { username, password } => self.login(username, password),
            Command::Logout => {
                self.workflow.on_logout();
                self.deferred_login = None;
                self.logouts_in_flight += 1;
                let session = self.services.session.clone();
                self.spawn_call(async move {
                    session.logout().await;
                    Completion::LoggedOut
                });
            }
            Command::ChangePassword(password) => {
                if self.workflow.is_authenticated() {
                    let session = self.services.session.clone();
                    self.spawn_call(async move {
                        Completion::PasswordChanged(session.set_password(&password).await)
                    });
                }
            }
            Command::LoadDevices => self.load_devices(),
            Command::SelectDevice(device) => {
                if let Err(e) = self.workflow.select_device(device) {
                    tracing::debug!(error = %e, "device selection ignored");
                }
            }
            Command::RequestPlan(goal) => match self.workflow.begin_plan(&goal) {
                Ok((ticket, goal, device)) => {
                    let requester = self.services.requester.clone();
                    self.spawn_call(async move {
                        let result = requester.request_plan(&goal, Some(&device)).await;
                        Completion::Planned { ticket, result }
                    });
                }
                Err(e) => tracing::debug!(error = %e, "plan request refused"),
            },
            Command::Approve => match self.workflow.begin_execution() {
                Ok((ticket, approved)) => {
                    let dispatcher = self.services.dispatcher.clone();
                    self.spawn_call(async move {
                        let result = dispatcher.execute(approved).await;
                        Completion::Executed { ticket, result }
                    });
                }
                Err(e) => tracing::info!(error = %e, "approval refused"),
            },
            Command::RefreshSessionLog => self.refresh_session_log(),
            Command::BrowseFiles(path) => match self.workflow.begin_file_tree() {
                Ok((ticket, device)) => {
                    let console = self.services.console.clone();
                    self.spawn_call(async move {
                        let result = console.file_tree(&device, &path).await;
                        Completion::FileTree {
                            ticket,
                            path,
                            result,
                        }
                    });
                }
                Err(e) => tracing::debug!(error = %e, "file browsing refused"),
            },
            Command::Quit => {
                self.shutdown.cancel();
                return false;
            }
        }
        true
    }

    fn handle_completion(&mut self, done: Completion) {
        // 任意调用返回 401：会话已失效，重新探测以推导认证状态
        let mut unauthorized = false;
        match done {
            Completion::Probed {
                ticket,
                authenticated,
            } => {
                if self.workflow.on_probe(ticket, authenticated) {
                    self.load_dashboard();
                }
            }
            Completion::LoggedIn { ticket, result } => {
                if self.workflow.on_login(ticket, result) {
                    self.load_dashboard();
                }
            }
            Completion::LoggedOut => {
                self.logouts_in_flight = self.logouts_in_flight.saturating_sub(1);
                if self.logouts_in_flight == 0 {
                    if let Some((username, password)) = self.deferred_login.take() {
                        self.login(username, password);
                    }
                    if std::mem::take(&mut self.deferred_probe) {
                        self.probe();
                    }
                }
            }
            Completion::PasswordChanged(result) => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.on_password_changed(result);
            }
            Completion::Devices {
                ticket,
                kind,
                result,
            } => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.on_devices_loaded(ticket, kind, result);
            }
            Completion::Planned { ticket, result } => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.finish_plan(ticket, result);
            }
            Completion::Executed { ticket, result } => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.finish_execution(ticket, result);
            }
            Completion::SessionLog { ticket, result } => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.on_session_log(ticket, result);
            }
            Completion::FileTree {
                ticket,
                path,
                result,
            } => {
                unauthorized = matches!(&result, Err(e) if e.is_unauthorized());
                self.workflow.finish_file_tree(ticket, path, result);
            }
        }
        if unauthorized {
            tracing::warn!("remote call returned 401, re-probing session");
            self.probe();
        }
    }

    fn publish(&self) {
        let next = reduce(&self.workflow.snapshot());
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        // UI 已关闭
                        None => {
                            self.shutdown.cancel();
                            break;
                        }
                    }
                }
                Some(done) = done_rx.recv() => self.handle_completion(done),
            }
            self.publish();
        }
        tracing::info!("workflow loop stopped");
    }
}

/// 启动主控循环：返回命令发送端与状态接收端
pub fn spawn_workflow(
    services: Services,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (done_tx, done_rx) = mpsc::unbounded_channel::<Completion>();
    let (state_tx, state_rx) = watch::channel(UiState::default());

    let event_loop = EventLoop {
        services,
        workflow: Workflow::new(),
        state_tx,
        done_tx,
        shutdown: CancellationToken::new(),
        logouts_in_flight: 0,
        deferred_login: None,
        deferred_probe: false,
    };
    tokio::spawn(event_loop.run(cmd_rx, done_rx));

    (cmd_tx, state_rx)
}

/// 根据配置选择后端：配置了 base_url 用 HTTP，否则用内存演示后端
pub fn backends_from_config(cfg: &AppConfig) -> anyhow::Result<Backends> {
    match cfg.remote.base_url.as_deref() {
        Some(base_url) => {
            let backend = HttpBackend::new(base_url, &cfg.remote)
                .with_context(|| format!("Failed to create HTTP backend for {base_url}"))?;
            tracing::info!(base_url = %base_url, "Using HTTP backend");
            Ok(Backends::from_shared(Arc::new(backend)))
        }
        None => {
            tracing::warn!("remote.base_url not set, using in-memory demo backend (login admin/admin)");
            Ok(Backends::from_shared(Arc::new(InMemoryBackend::demo())))
        }
    }
}

/// 创建工作流运行时：加载配置、启动主循环并发起首次会话探测
pub async fn create_workflow(config_path: Option<PathBuf>) -> anyhow::Result<WorkflowHandle> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let backends = backends_from_config(&cfg)?;
    let (commands, state) = spawn_workflow(Services::new(backends, &cfg));
    commands
        .send(Command::Probe)
        .context("workflow loop exited before start")?;

    Ok(WorkflowHandle {
        commands,
        state,
        default_goal: cfg.app.default_goal,
    })
}
