//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询 state 与键盘事件，将按键按当前界面（登录 / 仪表盘 / 修改密码）转为 Command
//! 发送给编排器，每帧用 draw 渲染 UiState 与本地输入状态。按钮是否可用只看 UiState，界面本身不做判断。

use std::io::{self, Stdout};

use crossterm::event::{KeyCode, KeyEvent};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::core::{Command, Device, UiState, WorkflowHandle};
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::draw;

/// 仪表盘上的输入焦点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Devices,
    Goal,
}

/// 登录表单的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
}

/// 只属于界面的本地状态（输入缓冲、光标、焦点）
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub focus: Focus,
    pub device_cursor: usize,
    pub goal: String,
    pub username: String,
    pub password: String,
    pub login_field: LoginField,
    /// Some 表示正在输入新密码
    pub new_password: Option<String>,
}

impl ViewState {
    pub fn new(default_goal: String) -> Self {
        Self {
            goal: default_goal,
            ..Self::default()
        }
    }

    /// 两个设备池拼成一个列表供光标移动
    pub fn devices(state: &UiState) -> Vec<&Device> {
        state
            .primary_devices
            .iter()
            .chain(state.secondary_devices.iter())
            .collect()
    }

    /// 解释一次按键；返回需要发送给编排器的命令
    pub fn handle_key(&mut self, key: KeyEvent, state: &UiState) -> Option<Command> {
        if !state.authenticated {
            self.new_password = None;
            return self.handle_login_key(key);
        }
        if self.new_password.is_some() {
            return self.handle_password_key(key);
        }
        match self.focus {
            Focus::Goal => self.handle_goal_key(key, state),
            Focus::Devices => self.handle_dashboard_key(key, state),
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) -> Option<Command> {
        let field = match self.login_field {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        };
        match key.code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.login_field = match self.login_field {
                    LoginField::Username => LoginField::Password,
                    LoginField::Password => LoginField::Username,
                };
            }
            KeyCode::Backspace => {
                field.pop();
            }
            KeyCode::Char(c) => field.push(c),
            KeyCode::Enter => {
                let username = self.username.trim().to_string();
                if username.is_empty() {
                    self.login_field = LoginField::Username;
                    return None;
                }
                let password = std::mem::take(&mut self.password);
                self.login_field = LoginField::Username;
                return Some(Command::Login { username, password });
            }
            _ => {}
        }
        None
    }

    fn handle_password_key(&mut self, key: KeyEvent) -> Option<Command> {
        let buffer = self.new_password.as_mut()?;
        match key.code {
            KeyCode::Esc => self.new_password = None,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            KeyCode::Enter => {
                let password = self.new_password.take().unwrap_or_default();
                return Some(Command::ChangePassword(password));
            }
            _ => {}
        }
        None
    }

    fn handle_goal_key(&mut self, key: KeyEvent, state: &UiState) -> Option<Command> {
        match key.code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Esc => self.focus = Focus::Devices,
            KeyCode::Backspace => {
                self.goal.pop();
            }
            KeyCode::Char(c) => self.goal.push(c),
            KeyCode::Enter if state.can_request_plan => {
                return Some(Command::RequestPlan(self.goal.clone()));
            }
            _ => {}
        }
        None
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent, state: &UiState) -> Option<Command> {
        let devices = Self::devices(state);
        match key.code {
            KeyCode::Tab | KeyCode::BackTab => self.focus = Focus::Goal,
            KeyCode::Up => self.device_cursor = self.device_cursor.saturating_sub(1),
            KeyCode::Down => {
                self.device_cursor =
                    (self.device_cursor + 1).min(devices.len().saturating_sub(1));
            }
            KeyCode::Enter => {
                return devices
                    .get(self.device_cursor)
                    .map(|d| Command::SelectDevice((*d).clone()));
            }
            KeyCode::Char('p') if state.can_request_plan => {
                return Some(Command::RequestPlan(self.goal.clone()));
            }
            KeyCode::Char('a') if state.can_approve => return Some(Command::Approve),
            KeyCode::Char('r') => return Some(Command::LoadDevices),
            KeyCode::Char('l') => return Some(Command::RefreshSessionLog),
            KeyCode::Char('f') if state.selected_device.is_some() => {
                return Some(Command::BrowseFiles("/".to_string()));
            }
            KeyCode::Char('o') => return Some(Command::Logout),
            KeyCode::Char('w') => self.new_password = Some(String::new()),
            _ => {}
        }
        None
    }
}

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端
pub async fn run_app(handle: WorkflowHandle) -> anyhow::Result<()> {
    let WorkflowHandle {
        commands,
        state,
        default_goal,
    } = handle;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let event_handler = EventHandler::new();
    let mut view = ViewState::new(default_goal);

    loop {
        let current = state.borrow().clone();

        match event_handler.poll() {
            Ok(Some(AppEvent::Quit)) => {
                let _ = commands.send(Command::Quit);
                break;
            }
            Ok(Some(AppEvent::Key(key))) => {
                if let Some(cmd) = view.handle_key(key, &current) {
                    if commands.send(cmd).is_err() {
                        tracing::error!("workflow loop is gone, exiting");
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "terminal event error"),
        }

        let device_count = ViewState::devices(&current).len();
        view.device_cursor = view.device_cursor.min(device_count.saturating_sub(1));

        terminal.draw(|f| draw(f, &current, &view))?;

        tokio::task::yield_now().await;
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{reduce, WorkflowSnapshot};
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn logged_in(selected: bool) -> UiState {
        reduce(&WorkflowSnapshot {
            authenticated: true,
            primary_devices: vec![Device::new("D1", "pi-kitchen"), Device::new("D2", "pi-garage")],
            selected_device: selected.then(|| Device::new("D1", "pi-kitchen")),
            ..WorkflowSnapshot::default()
        })
    }

    #[test]
    fn test_login_form_submits_credentials() {
        let state = UiState::default();
        let mut view = ViewState::default();
        for c in "admin".chars() {
            view.handle_key(key(KeyCode::Char(c)), &state);
        }
        view.handle_key(key(KeyCode::Tab), &state);
        for c in "pw".chars() {
            view.handle_key(key(KeyCode::Char(c)), &state);
        }
        match view.handle_key(key(KeyCode::Enter), &state) {
            Some(Command::Login { username, password }) => {
                assert_eq!(username, "admin");
                assert_eq!(password, "pw");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(view.password.is_empty());
    }

    #[test]
    fn test_plan_key_respects_can_request_plan() {
        let mut view = ViewState::new("List files".into());
        assert!(view.handle_key(key(KeyCode::Char('p')), &logged_in(false)).is_none());
        assert!(matches!(
            view.handle_key(key(KeyCode::Char('p')), &logged_in(true)),
            Some(Command::RequestPlan(goal)) if goal == "List files"
        ));
    }

    #[test]
    fn test_approve_key_requires_can_approve() {
        let mut view = ViewState::default();
        let state = logged_in(true);
        assert!(!state.can_approve);
        assert!(view.handle_key(key(KeyCode::Char('a')), &state).is_none());
    }

    #[test]
    fn test_device_cursor_selects_device() {
        let mut view = ViewState::default();
        let state = logged_in(false);
        view.handle_key(key(KeyCode::Down), &state);
        view.handle_key(key(KeyCode::Down), &state);
        assert_eq!(view.device_cursor, 1);
        assert!(matches!(
            view.handle_key(key(KeyCode::Enter), &state),
            Some(Command::SelectDevice(d)) if d.identifier == "D2"
        ));
    }

    #[test]
    fn test_goal_editing() {
        let mut view = ViewState::new("ls".into());
        let state = logged_in(true);
        view.handle_key(key(KeyCode::Tab), &state);
        assert_eq!(view.focus, Focus::Goal);
        // 输入框里的 p 是普通字符
        assert!(view.handle_key(key(KeyCode::Char('p')), &state).is_none());
        assert_eq!(view.goal, "lsp");
        view.handle_key(key(KeyCode::Backspace), &state);
        assert!(matches!(
            view.handle_key(key(KeyCode::Enter), &state),
            Some(Command::RequestPlan(goal)) if goal == "ls"
        ));
    }

    #[test]
    fn test_change_password_flow() {
        let mut view = ViewState::default();
        let state = logged_in(true);
        view.handle_key(key(KeyCode::Char('w')), &state);
        for c in "new".chars() {
            view.handle_key(key(KeyCode::Char(c)), &state);
        }
        assert!(matches!(
            view.handle_key(key(KeyCode::Enter), &state),
            Some(Command::ChangePassword(p)) if p == "new"
        ));
        assert!(view.new_password.is_none());
    }
}
