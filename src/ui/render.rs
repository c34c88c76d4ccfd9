//! 界面渲染
//!
//! 未登录时绘制登录表单；登录后绘制仪表盘：顶部面包屑，左侧两个设备池，右侧目标输入、计划、
//! 待批准命令与执行结果，底部状态提示与快捷键。

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::core::{Device, FileKind, Outcome, UiState, WorkflowPhase};
use crate::ui::app::{Focus, LoginField, ViewState};

/// 执行输出在面板中最多显示的行数
const MAX_OUTPUT_LINES: usize = 200;

fn phase_label(phase: WorkflowPhase) -> &'static str {
    match phase {
        WorkflowPhase::NoPlan => "no plan",
        WorkflowPhase::Planned => "planned",
        WorkflowPhase::AwaitingApproval => "awaiting approval",
        WorkflowPhase::Executing => "executing",
        WorkflowPhase::Reviewed => "reviewed",
    }
}

fn error_line(text: &str) -> Line<'static> {
    Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Red)))
}

pub fn draw(f: &mut Frame, state: &UiState, view: &ViewState) {
    if state.authenticated {
        draw_dashboard(f, state, view);
    } else {
        draw_login(f, state, view);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_login(f: &mut Frame, state: &UiState, view: &ViewState) {
    let area = centered(f.area(), 50, 10);
    let field_style = |field: LoginField| {
        if view.login_field == field {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Username: ", field_style(LoginField::Username)),
            Span::raw(view.username.clone()),
        ]),
        Line::from(vec![
            Span::styled("Password: ", field_style(LoginField::Password)),
            Span::raw("*".repeat(view.password.chars().count())),
        ]),
        Line::from(""),
    ];
    if let Some(err) = &state.login_error {
        lines.push(error_line(err));
    } else {
        lines.push(Line::from(Span::styled(
            state.status_hint.clone(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let block = Block::default()
        .title(" CourseCheck │ Login ")
        .title_bottom(Line::from(Span::styled(
            " Tab 切换 │ Enter 登录 │ Ctrl+Q 退出 ",
            Style::default().fg(Color::DarkGray),
        )))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    f.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}

fn draw_dashboard(f: &mut Frame, state: &UiState, view: &ViewState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(f.area());

    draw_breadcrumbs(f, state, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[1]);
    draw_devices(f, state, view, columns[0]);
    draw_workflow(f, state, view, columns[1]);
    draw_status(f, state, view, rows[2]);
}

fn draw_breadcrumbs(f: &mut Frame, state: &UiState, area: Rect) {
    let mut spans = Vec::new();
    for (i, crumb) in state.breadcrumbs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" › ", Style::default().fg(Color::DarkGray)));
        }
        let style = if crumb.active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(crumb.label.clone(), style));
    }
    spans.push(Span::styled(
        format!("   [{}]", phase_label(state.phase)),
        Style::default().fg(Color::Cyan),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn device_item<'a>(device: &Device, selected: Option<&Device>, under_cursor: bool) -> ListItem<'a> {
    let is_selected = selected.map(|s| s.same_identity(device)).unwrap_or(false);
    let marker = if is_selected { "● " } else { "  " };
    let mut style = Style::default();
    if is_selected {
        style = style.fg(Color::Green).add_modifier(Modifier::BOLD);
    }
    if under_cursor {
        style = style.add_modifier(Modifier::REVERSED);
    }
    ListItem::new(Line::from(vec![
        Span::styled(format!("{marker}{}", device.display_name), style),
        Span::styled(
            format!("  {}", device.identifier),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn draw_devices(f: &mut Frame, state: &UiState, view: &ViewState, area: Rect) {
    let selected = state.selected_device.as_ref();
    let focused = view.focus == Focus::Devices && view.new_password.is_none();
    let mut items = Vec::new();
    let mut index = 0usize;
    for (title, pool) in [
        ("Primary", &state.primary_devices),
        ("Secondary", &state.secondary_devices),
    ] {
        items.push(ListItem::new(Line::from(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))));
        if pool.is_empty() {
            items.push(ListItem::new(Line::from(Span::styled(
                "  (none)",
                Style::default().fg(Color::DarkGray),
            ))));
        }
        for device in pool.iter() {
            items.push(device_item(device, selected, focused && index == view.device_cursor));
            index += 1;
        }
    }

    let border = if focused { Color::Yellow } else { Color::Blue };
    let list = List::new(items).block(
        Block::default()
            .title(" Devices ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border)),
    );
    f.render_widget(list, area);
}

fn draw_workflow(f: &mut Frame, state: &UiState, view: &ViewState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(35),
            Constraint::Length(5),
            Constraint::Min(4),
        ])
        .split(area);

    // 目标输入
    let goal_focused = view.focus == Focus::Goal && view.new_password.is_none();
    let goal_title = if state.planning {
        " Goal (planning…) "
    } else {
        " Goal "
    };
    let goal = Paragraph::new(view.goal.as_str()).block(
        Block::default()
            .title(goal_title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if goal_focused { Color::Yellow } else { Color::Blue })),
    );
    f.render_widget(goal, chunks[0]);

    // 计划
    let mut plan_lines: Vec<Line> = Vec::new();
    if let Some(err) = &state.plan_error {
        plan_lines.extend(err.lines().map(error_line));
    }
    for (i, step) in state.plan_steps.iter().enumerate() {
        plan_lines.push(Line::from(vec![
            Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::Cyan)),
            Span::raw(step.rationale.clone()),
        ]));
        if !step.action.is_empty() {
            plan_lines.push(Line::from(Span::styled(
                format!("   $ {}", step.action),
                Style::default().fg(Color::Gray),
            )));
        }
    }
    let plan = Paragraph::new(Text::from(plan_lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().title(" Plan ").borders(Borders::ALL));
    f.render_widget(plan, chunks[1]);

    // 待批准命令
    let mut approval_lines: Vec<Line> = Vec::new();
    match (&state.approval, &state.executing_command) {
        (_, Some(command)) => {
            approval_lines.push(Line::from(format!("$ {command}")));
        }
        (Some(pending), None) => {
            approval_lines.push(Line::from(Span::styled(
                format!("$ {}", pending.command),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            approval_lines.push(Line::from(Span::styled(
                format!("on {}", pending.bound_device),
                Style::default().fg(Color::DarkGray),
            )));
        }
        (None, None) => approval_lines.push(Line::from(Span::styled(
            "Nothing awaiting approval.",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    if let Some(err) = &state.approve_error {
        approval_lines.push(error_line(err));
    }
    let approve_style = if state.can_approve {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let approval = Paragraph::new(Text::from(approval_lines)).block(
        Block::default()
            .title(" Approval ")
            .title_bottom(Line::from(Span::styled(
                format!(" [a] {} ", state.approve_label),
                approve_style,
            )))
            .borders(Borders::ALL),
    );
    f.render_widget(approval, chunks[2]);

    // 执行结果 / 文件树 / 会话日志
    let (title, lines) = if let Some(result) = &state.execution {
        let color = match result.outcome {
            Outcome::Ok => Color::Green,
            Outcome::Failed => Color::Red,
        };
        let mut lines = vec![Line::from(Span::styled(
            format!("{} on {} ({:?})", result.command, result.device, result.outcome),
            Style::default().fg(color),
        ))];
        lines.extend(
            result
                .output
                .lines()
                .take(MAX_OUTPUT_LINES)
                .map(|l| Line::from(l.to_string())),
        );
        (" Output ".to_string(), lines)
    } else if let Some(tree) = &state.file_tree {
        let lines = tree
            .entries
            .iter()
            .map(|e| match e.kind {
                FileKind::Dir => Line::from(Span::styled(
                    format!("{}/", e.name),
                    Style::default().fg(Color::Cyan),
                )),
                FileKind::File => Line::from(e.name.clone()),
            })
            .collect();
        (format!(" Files {}:{} ", tree.device, tree.path), lines)
    } else {
        let lines = state
            .session_log
            .as_deref()
            .unwrap_or("")
            .lines()
            .map(|l| Line::from(l.to_string()))
            .collect();
        (" Session log ".to_string(), lines)
    };
    let output = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(output, chunks[3]);
}

fn draw_status(f: &mut Frame, state: &UiState, view: &ViewState, area: Rect) {
    let mut lines = Vec::new();
    if let Some(buffer) = &view.new_password {
        lines.push(Line::from(vec![
            Span::styled("New password: ", Style::default().fg(Color::Yellow)),
            Span::raw("*".repeat(buffer.chars().count())),
            Span::styled("   Enter 确认 │ Esc 取消", Style::default().fg(Color::DarkGray)),
        ]));
    } else if let Some(banner) = &state.banner {
        lines.push(error_line(banner));
    } else if let Some(notice) = &state.notice {
        lines.push(Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Green))));
    } else {
        lines.push(Line::from(state.status_hint.clone()));
    }

    let hint = " ↑↓ 选择 │ Enter 选中设备 │ Tab 编辑目标 │ p 计划 │ a 批准 │ r 刷新设备 │ l 日志 │ f 文件 │ w 改密码 │ o 登出 │ Ctrl+Q 退出 ";
    let block = Block::default()
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL);
    f.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}
