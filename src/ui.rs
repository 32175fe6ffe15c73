use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode, PanelView};
use crate::events::{NoticeLevel, TreeKind};
use crate::trees::{RowKind, TreeRow};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const SELECTED: Color = Color::Rgb(24, 36, 58);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if let Some(request) = app.confirmation() {
        render_confirm_modal(frame, &request.message, &request.accept, &request.reject);
    } else if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " torque ", Color::Black, ACCENT, PL_A);
    let profile = app
        .active_profile()
        .map(|profile| {
            format!(
                " {}  {}/{} ",
                compact_text(&profile.name, 18),
                compact_text(profile.account_label(), 18),
                compact_text(&profile.space, 18)
            )
        })
        .unwrap_or_else(|| " no active profile ".to_string());
    push_powerline_segment(&mut spans, profile, Color::White, PL_A, PL_C);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.active_tree().title().to_ascii_lowercase()),
        Color::White,
        PL_C,
        BG,
    );

    let left = Line::from(spans);
    let right = app
        .last_refresh(app.active_tree())
        .map(|at| format!("updated {at} "))
        .unwrap_or_default();
    let right_width = right.chars().count() as u16;
    if right_width == 0 || right_width + 20 >= area.width {
        frame.render_widget(Paragraph::new(left).style(Style::default().bg(BG)), area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(Paragraph::new(left).style(Style::default().bg(BG)), chunks[0]);
    frame.render_widget(
        Paragraph::new(right)
            .style(Style::default().bg(BG).fg(MUTED))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let trees = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(columns[0]);
    for (tree, slot) in TreeKind::ALL.into_iter().zip(trees.iter()) {
        let focused = app.mode() == InputMode::Normal && app.active_tree() == tree;
        render_tree(frame, *slot, app, tree, focused);
    }

    match app.panel() {
        Some(view) => render_panel(frame, columns[1], view, app.mode() == InputMode::Form),
        None => render_intro(frame, columns[1]),
    }
}

fn render_tree(frame: &mut Frame, area: Rect, app: &App, tree: TreeKind, focused: bool) {
    let rows = app.visible_rows(tree);
    let block = Block::default()
        .title(format!("{} ({})", tree.title(), top_level_count(&rows)))
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL));

    let table_rows = rows.iter().map(|row| {
        let label_style = match row.kind {
            RowKind::ProfileDetail => Style::default().fg(MUTED),
            RowKind::LoginPrompt => Style::default().fg(WARN),
            _ if row.active => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            _ => Style::default().fg(Color::White),
        };
        Row::new(vec![
            Cell::from(tree_label(row)).style(label_style),
            Cell::from(row.description.clone().unwrap_or_default())
                .style(Style::default().fg(MUTED)),
        ])
    });

    let table = Table::new(
        table_rows,
        [Constraint::Percentage(60), Constraint::Percentage(40)],
    )
    .block(block)
    .column_spacing(1)
    .row_highlight_style(Style::default().bg(SELECTED).add_modifier(Modifier::BOLD))
    .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    if focused {
        state.select(app.selected_index(tree));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn top_level_count(rows: &[TreeRow]) -> usize {
    rows.iter()
        .filter(|row| !matches!(row.kind, RowKind::ProfileDetail | RowKind::LoginPrompt))
        .count()
}

fn tree_label(row: &TreeRow) -> String {
    match row.kind {
        RowKind::ProfileDetail => format!("  {}", row.label),
        RowKind::LoginPrompt => format!("󰍂 {}", row.label),
        _ if row.expandable => format!("▸ {}", row.label),
        _ => row.label.clone(),
    }
}

fn render_panel(frame: &mut Frame, area: Rect, view: &PanelView, focused: bool) {
    let content = view.content();
    let mut lines = vec![
        Line::from(Span::styled(
            content.heading.clone(),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    if content.loading {
        lines.push(Line::from(Span::styled(
            "Loading…",
            Style::default().fg(MUTED),
        )));
    }
    if let Some(notice) = &content.notice {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(ERROR),
        )));
        lines.push(Line::from(""));
    }

    for section in &content.sections {
        lines.push(Line::from(Span::styled(
            section.heading.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )));
        for (key, value) in &section.lines {
            lines.push(Line::from(vec![
                Span::styled(format!("  {key}: "), Style::default().fg(MUTED)),
                Span::styled(value.clone(), Style::default().fg(Color::White)),
            ]));
        }
        lines.push(Line::from(""));
    }

    for (index, field) in view.fields().iter().enumerate() {
        let is_focused = focused && view.focus() == index;
        let value = if field.masked {
            "•".repeat(field.value.chars().count())
        } else {
            field.value.clone()
        };
        let marker = if field.required { "*" } else { " " };
        let value_style = if is_focused {
            Style::default().fg(Color::Black).bg(ACCENT)
        } else {
            Style::default().fg(Color::White).bg(SELECTED)
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{marker}{:<22}", compact_text(&field.label, 22)),
                Style::default().fg(MUTED),
            ),
            Span::styled(
                format!(" {value}{} ", if is_focused { "▏" } else { "" }),
                value_style,
            ),
        ]));
    }

    if !content.actions.is_empty() {
        lines.push(Line::from(""));
        let mut buttons = Vec::new();
        for (offset, action) in content.actions.iter().enumerate() {
            let is_focused = focused && view.focus() == view.fields().len() + offset;
            let style = if is_focused {
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White).bg(PL_B)
            };
            buttons.push(Span::styled(format!(" {} ", action.label), style));
            buttons.push(Span::raw("  "));
        }
        lines.push(Line::from(buttons));
    }

    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(content.kind.title())
                .borders(Borders::ALL)
                .border_style(if focused {
                    Style::default().fg(ACCENT)
                } else {
                    Style::default().fg(MUTED)
                })
                .style(Style::default().bg(PANEL)),
        );
    frame.render_widget(panel, area);
}

fn render_intro(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            "Torque environments",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Enter on a blueprint launches an environment."),
        Line::from("Enter on an environment shows its details."),
        Line::from("l adds a profile, ? lists every key."),
    ];
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(MUTED))
                .style(Style::default().bg(PANEL)),
        ),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let pending = app.confirmation();
    let (mode_label, mode_bg) = match app.mode() {
        InputMode::Normal => (" 󰘳 nrm ", PL_A),
        InputMode::Form => (" 󰏫 form ", PL_C),
    };
    let (status_text, status_fg, status_bg) = match pending {
        Some(request) => (
            format!("{} (y/n)", request.message),
            Color::Black,
            WARN,
        ),
        None => match app.status_level() {
            NoticeLevel::Info => (app.status().to_string(), Color::White, PL_B),
            NoticeLevel::Error => (app.status().to_string(), Color::Black, ERROR),
        },
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, Color::White, mode_bg, status_bg);
    let width_hint = area.width.saturating_sub(14).max(24) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&status_text, width_hint)),
        status_fg,
        status_bg,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_confirm_modal(frame: &mut Frame, message: &str, accept: &str, reject: &str) {
    let area = centered_rect(60, 24, frame.area());
    frame.render_widget(Clear, area);
    let lines = vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(vec![
            Span::styled(
                format!(" y: {accept} "),
                Style::default().fg(Color::Black).bg(ACCENT),
            ),
            Span::raw("  "),
            Span::styled(
                format!(" n: {reject} "),
                Style::default().fg(Color::White).bg(PL_B),
            ),
        ]),
    ];
    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(WARN))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "torque-deck help  mode:{}  tree:{}",
            help_mode_label(app.mode()),
            app.active_tree().title()
        )),
        Line::from(""),
    ];
    for line in help_lines() {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_lines() -> [&'static str; 10] {
    [
        "Trees: Tab/→ next  BackTab/← previous  j/k move  g/G first/last",
        "Rows: Enter open or expand  r refresh  d make default  x remove or end",
        "Profiles: l login to Torque",
        "Panel: p or Ctrl+t focus  Esc close",
        "",
        "Form: Tab/↓ next field  BackTab/↑ previous field  Enter submit",
        "Form: Ctrl+r reload  Ctrl+e end environment  Ctrl+t back to trees",
        "",
        "Prompts: y confirm  n cancel",
        "General: ? help  q or Ctrl+c quit",
    ]
}

fn help_mode_label(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "normal",
        InputMode::Form => "form",
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
