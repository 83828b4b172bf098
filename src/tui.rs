// tui.rs

use crate::app::{App, EditField, EditorEvent, InputMode, TaskEditor, TaskListEvent};
use crate::sync::RefreshState;
use crate::todo::Task;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use ratatui::{
    Terminal,
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use std::{io, time::Duration};

pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()>
where
    std::io::Error: From<<B as Backend>::Error>,
{
    // Fetch online todos once on start, like pulling to refresh.
    app.list_event(TaskListEvent::Refresh);

    loop {
        app.drain_inbound();
        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                match app.input_mode {
                    InputMode::Normal => match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('a') => app.list_event(TaskListEvent::AddTask),
                        KeyCode::Enter | KeyCode::Char('e') => {
                            if let Some(task) = app.selected_task().cloned() {
                                app.list_event(TaskListEvent::OpenTask(task));
                            }
                        }
                        KeyCode::Char('d') => {
                            if let Some(task) = app.selected_task().cloned() {
                                app.list_event(TaskListEvent::DeleteTask(task));
                            }
                        }
                        KeyCode::Char(' ') => {
                            if let Some(task) = app.selected_task().cloned() {
                                let completed = !task.completed;
                                app.list_event(TaskListEvent::ToggleDone(task, completed));
                            }
                        }
                        KeyCode::Char('u') => {
                            app.list_event(TaskListEvent::UndoDelete);
                            app.message = None;
                        }
                        KeyCode::Char('r') => app.list_event(TaskListEvent::Refresh),
                        KeyCode::Char('x') => app.list_event(TaskListEvent::DismissError),
                        KeyCode::Down => app.select_next(),
                        KeyCode::Up => app.select_prev(),
                        _ => {}
                    },
                    InputMode::Editing => match key.code {
                        KeyCode::Esc => app.cancel_edit(),
                        KeyCode::Tab => app.edit_field = app.edit_field.next(),
                        KeyCode::Enter => app.editor_event(EditorEvent::Save),
                        KeyCode::Left | KeyCode::Right => {
                            if let Some(editor) = app.editor.as_ref() {
                                let r = if key.code == KeyCode::Left {
                                    editor.recurrence.prev()
                                } else {
                                    editor.recurrence.next()
                                };
                                app.editor_event(EditorEvent::RecurrenceChanged(r));
                            }
                        }
                        KeyCode::Backspace => {
                            if let Some(editor) = app.editor.as_ref() {
                                let mut text = field_text(editor, app.edit_field);
                                text.pop();
                                let ev = field_event(app.edit_field, text);
                                app.editor_event(ev);
                            }
                        }
                        KeyCode::Char(c) => {
                            if let Some(editor) = app.editor.as_ref() {
                                let mut text = field_text(editor, app.edit_field);
                                text.push(c);
                                let ev = field_event(app.edit_field, text);
                                app.editor_event(ev);
                            }
                        }
                        _ => {}
                    },
                }
            }
        }
    }
}

fn field_text(editor: &TaskEditor, field: EditField) -> String {
    match field {
        EditField::Title => editor.title.clone(),
        EditField::Description => editor.description.clone(),
        EditField::Date => editor.date.clone(),
        EditField::Time => editor.time.clone(),
    }
}

fn field_event(field: EditField, text: String) -> EditorEvent {
    match field {
        EditField::Title => EditorEvent::TitleChanged(text),
        EditField::Description => EditorEvent::DescriptionChanged(text),
        EditField::Date => EditorEvent::DateChanged(text),
        EditField::Time => EditorEvent::TimeChanged(text),
    }
}

fn task_line(task: &Task, selected: bool) -> Line<'static> {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let mut title_style = if task.completed {
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };
    if selected {
        title_style = title_style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
    }

    let mut spans = vec![
        Span::raw(if selected { ">> " } else { "   " }),
        Span::raw(format!("{} ", check)),
        Span::styled(task.title.clone(), title_style),
    ];
    if let (Some(date), Some(time)) = (task.date.as_ref(), task.time.as_ref()) {
        spans.push(Span::styled(
            format!("  {} {}", date, time),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(r) = task.recurrence.as_deref().filter(|r| *r != "None") {
        spans.push(Span::styled(format!("  ({})", r), Style::default().fg(Color::Gray)));
    }
    if task.is_remote {
        spans.push(Span::styled("  [online]", Style::default().fg(Color::Magenta)));
    }
    Line::from(spans)
}

fn status_line(state: &RefreshState) -> Line<'static> {
    if state.is_loading() {
        return Line::from(Span::styled(
            "Refreshing online todos...",
            Style::default().fg(Color::Yellow),
        ));
    }
    match state.error() {
        Some(msg) => Line::from(Span::styled(
            format!("{}  (r: retry, x: dismiss)", msg),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None => Line::from(""),
    }
}

fn ui(f: &mut ratatui::Frame<'_>, app: &App) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status
            Constraint::Min(5),    // main
            Constraint::Length(1), // message
            Constraint::Length(1), // help
        ])
        .split(size);

    f.render_widget(Paragraph::new(status_line(&app.refresh)), chunks[0]);

    match (app.input_mode, app.editor.as_ref()) {
        (InputMode::Editing, Some(editor)) => {
            let caret = "_";
            let field = |label: &str, value: String, which: EditField| {
                let focused = app.edit_field == which;
                let style = if focused {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{:<13}", label), Style::default().fg(Color::Gray)),
                    Span::styled(
                        if focused { format!("{}{}", value, caret) } else { value },
                        style,
                    ),
                ])
            };
            let lines = vec![
                field("Title", editor.title.clone(), EditField::Title),
                field("Description", editor.description.clone(), EditField::Description),
                field(
                    "Date",
                    editor.date.clone(),
                    EditField::Date,
                ),
                field(
                    "Time",
                    editor.time.clone(),
                    EditField::Time,
                ),
                Line::from(vec![
                    Span::styled(format!("{:<13}", "Repeat"), Style::default().fg(Color::Gray)),
                    Span::styled(
                        format!("< {} >", editor.recurrence),
                        Style::default().fg(Color::Cyan),
                    ),
                ]),
                Line::from(""),
                Line::from(Span::styled(
                    "Date like \"Jan 05, 2025\", time like \"08:30 AM\"",
                    Style::default().fg(Color::DarkGray),
                )),
            ];
            let title = if editor.editing_id().is_some() { "Edit Task" } else { "Add Task" };
            let form = Paragraph::new(lines)
                .block(Block::default().borders(Borders::ALL).title(title))
                .wrap(Wrap { trim: false });
            f.render_widget(form, chunks[1]);
        }
        _ => {
            let items: Vec<ListItem> = if app.tasks.is_empty() {
                vec![ListItem::new("No todos yet. Press 'a' to add one.")]
            } else {
                app.tasks
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ListItem::new(task_line(t, i == app.selected)))
                    .collect()
            };
            let list = List::new(items).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Todos ({})", app.tasks.len())),
            );
            f.render_widget(list, chunks[1]);
        }
    }

    if let Some((ref msg, ref action)) = app.message {
        let text = match action {
            Some(a) => format!("{}  [u: {}]", msg, a),
            None => msg.clone(),
        };
        let message = Paragraph::new(text)
            .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center);
        f.render_widget(message, chunks[2]);
    }

    let help = match app.input_mode {
        InputMode::Normal if app.can_undo() => {
            "a add | enter edit | space done | d delete | u undo | r refresh | x dismiss | q quit"
        }
        InputMode::Normal => {
            "a add | enter edit | space done | d delete | r refresh | x dismiss | q quit"
        }
        InputMode::Editing => "tab next field | <-/-> repeat | enter save | esc cancel",
    };
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        chunks[3],
    );
}
