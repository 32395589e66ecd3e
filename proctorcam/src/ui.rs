//! UI rendering for the TUI.

use proctorcam_core::upload::{CHEATING_DETECTED, NO_CHEATING_DETECTED};
use proctorcam_core::{AnalysisResult, ChatMessage, ChatRole, UploadStatus, VideoSession};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{ActiveTab, App, InputMode};

/// Border color for the video details block
const BORDER_INFO: Color = Color::Rgb(0, 150, 150);
/// Border color for the chat block
const BORDER_MESSAGES: Color = Color::Rgb(80, 160, 80);
/// Border color for statistics cards
const BORDER_CARD: Color = Color::Rgb(180, 100, 180);
/// Label color for attributes
const LABEL_COLOR: Color = Color::Rgb(100, 180, 180);
/// Verdict colors
const VERDICT_CLEAN: Color = Color::Rgb(50, 205, 50);
const VERDICT_FLAGGED: Color = Color::Rgb(255, 80, 80);
/// Dim gray for secondary text
const DIM: Color = Color::Rgb(128, 128, 128);

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(2), // Tabs
        Constraint::Min(5),    // Body
        Constraint::Length(1), // Footer
    ])
    .split(frame.area());

    render_tab_header(frame, app, chunks[0]);

    match app.active_tab {
        ActiveTab::Upload => render_upload_view(frame, app, chunks[1]),
        ActiveTab::Analysis => render_analysis_view(frame, app, chunks[1]),
        ActiveTab::Chat => render_chat_view(frame, app, chunks[1]),
    }

    render_footer(frame, app, chunks[2]);
}

/// Render the tab bar with the app name and backend URL.
fn render_tab_header(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::horizontal([
        Constraint::Length(13), // App name
        Constraint::Min(1),     // Tabs
        Constraint::Length(app.backend_url.len() as u16 + 2),
    ])
    .split(area);

    let app_name = Paragraph::new(" proctorcam").style(Style::default().fg(Color::Cyan).bold());
    frame.render_widget(app_name, chunks[0]);

    let active_style = Style::default()
        .fg(Color::Cyan)
        .bold()
        .add_modifier(Modifier::UNDERLINED);
    let inactive_style = Style::default().fg(Color::DarkGray);
    let style_for = |tab: ActiveTab| {
        if app.active_tab == tab {
            active_style
        } else {
            inactive_style
        }
    };

    let tabs = Line::from(vec![
        Span::styled(" Upload ", style_for(ActiveTab::Upload)),
        Span::styled("  ", Style::default()),
        Span::styled(" Analysis ", style_for(ActiveTab::Analysis)),
        Span::styled("  ", Style::default()),
        Span::styled(" Chat ", style_for(ActiveTab::Chat)),
    ]);

    let tabs_para = Paragraph::new(tabs).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(tabs_para, chunks[1]);

    let url = Paragraph::new(app.backend_url.as_str())
        .style(Style::default().fg(DIM))
        .alignment(Alignment::Right)
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(url, chunks[2]);
}

// ========== Upload View ==========

fn render_upload_view(frame: &mut Frame, app: &App, area: Rect) {
    let path_height = if app.input_mode == InputMode::Path {
        3
    } else {
        0
    };
    let chunks = Layout::vertical([
        Constraint::Length(9),           // Video details
        Constraint::Length(3),           // Status
        Constraint::Length(path_height), // Path input
        Constraint::Min(0),
    ])
    .split(area);

    render_video_details(frame, app, chunks[0]);
    render_status(frame, app, chunks[1]);

    if app.input_mode == InputMode::Path {
        let input = Paragraph::new(Line::from(vec![
            Span::raw(app.path_input.as_str()),
            Span::styled("█", Style::default().fg(Color::Cyan)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(" Open video "),
        );
        frame.render_widget(input, chunks[2]);
    }
}

fn render_video_details(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_INFO))
        .title(" Video ");

    let Some(video) = &app.session.video else {
        let placeholder = Paragraph::new("No video selected. Press o to open a file.")
            .style(Style::default().fg(DIM))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let label = Style::default().fg(LABEL_COLOR);
    let path = app
        .selected_path
        .as_ref()
        .map(|p| format_path(&p.display().to_string()))
        .unwrap_or_default();
    let preview = app
        .preview_path
        .as_ref()
        .map(|p| format_path(&p.display().to_string()))
        .unwrap_or_else(|| "none".to_string());

    let lines = vec![
        Line::from(vec![
            Span::styled("Name:     ", label),
            Span::raw(video.name.clone()).bold(),
        ]),
        Line::from(vec![
            Span::styled("Size:     ", label),
            Span::raw(format!("{:.2} MB", video.size_mb)),
        ]),
        Line::from(vec![
            Span::styled("Duration: ", label),
            format_video_duration(video),
        ]),
        Line::from(vec![
            Span::styled("Upload:   ", label),
            upload_status_span(video.status),
        ]),
        Line::from(vec![
            Span::styled("Path:     ", label),
            Span::styled(path, Style::default().fg(DIM)),
        ]),
        Line::from(vec![
            Span::styled("Preview:  ", label),
            Span::styled(preview, Style::default().fg(DIM)),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let message = app.session.status_message.as_str();
    let style = if message == CHEATING_DETECTED {
        Style::default().fg(VERDICT_FLAGGED).bold()
    } else if message == NO_CHEATING_DETECTED {
        Style::default().fg(VERDICT_CLEAN).bold()
    } else if message.starts_with("Upload failed") {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let mut spans = Vec::new();
    if app.session.busy {
        spans.push(Span::styled(
            format!("{} ", spinner_frame(app.animation_frame)),
            Style::default().fg(Color::Cyan),
        ));
    }
    spans.push(Span::styled(message.to_string(), style));

    let status = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Status "),
    );
    frame.render_widget(status, area);
}

fn format_video_duration(video: &VideoSession) -> Span<'static> {
    match video.duration_seconds {
        Some(secs) => Span::raw(format_duration(secs)),
        None => Span::styled("reading...", Style::default().fg(DIM)),
    }
}

fn upload_status_span(status: UploadStatus) -> Span<'static> {
    let color = match status {
        UploadStatus::Idle => DIM,
        UploadStatus::Uploading => Color::Cyan,
        UploadStatus::Succeeded => VERDICT_CLEAN,
        UploadStatus::Failed => Color::Yellow,
    };
    Span::styled(status.as_str(), Style::default().fg(color))
}

// ========== Analysis View ==========

fn render_analysis_view(frame: &mut Frame, app: &App, area: Rect) {
    let Some(analysis) = &app.session.analysis else {
        let message = if app.session.busy {
            format!(
                "{} Waiting for analysis...",
                spinner_frame(app.animation_frame)
            )
        } else {
            "No analysis yet. Upload a video to see statistics.".to_string()
        };
        let placeholder = Paragraph::new(message)
            .style(Style::default().fg(DIM))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Analysis "));
        frame.render_widget(placeholder, area);
        return;
    };

    let chunks = Layout::vertical([
        Constraint::Length(4), // Cards
        Constraint::Length(4), // Verdict and reasons
        Constraint::Min(3),    // Raw counts
    ])
    .split(area);

    render_stat_cards(frame, analysis, chunks[0]);
    render_verdict(frame, analysis, chunks[1]);
    render_raw_counts(frame, analysis, chunks[2]);
}

fn render_stat_cards(frame: &mut Frame, analysis: &AnalysisResult, area: Rect) {
    let stats = &analysis.statistics;
    let cards = [
        ("Processing", stats.processing_ratio.clone()),
        ("Face Detection", stats.face_detection_rate.clone()),
        ("Lookaway", stats.lookaway_ratio.clone()),
        (
            "Frames",
            format!("{} / {}", stats.processed_frames, stats.total_frames),
        ),
        (
            "Multiple Faces",
            if stats.multiple_faces_detected {
                "Yes".to_string()
            } else {
                "No".to_string()
            },
        ),
    ];

    let chunks = Layout::horizontal([Constraint::Ratio(1, cards.len() as u32); 5]).split(area);

    for (i, (title, value)) in cards.into_iter().enumerate() {
        let flagged = title == "Multiple Faces" && stats.multiple_faces_detected;
        let value_style = if flagged {
            Style::default().fg(VERDICT_FLAGGED).bold()
        } else {
            Style::default().fg(Color::White).bold()
        };
        let card = Paragraph::new(Line::from(Span::styled(value, value_style)))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(BORDER_CARD))
                    .title(format!(" {} ", title)),
            );
        frame.render_widget(card, chunks[i]);
    }
}

fn render_verdict(frame: &mut Frame, analysis: &AnalysisResult, area: Rect) {
    let verdict = match analysis.cheating_detected {
        Some(true) => Span::styled(CHEATING_DETECTED, Style::default().fg(VERDICT_FLAGGED).bold()),
        Some(false) => Span::styled(
            NO_CHEATING_DETECTED,
            Style::default().fg(VERDICT_CLEAN).bold(),
        ),
        None => Span::styled("No verdict", Style::default().fg(DIM)),
    };

    let mut header = vec![verdict];
    if let Some(at) = &analysis.analyzed_at {
        header.push(Span::styled(
            format!("  analyzed {}", at),
            Style::default().fg(DIM),
        ));
    }

    let mut lines = vec![Line::from(header)];
    if !analysis.reasons.is_empty() {
        lines.push(Line::from(Span::raw(analysis.reasons.join("; "))));
    }

    let para = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Verdict "),
    );
    frame.render_widget(para, area);
}

fn render_raw_counts(frame: &mut Frame, analysis: &AnalysisResult, area: Rect) {
    let header = Row::new(vec![Cell::from("Counter"), Cell::from("Value")])
        .style(Style::default().fg(LABEL_COLOR).bold());

    let rows: Vec<Row> = analysis
        .raw_counts
        .iter()
        .map(|(name, value)| Row::new(vec![Cell::from(name.clone()), Cell::from(value.to_string())]))
        .collect();

    let table = Table::new(rows, [Constraint::Min(24), Constraint::Length(12)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(" Raw Counts "),
        );
    frame.render_widget(table, area);
}

// ========== Chat View ==========

fn render_chat_view(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Min(3),    // Messages
        Constraint::Length(1), // Typing indicator
        Constraint::Length(3), // Input
    ])
    .split(area);

    render_chat_messages(frame, app, chunks[0]);

    if app.conversation.bot_typing() {
        let dots = ".".repeat((app.animation_frame / 3 % 4) as usize);
        let typing = Paragraph::new(format!(" Bot is typing{}", dots))
            .style(Style::default().fg(DIM).add_modifier(Modifier::ITALIC));
        frame.render_widget(typing, chunks[1]);
    }

    let focused = app.input_mode == InputMode::Chat;
    let mut input_spans = vec![Span::raw(app.conversation.input.clone())];
    if focused {
        input_spans.push(Span::styled("█", Style::default().fg(Color::Cyan)));
    }
    let input = Paragraph::new(Line::from(input_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(if focused {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(DIM)
            })
            .title(" Message "),
    );
    frame.render_widget(input, chunks[2]);
}

fn render_chat_messages(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_MESSAGES))
        .title(format!(" Chat ({}) ", app.conversation.messages.len()));

    if app.conversation.messages.is_empty() {
        let placeholder = Paragraph::new("Ask the assistant about your upload. Press i to type.")
            .style(Style::default().fg(DIM))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let width = area.width.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .conversation
        .messages
        .iter()
        .flat_map(|m| format_chat_message(m, width))
        .collect();

    let visible = area.height.saturating_sub(2) as usize;
    let offset = chat_scroll_offset(lines.len(), visible, app.chat_scroll);

    let para = Paragraph::new(lines)
        .block(block)
        .scroll((offset, 0));
    frame.render_widget(para, area);
}

/// Top line to show: pinned to the bottom unless scrolled up, clamped to
/// what a `u16` scroll offset can address.
fn chat_scroll_offset(total: usize, visible: usize, scrolled_up: u16) -> u16 {
    let offset = total
        .saturating_sub(visible)
        .saturating_sub(scrolled_up as usize);
    u16::try_from(offset).unwrap_or(u16::MAX)
}

fn format_chat_message(message: &ChatMessage, width: usize) -> Vec<Line<'static>> {
    let (author, color) = match message.role {
        ChatRole::User => ("You", Color::Cyan),
        ChatRole::Bot => ("Bot", Color::Green),
    };

    let mut header = vec![
        Span::styled(format!("{} ", message.timestamp), Style::default().fg(DIM)),
        Span::styled(author, Style::default().fg(color).bold()),
    ];
    if let Some(tag) = &message.tag {
        header.push(Span::styled(format!(" [{}]", tag), Style::default().fg(DIM)));
    }

    let mut lines = vec![Line::from(header)];
    for line in wrap_text(&message.content, width.saturating_sub(2)) {
        lines.push(Line::from(format!("  {}", line)));
    }
    lines.push(Line::from(""));
    lines
}

// ========== Footer ==========

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let key = Style::default().fg(Color::Yellow);

    let mut footer_spans = match app.input_mode {
        InputMode::Path => vec![
            Span::styled(" Enter", key),
            Span::raw(" open  "),
            Span::styled("Esc", key),
            Span::raw(" cancel  "),
        ],
        InputMode::Chat => vec![
            Span::styled(" Enter", key),
            Span::raw(" send  "),
            Span::styled("Esc", key),
            Span::raw(" done  "),
        ],
        InputMode::Normal => {
            let mut spans = vec![
                Span::styled(" Tab", key),
                Span::raw(" switch  "),
                Span::styled("o", key),
                Span::raw(" open  "),
            ];
            if app.session.busy {
                spans.push(Span::styled("u", Style::default().fg(DIM)));
                spans.push(Span::styled(" uploading  ", Style::default().fg(DIM)));
            } else {
                spans.push(Span::styled("u", key));
                spans.push(Span::raw(" upload  "));
            }
            if app.active_tab == ActiveTab::Chat {
                spans.extend([
                    Span::styled("i", key),
                    Span::raw(" type  "),
                    Span::styled("c", key),
                    Span::raw(" clear  "),
                    Span::styled("j/k", key),
                    Span::raw(" scroll  "),
                ]);
            }
            spans.extend([Span::styled("q", key), Span::raw(" quit  ")]);
            spans
        }
    };

    if let Some(notice) = &app.notice {
        footer_spans.push(Span::raw("│ "));
        footer_spans.push(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(footer_spans)), area);
}

// ========== Helpers ==========

fn spinner_frame(frame: u64) -> &'static str {
    SPINNER[(frame as usize) % SPINNER.len()]
}

/// Format a duration in seconds as `m:ss` (or `h:mm:ss`).
fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Replace $HOME with ~.
fn format_path(path: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    if !home.is_empty() && path.starts_with(&home) {
        format!("~{}", &path[home.len()..])
    } else {
        path.to_string()
    }
}

/// Break text into lines of at most `width` characters, on word boundaries
/// where possible.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            // Hard-split words longer than a whole line
            while word.chars().count() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
