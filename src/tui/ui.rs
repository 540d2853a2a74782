use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, View, ViewMode};
use crate::sync::SyncState;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Main area
            Constraint::Length(1), // Status line
        ])
        .split(frame.area());

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(app.config.feed_list_width),
            Constraint::Length(app.config.article_list_width),
            Constraint::Min(0),
        ])
        .split(chunks[0]);

    render_left_pane(frame, app, main_chunks[0]);
    render_article_list(frame, app, main_chunks[1]);
    render_reader(frame, app, main_chunks[2]);
    render_status(frame, app, chunks[1]);

    if app.show_help {
        render_help(frame);
    }
}

fn render_left_pane(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = match app.view_mode {
        ViewMode::Feeds => app
            .feeds
            .iter()
            .map(|feed| {
                let unread = app.unread_counts.get(&feed.id).copied().unwrap_or(0);
                let label = if unread > 0 {
                    format!("{} ({})", feed.title, unread)
                } else {
                    feed.title.clone()
                };
                let style = if unread > 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Line::from(Span::styled(label, style)))
            })
            .collect(),
        ViewMode::Tags => app
            .tags
            .iter()
            .map(|tag| ListItem::new(format!("# {}", tag.name)))
            .collect(),
        ViewMode::Categories => app
            .categories
            .iter()
            .map(|category| {
                let icon = category.icon.as_deref().unwrap_or("•");
                ListItem::new(format!("{} {}", icon, category.name))
            })
            .collect(),
    };

    let title = format!(" {} ", app.view_mode.label());
    let border_style = if app.view == View::Feeds {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if app.left_pane_len() > 0 {
        state.select(Some(app.selected_feed));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_article_list(frame: &mut Frame, app: &App, area: Rect) {
    let articles = app.filtered_articles();

    let items: Vec<ListItem> = articles
        .iter()
        .map(|article| {
            let style = if article.is_read {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };

            let star = if article.is_favorite { "★ " } else { "  " };
            let feed = article.feed_title.as_deref().unwrap_or("Unknown");

            let line = Line::from(vec![
                Span::styled(star, Style::default().fg(Color::Yellow)),
                Span::styled(format!("[{feed}] "), Style::default().fg(Color::Blue)),
                Span::styled(&article.title, style),
            ]);

            ListItem::new(line)
        })
        .collect();

    let title = format!(" Articles [{}] ", app.filter.label());
    let border_style = if app.view == View::Articles {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !articles.is_empty() {
        state.select(Some(app.selected_article));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_reader(frame: &mut Frame, app: &App, area: Rect) {
    let border_style = if app.view == View::Reader {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };

    let (title, body) = match (app.selected_article(), &app.reader_text) {
        (Some(article), Some(text)) => {
            let width = area.width.saturating_sub(2).max(20) as usize;
            let date = article.published_at.format("%b %d, %Y");
            let mut body = format!(
                "{}\n{} · {}\n\n",
                article.title,
                article.author.as_deref().unwrap_or("Unknown"),
                date
            );
            body.push_str(&textwrap::fill(text, width));
            (format!(" {} ", article.title), body)
        }
        (Some(article), None) => (
            " Reader ".to_string(),
            format!("{}\n\nPress Enter to read", article.title),
        ),
        _ => (" Reader ".to_string(), String::new()),
    };

    let paragraph = Paragraph::new(body)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.reader_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let state_label = match &app.sync_state {
        SyncState::Unauthenticated => "offline",
        SyncState::Connecting => "connecting...",
        SyncState::Authenticated => "connected",
        SyncState::Syncing => "syncing...",
        SyncState::AuthFailed(_) => "auth failed",
    };

    let left = if app.is_refreshing {
        format!("{} (refreshing)", app.status_message)
    } else {
        app.status_message.clone()
    };

    let line = Line::from(vec![
        Span::styled(left, Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(
            format!("[{state_label}] ? for help"),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 60, frame.area());

    let help_text = vec![
        "j/k       move selection",
        "Enter     open feed / article",
        "Esc       go back",
        "Tab       cycle feeds / tags / categories",
        "f         cycle article filter",
        "",
        "s         sync from relays",
        "p         publish subscriptions + read status",
        "r         refresh feeds",
        "c         reconnect",
        "",
        "m         toggle read",
        "v         toggle favorite",
        "o         open in browser",
        "D         delete feed",
        "",
        "q         quit",
    ]
    .join("\n");

    let paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}
