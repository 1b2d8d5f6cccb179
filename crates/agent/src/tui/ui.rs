//! TUI rendering with ratatui
//!
//! Layout: connection status on top, the active hubs in the middle with the
//! selected hub's ports beside them, key help at the bottom.

use crate::agent::HubStatus;
use crate::handle::ConnectionState;
use protocol::{PortDevice, encode_frame};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};
use std::time::Duration;

use super::app::App;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);

    render_status_bar(frame, app, chunks[0]);
    render_hub_list(frame, app, body[0]);
    render_port_panel(frame, app.selected_hub(), body[1]);
    render_help_bar(frame, app.state(), chunks[2]);
}

fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected(_) => Color::Green,
        ConnectionState::Disconnected => Color::Red,
        ConnectionState::Paused => Color::Yellow,
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.state();
    let status_text = vec![
        Span::styled("Status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            state.to_string(),
            Style::default()
                .fg(state_color(state))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Uptime: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format_duration(app.uptime()), Style::default().fg(Color::Cyan)),
    ];

    let status = Paragraph::new(Line::from(status_text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" USB Insight Hub ")
                .title_alignment(Alignment::Center)
                .border_style(Style::default().fg(Color::Blue)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(status, area);
}

fn render_hub_list(frame: &mut Frame, app: &App, area: Rect) {
    let hubs = app.hubs();

    let header = Row::new(["USB2 path", "USB3 path", "Port", "Link"].map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows: Vec<Row> = hubs.iter().map(hub_row).collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(12),
            Constraint::Min(12),
            Constraint::Length(10),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Hubs ({}) ", hubs.len()))
            .border_style(Style::default().fg(Color::Blue)),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = TableState::default();
    if !hubs.is_empty() {
        state.select(Some(app.selected_index()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn hub_row(hub: &HubStatus) -> Row<'_> {
    let (link, color) = if hub.live {
        ("up", Color::Green)
    } else {
        ("down", Color::Red)
    };
    let endpoint = if hub.endpoint.is_empty() {
        "-"
    } else {
        hub.endpoint.as_str()
    };
    Row::new(vec![
        Cell::from(hub.path2.as_str()),
        Cell::from(hub.path3.as_deref().unwrap_or("-")),
        Cell::from(endpoint),
        Cell::from(link).style(Style::default().fg(color)),
    ])
}

fn port_line(port: usize, devices: &[PortDevice]) -> Line<'_> {
    let mut spans = vec![Span::styled(
        format!("CH{} ", port),
        Style::default().fg(Color::Yellow),
    )];
    if devices.is_empty() {
        spans.push(Span::styled("empty", Style::default().fg(Color::DarkGray)));
    }
    for device in devices {
        spans.push(Span::raw(format!(
            "[{} USB{}] ",
            device.short_name, device.generation
        )));
    }
    Line::from(spans)
}

fn render_port_panel(frame: &mut Frame, hub: Option<&HubStatus>, area: Rect) {
    let lines: Vec<Line> = match hub {
        Some(hub) => {
            let mut lines: Vec<Line> = hub
                .occupancy
                .iter()
                .map(|(port, devices)| port_line(port, devices))
                .collect();
            lines.push(Line::raw(""));
            lines.push(Line::styled(
                encode_frame(&hub.occupancy),
                Style::default().fg(Color::DarkGray),
            ));
            lines
        }
        None => vec![Line::styled(
            "No hub selected",
            Style::default().fg(Color::DarkGray),
        )],
    };

    let panel = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Ports ")
                .border_style(Style::default().fg(Color::Blue)),
        );
    frame.render_widget(panel, area);
}

fn render_help_bar(frame: &mut Frame, state: ConnectionState, area: Rect) {
    let pause = if state == ConnectionState::Paused {
        "Resume"
    } else {
        "Pause"
    };
    let help = Line::from(vec![
        Span::styled("p", Style::default().fg(Color::Cyan)),
        Span::raw(format!(" {}  ", pause)),
        Span::styled("↑/↓", Style::default().fg(Color::Cyan)),
        Span::raw(" Select  "),
        Span::styled("q", Style::default().fg(Color::Cyan)),
        Span::raw(" Quit"),
    ]);
    let bar = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(bar, area);
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{DeviceCategory, HubGeneration, PortOccupancy};
    use ratatui::{Terminal, backend::TestBackend};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn test_port_panel_lists_devices() {
        let mut occupancy = PortOccupancy::new();
        occupancy.push(
            2,
            PortDevice::new("HID-KB", DeviceCategory::Hid, HubGeneration::Usb2),
        );
        let hub = HubStatus {
            path2: "0014-0-1".to_string(),
            path3: None,
            endpoint: "COM5".to_string(),
            live: true,
            occupancy,
        };

        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal
            .draw(|frame| render_port_panel(frame, Some(&hub), frame.area()))
            .unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("CH2 [HID-KB USB2]"));
        assert!(text.contains("CH1 empty"));
    }
}
