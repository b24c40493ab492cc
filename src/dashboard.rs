//! Terminal telemetry dashboard: a single-screen snapshot of capture and
//! fan-out stats, sampled at 1 Hz. A modest collaborator — rendering detail
//! beyond the snapshot values themselves isn't load-bearing.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Terminal;
use tokio_util::sync::CancellationToken;

use crate::hub::Hub;
use crate::stats::Stats;

const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

pub struct DashboardContext {
    pub adapter: String,
    pub bind_addr: std::net::SocketAddr,
}

/// Drives the dashboard until the cancellation token fires or the user
/// presses `q`. Runs on a blocking task since crossterm's event polling is
/// synchronous.
pub fn run(stats: std::sync::Arc<Stats>, hub: Hub, ctx: DashboardContext, stop: CancellationToken) -> io::Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let start = Instant::now();
    let result = (|| -> io::Result<()> {
        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            let handle = tokio::runtime::Handle::current();
            let subscriber_count = handle.block_on(hub.subscriber_count());
            let snapshot = stats.snapshot(subscriber_count);

            terminal.draw(|frame| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(3), Constraint::Min(0)])
                    .split(frame.area());

                let header = Paragraph::new(vec![Line::from(format!(
                    "radar — adapter {} — listening on {}",
                    ctx.adapter, ctx.bind_addr
                ))])
                .block(Block::default().borders(Borders::ALL).title("status"));
                frame.render_widget(header, chunks[0]);

                let uptime = start.elapsed().as_secs();
                let body = Paragraph::new(vec![
                    Line::from(format!("uptime:        {uptime}s")),
                    Line::from(format!("bytes in:      {}", snapshot.bytes_received)),
                    Line::from(format!("messages:      {}", snapshot.messages_processed)),
                    Line::styled(
                        format!("parse errors:  {}", snapshot.parse_errors),
                        if snapshot.parse_errors > 0 {
                            Style::default().fg(Color::Yellow)
                        } else {
                            Style::default()
                        },
                    ),
                    Line::from(format!("subscribers:   {}", snapshot.subscriber_count)),
                    Line::from(""),
                    Line::from("press 'q' to quit"),
                ])
                .block(Block::default().borders(Borders::ALL).title("stats"));
                frame.render_widget(body, chunks[1]);
            })?;

            if event::poll(SAMPLE_PERIOD)? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Char('q') {
                        return Ok(());
                    }
                }
            }
        }
    })();

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_period_is_one_second() {
        assert_eq!(SAMPLE_PERIOD, Duration::from_secs(1));
    }
}
