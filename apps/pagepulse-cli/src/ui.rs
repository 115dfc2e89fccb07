use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pagepulse_types::{
    events::{EventPayload, MetricEvent},
    metrics::{MetricKind, MetricResult, Rating},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(MetricEvent),
}

/// Everything the dashboard shows, folded from bus events.
#[derive(Debug, Default)]
struct Dashboard {
    logs: VecDeque<String>,
    metrics: BTreeMap<MetricKind, MetricResult>,
    slowest_resource: Option<(String, f64)>,
    status: String,
}

impl Dashboard {
    fn new() -> Self {
        Self {
            status: String::from("대기 중"),
            ..Self::default()
        }
    }

    fn apply(&mut self, event: &MetricEvent) {
        self.status = summarize_status(event);
        match &event.payload {
            EventPayload::Metric(metric) => {
                self.metrics.insert(metric.name, metric.clone());
            }
            EventPayload::Resources(resources) => {
                self.slowest_resource = resources
                    .first()
                    .map(|resource| (resource.metric.id.clone(), resource.metric.value));
            }
            _ => {}
        }
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(format_event(event));
    }
}

pub fn run(receiver: Receiver<UiMessage>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    summary: &str,
) -> Result<()> {
    let mut dashboard = Dashboard::new();
    let mut finished = false;

    loop {
        while !finished {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => dashboard.apply(&event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    dashboard.status = String::from("측정 완료");
                    finished = true;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(11),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "PagePulse 상태",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(dashboard.status.clone()),
                Span::raw("  "),
                Span::styled("시나리오:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" 를 눌러 종료"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("요약"));
            f.render_widget(header, chunks[0]);

            let mut rows: Vec<ListItem> = dashboard
                .metrics
                .values()
                .map(|metric| {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            format!("{:<20}", metric.name.as_str()),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(format!("{:>10.1} ms  ", metric.value)),
                        Span::styled(metric.rating.as_str(), rating_style(metric.rating)),
                    ]))
                })
                .collect();
            if let Some((url, value)) = &dashboard.slowest_resource {
                rows.push(ListItem::new(format!("가장 느린 리소스: {url} ({value:.1} ms)")));
            }
            let metrics = List::new(rows).block(Block::default().borders(Borders::ALL).title("지표"));
            f.render_widget(metrics, chunks[1]);

            let items: Vec<ListItem> = dashboard
                .logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();

            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("최근 이벤트"))
                .highlight_style(Style::default().fg(Color::Yellow));

            f.render_widget(list, chunks[2]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn rating_style(rating: Rating) -> Style {
    let color = match rating {
        Rating::Good => Color::Green,
        Rating::NeedsImprovement => Color::Yellow,
        Rating::Poor => Color::Red,
    };
    Style::default().fg(color)
}

fn summarize_status(event: &MetricEvent) -> String {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => {
            format!("라이프사이클: {:?}", lifecycle.phase)
        }
        EventPayload::Metric(metric) => {
            format!("{} 측정됨 ({})", metric.name, metric.rating.as_str())
        }
        EventPayload::Resources(resources) => format!("리소스 {}개 수집", resources.len()),
        EventPayload::Summary(summary) if summary.fallback => "요약 (대체 측정)".to_string(),
        EventPayload::Summary(_) => "요약 완료".to_string(),
    }
}

fn format_event(event: &MetricEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Metric(metric) => format!(
            "[{}] {} value={:.1} rating={}",
            timestamp,
            metric.name,
            metric.value,
            metric.rating.as_str()
        ),
        EventPayload::Resources(resources) => {
            format!("[{}] Resources count={}", timestamp, resources.len())
        }
        EventPayload::Summary(summary) => format!(
            "[{}] Summary metrics={} resources={}",
            timestamp,
            summary.values.len(),
            summary.resources.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepulse_types::{
        events::LifecyclePhase,
        metrics::{MetricsSummary, Thresholds},
    };

    #[test]
    fn dashboard_keeps_latest_metric_per_kind() {
        let mut dashboard = Dashboard::new();
        let thresholds = Thresholds::new(2_500.0, 3_200.0);
        dashboard.apply(&MetricEvent::metric(MetricResult::rated(MetricKind::Tti, 2_000.0, thresholds)));
        dashboard.apply(&MetricEvent::metric(MetricResult::rated(MetricKind::Tti, 3_000.0, thresholds)));
        assert_eq!(dashboard.metrics.len(), 1);
        assert_eq!(dashboard.metrics[&MetricKind::Tti].rating, Rating::NeedsImprovement);
        assert_eq!(dashboard.logs.len(), 2);
    }

    #[test]
    fn log_is_bounded() {
        let mut dashboard = Dashboard::new();
        for _ in 0..MAX_LOG_ENTRIES + 5 {
            dashboard.apply(&MetricEvent::lifecycle(LifecyclePhase::Load, None));
        }
        assert_eq!(dashboard.logs.len(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn summary_events_are_labelled() {
        let event = MetricEvent::summary(MetricsSummary {
            fallback: true,
            ..MetricsSummary::default()
        });
        assert_eq!(summarize_status(&event), "요약 (대체 측정)");
        assert!(format_event(&event).contains("Summary metrics=0"));
    }
}
