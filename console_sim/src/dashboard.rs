use std::io::{self, Stdout};

use tui::backend::CrosstermBackend;
use tui::layout::{Alignment, Constraint, Direction, Layout};
use tui::style::{Color, Modifier, Style};
use tui::text::{Span, Spans};
use tui::widgets::{Block, BorderType, Borders, Gauge, Paragraph};
use tui::Terminal;

use node_control::node::UplinkStats;
use node_control::payload::Measurements;

use crate::sim_modem::Network;
use crate::sim_sensors::World;

/// Everything shown on one frame of the dashboard.
pub struct Snapshot<'a> {
    pub now_ms: u64,
    pub last: Option<Measurements>,
    pub stats: UplinkStats,
    pub co2_failures: u8,
    pub world: &'a World,
    pub network: &'a Network,
}

fn value<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    match value {
        Some(value) => format!("{} {}", value, unit),
        None => "--".to_string(),
    }
}

fn rounded(value: Option<f32>, decimals: usize) -> Option<String> {
    value.map(|v| format!("{:.*}", decimals, v))
}

fn clock(ms: u64) -> String {
    let s = ms / 1000;
    format!("{}d {:02}:{:02}:{:02}", s / 86_400, s / 3600 % 24, s / 60 % 60, s % 60)
}

fn measurement_lines(title: &str, m: Option<Measurements>) -> Vec<Spans<'static>> {
    let m = m.unwrap_or_default();
    let row = |name: &str, text: String| {
        Spans::from(vec![
            Span::styled(format!("{:<18}", name), Style::default().fg(Color::Gray)),
            Span::raw(text),
        ])
    };
    vec![
        Spans::from(Span::styled(
            title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        row("pressure", value(rounded(m.pressure_pa.map(|p| p / 100.0), 1), "hPa")),
        row("air temperature", value(rounded(m.air_temperature_c, 2), "°C")),
        row("air humidity", value(rounded(m.air_humidity, 1), "%")),
        row("CO2", value(rounded(m.co2_ppm, 0), "ppm")),
        row("light", value(rounded(m.light_lux, 0), "lx")),
        row("soil moisture", value(m.soil_moisture, "%")),
        row("soil temperature", value(rounded(m.soil_temperature_c, 2), "°C")),
        row("battery", value(m.battery, "%")),
    ]
}

pub fn draw_tui(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    snapshot: &Snapshot,
) -> io::Result<()> {
    terminal.draw(|rect| {
        let size = rect.size();
        let vertical_layout = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints(
                [
                    Constraint::Length(3),
                    Constraint::Min(11),
                    Constraint::Length(3),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(size);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
            .split(vertical_layout[1]);

        let network = snapshot.network;
        let header = Paragraph::new(Spans::from(vec![
            Span::raw(format!("time {}   ", clock(snapshot.now_ms))),
            Span::styled(
                if network.joined { "joined" } else { "not joined" },
                Style::default().fg(if network.joined { Color::Green } else { Color::Red }),
            ),
            Span::raw(format!(
                "   sent {}  failed {}  received {}  lost {}  CO2 failures {}",
                snapshot.stats.sent,
                snapshot.stats.failed,
                network.uplinks.len(),
                network.lost,
                snapshot.co2_failures,
            )),
        ]))
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));

        let sent = Paragraph::new(measurement_lines("last uplink", snapshot.last))
            .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));

        let received = match network.uplinks.last() {
            Some(uplink) => match &uplink.measurements {
                Ok(m) => measurement_lines(&format!("network, port {}", uplink.port), Some(*m)),
                Err(e) => vec![Spans::from(Span::styled(
                    format!("undecodable frame: {}", e),
                    Style::default().fg(Color::Red),
                ))],
            },
            None => measurement_lines("network", None),
        };
        let received = Paragraph::new(received)
            .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));

        let world = snapshot.world;
        let charge = world.battery.charge_percent().clamp(0.0, 100.0);
        let battery = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("battery"))
            .gauge_style(Style::default().fg(if charge < 20.0 { Color::Red } else { Color::Green }))
            .ratio(charge as f64 / 100.0)
            .label(format!("{:.1} % {:.2} V", charge, world.battery.voltage()));

        let help = Paragraph::new(Spans::from(Span::styled(
            "q quit   r restart CO2 sensor   u measure now",
            Style::default().fg(Color::DarkGray),
        )));

        rect.render_widget(header, vertical_layout[0]);
        rect.render_widget(sent, columns[0]);
        rect.render_widget(received, columns[1]);
        rect.render_widget(battery, vertical_layout[2]);
        rect.render_widget(help, vertical_layout[3]);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::dashboard::{clock, rounded, value};

    #[test]
    fn formats_values() {
        assert_eq!(value(rounded(Some(21.456), 2), "°C"), "21.46 °C");
        assert_eq!(value::<u8>(None, "%"), "--");
        assert_eq!(clock(90_061_000), "1d 01:01:01");
    }
}
