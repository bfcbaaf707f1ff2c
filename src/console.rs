use crate::currency::CurrencyFormat;
use crate::engine::{EngineView, FeedStatus};
use crate::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Window(TimeWindow),
    SignIn(String),
    SignOut,
    Quit,
}

pub const HELP: &str =
    "commands: daily | weekly | monthly | quarterly | yearly | sign-in <email> | sign-out | quit";

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(HELP.to_string());
    };

    match head.to_ascii_lowercase().as_str() {
        "sign-in" | "login" => match (parts.next(), parts.next()) {
            (Some(email), None) => Ok(ConsoleCommand::SignIn(email.to_string())),
            _ => Err("usage: sign-in <email>".to_string()),
        },
        "sign-out" | "logout" => Ok(ConsoleCommand::SignOut),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => other
            .parse::<TimeWindow>()
            .map(ConsoleCommand::Window)
            .map_err(|_| HELP.to_string()),
    }
}

pub fn render_view(view: &EngineView, currency: &CurrencyFormat) -> String {
    let metrics = view.metrics.map(|metrics| {
        format!(
            "{} bookings ({} paid, {} unpaid), revenue {}",
            metrics.total_bookings,
            metrics.paid_count,
            metrics.unpaid_count,
            currency.format_minor_units(metrics.total_revenue_minor_units)
        )
    });

    match (&view.status, metrics) {
        (FeedStatus::Waiting, _) => format!("[{}] waiting for a clinic to sign in", view.window),
        (FeedStatus::Connecting, _) | (FeedStatus::Live, None) => {
            format!("[{}] loading bookings...", view.window)
        }
        (FeedStatus::Live, Some(line)) => format!("[{}] {}", view.window, line),
        (FeedStatus::Failed(reason), Some(line)) => format!(
            "[{}] {} (live updates failed: {}; showing last known figures)",
            view.window, line, reason
        ),
        (FeedStatus::Failed(reason), None) => {
            format!("[{}] live updates failed: {}", view.window, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MetricsSnapshot;

    fn metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            total_bookings: 3,
            paid_count: 2,
            unpaid_count: 1,
            total_revenue_minor_units: 235_000,
        }
    }

    #[test]
    fn parses_windows_and_session_commands() {
        assert_eq!(
            parse_command("Daily"),
            Ok(ConsoleCommand::Window(TimeWindow::Daily))
        );
        assert_eq!(
            parse_command("sign-in frontdesk@neocare.ph"),
            Ok(ConsoleCommand::SignIn("frontdesk@neocare.ph".to_string()))
        );
        assert_eq!(parse_command(" logout "), Ok(ConsoleCommand::SignOut));
        assert_eq!(parse_command("quit"), Ok(ConsoleCommand::Quit));
        assert!(parse_command("sign-in").is_err());
        assert!(parse_command("biweekly").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn renders_live_metrics() {
        let view = EngineView {
            window: TimeWindow::Monthly,
            metrics: Some(metrics()),
            status: FeedStatus::Live,
        };
        assert_eq!(
            render_view(&view, &CurrencyFormat::default()),
            "[monthly] 3 bookings (2 paid, 1 unpaid), revenue ₱2,350.00"
        );
    }

    #[test]
    fn failure_shows_stale_figures() {
        let view = EngineView {
            window: TimeWindow::Weekly,
            metrics: Some(metrics()),
            status: FeedStatus::Failed("permission denied: bookings".to_string()),
        };
        let line = render_view(&view, &CurrencyFormat::default());
        assert!(line.starts_with("[weekly] 3 bookings"));
        assert!(line.contains("live updates failed: permission denied: bookings"));
    }

    #[test]
    fn waiting_has_no_figures() {
        let view = EngineView {
            window: TimeWindow::Daily,
            metrics: None,
            status: FeedStatus::Waiting,
        };
        assert_eq!(
            render_view(&view, &CurrencyFormat::default()),
            "[daily] waiting for a clinic to sign in"
        );
    }
}
