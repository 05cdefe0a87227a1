use std::error::Error;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

use crate::search::highlight;

/// Style applied to the parts of a string that matched the search query.
const MATCH_STYLE: Style = Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD);

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most specific message from an error and its sources.
pub(crate) fn surface_error(err: &(dyn Error + 'static)) -> String {
    let mut cause = err;
    while let Some(source) = cause.source() {
        cause = source;
    }
    cause.to_string()
}

/// Turn `text` into styled spans, emphasizing occurrences of `query`.
pub(crate) fn highlighted_spans(text: &str, query: &str, base: Style) -> Vec<Span<'static>> {
    highlight(text, query)
        .into_iter()
        .map(|span| {
            let style = if span.is_match {
                base.patch(MATCH_STYLE)
            } else {
                base
            };
            Span::styled(span.text, style)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn surfaces_innermost_cause() {
        let err = StoreError::Schema(rusqlite::Error::InvalidQuery);
        assert_eq!(
            surface_error(&err),
            rusqlite::Error::InvalidQuery.to_string()
        );
    }

    #[test]
    fn highlights_matching_parts() {
        let spans = highlighted_spans("Blue Monk", "monk", Style::default());
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].content, "Monk");
        assert_eq!(spans[1].style.fg, Some(Color::Yellow));
        assert_eq!(spans[0].style.fg, None);
    }
}
