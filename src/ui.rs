//! Terminal front end: renders the browser's tree and feeds it key presses.

use std::ops::Range;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph},
    DefaultTerminal, Frame,
};

use crate::state::Browser;
use crate::types::{DisplayNode, LabelLayout, NodeId};

const TICK: Duration = Duration::from_millis(50);
const PAGE: usize = 10;

const TAG_STYLE: Style = Style::new().fg(Color::Rgb(0xff, 0x00, 0x55)).add_modifier(Modifier::BOLD);
const NAME_STYLE: Style = Style::new().add_modifier(Modifier::BOLD);
const VR_STYLE: Style = Style::new().fg(Color::Cyan);
const VALUE_STYLE: Style = Style::new().fg(Color::Yellow);
const MATCH_STYLE: Style = Style::new()
    .fg(Color::Black)
    .bg(Color::LightGreen)
    .add_modifier(Modifier::BOLD);
const ERROR_STYLE: Style = Style::new().fg(Color::Red).add_modifier(Modifier::BOLD);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Search,
}

/// One visible line of the tree, styled when the rows are rebuilt.
#[derive(Debug, Clone)]
struct Row {
    id: NodeId,
    depth: usize,
    branch: bool,
    expanded: bool,
    has_children: bool,
    is_match: bool,
    line: Line<'static>,
}

pub struct App {
    browser: Browser,
    rows: Vec<Row>,
    list: ListState,
    mode: Mode,
    should_quit: bool,
}

/// Runs the interactive browser until the user quits.
pub fn run(browser: Browser) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();
    let result = App::new(browser).event_loop(&mut terminal);
    ratatui::restore();
    result
}

fn visible_rows(root: &DisplayNode) -> Vec<Row> {
    fn push(node: &DisplayNode, depth: usize, out: &mut Vec<Row>) {
        let branch = node.is_branch();
        let marker = match (branch, node.expanded) {
            (true, true) => "▾ ",
            (true, false) => "▸ ",
            (false, _) => "  ",
        };
        let mut spans = vec![Span::raw(format!("{}{marker}", "  ".repeat(depth)))];
        if depth > 0 && node.layout.is_none() && !branch {
            spans.push(Span::styled(node.label.clone(), ERROR_STYLE));
        } else {
            spans.extend(label_spans(&node.label, node.layout, &node.label_highlights()));
        }
        out.push(Row {
            id: node.id,
            depth,
            branch,
            expanded: node.expanded,
            has_children: !node.children.is_empty(),
            is_match: !node.highlights.is_empty(),
            line: Line::from(spans),
        });
        if node.expanded {
            for child in &node.children {
                push(child, depth + 1, out);
            }
        }
    }
    let mut rows = Vec::new();
    push(root, 0, &mut rows);
    rows
}

/// Splits a label into column-styled spans, overlaying match highlights.
fn label_spans(label: &str, layout: Option<LabelLayout>, highlights: &[Range<usize>]) -> Vec<Span<'static>> {
    let Some(layout) = layout else {
        return vec![Span::styled(label.to_string(), NAME_STYLE)];
    };
    let column_style = |at: usize| {
        if at < layout.name_at {
            TAG_STYLE
        } else if at < layout.vr_at {
            NAME_STYLE
        } else if at < layout.value_at {
            VR_STYLE
        } else {
            VALUE_STYLE
        }
    };

    let mut cuts = vec![0, layout.name_at, layout.vr_at, layout.value_at, label.len()];
    for h in highlights {
        cuts.push(h.start);
        cuts.push(h.end);
    }
    cuts.retain(|&c| c <= label.len() && label.is_char_boundary(c));
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let lit = highlights.iter().any(|h| h.start <= start && end <= h.end);
            let style = if lit { MATCH_STYLE } else { column_style(start) };
            Span::styled(label[start..end].to_string(), style)
        })
        .collect()
}

impl App {
    pub fn new(browser: Browser) -> Self {
        let mut app = Self {
            browser,
            rows: Vec::new(),
            list: ListState::default(),
            mode: Mode::Browse,
            should_quit: false,
        };
        app.on_tree_replaced();
        app
    }

    fn event_loop(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            if self.browser.pump() {
                self.on_tree_replaced();
            }
            terminal.draw(|frame| self.render(frame))?;
            if event::poll(TICK)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Node ids do not survive a rebuild, so selection restarts at the root.
    fn on_tree_replaced(&mut self) {
        if self.browser.is_searching() {
            self.browser.root_mut().set_expanded_recursive(true);
        }
        self.refresh_rows();
        self.list.select(Some(0));
    }

    fn refresh_rows(&mut self) {
        self.rows = visible_rows(&self.browser.tree().root);
        let last = self.rows.len().saturating_sub(1);
        if let Some(selected) = self.list.selected() {
            self.list.select(Some(selected.min(last)));
        }
    }

    fn selected(&self) -> usize {
        self.list.selected().unwrap_or(0)
    }

    fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected())
    }

    fn select(&mut self, index: usize) {
        let last = self.rows.len().saturating_sub(1);
        self.list.select(Some(index.min(last)));
    }

    fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if let Some(node) = self.browser.root_mut().find_mut(id) {
            if node.is_branch() {
                node.expanded = expanded;
            }
        }
        self.refresh_rows();
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.mode {
            Mode::Browse => self.handle_browse_key(key),
            Mode::Search => self.handle_search_key(key),
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        let current = self.selected();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc if self.browser.is_searching() => {
                self.browser.clear_search();
                self.on_tree_replaced();
            }
            KeyCode::Down | KeyCode::Char('j') => self.select(current + 1),
            KeyCode::Up | KeyCode::Char('k') => self.select(current.saturating_sub(1)),
            KeyCode::PageDown => self.select(current + PAGE),
            KeyCode::PageUp => self.select(current.saturating_sub(PAGE)),
            KeyCode::Home | KeyCode::Char('g') => self.select(0),
            KeyCode::End | KeyCode::Char('G') => self.select(usize::MAX),
            KeyCode::Right | KeyCode::Char('l') => self.expand_or_descend(),
            KeyCode::Left | KeyCode::Char('h') => self.collapse_or_ascend(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(row) = self.selected_row().cloned() {
                    if row.branch {
                        self.set_expanded(row.id, !row.expanded);
                    }
                }
            }
            KeyCode::Char('e') => {
                self.browser.root_mut().set_expanded_recursive(true);
                self.refresh_rows();
            }
            KeyCode::Char('c') => {
                let root = self.browser.root_mut();
                root.set_expanded_recursive(false);
                root.expanded = true;
                self.list.select(Some(0));
                self.refresh_rows();
            }
            KeyCode::Char('n') => self.jump_to_match(true),
            KeyCode::Char('N') => self.jump_to_match(false),
            KeyCode::Char('/') => self.mode = Mode::Search,
            KeyCode::Char('r') => {
                self.browser.reload();
                self.on_tree_replaced();
            }
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.browser.clear_search();
                self.mode = Mode::Browse;
                self.on_tree_replaced();
            }
            KeyCode::Enter => self.mode = Mode::Browse,
            KeyCode::Backspace => {
                let mut query = self.browser.query().to_string();
                query.pop();
                self.browser.set_query(query);
            }
            KeyCode::Char(c) => {
                let mut query = self.browser.query().to_string();
                query.push(c);
                self.browser.set_query(query);
            }
            _ => {}
        }
    }

    fn expand_or_descend(&mut self) {
        let Some(row) = self.selected_row().cloned() else { return };
        if !row.branch {
            return;
        }
        if row.expanded {
            if row.has_children {
                self.select(self.selected() + 1);
            }
        } else {
            self.set_expanded(row.id, true);
        }
    }

    fn collapse_or_ascend(&mut self) {
        let Some(row) = self.selected_row().cloned() else { return };
        if row.branch && row.expanded && row.depth > 0 {
            self.set_expanded(row.id, false);
            return;
        }
        let current = self.selected();
        if let Some(parent) = self.rows[..current].iter().rposition(|r| r.depth + 1 == row.depth) {
            self.select(parent);
        }
    }

    fn jump_to_match(&mut self, forward: bool) {
        let current = self.selected();
        let n = self.rows.len();
        let found = (1..=n)
            .map(|step| {
                if forward {
                    (current + step) % n
                } else {
                    (current + n - step % n) % n
                }
            })
            .find(|&i| self.rows[i].is_match);
        if let Some(i) = found {
            self.select(i);
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let [header, body, search, footer] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        self.render_header(frame, header);
        self.render_tree(frame, body);
        self.render_search(frame, search);
        frame.render_widget(
            Paragraph::new(
                " q quit  ↑↓ move  ←→ collapse/expand  enter toggle  e/c expand/collapse all  / search  n/N next/prev match  r reload",
            )
            .style(Style::new().fg(Color::DarkGray)),
            footer,
        );
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let status_style = if self.browser.load_error().is_some() {
            ERROR_STYLE
        } else {
            Style::new().fg(Color::Gray)
        };
        let line = Line::from(vec![
            Span::styled(" dcmtree ", Style::new().fg(Color::Black).bg(Color::Cyan)),
            Span::raw(" "),
            Span::styled(self.browser.status(), status_style),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_tree(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self.rows.iter().map(|row| ListItem::new(row.line.clone())).collect();

        let list = List::new(items)
            .block(Block::bordered().title(" DICOM "))
            .highlight_style(Style::new().bg(Color::DarkGray));
        frame.render_stateful_widget(list, area, &mut self.list);
    }

    fn render_search(&self, frame: &mut Frame, area: Rect) {
        let active = self.mode == Mode::Search;
        let mut title = String::from(" Search ");
        if self.browser.has_pending_search() {
            title.push_str("(typing…) ");
        }
        let border = if active {
            Style::new().fg(Color::Yellow)
        } else {
            Style::new().fg(Color::DarkGray)
        };
        let mut text = self.browser.query().to_string();
        if active {
            text.push('█');
        }
        frame.render_widget(
            Paragraph::new(text).block(Block::bordered().title(title).border_style(border)),
            area,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{SearchScheduler, DEFAULT_DEBOUNCE};
    use crate::tree::{build, tests::scenario_a, Limits};
    use crate::types::Record;
    use tokio::runtime::Handle;

    fn row_text(row: &Row) -> String {
        row.line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn collapsed_branches_hide_children() {
        let mut tree = build("root", &scenario_a(), Limits::default());
        assert_eq!(visible_rows(&tree.root).len(), 3);

        tree.root.set_expanded_recursive(true);
        assert_eq!(visible_rows(&tree.root).len(), 9);
    }

    #[test]
    fn highlight_spans_split_columns() {
        let label = "(0008,1030)   StudyDescription  LO   CT SCAN";
        let layout = LabelLayout { name_at: 14, vr_at: 32, value_at: 37 };
        let spans = label_spans(label, Some(layout), &[40..44]);

        let text: String = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, label);
        let lit: Vec<&str> = spans
            .iter()
            .filter(|s| s.style == MATCH_STYLE)
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(lit, vec!["SCAN"]);
    }

    #[test]
    fn rows_carry_labels_and_matches() {
        let mut tree = build("root", &scenario_a(), Limits::default());
        tree.root.children[0].highlights.push(crate::types::Highlight {
            field: crate::types::Field::Value,
            range: 0..3,
        });
        let rows = visible_rows(&tree.root);

        assert_eq!(row_text(&rows[0]), "▾ root");
        assert_eq!(row_text(&rows[1]), format!("    {}", tree.root.children[0].label));
        assert_eq!(row_text(&rows[2]), format!("  ▸ {}", tree.root.children[1].label));
        let matches: Vec<bool> = rows.iter().map(|r| r.is_match).collect();
        assert_eq!(matches, vec![false, true, false]);
    }

    #[tokio::test]
    async fn match_jumps_wrap_around() {
        let (scheduler, ready) = SearchScheduler::new(Handle::current(), DEFAULT_DEBOUNCE);
        let record = Record {
            source: "a.json".into(),
            elements: scenario_a(),
        };
        let mut browser = Browser::new(record, Limits::default(), scheduler, ready);
        browser.search_now("1.2.3");
        let mut app = App::new(browser);

        // root, sequence, Item 1, match, Item 2, match
        assert_eq!(app.rows.len(), 6);
        app.jump_to_match(true);
        assert_eq!(app.selected(), 3);
        app.jump_to_match(true);
        assert_eq!(app.selected(), 5);
        app.jump_to_match(true);
        assert_eq!(app.selected(), 3);
        app.jump_to_match(false);
        assert_eq!(app.selected(), 5);
    }
}
