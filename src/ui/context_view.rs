use crate::core::context_tree::ContextTreeManager;
use crate::core::theme::TerminalPalette;
use crate::core::token_budget::BudgetLevel;
use crate::domain::models::FileTreeNode;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
};
use std::{io, time::Duration};

const HELP: &str = "↑/↓: Navigate | Space: Toggle | →/←: Expand/Collapse | i/x: Include/Exclude dir | a/n: All/None | Enter: Confirm | q: Quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Confirm,
    Cancel,
}

pub struct ContextView<'a> {
    tree: &'a mut ContextTreeManager,
    palette: TerminalPalette,
    list_state: ListState,
    cursor_path: Option<String>,
    title: String,
}

impl<'a> ContextView<'a> {
    pub fn new(tree: &'a mut ContextTreeManager, palette: TerminalPalette, title: String) -> Self {
        let cursor_path = tree.flatten().next().map(|node| node.path.clone());
        Self {
            tree,
            palette,
            list_state: ListState::default(),
            cursor_path,
            title,
        }
    }

    fn rows(&self) -> Vec<&FileTreeNode> {
        self.tree.flatten().collect()
    }

    fn cursor_index(&self) -> Option<usize> {
        let path = self.cursor_path.as_ref()?;
        self.rows().iter().position(|node| &node.path == path)
    }

    fn cursor_node(&self) -> Option<FileTreeNode> {
        let path = self.cursor_path.as_ref()?;
        self.rows().into_iter().find(|node| &node.path == path).cloned()
    }

    fn move_cursor(&mut self, forward: bool) {
        let paths: Vec<String> = self.rows().iter().map(|n| n.path.clone()).collect();
        if paths.is_empty() {
            self.cursor_path = None;
            return;
        }
        let next = match self.cursor_index() {
            Some(i) if forward => (i + 1) % paths.len(),
            Some(0) => paths.len() - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.cursor_path = Some(paths[next].clone());
    }

    fn set_expanded(&mut self, expanded: bool) {
        if let Some(node) = self.cursor_node() {
            if node.is_directory() && node.expanded != expanded {
                self.tree.toggle_directory(&node.path);
            }
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor_path.as_deref()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Outcome::Cancel;
            }
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => return Outcome::Confirm,
            KeyCode::Char('a') => {
                self.tree.include_all();
            }
            KeyCode::Char('n') => {
                self.tree.exclude_all();
            }
            KeyCode::Char(' ') => {
                if let Some(node) = self.cursor_node() {
                    if node.is_file() {
                        self.tree.toggle_file(&node.path);
                    } else {
                        self.tree.toggle_directory(&node.path);
                    }
                }
            }
            KeyCode::Char('i') | KeyCode::Char('x') => {
                if let Some(node) = self.cursor_node() {
                    if node.is_directory() {
                        if key.code == KeyCode::Char('i') {
                            self.tree.include_directory(&node.path);
                        } else {
                            self.tree.exclude_directory(&node.path);
                        }
                    }
                }
            }
            KeyCode::Right => self.set_expanded(true),
            KeyCode::Left => self.set_expanded(false),
            KeyCode::Down => self.move_cursor(true),
            KeyCode::Up => self.move_cursor(false),
            _ => {}
        }
        Outcome::Continue
    }

    fn draw(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(f.area());

        let title = Paragraph::new(Span::styled(
            self.title.clone(),
            Style::default()
                .fg(self.palette.primary)
                .add_modifier(Modifier::BOLD),
        ));
        f.render_widget(title, chunks[0]);

        let cursor = self.cursor_index();
        let palette = self.palette;
        let highlight = Style::default()
            .bg(palette.accent)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD);

        let rows = self.rows();
        let items: Vec<ListItem> = rows
            .iter()
            .map(|node| {
                let indent = "  ".repeat(node.depth);
                let prefix = if node.is_file() {
                    if node.included {
                        "[✓] "
                    } else if node.excluded {
                        "[✗] "
                    } else {
                        "[ ] "
                    }
                } else if node.expanded {
                    "▼ "
                } else {
                    "► "
                };
                let tokens = node
                    .token_estimate
                    .map(|t| format!("  ({} tokens)", t))
                    .unwrap_or_default();
                let style = if node.is_directory() {
                    Style::default().fg(palette.accent)
                } else if node.included {
                    Style::default().fg(palette.primary)
                } else if node.excluded {
                    Style::default().fg(palette.muted)
                } else {
                    Style::default().fg(palette.text)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{}{}{}", indent, prefix, node.name), style),
                    Span::styled(tokens, Style::default().fg(palette.muted)),
                ]))
            })
            .collect();
        let included = self.tree.included_files().len();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Files ({} included of {})",
                included,
                self.tree.file_count()
            )))
            .highlight_style(highlight);
        self.list_state.select(cursor);
        f.render_stateful_widget(list, chunks[1], &mut self.list_state);

        let budget = self.tree.budget();
        let gauge_color = match budget.level {
            BudgetLevel::None => palette.primary,
            BudgetLevel::Info => Color::Cyan,
            BudgetLevel::Warning => Color::Yellow,
            BudgetLevel::Error => Color::Red,
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Token budget"))
            .gauge_style(Style::default().fg(gauge_color))
            .ratio(budget.percentage / 100.0)
            .label(format!(
                "{} / {} tokens ({:.1}%)",
                budget.total_tokens, budget.max_tokens, budget.percentage
            ));
        f.render_widget(gauge, chunks[2]);

        let status = match (budget.level.message(), budget.level.suggestion()) {
            (Some(message), Some(suggestion)) => format!("{}. {}", message, suggestion),
            _ => String::new(),
        };
        f.render_widget(
            Paragraph::new(Span::styled(status, Style::default().fg(gauge_color))),
            chunks[3],
        );

        let controls = Paragraph::new(Span::styled(HELP, Style::default().fg(Color::DarkGray)));
        f.render_widget(controls, chunks[4]);
    }
}

/// Run the interactive tree until the user confirms or cancels.
pub fn run_tui(view: &mut ContextView) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, view);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    match result {
        Ok(Outcome::Cancel) => Err(anyhow::anyhow!("Selection cancelled")),
        Ok(_) => {
            info!("Context confirmed");
            Ok(())
        }
        Err(err) => {
            warn!("Error during context selection: {}", err);
            Err(err)
        }
    }
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, view: &mut ContextView) -> anyhow::Result<Outcome> {
    loop {
        terminal.draw(|f| view.draw(f))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match view.handle_key(key) {
                    Outcome::Continue => {}
                    outcome => return Ok(outcome),
                }
            }
        }
    }
}
