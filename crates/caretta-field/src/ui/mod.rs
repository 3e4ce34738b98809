use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::api::{Backend, events_for_nests};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::mappers::{NestEventRow, NestRow, TurtleRow, format_cm, format_date, or_missing};
use crate::models::{Nest, Turtle, TurtleId};
use crate::text::{sanitize_server_text, single_line};
use crate::views::dashboard::DashboardStats;
use crate::views::nest_details::{NestDetails, SiteCard, SiteMeasures};
use crate::views::records::{NestQuery, filter_nests, search_turtles};
use crate::views::turtle_details::TurtleDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Dashboard,
    Nests,
    Turtles,
}

impl Section {
    const ALL: [Section; 3] = [Section::Dashboard, Section::Nests, Section::Turtles];

    fn title(self) -> &'static str {
        match self {
            Section::Dashboard => "Dashboard",
            Section::Nests => "Nests",
            Section::Turtles => "Turtles",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    List(Section),
    Nest(String),
    Turtle(TurtleId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    Search { buffer: String },
}

struct App {
    backend: Box<dyn Backend>,
    cfg: AppConfig,
    screen: Screen,
    input: InputMode,
    search: String,
    /// Last fetch or action failure, shown until the next successful fetch.
    banner: Option<String>,

    nests: Vec<Nest>,
    turtles: Vec<Turtle>,
    stats: Option<DashboardStats>,
    nest_detail: Option<NestDetails>,
    turtle_detail: Option<TurtleDetails>,

    sidebar: ListState,
    rows: ListState,
    scroll: u16,
}

impl App {
    fn new(backend: Box<dyn Backend>, cfg: AppConfig) -> Self {
        let mut sidebar = ListState::default();
        sidebar.select(Some(0));
        Self {
            backend,
            cfg,
            screen: Screen::List(Section::Dashboard),
            input: InputMode::Normal,
            search: String::new(),
            banner: None,
            nests: Vec::new(),
            turtles: Vec::new(),
            stats: None,
            nest_detail: None,
            turtle_detail: None,
            sidebar,
            rows: ListState::default(),
            scroll: 0,
        }
    }

    fn section(&self) -> Option<Section> {
        match self.screen {
            Screen::List(s) => Some(s),
            _ => None,
        }
    }

    fn fail(&mut self, what: &str, e: Error) {
        tracing::warn!("{what} failed: {e}");
        self.banner = Some(sanitize_server_text(&format!("{what}: {e}")));
    }

    /// Fetches whatever the current screen shows. A failed fetch leaves the
    /// screen empty with the error in the banner.
    fn refresh(&mut self) {
        self.banner = None;
        let res = match self.screen.clone() {
            Screen::List(Section::Dashboard) => self.load_dashboard(),
            Screen::List(Section::Nests) => self.load_nests(),
            Screen::List(Section::Turtles) => self.load_turtles(),
            Screen::Nest(code) => self.load_nest(&code),
            Screen::Turtle(id) => self.load_turtle(id),
        };
        if let Err(e) = res {
            self.fail("fetch", e);
        }
        self.clamp_selection();
    }

    fn load_dashboard(&mut self) -> Result<()> {
        self.stats = None;
        let nests = self.backend.list_nests()?;
        let turtles = self.backend.list_turtles()?;
        let active: Vec<Nest> = nests.iter().filter(|n| !n.is_archived).cloned().collect();
        let events = events_for_nests(self.backend.as_ref(), &active)?;
        self.stats = Some(DashboardStats::compute(&nests, &turtles, &events));
        self.nests = nests;
        self.turtles = turtles;
        Ok(())
    }

    fn load_nests(&mut self) -> Result<()> {
        self.nests.clear();
        self.nests = self.backend.list_nests()?;
        Ok(())
    }

    fn load_turtles(&mut self) -> Result<()> {
        self.turtles.clear();
        self.turtles = self.backend.list_turtles()?;
        Ok(())
    }

    fn load_nest(&mut self, code: &str) -> Result<()> {
        self.nest_detail = None;
        let nest = self.backend.get_nest(code)?;
        let events = self.backend.nest_events(&nest.code)?;
        self.nest_detail = Some(NestDetails::build(nest, &events));
        Ok(())
    }

    fn load_turtle(&mut self, id: TurtleId) -> Result<()> {
        self.turtle_detail = None;
        let turtle = self.backend.get_turtle(id)?;
        let events = self.backend.turtle_survey_events(id)?;
        self.turtle_detail = Some(TurtleDetails::build(turtle, &events));
        Ok(())
    }

    fn visible_nests(&self) -> Vec<&Nest> {
        let q = NestQuery {
            search: Some(self.search.clone()),
            ..Default::default()
        };
        filter_nests(&self.nests, &q)
    }

    fn visible_turtles(&self) -> Vec<&Turtle> {
        search_turtles(&self.turtles, Some(self.search.as_str()))
    }

    fn row_count(&self) -> usize {
        match self.section() {
            Some(Section::Nests) => self.visible_nests().len(),
            Some(Section::Turtles) => self.visible_turtles().len(),
            _ => 0,
        }
    }

    fn clamp_selection(&mut self) {
        let n = self.row_count();
        if n == 0 {
            self.rows.select(None);
        } else {
            let i = self.rows.selected().unwrap_or(0).min(n - 1);
            self.rows.select(Some(i));
        }
    }

    fn move_rows(&mut self, delta: isize) {
        let n = self.row_count();
        if n == 0 {
            self.scroll = self.scroll.saturating_add_signed(delta as i16);
            return;
        }
        let cur = self.rows.selected().unwrap_or(0) as isize;
        let next = (cur + delta).clamp(0, n as isize - 1);
        self.rows.select(Some(next as usize));
    }

    fn switch_section(&mut self, delta: isize) {
        let cur = self.sidebar.selected().unwrap_or(0) as isize;
        let len = Section::ALL.len() as isize;
        let next = (cur + delta).rem_euclid(len) as usize;
        self.sidebar.select(Some(next));
        self.screen = Screen::List(Section::ALL[next]);
        self.search.clear();
        self.rows.select(Some(0));
        self.scroll = 0;
        self.refresh();
    }

    fn open_selected(&mut self) {
        let Some(i) = self.rows.selected() else {
            return;
        };
        let next = match self.section() {
            Some(Section::Nests) => self.visible_nests().get(i).map(|n| Screen::Nest(n.code.clone())),
            Some(Section::Turtles) => self
                .visible_turtles()
                .get(i)
                .and_then(|t| t.id)
                .map(Screen::Turtle),
            _ => None,
        };
        if let Some(screen) = next {
            self.screen = screen;
            self.scroll = 0;
            self.refresh();
        }
    }

    fn back(&mut self) {
        let section = match self.screen {
            Screen::Nest(_) => Section::Nests,
            Screen::Turtle(_) => Section::Turtles,
            Screen::List(s) => s,
        };
        self.screen = Screen::List(section);
        self.scroll = 0;
        self.clamp_selection();
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) -> bool {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            return true;
        }

        if let InputMode::Search { buffer } = &mut self.input {
            match code {
                KeyCode::Esc => self.input = InputMode::Normal,
                KeyCode::Enter => {
                    self.search = buffer.trim().to_string();
                    self.input = InputMode::Normal;
                    self.rows.select(Some(0));
                    self.clamp_selection();
                }
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) if !c.is_control() => buffer.push(c),
                _ => {}
            }
            return false;
        }

        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc => {
                if self.section().is_some() {
                    self.search.clear();
                    self.clamp_selection();
                } else {
                    self.back();
                }
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('/') if self.section().is_some_and(|s| s != Section::Dashboard) => {
                self.input = InputMode::Search {
                    buffer: self.search.clone(),
                };
            }
            KeyCode::Tab | KeyCode::Char('l') | KeyCode::Right if self.section().is_some() => {
                self.switch_section(1)
            }
            KeyCode::BackTab | KeyCode::Char('h') | KeyCode::Left if self.section().is_some() => {
                self.switch_section(-1)
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_rows(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_rows(-1),
            KeyCode::PageDown => self.move_rows(10),
            KeyCode::PageUp => self.move_rows(-10),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Backspace => self.back(),
            _ => {}
        }
        false
    }

    fn draw(&mut self, f: &mut ratatui::Frame) {
        let banner_height = if self.banner.is_some() { 1 } else { 0 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Length(banner_height),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(f.area());

        self.draw_header(f, chunks[0]);
        if let Some(msg) = &self.banner {
            let p = Paragraph::new(msg.as_str()).style(Style::default().fg(Color::White).bg(Color::Red));
            f.render_widget(p, chunks[1]);
        }

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(16), Constraint::Min(0)])
            .split(chunks[2]);
        self.draw_sidebar(f, cols[0]);
        match self.screen.clone() {
            Screen::List(Section::Dashboard) => self.draw_dashboard(f, cols[1]),
            Screen::List(Section::Nests) => self.draw_nests(f, cols[1]),
            Screen::List(Section::Turtles) => self.draw_turtles(f, cols[1]),
            Screen::Nest(_) => self.draw_nest(f, cols[1]),
            Screen::Turtle(_) => self.draw_turtle(f, cols[1]),
        }
        self.draw_footer(f, chunks[3]);
    }

    fn draw_header(&self, f: &mut ratatui::Frame, area: Rect) {
        let crumb = match &self.screen {
            Screen::List(s) => s.title().to_lowercase(),
            Screen::Nest(code) => format!("nests > {}", single_line(code, 24)),
            Screen::Turtle(id) => format!("turtles > #{id}"),
        };
        let mut spans = vec![
            Span::styled("Caretta Field", Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(crumb, Style::default().fg(Color::LightBlue)),
        ];
        if !self.search.is_empty() {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                format!("search: {}", single_line(&self.search, 32)),
                Style::default().fg(Color::Yellow),
            ));
        }
        let p = Paragraph::new(Text::from(Line::from(spans))).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_type(BorderType::Plain),
        );
        f.render_widget(p, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame, area: Rect) {
        let hint = match (&self.input, &self.screen) {
            (InputMode::Search { buffer }, _) => format!("/{}_   [Enter] Apply  [Esc] Cancel", buffer),
            (_, Screen::List(Section::Dashboard)) => {
                "[Tab/h/l] Section  [r] Refresh  [q] Quit".to_string()
            }
            (_, Screen::List(_)) => {
                "[Tab/h/l] Section  [j/k] Move  [Enter] Details  [/] Search  [Esc] Clear  [r] Refresh  [q] Quit"
                    .to_string()
            }
            _ => "[j/k] Scroll  [Esc/Backspace] Back  [r] Refresh  [q] Quit".to_string(),
        };
        let p = Paragraph::new(hint)
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::TOP));
        f.render_widget(p, area);
    }

    fn draw_sidebar(&self, f: &mut ratatui::Frame, area: Rect) {
        let items: Vec<ListItem> = Section::ALL.iter().map(|s| ListItem::new(s.title())).collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            )
            .highlight_style(Style::default().fg(Color::Black).bg(Color::LightYellow))
            .highlight_symbol("> ");
        let mut state = self.sidebar.clone();
        f.render_stateful_widget(list, area, &mut state);
    }

    fn panel(title: &str) -> Block<'_> {
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
    }

    fn draw_dashboard(&self, f: &mut ratatui::Frame, area: Rect) {
        let mut lines = Vec::new();
        match &self.stats {
            None => lines.push(Line::from("No data.")),
            Some(s) => {
                let key = |k: &str| Span::styled(format!("{k:<16}"), Style::default().fg(Color::Yellow));
                lines.push(Line::from(vec![key("Active nests"), Span::raw(s.active_nests.to_string())]));
                lines.push(Line::from(format!(
                    "  incubating {}  hatching {}  hatched {}  relocated {}",
                    s.incubating, s.hatching, s.hatched, s.relocated
                )));
                for (beach, n) in s.beach_rows(&self.cfg.beaches) {
                    lines.push(Line::from(format!("  {:<20} {n}", single_line(&beach, 20))));
                }
                lines.push(Line::from(vec![
                    key("Eggs"),
                    Span::raw(format!("{} total, {} remaining", s.total_eggs, s.current_eggs)),
                ]));
                lines.push(Line::from(vec![
                    key("Hatching success"),
                    Span::raw(
                        s.hatching_success
                            .map(|p| format!("{p:.1}%"))
                            .unwrap_or_else(|| "N/A".into()),
                    ),
                ]));
                lines.push(Line::from(vec![key("Turtles"), Span::raw(s.turtles.to_string())]));
                for (species, n) in &s.turtles_per_species {
                    lines.push(Line::from(format!("  {:<20} {n}", single_line(species, 20))));
                }
            }
        }
        let p = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .block(Self::panel("Season"));
        f.render_widget(p, area);
    }

    fn draw_nests(&self, f: &mut ratatui::Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .visible_nests()
            .into_iter()
            .map(|n| {
                let r = NestRow::from(n);
                ListItem::new(format!(
                    "{:<9} {:<16} {:<11} {:<11} {:>9} {}",
                    single_line(&r.code, 9),
                    single_line(&r.beach, 16),
                    r.date_found,
                    r.status,
                    r.eggs,
                    if r.relocated { "R" } else { "" }
                ))
            })
            .collect();
        let title = format!("Nests ({})", items.len());
        let list = List::new(items)
            .block(Self::panel(&title))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::LightYellow))
            .highlight_symbol("> ");
        let mut state = self.rows.clone();
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_turtles(&self, f: &mut ratatui::Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .visible_turtles()
            .into_iter()
            .map(|t| {
                let r = TurtleRow::from(t);
                ListItem::new(format!(
                    "{:<6} {:<14} {:<4} {}",
                    r.id,
                    single_line(&r.species, 14),
                    single_line(&r.sex, 4),
                    single_line(&r.tags, 48)
                ))
            })
            .collect();
        let title = format!("Turtles ({})", items.len());
        let list = List::new(items)
            .block(Self::panel(&title))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::LightYellow))
            .highlight_symbol("> ");
        let mut state = self.rows.clone();
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_nest(&self, f: &mut ratatui::Frame, area: Rect) {
        let Some(d) = &self.nest_detail else {
            f.render_widget(Paragraph::new("No data.").block(Self::panel("Nest")), area);
            return;
        };
        let row = NestRow::from(&d.nest);
        let mut lines = vec![
            Line::from(Span::styled(
                format!("{}  {}", single_line(&row.code, 16), row.beach),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("found {}   status {}   eggs {}", row.date_found, row.status, row.eggs)),
            site_line("current", &d.current_site),
        ];
        match &d.original_site {
            Some(SiteCard::Site(m)) => lines.push(site_line("original", m)),
            Some(SiteCard::Archived) => lines.push(Line::from("original  (data archived)")),
            None => {}
        }
        if let Some(notes) = d.nest.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(Line::from(format!("notes     {}", sanitize_server_text(notes))));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Timeline", Style::default().fg(Color::Yellow))));
        for entry in &d.timeline {
            let detail = entry
                .event
                .as_ref()
                .map(NestEventRow::from)
                .map(|r| format!("counted={} reburied={} {}", r.eggs_counted, r.eggs_reburied, single_line(&r.observer, 24)))
                .unwrap_or_default();
            lines.push(Line::from(format!(
                "  {:<8} {:<11} {:<18} {}",
                entry.day_label(),
                format_date(entry.date.as_deref()),
                entry.event_type.as_str(),
                detail
            )));
        }
        let p = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0))
            .block(Self::panel("Nest"));
        f.render_widget(p, area);
    }

    fn draw_turtle(&self, f: &mut ratatui::Frame, area: Rect) {
        let Some(d) = &self.turtle_detail else {
            f.render_widget(Paragraph::new("No data.").block(Self::panel("Turtle")), area);
            return;
        };
        let id = d.turtle.id.map(|i| format!("#{i}")).unwrap_or_default();
        let mut lines = vec![
            Line::from(Span::styled(
                format!("{id}  {} ({})", single_line(&d.common_name, 24), single_line(&d.turtle.species, 32)),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!(
                "sex {}   health {}",
                or_missing(d.turtle.sex.as_deref()),
                single_line(&or_missing(d.turtle.health_condition.as_deref()), 40)
            )),
            Line::from(""),
            Line::from(Span::styled("Tags", Style::default().fg(Color::Yellow))),
        ];
        for t in &d.tags {
            lines.push(Line::from(format!(
                "  {:<12} {:<12} last seen {:<12} [{}]",
                t.position.label(),
                or_missing(t.current.as_deref()),
                or_missing(t.latest_observed.as_deref()),
                single_line(&t.history.join(", "), 60)
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Measurements", Style::default().fg(Color::Yellow))));
        for m in &d.measurements {
            lines.push(Line::from(format!("  {:<18} {}", m.name, format_cm(m.value))));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Surveys ({})", d.surveys.len()),
            Style::default().fg(Color::Yellow),
        )));
        for ev in &d.surveys {
            lines.push(Line::from(format!(
                "  {:<11} {:<13} {}",
                format_date(Some(ev.event_date.as_str())),
                ev.event_type.as_str(),
                single_line(&or_missing(ev.location.as_deref()), 32)
            )));
        }
        let p = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0))
            .block(Self::panel("Turtle"));
        f.render_widget(p, area);
    }
}

fn site_line(label: &str, m: &SiteMeasures) -> Line<'static> {
    let coord = |v: Option<f64>| v.map(|n| format!("{n:.5}")).unwrap_or_else(|| "N/A".into());
    Line::from(format!(
        "{label:<9} h={} H={} w={} S={} gps={}, {}",
        format_cm(m.depth_top_egg_h),
        format_cm(m.depth_bottom_chamber_h),
        format_cm(m.width_w),
        format_cm(m.distance_to_sea_s),
        coord(m.gps_lat),
        coord(m.gps_long),
    ))
}

pub fn run_tui(backend: Box<dyn Backend>, cfg: AppConfig) -> Result<()> {
    let mut app = App::new(backend, cfg);
    tracing::debug!("tui starting");
    app.refresh();

    let mut stdout = io::stdout();
    enable_raw_mode().map_err(|e| Error::msg(e.to_string()))?;
    execute!(stdout, EnterAlternateScreen, Hide).map_err(|e| Error::msg(e.to_string()))?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend).map_err(|e| Error::msg(e.to_string()))?;
    terminal
        .clear()
        .map_err(|e| Error::msg(format!("tui clear failed: {e}")))?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<Stdout>>, mut app: App) -> Result<()> {
    let tick = Duration::from_millis(250);
    loop {
        terminal
            .draw(|f| app.draw(f))
            .map_err(|e| Error::msg(format!("tui draw failed: {e}")))?;

        if event::poll(tick).map_err(|e| Error::msg(e.to_string()))? {
            match event::read().map_err(|e| Error::msg(e.to_string()))? {
                Event::Key(k) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    if app.handle_key(k.code, k.modifiers) {
                        return Ok(());
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credentials, NestEvent, TurtleEvent, User};

    #[derive(Default)]
    struct Fixed {
        nests: Vec<Nest>,
        turtles: Vec<Turtle>,
        down: bool,
    }

    impl Fixed {
        fn check(&self) -> Result<()> {
            if self.down {
                Err(Error::transport("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    impl Backend for Fixed {
        fn register(&self, _: &Credentials) -> Result<User> {
            Err(Error::msg("unused"))
        }
        fn login(&self, _: &Credentials) -> Result<User> {
            Err(Error::msg("unused"))
        }
        fn list_users(&self) -> Result<Vec<User>> {
            Ok(Vec::new())
        }
        fn create_turtle(&self, t: &Turtle) -> Result<Turtle> {
            Ok(t.clone())
        }
        fn update_turtle(&self, _: TurtleId, t: &Turtle) -> Result<Turtle> {
            Ok(t.clone())
        }
        fn list_turtles(&self) -> Result<Vec<Turtle>> {
            self.check()?;
            Ok(self.turtles.clone())
        }
        fn get_turtle(&self, id: TurtleId) -> Result<Turtle> {
            self.check()?;
            self.turtles
                .iter()
                .find(|t| t.id == Some(id))
                .cloned()
                .ok_or_else(|| Error::api(404, "Turtle not found"))
        }
        fn turtle_survey_events(&self, _: TurtleId) -> Result<Vec<TurtleEvent>> {
            Ok(Vec::new())
        }
        fn create_turtle_event(&self, e: &TurtleEvent) -> Result<TurtleEvent> {
            Ok(e.clone())
        }
        fn create_nest(&self, n: &Nest) -> Result<Nest> {
            Ok(n.clone())
        }
        fn update_nest(&self, n: &Nest) -> Result<Nest> {
            Ok(n.clone())
        }
        fn list_nests(&self) -> Result<Vec<Nest>> {
            self.check()?;
            Ok(self.nests.clone())
        }
        fn get_nest(&self, code: &str) -> Result<Nest> {
            self.check()?;
            self.nests
                .iter()
                .find(|n| n.code == code)
                .cloned()
                .ok_or_else(|| Error::api(404, "Nest not found"))
        }
        fn create_nest_event(&self, e: &NestEvent) -> Result<NestEvent> {
            Ok(e.clone())
        }
        fn nest_events(&self, _: &str) -> Result<Vec<NestEvent>> {
            self.check()?;
            Ok(Vec::new())
        }
    }

    fn nest(code: &str, beach: &str) -> Nest {
        Nest {
            code: code.into(),
            beach: beach.into(),
            date_found: "2024-06-01".into(),
            ..Default::default()
        }
    }

    fn app(backend: Fixed) -> App {
        let mut a = App::new(Box::new(backend), AppConfig::default());
        a.refresh();
        a
    }

    fn press(a: &mut App, code: KeyCode) -> bool {
        a.handle_key(code, KeyModifiers::NONE)
    }

    #[test]
    fn dashboard_loads_on_start() {
        let a = app(Fixed {
            nests: vec![nest("KY-1", "Kyparissia Bay")],
            ..Default::default()
        });
        assert_eq!(a.stats.as_ref().map(|s| s.active_nests), Some(1));
        assert!(a.banner.is_none());
    }

    #[test]
    fn dashboard_lists_every_configured_beach() {
        let mut a = app(Fixed {
            nests: vec![nest("KY-1", "Kyparissia Bay")],
            ..Default::default()
        });
        let mut terminal = ratatui::Terminal::new(ratatui::backend::TestBackend::new(120, 40)).unwrap();
        terminal.draw(|f| a.draw(f)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(screen.contains("Kyparissia Bay"), "{screen}");
        assert!(screen.contains("Chania"), "{screen}");
    }

    #[test]
    fn search_then_open_details_and_back() {
        let mut a = app(Fixed {
            nests: vec![nest("KY-1", "Kyparissia Bay"), nest("LK-1", "Lakonikos Bay")],
            ..Default::default()
        });
        press(&mut a, KeyCode::Tab);
        assert_eq!(a.screen, Screen::List(Section::Nests));
        assert_eq!(a.visible_nests().len(), 2);

        press(&mut a, KeyCode::Char('/'));
        for c in "lako".chars() {
            press(&mut a, KeyCode::Char(c));
        }
        press(&mut a, KeyCode::Enter);
        assert_eq!(a.visible_nests().len(), 1);

        press(&mut a, KeyCode::Enter);
        assert_eq!(a.screen, Screen::Nest("LK-1".into()));
        assert_eq!(a.nest_detail.as_ref().map(|d| d.timeline.len()), Some(1));

        press(&mut a, KeyCode::Esc);
        assert_eq!(a.screen, Screen::List(Section::Nests));
        assert!(press(&mut a, KeyCode::Char('q')));
    }

    #[test]
    fn failed_fetch_shows_banner_and_empty_screen() {
        let mut a = app(Fixed {
            down: true,
            ..Default::default()
        });
        assert!(a.stats.is_none());
        let banner = a.banner.clone().unwrap();
        assert!(banner.contains("connection refused"), "{banner}");

        press(&mut a, KeyCode::Tab);
        assert!(a.nests.is_empty());
        assert!(a.banner.is_some());
        assert!(!press(&mut a, KeyCode::Char('j')));
    }
}
