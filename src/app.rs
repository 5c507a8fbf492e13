use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::info;
use ratatui::{Terminal, backend::CrosstermBackend};
use zeroize::Zeroize;

use crate::auth::{self, LoginResponse};
use crate::controller::{Controller, Screen};
use crate::models::Writeup;
use crate::ui::{
    self, DETAIL_EDIT_HINT, DETAIL_NAV_HINT, DetailViewState, LIST_ADMIN_HINT, LIST_NAV_HINT,
    ListViewState,
};
use crate::{logging, session, store};

const STATUS_MESSAGE_SECS: u64 = 2;
const ANIM_TICK_MS: u64 = 150;

pub fn run() -> Result<()> {
    let bin_name = executable_name();
    let mut args = std::env::args().skip(1);
    let mut data_dir: Option<PathBuf> = None;
    let mut login_url_flag: Option<String> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("{bin_name} v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_usage(&bin_name);
                return Ok(());
            }
            "--data-dir" => {
                if let Some(p) = args.next() {
                    data_dir = Some(PathBuf::from(p));
                } else {
                    return Err(anyhow!("--data-dir requires a path"));
                }
            }
            "--login-url" => {
                if let Some(u) = args.next() {
                    login_url_flag = Some(u);
                } else {
                    return Err(anyhow!("--login-url requires a URL"));
                }
            }
            _ => {}
        }
    }

    let base = match data_dir {
        Some(dir) => dir,
        None => store::default_base_dir()?,
    };
    let _logger = logging::init(&base).map_err(|e| anyhow!(e))?;

    let writeups_path = store::writeups_path(&base);
    store::ensure_parent_dir(&writeups_path)?;
    let login_url = login_url_flag.unwrap_or_else(|| store::login_url(&base));
    info!("starting board, data dir {}", base.display());

    let mut controller = Controller::new(writeups_path, session::session_path());
    run_tui(&mut controller, &login_url, &base)
}

/// Password overlay state while `Screen::LoggingIn` is active. Dropping
/// the receiver is the teardown that makes a stale response harmless.
#[derive(Default)]
struct LoginForm {
    input: String,
    show: bool,
    loading: bool,
    error: Option<String>,
    rx: Option<mpsc::Receiver<Result<LoginResponse>>>,
}

impl LoginForm {
    fn wipe(&mut self) {
        self.input.zeroize();
        self.input.clear();
        self.rx = None;
        self.loading = false;
        self.error = None;
    }
}

#[derive(Default)]
struct AttachPrompt {
    active: bool,
    path: String,
}

fn run_tui(controller: &mut Controller, login_url: &str, base: &Path) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut selected: usize = 0;
    let mut edit_field: usize = 0;
    let mut detail_scroll: u16 = 0;
    let mut anim_frame: usize = 0;
    let mut last_anim = Instant::now();
    let mut status = default_hint(controller).to_string();
    let mut status_until: Option<Instant> = None;
    let mut login_form = LoginForm::default();
    let mut attach_prompt = AttachPrompt::default();
    let mut delete_confirm: Option<(u64, String)> = None;
    let mut quit_overlay = false;

    let result = (|| -> Result<()> {
        loop {
            let now = Instant::now();
            if let Some(until) = status_until {
                if now >= until {
                    status = default_hint(controller).to_string();
                    status_until = None;
                }
            }
            if last_anim.elapsed() >= Duration::from_millis(ANIM_TICK_MS) {
                anim_frame = anim_frame.wrapping_add(1);
                last_anim = Instant::now();
            }
            if controller.tick(now) {
                // A swap just landed; reset per-screen cursors.
                detail_scroll = 0;
                edit_field = 0;
                status = default_hint(controller).to_string();
                status_until = None;
            }

            poll_login_response(controller, &mut login_form, &mut status, &mut status_until);

            let overlay = build_overlay(&login_form, &attach_prompt, &delete_confirm, quit_overlay, controller);
            let writeup = controller.viewing().cloned();
            match (controller.screen(), &writeup) {
                (Screen::Viewing(_), Some(w)) => {
                    let view = DetailViewState {
                        writeup: w,
                        privileged: controller.privileged(),
                        fading: controller.is_fading(),
                        field: edit_field,
                        scroll: detail_scroll,
                        status: status.clone(),
                        overlay: overlay.clone().map(|(lines, _)| lines),
                        overlay_title: overlay.clone().map(|(_, title)| title),
                    };
                    terminal.draw(|f| ui::draw_detail(f, &view))?;
                }
                _ => {
                    let view = ListViewState {
                        writeups: controller.writeups(),
                        selected,
                        privileged: controller.privileged(),
                        fading: controller.is_fading(),
                        anim_frame,
                        status: status.clone(),
                        overlay: overlay.clone().map(|(lines, _)| lines),
                        overlay_title: overlay.map(|(_, title)| title),
                    };
                    terminal.draw(|f| ui::draw_listing(f, &view))?;
                }
            }

            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            let Event::Key(key_event) = event::read()? else {
                continue;
            };
            let previous_status = status.clone();
            let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
            let now = Instant::now();

            if quit_overlay {
                match key_event.code {
                    KeyCode::Char('y') => break,
                    KeyCode::Char('n') | KeyCode::Esc => quit_overlay = false,
                    _ => {}
                }
            } else if let Some((id, _)) = delete_confirm.clone() {
                match key_event.code {
                    KeyCode::Char('y') => {
                        controller.delete(id, now);
                        selected = selected.min(controller.writeups().len().saturating_sub(1));
                        status = "Writeup deleted".into();
                        delete_confirm = None;
                    }
                    KeyCode::Char('n') | KeyCode::Esc => {
                        delete_confirm = None;
                        status = "Delete cancelled".into();
                    }
                    _ => {}
                }
            } else if attach_prompt.active {
                handle_attach_prompt(
                    key_event.code,
                    &mut attach_prompt,
                    controller,
                    &mut status,
                )?;
            } else if controller.screen() == Screen::LoggingIn {
                handle_login_overlay(
                    key_event.code,
                    ctrl,
                    &mut login_form,
                    controller,
                    login_url,
                    &mut status,
                );
            } else {
                match controller.screen() {
                    Screen::Listing => handle_listing_keys(
                        key_event.code,
                        controller,
                        &mut selected,
                        &mut login_form,
                        &mut delete_confirm,
                        &mut quit_overlay,
                        &mut status,
                        now,
                    ),
                    Screen::Viewing(_) => handle_detail_keys(
                        key_event.code,
                        ctrl,
                        controller,
                        &mut edit_field,
                        &mut detail_scroll,
                        &mut attach_prompt,
                        &mut delete_confirm,
                        &mut status,
                        base,
                        &mut terminal,
                        now,
                    )?,
                    Screen::LoggingIn => {}
                }
            }

            if status != previous_status {
                status_until = Some(Instant::now() + Duration::from_secs(STATUS_MESSAGE_SECS));
            }
        }
        Ok(())
    })();

    teardown_terminal(&mut terminal);
    login_form.wipe();
    result
}

fn default_hint(controller: &Controller) -> &'static str {
    match controller.screen() {
        Screen::Viewing(_) => {
            if controller.privileged() {
                DETAIL_EDIT_HINT
            } else {
                DETAIL_NAV_HINT
            }
        }
        _ => {
            if controller.privileged() {
                LIST_ADMIN_HINT
            } else {
                LIST_NAV_HINT
            }
        }
    }
}

/// Drains the login worker channel. The response updates state exactly
/// once; anything arriving after the overlay closed finds no receiver.
fn poll_login_response(
    controller: &mut Controller,
    form: &mut LoginForm,
    status: &mut String,
    status_until: &mut Option<Instant>,
) {
    if !form.loading {
        return;
    }
    let Some(rx) = &form.rx else {
        return;
    };
    let outcome = match rx.try_recv() {
        Ok(outcome) => outcome,
        Err(mpsc::TryRecvError::Empty) => return,
        Err(mpsc::TryRecvError::Disconnected) => {
            form.loading = false;
            form.rx = None;
            form.error = Some("An error occurred during authentication. Please try again.".into());
            controller.login(false);
            return;
        }
    };
    form.loading = false;
    form.rx = None;
    match outcome {
        Ok(response) if response.success => {
            controller.login(true);
            form.wipe();
            *status = "Access granted".into();
            *status_until = Some(Instant::now() + Duration::from_secs(STATUS_MESSAGE_SECS));
        }
        Ok(response) => {
            form.error = Some(
                response
                    .error
                    .unwrap_or_else(|| "Authentication failed. Incorrect password.".into()),
            );
            controller.login(false);
        }
        Err(err) => {
            info!("login request failed: {err:#}");
            form.error = Some("An error occurred during authentication. Please try again.".into());
            controller.login(false);
        }
    }
}

type OverlayContent = Option<(Vec<String>, String)>;

fn build_overlay(
    login_form: &LoginForm,
    attach_prompt: &AttachPrompt,
    delete_confirm: &Option<(u64, String)>,
    quit_overlay: bool,
    controller: &Controller,
) -> OverlayContent {
    if quit_overlay {
        return Some((
            vec![
                "Quit?".to_string(),
                String::new(),
                "[y] Yes   [n] No".to_string(),
            ],
            "Confirm quit".to_string(),
        ));
    }
    if let Some((_, title)) = delete_confirm {
        return Some((
            vec![
                format!("Delete '{title}'?"),
                "This action is permanent.".to_string(),
                String::new(),
                "[y] Yes   [n] No".to_string(),
            ],
            "Confirm delete".to_string(),
        ));
    }
    if attach_prompt.active {
        return Some((
            vec![
                "Path to file:".to_string(),
                String::new(),
                format!("> {}", attach_prompt.path),
                String::new(),
                "Enter attaches; Esc cancels".to_string(),
            ],
            "Attach file".to_string(),
        ));
    }
    if controller.screen() == Screen::LoggingIn {
        let display = if login_form.show {
            login_form.input.clone()
        } else {
            "•".repeat(login_form.input.chars().count())
        };
        let mut lines = vec![
            "Restricted area. Authenticate to edit the board.".to_string(),
            String::new(),
            format!("> Password: {display}"),
            String::new(),
        ];
        if login_form.loading {
            lines.push("Authenticating...".to_string());
        } else if let Some(err) = &login_form.error {
            lines.push(format!("!! {err}"));
        } else {
            lines.push("Enter submits; Ctrl+h show/hide; Esc closes".to_string());
        }
        return Some((lines, "Admin login".to_string()));
    }
    None
}

fn handle_login_overlay(
    key: KeyCode,
    ctrl: bool,
    form: &mut LoginForm,
    controller: &mut Controller,
    login_url: &str,
    status: &mut String,
) {
    let toggle_visibility = matches!(key, KeyCode::Char('h') | KeyCode::Char('H')) && ctrl;
    if toggle_visibility {
        form.show = !form.show;
        return;
    }
    match key {
        KeyCode::Esc => {
            form.wipe();
            controller.close_login();
            *status = "Login cancelled".into();
        }
        KeyCode::Enter => {
            if form.loading {
                return;
            }
            if form.input.is_empty() {
                form.error = Some("Password is required.".into());
                return;
            }
            form.loading = true;
            form.error = None;
            let (tx, rx) = mpsc::channel();
            let url = login_url.to_string();
            let password = form.input.clone();
            thread::spawn(move || {
                let _ = tx.send(auth::request_login(&url, &password));
            });
            form.rx = Some(rx);
        }
        KeyCode::Backspace => {
            if !form.loading {
                form.input.pop();
            }
        }
        KeyCode::Char(c) => {
            if !form.loading {
                form.input.push(c);
            }
        }
        _ => {}
    }
}

fn handle_attach_prompt(
    key: KeyCode,
    prompt: &mut AttachPrompt,
    controller: &mut Controller,
    status: &mut String,
) -> Result<()> {
    match key {
        KeyCode::Esc => {
            *prompt = AttachPrompt::default();
            *status = "Attach cancelled".into();
        }
        KeyCode::Backspace => {
            prompt.path.pop();
        }
        KeyCode::Enter => {
            let path = PathBuf::from(prompt.path.trim());
            match store::read_attachment(&path) {
                Ok(attachment) => {
                    if let Some(mut current) = controller.viewing().cloned() {
                        *status = format!("Attached {}", attachment.name);
                        current.attachment = Some(attachment);
                        controller.update(current);
                    }
                    *prompt = AttachPrompt::default();
                }
                Err(err) => {
                    *status = format!("{err}");
                }
            }
        }
        KeyCode::Char(c) => {
            prompt.path.push(c);
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_listing_keys(
    key: KeyCode,
    controller: &mut Controller,
    selected: &mut usize,
    login_form: &mut LoginForm,
    delete_confirm: &mut Option<(u64, String)>,
    quit_overlay: &mut bool,
    status: &mut String,
    now: Instant,
) {
    match key {
        KeyCode::Esc => *quit_overlay = true,
        KeyCode::Up => {
            *selected = selected.saturating_sub(1);
        }
        KeyCode::Down => {
            let max = controller.writeups().len().saturating_sub(1);
            *selected = (*selected + 1).min(max);
        }
        KeyCode::Enter => {
            if let Some(w) = controller.writeups().get(*selected) {
                controller.select(w.id, now);
            }
        }
        KeyCode::Char('n') => {
            if controller.privileged() {
                if controller.create(now).is_some() {
                    *selected = 0;
                    *status = "New writeup created".into();
                }
            }
        }
        KeyCode::Char('d') => {
            if controller.privileged() {
                if let Some(w) = controller.writeups().get(*selected) {
                    *delete_confirm = Some((w.id, w.title.clone()));
                    *status = "Confirm delete with y/n".into();
                }
            }
        }
        KeyCode::Char('a') => {
            if !controller.privileged() {
                *login_form = LoginForm::default();
                controller.open_login();
            }
        }
        KeyCode::Char('o') => {
            if controller.privileged() {
                controller.logout();
                *status = "Logged out".into();
            }
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_detail_keys(
    key: KeyCode,
    ctrl: bool,
    controller: &mut Controller,
    edit_field: &mut usize,
    detail_scroll: &mut u16,
    attach_prompt: &mut AttachPrompt,
    delete_confirm: &mut Option<(u64, String)>,
    status: &mut String,
    base: &Path,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    now: Instant,
) -> Result<()> {
    let Some(current) = controller.viewing().cloned() else {
        controller.back(now);
        return Ok(());
    };

    if !controller.privileged() {
        match key {
            KeyCode::Esc | KeyCode::Char('b') => controller.back(now),
            KeyCode::Up => *detail_scroll = detail_scroll.saturating_sub(1),
            KeyCode::Down => *detail_scroll = detail_scroll.saturating_add(1),
            KeyCode::Char('c') => match ui::copy_flag_to_clipboard(&current) {
                Ok(_) => *status = "Flag copied to clipboard for 20s".into(),
                Err(e) => *status = format!("Clipboard error: {e}"),
            },
            KeyCode::Char('x') => export_current_attachment(&current, base, status),
            _ => {}
        }
        return Ok(());
    }

    // Edit form: ctrl chords carry the commands so plain characters can
    // flow into the focused text field.
    if ctrl {
        match key {
            KeyCode::Char('d') | KeyCode::Char('D') => {
                *delete_confirm = Some((current.id, current.title.clone()));
                *status = "Confirm delete with y/n".into();
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                if current.attachment.is_some() {
                    let mut updated = current.clone();
                    updated.attachment = None;
                    controller.update(updated);
                    *status = "Attachment removed".into();
                }
            }
            KeyCode::Char('x') | KeyCode::Char('X') => {
                export_current_attachment(&current, base, status)
            }
            _ => {}
        }
        return Ok(());
    }

    match key {
        KeyCode::Esc => controller.back(now),
        KeyCode::Up | KeyCode::BackTab => *edit_field = edit_field.saturating_sub(1),
        KeyCode::Down | KeyCode::Tab => {
            *edit_field = (*edit_field + 1).min(ui::EDIT_FIELDS.len() - 1);
        }
        KeyCode::Left | KeyCode::Right => {
            let mut updated = current.clone();
            match *edit_field {
                1 => {
                    updated.category = if key == KeyCode::Left {
                        current.category.prev()
                    } else {
                        current.category.next()
                    };
                }
                2 => {
                    updated.difficulty = if key == KeyCode::Left {
                        current.difficulty.prev()
                    } else {
                        current.difficulty.next()
                    };
                }
                _ => return Ok(()),
            }
            controller.update(updated);
        }
        KeyCode::Enter => match *edit_field {
            4 => {
                if let Some(text) = edit_text_with_editor(&current.description, terminal)? {
                    let mut updated = current.clone();
                    updated.description = text;
                    controller.update(updated);
                    *status = "Description updated".into();
                }
            }
            5 => {
                if let Some(text) = edit_text_with_editor(&current.solution, terminal)? {
                    let mut updated = current.clone();
                    updated.solution = text;
                    controller.update(updated);
                    *status = "Solution updated".into();
                }
            }
            6 => {
                *attach_prompt = AttachPrompt {
                    active: true,
                    path: String::new(),
                };
                *status = "Type a file path".into();
            }
            _ => {}
        },
        KeyCode::Backspace => {
            let mut updated = current.clone();
            match *edit_field {
                0 => {
                    updated.title.pop();
                }
                3 => {
                    updated.author.pop();
                }
                7 => {
                    updated.flag.pop();
                }
                _ => return Ok(()),
            }
            controller.update(updated);
        }
        KeyCode::Char(c) => {
            let mut updated = current.clone();
            match *edit_field {
                0 => updated.title.push(c),
                3 => updated.author.push(c),
                7 => updated.flag.push(c),
                _ => return Ok(()),
            }
            controller.update(updated);
        }
        _ => {}
    }
    Ok(())
}

fn export_current_attachment(current: &Writeup, base: &Path, status: &mut String) {
    match &current.attachment {
        Some(att) => match store::export_attachment(att, &base.join("downloads")) {
            Ok(dest) => *status = format!("Saved to {}", dest.display()),
            Err(e) => *status = format!("{e}"),
        },
        None => *status = "No attachment on this writeup".into(),
    }
}

/// Suspends the TUI, hands the text to `$EDITOR`, and resumes. Returns
/// None when the editor exits nonzero.
fn edit_text_with_editor(
    initial: &str,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
) -> Result<Option<String>> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let exit = Command::new(editor)
        .arg(file.path())
        .status()
        .map_err(|e| anyhow!("Failed to launch editor: {e}"));

    execute!(terminal.backend_mut(), EnterAlternateScreen, Hide).ok();
    enable_raw_mode().ok();
    terminal.clear()?;

    let exit = exit?;
    if !exit.success() {
        return Ok(None);
    }
    let new_content = fs::read_to_string(file.path())?;
    Ok(Some(new_content))
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    terminal.show_cursor().ok();
}

fn print_usage(bin_name: &str) {
    eprintln!("Usage: {bin_name} [OPTIONS]");
    eprintln!("  --data-dir <PATH>       Board data directory (default ~/{})", store::DATA_DIR);
    eprintln!("  --login-url <URL>       Admin login endpoint");
    eprintln!("  -V, --version           Show version and exit");
    eprintln!("  -h, --help              Show this help");
}

fn executable_name() -> String {
    let fallback = "knull".to_string();
    let arg0 = match std::env::args().next() {
        Some(v) => v,
        None => return fallback,
    };
    let path = Path::new(&arg0);
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback,
    }
}
