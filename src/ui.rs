use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use arboard::Clipboard;
use rand::Rng;
use ratatui::{
    Frame,
    prelude::*,
    style::Style,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::models::{Difficulty, Writeup};
use crate::store;

const CLIPBOARD_LIFETIME_SECS: u64 = 20;
const COLOR_BRIGHT: Color = Color::Rgb(0xE6, 0xED, 0xF3);
const COLOR_TEXT: Color = Color::Rgb(0x9D, 0xA7, 0xB1);
const COLOR_DIM: Color = Color::Rgb(0x56, 0x5F, 0x68);
const COLOR_ALERT: Color = Color::Rgb(0xDA, 0x54, 0x54);

const GLITCH_GLYPHS: &[char] = &['░', '▒', '▓', '#', '%', '/', '\\', '_'];

const BANNER: [&str; 5] = [
    "████████╗██████╗  █████╗ ███╗   ███╗  ██╗  ██╗███╗   ██╗██╗   ██╗ ██╗ ██╗",
    "╚══██╔══╝╚════██╗██╔══██╗████╗ ████║  ██║ ██╔╝████╗  ██║██║   ██║███║███║",
    "   ██║    █████╔╝███████║██╔████╔██║  █████╔╝ ██╔██╗ ██║██║   ██║╚██║╚██║",
    "   ██║    ╚═══██╗██╔══██║██║╚██╔╝██║  ██╔═██╗ ██║╚██╗██║██║   ██║ ██║ ██║",
    "   ██║   ██████╔╝██║  ██║██║ ╚═╝ ██║  ██║  ██╗██║ ╚████║╚██████╔╝ ██║ ██║",
];

const TAGLINE: &str = "// A collection of cybersecurity exploits and chronicles";

pub const LIST_NAV_HINT: &str =
    "↑/↓ move | Enter open | a admin | Esc quit";
pub const LIST_ADMIN_HINT: &str =
    "↑/↓ move | Enter open | n new | d delete | o logout | Esc quit";
pub const DETAIL_NAV_HINT: &str = "↑/↓ scroll | c copy flag | x save attachment | Esc back";
pub const DETAIL_EDIT_HINT: &str =
    "↑/↓ field | type to edit | ←/→ cycle | Enter editor/attach | ^R drop file | ^D delete | Esc back";

/// Editable form fields, in display order.
pub const EDIT_FIELDS: [&str; 8] = [
    "Title",
    "Category",
    "Difficulty",
    "Author",
    "Description",
    "Solution",
    "Attachment",
    "Flag",
];

pub struct ListViewState<'a> {
    pub writeups: &'a [Writeup],
    pub selected: usize,
    pub privileged: bool,
    pub fading: bool,
    pub anim_frame: usize,
    pub status: String,
    pub overlay: Option<Vec<String>>,
    pub overlay_title: Option<String>,
}

pub struct DetailViewState<'a> {
    pub writeup: &'a Writeup,
    pub privileged: bool,
    pub fading: bool,
    pub field: usize,
    pub scroll: u16,
    pub status: String,
    pub overlay: Option<Vec<String>>,
    pub overlay_title: Option<String>,
}

#[derive(Clone, Copy)]
struct OverlayTheme {
    border: Color,
    title: Color,
    text: Color,
    bg: Color,
}

fn themed_overlay(title: &str) -> OverlayTheme {
    match title {
        "Admin login" => OverlayTheme {
            border: COLOR_BRIGHT,
            title: COLOR_BRIGHT,
            text: COLOR_TEXT,
            bg: Color::Rgb(0x0A, 0x0C, 0x10),
        },
        "Confirm delete" => OverlayTheme {
            border: COLOR_ALERT,
            title: COLOR_ALERT,
            text: COLOR_TEXT,
            bg: Color::Rgb(0x1A, 0x0C, 0x0C),
        },
        "Attach file" => OverlayTheme {
            border: COLOR_TEXT,
            title: COLOR_BRIGHT,
            text: COLOR_TEXT,
            bg: Color::Rgb(0x0C, 0x10, 0x14),
        },
        _ => OverlayTheme {
            border: COLOR_DIM,
            title: COLOR_BRIGHT,
            text: COLOR_TEXT,
            bg: Color::Rgb(0x10, 0x12, 0x16),
        },
    }
}

fn centered_overlay_area(frame_size: Rect, lines: &[String]) -> Rect {
    let maxw = lines.iter().map(|s| s.chars().count()).max().unwrap_or(0) as u16 + 4;
    let maxh = lines.len() as u16 + 2;
    Rect::new(
        (frame_size.width.saturating_sub(maxw)) / 2,
        (frame_size.height.saturating_sub(maxh)) / 2,
        maxw.min(frame_size.width),
        maxh.min(frame_size.height),
    )
}

pub fn render_overlay(f: &mut Frame<'_>, lines: &[String], title: &str) {
    let area = centered_overlay_area(f.size(), lines);
    let theme = themed_overlay(title);
    let paragraph = Paragraph::new(
        lines
            .iter()
            .map(|l| Line::from(l.as_str()))
            .collect::<Vec<Line>>(),
    )
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(Style::default().fg(theme.border))
            .style(Style::default().bg(theme.bg)),
    );
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn base_fg(fading: bool, color: Color) -> Color {
    if fading { COLOR_DIM } else { color }
}

/// Per-frame character corruption over the banner, the terminal take on
/// the original glitch header.
fn glitch_line(line: &str, anim_frame: usize) -> Line<'static> {
    let mut rng = rand::thread_rng();
    // Every few frames the banner renders clean.
    let intensity = if anim_frame % 7 < 2 { 0.04 } else { 0.0 };
    let spans: Vec<Span> = line
        .chars()
        .map(|ch| {
            let corrupted = ch != ' ' && rng.r#gen::<f64>() < intensity;
            if corrupted {
                let glyph = GLITCH_GLYPHS[rng.gen_range(0..GLITCH_GLYPHS.len())];
                Span::styled(glyph.to_string(), Style::default().fg(COLOR_DIM))
            } else {
                let color = match ch {
                    '█' => COLOR_BRIGHT,
                    '═' | '╔' | '╗' | '╚' | '╝' | '║' | '╣' | '╠' => COLOR_DIM,
                    _ => COLOR_TEXT,
                };
                Span::styled(ch.to_string(), Style::default().fg(color))
            }
        })
        .collect();
    Line::from(spans)
}

fn draw_header(f: &mut Frame<'_>, area: Rect, anim_frame: usize, privileged: bool, fading: bool) {
    let mut lines: Vec<Line> = if fading {
        BANNER
            .iter()
            .map(|l| Line::from(Span::styled(*l, Style::default().fg(COLOR_DIM))))
            .collect()
    } else {
        BANNER.iter().map(|l| glitch_line(l, anim_frame)).collect()
    };
    lines.push(Line::from(Span::styled(
        TAGLINE,
        Style::default().fg(base_fg(fading, COLOR_DIM)),
    )));
    if privileged {
        lines.push(Line::from(Span::styled(
            "[ADMIN]",
            Style::default()
                .fg(base_fg(fading, COLOR_BRIGHT))
                .add_modifier(Modifier::BOLD),
        )));
    }
    let banner = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(banner, area);
}

pub fn difficulty_style(difficulty: Difficulty) -> Style {
    match difficulty {
        Difficulty::Easy => Style::default().fg(COLOR_DIM),
        Difficulty::Medium => Style::default().fg(COLOR_TEXT),
        Difficulty::Hard => Style::default().fg(COLOR_BRIGHT),
        Difficulty::Insane => Style::default()
            .fg(COLOR_BRIGHT)
            .add_modifier(Modifier::BOLD),
    }
}

/// First `max` characters of the description, ellipsized on overflow.
pub fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn draw_listing(f: &mut Frame<'_>, state: &ListViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(f.size());

    draw_header(f, layout[0], state.anim_frame, state.privileged, state.fading);

    let items: Vec<ListItem> = if state.writeups.is_empty() {
        vec![ListItem::new("No writeups yet")]
    } else {
        state
            .writeups
            .iter()
            .map(|w| {
                let mut meta = vec![
                    Span::styled(
                        w.category.label().to_uppercase(),
                        Style::default().fg(base_fg(state.fading, COLOR_DIM)),
                    ),
                    Span::styled(" / ", Style::default().fg(COLOR_DIM)),
                    Span::styled(
                        w.difficulty.label().to_uppercase(),
                        if state.fading {
                            Style::default().fg(COLOR_DIM)
                        } else {
                            difficulty_style(w.difficulty)
                        },
                    ),
                ];
                if state.privileged {
                    meta.push(Span::raw("  "));
                    meta.push(Span::styled(
                        "[DELETE: d]",
                        Style::default().fg(base_fg(state.fading, COLOR_ALERT)),
                    ));
                }
                ListItem::new(vec![
                    Line::from(Span::styled(
                        w.title.clone(),
                        Style::default()
                            .fg(base_fg(state.fading, COLOR_BRIGHT))
                            .add_modifier(Modifier::BOLD),
                    )),
                    Line::from(meta),
                    Line::from(Span::styled(
                        excerpt(&w.description, 72),
                        Style::default().fg(base_fg(state.fading, COLOR_TEXT)),
                    )),
                    Line::from(Span::styled(
                        format!("// author: {}", w.author),
                        Style::default().fg(base_fg(state.fading, COLOR_DIM)),
                    )),
                    Line::from(""),
                ])
            })
            .collect()
    };

    let mut list_state = ListState::default();
    if !state.writeups.is_empty() {
        list_state.select(Some(state.selected.min(state.writeups.len() - 1)));
    }
    let title = if state.privileged {
        "Writeups [+ n creates]"
    } else {
        "Writeups"
    };
    let list = List::new(items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_symbol("▶ ")
        .highlight_style(
            Style::default()
                .fg(COLOR_BRIGHT)
                .bg(Color::Rgb(0x20, 0x24, 0x28))
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, layout[1], &mut list_state);

    let footer = Paragraph::new(state.status.clone())
        .style(Style::default().fg(base_fg(state.fading, COLOR_TEXT)))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[2]);

    if let Some(lines) = &state.overlay {
        let title = state.overlay_title.as_deref().unwrap_or("Overlay");
        render_overlay(f, lines, title);
    }
}

pub fn draw_detail(f: &mut Frame<'_>, state: &DetailViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(f.size());

    let body = if state.privileged {
        edit_form_lines(state)
    } else {
        read_only_lines(state.writeup, state.fading)
    };

    let block_title = if state.privileged {
        format!("Editing: {} [live]", state.writeup.title)
    } else {
        state.writeup.title.clone()
    };
    let detail = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .scroll((state.scroll, 0))
        .block(Block::default().title(block_title).borders(Borders::ALL));
    f.render_widget(detail, layout[0]);

    let footer = Paragraph::new(state.status.clone())
        .style(Style::default().fg(base_fg(state.fading, COLOR_TEXT)))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[1]);

    if let Some(lines) = &state.overlay {
        let title = state.overlay_title.as_deref().unwrap_or("Overlay");
        render_overlay(f, lines, title);
    }
}

fn section_header(text: &str, fading: bool) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default()
            .fg(base_fg(fading, COLOR_BRIGHT))
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    ))
}

fn read_only_lines(w: &Writeup, fading: bool) -> Vec<Line<'static>> {
    let text = Style::default().fg(base_fg(fading, COLOR_TEXT));
    let dim = Style::default().fg(base_fg(fading, COLOR_DIM));

    let mut lines = vec![
        Line::from(vec![
            Span::styled(format!("CATEGORY: {}", w.category.label()), dim),
            Span::raw("   "),
            Span::styled(format!("DIFFICULTY: {}", w.difficulty.label()), dim),
            Span::raw("   "),
            Span::styled(format!("AUTHOR: {}", w.author), dim),
        ]),
        Line::from(""),
        section_header("DESCRIPTION", fading),
    ];
    for part in w.description.lines() {
        lines.push(Line::from(Span::styled(part.to_string(), text)));
    }
    lines.push(Line::from(""));
    lines.push(section_header("SOLUTION", fading));
    lines.extend(markup_to_lines(&w.solution, fading));
    lines.push(Line::from(""));
    if let Some(att) = &w.attachment {
        lines.push(section_header("ATTACHMENT", fading));
        lines.push(Line::from(Span::styled(attachment_line(att), text)));
        lines.push(Line::from(""));
    }
    lines.push(section_header("FLAG", fading));
    lines.push(Line::from(Span::styled(
        w.flag.clone(),
        Style::default()
            .fg(base_fg(fading, COLOR_BRIGHT))
            .add_modifier(Modifier::BOLD),
    )));
    lines
}

pub fn attachment_line(att: &crate::models::Attachment) -> String {
    format!(
        "{} ({}, {} bytes)",
        att.name,
        att.mime_type,
        store::attachment_size(att)
    )
}

fn edit_form_lines(state: &DetailViewState) -> Vec<Line<'static>> {
    let w = state.writeup;
    let values: [String; 8] = [
        w.title.clone(),
        format!("◄ {} ►", w.category.label()),
        format!("◄ {} ►", w.difficulty.label()),
        w.author.clone(),
        excerpt(&w.description, 64),
        excerpt(&plain_text(&w.solution), 64),
        w.attachment
            .as_ref()
            .map(attachment_line)
            .unwrap_or_else(|| "none (Enter attaches a file)".to_string()),
        w.flag.clone(),
    ];

    let mut lines = Vec::new();
    for (idx, (label, value)) in EDIT_FIELDS.iter().zip(values.iter()).enumerate() {
        let marker = if idx == state.field { "> " } else { "  " };
        let style = if idx == state.field {
            Style::default()
                .fg(COLOR_BRIGHT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT)
        };
        lines.push(Line::from(Span::styled(
            format!("{marker}{label}: {value}"),
            style,
        )));
    }
    lines.push(Line::from(""));
    lines.push(section_header("SOLUTION PREVIEW", state.fading));
    lines.extend(markup_to_lines(&w.solution, state.fading));
    lines
}

/// Strips the solution's markup down to plain text.
pub fn plain_text(markup: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(&out)
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Renders the stored markup blob as styled terminal lines. The blob is
/// never interpreted beyond this flattening; unknown tags are dropped.
pub fn markup_to_lines(markup: &str, fading: bool) -> Vec<Line<'static>> {
    let text_style = Style::default().fg(base_fg(fading, COLOR_TEXT));
    let heading_style = Style::default()
        .fg(base_fg(fading, COLOR_BRIGHT))
        .add_modifier(Modifier::BOLD);
    let code_style = Style::default()
        .fg(base_fg(fading, COLOR_TEXT))
        .bg(Color::Rgb(0x16, 0x1A, 0x1E));

    // Text is flushed span by span; literal newlines (pre blocks, plain
    // text) break lines on their own.
    fn flush_buffer(
        buffer: &mut String,
        spans: &mut Vec<Span<'static>>,
        lines: &mut Vec<Line<'static>>,
        style: Style,
    ) {
        if buffer.is_empty() {
            return;
        }
        for (i, part) in buffer.split('\n').enumerate() {
            if i > 0 {
                lines.push(Line::from(std::mem::take(spans)));
            }
            if !part.is_empty() {
                spans.push(Span::styled(decode_entities(part), style));
            }
        }
        buffer.clear();
    }
    fn flush_line(spans: &mut Vec<Span<'static>>, lines: &mut Vec<Line<'static>>) {
        if !spans.is_empty() {
            lines.push(Line::from(std::mem::take(spans)));
        }
    }

    let mut lines: Vec<Line> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();
    let mut buffer = String::new();
    let mut style = text_style;
    let mut chars = markup.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            buffer.push(ch);
            continue;
        }
        let mut tag = String::new();
        for t in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }
        let tag = tag.trim().to_ascii_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("");
        let closing = tag.starts_with('/');
        match name {
            "h1" | "h2" | "h3" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                flush_line(&mut spans, &mut lines);
                style = if closing { text_style } else { heading_style };
            }
            "p" | "div" | "ul" | "ol" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                flush_line(&mut spans, &mut lines);
            }
            "pre" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                flush_line(&mut spans, &mut lines);
                style = if closing { text_style } else { code_style };
            }
            "code" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                style = if closing { text_style } else { code_style };
            }
            "li" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                flush_line(&mut spans, &mut lines);
                if !closing {
                    spans.push(Span::styled("• ", text_style));
                }
            }
            "br" => {
                flush_buffer(&mut buffer, &mut spans, &mut lines, style);
                flush_line(&mut spans, &mut lines);
            }
            _ => {}
        }
    }
    flush_buffer(&mut buffer, &mut spans, &mut lines, style);
    flush_line(&mut spans, &mut lines);
    if lines.is_empty() {
        lines.push(Line::from(Span::styled("(empty)".to_string(), text_style)));
    }
    lines
}

pub fn copy_flag_to_clipboard(writeup: &Writeup) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {e}"))?;
    clipboard
        .set_text(writeup.flag.clone())
        .map_err(|e| anyhow!("Failed to set clipboard: {e}"))?;
    let mut clip = clipboard;
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(CLIPBOARD_LIFETIME_SECS));
        let _ = clip.set_text(String::new());
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_passes_short_text_through() {
        assert_eq!(excerpt("short and sweet", 40), "short and sweet");
    }

    #[test]
    fn excerpt_flattens_whitespace_and_ellipsizes() {
        let text = "line one\nline   two and then some considerably longer tail";
        let cut = excerpt(text, 20);
        assert_eq!(cut.chars().count(), 20);
        assert!(cut.starts_with("line one line two"));
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn plain_text_strips_tags_and_decodes_entities() {
        let markup = "<h2>Recon</h2><p>a &amp; b &lt;c&gt;</p>";
        assert_eq!(plain_text(markup), "Recona & b <c>");
    }

    #[test]
    fn markup_breaks_lines_on_block_tags() {
        let lines = markup_to_lines("<h2>Steps</h2><p>first</p><p>second</p>", false);
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(rendered, vec!["Steps", "first", "second"]);
    }

    #[test]
    fn markup_renders_list_items_with_bullets() {
        let lines = markup_to_lines("<ul><li>alpha</li><li>beta</li></ul>", false);
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(rendered, vec!["• alpha", "• beta"]);
    }

    #[test]
    fn markup_splits_pre_blocks_on_newlines() {
        let lines = markup_to_lines("<pre>a = 1\nb = 2</pre>", false);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_markup_yields_a_placeholder_line() {
        let lines = markup_to_lines("", false);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn insane_difficulty_renders_bold() {
        let style = difficulty_style(Difficulty::Insane);
        assert!(style.add_modifier.contains(Modifier::BOLD));
    }
}
