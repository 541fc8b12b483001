use std::io::Write;

use crate::filter::Reading;

/// Characters per display line
pub const WIDTH: usize = 16;

/// Below this magnitude (A) the battery is considered idle
const IDLE_BAND_A: f32 = 0.2;

/// The content of a 16x2 character display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screen {
    pub lines: [String; 2],
}

impl Screen {
    /// A free-form screen. Each line is padded or cut to the display width.
    pub fn message(first: &str, second: &str) -> Self {
        Self {
            lines: [fit(first), fit(second)],
        }
    }

    /// The normal running screen: current on top, direction and link state below.
    pub fn render(reading: &Reading, connected: bool) -> Self {
        let first = if reading.live {
            format!("I:{:+7.1}A", reading.amps)
        } else {
            "I:   --.-A".to_string()
        };

        let second = if !connected {
            "OBD:DISCONNECTED"
        } else if !reading.live {
            "OBD:OK  NO DATA"
        } else if reading.amps > IDLE_BAND_A {
            "DISCHG  OBD:OK"
        } else if reading.amps < -IDLE_BAND_A {
            "CHG/REG OBD:OK"
        } else {
            "IDLE    OBD:OK"
        };

        Self::message(&first, second)
    }
}

fn fit(text: &str) -> String {
    let mut line: String = text.chars().take(WIDTH).collect();
    let len = line.chars().count();
    line.extend(std::iter::repeat(' ').take(WIDTH - len));
    line
}

/// Something that can show a [`Screen`]
pub trait Display {
    fn show(&mut self, screen: &Screen) -> anyhow::Result<()>;
}

/// Prints the screen to a writer whenever it changes.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    last: Option<Screen>,
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    fn show(&mut self, screen: &Screen) -> anyhow::Result<()> {
        if self.last.as_ref() == Some(screen) {
            return Ok(());
        }
        writeln!(self.out, "|{}|{}|", screen.lines[0], screen.lines[1])?;
        self.out.flush()?;
        self.last = Some(screen.clone());
        Ok(())
    }
}

#[test]
fn test_render_discharging() {
    let screen = Screen::render(&Reading { amps: 12.34, live: true }, true);
    assert_eq!(screen.lines[0], "I:  +12.3A      ");
    assert_eq!(screen.lines[1], "DISCHG  OBD:OK  ");
}

#[test]
fn test_render_charging() {
    let screen = Screen::render(&Reading { amps: -105.0, live: true }, true);
    assert_eq!(screen.lines[0], "I: -105.0A      ");
    assert_eq!(screen.lines[1], "CHG/REG OBD:OK  ");
}

#[test]
fn test_render_idle() {
    let screen = Screen::render(&Reading { amps: 0.2, live: true }, true);
    assert_eq!(screen.lines[1], "IDLE    OBD:OK  ");
    let screen = Screen::render(&Reading { amps: -0.1, live: true }, true);
    assert_eq!(screen.lines[1], "IDLE    OBD:OK  ");
}

#[test]
fn test_render_stale() {
    let screen = Screen::render(&Reading { amps: 50.0, live: false }, true);
    assert_eq!(screen.lines[0], "I:   --.-A      ");
    assert_eq!(screen.lines[1], "OBD:OK  NO DATA ");
}

#[test]
fn test_render_disconnected() {
    let screen = Screen::render(&Reading { amps: 50.0, live: true }, false);
    assert_eq!(screen.lines[1], "OBD:DISCONNECTED");
}

#[test]
fn test_message_cut_to_width() {
    let screen = Screen::message("BT CONNECT FAIL and more", "");
    assert_eq!(screen.lines[0], "BT CONNECT FAIL ");
    assert_eq!(screen.lines[1], " ".repeat(WIDTH));
}

#[test]
fn test_console_display_only_prints_changes() {
    let mut display = ConsoleDisplay::new(Vec::new());
    let screen = Screen::message("A", "B");
    display.show(&screen).unwrap();
    display.show(&screen).unwrap();
    display.show(&Screen::message("C", "D")).unwrap();

    let out = String::from_utf8(display.into_inner()).unwrap();
    assert_eq!(out.lines().count(), 2);
    assert!(out.starts_with("|A               |B               |"));
}
